//! silence-rec - 無音検出で自動停止するマイク録音
//!
//! 入力デバイスから固定長ブロック単位で音声を読み出し、
//! 無音が一定時間続いた時点で録音を終了して、メモリ上のサンプルバッファを返す。
//!
//! # 主な機能
//!
//! - **ブロック読み出し**: ライブ入力ストリームから固定フレーム数のブロックを取得
//! - **無音検出**: ブロックごとの RMS を閾値と比較して無音/有音を判定
//! - **録音ループ**: 連続無音ブロック数・録音時間・キャンセルで停止を判定
//! - **バッファ連結**: 到着順のブロックを1本のサンプルバッファにまとめる
//! - **WAVファイル出力 / 再生**: 録音結果を受け取る外部コンポーネント
//!
//! # アーキテクチャ
//!
//! ```text
//! [Input Device] → [BlockReader] → [CaptureController] ←── [CancelToken]
//!                                         │
//!                                  [SilenceDetector]
//!                                         │
//!                                  [BufferAssembler]
//!                                         ↓
//!                                  [CapturedAudio]
//!                                    │         │
//!                               [WavWriter] [AudioOutput]
//! ```
//!
//! # 使用例
//!
//! ```no_run
//! use silence_rec::audio_input::CpalInput;
//! use silence_rec::capture::{CancelToken, CaptureController};
//! use silence_rec::config::CaptureConfig;
//!
//! let controller = CaptureController::new(CaptureConfig::default()).unwrap();
//! let outcome = controller.run(&CpalInput, &CancelToken::new()).unwrap();
//! println!("{:?}: {} frames", outcome.reason, outcome.audio.frames());
//! ```

pub mod audio_input;
pub mod audio_output;
pub mod buffer;
pub mod capture;
pub mod config;
pub mod error;
pub mod input;
pub mod silence;
pub mod types;
pub mod wav_writer;
