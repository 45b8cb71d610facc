use crate::buffer::BufferAssembler;
use crate::config::CaptureConfig;
use crate::error::{CaptureError, DeviceError};
use crate::input::{BlockRead, InputBackend, OpenStream, StreamParams};
use crate::silence::{self, SilenceDetector};
use crate::types::{
    AudioBlock, AudioFormat, BlockClass, CapturedAudio, SessionState, TerminationReason,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// 協調的なキャンセル用トークン
///
/// Ctrl+C ハンドラなど別スレッドから `cancel` され、
/// 録音ループは1ブロックごとにこれを確認する。
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// 録音中に集計した統計
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    /// 取り込んだブロック数
    pub blocks: usize,
    /// 無音と判定されたブロック数
    pub silent_blocks: usize,
    /// 上流でデータが欠落したブロック数
    pub overflowed_blocks: usize,
}

/// 正常終了した録音の結果
#[derive(Debug)]
pub struct CaptureOutcome {
    pub audio: CapturedAudio,
    pub reason: TerminationReason,
    pub stats: CaptureStats,
}

/// 1回の録音セッション
///
/// 設定、到着順のブロック列、連続無音カウンタ、ライフサイクル状態を保持する。
/// [`CaptureController`] が排他的に所有し、最後に [`BufferAssembler`] に渡して消費する。
pub struct CaptureSession {
    config: CaptureConfig,
    format: AudioFormat,
    block_frames: usize,
    required_silent_blocks: u32,
    max_frames: Option<usize>,
    blocks: Vec<AudioBlock>,
    frames_captured: usize,
    silent_run: u32,
    state: SessionState,
    stats: CaptureStats,
}

impl CaptureSession {
    /// 設定を検証してセッションを作成
    pub fn new(config: CaptureConfig) -> Result<Self, CaptureError> {
        config.validate()?;

        Ok(Self {
            format: AudioFormat {
                sample_rate: config.sample_rate,
                channels: config.channels,
            },
            block_frames: config.block_frames(),
            required_silent_blocks: config.required_silent_blocks(),
            max_frames: config.max_frames(),
            config,
            blocks: Vec::new(),
            frames_captured: 0,
            silent_run: 0,
            state: SessionState::Running,
            stats: CaptureStats::default(),
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 現在の連続無音ブロック数
    pub fn silent_run(&self) -> u32 {
        self.silent_run
    }

    pub fn required_silent_blocks(&self) -> u32 {
        self.required_silent_blocks
    }

    pub fn blocks(&self) -> &[AudioBlock] {
        &self.blocks
    }

    pub fn frames_captured(&self) -> usize {
        self.frames_captured
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// 次に読み出すフレーム数
    ///
    /// 録音時間が指定されている場合、最後のブロックは残りのフレーム数に切り詰める。
    pub fn next_read_frames(&self) -> usize {
        match self.max_frames {
            Some(max) => self
                .block_frames
                .min(max.saturating_sub(self.frames_captured))
                .max(1),
            None => self.block_frames,
        }
    }

    /// 読み出したブロックを追加して判定する
    ///
    /// 停止条件を満たした場合は終了理由を返す。
    pub fn push_block(&mut self, read: BlockRead) -> Option<TerminationReason> {
        if self.state != SessionState::Running {
            return self.termination_reason();
        }

        let BlockRead { block, overflowed } = read;
        let index = self.stats.blocks;

        if overflowed {
            self.stats.overflowed_blocks += 1;
            log::warn!("オーバーフロー: ブロック {} で入力データが欠落しました", index);
        }

        let level = silence::rms(block.samples());
        let class = SilenceDetector::classify_rms(level, self.config.silence_threshold);

        self.frames_captured += block.frames();
        self.blocks.push(block);
        self.stats.blocks += 1;

        match class {
            BlockClass::Active => self.silent_run = 0,
            BlockClass::Silent => {
                // 無音検出が無効でも必要ブロック数を超えて数えない
                self.silent_run = self
                    .silent_run
                    .saturating_add(1)
                    .min(self.required_silent_blocks);
                self.stats.silent_blocks += 1;
            }
        }

        log::debug!(
            "ブロック {}: RMS {:.4} ({:.1} dB) {:?}, 連続無音 {}/{}",
            index,
            level,
            silence::rms_to_db(level),
            class,
            self.silent_run,
            self.required_silent_blocks
        );

        if self.config.silence_detect && self.silent_run >= self.required_silent_blocks {
            self.stop(TerminationReason::Silence);
        } else if matches!(self.max_frames, Some(max) if self.frames_captured >= max) {
            self.stop(TerminationReason::DurationReached);
        }

        self.termination_reason()
    }

    /// ユーザー中断で停止する。取り込み済みのブロックは保持する。
    pub fn cancel(&mut self) {
        self.stop(TerminationReason::UserCancelled);
    }

    /// デバイスエラーで停止する
    pub fn fail(&mut self) {
        self.stop(TerminationReason::DeviceError);
    }

    fn stop(&mut self, reason: TerminationReason) {
        if self.state == SessionState::Running {
            self.state = SessionState::Stopped(reason);
        }
    }

    fn termination_reason(&self) -> Option<TerminationReason> {
        match self.state {
            SessionState::Running => None,
            SessionState::Stopped(reason) => Some(reason),
        }
    }

    /// セッションを消費して録音結果を組み立てる
    pub fn finish(self) -> (CapturedAudio, CaptureStats) {
        let audio = BufferAssembler::assemble(self.blocks, self.format);
        (audio, self.stats)
    }
}

/// 録音ループ
///
/// ブロックの読み出し → 無音判定 → 停止判定を1ブロックずつ順番に繰り返す。
/// ブロックの並列処理は行わない。
///
/// # 終了条件
///
/// - 無音ブロックが `required_silent_blocks` 回連続した → [`TerminationReason::Silence`]
/// - 録音時間に達した → [`TerminationReason::DurationReached`]
/// - キャンセルされた → [`TerminationReason::UserCancelled`]
/// - 読み出しに失敗した → [`CaptureError::Device`] (録音済みの分を添えて返す)
///
/// どの経路でも入力ストリームはちょうど1回だけ閉じられる。
pub struct CaptureController {
    config: CaptureConfig,
}

impl CaptureController {
    /// # Errors
    ///
    /// 設定が不正な場合は [`CaptureError::Config`] を返す。
    pub fn new(config: CaptureConfig) -> Result<Self, CaptureError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// 録音を実行して結果を返す
    ///
    /// 呼び出し元のスレッドをブロックする。
    pub fn run<B: InputBackend>(
        &self,
        backend: &B,
        cancel: &CancelToken,
    ) -> Result<CaptureOutcome, CaptureError> {
        let mut session = CaptureSession::new(self.config.clone())?;
        let params = StreamParams::from_config(&self.config);

        log::info!(
            "録音を開始します (閾値={}, 無音時間={}秒, ブロック={}フレーム, 必要無音ブロック={})",
            self.config.silence_threshold,
            self.config.silence_duration_secs,
            params.block_frames,
            session.required_silent_blocks()
        );

        let reader = match backend.open(&params) {
            Ok(reader) => reader,
            Err(e) => {
                log::error!("入力ストリームを開けませんでした: {}", e);
                return Err(Self::device_failure(session, e));
            }
        };
        let mut stream = OpenStream::new(reader);

        let reason = loop {
            if cancel.is_cancelled() {
                session.cancel();
                break TerminationReason::UserCancelled;
            }

            let frames = session.next_read_frames();
            match stream.read_block(frames) {
                Ok(read) => {
                    if let Some(reason) = session.push_block(read) {
                        break reason;
                    }
                }
                Err(e) => {
                    log::error!("ブロックの読み出しに失敗: {}", e);
                    stream.close();
                    return Err(Self::device_failure(session, e));
                }
            }
        };

        stream.close();

        let (audio, stats) = session.finish();
        log::info!(
            "録音を終了しました: {} ({}フレーム, {:.2}秒, オーバーフロー {} 回)",
            reason.label(),
            audio.frames(),
            audio.duration_secs(),
            stats.overflowed_blocks
        );

        Ok(CaptureOutcome {
            audio,
            reason,
            stats,
        })
    }

    /// 録音を専用スレッドで実行する
    ///
    /// ストリームはそのスレッド内で開かれる。結果は `join` で受け取る。
    pub fn spawn<B>(
        self,
        backend: B,
        cancel: CancelToken,
    ) -> std::io::Result<JoinHandle<Result<CaptureOutcome, CaptureError>>>
    where
        B: InputBackend + Send + 'static,
    {
        thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || self.run(&backend, &cancel))
    }

    fn device_failure(mut session: CaptureSession, source: DeviceError) -> CaptureError {
        session.fail();
        let (partial, stats) = session.finish();
        log::warn!(
            "録音済みの {} ブロック ({}フレーム) を返します",
            stats.blocks,
            partial.frames()
        );
        CaptureError::Device { source, partial }
    }
}
