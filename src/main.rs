use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use serde::Serialize;
use silence_rec::audio_input::CpalInput;
use silence_rec::audio_output::AudioOutput;
use silence_rec::capture::{CancelToken, CaptureController, CaptureStats};
use silence_rec::config::CaptureConfig;
use silence_rec::error::CaptureError;
use silence_rec::types::{CapturedAudio, TerminationReason};
use silence_rec::wav_writer::{WavEncoding, WavWriter};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// 録音時間が入力されなかった場合の録音時間（秒）
const DEFAULT_DURATION_SECS: f64 = 5.0;

/// シンプルな録音ツール
#[derive(Parser, Debug)]
#[command(name = "silence-rec", version, about = "シンプルな録音ツール (無音検出で自動停止)")]
struct Cli {
    /// 録音時間（秒）。--silence-detect と併用した場合は上限になる
    #[arg(short = 'd', long)]
    duration: Option<f64>,

    /// 出力ファイル名 (32ビット浮動小数点 WAV)
    #[arg(short = 'o', long, default_value = "recording0.wav")]
    outfile: PathBuf,

    /// 16ビット PCM で保存するファイル名
    #[arg(long, default_value = "recording1.wav")]
    pcm16_outfile: PathBuf,

    /// 16ビット PCM のファイルを保存しない
    #[arg(long)]
    no_pcm16: bool,

    /// サンプリングレート (Hz)
    #[arg(short = 'r', long, default_value_t = 44100)]
    samplerate: u32,

    /// チャンネル数
    #[arg(short = 'c', long, default_value_t = 2, value_parser = clap::value_parser!(u16).range(1..=2))]
    channels: u16,

    /// 入力デバイス (番号または名前。--list-devices で確認)
    #[arg(long)]
    device: Option<String>,

    /// 入力デバイス一覧を表示して終了
    #[arg(long)]
    list_devices: bool,

    /// 保存後に録音を再生する
    #[arg(long)]
    play: bool,

    /// 再生に使う出力デバイス名 (省略時はデフォルト)
    #[arg(long)]
    output_device: Option<String>,

    /// 無音を検出したら自動的に停止する
    #[arg(long)]
    silence_detect: bool,

    /// この RMS を下回ったブロックを無音とみなす
    #[arg(long, default_value_t = 0.01)]
    silence_threshold: f32,

    /// 録音を停止するまでの連続無音時間（秒）
    #[arg(long, default_value_t = 1.0)]
    silence_duration: f64,

    /// 無音判定を行うブロックの長さ（秒）
    #[arg(long, default_value_t = 0.1)]
    block_duration: f64,
}

impl Cli {
    /// コマンドライン引数から録音設定を作成
    ///
    /// 無音検出も録音時間も指定されていない場合は `prompt` で録音時間を尋ねる。
    fn capture_config(&self, prompt: impl FnOnce() -> f64) -> CaptureConfig {
        let base = CaptureConfig {
            device_id: self.device.clone().unwrap_or_else(|| "default".to_string()),
            sample_rate: self.samplerate,
            channels: self.channels,
            block_duration_secs: self.block_duration,
            silence_threshold: self.silence_threshold,
            silence_duration_secs: self.silence_duration,
            silence_detect: self.silence_detect,
            max_duration_secs: self.duration,
        };

        if self.silence_detect || self.duration.is_some() {
            base
        } else {
            CaptureConfig {
                max_duration_secs: Some(prompt()),
                ..base
            }
        }
    }

    /// 保存先の一覧
    fn outputs(&self) -> Vec<(PathBuf, WavEncoding)> {
        let mut outputs = vec![(self.outfile.clone(), WavEncoding::Float32)];
        if !self.no_pcm16 {
            outputs.push((self.pcm16_outfile.clone(), WavEncoding::Pcm16));
        }
        outputs
    }
}

/// 標準出力に出す録音結果の要約
#[derive(Debug, Serialize)]
struct CaptureSummary {
    finished_at: String,
    reason: TerminationReason,
    frames: usize,
    duration_secs: f64,
    sample_rate: u32,
    channels: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<CaptureStats>,
    files: Vec<SavedFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct SavedFile {
    path: String,
    encoding: WavEncoding,
}

fn main() -> Result<()> {
    // ロガーを初期化
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    // デバイス一覧表示モード
    if cli.list_devices {
        CpalInput::list_devices()?;
        return Ok(());
    }

    let config = cli.capture_config(prompt_duration);
    log::info!("設定: {:?}", config);

    let controller = CaptureController::new(config)?;

    // Ctrl+C ハンドラを設定
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        log::info!("停止シグナルを受信しました...");
        handler_token.cancel();
    })
    .context("Ctrl+C ハンドラの設定に失敗")?;

    log::info!("録音を開始しました (Ctrl+C で停止)");

    let handle = controller
        .spawn(CpalInput, cancel)
        .context("録音スレッドの起動に失敗")?;
    let result = handle
        .join()
        .map_err(|_| anyhow::anyhow!("録音スレッドが異常終了しました"))?;

    let (audio, reason, stats, failure) = match result {
        Ok(outcome) => (outcome.audio, outcome.reason, Some(outcome.stats), None),
        Err(CaptureError::Device { source, partial }) => {
            (partial, TerminationReason::DeviceError, None, Some(source))
        }
        Err(e @ CaptureError::Config(_)) => return Err(e.into()),
    };

    // 保存失敗は他の出力を妨げない
    let files = save_outputs(&cli.outputs(), &audio);

    if cli.play {
        if let Err(e) = play(cli.output_device.as_deref(), &audio) {
            log::error!("再生中にエラー: {:#}", e);
        }
    }

    let summary = CaptureSummary {
        finished_at: chrono::Local::now().to_rfc3339(),
        reason,
        frames: audio.frames(),
        duration_secs: audio.duration_secs(),
        sample_rate: audio.sample_rate(),
        channels: audio.channels(),
        stats,
        files,
        error: failure.as_ref().map(|e| e.to_string()),
    };
    if let Ok(json) = serde_json::to_string(&summary) {
        println!("{}", json);
    }

    if let Some(e) = failure {
        return Err(anyhow::Error::new(e).context("録音中にデバイスエラーが発生しました"));
    }

    log::info!("silence-rec を終了しました");
    Ok(())
}

fn save_outputs(outputs: &[(PathBuf, WavEncoding)], audio: &CapturedAudio) -> Vec<SavedFile> {
    let mut saved = Vec::new();
    for (path, encoding) in outputs {
        match WavWriter::write(path, audio, *encoding) {
            Ok(_) => saved.push(SavedFile {
                path: path.display().to_string(),
                encoding: *encoding,
            }),
            Err(e) => log::error!("{:?} の保存に失敗: {:#}", path, e),
        }
    }
    saved
}

fn play(device_name: Option<&str>, audio: &CapturedAudio) -> Result<()> {
    let output = AudioOutput::new(device_name)?;
    output.play_blocking(audio)
}

/// 録音時間を標準入力から尋ねる
fn prompt_duration() -> f64 {
    println!(
        "何秒録音しますか？ (Enter でデフォルトの {} 秒)",
        DEFAULT_DURATION_SECS
    );
    let _ = io::stdout().flush();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => parse_duration_input(&line),
        Err(_) => DEFAULT_DURATION_SECS,
    }
}

/// 入力された録音時間を解釈する。空や不正な値はデフォルトにする。
fn parse_duration_input(input: &str) -> f64 {
    match input.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => secs as f64,
        _ => DEFAULT_DURATION_SECS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("silence-rec").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_duration_input() {
        assert_eq!(parse_duration_input("12\n"), 12.0);
        assert_eq!(parse_duration_input("\n"), DEFAULT_DURATION_SECS);
        assert_eq!(parse_duration_input("abc"), DEFAULT_DURATION_SECS);
        assert_eq!(parse_duration_input("0"), DEFAULT_DURATION_SECS);
    }

    #[test]
    fn test_silence_detect_config() {
        let cli = parse(&[
            "--silence-detect",
            "-r",
            "16000",
            "-c",
            "1",
            "--silence-threshold",
            "0.02",
            "--silence-duration",
            "0.5",
            "--device",
            "3",
        ]);
        let config = cli.capture_config(|| panic!("should not prompt"));

        assert!(config.silence_detect);
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.channels, 1);
        assert_eq!(config.silence_threshold, 0.02);
        assert_eq!(config.required_silent_blocks(), 5);
        assert_eq!(config.device_id, "3");
        assert!(config.max_duration_secs.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_without_silence_detect() {
        let cli = parse(&["-d", "3"]);
        let config = cli.capture_config(|| panic!("should not prompt"));

        assert!(!config.silence_detect);
        assert_eq!(config.max_duration_secs, Some(3.0));
        assert_eq!(config.device_id, "default");
    }

    #[test]
    fn test_prompts_when_no_mode_given() {
        let cli = parse(&[]);
        let config = cli.capture_config(|| 7.0);

        assert!(!config.silence_detect);
        assert_eq!(config.max_duration_secs, Some(7.0));
    }

    #[test]
    fn test_output_device() {
        let cli = parse(&["--play", "--output-device", "USB Audio"]);
        assert!(cli.play);
        assert_eq!(cli.output_device.as_deref(), Some("USB Audio"));

        assert!(parse(&["--play"]).output_device.is_none());
    }

    #[test]
    fn test_rejects_unsupported_channels() {
        assert!(Cli::try_parse_from(["silence-rec", "-c", "3"]).is_err());
    }

    #[test]
    fn test_outputs() {
        let cli = parse(&["-o", "a.wav", "--pcm16-outfile", "b.wav"]);
        let outputs = cli.outputs();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[1], (PathBuf::from("b.wav"), WavEncoding::Pcm16));

        let cli = parse(&["--no-pcm16"]);
        assert_eq!(cli.outputs(), vec![(PathBuf::from("recording0.wav"), WavEncoding::Float32)]);
    }
}
