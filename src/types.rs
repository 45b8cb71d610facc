use serde::Serialize;

/// 正規化済みの浮動小数点サンプル
///
/// -1.0 から 1.0 の範囲の値を取る。デバイス固有のフォーマット
/// (i16, u16, i32) は入力コールバック内でこの型に変換される。
pub type SampleF32 = f32;

/// オーディオフォーマット情報
///
/// # Examples
///
/// ```
/// # use silence_rec::types::AudioFormat;
/// let format = AudioFormat {
///     sample_rate: 44100,
///     channels: 2,
/// };
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AudioFormat {
    /// サンプリングレート (Hz)
    pub sample_rate: u32,

    /// チャンネル数
    ///
    /// 1: モノラル, 2: ステレオ
    pub channels: u16,
}

/// 入力ストリームから読み出した1ブロック分の音声
///
/// サンプルはフレーム順にインターリーブされている。
/// 生成後は変更できない。
///
/// # Examples
///
/// ```
/// # use silence_rec::types::AudioBlock;
/// let block = AudioBlock::new(vec![0.0; 3200], 2); // 1600フレーム, ステレオ
/// assert_eq!(block.frames(), 1600);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBlock {
    samples: Vec<SampleF32>,
    channels: u16,
}

impl AudioBlock {
    /// 新しいブロックを作成
    ///
    /// 端数のサンプル (フレームに満たない末尾) は切り捨てる。
    pub fn new(mut samples: Vec<SampleF32>, channels: u16) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);
        Self { samples, channels }
    }

    /// インターリーブされたサンプル列
    pub fn samples(&self) -> &[SampleF32] {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// フレーム数 (サンプル数 / チャンネル数)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub(crate) fn into_samples(self) -> Vec<SampleF32> {
        self.samples
    }
}

/// ブロックの判定結果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockClass {
    /// RMS が閾値未満
    Silent,

    /// RMS が閾値以上
    Active,
}

/// 録音が終了した理由
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// 無音ブロックが規定数連続した
    Silence,

    /// ユーザーによる中断 (Ctrl+C など)
    UserCancelled,

    /// 指定された録音時間に達した
    DurationReached,

    /// デバイスエラーで停止した
    DeviceError,
}

impl TerminationReason {
    /// ログ用の短いラベル
    pub fn label(&self) -> &'static str {
        match self {
            TerminationReason::Silence => "silence",
            TerminationReason::UserCancelled => "user_cancelled",
            TerminationReason::DurationReached => "duration_reached",
            TerminationReason::DeviceError => "device_error",
        }
    }
}

/// 録音セッションのライフサイクル状態
///
/// `Running` 以外はすべて終端状態。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Stopped(TerminationReason),
}

/// 録音結果
///
/// 連結済みのサンプルバッファとフォーマット情報。
/// 1セッションにつき一度だけ生成され、所有権ごと書き出し側・再生側へ渡される。
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedAudio {
    samples: Vec<SampleF32>,
    format: AudioFormat,
}

impl CapturedAudio {
    pub(crate) fn new(samples: Vec<SampleF32>, format: AudioFormat) -> Self {
        Self { samples, format }
    }

    /// フレーム数ゼロの録音結果
    pub fn empty(format: AudioFormat) -> Self {
        Self::new(Vec::new(), format)
    }

    /// インターリーブされたサンプル列
    pub fn samples(&self) -> &[SampleF32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<SampleF32> {
        self.samples
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.format.channels
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels.max(1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 録音時間（秒）
    pub fn duration_secs(&self) -> f64 {
        if self.format.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.format.sample_rate as f64
    }
}
