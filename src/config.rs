use crate::error::CaptureError;
use crate::types::SampleF32;
use serde::{Deserialize, Serialize};

/// 録音設定
///
/// デバイス・フォーマットと無音検出のパラメータをまとめたもの。
/// 録音開始後は変更されない。
///
/// # デフォルト値
///
/// - `device_id`: "default" (システムのデフォルトデバイス)
/// - `sample_rate`: 44100 Hz
/// - `channels`: 2 (ステレオ)
/// - `block_duration_secs`: 0.1 秒
/// - `silence_threshold`: 0.01 (RMS, 正規化済みサンプル基準)
/// - `silence_duration_secs`: 1.0 秒
/// - `silence_detect`: true
/// - `max_duration_secs`: なし
///
/// # 有効範囲
///
/// - `sample_rate` > 0
/// - `channels` は 1 または 2
/// - `silence_threshold` ≥ 0
/// - `silence_duration_secs` > 0, `block_duration_secs` > 0
/// - `max_duration_secs` は指定する場合 > 0
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CaptureConfig {
    /// "default"、デバイス番号、またはデバイス名
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_block_duration_secs")]
    pub block_duration_secs: f64,
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: f32,
    #[serde(default = "default_silence_duration_secs")]
    pub silence_duration_secs: f64,
    #[serde(default = "default_silence_detect")]
    pub silence_detect: bool,
    #[serde(default)]
    pub max_duration_secs: Option<f64>,
}

// Default functions
fn default_device_id() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_channels() -> u16 {
    2
}

fn default_block_duration_secs() -> f64 {
    0.1
}

fn default_silence_threshold() -> f32 {
    0.01
}

fn default_silence_duration_secs() -> f64 {
    1.0
}

fn default_silence_detect() -> bool {
    true
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            block_duration_secs: default_block_duration_secs(),
            silence_threshold: default_silence_threshold(),
            silence_duration_secs: default_silence_duration_secs(),
            silence_detect: default_silence_detect(),
            max_duration_secs: None,
        }
    }
}

/// 1ブロックのサンプル数の上限 (確保できる `Vec<SampleF32>` の最大長)
const MAX_BLOCK_SAMPLES: usize = isize::MAX as usize / std::mem::size_of::<SampleF32>();

// 0.3 / 0.1 のような割り算の丸め誤差を吸収する
const RATIO_EPSILON: f64 = 1e-9;

impl CaptureConfig {
    /// 固定時間録音用の設定 (無音検出なし)
    pub fn fixed_duration(duration_secs: f64) -> Self {
        Self {
            silence_detect: false,
            max_duration_secs: Some(duration_secs),
            ..Self::default()
        }
    }

    /// 設定値を検証
    ///
    /// # Errors
    ///
    /// 範囲外の値がある場合、または停止条件が1つもない場合に
    /// [`CaptureError::Config`] を返す。
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.sample_rate == 0 {
            return Err(CaptureError::config("sample_rate は 0 より大きい必要があります"));
        }
        if !matches!(self.channels, 1 | 2) {
            return Err(CaptureError::config(format!(
                "サポートされていないチャンネル数: {} (1 または 2)",
                self.channels
            )));
        }
        if !self.silence_threshold.is_finite() || self.silence_threshold < 0.0 {
            return Err(CaptureError::config(format!(
                "silence_threshold は 0 以上の有限値である必要があります: {}",
                self.silence_threshold
            )));
        }
        if !is_positive(self.block_duration_secs) {
            return Err(CaptureError::config(format!(
                "block_duration は 0 より大きい必要があります: {}",
                self.block_duration_secs
            )));
        }
        let block_samples =
            self.block_duration_secs * self.sample_rate as f64 * self.channels as f64;
        if block_samples > MAX_BLOCK_SAMPLES as f64 {
            return Err(CaptureError::config(format!(
                "block_duration が長すぎます: {} 秒",
                self.block_duration_secs
            )));
        }
        if !is_positive(self.silence_duration_secs) {
            return Err(CaptureError::config(format!(
                "silence_duration は 0 より大きい必要があります: {}",
                self.silence_duration_secs
            )));
        }
        if let Some(max) = self.max_duration_secs {
            if !is_positive(max) {
                return Err(CaptureError::config(format!(
                    "duration は 0 より大きい必要があります: {}",
                    max
                )));
            }
        }
        if !self.silence_detect && self.max_duration_secs.is_none() {
            return Err(CaptureError::config(
                "無音検出も録音時間も指定されていないため録音が終了しません",
            ));
        }
        Ok(())
    }

    /// 1ブロックあたりのフレーム数 (最低1)
    pub fn block_frames(&self) -> usize {
        let frames = (self.block_duration_secs * self.sample_rate as f64).round();
        (frames as usize).max(1)
    }

    /// 録音を停止するのに必要な連続無音ブロック数
    ///
    /// `ceil(silence_duration / block_duration)`、最低1。
    pub fn required_silent_blocks(&self) -> u32 {
        let ratio = self.silence_duration_secs / self.block_duration_secs;
        let blocks = (ratio - RATIO_EPSILON).ceil();
        if blocks.is_finite() && blocks >= 1.0 {
            blocks as u32
        } else {
            1
        }
    }

    /// 最大録音フレーム数 (録音時間が指定されている場合)
    pub fn max_frames(&self) -> Option<usize> {
        self.max_duration_secs
            .map(|secs| ((secs * self.sample_rate as f64).round() as usize).max(1))
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
