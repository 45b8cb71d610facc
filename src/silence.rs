use crate::types::{AudioBlock, BlockClass, SampleF32};

/// 無音検出器
///
/// RMS (Root Mean Square) ベースのブロック単位の判定器。
/// 内部状態を持たず、1ブロックだけを見て判定する。
/// 連続無音の計数は [`crate::capture`] 側の責務。
///
/// # アルゴリズム
///
/// 1. 全チャンネルのサンプルを平坦化したまま二乗平均を取る
/// 2. 平方根を取って RMS とする
/// 3. `rms < threshold` なら無音、それ以外 (閾値ちょうどを含む) は有音
///
/// サンプルは -1.0 ~ 1.0 に正規化済みであることを前提とするため、
/// 閾値はブロック長やチャンネル数に依存しない。
///
/// # Examples
///
/// ```
/// # use silence_rec::silence::SilenceDetector;
/// # use silence_rec::types::{AudioBlock, BlockClass};
/// let silence = AudioBlock::new(vec![0.0; 1600], 1);
/// assert_eq!(SilenceDetector::classify(&silence, 0.01), BlockClass::Silent);
///
/// let voice = AudioBlock::new(
///     (0..1600).map(|i| (i as f32 * 0.1).sin() * 0.5).collect(),
///     1,
/// );
/// assert_eq!(SilenceDetector::classify(&voice, 0.01), BlockClass::Active);
/// ```
pub struct SilenceDetector;

impl SilenceDetector {
    /// ブロックを無音/有音に分類
    pub fn classify(block: &AudioBlock, threshold: f32) -> BlockClass {
        Self::classify_rms(rms(block.samples()), threshold)
    }

    /// 計算済みの RMS を閾値と比較
    pub fn classify_rms(rms: f32, threshold: f32) -> BlockClass {
        if rms < threshold {
            BlockClass::Silent
        } else {
            BlockClass::Active
        }
    }
}

/// RMS (Root Mean Square) を計算
///
/// 空のサンプル列は 0.0 とする。
pub fn rms(samples: &[SampleF32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_of_squares: f64 = samples
        .iter()
        .map(|&s| {
            let s = s as f64;
            s * s
        })
        .sum();

    let mean_square = sum_of_squares / samples.len() as f64;
    mean_square.sqrt() as f32
}

/// RMSをデシベル (dBFS) に変換
///
/// ログ表示用。判定には使わない。
pub fn rms_to_db(rms: f32) -> f32 {
    if rms <= 0.0 {
        return -100.0; // 無音の場合の最小値
    }
    20.0 * rms.log10()
}
