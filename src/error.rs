use crate::types::CapturedAudio;
use std::time::Duration;
use thiserror::Error;

/// 入力デバイス・ストリームのエラー
///
/// いずれも致命的で、録音ループは即座に停止する。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("デフォルト入力デバイスが見つかりません")]
    NoDefaultDevice,

    #[error("デバイスが見つかりません: {0}")]
    NotFound(String),

    #[error("デバイス設定が取得できません: {0}")]
    Config(String),

    #[error("サポートされていないサンプルフォーマット: {0}")]
    UnsupportedFormat(String),

    #[error("入力ストリームの構築に失敗: {0}")]
    StreamBuild(String),

    #[error("ストリームの開始に失敗: {0}")]
    StreamStart(String),

    #[error("ストリームエラー: {0}")]
    Stream(String),

    #[error("入力ストリームが切断されました")]
    Disconnected,

    #[error("{0:?} 以内に音声データが届きませんでした")]
    Timeout(Duration),
}

/// 録音の失敗
///
/// 呼び出し側に失敗として返すのはこの2種類のみ。
/// ユーザー中断やオーバーフローは [`crate::types::TerminationReason`] や
/// 警告ログとして扱う。
#[derive(Error, Debug)]
pub enum CaptureError {
    /// 設定が不正。ストリームは開かれていない。
    #[error("設定が不正です: {0}")]
    Config(String),

    /// デバイスエラー。それまでに録音できた分を `partial` に保持する。
    #[error("デバイスエラーで録音を停止しました: {source}")]
    Device {
        source: DeviceError,
        partial: CapturedAudio,
    },
}

impl CaptureError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// デバイスエラー時に残った録音データ
    pub fn partial(&self) -> Option<&CapturedAudio> {
        match self {
            CaptureError::Config(_) => None,
            CaptureError::Device { partial, .. } => Some(partial),
        }
    }

    pub fn into_partial(self) -> Option<CapturedAudio> {
        match self {
            CaptureError::Config(_) => None,
            CaptureError::Device { partial, .. } => Some(partial),
        }
    }
}
