use crate::config::CaptureConfig;
use crate::error::DeviceError;
use crate::types::AudioBlock;

/// 入力ストリームを開くためのパラメータ
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamParams {
    pub device_id: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub block_frames: usize,
}

impl StreamParams {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            device_id: config.device_id.clone(),
            sample_rate: config.sample_rate,
            channels: config.channels,
            block_frames: config.block_frames(),
        }
    }
}

/// `read_block` の結果
#[derive(Clone, Debug)]
pub struct BlockRead {
    pub block: AudioBlock,

    /// 上流でフレームが欠落したかどうか
    ///
    /// 致命的ではない。ブロックは届いた分だけで処理を続ける。
    pub overflowed: bool,
}

/// ライブ入力ストリームから固定長ブロックを読み出す
pub trait BlockReader {
    /// `frames` フレーム分のデータが揃うまでブロックする
    ///
    /// # Errors
    ///
    /// ストリームが失敗した場合 (切断、パラメータ不正など) に
    /// [`DeviceError`] を返す。
    fn read_block(&mut self, frames: usize) -> Result<BlockRead, DeviceError>;

    /// ストリームを解放する
    ///
    /// 複数回呼ばれても2回目以降は何もしない。
    fn close(&mut self);
}

/// 入力デバイスの抽象
///
/// 録音ループは特定のデバイス API ではなくこのトレイトにのみ依存する。
pub trait InputBackend {
    type Reader: BlockReader;

    fn open(&self, params: &StreamParams) -> Result<Self::Reader, DeviceError>;
}

/// 開いている入力ストリーム
///
/// どの経路でスコープを抜けても `close` がちょうど1回呼ばれる。
pub struct OpenStream<R: BlockReader> {
    reader: Option<R>,
}

impl<R: BlockReader> OpenStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
        }
    }

    pub fn read_block(&mut self, frames: usize) -> Result<BlockRead, DeviceError> {
        match self.reader.as_mut() {
            Some(reader) => reader.read_block(frames),
            None => Err(DeviceError::Disconnected),
        }
    }

    pub fn close(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.close();
            log::debug!("入力ストリームを解放しました");
        }
    }
}

impl<R: BlockReader> Drop for OpenStream<R> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingReader {
        closes: Arc<AtomicUsize>,
    }

    impl BlockReader for CountingReader {
        fn read_block(&mut self, frames: usize) -> Result<BlockRead, DeviceError> {
            Ok(BlockRead {
                block: AudioBlock::new(vec![0.0; frames], 1),
                overflowed: false,
            })
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_close_once_on_drop() {
        let closes = Arc::new(AtomicUsize::new(0));
        {
            let mut stream = OpenStream::new(CountingReader {
                closes: closes.clone(),
            });
            assert_eq!(stream.read_block(160).unwrap().block.frames(), 160);
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explicit_close_then_drop() {
        let closes = Arc::new(AtomicUsize::new(0));
        {
            let mut stream = OpenStream::new(CountingReader {
                closes: closes.clone(),
            });
            stream.close();
            stream.close();
            assert_eq!(stream.read_block(160).unwrap_err(), DeviceError::Disconnected);
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_params_from_config() {
        let config = CaptureConfig {
            device_id: "2".to_string(),
            sample_rate: 16000,
            channels: 1,
            block_duration_secs: 0.05,
            ..CaptureConfig::default()
        };
        let params = StreamParams::from_config(&config);
        assert_eq!(params.device_id, "2");
        assert_eq!(params.block_frames, 800);
        assert_eq!(params.channels, 1);
    }
}
