use crate::error::DeviceError;
use crate::input::{BlockRead, BlockReader, InputBackend, StreamParams};
use crate::types::{AudioBlock, SampleF32};
use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SizedSample};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// コールバックとリーダー間のキューに積めるバッファ数
const CALLBACK_QUEUE_CAPACITY: usize = 256;

/// データが届かないまま待つ最短時間
const MIN_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// cpal を使った入力デバイス
///
/// ホストは `open` のたびに取得するため、録音スレッドへそのまま渡せる。
#[derive(Clone, Copy, Debug, Default)]
pub struct CpalInput;

impl CpalInput {
    /// デバイス一覧を表示
    pub fn list_devices() -> Result<()> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());

        println!("利用可能な入力デバイス:");
        println!();

        for (idx, device) in host.input_devices()?.enumerate() {
            let name = device.name()?;
            let marker = if default_name.as_deref() == Some(name.as_str()) {
                " (デフォルト)"
            } else {
                ""
            };
            println!("  [{}] {}{}", idx, name, marker);

            device.supported_input_configs()?.for_each(|config_range| {
                println!(
                    "      フォーマット: {:?}, {}-{}Hz, {}ch",
                    config_range.sample_format(),
                    config_range.min_sample_rate().0,
                    config_range.max_sample_rate().0,
                    config_range.channels()
                );
            });
            println!();
        }

        Ok(())
    }

    /// デバイスIDからデバイスを選択
    ///
    /// "default"、デバイス一覧の番号、デバイス名の順に解釈する。
    fn select_device(device_id: &str) -> Result<cpal::Device, DeviceError> {
        let host = cpal::default_host();

        if device_id == "default" {
            return host
                .default_input_device()
                .ok_or(DeviceError::NoDefaultDevice);
        }

        let mut devices = host
            .input_devices()
            .map_err(|e| DeviceError::NotFound(format!("{}: {}", device_id, e)))?;

        if let Ok(index) = device_id.parse::<usize>() {
            return devices
                .nth(index)
                .ok_or_else(|| DeviceError::NotFound(format!("番号 {}", index)));
        }

        devices
            .find(|d| d.name().ok().as_deref() == Some(device_id))
            .ok_or_else(|| DeviceError::NotFound(device_id.to_string()))
    }

    /// ストリームを構築
    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        samples_tx: Sender<Vec<SampleF32>>,
        error_tx: Sender<String>,
        dropped: Arc<AtomicBool>,
    ) -> Result<cpal::Stream, DeviceError>
    where
        T: SizedSample + Sample + Send + 'static,
        <T as Sample>::Float: Into<f32>,
    {
        let dropped_in_error = dropped.clone();

        let data_callback = move |data: &[T], _info: &cpal::InputCallbackInfo| {
            let samples: Vec<SampleF32> = data
                .iter()
                .map(|&s| {
                    let f: f32 = s.to_float_sample().into();
                    f.clamp(-1.0, 1.0)
                })
                .collect();

            // 非同期送信（ブロッキングしない）
            match samples_tx.try_send(samples) {
                Ok(_) => {}
                Err(TrySendError::Full(_)) => {
                    dropped.store(true, Ordering::Release);
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        };

        let error_callback = move |err: cpal::StreamError| {
            if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                log::error!("ストリームエラー: {}", err);
                let _ = error_tx.try_send(err.to_string());
            } else {
                // xrun などはデータ欠落として扱う
                log::warn!("ストリーム警告: {}", err);
                dropped_in_error.store(true, Ordering::Release);
            }
        };

        device
            .build_input_stream(config, data_callback, error_callback, None)
            .map_err(|e| DeviceError::StreamBuild(e.to_string()))
    }
}

impl InputBackend for CpalInput {
    type Reader = CpalBlockReader;

    fn open(&self, params: &StreamParams) -> Result<CpalBlockReader, DeviceError> {
        let device = Self::select_device(&params.device_id)?;
        let device_name = device.name().unwrap_or_else(|_| "不明なデバイス".to_string());
        log::info!("入力デバイス: {}", device_name);

        let default_config = device
            .default_input_config()
            .map_err(|e| DeviceError::Config(e.to_string()))?;

        log::info!(
            "デバイス設定: {:?}, {}Hz, {}ch",
            default_config.sample_format(),
            default_config.sample_rate().0,
            default_config.channels()
        );

        let stream_config = cpal::StreamConfig {
            channels: params.channels,
            sample_rate: cpal::SampleRate(params.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (samples_tx, samples_rx) = crossbeam_channel::bounded(CALLBACK_QUEUE_CAPACITY);
        let (error_tx, error_rx) = crossbeam_channel::bounded(1);
        let dropped = Arc::new(AtomicBool::new(false));

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => Self::build_stream::<f32>(
                &device,
                &stream_config,
                samples_tx,
                error_tx,
                dropped.clone(),
            )?,
            cpal::SampleFormat::I16 => Self::build_stream::<i16>(
                &device,
                &stream_config,
                samples_tx,
                error_tx,
                dropped.clone(),
            )?,
            cpal::SampleFormat::U16 => Self::build_stream::<u16>(
                &device,
                &stream_config,
                samples_tx,
                error_tx,
                dropped.clone(),
            )?,
            cpal::SampleFormat::I32 => Self::build_stream::<i32>(
                &device,
                &stream_config,
                samples_tx,
                error_tx,
                dropped.clone(),
            )?,
            other => return Err(DeviceError::UnsupportedFormat(format!("{:?}", other))),
        };

        stream
            .play()
            .map_err(|e| DeviceError::StreamStart(e.to_string()))?;

        let block_secs = params.block_frames as f64 / params.sample_rate as f64;
        let read_timeout = MIN_READ_TIMEOUT.max(Duration::from_secs_f64(block_secs * 4.0));

        log::info!(
            "音声入力ストリームを開始しました ({}Hz, {}ch, {}フレーム/ブロック)",
            params.sample_rate,
            params.channels,
            params.block_frames
        );

        Ok(CpalBlockReader {
            stream: Some(stream),
            receiver: CallbackReceiver::new(
                samples_rx,
                error_rx,
                dropped,
                params.channels,
                read_timeout,
            ),
        })
    }
}

/// コールバックから届くバッファを受け取り、ブロックに切り出す
///
/// コールバックから届く可変長のバッファを溜め込み、
/// 要求されたフレーム数に達した時点でブロックとして返す。
/// 余ったサンプルは次の読み出しに回す。
struct CallbackReceiver {
    samples_rx: Receiver<Vec<SampleF32>>,
    error_rx: Receiver<String>,
    dropped: Arc<AtomicBool>,
    pending: VecDeque<SampleF32>,
    channels: u16,
    read_timeout: Duration,
}

impl CallbackReceiver {
    fn new(
        samples_rx: Receiver<Vec<SampleF32>>,
        error_rx: Receiver<String>,
        dropped: Arc<AtomicBool>,
        channels: u16,
        read_timeout: Duration,
    ) -> Self {
        Self {
            samples_rx,
            error_rx,
            dropped,
            pending: VecDeque::new(),
            channels,
            read_timeout,
        }
    }

    fn read_block(&mut self, frames: usize) -> Result<BlockRead, DeviceError> {
        let needed = frames * self.channels as usize;

        while self.pending.len() < needed {
            crossbeam_channel::select! {
                recv(self.error_rx) -> msg => {
                    return Err(match msg {
                        Ok(message) => DeviceError::Stream(message),
                        Err(_) => DeviceError::Disconnected,
                    });
                }
                recv(self.samples_rx) -> msg => match msg {
                    Ok(samples) => self.pending.extend(samples),
                    Err(_) => return Err(DeviceError::Disconnected),
                },
                default(self.read_timeout) => {
                    return Err(DeviceError::Timeout(self.read_timeout));
                }
            }
        }

        let samples: Vec<SampleF32> = self.pending.drain(..needed).collect();
        let overflowed = self.dropped.swap(false, Ordering::AcqRel);

        Ok(BlockRead {
            block: AudioBlock::new(samples, self.channels),
            overflowed,
        })
    }

    fn clear(&mut self) {
        self.pending.clear();
    }
}

/// cpal の入力ストリームからブロックを読み出すリーダー
pub struct CpalBlockReader {
    stream: Option<cpal::Stream>,
    receiver: CallbackReceiver,
}

impl BlockReader for CpalBlockReader {
    fn read_block(&mut self, frames: usize) -> Result<BlockRead, DeviceError> {
        if self.stream.is_none() {
            return Err(DeviceError::Disconnected);
        }
        self.receiver.read_block(frames)
    }

    /// ストリームを停止
    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::debug!("ストリームの一時停止に失敗: {}", e);
            }
            drop(stream);
            self.receiver.clear();
            log::info!("音声入力ストリームを停止しました");
        }
    }
}

impl Drop for CpalBlockReader {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        samples_tx: Sender<Vec<SampleF32>>,
        error_tx: Sender<String>,
        dropped: Arc<AtomicBool>,
        receiver: CallbackReceiver,
    }

    fn harness(channels: u16, read_timeout: Duration) -> Harness {
        let (samples_tx, samples_rx) = crossbeam_channel::bounded(CALLBACK_QUEUE_CAPACITY);
        let (error_tx, error_rx) = crossbeam_channel::bounded(1);
        let dropped = Arc::new(AtomicBool::new(false));
        let receiver =
            CallbackReceiver::new(samples_rx, error_rx, dropped.clone(), channels, read_timeout);
        Harness {
            samples_tx,
            error_tx,
            dropped,
            receiver,
        }
    }

    #[test]
    fn test_uneven_chunks_are_sliced_into_blocks() {
        let mut h = harness(2, Duration::from_secs(1));

        // 3 + 5 + 4 サンプル = ステレオ6フレーム
        h.samples_tx.send(vec![0.0, 0.1, 0.2]).unwrap();
        h.samples_tx.send(vec![0.3, 0.4, 0.5, 0.6, 0.7]).unwrap();
        h.samples_tx.send(vec![0.8, 0.9, 1.0, -1.0]).unwrap();

        let first = h.receiver.read_block(2).unwrap();
        assert_eq!(first.block.frames(), 2);
        assert_eq!(first.block.samples(), &[0.0f32, 0.1, 0.2, 0.3]);
        assert!(!first.overflowed);

        // 余りは次のブロックの先頭になる
        let second = h.receiver.read_block(3).unwrap();
        assert_eq!(second.block.frames(), 3);
        assert_eq!(second.block.samples(), &[0.4f32, 0.5, 0.6, 0.7, 0.8, 0.9]);
        assert_eq!(h.receiver.pending.len(), 2);
    }

    #[test]
    fn test_overflow_flags_next_block_only() {
        let mut h = harness(1, Duration::from_secs(1));

        h.samples_tx.send(vec![0.1; 4]).unwrap();
        assert!(!h.receiver.read_block(4).unwrap().overflowed);

        // 読み出しの間にキューが溢れた
        h.dropped.store(true, Ordering::Release);
        h.samples_tx.send(vec![0.1; 4]).unwrap();
        assert!(h.receiver.read_block(4).unwrap().overflowed);

        h.samples_tx.send(vec![0.1; 4]).unwrap();
        assert!(!h.receiver.read_block(4).unwrap().overflowed);
        assert!(!h.dropped.load(Ordering::Acquire));
    }

    #[test]
    fn test_stream_error_interrupts_partial_block() {
        let mut h = harness(1, Duration::from_secs(1));

        h.samples_tx.send(vec![0.5; 3]).unwrap();
        h.error_tx.send("device unplugged".to_string()).unwrap();

        let err = h.receiver.read_block(10).unwrap_err();
        assert_eq!(err, DeviceError::Stream("device unplugged".to_string()));
    }

    #[test]
    fn test_timeout_when_no_data_arrives() {
        let timeout = Duration::from_millis(20);
        let mut h = harness(1, timeout);

        h.samples_tx.send(vec![0.5; 3]).unwrap();

        let err = h.receiver.read_block(10).unwrap_err();
        assert_eq!(err, DeviceError::Timeout(timeout));
    }

    #[test]
    fn test_closed_callback_channel_is_disconnected() {
        let Harness {
            samples_tx,
            error_tx,
            mut receiver,
            ..
        } = harness(1, Duration::from_secs(1));
        drop(samples_tx);

        let err = receiver.read_block(1).unwrap_err();
        assert_eq!(err, DeviceError::Disconnected);
        drop(error_tx);
    }
}
