use crate::types::{CapturedAudio, SampleF32};
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender};
use std::time::Duration;

/// 再生完了を待つ際の余裕時間
const PLAYBACK_GRACE: Duration = Duration::from_secs(2);

/// 録音結果の再生
pub struct AudioOutput {
    device: Device,
}

impl AudioOutput {
    /// 新しいAudioOutputを作成
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        // デバイスを選択
        let device = if let Some(name) = device_name {
            host.output_devices()?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| anyhow::anyhow!("出力デバイス '{}' が見つかりません", name))?
        } else {
            host.default_output_device()
                .ok_or_else(|| anyhow::anyhow!("デフォルト出力デバイスが見つかりません"))?
        };

        log::info!("出力デバイス: {}", device.name()?);

        Ok(Self { device })
    }

    /// 録音結果を再生し、終わるまでブロックする
    pub fn play_blocking(&self, audio: &CapturedAudio) -> Result<()> {
        if audio.is_empty() {
            log::info!("再生する音声がありません");
            return Ok(());
        }

        let default_config = self
            .device
            .default_output_config()
            .context("デフォルト出力設定が取得できません")?;

        let config = StreamConfig {
            channels: audio.channels(),
            sample_rate: cpal::SampleRate(audio.sample_rate()),
            buffer_size: cpal::BufferSize::Default,
        };

        log::info!(
            "再生開始: {}Hz, {}ch, {:.2}秒",
            config.sample_rate.0,
            config.channels,
            audio.duration_secs()
        );

        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        let samples = audio.samples().to_vec();

        // デバイスのサンプルフォーマットに応じてストリームを構築
        let stream = match default_config.sample_format() {
            SampleFormat::F32 => self.build_stream::<f32>(&config, samples, done_tx)?,
            SampleFormat::I16 => self.build_stream::<i16>(&config, samples, done_tx)?,
            SampleFormat::U16 => self.build_stream::<u16>(&config, samples, done_tx)?,
            other => anyhow::bail!("サポートされていないサンプルフォーマット: {:?}", other),
        };

        stream.play().context("ストリームの再生開始に失敗")?;

        let timeout = Duration::from_secs_f64(audio.duration_secs()) + PLAYBACK_GRACE;
        Self::wait_for_completion(&done_rx, timeout);

        drop(stream);
        log::info!("再生を終了しました");
        Ok(())
    }

    fn wait_for_completion(done_rx: &Receiver<()>, timeout: Duration) {
        if done_rx.recv_timeout(timeout).is_err() {
            log::warn!("再生完了の通知が {:.1} 秒以内に届きませんでした", timeout.as_secs_f64());
        }
    }

    /// 指定されたサンプルフォーマットで出力ストリームを構築
    fn build_stream<T>(
        &self,
        config: &StreamConfig,
        samples: Vec<SampleF32>,
        done_tx: Sender<()>,
    ) -> Result<Stream>
    where
        T: SizedSample + Sample + FromSample<f32> + Send + 'static,
    {
        let mut position = 0usize;

        let stream = self
            .device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if fill_output(data, &samples, &mut position) {
                        let _ = done_tx.try_send(());
                    }
                },
                move |err| {
                    log::error!("出力ストリームエラー: {}", err);
                },
                None,
            )
            .context("出力ストリームの構築に失敗")?;

        Ok(stream)
    }
}

/// 出力バッファに次のサンプルを書き込み、足りない分は無音で埋める
///
/// 呼び出し時点で全サンプルを渡し終えていた場合に `true` を返す。
fn fill_output<T>(data: &mut [T], samples: &[SampleF32], position: &mut usize) -> bool
where
    T: Sample + FromSample<f32>,
{
    let finished = *position >= samples.len();
    let count = samples.len().saturating_sub(*position).min(data.len());

    for (out, &sample) in data.iter_mut().zip(&samples[*position..*position + count]) {
        *out = T::from_sample(sample);
    }
    // 残りは無音
    for out in data.iter_mut().skip(count) {
        *out = T::EQUILIBRIUM;
    }
    *position += count;

    finished
}
