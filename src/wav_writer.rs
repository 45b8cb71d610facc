use crate::types::CapturedAudio;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::{Seek, Write};
use std::path::Path;

/// WAVファイルのサンプル形式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WavEncoding {
    /// 32ビット浮動小数点 (IEEE float)
    Float32,

    /// 16ビット整数 PCM
    Pcm16,
}

impl WavEncoding {
    fn spec(self, audio: &CapturedAudio) -> hound::WavSpec {
        match self {
            WavEncoding::Float32 => hound::WavSpec {
                channels: audio.channels(),
                sample_rate: audio.sample_rate(),
                bits_per_sample: 32,
                sample_format: hound::SampleFormat::Float,
            },
            WavEncoding::Pcm16 => hound::WavSpec {
                channels: audio.channels(),
                sample_rate: audio.sample_rate(),
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            },
        }
    }
}

/// 録音結果のWAVファイル書き出し
///
/// フォーマットの知識はここだけに閉じ込め、録音側はサンプル列を渡すだけにする。
pub struct WavWriter;

impl WavWriter {
    /// 録音結果をファイルに書き出す
    ///
    /// 出力先ディレクトリが存在しない場合は作成する。
    /// 書き込んだフレーム数を返す。
    pub fn write<P: AsRef<Path>>(
        path: P,
        audio: &CapturedAudio,
        encoding: WavEncoding,
    ) -> Result<usize> {
        let path = path.as_ref();

        // 出力ディレクトリが存在しない場合は作成
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("出力ディレクトリの作成に失敗: {:?}", parent))?;
            }
        }

        let writer = hound::WavWriter::create(path, encoding.spec(audio))
            .with_context(|| format!("WAVファイルの作成に失敗: {:?}", path))?;

        Self::write_samples(writer, audio, encoding)?;

        log::info!(
            "WAVファイル書き込み完了: {:?} ({:?}, {}フレーム, {:.2}秒)",
            path,
            encoding,
            audio.frames(),
            audio.duration_secs()
        );

        Ok(audio.frames())
    }

    fn write_samples<W: Write + Seek>(
        mut writer: hound::WavWriter<W>,
        audio: &CapturedAudio,
        encoding: WavEncoding,
    ) -> Result<()> {
        match encoding {
            WavEncoding::Float32 => {
                for &sample in audio.samples() {
                    writer
                        .write_sample(sample)
                        .with_context(|| "WAVファイルへのサンプル書き込みに失敗")?;
                }
            }
            WavEncoding::Pcm16 => {
                for &sample in audio.samples() {
                    writer
                        .write_sample(to_i16(sample))
                        .with_context(|| "WAVファイルへのサンプル書き込みに失敗")?;
                }
            }
        }

        writer
            .finalize()
            .with_context(|| "WAVファイルのファイナライズに失敗")?;
        Ok(())
    }
}

/// 正規化済みサンプルを16ビット整数に変換
fn to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AudioFormat;
    use tempfile::TempDir;

    fn stereo_audio() -> CapturedAudio {
        let samples: Vec<f32> = (0..1600)
            .flat_map(|i| {
                let s = (i as f32 * 0.1).sin() * 0.5;
                [s, -s]
            })
            .collect();
        CapturedAudio::new(
            samples,
            AudioFormat {
                sample_rate: 16000,
                channels: 2,
            },
        )
    }

    #[test]
    fn test_write_float32() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("recording0.wav");
        let audio = stereo_audio();

        let frames = WavWriter::write(&path, &audio, WavEncoding::Float32)?;
        assert_eq!(frames, 1600);

        let mut reader = hound::WavReader::open(&path)?;
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.bits_per_sample, 32);
        assert_eq!(spec.sample_format, hound::SampleFormat::Float);

        let samples: Vec<f32> = reader.samples::<f32>().collect::<std::result::Result<_, _>>()?;
        assert_eq!(samples, audio.samples());

        Ok(())
    }

    #[test]
    fn test_write_pcm16() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("recording1.wav");
        let audio = CapturedAudio::new(
            vec![0.0, 1.0, -1.0, 0.5, 2.0],
            AudioFormat {
                sample_rate: 44100,
                channels: 1,
            },
        );

        WavWriter::write(&path, &audio, WavEncoding::Pcm16)?;

        let mut reader = hound::WavReader::open(&path)?;
        assert_eq!(reader.spec().bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().collect::<std::result::Result<_, _>>()?;
        assert_eq!(samples, vec![0, i16::MAX, -i16::MAX, i16::MAX / 2, i16::MAX]);

        Ok(())
    }

    #[test]
    fn test_write_empty_audio() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("empty.wav");
        let audio = CapturedAudio::empty(AudioFormat {
            sample_rate: 16000,
            channels: 2,
        });

        assert_eq!(WavWriter::write(&path, &audio, WavEncoding::Float32)?, 0);

        let reader = hound::WavReader::open(&path)?;
        assert_eq!(reader.len(), 0);
        assert_eq!(reader.spec().channels, 2);

        Ok(())
    }

    #[test]
    fn test_creates_parent_directory() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("nested").join("out.wav");

        WavWriter::write(&path, &stereo_audio(), WavEncoding::Pcm16)?;
        assert!(path.exists());

        Ok(())
    }
}
