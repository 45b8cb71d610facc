use crate::types::{AudioBlock, AudioFormat, CapturedAudio};

/// 録音ブロックを1本のバッファに連結する
///
/// ブロックは到着順のままフレーム方向に連結される。
/// ブロックが1つもない場合もエラーにはせず、設定どおりのチャンネル数を持つ
/// 0フレームのバッファを返す。
pub struct BufferAssembler;

impl BufferAssembler {
    pub fn assemble(blocks: Vec<AudioBlock>, format: AudioFormat) -> CapturedAudio {
        if blocks.is_empty() {
            return CapturedAudio::empty(format);
        }

        let total_samples: usize = blocks.iter().map(|b| b.samples().len()).sum();
        let mut samples = Vec::with_capacity(total_samples);

        for block in blocks {
            // 入力側で常にセッションのチャンネル数で生成されるため一致するはず
            debug_assert_eq!(block.channels(), format.channels);
            samples.extend(block.into_samples());
        }

        CapturedAudio::new(samples, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MONO: AudioFormat = AudioFormat {
        sample_rate: 16000,
        channels: 1,
    };

    const STEREO: AudioFormat = AudioFormat {
        sample_rate: 48000,
        channels: 2,
    };

    #[test]
    fn test_empty_blocks() {
        let audio = BufferAssembler::assemble(Vec::new(), STEREO);
        assert_eq!(audio.frames(), 0);
        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.sample_rate(), 48000);
    }

    #[test]
    fn test_frame_count_is_sum_of_blocks() {
        let blocks = vec![
            AudioBlock::new(vec![0.0; 1600], 1),
            AudioBlock::new(vec![0.0; 800], 1),
            AudioBlock::new(vec![0.0; 1600], 1),
        ];
        let audio = BufferAssembler::assemble(blocks, MONO);
        assert_eq!(audio.frames(), 4000);
        assert_eq!(audio.channels(), 1);
    }

    #[test]
    fn test_preserves_arrival_order() {
        let blocks = vec![
            AudioBlock::new(vec![0.1, -0.1, 0.2, -0.2], 2),
            AudioBlock::new(vec![0.3, -0.3], 2),
            AudioBlock::new(vec![0.4, -0.4, 0.5, -0.5], 2),
        ];
        let audio = BufferAssembler::assemble(blocks, STEREO);
        assert_eq!(audio.frames(), 5);
        assert_eq!(
            audio.samples(),
            &[0.1, -0.1, 0.2, -0.2, 0.3, -0.3, 0.4, -0.4, 0.5, -0.5]
        );
    }

    #[test]
    fn test_empty_block_in_sequence() {
        let blocks = vec![
            AudioBlock::new(vec![0.5; 10], 1),
            AudioBlock::new(Vec::new(), 1),
            AudioBlock::new(vec![0.5; 10], 1),
        ];
        let audio = BufferAssembler::assemble(blocks, MONO);
        assert_eq!(audio.frames(), 20);
    }
}
