//! Sample-format plumbing between device audio and session audio.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Resampler chunk size in input frames. Blocks shorter than this are held
/// until enough samples accumulate.
const RESAMPLER_CHUNK: usize = 1024;

/// Converts a slice of f32 samples to i16 PCM.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Converts a slice of i16 PCM samples to normalized f32.
pub fn pcm16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Averages interleaved multi-channel audio down to mono.
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Mean absolute amplitude of a block, clamped to [0, 1]. Used as the
/// microphone level metric.
pub fn mean_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s.abs()).sum();
    (sum / samples.len() as f32).clamp(0.0, 1.0)
}

/// Creates a mono resampler between two sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Stateful converter from one mono f32 rate to another rate's PCM16.
///
/// When the rates already match this is a plain quantizer; otherwise input
/// is buffered into fixed-size chunks for the resampler, so output lags the
/// input by less than one chunk.
pub struct SessionFormatConverter {
    resampler: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
}

impl SessionFormatConverter {
    pub fn new(in_rate: u32, out_rate: u32) -> anyhow::Result<Self> {
        let resampler = if in_rate == out_rate {
            None
        } else {
            Some(create_resampler(
                in_rate as f64,
                out_rate as f64,
                RESAMPLER_CHUNK,
            )?)
        };
        Ok(Self {
            resampler,
            pending: Vec::new(),
        })
    }

    /// Feed mono f32 samples at the input rate; returns whatever complete
    /// output this made available, as PCM16 at the output rate.
    pub fn push(&mut self, samples: &[f32]) -> anyhow::Result<Vec<i16>> {
        let Some(resampler) = &mut self.resampler else {
            return Ok(f32_to_pcm16(samples));
        };

        self.pending.extend_from_slice(samples);
        let mut out = Vec::new();
        while self.pending.len() >= RESAMPLER_CHUNK {
            let chunk: Vec<f32> = self.pending.drain(..RESAMPLER_CHUNK).collect();
            let resampled = resampler.process(&[chunk], None)?;
            out.extend(f32_to_pcm16(&resampled[0]));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn pcm16_conversion_is_symmetric_and_clamped() {
        let converted = f32_to_pcm16(&[0.0, 0.5, 1.0, -1.0, 2.0, -2.0]);
        assert_eq!(converted[0], 0);
        assert_eq!(converted[2], i16::MAX);
        assert_eq!(converted[4], i16::MAX);
        assert_eq!(converted[5], i16::MIN);

        let back = pcm16_to_f32(&converted);
        assert_abs_diff_eq!(back[1], 0.5, epsilon = 0.001);
        assert_abs_diff_eq!(back[2], 1.0, epsilon = 0.001);
    }

    #[test]
    fn downmix_averages_channels() {
        let stereo = [1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(downmix_to_mono(&stereo, 2), vec![0.5, 0.5, 0.0]);

        let mono = [0.25, -0.25];
        assert_eq!(downmix_to_mono(&mono, 1), mono.to_vec());
    }

    #[test]
    fn level_is_mean_absolute_amplitude_in_unit_range() {
        assert_eq!(mean_level(&[]), 0.0);
        assert_abs_diff_eq!(mean_level(&[0.5, -0.5]), 0.5, epsilon = 0.0001);
        // Clipped input still reports at most 1.0.
        assert_eq!(mean_level(&[3.0, -3.0]), 1.0);
    }

    #[test]
    fn matching_rates_pass_straight_through() {
        let mut converter = SessionFormatConverter::new(24_000, 24_000).unwrap();
        let out = converter.push(&[0.0, 0.5, -0.5]).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], 0);
    }

    #[test]
    fn downsampling_halves_the_sample_count() {
        let mut converter = SessionFormatConverter::new(48_000, 24_000).unwrap();
        let input = vec![0.1f32; 2048];
        let out = converter.push(&input).unwrap();
        // Two full chunks at ratio 0.5; allow for resampler edge handling.
        assert!(out.len() > 900 && out.len() < 1100, "got {}", out.len());
    }

    #[test]
    fn short_blocks_are_held_until_a_chunk_fills() {
        let mut converter = SessionFormatConverter::new(48_000, 24_000).unwrap();
        assert!(converter.push(&vec![0.0f32; 100]).unwrap().is_empty());
        assert!(converter.push(&vec![0.0f32; 100]).unwrap().is_empty());
        let out = converter.push(&vec![0.0f32; 1000]).unwrap();
        assert!(!out.is_empty());
    }
}
