use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{Result, SequenceError};

/// Summary over every block the probe has seen.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProbeSummary {
    pub sample_rate: u32,
    pub duration_seconds: f32,
    pub peak: f32,
    /// Time of the loudest block.
    pub loudest_at: Option<f32>,
}

/// Measurements for a single block of rendered audio.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeFrame {
    pub time: f32,
    pub rms: f32,
    pub peak: f32,
    /// Normalised [0, 1] spectral centroid where 1.0 corresponds to the
    /// Nyquist frequency of the analysed block.
    pub spectral_centroid: f32,
}

/// Diagnostic meter for rendered sequence audio: loudness and brightness per
/// block. Used by the CLI probe and by tests that check a sweep really
/// sweeps.
pub struct AudioProbe {
    sample_rate: u32,
    summary: ProbeSummary,
    frames: Vec<ProbeFrame>,
    processed_samples: usize,
    loudest_rms: f32,
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl AudioProbe {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            summary: ProbeSummary {
                sample_rate,
                ..Default::default()
            },
            frames: Vec::new(),
            processed_samples: 0,
            loudest_rms: 0.0,
            fft_planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    pub fn summary(&self) -> &ProbeSummary {
        &self.summary
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> &[ProbeFrame] {
        &self.frames
    }

    /// Splits `samples` into `block_size` blocks and measures each one. A
    /// trailing partial block shorter than two samples is ignored.
    pub fn process_all(&mut self, samples: &[f32], block_size: usize) -> Result<&[ProbeFrame]> {
        if block_size < 2 {
            return Err(SequenceError::InvalidInput("probe blocks need at least two samples"));
        }
        let first = self.frames.len();
        for block in samples.chunks(block_size).filter(|block| block.len() >= 2) {
            self.process_block(block)?;
        }
        Ok(&self.frames[first..])
    }

    pub fn process_block(&mut self, samples: &[f32]) -> Result<ProbeFrame> {
        if samples.len() < 2 {
            return Err(SequenceError::InvalidInput(
                "analysis requires blocks with at least two samples",
            ));
        }

        let block_size = samples.len();
        let sample_rate = self.sample_rate.max(1) as f32;
        let start_time = self.processed_samples as f32 / sample_rate;
        let end_time = (self.processed_samples + block_size) as f32 / sample_rate;
        let timestamp = start_time + (end_time - start_time) * 0.5;

        let rms = compute_rms(samples);
        let peak = samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
        let centroid_hz = self.compute_spectral_centroid(samples)?;
        let nyquist = sample_rate * 0.5;
        let spectral_centroid = (centroid_hz / nyquist).clamp(0.0, 1.0);

        self.processed_samples += block_size;
        self.summary.duration_seconds = self.summary.duration_seconds.max(end_time);
        self.summary.peak = self.summary.peak.max(peak);
        if rms > self.loudest_rms {
            self.loudest_rms = rms;
            self.summary.loudest_at = Some(timestamp);
        }

        let frame = ProbeFrame {
            time: timestamp,
            rms,
            peak,
            spectral_centroid,
        };
        self.frames.push(frame.clone());
        Ok(frame)
    }

    fn compute_spectral_centroid(&mut self, samples: &[f32]) -> Result<f32> {
        let len = samples.len();
        let sample_rate = self.sample_rate as f32;
        let fft = self.prepare_fft(len);

        for (index, value) in samples.iter().enumerate() {
            fft.input[index] = *value * hann_value(index, len);
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let mut magnitude_sum = 0.0;
        let mut weighted_sum = 0.0;
        let bin_hz = sample_rate / len as f32;

        for (i, bin) in fft.spectrum.iter().enumerate() {
            let magnitude = bin.norm();
            magnitude_sum += magnitude;
            weighted_sum += magnitude * (i as f32 * bin_hz);
        }

        if magnitude_sum <= f32::EPSILON {
            Ok(0.0)
        } else {
            Ok(weighted_sum / magnitude_sum)
        }
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        if self.fft.as_ref().map_or(true, |fft| fft.size != size) {
            self.fft = None;
        }

        let planner = &mut self.fft_planner;
        self.fft.get_or_insert_with(|| {
            let plan = planner.plan_fft_forward(size);
            let scratch = plan.make_scratch_vec();
            let spectrum = plan.make_output_vec();
            let input = plan.make_input_vec();
            FftResources {
                size,
                plan,
                scratch,
                spectrum,
                input,
            }
        })
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for AudioProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioProbe")
            .field("sample_rate", &self.sample_rate)
            .field("summary", &self.summary)
            .field("frames", &self.frames.len())
            .field("processed_samples", &self.processed_samples)
            .finish()
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

fn compute_rms(samples: &[f32]) -> f32 {
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{AudioContext, OfflineContext, Sound},
        AudioConfig,
    };

    #[test]
    fn silence_measures_zero() {
        let mut probe = AudioProbe::new(48_000);
        let frame = probe.process_block(&vec![0.0; 1024]).unwrap();

        assert_eq!(frame.rms, 0.0);
        assert_eq!(frame.peak, 0.0);
        assert_eq!(frame.spectral_centroid, 0.0);
    }

    #[test]
    fn rejects_tiny_blocks() {
        let mut probe = AudioProbe::new(48_000);
        assert!(probe.process_block(&[0.5]).is_err());
        assert!(probe.process_all(&[0.0; 8], 1).is_err());
    }

    #[test]
    fn tracks_duration_and_loudest_block() {
        let mut probe = AudioProbe::new(100);
        probe.process_block(&vec![0.1; 50]).unwrap();
        probe.process_block(&vec![0.9; 50]).unwrap();
        probe.process_block(&vec![0.2; 50]).unwrap();

        let summary = probe.summary();
        assert!((summary.duration_seconds - 1.5).abs() < 1e-6);
        assert!((summary.peak - 0.9).abs() < 1e-6);
        assert!((summary.loudest_at.unwrap() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn rising_cutoff_brightens_noise() {
        let config = AudioConfig {
            sample_rate: 16_000,
            master_gain: 1.0,
            ..AudioConfig::default()
        };
        let mut context = OfflineContext::new(&config);
        for voice in (Sound::NoiseSweep {
            delay: 0.0,
            duration: 2.0,
            from_cutoff: 200.0,
            to_cutoff: 6_000.0,
            peak: 0.5,
            q: 0.7,
        })
        .voices()
        {
            context.schedule(voice).unwrap();
        }
        let samples = context.render(32_000).unwrap();

        let mut probe = AudioProbe::new(config.sample_rate);
        let frames = probe.process_all(&samples, 2_048).unwrap().to_vec();
        let early = &frames[1];
        let late = &frames[frames.len() - 3];
        assert!(
            late.spectral_centroid > early.spectral_centroid * 2.0,
            "early {} late {}",
            early.spectral_centroid,
            late.spectral_centroid
        );
    }
}
