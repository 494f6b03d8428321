use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{render::MAX_CANVAS_SIDE, Result, SequenceError};

/// Longest duration override accepted, in seconds.
pub const MAX_DURATION_SECONDS: f32 = 3_600.0;

/// Top-level configuration structure for a sequence run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sequence: SequenceConfig,
    pub audio: AudioConfig,
    pub render: RenderConfig,
}

impl AppConfig {
    /// Loads a configuration from a JSON file. Missing sections fall back to
    /// their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would make a sequence meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.sequence.fps == 0 {
            return Err(SequenceError::Config("fps must be positive".into()));
        }
        if self.audio.sample_rate == 0 {
            return Err(SequenceError::Config("sample_rate must be positive".into()));
        }
        if self.render.width == 0 || self.render.height == 0 {
            return Err(SequenceError::Config("viewport must not be empty".into()));
        }
        if self.render.width > MAX_CANVAS_SIDE || self.render.height > MAX_CANVAS_SIDE {
            return Err(SequenceError::Config(format!(
                "viewport must fit within {MAX_CANVAS_SIDE}x{MAX_CANVAS_SIDE}"
            )));
        }
        if let Some(seconds) = self.sequence.duration_seconds {
            if !(seconds.is_finite() && seconds > 0.0 && seconds <= MAX_DURATION_SECONDS) {
                return Err(SequenceError::Config(format!(
                    "duration_seconds must be in (0, {MAX_DURATION_SECONDS}], got {seconds}"
                )));
            }
        }
        Ok(())
    }
}

/// Options that shape the timed run itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    /// Render the idle end state instead of playing the sequence.
    pub skip: bool,
    /// Target frame rate for frame sources that pace themselves.
    pub fps: u32,
    /// Overrides the preset duration when set.
    pub duration_seconds: Option<f32>,
    /// Seed for per-frame randomness. `None` keeps it unseeded.
    pub seed: Option<u64>,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            skip: false,
            fps: 60,
            duration_seconds: None,
            seed: None,
        }
    }
}

impl SequenceConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Disables audio entirely; visuals still play.
    pub enabled: bool,
    pub sample_rate: u32,
    pub block_size: usize,
    /// Output gain applied after all voices are summed.
    pub master_gain: f32,
    /// Seed for noise buffers so offline renders are reproducible.
    pub noise_seed: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: 48_000,
            block_size: 1024,
            master_gain: 0.5,
            noise_seed: 0x5eed,
        }
    }
}

/// Backing surface and visual tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub device_pixel_ratio: f32,
    /// Alpha of the fill-clear that leaves trails behind moving elements.
    pub trail_alpha: f32,
    /// Largest shake offset in CSS pixels, reached at progress 1.
    pub max_shake: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 180,
            device_pixel_ratio: 1.0,
            trail_alpha: 0.15,
            max_shake: 24.0,
        }
    }
}
