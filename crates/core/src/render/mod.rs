//! Per-frame renderers.
//!
//! A renderer paints one frame from the current [`FrameContext`] and the
//! intensities derived from progress. Two flavours ship: a 2D canvas buildup
//! ([`BuildupRenderer`]) and a 3D orbit viewer ([`OrbitRenderer`]) that
//! produces the uniforms a GPU backend would upload.

mod buildup;
mod canvas;
mod orbit;

use std::time::Duration;

use rand::{rngs::SmallRng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

pub use buildup::{glitch_text, shake_offset, BuildupRenderer, Spark};
pub use canvas::{Canvas, TextRun, MAX_CANVAS_SIDE};
pub use orbit::{OrbitRenderer, SceneUniforms};

use crate::{host::Viewport, mapping::Intensities, Progress};

/// Linear RGB colour, components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    pub const ALARM_RED: Self = Self::rgb(0.9, 0.05, 0.05);
    pub const GOLD: Self = Self::rgb(1.0, 0.78, 0.2);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// `self` blended towards `other` by `alpha`.
    pub fn mix(self, other: Self, alpha: f32) -> Self {
        let a = alpha.clamp(0.0, 1.0);
        Self::rgb(
            self.r + (other.r - self.r) * a,
            self.g + (other.g - self.g) * a,
            self.b + (other.b - self.b) * a,
        )
    }

    pub fn luma(self) -> f32 {
        0.2126 * self.r + 0.7152 * self.g + 0.0722 * self.b
    }
}

/// Timing handed to the renderer each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    pub elapsed: Duration,
    /// Time since the previous frame.
    pub delta: Duration,
    pub progress: Progress,
    pub frame_index: u64,
}

/// Named visual beats that timeline cues raise on a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flag", rename_all = "snake_case")]
pub enum VisualFlag {
    /// Pulsing warning overlay.
    Alarm,
    /// Alternating full-screen flicker.
    Strobe,
    /// Fade to a solid colour over `seconds`.
    Flash { color: Color, seconds: f32 },
    /// Expanding ring from the centre.
    Shockwave,
    /// Clear every ongoing effect.
    Calm,
}

/// Per-frame randomness. Unseeded by default; seeding makes glitch and shake
/// output reproducible.
#[derive(Debug, Clone)]
pub struct FrameRng(SmallRng);

impl FrameRng {
    pub fn unseeded() -> Self {
        Self(SmallRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self(SmallRng::seed_from_u64(seed))
    }

    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::unseeded, Self::seeded)
    }
}

impl RngCore for FrameRng {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.0.try_fill_bytes(dest)
    }
}

/// Draws frames for one sequence.
pub trait Renderer {
    /// Re-fits the backing surface to the host viewport.
    fn resize(&mut self, viewport: Viewport);

    fn render(&mut self, frame: &FrameContext, intensities: &Intensities, rng: &mut FrameRng);

    fn apply_flag(&mut self, flag: VisualFlag);

    /// Paints the idle view shown after the sequence, or instead of it when
    /// skipped.
    fn render_end_state(&mut self);

    fn frames_rendered(&self) -> u64;
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn resize(&mut self, viewport: Viewport) {
        (**self).resize(viewport);
    }

    fn render(&mut self, frame: &FrameContext, intensities: &Intensities, rng: &mut FrameRng) {
        (**self).render(frame, intensities, rng);
    }

    fn apply_flag(&mut self, flag: VisualFlag) {
        (**self).apply_flag(flag);
    }

    fn render_end_state(&mut self) {
        (**self).render_end_state();
    }

    fn frames_rendered(&self) -> u64 {
        (**self).frames_rendered()
    }
}

/// Renderer that only counts frames. Used where a sequence has no surface of
/// its own and in tests.
#[derive(Debug, Default, Clone)]
pub struct NullRenderer {
    frames: u64,
    pub flags: Vec<VisualFlag>,
    pub viewport: Option<Viewport>,
    pub end_state: bool,
}

impl Renderer for NullRenderer {
    fn resize(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }

    fn render(&mut self, _frame: &FrameContext, _intensities: &Intensities, _rng: &mut FrameRng) {
        self.frames += 1;
    }

    fn apply_flag(&mut self, flag: VisualFlag) {
        self.flags.push(flag);
    }

    fn render_end_state(&mut self) {
        self.end_state = true;
    }

    fn frames_rendered(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn seeded_rng_repeats() {
        let mut a = FrameRng::seeded(9);
        let mut b = FrameRng::seeded(9);
        let xs: Vec<u32> = (0..8).map(|_| a.gen()).collect();
        let ys: Vec<u32> = (0..8).map(|_| b.gen()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn mix_interpolates() {
        let grey = Color::BLACK.mix(Color::WHITE, 0.5);
        assert!((grey.r - 0.5).abs() < 1e-6);
        assert_eq!(Color::BLACK.mix(Color::WHITE, 3.0), Color::WHITE);
    }
}
