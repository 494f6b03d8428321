use std::f32::consts::TAU;

use rand::Rng;

use super::{Canvas, Color, FrameContext, FrameRng, Renderer, VisualFlag};
use crate::{host::Viewport, mapping::Intensities, RenderConfig};

/// Sparks spawned per second at full spawn rate.
const SPARKS_PER_SECOND: f32 = 240.0;
const MAX_SPARKS: usize = 512;
const SPARK_LIFETIME: f32 = 0.9;
const ALARM_HZ: f32 = 2.0;
const SHOCKWAVE_SECONDS: f32 = 0.6;
const GLITCH_GLYPHS: &[char] = &[
    '#', '%', '&', '@', '!', '?', '*', '<', '>', '/', '\\', '|', '=', '+', '~', '^',
];

/// Random translation bounded by `max_shake * intensity` on each axis.
///
/// With the buildup mapping `intensity` is `p³`, so the bound is
/// `max_shake * p³`.
pub fn shake_offset(intensity: f32, max_shake: f32, rng: &mut FrameRng) -> (f32, f32) {
    let amplitude = max_shake.max(0.0) * intensity.clamp(0.0, 1.0);
    if amplitude <= f32::EPSILON {
        return (0.0, 0.0);
    }
    (
        rng.gen_range(-amplitude..=amplitude),
        rng.gen_range(-amplitude..=amplitude),
    )
}

/// Swaps each visible character for a noise glyph with `probability`.
/// Whitespace is kept so the line keeps its shape.
pub fn glitch_text(text: &str, probability: f32, rng: &mut FrameRng) -> String {
    let probability = probability.clamp(0.0, 1.0);
    text.chars()
        .map(|ch| {
            if ch.is_whitespace() || probability <= 0.0 {
                return ch;
            }
            if rng.gen::<f32>() < probability {
                GLITCH_GLYPHS[rng.gen_range(0..GLITCH_GLYPHS.len())]
            } else {
                ch
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spark {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    /// Seconds left before the spark disappears.
    pub life: f32,
}

#[derive(Debug, Clone, Copy)]
struct Flash {
    color: Color,
    seconds: f32,
    age: f32,
}

/// Rising-tension 2D sequence: trails, sparks, shaking glitch text and cue
/// driven overlays.
#[derive(Debug, Clone)]
pub struct BuildupRenderer {
    canvas: Canvas,
    pixel_ratio: f32,
    trail_alpha: f32,
    max_shake: f32,
    text: String,
    shown_text: String,
    sparks: Vec<Spark>,
    spawn_debt: f32,
    last_shake: (f32, f32),
    alarm: bool,
    strobe: bool,
    flash: Option<Flash>,
    shockwave: Option<f32>,
    end_state: bool,
    frames: u64,
}

impl BuildupRenderer {
    pub fn new(config: &RenderConfig, text: impl Into<String>) -> Self {
        let viewport =
            Viewport::new(config.width, config.height).with_pixel_ratio(config.device_pixel_ratio);
        let (width, height) = viewport.physical_size();
        let text = text.into();
        Self {
            canvas: Canvas::new(width, height),
            pixel_ratio: viewport.device_pixel_ratio,
            trail_alpha: config.trail_alpha.clamp(0.0, 1.0),
            max_shake: config.max_shake.max(0.0),
            shown_text: text.clone(),
            text,
            sparks: Vec::new(),
            spawn_debt: 0.0,
            last_shake: (0.0, 0.0),
            alarm: false,
            strobe: false,
            flash: None,
            shockwave: None,
            end_state: false,
            frames: 0,
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn sparks(&self) -> &[Spark] {
        &self.sparks
    }

    /// Translation applied to the most recent frame.
    pub fn last_shake(&self) -> (f32, f32) {
        self.last_shake
    }

    /// Text as drawn on the most recent frame.
    pub fn shown_text(&self) -> &str {
        &self.shown_text
    }

    pub fn is_alarm(&self) -> bool {
        self.alarm
    }

    pub fn is_strobing(&self) -> bool {
        self.strobe
    }

    pub fn flash_alpha(&self) -> f32 {
        self.flash.map_or(0.0, |flash| flash_alpha(&flash))
    }

    pub fn shows_end_state(&self) -> bool {
        self.end_state
    }

    fn spawn_sparks(&mut self, rate: f32, dt: f32, rng: &mut FrameRng) {
        self.spawn_debt += rate.clamp(0.0, 1.0) * SPARKS_PER_SECOND * dt;
        let (cx, cy) = self.center();
        while self.spawn_debt >= 1.0 {
            self.spawn_debt -= 1.0;
            if self.sparks.len() >= MAX_SPARKS {
                continue;
            }
            let angle = rng.gen_range(0.0..TAU);
            let speed = rng.gen_range(40.0..160.0) * self.pixel_ratio;
            self.sparks.push(Spark {
                x: cx,
                y: cy,
                vx: angle.cos() * speed,
                vy: angle.sin() * speed,
                life: rng.gen_range(0.3..SPARK_LIFETIME),
            });
        }
    }

    fn center(&self) -> (f32, f32) {
        (self.canvas.width() as f32 * 0.5, self.canvas.height() as f32 * 0.5)
    }

    fn draw_overlays(&mut self, frame: &FrameContext, dt: f32) {
        if self.alarm {
            let t = frame.elapsed.as_secs_f32();
            let pulse = 0.5 + 0.5 * (t * ALARM_HZ * TAU).sin();
            self.canvas.fill(Color::ALARM_RED, 0.1 + 0.2 * pulse);
        }
        if self.strobe && frame.frame_index % 2 == 0 {
            self.canvas.fill(Color::WHITE, 0.6);
        }
        if let Some(age) = self.shockwave.as_mut() {
            *age += dt;
            let t = (*age / SHOCKWAVE_SECONDS).min(1.0);
            let (cx, cy) = (self.canvas.width() as f32 * 0.5, self.canvas.height() as f32 * 0.5);
            let radius = t * cx.max(cy) * 1.5;
            self.canvas.fill_circle(cx, cy, radius, Color::WHITE, 0.35 * (1.0 - t));
            if t >= 1.0 {
                self.shockwave = None;
            }
        }
        if let Some(flash) = self.flash.as_mut() {
            flash.age += dt;
            let alpha = flash_alpha(flash);
            self.canvas.fill(flash.color, alpha);
        }
    }
}

fn flash_alpha(flash: &Flash) -> f32 {
    if flash.seconds <= 0.0 {
        1.0
    } else {
        (flash.age / flash.seconds).clamp(0.0, 1.0)
    }
}

impl Renderer for BuildupRenderer {
    fn resize(&mut self, viewport: Viewport) {
        let (width, height) = viewport.physical_size();
        self.pixel_ratio = viewport.device_pixel_ratio;
        self.canvas.resize(width, height);
        tracing::debug!(width, height, "buildup canvas resized");
    }

    fn render(&mut self, frame: &FrameContext, intensities: &Intensities, rng: &mut FrameRng) {
        let dt = frame.delta.as_secs_f32();
        self.frames += 1;
        self.canvas.begin_frame();
        self.canvas.fill(Color::BLACK, self.trail_alpha);

        let shake = shake_offset(intensities.shake, self.max_shake * self.pixel_ratio, rng);
        self.last_shake = shake;
        self.canvas.translate(shake.0, shake.1);

        self.spawn_sparks(intensities.spawn_rate, dt, rng);
        for spark in &mut self.sparks {
            spark.x += spark.vx * dt;
            spark.y += spark.vy * dt;
            spark.life -= dt;
        }
        self.sparks.retain(|spark| spark.life > 0.0);
        let glow = intensities.glow.clamp(0.0, 1.0);
        let spark_color = Color::GOLD.mix(Color::WHITE, glow);
        for spark in &self.sparks {
            let alpha = (spark.life / SPARK_LIFETIME).clamp(0.0, 1.0);
            self.canvas
                .fill_circle(spark.x, spark.y, 1.5 * self.pixel_ratio, spark_color, alpha);
        }

        self.shown_text = glitch_text(&self.text, intensities.corruption, rng);
        let (cx, cy) = self.center();
        self.canvas
            .draw_text(cx, cy, self.shown_text.clone(), Color::WHITE.mix(Color::GOLD, glow));

        self.draw_overlays(frame, dt);
    }

    fn apply_flag(&mut self, flag: VisualFlag) {
        match flag {
            VisualFlag::Alarm => self.alarm = true,
            VisualFlag::Strobe => self.strobe = true,
            VisualFlag::Flash { color, seconds } => {
                self.flash = Some(Flash {
                    color,
                    seconds: seconds.max(0.0),
                    age: 0.0,
                })
            }
            VisualFlag::Shockwave => self.shockwave = Some(0.0),
            VisualFlag::Calm => {
                self.alarm = false;
                self.strobe = false;
                self.flash = None;
                self.shockwave = None;
            }
        }
    }

    fn render_end_state(&mut self) {
        self.apply_flag(VisualFlag::Calm);
        self.sparks.clear();
        self.spawn_debt = 0.0;
        self.last_shake = (0.0, 0.0);
        self.canvas.begin_frame();
        self.canvas.fill(Color::BLACK, 1.0);
        self.shown_text = self.text.clone();
        let (cx, cy) = self.center();
        self.canvas.draw_text(cx, cy, self.text.clone(), Color::GOLD);
        self.end_state = true;
    }

    fn frames_rendered(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        mapping::{Channel, IntensityCurve, IntensityMatrix},
        Progress,
    };

    fn frame(index: u64, progress: f32) -> FrameContext {
        FrameContext {
            elapsed: Duration::from_millis(index * 16),
            delta: Duration::from_millis(16),
            progress: Progress::new(progress),
            frame_index: index,
        }
    }

    fn renderer() -> BuildupRenderer {
        BuildupRenderer::new(
            &RenderConfig {
                width: 64,
                height: 36,
                ..RenderConfig::default()
            },
            "LEGENDARY DROP",
        )
    }

    #[test]
    fn shake_stays_within_cubic_bound() {
        let matrix = IntensityMatrix::buildup();
        let mut rng = FrameRng::seeded(7);
        let max_shake = 24.0;
        let mut previous_bound = 0.0;
        for step in 0..=50 {
            let p = step as f32 / 50.0;
            let shake = matrix.evaluate(Progress::new(p)).shake;
            let bound = max_shake * p.powi(3);
            assert!(bound >= previous_bound);
            previous_bound = bound;
            for _ in 0..20 {
                let (dx, dy) = shake_offset(shake, max_shake, &mut rng);
                assert!(dx.abs() <= bound + 1e-4 && dy.abs() <= bound + 1e-4, "p {p}: ({dx}, {dy}) > {bound}");
            }
        }
        assert_eq!(shake_offset(0.0, max_shake, &mut rng), (0.0, 0.0));
    }

    #[test]
    fn seeded_glitch_text_repeats() {
        let a = glitch_text("MYTHIC CACHE", 0.5, &mut FrameRng::seeded(42));
        let b = glitch_text("MYTHIC CACHE", 0.5, &mut FrameRng::seeded(42));
        assert_eq!(a, b);
        assert_eq!(a.chars().nth(6), Some(' '));
    }

    #[test]
    fn glitch_probability_extremes() {
        let mut rng = FrameRng::seeded(1);
        assert_eq!(glitch_text("LOOT", 0.0, &mut rng), "LOOT");
        let scrambled = glitch_text("LOOT", 1.0, &mut rng);
        assert_eq!(scrambled.chars().count(), 4);
        assert!(scrambled.chars().all(|ch| GLITCH_GLYPHS.contains(&ch)));
    }

    #[test]
    fn resize_refits_to_device_pixels() {
        let mut renderer = renderer();
        renderer.resize(Viewport::new(100, 50).with_pixel_ratio(2.0));
        assert_eq!((renderer.canvas().width(), renderer.canvas().height()), (200, 100));
    }

    #[test]
    fn sparks_follow_spawn_rate() {
        let mut quiet = renderer();
        let mut busy = renderer();
        let mut rng = FrameRng::seeded(3);
        let calm = Intensities::default();
        let hot = IntensityMatrix::new()
            .with(Channel::SpawnRate, IntensityCurve::Constant { value: 1.0 }, 1.0)
            .evaluate(Progress::END);
        for i in 0..10 {
            quiet.render(&frame(i, 0.0), &calm, &mut rng);
            busy.render(&frame(i, 1.0), &hot, &mut rng);
        }
        assert!(quiet.sparks().is_empty());
        assert!(!busy.sparks().is_empty());
        assert!(busy.sparks().len() <= MAX_SPARKS);
    }

    #[test]
    fn flash_fades_in_and_calm_clears() {
        let mut renderer = renderer();
        let mut rng = FrameRng::seeded(5);
        renderer.apply_flag(VisualFlag::Flash {
            color: Color::WHITE,
            seconds: 0.1,
        });
        let before = renderer.canvas().mean_luma();
        for i in 0..8 {
            renderer.render(&frame(i, 0.95), &Intensities::default(), &mut rng);
        }
        assert_eq!(renderer.flash_alpha(), 1.0);
        assert!(renderer.canvas().mean_luma() > before + 0.5);

        renderer.apply_flag(VisualFlag::Calm);
        assert_eq!(renderer.flash_alpha(), 0.0);
    }

    #[test]
    fn end_state_shows_clean_text() {
        let mut renderer = renderer();
        renderer.apply_flag(VisualFlag::Alarm);
        renderer.render_end_state();

        assert!(renderer.shows_end_state());
        assert!(!renderer.is_alarm());
        assert_eq!(renderer.shown_text(), "LEGENDARY DROP");
        assert_eq!(renderer.canvas().text_runs().len(), 1);
        assert_eq!(renderer.frames_rendered(), 0);
    }
}
