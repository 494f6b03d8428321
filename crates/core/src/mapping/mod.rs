use serde::{Deserialize, Serialize};

use crate::Progress;

/// Shape that maps sequence progress onto a `[0, 1]` intensity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "curve", rename_all = "snake_case")]
pub enum IntensityCurve {
    Linear,
    /// `p^exponent`; exponents above 1 stay quiet early and peak late.
    Power { exponent: f32 },
    /// Hermite ease between two progress points.
    SmoothStep { from: f32, to: f32 },
    /// Off until `at`, fully on afterwards.
    Step { at: f32 },
    Constant { value: f32 },
}

impl IntensityCurve {
    pub fn eval(self, progress: Progress) -> f32 {
        let p = progress.value();
        let value = match self {
            Self::Linear => p,
            Self::Power { exponent } => p.powf(exponent.max(0.0)),
            Self::SmoothStep { from, to } => {
                if to <= from {
                    if p >= to {
                        1.0
                    } else {
                        0.0
                    }
                } else {
                    let t = ((p - from) / (to - from)).clamp(0.0, 1.0);
                    t * t * (3.0 - 2.0 * t)
                }
            }
            Self::Step { at } => {
                if p >= at {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Constant { value } => value,
        };
        value.clamp(0.0, 1.0)
    }
}

/// Visual parameters driven by progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Screen-shake amplitude.
    Shake,
    /// Particle spawn rate.
    SpawnRate,
    /// Probability of a glyph being swapped for noise.
    Corruption,
    /// Bloom and glow strength.
    Glow,
    /// Shader vertex displacement.
    Displacement,
    /// Mesh spin speed.
    Rotation,
}

impl Channel {
    pub const ALL: [Channel; 6] = [
        Channel::Shake,
        Channel::SpawnRate,
        Channel::Corruption,
        Channel::Glow,
        Channel::Displacement,
        Channel::Rotation,
    ];
}

/// Routes a curve to a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntensityMapping {
    pub channel: Channel,
    pub curve: IntensityCurve,
    #[serde(default = "unit_gain")]
    pub gain: f32,
}

fn unit_gain() -> f32 {
    1.0
}

/// Channel values for one frame. Unmapped channels stay at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Intensities {
    pub shake: f32,
    pub spawn_rate: f32,
    pub corruption: f32,
    pub glow: f32,
    pub displacement: f32,
    pub rotation: f32,
}

impl Intensities {
    pub fn get(&self, channel: Channel) -> f32 {
        match channel {
            Channel::Shake => self.shake,
            Channel::SpawnRate => self.spawn_rate,
            Channel::Corruption => self.corruption,
            Channel::Glow => self.glow,
            Channel::Displacement => self.displacement,
            Channel::Rotation => self.rotation,
        }
    }

    fn slot(&mut self, channel: Channel) -> &mut f32 {
        match channel {
            Channel::Shake => &mut self.shake,
            Channel::SpawnRate => &mut self.spawn_rate,
            Channel::Corruption => &mut self.corruption,
            Channel::Glow => &mut self.glow,
            Channel::Displacement => &mut self.displacement,
            Channel::Rotation => &mut self.rotation,
        }
    }
}

/// Set of mappings evaluated once per frame. Several mappings on the same
/// channel add up.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IntensityMatrix {
    mappings: Vec<IntensityMapping>,
}

impl IntensityMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rising-tension defaults: shake grows with `p³` so it is imperceptible
    /// early and violent at the end.
    pub fn buildup() -> Self {
        Self::new()
            .with(Channel::Shake, IntensityCurve::Power { exponent: 3.0 }, 1.0)
            .with(Channel::SpawnRate, IntensityCurve::Power { exponent: 2.0 }, 1.0)
            .with(Channel::Corruption, IntensityCurve::SmoothStep { from: 0.2, to: 1.0 }, 0.85)
            .with(Channel::Glow, IntensityCurve::Linear, 1.0)
    }

    /// Steady viewer: constant spin and glow with a slow swell in
    /// displacement.
    pub fn viewer() -> Self {
        Self::new()
            .with(Channel::Rotation, IntensityCurve::Constant { value: 0.4 }, 1.0)
            .with(Channel::Glow, IntensityCurve::SmoothStep { from: 0.0, to: 0.3 }, 0.8)
            .with(Channel::Displacement, IntensityCurve::Power { exponent: 1.5 }, 1.0)
            .with(Channel::SpawnRate, IntensityCurve::Linear, 0.6)
    }

    pub fn with(mut self, channel: Channel, curve: IntensityCurve, gain: f32) -> Self {
        self.push(IntensityMapping { channel, curve, gain });
        self
    }

    pub fn push(&mut self, mapping: IntensityMapping) {
        self.mappings.push(mapping);
    }

    pub fn mappings(&self) -> &[IntensityMapping] {
        &self.mappings
    }

    pub fn evaluate(&self, progress: Progress) -> Intensities {
        let mut out = Intensities::default();
        for mapping in &self.mappings {
            *out.slot(mapping.channel) += mapping.curve.eval(progress) * mapping.gain;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep() -> impl Iterator<Item = Progress> {
        (0..=100).map(|i| Progress::new(i as f32 / 100.0))
    }

    #[test]
    fn buildup_channels_never_fall() {
        let matrix = IntensityMatrix::buildup();
        for channel in [Channel::Shake, Channel::SpawnRate, Channel::Corruption, Channel::Glow] {
            let values: Vec<f32> = sweep().map(|p| matrix.evaluate(p).get(channel)).collect();
            assert!(
                values.windows(2).all(|w| w[1] >= w[0]),
                "{channel:?} decreases somewhere"
            );
        }
    }

    #[test]
    fn shake_is_quiet_early_and_full_late() {
        let matrix = IntensityMatrix::buildup();
        assert!(matrix.evaluate(Progress::new(0.2)).shake < 0.01);
        assert_eq!(matrix.evaluate(Progress::END).shake, 1.0);
    }

    #[test]
    fn curves_stay_in_unit_range() {
        let curves = [
            IntensityCurve::Linear,
            IntensityCurve::Power { exponent: 0.5 },
            IntensityCurve::SmoothStep { from: 0.5, to: 0.5 },
            IntensityCurve::Step { at: 0.3 },
            IntensityCurve::Constant { value: 4.0 },
        ];
        for curve in curves {
            for p in sweep() {
                let v = curve.eval(p);
                assert!((0.0..=1.0).contains(&v), "{curve:?} gave {v}");
            }
        }
    }

    #[test]
    fn mappings_on_one_channel_add() {
        let matrix = IntensityMatrix::new()
            .with(Channel::Glow, IntensityCurve::Constant { value: 0.25 }, 1.0)
            .with(Channel::Glow, IntensityCurve::Constant { value: 0.5 }, 1.0);
        assert_eq!(matrix.evaluate(Progress::START).glow, 0.75);
        assert_eq!(matrix.evaluate(Progress::START).shake, 0.0);
    }

    #[test]
    fn matrix_loads_from_json() {
        let matrix: IntensityMatrix = serde_json::from_str(
            r#"{ "mappings": [ { "channel": "shake", "curve": { "curve": "power", "exponent": 3.0 } } ] }"#,
        )
        .unwrap();
        assert_eq!(matrix.mappings()[0].gain, 1.0);
        assert!((matrix.evaluate(Progress::new(0.5)).shake - 0.125).abs() < 1e-6);
    }
}
