//! Pre-scheduled parameter automation.
//!
//! Values are computed from an ordered list of automation events the way a
//! browser audio graph does it: a ramp interpolates from the value and time of
//! the event before it to its own target and end time; a set holds until the
//! next event.

use serde::{Deserialize, Serialize};

/// Smallest magnitude an exponential ramp may target or start from.
pub const MIN_EXP_VALUE: f32 = 0.0001;

/// One automation event. Times are seconds on the audio clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Automation {
    Set { value: f32, at: f64 },
    Linear { value: f32, end: f64 },
    Exponential { value: f32, end: f64 },
}

impl Automation {
    pub fn time(&self) -> f64 {
        match *self {
            Self::Set { at, .. } => at,
            Self::Linear { end, .. } | Self::Exponential { end, .. } => end,
        }
    }

    pub fn value(&self) -> f32 {
        match *self {
            Self::Set { value, .. } | Self::Linear { value, .. } | Self::Exponential { value, .. } => {
                value
            }
        }
    }

    fn shifted(self, offset: f64) -> Self {
        match self {
            Self::Set { value, at } => Self::Set { value, at: at + offset },
            Self::Linear { value, end } => Self::Linear { value, end: end + offset },
            Self::Exponential { value, end } => Self::Exponential { value, end: end + offset },
        }
    }
}

/// Replaces values too close to zero for exponential interpolation with
/// [`MIN_EXP_VALUE`], keeping the sign.
pub fn exp_safe(value: f32) -> f32 {
    if value.is_nan() {
        return MIN_EXP_VALUE;
    }
    if value.abs() < MIN_EXP_VALUE {
        MIN_EXP_VALUE.copysign(if value == 0.0 { 1.0 } else { value })
    } else {
        value
    }
}

/// An automatable parameter (frequency, gain, cutoff).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioParam {
    initial: f32,
    events: Vec<Automation>,
}

impl AudioParam {
    pub fn new(initial: f32) -> Self {
        Self {
            initial,
            events: Vec::new(),
        }
    }

    pub fn initial(&self) -> f32 {
        self.initial
    }

    pub fn events(&self) -> &[Automation] {
        &self.events
    }

    pub fn set_value_at_time(&mut self, value: f32, at: f64) -> &mut Self {
        self.insert(Automation::Set { value, at });
        self
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, end: f64) -> &mut Self {
        self.insert(Automation::Linear { value, end });
        self
    }

    /// Schedules an exponential ramp. A target of (or near) zero is replaced
    /// with [`MIN_EXP_VALUE`]; follow with [`AudioParam::fade_out`] to reach
    /// true silence.
    pub fn exponential_ramp_to_value_at_time(&mut self, value: f32, end: f64) -> &mut Self {
        let safe = exp_safe(value);
        if safe != value {
            tracing::trace!(requested = value, used = safe, "exponential ramp target clamped");
        }
        self.insert(Automation::Exponential { value: safe, end });
        self
    }

    /// Linear snap to exactly zero, typically after an exponential decay.
    pub fn fade_out(&mut self, end: f64) -> &mut Self {
        self.linear_ramp_to_value_at_time(0.0, end)
    }

    /// Attack/decay envelope: exponential rise from near silence to `peak`,
    /// exponential fall back to the floor, then a linear snap to zero.
    pub fn envelope(&mut self, start: f64, attack: f64, peak: f32, decay: f64) -> &mut Self {
        let attack = attack.max(0.001);
        let decay = decay.max(0.001);
        self.set_value_at_time(MIN_EXP_VALUE, start)
            .exponential_ramp_to_value_at_time(peak, start + attack)
            .exponential_ramp_to_value_at_time(0.0, start + attack + decay)
            .fade_out(start + attack + decay + 0.005)
    }

    /// Time of the last scheduled event, if any.
    pub fn last_event_time(&self) -> Option<f64> {
        self.events.last().map(Automation::time)
    }

    /// Moves every event by `offset` seconds.
    pub fn shift(&mut self, offset: f64) {
        for event in &mut self.events {
            *event = event.shifted(offset);
        }
    }

    /// Value of the parameter at time `t`.
    pub fn value_at(&self, t: f64) -> f32 {
        let mut value = self.initial;
        let mut previous_time = 0.0_f64;

        for event in &self.events {
            let time = event.time();
            if t < time {
                return match *event {
                    Automation::Set { .. } => value,
                    Automation::Linear { value: target, .. } => {
                        let span = time - previous_time;
                        if span <= 0.0 {
                            return target;
                        }
                        let frac = ((t - previous_time) / span).clamp(0.0, 1.0) as f32;
                        value + (target - value) * frac
                    }
                    Automation::Exponential { value: target, .. } => {
                        let span = time - previous_time;
                        if span <= 0.0 {
                            return value;
                        }
                        // zero or sign-crossing starts ramp from epsilon on the target's side
                        let start = if value * target <= 0.0 {
                            MIN_EXP_VALUE.copysign(target)
                        } else {
                            value
                        };
                        let frac = ((t - previous_time) / span).clamp(0.0, 1.0);
                        start * (f64::from(target / start)).powf(frac) as f32
                    }
                };
            }
            value = event.value();
            previous_time = time;
        }

        value
    }

    fn insert(&mut self, event: Automation) {
        let time = event.time();
        let index = self.events.partition_point(|existing| existing.time() <= time);
        self.events.insert(index, event);
    }
}

impl Default for AudioParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn exponential_ramp_never_targets_zero() {
        let mut param = AudioParam::new(1.0);
        param
            .exponential_ramp_to_value_at_time(0.0, 1.0)
            .exponential_ramp_to_value_at_time(-0.0, 2.0)
            .exponential_ramp_to_value_at_time(-0.00001, 3.0);

        for event in param.events() {
            if let Automation::Exponential { value, .. } = event {
                assert!(value.abs() >= MIN_EXP_VALUE, "target {value}");
            }
        }
        assert_eq!(exp_safe(-0.00001), -MIN_EXP_VALUE);
        assert_eq!(exp_safe(0.5), 0.5);
    }

    #[test]
    fn linear_ramp_interpolates_from_previous_event() {
        let mut param = AudioParam::new(0.0);
        param.set_value_at_time(1.0, 1.0).linear_ramp_to_value_at_time(3.0, 2.0);

        assert!(close(param.value_at(0.5), 0.0));
        assert!(close(param.value_at(1.0), 1.0));
        assert!(close(param.value_at(1.5), 2.0));
        assert!(close(param.value_at(5.0), 3.0));
    }

    #[test]
    fn exponential_ramp_is_geometric() {
        let mut param = AudioParam::new(100.0);
        param.set_value_at_time(100.0, 0.0).exponential_ramp_to_value_at_time(400.0, 2.0);

        assert!(close(param.value_at(1.0), 200.0));
        assert!(close(param.value_at(2.0), 400.0));
    }

    #[test]
    fn exponential_ramp_from_zero_starts_at_epsilon() {
        let mut param = AudioParam::new(0.0);
        param.exponential_ramp_to_value_at_time(1.0, 1.0);
        assert!(close(param.value_at(0.0), MIN_EXP_VALUE));
        assert!((param.value_at(0.5) - 0.01).abs() < 1e-4);
        assert!(close(param.value_at(1.0), 1.0));

        let mut crossing = AudioParam::new(-0.5);
        crossing.exponential_ramp_to_value_at_time(2.0, 1.0);
        let mid = crossing.value_at(0.5);
        assert!(mid > 0.0 && mid < 2.0, "mid {mid}");
    }

    #[test]
    fn envelope_rises_then_snaps_to_zero() {
        let mut param = AudioParam::new(0.0);
        param.envelope(1.0, 0.1, 0.8, 0.5);

        assert_eq!(param.value_at(0.5), 0.0);
        assert!(close(param.value_at(1.1), 0.8));
        assert!(param.value_at(1.3) < 0.8);
        assert_eq!(param.value_at(2.0), 0.0);
    }

    #[test]
    fn shift_moves_every_event() {
        let mut param = AudioParam::new(0.0);
        param.set_value_at_time(1.0, 0.5).linear_ramp_to_value_at_time(0.0, 1.0);
        param.shift(2.0);

        assert_eq!(param.last_event_time(), Some(3.0));
        assert!(close(param.value_at(2.5), 1.0));
    }

    #[test]
    fn events_stay_time_ordered() {
        let mut param = AudioParam::new(0.0);
        param
            .linear_ramp_to_value_at_time(1.0, 2.0)
            .set_value_at_time(0.5, 1.0)
            .set_value_at_time(0.2, 3.0);
        let times: Vec<f64> = param.events().iter().map(Automation::time).collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
    }
}
