//! Keyframed remap curves used for layer output shaping, per-octave remaps,
//! distance masks and path blending.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: f64,
    pub value: f64,
}

impl Keyframe {
    pub const fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }
}

/// How values between two neighbouring keys are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Linear,
    /// Flat tangents at every key (smoothstep per segment); never overshoots.
    #[default]
    Smooth,
    /// Hold the left key's value until the next key.
    Step,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawCurve {
    keys: Vec<Keyframe>,
    #[serde(default)]
    interpolation: Interpolation,
}

/// A piecewise curve over sorted keyframes.
///
/// Evaluation clamps to the first/last key outside the key range, and any
/// non-finite input or output collapses to `0.0` so a single bad sample never
/// poisons a grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCurve", into = "RawCurve")]
pub struct Curve {
    keys: Vec<Keyframe>,
    interpolation: Interpolation,
}

impl TryFrom<RawCurve> for Curve {
    type Error = Error;

    fn try_from(raw: RawCurve) -> Result<Self> {
        Curve::new(raw.keys, raw.interpolation)
    }
}

impl From<Curve> for RawCurve {
    fn from(curve: Curve) -> Self {
        RawCurve {
            keys: curve.keys,
            interpolation: curve.interpolation,
        }
    }
}

impl Curve {
    pub fn new(mut keys: Vec<Keyframe>, interpolation: Interpolation) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::config("curve", "a curve needs at least one key"));
        }
        if keys.iter().any(|k| !k.time.is_finite() || !k.value.is_finite()) {
            return Err(Error::config("curve", "key times and values must be finite"));
        }
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        if keys.windows(2).any(|w| w[0].time == w[1].time) {
            return Err(Error::config("curve", "two keys share the same time"));
        }
        Ok(Self {
            keys,
            interpolation,
        })
    }

    /// (0,0) → (1,1), linear.
    pub fn identity() -> Self {
        Self {
            keys: vec![Keyframe::new(0.0, 0.0), Keyframe::new(1.0, 1.0)],
            interpolation: Interpolation::Linear,
        }
    }

    /// Always `value`; a non-finite value is a configuration error.
    pub fn constant(value: f64) -> Result<Self> {
        Self::new(vec![Keyframe::new(0.0, value)], Interpolation::Linear)
    }

    /// (0,0) → (1,1) with flat ends.
    pub fn ease_in_out() -> Self {
        Self {
            keys: vec![Keyframe::new(0.0, 0.0), Keyframe::new(1.0, 1.0)],
            interpolation: Interpolation::Smooth,
        }
    }

    /// (0,1) → (1,0) with flat ends; full weight at the centre of a
    /// distance mask or path, fading to nothing at the edge.
    pub fn hill() -> Self {
        Self {
            keys: vec![Keyframe::new(0.0, 1.0), Keyframe::new(1.0, 0.0)],
            interpolation: Interpolation::Smooth,
        }
    }

    pub fn keys(&self) -> &[Keyframe] {
        &self.keys
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn evaluate(&self, t: f64) -> f64 {
        let t = if t.is_finite() { t } else { 0.0 };
        let first = self.keys[0];
        let last = self.keys[self.keys.len() - 1];
        if t <= first.time {
            return first.value;
        }
        if t >= last.time {
            return last.value;
        }

        // keys[idx - 1].time < t < keys[idx].time
        let idx = self.keys.partition_point(|k| k.time <= t);
        let a = self.keys[idx - 1];
        let b = self.keys[idx];
        let span = b.time - a.time;
        let s = ((t - a.time) / span).clamp(0.0, 1.0);
        let s = match self.interpolation {
            Interpolation::Linear => s,
            Interpolation::Smooth => s * s * (3.0 - 2.0 * s),
            Interpolation::Step => 0.0,
        };
        let v = a.value + (b.value - a.value) * s;
        if v.is_finite() { v } else { 0.0 }
    }

    /// Evaluate and clamp into [0, 1].
    pub fn evaluate01(&self, t: f64) -> f64 {
        self.evaluate(t).clamp(0.0, 1.0)
    }
}

impl Default for Curve {
    fn default() -> Self {
        Curve::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_outside_key_range() {
        let c = Curve::identity();
        assert_eq!(c.evaluate(-3.0), 0.0);
        assert_eq!(c.evaluate(7.0), 1.0);
        assert_eq!(c.evaluate(0.25), 0.25);
    }

    #[test]
    fn nan_collapses_to_first_key() {
        let c = Curve::hill();
        assert_eq!(c.evaluate(f64::NAN), 1.0);
    }

    #[test]
    fn smooth_has_flat_ends_and_hits_midpoint() {
        let c = Curve::ease_in_out();
        assert!(c.evaluate(0.05) < 0.05);
        assert!((c.evaluate(0.5) - 0.5).abs() < 1e-12);
        assert!(c.evaluate(0.95) > 0.95);
    }

    #[test]
    fn step_holds_left_value() {
        let c = Curve::new(
            vec![
                Keyframe::new(0.0, 0.2),
                Keyframe::new(0.5, 0.8),
                Keyframe::new(1.0, 0.1),
            ],
            Interpolation::Step,
        )
        .unwrap();
        assert_eq!(c.evaluate(0.3), 0.2);
        assert_eq!(c.evaluate(0.7), 0.8);
    }

    #[test]
    fn keys_are_sorted_and_validated() {
        let c = Curve::new(
            vec![Keyframe::new(1.0, 1.0), Keyframe::new(0.0, 0.0)],
            Interpolation::Linear,
        )
        .unwrap();
        assert_eq!(c.keys()[0].time, 0.0);

        assert!(Curve::new(vec![], Interpolation::Linear).is_err());
        assert!(
            Curve::new(
                vec![Keyframe::new(0.5, 0.0), Keyframe::new(0.5, 1.0)],
                Interpolation::Linear
            )
            .is_err()
        );
        assert!(Curve::new(vec![Keyframe::new(f64::NAN, 0.0)], Interpolation::Linear).is_err());
    }

    #[test]
    fn single_key_is_constant() {
        let c = Curve::constant(0.4).unwrap();
        assert_eq!(c.evaluate(-1.0), 0.4);
        assert_eq!(c.evaluate(0.0), 0.4);
        assert_eq!(c.evaluate(9.0), 0.4);
        assert!(Curve::constant(f64::NAN).is_err());
        assert!(Curve::constant(f64::INFINITY).is_err());
    }
}
