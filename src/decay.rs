use crate::error::{Error, Result};

/// An implementation of a time-decaying value
pub trait Decay {
    /// Calculate value at time `t`
    fn evaluate(&self, t: f32) -> f32;

    /// The initial and final values of the schedule, `[vi, vf]`
    ///
    /// Every value the schedule produces lies between these two.
    fn bounds(&self) -> [f32; 2];
}

fn validate(rate: f32, vi: f32, vf: f32) -> Result<()> {
    ((rate >= 0.0 && vi > vf) || (rate < 0.0 && vi < vf))
        .then_some(())
        .ok_or_else(|| Error::Config(String::from("`vi - vf` must have same sign as `rate`")))
}

/// For schedules that approach `vf` from either side as long as `rate` is positive
fn validate_converging(rate: f32, vi: f32, vf: f32) -> Result<()> {
    if !(vi.is_finite() && vf.is_finite()) {
        return Err(Error::Config(String::from("`vi` and `vf` must be finite")));
    }
    (rate > 0.0 && rate.is_finite())
        .then_some(())
        .ok_or_else(|| Error::Config(format!("`rate` ({rate}) must be positive")))
}

/// A constant value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constant {
    value: f32,
}

impl Constant {
    pub fn new(value: f32) -> Self {
        Self { value }
    }
}

impl Decay for Constant {
    fn evaluate(&self, _t: f32) -> f32 {
        self.value
    }

    fn bounds(&self) -> [f32; 2] {
        [self.value, self.value]
    }
}

/// v(t) = v<sub>f</sub> + (v<sub>i</sub> - v<sub>f</sub>) * e<sup>-rt</sup>
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exponential {
    rate: f32,
    vi: f32,
    vf: f32,
}

impl Exponential {
    pub fn new(rate: f32, vi: f32, vf: f32) -> Result<Self> {
        validate_converging(rate, vi, vf)?;
        Ok(Self { rate, vi, vf })
    }
}

impl Decay for Exponential {
    fn evaluate(&self, t: f32) -> f32 {
        let &Self { rate, vi, vf } = self;
        vf + (vi - vf) * (-rate * t).exp()
    }

    fn bounds(&self) -> [f32; 2] {
        [self.vi, self.vf]
    }
}

/// v(t) = v<sub>f</sub> + (v<sub>i</sub> - v<sub>f</sub>) / (1 + rt)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InverseTime {
    rate: f32,
    vi: f32,
    vf: f32,
}

impl InverseTime {
    pub fn new(rate: f32, vi: f32, vf: f32) -> Result<Self> {
        validate_converging(rate, vi, vf)?;
        Ok(Self { rate, vi, vf })
    }
}

impl Decay for InverseTime {
    fn evaluate(&self, t: f32) -> f32 {
        let &Self { rate, vi, vf } = self;
        vf + (vi - vf) / (1.0 + rate * t)
    }

    fn bounds(&self) -> [f32; 2] {
        [self.vi, self.vf]
    }
}

/// v(t) = v<sub>i</sub> - rt, stopping at v<sub>f</sub>
///
/// A negative `rate` makes the value grow from `vi` up to `vf`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Linear {
    rate: f32,
    vi: f32,
    vf: f32,
}

impl Linear {
    pub fn new(rate: f32, vi: f32, vf: f32) -> Result<Self> {
        validate(rate, vi, vf)?;
        Ok(Self { rate, vi, vf })
    }
}

impl Decay for Linear {
    fn evaluate(&self, t: f32) -> f32 {
        let &Self { rate, vi, vf } = self;
        let v = vi - rate * t;
        if vi > vf {
            v.max(vf)
        } else {
            v.min(vf)
        }
    }

    fn bounds(&self) -> [f32; 2] {
        [self.vi, self.vf]
    }
}

/// v(t) = max(v<sub>i</sub> * r<sup>floor(t/s)</sup>, v<sub>f</sub>)
///
/// With `s = 1` this multiplies the value by `r` once per episode until it reaches the floor.
/// Only decaying schedules are supported: `0 < r <= 1` and `0 <= vf < vi`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Step {
    rate: f32,
    vi: f32,
    vf: f32,
    step: f32,
}

impl Step {
    pub fn new(rate: f32, vi: f32, vf: f32, step: f32) -> Result<Self> {
        validate(rate, vi, vf)?;
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(Error::Config(format!(
                "Invalid value for `rate` ({rate}). Must be in the interval (0, 1]."
            )));
        }
        if !(vf >= 0.0 && vi.is_finite()) {
            return Err(Error::Config(String::from(
                "`vf` must be non-negative and `vi` finite",
            )));
        }
        if !(step > 0.0) {
            return Err(Error::Config(String::from("`step` must be positive")));
        }
        Ok(Self { rate, vi, vf, step })
    }
}

impl Decay for Step {
    fn evaluate(&self, t: f32) -> f32 {
        let &Self { rate, vi, vf, step } = self;
        (vi * rate.powf((t / step).floor())).max(vf)
    }

    fn bounds(&self) -> [f32; 2] {
        [self.vi, self.vf]
    }
}
