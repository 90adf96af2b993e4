use rand::Rng;

use crate::{decay::Decay, ensure_interval, error::Result};

use super::Choice;

/// Epsilon greedy exploration policy with time-decaying epsilon threshold
///
/// The random source is passed in on every call so that a fixed seed reproduces
/// the same sequence of choices.
#[derive(Debug, Clone)]
pub struct EpsilonGreedy<D: Decay> {
    epsilon: D,
}

impl<D: Decay> EpsilonGreedy<D> {
    /// Initialize epsilon greedy policy with a decay strategy
    ///
    /// **Errors** if either end of the schedule is outside `[0,1]`
    pub fn new(decay: D) -> Result<Self> {
        let [start, end] = decay.bounds();
        ensure_interval!(start, 0.0, 1.0);
        ensure_interval!(end, 0.0, 1.0);
        Ok(Self { epsilon: decay })
    }

    /// Epsilon threshold at the given episode
    pub fn epsilon(&self, episode: u32) -> f32 {
        self.epsilon.evaluate(episode as f32)
    }

    /// Invoke epsilon greedy policy for current episode
    ///
    /// Epsilon `0` always exploits and epsilon `1` always explores.
    pub fn choose<R: Rng>(&self, episode: u32, rng: &mut R) -> Choice {
        let epsilon = self.epsilon(episode);
        if rng.gen::<f32>() < epsilon {
            Choice::Explore
        } else {
            Choice::Exploit
        }
    }
}
