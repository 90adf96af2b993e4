use std::fmt::Debug;

use log::info;
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    algo::tabular::{
        q_table::{Episode, QTableAgent},
        Hashable,
    },
    decay::Decay,
    env::{DiscreteActionSpace, DiscreteStateSpace, Environment},
    error::{Error, Result},
};

/// Convergence criterion: the moving average of episode rewards stopped changing
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Plateau {
    /// Number of episodes in each averaging window
    pub window: usize,
    /// Largest difference between the last two window averages that still counts as flat
    pub tolerance: f32,
}

impl Plateau {
    /// Whether the mean reward of the last `window` episodes is within `tolerance` of
    /// the mean of the `window` episodes before them
    pub fn reached(&self, episodes: &[Episode]) -> bool {
        let n = episodes.len();
        if self.window == 0 || n < self.window.saturating_mul(2) {
            return false;
        }
        let mean = |w: &[Episode]| w.iter().map(|e| e.reward).sum::<f32>() / w.len() as f32;
        let last = mean(&episodes[n - self.window..]);
        let previous = mean(&episodes[n - 2 * self.window..n - self.window]);
        (last - previous).abs() <= self.tolerance
    }
}

/// Configuration for the [`Trainer`]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct TrainConfig {
    /// Maximum number of episodes
    ///
    /// **Default**: `2000`
    pub episodes: usize,
    /// Seed for the agent's exploration
    ///
    /// **Default**: `0`
    pub seed: u64,
    /// Stop early once rewards plateau
    ///
    /// **Default**: `None`, always run every episode
    pub plateau: Option<Plateau>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            episodes: 2000,
            seed: 0,
            plateau: None,
        }
    }
}

/// Outcome of a training run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainReport {
    /// Every completed episode, in order
    pub episodes: Vec<Episode>,
    /// Number of episodes after which the plateau criterion was met
    pub converged_at: Option<usize>,
}

impl TrainReport {
    /// Number of episodes that reached a terminal state
    pub fn successes(&self) -> usize {
        self.episodes
            .iter()
            .filter(|e| e.status.is_terminal())
            .count()
    }

    /// Mean reward of the last `last` episodes, `None` if there are none
    pub fn mean_reward(&self, last: usize) -> Option<f32> {
        let tail = &self.episodes[self.episodes.len().saturating_sub(last)..];
        (!tail.is_empty()).then(|| tail.iter().map(|e| e.reward).sum::<f32>() / tail.len() as f32)
    }
}

/// Drives a [`QTableAgent`] through repeated episodes
///
/// The trainer owns the seeded random source used for exploration, so a given config,
/// agent and environment always produce the same run.
pub struct Trainer {
    config: TrainConfig,
    rng: StdRng,
}

impl Trainer {
    /// **Errors** if the plateau window is zero or its tolerance is negative or not finite
    pub fn new(config: TrainConfig) -> Result<Self> {
        if let Some(Plateau { window, tolerance }) = config.plateau {
            if window == 0 {
                return Err(Error::Config(String::from("plateau `window` must be positive")));
            }
            if !(tolerance >= 0.0 && tolerance.is_finite()) {
                return Err(Error::Config(format!(
                    "plateau `tolerance` ({tolerance}) must be finite and non-negative"
                )));
            }
        }
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
        })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Train for the configured number of episodes, or until rewards plateau
    pub fn run<E, D>(&mut self, agent: &mut QTableAgent<E, D>, env: &mut E) -> Result<TrainReport>
    where
        E: Environment + DiscreteActionSpace + DiscreteStateSpace,
        E::State: Hashable + Debug,
        E::Action: Hashable + Debug,
        D: Decay,
    {
        self.run_until(agent, env, |_| false)
    }

    /// Like [`run`](Self::run), but also stops as soon as `should_stop` returns true
    ///
    /// The predicate is checked between episodes only, so an episode is never cut short.
    pub fn run_until<E, D, F>(
        &mut self,
        agent: &mut QTableAgent<E, D>,
        env: &mut E,
        mut should_stop: F,
    ) -> Result<TrainReport>
    where
        E: Environment + DiscreteActionSpace + DiscreteStateSpace,
        E::State: Hashable + Debug,
        E::Action: Hashable + Debug,
        D: Decay,
        F: FnMut(&TrainReport) -> bool,
    {
        let total = self.config.episodes;
        let progress_every = (total / 10).max(1);
        let mut report = TrainReport {
            episodes: Vec::with_capacity(total),
            converged_at: None,
        };

        info!("Starting training for {total} episodes");
        for i in 0..total {
            if should_stop(&report) {
                info!("Training stopped after {i} episodes");
                break;
            }
            if i > 0 && i % progress_every == 0 {
                info!("Training... {}% complete", i * 100 / total);
            }

            let episode = agent.go(env, &mut self.rng)?;
            report.episodes.push(episode);

            if let Some(plateau) = self.config.plateau {
                if plateau.reached(&report.episodes) {
                    report.converged_at = Some(i + 1);
                    info!("Rewards plateaued after {} episodes", i + 1);
                    break;
                }
            }
        }

        info!(
            "Training finished: {} episodes, {} reached the goal",
            report.episodes.len(),
            report.successes()
        );
        Ok(report)
    }
}
