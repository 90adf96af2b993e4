use std::str::FromStr;

use log::trace;
use rand::{rngs::StdRng, Rng, SeedableRng};
use strum::{Display, EnumIter, IntoStaticStr, VariantArray};

use crate::{
    ensure_interval,
    env::{DiscreteActionSpace, DiscreteStateSpace, Environment, Status, Transition},
    error::{Error, Result},
};

mod generate;
pub mod grid;

pub use generate::generate;
pub use grid::{Cell, Grid, Pos};

/// A move to one of the four neighbouring cells
///
/// The declaration order is the enumeration order agents use to break ties.
#[derive(
    EnumIter,
    VariantArray,
    Display,
    IntoStaticStr,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum Action {
    Up,
    Down,
    Left,
    Right,
}

impl Action {
    /// The cell this action leads to from `pos`, ignoring walls and the far edges of the grid
    ///
    /// **Returns** `None` when the move would leave the grid through the top or left edge.
    pub fn apply(self, (r, c): Pos) -> Option<Pos> {
        match self {
            Action::Up => r.checked_sub(1).map(|r| (r, c)),
            Action::Down => Some((r + 1, c)),
            Action::Left => c.checked_sub(1).map(|c| (r, c)),
            Action::Right => Some((r, c + 1)),
        }
    }
}

/// Decode an action from its index in the enumeration
impl TryFrom<usize> for Action {
    type Error = Error;

    fn try_from(ix: usize) -> Result<Self> {
        Action::VARIANTS
            .get(ix)
            .copied()
            .ok_or_else(|| Error::InvalidAction(format!("index {ix}")))
    }
}

/// Decode an action from its lowercase name
impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "up" => Ok(Action::Up),
            "down" => Ok(Action::Down),
            "left" => Ok(Action::Left),
            "right" => Ok(Action::Right),
            _ => Err(Error::InvalidAction(format!("`{s}`"))),
        }
    }
}

/// Rewards and limits of a [`Maze`]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct MazeConfig {
    /// Reward for moving into a free cell
    ///
    /// **Default**: `-1.0`
    pub step_reward: f32,
    /// Reward for a move blocked by a wall, a barrier, or the edge of the grid
    ///
    /// **Default**: `-5.0`
    pub bump_reward: f32,
    /// Reward for the move that enters a goal
    ///
    /// **Default**: `100.0`
    pub goal_reward: f32,
    /// Number of steps after which an episode is truncated
    ///
    /// **Default**: `None`, meaning `max(200, rows * cols)`
    pub max_steps: Option<usize>,
    /// Probability that the chosen action is replaced by a uniformly random one
    ///
    /// **Default**: `0.0` (deterministic)
    pub slip: f32,
    /// Seed for the random source behind `slip`
    ///
    /// **Default**: `0`
    pub seed: u64,
}

impl Default for MazeConfig {
    fn default() -> Self {
        Self {
            step_reward: -1.0,
            bump_reward: -5.0,
            goal_reward: 100.0,
            max_steps: None,
            slip: 0.0,
            seed: 0,
        }
    }
}

/// A grid maze in which an agent walks from the start cell to a goal
///
/// Blocked moves leave the agent where it is and cost [`MazeConfig::bump_reward`]. This is
/// part of the dynamics rather than an error: the action set is the same in every cell and
/// the agent learns to avoid walls through the reward alone.
///
/// An episode ends with [`Status::Terminated`] when a goal is entered, or with
/// [`Status::Truncated`] once the step limit is reached. After either, [`reset`](Environment::reset)
/// must be called before stepping again.
///
/// Intended for use with a [QTableAgent](crate::algo::tabular::q_table::QTableAgent)
#[derive(Debug, Clone)]
pub struct Maze {
    grid: Grid,
    config: MazeConfig,
    step_limit: usize,
    state: Pos,
    steps: usize,
    over: bool,
    rng: StdRng,
}

impl Maze {
    /// **Errors** if `slip` is outside `[0,1]`, a reward is not finite, or `max_steps` is zero
    pub fn new(grid: Grid, config: MazeConfig) -> Result<Self> {
        ensure_interval!(config.slip, 0.0, 1.0);
        for (name, reward) in [
            ("step_reward", config.step_reward),
            ("bump_reward", config.bump_reward),
            ("goal_reward", config.goal_reward),
        ] {
            if !reward.is_finite() {
                return Err(Error::Config(format!("`{name}` must be finite")));
            }
        }
        if config.max_steps == Some(0) {
            return Err(Error::Config(String::from("`max_steps` must be positive")));
        }

        let step_limit = config
            .max_steps
            .unwrap_or_else(|| (grid.rows() * grid.cols()).max(200));
        Ok(Self {
            state: grid.start(),
            rng: StdRng::seed_from_u64(config.seed),
            grid,
            config,
            step_limit,
            steps: 0,
            over: false,
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn config(&self) -> &MazeConfig {
        &self.config
    }

    /// Current position of the agent
    pub fn state(&self) -> Pos {
        self.state
    }

    /// Steps taken in the current episode
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Steps after which an episode is truncated
    pub fn step_limit(&self) -> usize {
        self.step_limit
    }
}

impl Environment for Maze {
    type State = Pos;
    type Action = Action;

    fn reset(&mut self) -> Self::State {
        self.state = self.grid.start();
        self.steps = 0;
        self.over = false;
        self.state
    }

    fn step(&mut self, action: Self::Action) -> Result<Transition<Self::State>> {
        if self.over {
            return Err(Error::EpisodeOver);
        }

        let action = if self.config.slip > 0.0 && self.rng.gen::<f32>() < self.config.slip {
            Action::VARIANTS[self.rng.gen_range(0..Action::VARIANTS.len())]
        } else {
            action
        };

        self.steps += 1;
        let from = self.state;
        let (state, mut reward) = match action
            .apply(from)
            .filter(|&to| self.grid.can_move(from, to))
        {
            Some(to) => (to, self.config.step_reward),
            None => (from, self.config.bump_reward),
        };
        self.state = state;

        let status = if self.grid.is_goal(state) {
            reward = self.config.goal_reward;
            Status::Terminated
        } else if self.steps >= self.step_limit {
            Status::Truncated
        } else {
            Status::Running
        };
        self.over = status.is_done();

        trace!("{from:?} --{action}--> {state:?} ({reward}, {status:?})");
        Ok(Transition {
            state,
            reward,
            status,
        })
    }
}

impl DiscreteActionSpace for Maze {
    fn action_space(&self) -> Vec<Self::Action> {
        Action::VARIANTS.to_vec()
    }
}

impl DiscreteStateSpace for Maze {
    fn state_space(&self) -> Vec<Self::State> {
        self.grid.reachable()
    }
}
