use crate::error::Result;

/// Represents a Markov decision process, defining the dynamics of an environment
/// in which an agent can operate.
///
/// This base trait represents the common case of a discrete-time MDP with one agent.
/// An environment is a state machine: [`reset`](Environment::reset) opens an episode
/// and [`step`](Environment::step) advances it until the returned [`Transition`] is done.
pub trait Environment {
    /// A representation of the state of the environment to be passed to an agent
    type State;

    /// A representation of an action that an agent can take to affect the environment
    type Action;

    /// Reset the environment to an initial state
    ///
    /// **Returns** the state
    fn reset(&mut self) -> Self::State;

    /// Update the environment in response to an action taken by an agent, producing a new state and associated reward
    ///
    /// **Errors** if the action is not part of the action space or the episode is already over
    fn step(&mut self, action: Self::Action) -> Result<Transition<Self::State>>;
}

/// An environment whose action set is finite and identical in every state
pub trait DiscreteActionSpace: Environment {
    /// Get every action, in a fixed enumeration order
    ///
    /// The returned vec should never be empty.
    fn action_space(&self) -> Vec<Self::Action>;
}

/// An environment with a finite, enumerable set of valid states
pub trait DiscreteStateSpace: Environment {
    /// Get every state an agent can occupy
    fn state_space(&self) -> Vec<Self::State>;
}

/// How an episode stands after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Status {
    /// The episode continues
    Running,
    /// A terminal state was reached
    Terminated,
    /// The step limit was hit before a terminal state
    Truncated,
}

impl Status {
    /// True for both terminal statuses
    pub fn is_done(self) -> bool {
        !matches!(self, Status::Running)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Terminated)
    }

    pub fn is_truncated(self) -> bool {
        matches!(self, Status::Truncated)
    }
}

/// The outcome of a single [`step`](Environment::step)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition<S> {
    /// The state of the environment after the action is taken
    pub state: S,
    /// The reward received for taking the action
    pub reward: f32,
    /// Whether the episode continues, terminated or was truncated
    pub status: Status,
}

impl<S> Transition<S> {
    pub fn is_done(&self) -> bool {
        self.status.is_done()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::error::Error;

    use super::*;

    /// A corridor `0 -> 1 -> ... -> len - 1` with integer actions
    ///
    /// Actions `0` (back) and `1` (forward) are valid, anything else is rejected.
    /// Reaching the last cell terminates with reward `1`, every other step costs `0`.
    pub struct MockEnv {
        pub pos: usize,
        pub len: usize,
    }

    impl MockEnv {
        pub fn new(len: usize) -> Self {
            Self { pos: 0, len }
        }
    }

    impl Environment for MockEnv {
        type State = usize;
        type Action = usize;

        fn reset(&mut self) -> Self::State {
            self.pos = 0;
            self.pos
        }

        fn step(&mut self, action: Self::Action) -> Result<Transition<Self::State>> {
            match action {
                0 => self.pos = self.pos.saturating_sub(1),
                1 => self.pos = (self.pos + 1).min(self.len - 1),
                _ => return Err(Error::InvalidAction(action.to_string())),
            }
            let (reward, status) = if self.pos == self.len - 1 {
                (1.0, Status::Terminated)
            } else {
                (0.0, Status::Running)
            };
            Ok(Transition {
                state: self.pos,
                reward,
                status,
            })
        }
    }

    impl DiscreteActionSpace for MockEnv {
        fn action_space(&self) -> Vec<Self::Action> {
            vec![0, 1]
        }
    }

    impl DiscreteStateSpace for MockEnv {
        fn state_space(&self) -> Vec<Self::State> {
            (0..self.len).collect()
        }
    }

    #[test]
    fn status_flags() {
        assert!(!Status::Running.is_done());
        assert!(Status::Terminated.is_done() && Status::Terminated.is_terminal());
        assert!(Status::Truncated.is_done() && Status::Truncated.is_truncated());
        assert!(!Status::Truncated.is_terminal(), "Timeout is not success");
    }

    #[test]
    fn mock_env_functional() {
        let mut env = MockEnv::new(3);
        assert_eq!(env.reset(), 0);
        assert_eq!(env.step(1).unwrap().state, 1);
        let last = env.step(1).unwrap();
        assert_eq!(last.state, 2);
        assert!(last.status.is_terminal());
        assert!(matches!(env.step(5), Err(Error::InvalidAction(_))));
    }
}
