use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
};

use log::{debug, warn};
use rand::Rng;

use crate::{
    decay::{self, Decay},
    ensure_interval,
    env::{DiscreteActionSpace, DiscreteStateSpace, Environment, Status, Transition},
    error::{Error, Result},
    exploration::{Choice, EpsilonGreedy},
};

use super::Hashable;

/// A lazily filled table of action values
///
/// Pairs that were never written read as the table's default value; nothing is stored
/// for them until the first write.
///
/// Two tables are equal when they hold the same values and default, regardless of the
/// order in which the values were written.
#[derive(Debug, Clone)]
pub struct QTable<S: Hashable, A: Hashable> {
    values: HashMap<(S, A), f32>,
    states: Vec<S>, // in order of first write
    seen: HashSet<S>,
    default_value: f32,
}

impl<S: Hashable, A: Hashable> PartialEq for QTable<S, A> {
    fn eq(&self, other: &Self) -> bool {
        self.default_value == other.default_value && self.values == other.values
    }
}

impl<S: Hashable, A: Hashable> QTable<S, A> {
    pub fn new(default_value: f32) -> Self {
        Self::with_capacity(0, default_value)
    }

    pub fn with_capacity(capacity: usize, default_value: f32) -> Self {
        Self {
            values: HashMap::with_capacity(capacity),
            states: Vec::new(),
            seen: HashSet::new(),
            default_value,
        }
    }

    /// The value of a pair, or the default value if it was never written
    pub fn get(&self, state: S, action: A) -> f32 {
        self.values
            .get(&(state, action))
            .copied()
            .unwrap_or(self.default_value)
    }

    pub fn set(&mut self, state: S, action: A, value: f32) {
        if self.seen.insert(state) {
            self.states.push(state);
        }
        self.values.insert((state, action), value);
    }

    /// States with at least one written pair, in the order they were first written
    pub fn states(&self) -> &[S] {
        &self.states
    }

    /// Whether the pair has been written
    pub fn contains(&self, state: S, action: A) -> bool {
        self.values.contains_key(&(state, action))
    }

    /// The best value of `state` over `actions`, or the default value if `actions` is empty
    pub fn max_value(&self, state: S, actions: &[A]) -> f32 {
        actions
            .iter()
            .map(|&a| self.get(state, a))
            .reduce(f32::max)
            .unwrap_or(self.default_value)
    }

    /// The action with the highest value in `state`
    ///
    /// Ties go to the action that comes first in `actions`.
    pub fn greedy(&self, state: S, actions: &[A]) -> Option<A> {
        actions
            .iter()
            .map(|&a| (a, self.get(state, a)))
            .reduce(|best, next| if next.1 > best.1 { next } else { best })
            .map(|(a, _)| a)
    }

    pub fn default_value(&self) -> f32 {
        self.default_value
    }

    /// Number of written pairs
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.states.clear();
        self.seen.clear();
    }

    /// Written pairs and their values, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = ((S, A), f32)> + '_ {
        self.values.iter().map(|(&k, &v)| (k, v))
    }
}

/// Configuration for the [`QTableAgent`]
pub struct QTableAgentConfig<D: Decay = decay::Step> {
    /// Learning rate α, in `(0, 1]`
    ///
    /// **Default**: `0.5`
    pub alpha: f32,
    /// Discount factor γ, in `[0, 1]`
    ///
    /// **Default**: `0.99`
    pub gamma: f32,
    /// Exploration policy; epsilon advances once per episode
    ///
    /// **Default**: epsilon starts at `1.0` and is multiplied by `0.999` every episode down to `0.01`
    pub exploration: EpsilonGreedy<D>,
    /// Value of pairs that were never updated
    ///
    /// **Default**: `0.0`
    pub default_value: f32,
}

impl Default for QTableAgentConfig<decay::Step> {
    fn default() -> Self {
        let schedule = decay::Step::new(0.999, 1.0, 0.01, 1.0).expect("valid schedule");
        Self {
            alpha: 0.5,
            gamma: 0.99,
            exploration: EpsilonGreedy::new(schedule).expect("epsilon within [0, 1]"),
            default_value: 0.0,
        }
    }
}

/// Summary of one episode run by [`QTableAgent::go`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Episode {
    pub steps: usize,
    pub reward: f32,
    /// [`Status::Terminated`] if a terminal state was reached, [`Status::Truncated`] on timeout
    pub status: Status,
}

/// The states visited by a greedy rollout, starting with the initial state
#[derive(Debug, Clone, PartialEq)]
pub struct Path<S> {
    pub states: Vec<S>,
    pub status: Status,
}

impl<S> Path<S> {
    pub fn steps(&self) -> usize {
        self.states.len().saturating_sub(1)
    }

    pub fn reached_goal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A Q-learning agent that utilizes a Q-table to learn its environment
///
/// After every transition the agent applies
///
/// Q(s,a) ← Q(s,a) + α(r + γ max<sub>a'</sub> Q(s',a') − Q(s,a))
///
/// where the bootstrap term γ max Q(s',a') is dropped on terminal transitions.
///
/// Learning is strictly sequential: each update is applied before the next action is
/// chosen. Independent training runs need independent agents.
///
/// ### Generics
/// - `E` - The [`Environment`] in which the agent will learn
///     - The environment's state and action spaces must both be discrete because a Q value will be recorded for each state action pair
///     - For the same reason, the state and action types must be [`Hashable`] to be used as keys in a [`HashMap`]
/// - `D` - The decay strategy of the exploration rate
pub struct QTableAgent<E, D = decay::Step>
where
    E: Environment + DiscreteActionSpace + DiscreteStateSpace,
    E::State: Hashable + Debug,
    E::Action: Hashable + Debug,
    D: Decay,
{
    q_table: QTable<E::State, E::Action>,
    actions: Vec<E::Action>,
    states: Vec<E::State>,
    exploration: EpsilonGreedy<D>,
    alpha: f32,   // learning rate
    gamma: f32,   // discount factor
    episode: u32, // completed episodes
}

impl<E, D> QTableAgent<E, D>
where
    E: Environment + DiscreteActionSpace + DiscreteStateSpace,
    E::State: Hashable + Debug,
    E::Action: Hashable + Debug,
    D: Decay,
{
    /// Initialize a new `QTableAgent` for a given environment
    ///
    /// The environment's action space is read once and fixes the agent's decision space and
    /// its tie-breaking order; the state space sizes the table.
    ///
    /// **Errors** if `alpha` is not in `(0,1]`, `gamma` is not in `[0,1]`, the default value
    /// is not finite, or the environment declares no actions
    pub fn new(env: &E, config: QTableAgentConfig<D>) -> Result<Self> {
        let QTableAgentConfig {
            alpha,
            gamma,
            exploration,
            default_value,
        } = config;
        ensure_interval!(alpha, 0.0, 1.0);
        if alpha == 0.0 {
            return Err(Error::Config(String::from(
                "Invalid value for `alpha` (0). Must be in the interval (0, 1].",
            )));
        }
        ensure_interval!(gamma, 0.0, 1.0);
        if !default_value.is_finite() {
            return Err(Error::Config(String::from("`default_value` must be finite")));
        }

        let actions = env.action_space();
        if actions.is_empty() {
            return Err(Error::Config(String::from(
                "environment declares no actions",
            )));
        }
        let states = env.state_space();

        Ok(Self {
            q_table: QTable::with_capacity(states.len() * actions.len(), default_value),
            actions,
            states,
            exploration,
            alpha,
            gamma,
            episode: 0,
        })
    }

    pub fn q_table(&self) -> &QTable<E::State, E::Action> {
        &self.q_table
    }

    #[cfg(any(test, feature = "serde"))]
    pub(crate) fn q_table_mut(&mut self) -> &mut QTable<E::State, E::Action> {
        &mut self.q_table
    }

    /// The declared action space, in enumeration order
    pub fn actions(&self) -> &[E::Action] {
        &self.actions
    }

    pub fn value(&self, state: E::State, action: E::Action) -> f32 {
        self.q_table.get(state, action)
    }

    /// Number of completed episodes
    pub fn episode(&self) -> u32 {
        self.episode
    }

    /// Exploration rate for the current episode
    pub fn epsilon(&self) -> f32 {
        self.exploration.epsilon(self.episode)
    }

    /// Advance the exploration schedule by one episode
    pub fn end_episode(&mut self) {
        self.episode += 1;
    }

    /// Choose an action based on the current state and exploration policy
    ///
    /// With probability epsilon a uniformly random action, otherwise [`best_action`](Self::best_action).
    /// Only `rng` is advanced; the table is left untouched.
    pub fn choose_action<R: Rng>(&self, state: E::State, rng: &mut R) -> E::Action {
        match self.exploration.choose(self.episode, rng) {
            Choice::Explore => self.actions[rng.gen_range(0..self.actions.len())],
            Choice::Exploit => self.best_action(state),
        }
    }

    /// The greedy action for `state`, ties going to the first action in enumeration order
    pub fn best_action(&self, state: E::State) -> E::Action {
        self.q_table
            .greedy(state, &self.actions)
            .unwrap_or(self.actions[0])
    }

    /// Apply the Q-learning update for one observed transition
    ///
    /// `done` marks a terminal transition, for which the bootstrap term is excluded. A state
    /// that has never been seen enters the table at the default value.
    ///
    /// **Errors** with [`Error::InvalidAction`] if `action` is not in the declared action
    /// space; the table is left unchanged.
    pub fn update(
        &mut self,
        state: E::State,
        action: E::Action,
        reward: f32,
        next_state: E::State,
        done: bool,
    ) -> Result<()> {
        if !self.actions.contains(&action) {
            return Err(Error::InvalidAction(format!(
                "{action:?} is not in the declared action space"
            )));
        }

        let q_value = self.q_table.get(state, action);
        let max_next_q = if done {
            0.0
        } else {
            self.q_table.max_value(next_state, &self.actions)
        };
        let target = reward + self.gamma * max_next_q;
        self.q_table
            .set(state, action, q_value + self.alpha * (target - q_value));

        Ok(())
    }

    /// The greedy action of every known state
    ///
    /// Covers the environment's state space, in its declared order, followed by any other
    /// state the table has seen, in the order it was first updated.
    pub fn policy(&self) -> Vec<(E::State, E::Action)> {
        let declared = self.states.iter().copied().collect::<HashSet<_>>();
        let extra = self
            .q_table
            .states()
            .iter()
            .copied()
            .filter(|s| !declared.contains(s));

        self.states
            .iter()
            .copied()
            .chain(extra)
            .map(|s| (s, self.best_action(s)))
            .collect()
    }

    /// Run the agent in the given environment for one episode, learning from every step
    ///
    /// Truncated transitions are learned from as non-terminal. The environment must end
    /// every episode eventually, through a terminal state or a step limit.
    pub fn go<R: Rng>(&mut self, env: &mut E, rng: &mut R) -> Result<Episode> {
        let mut state = env.reset();
        let mut steps = 0;
        let mut total = 0.0;

        let status = loop {
            let action = self.choose_action(state, rng);
            let Transition {
                state: next_state,
                reward,
                status,
            } = env.step(action)?;
            self.update(state, action, reward, next_state, status.is_terminal())?;

            steps += 1;
            total += reward;
            state = next_state;
            if status.is_done() {
                break status;
            }
        };

        let epsilon = self.epsilon();
        self.end_episode();
        debug!(
            "episode {}: {status:?} after {steps} steps, reward {total}, epsilon {epsilon:.3}",
            self.episode
        );

        Ok(Episode {
            steps,
            reward: total,
            status,
        })
    }

    /// Follow the greedy policy from the initial state without exploring or learning
    pub fn solve(&self, env: &mut E) -> Result<Path<E::State>> {
        let mut state = env.reset();
        let mut states = vec![state];
        loop {
            let t = env.step(self.best_action(state))?;
            states.push(t.state);
            state = t.state;
            if t.is_done() {
                if t.status.is_truncated() {
                    warn!(
                        "greedy rollout truncated after {} steps at {state:?}",
                        states.len() - 1
                    );
                }
                return Ok(Path {
                    states,
                    status: t.status,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use crate::env::tests::MockEnv;

    use super::*;

    fn agent(env: &MockEnv, epsilon: f32) -> QTableAgent<MockEnv, decay::Constant> {
        let config = QTableAgentConfig {
            alpha: 0.5,
            gamma: 0.9,
            exploration: EpsilonGreedy::new(decay::Constant::new(epsilon)).unwrap(),
            default_value: 0.0,
        };
        QTableAgent::new(env, config).unwrap()
    }

    #[test]
    fn q_table_lazy_default() {
        let mut table = QTable::<usize, usize>::new(0.25);
        assert_eq!(table.get(3, 1), 0.25, "Unseen pair reads the default");
        assert!(table.is_empty(), "Reading does not insert");

        table.set(3, 1, 2.0);
        assert_eq!(table.get(3, 1), 2.0);
        assert!(table.contains(3, 1));
        assert_eq!(table.max_value(3, &[0, 1, 2]), 2.0);
        assert_eq!(table.max_value(4, &[]), 0.25, "No actions reads the default");
    }

    #[test]
    fn q_table_greedy_ties_go_first() {
        let mut table = QTable::<usize, char>::new(0.0);
        assert_eq!(table.greedy(0, &['a', 'b', 'c']), Some('a'), "All tied");

        table.set(0, 'b', 1.0);
        table.set(0, 'c', 1.0);
        assert_eq!(table.greedy(0, &['a', 'b', 'c']), Some('b'), "First of the best");
        assert_eq!(table.greedy(0, &['c', 'b']), Some('c'), "Order is the caller's");
        assert_eq!(table.greedy(0, &[]), None);
    }

    #[test]
    fn rejects_bad_hyperparameters() {
        let env = MockEnv::new(3);
        let config = |alpha, gamma| QTableAgentConfig {
            alpha,
            gamma,
            ..Default::default()
        };
        for (alpha, gamma) in [(0.0, 0.9), (1.1, 0.9), (0.5, -0.1), (0.5, 1.5), (f32::NAN, 0.9)] {
            assert!(
                matches!(
                    QTableAgent::new(&env, config(alpha, gamma)),
                    Err(Error::Config(_))
                ),
                "alpha {alpha}, gamma {gamma} rejected"
            );
        }
        assert!(QTableAgent::new(&env, config(1.0, 0.0)).is_ok(), "Bounds are valid");
        assert!(EpsilonGreedy::new(decay::Constant::new(1.01)).is_err());
    }

    #[test]
    fn terminal_update_is_exact() {
        let env = MockEnv::new(3);
        let mut agent = agent(&env, 0.0);

        agent.update(0, 1, 1.0, 1, true).unwrap();
        assert_eq!(agent.value(0, 1), 0.5, "0 + 0.5 * (1 - 0)");

        // a large next-state value must not leak into a terminal update
        agent.q_table_mut().set(1, 0, 100.0);
        agent.update(0, 1, 1.0, 1, true).unwrap();
        assert_eq!(agent.value(0, 1), 0.75, "0.5 + 0.5 * (1 - 0.5)");
    }

    #[test]
    fn non_terminal_update_bootstraps() {
        let env = MockEnv::new(3);
        let mut agent = agent(&env, 0.0);
        agent.q_table_mut().set(0, 1, 0.75);
        agent.q_table_mut().set(1, 0, 0.2);
        agent.q_table_mut().set(1, 1, 0.5);

        agent.update(0, 1, 0.0, 1, false).unwrap();
        let expected = 0.75f32 + 0.5 * ((0.0 + 0.9 * 0.5) - 0.75);
        assert_eq!(agent.value(0, 1), expected, "Bootstraps from the best next action");
    }

    #[test]
    fn invalid_action_is_rejected() {
        let env = MockEnv::new(3);
        let mut agent = agent(&env, 0.0);
        let result = agent.update(0, 7, 1.0, 1, false);
        assert!(matches!(result, Err(Error::InvalidAction(_))));
        assert!(agent.q_table().is_empty(), "Table untouched");
    }

    #[test]
    fn unseen_states_grow_the_table() {
        let env = MockEnv::new(3);
        let mut agent = agent(&env, 0.0);
        agent.update(99, 0, -1.0, 100, false).unwrap();
        assert_eq!(agent.value(99, 0), -0.5);
        assert!(
            agent.policy().iter().any(|&(s, _)| s == 99),
            "Policy covers states outside the declared space"
        );
        assert_eq!(agent.policy().len(), 4);
    }

    #[test]
    fn q_tables_compare_by_contents() {
        let mut a = QTable::<(usize, usize), char>::new(0.0);
        let mut b = QTable::new(0.0);
        a.set((0, 1), 'x', 1.0);
        a.set((2, 3), 'y', -1.0);
        b.set((2, 3), 'y', -1.0);
        b.set((0, 1), 'x', 1.0);
        assert_eq!(a, b, "Insertion order does not matter");
        assert_eq!(a.clone(), a);

        b.set((0, 1), 'x', 2.0);
        assert_ne!(a, b, "Values differ");
        assert_ne!(QTable::<usize, char>::new(0.0), QTable::new(1.0), "Defaults differ");
    }

    #[test]
    fn policy_lists_extra_states_in_update_order() {
        let env = MockEnv::new(3);
        let mut agent = agent(&env, 0.0);
        for state in [99, 50, 1, 70, 50] {
            agent.update(state, 1, 1.0, 0, true).unwrap();
        }
        let states = agent.policy().into_iter().map(|(s, _)| s).collect::<Vec<_>>();
        assert_eq!(states, vec![0, 1, 2, 99, 50, 70], "Declared states first, then first updates");
        assert_eq!(agent.q_table().states(), &[99, 50, 1, 70]);
    }

    #[test]
    fn greedy_choice_is_pure() {
        let env = MockEnv::new(3);
        let mut agent = agent(&env, 0.0);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(agent.choose_action(0, &mut rng), 0, "Tie goes to the first action");

        agent.update(0, 1, 1.0, 1, false).unwrap();
        let before = agent.q_table().clone();
        for _ in 0..10 {
            assert_eq!(agent.choose_action(0, &mut rng), 1);
        }
        assert_eq!(agent.q_table(), &before, "Choosing does not touch the table");
        assert_eq!(agent.best_action(0), 1);
    }

    #[test]
    fn exploration_is_reproducible() {
        let env = MockEnv::new(3);
        let agent = agent(&env, 0.5);
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..32)
                .map(|_| agent.choose_action(0, &mut rng))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(5), run(5), "Same seed, same actions");
        assert!(run(5).iter().all(|a| agent.actions().contains(a)));
    }

    #[test]
    fn go_runs_an_episode() {
        let mut env = MockEnv::new(4);
        let config = QTableAgentConfig {
            alpha: 0.5,
            gamma: 0.9,
            exploration: EpsilonGreedy::new(decay::Step::new(0.5, 1.0, 0.0, 1.0).unwrap())
                .unwrap(),
            default_value: 0.0,
        };
        let mut agent = QTableAgent::new(&env, config).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        assert_eq!(agent.epsilon(), 1.0);
        let episode = agent.go(&mut env, &mut rng).unwrap();
        assert_eq!(episode.status, Status::Terminated, "Corridor always ends");
        assert!(episode.steps >= 3, "At least the corridor length");
        assert_eq!(episode.reward, 1.0, "Only the final step pays");
        assert_eq!(agent.episode(), 1, "Episode counted");
        assert_eq!(agent.epsilon(), 0.5, "Epsilon advanced");
        assert!(agent.value(2, 1) > 0.0, "Terminal step learned");
    }

    #[test]
    fn solve_follows_the_learned_policy() {
        let mut env = MockEnv::new(4);
        let mut agent = agent(&env, 1.0);
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..50 {
            agent.go(&mut env, &mut rng).unwrap();
        }

        let path = agent.solve(&mut env).unwrap();
        assert_eq!(path.states, vec![0, 1, 2, 3], "Walks straight to the end");
        assert_eq!(path.steps(), 3);
        assert!(path.reached_goal());
    }
}
