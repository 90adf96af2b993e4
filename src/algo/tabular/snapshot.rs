use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    decay::Decay,
    error::{Error, Result},
    gym::maze::{Action, Maze, Pos},
};

use super::q_table::QTableAgent;

/// A serializable copy of a maze agent's Q-table
///
/// Entries are keyed by the canonical encoding `row,col,action`, e.g. `"2,1,right"`,
/// and kept sorted so equal tables serialize identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QTableSnapshot {
    pub default_value: f32,
    pub entries: BTreeMap<String, f32>,
}

/// Encode a state-action pair as `row,col,action`
pub fn encode_key((r, c): Pos, action: Action) -> String {
    format!("{r},{c},{action}")
}

/// Decode a `row,col,action` key
///
/// **Errors** with [`Error::InvalidAction`] for an unknown action name and
/// [`Error::MalformedSnapshot`] for anything else that does not fit the pattern
pub fn decode_key(key: &str) -> Result<(Pos, Action)> {
    let malformed = || Error::MalformedSnapshot(key.to_string());
    let mut parts = key.split(',');
    let (Some(r), Some(c), Some(action), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };
    let r = r.trim().parse().map_err(|_| malformed())?;
    let c = c.trim().parse().map_err(|_| malformed())?;
    Ok(((r, c), action.trim().parse()?))
}

impl QTableSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl<D: Decay> QTableAgent<Maze, D> {
    /// Copy the learned values into a [`QTableSnapshot`]
    pub fn snapshot(&self) -> QTableSnapshot {
        let table = self.q_table();
        QTableSnapshot {
            default_value: table.default_value(),
            entries: table
                .iter()
                .map(|((state, action), value)| (encode_key(state, action), value))
                .collect(),
        }
    }

    /// Replace the learned values with those of a snapshot
    ///
    /// The snapshot's default value is ignored; unseen pairs keep the agent's default.
    ///
    /// **Errors** if a key does not decode or names an action outside the declared action
    /// space. Nothing is replaced in that case.
    pub fn restore(&mut self, snapshot: &QTableSnapshot) -> Result<()> {
        let entries = snapshot
            .entries
            .iter()
            .map(|(key, &value)| {
                let (state, action) = decode_key(key)?;
                if !self.actions().contains(&action) {
                    return Err(Error::InvalidAction(key.clone()));
                }
                if !value.is_finite() {
                    return Err(Error::MalformedSnapshot(format!("{key} = {value}")));
                }
                Ok((state, action, value))
            })
            .collect::<Result<Vec<_>>>()?;

        let table = self.q_table_mut();
        table.clear();
        for (state, action, value) in entries {
            table.set(state, action, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use crate::{
        algo::tabular::q_table::QTableAgentConfig, env::Environment, gym::maze::MazeConfig,
    };

    use super::*;

    #[test]
    fn key_encoding() {
        assert_eq!(encode_key((2, 1), Action::Right), "2,1,right");
        assert_eq!(decode_key("2,1,right").unwrap(), ((2, 1), Action::Right));
        assert!(matches!(decode_key("2,1,jump"), Err(Error::InvalidAction(_))));
        assert!(matches!(decode_key("2,right"), Err(Error::MalformedSnapshot(_))));
        assert!(matches!(decode_key("2,1,up,4"), Err(Error::MalformedSnapshot(_))));
        assert!(matches!(decode_key("x,1,up"), Err(Error::MalformedSnapshot(_))));
    }

    #[test]
    fn snapshot_restores_policy() {
        let grid = "S...\n.#..\n...G".parse().unwrap();
        let mut env = Maze::new(grid, MazeConfig::default()).unwrap();
        let mut agent = QTableAgent::new(&env, QTableAgentConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..200 {
            agent.go(&mut env, &mut rng).unwrap();
        }

        let json = agent.snapshot().to_json().unwrap();
        let snapshot = QTableSnapshot::from_json(&json).unwrap();
        assert_eq!(snapshot, agent.snapshot(), "JSON keeps every entry");

        let mut fresh = QTableAgent::new(&env, QTableAgentConfig::default()).unwrap();
        fresh.restore(&snapshot).unwrap();
        assert_eq!(fresh.q_table(), agent.q_table(), "Same table after restore");
        assert_eq!(fresh.policy(), agent.policy(), "Same greedy policy");

        env.reset();
        assert_eq!(
            fresh.solve(&mut env).unwrap(),
            agent.solve(&mut env).unwrap(),
            "Same greedy path"
        );
    }

    #[test]
    fn restore_rejects_bad_entries() {
        let grid = "S.G".parse().unwrap();
        let env = Maze::new(grid, MazeConfig::default()).unwrap();
        let mut agent = QTableAgent::new(&env, QTableAgentConfig::default()).unwrap();
        agent.update((0, 0), Action::Right, 1.0, (0, 1), false).unwrap();

        let snapshot = QTableSnapshot {
            default_value: 0.0,
            entries: BTreeMap::from([
                ("0,1,right".to_string(), 3.0),
                ("0,0,sideways".to_string(), 1.0),
            ]),
        };
        assert!(agent.restore(&snapshot).is_err());
        assert_eq!(agent.q_table().len(), 1, "Failed restore changes nothing");
    }
}
