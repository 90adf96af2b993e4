use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use maze_rl::{
    algo::{QTableAgent, QTableAgentConfig},
    decay,
    exploration::EpsilonGreedy,
    gym::{maze::generate, Grid, Maze, MazeConfig},
    train::{Plateau, TrainConfig, Trainer},
};
use rand::{rngs::StdRng, SeedableRng};
use tracing_subscriber::EnvFilter;

/// Train a Q-table agent on a maze and print the greedy path it learned
#[derive(Parser)]
struct Args {
    /// Maze file, either a cell map or a wall-segment file. Generated when omitted
    #[arg(short, long)]
    maze: Option<PathBuf>,
    /// Rows of the generated maze
    #[arg(long, default_value_t = 6)]
    rows: usize,
    /// Columns of the generated maze
    #[arg(long, default_value_t = 8)]
    cols: usize,
    #[arg(short, long, default_value_t = 2000)]
    episodes: usize,
    #[arg(short, long, default_value_t = 0)]
    seed: u64,
    #[arg(long, default_value_t = 0.5)]
    alpha: f32,
    #[arg(long, default_value_t = 0.99)]
    gamma: f32,
    /// Multiplier applied to epsilon after every episode, in (0, 1]
    #[arg(long, default_value_t = 0.995)]
    decay: f32,
    /// Probability that a move is replaced by a random one
    #[arg(long, default_value_t = 0.0)]
    slip: f32,
    /// Stop once the mean reward over this many episodes stops changing
    #[arg(long)]
    plateau: Option<usize>,
    /// Write one csv row per episode to this file
    #[arg(short, long)]
    out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let grid = match &args.maze {
        Some(path) => {
            Grid::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => generate(args.rows, args.cols, &mut StdRng::seed_from_u64(args.seed))?,
    };
    println!("{grid}");

    let mut env = Maze::new(
        grid,
        MazeConfig {
            slip: args.slip,
            seed: args.seed,
            ..Default::default()
        },
    )?;
    let config = QTableAgentConfig {
        alpha: args.alpha,
        gamma: args.gamma,
        exploration: EpsilonGreedy::new(decay::Step::new(args.decay, 1.0, 0.01, 1.0)?)?,
        ..Default::default()
    };
    let mut agent = QTableAgent::new(&env, config)?;

    let mut trainer = Trainer::new(TrainConfig {
        episodes: args.episodes,
        seed: args.seed,
        plateau: args.plateau.map(|window| Plateau {
            window,
            tolerance: 1.0,
        }),
    })?;
    let report = trainer.run(&mut agent, &mut env)?;

    if let Some(path) = &args.out {
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(["episode", "steps", "reward", "status"])?;
        for (i, episode) in report.episodes.iter().enumerate() {
            wtr.write_record(&[
                i.to_string(),
                episode.steps.to_string(),
                episode.reward.to_string(),
                format!("{:?}", episode.status),
            ])?;
        }
        wtr.flush()?;
    }

    println!(
        "{} episodes, {} reached the goal, mean reward of the last 100: {:.2}",
        report.episodes.len(),
        report.successes(),
        report.mean_reward(100).unwrap_or_default()
    );

    let path = agent.solve(&mut env)?;
    let shortest = env
        .grid()
        .shortest_path_len()
        .context("goal unreachable")?;
    println!(
        "Greedy path: {} steps (shortest {shortest}), {}",
        path.steps(),
        if path.reached_goal() { "reached the goal" } else { "timed out" }
    );
    println!("{}", render(env.grid(), &path.states));

    Ok(())
}

/// The cell map with the visited cells marked
fn render(grid: &Grid, states: &[(usize, usize)]) -> String {
    let mut rows = grid
        .to_string()
        .lines()
        .map(|l| l.chars().collect::<Vec<_>>())
        .collect::<Vec<_>>();
    for &(r, c) in states {
        if rows.get(r).and_then(|row| row.get(c)) == Some(&'.') {
            rows[r][c] = '*';
        }
    }
    rows.into_iter()
        .map(|row| row.into_iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}
