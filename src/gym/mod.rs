pub mod maze;

pub use maze::{Action, Grid, Maze, MazeConfig};
