use rand::{seq::SliceRandom, Rng};

use crate::error::{Error, Result};

use super::grid::{cell_count, Cell, Grid, Pos};

/// Union-find over cell indices
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    /// Merge the sets of `a` and `b`, returning false if they were already one set
    fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        self.parent[ra] = rb;
        true
    }
}

/// Generate a random perfect maze with randomized Kruskal's algorithm
///
/// Every cell is free and every pair of cells is joined by exactly one path; the maze
/// structure is made of barriers. The start is on a random row of the left border and
/// the goal on a random row of the right border.
///
/// **Errors** if `rows` is zero or `cols` is less than 2
pub fn generate<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Result<Grid> {
    if rows == 0 || cols < 2 {
        return Err(Error::Config(format!(
            "cannot generate a {rows}x{cols} maze, need at least 1 row and 2 columns"
        )));
    }
    let len = cell_count(rows, cols).map_err(|e| Error::Config(e.to_string()))?;

    let ix = |(r, c): Pos| r * cols + c;
    let mut edges = Vec::new();
    for r in 0..rows {
        for c in 0..cols {
            if c + 1 < cols {
                edges.push(((r, c), (r, c + 1)));
            }
            if r + 1 < rows {
                edges.push(((r, c), (r + 1, c)));
            }
        }
    }
    edges.shuffle(rng);

    let mut sets = DisjointSet::new(len);
    let barriers = edges
        .into_iter()
        .filter(|&(a, b)| !sets.union(ix(a), ix(b)))
        .collect::<Vec<_>>();

    let start = (rng.gen_range(0..rows), 0);
    let goal = (rng.gen_range(0..rows), cols - 1);
    let mut cells = vec![Cell::Free; len];
    cells[ix(start)] = Cell::Start;
    cells[ix(goal)] = Cell::Goal;

    Grid::new(rows, cols, cells, barriers)
}
