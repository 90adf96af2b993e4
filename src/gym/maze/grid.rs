use std::{
    collections::{BTreeSet, HashSet, VecDeque},
    fmt, fs,
    ops::Index,
    path::Path,
    str::FromStr,
};

use crate::error::{Error, Result};

/// Cell coordinates as `(row, col)`, with `(0, 0)` in the top left corner
pub type Pos = (usize, usize);

/// A thin wall between two orthogonally adjacent cells, stored with the smaller position first
type Barrier = (Pos, Pos);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cell {
    Free,
    Wall,
    Start,
    Goal,
}

impl Cell {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '.' => Some(Cell::Free),
            '#' => Some(Cell::Wall),
            'S' => Some(Cell::Start),
            'G' => Some(Cell::Goal),
            _ => None,
        }
    }

    fn as_char(self) -> char {
        match self {
            Cell::Free => '.',
            Cell::Wall => '#',
            Cell::Start => 'S',
            Cell::Goal => 'G',
        }
    }

    /// Whether an agent can stand on this cell
    pub fn is_open(self) -> bool {
        self != Cell::Wall
    }
}

fn barrier(a: Pos, b: Pos) -> Barrier {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Number of cells in a `rows x cols` grid
pub(crate) fn cell_count(rows: usize, cols: usize) -> Result<usize> {
    rows.checked_mul(cols)
        .ok_or_else(|| Error::MalformedGrid(format!("a {rows}x{cols} grid is too large")))
}

fn is_adjacent(a: Pos, b: Pos) -> bool {
    a.0.abs_diff(b.0) + a.1.abs_diff(b.1) == 1
}

/// An immutable rectangular maze layout
///
/// Movement can be blocked in two ways: by [`Cell::Wall`] cells, and by thin barriers
/// between neighbouring cells. A grid always has exactly one start, at least one goal,
/// and at least one goal reachable from the start.
///
/// Two text formats are understood:
/// - a cell map (see [`FromStr`]) with one character per cell: `#` wall, `.` free, `S` start, `G` goal
/// - a segment file (see [`Grid::from_segments`]) that lists barriers as lattice segments
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
    barriers: HashSet<Barrier>,
    start: Pos,
}

impl Grid {
    /// Build a grid from row-major cells and a set of barriers between adjacent cells
    ///
    /// **Errors** with [`Error::MalformedGrid`] if the cells do not fill a `rows x cols`
    /// rectangle, a barrier does not join two adjacent cells, there is not exactly one
    /// start, there is no goal, or no goal can be reached from the start.
    pub fn new(
        rows: usize,
        cols: usize,
        cells: Vec<Cell>,
        barriers: impl IntoIterator<Item = (Pos, Pos)>,
    ) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::MalformedGrid(String::from("grid has no cells")));
        }
        let len = cell_count(rows, cols)?;
        if cells.len() != len {
            return Err(Error::MalformedGrid(format!(
                "expected {len} cells for a {rows}x{cols} grid, found {}",
                cells.len()
            )));
        }

        let in_bounds = |(r, c): Pos| r < rows && c < cols;
        let barriers = barriers
            .into_iter()
            .map(|(a, b)| {
                if in_bounds(a) && in_bounds(b) && is_adjacent(a, b) {
                    Ok(barrier(a, b))
                } else {
                    Err(Error::MalformedGrid(format!(
                        "barrier {a:?}-{b:?} does not separate two adjacent cells"
                    )))
                }
            })
            .collect::<Result<HashSet<_>>>()?;

        let mut starts = cells.iter().enumerate().filter(|(_, c)| **c == Cell::Start);
        let start = match (starts.next(), starts.next()) {
            (Some((ix, _)), None) => (ix / cols, ix % cols),
            (None, _) => return Err(Error::MalformedGrid(String::from("no start cell"))),
            (Some(_), Some(_)) => {
                return Err(Error::MalformedGrid(String::from(
                    "more than one start cell",
                )))
            }
        };
        if !cells.contains(&Cell::Goal) {
            return Err(Error::MalformedGrid(String::from("no goal cell")));
        }

        let grid = Self {
            rows,
            cols,
            cells,
            barriers,
            start,
        };
        if grid.shortest_path_len().is_none() {
            return Err(Error::MalformedGrid(String::from(
                "no goal is reachable from the start cell",
            )));
        }

        Ok(grid)
    }

    /// Parse the segment format
    ///
    /// ```text
    /// n_rows n_cols
    /// k
    /// r1 c1 r2 c2     (k lines)
    /// ```
    ///
    /// Each segment joins two vertices of the `(n_rows + 1) x (n_cols + 1)` lattice. A
    /// horizontal segment `(r,c)-(r,c+1)` separates cells `(r-1,c)` and `(r,c)`, a vertical
    /// segment `(r,c)-(r+1,c)` separates `(r,c-1)` and `(r,c)`. Longer axis-aligned segments
    /// are split into unit pieces.
    ///
    /// Segments on the outer border only locate the entrance and exit: unless overridden,
    /// the start is the first row whose left border is open and the goal is the first row
    /// whose right border is open, falling back to the top left and bottom right corners.
    pub fn from_segments(content: &str, start: Option<Pos>, goal: Option<Pos>) -> Result<Self> {
        let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());

        let header = parse_numbers(lines.next().unwrap_or_default())?;
        let &[rows, cols] = header.as_slice() else {
            return Err(Error::MalformedGrid(String::from(
                "first line must be `n_rows n_cols`",
            )));
        };
        if rows == 0 || cols == 0 {
            return Err(Error::MalformedGrid(String::from("grid has no cells")));
        }
        let len = cell_count(rows, cols)?;

        let k = match lines.next() {
            Some(line) => match parse_numbers(line)?.as_slice() {
                &[k] => k,
                _ => {
                    return Err(Error::MalformedGrid(String::from(
                        "second line must be the segment count",
                    )))
                }
            },
            None => 0,
        };

        let mut barriers = HashSet::new();
        let mut left_closed = HashSet::new();
        let mut right_closed = HashSet::new();
        for i in 0..k {
            let line = lines.next().ok_or_else(|| {
                Error::MalformedGrid(format!("expected {k} segments, found {i}"))
            })?;
            let &[r1, c1, r2, c2] = parse_numbers(line)?.as_slice() else {
                return Err(Error::MalformedGrid(format!(
                    "segment `{line}` must be `r1 c1 r2 c2`"
                )));
            };
            if r1.max(r2) > rows || c1.max(c2) > cols {
                return Err(Error::MalformedGrid(format!(
                    "segment `{line}` leaves the {rows}x{cols} lattice"
                )));
            }

            if r1 == r2 && c1 != c2 {
                let r = r1;
                for c in c1.min(c2)..c1.max(c2) {
                    if r > 0 && r < rows {
                        barriers.insert(((r - 1, c), (r, c)));
                    }
                }
            } else if c1 == c2 && r1 != r2 {
                let c = c1;
                for r in r1.min(r2)..r1.max(r2) {
                    if c == 0 {
                        left_closed.insert(r);
                    } else if c == cols {
                        right_closed.insert(r);
                    } else {
                        barriers.insert(((r, c - 1), (r, c)));
                    }
                }
            } else {
                return Err(Error::MalformedGrid(format!(
                    "segment `{line}` is not a horizontal or vertical line"
                )));
            }
        }

        let start = start.unwrap_or_else(|| {
            (0..rows)
                .find(|r| !left_closed.contains(r))
                .map_or((0, 0), |r| (r, 0))
        });
        let goal = goal.unwrap_or_else(|| {
            (0..rows)
                .find(|r| !right_closed.contains(r))
                .map_or((rows - 1, cols - 1), |r| (r, cols - 1))
        });
        if start == goal {
            return Err(Error::MalformedGrid(format!(
                "start and goal are both {start:?}"
            )));
        }
        for (name, (r, c)) in [("start", start), ("goal", goal)] {
            if r >= rows || c >= cols {
                return Err(Error::MalformedGrid(format!(
                    "{name} {:?} is outside the {rows}x{cols} grid",
                    (r, c)
                )));
            }
        }

        let mut cells = vec![Cell::Free; len];
        cells[start.0 * cols + start.1] = Cell::Start;
        cells[goal.0 * cols + goal.1] = Cell::Goal;

        Self::new(rows, cols, cells, barriers)
    }

    /// Format the grid in the segment format read by [`Grid::from_segments`]
    ///
    /// The outer border is closed except for the entrance left of the start and the exit
    /// right of the goal. Segments are sorted by their first, then second vertex.
    ///
    /// **Errors** if the grid cannot be expressed with barriers alone, i.e. it has wall
    /// cells, several goals, or a start or goal away from the left and right borders.
    pub fn to_segments(&self) -> Result<String> {
        let goals = self.goals();
        let &[goal] = goals.as_slice() else {
            return Err(Error::MalformedGrid(String::from(
                "segment format supports exactly one goal",
            )));
        };
        if self.cells.contains(&Cell::Wall) {
            return Err(Error::MalformedGrid(String::from(
                "segment format cannot express wall cells",
            )));
        }
        if self.start.1 != 0 || goal.1 != self.cols - 1 {
            return Err(Error::MalformedGrid(String::from(
                "segment format needs the start on the left border and the goal on the right border",
            )));
        }

        let (rows, cols) = (self.rows, self.cols);
        let mut segments = BTreeSet::new();
        for c in 0..cols {
            segments.insert((0, c, 0, c + 1));
            segments.insert((rows, c, rows, c + 1));
        }
        for r in 0..rows {
            if r != self.start.0 {
                segments.insert((r, 0, r + 1, 0));
            }
            if r != goal.0 {
                segments.insert((r, cols, r + 1, cols));
            }
        }
        for &((r1, c1), (r2, c2)) in &self.barriers {
            if r1 == r2 {
                // cells side by side, the barrier is the vertical segment between them
                segments.insert((r1, c2, r1 + 1, c2));
            } else {
                segments.insert((r2, c1, r2, c1 + 1));
            }
        }

        let mut out = format!("{rows} {cols}\n{}\n", segments.len());
        for (r1, c1, r2, c2) in segments {
            out.push_str(&format!("{r1} {c1} {r2} {c2}\n"));
        }
        Ok(out)
    }

    /// Read a maze file in either format
    ///
    /// A file whose first non-empty line is two integers is read as a segment file,
    /// anything else as a cell map.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let is_segments = content
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .is_some_and(|l| parse_numbers(l).is_ok_and(|n| n.len() == 2));

        if is_segments {
            Self::from_segments(&content, None, None)
        } else {
            content.parse()
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn start(&self) -> Pos {
        self.start
    }

    /// All goal cells in row-major order
    pub fn goals(&self) -> Vec<Pos> {
        self.positions()
            .filter(|&pos| self[pos] == Cell::Goal)
            .collect()
    }

    pub fn is_goal(&self, pos: Pos) -> bool {
        self.contains(pos) && self[pos] == Cell::Goal
    }

    pub fn contains(&self, (r, c): Pos) -> bool {
        r < self.rows && c < self.cols
    }

    /// Barriers between adjacent cells, smaller position first
    pub fn barriers(&self) -> impl Iterator<Item = (Pos, Pos)> + '_ {
        self.barriers.iter().copied()
    }

    /// Whether a barrier separates the two cells
    pub fn is_blocked(&self, a: Pos, b: Pos) -> bool {
        self.barriers.contains(&barrier(a, b))
    }

    /// Whether an agent on `from` can move to the adjacent cell `to`
    ///
    /// `to` must be inside the grid, not a wall, and not behind a barrier.
    pub fn can_move(&self, from: Pos, to: Pos) -> bool {
        self.contains(to) && self[to].is_open() && !self.is_blocked(from, to)
    }

    /// Cells reachable from `pos` in a single move
    pub fn neighbors(&self, pos: Pos) -> impl Iterator<Item = Pos> + '_ {
        let (r, c) = pos;
        [
            r.checked_sub(1).map(|r| (r, c)),
            Some((r + 1, c)),
            c.checked_sub(1).map(|c| (r, c)),
            Some((r, c + 1)),
        ]
        .into_iter()
        .flatten()
        .filter(move |&next| self.can_move(pos, next))
    }

    /// Every cell reachable from the start, in row-major order
    ///
    /// These cells are the valid states of the maze.
    pub fn reachable(&self) -> Vec<Pos> {
        let dist = self.distances();
        self.positions()
            .filter(|&pos| dist[self.index_of(pos)].is_some())
            .collect()
    }

    /// Number of moves on the shortest path from the start to the nearest goal
    pub fn shortest_path_len(&self) -> Option<usize> {
        let dist = self.distances();
        self.goals()
            .into_iter()
            .filter_map(|goal| dist[self.index_of(goal)])
            .min()
    }

    fn positions(&self) -> impl Iterator<Item = Pos> {
        let cols = self.cols;
        (0..self.rows * self.cols).map(move |ix| (ix / cols, ix % cols))
    }

    fn index_of(&self, (r, c): Pos) -> usize {
        r * self.cols + c
    }

    /// Breadth-first distances from the start
    fn distances(&self) -> Vec<Option<usize>> {
        let mut dist = vec![None; self.cells.len()];
        dist[self.index_of(self.start)] = Some(0);
        let mut queue = VecDeque::from([(self.start, 0)]);
        while let Some((pos, d)) = queue.pop_front() {
            for next in self.neighbors(pos) {
                let ix = self.index_of(next);
                if dist[ix].is_none() {
                    dist[ix] = Some(d + 1);
                    queue.push_back((next, d + 1));
                }
            }
        }
        dist
    }
}

impl Index<Pos> for Grid {
    type Output = Cell;

    fn index(&self, pos: Pos) -> &Self::Output {
        &self.cells[self.index_of(pos)]
    }
}

/// Parse a cell map, one line per row
///
/// Blank lines and surrounding whitespace are ignored.
impl FromStr for Grid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lines = s
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>();
        let rows = lines.len();
        let cols = lines.first().map_or(0, |l| l.chars().count());

        let mut cells = Vec::new();
        for (r, line) in lines.iter().enumerate() {
            if line.chars().count() != cols {
                return Err(Error::MalformedGrid(format!(
                    "row {r} has {} cells, expected {cols}",
                    line.chars().count()
                )));
            }
            for (c, ch) in line.chars().enumerate() {
                let cell = Cell::from_char(ch).ok_or_else(|| {
                    Error::MalformedGrid(format!("unknown cell `{ch}` at {:?}", (r, c)))
                })?;
                cells.push(cell);
            }
        }

        Self::new(rows, cols, cells, [])
    }
}

/// Write the cell map
///
/// Barriers are not part of the cell map; use [`Grid::to_segments`] to keep them.
impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(self.cols) {
            let line = row.iter().map(|c| c.as_char()).collect::<String>();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

fn parse_numbers(line: &str) -> Result<Vec<usize>> {
    line.split_whitespace()
        .map(|n| {
            n.parse()
                .map_err(|_| Error::MalformedGrid(format!("`{n}` is not a non-negative integer")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPEN_3X3: &str = "
        S..
        ...
        ..G
    ";

    #[test]
    fn parse_cell_map() {
        let grid: Grid = OPEN_3X3.parse().unwrap();
        assert_eq!((grid.rows(), grid.cols()), (3, 3), "Dimensions correct");
        assert_eq!(grid.start(), (0, 0), "Start found");
        assert_eq!(grid.goals(), vec![(2, 2)], "Goal found");
        assert_eq!(grid.reachable().len(), 9, "Every cell reachable");
        assert_eq!(grid.shortest_path_len(), Some(4), "Manhattan distance");
        assert_eq!(grid.to_string().trim(), "S..\n...\n..G", "Display round trip");
    }

    #[test]
    fn walls_shape_the_state_space() {
        let grid: Grid = "
            S.#.
            .##.
            ...G
        "
        .parse()
        .unwrap();
        assert_eq!(grid[(0, 2)], Cell::Wall);
        assert!(!grid.reachable().contains(&(0, 2)), "Walls are never states");
        assert!(grid.reachable().contains(&(0, 3)), "Cells around walls are");
        assert_eq!(grid.shortest_path_len(), Some(5));
        assert!(!grid.can_move((0, 1), (0, 2)), "Cannot enter a wall");
        assert!(!grid.can_move((0, 0), (0, usize::MAX)), "Cannot leave the grid");
    }

    #[test]
    fn rejects_malformed_maps() {
        let cases = [
            ("", "empty"),
            ("...\n..G", "no start"),
            ("S..\n...", "no goal"),
            ("S.S\n..G", "two starts"),
            ("S..\n.G", "ragged"),
            ("S.x\n..G", "unknown cell"),
            ("S#.\n##G", "goal unreachable"),
        ];
        for (map, why) in cases {
            assert!(
                matches!(map.parse::<Grid>(), Err(Error::MalformedGrid(_))),
                "{why} should be rejected"
            );
        }
    }

    #[test]
    fn multiple_goals() {
        let grid: Grid = "G.S...G".parse().unwrap();
        assert_eq!(grid.goals(), vec![(0, 0), (0, 6)]);
        assert_eq!(grid.shortest_path_len(), Some(2), "Nearest goal counts");
    }

    #[test]
    fn barriers_block_moves() {
        let cells = vec![Cell::Start, Cell::Free, Cell::Free, Cell::Goal];
        let grid = Grid::new(2, 2, cells, [((0, 1), (0, 0))]).unwrap();
        assert!(grid.is_blocked((0, 0), (0, 1)), "Barrier order does not matter");
        assert!(!grid.can_move((0, 1), (0, 0)), "Blocked in both directions");
        assert!(grid.can_move((0, 0), (1, 0)));
        assert_eq!(grid.shortest_path_len(), Some(2));

        let cells = vec![Cell::Start, Cell::Free, Cell::Free, Cell::Goal];
        let bad = Grid::new(2, 2, cells, [((0, 0), (1, 1))]);
        assert!(bad.is_err(), "Barriers must join adjacent cells");
    }

    #[test]
    fn parse_segments() {
        // 2x3 maze, entrance on row 1 at the left, exit on row 0 at the right.
        // A barrier between (0,0) and (0,1), another under (0,1).
        let content = "
            2 3
            7
            0 0 0 3
            2 0 2 3
            0 0 1 0
            1 3 2 3
            0 1 1 1
            1 1 1 2
            0 0 0 0
        ";
        assert!(
            Grid::from_segments(content, None, None).is_err(),
            "Zero-length segment rejected"
        );

        let content = "
            2 3
            6
            0 0 0 3
            2 0 2 3
            0 0 1 0
            1 3 2 3
            0 1 1 1
            1 1 1 2
        ";
        let grid = Grid::from_segments(content, None, None).unwrap();
        assert_eq!(grid.start(), (1, 0), "Entrance on the first open left row");
        assert_eq!(grid.goals(), vec![(0, 2)], "Exit on the first open right row");
        assert!(grid.is_blocked((0, 0), (0, 1)));
        assert!(grid.is_blocked((0, 1), (1, 1)));
        assert!(!grid.is_blocked((0, 0), (1, 0)), "Border segments are not barriers");
        assert_eq!(grid.shortest_path_len(), Some(3));

        let overridden = Grid::from_segments(content, Some((0, 0)), Some((1, 2))).unwrap();
        assert_eq!(overridden.start(), (0, 0));
        assert_eq!(overridden.goals(), vec![(1, 2)]);
    }

    #[test]
    fn segments_default_corners_and_long_segments() {
        let content = "3 3\n2\n0 0 3 0\n0 3 3 3\n";
        let grid = Grid::from_segments(content, None, None).unwrap();
        assert_eq!(grid.start(), (0, 0), "Fallback start");
        assert_eq!(grid.goals(), vec![(2, 2)], "Fallback goal");

        let content = "2 2\n1\n1 0 1 2\n";
        let grid = Grid::from_segments(content, Some((0, 0)), Some((0, 1))).unwrap();
        assert!(grid.is_blocked((0, 0), (1, 0)), "Long segment split");
        assert!(grid.is_blocked((0, 1), (1, 1)), "Long segment split");
    }

    #[test]
    fn rejects_malformed_segments() {
        let cases = [
            ("", "empty"),
            ("2\n0\n", "short header"),
            ("2 2\n1\n", "missing segment"),
            ("2 2\n1\n0 0 1 1\n", "diagonal"),
            ("2 2\n1\n0 0 0 5\n", "outside the lattice"),
            ("2 2\n1\n0 0 a 1\n", "not a number"),
            ("1 1\n0\n", "start and goal coincide"),
        ];
        for (content, why) in cases {
            assert!(
                Grid::from_segments(content, None, None).is_err(),
                "{why} should be rejected"
            );
        }
    }

    #[test]
    fn oversized_dimensions_are_malformed() {
        let huge = format!("{} 2\n0\n", usize::MAX);
        assert!(
            matches!(
                Grid::from_segments(&huge, None, None),
                Err(Error::MalformedGrid(_))
            ),
            "Cell count overflow is reported, not a panic"
        );
        assert!(matches!(
            Grid::new(usize::MAX, 3, vec![Cell::Start, Cell::Goal], []),
            Err(Error::MalformedGrid(_))
        ));
    }

    #[test]
    fn segments_round_trip() {
        let content = "2 3\n4\n0 1 1 1\n1 1 1 2\n0 0 1 0\n1 3 2 3\n";
        let grid = Grid::from_segments(content, None, None).unwrap();
        let written = grid.to_segments().unwrap();
        let reread = Grid::from_segments(&written, None, None).unwrap();
        assert_eq!(grid, reread, "Same grid after writing and reading");

        let corridor: Grid = "S.G".parse().unwrap();
        assert!(corridor.to_segments().is_ok(), "Corridor can be written");

        let with_wall: Grid = "S.\n#G".parse().unwrap();
        assert!(with_wall.to_segments().is_err(), "Wall cells cannot be written");
    }
}
