//! Terminal character-grid animation: a walker steps through the cells in
//! row-major order, one cell per frame, and wraps back to the top-left.

use std::fmt;

const EMPTY: char = '.';
const WALKER: char = 'X';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharGrid {
    width: usize,
    height: usize,
    cells: Vec<char>,
    walker: (usize, usize),
}

impl CharGrid {
    /// An empty grid with the walker in the top-left cell. Zero dimensions
    /// are raised to 1.
    pub fn new(width: usize, height: usize) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let mut grid = Self {
            width,
            height,
            cells: vec![EMPTY; width * height],
            walker: (0, 0),
        };
        grid.set(0, 0, WALKER);
        grid
    }

    pub fn walker(&self) -> (usize, usize) {
        self.walker
    }

    pub fn cell(&self, x: usize, y: usize) -> Option<char> {
        (x < self.width && y < self.height).then(|| self.cells[y * self.width + x])
    }

    fn set(&mut self, x: usize, y: usize, c: char) {
        self.cells[y * self.width + x] = c;
    }

    /// Move the walker one cell forward.
    pub fn step(&mut self) {
        let (x, y) = self.walker;
        self.set(x, y, EMPTY);
        let next = if x + 1 < self.width {
            (x + 1, y)
        } else if y + 1 < self.height {
            (0, y + 1)
        } else {
            (0, 0)
        };
        self.walker = next;
        self.set(next.0, next.1, WALKER);
    }
}

impl fmt::Display for CharGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(self.width) {
            for c in row {
                write!(f, "{c}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_top_left() {
        let grid = CharGrid::new(3, 2);
        assert_eq!(grid.to_string(), "X..\n...\n");
    }

    #[test]
    fn walks_row_major_and_wraps() {
        let mut grid = CharGrid::new(2, 2);
        let mut visited = vec![grid.walker()];
        for _ in 0..4 {
            grid.step();
            visited.push(grid.walker());
        }
        assert_eq!(visited, vec![(0, 0), (1, 0), (0, 1), (1, 1), (0, 0)]);
        assert_eq!(grid.to_string(), "X.\n..\n");
    }

    #[test]
    fn only_one_walker_is_drawn() {
        let mut grid = CharGrid::new(4, 3);
        for _ in 0..7 {
            grid.step();
        }
        assert_eq!(grid.to_string().matches(WALKER).count(), 1);
        assert_eq!(grid.cell(3, 1), Some(WALKER));
        assert_eq!(grid.cell(4, 0), None);
    }
}
