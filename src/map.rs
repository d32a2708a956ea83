use std::fs::File;
use std::io::{BufRead, BufReader};

use crate::error::{MapfError, MapfResult};

#[derive(Debug, Clone)]
pub struct Tile {
    passable: bool,
}

impl Tile {
    pub fn is_passable(&self) -> bool {
        self.passable
    }
}

/// Static obstacle grid. Positions are `(x, y)` with `x < width`, `y < height`.
#[derive(Debug, Clone)]
pub struct Map {
    pub height: usize,
    pub width: usize,
    pub grid: Vec<Vec<Tile>>, // Indexed as grid[y][x]
}

impl Map {
    /// Obstacle-free map of the given size.
    pub fn new(width: usize, height: usize) -> Self {
        Map {
            height,
            width,
            grid: vec![vec![Tile { passable: true }; width]; height],
        }
    }

    pub fn from_file(path: &str) -> MapfResult<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let lines = reader.lines().collect::<Result<Vec<_>, _>>()?;
        Self::parse_lines(lines.iter().map(String::as_str))
    }

    /// Parse a MovingAI map: `type`, `height H`, `width W`, `map`, then H rows.
    pub fn parse(text: &str) -> MapfResult<Self> {
        Self::parse_lines(text.lines())
    }

    fn parse_lines<'a>(mut lines: impl Iterator<Item = &'a str>) -> MapfResult<Self> {
        let mut height = 0;
        let mut width = 0;

        for line in lines.by_ref() {
            let line = line.trim();
            if line.starts_with("height") {
                height = Self::parse_dimension(line)?;
            } else if line.starts_with("width") {
                width = Self::parse_dimension(line)?;
            } else if line == "map" {
                break;
            }
        }

        if width == 0 || height == 0 {
            return Err(MapfError::Parse(
                "invalid map file: missing dimensions".to_string(),
            ));
        }

        let mut map = Map::new(width, height);
        for (y, line) in lines.take(height).enumerate() {
            for (x, ch) in line.chars().take(width).enumerate() {
                if matches!(ch, '@' | 'O' | 'T' | 'W') {
                    map.set_obstacle(x, y, true);
                }
            }
        }

        Ok(map)
    }

    fn parse_dimension(line: &str) -> MapfResult<usize> {
        line.split_whitespace()
            .last()
            .and_then(|value| value.parse::<usize>().ok())
            .ok_or_else(|| MapfError::Parse(format!("bad dimension line: {line:?}")))
    }

    /// Out-of-range writes are ignored.
    pub fn set_obstacle(&mut self, x: usize, y: usize, obstacle: bool) {
        if x < self.width && y < self.height {
            self.grid[y][x].passable = !obstacle;
        }
    }

    /// Cells outside the map count as obstacles.
    pub fn is_obstacle(&self, x: usize, y: usize) -> bool {
        x >= self.width || y >= self.height || !self.grid[y][x].is_passable()
    }

    pub fn is_passable(&self, x: usize, y: usize) -> bool {
        !self.is_obstacle(x, y)
    }

    /// Wait first, then right, down, left, up.
    pub fn get_neighbors(&self, x: usize, y: usize) -> Vec<(usize, usize)> {
        let directions = [(0, 0), (1, 0), (0, 1), (-1, 0), (0, -1)];
        let mut neighbors = Vec::with_capacity(directions.len());

        for &(dx, dy) in &directions {
            let new_x = x as isize + dx;
            let new_y = y as isize + dy;
            if new_x >= 0 && new_y >= 0 && self.is_passable(new_x as usize, new_y as usize) {
                neighbors.push((new_x as usize, new_y as usize));
            }
        }

        neighbors
    }

    pub fn free_cells(&self) -> Vec<(usize, usize)> {
        (0..self.width)
            .flat_map(|x| (0..self.height).map(move |y| (x, y)))
            .filter(|&(x, y)| self.is_passable(x, y))
            .collect()
    }
}

/// Manhattan distance; admissible for unit 4-connected moves with free waits.
pub fn manhattan_distance(a: (usize, usize), b: (usize, usize)) -> usize {
    a.0.abs_diff(b.0) + a.1.abs_diff(b.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_map() {
        let map = Map::from_file("map_file/test/test.map").unwrap();

        assert_eq!(map.height, 4);
        assert_eq!(map.width, 5);

        assert!(map.is_obstacle(0, 0));
        assert!(map.is_obstacle(1, 0));
        assert!(map.is_passable(1, 1));
        assert!(map.is_obstacle(4, 3));
        assert!(map.is_obstacle(5, 1));
        assert!(map.is_obstacle(1, 4));

        let neighbors = map.get_neighbors(1, 1);
        assert_eq!(neighbors, vec![(1, 1), (2, 1), (1, 2)]);
    }

    #[test]
    fn test_parse_rejects_missing_dimensions() {
        let result = Map::parse("type octile\nmap\n...\n");
        assert!(matches!(result, Err(MapfError::Parse(_))));
    }

    #[test]
    fn test_neighbors_on_open_grid() {
        let mut map = Map::new(3, 3);
        assert_eq!(map.get_neighbors(1, 1).len(), 5);
        assert_eq!(map.get_neighbors(0, 0), vec![(0, 0), (1, 0), (0, 1)]);

        map.set_obstacle(2, 1, true);
        map.set_obstacle(7, 7, true);
        assert!(!map.get_neighbors(1, 1).contains(&(2, 1)));
        assert_eq!(map.free_cells().len(), 8);
    }

    #[test]
    fn test_manhattan_distance() {
        assert_eq!(manhattan_distance((0, 0), (4, 4)), 8);
        assert_eq!(manhattan_distance((7, 2), (3, 5)), 7);
        assert_eq!(manhattan_distance((3, 3), (3, 3)), 0);
    }
}
