//! Generic grid for per-tile data

use glam::Vec2;

use crate::core::types::TileCoord;

/// Dense row-major 2D grid with a fixed cell size
#[derive(Debug, Clone)]
pub struct Grid<T: Clone + Default> {
    pub width: usize,
    pub height: usize,
    pub cell_size: f32,
    data: Vec<T>,
}

impl<T: Clone + Default> Grid<T> {
    pub fn new(width: usize, height: usize, cell_size: f32) -> Self {
        Self {
            width,
            height,
            cell_size,
            data: vec![T::default(); width * height],
        }
    }

    #[inline]
    fn index(&self, coord: TileCoord) -> Option<usize> {
        if coord.x < 0 || coord.y < 0 {
            return None;
        }
        let (x, y) = (coord.x as usize, coord.y as usize);
        if x < self.width && y < self.height {
            Some(y * self.width + x)
        } else {
            None
        }
    }

    #[inline]
    pub fn contains(&self, coord: TileCoord) -> bool {
        self.index(coord).is_some()
    }

    #[inline]
    pub fn get(&self, coord: TileCoord) -> Option<&T> {
        self.index(coord).map(|i| &self.data[i])
    }

    #[inline]
    fn get_mut(&mut self, coord: TileCoord) -> Option<&mut T> {
        match self.index(coord) {
            Some(i) => Some(&mut self.data[i]),
            None => None,
        }
    }

    /// Returns false if `coord` is outside the grid
    #[inline]
    pub fn set(&mut self, coord: TileCoord, value: T) -> bool {
        match self.get_mut(coord) {
            Some(cell) => {
                *cell = value;
                true
            }
            None => false,
        }
    }

    /// Cell center in world coordinates
    pub fn cell_center(&self, coord: TileCoord) -> Vec2 {
        Vec2::new(
            (coord.x as f32 + 0.5) * self.cell_size,
            (coord.y as f32 + 0.5) * self.cell_size,
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileCoord, &T)> {
        let width = self.width;
        self.data.iter().enumerate().map(move |(i, v)| {
            (TileCoord::new((i % width) as i32, (i / width) as i32), v)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        let grid: Grid<u8> = Grid::new(4, 3, 1.0);
        assert!(grid.contains(TileCoord::new(0, 0)));
        assert!(grid.contains(TileCoord::new(3, 2)));
        assert!(!grid.contains(TileCoord::new(4, 0)));
        assert!(!grid.contains(TileCoord::new(0, 3)));
        assert!(!grid.contains(TileCoord::new(-1, 0)));
    }

    #[test]
    fn test_set_and_get() {
        let mut grid: Grid<u8> = Grid::new(4, 3, 1.0);
        assert!(grid.set(TileCoord::new(2, 1), 9));
        assert_eq!(grid.get(TileCoord::new(2, 1)), Some(&9));
        assert!(!grid.set(TileCoord::new(9, 9), 1));
    }

    #[test]
    fn test_cell_center_scales_with_cell_size() {
        let grid: Grid<u8> = Grid::new(10, 10, 2.0);
        assert_eq!(grid.cell_center(TileCoord::new(3, 4)), Vec2::new(7.0, 9.0));
        assert_eq!(grid.cell_center(TileCoord::new(0, 0)), Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_iter_is_row_major() {
        let grid: Grid<u8> = Grid::new(2, 2, 1.0);
        let coords: Vec<_> = grid.iter().map(|(c, _)| c).collect();
        assert_eq!(
            coords,
            vec![
                TileCoord::new(0, 0),
                TileCoord::new(1, 0),
                TileCoord::new(0, 1),
                TileCoord::new(1, 1)
            ]
        );
    }
}
