//! Pixel addressing and the grid transforms.
//!
//! Every array a map owns carries the pixel grid on two of its axes. Flips
//! and rotations go through [`Transform::apply_to`], which reindexes any such
//! array, and [`Transform::apply_pixel`], which moves a single address the
//! same way, so the parallel arrays and the focus cannot drift apart.

use ndarray::{Array, Axis, Dimension, Slice};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a pixel. 1D maps use `y = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Pixel {
    pub x: usize,
    pub y: usize,
}

impl Pixel {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Pixel `index` of a line scan.
    pub const fn line(index: usize) -> Self {
        Self { x: index, y: 0 }
    }

    /// Neighbour at a signed offset, if it stays inside an `nx x ny` grid.
    pub fn offset(self, dx: isize, dy: isize, nx: usize, ny: usize) -> Option<Pixel> {
        let x = self.x.checked_add_signed(dx)?;
        let y = self.y.checked_add_signed(dy)?;
        (x < nx && y < ny).then_some(Pixel { x, y })
    }
}

impl fmt::Display for Pixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(usize, usize)> for Pixel {
    fn from((x, y): (usize, usize)) -> Self {
        Self { x, y }
    }
}

/// Axis mirrored by a flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlipAxis {
    /// Reverse the x direction.
    X,
    /// Reverse the y direction.
    Y,
}

/// Sense of a quarter turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    Clockwise,
    CounterClockwise,
}

/// A bijection of the pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Flip(FlipAxis),
    Rotate(Rotation),
}

impl Transform {
    /// Grid size after the transform.
    pub fn new_size(self, nx: usize, ny: usize) -> (usize, usize) {
        match self {
            Transform::Flip(_) => (nx, ny),
            Transform::Rotate(_) => (ny, nx),
        }
    }

    /// Where pixel `p` of an `nx x ny` grid ends up.
    pub fn apply_pixel(self, p: Pixel, nx: usize, ny: usize) -> Pixel {
        match self {
            Transform::Flip(FlipAxis::X) => Pixel::new(nx - 1 - p.x, p.y),
            Transform::Flip(FlipAxis::Y) => Pixel::new(p.x, ny - 1 - p.y),
            Transform::Rotate(Rotation::Clockwise) => Pixel::new(ny - 1 - p.y, p.x),
            Transform::Rotate(Rotation::CounterClockwise) => Pixel::new(p.y, nx - 1 - p.x),
        }
    }

    /// Reindex an array whose grid axes are `x_axis` and `y_axis`.
    ///
    /// The result is in standard layout and satisfies
    /// `out[apply_pixel(p)] == array[p]` for every grid position.
    pub fn apply_to<A, D>(self, array: &Array<A, D>, x_axis: usize, y_axis: usize) -> Array<A, D>
    where
        A: Clone,
        D: Dimension,
    {
        let reversed = Slice::new(0, None, -1);
        let view = array.view();
        let out = match self {
            Transform::Flip(FlipAxis::X) => view.slice_axis(Axis(x_axis), reversed).to_owned(),
            Transform::Flip(FlipAxis::Y) => view.slice_axis(Axis(y_axis), reversed).to_owned(),
            Transform::Rotate(rotation) => {
                let mut swapped = view;
                swapped.swap_axes(x_axis, y_axis);
                let flipped_axis = match rotation {
                    Rotation::Clockwise => x_axis,
                    Rotation::CounterClockwise => y_axis,
                };
                swapped.slice_axis(Axis(flipped_axis), reversed).to_owned()
            }
        };
        out.as_standard_layout().into_owned()
    }
}
