//! Start values borrowed from fitted neighbours.

use crate::map::{Pixel, SpectralMap};
use crate::models::{PeakShape, PEAK_SLOTS};

/// Neighbour offsets searched in order, nearest ring first.
pub const NEIGHBOUR_RINGS: [&[(isize, isize)]; 4] = [
    &[(-1, 0), (1, 0), (0, -1), (0, 1)],
    &[(-1, -1), (-1, 1), (1, -1), (1, 1)],
    &[(-2, 0), (2, 0), (0, -2), (0, 2)],
    &[
        (-1, -2),
        (-1, 2),
        (1, -2),
        (1, 2),
        (-2, -1),
        (-2, 1),
        (2, -1),
        (2, 1),
    ],
];

/// Start values averaged over the matching neighbours of one ring.
#[derive(Debug, Clone, PartialEq)]
pub struct Seed {
    /// Index into [`NEIGHBOUR_RINGS`].
    pub ring: usize,
    pub neighbours: Vec<Pixel>,
    /// Flattened mean of the neighbours' optimized parameters.
    pub params: Vec<f64>,
}

/// Find the nearest ring holding at least one in-bounds neighbour fitted
/// with exactly `shapes`, and average the optimized parameters of every
/// matching neighbour in that ring.
///
/// Returns `None` if no ring has a match.
pub fn neighbour_seed(
    map: &SpectralMap,
    pixel: Pixel,
    shapes: &[PeakShape; PEAK_SLOTS],
) -> Option<Seed> {
    let (nx, ny) = map.size();

    for (ring, offsets) in NEIGHBOUR_RINGS.iter().enumerate() {
        let mut neighbours = Vec::new();
        let mut sum: Vec<f64> = Vec::new();

        for &(dx, dy) in offsets.iter() {
            let Some(n) = pixel.offset(dx, dy, nx, ny) else {
                continue;
            };
            let Ok(fit) = map.fit(Some(n)) else {
                continue;
            };
            if !fit.has_active_peaks() || fit.shapes != *shapes {
                continue;
            }

            let params = fit.optimized_flat();
            if sum.is_empty() {
                sum = params;
            } else {
                sum.iter_mut().zip(&params).for_each(|(s, p)| *s += p);
            }
            neighbours.push(n);
        }

        if !neighbours.is_empty() {
            let count = neighbours.len() as f64;
            sum.iter_mut().for_each(|s| *s /= count);
            log::debug!(
                "Seeding {} from {} neighbour(s) in ring {}",
                pixel,
                neighbours.len(),
                ring
            );
            return Some(Seed {
                ring,
                neighbours,
                params: sum,
            });
        }
    }
    None
}
