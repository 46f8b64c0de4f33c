//! Per-pixel fit records and the flattened parameter contract.
//!
//! The dense `[slot][param]` table is the source of truth. The flattened
//! vector exchanged with the solver lists the active slots in slot order:
//! Gaussian and Lorentzian contribute (amplitude, center, width), Voigt
//! contributes (amplitude, center, sigma, gamma). In the dense table the
//! 3-parameter shapes keep their width in column 2 and a zero in column 3.

use ndarray::{s, Array3, Array4};
use serde::{Deserialize, Serialize};

use super::geometry::{Pixel, Transform};
use crate::error::{MapError, Result};
use crate::models::{PeakShape, PEAK_SLOTS, SLOT_PARAMS};

/// Dense parameters of the six slots of one pixel.
pub type SlotParams = [[f64; SLOT_PARAMS]; PEAK_SLOTS];

const UNSET: SlotParams = [[f64::NAN; SLOT_PARAMS]; PEAK_SLOTS];

/// Fit record of one pixel as returned by `SpectralMap::fit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelFit {
    pub shapes: [PeakShape; PEAK_SLOTS],
    pub initial: SlotParams,
    pub optimized: SlotParams,
}

impl PixelFit {
    /// A record with every slot off.
    pub fn cleared() -> Self {
        Self {
            shapes: [PeakShape::Off; PEAK_SLOTS],
            initial: UNSET,
            optimized: UNSET,
        }
    }

    pub fn has_active_peaks(&self) -> bool {
        self.shapes.iter().any(|s| s.is_active())
    }

    pub fn initial_flat(&self) -> Vec<f64> {
        pack(&self.shapes, &self.initial)
    }

    pub fn optimized_flat(&self) -> Vec<f64> {
        pack(&self.shapes, &self.optimized)
    }
}

/// Total number of flattened parameters for a slot configuration.
pub fn flat_len(shapes: &[PeakShape; PEAK_SLOTS]) -> usize {
    shapes.iter().map(|s| s.parameter_count()).sum()
}

/// Flatten a dense table following the per-shape parameter counts.
pub fn pack(shapes: &[PeakShape; PEAK_SLOTS], dense: &SlotParams) -> Vec<f64> {
    shapes
        .iter()
        .zip(dense)
        .flat_map(|(shape, row)| row[..shape.parameter_count()].iter().copied())
        .collect()
}

/// Expand a flattened vector into a dense table.
///
/// Off slots become NaN rows, 3-parameter shapes get a zero in column 3.
pub fn unpack(shapes: &[PeakShape; PEAK_SLOTS], flat: &[f64]) -> Result<SlotParams> {
    let expected = flat_len(shapes);
    if flat.len() != expected {
        return Err(MapError::DimensionMismatch(format!(
            "Peak configuration needs {} parameters, got {}",
            expected,
            flat.len()
        )));
    }

    let mut dense = UNSET;
    let mut offset = 0;
    for (shape, row) in shapes.iter().zip(dense.iter_mut()) {
        let n = shape.parameter_count();
        if n == 0 {
            continue;
        }
        row[..n].copy_from_slice(&flat[offset..offset + n]);
        if n < SLOT_PARAMS {
            row[n..].fill(0.0);
        }
        offset += n;
    }
    Ok(dense)
}

/// Fit records of a whole grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FitRecord {
    /// `(nx, ny, 6)`
    pub(crate) shapes: Array3<PeakShape>,
    /// `(nx, ny, 6, 4)`
    pub(crate) initial: Array4<f64>,
    /// `(nx, ny, 6, 4)`
    pub(crate) optimized: Array4<f64>,
}

impl FitRecord {
    pub(crate) fn new(nx: usize, ny: usize) -> Self {
        Self {
            shapes: Array3::from_elem((nx, ny, PEAK_SLOTS), PeakShape::Off),
            initial: Array4::from_elem((nx, ny, PEAK_SLOTS, SLOT_PARAMS), f64::NAN),
            optimized: Array4::from_elem((nx, ny, PEAK_SLOTS, SLOT_PARAMS), f64::NAN),
        }
    }

    pub(crate) fn grid_size(&self) -> (usize, usize) {
        let (nx, ny, _) = self.shapes.dim();
        (nx, ny)
    }

    pub(crate) fn shapes_at(&self, p: Pixel) -> [PeakShape; PEAK_SLOTS] {
        let mut out = [PeakShape::Off; PEAK_SLOTS];
        for (slot, shape) in out.iter_mut().enumerate() {
            *shape = self.shapes[[p.x, p.y, slot]];
        }
        out
    }

    pub(crate) fn has_active_peaks(&self, p: Pixel) -> bool {
        self.shapes
            .slice(s![p.x, p.y, ..])
            .iter()
            .any(|s| s.is_active())
    }

    fn dense_at(table: &Array4<f64>, p: Pixel) -> SlotParams {
        let mut out = UNSET;
        for (slot, row) in out.iter_mut().enumerate() {
            for (k, value) in row.iter_mut().enumerate() {
                *value = table[[p.x, p.y, slot, k]];
            }
        }
        out
    }

    pub(crate) fn get(&self, p: Pixel) -> PixelFit {
        PixelFit {
            shapes: self.shapes_at(p),
            initial: Self::dense_at(&self.initial, p),
            optimized: Self::dense_at(&self.optimized, p),
        }
    }

    pub(crate) fn set(&mut self, p: Pixel, fit: &PixelFit) {
        for slot in 0..PEAK_SLOTS {
            self.shapes[[p.x, p.y, slot]] = fit.shapes[slot];
            for k in 0..SLOT_PARAMS {
                self.initial[[p.x, p.y, slot, k]] = fit.initial[slot][k];
                self.optimized[[p.x, p.y, slot, k]] = fit.optimized[slot][k];
            }
        }
    }

    pub(crate) fn clear(&mut self, p: Pixel) {
        self.set(p, &PixelFit::cleared());
    }

    /// Slots that are active on at least one pixel, with the shapes seen there.
    pub(crate) fn slot_usage(&self) -> [SlotUsage; PEAK_SLOTS] {
        let mut usage = [SlotUsage::default(); PEAK_SLOTS];
        for ((_, _, slot), shape) in self.shapes.indexed_iter() {
            let u = &mut usage[slot];
            match shape {
                PeakShape::Off => {}
                PeakShape::Gaussian => u.gaussian = true,
                PeakShape::Lorentzian => u.lorentzian = true,
                PeakShape::Voigt => u.voigt = true,
            }
        }
        usage
    }

    pub(crate) fn transformed(&self, t: Transform) -> Self {
        Self {
            shapes: t.apply_to(&self.shapes, 0, 1),
            initial: t.apply_to(&self.initial, 0, 1),
            optimized: t.apply_to(&self.optimized, 0, 1),
        }
    }
}

/// Which shapes a slot takes anywhere on the map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SlotUsage {
    pub(crate) gaussian: bool,
    pub(crate) lorentzian: bool,
    pub(crate) voigt: bool,
}

impl SlotUsage {
    pub(crate) fn active(&self) -> bool {
        self.gaussian || self.lorentzian || self.voigt
    }

    pub(crate) fn has_sigma(&self) -> bool {
        self.gaussian || self.voigt
    }

    pub(crate) fn has_gamma(&self) -> bool {
        self.lorentzian || self.voigt
    }
}
