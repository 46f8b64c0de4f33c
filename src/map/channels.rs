//! Data-channel numbering.
//!
//! Channel indices run over the imported scalar channels first, then the
//! micrographs (2D maps only), then the quantities derived from the fit
//! record. For every slot that is active on any pixel the fit block lists
//! intensity and center, sigma if the slot is ever Gaussian or Voigt, gamma
//! if it is ever Lorentzian or Voigt, and the FWHM. Widths are reported in
//! milli-units of the fit's energy unit.

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use super::fit_record::SlotUsage;
use crate::models::{PeakShape, PEAK_SLOTS, SLOT_PARAMS};

/// Scale applied to widths for display.
pub const MILLI: f64 = 1000.0;

const SUBSCRIPTS: [char; PEAK_SLOTS] = ['₁', '₂', '₃', '₄', '₅', '₆'];

/// A quantity derived from one peak slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitQuantity {
    Intensity,
    Center,
    Sigma,
    Gamma,
    Fwhm,
}

impl FitQuantity {
    pub fn symbol(self) -> &'static str {
        match self {
            FitQuantity::Intensity => "I",
            FitQuantity::Center => "ε",
            FitQuantity::Sigma => "σ",
            FitQuantity::Gamma => "γ",
            FitQuantity::Fwhm => "FWHM",
        }
    }

    /// Display name for the quantity of `slot`, e.g. `σ₂`.
    pub fn name(self, slot: usize) -> String {
        let mut name = self.symbol().to_string();
        if let Some(sub) = SUBSCRIPTS.get(slot) {
            name.push(*sub);
        }
        name
    }

    /// Value of the quantity for a slot with `shape` and optimized `params`.
    ///
    /// NaN where the shape has no such quantity.
    pub fn value(self, shape: PeakShape, params: &[f64; SLOT_PARAMS]) -> f64 {
        if !shape.is_active() {
            return f64::NAN;
        }
        match self {
            FitQuantity::Intensity => params[0],
            FitQuantity::Center => params[1],
            FitQuantity::Sigma => MILLI * shape.sigma(params),
            FitQuantity::Gamma => MILLI * shape.gamma(params),
            FitQuantity::Fwhm => MILLI * shape.fwhm(params),
        }
    }
}

/// What a data index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataChannel {
    /// Imported scalar channel. Channel 0 is the interval intensity.
    Scalar(usize),
    /// Registered micrograph.
    Micrograph(usize),
    /// Quantity derived from a fit slot.
    Fit { slot: usize, quantity: FitQuantity },
}

/// Whole-map content of a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum DataMap {
    /// One value per pixel, shape `(nx, ny)`.
    Grid(Array2<f64>),
    /// A micrograph image, shape `(rows, cols, colour channels)`.
    Image(Array3<f64>),
}

impl DataMap {
    pub fn as_grid(&self) -> Option<&Array2<f64>> {
        match self {
            DataMap::Grid(grid) => Some(grid),
            DataMap::Image(_) => None,
        }
    }
}

/// Fit-derived channels in numbering order.
pub(crate) fn fit_channels(usage: &[SlotUsage; PEAK_SLOTS]) -> Vec<(usize, FitQuantity)> {
    let mut channels = Vec::new();
    for (slot, u) in usage.iter().enumerate() {
        if !u.active() {
            continue;
        }
        channels.push((slot, FitQuantity::Intensity));
        channels.push((slot, FitQuantity::Center));
        if u.has_sigma() {
            channels.push((slot, FitQuantity::Sigma));
        }
        if u.has_gamma() {
            channels.push((slot, FitQuantity::Gamma));
        }
        channels.push((slot, FitQuantity::Fwhm));
    }
    channels
}
