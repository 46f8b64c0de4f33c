//! The spectral map data model.
//!
//! A [`SpectralMap`] is a 1D line scan or a 2D grid of pixels, each holding a
//! spectrum of `R` (energy, intensity) samples, a set of scalar data channels
//! and a six-slot peak fit record. All per-pixel arrays carry the grid on
//! their two leading (or, for data channels, trailing) axes; line scans use a
//! grid of `nx x 1`.

pub mod channels;
pub mod fit_record;
pub mod geometry;
pub mod snapshot;

use ndarray::{s, Array2, Array3, Array4, ArrayD, ArrayView1, ArrayView2, Axis, Ix2, Ix3, Ix4};
use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};
use crate::events::{MapEvent, MapId, Notifier};
use crate::models::{PeakShape, PEAK_SLOTS};

pub use channels::{DataChannel, DataMap, FitQuantity, MILLI};
pub use fit_record::{flat_len, pack, unpack, PixelFit, SlotParams};
pub use geometry::{FlipAxis, Pixel, Rotation, Transform};
pub use snapshot::{MapSnapshot, SNAPSHOT_VERSION};

use fit_record::FitRecord;

/// Map content as delivered by a file loader.
///
/// `spectra` has shape `(nx, R, 2)` for line scans or `(nx, ny, R, 2)` for
/// 2D maps; `data` has shape `(channels, nx)` or `(channels, nx, ny)`.
/// Channel 0 is the integrated intensity.
#[derive(Debug, Clone)]
pub struct MapSource {
    pub name: String,
    pub spectra: ArrayD<f64>,
    pub data_names: Vec<String>,
    pub data: ArrayD<f64>,
}

/// Which end of the integration interval to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalSide {
    Lower,
    Upper,
}

/// Per-pixel reduction of the spectrum intensities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reduction {
    Integral,
    Mean,
    Maximum,
}

/// An image registered onto a 2D map.
///
/// Axis 0 runs along x and axis 1 along y, so the image follows the map
/// through flips and rotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Micrograph {
    pub name: String,
    #[serde(with = "snapshot::nan_as_null")]
    pub image: Array3<f64>,
}

/// A 1D or 2D hyperspectral map.
///
/// Clones carry the same data but are detached from any collection, so they
/// publish no events until added to one.
#[derive(Debug)]
pub struct SpectralMap {
    name: String,
    dimension: usize,
    resolution: usize,
    /// `(nx, ny, R, 2)`
    spectra: Array4<f64>,
    /// `(channels, nx, ny)`
    data: Array3<f64>,
    data_names: Vec<String>,
    micrographs: Vec<Micrograph>,
    interval: (usize, usize),
    focus: Pixel,
    selected_data: usize,
    fits: FitRecord,
    notifier: Notifier,
}

impl Clone for SpectralMap {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            dimension: self.dimension,
            resolution: self.resolution,
            spectra: self.spectra.clone(),
            data: self.data.clone(),
            data_names: self.data_names.clone(),
            micrographs: self.micrographs.clone(),
            interval: self.interval,
            focus: self.focus,
            selected_data: self.selected_data,
            fits: self.fits.clone(),
            notifier: Notifier::default(),
        }
    }
}

fn shape_error(err: ndarray::ShapeError) -> MapError {
    MapError::DimensionMismatch(err.to_string())
}

impl SpectralMap {
    /// Build a map from loader output, validating every shape invariant.
    pub fn from_source(source: MapSource) -> Result<Self> {
        let MapSource {
            name,
            spectra,
            data_names,
            data,
        } = source;

        let (dimension, spectra, data) = match (spectra.ndim(), data.ndim()) {
            (3, 2) => (
                1,
                spectra
                    .into_dimensionality::<Ix3>()
                    .map_err(shape_error)?
                    .insert_axis(Axis(1)),
                data.into_dimensionality::<Ix2>()
                    .map_err(shape_error)?
                    .insert_axis(Axis(2)),
            ),
            (4, 3) => (
                2,
                spectra.into_dimensionality::<Ix4>().map_err(shape_error)?,
                data.into_dimensionality::<Ix3>().map_err(shape_error)?,
            ),
            (s, d) => {
                return Err(MapError::DimensionMismatch(format!(
                    "Spectra with {} axes and data with {} axes do not describe a 1D or 2D map",
                    s, d
                )))
            }
        };

        Self::from_parts(
            name,
            dimension,
            spectra.as_standard_layout().into_owned(),
            data_names,
            data.as_standard_layout().into_owned(),
        )
    }

    fn from_parts(
        name: String,
        dimension: usize,
        spectra: Array4<f64>,
        data_names: Vec<String>,
        data: Array3<f64>,
    ) -> Result<Self> {
        let (nx, ny, resolution, pair) = spectra.dim();
        let (channels, dx, dy) = data.dim();

        if pair != 2 {
            return Err(MapError::DimensionMismatch(format!(
                "Spectra must hold (energy, intensity) pairs, last axis has length {}",
                pair
            )));
        }
        if nx == 0 || ny == 0 || resolution == 0 {
            return Err(MapError::DimensionMismatch(
                "A map needs at least one pixel and one spectral sample".to_string(),
            ));
        }
        if (dx, dy) != (nx, ny) {
            return Err(MapError::DimensionMismatch(format!(
                "Data grid {}x{} does not match spectra grid {}x{}",
                dx, dy, nx, ny
            )));
        }
        if channels == 0 {
            return Err(MapError::DimensionMismatch(
                "A map needs at least the intensity channel".to_string(),
            ));
        }
        if data_names.len() != channels {
            return Err(MapError::DimensionMismatch(format!(
                "{} data names for {} data channels",
                data_names.len(),
                channels
            )));
        }

        let interval = if resolution > 1 {
            (0, resolution - 1)
        } else {
            (0, 0)
        };

        Ok(Self {
            name,
            dimension,
            resolution,
            spectra,
            data,
            data_names,
            micrographs: Vec::new(),
            interval,
            focus: Pixel::new(nx / 2, ny / 2),
            selected_data: 0,
            fits: FitRecord::new(nx, ny),
            notifier: Notifier::default(),
        })
    }

    pub(crate) fn attach(&mut self, notifier: Notifier) {
        self.notifier = notifier;
    }

    /// Id assigned by the owning collection, if any.
    pub fn id(&self) -> Option<MapId> {
        self.notifier.id()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 1 for line scans, 2 for spatial maps.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Grid size `(nx, ny)`; line scans report `ny = 1`.
    pub fn size(&self) -> (usize, usize) {
        let (nx, ny, _, _) = self.spectra.dim();
        (nx, ny)
    }

    pub fn pixel_count(&self) -> usize {
        let (nx, ny) = self.size();
        nx * ny
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Integration window `[lower, upper)` of the intensity channel.
    pub fn interval(&self) -> (usize, usize) {
        self.interval
    }

    pub fn focus(&self) -> Pixel {
        self.focus
    }

    pub fn selected_data(&self) -> usize {
        self.selected_data
    }

    /// All pixels, x outer and y inner.
    pub fn pixels(&self) -> impl Iterator<Item = Pixel> {
        let (nx, ny) = self.size();
        (0..nx).flat_map(move |x| (0..ny).map(move |y| Pixel::new(x, y)))
    }

    pub fn contains(&self, pixel: Pixel) -> bool {
        let (nx, ny) = self.size();
        pixel.x < nx && pixel.y < ny
    }

    pub(crate) fn check_pixel(&self, pixel: Pixel) -> Result<Pixel> {
        if self.contains(pixel) {
            Ok(pixel)
        } else {
            let (nx, ny) = self.size();
            Err(MapError::PixelOutOfBounds { pixel, nx, ny })
        }
    }

    /// The given pixel, or the focus.
    fn resolve(&self, pixel: Option<Pixel>) -> Result<Pixel> {
        self.check_pixel(pixel.unwrap_or(self.focus))
    }

    pub(crate) fn require_2d(&self, operation: &'static str) -> Result<()> {
        if self.dimension == 2 {
            Ok(())
        } else {
            Err(MapError::UnsupportedDimension {
                operation,
                dimension: self.dimension,
            })
        }
    }

    /// Spectrum of a pixel as an `R x 2` array of (energy, intensity) rows.
    pub fn spectrum(&self, pixel: Option<Pixel>) -> Result<ArrayView2<'_, f64>> {
        let p = self.resolve(pixel)?;
        Ok(self.spectra.slice(s![p.x, p.y, .., ..]))
    }

    pub(crate) fn intensities(&self, p: Pixel) -> ArrayView1<'_, f64> {
        self.spectra.slice(s![p.x, p.y, .., 1])
    }

    /// Replace a pixel's spectrum and set its intensity channel to the sum
    /// of the new intensities.
    pub fn set_spectrum(
        &mut self,
        spectrum: ArrayView2<f64>,
        pixel: Option<Pixel>,
        emit: bool,
    ) -> Result<()> {
        let p = self.resolve(pixel)?;
        if spectrum.dim() != (self.resolution, 2) {
            return Err(MapError::DimensionMismatch(format!(
                "Expected a {}x2 spectrum, got {}x{}",
                self.resolution,
                spectrum.nrows(),
                spectrum.ncols()
            )));
        }

        self.spectra.slice_mut(s![p.x, p.y, .., ..]).assign(&spectrum);
        self.data[[0, p.x, p.y]] = spectrum.column(1).sum();

        if emit {
            self.notifier
                .emit(|map| MapEvent::SpectrumChanged { map, pixel: p });
        }
        Ok(())
    }

    /// Move the focus. Emits only if the focus actually moved.
    pub fn set_focus(&mut self, pixel: Pixel) -> Result<()> {
        let p = self.check_pixel(pixel)?;
        if p != self.focus {
            self.focus = p;
            self.notifier.emit(MapEvent::FocusChanged);
        }
        Ok(())
    }

    /// Move one end of the integration window and recompute the intensity
    /// channel of every pixel. The window must stay within `0 ≤ lo < hi < R`.
    pub fn set_interval(&mut self, side: IntervalSide, value: usize) -> Result<()> {
        let (lower, upper) = match side {
            IntervalSide::Lower => (value, self.interval.1),
            IntervalSide::Upper => (self.interval.0, value),
        };
        if lower >= upper || upper >= self.resolution {
            return Err(MapError::InvalidInterval {
                lower,
                upper,
                resolution: self.resolution,
            });
        }

        self.interval = (lower, upper);
        let window = self.spectra.slice(s![.., .., lower..upper, 1]);
        let sums = window.sum_axis(Axis(2));
        self.data.index_axis_mut(Axis(0), 0).assign(&sums);

        log::debug!(
            "Interval of '{}' set to [{}, {}), intensities recomputed",
            self.name,
            lower,
            upper
        );
        self.notifier.emit(MapEvent::IntervalChanged);
        Ok(())
    }

    pub fn fit(&self, pixel: Option<Pixel>) -> Result<PixelFit> {
        let p = self.resolve(pixel)?;
        Ok(self.fits.get(p))
    }

    /// Peak shapes of one pixel.
    pub fn fit_functions(&self, pixel: Option<Pixel>) -> Result<[PeakShape; PEAK_SLOTS]> {
        let p = self.resolve(pixel)?;
        Ok(self.fits.shapes_at(p))
    }

    /// Whether any slot of the pixel holds a peak.
    pub fn has_fit(&self, pixel: Pixel) -> Result<bool> {
        let p = self.check_pixel(pixel)?;
        Ok(self.fits.has_active_peaks(p))
    }

    /// Overwrite a pixel's fit record from flattened parameter vectors.
    ///
    /// Both vectors follow the packing of [`pack`]. Nothing is written if
    /// either has the wrong length.
    pub fn set_fit(
        &mut self,
        shapes: [PeakShape; PEAK_SLOTS],
        initial: &[f64],
        optimized: &[f64],
        pixel: Option<Pixel>,
        emit: bool,
    ) -> Result<()> {
        let p = self.resolve(pixel)?;
        let fit = PixelFit {
            shapes,
            initial: unpack(&shapes, initial)?,
            optimized: unpack(&shapes, optimized)?,
        };
        self.fits.set(p, &fit);

        if emit {
            self.notifier
                .emit(|map| MapEvent::FitChanged { map, pixel: p });
        }
        Ok(())
    }

    /// Reset all six slots of a pixel to off.
    pub fn clear_fit(&mut self, pixel: Option<Pixel>, emit: bool) -> Result<()> {
        let p = self.resolve(pixel)?;
        self.fits.clear(p);

        if emit {
            self.notifier
                .emit(|map| MapEvent::FitChanged { map, pixel: p });
        }
        Ok(())
    }

    /// Mirror a 2D map along one axis.
    pub fn flip(&mut self, axis: FlipAxis) -> Result<()> {
        self.require_2d("flip")?;
        self.apply_transform(Transform::Flip(axis));
        Ok(())
    }

    /// Turn a 2D map by a quarter.
    pub fn rotate(&mut self, rotation: Rotation) -> Result<()> {
        self.require_2d("rotate")?;
        self.apply_transform(Transform::Rotate(rotation));
        Ok(())
    }

    fn apply_transform(&mut self, t: Transform) {
        let (nx, ny) = self.size();
        self.spectra = t.apply_to(&self.spectra, 0, 1);
        self.data = t.apply_to(&self.data, 1, 2);
        self.fits = self.fits.transformed(t);
        for micrograph in &mut self.micrographs {
            micrograph.image = t.apply_to(&micrograph.image, 0, 1);
        }
        self.focus = t.apply_pixel(self.focus, nx, ny);

        log::debug!("Applied {:?} to '{}'", t, self.name);
        self.notifier.emit(MapEvent::GeometryChanged);
    }

    /// Register an image on a 2D map and return its data index.
    pub fn add_micrograph(&mut self, name: impl Into<String>, image: Array3<f64>) -> Result<usize> {
        self.require_2d("add_micrograph")?;
        self.micrographs.push(Micrograph {
            name: name.into(),
            image,
        });
        Ok(self.data_names.len() + self.micrographs.len() - 1)
    }

    pub fn micrographs(&self) -> &[Micrograph] {
        &self.micrographs
    }

    /// Imported scalar channel names, intensity first.
    pub fn data_names(&self) -> &[String] {
        &self.data_names
    }

    /// Number of addressable data channels, fit channels included.
    pub fn data_count(&self) -> usize {
        self.data_names.len()
            + self.micrographs.len()
            + channels::fit_channels(&self.fits.slot_usage()).len()
    }

    /// Resolve a data index according to the channel numbering.
    pub fn channel(&self, index: usize) -> Result<DataChannel> {
        let scalars = self.data_names.len();
        let images = self.micrographs.len();
        if index < scalars {
            return Ok(DataChannel::Scalar(index));
        }
        if index < scalars + images {
            return Ok(DataChannel::Micrograph(index - scalars));
        }

        let fit = channels::fit_channels(&self.fits.slot_usage());
        fit.get(index - scalars - images)
            .map(|&(slot, quantity)| DataChannel::Fit { slot, quantity })
            .ok_or(MapError::InvalidDataIndex {
                index,
                count: scalars + images + fit.len(),
            })
    }

    /// Select the channel used when no index is given.
    pub fn set_selected_data(&mut self, index: usize) -> Result<()> {
        self.channel(index)?;
        if index != self.selected_data {
            self.selected_data = index;
            self.notifier.emit(MapEvent::SelectedDataChanged);
        }
        Ok(())
    }

    /// Whole-map content of a channel; `None` uses the selected channel.
    pub fn data_map(&self, index: Option<usize>) -> Result<DataMap> {
        let channel = self.channel(index.unwrap_or(self.selected_data))?;
        Ok(match channel {
            DataChannel::Scalar(c) => DataMap::Grid(self.data.index_axis(Axis(0), c).to_owned()),
            DataChannel::Micrograph(m) => DataMap::Image(self.micrographs[m].image.clone()),
            DataChannel::Fit { slot, quantity } => {
                let (nx, ny) = self.size();
                DataMap::Grid(Array2::from_shape_fn((nx, ny), |(x, y)| {
                    self.fit_value(Pixel::new(x, y), slot, quantity)
                }))
            }
        })
    }

    /// Value of a channel at one pixel. Micrographs have no per-pixel value.
    pub fn data(&self, index: Option<usize>, pixel: Option<Pixel>) -> Result<f64> {
        let index = index.unwrap_or(self.selected_data);
        let p = self.resolve(pixel)?;
        match self.channel(index)? {
            DataChannel::Scalar(c) => Ok(self.data[[c, p.x, p.y]]),
            DataChannel::Micrograph(_) => Err(MapError::InvalidParameter(format!(
                "Data channel {} is a micrograph and has no per-pixel value",
                index
            ))),
            DataChannel::Fit { slot, quantity } => Ok(self.fit_value(p, slot, quantity)),
        }
    }

    fn fit_value(&self, p: Pixel, slot: usize, quantity: FitQuantity) -> f64 {
        let fit = self.fits.get(p);
        quantity.value(fit.shapes[slot], &fit.optimized[slot])
    }

    /// Display name of a channel; `None` uses the selected channel.
    pub fn data_name(&self, index: Option<usize>) -> Result<String> {
        Ok(match self.channel(index.unwrap_or(self.selected_data))? {
            DataChannel::Scalar(c) => self.data_names[c].clone(),
            DataChannel::Micrograph(m) => self.micrographs[m].name.clone(),
            DataChannel::Fit { slot, quantity } => quantity.name(slot),
        })
    }

    /// Per-pixel reduction of the full spectrum intensities.
    pub fn spectral_reduction(&self, reduction: Reduction) -> Array2<f64> {
        let intensities = self.spectra.index_axis(Axis(3), 1);
        match reduction {
            Reduction::Integral => intensities.sum_axis(Axis(2)),
            Reduction::Mean => intensities.sum_axis(Axis(2)) / self.resolution as f64,
            Reduction::Maximum => {
                intensities.fold_axis(Axis(2), f64::NEG_INFINITY, |&m, &v| m.max(v))
            }
        }
    }
}
