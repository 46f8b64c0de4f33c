//! Background subtraction and cosmic-ray cleanup of map spectra.
//!
//! Both sweeps run pixel by pixel in row-major order and check a
//! [`CancelToken`] between pixels. Background sweeps notify only for the
//! focused pixel; cosmic-ray removal notifies for every pixel it rewrites.

use ndarray::{s, Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};
use crate::fitting::CancelToken;
use crate::map::{Pixel, SpectralMap};

/// How the background of a spectrum is estimated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BackgroundMethod {
    /// The smallest intensity of the spectrum itself.
    Minimum,
    /// Mean intensity over the samples `[lower, upper)` of the spectrum itself.
    IntervalAverage { lower: usize, upper: usize },
    /// The intensities of another pixel of the same map.
    FromPixel(Pixel),
    /// A fixed background, one value per sample.
    FromSpectrum(Array1<f64>),
}

/// Method with pixel references already resolved.
#[derive(Debug, Clone)]
enum Background {
    Minimum,
    IntervalAverage(usize, usize),
    Fixed(Array1<f64>),
}

impl Background {
    fn resolve(map: &SpectralMap, method: &BackgroundMethod) -> Result<Self> {
        let resolution = map.resolution();
        Ok(match method {
            BackgroundMethod::Minimum => Background::Minimum,
            &BackgroundMethod::IntervalAverage { lower, upper } => {
                if lower >= upper || upper > resolution {
                    return Err(MapError::InvalidInterval {
                        lower,
                        upper,
                        resolution,
                    });
                }
                Background::IntervalAverage(lower, upper)
            }
            // Copied so the reference pixel is itself corrected against its
            // original spectrum.
            &BackgroundMethod::FromPixel(p) => {
                Background::Fixed(map.spectrum(Some(p))?.column(1).to_owned())
            }
            BackgroundMethod::FromSpectrum(values) => {
                if values.len() != resolution {
                    return Err(MapError::DimensionMismatch(format!(
                        "Background has {} samples, spectra have {}",
                        values.len(),
                        resolution
                    )));
                }
                Background::Fixed(values.clone())
            }
        })
    }

    fn subtract_from(&self, intensities: ArrayView1<f64>) -> Array1<f64> {
        match self {
            Background::Minimum => {
                let min = intensities
                    .iter()
                    .copied()
                    .filter(|v| !v.is_nan())
                    .fold(f64::INFINITY, f64::min);
                let min = if min.is_finite() { min } else { 0.0 };
                intensities.mapv(|v| v - min)
            }
            Background::IntervalAverage(lower, upper) => {
                let window = intensities.slice(s![*lower..*upper]);
                let mean = window.sum() / window.len() as f64;
                intensities.mapv(|v| v - mean)
            }
            Background::Fixed(values) => &intensities - values,
        }
    }
}

fn apply(map: &mut SpectralMap, background: &Background, p: Pixel, emit: bool) -> Result<()> {
    let mut spectrum = map.spectrum(Some(p))?.to_owned();
    let corrected = background.subtract_from(spectrum.column(1));
    spectrum.column_mut(1).assign(&corrected);
    map.set_spectrum(spectrum.view(), Some(p), emit)
}

/// Subtract a background from one pixel; `None` corrects the focus.
pub fn remove_background(
    map: &mut SpectralMap,
    method: &BackgroundMethod,
    pixel: Option<Pixel>,
) -> Result<()> {
    let p = map.check_pixel(pixel.unwrap_or(map.focus()))?;
    let background = Background::resolve(map, method)?;
    apply(map, &background, p, true)
}

/// Lazy background subtraction over every pixel of a map.
///
/// Yields each corrected pixel.
pub struct BackgroundRemoval<'a> {
    map: &'a mut SpectralMap,
    background: Background,
    pixels: Vec<Pixel>,
    next: usize,
    cancel: CancelToken,
}

impl<'a> BackgroundRemoval<'a> {
    pub fn new(map: &'a mut SpectralMap, method: &BackgroundMethod) -> Result<Self> {
        let background = Background::resolve(map, method)?;
        let pixels = map.pixels().collect();
        Ok(Self {
            map,
            background,
            pixels,
            next: 0,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn total(&self) -> usize {
        self.pixels.len()
    }

    /// Process every remaining pixel, reporting `(completed, total)`.
    ///
    /// Returns the number of corrected pixels.
    pub fn run<G: FnMut(usize, usize)>(mut self, mut progress: G) -> Result<usize> {
        let total = self.total();
        let mut done = 0;
        while let Some(step) = self.next() {
            step?;
            done += 1;
            progress(done, total);
        }
        if done < total {
            log::info!("Background removal cancelled after {} of {} pixels", done, total);
        }
        Ok(done)
    }
}

impl<'a> Iterator for BackgroundRemoval<'a> {
    type Item = Result<Pixel>;

    fn next(&mut self) -> Option<Result<Pixel>> {
        if self.next >= self.pixels.len() || self.cancel.is_cancelled() {
            return None;
        }
        let p = self.pixels[self.next];
        self.next += 1;
        let emit = p == self.map.focus();
        Some(apply(self.map, &self.background, p, emit).map(|_| p))
    }
}

/// Replace cosmic-ray spikes in a 2D map.
///
/// Every sample exceeding the mean of the pixel's axis neighbours by more
/// than `threshold` is replaced by that mean. Neighbours are read in their
/// current state, so pixels earlier in the sweep contribute their cleaned
/// spectra. Each rewritten pixel publishes `SpectrumChanged`; pixels without
/// a hit are left alone. Returns the number of replaced samples.
pub fn remove_cosmic_rays(
    map: &mut SpectralMap,
    threshold: f64,
    cancel: &CancelToken,
) -> Result<usize> {
    map.require_2d("remove_cosmic_rays")?;
    let (nx, ny) = map.size();
    let mut replaced = 0;

    for p in map.pixels().collect::<Vec<_>>() {
        if cancel.is_cancelled() {
            log::info!("Cosmic-ray removal cancelled at pixel {}", p);
            break;
        }

        let neighbours: Vec<Pixel> = [(-1, 0), (1, 0), (0, -1), (0, 1)]
            .iter()
            .filter_map(|&(dx, dy)| p.offset(dx, dy, nx, ny))
            .collect();
        if neighbours.is_empty() {
            continue;
        }

        let mut mean = Array1::<f64>::zeros(map.resolution());
        for &n in &neighbours {
            mean += &map.intensities(n);
        }
        mean /= neighbours.len() as f64;

        let mut spectrum = map.spectrum(Some(p))?.to_owned();
        let mut hits = 0;
        for (value, &reference) in spectrum.column_mut(1).iter_mut().zip(mean.iter()) {
            if *value - reference > threshold {
                *value = reference;
                hits += 1;
            }
        }

        if hits > 0 {
            log::debug!("Replaced {} sample(s) at pixel {}", hits, p);
            replaced += hits;
            map.set_spectrum(spectrum.view(), Some(p), true)?;
        }
    }
    Ok(replaced)
}
