//! Versioned JSON snapshots of a whole map.

use ndarray::{Array3, Array4};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use super::fit_record::FitRecord;
use super::{Micrograph, Pixel, SpectralMap};
use crate::error::{MapError, Result};
use crate::events::Notifier;
use crate::models::{PeakShape, PEAK_SLOTS, SLOT_PARAMS};

/// Format version written by [`SpectralMap::to_snapshot`].
pub const SNAPSHOT_VERSION: u32 = 1;

/// JSON has no NaN, so unset values travel as `null`.
pub(crate) mod nan_as_null {
    use ndarray::{Array, Dimension};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, D>(array: &Array<f64, D>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        D: Dimension + Serialize,
    {
        array
            .mapv(|v| (!v.is_nan()).then_some(v))
            .serialize(serializer)
    }

    pub fn deserialize<'de, De, D>(deserializer: De) -> Result<Array<f64, D>, De::Error>
    where
        De: Deserializer<'de>,
        D: Dimension + Deserialize<'de>,
    {
        let array = Array::<Option<f64>, D>::deserialize(deserializer)?;
        Ok(array.mapv(|v| v.unwrap_or(f64::NAN)))
    }
}

/// Full state of a [`SpectralMap`] apart from its collection id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapSnapshot {
    pub version: u32,
    pub name: String,
    pub dimension: usize,
    #[serde(with = "nan_as_null")]
    pub spectra: Array4<f64>,
    pub data_names: Vec<String>,
    #[serde(with = "nan_as_null")]
    pub data: Array3<f64>,
    pub micrographs: Vec<Micrograph>,
    pub interval: (usize, usize),
    pub focus: Pixel,
    pub selected_data: usize,
    pub fit_shapes: Array3<PeakShape>,
    #[serde(with = "nan_as_null")]
    pub fit_initial: Array4<f64>,
    #[serde(with = "nan_as_null")]
    pub fit_optimized: Array4<f64>,
}

impl SpectralMap {
    pub fn to_snapshot(&self) -> MapSnapshot {
        MapSnapshot {
            version: SNAPSHOT_VERSION,
            name: self.name.clone(),
            dimension: self.dimension,
            spectra: self.spectra.clone(),
            data_names: self.data_names.clone(),
            data: self.data.clone(),
            micrographs: self.micrographs.clone(),
            interval: self.interval,
            focus: self.focus,
            selected_data: self.selected_data,
            fit_shapes: self.fits.shapes.clone(),
            fit_initial: self.fits.initial.clone(),
            fit_optimized: self.fits.optimized.clone(),
        }
    }

    /// Rebuild a map, checking every invariant before anything is returned.
    pub fn from_snapshot(snapshot: MapSnapshot) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(MapError::UnsupportedSnapshotVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        if !(1..=2).contains(&snapshot.dimension) {
            return Err(MapError::DimensionMismatch(format!(
                "Snapshot declares a {}D map",
                snapshot.dimension
            )));
        }

        let mut map = Self::from_parts(
            snapshot.name,
            snapshot.dimension,
            snapshot.spectra,
            snapshot.data_names,
            snapshot.data,
        )?;
        let (nx, ny) = map.size();

        if snapshot.dimension == 1 && ny != 1 {
            return Err(MapError::DimensionMismatch(format!(
                "1D snapshot with a grid of {}x{}",
                nx, ny
            )));
        }
        if snapshot.dimension == 1 && !snapshot.micrographs.is_empty() {
            return Err(MapError::UnsupportedDimension {
                operation: "add_micrograph",
                dimension: 1,
            });
        }

        let record_shape = (nx, ny, PEAK_SLOTS, SLOT_PARAMS);
        if snapshot.fit_shapes.dim() != (nx, ny, PEAK_SLOTS)
            || snapshot.fit_initial.dim() != record_shape
            || snapshot.fit_optimized.dim() != record_shape
        {
            return Err(MapError::DimensionMismatch(
                "Fit record does not match the map grid".to_string(),
            ));
        }

        let (lower, upper) = snapshot.interval;
        let interval_ok = if map.resolution > 1 {
            lower < upper && upper < map.resolution
        } else {
            (lower, upper) == (0, 0)
        };
        if !interval_ok {
            return Err(MapError::InvalidInterval {
                lower,
                upper,
                resolution: map.resolution,
            });
        }

        map.check_pixel(snapshot.focus)?;

        map.micrographs = snapshot.micrographs;
        map.interval = snapshot.interval;
        map.focus = snapshot.focus;
        map.fits = FitRecord {
            shapes: snapshot.fit_shapes,
            initial: snapshot.fit_initial,
            optimized: snapshot.fit_optimized,
        };

        map.channel(snapshot.selected_data)?;
        map.selected_data = snapshot.selected_data;
        map.notifier = Notifier::default();
        Ok(map)
    }

    /// Write the snapshot as JSON.
    pub fn save_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, &self.to_snapshot())?;
        Ok(())
    }

    /// Read a map from a JSON snapshot.
    pub fn load_json<R: Read>(reader: R) -> Result<Self> {
        let snapshot: MapSnapshot = serde_json::from_reader(reader)?;
        Self::from_snapshot(snapshot)
    }
}
