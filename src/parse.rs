//! Text input: user-entered peak parameter tables and two-column spectra.

use ndarray::{Array1, Array2};
use nom::{
    character::complete::{multispace0, space0, space1},
    multi::separated_list1,
    number::complete::double,
    sequence::{delimited, preceded},
    IResult, Parser,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{MapError, Result};
use crate::fitting::FitRequest;
use crate::map::{FitQuantity, MILLI};
use crate::models::{PeakShape, PEAK_SLOTS};

/// Start value and bounds of one parameter, as typed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterFields {
    pub value: String,
    pub lower: String,
    pub upper: String,
}

impl ParameterFields {
    pub fn new(value: &str, lower: &str, upper: &str) -> Self {
        Self {
            value: value.to_string(),
            lower: lower.to_string(),
            upper: upper.to_string(),
        }
    }
}

/// One row of the peak table. Sigma and gamma are entered in milli-units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakEntry {
    pub shape: PeakShape,
    pub amplitude: ParameterFields,
    pub center: ParameterFields,
    pub sigma: ParameterFields,
    pub gamma: ParameterFields,
}

impl PeakEntry {
    pub fn new(shape: PeakShape) -> Self {
        Self {
            shape,
            ..Self::default()
        }
    }

    pub fn with_amplitude(mut self, value: &str, lower: &str, upper: &str) -> Self {
        self.amplitude = ParameterFields::new(value, lower, upper);
        self
    }

    pub fn with_center(mut self, value: &str, lower: &str, upper: &str) -> Self {
        self.center = ParameterFields::new(value, lower, upper);
        self
    }

    pub fn with_sigma(mut self, value: &str, lower: &str, upper: &str) -> Self {
        self.sigma = ParameterFields::new(value, lower, upper);
        self
    }

    pub fn with_gamma(mut self, value: &str, lower: &str, upper: &str) -> Self {
        self.gamma = ParameterFields::new(value, lower, upper);
        self
    }

    /// The fields the shape reads, with their quantity and unit scale.
    fn fields(&self) -> Vec<(FitQuantity, &ParameterFields, f64)> {
        let mut fields = vec![
            (FitQuantity::Intensity, &self.amplitude, 1.0),
            (FitQuantity::Center, &self.center, 1.0),
        ];
        if self.shape.has_sigma() {
            fields.push((FitQuantity::Sigma, &self.sigma, MILLI));
        }
        if self.shape.has_gamma() {
            fields.push((FitQuantity::Gamma, &self.gamma, MILLI));
        }
        fields
    }
}

fn padded_number(input: &str) -> IResult<&str, f64> {
    delimited(multispace0, double, multispace0).parse(input)
}

/// Read one numeric field, naming it in the error.
pub fn parse_number(text: &str, field: &str) -> Result<f64> {
    match padded_number(text) {
        Ok(("", value)) if !value.is_nan() => Ok(value),
        _ => Err(MapError::Parse {
            field: field.to_string(),
            message: format!("'{}' is not a number", text.trim()),
        }),
    }
}

/// Build a fit request from the six table rows.
///
/// Rows whose shape is off are ignored. The first unreadable field stops
/// the parse; start values must be finite, bounds may be `inf`/`-inf`.
pub fn parse_fit_table(rows: &[PeakEntry; PEAK_SLOTS]) -> Result<FitRequest> {
    let mut shapes = [PeakShape::Off; PEAK_SLOTS];
    let mut initial = Vec::new();
    let mut lower = Vec::new();
    let mut upper = Vec::new();

    for (slot, row) in rows.iter().enumerate() {
        shapes[slot] = row.shape;
        if !row.shape.is_active() {
            continue;
        }
        for (quantity, fields, scale) in row.fields() {
            let name = quantity.name(slot);

            let value = parse_number(&fields.value, &format!("{} initial value", name))?;
            if !value.is_finite() {
                return Err(MapError::Parse {
                    field: format!("{} initial value", name),
                    message: "start values must be finite".to_string(),
                });
            }
            initial.push(value / scale);
            lower.push(parse_number(&fields.lower, &format!("{} lower bound", name))? / scale);
            upper.push(parse_number(&fields.upper, &format!("{} upper bound", name))? / scale);
        }
    }

    FitRequest::new(shapes, initial, &lower, &upper)
}

fn row(input: &str) -> IResult<&str, Vec<f64>> {
    preceded(space0, separated_list1(space1, double)).parse(input)
}

/// Read whitespace-separated columns, keeping the first two.
///
/// Blank lines and lines starting with `#` are skipped.
pub fn read_two_column<R: Read>(mut reader: R) -> Result<Array2<f64>> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;

    let mut values = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let columns = match row(line) {
            Ok((rest, columns)) if rest.trim().is_empty() && columns.len() >= 2 => columns,
            _ => {
                return Err(MapError::Parse {
                    field: format!("line {}", number + 1),
                    message: format!("expected at least two numeric columns, got '{}'", trimmed),
                })
            }
        };
        values.extend_from_slice(&columns[..2]);
    }

    let rows = values.len() / 2;
    Array2::from_shape_vec((rows, 2), values)
        .map_err(|e| MapError::DimensionMismatch(e.to_string()))
}

/// Intensities (second column) of a background file.
pub fn read_background<P: AsRef<Path>>(path: P) -> Result<Array1<f64>> {
    let table = read_two_column(File::open(path)?)?;
    Ok(table.column(1).to_owned())
}
