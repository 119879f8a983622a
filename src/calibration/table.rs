//! Tabulated calibration curves and piecewise-linear interpolation.
//!
//! A [`Curve`] is the interpolation primitive: strictly increasing abscissae, arbitrary
//! ordinates. A [`CalibrationTable`] holds the energy/gap (and optional phase) columns of one
//! undulator in one polarization family and offers the three lookups the rest of the crate
//! needs. Tables never extrapolate: any argument outside the tabulated domain is a
//! [`MonoError::Range`].
//!
//! # File format
//!
//! ```text
//! Energy,Gap,Phase
//! 201.15,16.0,15.731
//! 242.73,18.0,15.683
//! ```
//!
//! The `Phase` column is optional. Header names are matched case-insensitively.

use crate::error::{MonoError, MonoResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Polarization family a table was measured (or computed) for.
///
/// Circular-left and circular-right share one table; the sign of the phase is applied by the
/// undulator solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableMode {
    /// Linear horizontal
    Lh,
    /// Linear vertical
    Lv,
    /// Circular (left and right)
    Circular,
}

impl fmt::Display for TableMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableMode::Lh => write!(f, "LH"),
            TableMode::Lv => write!(f, "LV"),
            TableMode::Circular => write!(f, "circular"),
        }
    }
}

/// Origin of a gap/phase table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableSource {
    /// Computed from the magnet model
    #[default]
    Theory,
    /// Fitted to beam measurements
    Measured,
}

impl fmt::Display for TableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableSource::Theory => write!(f, "theory"),
            TableSource::Measured => write!(f, "measured"),
        }
    }
}

/// Linear interpolation over strictly increasing `xs`.
///
/// Returns `None` when `x` lies outside `[xs[0], xs[n-1]]`. Node values are returned exactly.
pub fn interpolate(xs: &[f64], ys: &[f64], x: f64) -> Option<f64> {
    let (first, last) = (*xs.first()?, *xs.last()?);
    if !(first..=last).contains(&x) {
        return None;
    }

    // Index of the first node strictly greater than x
    let upper = xs.partition_point(|&node| node <= x);
    if upper == 0 {
        return ys.first().copied();
    }
    let lower = upper - 1;
    if xs[lower] == x || upper == xs.len() {
        return ys.get(lower).copied();
    }

    let t = (x - xs[lower]) / (xs[upper] - xs[lower]);
    Some(ys[lower] + (ys[upper] - ys[lower]) * t)
}

/// Checks that a column is finite and strictly increasing.
fn check_strictly_increasing(name: &str, column: &str, values: &[f64]) -> MonoResult<()> {
    if let Some(bad) = values.iter().position(|v| !v.is_finite()) {
        return Err(MonoError::Calibration {
            table: name.to_string(),
            reason: format!("{column} value on row {} is not finite", bad + 1),
        });
    }
    if let Some(i) = values.windows(2).position(|w| w[1] <= w[0]) {
        return Err(MonoError::Calibration {
            table: name.to_string(),
            reason: format!(
                "{column} column is not strictly increasing at row {} ({} -> {})",
                i + 2,
                values[i],
                values[i + 1]
            ),
        });
    }
    Ok(())
}

/// A single interpolated curve `y(x)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    name: String,
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Curve {
    /// Build a curve, rejecting unequal lengths, fewer than two nodes, non-finite values or
    /// non-increasing abscissae.
    pub fn new(name: impl Into<String>, x: Vec<f64>, y: Vec<f64>) -> MonoResult<Self> {
        let name = name.into();
        if x.len() != y.len() {
            return Err(MonoError::Calibration {
                table: name,
                reason: format!("{} abscissae but {} ordinates", x.len(), y.len()),
            });
        }
        if x.len() < 2 {
            return Err(MonoError::Calibration {
                table: name,
                reason: "at least two rows are required".to_string(),
            });
        }
        check_strictly_increasing(&name, "x", &x)?;
        if y.iter().any(|v| !v.is_finite()) {
            return Err(MonoError::Calibration {
                table: name,
                reason: "non-finite ordinate".to_string(),
            });
        }
        Ok(Self { name, x, y })
    }

    /// Curve name used in error messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tabulated domain `(min, max)`.
    pub fn domain(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }

    /// Evaluate the curve, failing with `Range` outside the tabulated domain.
    pub fn eval(&self, quantity: &'static str, x: f64) -> MonoResult<f64> {
        interpolate(&self.x, &self.y, x).ok_or_else(|| {
            let (min, max) = self.domain();
            MonoError::Range {
                quantity,
                value: x,
                min,
                max,
                domain: format!("table {}", self.name),
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "Energy", alias = "ENERGY")]
    energy: f64,
    #[serde(alias = "Gap", alias = "GAP")]
    gap: f64,
    #[serde(default, alias = "Phase", alias = "PHASE")]
    phase: Option<f64>,
}

/// Energy/gap/phase calibration of one undulator in one polarization family.
///
/// Units: energy in eV, gap and phase in mm. Tables start out as [`TableSource::Theory`];
/// measured tables are tagged with [`with_source`](Self::with_source).
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    device: String,
    mode: TableMode,
    source: TableSource,
    name: String,
    energy: Vec<f64>,
    gap: Vec<f64>,
    phase: Option<Vec<f64>>,
}

impl CalibrationTable {
    /// Build a table from its columns.
    ///
    /// Energy and gap must both be strictly increasing; the inverse lookup
    /// [`energy_for_gap`](Self::energy_for_gap) relies on the latter.
    pub fn new(
        device: impl Into<String>,
        mode: TableMode,
        energy: Vec<f64>,
        gap: Vec<f64>,
        phase: Option<Vec<f64>>,
    ) -> MonoResult<Self> {
        let device = device.into();
        let name = format!("{device} {mode}");
        Self::with_name(name, device, mode, energy, gap, phase)
    }

    fn with_name(
        name: String,
        device: String,
        mode: TableMode,
        energy: Vec<f64>,
        gap: Vec<f64>,
        phase: Option<Vec<f64>>,
    ) -> MonoResult<Self> {
        if energy.len() < 2 {
            return Err(MonoError::Calibration {
                table: name,
                reason: "at least two rows are required".to_string(),
            });
        }
        if gap.len() != energy.len() || phase.as_ref().is_some_and(|p| p.len() != energy.len()) {
            return Err(MonoError::Calibration {
                table: name,
                reason: "columns have different lengths".to_string(),
            });
        }
        check_strictly_increasing(&name, "energy", &energy)?;
        check_strictly_increasing(&name, "gap", &gap)?;
        if let Some(phase) = &phase {
            if phase.iter().any(|v| !v.is_finite()) {
                return Err(MonoError::Calibration {
                    table: name,
                    reason: "non-finite phase value".to_string(),
                });
            }
        }

        Ok(Self {
            device,
            mode,
            source: TableSource::default(),
            name,
            energy,
            gap,
            phase,
        })
    }

    /// Parse a table from CSV text.
    ///
    /// Either every row has a phase value or none does.
    pub fn from_reader<R: Read>(
        reader: R,
        name: impl Into<String>,
        device: impl Into<String>,
        mode: TableMode,
    ) -> MonoResult<Self> {
        let name = name.into();
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let mut energy = Vec::new();
        let mut gap = Vec::new();
        let mut phase = Vec::new();
        for row in csv_reader.deserialize::<CsvRow>() {
            let row = row?;
            energy.push(row.energy);
            gap.push(row.gap);
            if let Some(p) = row.phase {
                phase.push(p);
            }
        }

        let phase = match phase.len() {
            0 => None,
            n if n == energy.len() => Some(phase),
            n => {
                return Err(MonoError::Calibration {
                    table: name,
                    reason: format!("{n} of {} rows have a phase value", energy.len()),
                })
            }
        };

        Self::with_name(name, device.into(), mode, energy, gap, phase)
    }

    /// Load a table from a CSV file.
    pub fn from_path(
        path: impl AsRef<Path>,
        device: impl Into<String>,
        mode: TableMode,
    ) -> MonoResult<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| MonoError::Calibration {
            table: path.display().to_string(),
            reason: format!("cannot open file: {e}"),
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_reader(file, name, device, mode)
    }

    /// Tag the table with its origin.
    pub fn with_source(mut self, source: TableSource) -> Self {
        self.source = source;
        self
    }

    /// Theory or measured.
    pub fn source(&self) -> TableSource {
        self.source
    }

    /// Device this table belongs to.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Polarization family.
    pub fn mode(&self) -> TableMode {
        self.mode
    }

    /// Table name (file name when loaded from disk).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the table carries a phase column.
    pub fn has_phase(&self) -> bool {
        self.phase.is_some()
    }

    /// Tabulated energy domain `(min, max)` in eV.
    pub fn energy_domain(&self) -> (f64, f64) {
        (self.energy[0], self.energy[self.energy.len() - 1])
    }

    /// Tabulated gap domain `(min, max)` in mm.
    pub fn gap_domain(&self) -> (f64, f64) {
        (self.gap[0], self.gap[self.gap.len() - 1])
    }

    /// Table rows as `(energy, gap)` pairs.
    pub fn rows(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.energy.iter().copied().zip(self.gap.iter().copied())
    }

    fn out_of_range(&self, quantity: &'static str, value: f64, (min, max): (f64, f64)) -> MonoError {
        MonoError::Range {
            quantity,
            value,
            min,
            max,
            domain: format!("table {}", self.name),
        }
    }

    /// Gap (mm) for a photon energy (eV).
    pub fn gap_for_energy(&self, energy: f64) -> MonoResult<f64> {
        interpolate(&self.energy, &self.gap, energy)
            .ok_or_else(|| self.out_of_range("photon energy", energy, self.energy_domain()))
    }

    /// Photon energy (eV) for a gap (mm).
    pub fn energy_for_gap(&self, gap: f64) -> MonoResult<f64> {
        interpolate(&self.gap, &self.energy, gap)
            .ok_or_else(|| self.out_of_range("gap", gap, self.gap_domain()))
    }

    /// Phase (mm) for a photon energy (eV), as tabulated.
    pub fn phase_for_energy(&self, energy: f64) -> MonoResult<f64> {
        let phase = self.phase.as_ref().ok_or_else(|| MonoError::MissingTable {
            device: self.device.clone(),
            mode: format!("{} phase", self.mode),
        })?;
        interpolate(&self.energy, phase, energy)
            .ok_or_else(|| self.out_of_range("photon energy", energy, self.energy_domain()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CalibrationTable {
        CalibrationTable::new(
            "EPU57",
            TableMode::Lh,
            vec![100.0, 200.0, 400.0],
            vec![20.0, 30.0, 40.0],
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_interpolate_nodes_and_midpoints() {
        let xs = [0.0, 1.0, 3.0];
        let ys = [10.0, 20.0, 40.0];
        assert_eq!(interpolate(&xs, &ys, 0.0), Some(10.0));
        assert_eq!(interpolate(&xs, &ys, 1.0), Some(20.0));
        assert_eq!(interpolate(&xs, &ys, 3.0), Some(40.0));
        assert_eq!(interpolate(&xs, &ys, 2.0), Some(30.0));
        assert_eq!(interpolate(&xs, &ys, 0.5), Some(15.0));
    }

    #[test]
    fn test_interpolate_never_extrapolates() {
        let xs = [0.0, 1.0];
        let ys = [0.0, 1.0];
        assert_eq!(interpolate(&xs, &ys, -0.001), None);
        assert_eq!(interpolate(&xs, &ys, 1.001), None);
        assert_eq!(interpolate(&xs, &ys, f64::NAN), None);
        assert_eq!(interpolate(&[], &[], 0.0), None);
    }

    #[test]
    fn test_gap_lookup() {
        let t = table();
        assert_eq!(t.gap_for_energy(200.0).unwrap(), 30.0);
        assert!((t.gap_for_energy(300.0).unwrap() - 35.0).abs() < 1e-12);
        assert!(matches!(
            t.gap_for_energy(401.0),
            Err(MonoError::Range { .. })
        ));
    }

    #[test]
    fn test_source_tag() {
        let t = table();
        assert_eq!(t.source(), TableSource::Theory);
        let measured = t.clone().with_source(TableSource::Measured);
        assert_eq!(measured.source(), TableSource::Measured);
        assert_eq!(measured.gap_for_energy(200.0).unwrap(), t.gap_for_energy(200.0).unwrap());
        assert_eq!(TableSource::Measured.to_string(), "measured");
    }

    #[test]
    fn test_energy_lookup_is_inverse_on_nodes() {
        let t = table();
        for (energy, gap) in t.rows().collect::<Vec<_>>() {
            assert_eq!(t.gap_for_energy(energy).unwrap(), gap);
            assert_eq!(t.energy_for_gap(gap).unwrap(), energy);
        }
        assert!(matches!(t.energy_for_gap(10.0), Err(MonoError::Range { .. })));
    }

    #[test]
    fn test_phase_missing_column() {
        let err = table().phase_for_energy(200.0).unwrap_err();
        assert!(matches!(err, MonoError::MissingTable { .. }));
    }

    #[test]
    fn test_rejects_non_monotonic_energy() {
        let err = CalibrationTable::new(
            "EPU57",
            TableMode::Lh,
            vec![100.0, 300.0, 200.0],
            vec![20.0, 30.0, 40.0],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, MonoError::Calibration { .. }));
        assert!(err.to_string().contains("energy column is not strictly increasing"));
    }

    #[test]
    fn test_rejects_single_row() {
        let err = CalibrationTable::new("EPU57", TableMode::Lh, vec![100.0], vec![20.0], None)
            .unwrap_err();
        assert!(matches!(err, MonoError::Calibration { .. }));
    }

    #[test]
    fn test_parse_csv_with_phase() {
        let csv = "Energy,Gap,Phase\n200.0, 16.0, 15.7\n300.0, 20.0, 15.5\n";
        let t = CalibrationTable::from_reader(csv.as_bytes(), "circ.csv", "EPU57", TableMode::Circular)
            .unwrap();
        assert!(t.has_phase());
        assert_eq!(t.name(), "circ.csv");
        assert!((t.phase_for_energy(250.0).unwrap() - 15.6).abs() < 1e-12);
    }

    #[test]
    fn test_parse_csv_lowercase_header() {
        let csv = "energy,gap\n200.0,16.0\n300.0,20.0\n";
        let t = CalibrationTable::from_reader(csv.as_bytes(), "lh.csv", "EPU57", TableMode::Lh)
            .unwrap();
        assert!(!t.has_phase());
        assert_eq!(t.energy_domain(), (200.0, 300.0));
    }

    #[test]
    fn test_parse_csv_rejects_garbage() {
        let csv = "Energy,Gap\n200.0,sixteen\n";
        let err = CalibrationTable::from_reader(csv.as_bytes(), "bad.csv", "EPU57", TableMode::Lh)
            .unwrap_err();
        assert!(matches!(err, MonoError::Csv(_)));
    }

    #[test]
    fn test_parse_csv_partial_phase_column() {
        let csv = "Energy,Gap,Phase\n200.0,16.0,15.7\n300.0,20.0,\n";
        let err = CalibrationTable::from_reader(csv.as_bytes(), "c.csv", "EPU57", TableMode::Circular)
            .unwrap_err();
        assert!(err.to_string().contains("1 of 2 rows"));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("epu105_lv_theory.csv");
        std::fs::write(&path, "Energy,Gap\n60.0,16.5\n120.0,24.0\n240.0,35.0\n").unwrap();

        let t = CalibrationTable::from_path(&path, "EPU105", TableMode::Lv).unwrap();
        assert_eq!(t.name(), "epu105_lv_theory.csv");
        assert_eq!(t.device(), "EPU105");
        assert_eq!(t.gap_domain(), (16.5, 35.0));

        let missing = CalibrationTable::from_path(dir.path().join("nope.csv"), "EPU105", TableMode::Lv)
            .unwrap_err();
        assert!(matches!(missing, MonoError::Calibration { .. }));
    }

    #[test]
    fn test_curve_eval() {
        let curve = Curve::new("m3", vec![20.0, 30.0], vec![-0.72, -0.71]).unwrap();
        assert!((curve.eval("photon energy", 25.0).unwrap() + 0.715).abs() < 1e-12);
        assert!(curve.eval("photon energy", 31.0).is_err());
        assert!(Curve::new("bad", vec![1.0, 1.0], vec![0.0, 0.0]).is_err());
    }
}
