use crate::core::angle_interval::angle_difference;
use crate::core::direction_range::DirectionRange;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Degrees to radians
pub const DTR: f64 = PI / 180.0;

/// Radians to degrees
pub const RTD: f64 = 180.0 / PI;

/// Full circle in radians
pub const TWO_PI: f64 = 2.0 * PI;

/// Measurement types (polarization / band) carried by a GMF table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasType {
    Vv,
    Hh,
    Vh,
    Hv,
    /// VV-HV cross-polarization correlation
    VvHvCorr,
    /// HH-VH cross-polarization correlation
    HhVhCorr,
    CBandVv,
    CBandHh,
}

impl MeasType {
    pub const COUNT: usize = 8;

    pub const ALL: [MeasType; MeasType::COUNT] = [
        MeasType::Vv,
        MeasType::Hh,
        MeasType::Vh,
        MeasType::Hv,
        MeasType::VvHvCorr,
        MeasType::HhVhCorr,
        MeasType::CBandVv,
        MeasType::CBandHh,
    ];

    /// Position of this type in `MeasType::ALL`
    pub fn index(self) -> usize {
        self as usize
    }

    /// Same transmit and receive polarization
    pub fn is_copol(self) -> bool {
        matches!(
            self,
            MeasType::Vv | MeasType::Hh | MeasType::CBandVv | MeasType::CBandHh
        )
    }

    pub fn is_c_band(self) -> bool {
        matches!(self, MeasType::CBandVv | MeasType::CBandHh)
    }

    /// True for types whose transmit polarization is vertical
    pub fn is_vertical(self) -> bool {
        matches!(
            self,
            MeasType::Vv | MeasType::Vh | MeasType::VvHvCorr | MeasType::CBandVv
        )
    }
}

impl std::fmt::Display for MeasType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeasType::Vv => write!(f, "VV"),
            MeasType::Hh => write!(f, "HH"),
            MeasType::Vh => write!(f, "VH"),
            MeasType::Hv => write!(f, "HV"),
            MeasType::VvHvCorr => write!(f, "VVHV"),
            MeasType::HhVhCorr => write!(f, "HHVH"),
            MeasType::CBandVv => write!(f, "C-VV"),
            MeasType::CBandHh => write!(f, "C-HH"),
        }
    }
}

/// Antenna look geometry relative to the spacecraft track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Look {
    Fore,
    Aft,
}

/// One sigma-0 sample geolocated to a wind vector cell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub meas_type: MeasType,
    /// Observed sigma-0 in linear power units
    pub value: f64,
    /// Incidence angle (radians)
    pub incidence_angle: f64,
    /// Look azimuth referenced to true east (radians)
    pub east_azimuth: f64,
    pub look: Look,
    /// Noise-model coefficients: Kpc variance = (A - 1) s^2 + B s + C
    pub a: f64,
    pub b: f64,
    pub c: f64,
    /// Calibration X factor, used for measurement weighting
    pub x_factor: f64,
    /// Slice count, `None` when the sample is not a slice composite
    pub num_slices: Option<u16>,
    pub land_flag: bool,
    /// Centroid longitude (radians)
    pub longitude: f64,
    /// Centroid latitude (radians)
    pub latitude: f64,
}

impl Measurement {
    /// Create a measurement with neutral noise coefficients
    pub fn new(meas_type: MeasType, value: f64, incidence_angle: f64, east_azimuth: f64) -> Self {
        Self {
            meas_type,
            value,
            incidence_angle,
            east_azimuth,
            look: Look::Fore,
            a: 1.0,
            b: 0.0,
            c: 0.0,
            x_factor: 1.0,
            num_slices: None,
            land_flag: false,
            longitude: 0.0,
            latitude: 0.0,
        }
    }

    /// GMF relative azimuth for a meteorological wind direction.
    /// The GMF convention is rotated by pi from the wind direction.
    pub fn chi(&self, direction: f64) -> f64 {
        direction - self.east_azimuth + PI
    }
}

/// All measurements geolocated to one wind vector cell
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeasurementList {
    measurements: Vec<Measurement>,
}

impl MeasurementList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, meas: Measurement) {
        self.measurements.push(meas);
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Measurement> {
        self.measurements.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Measurement> {
        self.measurements.iter_mut()
    }

    pub fn as_slice(&self) -> &[Measurement] {
        &self.measurements
    }

    /// Remove every measurement for which `keep` returns false while walking
    /// the list. Returns the number removed.
    pub fn retain<F>(&mut self, keep: F) -> usize
    where
        F: FnMut(&Measurement) -> bool,
    {
        let before = self.measurements.len();
        self.measurements.retain(keep);
        before - self.measurements.len()
    }

    /// Average centroid location, computed on unit vectors so that the
    /// dateline does not bias the mean. Returns (longitude, latitude).
    pub fn average_lon_lat(&self) -> Option<(f64, f64)> {
        if self.measurements.is_empty() {
            return None;
        }

        let (mut x, mut y, mut z) = (0.0, 0.0, 0.0);
        for meas in &self.measurements {
            let cos_lat = meas.latitude.cos();
            x += cos_lat * meas.longitude.cos();
            y += cos_lat * meas.longitude.sin();
            z += meas.latitude.sin();
        }

        let mut longitude = y.atan2(x);
        if longitude < 0.0 {
            longitude += TWO_PI;
        }
        let latitude = z.atan2((x * x + y * y).sqrt());
        Some((longitude, latitude))
    }

    /// Largest angular separation between any two look azimuths (radians, <= pi)
    pub fn azimuth_diversity(&self) -> f64 {
        let mut diversity: f64 = 0.0;
        for (i, first) in self.measurements.iter().enumerate() {
            for second in &self.measurements[i + 1..] {
                diversity = diversity.max(angle_difference(first.east_azimuth, second.east_azimuth));
            }
        }
        diversity
    }
}

impl FromIterator<Measurement> for MeasurementList {
    fn from_iter<I: IntoIterator<Item = Measurement>>(iter: I) -> Self {
        Self {
            measurements: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a MeasurementList {
    type Item = &'a Measurement;
    type IntoIter = std::slice::Iter<'a, Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.measurements.iter()
    }
}

/// Wind speed (m/s) and meteorological direction (radians)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindVector {
    pub speed: f64,
    pub direction: f64,
}

impl WindVector {
    pub fn new(speed: f64, direction: f64) -> Self {
        Self { speed, direction }
    }

    pub fn from_uv(u: f64, v: f64) -> Self {
        Self {
            speed: u.hypot(v),
            direction: v.atan2(u),
        }
    }

    pub fn uv(&self) -> (f64, f64) {
        (
            self.speed * self.direction.cos(),
            self.speed * self.direction.sin(),
        )
    }
}

/// One ambiguous wind solution with its score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindVectorPlus {
    pub speed: f64,
    pub direction: f64,
    /// Objective value, probability mass or rank depending on the producer
    pub objective: f64,
}

impl WindVectorPlus {
    pub fn new(speed: f64, direction: f64, objective: f64) -> Self {
        Self {
            speed,
            direction,
            objective,
        }
    }
}

/// Retrieval result for one wind vector cell
#[derive(Debug, Clone, Default)]
pub struct Wvc {
    pub longitude: f64,
    pub latitude: f64,
    pub ambiguities: Vec<WindVectorPlus>,
    /// One uncertainty range per ambiguity when built, otherwise empty
    pub direction_ranges: Vec<DirectionRange>,
    /// Prior wind used as a disambiguation aid
    pub nudge: Option<WindVector>,
    pub rain_probability: Option<f32>,
    /// Rain backscatter removed by the rain-corrected retrieval
    pub rain_correction: Option<f64>,
    /// Index of the selected ambiguity
    pub selected: Option<usize>,
}

impl Wvc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ambiguities.is_empty()
    }

    /// Sort ambiguities by objective, highest first. The sort is stable, so
    /// repeating it leaves the order unchanged.
    pub fn sort_by_objective(&mut self) {
        let mut order: Vec<usize> = (0..self.ambiguities.len()).collect();
        order.sort_by(|&i, &j| {
            self.ambiguities[j]
                .objective
                .total_cmp(&self.ambiguities[i].objective)
        });
        self.apply_order(&order);
    }

    /// Sort ambiguities by direction, ascending
    pub fn sort_by_direction(&mut self) {
        let mut order: Vec<usize> = (0..self.ambiguities.len()).collect();
        order.sort_by(|&i, &j| {
            self.ambiguities[i]
                .direction
                .total_cmp(&self.ambiguities[j].direction)
        });
        self.apply_order(&order);
    }

    /// Drop trailing ambiguities until at most `max` remain.
    /// Returns the number removed.
    pub fn cap_ambiguities(&mut self, max: usize) -> usize {
        let count = self.ambiguities.len();
        if count <= max {
            return 0;
        }

        let removed = count - max;
        log::debug!("too many solutions: deleting {}", removed);
        self.ambiguities.truncate(max);
        if self.direction_ranges.len() > max {
            self.direction_ranges.truncate(max);
        }
        if matches!(self.selected, Some(idx) if idx >= max) {
            self.selected = None;
        }
        removed
    }

    /// Remove ambiguities with identical speed and direction. Returns the
    /// number removed.
    pub fn remove_duplicates(&mut self) -> usize {
        let mut keep: Vec<usize> = Vec::with_capacity(self.ambiguities.len());
        for (i, wvp) in self.ambiguities.iter().enumerate() {
            let duplicate = keep.iter().any(|&k| {
                let other = &self.ambiguities[k];
                other.speed == wvp.speed && other.direction == wvp.direction
            });
            if !duplicate {
                keep.push(i);
            }
        }

        let removed = self.ambiguities.len() - keep.len();
        if removed > 0 {
            self.apply_order(&keep);
        }
        removed
    }

    /// Ambiguity whose direction is closest to `direction`
    pub fn nearest_to_direction(&self, direction: f64) -> Option<&WindVectorPlus> {
        self.ambiguities.iter().min_by(|a, b| {
            angle_difference(a.direction, direction)
                .total_cmp(&angle_difference(b.direction, direction))
        })
    }

    /// Rebuild the ambiguity list (and the parallel direction ranges) from
    /// the given index order. Indices not listed are dropped.
    fn apply_order(&mut self, order: &[usize]) {
        let parallel = self.direction_ranges.len() == self.ambiguities.len();

        let ambiguities: Vec<WindVectorPlus> = order.iter().map(|&i| self.ambiguities[i]).collect();
        if parallel {
            let ranges: Vec<DirectionRange> = order
                .iter()
                .map(|&i| self.direction_ranges[i].clone())
                .collect();
            self.direction_ranges = ranges;
        }
        self.selected = self
            .selected
            .and_then(|sel| order.iter().position(|&i| i == sel));
        self.ambiguities = ambiguities;
    }
}

/// Error types for wind retrieval
#[derive(Debug, thiserror::Error)]
pub enum WindError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GMF table load error: {0}")]
    TableLoad(String),

    #[error("Invalid GMF table: {0}")]
    InvalidTable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Allocation failure: {0}")]
    Allocation(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

impl From<std::collections::TryReserveError> for WindError {
    fn from(err: std::collections::TryReserveError) -> Self {
        WindError::Allocation(err.to_string())
    }
}

/// Result type for wind retrieval operations
pub type WindResult<T> = Result<T, WindError>;
