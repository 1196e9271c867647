//! Best speed and objective per direction bin

use crate::core::angle_interval::wrap_angle;
use crate::core::config::RetrievalConfig;
use crate::core::objective::WindObjective;
use crate::core::optimize::golden_section_maximize;
use crate::types::{WindError, WindResult, TWO_PI};

/// Half width of the speed bracket carried from one direction to the next
const BRACKET_HALF_WIDTH: f64 = 2.0;

/// Objective maximized over speed at each of `phi_count` directions
#[derive(Debug, Clone)]
pub struct SolutionCurve {
    best_speed: Vec<f64>,
    best_obj: Vec<f64>,
}

impl SolutionCurve {
    /// Allocate a zeroed curve. Allocation failure is reported, not aborted.
    pub fn new(phi_count: usize) -> WindResult<Self> {
        if phi_count == 0 {
            return Err(WindError::InvalidConfig(
                "solution curve needs at least one direction bin".to_string(),
            ));
        }
        let mut best_speed = Vec::new();
        best_speed.try_reserve_exact(phi_count)?;
        best_speed.resize(phi_count, 0.0);
        let mut best_obj = Vec::new();
        best_obj.try_reserve_exact(phi_count)?;
        best_obj.resize(phi_count, 0.0);
        Ok(Self { best_speed, best_obj })
    }

    /// Curve from precomputed samples; the two slices must be equally long
    pub fn from_samples(best_speed: Vec<f64>, best_obj: Vec<f64>) -> WindResult<Self> {
        if best_speed.is_empty() || best_speed.len() != best_obj.len() {
            return Err(WindError::Processing(format!(
                "mismatched solution curve samples: {} speeds, {} objectives",
                best_speed.len(),
                best_obj.len()
            )));
        }
        Ok(Self { best_speed, best_obj })
    }

    pub fn phi_count(&self) -> usize {
        self.best_obj.len()
    }

    pub fn phi_step(&self) -> f64 {
        TWO_PI / self.phi_count() as f64
    }

    /// Direction of bin `idx`
    pub fn direction(&self, idx: usize) -> f64 {
        idx as f64 * self.phi_step()
    }

    /// Bin nearest to `direction`
    pub fn index_of(&self, direction: f64) -> usize {
        let pos = (wrap_angle(direction) / self.phi_step()).round() as usize;
        pos % self.phi_count()
    }

    pub fn best_speed(&self) -> &[f64] {
        &self.best_speed
    }

    pub fn best_obj(&self) -> &[f64] {
        &self.best_obj
    }

    pub(crate) fn best_obj_mut(&mut self) -> &mut [f64] {
        &mut self.best_obj
    }

    pub fn speed(&self, idx: usize) -> f64 {
        self.best_speed[idx % self.phi_count()]
    }

    pub fn objective(&self, idx: usize) -> f64 {
        self.best_obj[idx % self.phi_count()]
    }

    /// Bin index offset by `delta`, wrapping around the circle
    pub fn wrap_index(&self, idx: usize, delta: isize) -> usize {
        let n = self.phi_count() as isize;
        (((idx as isize + delta) % n + n) % n) as usize
    }

    /// (min, max) of the objective samples
    pub fn objective_limits(&self) -> (f64, f64) {
        self.best_obj
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    /// Best speed at an arbitrary direction, linear between bins
    pub fn interpolated_speed(&self, direction: f64) -> f64 {
        let pos = wrap_angle(direction) / self.phi_step();
        let idx = pos.floor() as usize % self.phi_count();
        let frac = pos - pos.floor();
        let next = self.wrap_index(idx, 1);
        self.best_speed[idx] + frac * (self.best_speed[next] - self.best_speed[idx])
    }

    /// Fill every bin by golden-section search over speed. Each bracket is
    /// seeded from the previous bin's best speed.
    pub fn build(&mut self, objective: &WindObjective<'_>, config: &RetrievalConfig) {
        let mut low = config.min_speed;
        let mut high = config.max_speed;
        for idx in 0..self.phi_count() {
            let direction = self.direction(idx);
            let (speed, obj) = find_best_speed(objective, direction, low, high, config);
            self.best_speed[idx] = speed;
            self.best_obj[idx] = obj;
            low = speed - BRACKET_HALF_WIDTH;
            high = speed + BRACKET_HALF_WIDTH;
        }
        log::trace!(
            "Built solution curve: {} bins, objective range {:?}",
            self.phi_count(),
            self.objective_limits()
        );
    }
}

/// Best speed at one direction within the bracket `[low, high]`.
/// Returns (speed, objective).
pub fn find_best_speed(
    objective: &WindObjective<'_>,
    direction: f64,
    low: f64,
    high: f64,
    config: &RetrievalConfig,
) -> (f64, f64) {
    golden_section_maximize(
        |speed| objective.score(speed, direction),
        low,
        high,
        config.min_speed,
        config.max_speed,
        config.speed_tolerance,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gmf::{GmfTable, TableAxis, TableGeometry};
    use crate::core::objective::ObjectiveSettings;
    use crate::core::variance::ConstantVariance;
    use crate::types::{MeasType, Measurement, MeasurementList, DTR};

    #[test]
    fn test_allocation_and_indexing() {
        let curve = SolutionCurve::new(8).unwrap();
        assert_eq!(curve.phi_count(), 8);
        assert_eq!(curve.wrap_index(0, -1), 7);
        assert_eq!(curve.wrap_index(7, 2), 1);
        assert_eq!(curve.index_of(-0.01), 0);
        assert!(SolutionCurve::new(0).is_err());
        assert!(SolutionCurve::from_samples(vec![1.0], vec![]).is_err());
    }

    #[test]
    fn test_interpolated_speed_wraps() {
        let curve = SolutionCurve::from_samples(vec![4.0, 6.0, 8.0, 10.0], vec![0.0; 4]).unwrap();
        assert!((curve.interpolated_speed(0.5 * curve.phi_step()) - 5.0).abs() < 1e-12);
        assert!((curve.interpolated_speed(3.5 * curve.phi_step()) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_build_tracks_true_speed() {
        let geometry = TableGeometry {
            incidence: TableAxis::new(2, 40.0 * DTR, 10.0 * DTR),
            speed: TableAxis::new(51, 0.0, 1.0),
            chi_count: 72,
        };
        let table = GmfTable::from_fn(geometry, &[MeasType::Vv], |_, _, spd, chi| spd * (2.0 + chi.cos())).unwrap();
        let meas: MeasurementList = [0.0, 90.0, 180.0, 270.0]
            .iter()
            .map(|&az| {
                let mut m = Measurement::new(MeasType::Vv, 0.0, 45.0 * DTR, az * DTR);
                m.value = 9.0 * (2.0 + m.chi(30.0 * DTR).cos());
                m
            })
            .collect();
        let kp = ConstantVariance(1.0);
        let settings = ObjectiveSettings::default();
        let objective = WindObjective::new(&table, &kp, &settings, &meas, None);
        let config = RetrievalConfig {
            phi_count: 36,
            ..RetrievalConfig::default()
        };

        let mut curve = SolutionCurve::new(config.phi_count).unwrap();
        curve.build(&objective, &config);
        let truth = curve.index_of(30.0 * DTR);
        assert!((curve.speed(truth) - 9.0).abs() <= 0.1);
        let (_, max) = curve.objective_limits();
        assert_eq!(curve.objective(truth), max);
    }
}
