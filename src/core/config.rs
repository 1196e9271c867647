//! Session-wide retrieval parameters

use crate::core::objective::ObjectiveSettings;
use crate::types::{WindError, WindResult, DTR, TWO_PI};
use serde::{Deserialize, Serialize};

/// Coarse-then-fine 2-D search parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InitSearchParams {
    /// Direction spacing of the coarse pass (radians)
    pub coarse_dir_step: f64,
    /// Speed step of the coarse line maximization (m/s)
    pub coarse_speed_step: f64,
    /// Direction step of the fine 9-point search (radians)
    pub fine_dir_step: f64,
    /// Speed step of the fine 9-point search (m/s)
    pub fine_speed_step: f64,
    /// Coarse maxima kept for refinement
    pub max_coarse_maxima: usize,
    /// Iteration cap for line maximization and the fine search
    pub max_iterations: usize,
    /// Starting speed for the first coarse direction (m/s)
    pub initial_speed: f64,
}

impl Default for InitSearchParams {
    fn default() -> Self {
        Self {
            coarse_dir_step: 5.0 * DTR,
            coarse_speed_step: 0.2,
            fine_dir_step: 1.0 * DTR,
            fine_speed_step: 0.1,
            max_coarse_maxima: 4,
            max_iterations: 500,
            initial_speed: 8.0,
        }
    }
}

/// Direction-range construction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionRangeParams {
    /// Cumulative probability the ranges must enclose
    pub probability_threshold: f64,
    /// Spline upsampling ratio of the probability curve (1 disables)
    pub upsample_ratio: usize,
}

impl Default for DirectionRangeParams {
    fn default() -> Self {
        Self {
            probability_threshold: 0.8,
            upsample_ratio: 4,
        }
    }
}

/// MSE-optimal ambiguity placement parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MsePlacementParams {
    /// Bisections applied to every search interval before the first trial
    pub initial_bisections: usize,
    /// A peak other than the best is deleted before placement when dropping
    /// it raises the estimated direction MSE by at most this fraction
    pub bad_peak_tolerance: f64,
}

impl Default for MsePlacementParams {
    fn default() -> Self {
        Self {
            initial_bisections: 2,
            bad_peak_tolerance: 0.02,
        }
    }
}

/// Outlier screening of co-polarized measurements
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CopolScreeningParams {
    /// Rejection threshold in robust standard deviations of the relative
    /// residual
    pub outlier_factor: f64,
    /// Floor on the robust standard deviation (relative units)
    pub min_relative_scale: f64,
    /// Most measurements removed from one cell
    pub max_removals: usize,
}

impl Default for CopolScreeningParams {
    fn default() -> Self {
        Self {
            outlier_factor: 3.0,
            min_relative_scale: 0.05,
            max_removals: 4,
        }
    }
}

/// How a peak edge is located once the walk away from the peak stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeakEdgePolicy {
    /// Edge at the last bin that passed the threshold test
    Truncate,
    /// Edge interpolated between the last passing and first failing bins,
    /// falling back to the last passing bin when the crossing would land
    /// outside that pair
    Interpolate,
}

/// Peak-splitting constants. Each strategy carries its own set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakSplitParams {
    /// Peak extent ends where the curve falls this fraction of the curve's
    /// (max - min) range below the peak
    pub threshold: f64,
    /// Peaks no wider than this (radians) get exactly one ambiguity
    pub one_peak_width: f64,
    /// Peaks whose extents come closer than this (radians) are merged
    pub merge_separation: f64,
    pub max_ambiguities: usize,
    pub edge_policy: PeakEdgePolicy,
    /// Place extra ambiguities by MSE minimization instead of evenly
    /// subdividing wide peaks
    pub mse_placement: bool,
}

impl PeakSplitParams {
    pub fn h1() -> Self {
        Self {
            threshold: 0.5,
            one_peak_width: 30.0 * DTR,
            merge_separation: 10.0 * DTR,
            max_ambiguities: 4,
            edge_policy: PeakEdgePolicy::Truncate,
            mse_placement: false,
        }
    }

    pub fn h2() -> Self {
        Self {
            threshold: 0.3,
            one_peak_width: 20.0 * DTR,
            merge_separation: 15.0 * DTR,
            max_ambiguities: 4,
            edge_policy: PeakEdgePolicy::Interpolate,
            mse_placement: false,
        }
    }

    pub fn h3() -> Self {
        Self {
            mse_placement: true,
            ..Self::h2()
        }
    }

    pub fn s1() -> Self {
        Self {
            threshold: 0.25,
            one_peak_width: 25.0 * DTR,
            merge_separation: 15.0 * DTR,
            max_ambiguities: 4,
            edge_policy: PeakEdgePolicy::Truncate,
            mse_placement: true,
        }
    }
}

/// Rain backscatter correction loop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RainCorrectionParams {
    /// Rain backscatter increment per iteration (linear sigma-0)
    pub step: f64,
    pub max_iterations: usize,
    /// Stop once the nudge probability falls below this fraction of the best
    pub degrade_ratio: f64,
}

impl Default for RainCorrectionParams {
    fn default() -> Self {
        Self {
            step: 0.001,
            max_iterations: 20,
            degrade_ratio: 0.9,
        }
    }
}

/// Retrieval session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of direction bins over [0, 2pi)
    pub phi_count: usize,
    /// Golden-section speed tolerance (m/s)
    pub speed_tolerance: f64,
    /// Minimum separation between smoothed solutions (radians)
    pub separation_angle: f64,
    /// Widest smoothing half-window (radians)
    pub smooth_angle: f64,
    /// Ambiguity cap
    pub max_solutions: usize,
    pub min_measurements: usize,
    /// Required spread of look azimuths (radians)
    pub min_azimuth_diversity: f64,
    pub use_retrieve_criteria: bool,
    /// Drop land-flagged measurements before retrieval
    pub exclude_land: bool,
    /// Screen outlying co-pol measurements before retrieval
    pub remove_bad_copol: bool,
    pub min_speed: f64,
    pub max_speed: f64,
    pub objective: ObjectiveSettings,
    pub init_search: InitSearchParams,
    pub direction_ranges: DirectionRangeParams,
    pub mse_placement: MsePlacementParams,
    pub h1: PeakSplitParams,
    pub h2: PeakSplitParams,
    pub h3: PeakSplitParams,
    pub s1: PeakSplitParams,
    pub rain: RainCorrectionParams,
    pub copol_screening: CopolScreeningParams,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            phi_count: 360,
            speed_tolerance: 0.1,
            separation_angle: 5.0 * DTR,
            smooth_angle: 10.0 * DTR,
            max_solutions: 4,
            min_measurements: 4,
            min_azimuth_diversity: 20.0 * DTR,
            use_retrieve_criteria: true,
            exclude_land: true,
            remove_bad_copol: false,
            min_speed: 0.0,
            max_speed: 50.0,
            objective: ObjectiveSettings::default(),
            init_search: InitSearchParams::default(),
            direction_ranges: DirectionRangeParams::default(),
            mse_placement: MsePlacementParams::default(),
            h1: PeakSplitParams::h1(),
            h2: PeakSplitParams::h2(),
            h3: PeakSplitParams::h3(),
            s1: PeakSplitParams::s1(),
            rain: RainCorrectionParams::default(),
            copol_screening: CopolScreeningParams::default(),
        }
    }
}

impl RetrievalConfig {
    /// Width of one direction bin
    pub fn phi_step(&self) -> f64 {
        TWO_PI / self.phi_count as f64
    }

    /// Check for impossible parameter values. Failures are fatal for the
    /// retrieval session.
    pub fn validate(&self) -> WindResult<()> {
        let fail = |msg: String| Err(WindError::InvalidConfig(msg));

        if self.phi_count < 3 {
            return fail(format!("phi_count must be at least 3, got {}", self.phi_count));
        }
        if !(self.speed_tolerance > 0.0) {
            return fail(format!("speed_tolerance must be positive, got {}", self.speed_tolerance));
        }
        if !(self.max_speed > self.min_speed) {
            return fail(format!(
                "speed bounds are empty: [{}, {}]",
                self.min_speed, self.max_speed
            ));
        }
        if self.max_solutions == 0 {
            return fail("max_solutions must be at least 1".to_string());
        }
        if self.separation_angle < 0.0 || self.smooth_angle < 0.0 {
            return fail("smoothing angles must be non-negative".to_string());
        }

        let search = &self.init_search;
        if !(search.coarse_dir_step > 0.0
            && search.coarse_speed_step > 0.0
            && search.fine_dir_step > 0.0
            && search.fine_speed_step > 0.0)
        {
            return fail("init search steps must be positive".to_string());
        }
        if search.max_iterations == 0 || search.max_coarse_maxima == 0 {
            return fail("init search limits must be at least 1".to_string());
        }

        let ranges = &self.direction_ranges;
        if !(ranges.probability_threshold > 0.0 && ranges.probability_threshold <= 1.0) {
            return fail(format!(
                "direction range threshold must be in (0, 1], got {}",
                ranges.probability_threshold
            ));
        }
        if ranges.upsample_ratio == 0 {
            return fail("upsample_ratio must be at least 1".to_string());
        }

        for (name, split) in [("h1", &self.h1), ("h2", &self.h2), ("h3", &self.h3), ("s1", &self.s1)] {
            if !(split.threshold > 0.0 && split.threshold <= 1.0) || split.max_ambiguities == 0 {
                return fail(format!("invalid {} peak-splitting parameters", name));
            }
        }

        if !(self.rain.step > 0.0) || !(self.rain.degrade_ratio > 0.0 && self.rain.degrade_ratio <= 1.0) {
            return fail("invalid rain correction parameters".to_string());
        }
        if !(self.mse_placement.bad_peak_tolerance >= 0.0) {
            return fail("bad_peak_tolerance must be non-negative".to_string());
        }
        let screening = &self.copol_screening;
        if !(screening.outlier_factor > 0.0 && screening.min_relative_scale > 0.0) {
            return fail("invalid co-pol screening parameters".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RetrievalConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.phi_step() - DTR).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = RetrievalConfig {
            max_speed: -1.0,
            ..RetrievalConfig::default()
        };
        assert!(matches!(config.validate(), Err(WindError::InvalidConfig(_))));

        let mut config = RetrievalConfig::default();
        config.direction_ranges.probability_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = RetrievalConfig::default();
        config.mse_placement.bad_peak_tolerance = -0.1;
        assert!(config.validate().is_err());

        let mut config = RetrievalConfig::default();
        config.copol_screening.outlier_factor = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_strategy_constants_stay_distinct() {
        let config = RetrievalConfig::default();
        assert_ne!(config.h1.threshold, config.h2.threshold);
        assert!(config.h3.mse_placement && !config.h2.mse_placement);
        assert_eq!(config.s1.edge_policy, PeakEdgePolicy::Truncate);
    }
}
