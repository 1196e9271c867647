//! Objective functions scored against the GMF. Higher is better.

use crate::core::angle_interval::angle_difference;
use crate::core::gmf::GmfTable;
use crate::core::variance::VarianceModel;
use crate::types::{Look, Measurement, MeasurementList, DTR};
use serde::{Deserialize, Serialize};

/// Fallback variance for measurement buckets without a usable sample variance
const BUCKET_FALLBACK_VARIANCE: f64 = 0.1;

/// Angular scale of the direction prior penalty
const PRIOR_PENALTY_SCALE: f64 = 20.0 * DTR;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveFunction {
    /// Variance-weighted least squares
    WeightedLeastSquares,
    /// Weighted least squares plus a log-variance term
    LogVariance,
    /// Variance estimated from the spread of the measurements themselves
    MeasurementVariance,
    /// X-factor weighted least squares with a penalty on deviation from a
    /// prior direction
    DirectionPrior,
}

/// Diagnostic output level of objective evaluations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verbosity {
    Quiet,
    /// Log every residual and variance term at trace level
    Detailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveSettings {
    pub function: ObjectiveFunction,
    /// Weight of C-band measurements relative to Ku-band
    pub c_band_weight: f64,
    /// When set, scores are rescaled by `scale / measurement_count`
    pub rescale: Option<f64>,
    pub verbosity: Verbosity,
}

impl Default for ObjectiveSettings {
    fn default() -> Self {
        Self {
            function: ObjectiveFunction::WeightedLeastSquares,
            c_band_weight: 1.0,
            rescale: None,
            verbosity: Verbosity::Quiet,
        }
    }
}

/// Objective bound to one measurement list, ready for repeated evaluation
/// over (speed, direction).
pub struct WindObjective<'a> {
    gmf: &'a GmfTable,
    kp: &'a dyn VarianceModel,
    settings: &'a ObjectiveSettings,
    measurements: &'a MeasurementList,
    prior_direction: Option<f64>,
    /// Per-bucket variances, only for `MeasurementVariance`
    bucket_variance: [f64; 8],
}

impl<'a> WindObjective<'a> {
    pub fn new(
        gmf: &'a GmfTable,
        kp: &'a dyn VarianceModel,
        settings: &'a ObjectiveSettings,
        measurements: &'a MeasurementList,
        prior_direction: Option<f64>,
    ) -> Self {
        let bucket_variance = match settings.function {
            ObjectiveFunction::MeasurementVariance => bucket_variances(measurements),
            _ => [BUCKET_FALLBACK_VARIANCE; 8],
        };
        Self {
            gmf,
            kp,
            settings,
            measurements,
            prior_direction,
            bucket_variance,
        }
    }

    /// Objective value at one wind vector
    pub fn score(&self, speed: f64, direction: f64) -> f64 {
        let detailed = self.settings.verbosity == Verbosity::Detailed;

        let (weights, weight_norm) = match self.settings.function {
            ObjectiveFunction::DirectionPrior => self.x_factor_weights(),
            _ => (None, 1.0),
        };

        let mut sum = 0.0;
        let mut count = 0usize;
        for (idx, meas) in self.measurements.iter().enumerate() {
            if !meas.value.is_finite() {
                continue;
            }
            let Some(predicted) = self.gmf.interpolate(
                meas.meas_type,
                meas.incidence_angle,
                speed,
                meas.chi(direction),
            ) else {
                continue;
            };

            let mut weight = self.band_weight(meas);
            if let Some(weights) = &weights {
                weight *= weights[idx] * weight_norm;
            }

            let residual = predicted - meas.value;
            let variance = match self.settings.function {
                ObjectiveFunction::MeasurementVariance => self.bucket_variance[bucket_index(meas)],
                _ => self.kp.variance(meas, speed, predicted),
            };

            let mut term = if variance > 0.0 {
                weight * residual * residual / variance
            } else {
                weight * residual * residual
            };
            if self.settings.function == ObjectiveFunction::LogVariance && variance > 0.0 {
                term += weight * variance.ln();
            }

            if detailed {
                log::trace!(
                    "{} meas: obs {:.6e} pred {:.6e} var {:.6e} w {:.3} term {:.6e}",
                    meas.meas_type,
                    meas.value,
                    predicted,
                    variance,
                    weight,
                    term
                );
            }
            sum += term;
            count += 1;
        }

        let mut score = -sum;
        if self.settings.function == ObjectiveFunction::DirectionPrior {
            if let Some(prior) = self.prior_direction {
                let deviation = angle_difference(direction, prior) / PRIOR_PENALTY_SCALE;
                score -= count as f64 * deviation * deviation;
            }
        }
        if let Some(scale) = self.settings.rescale {
            if count > 0 {
                score *= scale / count as f64;
            }
        }

        if detailed {
            log::trace!(
                "objective({:.3} m/s, {:.2} deg) = {:.6e} over {} measurements",
                speed,
                direction / DTR,
                score,
                count
            );
        }
        score
    }

    fn band_weight(&self, meas: &Measurement) -> f64 {
        if meas.meas_type.is_c_band() {
            self.settings.c_band_weight
        } else {
            1.0
        }
    }

    /// X-factor weights with their normalization `n / sum(w)`. A zero weight
    /// sum falls back to uniform weights.
    fn x_factor_weights(&self) -> (Option<Vec<f64>>, f64) {
        let weights: Vec<f64> = self
            .measurements
            .iter()
            .map(|meas| {
                if meas.x_factor > 0.0 {
                    1.0 / (1.0 + 1.0 / meas.x_factor)
                } else {
                    0.0
                }
            })
            .collect();
        let total: f64 = weights.iter().sum();
        if !(total > 0.0) {
            return (None, 1.0);
        }
        let norm = weights.len() as f64 / total;
        (Some(weights), norm)
    }
}

/// Look bucket: polarization x fore/aft x band
fn bucket_index(meas: &Measurement) -> usize {
    let mut idx = 0;
    if meas.meas_type.is_vertical() {
        idx |= 1;
    }
    if meas.look == Look::Aft {
        idx |= 2;
    }
    if meas.meas_type.is_c_band() {
        idx |= 4;
    }
    idx
}

fn bucket_variances(measurements: &MeasurementList) -> [f64; 8] {
    let mut count = [0usize; 8];
    let mut sum = [0.0; 8];
    let mut sum_sq = [0.0; 8];
    for meas in measurements.iter().filter(|m| m.value.is_finite()) {
        let idx = bucket_index(meas);
        count[idx] += 1;
        sum[idx] += meas.value;
        sum_sq[idx] += meas.value * meas.value;
    }

    let mut variance = [BUCKET_FALLBACK_VARIANCE; 8];
    for idx in 0..8 {
        if count[idx] < 2 {
            continue;
        }
        let n = count[idx] as f64;
        let mean = sum[idx] / n;
        let var = (sum_sq[idx] - n * mean * mean) / (n - 1.0);
        if var > 0.0 {
            variance[idx] = var;
        }
    }
    variance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gmf::{TableAxis, TableGeometry};
    use crate::core::variance::ConstantVariance;
    use crate::types::MeasType;

    fn cosine_table() -> GmfTable {
        let geometry = TableGeometry {
            incidence: TableAxis::new(3, 40.0 * DTR, 5.0 * DTR),
            speed: TableAxis::new(31, 0.0, 1.0),
            chi_count: 360,
        };
        GmfTable::from_fn(geometry, &[MeasType::Vv, MeasType::CBandVv], |_, _, spd, chi| {
            spd * (2.0 + chi.cos())
        })
        .unwrap()
    }

    fn truth_measurements(table: &GmfTable, speed: f64, direction: f64) -> MeasurementList {
        [0.0, 90.0, 180.0, 270.0]
            .iter()
            .map(|&az| {
                let mut meas = Measurement::new(MeasType::Vv, 0.0, 45.0 * DTR, az * DTR);
                meas.value = table
                    .interpolate(MeasType::Vv, meas.incidence_angle, speed, meas.chi(direction))
                    .unwrap();
                meas
            })
            .collect()
    }

    #[test]
    fn test_perfect_fit_scores_zero() {
        let table = cosine_table();
        let kp = ConstantVariance(1.0);
        let settings = ObjectiveSettings::default();
        let meas = truth_measurements(&table, 10.0, 45.0 * DTR);
        let objective = WindObjective::new(&table, &kp, &settings, &meas, None);
        assert!(objective.score(10.0, 45.0 * DTR).abs() < 1e-9);
        assert!(objective.score(12.0, 45.0 * DTR) < -1e-3);
    }

    #[test]
    fn test_log_variance_adds_log_term() {
        let table = cosine_table();
        let kp = ConstantVariance(0.5);
        let meas = truth_measurements(&table, 10.0, 45.0 * DTR);
        let wls = ObjectiveSettings::default();
        let log_var = ObjectiveSettings {
            function: ObjectiveFunction::LogVariance,
            ..ObjectiveSettings::default()
        };

        for (speed, direction) in [(10.0, 45.0 * DTR), (7.0, 1.0), (13.5, 4.0)] {
            let plain = WindObjective::new(&table, &kp, &wls, &meas, None).score(speed, direction);
            let logged = WindObjective::new(&table, &kp, &log_var, &meas, None).score(speed, direction);
            assert!((logged - plain + 4.0 * 0.5f64.ln()).abs() < 1e-9);
        }

        // the log term shifts every trial equally, so the maximum stays put
        let objective = WindObjective::new(&table, &kp, &log_var, &meas, None);
        assert!(objective.score(10.0, 45.0 * DTR) > objective.score(12.0, 45.0 * DTR));
    }

    #[test]
    fn test_order_invariance_and_non_finite_skip() {
        let table = cosine_table();
        let kp = ConstantVariance(0.5);
        let settings = ObjectiveSettings::default();
        let meas = truth_measurements(&table, 10.0, 45.0 * DTR);

        let mut reversed: MeasurementList = meas.iter().rev().cloned().collect();
        let forward = WindObjective::new(&table, &kp, &settings, &meas, None).score(7.0, 1.0);
        let backward = WindObjective::new(&table, &kp, &settings, &reversed, None).score(7.0, 1.0);
        assert!((forward - backward).abs() < 1e-9);

        reversed.push(Measurement::new(MeasType::Vv, f64::NAN, 45.0 * DTR, 0.3));
        let with_nan = WindObjective::new(&table, &kp, &settings, &reversed, None).score(7.0, 1.0);
        assert!(with_nan.is_finite());
        assert!((with_nan - forward).abs() < 1e-9);
    }

    #[test]
    fn test_zero_variance_falls_back_to_unweighted() {
        let table = cosine_table();
        let settings = ObjectiveSettings::default();
        let meas = truth_measurements(&table, 10.0, 45.0 * DTR);
        let unweighted = WindObjective::new(&table, &ConstantVariance(0.0), &settings, &meas, None).score(8.0, 1.0);
        let unit = WindObjective::new(&table, &ConstantVariance(1.0), &settings, &meas, None).score(8.0, 1.0);
        assert!(unweighted.is_finite());
        assert!((unweighted - unit).abs() < 1e-9);
    }

    #[test]
    fn test_c_band_weight_and_rescale() {
        let table = cosine_table();
        let kp = ConstantVariance(1.0);
        let mut meas = MeasurementList::new();
        meas.push(Measurement::new(MeasType::CBandVv, 1.0, 45.0 * DTR, 0.0));

        let settings = ObjectiveSettings::default();
        let base = WindObjective::new(&table, &kp, &settings, &meas, None).score(5.0, 0.0);

        let weighted = ObjectiveSettings {
            c_band_weight: 0.5,
            ..ObjectiveSettings::default()
        };
        let half = WindObjective::new(&table, &kp, &weighted, &meas, None).score(5.0, 0.0);
        assert!((half - 0.5 * base).abs() < 1e-9);

        let rescaled = ObjectiveSettings {
            rescale: Some(3.0),
            ..ObjectiveSettings::default()
        };
        let scaled = WindObjective::new(&table, &kp, &rescaled, &meas, None).score(5.0, 0.0);
        assert!((scaled - 3.0 * base).abs() < 1e-9);
    }

    #[test]
    fn test_direction_prior_penalty() {
        let table = cosine_table();
        let kp = ConstantVariance(1.0);
        let settings = ObjectiveSettings {
            function: ObjectiveFunction::DirectionPrior,
            ..ObjectiveSettings::default()
        };
        let meas = truth_measurements(&table, 10.0, 45.0 * DTR);
        let objective = WindObjective::new(&table, &kp, &settings, &meas, Some(65.0 * DTR));
        // exact fit, 20 degrees off the prior: penalty of one per measurement
        assert!((objective.score(10.0, 45.0 * DTR) + 4.0).abs() < 1e-9);
        assert!(objective.score(10.0, 65.0 * DTR) < 0.0);
    }

    #[test]
    fn test_measurement_variance_buckets() {
        let mut meas = MeasurementList::new();
        meas.push(Measurement::new(MeasType::Vv, 1.0, 0.8, 0.0));
        meas.push(Measurement::new(MeasType::Vv, 3.0, 0.8, 1.0));
        let mut aft = Measurement::new(MeasType::Hh, 2.0, 0.8, 2.0);
        aft.look = Look::Aft;
        meas.push(aft);

        let variances = bucket_variances(&meas);
        assert!((variances[1] - 2.0).abs() < 1e-12);
        assert_eq!(variances[2], BUCKET_FALLBACK_VARIANCE);
        assert_eq!(variances[0], BUCKET_FALLBACK_VARIANCE);
    }
}
