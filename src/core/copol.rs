//! Co-polarized measurement checks against the best-fit wind

use crate::core::config::RetrievalConfig;
use crate::core::gmf::GmfTable;
use crate::core::init_search::calculate_init_wind_solutions;
use crate::core::objective::WindObjective;
use crate::core::variance::VarianceModel;
use crate::types::{MeasType, MeasurementList, WindVectorPlus};

/// Median absolute deviation to standard deviation for Gaussian residuals
const MAD_TO_SIGMA: f64 = 1.4826;

/// Highest-objective solution of the coarse/fine search
fn best_solution(
    gmf: &GmfTable,
    kp: &dyn VarianceModel,
    config: &RetrievalConfig,
    measurements: &MeasurementList,
) -> Option<WindVectorPlus> {
    let objective = WindObjective::new(gmf, kp, &config.objective, measurements, None);
    calculate_init_wind_solutions(&objective, config)
        .into_iter()
        .max_by(|a, b| a.objective.total_cmp(&b.objective))
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

/// Remove co-pol measurements whose relative residual at the best-fit wind
/// is an outlier.
///
/// One measurement is removed per pass, the one furthest from the median
/// residual, and the wind is refit before the next pass. A pass removes
/// nothing once every residual lies within `outlier_factor` robust standard
/// deviations of the median. The list never shrinks below
/// `min_measurements`. Returns the number removed.
pub fn remove_bad_copol(
    gmf: &GmfTable,
    kp: &dyn VarianceModel,
    config: &RetrievalConfig,
    measurements: &mut MeasurementList,
) -> usize {
    let params = &config.copol_screening;
    let mut removed = 0;

    while removed < params.max_removals && measurements.len() > config.min_measurements {
        let Some(best) = best_solution(gmf, kp, config, measurements) else {
            break;
        };

        let residuals: Vec<(usize, f64)> = measurements
            .iter()
            .enumerate()
            .filter(|(_, meas)| meas.meas_type.is_copol() && meas.value.is_finite())
            .filter_map(|(idx, meas)| {
                let predicted =
                    gmf.interpolate(meas.meas_type, meas.incidence_angle, best.speed, meas.chi(best.direction))?;
                (predicted.abs() > f64::EPSILON).then(|| (idx, (meas.value - predicted) / predicted.abs()))
            })
            .collect();
        if residuals.len() < 3 {
            break;
        }

        let mut values: Vec<f64> = residuals.iter().map(|&(_, r)| r).collect();
        let center = median(&mut values);
        let mut deviations: Vec<f64> = values.iter().map(|r| (r - center).abs()).collect();
        let scale = (MAD_TO_SIGMA * median(&mut deviations)).max(params.min_relative_scale);

        let Some(&(worst, residual)) = residuals
            .iter()
            .max_by(|a, b| (a.1 - center).abs().total_cmp(&(b.1 - center).abs()))
        else {
            break;
        };
        if (residual - center).abs() <= params.outlier_factor * scale {
            break;
        }

        log::debug!(
            "removing outlying {} measurement: relative residual {:.3}, median {:.3}, scale {:.3}",
            measurements.as_slice()[worst].meas_type,
            residual,
            center,
            scale
        );
        let mut idx = 0;
        measurements.retain(|_| {
            let keep = idx != worst;
            idx += 1;
            keep
        });
        removed += 1;
    }
    removed
}

/// Additive HH bias: the mean HH residual (observed minus model) at the wind
/// retrieved from the VV measurements alone. `None` without HH measurements
/// or when the VV measurements cannot be retrieved.
pub fn hh_bias_using_vv(
    gmf: &GmfTable,
    kp: &dyn VarianceModel,
    config: &RetrievalConfig,
    measurements: &MeasurementList,
) -> Option<f64> {
    let vv: MeasurementList = measurements
        .iter()
        .filter(|meas| meas.meas_type == MeasType::Vv && meas.value.is_finite())
        .cloned()
        .collect();
    if vv.len() < config.min_measurements.max(1) {
        log::debug!("too few VV measurements for HH bias: {}", vv.len());
        return None;
    }
    let best = best_solution(gmf, kp, config, &vv)?;

    let differences: Vec<f64> = measurements
        .iter()
        .filter(|meas| meas.meas_type == MeasType::Hh && meas.value.is_finite())
        .filter_map(|meas| {
            gmf.interpolate(MeasType::Hh, meas.incidence_angle, best.speed, meas.chi(best.direction))
                .map(|predicted| meas.value - predicted)
        })
        .collect();
    if differences.is_empty() {
        return None;
    }
    let bias = differences.iter().sum::<f64>() / differences.len() as f64;
    log::debug!(
        "HH bias {:.4e} from {} HH measurements at {:.2} m/s",
        bias,
        differences.len(),
        best.speed
    );
    Some(bias)
}
