//! Direction uncertainty ranges grown from the solution-curve probability

use crate::core::angle_interval::{wrap_angle, AngleInterval};
use crate::core::config::DirectionRangeParams;
use crate::core::solution_curve::SolutionCurve;
use crate::core::spline::CubicSpline;
use crate::types::{WindVectorPlus, TWO_PI};
use serde::{Deserialize, Serialize};

/// Replicated samples on each side of the circular curve before spline fitting
const WRAP_POINTS: usize = 4;

/// Contiguous block of direction bins assigned to one ambiguity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionRange {
    /// From the first to the last bin direction of the range
    pub interval: AngleInterval,
    /// Probability of each bin, left to right
    pub pdf: Vec<f64>,
    /// Best speed of each bin
    pub best_speed: Vec<f64>,
    pub bin_step: f64,
}

impl DirectionRange {
    pub fn probability(&self) -> f64 {
        self.pdf.iter().sum()
    }

    pub fn bin_count(&self) -> usize {
        self.pdf.len()
    }

    pub fn direction(&self, bin: usize) -> f64 {
        wrap_angle(self.interval.left + bin as f64 * self.bin_step)
    }
}

/// Unnormalized likelihood `exp((obj - max) / 2)` of each sample.
/// Non-finite samples carry no weight.
fn likelihood_weights(objectives: &[f64]) -> Vec<f64> {
    let max = objectives
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    objectives
        .iter()
        .map(|&v| {
            if v.is_finite() && max.is_finite() {
                ((v - max) / 2.0).exp()
            } else {
                0.0
            }
        })
        .collect()
}

/// Scale to unit sum; an all-zero input becomes uniform
fn normalize(weights: &mut [f64]) {
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        weights.iter_mut().for_each(|w| *w /= total);
    } else if !weights.is_empty() {
        let uniform = 1.0 / weights.len() as f64;
        weights.iter_mut().for_each(|w| *w = uniform);
    }
}

/// Probability mass function of the solution-curve objective
pub fn objective_to_pdf(objectives: &[f64]) -> Vec<f64> {
    let mut pdf = likelihood_weights(objectives);
    normalize(&mut pdf);
    pdf
}

/// Probability mass function of the curve upsampled `ratio` times with a
/// wrapped cubic spline. Each interpolated value is held within
/// [0.5 min, 2 max] of its two bracketing samples.
pub fn upsampled_pdf(curve: &SolutionCurve, ratio: usize) -> Vec<f64> {
    let weights = likelihood_weights(curve.best_obj());
    if ratio <= 1 {
        let mut pdf = weights;
        normalize(&mut pdf);
        return pdf;
    }

    let n = weights.len();
    let pad = WRAP_POINTS as isize;
    let (xs, ys): (Vec<f64>, Vec<f64>) = (-pad..n as isize + pad)
        .map(|k| (k as f64, weights[curve.wrap_index(0, k)]))
        .unzip();
    let spline = CubicSpline::new(xs, ys);

    let mut fine: Vec<f64> = (0..n * ratio)
        .map(|j| {
            let x = j as f64 / ratio as f64;
            let lo = j / ratio;
            let a = weights[lo];
            let b = weights[curve.wrap_index(lo, 1)];
            spline.eval(x).clamp(0.5 * a.min(b), 2.0 * a.max(b))
        })
        .collect();
    normalize(&mut fine);
    fine
}

/// Grow one range per ambiguity, always claiming the most probable
/// unclaimed bin adjacent to any range, until the enclosed probability
/// exceeds the threshold. Ranges come back in ambiguity order.
pub fn build_direction_ranges(
    curve: &SolutionCurve,
    ambiguities: &[WindVectorPlus],
    params: &DirectionRangeParams,
) -> Vec<DirectionRange> {
    if ambiguities.is_empty() {
        return Vec::new();
    }

    let ratio = params.upsample_ratio.max(1);
    let pdf = upsampled_pdf(curve, ratio);
    let m = pdf.len();
    let fine_step = TWO_PI / m as f64;
    let wrap = |idx: isize| -> usize { idx.rem_euclid(m as isize) as usize };

    let mut claimed = vec![false; m];
    let mut mass = 0.0;
    // unwrapped (left, right) fine-bin indices, inclusive
    let mut spans: Vec<(isize, isize)> = Vec::with_capacity(ambiguities.len());
    for wvp in ambiguities {
        let start = (wrap_angle(wvp.direction) / fine_step).round() as isize;
        let bin = wrap(start);
        if !claimed[bin] {
            claimed[bin] = true;
            mass += pdf[bin];
        }
        spans.push((start, start));
    }

    while mass <= params.probability_threshold {
        let mut best: Option<(usize, bool, f64)> = None;
        for (idx, &(left, right)) in spans.iter().enumerate() {
            for (grow_left, candidate) in [(true, left - 1), (false, right + 1)] {
                let bin = wrap(candidate);
                if claimed[bin] {
                    continue;
                }
                if best.map_or(true, |(_, _, p)| pdf[bin] > p) {
                    best = Some((idx, grow_left, pdf[bin]));
                }
            }
        }

        let Some((idx, grow_left, _)) = best else {
            log::warn!(
                "direction ranges incomplete: {:.3} of {:.3} probability enclosed",
                mass,
                params.probability_threshold
            );
            break;
        };
        let span = &mut spans[idx];
        let bin = if grow_left {
            span.0 -= 1;
            wrap(span.0)
        } else {
            span.1 += 1;
            wrap(span.1)
        };
        claimed[bin] = true;
        mass += pdf[bin];
    }

    spans
        .into_iter()
        .map(|(left, right)| {
            let bins: Vec<usize> = (left..=right).map(wrap).collect();
            DirectionRange {
                interval: AngleInterval::new(left as f64 * fine_step, right as f64 * fine_step),
                pdf: bins.iter().map(|&b| pdf[b]).collect(),
                best_speed: bins
                    .iter()
                    .map(|&b| curve.interpolated_speed(b as f64 * fine_step))
                    .collect(),
                bin_step: fine_step,
            }
        })
        .collect()
}
