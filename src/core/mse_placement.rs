//! Placement of extra ambiguities minimizing the expected squared direction
//! error under the solution-curve probability.

use crate::core::angle_interval::{angle_difference, wrap_angle, AngleInterval, AngleIntervalList};
use crate::core::config::MsePlacementParams;
use crate::types::TWO_PI;
use std::f64::consts::PI;

/// Expected squared angular distance from each probability-weighted bin to
/// its nearest direction in `directions`. Bin `k` of `pdf` lies at
/// `k * 2pi / pdf.len()`. Infinite when `directions` is empty.
pub fn estimate_dir_mse(pdf: &[f64], directions: &[f64]) -> f64 {
    if directions.is_empty() {
        return f64::INFINITY;
    }
    let step = TWO_PI / pdf.len() as f64;
    pdf.iter()
        .enumerate()
        .map(|(k, &p)| {
            let bin_dir = k as f64 * step;
            let nearest = directions
                .iter()
                .map(|&d| angle_difference(bin_dir, d))
                .fold(PI, f64::min);
            p * nearest * nearest
        })
        .sum()
}

/// Search intervals between adjacent peaks, or the circle minus one bin on
/// either side for a single peak
fn peak_intervals(peaks: &[f64], step: f64) -> AngleIntervalList {
    let mut sorted: Vec<f64> = peaks.iter().map(|&p| wrap_angle(p)).collect();
    sorted.sort_by(f64::total_cmp);

    match sorted.len() {
        0 => [AngleInterval::new(0.0, PI), AngleInterval::new(PI, 0.0)]
            .into_iter()
            .collect(),
        1 => [AngleInterval::new(sorted[0] + step, sorted[0] - step)]
            .into_iter()
            .collect(),
        n => (0..n)
            .map(|i| AngleInterval::new(sorted[i], sorted[(i + 1) % n]))
            .collect(),
    }
}

/// Heuristic interval search for `slots` extra directions
fn interval_search(pdf: &[f64], peaks: &[f64], slots: usize, params: &MsePlacementParams) -> (Vec<f64>, f64) {
    let step = TWO_PI / pdf.len() as f64;
    let mut intervals = peak_intervals(peaks, step);
    for _ in 0..params.initial_bisections {
        intervals.bisect_all();
    }

    let mut best_dirs = Vec::new();
    let mut best_mse = f64::INFINITY;
    loop {
        let mut trial_best: Option<(Vec<usize>, Vec<f64>, f64)> = None;
        for placing in intervals.possible_placings(slots) {
            let dirs: Vec<f64> = intervals
                .iter()
                .zip(&placing)
                .flat_map(|(interval, &count)| interval.equally_spaced_angles(count))
                .collect();
            let all: Vec<f64> = peaks.iter().chain(&dirs).copied().collect();
            let mse = estimate_dir_mse(pdf, &all);
            if trial_best.as_ref().map_or(true, |(_, _, m)| mse < *m) {
                trial_best = Some((placing, dirs, mse));
            }
        }

        let Some((placing, dirs, mse)) = trial_best else {
            break;
        };
        if mse < best_mse {
            best_mse = mse;
            best_dirs = dirs;
        }

        intervals.retain_indexed(|idx| placing[idx] > 0);
        if intervals.is_empty() || intervals.max_width() < step / 2.0 {
            break;
        }
        intervals.bisect_all();
    }
    (best_dirs, best_mse)
}

/// Directions for `slots` additional ambiguities given the existing peak
/// directions, with the resulting estimated direction MSE.
///
/// The interval search is compared against extending the `slots - 1`
/// answer by the best single bin, so adding a slot never raises the MSE.
pub fn get_min_estimate_mse(
    pdf: &[f64],
    peaks: &[f64],
    slots: usize,
    params: &MsePlacementParams,
) -> (Vec<f64>, f64) {
    if pdf.is_empty() {
        return (Vec::new(), f64::INFINITY);
    }

    let step = TWO_PI / pdf.len() as f64;
    let mut dirs: Vec<f64> = Vec::new();
    let mut mse = estimate_dir_mse(pdf, peaks);

    for count in 1..=slots {
        // best single extra bin on top of the previous answer
        let mut extended = dirs.clone();
        let mut extended_mse = f64::INFINITY;
        let mut best_bin = 0.0;
        let mut trial: Vec<f64> = peaks.iter().chain(&dirs).copied().collect();
        trial.push(0.0);
        let last = trial.len() - 1;
        for k in 0..pdf.len() {
            trial[last] = k as f64 * step;
            let m = estimate_dir_mse(pdf, &trial);
            if m < extended_mse {
                extended_mse = m;
                best_bin = trial[last];
            }
        }
        extended.push(best_bin);

        let (searched, searched_mse) = interval_search(pdf, peaks, count, params);
        if searched.len() == count && searched_mse <= extended_mse {
            dirs = searched;
            mse = searched_mse;
        } else {
            dirs = extended;
            mse = extended_mse;
        }
    }
    (dirs, mse)
}

/// Indices of the peaks worth keeping.
///
/// Peaks other than the first are dropped greedily, cheapest first, while
/// dropping one raises the estimated direction MSE by at most `tolerance`
/// times its current value. Kept indices are returned in input order.
pub fn delete_bad_peaks(pdf: &[f64], peaks: &[f64], tolerance: f64) -> Vec<usize> {
    let mut kept: Vec<usize> = (0..peaks.len()).collect();
    if pdf.is_empty() {
        return kept;
    }
    let directions = |indices: &[usize]| -> Vec<f64> { indices.iter().map(|&i| peaks[i]).collect() };
    let mut mse = estimate_dir_mse(pdf, &directions(&kept));

    while kept.len() > 1 {
        let mut cheapest: Option<(usize, f64)> = None;
        for pos in 1..kept.len() {
            let mut trial = kept.clone();
            trial.remove(pos);
            let trial_mse = estimate_dir_mse(pdf, &directions(&trial));
            // ties drop the later peak
            if cheapest.map_or(true, |(_, m)| trial_mse <= m) {
                cheapest = Some((pos, trial_mse));
            }
        }
        match cheapest {
            Some((pos, trial_mse)) if trial_mse - mse <= tolerance * mse => {
                log::trace!("dropping peak {} ({:.6} -> {:.6})", kept[pos], mse, trial_mse);
                kept.remove(pos);
                mse = trial_mse;
            }
            _ => break,
        }
    }
    kept
}

/// Exhaustive placement over every combination of bins.
///
/// Cost grows as `phi_count^slots`; intended as a test oracle for small
/// curves, not for production retrievals.
pub fn brute_force_get_min_estimate_mse(pdf: &[f64], peaks: &[f64], slots: usize) -> (Vec<f64>, f64) {
    let step = TWO_PI / pdf.len() as f64;
    let mut current: Vec<f64> = peaks.to_vec();
    let mut best = (Vec::new(), estimate_dir_mse(pdf, peaks));
    if slots == 0 || pdf.is_empty() {
        return best;
    }
    best.1 = f64::INFINITY;
    enumerate_bins(pdf, step, peaks.len(), slots, 0, &mut current, &mut best);
    best
}

fn enumerate_bins(
    pdf: &[f64],
    step: f64,
    fixed: usize,
    slots_left: usize,
    first_bin: usize,
    current: &mut Vec<f64>,
    best: &mut (Vec<f64>, f64),
) {
    if slots_left == 0 {
        let mse = estimate_dir_mse(pdf, current);
        if mse < best.1 {
            *best = (current[fixed..].to_vec(), mse);
        }
        return;
    }
    for bin in first_bin..pdf.len() {
        current.push(bin as f64 * step);
        enumerate_bins(pdf, step, fixed, slots_left - 1, bin, current, best);
        current.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DTR;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_estimate_dir_mse() {
        let pdf = vec![0.25; 4];
        // bins at 0, 90, 180, 270 degrees, one direction at 0
        let expected = 0.25 * ((PI / 2.0).powi(2) * 2.0 + PI * PI);
        assert_abs_diff_eq!(estimate_dir_mse(&pdf, &[0.0]), expected, epsilon = 1e-12);
        assert_abs_diff_eq!(estimate_dir_mse(&pdf, &[0.0, PI / 2.0, PI, 1.5 * PI]), 0.0, epsilon = 1e-12);
        assert!(estimate_dir_mse(&pdf, &[]).is_infinite());
    }

    #[test]
    fn test_single_peak_interval_skips_neighbors() {
        let intervals = peak_intervals(&[10.0 * DTR], DTR);
        assert_eq!(intervals.len(), 1);
        assert_abs_diff_eq!(intervals.get(0).unwrap().width(), 358.0 * DTR, epsilon = 1e-9);
    }

    #[test]
    fn test_fills_uncovered_mass() {
        let mut pdf = vec![0.0; 36];
        pdf[0] = 0.5;
        pdf[18] = 0.5;
        let (dirs, mse) = get_min_estimate_mse(&pdf, &[0.0], 1, &MsePlacementParams::default());
        assert_eq!(dirs.len(), 1);
        assert!(angle_difference(dirs[0], PI) < 10.0 * DTR);
        assert!(mse < 0.5 * PI * PI);
    }

    #[test]
    fn test_zero_slots_keep_peaks() {
        let pdf = vec![1.0 / 8.0; 8];
        let (dirs, mse) = get_min_estimate_mse(&pdf, &[0.0], 0, &MsePlacementParams::default());
        assert!(dirs.is_empty());
        assert_abs_diff_eq!(mse, estimate_dir_mse(&pdf, &[0.0]), epsilon = 1e-12);
    }

    #[test]
    fn test_delete_bad_peaks_drops_near_duplicates() {
        let pdf = vec![1.0 / 360.0; 360];
        assert_eq!(delete_bad_peaks(&pdf, &[DTR, PI, 0.0], 0.02), vec![0, 1]);
        assert_eq!(delete_bad_peaks(&pdf, &[0.0, PI, PI], 0.0), vec![0, 1]);
        assert_eq!(delete_bad_peaks(&pdf, &[0.0, PI], 0.02), vec![0, 1]);
    }

    #[test]
    fn test_delete_bad_peaks_keeps_first() {
        let mut pdf = vec![0.0; 36];
        pdf[18] = 1.0;
        // the first peak carries no mass but is never dropped
        assert_eq!(delete_bad_peaks(&pdf, &[0.0, PI], 0.02), vec![0, 1]);
        assert_eq!(delete_bad_peaks(&pdf, &[0.0, PI, PI + 0.5 * DTR], 0.02), vec![0, 1]);
        assert_eq!(delete_bad_peaks(&pdf, &[0.0], 0.02), vec![0]);
    }
}
