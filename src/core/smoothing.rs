use crate::core::solution_curve::SolutionCurve;

/// Circular moving-sum smoothing of the solution curve objective.
///
/// The window half-width grows from zero until every 3-point local maximum
/// also dominates its `separation_angle` neighborhood and there are at most
/// `max_solutions` of them. The accepted sum is divided by the window size.
/// Returns false, leaving the curve untouched, when no window up to
/// `smooth_angle` converges.
pub fn smooth(
    curve: &mut SolutionCurve,
    separation_angle: f64,
    smooth_angle: f64,
    max_solutions: usize,
) -> bool {
    let n = curve.phi_count();
    let step = curve.phi_step();
    let separation_bins = (separation_angle / step).round() as usize;
    let max_delta = ((smooth_angle / step).round() as usize).min(n / 2);
    let original = curve.best_obj().to_vec();

    for delta in 0..=max_delta {
        let summed: Vec<f64> = if delta == 0 {
            original.clone()
        } else {
            (0..n)
                .map(|i| {
                    (-(delta as isize)..=delta as isize)
                        .map(|k| original[curve.wrap_index(i, k)])
                        .sum()
                })
                .collect()
        };

        let (local, wide) = count_maxima(curve, &summed, separation_bins);
        if local == wide && local <= max_solutions {
            if delta > 0 {
                let norm = (1 + 2 * delta) as f64;
                for (dst, src) in curve.best_obj_mut().iter_mut().zip(summed.iter()) {
                    *dst = src / norm;
                }
            }
            log::trace!("smoothing converged at half-width {} with {} maxima", delta, local);
            return true;
        }
    }
    false
}

/// Counts of 3-point local maxima and of maxima dominating +/- `separation_bins`
fn count_maxima(curve: &SolutionCurve, values: &[f64], separation_bins: usize) -> (usize, usize) {
    let mut local = 0;
    let mut wide = 0;
    for i in 0..values.len() {
        let v = values[i];
        if !(v > values[curve.wrap_index(i, -1)] && v >= values[curve.wrap_index(i, 1)]) {
            continue;
        }
        local += 1;
        let sep = separation_bins as isize;
        if (-sep..=sep).all(|k| v >= values[curve.wrap_index(i, k)]) {
            wide += 1;
        }
    }
    (local, wide)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DTR, TWO_PI};

    fn curve_from(f: impl Fn(f64) -> f64) -> SolutionCurve {
        let n = 360;
        let obj: Vec<f64> = (0..n).map(|i| f(i as f64 * TWO_PI / n as f64)).collect();
        SolutionCurve::from_samples(vec![8.0; n], obj).unwrap()
    }

    #[test]
    fn test_separated_peaks_converge_immediately() {
        let mut curve = curve_from(|phi| (2.0 * phi).cos() - 1.0);
        let before = curve.best_obj().to_vec();
        assert!(smooth(&mut curve, 5.0 * DTR, 10.0 * DTR, 4));
        assert_eq!(curve.best_obj(), before.as_slice());
    }

    #[test]
    fn test_ripple_is_smoothed_out() {
        let mut curve = curve_from(|phi| (2.0 * phi).cos() + 0.3 * (40.0 * phi).cos());
        assert!(smooth(&mut curve, 5.0 * DTR, 10.0 * DTR, 4));
        let (local, wide) = count_maxima(&curve, curve.best_obj(), 5);
        assert_eq!(local, wide);
        assert!(local <= 4);
    }

    #[test]
    fn test_too_many_peaks_fail() {
        let mut curve = curve_from(|phi| (10.0 * phi).cos());
        let before = curve.best_obj().to_vec();
        assert!(!smooth(&mut curve, 5.0 * DTR, 10.0 * DTR, 4));
        assert_eq!(curve.best_obj(), before.as_slice());
    }
}
