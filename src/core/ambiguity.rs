//! Ambiguity selection from a solution curve

use crate::core::angle_interval::wrap_angle;
use crate::core::config::{PeakEdgePolicy, PeakSplitParams, RetrievalConfig};
use crate::core::direction_range::objective_to_pdf;
use crate::core::init_search::fine_search;
use crate::core::mse_placement::get_min_estimate_mse;
use crate::core::objective::WindObjective;
use crate::core::solution_curve::{find_best_speed, SolutionCurve};
use crate::types::{WindVectorPlus, Wvc};

/// Half width of the speed bracket around the curve speed when optimizing a
/// split direction
const SPLIT_SPEED_BRACKET: f64 = 2.0;

fn is_local_max(curve: &SolutionCurve, idx: usize) -> bool {
    let v = curve.objective(idx);
    v > curve.objective(curve.wrap_index(idx, -1)) && v >= curve.objective(curve.wrap_index(idx, 1))
}

/// One ambiguity per 3-point local maximum, straight from the curve
pub fn find_maxima(curve: &SolutionCurve) -> Vec<WindVectorPlus> {
    (0..curve.phi_count())
        .filter(|&idx| is_local_max(curve, idx))
        .map(|idx| WindVectorPlus::new(curve.speed(idx), curve.direction(idx), curve.objective(idx)))
        .collect()
}

/// One ambiguity per direction bin with the bin probability as objective
pub fn find_many(curve: &SolutionCurve) -> Vec<WindVectorPlus> {
    objective_to_pdf(curve.best_obj())
        .into_iter()
        .enumerate()
        .map(|(idx, p)| WindVectorPlus::new(curve.speed(idx), curve.direction(idx), p))
        .collect()
}

/// Sort by objective, highest first, then drop the lowest until at most
/// `max_solutions` remain. Returns the number dropped.
pub fn sort_and_cap(wvc: &mut Wvc, max_solutions: usize) -> usize {
    wvc.sort_by_objective();
    wvc.cap_ambiguities(max_solutions)
}

/// Angular extent of one peak in unwrapped bin coordinates
#[derive(Debug, Clone, Copy)]
struct PeakExtent {
    peak: usize,
    start: f64,
    end: f64,
}

impl PeakExtent {
    fn width_bins(&self) -> f64 {
        self.end - self.start
    }
}

/// Distance in bins from `peak` to its edge walking in direction `sign`
fn walk_edge(curve: &SolutionCurve, peak: usize, sign: isize, drop: f64, policy: PeakEdgePolicy) -> f64 {
    let top = curve.objective(peak);
    let target = top - drop;
    let limit = (curve.phi_count() / 2) as isize;

    let mut last = top;
    for k in 1..limit {
        let value = curve.objective(curve.wrap_index(peak, sign * k));
        let passed = (k - 1) as f64;
        if value > top {
            return passed;
        }
        if value < target {
            return match policy {
                PeakEdgePolicy::Truncate => passed,
                PeakEdgePolicy::Interpolate => {
                    let frac = (last - target) / (last - value);
                    if (0.0..=1.0).contains(&frac) {
                        passed + frac
                    } else {
                        passed
                    }
                }
            };
        }
        last = value;
    }
    (limit - 1).max(0) as f64
}

/// Peak extents, merged when closer than the merge separation
fn peak_extents(curve: &SolutionCurve, params: &PeakSplitParams) -> Vec<PeakExtent> {
    let (min, max) = curve.objective_limits();
    let range = max - min;
    if !(range > 0.0) {
        return Vec::new();
    }
    let drop = params.threshold * range;
    let n = curve.phi_count() as f64;
    let merge_bins = params.merge_separation / curve.phi_step();

    let mut extents: Vec<PeakExtent> = (0..curve.phi_count())
        .filter(|&idx| is_local_max(curve, idx))
        .map(|peak| PeakExtent {
            peak,
            start: peak as f64 - walk_edge(curve, peak, -1, drop, params.edge_policy),
            end: peak as f64 + walk_edge(curve, peak, 1, drop, params.edge_policy),
        })
        .collect();
    extents.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<PeakExtent> = Vec::with_capacity(extents.len());
    for extent in extents {
        match merged.last_mut() {
            Some(last) if extent.start - last.end < merge_bins => {
                last.end = last.end.max(extent.end);
                if curve.objective(extent.peak) > curve.objective(last.peak) {
                    last.peak = extent.peak;
                }
            }
            _ => merged.push(extent),
        }
    }

    // the last extent may reach the first one across 2pi
    if merged.len() > 1 {
        let last = merged[merged.len() - 1];
        let first = merged[0];
        if first.start + n - last.end < merge_bins {
            merged.pop();
            let head = &mut merged[0];
            head.start = last.start - n;
            head.end = head.end.max(last.end - n);
            if curve.objective(last.peak) > curve.objective(head.peak) {
                head.peak = last.peak;
            }
        }
    }

    for extent in &mut merged {
        if extent.width_bins() > n {
            extent.end = extent.start + n;
        }
    }
    merged
}

/// Ambiguity slots per peak: one each, then extra slots to the peak with the
/// widest per-slot share while that share exceeds the one-peak width.
fn allocate_slots(extents: &[PeakExtent], params: &PeakSplitParams, phi_step: f64) -> Vec<usize> {
    let mut slots = vec![1usize; extents.len()];
    let mut remaining = params.max_ambiguities.saturating_sub(extents.len());
    while remaining > 0 {
        let widest = extents
            .iter()
            .zip(&slots)
            .enumerate()
            .map(|(idx, (extent, &count))| (idx, extent.width_bins() * phi_step / count as f64))
            .filter(|&(_, share)| share > params.one_peak_width)
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let Some((idx, _)) = widest else {
            break;
        };
        slots[idx] += 1;
        remaining -= 1;
    }
    slots
}

/// Directions for `count` ambiguities over a wide peak: the centers of
/// `count` equal subintervals, except that the subinterval holding the peak
/// is anchored on the peak itself. Returns the directions and the index of
/// the anchored one.
fn subdivide(extent: &PeakExtent, count: usize, curve: &SolutionCurve) -> (Vec<f64>, usize) {
    let share = extent.width_bins() / count as f64;
    let peak_offset = (extent.peak as f64 - extent.start).rem_euclid(curve.phi_count() as f64);
    let anchor = if share > 0.0 {
        ((peak_offset / share).floor() as usize).min(count - 1)
    } else {
        0
    };

    let directions = (0..count)
        .map(|k| {
            if k == anchor {
                curve.direction(extent.peak)
            } else {
                (extent.start + (k as f64 + 0.5) * share) * curve.phi_step()
            }
        })
        .collect();
    (directions, anchor)
}

/// Adaptive-threshold peak splitting.
///
/// Narrow peaks get one locally refined ambiguity. Wide peaks get extra
/// ambiguities, either spread evenly over the peak extent (one of them
/// refined from the peak) or, with `mse_placement`, placed to minimize the
/// expected direction error.
pub fn split_peaks(
    objective: &WindObjective<'_>,
    curve: &SolutionCurve,
    params: &PeakSplitParams,
    config: &RetrievalConfig,
) -> Vec<WindVectorPlus> {
    let mut extents = peak_extents(curve, params);
    if extents.len() > params.max_ambiguities {
        extents.sort_by(|a, b| curve.objective(b.peak).total_cmp(&curve.objective(a.peak)));
        extents.truncate(params.max_ambiguities);
    }
    let slots = allocate_slots(&extents, params, curve.phi_step());
    log::trace!("peak splitting: {} peaks, slots {:?}", extents.len(), slots);

    let mut ambiguities = Vec::with_capacity(params.max_ambiguities);
    let mut extra_slots = 0;
    for (extent, &count) in extents.iter().zip(&slots) {
        if count == 1 || params.mse_placement {
            ambiguities.push(fine_search(
                objective,
                curve.direction(extent.peak),
                curve.speed(extent.peak),
                config,
            ));
            extra_slots += count - 1;
            continue;
        }

        let (directions, anchor) = subdivide(extent, count, curve);
        for (k, direction) in directions.into_iter().enumerate() {
            if k == anchor {
                ambiguities.push(fine_search(objective, direction, curve.speed(extent.peak), config));
            } else {
                ambiguities.push(best_speed_at(objective, curve, direction, config));
            }
        }
    }

    if extra_slots > 0 {
        let pdf = objective_to_pdf(curve.best_obj());
        let peaks: Vec<f64> = ambiguities.iter().map(|wvp| wvp.direction).collect();
        let (directions, mse) = get_min_estimate_mse(&pdf, &peaks, extra_slots, &config.mse_placement);
        log::trace!("placed {} extra ambiguities, estimated MSE {:.5}", directions.len(), mse);
        for direction in directions {
            ambiguities.push(best_speed_at(objective, curve, direction, config));
        }
    }
    ambiguities
}

/// Speed-optimized ambiguity at a fixed direction, bracketed around the
/// curve's speed there
pub fn best_speed_at(
    objective: &WindObjective<'_>,
    curve: &SolutionCurve,
    direction: f64,
    config: &RetrievalConfig,
) -> WindVectorPlus {
    let guess = curve.interpolated_speed(direction);
    let (speed, value) = find_best_speed(
        objective,
        direction,
        guess - SPLIT_SPEED_BRACKET,
        guess + SPLIT_SPEED_BRACKET,
        config,
    );
    WindVectorPlus::new(speed, wrap_angle(direction), value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::angle_interval::angle_difference;
    use crate::types::{DTR, TWO_PI};

    fn curve_from(n: usize, f: impl Fn(f64) -> f64) -> SolutionCurve {
        let obj: Vec<f64> = (0..n).map(|i| f(i as f64 * TWO_PI / n as f64)).collect();
        SolutionCurve::from_samples(vec![8.0; n], obj).unwrap()
    }

    #[test]
    fn test_find_maxima() {
        let curve = curve_from(360, |phi| (2.0 * phi).cos());
        let maxima = find_maxima(&curve);
        assert_eq!(maxima.len(), 2);
        assert_eq!(maxima[0].direction, 0.0);
        assert!((maxima[1].direction - 180.0 * DTR).abs() < 1e-9);
    }

    #[test]
    fn test_find_many_is_a_distribution() {
        let curve = curve_from(72, |phi| -5.0 * (1.0 - phi.cos()));
        let many = find_many(&curve);
        assert_eq!(many.len(), 72);
        let total: f64 = many.iter().map(|wvp| wvp.objective).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(many[0].objective > many[36].objective);
    }

    #[test]
    fn test_sort_and_cap() {
        let mut wvc = Wvc::new();
        wvc.ambiguities = (0..7).map(|i| WindVectorPlus::new(5.0, i as f64, -(i as f64))).collect();
        wvc.ambiguities.reverse();
        assert_eq!(sort_and_cap(&mut wvc, 4), 3);
        assert_eq!(wvc.ambiguities.len(), 4);
        assert_eq!(wvc.ambiguities[0].objective, 0.0);
        assert_eq!(wvc.ambiguities[3].objective, -3.0);
    }

    #[test]
    fn test_peak_extents_and_slots() {
        // one narrow and one broad peak on a flat floor
        let curve = curve_from(360, |phi| {
            let d1 = angle_difference(phi, 1.0);
            let d2 = angle_difference(phi, 4.0);
            let narrow = 10.0 * (-(d1 / 0.1).powi(2)).exp();
            let broad = 6.0 * (-(d2 / 0.6).powi(2)).exp();
            narrow.max(broad) - 10.0
        });
        let params = PeakSplitParams::h1();
        let extents = peak_extents(&curve, &params);
        assert_eq!(extents.len(), 2);
        let narrow_idx = extents.iter().position(|e| e.peak < 180).unwrap();
        let broad_idx = 1 - narrow_idx;
        assert!(extents[broad_idx].width_bins() > 60.0);
        assert!(extents[narrow_idx].width_bins() < 15.0);

        let slots = allocate_slots(&extents, &params, curve.phi_step());
        assert!(slots.iter().sum::<usize>() <= params.max_ambiguities);
        assert_eq!(slots[narrow_idx], 1);
        assert!(slots[broad_idx] >= 2);
    }

    #[test]
    fn test_subdivision_keeps_the_peak() {
        let curve = curve_from(360, |phi| -3.0 * angle_difference(phi, 4.0).powi(2));
        let extent = PeakExtent {
            peak: curve.index_of(4.0),
            start: 200.0,
            end: 280.0,
        };
        let (directions, anchor) = subdivide(&extent, 4, &curve);
        assert_eq!(directions.len(), 4);
        // 4 rad is bin 229, inside the second 20-bin subinterval
        assert_eq!(anchor, 1);
        assert_eq!(directions[anchor], curve.direction(extent.peak));
        assert!((directions[0] - 210.0 * curve.phi_step()).abs() < 1e-12);
        assert!((directions[3] - 270.0 * curve.phi_step()).abs() < 1e-12);
    }

    #[test]
    fn test_subdivision_across_wrap() {
        let curve = curve_from(360, |phi| -angle_difference(phi, 0.05).powi(2));
        let extent = PeakExtent {
            peak: 3,
            start: -30.0,
            end: 30.0,
        };
        let (directions, anchor) = subdivide(&extent, 3, &curve);
        assert_eq!(anchor, 1);
        assert_eq!(directions[1], curve.direction(3));
        assert!((directions[0] + 20.0 * curve.phi_step()).abs() < 1e-12);
    }

    #[test]
    fn test_close_peaks_merge() {
        let curve = curve_from(360, |phi| {
            let a = (-(angle_difference(phi, 2.0) / 0.1).powi(2)).exp();
            let b = 0.9 * (-(angle_difference(phi, 2.25) / 0.1).powi(2)).exp();
            a + b
        });
        let params = PeakSplitParams::h1();
        assert_eq!(find_maxima(&curve).len(), 2);
        let extents = peak_extents(&curve, &params);
        assert_eq!(extents.len(), 1);
        assert_eq!(extents[0].peak, curve.index_of(2.0));
    }

    #[test]
    fn test_flat_curve_has_no_peaks() {
        let curve = curve_from(36, |_| -1.0);
        assert!(peak_extents(&curve, &PeakSplitParams::h2()).is_empty());
        assert!(find_maxima(&curve).is_empty());
    }
}
