//! Coarse-then-fine two-dimensional search for the initial wind solutions

use crate::core::angle_interval::wrap_angle;
use crate::core::config::RetrievalConfig;
use crate::core::objective::WindObjective;
use crate::core::optimize::{line_maximize, newtonian_quadratic_refine, LineSearch};
use crate::types::{WindVectorPlus, TWO_PI};

/// Coarse line maximization at fixed direction spacing, local maxima of the
/// 3-point averaged coarse curve, then a quadratic direction refinement and
/// a 9-point fine search per maximum. One solution per kept coarse maximum.
pub fn calculate_init_wind_solutions(
    objective: &WindObjective<'_>,
    config: &RetrievalConfig,
) -> Vec<WindVectorPlus> {
    let search = &config.init_search;
    let coarse_count = ((TWO_PI / search.coarse_dir_step).round() as usize).max(3);
    let coarse_step = TWO_PI / coarse_count as f64;
    let line = LineSearch {
        step: search.coarse_speed_step,
        min_speed: config.min_speed,
        max_speed: config.max_speed,
        max_iterations: search.max_iterations,
        refine: true,
    };

    let mut speeds = Vec::with_capacity(coarse_count);
    let mut values = Vec::with_capacity(coarse_count);
    let mut seed = search.initial_speed;
    for idx in 0..coarse_count {
        let (speed, value) = line_maximize(objective, seed, idx as f64 * coarse_step, &line);
        speeds.push(speed);
        values.push(value);
        seed = speed;
    }

    let wrap = |idx: usize, delta: isize| -> usize {
        let n = coarse_count as isize;
        (((idx as isize + delta) % n + n) % n) as usize
    };

    let averaged: Vec<f64> = (0..coarse_count)
        .map(|i| (values[wrap(i, -1)] + values[i] + values[wrap(i, 1)]) / 3.0)
        .collect();

    let mut maxima: Vec<usize> = (0..coarse_count)
        .filter(|&i| averaged[i] > averaged[wrap(i, -1)] && averaged[i] >= averaged[wrap(i, 1)])
        .collect();
    maxima.sort_by(|&a, &b| averaged[b].total_cmp(&averaged[a]));
    if maxima.len() > search.max_coarse_maxima {
        log::debug!(
            "keeping {} of {} coarse maxima",
            search.max_coarse_maxima,
            maxima.len()
        );
        maxima.truncate(search.max_coarse_maxima);
    }

    maxima
        .into_iter()
        .map(|idx| {
            let mut direction = idx as f64 * coarse_step;
            let mut speed = speeds[idx];
            if let Some((offset, _)) =
                newtonian_quadratic_refine(values[wrap(idx, -1)], values[idx], values[wrap(idx, 1)])
            {
                direction += offset * coarse_step;
                speed = line_maximize(objective, speed, direction, &line).0;
            }
            fine_search(objective, direction, speed, config)
        })
        .collect()
}

/// 9-point (direction x speed) hill climb from a starting point, finished by
/// a quadratic refinement along each axis. The refined point is kept only if
/// it scores better than the best grid point.
pub fn fine_search(
    objective: &WindObjective<'_>,
    direction: f64,
    speed: f64,
    config: &RetrievalConfig,
) -> WindVectorPlus {
    let search = &config.init_search;
    let dir_step = search.fine_dir_step;
    let spd_step = search.fine_speed_step;
    let clamp = |s: f64| s.clamp(config.min_speed, config.max_speed);

    let score_grid = |center_dir: f64, center_spd: f64| {
        let mut grid = [[0.0; 3]; 3];
        for (i, row) in grid.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                let d = center_dir + (i as f64 - 1.0) * dir_step;
                let s = clamp(center_spd + (j as f64 - 1.0) * spd_step);
                *cell = objective.score(s, d);
            }
        }
        grid
    };

    let mut center_dir = direction;
    let mut center_spd = clamp(speed);
    // always scored around the current center
    let mut grid = score_grid(center_dir, center_spd);

    for _ in 0..search.max_iterations {
        let mut best = (1, 1);
        for i in 0..3 {
            for j in 0..3 {
                if grid[i][j] > grid[best.0][best.1] {
                    best = (i, j);
                }
            }
        }
        if best == (1, 1) {
            break;
        }
        let next_spd = clamp(center_spd + (best.1 as f64 - 1.0) * spd_step);
        if best.0 == 1 && next_spd == center_spd {
            break;
        }
        center_dir += (best.0 as f64 - 1.0) * dir_step;
        center_spd = next_spd;
        grid = score_grid(center_dir, center_spd);
    }

    let f_center = grid[1][1];
    let mut refined_dir = center_dir;
    let mut refined_spd = center_spd;
    if let Some((offset, _)) = newtonian_quadratic_refine(grid[0][1], grid[1][1], grid[2][1]) {
        refined_dir += offset * dir_step;
    }
    if let Some((offset, _)) = newtonian_quadratic_refine(grid[1][0], grid[1][1], grid[1][2]) {
        refined_spd = clamp(refined_spd + offset * spd_step);
    }

    let f_refined = objective.score(refined_spd, refined_dir);
    if f_refined > f_center {
        WindVectorPlus::new(refined_spd, wrap_angle(refined_dir), f_refined)
    } else {
        WindVectorPlus::new(center_spd, wrap_angle(center_dir), f_center)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::angle_interval::angle_difference;
    use crate::core::gmf::{GmfTable, TableAxis, TableGeometry};
    use crate::core::objective::ObjectiveSettings;
    use crate::core::variance::ConstantVariance;
    use crate::types::{MeasType, Measurement, MeasurementList, DTR};

    fn setup(true_dir: f64) -> (GmfTable, MeasurementList) {
        let geometry = TableGeometry {
            incidence: TableAxis::new(2, 40.0 * DTR, 10.0 * DTR),
            speed: TableAxis::new(51, 0.0, 1.0),
            chi_count: 360,
        };
        let table = GmfTable::from_fn(geometry, &[MeasType::Vv], |_, _, spd, chi| {
            spd * (2.0 + chi.cos() + 0.5 * (2.0 * chi).cos())
        })
        .unwrap();
        let meas = [10.0, 55.0, 190.0, 235.0]
            .iter()
            .map(|&az| {
                let mut m = Measurement::new(MeasType::Vv, 0.0, 45.0 * DTR, az * DTR);
                m.value = table
                    .interpolate(MeasType::Vv, m.incidence_angle, 11.0, m.chi(true_dir))
                    .unwrap();
                m
            })
            .collect();
        (table, meas)
    }

    #[test]
    fn test_finds_true_wind() {
        let true_dir = 123.0 * DTR;
        let (table, meas) = setup(true_dir);
        let kp = ConstantVariance(1.0);
        let config = RetrievalConfig::default();
        let objective = WindObjective::new(&table, &kp, &config.objective, &meas, None);

        let solutions = calculate_init_wind_solutions(&objective, &config);
        assert!(!solutions.is_empty());
        assert!(solutions.len() <= config.init_search.max_coarse_maxima);

        let best = solutions
            .iter()
            .max_by(|a, b| a.objective.total_cmp(&b.objective))
            .unwrap();
        assert!(angle_difference(best.direction, true_dir) < 1.0 * DTR);
        assert!((best.speed - 11.0).abs() < 0.2);
    }

    #[test]
    fn test_fine_search_climbs() {
        let true_dir = 40.0 * DTR;
        let (table, meas) = setup(true_dir);
        let kp = ConstantVariance(1.0);
        let config = RetrievalConfig::default();
        let objective = WindObjective::new(&table, &kp, &config.objective, &meas, None);

        let start = objective.score(9.0, 45.0 * DTR);
        let solution = fine_search(&objective, 45.0 * DTR, 9.0, &config);
        assert!(solution.objective > start);
        assert!(angle_difference(solution.direction, true_dir) < 1.0 * DTR);
    }

    #[test]
    fn test_refinement_after_last_step_uses_final_grid() {
        let true_dir = 40.0 * DTR;
        let (table, meas) = setup(true_dir);
        let kp = ConstantVariance(1.0);
        let mut config = RetrievalConfig::default();
        config.init_search.max_iterations = 1;
        let objective = WindObjective::new(&table, &kp, &config.objective, &meas, None);

        // one step lands 0.6 deg from the truth; only the quadratic
        // refinement around that point can close the gap
        let solution = fine_search(&objective, 41.6 * DTR, 11.0, &config);
        assert!(angle_difference(solution.direction, true_dir) < 0.2 * DTR);
        assert!(solution.objective > objective.score(11.0, 40.6 * DTR));
    }

    #[test]
    fn test_empty_list_has_no_solutions() {
        let (table, _) = setup(0.0);
        let empty = MeasurementList::new();
        let kp = ConstantVariance(1.0);
        let config = RetrievalConfig::default();
        let objective = WindObjective::new(&table, &kp, &config.objective, &empty, None);
        assert!(calculate_init_wind_solutions(&objective, &config).is_empty());
    }
}
