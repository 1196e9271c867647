//! One-dimensional maximizers shared by the solution-curve builder and the
//! coarse/fine search.

use crate::core::objective::WindObjective;

/// (sqrt(5) - 1) / 2
const GOLDEN_FRACTION: f64 = 0.618_033_988_749_894_9;

/// Hard stop for golden-section iterations when the tolerance cannot be met
const MAX_GOLDEN_ITERATIONS: usize = 200;

/// Golden-section maximization of `f` starting from the bracket
/// `[low, high]` inside the global bounds `[min, max]`.
///
/// If an endpoint is not below the bracket midpoint, that side of the
/// bracket is reset to the global bound first. For multi-modal functions
/// the result is whichever local mode the bracket converges to.
pub fn golden_section_maximize<F>(
    mut f: F,
    low: f64,
    high: f64,
    min: f64,
    max: f64,
    tolerance: f64,
) -> (f64, f64)
where
    F: FnMut(f64) -> f64,
{
    let mut a = low.clamp(min, max);
    let mut b = high.clamp(min, max);
    if a > b {
        std::mem::swap(&mut a, &mut b);
    }

    let mid = 0.5 * (a + b);
    let f_mid = f(mid);
    if f(a) >= f_mid {
        a = min;
    }
    if f(b) >= f_mid {
        b = max;
    }

    let mut x1 = b - GOLDEN_FRACTION * (b - a);
    let mut x2 = a + GOLDEN_FRACTION * (b - a);
    let mut f1 = f(x1);
    let mut f2 = f(x2);

    let mut iterations = 0;
    while b - a > tolerance && iterations < MAX_GOLDEN_ITERATIONS {
        if f1 < f2 {
            a = x1;
            x1 = x2;
            f1 = f2;
            x2 = a + GOLDEN_FRACTION * (b - a);
            f2 = f(x2);
        } else {
            b = x2;
            x2 = x1;
            f2 = f1;
            x1 = b - GOLDEN_FRACTION * (b - a);
            f1 = f(x1);
        }
        iterations += 1;
    }

    if f1 >= f2 {
        (x1, f1)
    } else {
        (x2, f2)
    }
}

/// Vertex of the parabola through `(-1, f_minus)`, `(0, f_center)`,
/// `(1, f_plus)`. Returns the vertex offset in sample units and the
/// interpolated maximum, or `None` when the parabola does not open downward
/// or the vertex falls outside `[-1, 1]`.
pub fn newtonian_quadratic_refine(f_minus: f64, f_center: f64, f_plus: f64) -> Option<(f64, f64)> {
    let a = 0.5 * (f_plus + f_minus) - f_center;
    let b = 0.5 * (f_plus - f_minus);
    if !(a < 0.0) {
        return None;
    }
    let offset = -b / (2.0 * a);
    if !(-1.0..=1.0).contains(&offset) {
        return None;
    }
    Some((offset, f_center - b * b / (4.0 * a)))
}

/// Speed bounds and step of a line search
#[derive(Debug, Clone, Copy)]
pub struct LineSearch {
    pub step: f64,
    pub min_speed: f64,
    pub max_speed: f64,
    pub max_iterations: usize,
    /// Finish with a quadratic refinement of the last triple
    pub refine: bool,
}

/// Hill-climb along speed at a fixed direction. Returns (speed, objective).
pub fn line_maximize(
    objective: &WindObjective<'_>,
    start_speed: f64,
    direction: f64,
    search: &LineSearch,
) -> (f64, f64) {
    let eval = |speed: f64| objective.score(speed, direction);
    let clamp = |speed: f64| speed.clamp(search.min_speed, search.max_speed);

    let mut center = clamp(start_speed);
    let mut f_center = eval(center);
    let mut f_minus = eval(clamp(center - search.step));
    let mut f_plus = eval(clamp(center + search.step));

    for _ in 0..search.max_iterations {
        if f_plus > f_center && f_plus >= f_minus {
            let next = clamp(center + search.step);
            if next == center {
                break;
            }
            center = next;
            f_minus = f_center;
            f_center = f_plus;
            f_plus = eval(clamp(center + search.step));
        } else if f_minus > f_center {
            let next = clamp(center - search.step);
            if next == center {
                break;
            }
            center = next;
            f_plus = f_center;
            f_center = f_minus;
            f_minus = eval(clamp(center - search.step));
        } else {
            break;
        }
    }

    let interior = center - search.step >= search.min_speed && center + search.step <= search.max_speed;
    if search.refine && interior {
        if let Some((offset, _)) = newtonian_quadratic_refine(f_minus, f_center, f_plus) {
            let refined = center + offset * search.step;
            let f_refined = eval(refined);
            if f_refined > f_center {
                return (refined, f_refined);
            }
        }
    }
    (center, f_center)
}
