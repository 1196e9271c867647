//! Circular angle intervals used for direction ranges and for the search
//! intervals of the ambiguity placement.

use num_traits::{Float, FloatConst};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Wrap an angle into [0, 2pi)
pub fn wrap_angle<T: Float + FloatConst>(angle: T) -> T {
    let two_pi = T::PI() + T::PI();
    let mut wrapped = angle % two_pi;
    if wrapped < T::zero() {
        wrapped = wrapped + two_pi;
    }
    if wrapped >= two_pi {
        wrapped = wrapped - two_pi;
    }
    wrapped
}

/// Smallest absolute angle between two directions, in [0, pi]
pub fn angle_difference<T: Float + FloatConst>(a: T, b: T) -> T {
    let diff = wrap_angle(a - b);
    if diff > T::PI() {
        T::PI() + T::PI() - diff
    } else {
        diff
    }
}

/// Angular interval [left, right) walking counter-clockwise from `left`.
/// Both ends are kept in [0, 2pi); the interval may wrap past 2pi.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AngleInterval {
    pub left: f64,
    pub right: f64,
}

impl AngleInterval {
    pub fn new(left: f64, right: f64) -> Self {
        Self {
            left: wrap_angle(left),
            right: wrap_angle(right),
        }
    }

    pub fn width(&self) -> f64 {
        let width = self.right - self.left;
        if width < 0.0 {
            width + 2.0 * PI
        } else {
            width
        }
    }

    pub fn midpoint(&self) -> f64 {
        wrap_angle(self.left + self.width() / 2.0)
    }

    pub fn contains(&self, angle: f64) -> bool {
        wrap_angle(angle - self.left) < self.width()
    }

    /// Closest direction represented by the interval
    pub fn nearest_direction(&self, angle: f64) -> f64 {
        let angle = wrap_angle(angle);
        if self.contains(angle) {
            return angle;
        }
        if angle_difference(angle, self.left) <= angle_difference(angle, self.right) {
            self.left
        } else {
            self.right
        }
    }

    /// Split at the midpoint. The two halves cover exactly the original span.
    pub fn bisect(&self) -> (AngleInterval, AngleInterval) {
        let midpoint = self.left + self.width() / 2.0;
        (
            AngleInterval::new(self.left, midpoint),
            AngleInterval::new(midpoint, self.left + self.width()),
        )
    }

    /// `count` angles spaced evenly inside the interval, excluding the ends
    pub fn equally_spaced_angles(&self, count: usize) -> Vec<f64> {
        let spacing = self.width() / (count + 1) as f64;
        (0..count)
            .map(|c| wrap_angle(self.left + (c + 1) as f64 * spacing))
            .collect()
    }
}

/// Ordered collection of angle intervals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AngleIntervalList {
    intervals: Vec<AngleInterval>,
}

impl AngleIntervalList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, interval: AngleInterval) {
        self.intervals.push(interval);
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AngleInterval> {
        self.intervals.iter()
    }

    pub fn get(&self, idx: usize) -> Option<&AngleInterval> {
        self.intervals.get(idx)
    }

    pub fn total_width(&self) -> f64 {
        self.intervals.iter().map(AngleInterval::width).sum()
    }

    pub fn max_width(&self) -> f64 {
        self.intervals
            .iter()
            .map(AngleInterval::width)
            .fold(0.0, f64::max)
    }

    /// Keep the intervals whose index satisfies `keep`
    pub fn retain_indexed<F>(&mut self, mut keep: F)
    where
        F: FnMut(usize) -> bool,
    {
        let mut idx = 0;
        self.intervals.retain(|_| {
            let keep_this = keep(idx);
            idx += 1;
            keep_this
        });
    }

    /// Bisect every interval. Each original interval keeps its slot and
    /// the new right halves are appended, in order, after the originals.
    pub fn bisect_all(&mut self) {
        let original = self.intervals.len();
        for idx in 0..original {
            let (left_half, right_half) = self.intervals[idx].bisect();
            self.intervals[idx] = left_half;
            self.intervals.push(right_half);
        }
    }

    /// Every way to distribute `num_angles` angles over the intervals:
    /// each row holds one non-negative count per interval, summing to
    /// `num_angles`.
    pub fn possible_placings(&self, num_angles: usize) -> Vec<Vec<usize>> {
        let mut placings = Vec::new();
        if self.intervals.is_empty() {
            return placings;
        }
        let mut current = vec![0; self.intervals.len()];
        collect_placings(num_angles, 0, &mut current, &mut placings);
        placings
    }
}

fn collect_placings(
    angles_left: usize,
    interval_idx: usize,
    current: &mut Vec<usize>,
    placings: &mut Vec<Vec<usize>>,
) {
    if interval_idx == current.len() - 1 {
        current[interval_idx] = angles_left;
        placings.push(current.clone());
        return;
    }
    for count in 0..=angles_left {
        current[interval_idx] = count;
        collect_placings(angles_left - count, interval_idx + 1, current, placings);
    }
}

impl<'a> IntoIterator for &'a AngleIntervalList {
    type Item = &'a AngleInterval;
    type IntoIter = std::slice::Iter<'a, AngleInterval>;

    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}

impl FromIterator<AngleInterval> for AngleIntervalList {
    fn from_iter<I: IntoIterator<Item = AngleInterval>>(iter: I) -> Self {
        Self {
            intervals: iter.into_iter().collect(),
        }
    }
}
