use crate::core::angle_interval::wrap_angle;
use crate::types::{MeasType, WindError, WindResult, TWO_PI};
use ndarray::Array4;
use num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

/// Uniformly sampled table axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TableAxis {
    pub count: usize,
    pub min: f64,
    pub step: f64,
}

impl TableAxis {
    pub fn new(count: usize, min: f64, step: f64) -> Self {
        Self { count, min, step }
    }

    pub fn max(&self) -> f64 {
        self.min + (self.count.saturating_sub(1)) as f64 * self.step
    }

    pub fn value(&self, idx: usize) -> f64 {
        self.min + idx as f64 * self.step
    }

    /// Lower bracketing index and fractional offset toward the next sample.
    /// Values outside the axis are clamped to its ends.
    fn bracket(&self, x: f64) -> (usize, f64) {
        if self.count < 2 {
            return (0, 0.0);
        }
        let last = (self.count - 1) as f64;
        let pos = ((x - self.min) / self.step).clamp(0.0, last);
        let idx = (pos.floor() as usize).min(self.count - 2);
        (idx, pos - idx as f64)
    }
}

/// Axis layout of a GMF table. The chi axis spans [0, 2pi) with
/// `chi_count` distinct samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TableGeometry {
    pub incidence: TableAxis,
    pub speed: TableAxis,
    pub chi_count: usize,
}

impl TableGeometry {
    pub fn chi_step(&self) -> f64 {
        TWO_PI / self.chi_count as f64
    }

    fn validate(&self) -> WindResult<()> {
        if self.incidence.count == 0 || self.speed.count == 0 || self.chi_count == 0 {
            return Err(WindError::InvalidTable(format!(
                "Empty table axis: {} incidence x {} speed x {} chi",
                self.incidence.count, self.speed.count, self.chi_count
            )));
        }
        if self.incidence.step <= 0.0 || self.speed.step <= 0.0 {
            return Err(WindError::InvalidTable(
                "Table axis steps must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// First four chi harmonics of the model function:
/// sigma0(chi) ~ a0 + sum_k amplitude[k] * cos((k+1) chi + phase[k])
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicCoefficients {
    pub a0: f64,
    pub amplitude: [f64; 4],
    pub phase: [f64; 4],
}

/// Geophysical model function in tabular form
#[derive(Debug, Clone)]
pub struct GmfTable {
    geometry: TableGeometry,
    /// Slot in the first array axis for each measurement type
    slots: [Option<usize>; MeasType::COUNT],
    values: Array4<f32>,
}

impl GmfTable {
    /// Allocate a zero-filled table holding the given measurement types
    pub fn new(geometry: TableGeometry, meas_types: &[MeasType]) -> WindResult<Self> {
        geometry.validate()?;
        if meas_types.is_empty() {
            return Err(WindError::InvalidTable(
                "Table must hold at least one measurement type".to_string(),
            ));
        }

        let mut slots = [None; MeasType::COUNT];
        let mut slot_count = 0;
        for met in meas_types {
            if slots[met.index()].is_none() {
                slots[met.index()] = Some(slot_count);
                slot_count += 1;
            }
        }

        let shape = (
            slot_count,
            geometry.incidence.count,
            geometry.speed.count,
            geometry.chi_count,
        );
        let len = shape.0 * shape.1 * shape.2 * shape.3;
        let mut buffer: Vec<f32> = Vec::new();
        buffer.try_reserve_exact(len)?;
        buffer.resize(len, 0.0);
        let values = Array4::from_shape_vec(shape, buffer)
            .map_err(|e| WindError::InvalidTable(format!("Failed to shape GMF table: {}", e)))?;

        log::debug!(
            "Allocated GMF table: {} types x {} inc x {} spd x {} chi",
            shape.0,
            shape.1,
            shape.2,
            shape.3
        );

        Ok(Self {
            geometry,
            slots,
            values,
        })
    }

    /// Build a table by sampling an analytic model function
    /// `f(meas_type, incidence, speed, chi)` at every grid node.
    pub fn from_fn<F>(geometry: TableGeometry, meas_types: &[MeasType], f: F) -> WindResult<Self>
    where
        F: Fn(MeasType, f64, f64, f64) -> f64,
    {
        let mut table = Self::new(geometry, meas_types)?;
        let chi_step = geometry.chi_step();
        for met in MeasType::ALL {
            let Some(slot) = table.slots[met.index()] else {
                continue;
            };
            for inc_idx in 0..geometry.incidence.count {
                let inc = geometry.incidence.value(inc_idx);
                for spd_idx in 0..geometry.speed.count {
                    let spd = geometry.speed.value(spd_idx);
                    for chi_idx in 0..geometry.chi_count {
                        let chi = chi_idx as f64 * chi_step;
                        table.values[[slot, inc_idx, spd_idx, chi_idx]] = f(met, inc, spd, chi) as f32;
                    }
                }
            }
        }
        table.zero_speed_bin();
        Ok(table)
    }

    pub fn geometry(&self) -> &TableGeometry {
        &self.geometry
    }

    pub fn contains(&self, meas_type: MeasType) -> bool {
        self.slots[meas_type.index()].is_some()
    }

    pub fn meas_types(&self) -> Vec<MeasType> {
        MeasType::ALL
            .iter()
            .copied()
            .filter(|met| self.contains(*met))
            .collect()
    }

    /// Stored value at a grid node
    pub fn node_value(
        &self,
        meas_type: MeasType,
        inc_idx: usize,
        spd_idx: usize,
        chi_idx: usize,
    ) -> Option<f32> {
        let slot = self.slots[meas_type.index()]?;
        self.values.get([slot, inc_idx, spd_idx, chi_idx]).copied()
    }

    /// Mutable (chi) row of one measurement type at one incidence/speed node
    pub(crate) fn chi_row_mut(
        &mut self,
        meas_type: MeasType,
        inc_idx: usize,
        spd_idx: usize,
    ) -> Option<ndarray::ArrayViewMut1<'_, f32>> {
        let slot = self.slots[meas_type.index()]?;
        Some(
            self.values
                .slice_mut(ndarray::s![slot, inc_idx, spd_idx, ..]),
        )
    }

    /// Wind speed zero has zero backscatter regardless of the file contents
    pub(crate) fn zero_speed_bin(&mut self) {
        let speed = self.geometry.speed;
        for spd_idx in 0..speed.count {
            if speed.value(spd_idx).abs() < 1e-9 {
                self.values
                    .slice_mut(ndarray::s![.., .., spd_idx, ..])
                    .fill(0.0);
            }
        }
    }

    /// Fill chi samples beyond `stored` using sigma0(2pi - chi) = sigma0(chi)
    pub(crate) fn mirror_chi(&mut self, stored: usize) {
        let chi_count = self.geometry.chi_count;
        for mut row in self.values.lanes_mut(ndarray::Axis(3)) {
            for chi_idx in stored..chi_count {
                row[chi_idx] = row[chi_count - chi_idx];
            }
        }
    }

    /// Interpolated model sigma-0. Incidence and speed are clamped to the
    /// table bounds; chi wraps at 2pi. Returns `None` when the table does not
    /// carry `meas_type`.
    pub fn interpolate(&self, meas_type: MeasType, incidence: f64, speed: f64, chi: f64) -> Option<f64> {
        let slot = self.slots[meas_type.index()]?;
        let geometry = &self.geometry;

        let (i0, fi) = geometry.incidence.bracket(incidence);
        let i1 = (i0 + 1).min(geometry.incidence.count - 1);
        let (s0, fs) = geometry.speed.bracket(speed);
        let s1 = (s0 + 1).min(geometry.speed.count - 1);

        let chi_pos = wrap_angle(chi) / geometry.chi_step();
        let chi_floor = chi_pos.floor();
        let fc = chi_pos - chi_floor;
        let c0 = (chi_floor as usize) % geometry.chi_count;
        let c1 = (c0 + 1) % geometry.chi_count;

        let bilinear = |c: usize| -> f64 {
            let v00 = self.values[[slot, i0, s0, c]] as f64;
            let v01 = self.values[[slot, i0, s1, c]] as f64;
            let v10 = self.values[[slot, i1, s0, c]] as f64;
            let v11 = self.values[[slot, i1, s1, c]] as f64;
            let low_inc = v00 + fs * (v01 - v00);
            let high_inc = v10 + fs * (v11 - v10);
            low_inc + fi * (high_inc - low_inc)
        };

        let at_c0 = bilinear(c0);
        let at_c1 = bilinear(c1);
        Some(at_c0 + fc * (at_c1 - at_c0))
    }

    /// Chi harmonics at one incidence/speed point by a discrete Fourier sum
    /// over the distinct chi samples.
    pub fn harmonic_coefficients(
        &self,
        meas_type: MeasType,
        incidence: f64,
        speed: f64,
    ) -> WindResult<HarmonicCoefficients> {
        let n = self.geometry.chi_count;
        if n < 9 {
            return Err(WindError::InvalidTable(format!(
                "{} chi samples cannot resolve four harmonics",
                n
            )));
        }

        let chi_step = self.geometry.chi_step();
        let mut buffer = Vec::with_capacity(n);
        for chi_idx in 0..n {
            let value = self
                .interpolate(meas_type, incidence, speed, chi_idx as f64 * chi_step)
                .ok_or_else(|| {
                    WindError::InvalidTable(format!("No {} model function loaded", meas_type))
                })?;
            buffer.push(Complex::new(value, 0.0));
        }

        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(n);
        fft.process(&mut buffer);

        let mut amplitude = [0.0; 4];
        let mut phase = [0.0; 4];
        for k in 1..=4 {
            amplitude[k - 1] = 2.0 * buffer[k].norm() / n as f64;
            phase[k - 1] = buffer[k].im.atan2(buffer[k].re);
        }

        Ok(HarmonicCoefficients {
            a0: buffer[0].re / n as f64,
            amplitude,
            phase,
        })
    }
}
