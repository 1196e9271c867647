//! Measurement variance (Kp) models consumed by the objective functions

use crate::types::{MeasType, Measurement};
use serde::{Deserialize, Serialize};

/// Additive components of the expected measurement variance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarianceComponent {
    /// Measurement (communication) noise, quadratic in sigma-0
    Kpc,
    /// Multiplicative model-function uncertainty
    Kpm,
    /// Residual correlation error
    Kpri,
    /// Along-scan correlation error
    Kprs,
}

impl VarianceComponent {
    pub const ALL: [VarianceComponent; 4] = [
        VarianceComponent::Kpc,
        VarianceComponent::Kpm,
        VarianceComponent::Kpri,
        VarianceComponent::Kprs,
    ];
}

/// Expected variance of a measurement given a trial backscatter value.
///
/// A total of 0.0 means "no variance weighting"; callers fall back to an
/// unweighted residual rather than dividing by it.
pub trait VarianceModel: Sync {
    /// One additive variance term
    fn component_variance(
        &self,
        component: VarianceComponent,
        meas: &Measurement,
        speed: f64,
        trial_sigma0: f64,
    ) -> f64;

    /// Total expected variance
    fn variance(&self, meas: &Measurement, speed: f64, trial_sigma0: f64) -> f64 {
        VarianceComponent::ALL
            .iter()
            .map(|&component| self.component_variance(component, meas, speed, trial_sigma0))
            .sum()
    }
}

/// Standard Kp model: Kpc from the per-measurement A, B, C coefficients,
/// the remaining terms as constant normalized standard deviations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpModel {
    pub use_kpc: bool,
    pub use_kpm: bool,
    pub use_kpri: bool,
    pub use_kprs: bool,
    /// Ku-band model-function Kp (normalized standard deviation)
    pub kpm: f64,
    /// C-band model-function Kp
    pub kpm_c_band: f64,
    pub kpri: f64,
    pub kprs: f64,
}

impl Default for KpModel {
    fn default() -> Self {
        Self {
            use_kpc: true,
            use_kpm: true,
            use_kpri: false,
            use_kprs: false,
            kpm: 0.16,          // about 0.65 dB
            kpm_c_band: 0.16,
            kpri: 0.0,
            kprs: 0.0,
        }
    }
}

impl KpModel {
    fn kpm_for(&self, meas_type: MeasType) -> f64 {
        if meas_type.is_c_band() {
            self.kpm_c_band
        } else {
            self.kpm
        }
    }
}

impl VarianceModel for KpModel {
    fn component_variance(
        &self,
        component: VarianceComponent,
        meas: &Measurement,
        _speed: f64,
        trial_sigma0: f64,
    ) -> f64 {
        let s2 = trial_sigma0 * trial_sigma0;
        match component {
            VarianceComponent::Kpc if self.use_kpc => {
                (meas.a - 1.0) * s2 + meas.b * trial_sigma0 + meas.c
            }
            VarianceComponent::Kpm if self.use_kpm => {
                let kpm = self.kpm_for(meas.meas_type);
                kpm * kpm * s2
            }
            VarianceComponent::Kpri if self.use_kpri => self.kpri * self.kpri * s2,
            VarianceComponent::Kprs if self.use_kprs => self.kprs * self.kprs * s2,
            _ => 0.0,
        }
    }
}

/// Fixed variance for every measurement. Zero disables weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstantVariance(pub f64);

impl VarianceModel for ConstantVariance {
    fn component_variance(
        &self,
        component: VarianceComponent,
        _meas: &Measurement,
        _speed: f64,
        _trial_sigma0: f64,
    ) -> f64 {
        match component {
            VarianceComponent::Kpc => self.0,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_kpc_quadratic() {
        let mut meas = Measurement::new(MeasType::Vv, 0.01, 0.9, 0.0);
        let looks = 10.0;
        let noise = 0.002;
        meas.a = 1.0 + 1.0 / looks;
        meas.b = 2.0 * noise / looks;
        meas.c = noise * noise / looks;

        let model = KpModel {
            use_kpm: false,
            ..KpModel::default()
        };
        let s = 0.02;
        let snr = s / noise;
        let expected = s * s / looks * (1.0 + 2.0 / snr + 1.0 / (snr * snr));
        assert_relative_eq!(model.variance(&meas, 8.0, s), expected, max_relative = 1e-12);
    }

    #[test]
    fn test_components_add() {
        let meas = Measurement::new(MeasType::CBandHh, 0.01, 0.9, 0.0);
        let model = KpModel {
            use_kpri: true,
            kpri: 0.1,
            kpm_c_band: 0.2,
            ..KpModel::default()
        };
        let s = 0.05;
        // neutral A, B, C give zero Kpc
        let expected = 0.04 * s * s + 0.01 * s * s;
        assert_relative_eq!(model.variance(&meas, 8.0, s), expected, max_relative = 1e-12);
    }

    #[test]
    fn test_disabled_model_is_zero() {
        let meas = Measurement::new(MeasType::Vv, 0.01, 0.9, 0.0);
        let model = KpModel {
            use_kpc: false,
            use_kpm: false,
            ..KpModel::default()
        };
        assert_eq!(model.variance(&meas, 8.0, 0.1), 0.0);
        assert_eq!(ConstantVariance(0.0).variance(&meas, 8.0, 0.1), 0.0);
    }
}
