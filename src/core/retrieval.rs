//! Wind retrieval orchestrators

use crate::core::ambiguity::{best_speed_at, find_many, find_maxima, sort_and_cap, split_peaks};
use crate::core::copol::remove_bad_copol;
use crate::core::config::{PeakSplitParams, RainCorrectionParams, RetrievalConfig};
use crate::core::direction_range::{build_direction_ranges, objective_to_pdf};
use crate::core::gmf::GmfTable;
use crate::core::init_search::calculate_init_wind_solutions;
use crate::core::mse_placement::{delete_bad_peaks, get_min_estimate_mse};
use crate::core::objective::WindObjective;
use crate::core::smoothing::smooth;
use crate::core::solution_curve::SolutionCurve;
use crate::core::variance::VarianceModel;
use crate::types::{MeasurementList, WindResult, WindVector, WindVectorPlus, Wvc};
use serde::{Deserialize, Serialize};

/// Retrieval pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetrievalStrategy {
    /// Smoothed solution curve, one ambiguity per peak
    Pe,
    /// Coarse/fine 2-D search
    Gs,
    /// Coarse/fine search iterated over a rain backscatter offset
    GsRainCorrected,
    /// Peak splitting with MSE placement, then direction ranges
    S1,
    /// Pe followed by direction ranges
    S2,
    /// Gs followed by direction ranges
    S3,
    /// S3 with MSE-placed ambiguities up to the cap
    S4,
    /// Peak splitting on the raw curve
    H1,
    /// Peak splitting on the smoothed curve
    H2,
    /// H2 with MSE placement of the extra slots
    H3,
}

impl RetrievalStrategy {
    pub const ALL: [RetrievalStrategy; 10] = [
        RetrievalStrategy::Pe,
        RetrievalStrategy::Gs,
        RetrievalStrategy::GsRainCorrected,
        RetrievalStrategy::S1,
        RetrievalStrategy::S2,
        RetrievalStrategy::S3,
        RetrievalStrategy::S4,
        RetrievalStrategy::H1,
        RetrievalStrategy::H2,
        RetrievalStrategy::H3,
    ];
}

impl std::fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RetrievalStrategy::Pe => "PE",
            RetrievalStrategy::Gs => "GS",
            RetrievalStrategy::GsRainCorrected => "GS-RAIN",
            RetrievalStrategy::S1 => "S1",
            RetrievalStrategy::S2 => "S2",
            RetrievalStrategy::S3 => "S3",
            RetrievalStrategy::S4 => "S4",
            RetrievalStrategy::H1 => "H1",
            RetrievalStrategy::H2 => "H2",
            RetrievalStrategy::H3 => "H3",
        };
        write!(f, "{}", name)
    }
}

/// Measurements and optional nudge wind of one cell in a swath batch
#[derive(Debug, Clone, Default)]
pub struct WvcInput {
    pub measurements: MeasurementList,
    pub nudge: Option<WindVector>,
}

/// Wind vector retrieval session. The GMF table and variance model are
/// shared read-only; every retrieval allocates its own solution curve.
pub struct WindRetriever<'a> {
    gmf: &'a GmfTable,
    kp: &'a dyn VarianceModel,
    config: RetrievalConfig,
}

impl<'a> WindRetriever<'a> {
    /// Create a session; an invalid configuration is a fatal setup error
    pub fn new(gmf: &'a GmfTable, kp: &'a dyn VarianceModel, config: RetrievalConfig) -> WindResult<Self> {
        config.validate()?;
        log::info!(
            "Wind retriever ready: {} direction bins, max {} solutions, table types {:?}",
            config.phi_count,
            config.max_solutions,
            gmf.meas_types()
        );
        Ok(Self { gmf, kp, config })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Change the direction resolution for subsequent retrievals
    pub fn set_phi_count(&mut self, phi_count: usize) -> WindResult<()> {
        let mut config = self.config.clone();
        config.phi_count = phi_count;
        config.validate()?;
        log::debug!("phi count {} -> {}", self.config.phi_count, phi_count);
        self.config = config;
        Ok(())
    }

    /// Retrieve one cell. Cells failing the retrieve criteria or any
    /// pipeline stage come back with no ambiguities.
    pub fn retrieve(
        &self,
        strategy: RetrievalStrategy,
        measurements: &MeasurementList,
        nudge: Option<WindVector>,
    ) -> WindResult<Wvc> {
        let mut wvc = Wvc::new();
        if let Some((lon, lat)) = measurements.average_lon_lat() {
            wvc.longitude = lon;
            wvc.latitude = lat;
        }
        wvc.nudge = nudge;

        let Some(usable) = self.usable_measurements(measurements) else {
            return Ok(wvc);
        };
        let prior = nudge.map(|n| n.direction);
        let objective = WindObjective::new(self.gmf, self.kp, &self.config.objective, &usable, prior);

        match strategy {
            RetrievalStrategy::Pe => self.retrieve_pe(&objective, &mut wvc, false)?,
            RetrievalStrategy::S2 => self.retrieve_pe(&objective, &mut wvc, true)?,
            RetrievalStrategy::Gs => self.retrieve_gs(&objective, &mut wvc),
            RetrievalStrategy::GsRainCorrected => match nudge {
                Some(nudge) => self.retrieve_rain_corrected(&usable, nudge, &mut wvc)?,
                None => {
                    log::debug!("no nudge for rain correction, falling back to GS");
                    self.retrieve_gs(&objective, &mut wvc)
                }
            },
            RetrievalStrategy::S3 => self.retrieve_s3(&objective, &mut wvc, false)?,
            RetrievalStrategy::S4 => self.retrieve_s3(&objective, &mut wvc, true)?,
            RetrievalStrategy::H1 => self.retrieve_split(&objective, &mut wvc, &self.config.h1, false, false)?,
            RetrievalStrategy::H2 => self.retrieve_split(&objective, &mut wvc, &self.config.h2, true, false)?,
            RetrievalStrategy::H3 => self.retrieve_split(&objective, &mut wvc, &self.config.h3, true, false)?,
            RetrievalStrategy::S1 => self.retrieve_split(&objective, &mut wvc, &self.config.s1, true, true)?,
        }
        Ok(wvc)
    }

    /// Full posterior: one ambiguity per direction bin carrying the bin
    /// probability. Not capped.
    pub fn retrieve_many_winds(&self, measurements: &MeasurementList) -> WindResult<Wvc> {
        let mut wvc = Wvc::new();
        let Some(usable) = self.usable_measurements(measurements) else {
            return Ok(wvc);
        };
        let objective = WindObjective::new(self.gmf, self.kp, &self.config.objective, &usable, None);
        let curve = self.solution_curve(&objective)?;
        wvc.ambiguities = find_many(&curve);
        Ok(wvc)
    }

    /// Peak splitting with caller-supplied constants
    pub fn retrieve_with_peak_splitting(
        &self,
        measurements: &MeasurementList,
        params: &PeakSplitParams,
        smoothed: bool,
    ) -> WindResult<Wvc> {
        let mut wvc = Wvc::new();
        let Some(usable) = self.usable_measurements(measurements) else {
            return Ok(wvc);
        };
        let objective = WindObjective::new(self.gmf, self.kp, &self.config.objective, &usable, None);
        self.retrieve_split(&objective, &mut wvc, params, smoothed, false)?;
        Ok(wvc)
    }

    /// Retrieve every cell of a swath. One cell's failure does not stop
    /// the others.
    pub fn retrieve_swath(&self, strategy: RetrievalStrategy, cells: &[WvcInput]) -> Vec<WindResult<Wvc>> {
        log::info!("Retrieving {} cells with {}", cells.len(), strategy);

        #[cfg(feature = "parallel")]
        let results: Vec<WindResult<Wvc>> = {
            use rayon::prelude::*;
            cells
                .par_iter()
                .map(|cell| self.retrieve(strategy, &cell.measurements, cell.nudge))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let results: Vec<WindResult<Wvc>> = cells
            .iter()
            .map(|cell| self.retrieve(strategy, &cell.measurements, cell.nudge))
            .collect();

        let retrieved = results
            .iter()
            .filter(|r| matches!(r, Ok(wvc) if !wvc.is_empty()))
            .count();
        log::info!("Retrieved winds in {} of {} cells", retrieved, cells.len());
        results
    }

    /// Land exclusion, non-finite removal and the count/diversity criteria.
    /// `None` means the cell cannot be retrieved.
    fn usable_measurements(&self, measurements: &MeasurementList) -> Option<MeasurementList> {
        let mut usable = measurements.clone();
        let exclude_land = self.config.exclude_land;
        let removed = usable.retain(|m| m.value.is_finite() && !(exclude_land && m.land_flag));
        if removed > 0 {
            log::trace!("dropped {} land or invalid measurements", removed);
        }
        if self.config.remove_bad_copol {
            let outliers = remove_bad_copol(self.gmf, self.kp, &self.config, &mut usable);
            if outliers > 0 {
                log::debug!("removed {} outlying co-pol measurements", outliers);
            }
        }

        if usable.is_empty() {
            return None;
        }
        if self.config.use_retrieve_criteria {
            if usable.len() < self.config.min_measurements {
                log::debug!(
                    "too few measurements: {} < {}",
                    usable.len(),
                    self.config.min_measurements
                );
                return None;
            }
            if usable.azimuth_diversity() < self.config.min_azimuth_diversity {
                log::debug!("insufficient azimuth diversity");
                return None;
            }
        }
        Some(usable)
    }

    fn solution_curve(&self, objective: &WindObjective<'_>) -> WindResult<SolutionCurve> {
        let mut curve = SolutionCurve::new(self.config.phi_count)?;
        curve.build(objective, &self.config);
        Ok(curve)
    }

    /// Smoothed copy of the curve, or `None` when smoothing does not converge
    fn smoothed(&self, curve: &SolutionCurve) -> Option<SolutionCurve> {
        let mut smoothed = curve.clone();
        if smooth(
            &mut smoothed,
            self.config.separation_angle,
            self.config.smooth_angle,
            self.config.max_solutions,
        ) {
            Some(smoothed)
        } else {
            log::debug!("can't find solution curve");
            None
        }
    }

    fn finish(&self, wvc: &mut Wvc, ambiguities: Vec<WindVectorPlus>) {
        wvc.ambiguities = ambiguities;
        wvc.remove_duplicates();
        sort_and_cap(wvc, self.config.max_solutions);
    }

    fn add_direction_ranges(&self, wvc: &mut Wvc, curve: &SolutionCurve) {
        wvc.direction_ranges = build_direction_ranges(curve, &wvc.ambiguities, &self.config.direction_ranges);
    }

    fn retrieve_pe(&self, objective: &WindObjective<'_>, wvc: &mut Wvc, with_ranges: bool) -> WindResult<()> {
        let curve = self.solution_curve(objective)?;
        let Some(smoothed) = self.smoothed(&curve) else {
            return Ok(());
        };
        self.finish(wvc, find_maxima(&smoothed));
        if with_ranges {
            self.add_direction_ranges(wvc, &curve);
        }
        Ok(())
    }

    fn retrieve_gs(&self, objective: &WindObjective<'_>, wvc: &mut Wvc) {
        self.finish(wvc, calculate_init_wind_solutions(objective, &self.config));
    }

    fn retrieve_s3(&self, objective: &WindObjective<'_>, wvc: &mut Wvc, fill_by_mse: bool) -> WindResult<()> {
        self.retrieve_gs(objective, wvc);
        if wvc.is_empty() {
            return Ok(());
        }
        let curve = self.solution_curve(objective)?;

        if fill_by_mse {
            let pdf = objective_to_pdf(curve.best_obj());
            let peaks: Vec<f64> = wvc.ambiguities.iter().map(|wvp| wvp.direction).collect();
            let kept = delete_bad_peaks(&pdf, &peaks, self.config.mse_placement.bad_peak_tolerance);
            if kept.len() < peaks.len() {
                log::debug!("dropped {} redundant peaks", peaks.len() - kept.len());
            }
            let mut ambiguities: Vec<WindVectorPlus> = kept.iter().map(|&i| wvc.ambiguities[i]).collect();
            let kept_peaks: Vec<f64> = ambiguities.iter().map(|wvp| wvp.direction).collect();

            let extra = self.config.max_solutions.saturating_sub(ambiguities.len());
            if extra > 0 {
                let (directions, _) = get_min_estimate_mse(&pdf, &kept_peaks, extra, &self.config.mse_placement);
                ambiguities.extend(
                    directions
                        .into_iter()
                        .map(|direction| best_speed_at(objective, &curve, direction, &self.config)),
                );
            }
            self.finish(wvc, ambiguities);
        }

        self.add_direction_ranges(wvc, &curve);
        Ok(())
    }

    fn retrieve_split(
        &self,
        objective: &WindObjective<'_>,
        wvc: &mut Wvc,
        params: &PeakSplitParams,
        smoothed: bool,
        with_ranges: bool,
    ) -> WindResult<()> {
        let curve = self.solution_curve(objective)?;
        let ambiguities = if smoothed {
            let Some(smoothed_curve) = self.smoothed(&curve) else {
                return Ok(());
            };
            split_peaks(objective, &smoothed_curve, params, &self.config)
        } else {
            split_peaks(objective, &curve, params, &self.config)
        };
        self.finish(wvc, ambiguities);
        if with_ranges {
            self.add_direction_ranges(wvc, &curve);
        }
        Ok(())
    }

    /// Search over a rain backscatter offset removed from every observation,
    /// keeping the offset that puts the most solution-curve probability on
    /// the nudge direction
    fn retrieve_rain_corrected(
        &self,
        measurements: &MeasurementList,
        nudge: WindVector,
        wvc: &mut Wvc,
    ) -> WindResult<()> {
        let best = search_rain_offset(&self.config.rain, |offset| {
            let corrected: MeasurementList = measurements
                .iter()
                .map(|meas| {
                    let mut meas = meas.clone();
                    meas.value -= offset;
                    meas
                })
                .collect();
            let objective = WindObjective::new(
                self.gmf,
                self.kp,
                &self.config.objective,
                &corrected,
                Some(nudge.direction),
            );
            let curve = self.solution_curve(&objective)?;
            let probability = nudge_probability(&curve, nudge.direction);
            log::trace!("rain offset {:.4e}: nudge probability {:.4}", offset, probability);
            Ok((calculate_init_wind_solutions(&objective, &self.config), probability))
        })?;

        if let Some((ambiguities, probability, offset)) = best {
            log::debug!(
                "rain correction {:.4e} with nudge probability {:.4}",
                offset,
                probability
            );
            self.finish(wvc, ambiguities);
            wvc.rain_correction = Some(offset);
        }
        Ok(())
    }
}

/// Offsets `0, step, 2 step, ...` scored by `evaluate`. A later offset
/// replaces the best only on a strictly higher probability; the search
/// stops once the probability drops below `degrade_ratio` of the best.
/// Returns the best payload with its probability and offset.
fn search_rain_offset<T>(
    params: &RainCorrectionParams,
    mut evaluate: impl FnMut(f64) -> WindResult<(T, f64)>,
) -> WindResult<Option<(T, f64, f64)>> {
    let mut best: Option<(T, f64, f64)> = None;
    for k in 0..=params.max_iterations {
        let offset = k as f64 * params.step;
        let (payload, probability) = evaluate(offset)?;

        let best_probability = best.as_ref().map(|(_, p, _)| *p);
        match best_probability {
            Some(p) if probability <= p => {
                if probability < params.degrade_ratio * p {
                    break;
                }
            }
            _ => best = Some((payload, probability, offset)),
        }
    }
    Ok(best)
}

/// Probability mass of the solution-curve bin holding `direction`
fn nudge_probability(curve: &SolutionCurve, direction: f64) -> f64 {
    let pdf = objective_to_pdf(curve.best_obj());
    pdf.get(curve.index_of(direction)).copied().unwrap_or(0.0)
}
