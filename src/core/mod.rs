//! Core wind retrieval modules

pub mod angle_interval;
pub mod spline;
pub mod gmf;
pub mod variance;
pub mod objective;
pub mod optimize;
pub mod solution_curve;
pub mod smoothing;
pub mod init_search;
pub mod ambiguity;
pub mod direction_range;
pub mod mse_placement;
pub mod copol;
pub mod config;
pub mod retrieval;

// Re-export main types
pub use angle_interval::{angle_difference, wrap_angle, AngleInterval, AngleIntervalList};
pub use gmf::{GmfTable, HarmonicCoefficients, TableAxis, TableGeometry};
pub use variance::{ConstantVariance, KpModel, VarianceComponent, VarianceModel};
pub use objective::{ObjectiveFunction, ObjectiveSettings, Verbosity, WindObjective};
pub use optimize::{golden_section_maximize, line_maximize, newtonian_quadratic_refine, LineSearch};
pub use solution_curve::{find_best_speed, SolutionCurve};
pub use smoothing::smooth;
pub use init_search::{calculate_init_wind_solutions, fine_search};
pub use ambiguity::{find_many, find_maxima, sort_and_cap, split_peaks};
pub use direction_range::{build_direction_ranges, objective_to_pdf, upsampled_pdf, DirectionRange};
pub use mse_placement::{
    brute_force_get_min_estimate_mse, delete_bad_peaks, estimate_dir_mse, get_min_estimate_mse,
};
pub use copol::{hh_bias_using_vv, remove_bad_copol};
pub use config::{
    CopolScreeningParams, DirectionRangeParams, InitSearchParams, MsePlacementParams, PeakEdgePolicy, PeakSplitParams,
    RainCorrectionParams, RetrievalConfig,
};
pub use retrieval::{RetrievalStrategy, WindRetriever, WvcInput};
