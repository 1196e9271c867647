//! seawinds: A Fast, Modular Scatterometer Wind Vector Retrieval Engine
//!
//! This library retrieves ocean-surface wind vectors from scatterometer
//! sigma-0 measurements by maximizing an objective function against a
//! tabulated geophysical model function (GMF). Every wind vector cell comes
//! back with a ranked list of ambiguous solutions and, for the strategies
//! that build them, direction uncertainty ranges.
//!
//! ```no_run
//! use seawinds::{GmfReader, KpModel, RetrievalConfig, RetrievalStrategy, TableLayout, WindRetriever};
//!
//! # fn main() -> seawinds::WindResult<()> {
//! let gmf = GmfReader::read_table("gmf/qscat.dat", TableLayout::OldStyle)?;
//! let kp = KpModel::default();
//! let retriever = WindRetriever::new(&gmf, &kp, RetrievalConfig::default())?;
//! # let measurements = seawinds::MeasurementList::new();
//! let wvc = retriever.retrieve(RetrievalStrategy::S3, &measurements, None)?;
//! for ambiguity in &wvc.ambiguities {
//!     println!("{:.2} m/s at {:.1} deg", ambiguity.speed, ambiguity.direction.to_degrees());
//! }
//! # Ok(())
//! # }
//! ```

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    Look, MeasType, Measurement, MeasurementList, WindError, WindResult, WindVector, WindVectorPlus,
    Wvc,
};

pub use io::{GmfReader, TableLayout};

pub use crate::core::{
    DirectionRange, GmfTable, KpModel, RetrievalConfig, RetrievalStrategy, VarianceModel,
    WindRetriever, WvcInput,
};
