//! I/O modules for GMF table files

pub mod gmf_reader;

pub use gmf_reader::{GmfReader, TableLayout};
