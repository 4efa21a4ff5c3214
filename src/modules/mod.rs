//! Modules layer - infrastructure the features build on
//!
//! Currently the local filesystem storage used by the files feature.

pub mod storage;
