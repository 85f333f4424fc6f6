//! Simulator for the kinship editing core
//!
//! Drives [`kin_core::ProfileEditor`] against in-memory collaborators:
//! - [`race`]: concurrent writers on one record, checking version
//!   monotonicity and conflict exclusivity
//! - [`media`]: media commits with injected link and delete failures,
//!   checking that no object is ever left untracked

#![allow(missing_docs)]

pub mod media;
pub mod race;

pub use media::{run_media, MediaConfig, MediaReport};
pub use race::{run_race, RaceConfig, RaceReport};
