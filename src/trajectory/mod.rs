//! Logged trajectories and the store every accumulator keeps them in.
//!
//! This module provides:
//! - [`types::Example`] -- one ingested trajectory (count, ratios, rewards).
//! - [`types::UpperBound`] / [`types::FakeWeight`] -- weight bounds with an
//!   explicit unbounded state.
//! - [`store::TrajectoryStore`] -- the append-only store with running bounds,
//!   and the [`store::Accumulator`] trait implemented by its owners.
//! - [`log::TrajectoryLog`] -- raw logged records with JSON persistence.

pub mod log;
pub mod store;
pub mod types;

pub use log::{golden_scenario, TrajectoryLog};
pub use store::{Accumulator, TrajectoryStore};
pub use types::{Example, FakeWeight, LoggedTrajectory, UpperBound};
