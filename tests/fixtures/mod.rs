//! Test fixtures for daytrip-planner.
//!
//! Provides realistic test data including:
//! - Real Hanoi / Ha Long / Hoi An locations (from OpenStreetMap)
//! - Builders for plan nodes over that seed data

pub mod vietnam_locations;

pub use vietnam_locations::*;
