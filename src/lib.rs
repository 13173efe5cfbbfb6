//! daytrip-planner core
//!
//! A constraint-aware single-day itinerary planner: a route-direction
//! selector (C5), a candidate POI generator (C4), a robust travel-time
//! matrix builder (C1), a single-day VRPTW solver (C3), a drop-reason
//! explanation generator (C2), a country-adapter data-source router (C6),
//! a two-tier TTL cache (C7), and a trace/metrics observability layer
//! (C8), orchestrated end to end by the planning pipeline (C9).

pub mod cache;
pub mod config;
pub mod context;
pub mod direction;
pub mod error;
pub mod explain;
pub mod geo;
pub mod hashing;
pub mod matrix;
pub mod model;
pub mod observability;
pub mod osrm;
pub mod pipeline;
pub mod poi;
pub mod router;
pub mod solver;
pub mod traits;
