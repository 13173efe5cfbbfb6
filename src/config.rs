//! Configuration structs.
//!
//! Per the redesign flags in spec.md §9, every "dynamic option map" in the
//! source system (transport policy, objective weights, pacing presets)
//! becomes an enumerated-field config struct here instead of a string-keyed
//! map, so unknown keys can't silently no-op.

use std::collections::HashMap;

/// Mode of travel between two nodes, inferred by [`crate::matrix::mode_of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TravelMode {
    Walk,
    Metro,
    Drive,
}

/// Robust-time-matrix inflation policy (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct TransportPolicy {
    /// Multiplicative buffer applied to the raw API duration (`alpha`).
    pub buffer_factor: f64,
    /// Fixed additive buffer in minutes (`beta`).
    pub fixed_buffer_min: f64,
    /// Penalty in minutes applied whenever the two endpoints sit in
    /// different regions.
    pub cross_region_cost_min: f64,
    /// Penalty in minutes for switching travel mode between consecutive
    /// nodes, keyed by `(from_mode, to_mode)`.
    pub switch_cost_min: HashMap<(TravelMode, TravelMode), f64>,
}

impl Default for TransportPolicy {
    fn default() -> Self {
        Self {
            buffer_factor: 1.2,
            fixed_buffer_min: 15.0,
            cross_region_cost_min: 8.0,
            switch_cost_min: HashMap::new(),
        }
    }
}

impl TransportPolicy {
    /// Projects a pacing preset's `(buffer_factor, fixed_buffer_min)` onto
    /// this policy, keeping its cross-region and switch-cost tables (spec.md
    /// §4.3 step 1: "apply a pacing preset to any unspecified policy
    /// fields").
    pub fn with_pacing(&self, pacing: Pacing) -> Self {
        let preset = pacing.preset();
        Self {
            buffer_factor: preset.buffer_factor,
            fixed_buffer_min: preset.fixed_buffer_min,
            cross_region_cost_min: self.cross_region_cost_min,
            switch_cost_min: self.switch_cost_min.clone(),
        }
    }
}

/// Weighting of the solver's soft-node scoring function (spec.md §4.3 step 3
/// and §9).
#[derive(Debug, Clone, Copy)]
pub struct ObjectiveWeights {
    pub travel: f64,
    pub wait: f64,
    pub reward: f64,
    pub soft_cost: f64,
    pub drop_penalty: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            travel: 1.0,
            wait: 1.5,
            reward: 1.0,
            soft_cost: 1.0,
            drop_penalty: 1.0,
        }
    }
}

/// Pace preset fixing `(buffer_factor, fixed_buffer_min, wait_weight)`
/// triples, applied to any unspecified policy field (spec.md §4.3 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    Relaxed,
    Normal,
    Intense,
}

#[derive(Debug, Clone, Copy)]
pub struct PacingPreset {
    pub buffer_factor: f64,
    pub fixed_buffer_min: f64,
    pub wait_weight: f64,
}

impl Pacing {
    pub fn preset(self) -> PacingPreset {
        match self {
            Pacing::Relaxed => PacingPreset {
                buffer_factor: 1.3,
                fixed_buffer_min: 20.0,
                wait_weight: 1.8,
            },
            Pacing::Normal => PacingPreset {
                buffer_factor: 1.2,
                fixed_buffer_min: 15.0,
                wait_weight: 1.5,
            },
            Pacing::Intense => PacingPreset {
                buffer_factor: 1.1,
                fixed_buffer_min: 10.0,
                wait_weight: 1.2,
            },
        }
    }
}

/// Lunch-break policy (spec.md §4.3 step 2).
#[derive(Debug, Clone)]
pub struct LunchPolicy {
    pub enabled: bool,
    /// `[window_start, window_end)` in seconds-from-midnight.
    pub window: (i32, i32),
    pub duration_min: i32,
}

impl Default for LunchPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            window: (11 * 3600 + 30 * 60, 13 * 3600 + 30 * 60),
            duration_min: 45,
        }
    }
}

/// Day-level lifestyle gates (spec.md §4.3 step 2, early-departure gate).
#[derive(Debug, Clone, Default)]
pub struct LifestylePolicy {
    /// Earliest permissible first-stop arrival, in seconds-from-midnight.
    pub earliest_first_stop: Option<i32>,
}

/// Two-tier cache TTL policy (spec.md §4.7).
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub direction_ttl_with_month_sec: u64,
    pub direction_ttl_without_month_sec: u64,
    pub poi_ttl_signature_sec: u64,
    pub poi_ttl_default_sec: u64,
    /// Bound on the number of completed traces retained in-memory (§3, §5).
    pub trace_store_cap: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            direction_ttl_with_month_sec: 6 * 3600,
            direction_ttl_without_month_sec: 3600,
            poi_ttl_signature_sec: 24 * 3600,
            poi_ttl_default_sec: 6 * 3600,
            trace_store_cap: 2048,
        }
    }
}

/// Timeout policy for external calls (spec.md §5).
#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    pub default_timeout_secs: u64,
    pub corridor_buffer_meters_default: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 12,
            corridor_buffer_meters_default: 50_000.0,
        }
    }
}
