//! Core data model shared by every component (spec.md §3).
//!
//! These are explicit, tagged structs rather than JSON blobs — the
//! "heterogeneous records" redesign flag in spec.md §9. Each record keeps a
//! `extensions` bag so serde round-trips fields this crate doesn't know
//! about.

use std::collections::{BTreeSet, HashMap};

use chrono::{NaiveTime, Timelike};
use geo::{LineString, MultiLineString, Polygon};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A WGS84 decimal-degree point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn as_tuple(self) -> (f64, f64) {
        (self.lat, self.lng)
    }
}

impl From<GeoPoint> for geo_types::Point<f64> {
    fn from(p: GeoPoint) -> Self {
        geo_types::Point::new(p.lng, p.lat)
    }
}

/// Optional corridor geometry attached to a [`RouteDirection`].
#[derive(Debug, Clone)]
pub enum CorridorGeometry {
    LineString(LineString<f64>),
    MultiLineString(MultiLineString<f64>),
    Polygon(Polygon<f64>),
}

#[derive(Debug, Clone)]
pub struct Corridor {
    pub geometry: CorridorGeometry,
    pub buffer_meters: f64,
}

/// Lifecycle status of a [`RouteDirection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionStatus {
    Draft,
    Active,
    Deprecated,
}

#[derive(Debug, Clone, Default)]
pub struct HardConstraints {
    pub max_daily_rapid_ascent_m: Option<f64>,
    pub max_slope_pct: Option<f64>,
    pub requires_permit: bool,
    pub requires_guide: bool,
    pub rapid_ascent_forbidden: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SoftConstraints {
    pub max_daily_ascent_m: Option<f64>,
    pub max_elevation_m: Option<f64>,
    pub buffer_time_min: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Objectives {
    pub weight_map: HashMap<String, f64>,
}

#[derive(Debug, Clone, Default)]
pub struct RiskProfile {
    pub altitude_sickness: bool,
    pub road_closure: bool,
    pub ferry_dependent: bool,
    pub weather_window: bool,
    pub weather_window_months: BTreeSet<u8>,
}

impl RiskProfile {
    /// spec.md §4.5: `hasHighRisk := altitudeSickness \/ roadClosure`.
    pub fn has_high_risk(&self) -> bool {
        self.altitude_sickness || self.road_closure
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignaturePois {
    pub types: Vec<String>,
    pub examples: Vec<Uuid>,
    pub weights: HashMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyPace {
    Light,
    Moderate,
    Intense,
}

#[derive(Debug, Clone, Default)]
pub struct ItinerarySkeleton {
    pub day_themes: Vec<String>,
    pub daily_pace: Option<DailyPace>,
    pub rest_days_required: Vec<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct AudienceFilter {
    pub persona: BTreeSet<String>,
    pub locale: BTreeSet<String>,
}

/// The country-scoped route template ranked by the direction selector (C5).
#[derive(Debug, Clone)]
pub struct RouteDirection {
    pub id: String,
    pub uuid: Uuid,
    pub country_code: String,
    pub name: String,
    pub name_cn: Option<String>,
    pub name_en: Option<String>,

    pub tags: BTreeSet<String>,
    pub regions: Vec<String>,
    pub entry_hubs: Vec<String>,

    pub best_months: BTreeSet<u8>,
    pub avoid_months: BTreeSet<u8>,

    pub hard: HardConstraints,
    pub soft: SoftConstraints,
    pub objectives: Objectives,

    pub risk_profile: RiskProfile,
    pub signature_pois: SignaturePois,
    pub itinerary_skeleton: ItinerarySkeleton,

    pub corridor: Option<Corridor>,

    pub status: DirectionStatus,
    pub version: u32,
    pub rollout_percent: u8,
    pub audience_filter: Option<AudienceFilter>,

    pub extensions: Map<String, Value>,
}

impl RouteDirection {
    /// `bestMonths ∩ avoidMonths = ∅` (spec.md §3 invariant).
    pub fn seasons_disjoint(&self) -> bool {
        self.best_months.is_disjoint(&self.avoid_months)
    }

    pub fn is_selectable(&self) -> bool {
        self.status == DirectionStatus::Active
    }
}

/// A node type the solver may visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanNodeType {
    Poi,
    Restaurant,
    Hotel,
    Break,
    Virtual,
}

#[derive(Debug, Clone, Default)]
pub struct PlanNodeMeta {
    pub region_id: Option<String>,
    pub tags: Vec<String>,
    pub origin_id: Option<String>,
    pub disjunction_group_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PlanNodeConstraints {
    pub is_hard_node: bool,
    pub priority_level: u8,
    pub drop_penalty: Option<f64>,
    pub reward: Option<f64>,
}

/// `[open, close]` in day-local seconds-from-midnight.
pub type TimeWindow = (i32, i32);

#[derive(Debug, Clone)]
pub struct PlanNode {
    pub id: String,
    pub name: String,
    pub node_type: PlanNodeType,
    pub geo: GeoPoint,
    pub service_duration_min: i32,
    /// Ordered, non-overlapping `[open, close]` windows.
    pub time_windows: Vec<TimeWindow>,
    pub constraints: PlanNodeConstraints,
    pub meta: PlanNodeMeta,
}

impl PlanNode {
    /// Invariant (spec.md §3): a virtual node's `disjunctionGroupId` equals
    /// its origin's id.
    pub fn is_virtual(&self) -> bool {
        self.meta
            .origin_id
            .as_ref()
            .is_some_and(|origin| origin != &self.id)
    }

    pub fn effective_priority(&self) -> u8 {
        if self.constraints.priority_level == 0 {
            5
        } else {
            self.constraints.priority_level
        }
    }

    pub fn drop_penalty(&self) -> f64 {
        self.constraints
            .drop_penalty
            .unwrap_or_else(|| 1000.0 * (6.0 - self.effective_priority() as f64))
    }
}

/// Per-pair component breakdown of the robust time matrix (spec.md §4.1).
#[derive(Debug, Clone, Default)]
pub struct MatrixComponents {
    pub api: Vec<Vec<f64>>,
    pub buffer: Vec<Vec<f64>>,
    pub fixed: Vec<Vec<f64>>,
    pub switch: Vec<Vec<f64>>,
    pub cross_region: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct MatrixPolicySnapshot {
    pub buffer_factor: f64,
    pub fixed_buffer_min: f64,
}

/// `RobustTimeMatrix` (spec.md §3): inflated N×N travel-time minutes plus
/// each contributing component, so the solver can compare ideal vs robust
/// time.
#[derive(Debug, Clone)]
pub struct RobustTimeMatrix {
    pub unit_minute: bool,
    pub matrix: Vec<Vec<f64>>,
    pub ideal: Vec<Vec<f64>>,
    pub policy: MatrixPolicySnapshot,
    pub components: MatrixComponents,
}

impl RobustTimeMatrix {
    pub fn len(&self) -> usize {
        self.matrix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }
}

/// Metadata carried by a [`Place`] as stored externally.
#[derive(Debug, Clone, Default)]
pub struct PlaceMetadata {
    pub canonical_type: Option<String>,
    pub region_key: Option<String>,
}

/// A point-of-interest record as returned by the external place store
/// (spec.md §6). The core never mutates these.
#[derive(Debug, Clone)]
pub struct Place {
    pub uuid: Uuid,
    pub name: String,
    pub geo: GeoPoint,
    pub metadata: PlaceMetadata,
    pub rating: Option<f64>,
    pub elevation_m: Option<f64>,
}

/// An entry in the solver's output route (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteNode {
    pub seq: u32,
    pub node_id: String,
    pub origin_id: Option<String>,
    pub name: String,
    pub arrival: i32,
    pub start_service: i32,
    pub end_service: i32,
    pub wait_min: i32,
    pub travel_min_from_prev: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelineEventType {
    Node,
    Wait,
    Lunch,
    Travel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub event_type: TimelineEventType,
    pub start: i32,
    pub end: i32,
    pub duration_min: i32,
    pub description: String,
    pub node_id: Option<String>,
}

/// Typed reason a node was dropped (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReasonCode {
    TimeWindowConflict,
    InsufficientTotalTime,
    ClosedDay,
    HighWaitTime,
    LowPriorityNotWorth,
    HardNodeProtection,
    RobustTimeInfeasible,
    EarlyDepartureConflict,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DropExplanation {
    pub text: String,
    pub facts: HashMap<String, Value>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroppedNode {
    pub node_id: String,
    pub name: String,
    pub reason_code: DropReasonCode,
    pub penalty: f64,
    pub explanation: DropExplanation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    Feasible,
    Optimal,
    Infeasible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total_travel_min: i32,
    pub total_wait_min: i32,
    pub total_service_min: i32,
    pub robustness_score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub critical_windows: Vec<String>,
    pub assumptions_buffer_factor: f64,
    pub assumptions_fixed_buffer_min: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Robustness {
    pub total_buffer_minutes: i32,
    pub total_wait_minutes: i32,
    pub top3_min_slack_nodes: Vec<String>,
    pub risk_level: Option<RiskLevel>,
}

/// `OptimizationResult` (spec.md §3): the solver's full output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub status: SolveStatus,
    pub summary: Summary,
    pub route: Vec<RouteNode>,
    pub timeline: Vec<TimelineEvent>,
    pub dropped: Vec<DroppedNode>,
    pub diagnostics: Diagnostics,
    pub robustness: Robustness,
}

pub use crate::observability::Trace;

/// Convenience conversion from a `NaiveTime` to day-local seconds.
pub fn time_to_seconds(time: NaiveTime) -> i32 {
    time.num_seconds_from_midnight() as i32
}

pub fn seconds_to_time(seconds: i32) -> NaiveTime {
    let seconds = seconds.rem_euclid(24 * 3600);
    NaiveTime::from_num_seconds_from_midnight_opt(seconds as u32, 0).unwrap_or_default()
}
