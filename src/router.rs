//! Data-Source Router (C6, spec.md §4.6): dispatches weather, road,
//! transport-schedule, and ferry-schedule queries to country-specific
//! adapters registered at startup, picked by lowest `priority` among the
//! adapters whose `supportedCountries` covers the resolved country (or a
//! `"*"` wildcard adapter as last resort).
//!
//! Duck-typed adapters in the source system (spec.md §9 redesign flag)
//! become one explicit `DataSourceAdapter` trait per kind here, registered
//! in a process-wide, `dashmap`-backed registry (spec.md §5: adapters are
//! a shared, read-mostly resource; writes only happen at startup).

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::{PlannerError, PlannerResult};
use crate::model::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Weather,
    RoadStatus,
    TransportSchedule,
    FerrySchedule,
}

impl ServiceKind {
    fn label(self) -> &'static str {
        match self {
            ServiceKind::Weather => "weather",
            ServiceKind::RoadStatus => "roadStatus",
            ServiceKind::TransportSchedule => "transportSchedule",
            ServiceKind::FerrySchedule => "ferrySchedule",
        }
    }
}

pub const WILDCARD_COUNTRY: &str = "*";
pub const UNKNOWN_COUNTRY: &str = "UNKNOWN";

/// A query carries the coordinates the router reverse-geocodes to a
/// country code, plus a freeform payload the adapter interprets.
#[derive(Debug, Clone)]
pub struct RouteQuery {
    pub at: GeoPoint,
    pub params: Value,
}

/// One adapter registration: `{getX, supportedCountries, priority, name}`
/// (spec.md §4.6), made explicit as trait methods instead of a duck-typed
/// capability object.
#[async_trait]
pub trait DataSourceAdapter: Send + Sync {
    fn name(&self) -> &str;
    /// Country codes this adapter serves, or `["*"]` for a catch-all.
    fn supported_countries(&self) -> &[String];
    /// Lower priority value wins among adapters that both match.
    fn priority(&self) -> u32;
    async fn query(&self, query: &RouteQuery) -> Result<Value, String>;
}

/// Hard-coded bounding-box cascade for reverse geocoding (spec.md §9 open
/// question: "replace with a spatial lookup [in production]; preserve
/// the UNKNOWN sentinel for out-of-range points"). Boxes are `(min_lat,
/// max_lat, min_lng, max_lng, country_code)`; first match wins, which is
/// enough precision to route a query to the right country adapter without
/// a real spatial index.
const COUNTRY_BOUNDING_BOXES: &[(f64, f64, f64, f64, &str)] = &[
    (8.0, 23.4, 102.1, 109.5, "VN"),
    (5.6, 20.5, 97.3, 105.7, "TH"),
    (0.85, 20.3, 92.2, 101.2, "MM"),
    (10.4, 18.5, 104.0, 107.7, "LA"),
    (10.4, 14.7, 102.3, 107.6, "KH"),
    (4.5, 21.2, 116.9, 126.6, "PH"),
    (-11.0, 6.1, 95.0, 141.0, "ID"),
    (0.85, 7.4, 99.6, 119.3, "MY"),
];

/// Resolves a [`GeoPoint`] to a country code via the bounding-box
/// cascade; `"UNKNOWN"` when no box claims the point.
pub fn resolve_country(point: GeoPoint) -> String {
    COUNTRY_BOUNDING_BOXES
        .iter()
        .find(|(min_lat, max_lat, min_lng, max_lng, _)| {
            point.lat >= *min_lat && point.lat <= *max_lat && point.lng >= *min_lng && point.lng <= *max_lng
        })
        .map(|(.., code)| code.to_string())
        .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string())
}

/// Process-wide adapter registry plus a per-`(kind, country)` resolution
/// memo (spec.md §4.6: "Memoise the resolution ... for the process
/// lifetime").
pub struct DataSourceRouter {
    adapters: DashMap<ServiceKind, Vec<Arc<dyn DataSourceAdapter>>>,
    resolved: DashMap<(ServiceKind, String), Arc<dyn DataSourceAdapter>>,
}

impl DataSourceRouter {
    pub fn new() -> Self {
        Self {
            adapters: DashMap::new(),
            resolved: DashMap::new(),
        }
    }

    /// Registers an adapter under `kind`. Intended to run once at
    /// startup; the registry is read-mostly thereafter (spec.md §5).
    pub fn register(&self, kind: ServiceKind, adapter: Arc<dyn DataSourceAdapter>) {
        self.adapters.entry(kind).or_default().push(adapter);
    }

    fn resolve(&self, kind: ServiceKind, country_code: &str) -> Option<Arc<dyn DataSourceAdapter>> {
        let memo_key = (kind, country_code.to_string());
        if let Some(hit) = self.resolved.get(&memo_key) {
            return Some(hit.clone());
        }

        let candidates = self.adapters.get(&kind)?;
        let specific = candidates
            .iter()
            .filter(|a| a.supported_countries().iter().any(|c| c == country_code))
            .min_by_key(|a| a.priority())
            .cloned();
        let chosen = specific.or_else(|| {
            candidates
                .iter()
                .filter(|a| a.supported_countries().iter().any(|c| c == WILDCARD_COUNTRY))
                .min_by_key(|a| a.priority())
                .cloned()
        });

        if let Some(adapter) = &chosen {
            self.resolved.insert(memo_key, adapter.clone());
        }
        chosen
    }

    /// Dispatches `query` to the lowest-priority adapter covering
    /// `query.at`'s resolved country, falling back to a `"*"` adapter,
    /// and raising [`PlannerError::NoAdapter`] when neither exists
    /// (spec.md §4.6, §7).
    pub async fn dispatch(&self, kind: ServiceKind, query: &RouteQuery) -> PlannerResult<Value> {
        let country_code = resolve_country(query.at);
        let adapter = self.resolve(kind, &country_code).ok_or_else(|| PlannerError::NoAdapter {
            kind: kind.label().to_string(),
            country: country_code.clone(),
        })?;
        adapter
            .query(query)
            .await
            .map_err(PlannerError::Upstream)
    }

    pub async fn weather(&self, query: &RouteQuery) -> PlannerResult<Value> {
        self.dispatch(ServiceKind::Weather, query).await
    }

    pub async fn road_status(&self, query: &RouteQuery) -> PlannerResult<Value> {
        self.dispatch(ServiceKind::RoadStatus, query).await
    }

    pub async fn transport_schedule(&self, query: &RouteQuery) -> PlannerResult<Value> {
        self.dispatch(ServiceKind::TransportSchedule, query).await
    }

    pub async fn ferry_schedule(&self, query: &RouteQuery) -> PlannerResult<Value> {
        self.dispatch(ServiceKind::FerrySchedule, query).await
    }

    /// Fans out road, weather, and alert-style queries concurrently and
    /// waits for the slowest, per spec.md §5: "the overall latency is the
    /// max, not the sum." Missing adapters degrade to `None` for that leg
    /// rather than failing the whole assessment.
    pub async fn comprehensive_safety_assessment(&self, query: &RouteQuery) -> SafetyAssessment {
        let (road, weather, alerts) = tokio::join!(
            self.dispatch(ServiceKind::RoadStatus, query),
            self.dispatch(ServiceKind::Weather, query),
            self.dispatch(ServiceKind::FerrySchedule, query),
        );
        SafetyAssessment {
            road: road.ok(),
            weather: weather.ok(),
            ferry: alerts.ok(),
        }
    }
}

impl Default for DataSourceRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SafetyAssessment {
    pub road: Option<Value>,
    pub weather: Option<Value>,
    pub ferry: Option<Value>,
}
