//! External collaborator interfaces (spec.md §6).
//!
//! This is the boundary the core depends on: a place store, a direction
//! store, a travel-time provider, and a cache backend. Concrete apps wire
//! real implementations (relational/spatial store, OSRM, Redis, ...); the
//! core only ever sees these traits. Each call that crosses one of these
//! traits is a suspension point per spec.md §5, hence `async_trait` rather
//! than the teacher's original synchronous domain traits.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::model::{Corridor, GeoPoint, Place, RouteDirection};

/// Mode of travel, used by [`TravelTimeProvider::duration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TravelTimeMode {
    Walk,
    Drive,
    Transit,
}

/// `findByUUIDs` / `findByTypeAndCorridor` / `findByRegionsAndCorridor`
/// (spec.md §6).
#[async_trait]
pub trait PlaceStore: Send + Sync {
    async fn find_by_uuids(&self, uuids: &[Uuid]) -> Vec<Place>;

    async fn find_by_type_and_corridor(
        &self,
        types: &[String],
        regions: Option<&[String]>,
        corridor: Option<&Corridor>,
        buffer_meters: f64,
        limit: usize,
    ) -> Vec<Place>;

    async fn find_by_regions_and_corridor(
        &self,
        regions: &[String],
        corridor: Option<&Corridor>,
        buffer_meters: f64,
        limit: usize,
    ) -> Vec<Place>;
}

/// Query parameters for [`DirectionStore::find_by_country`].
#[derive(Debug, Clone, Default)]
pub struct DirectionQuery {
    pub tags: Vec<String>,
    pub limit: Option<usize>,
    pub include_deprecated: bool,
}

#[async_trait]
pub trait DirectionStore: Send + Sync {
    async fn find_by_country(
        &self,
        country_code: &str,
        query: &DirectionQuery,
    ) -> Vec<RouteDirection>;
}

/// `duration(from, to, mode) -> minutes`; may fail (spec.md §6, §4.1).
#[async_trait]
pub trait TravelTimeProvider: Send + Sync {
    async fn duration(
        &self,
        from: GeoPoint,
        to: GeoPoint,
        mode: TravelTimeMode,
    ) -> Result<f64, String>;
}

/// `get(key) -> value | nil`, `set(key, value, ttlSec)` (spec.md §6, §4.7).
/// Errors are surfaced to the caller but never fatal: a failure is treated
/// as a miss on read and a no-op on write, per spec.md §7.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, String>;
    async fn set(&self, key: &str, value: Value, ttl_sec: u64) -> Result<(), String>;
}
