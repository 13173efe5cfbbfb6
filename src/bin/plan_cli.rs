//! Minimal externally-invokable smoke-test surface for `plan_day` (C9).
//!
//! Wires a small in-memory [`PlaceStore`]/[`DirectionStore`] around a
//! Hanoi sample so `cargo run --bin plan_cli -- 21.03 105.85` produces a
//! real itinerary without any external services configured. Point
//! `DAYTRIP_OSRM_URL` at a live OSRM deployment to use real travel times;
//! otherwise every pair falls back to the haversine estimate (spec.md
//! §4.1).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use daytrip_planner::config::Pacing;
use daytrip_planner::context::AppContext;
use daytrip_planner::direction::{UserIdentity, UserIntent};
use daytrip_planner::geo::within_corridor;
use daytrip_planner::model::{
    Corridor, DailyPace, DirectionStatus, GeoPoint, HardConstraints, ItinerarySkeleton, Objectives, Place,
    PlaceMetadata, RiskProfile, RouteDirection, SignaturePois, SoftConstraints,
};
use daytrip_planner::osrm::{OsrmConfig, OsrmTravelTimeProvider};
use daytrip_planner::pipeline::{plan_day, PlanRequest};
use daytrip_planner::traits::{CacheBackend, DirectionQuery, DirectionStore, PlaceStore, TravelTimeMode, TravelTimeProvider};

struct SamplePlaceStore(Vec<Place>);

impl SamplePlaceStore {
    /// Applies the §4.4 "distance ≤ bufferMeters" gate when a corridor is
    /// given; a direction with no corridor has no spatial filter to apply.
    fn in_corridor<'a>(&'a self, corridor: Option<&'a Corridor>) -> impl Iterator<Item = &'a Place> {
        self.0
            .iter()
            .filter(move |p| corridor.is_none_or(|c| within_corridor(p.geo, c)))
    }
}

#[async_trait]
impl PlaceStore for SamplePlaceStore {
    async fn find_by_uuids(&self, uuids: &[Uuid]) -> Vec<Place> {
        self.0.iter().filter(|p| uuids.contains(&p.uuid)).cloned().collect()
    }

    async fn find_by_type_and_corridor(
        &self,
        _types: &[String],
        _regions: Option<&[String]>,
        corridor: Option<&Corridor>,
        _buffer_meters: f64,
        limit: usize,
    ) -> Vec<Place> {
        self.in_corridor(corridor).take(limit).cloned().collect()
    }

    async fn find_by_regions_and_corridor(
        &self,
        _regions: &[String],
        corridor: Option<&Corridor>,
        _buffer_meters: f64,
        limit: usize,
    ) -> Vec<Place> {
        self.in_corridor(corridor).take(limit).cloned().collect()
    }
}

struct SampleDirectionStore(Vec<RouteDirection>);

#[async_trait]
impl DirectionStore for SampleDirectionStore {
    async fn find_by_country(&self, country_code: &str, _query: &DirectionQuery) -> Vec<RouteDirection> {
        self.0.iter().filter(|d| d.country_code == country_code).cloned().collect()
    }
}

struct NoopCache;

#[async_trait]
impl CacheBackend for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<Value>, String> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Value, _ttl_sec: u64) -> Result<(), String> {
        Ok(())
    }
}

struct HaversineOnlyProvider;

#[async_trait]
impl TravelTimeProvider for HaversineOnlyProvider {
    async fn duration(&self, _from: GeoPoint, _to: GeoPoint, _mode: TravelTimeMode) -> Result<f64, String> {
        Err("no OSRM configured; matrix builder falls back to haversine".to_string())
    }
}

fn place(name: &str, lat: f64, lng: f64, canonical_type: &str) -> Place {
    Place {
        uuid: Uuid::new_v4(),
        name: name.to_string(),
        geo: GeoPoint::new(lat, lng),
        metadata: PlaceMetadata {
            canonical_type: Some(canonical_type.to_string()),
            region_key: Some("hanoi".to_string()),
        },
        rating: Some(4.5),
        elevation_m: None,
    }
}

fn sample_places() -> Vec<Place> {
    vec![
        place("Hoan Kiem Lake", 21.0285, 105.8524, "landmark"),
        place("Temple of Literature", 21.0277, 105.8355, "landmark"),
        place("Dong Xuan Market", 21.0361, 105.8497, "market"),
        place("Bun Cha Huong Lien", 21.0212, 105.8480, "restaurant"),
        place("Tran Quoc Pagoda", 21.0473, 105.8390, "landmark"),
    ]
}

fn hanoi_direction() -> RouteDirection {
    RouteDirection {
        id: "hanoi-old-quarter".to_string(),
        uuid: Uuid::new_v4(),
        country_code: "VN".to_string(),
        name: "Hanoi Old Quarter".to_string(),
        name_cn: None,
        name_en: Some("Hanoi Old Quarter".to_string()),
        tags: ["culture".to_string(), "food".to_string()].into_iter().collect(),
        regions: vec!["hanoi".to_string()],
        entry_hubs: vec!["Noi Bai International Airport".to_string()],
        best_months: Default::default(),
        avoid_months: Default::default(),
        hard: HardConstraints::default(),
        soft: SoftConstraints::default(),
        objectives: Objectives::default(),
        risk_profile: RiskProfile::default(),
        signature_pois: SignaturePois::default(),
        itinerary_skeleton: ItinerarySkeleton {
            daily_pace: Some(DailyPace::Moderate),
            ..Default::default()
        },
        corridor: None,
        status: DirectionStatus::Active,
        version: 1,
        rollout_percent: 100,
        audience_filter: None,
        extensions: Default::default(),
    }
}

fn parse_lat_lng(args: &[String]) -> (f64, f64) {
    let lat = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(21.0285);
    let lng = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(105.8524);
    (lat, lng)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (lat, lng) = parse_lat_lng(&args);

    let travel_time_provider: Arc<dyn TravelTimeProvider> = match std::env::var("DAYTRIP_OSRM_URL") {
        Ok(base_url) => {
            let config = OsrmConfig {
                base_url,
                ..OsrmConfig::default()
            };
            match OsrmTravelTimeProvider::new(config) {
                Ok(provider) => Arc::new(provider),
                Err(err) => {
                    tracing::warn!(%err, "failed to build OSRM client, falling back to haversine");
                    Arc::new(HaversineOnlyProvider)
                }
            }
        }
        Err(_) => Arc::new(HaversineOnlyProvider),
    };

    let ctx = AppContext::new(
        Arc::new(SamplePlaceStore(sample_places())),
        Arc::new(SampleDirectionStore(vec![hanoi_direction()])),
        travel_time_provider,
        Arc::new(NoopCache),
        Arc::new(NoopCache),
    );

    let request = PlanRequest {
        request_id: Uuid::new_v4().to_string(),
        at: GeoPoint::new(lat, lng),
        month: None,
        intent: UserIntent {
            preferences: vec!["culture".to_string(), "food".to_string()],
            pace: Some("moderate".to_string()),
            risk_tolerance: Some("low".to_string()),
            duration_days: 1,
        },
        identity: UserIdentity::default(),
        regions: None,
        buffer_meters: None,
        day_start_sec: 8 * 3600,
        day_end_sec: 20 * 3600,
        pacing: Pacing::Normal,
        deadline: None,
    };

    let response = plan_day(&request, &ctx).await;

    let output = serde_json::json!({
        "plan": response.plan,
        "optimizationResult": response.result,
        "decisionLog": response.decision_log,
    });
    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{json}"),
        Err(err) => tracing::error!(%err, "failed to serialize result"),
    }
}
