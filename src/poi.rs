//! Candidate POI Generator (C4, spec.md §4.4): given a selected direction,
//! builds the day's activity pool from signature examples, type-matched
//! POIs, and region-matched POIs, gated by the direction's corridor and
//! cached by direction fingerprint.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::cache::{poi_cache_key, poi_cache_ttl, TieredCache};
use crate::config::CacheConfig;
use crate::model::{GeoPoint, Place, RiskLevel, RouteDirection, SignaturePois};
use crate::observability::Trace;
use crate::traits::PlaceStore;

const RECOMMENDED_CAP: usize = 50;
const OPTIONAL_CAP: usize = 30;
const DEFAULT_BUFFER_METERS: f64 = 50_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoiPriority {
    Core,
    Recommended,
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndoorOutdoor {
    Indoor,
    Outdoor,
    Mixed,
}

/// A place projected into an activity the POI pool can offer the solver
/// (spec.md §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateActivity {
    pub uuid: Uuid,
    pub name: String,
    pub geo: GeoPoint,
    pub canonical_type: Option<String>,
    pub duration_min: i32,
    pub risk_level: RiskLevel,
    pub weather_sensitivity: u8,
    pub indoor_outdoor: IndoorOutdoor,
    pub intent_tags: Vec<String>,
    pub quality_score: f64,
    pub must_see: bool,
    pub priority: PoiPriority,
}

fn type_category(canonical_type: Option<&str>) -> &'static str {
    match canonical_type {
        Some(t) if t.eq_ignore_ascii_case("nature") || t.contains("park") || t.contains("trail") => "nature",
        Some(t) if t.eq_ignore_ascii_case("museum") || t.contains("museum") || t.contains("gallery") => "museum",
        Some(t) if t.eq_ignore_ascii_case("food") || t.contains("restaurant") || t.contains("cafe") => "food",
        _ => "other",
    }
}

fn duration_for(category: &str) -> i32 {
    match category {
        "nature" => 120,
        "museum" => 90,
        "food" => 60,
        _ => 60,
    }
}

fn weather_sensitivity_for(category: &str) -> u8 {
    match category {
        "nature" => 3,
        "museum" => 0,
        _ => 2,
    }
}

fn indoor_outdoor_for(category: &str) -> IndoorOutdoor {
    match category {
        "nature" => IndoorOutdoor::Outdoor,
        "museum" | "food" => IndoorOutdoor::Indoor,
        _ => IndoorOutdoor::Mixed,
    }
}

fn risk_level_for(elevation_m: Option<f64>) -> RiskLevel {
    match elevation_m {
        Some(m) if m > 4000.0 => RiskLevel::High,
        Some(m) if m > 3000.0 => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

fn intent_tags_for(category: &str, canonical_type: Option<&str>) -> Vec<String> {
    let mut tags = Vec::new();
    if let Some(t) = canonical_type {
        tags.push(t.to_string());
    }
    match category {
        "nature" => tags.push("outdoor".to_string()),
        "museum" => tags.push("culture".to_string()),
        "food" => tags.push("food".to_string()),
        _ => {}
    }
    tags
}

fn project(place: &Place, priority: PoiPriority) -> CandidateActivity {
    let canonical_type = place.metadata.canonical_type.clone();
    let category = type_category(canonical_type.as_deref());
    CandidateActivity {
        uuid: place.uuid,
        name: place.name.clone(),
        geo: place.geo,
        canonical_type: canonical_type.clone(),
        duration_min: duration_for(category),
        risk_level: risk_level_for(place.elevation_m),
        weather_sensitivity: weather_sensitivity_for(category),
        indoor_outdoor: indoor_outdoor_for(category),
        intent_tags: intent_tags_for(category, canonical_type.as_deref()),
        quality_score: place.rating.map(|r| r / 5.0).unwrap_or(0.5),
        must_see: priority == PoiPriority::Core,
        priority,
    }
}

fn signature_pois_to_value(signature_pois: &SignaturePois) -> Value {
    json!({
        "types": signature_pois.types,
        "examples": signature_pois.examples.iter().map(|u| u.to_string()).collect::<Vec<_>>(),
    })
}

/// Runs the three-pass POI generation procedure of spec.md §4.4, caching
/// the dedup'd result under `(directionId, bufferMeters, signaturePois)`.
pub async fn generate_candidates(
    direction: &RouteDirection,
    regions: Option<&[String]>,
    buffer_meters: Option<f64>,
    place_store: &dyn PlaceStore,
    poi_cache: &TieredCache<'_>,
    cache_config: &CacheConfig,
    trace: &mut Trace,
) -> Vec<CandidateActivity> {
    let buffer_meters = buffer_meters.unwrap_or(DEFAULT_BUFFER_METERS);
    let signature_value = signature_pois_to_value(&direction.signature_pois);
    let cache_key = poi_cache_key(&direction.id, buffer_meters, &signature_value);

    if let Some(hit) = poi_cache.get::<Vec<CandidateActivity>>(&cache_key).await {
        trace.pool_evolution.final_size = Some(hit.len());
        trace.pool_evolution.filters.push("cache_hit".to_string());
        return hit;
    }

    let mut ordered: Vec<(Uuid, CandidateActivity)> = Vec::new();
    let mut seen: std::collections::HashSet<Uuid> = std::collections::HashSet::new();

    // Pass 1: signature examples, bypassing the corridor filter entirely.
    let signature_places = place_store.find_by_uuids(&direction.signature_pois.examples).await;
    for place in &signature_places {
        if seen.insert(place.uuid) {
            ordered.push((place.uuid, project(place, PoiPriority::Core)));
        }
    }
    trace.pool_evolution.initial = Some(ordered.len());

    // Pass 2: type-matched POIs, corridor- and region-gated, capped at 50.
    let recommended_places = place_store
        .find_by_type_and_corridor(
            &direction.signature_pois.types,
            regions,
            direction.corridor.as_ref(),
            buffer_meters,
            RECOMMENDED_CAP,
        )
        .await;
    // Projection (category lookup, duration/risk/tag derivation) is pure
    // per place, so the batch runs via rayon rather than serially; the
    // store calls above it are already async I/O and don't need this.
    let recommended_projected: Vec<(Uuid, CandidateActivity)> = recommended_places
        .par_iter()
        .take(RECOMMENDED_CAP)
        .map(|place| (place.uuid, project(place, PoiPriority::Recommended)))
        .collect();
    let mut recommended_added = 0usize;
    for (uuid, candidate) in recommended_projected {
        if seen.insert(uuid) {
            ordered.push((uuid, candidate));
            recommended_added += 1;
        }
    }
    trace.pool_evolution.after_rd_filter = Some(ordered.len());
    trace.pool_evolution.filters.push(format!(
        "type_and_corridor buffer_m={buffer_meters} added={recommended_added}"
    ));

    // Pass 3: only when no explicit region filter was supplied, region-matched
    // POIs over the direction's own regions, corridor-gated, capped at 30.
    if regions.is_none() {
        let optional_places = place_store
            .find_by_regions_and_corridor(&direction.regions, direction.corridor.as_ref(), buffer_meters, OPTIONAL_CAP)
            .await;
        let optional_projected: Vec<(Uuid, CandidateActivity)> = optional_places
            .par_iter()
            .take(OPTIONAL_CAP)
            .map(|place| (place.uuid, project(place, PoiPriority::Optional)))
            .collect();
        let mut optional_added = 0usize;
        for (uuid, candidate) in optional_projected {
            if seen.insert(uuid) {
                ordered.push((uuid, candidate));
                optional_added += 1;
            }
        }
        trace.pool_evolution.filters.push(format!("regions_and_corridor added={optional_added}"));
    }
    trace.pool_evolution.after_constraints = Some(ordered.len());

    let result: Vec<CandidateActivity> = ordered.into_iter().map(|(_, c)| c).collect();
    trace.pool_evolution.final_size = Some(result.len());

    let ttl = poi_cache_ttl(cache_config, &signature_value);
    poi_cache.set(&cache_key, &result, ttl).await;

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Corridor, DailyPace, DirectionStatus, HardConstraints, ItinerarySkeleton, Objectives, PlaceMetadata, RiskProfile, SoftConstraints};
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn place(uuid_byte: u8, name: &str, canonical_type: &str, rating: Option<f64>) -> Place {
        Place {
            uuid: Uuid::from_bytes([uuid_byte; 16]),
            name: name.to_string(),
            geo: GeoPoint::new(10.0, 106.0),
            metadata: PlaceMetadata {
                canonical_type: Some(canonical_type.to_string()),
                region_key: Some("central".to_string()),
            },
            rating,
            elevation_m: None,
        }
    }

    struct FakeStore {
        by_uuid: Vec<Place>,
        by_type: Vec<Place>,
        by_region: Vec<Place>,
    }

    #[async_trait]
    impl PlaceStore for FakeStore {
        async fn find_by_uuids(&self, uuids: &[Uuid]) -> Vec<Place> {
            self.by_uuid.iter().filter(|p| uuids.contains(&p.uuid)).cloned().collect()
        }

        async fn find_by_type_and_corridor(
            &self,
            _types: &[String],
            _regions: Option<&[String]>,
            _corridor: Option<&Corridor>,
            _buffer_meters: f64,
            limit: usize,
        ) -> Vec<Place> {
            self.by_type.iter().take(limit).cloned().collect()
        }

        async fn find_by_regions_and_corridor(
            &self,
            _regions: &[String],
            _corridor: Option<&Corridor>,
            _buffer_meters: f64,
            limit: usize,
        ) -> Vec<Place> {
            self.by_region.iter().take(limit).cloned().collect()
        }
    }

    fn direction_with_signature(examples: Vec<Uuid>) -> RouteDirection {
        RouteDirection {
            id: "rd-1".to_string(),
            uuid: Uuid::from_bytes([9; 16]),
            country_code: "VN".to_string(),
            name: "Central Highlands Loop".to_string(),
            name_cn: None,
            name_en: None,
            tags: Default::default(),
            regions: vec!["central".to_string()],
            entry_hubs: vec![],
            best_months: Default::default(),
            avoid_months: Default::default(),
            hard: HardConstraints::default(),
            soft: SoftConstraints::default(),
            objectives: Objectives::default(),
            risk_profile: RiskProfile::default(),
            signature_pois: SignaturePois {
                types: vec!["museum".to_string()],
                examples,
                weights: HashMap::new(),
            },
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

    struct NoopBackend;

    #[async_trait]
    impl crate::traits::CacheBackend for NoopBackend {
        async fn get(&self, _key: &str) -> Result<Option<Value>, String> {
            Ok(None)
        }
        async fn set(&self, _key: &str, _value: Value, _ttl_sec: u64) -> Result<(), String> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn signature_examples_bypass_corridor_and_rank_core() {
        let sig_uuid = Uuid::from_bytes([1; 16]);
        let store = FakeStore {
            by_uuid: vec![place(1, "Signature Temple", "museum", Some(4.5))],
            by_type: vec![place(2, "Type Museum", "museum", Some(4.0))],
            by_region: vec![],
        };
        let direction = direction_with_signature(vec![sig_uuid]);
        let backend = NoopBackend;
        let cache = TieredCache::new(&backend, "poi");
        let config = CacheConfig::default();
        let mut trace = Trace::open("r1");

        let candidates = generate_candidates(&direction, None, None, &store, &cache, &config, &mut trace).await;
        let core = candidates.iter().find(|c| c.uuid == sig_uuid).unwrap();
        assert_eq!(core.priority, PoiPriority::Core);
        assert!(core.must_see);
    }

    #[tokio::test]
    async fn dedups_by_uuid_across_passes() {
        let shared = Uuid::from_bytes([3; 16]);
        let store = FakeStore {
            by_uuid: vec![place(3, "Shared Place", "museum", None)],
            by_type: vec![place(3, "Shared Place", "museum", None)],
            by_region: vec![place(3, "Shared Place", "museum", None)],
        };
        let direction = direction_with_signature(vec![shared]);
        let backend = NoopBackend;
        let cache = TieredCache::new(&backend, "poi");
        let config = CacheConfig::default();
        let mut trace = Trace::open("r1");

        let candidates = generate_candidates(&direction, None, None, &store, &cache, &config, &mut trace).await;
        assert_eq!(candidates.iter().filter(|c| c.uuid == shared).count(), 1);
    }

    #[tokio::test]
    async fn region_pass_skipped_when_region_filter_supplied() {
        let store = FakeStore {
            by_uuid: vec![],
            by_type: vec![],
            by_region: vec![place(5, "Region Only Place", "other", None)],
        };
        let direction = direction_with_signature(vec![]);
        let backend = NoopBackend;
        let cache = TieredCache::new(&backend, "poi");
        let config = CacheConfig::default();
        let mut trace = Trace::open("r1");

        let regions = vec!["central".to_string()];
        let candidates = generate_candidates(&direction, Some(&regions), None, &store, &cache, &config, &mut trace).await;
        assert!(candidates.is_empty());
    }

    #[test]
    fn nature_projection_matches_spec_defaults() {
        let p = place(7, "Waterfall Trail", "nature", None);
        let candidate = project(&p, PoiPriority::Recommended);
        assert_eq!(candidate.duration_min, 120);
        assert_eq!(candidate.weather_sensitivity, 3);
        assert_eq!(candidate.indoor_outdoor, IndoorOutdoor::Outdoor);
        assert_eq!(candidate.quality_score, 0.5);
    }

    #[test]
    fn high_elevation_place_is_high_risk() {
        let mut p = place(8, "High Pass", "nature", None);
        p.elevation_m = Some(4500.0);
        let candidate = project(&p, PoiPriority::Recommended);
        assert_eq!(candidate.risk_level, RiskLevel::High);
    }
}
