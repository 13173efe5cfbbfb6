//! Planning Pipeline (C9, spec.md §4.9): orchestrates direction selection
//! (C5), candidate generation (C4), the robust time matrix (C1), and the
//! VRPTW solver (C3) end to end, opening and closing a [`Trace`] around the
//! whole run.

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use serde::{Deserialize, Serialize};

use crate::config::Pacing;
use crate::context::AppContext;
use crate::direction::{select_directions, MatchedSignals, RejectedDirection, ScoreBreakdown, SelectionOutcome, UserIdentity, UserIntent};
use crate::matrix::{build_fallback_matrix, build_robust_time_matrix, mode_of};
use crate::model::{OptimizationResult, PlanNode, PlanNodeConstraints, PlanNodeMeta, PlanNodeType, RobustTimeMatrix, RouteDirection, SolveStatus, TimeWindow};
use crate::observability::Trace;
use crate::poi::{generate_candidates, CandidateActivity, PoiPriority};
use crate::router::{resolve_country, RouteQuery};
use crate::solver::{solve, SolveRequest};
use crate::traits::TravelTimeMode;

/// Terrain facts a plan day carries regardless of whether the direction
/// names any elevation constraint at all (spec.md §4.9: "even when zero").
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TerrainFacts {
    pub max_elevation_m: f64,
    pub total_ascent_m: f64,
}

impl TerrainFacts {
    fn from_direction(direction: &RouteDirection) -> Self {
        Self {
            max_elevation_m: direction.soft.max_elevation_m.unwrap_or(0.0),
            total_ascent_m: direction.soft.max_daily_ascent_m.unwrap_or(0.0),
        }
    }
}

/// A single scheduled day, carrying the terrain facts derived from the
/// selected direction's constraints (spec.md §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDay {
    pub day_index: u32,
    pub terrain_facts: TerrainFacts,
}

/// `plan` in the `{plan, optimizationResult, decisionLog, trace}` tuple
/// `planDay` exposes (spec.md §6). This planner schedules a single day, so
/// `days` always holds exactly one entry once a direction was selected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    pub days: Vec<PlanDay>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedDirectionLog {
    pub id: String,
    pub name: String,
    pub score_breakdown: ScoreBreakdown,
    pub matched_signals: MatchedSignals,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternativeDirectionLog {
    pub id: String,
    pub score: f64,
}

/// `decisionLog.routeDirection` (spec.md §4.9): `selected.id`,
/// `scoreBreakdown`, `matchedSignals`, and the ranked alternatives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteDirectionDecision {
    pub selected: Option<SelectedDirectionLog>,
    pub alternatives: Vec<AlternativeDirectionLog>,
    pub rejected: Vec<RejectedDirection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionLog {
    pub route_direction: RouteDirectionDecision,
}

/// Everything one `plan_day` call needs beyond the process-wide
/// [`AppContext`].
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub request_id: String,
    pub at: crate::model::GeoPoint,
    pub month: Option<u8>,
    pub intent: UserIntent,
    pub identity: UserIdentity,
    pub regions: Option<Vec<String>>,
    pub buffer_meters: Option<f64>,
    pub day_start_sec: i32,
    pub day_end_sec: i32,
    pub pacing: Pacing,
    /// Request-level deadline (spec.md §5). When set, a stage that hasn't
    /// finished by the deadline yields its documented best-effort fallback
    /// instead of running to completion.
    pub deadline: Option<Duration>,
}

/// Starts a deadline clock: the returned token is cancelled once `duration`
/// elapses. `None` never cancels.
fn spawn_deadline(duration: Option<Duration>) -> CancellationToken {
    let token = CancellationToken::new();
    if let Some(duration) = duration {
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            child.cancel();
        });
    }
    token
}

/// Races one pipeline stage against both the request-level deadline and the
/// router's default per-call timeout (spec.md §5: "each external call
/// carries a default 10-15s timeout ... a request-level deadline, when
/// supplied, propagates to all children"). Returns `None` on either overrun,
/// leaving the caller to apply the stage's own documented fallback.
async fn run_stage<T>(deadline: &CancellationToken, default_timeout: Duration, stage: impl std::future::Future<Output = T>) -> Option<T> {
    let guarded = tokio::time::timeout(default_timeout, stage);
    tokio::select! {
        biased;
        _ = deadline.cancelled() => None,
        result = guarded => result.ok(),
    }
}

/// The full `{plan, optimizationResult, decisionLog, trace}` tuple
/// `planDay` exposes (spec.md §6, §4.9).
#[derive(Debug, Clone)]
pub struct PlanResponse {
    pub request_id: String,
    pub plan: Plan,
    pub result: OptimizationResult,
    pub decision_log: DecisionLog,
    pub trace: Trace,
}

fn priority_level_for(priority: PoiPriority) -> u8 {
    match priority {
        PoiPriority::Core => 1,
        PoiPriority::Recommended => 3,
        PoiPriority::Optional => 5,
    }
}

fn node_type_for(candidate: &CandidateActivity) -> PlanNodeType {
    match candidate.canonical_type.as_deref() {
        Some(t) if t.eq_ignore_ascii_case("restaurant") || t.contains("food") => PlanNodeType::Restaurant,
        Some(t) if t.eq_ignore_ascii_case("hotel") => PlanNodeType::Hotel,
        _ => PlanNodeType::Poi,
    }
}

/// Projects a candidate activity into a solver [`PlanNode`]. Opening-hours
/// enrichment isn't modeled upstream (spec.md §6: the place store returns
/// geometry and metadata, not hours), so every node gets the full-day
/// window; a richer place store can attach real windows by wrapping
/// [`PlaceStore`](crate::traits::PlaceStore) before this stage.
fn node_from_candidate(candidate: &CandidateActivity, day_window: TimeWindow) -> PlanNode {
    PlanNode {
        id: candidate.uuid.to_string(),
        name: candidate.name.clone(),
        node_type: node_type_for(candidate),
        geo: candidate.geo,
        service_duration_min: candidate.duration_min,
        time_windows: vec![day_window],
        constraints: PlanNodeConstraints {
            is_hard_node: candidate.must_see,
            priority_level: priority_level_for(candidate.priority),
            drop_penalty: None,
            reward: Some(candidate.quality_score * 100.0),
        },
        meta: PlanNodeMeta {
            region_id: None,
            tags: candidate.intent_tags.clone(),
            origin_id: None,
            disjunction_group_id: None,
        },
    }
}

fn empty_result() -> OptimizationResult {
    OptimizationResult {
        status: SolveStatus::Infeasible,
        summary: Default::default(),
        route: Vec::new(),
        timeline: Vec::new(),
        dropped: Vec::new(),
        diagnostics: Default::default(),
        robustness: Default::default(),
    }
}

/// Runs the full C5 → C4 → C1 → C3 pipeline for one request.
pub async fn plan_day(request: &PlanRequest, ctx: &AppContext) -> PlanResponse {
    let mut trace = Trace::open(request.request_id.clone());
    let country_code = resolve_country(request.at);
    let deadline = spawn_deadline(request.deadline);
    let default_timeout = Duration::from_secs(ctx.router_config.default_timeout_secs);

    let direction_cache = ctx.direction_cache();
    let select_future = select_directions(
        &request.intent,
        &country_code,
        request.month,
        &request.identity,
        ctx.direction_store.as_ref(),
        &direction_cache,
        &ctx.cache_config,
        &mut trace,
    );
    let outcome = run_stage(&deadline, default_timeout, select_future).await;
    let outcome = match outcome {
        Some(outcome) => outcome,
        None => {
            trace.record_error("deadline exceeded during route direction selection, returning best-effort empty recommendations".to_string());
            trace.errors.fallback_used = true;
            SelectionOutcome::default()
        }
    };

    let Some(selected) = outcome.recommended.first() else {
        trace.record_error(format!("no selectable route direction for country {country_code}"));
        return close_with_empty(&mut trace, ctx, request);
    };

    let decision_log = DecisionLog {
        route_direction: RouteDirectionDecision {
            selected: Some(SelectedDirectionLog {
                id: selected.direction_id.clone(),
                name: selected.name.clone(),
                score_breakdown: selected.score_breakdown.clone(),
                matched_signals: selected.matched_signals.clone(),
            }),
            alternatives: outcome
                .recommended
                .iter()
                .skip(1)
                .map(|r| AlternativeDirectionLog {
                    id: r.direction_id.clone(),
                    score: r.score,
                })
                .collect(),
            rejected: outcome.rejected.clone(),
        },
    };
    trace.decision_context = json!({
        "selected": {
            "id": selected.direction_id,
            "name": selected.name,
            "scoreBreakdown": selected.score_breakdown,
            "matchedSignals": selected.matched_signals,
        },
        "alternatives": decision_log.route_direction.alternatives,
        "rejected": decision_log.route_direction.rejected,
    });

    let directions = ctx
        .direction_store
        .find_by_country(&country_code, &crate::traits::DirectionQuery::default())
        .await;
    let Some(direction) = directions.into_iter().find(|d| d.id == selected.direction_id) else {
        trace.record_error(format!("selected direction {} vanished before POI generation", selected.direction_id));
        return close_with_empty(&mut trace, ctx, request);
    };

    let plan = Plan {
        days: vec![PlanDay {
            day_index: 1,
            terrain_facts: TerrainFacts::from_direction(&direction),
        }],
    };

    let poi_cache = ctx.poi_cache();
    let candidates_future = generate_candidates(
        &direction,
        request.regions.as_deref(),
        request.buffer_meters,
        ctx.place_store.as_ref(),
        &poi_cache,
        &ctx.cache_config,
        &mut trace,
    );
    let candidates = tokio::select! {
        biased;
        _ = deadline.cancelled() => None,
        candidates = candidates_future => Some(candidates),
    };
    let candidates: Vec<CandidateActivity> = match candidates {
        Some(candidates) => candidates,
        None => {
            trace.record_error("deadline exceeded during POI candidate generation, returning best-effort empty pool".to_string());
            trace.errors.fallback_used = true;
            Vec::new()
        }
    };
    trace.quality.pool_size = Some(candidates.len());

    if candidates.is_empty() {
        trace.record_error("empty candidate pool, nothing to schedule".to_string());
        trace.close();
        ctx.metrics.record(&trace);
        let returned_trace = trace.clone();
        ctx.traces.insert(trace);
        return PlanResponse {
            request_id: request.request_id.clone(),
            plan,
            result: empty_result(),
            decision_log,
            trace: returned_trace,
        };
    }

    let day_window: TimeWindow = (request.day_start_sec, request.day_end_sec);
    let nodes: Vec<PlanNode> = candidates.iter().map(|c| node_from_candidate(c, day_window)).collect();
    trace.quality.hard_hits = Some(nodes.iter().filter(|n| n.constraints.is_hard_node).count());
    trace.quality.soft_hits = Some(nodes.iter().filter(|n| !n.constraints.is_hard_node).count());

    let primary_mode = nodes
        .first()
        .map(mode_of)
        .map(|m| match m {
            crate::config::TravelMode::Metro => TravelTimeMode::Transit,
            crate::config::TravelMode::Drive => TravelTimeMode::Drive,
            crate::config::TravelMode::Walk => TravelTimeMode::Walk,
        })
        .unwrap_or(TravelTimeMode::Walk);

    // Pacing projection (spec.md §4.3 step 1): the day's pacing preset
    // drives the matrix's buffer_factor/fixed_buffer_min and the solver's
    // wait weight, layered over the context's other policy defaults
    // (cross-region cost, switch costs).
    let transport_policy = ctx.transport_policy.with_pacing(request.pacing);
    let matrix_future = build_robust_time_matrix(&nodes, &transport_policy, primary_mode, ctx.travel_time_provider.as_ref(), &ctx.pair_cache);
    let matrix: RobustTimeMatrix = tokio::select! {
        biased;
        _ = deadline.cancelled() => {
            trace.record_error("deadline exceeded while building the robust time matrix, falling back to haversine-only estimates".to_string());
            trace.errors.fallback_used = true;
            build_fallback_matrix(&nodes, &transport_policy, primary_mode)
        }
        matrix = matrix_future => matrix,
    };

    let solve_request = SolveRequest {
        day_start_sec: request.day_start_sec,
        day_end_sec: request.day_end_sec,
        nodes: &nodes,
        matrix: &matrix,
        pacing: request.pacing,
        objective_weights: None,
        lunch: ctx.lunch_policy.clone(),
        lifestyle: ctx.lifestyle_policy.clone(),
    };
    let result = solve(&solve_request);

    if matches!(result.status, SolveStatus::Infeasible) {
        trace.errors.fallback_used = true;
    }
    trace.close();
    ctx.metrics.record(&trace);
    let returned_trace = trace.clone();
    ctx.traces.insert(trace);

    PlanResponse {
        request_id: request.request_id.clone(),
        plan,
        result,
        decision_log,
        trace: returned_trace,
    }
}

/// Closes and records `trace` before returning an empty, direction-less
/// [`PlanResponse`] (spec.md §7: "no direction matches" is surfaced to the
/// caller as an empty result, not an error).
fn close_with_empty(trace: &mut Trace, ctx: &AppContext, request: &PlanRequest) -> PlanResponse {
    trace.close();
    ctx.metrics.record(trace);
    let returned_trace = trace.clone();
    ctx.traces.insert(trace.clone());
    PlanResponse {
        request_id: request.request_id.clone(),
        plan: Plan::default(),
        result: empty_result(),
        decision_log: DecisionLog::default(),
        trace: returned_trace,
    }
}

/// Dispatches a comprehensive safety check for the direction's entry point,
/// independent of the main planning flow (spec.md §4.6 used alongside §4.9).
pub async fn safety_assessment_for(ctx: &AppContext, at: crate::model::GeoPoint) -> crate::router::SafetyAssessment {
    ctx.router
        .comprehensive_safety_assessment(&RouteQuery { at, params: serde_json::Value::Null })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AudienceFilter, Corridor, DailyPace, DirectionStatus, GeoPoint, HardConstraints, ItinerarySkeleton, Objectives, Place, PlaceMetadata,
        RiskProfile, RouteDirection, SignaturePois, SoftConstraints,
    };
    use crate::traits::{CacheBackend, DirectionQuery, DirectionStore, PlaceStore};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;
    use uuid::Uuid;

    fn direction(id: &str) -> RouteDirection {
        RouteDirection {
            id: id.to_string(),
            uuid: Uuid::new_v4(),
            country_code: "VN".to_string(),
            name: "Central Highlands Loop".to_string(),
            name_cn: None,
            name_en: None,
            tags: ["hiking".to_string()].into_iter().collect(),
            regions: vec!["central".to_string()],
            entry_hubs: vec![],
            best_months: Default::default(),
            avoid_months: Default::default(),
            hard: HardConstraints::default(),
            soft: if id == "rd-1" {
                SoftConstraints {
                    max_daily_ascent_m: Some(900.0),
                    max_elevation_m: Some(2800.0),
                    buffer_time_min: None,
                }
            } else {
                SoftConstraints::default()
            },
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
            audience_filter: None::<AudienceFilter>,
            extensions: Default::default(),
        }
    }

    struct FixedDirectionStore(Vec<RouteDirection>);

    #[async_trait]
    impl DirectionStore for FixedDirectionStore {
        async fn find_by_country(&self, country_code: &str, _query: &DirectionQuery) -> Vec<RouteDirection> {
            self.0.iter().filter(|d| d.country_code == country_code).cloned().collect()
        }
    }

    struct FixedPlaceStore(Vec<Place>);

    #[async_trait]
    impl PlaceStore for FixedPlaceStore {
        async fn find_by_uuids(&self, _uuids: &[Uuid]) -> Vec<Place> {
            Vec::new()
        }

        async fn find_by_type_and_corridor(
            &self,
            _types: &[String],
            _regions: Option<&[String]>,
            _corridor: Option<&Corridor>,
            _buffer_meters: f64,
            limit: usize,
        ) -> Vec<Place> {
            self.0.iter().take(limit).cloned().collect()
        }

        async fn find_by_regions_and_corridor(
            &self,
            _regions: &[String],
            _corridor: Option<&Corridor>,
            _buffer_meters: f64,
            _limit: usize,
        ) -> Vec<Place> {
            Vec::new()
        }
    }

    struct FallbackOnlyProvider;

    #[async_trait]
    impl crate::traits::TravelTimeProvider for FallbackOnlyProvider {
        async fn duration(&self, _from: GeoPoint, _to: GeoPoint, _mode: TravelTimeMode) -> Result<f64, String> {
            Err("no live provider in this fixture".to_string())
        }
    }

    struct NoopBackend;

    #[async_trait]
    impl CacheBackend for NoopBackend {
        async fn get(&self, _key: &str) -> Result<Option<Value>, String> {
            Ok(None)
        }
        async fn set(&self, _key: &str, _value: Value, _ttl_sec: u64) -> Result<(), String> {
            Ok(())
        }
    }

    fn place(byte: u8, name: &str, lat: f64, lng: f64) -> Place {
        Place {
            uuid: Uuid::from_bytes([byte; 16]),
            name: name.to_string(),
            geo: GeoPoint::new(lat, lng),
            metadata: PlaceMetadata {
                canonical_type: Some("museum".to_string()),
                region_key: Some("central".to_string()),
            },
            rating: Some(4.5),
            elevation_m: None,
        }
    }

    #[tokio::test]
    async fn plan_day_produces_a_feasible_route_for_a_well_formed_request() {
        let ctx = AppContext::new(
            Arc::new(FixedPlaceStore(vec![
                place(1, "Da Lat Market", 11.9404, 108.4583),
                place(2, "Golden Bridge", 15.9977, 107.9824),
            ])),
            Arc::new(FixedDirectionStore(vec![direction("rd-1")])),
            Arc::new(FallbackOnlyProvider),
            Arc::new(NoopBackend),
            Arc::new(NoopBackend),
        );

        let request = PlanRequest {
            request_id: "req-1".to_string(),
            at: GeoPoint::new(11.9404, 108.4583),
            month: Some(3),
            intent: UserIntent {
                preferences: vec!["hiking".to_string()],
                pace: Some("moderate".to_string()),
                risk_tolerance: Some("low".to_string()),
                duration_days: 1,
            },
            identity: UserIdentity::default(),
            regions: None,
            buffer_meters: None,
            day_start_sec: 8 * 3600,
            day_end_sec: 18 * 3600,
            pacing: Pacing::Normal,
            deadline: None,
        };

        let response = plan_day(&request, &ctx).await;
        assert!(matches!(response.result.status, SolveStatus::Feasible | SolveStatus::Optimal));
        assert!(!response.result.route.is_empty());

        assert_eq!(response.plan.days.len(), 1);
        assert_eq!(response.plan.days[0].terrain_facts.max_elevation_m, 2800.0);
        assert_eq!(response.plan.days[0].terrain_facts.total_ascent_m, 900.0);

        let selected = response.decision_log.route_direction.selected.expect("a direction was selected");
        assert_eq!(selected.id, "rd-1");
        assert!(response.decision_log.route_direction.alternatives.is_empty());

        assert_eq!(response.trace.request_id, "req-1");
        assert!(response.trace.end_time.is_some());
    }

    #[tokio::test]
    async fn plan_day_reports_zero_terrain_facts_when_the_direction_names_none() {
        let ctx = AppContext::new(
            Arc::new(FixedPlaceStore(vec![place(1, "Da Lat Market", 11.9404, 108.4583)])),
            Arc::new(FixedDirectionStore(vec![direction("rd-flat")])),
            Arc::new(FallbackOnlyProvider),
            Arc::new(NoopBackend),
            Arc::new(NoopBackend),
        );

        let request = PlanRequest {
            request_id: "req-flat".to_string(),
            at: GeoPoint::new(11.9404, 108.4583),
            month: None,
            intent: UserIntent::default(),
            identity: UserIdentity::default(),
            regions: None,
            buffer_meters: None,
            day_start_sec: 8 * 3600,
            day_end_sec: 18 * 3600,
            pacing: Pacing::Normal,
            deadline: None,
        };

        let response = plan_day(&request, &ctx).await;
        assert_eq!(response.plan.days[0].terrain_facts.max_elevation_m, 0.0);
        assert_eq!(response.plan.days[0].terrain_facts.total_ascent_m, 0.0);
    }

    #[tokio::test]
    async fn plan_day_returns_empty_result_when_no_direction_matches_country() {
        let ctx = AppContext::new(
            Arc::new(FixedPlaceStore(vec![])),
            Arc::new(FixedDirectionStore(vec![])),
            Arc::new(FallbackOnlyProvider),
            Arc::new(NoopBackend),
            Arc::new(NoopBackend),
        );

        let request = PlanRequest {
            request_id: "req-2".to_string(),
            at: GeoPoint::new(11.9404, 108.4583),
            month: None,
            intent: UserIntent::default(),
            identity: UserIdentity::default(),
            regions: None,
            buffer_meters: None,
            day_start_sec: 8 * 3600,
            day_end_sec: 18 * 3600,
            pacing: Pacing::Normal,
            deadline: None,
        };

        let response = plan_day(&request, &ctx).await;
        assert!(matches!(response.result.status, SolveStatus::Infeasible));
        assert!(response.result.route.is_empty());
    }

    struct SlowDirectionStore(Vec<RouteDirection>);

    #[async_trait]
    impl DirectionStore for SlowDirectionStore {
        async fn find_by_country(&self, country_code: &str, _query: &DirectionQuery) -> Vec<RouteDirection> {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            self.0.iter().filter(|d| d.country_code == country_code).cloned().collect()
        }
    }

    #[tokio::test]
    async fn plan_day_returns_best_effort_empty_result_when_the_deadline_fires_mid_selection() {
        let ctx = AppContext::new(
            Arc::new(FixedPlaceStore(vec![place(1, "Da Lat Market", 11.9404, 108.4583)])),
            Arc::new(SlowDirectionStore(vec![direction("rd-1")])),
            Arc::new(FallbackOnlyProvider),
            Arc::new(NoopBackend),
            Arc::new(NoopBackend),
        );

        let request = PlanRequest {
            request_id: "req-3".to_string(),
            at: GeoPoint::new(11.9404, 108.4583),
            month: None,
            intent: UserIntent::default(),
            identity: UserIdentity::default(),
            regions: None,
            buffer_meters: None,
            day_start_sec: 8 * 3600,
            day_end_sec: 18 * 3600,
            pacing: Pacing::Normal,
            deadline: Some(std::time::Duration::from_millis(5)),
        };

        let response = plan_day(&request, &ctx).await;
        assert!(matches!(response.result.status, SolveStatus::Infeasible));

        let trace = ctx.traces.get("req-3").expect("trace recorded even on deadline exceeded");
        assert!(trace.errors.fallback_used);
        assert!(trace.errors.messages.iter().any(|m| m.contains("deadline exceeded")));
    }
}
