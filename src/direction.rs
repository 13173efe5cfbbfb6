//! Route Direction Selector (C5, spec.md §4.5): ranks country-level
//! route directions against a user intent vector with full score
//! decomposition, after gray-release (rollout/audience) and seasonality
//! filtering.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cache::{direction_cache_key, direction_cache_ttl, TieredCache};
use crate::config::CacheConfig;
use crate::model::{DailyPace, RouteDirection};
use crate::observability::Trace;
use crate::traits::{DirectionQuery, DirectionStore};

/// Deterministic gray-release rollout hashing (spec.md §4.5, §9 open
/// question: the source leaves the hash function unspecified; this crate
/// fixes it to FNV-1a so results are reproducible and testable).
pub mod rollout {
    pub use crate::hashing::stable_user_bucket as stable_user_hash;
}

#[derive(Debug, Clone, Default)]
pub struct UserIntent {
    pub preferences: Vec<String>,
    /// `"relaxed"`, `"moderate"`, or `"intense"`; unrecognized/absent is
    /// treated as unknown.
    pub pace: Option<String>,
    /// `"low"`, `"medium"`, or `"high"`; unrecognized/absent is unknown.
    pub risk_tolerance: Option<String>,
    pub duration_days: u32,
}

#[derive(Debug, Clone, Default)]
pub struct UserIdentity {
    pub user_id: Option<String>,
    pub persona: BTreeSet<String>,
    pub locale: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentScore {
    pub name: &'static str,
    pub score: f64,
    pub weight: f64,
}

impl ComponentScore {
    fn weighted(&self) -> f64 {
        self.score * self.weight
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub components: Vec<ComponentScore>,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedSignals {
    pub matched_tags: Vec<String>,
    pub unmatched_tags: Vec<String>,
    pub season_flag: String,
    pub pace_compatibility: String,
    pub risk_factors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub direction_id: String,
    pub name: String,
    pub score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub matched_signals: MatchedSignals,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedDirection {
    pub direction_id: String,
    pub name: String,
    pub score: f64,
    pub primary_reason: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SelectionOutcome {
    pub recommended: Vec<Recommendation>,
    pub rejected: Vec<RejectedDirection>,
}

fn passes_rollout(direction: &RouteDirection, identity: &UserIdentity) -> bool {
    if direction.rollout_percent >= 100 {
        return true;
    }
    match &identity.user_id {
        None => false,
        Some(user_id) => {
            let bucket = rollout::stable_user_hash(user_id) as u16 + 1;
            bucket <= direction.rollout_percent as u16
        }
    }
}

fn passes_audience(direction: &RouteDirection, identity: &UserIdentity) -> bool {
    let Some(filter) = &direction.audience_filter else {
        return true;
    };
    let persona_ok = filter.persona.is_empty() || (!identity.persona.is_empty() && !filter.persona.is_disjoint(&identity.persona));
    let locale_ok = filter.locale.is_empty() || (!identity.locale.is_empty() && !filter.locale.is_disjoint(&identity.locale));
    persona_ok && locale_ok
}

fn passes_season(direction: &RouteDirection, month: Option<u8>) -> bool {
    match month {
        Some(m) => !direction.avoid_months.contains(&m),
        None => true,
    }
}

fn tag_match_score(preferences: &[String], route_tags: &BTreeSet<String>) -> (f64, Vec<String>, Vec<String>) {
    if preferences.is_empty() {
        return (50.0, Vec::new(), route_tags.iter().cloned().collect());
    }
    if route_tags.is_empty() {
        return (30.0, Vec::new(), preferences.to_vec());
    }
    let pref_set: BTreeSet<String> = preferences.iter().cloned().collect();
    let matched: Vec<String> = pref_set.intersection(route_tags).cloned().collect();
    let unmatched: Vec<String> = pref_set.symmetric_difference(route_tags).cloned().collect();
    let denom = pref_set.len().max(route_tags.len()) as f64;
    let score = (matched.len() as f64 / denom) * 100.0;
    (score, matched, unmatched)
}

fn seasonality_score(month: Option<u8>, best_months: &BTreeSet<u8>, avoid_months: &BTreeSet<u8>) -> (f64, String) {
    match month {
        None => (50.0, "unknown".to_string()),
        Some(m) if best_months.contains(&m) => (100.0, "best".to_string()),
        Some(m) if avoid_months.contains(&m) => (0.0, "avoid".to_string()),
        Some(_) => (33.0, "neutral".to_string()),
    }
}

fn pace_compatible(user_pace: &str, route_pace: DailyPace) -> bool {
    match user_pace {
        "relaxed" => matches!(route_pace, DailyPace::Light | DailyPace::Moderate),
        "moderate" => matches!(route_pace, DailyPace::Moderate),
        "intense" => matches!(route_pace, DailyPace::Intense | DailyPace::Moderate),
        _ => false,
    }
}

fn pace_score(user_pace: Option<&str>, route_pace: Option<DailyPace>) -> (f64, String) {
    match (user_pace, route_pace) {
        (None, _) | (_, None) => (50.0, "unknown".to_string()),
        (Some(pace), Some(route_pace)) => {
            if pace_compatible(pace, route_pace) {
                (100.0, "compatible".to_string())
            } else {
                (30.0, "incompatible".to_string())
            }
        }
    }
}

fn risk_score(risk_tolerance: Option<&str>, has_high_risk: bool) -> (f64, Vec<String>) {
    let mut factors = Vec::new();
    if has_high_risk {
        factors.push("altitude_sickness_or_road_closure".to_string());
    }
    let score = match risk_tolerance {
        None => 50.0,
        Some("low") => {
            if !has_high_risk {
                100.0
            } else {
                30.0
            }
        }
        Some("high") => {
            if has_high_risk {
                100.0
            } else {
                30.0
            }
        }
        Some("medium") => 70.0,
        Some(_) => 50.0,
    };
    (score, factors)
}

struct Scored {
    direction: RouteDirection,
    breakdown: ScoreBreakdown,
    signals: MatchedSignals,
}

fn score_direction(direction: &RouteDirection, intent: &UserIntent, month: Option<u8>) -> Scored {
    let (tag_score, matched_tags, unmatched_tags) = tag_match_score(&intent.preferences, &direction.tags);
    let (season_score, season_flag) = seasonality_score(month, &direction.best_months, &direction.avoid_months);
    let (pace_value, pace_label) = pace_score(intent.pace.as_deref(), direction.itinerary_skeleton.daily_pace);
    let (risk_value, risk_factors) = risk_score(intent.risk_tolerance.as_deref(), direction.risk_profile.has_high_risk());

    let components = vec![
        ComponentScore { name: "tagMatch", score: tag_score, weight: 0.4 },
        ComponentScore { name: "seasonality", score: season_score, weight: 0.3 },
        ComponentScore { name: "pace", score: pace_value, weight: 0.2 },
        ComponentScore { name: "risk", score: risk_value, weight: 0.1 },
    ];
    let total: f64 = components.iter().map(ComponentScore::weighted).sum();

    Scored {
        direction: direction.clone(),
        breakdown: ScoreBreakdown { components, total },
        signals: MatchedSignals {
            matched_tags,
            unmatched_tags,
            season_flag,
            pace_compatibility: pace_label,
            risk_factors,
        },
    }
}

fn primary_reason(breakdown: &ScoreBreakdown) -> &'static str {
    breakdown
        .components
        .iter()
        .min_by(|a, b| a.weighted().total_cmp(&b.weighted()))
        .map(|c| c.name)
        .unwrap_or("unknown")
}

/// Ranks directions for `country_code` against `intent`, applying
/// gray-release and seasonality filters first (spec.md §4.5). Cache-aware:
/// identical `(country, month, preferences, pace, risk, duration)` inputs
/// return the cached recommendation set.
#[allow(clippy::too_many_arguments)]
pub async fn select_directions(
    intent: &UserIntent,
    country_code: &str,
    month: Option<u8>,
    identity: &UserIdentity,
    direction_store: &dyn DirectionStore,
    direction_cache: &TieredCache<'_>,
    cache_config: &CacheConfig,
    trace: &mut Trace,
) -> SelectionOutcome {
    let pace_key = intent.pace.clone().unwrap_or_default();
    let risk_key = intent.risk_tolerance.clone().unwrap_or_default();
    let cache_key = direction_cache_key(country_code, month, &intent.preferences, &pace_key, &risk_key, intent.duration_days);

    if let Some(hit) = direction_cache.get::<SelectionOutcome>(&cache_key).await {
        if let Some(top) = hit.recommended.first() {
            trace.quality.selected_rd_id = Some(top.direction_id.clone());
            trace.quality.selected_rd_name = Some(top.name.clone());
        }
        return hit;
    }

    let directions = direction_store
        .find_by_country(country_code, &DirectionQuery::default())
        .await;

    let eligible: Vec<&RouteDirection> = directions
        .iter()
        .filter(|d| d.is_selectable())
        .filter(|d| passes_rollout(d, identity))
        .filter(|d| passes_audience(d, identity))
        .filter(|d| passes_season(d, month))
        .collect();

    let mut scored: Vec<Scored> = eligible.into_iter().map(|d| score_direction(d, intent, month)).collect();
    scored.sort_by(|a, b| b.breakdown.total.total_cmp(&a.breakdown.total));

    let recommended: Vec<Recommendation> = scored
        .iter()
        .take(3)
        .map(|s| Recommendation {
            direction_id: s.direction.id.clone(),
            name: s.direction.name.clone(),
            score: s.breakdown.total,
            score_breakdown: s.breakdown.clone(),
            matched_signals: s.signals.clone(),
        })
        .collect();

    let rejected: Vec<RejectedDirection> = scored
        .iter()
        .skip(3)
        .take(3)
        .map(|s| RejectedDirection {
            direction_id: s.direction.id.clone(),
            name: s.direction.name.clone(),
            score: s.breakdown.total,
            primary_reason: primary_reason(&s.breakdown),
        })
        .collect();

    let outcome = SelectionOutcome { recommended, rejected };

    if let Some(top) = outcome.recommended.first() {
        trace.quality.selected_rd_id = Some(top.direction_id.clone());
        trace.quality.selected_rd_name = Some(top.name.clone());
        trace.decision_context = json!({
            "selected": {
                "id": top.direction_id,
                "scoreBreakdown": top.score_breakdown,
                "matchedSignals": top.matched_signals,
            },
            "alternatives": outcome.recommended.iter().skip(1).map(|r| json!({
                "id": r.direction_id,
                "score": r.score,
            })).collect::<Vec<_>>(),
        });
    }

    let ttl = direction_cache_ttl(cache_config, month);
    direction_cache.set(&cache_key, &outcome, ttl).await;

    outcome
}
