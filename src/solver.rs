//! Single-day VRPTW solver (C3): greedy hard-node-first construction over a
//! day window, a lunch break, and a reward-maximising soft-node loop.

use std::collections::HashSet;

use crate::config::{LifestylePolicy, LunchPolicy, ObjectiveWeights, Pacing, TransportPolicy};
use crate::explain::{explain, ExplainContext};
use crate::model::{
    Diagnostics, DropReasonCode, DroppedNode, OptimizationResult, PlanNode, Robustness,
    RiskLevel, RobustTimeMatrix, RouteNode, SolveStatus, Summary, TimelineEvent,
    TimelineEventType,
};

/// Everything the solver needs for one day's schedule.
pub struct SolveRequest<'a> {
    pub day_start_sec: i32,
    pub day_end_sec: i32,
    pub nodes: &'a [PlanNode],
    pub matrix: &'a RobustTimeMatrix,
    pub pacing: Pacing,
    /// `None` uses the pacing preset's wait weight over otherwise-default
    /// objective weights; `Some` is taken as fully specified.
    pub objective_weights: Option<ObjectiveWeights>,
    pub lunch: LunchPolicy,
    pub lifestyle: LifestylePolicy,
}

#[derive(Debug, Clone)]
struct Candidate {
    node: PlanNode,
    origin_index: usize,
}

impl Candidate {
    fn group_key(&self) -> String {
        self.node
            .meta
            .disjunction_group_id
            .clone()
            .unwrap_or_else(|| self.node.id.clone())
    }
}

enum PlacedKind {
    Node {
        origin_index: usize,
        candidate_id: String,
        candidate_name: String,
    },
    Lunch,
}

struct Placed {
    kind: PlacedKind,
    arrival: i32,
    start_service: i32,
    end_service: i32,
    wait_min: i32,
    travel_min_from_prev: i32,
}

fn expand_candidates(nodes: &[PlanNode]) -> Vec<Candidate> {
    let mut out = Vec::new();
    for (idx, node) in nodes.iter().enumerate() {
        if node.time_windows.len() > 1 {
            for (w_idx, window) in node.time_windows.iter().enumerate() {
                let mut virt = node.clone();
                virt.id = format!("{}::w{}", node.id, w_idx);
                virt.time_windows = vec![*window];
                virt.meta.origin_id = Some(node.id.clone());
                virt.meta.disjunction_group_id = Some(node.id.clone());
                out.push(Candidate {
                    node: virt,
                    origin_index: idx,
                });
            }
        } else {
            out.push(Candidate {
                node: node.clone(),
                origin_index: idx,
            });
        }
    }
    out
}

fn travel_minutes(from: Option<usize>, to: usize, matrix: &RobustTimeMatrix) -> i32 {
    match from {
        None => 0,
        Some(i) => matrix.matrix[i][to].round() as i32,
    }
}

fn ideal_travel_minutes(from: Option<usize>, to: usize, matrix: &RobustTimeMatrix) -> i32 {
    match from {
        None => 0,
        Some(i) => matrix.ideal[i][to].round() as i32,
    }
}

fn effective_weights(pacing: Pacing, overrides: Option<ObjectiveWeights>) -> ObjectiveWeights {
    overrides.unwrap_or_else(|| ObjectiveWeights {
        wait: pacing.preset().wait_weight,
        ..ObjectiveWeights::default()
    })
}

/// `arrivalTime >= currentTime + travel` that falls within the candidate's
/// one window, with service completion by day end.
fn try_visit(
    candidate: &Candidate,
    current_time: i32,
    current_origin: Option<usize>,
    day_end: i32,
    matrix: &RobustTimeMatrix,
) -> Option<(i32, i32, i32, i32)> {
    let window = *candidate.node.time_windows.first()?;
    let travel_sec = travel_minutes(current_origin, candidate.origin_index, matrix) * 60;
    let arrival = current_time + travel_sec;
    let start_service = arrival.max(window.0);
    let end_service = start_service + candidate.node.service_duration_min * 60;
    if start_service <= window.1 && end_service <= day_end {
        let wait = (start_service - arrival).max(0) / 60;
        Some((arrival, start_service, wait, end_service))
    } else {
        None
    }
}

fn transport_policy_snapshot(matrix: &RobustTimeMatrix) -> TransportPolicy {
    TransportPolicy {
        buffer_factor: matrix.policy.buffer_factor,
        fixed_buffer_min: matrix.policy.fixed_buffer_min,
        ..TransportPolicy::default()
    }
}

/// Builds the `INFEASIBLE` result used whenever construction aborts before
/// a day route could be built: every node is dropped, with the triggering
/// hard node (if any) given a direct reason and everything else attributed
/// to the named `blanket_reason`.
///
/// `early_departure` carries `(required_departure_sec, effective_earliest_start_sec)`
/// for the `EARLY_DEPARTURE_CONFLICT` case (spec.md §4.2: that reason code
/// must always include both facts); it is attached only to the triggering
/// node's explanation.
fn infeasible_result(
    nodes: &[PlanNode],
    triggering_node_index: Option<usize>,
    triggering_reason: DropReasonCode,
    blanket_reason: DropReasonCode,
    day_end_sec: i32,
    matrix: &RobustTimeMatrix,
    early_departure: Option<(i32, i32)>,
) -> OptimizationResult {
    let mut dropped = Vec::with_capacity(nodes.len());
    for (idx, node) in nodes.iter().enumerate() {
        let reason = if Some(idx) == triggering_node_index {
            triggering_reason
        } else {
            blanket_reason
        };
        let is_triggering = Some(idx) == triggering_node_index;
        let ctx = ExplainContext {
            window_close_sec: node.time_windows.iter().map(|w| w.1).max(),
            day_end_sec: Some(day_end_sec),
            transport_policy: Some(transport_policy_snapshot(matrix)),
            required_departure_sec: if is_triggering { early_departure.map(|(d, _)| d) } else { None },
            effective_earliest_start_sec: if is_triggering { early_departure.map(|(_, e)| e) } else { None },
            ..Default::default()
        };
        dropped.push(DroppedNode {
            node_id: node.id.clone(),
            name: node.name.clone(),
            reason_code: reason,
            penalty: node.drop_penalty(),
            explanation: explain(node, reason, &ctx),
        });
    }

    OptimizationResult {
        status: SolveStatus::Infeasible,
        summary: Summary::default(),
        route: Vec::new(),
        timeline: Vec::new(),
        dropped,
        diagnostics: Diagnostics {
            critical_windows: Vec::new(),
            assumptions_buffer_factor: matrix.policy.buffer_factor,
            assumptions_fixed_buffer_min: matrix.policy.fixed_buffer_min,
        },
        robustness: Robustness::default(),
    }
}

/// Runs the day's greedy construction and post-processing over `request`.
pub fn solve(request: &SolveRequest) -> OptimizationResult {
    let nodes = request.nodes;
    let matrix = request.matrix;
    let day_start = request.day_start_sec;
    let day_end = request.day_end_sec;
    let weights = effective_weights(request.pacing, request.objective_weights);

    // Early-departure gate.
    if let Some(earliest) = request.lifestyle.earliest_first_stop {
        let violator = nodes
            .iter()
            .position(|n| n.constraints.is_hard_node && n.time_windows.iter().any(|w| w.0 < earliest));
        if let Some(idx) = violator {
            let required_departure = nodes[idx]
                .time_windows
                .iter()
                .map(|w| w.0)
                .filter(|open| *open < earliest)
                .min()
                .unwrap_or(earliest);
            return infeasible_result(
                nodes,
                Some(idx),
                DropReasonCode::EarlyDepartureConflict,
                DropReasonCode::EarlyDepartureConflict,
                day_end,
                matrix,
                Some((required_departure, earliest)),
            );
        }
    }

    let candidates = expand_candidates(nodes);
    let hard_node_count = nodes.iter().filter(|n| n.constraints.is_hard_node).count();

    let mut current_time = day_start;
    let mut current_origin: Option<usize> = None;
    let mut visited_groups: HashSet<String> = HashSet::new();
    let mut visited_origins: HashSet<usize> = HashSet::new();
    let mut placed: Vec<Placed> = Vec::new();
    let mut lunch_taken = false;

    // Construction step 1: hard nodes first, in input order.
    for (idx, node) in nodes.iter().enumerate() {
        if !node.constraints.is_hard_node {
            continue;
        }
        let group: Vec<&Candidate> = candidates.iter().filter(|c| c.origin_index == idx).collect();
        let mut best: Option<(i32, i32, i32, i32, &Candidate)> = None;
        for c in &group {
            if let Some((arrival, start_service, wait, end_service)) =
                try_visit(c, current_time, current_origin, day_end, matrix)
            {
                let better = match &best {
                    None => true,
                    Some((best_start, _, _, _, best_c)) => {
                        start_service < *best_start
                            || (start_service == *best_start && c.node.id < best_c.node.id)
                    }
                };
                if better {
                    best = Some((arrival, start_service, wait, end_service, c));
                }
            }
        }

        match best {
            Some((arrival, start_service, wait, end_service, c)) => {
                let travel = travel_minutes(current_origin, c.origin_index, matrix);
                placed.push(Placed {
                    kind: PlacedKind::Node {
                        origin_index: c.origin_index,
                        candidate_id: c.node.id.clone(),
                        candidate_name: c.node.name.clone(),
                    },
                    arrival,
                    start_service,
                    end_service,
                    wait_min: wait,
                    travel_min_from_prev: travel,
                });
                visited_groups.insert(c.group_key());
                visited_origins.insert(c.origin_index);
                current_time = end_service;
                current_origin = Some(c.origin_index);
            }
            None => {
                return infeasible_result(
                    nodes,
                    Some(idx),
                    DropReasonCode::TimeWindowConflict,
                    DropReasonCode::HardNodeProtection,
                    day_end,
                    matrix,
                    None,
                );
            }
        }
    }

    // Construction step 2: lunch break.
    if request.lunch.enabled && !lunch_taken {
        let (window_start, window_end) = request.lunch.window;
        if current_time >= window_start
            && current_time < window_end
            && current_time + request.lunch.duration_min * 60 <= window_end
        {
            let start = current_time.max(window_start);
            let end = start + request.lunch.duration_min * 60;
            placed.push(Placed {
                kind: PlacedKind::Lunch,
                arrival: start,
                start_service: start,
                end_service: end,
                wait_min: 0,
                travel_min_from_prev: 0,
            });
            current_time = end;
            lunch_taken = true;
        }
    }

    // Construction step 3: soft-node loop.
    loop {
        if current_time >= day_end {
            break;
        }
        let mut best: Option<(f64, &Candidate, i32, i32, i32, i32, i32)> = None;
        for c in &candidates {
            if c.node.constraints.is_hard_node {
                continue;
            }
            if visited_groups.contains(&c.group_key()) {
                continue;
            }
            if let Some((arrival, start_service, wait, end_service)) =
                try_visit(c, current_time, current_origin, day_end, matrix)
            {
                let travel = travel_minutes(current_origin, c.origin_index, matrix);
                let reward = c.node.constraints.reward.unwrap_or(1.0);
                let score =
                    reward * weights.reward - (travel as f64) * weights.travel - (wait as f64) * weights.wait;

                let better = match &best {
                    None => true,
                    Some((best_score, best_c, ..)) => {
                        score > *best_score || (score == *best_score && c.node.id < best_c.node.id)
                    }
                };
                if better {
                    best = Some((score, c, arrival, start_service, wait, end_service, travel));
                }
            }
        }

        match best {
            Some((_, c, arrival, start_service, wait, end_service, travel)) => {
                placed.push(Placed {
                    kind: PlacedKind::Node {
                        origin_index: c.origin_index,
                        candidate_id: c.node.id.clone(),
                        candidate_name: c.node.name.clone(),
                    },
                    arrival,
                    start_service,
                    end_service,
                    wait_min: wait,
                    travel_min_from_prev: travel,
                });
                visited_groups.insert(c.group_key());
                visited_origins.insert(c.origin_index);
                current_time = end_service;
                current_origin = Some(c.origin_index);
            }
            None => break,
        }
    }

    if placed.is_empty() {
        return infeasible_result(
            nodes,
            None,
            DropReasonCode::InsufficientTotalTime,
            DropReasonCode::InsufficientTotalTime,
            day_end,
            matrix,
            None,
        );
    }

    // Post-processing: materialise route nodes and timeline events in order.
    let mut route = Vec::with_capacity(placed.len());
    let mut timeline = Vec::with_capacity(placed.len() * 2);
    let mut seq = 0u32;
    for (i, p) in placed.iter().enumerate() {
        seq += 1;
        let travel_min = if i == 0 { 0 } else { p.travel_min_from_prev };

        if travel_min > 0 {
            timeline.push(TimelineEvent {
                event_type: TimelineEventType::Travel,
                start: p.arrival - travel_min * 60,
                end: p.arrival,
                duration_min: travel_min,
                description: "Travel to next stop".to_string(),
                node_id: None,
            });
        }

        match &p.kind {
            PlacedKind::Lunch => {
                timeline.push(TimelineEvent {
                    event_type: TimelineEventType::Lunch,
                    start: p.start_service,
                    end: p.end_service,
                    duration_min: (p.end_service - p.start_service) / 60,
                    description: "Lunch break".to_string(),
                    node_id: None,
                });
                route.push(RouteNode {
                    seq,
                    node_id: "lunch-break".to_string(),
                    origin_id: None,
                    name: "Lunch break".to_string(),
                    arrival: p.arrival,
                    start_service: p.start_service,
                    end_service: p.end_service,
                    wait_min: p.wait_min,
                    travel_min_from_prev: travel_min,
                });
            }
            PlacedKind::Node {
                origin_index,
                candidate_id,
                candidate_name,
            } => {
                if p.wait_min > 15 {
                    timeline.push(TimelineEvent {
                        event_type: TimelineEventType::Wait,
                        start: p.arrival,
                        end: p.start_service,
                        duration_min: p.wait_min,
                        description: format!("Waiting for {} to open", candidate_name),
                        node_id: Some(candidate_id.clone()),
                    });
                }
                timeline.push(TimelineEvent {
                    event_type: TimelineEventType::Node,
                    start: p.start_service,
                    end: p.end_service,
                    duration_min: (p.end_service - p.start_service) / 60,
                    description: candidate_name.clone(),
                    node_id: Some(candidate_id.clone()),
                });
                let origin = &nodes[*origin_index];
                let origin_id = if origin.id == *candidate_id {
                    None
                } else {
                    Some(origin.id.clone())
                };
                route.push(RouteNode {
                    seq,
                    node_id: candidate_id.clone(),
                    origin_id,
                    name: candidate_name.clone(),
                    arrival: p.arrival,
                    start_service: p.start_service,
                    end_service: p.end_service,
                    wait_min: p.wait_min,
                    travel_min_from_prev: travel_min,
                });
            }
        }
    }

    let mut dropped = Vec::new();
    for (idx, node) in nodes.iter().enumerate() {
        if visited_origins.contains(&idx) {
            continue;
        }
        let (reason, ctx) = classify_drop(
            node,
            idx,
            current_origin,
            current_time,
            day_end,
            hard_node_count,
            matrix,
        );
        dropped.push(DroppedNode {
            node_id: node.id.clone(),
            name: node.name.clone(),
            reason_code: reason,
            penalty: node.drop_penalty(),
            explanation: explain(node, reason, &ctx),
        });
    }

    let unvisited_hard = nodes
        .iter()
        .enumerate()
        .any(|(idx, n)| n.constraints.is_hard_node && !visited_origins.contains(&idx));
    let status = if unvisited_hard {
        SolveStatus::Infeasible
    } else {
        SolveStatus::Feasible
    };

    let total_travel_min: i32 = route.iter().map(|r| r.travel_min_from_prev).sum();
    let total_wait_min: i32 = route.iter().map(|r| r.wait_min).sum();
    let total_service_min: i32 = route.iter().map(|r| (r.end_service - r.start_service) / 60).sum();

    let slacks: Vec<(String, i32)> = route
        .iter()
        .filter(|r| r.node_id != "lunch-break")
        .map(|r| (r.node_id.clone(), (day_end - r.end_service) / 60))
        .collect();
    let mut sorted_slacks = slacks.clone();
    sorted_slacks.sort_by_key(|(_, slack)| *slack);

    let top3: Vec<(String, i32)> = sorted_slacks.iter().take(3).cloned().collect();
    let risk_level = if top3.is_empty() {
        None
    } else {
        let mean = top3.iter().map(|(_, s)| *s as f64).sum::<f64>() / top3.len() as f64;
        Some(if mean < 30.0 {
            RiskLevel::High
        } else if mean < 60.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        })
    };

    let critical: Vec<(String, i32)> = slacks.iter().filter(|(_, s)| *s < 30).cloned().collect();
    let critical_ratio = if slacks.is_empty() {
        0.0
    } else {
        critical.len() as f64 / slacks.len() as f64
    };
    let avg_slack = if slacks.is_empty() {
        0.0
    } else {
        slacks.iter().map(|(_, s)| *s as f64).sum::<f64>() / slacks.len() as f64
    };
    let robustness_score = if slacks.is_empty() {
        0.0
    } else {
        1.0 - 0.5 * critical_ratio - 0.3 * (1.0 - (avg_slack / 60.0).min(1.0))
    };

    let mut total_buffer_minutes = 0i32;
    for pair in route.windows(2) {
        if let (Some(from_origin), Some(to_origin)) = (
            route_node_origin_index(&pair[0], nodes),
            route_node_origin_index(&pair[1], nodes),
        ) {
            let robust = matrix.matrix[from_origin][to_origin];
            let ideal = matrix.ideal[from_origin][to_origin];
            total_buffer_minutes += (robust - ideal).round() as i32;
        }
    }

    OptimizationResult {
        status,
        summary: Summary {
            total_travel_min,
            total_wait_min,
            total_service_min,
            robustness_score,
        },
        route,
        timeline,
        dropped,
        diagnostics: Diagnostics {
            critical_windows: critical.into_iter().map(|(id, _)| id).collect(),
            assumptions_buffer_factor: matrix.policy.buffer_factor,
            assumptions_fixed_buffer_min: matrix.policy.fixed_buffer_min,
        },
        robustness: Robustness {
            total_buffer_minutes,
            total_wait_minutes: total_wait_min,
            top3_min_slack_nodes: top3.into_iter().map(|(id, _)| id).collect(),
            risk_level,
        },
    }
}

fn route_node_origin_index(route_node: &RouteNode, nodes: &[PlanNode]) -> Option<usize> {
    let lookup_id = route_node.origin_id.as_ref().unwrap_or(&route_node.node_id);
    nodes.iter().position(|n| &n.id == lookup_id)
}

/// Applies the drop-reason priority cascade to an unvisited node: compares
/// its ideal- and robust-time reachability from wherever the route ended,
/// then falls back through hard-node protection, wait time, and priority.
fn classify_drop(
    node: &PlanNode,
    idx: usize,
    final_origin: Option<usize>,
    final_time: i32,
    day_end: i32,
    hard_node_count: usize,
    matrix: &RobustTimeMatrix,
) -> (DropReasonCode, ExplainContext) {
    let window = node.time_windows.first().copied();
    let last_close = node.time_windows.iter().map(|w| w.1).max();

    let ideal_travel_sec = ideal_travel_minutes(final_origin, idx, matrix) * 60;
    let robust_travel_sec = travel_minutes(final_origin, idx, matrix) * 60;
    let ideal_arrival = final_time + ideal_travel_sec;
    let robust_arrival = final_time + robust_travel_sec;

    let feasible = |arrival: i32| -> bool {
        match (window, last_close) {
            (Some(w), Some(close)) => {
                let start_service = arrival.max(w.0);
                start_service <= close && start_service + node.service_duration_min * 60 <= day_end
            }
            _ => false,
        }
    };

    let ideal_feasible = feasible(ideal_arrival);
    let robust_feasible = feasible(robust_arrival);
    let wait = window.map(|w| (w.0 - robust_arrival).max(0) / 60).unwrap_or(0);

    let reason = if !ideal_feasible {
        DropReasonCode::TimeWindowConflict
    } else if !robust_feasible {
        DropReasonCode::RobustTimeInfeasible
    } else if hard_node_count > 0 && !node.constraints.is_hard_node {
        DropReasonCode::HardNodeProtection
    } else if wait > 15 {
        DropReasonCode::HighWaitTime
    } else if node.effective_priority() >= 4 {
        DropReasonCode::LowPriorityNotWorth
    } else {
        DropReasonCode::InsufficientTotalTime
    };

    let ctx = ExplainContext {
        arrival_time_sec: Some(robust_arrival),
        window_close_sec: last_close,
        wait_minutes: Some(wait as f64),
        day_end_sec: Some(day_end),
        hard_node_count: Some(hard_node_count),
        transport_policy: Some(transport_policy_snapshot(matrix)),
        ..Default::default()
    };

    (reason, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GeoPoint, MatrixComponents, MatrixPolicySnapshot, PlanNodeConstraints, PlanNodeMeta, PlanNodeType};

    fn flat_matrix(n: usize, minutes: f64) -> RobustTimeMatrix {
        let mut m = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    m[i][j] = minutes;
                }
            }
        }
        RobustTimeMatrix {
            unit_minute: true,
            matrix: m.clone(),
            ideal: m,
            policy: MatrixPolicySnapshot {
                buffer_factor: 1.2,
                fixed_buffer_min: 15.0,
            },
            components: MatrixComponents::default(),
        }
    }

    fn simple_node(id: &str, is_hard: bool, window: (i32, i32), service: i32) -> PlanNode {
        PlanNode {
            id: id.to_string(),
            name: id.to_string(),
            node_type: PlanNodeType::Poi,
            geo: GeoPoint::new(0.0, 0.0),
            service_duration_min: service,
            time_windows: vec![window],
            constraints: PlanNodeConstraints {
                is_hard_node: is_hard,
                priority_level: 3,
                drop_penalty: None,
                reward: Some(5.0),
            },
            meta: PlanNodeMeta::default(),
        }
    }

    #[test]
    fn single_feasible_visit_is_routed() {
        let nodes = vec![simple_node("a", false, (0, 24 * 3600), 60)];
        let matrix = flat_matrix(1, 0.0);
        let request = SolveRequest {
            day_start_sec: 9 * 3600,
            day_end_sec: 18 * 3600,
            nodes: &nodes,
            matrix: &matrix,
            pacing: Pacing::Normal,
            objective_weights: None,
            lunch: LunchPolicy {
                enabled: false,
                ..LunchPolicy::default()
            },
            lifestyle: LifestylePolicy::default(),
        };
        let result = solve(&request);
        assert_eq!(result.status, SolveStatus::Feasible);
        assert_eq!(result.route.len(), 1);
        assert!(result.dropped.is_empty());
    }

    #[test]
    fn hard_node_protects_against_conflicting_soft_node() {
        // H's two-hour service consumes the entire (short) day, so the
        // soft-node loop never gets a turn at S even though S would have
        // been reachable in isolation.
        let hard = simple_node("H", true, (9 * 3600, 11 * 3600), 120);
        let soft = simple_node("S", false, (9 * 3600, 11 * 3600), 0);
        let nodes = vec![hard, soft];
        let matrix = flat_matrix(2, 0.0);
        let request = SolveRequest {
            day_start_sec: 9 * 3600,
            day_end_sec: 11 * 3600,
            nodes: &nodes,
            matrix: &matrix,
            pacing: Pacing::Normal,
            objective_weights: None,
            lunch: LunchPolicy {
                enabled: false,
                ..LunchPolicy::default()
            },
            lifestyle: LifestylePolicy::default(),
        };
        let result = solve(&request);
        assert_eq!(result.status, SolveStatus::Feasible);
        assert_eq!(result.route.len(), 1);
        assert_eq!(result.route[0].node_id, "H");
        assert_eq!(result.dropped.len(), 1);
        assert_eq!(result.dropped[0].node_id, "S");
        assert_eq!(result.dropped[0].reason_code, DropReasonCode::HardNodeProtection);
    }

    #[test]
    fn summary_totals_match_route_sums() {
        let nodes = vec![
            simple_node("a", false, (9 * 3600, 17 * 3600), 60),
            simple_node("b", false, (9 * 3600, 17 * 3600), 60),
        ];
        let matrix = flat_matrix(2, 10.0);
        let request = SolveRequest {
            day_start_sec: 9 * 3600,
            day_end_sec: 17 * 3600,
            nodes: &nodes,
            matrix: &matrix,
            pacing: Pacing::Normal,
            objective_weights: None,
            lunch: LunchPolicy {
                enabled: false,
                ..LunchPolicy::default()
            },
            lifestyle: LifestylePolicy::default(),
        };
        let result = solve(&request);
        let travel_sum: i32 = result.route.iter().map(|r| r.travel_min_from_prev).sum();
        let wait_sum: i32 = result.route.iter().map(|r| r.wait_min).sum();
        let service_sum: i32 = result.route.iter().map(|r| (r.end_service - r.start_service) / 60).sum();
        assert_eq!(result.summary.total_travel_min, travel_sum);
        assert_eq!(result.summary.total_wait_min, wait_sum);
        assert_eq!(result.summary.total_service_min, service_sum);
    }

    fn two_node_matrix_with_ideal(ideal_minutes: f64, buffer_factor: f64) -> RobustTimeMatrix {
        let robust = (ideal_minutes * buffer_factor).round();
        RobustTimeMatrix {
            unit_minute: true,
            matrix: vec![vec![0.0, robust], vec![robust, 0.0]],
            ideal: vec![vec![0.0, ideal_minutes], vec![ideal_minutes, 0.0]],
            policy: MatrixPolicySnapshot {
                buffer_factor,
                fixed_buffer_min: 0.0,
            },
            components: MatrixComponents::default(),
        }
    }

    #[test]
    fn robust_infeasibility_drops_node_unreachable_under_buffer() {
        let a0 = simple_node("A0", true, (9 * 3600, 18 * 3600), 0);
        let b = simple_node("B", false, (9 * 3600, 9 * 3600 + 25 * 60), 10);
        let nodes = vec![a0, b];

        let base_request = |matrix: &RobustTimeMatrix| SolveRequest {
            day_start_sec: 9 * 3600,
            day_end_sec: 18 * 3600,
            nodes: &nodes,
            matrix,
            pacing: Pacing::Normal,
            objective_weights: None,
            lunch: LunchPolicy {
                enabled: false,
                ..LunchPolicy::default()
            },
            lifestyle: LifestylePolicy::default(),
        };

        // bufferFactor=1.0: robust travel (20 min) keeps arrival at 09:20,
        // inside B's 09:25 close.
        let reachable_matrix = two_node_matrix_with_ideal(20.0, 1.0);
        let reachable = solve(&base_request(&reachable_matrix));
        assert!(reachable.route.iter().any(|r| r.node_id == "B"));

        // bufferFactor=1.5: the same ideal travel time inflates to 30 min,
        // pushing arrival to 09:30 and past B's close.
        let unreachable_matrix = two_node_matrix_with_ideal(20.0, 1.5);
        let unreachable = solve(&base_request(&unreachable_matrix));
        assert!(!unreachable.route.iter().any(|r| r.node_id == "B"));
        let dropped = unreachable.dropped.iter().find(|d| d.node_id == "B").unwrap();
        assert_eq!(dropped.reason_code, DropReasonCode::RobustTimeInfeasible);
    }

    #[test]
    fn early_departure_conflict_reports_required_departure_and_earliest_start() {
        let hard = simple_node("H", true, (9 * 3600, 12 * 3600), 60);
        let nodes = vec![hard];
        let matrix = flat_matrix(1, 0.0);
        let request = SolveRequest {
            day_start_sec: 9 * 3600,
            day_end_sec: 18 * 3600,
            nodes: &nodes,
            matrix: &matrix,
            pacing: Pacing::Normal,
            objective_weights: None,
            lunch: LunchPolicy {
                enabled: false,
                ..LunchPolicy::default()
            },
            lifestyle: LifestylePolicy {
                earliest_first_stop: Some(10 * 3600),
            },
        };
        let result = solve(&request);
        assert_eq!(result.status, SolveStatus::Infeasible);
        let dropped = result.dropped.iter().find(|d| d.node_id == "H").unwrap();
        assert_eq!(dropped.reason_code, DropReasonCode::EarlyDepartureConflict);
        assert_eq!(
            dropped.explanation.facts.get("required_departure").and_then(|v| v.as_str()),
            Some("09:00")
        );
        assert_eq!(
            dropped.explanation.facts.get("effective_earliest_start").and_then(|v| v.as_str()),
            Some("10:00")
        );
    }
}
