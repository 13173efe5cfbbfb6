//! Robust Time Matrix (C1, spec.md §4.1).
//!
//! `T_robust(i,j) = round(T_api(i,j) * alpha + beta + T_switch(i,j) + T_cross(i,j))`.

use std::collections::HashMap;
use std::sync::Mutex;

use geo::HaversineDistance;

use crate::config::{TransportPolicy, TravelMode};
use crate::model::{GeoPoint, MatrixComponents, MatrixPolicySnapshot, PlanNode, RobustTimeMatrix};
use crate::traits::{TravelTimeMode, TravelTimeProvider};

/// Per-pair travel-time cache keyed by `(lat1,lng1,lat2,lng2,mode)` (spec.md
/// §4.1). Coordinates are rounded to 1e-5 degrees (~1.1m) before hashing so
/// floating-point jitter doesn't fragment the cache.
#[derive(Default)]
pub struct PairCache {
    inner: Mutex<HashMap<(i64, i64, i64, i64, TravelTimeMode), f64>>,
}

impl PairCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(from: GeoPoint, to: GeoPoint, mode: TravelTimeMode) -> (i64, i64, i64, i64, TravelTimeMode) {
        let q = |v: f64| (v * 1e5).round() as i64;
        (q(from.lat), q(from.lng), q(to.lat), q(to.lng), mode)
    }

    fn get(&self, from: GeoPoint, to: GeoPoint, mode: TravelTimeMode) -> Option<f64> {
        self.inner.lock().unwrap().get(&Self::key(from, to, mode)).copied()
    }

    fn put(&self, from: GeoPoint, to: GeoPoint, mode: TravelTimeMode, minutes: f64) {
        self.inner
            .lock()
            .unwrap()
            .insert(Self::key(from, to, mode), minutes);
    }
}

/// Great-circle distance fallback when the provider fails (spec.md §4.1):
/// walk 5 km/h, drive 25 km/h, transit ≤5km at 30 km/h else 40 km/h.
fn fallback_minutes(from: GeoPoint, to: GeoPoint, mode: TravelTimeMode) -> f64 {
    let p1: geo_types::Point<f64> = from.into();
    let p2: geo_types::Point<f64> = to.into();
    let km = p1.haversine_distance(&p2) / 1000.0;

    let speed_kmh = match mode {
        TravelTimeMode::Walk => 5.0,
        TravelTimeMode::Drive => 25.0,
        TravelTimeMode::Transit if km <= 5.0 => 30.0,
        TravelTimeMode::Transit => 40.0,
    };

    (km / speed_kmh) * 60.0
}

async fn api_duration_minutes(
    from: GeoPoint,
    to: GeoPoint,
    mode: TravelTimeMode,
    provider: &dyn TravelTimeProvider,
    cache: &PairCache,
) -> f64 {
    if let Some(cached) = cache.get(from, to, mode) {
        return cached;
    }

    let minutes = match provider.duration(from, to, mode).await {
        Ok(minutes) => minutes,
        Err(_) => fallback_minutes(from, to, mode),
    };

    cache.put(from, to, mode, minutes);
    minutes
}

/// Infers a node's local travel mode from its tags (spec.md §4.1): a node
/// tagged `metro` or `station` is `Metro`, everything else is `Walk`.
pub fn mode_of(node: &PlanNode) -> TravelMode {
    if node
        .meta
        .tags
        .iter()
        .any(|tag| tag == "metro" || tag == "station")
    {
        TravelMode::Metro
    } else {
        TravelMode::Walk
    }
}

fn switch_cost(policy: &TransportPolicy, from: &PlanNode, to: &PlanNode) -> f64 {
    let from_mode = mode_of(from);
    let to_mode = mode_of(to);
    if from_mode == to_mode {
        return 0.0;
    }
    policy
        .switch_cost_min
        .get(&(from_mode, to_mode))
        .copied()
        .unwrap_or(0.0)
}

fn cross_region_cost(policy: &TransportPolicy, from: &PlanNode, to: &PlanNode) -> f64 {
    match (&from.meta.region_id, &to.meta.region_id) {
        (Some(a), Some(b)) if a != b => policy.cross_region_cost_min,
        _ => 0.0,
    }
}

struct Cell {
    robust: f64,
    api: f64,
    buffer: f64,
    fixed: f64,
    switch: f64,
    cross: f64,
}

fn assemble_cell(api: f64, policy: &TransportPolicy, from: &PlanNode, to: &PlanNode) -> Cell {
    let buffer = api * (policy.buffer_factor - 1.0);
    let fixed = policy.fixed_buffer_min;
    let switch = switch_cost(policy, from, to);
    let cross = cross_region_cost(policy, from, to);
    let robust = (api * policy.buffer_factor + fixed + switch + cross).round();
    Cell {
        robust,
        api,
        buffer,
        fixed,
        switch,
        cross,
    }
}

fn empty_matrix(n: usize) -> (Vec<Vec<f64>>, Vec<Vec<f64>>, MatrixComponents) {
    (
        vec![vec![0.0; n]; n],
        vec![vec![0.0; n]; n],
        MatrixComponents {
            api: vec![vec![0.0; n]; n],
            buffer: vec![vec![0.0; n]; n],
            fixed: vec![vec![0.0; n]; n],
            switch: vec![vec![0.0; n]; n],
            cross_region: vec![vec![0.0; n]; n],
        },
    )
}

/// Builds the robust time matrix over `nodes`, in the given order.
///
/// `mode` is the travel-time provider mode used for every pair (e.g. the
/// day's primary transport mode); switch and cross-region penalties are
/// computed independently per pair from node tags/regions.
pub async fn build_robust_time_matrix(
    nodes: &[PlanNode],
    policy: &TransportPolicy,
    mode: TravelTimeMode,
    provider: &dyn TravelTimeProvider,
    cache: &PairCache,
) -> RobustTimeMatrix {
    let n = nodes.len();
    let (mut matrix, mut ideal, mut components) = empty_matrix(n);

    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let api = api_duration_minutes(nodes[i].geo, nodes[j].geo, mode, provider, cache).await;
            let cell = assemble_cell(api, policy, &nodes[i], &nodes[j]);

            components.api[i][j] = cell.api;
            components.buffer[i][j] = cell.buffer;
            components.fixed[i][j] = cell.fixed;
            components.switch[i][j] = cell.switch;
            components.cross_region[i][j] = cell.cross;
            matrix[i][j] = cell.robust;
            ideal[i][j] = cell.api;
        }
    }

    RobustTimeMatrix {
        unit_minute: true,
        matrix,
        ideal,
        policy: MatrixPolicySnapshot {
            buffer_factor: policy.buffer_factor,
            fixed_buffer_min: policy.fixed_buffer_min,
        },
        components,
    }
}

/// Builds the matrix using only the great-circle fallback, with no provider
/// round trips at all (spec.md §5: a child that would overrun a request
/// deadline returns its most recent best-effort value instead of erroring).
/// Used by [`crate::pipeline::plan_day`] when the provider-backed build
/// doesn't finish before the request's deadline.
pub fn build_fallback_matrix(nodes: &[PlanNode], policy: &TransportPolicy, mode: TravelTimeMode) -> RobustTimeMatrix {
    let n = nodes.len();
    let (mut matrix, mut ideal, mut components) = empty_matrix(n);

    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let api = fallback_minutes(nodes[i].geo, nodes[j].geo, mode);
            let cell = assemble_cell(api, policy, &nodes[i], &nodes[j]);

            components.api[i][j] = cell.api;
            components.buffer[i][j] = cell.buffer;
            components.fixed[i][j] = cell.fixed;
            components.switch[i][j] = cell.switch;
            components.cross_region[i][j] = cell.cross;
            matrix[i][j] = cell.robust;
            ideal[i][j] = cell.api;
        }
    }

    RobustTimeMatrix {
        unit_minute: true,
        matrix,
        ideal,
        policy: MatrixPolicySnapshot {
            buffer_factor: policy.buffer_factor,
            fixed_buffer_min: policy.fixed_buffer_min,
        },
        components,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PlanNodeConstraints, PlanNodeMeta, PlanNodeType};
    use async_trait::async_trait;

    struct AlwaysFails;

    #[async_trait]
    impl TravelTimeProvider for AlwaysFails {
        async fn duration(&self, _from: GeoPoint, _to: GeoPoint, _mode: TravelTimeMode) -> Result<f64, String> {
            Err("down".to_string())
        }
    }

    struct Fixed(f64);

    #[async_trait]
    impl TravelTimeProvider for Fixed {
        async fn duration(&self, _from: GeoPoint, _to: GeoPoint, _mode: TravelTimeMode) -> Result<f64, String> {
            Ok(self.0)
        }
    }

    fn node(id: &str, lat: f64, lng: f64) -> PlanNode {
        PlanNode {
            id: id.to_string(),
            name: id.to_string(),
            node_type: PlanNodeType::Poi,
            geo: GeoPoint::new(lat, lng),
            service_duration_min: 30,
            time_windows: vec![(0, 24 * 3600)],
            constraints: PlanNodeConstraints::default(),
            meta: PlanNodeMeta::default(),
        }
    }

    #[tokio::test]
    async fn diagonal_is_zero() {
        let nodes = vec![node("a", 10.0, 100.0), node("b", 10.1, 100.1)];
        let policy = TransportPolicy::default();
        let cache = PairCache::new();
        let m = build_robust_time_matrix(&nodes, &policy, TravelTimeMode::Drive, &Fixed(10.0), &cache).await;
        assert_eq!(m.matrix[0][0], 0.0);
        assert_eq!(m.matrix[1][1], 0.0);
    }

    #[tokio::test]
    async fn applies_buffer_factor_and_fixed_buffer() {
        let nodes = vec![node("a", 10.0, 100.0), node("b", 10.1, 100.1)];
        let mut policy = TransportPolicy::default();
        policy.buffer_factor = 1.5;
        policy.fixed_buffer_min = 5.0;
        let cache = PairCache::new();
        let m = build_robust_time_matrix(&nodes, &policy, TravelTimeMode::Drive, &Fixed(10.0), &cache).await;
        assert_eq!(m.matrix[0][1], (10.0 * 1.5 + 5.0_f64).round());
    }

    #[tokio::test]
    async fn falls_back_to_haversine_on_provider_failure() {
        let nodes = vec![node("a", 0.0, 0.0), node("b", 0.0, 1.0)];
        let policy = TransportPolicy {
            buffer_factor: 1.0,
            fixed_buffer_min: 0.0,
            ..TransportPolicy::default()
        };
        let cache = PairCache::new();
        let m = build_robust_time_matrix(&nodes, &policy, TravelTimeMode::Drive, &AlwaysFails, &cache).await;
        assert!(m.matrix[0][1] > 0.0);
    }

    #[tokio::test]
    async fn cross_region_penalty_applied_once_regions_differ() {
        let mut a = node("a", 10.0, 100.0);
        a.meta.region_id = Some("north".to_string());
        let mut b = node("b", 10.1, 100.1);
        b.meta.region_id = Some("south".to_string());
        let policy = TransportPolicy {
            buffer_factor: 1.0,
            fixed_buffer_min: 0.0,
            cross_region_cost_min: 8.0,
            ..TransportPolicy::default()
        };
        let cache = PairCache::new();
        let m = build_robust_time_matrix(&[a, b], &policy, TravelTimeMode::Drive, &Fixed(10.0), &cache).await;
        assert_eq!(m.matrix[0][1], 18.0);
    }

    #[test]
    fn fallback_matrix_needs_no_provider() {
        let nodes = vec![node("a", 0.0, 0.0), node("b", 0.0, 1.0)];
        let policy = TransportPolicy {
            buffer_factor: 1.0,
            fixed_buffer_min: 0.0,
            ..TransportPolicy::default()
        };
        let m = build_fallback_matrix(&nodes, &policy, TravelTimeMode::Drive);
        assert!(m.matrix[0][1] > 0.0);
        assert_eq!(m.matrix[0][0], 0.0);
    }
}
