//! Process-wide application context (spec.md §5): every pipeline call takes
//! an explicit `&AppContext` rather than reaching into globals, so a host
//! process can run several configurations side by side in tests.

use std::sync::Arc;

use crate::cache::TieredCache;
use crate::config::{CacheConfig, LifestylePolicy, LunchPolicy, ObjectiveWeights, RouterConfig, TransportPolicy};
use crate::matrix::PairCache;
use crate::observability::{Metrics, TraceStore};
use crate::router::DataSourceRouter;
use crate::traits::{CacheBackend, DirectionStore, PlaceStore, TravelTimeProvider};

/// Bundles the external collaborators (spec.md §6) with the process-wide
/// shared state (trace store, metrics, adapter registry, travel-time pair
/// cache) and the default policy configs every component falls back to.
pub struct AppContext {
    pub place_store: Arc<dyn PlaceStore>,
    pub direction_store: Arc<dyn DirectionStore>,
    pub travel_time_provider: Arc<dyn TravelTimeProvider>,
    pub direction_cache_backend: Arc<dyn CacheBackend>,
    pub poi_cache_backend: Arc<dyn CacheBackend>,

    pub router: DataSourceRouter,
    pub traces: TraceStore,
    pub metrics: Metrics,
    pub pair_cache: PairCache,

    pub transport_policy: TransportPolicy,
    pub objective_weights: ObjectiveWeights,
    pub lunch_policy: LunchPolicy,
    pub lifestyle_policy: LifestylePolicy,
    pub cache_config: CacheConfig,
    pub router_config: RouterConfig,
}

impl AppContext {
    pub fn new(
        place_store: Arc<dyn PlaceStore>,
        direction_store: Arc<dyn DirectionStore>,
        travel_time_provider: Arc<dyn TravelTimeProvider>,
        direction_cache_backend: Arc<dyn CacheBackend>,
        poi_cache_backend: Arc<dyn CacheBackend>,
    ) -> Self {
        let cache_config = CacheConfig::default();
        Self {
            place_store,
            direction_store,
            travel_time_provider,
            direction_cache_backend,
            poi_cache_backend,
            router: DataSourceRouter::new(),
            traces: TraceStore::new(cache_config.trace_store_cap),
            metrics: Metrics::new(),
            pair_cache: PairCache::new(),
            transport_policy: TransportPolicy::default(),
            objective_weights: ObjectiveWeights::default(),
            lunch_policy: LunchPolicy::default(),
            lifestyle_policy: LifestylePolicy::default(),
            cache_config,
            router_config: RouterConfig::default(),
        }
    }

    pub fn direction_cache(&self) -> TieredCache<'_> {
        TieredCache::new(self.direction_cache_backend.as_ref(), "direction")
    }

    pub fn poi_cache(&self) -> TieredCache<'_> {
        TieredCache::new(self.poi_cache_backend.as_ref(), "poi")
    }
}
