use crate::{
    config::Config,
    services::{AccessPolicy, AggregationEngine},
    store::EntityStore,
    websocket::{BroadcastRouter, ConnectionLifecycle, TopicRegistry},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn EntityStore>,
    pub registry: TopicRegistry,
    pub lifecycle: ConnectionLifecycle,
    pub router: BroadcastRouter,
    pub engine: AggregationEngine,
}

impl AppState {
    /// Wire the broadcast core around one store and one registry
    pub fn new(config: Arc<Config>, store: Arc<dyn EntityStore>) -> Self {
        let registry = TopicRegistry::new();
        let engine = AggregationEngine::new(store.clone());
        let router = BroadcastRouter::new(
            registry.clone(),
            AccessPolicy::new(store.clone()),
            engine.clone(),
        );

        Self {
            config,
            store,
            lifecycle: ConnectionLifecycle::new(registry.clone()),
            registry,
            router,
            engine,
        }
    }
}
