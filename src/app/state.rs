//! Application state shared across routes

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::game::{MatchLifecycle, MatchRegistry};
use crate::session::{Broadcaster, ConnectionRegistry};
use crate::store::{InMemoryRecordStore, RecordStore, SupabaseClient, SupabaseRecordStore};
use crate::ws::dispatch::Dispatcher;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub connections: Arc<ConnectionRegistry>,
    pub matches: Arc<MatchRegistry>,
    pub lifecycle: MatchLifecycle,
    pub dispatcher: Dispatcher,
    pub records: Arc<dyn RecordStore>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Record storage: Supabase when configured, otherwise process memory
        let records: Arc<dyn RecordStore> = match (&config.supabase_url, &config.supabase_service_role_key) {
            (Some(url), Some(key)) => {
                info!(url = %url, "Using Supabase record store");
                Arc::new(SupabaseRecordStore::new(SupabaseClient::new(url, key)))
            }
            _ => {
                warn!("Supabase not configured, records are kept in memory");
                Arc::new(InMemoryRecordStore::new())
            }
        };

        let game_config = Arc::new(config.game.clone());
        let connections = Arc::new(ConnectionRegistry::new());
        let matches = Arc::new(MatchRegistry::new());

        let lifecycle = MatchLifecycle::new(
            game_config.clone(),
            matches.clone(),
            connections.clone(),
            records.clone(),
        );
        let dispatcher = Dispatcher::new(
            &game_config,
            lifecycle.clone(),
            matches.clone(),
            Broadcaster::new(connections.clone()),
        );

        Self {
            config,
            connections,
            matches,
            lifecycle,
            dispatcher,
            records,
        }
    }
}
