//! Win/loss record storage boundary

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::GameError;
use crate::session::Identity;

use super::supabase::{SupabaseClient, SupabaseError};

/// Persisted win/loss tally for one identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub wins: u32,
    pub losses: u32,
}

/// Narrow interface to the external record store
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_record(&self, identity: &Identity) -> Result<GameRecord, GameError>;

    async fn increment_record(&self, identity: &Identity, won: bool) -> Result<GameRecord, GameError>;
}

impl From<SupabaseError> for GameError {
    fn from(e: SupabaseError) -> Self {
        GameError::StorageFailure(e.to_string())
    }
}

/// Records kept in the `game_records` table
#[derive(Clone)]
pub struct SupabaseRecordStore {
    client: SupabaseClient,
}

#[derive(Serialize)]
struct IncrementArgs<'a> {
    p_username: &'a str,
    p_won: bool,
}

impl SupabaseRecordStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RecordStore for SupabaseRecordStore {
    async fn get_record(&self, identity: &Identity) -> Result<GameRecord, GameError> {
        let filter = format!("eq.{}", identity);
        let query = [("username", filter.as_str()), ("select", "wins,losses")];
        let record = self.client.get_one("game_records", &query).await?;
        Ok(record.unwrap_or_default())
    }

    async fn increment_record(&self, identity: &Identity, won: bool) -> Result<GameRecord, GameError> {
        // Server-side function so concurrent increments don't race
        let args = IncrementArgs {
            p_username: identity.as_str(),
            p_won: won,
        };
        Ok(self.client.rpc("increment_game_record", &args).await?)
    }
}

/// Process-local records, used without Supabase configured and in tests
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: DashMap<Identity, GameRecord>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_record(&self, identity: &Identity) -> Result<GameRecord, GameError> {
        Ok(self.records.get(identity).map(|r| *r).unwrap_or_default())
    }

    async fn increment_record(&self, identity: &Identity, won: bool) -> Result<GameRecord, GameError> {
        let mut entry = self.records.entry(identity.clone()).or_default();
        if won {
            entry.wins += 1;
        } else {
            entry.losses += 1;
        }
        Ok(*entry)
    }
}
