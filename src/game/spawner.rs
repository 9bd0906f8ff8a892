//! Periodic weapon and powerup spawns for active matches

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{GameConfig, SpawnerConfig};
use crate::session::{Broadcaster, Echo};
use crate::ws::protocol::{PowerupKind, ServerMsg, Vec2, WeaponKind};

use super::r#match::{MatchRegistry, MatchState};

/// What appeared in the arena
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpawnItem {
    Weapon(WeaponKind),
    Powerup(PowerupKind),
}

/// A single spawn, broadcast once and then forgotten
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnEvent {
    pub id: Uuid,
    pub item: SpawnItem,
    pub position: Vec2,
}

impl SpawnEvent {
    pub fn into_msg(self, match_id: Uuid) -> ServerMsg {
        match self.item {
            SpawnItem::Weapon(variant) => ServerMsg::WeaponSpawned {
                match_id,
                id: self.id,
                variant,
                position: self.position,
            },
            SpawnItem::Powerup(variant) => ServerMsg::PowerupSpawned {
                match_id,
                id: self.id,
                variant,
                effect: variant.effect(),
                position: self.position,
            },
        }
    }
}

/// Starts the two spawn generators of a match.
///
/// Generators look the match up on every tick and stop on their own once it
/// is no longer active, even if their handles were never aborted.
#[derive(Clone)]
pub struct SpawnScheduler {
    config: SpawnerConfig,
    bounds: (f32, f32, f32, f32),
    matches: Arc<MatchRegistry>,
    broadcaster: Broadcaster,
}

impl SpawnScheduler {
    pub fn new(config: &GameConfig, matches: Arc<MatchRegistry>, broadcaster: Broadcaster) -> Self {
        Self {
            config: config.spawner.clone(),
            bounds: config.play_bounds,
            matches,
            broadcaster,
        }
    }

    /// Spawn the weapon and powerup generator tasks
    pub fn start(&self, match_id: Uuid) -> (JoinHandle<()>, JoinHandle<()>) {
        let weapons = tokio::spawn(self.clone().run(
            match_id,
            self.config.weapon_seed_delay,
            self.config.weapon_interval,
            pick_weapon,
        ));
        let powerups = tokio::spawn(self.clone().run(
            match_id,
            self.config.powerup_interval,
            self.config.powerup_interval,
            pick_powerup,
        ));
        (weapons, powerups)
    }

    async fn run(
        self,
        match_id: Uuid,
        first: Duration,
        period: Duration,
        pick: fn(&mut ChaCha8Rng) -> SpawnItem,
    ) {
        let mut ticker = interval_at(Instant::now() + first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !self.emit(match_id, pick) {
                debug!(match_id = %match_id, "Spawner stopped, match no longer active");
                break;
            }
        }
    }

    /// Generate and broadcast one spawn. Returns false when the match is
    /// gone or not active.
    pub fn emit(&self, match_id: Uuid, pick: fn(&mut ChaCha8Rng) -> SpawnItem) -> bool {
        let (min_x, min_y, max_x, max_y) = self.bounds;
        self.matches
            .with(&match_id, |game| {
                if game.state != MatchState::Active {
                    return false;
                }

                let item = pick(&mut game.rng);
                let position = Vec2::new(
                    game.rng.gen_range(min_x..=max_x),
                    game.rng.gen_range(min_y..=max_y),
                );
                let event = SpawnEvent {
                    id: Uuid::new_v4(),
                    item,
                    position,
                };

                info!(match_id = %match_id, item = ?event.item, "Item spawned");
                self.broadcaster
                    .to_room(game, event.into_msg(match_id), Echo::Everyone);
                true
            })
            .unwrap_or(false)
    }
}

pub fn pick_weapon(rng: &mut ChaCha8Rng) -> SpawnItem {
    let variant = WeaponKind::ALL.choose(rng).copied().unwrap_or(WeaponKind::Sword);
    SpawnItem::Weapon(variant)
}

pub fn pick_powerup(rng: &mut ChaCha8Rng) -> SpawnItem {
    let variant = PowerupKind::ALL.choose(rng).copied().unwrap_or(PowerupKind::Health);
    SpawnItem::Powerup(variant)
}
