//! Match aggregate and the registry that owns every live match

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::GameError;
use crate::session::Identity;
use crate::ws::protocol::{EndReason, Vec2};

/// Match lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    /// Created, waiting for the start delay
    Pending,
    /// Countdown and spawners running
    Active,
    /// Terminal
    Ended,
}

/// Per-participant state tracked by the server
#[derive(Debug, Clone)]
pub struct Participant {
    /// Assigned on activation
    pub slot: Option<u32>,
    /// Last known health, used for the time-up winner
    pub health: f32,
}

/// A validated arrow release awaiting its hit report
#[derive(Debug, Clone)]
pub struct PendingProjectile {
    pub owner: Identity,
    pub origin: Vec2,
    pub angle: f32,
    pub power: f32,
    pub created_at_ms: u64,
}

/// Cancellable timer tasks belonging to one match
#[derive(Debug, Default)]
pub struct MatchTimers {
    pub activation: Option<JoinHandle<()>>,
    pub countdown: Option<JoinHandle<()>>,
    pub weapon: Option<JoinHandle<()>>,
    pub powerup: Option<JoinHandle<()>>,
}

impl MatchTimers {
    /// Abort every running timer. Handles are taken, so a second call
    /// finds nothing to cancel. Returns how many were aborted.
    pub fn cancel_all(&mut self) -> usize {
        [
            self.activation.take(),
            self.countdown.take(),
            self.weapon.take(),
            self.powerup.take(),
        ]
        .into_iter()
        .flatten()
        .map(|handle| handle.abort())
        .count()
    }

    pub fn is_clear(&self) -> bool {
        self.activation.is_none()
            && self.countdown.is_none()
            && self.weapon.is_none()
            && self.powerup.is_none()
    }
}

/// One authoritative game session
#[derive(Debug)]
pub struct Match {
    pub id: Uuid,
    pub seed: u64,
    pub state: MatchState,
    pub host: Identity,
    /// Ordered by identity; slot assignment follows this order
    pub roster: BTreeMap<Identity, Participant>,
    /// Always a subset of the roster keys
    pub alive: BTreeSet<Identity>,
    /// Left while active; still owed a loss when the match ends
    pub departed: BTreeSet<Identity>,
    /// Roster size at activation
    pub started_with: usize,
    pub duration_secs: u32,
    pub time_remaining: u32,
    pub timers: MatchTimers,
    pub pending_projectiles: HashMap<Uuid, PendingProjectile>,
    pub end_reason: Option<EndReason>,
    pub winner: Option<Identity>,
    pub rng: ChaCha8Rng,
}

impl Match {
    pub fn new(
        id: Uuid,
        seed: u64,
        host: Identity,
        roster: impl IntoIterator<Item = Identity>,
        duration_secs: u32,
        max_health: f32,
    ) -> Self {
        let roster = roster
            .into_iter()
            .map(|identity| {
                (
                    identity,
                    Participant {
                        slot: None,
                        health: max_health,
                    },
                )
            })
            .collect();

        Self {
            id,
            seed,
            state: MatchState::Pending,
            host,
            roster,
            alive: BTreeSet::new(),
            departed: BTreeSet::new(),
            started_with: 0,
            duration_secs,
            time_remaining: duration_secs,
            timers: MatchTimers::default(),
            pending_projectiles: HashMap::new(),
            end_reason: None,
            winner: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn is_live(&self) -> bool {
        self.state != MatchState::Ended
    }

    pub fn is_participant(&self, identity: &Identity) -> bool {
        self.roster.contains_key(identity)
    }

    /// Seconds the countdown has run
    pub fn elapsed_secs(&self) -> u32 {
        self.duration_secs.saturating_sub(self.time_remaining)
    }

    /// Drop a participant from both roster and alive set. Leaving an active
    /// match is remembered for the end-of-match records.
    pub fn remove_participant(&mut self, identity: &Identity) -> Option<Participant> {
        self.alive.remove(identity);
        let removed = self.roster.remove(identity);
        if removed.is_some() && self.state == MatchState::Active {
            self.departed.insert(identity.clone());
        }
        removed
    }

    /// Everyone whose record this match affects
    pub fn record_holders(&self) -> Vec<Identity> {
        self.roster.keys().chain(self.departed.iter()).cloned().collect()
    }

    /// Participant still eligible to win with the most health.
    /// Ties go to the lexicographically lowest identity.
    pub fn healthiest_alive(&self) -> Option<Identity> {
        let mut best: Option<(&Identity, f32)> = None;
        for identity in &self.alive {
            let health = self.roster.get(identity).map(|p| p.health).unwrap_or(0.0);
            match best {
                Some((_, top)) if health <= top => {}
                _ => best = Some((identity, health)),
            }
        }
        best.map(|(identity, _)| identity.clone())
    }
}

/// Shared handle to a match; the mutex serializes all mutation per match
pub type MatchHandle = Arc<Mutex<Match>>;

/// Registry of all matches, live and recently ended
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn insert(&self, game: Match) -> MatchHandle {
        let id = game.id;
        let handle = Arc::new(Mutex::new(game));
        self.matches.insert(id, handle.clone());
        handle
    }

    pub fn remove(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.remove(id).map(|(_, h)| h)
    }

    /// Run `f` with exclusive access to a match
    pub fn with<R>(&self, id: &Uuid, f: impl FnOnce(&mut Match) -> R) -> Result<R, GameError> {
        let handle = self.get(id).ok_or(GameError::UnknownMatch(*id))?;
        let mut game = handle.lock();
        Ok(f(&mut game))
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    fn handles(&self) -> Vec<MatchHandle> {
        self.matches.iter().map(|m| m.value().clone()).collect()
    }

    /// Ids of matches that are pending or active
    pub fn live_ids(&self) -> Vec<Uuid> {
        self.handles()
            .into_iter()
            .filter_map(|h| {
                let game = h.lock();
                game.is_live().then_some(game.id)
            })
            .collect()
    }

    pub fn active_matches(&self) -> usize {
        self.live_ids().len()
    }

    /// Every identity on the roster of a pending or active match
    pub fn engaged_identities(&self) -> BTreeSet<Identity> {
        let mut engaged = BTreeSet::new();
        for handle in self.handles() {
            let game = handle.lock();
            if game.is_live() {
                engaged.extend(game.roster.keys().cloned());
            }
        }
        engaged
    }

    /// The pending or active match an identity belongs to, if any
    pub fn live_match_of(&self, identity: &Identity) -> Option<Uuid> {
        self.handles().into_iter().find_map(|h| {
            let game = h.lock();
            (game.is_live() && game.is_participant(identity)).then_some(game.id)
        })
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<Identity> {
        names.iter().map(|n| Identity::new(*n)).collect()
    }

    fn sample_match() -> Match {
        Match::new(Uuid::new_v4(), 7, Identity::new("alice"), ids(&["carol", "alice", "bob"]), 60, 100.0)
    }

    #[test]
    fn roster_iterates_in_identity_order() {
        let game = sample_match();
        let order: Vec<&str> = game.roster.keys().map(|i| i.as_str()).collect();
        assert_eq!(order, vec!["alice", "bob", "carol"]);
        assert_eq!(game.state, MatchState::Pending);
        assert_eq!(game.time_remaining, 60);
    }

    #[test]
    fn healthiest_alive_breaks_ties_by_lowest_identity() {
        let mut game = sample_match();
        game.alive = game.roster.keys().cloned().collect();
        for (name, health) in [("alice", 40.0), ("bob", 75.0), ("carol", 75.0)] {
            game.roster.get_mut(&Identity::new(name)).unwrap().health = health;
        }
        assert_eq!(game.healthiest_alive(), Some(Identity::new("bob")));

        game.alive.remove(&Identity::new("bob"));
        assert_eq!(game.healthiest_alive(), Some(Identity::new("carol")));

        game.alive.clear();
        assert_eq!(game.healthiest_alive(), None);
    }

    #[test]
    fn remove_participant_keeps_alive_subset_of_roster() {
        let mut game = sample_match();
        game.alive = game.roster.keys().cloned().collect();
        game.remove_participant(&Identity::new("bob"));
        assert!(game.alive.iter().all(|i| game.roster.contains_key(i)));
        assert_eq!(game.alive.len(), 2);
        // Pending departures owe nothing
        assert!(game.departed.is_empty());
    }

    #[test]
    fn active_departures_keep_their_record_stake() {
        let mut game = sample_match();
        game.state = MatchState::Active;
        game.alive = game.roster.keys().cloned().collect();
        game.remove_participant(&Identity::new("carol"));

        assert!(!game.roster.contains_key(&Identity::new("carol")));
        let holders: Vec<String> = game.record_holders().iter().map(|i| i.to_string()).collect();
        assert_eq!(holders, vec!["alice", "bob", "carol"]);
    }

    #[tokio::test]
    async fn cancel_all_is_idempotent() {
        let mut timers = MatchTimers {
            countdown: Some(tokio::spawn(std::future::pending())),
            weapon: Some(tokio::spawn(std::future::pending())),
            ..Default::default()
        };
        assert_eq!(timers.cancel_all(), 2);
        assert!(timers.is_clear());
        assert_eq!(timers.cancel_all(), 0);
    }

    #[test]
    fn registry_reports_unknown_match() {
        let registry = MatchRegistry::new();
        let missing = Uuid::new_v4();
        assert_eq!(registry.with(&missing, |_| ()), Err(GameError::UnknownMatch(missing)));

        let game = sample_match();
        let id = game.id;
        registry.insert(game);
        assert_eq!(registry.live_match_of(&Identity::new("carol")), Some(id));
        assert_eq!(registry.live_match_of(&Identity::new("dave")), None);

        registry.with(&id, |g| g.state = MatchState::Ended).unwrap();
        assert_eq!(registry.active_matches(), 0);
        assert_eq!(registry.len(), 1);
    }
}
