//! Match state machine: pending -> active -> ended

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::error::GameError;
use crate::session::{Broadcaster, ConnectionRegistry, Echo, Identity};
use crate::store::RecordStore;
use crate::ws::protocol::{EndReason, MatchStats, PlayerSlot, ServerMsg, Vec2};

use super::r#match::{Match, MatchRegistry, MatchState, Participant};
use super::spawner::SpawnScheduler;

/// Sole writer of match state. Cheap to clone; timer tasks hold a clone.
#[derive(Clone)]
pub struct MatchLifecycle {
    config: Arc<GameConfig>,
    matches: Arc<MatchRegistry>,
    connections: Arc<ConnectionRegistry>,
    broadcaster: Broadcaster,
    spawner: SpawnScheduler,
    records: Arc<dyn RecordStore>,
    /// Serializes roster formation so two requests can't claim the same players
    admission: Arc<Mutex<()>>,
}

impl MatchLifecycle {
    pub fn new(
        config: Arc<GameConfig>,
        matches: Arc<MatchRegistry>,
        connections: Arc<ConnectionRegistry>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        let broadcaster = Broadcaster::new(connections.clone());
        let spawner = SpawnScheduler::new(&config, matches.clone(), broadcaster.clone());
        Self {
            config,
            matches,
            connections,
            broadcaster,
            spawner,
            records,
            admission: Arc::new(Mutex::new(())),
        }
    }

    /// Create a pending match from everyone present and not already playing
    pub fn request_start(&self, requester: &Identity) -> Result<Uuid, GameError> {
        let _admission = self.admission.lock();

        if let Some(existing) = self.matches.live_match_of(requester) {
            warn!(identity = %requester, match_id = %existing, "Start rejected, already in a match");
            return Err(GameError::MatchInProgress(existing));
        }

        let present = self.connections.current();
        if !present.contains(requester) {
            return Err(GameError::Unauthorized);
        }

        let engaged = self.matches.engaged_identities();
        let roster: Vec<Identity> = present.into_iter().filter(|i| !engaged.contains(i)).collect();
        if roster.len() < self.config.min_players {
            warn!(
                identity = %requester,
                present = roster.len(),
                required = self.config.min_players,
                "Start rejected, not enough players"
            );
            return Err(GameError::NotEnoughPlayers {
                present: roster.len(),
                required: self.config.min_players,
            });
        }

        let match_id = Uuid::new_v4();
        let game = Match::new(
            match_id,
            rand::random::<u64>(),
            requester.clone(),
            roster,
            self.config.match_duration_secs,
            self.config.max_health,
        );
        let roster_size = game.roster.len();
        let handle = self.matches.insert(game);

        {
            let mut game = handle.lock();
            let lifecycle = self.clone();
            let delay = self.config.start_delay;
            game.timers.activation = Some(tokio::spawn(async move {
                sleep(delay).await;
                if let Err(e) = lifecycle.activate(match_id) {
                    debug!(match_id = %match_id, error = %e, "Activation skipped");
                }
            }));
        }

        info!(
            match_id = %match_id,
            host = %requester,
            players = roster_size,
            "Match pending"
        );
        self.broadcaster.to_all(ServerMsg::MatchPending {
            match_id,
            host: requester.clone(),
        });

        Ok(match_id)
    }

    /// Explicitly join a match that has not started yet
    pub fn join(&self, identity: &Identity, match_id: Uuid) -> Result<(), GameError> {
        let _admission = self.admission.lock();

        if let Some(existing) = self.matches.live_match_of(identity) {
            if existing == match_id {
                return Ok(());
            }
            return Err(GameError::MatchInProgress(existing));
        }

        let max_health = self.config.max_health;
        self.matches.with(&match_id, |game| match game.state {
            MatchState::Ended => Err(GameError::UnknownMatch(match_id)),
            MatchState::Active => Err(GameError::InvalidAction("match already started".into())),
            MatchState::Pending => {
                game.roster.insert(
                    identity.clone(),
                    Participant {
                        slot: None,
                        health: max_health,
                    },
                );
                info!(match_id = %match_id, identity = %identity, "Player joined pending match");
                self.broadcaster.to_room(
                    game,
                    ServerMsg::PlayerJoined {
                        match_id,
                        identity: identity.clone(),
                        slot: None,
                    },
                    Echo::Everyone,
                );
                Ok(())
            }
        })?
    }

    /// Scheduled transition out of pending
    pub fn activate(&self, match_id: Uuid) -> Result<(), GameError> {
        self.matches.with(&match_id, |game| {
            if game.state != MatchState::Pending {
                return;
            }
            // This runs on the activation task itself
            game.timers.activation = None;

            if game.roster.len() < self.config.min_players {
                warn!(match_id = %match_id, players = game.roster.len(), "Too few players at activation");
                self.finish(game, EndReason::InsufficientPlayers);
                return;
            }

            let mut players = Vec::with_capacity(game.roster.len());
            for (slot, (identity, participant)) in game.roster.iter_mut().enumerate() {
                let slot = slot as u32;
                participant.slot = Some(slot);
                participant.health = self.config.max_health;
                players.push(PlayerSlot {
                    identity: identity.clone(),
                    slot,
                    spawn: self.spawn_point(slot),
                });
            }
            game.alive = game.roster.keys().cloned().collect();
            game.started_with = game.roster.len();
            game.time_remaining = game.duration_secs;
            game.state = MatchState::Active;

            game.timers.countdown = Some(self.start_countdown(match_id));
            let (weapons, powerups) = self.spawner.start(match_id);
            game.timers.weapon = Some(weapons);
            game.timers.powerup = Some(powerups);

            info!(match_id = %match_id, seed = game.seed, players = players.len(), "Match started");
            let msg = ServerMsg::MatchStarted {
                match_id,
                host: game.host.clone(),
                players,
                time_remaining: game.time_remaining,
            };
            self.broadcaster.to_room(game, msg, Echo::Everyone);
        })
    }

    fn spawn_point(&self, slot: u32) -> Vec2 {
        let points = &self.config.spawn_points;
        if points.is_empty() {
            return Vec2::default();
        }
        let (x, y) = points[slot as usize % points.len()];
        Vec2::new(x, y)
    }

    fn start_countdown(&self, match_id: Uuid) -> tokio::task::JoinHandle<()> {
        let lifecycle = self.clone();
        tokio::spawn(async move {
            let period = Duration::from_secs(1);
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match lifecycle.countdown_tick(match_id) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        debug!(match_id = %match_id, error = %e, "Countdown stopped");
                        break;
                    }
                }
            }
        })
    }

    /// One countdown second. Returns false once the countdown should stop.
    pub fn countdown_tick(&self, match_id: Uuid) -> Result<bool, GameError> {
        self.matches.with(&match_id, |game| {
            if game.state != MatchState::Active {
                return false;
            }

            game.time_remaining = game.time_remaining.saturating_sub(1);
            let msg = ServerMsg::TimeUpdate {
                match_id,
                time_remaining: game.time_remaining,
            };
            self.broadcaster.to_room(game, msg, Echo::Everyone);

            if game.time_remaining == 0 {
                self.finish(game, EndReason::TimeUp);
                return false;
            }
            true
        })
    }

    /// A participant reported their own death
    pub fn report_death(&self, identity: &Identity, match_id: Uuid) -> Result<(), GameError> {
        self.matches.with(&match_id, |game| {
            match game.state {
                MatchState::Ended => return Err(GameError::UnknownMatch(match_id)),
                MatchState::Pending => {
                    return Err(GameError::InvalidAction("match has not started".into()))
                }
                MatchState::Active => {}
            }
            if !game.is_participant(identity) {
                return Err(GameError::NotInMatch(match_id));
            }
            if !game.alive.remove(identity) {
                debug!(match_id = %match_id, identity = %identity, "Duplicate death report");
                return Ok(());
            }
            if let Some(participant) = game.roster.get_mut(identity) {
                participant.health = 0.0;
            }

            info!(match_id = %match_id, identity = %identity, alive = game.alive.len(), "Player died");
            let msg = ServerMsg::PlayerDied {
                match_id,
                identity: identity.clone(),
            };
            self.broadcaster.to_room(game, msg, Echo::Everyone);
            self.check_termination(game);
            Ok(())
        })?
    }

    /// Remove a disconnected identity from every live match it belongs to.
    ///
    /// No-op if the identity has reconnected in the meantime; the new
    /// connection keeps the seat.
    pub fn disconnect(&self, identity: &Identity) {
        let left = self
            .connections
            .while_absent(identity, || self.leave_live_matches(identity));
        if left.is_none() {
            debug!(identity = %identity, "Disconnect ignored, identity reconnected");
        }
    }

    fn leave_live_matches(&self, identity: &Identity) {
        for match_id in self.matches.live_ids() {
            let result = self.matches.with(&match_id, |game| {
                if !game.is_live() {
                    return;
                }
                let Some(participant) = game.remove_participant(identity) else {
                    return;
                };

                if &game.host == identity {
                    if let Some(next) = game.roster.keys().next() {
                        game.host = next.clone();
                    }
                }

                info!(match_id = %match_id, identity = %identity, "Player left match");
                let msg = ServerMsg::PlayerLeft {
                    match_id,
                    identity: identity.clone(),
                    slot: participant.slot,
                };
                self.broadcaster.to_room(game, msg, Echo::Everyone);

                if game.state == MatchState::Active {
                    self.check_termination(game);
                }
            });
            if let Err(e) = result {
                debug!(match_id = %match_id, error = %e, "Match vanished during disconnect");
            }
        }
    }

    /// End a match for the given reason. Returns false if it had already ended.
    pub fn end(&self, match_id: Uuid, reason: EndReason) -> Result<bool, GameError> {
        self.matches.with(&match_id, |game| self.finish(game, reason))
    }

    /// Level-triggered check, run after every alive-set mutation
    fn check_termination(&self, game: &mut Match) {
        if game.state != MatchState::Active {
            return;
        }
        match game.alive.len() {
            0 => {
                self.finish(game, EndReason::NoPlayersRemaining);
            }
            1 => {
                self.finish(game, EndReason::LastPlayerStanding);
            }
            _ => {}
        }
    }

    fn finish(&self, game: &mut Match, reason: EndReason) -> bool {
        if game.state == MatchState::Ended {
            debug!(match_id = %game.id, reason = ?reason, "Match already ended");
            return false;
        }

        let was_active = game.state == MatchState::Active;
        let cancelled = game.timers.cancel_all();
        game.state = MatchState::Ended;
        game.pending_projectiles.clear();

        let winner = match reason {
            EndReason::LastPlayerStanding => game.alive.iter().next().cloned(),
            _ => game.healthiest_alive(),
        };
        game.end_reason = Some(reason);
        game.winner = winner.clone();

        let stats = MatchStats {
            total_players: game.started_with.max(game.roster.len()) as u32,
            elapsed_secs: game.elapsed_secs(),
            ended_at: chrono::Utc::now(),
        };

        info!(
            match_id = %game.id,
            reason = ?reason,
            winner = ?winner.as_ref().map(|w| w.as_str()),
            cancelled_timers = cancelled,
            "Match ended"
        );

        let msg = ServerMsg::MatchEnded {
            match_id: game.id,
            reason,
            winner: winner.clone(),
            stats,
        };
        self.broadcaster.to_room(game, msg, Echo::Everyone);

        if was_active {
            self.persist_records(game.id, game.record_holders(), winner);
        }
        self.schedule_removal(game.id);
        true
    }

    fn persist_records(&self, match_id: Uuid, participants: Vec<Identity>, winner: Option<Identity>) {
        let records = self.records.clone();
        tokio::spawn(async move {
            for identity in participants {
                let won = winner.as_ref() == Some(&identity);
                if let Err(e) = records.increment_record(&identity, won).await {
                    warn!(match_id = %match_id, identity = %identity, error = %e, "Failed to update record");
                }
            }
        });
    }

    fn schedule_removal(&self, match_id: Uuid) {
        let matches = self.matches.clone();
        let grace = self.config.removal_grace;
        tokio::spawn(async move {
            sleep(grace).await;
            if matches.remove(&match_id).is_some() {
                info!(match_id = %match_id, "Match removed from registry");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Connection;
    use crate::store::{GameRecord, InMemoryRecordStore};
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        lifecycle: MatchLifecycle,
        matches: Arc<MatchRegistry>,
        connections: Arc<ConnectionRegistry>,
        records: Arc<InMemoryRecordStore>,
        inboxes: Vec<(Connection, UnboundedReceiver<ServerMsg>)>,
    }

    impl Harness {
        fn new(config: GameConfig, names: &[&str]) -> Self {
            let matches = Arc::new(MatchRegistry::new());
            let connections = Arc::new(ConnectionRegistry::new());
            let records = Arc::new(InMemoryRecordStore::new());
            let lifecycle = MatchLifecycle::new(
                Arc::new(config),
                matches.clone(),
                connections.clone(),
                records.clone(),
            );
            let mut harness = Self {
                lifecycle,
                matches,
                connections,
                records,
                inboxes: Vec::new(),
            };
            for name in names {
                harness.connect(name);
            }
            harness
        }

        fn connect(&mut self, name: &str) {
            let (conn, rx) = Connection::new(Identity::new(name), true);
            self.connections.register(conn.clone()).unwrap();
            self.inboxes.push((conn, rx));
        }

        /// Close the player's socket the way the transport does
        fn leave(&self, name: &str) {
            let (conn, _) = self
                .inboxes
                .iter()
                .find(|(c, _)| c.identity().as_str() == name)
                .unwrap();
            if self.connections.unregister(conn) {
                self.lifecycle.disconnect(conn.identity());
            }
        }

        fn drain(&mut self, name: &str) -> Vec<ServerMsg> {
            let (_, rx) = self
                .inboxes
                .iter_mut()
                .find(|(c, _)| c.identity().as_str() == name)
                .unwrap();
            let mut out = Vec::new();
            while let Ok(msg) = rx.try_recv() {
                out.push(msg);
            }
            out
        }

        fn inspect<R>(&self, id: Uuid, f: impl FnOnce(&mut Match) -> R) -> R {
            self.matches.with(&id, f).unwrap()
        }
    }

    fn id(name: &str) -> Identity {
        Identity::new(name)
    }

    fn quick_config(duration_secs: u32) -> GameConfig {
        GameConfig {
            match_duration_secs: duration_secs,
            ..GameConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn last_player_standing_scenario() {
        let mut h = Harness::new(quick_config(120), &["alice", "bob", "carol"]);
        let match_id = h.lifecycle.request_start(&id("alice")).unwrap();
        assert_eq!(h.inspect(match_id, |g| g.state), MatchState::Pending);

        sleep(Duration::from_millis(2100)).await;
        h.inspect(match_id, |g| {
            assert_eq!(g.state, MatchState::Active);
            assert_eq!(g.alive.len(), 3);
            assert!(g.alive.iter().all(|i| g.roster.contains_key(i)));
            assert!(g.timers.countdown.is_some());
            assert!(g.timers.weapon.is_some());
            assert!(g.timers.powerup.is_some());
            let slots: Vec<Option<u32>> = g.roster.values().map(|p| p.slot).collect();
            assert_eq!(slots, vec![Some(0), Some(1), Some(2)]);
        });

        h.lifecycle.report_death(&id("bob"), match_id).unwrap();
        assert_eq!(h.inspect(match_id, |g| g.state), MatchState::Active);
        h.lifecycle.report_death(&id("carol"), match_id).unwrap();

        h.inspect(match_id, |g| {
            assert_eq!(g.state, MatchState::Ended);
            assert_eq!(g.end_reason, Some(EndReason::LastPlayerStanding));
            assert_eq!(g.winner, Some(id("alice")));
            assert!(g.timers.is_clear());
        });

        let ended: Vec<ServerMsg> = h
            .drain("alice")
            .into_iter()
            .filter(|m| matches!(m, ServerMsg::MatchEnded { .. }))
            .collect();
        assert_eq!(ended.len(), 1);
        if let ServerMsg::MatchEnded { winner, stats, .. } = &ended[0] {
            assert_eq!(winner.as_ref(), Some(&id("alice")));
            assert_eq!(stats.total_players, 3);
        }

        // Still resolvable during the grace period
        sleep(Duration::from_millis(4000)).await;
        assert!(h.matches.get(&match_id).is_some());
        sleep(Duration::from_millis(1100)).await;
        assert!(h.matches.get(&match_id).is_none());

        assert_eq!(
            h.records.get_record(&id("alice")).await.unwrap(),
            GameRecord { wins: 1, losses: 0 }
        );
        assert_eq!(
            h.records.get_record(&id("carol")).await.unwrap(),
            GameRecord { wins: 0, losses: 1 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn time_up_picks_healthiest_survivor() {
        let mut h = Harness::new(quick_config(3), &["alice", "bob"]);
        let match_id = h.lifecycle.request_start(&id("bob")).unwrap();
        sleep(Duration::from_millis(2100)).await;

        h.inspect(match_id, |g| {
            g.roster.get_mut(&id("alice")).unwrap().health = 55.0;
            g.roster.get_mut(&id("bob")).unwrap().health = 80.0;
        });
        h.drain("alice");

        sleep(Duration::from_millis(3500)).await;

        h.inspect(match_id, |g| {
            assert_eq!(g.state, MatchState::Ended);
            assert_eq!(g.end_reason, Some(EndReason::TimeUp));
            assert_eq!(g.winner, Some(id("bob")));
            assert_eq!(g.time_remaining, 0);
            assert!(g.timers.is_clear());
        });

        let msgs = h.drain("alice");
        let ticks: Vec<u32> = msgs
            .iter()
            .filter_map(|m| match m {
                ServerMsg::TimeUpdate { time_remaining, .. } => Some(*time_remaining),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![2, 1, 0]);
        let endings = msgs
            .iter()
            .filter(|m| matches!(m, ServerMsg::MatchEnded { reason: EndReason::TimeUp, .. }))
            .count();
        assert_eq!(endings, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn racing_terminations_end_once() {
        let mut h = Harness::new(quick_config(60), &["alice", "bob"]);
        let match_id = h.lifecycle.request_start(&id("alice")).unwrap();
        sleep(Duration::from_millis(2100)).await;
        h.drain("alice");

        assert_eq!(h.lifecycle.end(match_id, EndReason::TimeUp), Ok(true));
        assert_eq!(h.lifecycle.end(match_id, EndReason::LastPlayerStanding), Ok(false));
        assert_eq!(h.lifecycle.countdown_tick(match_id), Ok(false));
        assert!(h.lifecycle.report_death(&id("bob"), match_id).is_err());

        h.inspect(match_id, |g| {
            assert_eq!(g.end_reason, Some(EndReason::TimeUp));
            assert!(g.timers.is_clear());
        });
        let endings = h
            .drain("alice")
            .into_iter()
            .filter(|m| matches!(m, ServerMsg::MatchEnded { .. }))
            .count();
        assert_eq!(endings, 1);

        // Timers were aborted: no more time updates arrive
        sleep(Duration::from_secs(3)).await;
        assert!(h
            .drain("alice")
            .iter()
            .all(|m| !matches!(m, ServerMsg::TimeUpdate { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn non_roster_disconnect_leaves_match_untouched() {
        let mut h = Harness::new(quick_config(60), &["alice", "bob"]);
        let match_id = h.lifecycle.request_start(&id("alice")).unwrap();
        sleep(Duration::from_millis(2100)).await;

        h.connect("dave");
        h.leave("dave");

        h.inspect(match_id, |g| {
            assert_eq!(g.state, MatchState::Active);
            assert_eq!(g.roster.len(), 2);
            assert_eq!(g.alive.len(), 2);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn roster_disconnect_triggers_termination() {
        let mut h = Harness::new(quick_config(60), &["alice", "bob"]);
        let match_id = h.lifecycle.request_start(&id("alice")).unwrap();
        sleep(Duration::from_millis(2100)).await;

        h.leave("alice");

        h.inspect(match_id, |g| {
            assert_eq!(g.state, MatchState::Ended);
            assert_eq!(g.end_reason, Some(EndReason::LastPlayerStanding));
            assert_eq!(g.winner, Some(id("bob")));
            assert!(!g.roster.contains_key(&id("alice")));
        });
        assert!(h
            .drain("bob")
            .iter()
            .any(|m| matches!(m, ServerMsg::PlayerLeft { identity, .. } if identity.as_str() == "alice")));
    }

    #[tokio::test(start_paused = true)]
    async fn start_rejections() {
        let h = Harness::new(quick_config(60), &["alice"]);
        assert_eq!(
            h.lifecycle.request_start(&id("alice")),
            Err(GameError::NotEnoughPlayers { present: 1, required: 2 })
        );
        assert_eq!(h.matches.len(), 0);

        let mut h = Harness::new(quick_config(60), &["alice", "bob"]);
        let match_id = h.lifecycle.request_start(&id("alice")).unwrap();
        assert_eq!(
            h.lifecycle.request_start(&id("bob")),
            Err(GameError::MatchInProgress(match_id))
        );
        assert_eq!(h.matches.len(), 1);
        assert!(h
            .drain("bob")
            .iter()
            .any(|m| matches!(m, ServerMsg::MatchPending { host, .. } if host.as_str() == "alice")));
    }

    #[tokio::test(start_paused = true)]
    async fn join_only_while_pending() {
        let mut h = Harness::new(quick_config(60), &["alice", "bob"]);
        let match_id = h.lifecycle.request_start(&id("alice")).unwrap();

        h.connect("carol");
        h.lifecycle.join(&id("carol"), match_id).unwrap();
        assert_eq!(h.inspect(match_id, |g| g.roster.len()), 3);

        sleep(Duration::from_millis(2100)).await;
        assert_eq!(h.inspect(match_id, |g| g.alive.len()), 3);

        h.connect("dave");
        assert!(matches!(
            h.lifecycle.join(&id("dave"), match_id),
            Err(GameError::InvalidAction(_))
        ));
        assert_eq!(
            h.lifecycle.join(&id("dave"), Uuid::nil()),
            Err(GameError::UnknownMatch(Uuid::nil()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shrinking_pending_roster_aborts_activation() {
        let h = Harness::new(quick_config(60), &["alice", "bob"]);
        let match_id = h.lifecycle.request_start(&id("alice")).unwrap();

        h.leave("bob");
        assert_eq!(h.inspect(match_id, |g| g.host.clone()), id("alice"));

        sleep(Duration::from_millis(2100)).await;
        h.inspect(match_id, |g| {
            assert_eq!(g.state, MatchState::Ended);
            assert_eq!(g.end_reason, Some(EndReason::InsufficientPlayers));
            assert!(g.timers.is_clear());
        });

        // Never started, so nobody's record moves
        sleep(Duration::from_millis(10)).await;
        assert_eq!(h.records.get_record(&id("alice")).await.unwrap(), GameRecord::default());
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_an_active_match_still_counts_as_a_loss() {
        let h = Harness::new(quick_config(60), &["alice", "bob", "carol"]);
        let match_id = h.lifecycle.request_start(&id("alice")).unwrap();
        sleep(Duration::from_millis(2100)).await;

        h.leave("carol");
        assert_eq!(h.inspect(match_id, |g| g.state), MatchState::Active);
        h.lifecycle.report_death(&id("bob"), match_id).unwrap();

        h.inspect(match_id, |g| {
            assert_eq!(g.end_reason, Some(EndReason::LastPlayerStanding));
            assert_eq!(g.winner, Some(id("alice")));
        });

        sleep(Duration::from_millis(10)).await;
        assert_eq!(
            h.records.get_record(&id("carol")).await.unwrap(),
            GameRecord { wins: 0, losses: 1 }
        );
        assert_eq!(
            h.records.get_record(&id("bob")).await.unwrap(),
            GameRecord { wins: 0, losses: 1 }
        );
        assert_eq!(
            h.records.get_record(&id("alice")).await.unwrap(),
            GameRecord { wins: 1, losses: 0 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn quick_reconnect_keeps_the_seat() {
        let mut h = Harness::new(quick_config(60), &["alice", "bob", "carol"]);
        let match_id = h.lifecycle.request_start(&id("alice")).unwrap();
        sleep(Duration::from_millis(2100)).await;

        // Old socket unregisters, the reload registers before the old
        // handler gets to leave its matches
        let old_bob = h
            .inboxes
            .iter()
            .find(|(c, _)| c.identity().as_str() == "bob")
            .map(|(c, _)| c.clone())
            .unwrap();
        assert!(h.connections.unregister(&old_bob));
        h.connect("bob");
        h.lifecycle.disconnect(&id("bob"));

        assert!(h.connections.lookup(&id("bob")).is_some());
        h.inspect(match_id, |g| {
            assert_eq!(g.state, MatchState::Active);
            assert!(g.roster.contains_key(&id("bob")));
            assert!(g.alive.contains(&id("bob")));
            assert!(g.departed.is_empty());
        });
    }

    #[tokio::test(start_paused = true)]
    async fn lone_death_ends_with_no_players_remaining() {
        let config = GameConfig {
            min_players: 1,
            ..quick_config(60)
        };
        let h = Harness::new(config, &["alice"]);
        let match_id = h.lifecycle.request_start(&id("alice")).unwrap();
        sleep(Duration::from_millis(2100)).await;
        assert_eq!(h.inspect(match_id, |g| g.state), MatchState::Active);

        h.lifecycle.report_death(&id("alice"), match_id).unwrap();

        h.inspect(match_id, |g| {
            assert_eq!(g.state, MatchState::Ended);
            assert_eq!(g.end_reason, Some(EndReason::NoPlayersRemaining));
            assert_eq!(g.winner, None);
            assert!(g.alive.is_empty());
            assert!(g.timers.is_clear());
        });

        sleep(Duration::from_millis(10)).await;
        assert_eq!(
            h.records.get_record(&id("alice")).await.unwrap(),
            GameRecord { wins: 0, losses: 1 }
        );
    }
}
