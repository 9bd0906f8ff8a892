//! Routes decoded client messages to their handlers.
//!
//! Handlers are plain methods taking the sender identity and the decoded
//! payload, so they run the same with or without a socket attached.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::error::GameError;
use crate::game::{
    ActionValidator, Match, MatchLifecycle, MatchRegistry, MatchState, PendingProjectile, Rejection,
};
use crate::session::{Broadcaster, Echo, Identity};
use crate::ws::protocol::{ClientMsg, Facing, ServerMsg, Vec2};

#[derive(Clone)]
pub struct Dispatcher {
    lifecycle: MatchLifecycle,
    matches: Arc<MatchRegistry>,
    broadcaster: Broadcaster,
    validator: ActionValidator,
    max_health: f32,
}

impl Dispatcher {
    pub fn new(
        config: &GameConfig,
        lifecycle: MatchLifecycle,
        matches: Arc<MatchRegistry>,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            lifecycle,
            matches,
            broadcaster,
            validator: ActionValidator::new(config.validator.clone()),
            max_health: config.max_health,
        }
    }

    /// Handle one client message. Failures are logged and, where the sender
    /// should hear about them, answered directly; they never propagate.
    pub fn dispatch(&self, sender: &Identity, msg: ClientMsg, received_at: u64) {
        let kind = msg.kind();
        let result = match msg {
            ClientMsg::StartMatchRequest => self.lifecycle.request_start(sender).map(|_| ()),
            ClientMsg::JoinMatch { match_id } => self.lifecycle.join(sender, match_id),
            ClientMsg::PlayerMovement {
                match_id,
                position,
                velocity,
                facing,
                animation,
            } => self.on_movement(sender, match_id, position, velocity, facing, animation),
            ClientMsg::PlayerAttack {
                match_id,
                position,
                facing,
            } => self.on_attack(sender, match_id, position, facing),
            ClientMsg::PlayerAttackHit {
                match_id,
                target,
                position,
                damage,
            } => self.on_attack_hit(sender, match_id, target, position, damage),
            ClientMsg::BowChargeStart { match_id, position } => {
                self.on_charge_start(sender, match_id, position)
            }
            ClientMsg::BowChargeRelease {
                match_id,
                position,
                angle,
                power,
            } => self.on_charge_release(sender, match_id, position, angle, power, received_at),
            ClientMsg::BowArrowHit {
                match_id,
                projectile_id,
                target,
                position,
                damage,
            } => self.on_arrow_hit(sender, match_id, projectile_id, target, position, damage, received_at),
            ClientMsg::WeaponCollected { match_id, id } => self.on_collected(sender, match_id, id, false),
            ClientMsg::PowerupCollected { match_id, id } => self.on_collected(sender, match_id, id, true),
            ClientMsg::PlayerDied { match_id } => self.lifecycle.report_death(sender, match_id),
            ClientMsg::HealthUpdate { match_id, health } => self.on_health(sender, match_id, health),
            ClientMsg::Ping { t } => {
                self.broadcaster.to_one(sender, ServerMsg::Pong { t });
                Ok(())
            }
        };

        if let Err(e) = result {
            self.report(sender, kind, e);
        }
    }

    fn report(&self, sender: &Identity, kind: &'static str, error: GameError) {
        match error {
            GameError::UnknownMatch(match_id) => {
                warn!(identity = %sender, event = kind, match_id = %match_id, "Dropped event for unknown match");
            }
            GameError::InvalidAction(reason) => {
                debug!(identity = %sender, event = kind, reason = %reason, "Action rejected");
                self.broadcaster.to_one(
                    sender,
                    ServerMsg::ActionRejected {
                        action: kind.to_string(),
                        reason,
                    },
                );
            }
            other => {
                warn!(identity = %sender, event = kind, error = %other, "Event failed");
                self.broadcaster.to_one(
                    sender,
                    ServerMsg::Error {
                        code: other.code().to_string(),
                        message: other.to_string(),
                    },
                );
            }
        }
    }

    /// Run `f` on an active match the sender participates in
    fn in_active_match<R>(
        &self,
        sender: &Identity,
        match_id: Uuid,
        f: impl FnOnce(&mut Match) -> Result<R, GameError>,
    ) -> Result<R, GameError> {
        self.matches.with(&match_id, |game| {
            match game.state {
                MatchState::Ended => return Err(GameError::UnknownMatch(match_id)),
                MatchState::Pending => {
                    return Err(GameError::InvalidAction("match has not started".into()))
                }
                MatchState::Active => {}
            }
            if !game.is_participant(sender) {
                return Err(GameError::NotInMatch(match_id));
            }
            f(game)
        })?
    }

    fn on_movement(
        &self,
        sender: &Identity,
        match_id: Uuid,
        position: Vec2,
        velocity: Vec2,
        facing: Facing,
        animation: String,
    ) -> Result<(), GameError> {
        if !position.is_finite() || !velocity.is_finite() {
            return Err(GameError::InvalidAction("non-finite movement".into()));
        }
        self.in_active_match(sender, match_id, |game| {
            let msg = ServerMsg::PlayerMovement {
                match_id,
                identity: sender.clone(),
                position,
                velocity,
                facing,
                animation,
            };
            self.broadcaster.to_room(game, msg, Echo::ExcludeSender(sender));
            Ok(())
        })
    }

    fn on_attack(
        &self,
        sender: &Identity,
        match_id: Uuid,
        position: Vec2,
        facing: Facing,
    ) -> Result<(), GameError> {
        self.in_active_match(sender, match_id, |game| {
            let msg = ServerMsg::PlayerAttack {
                match_id,
                attacker: sender.clone(),
                position,
                facing,
            };
            self.broadcaster.to_room(game, msg, Echo::ExcludeSender(sender));
            Ok(())
        })
    }

    fn on_attack_hit(
        &self,
        sender: &Identity,
        match_id: Uuid,
        target: Identity,
        position: Vec2,
        damage: Option<f32>,
    ) -> Result<(), GameError> {
        let damage = match damage {
            Some(d) if !d.is_finite() => return Err(GameError::InvalidAction("non-finite damage".into())),
            Some(d) => Some(self.validator.clamp_damage(d)),
            None => None,
        };

        self.in_active_match(sender, match_id, |game| {
            let Some(victim) = game.roster.get_mut(&target) else {
                return Err(GameError::InvalidAction(format!("{target} is not in this match")));
            };
            if let Some(d) = damage {
                victim.health = (victim.health - d).max(0.0);
            }

            let msg = ServerMsg::PlayerAttackHit {
                match_id,
                attacker: sender.clone(),
                target,
                position,
                damage,
            };
            self.broadcaster.to_room(game, msg, Echo::ExcludeSender(sender));
            Ok(())
        })
    }

    fn on_charge_start(&self, sender: &Identity, match_id: Uuid, position: Vec2) -> Result<(), GameError> {
        self.in_active_match(sender, match_id, |game| {
            let msg = ServerMsg::BowChargeStart {
                match_id,
                identity: sender.clone(),
                position,
            };
            self.broadcaster.to_room(game, msg, Echo::ExcludeSender(sender));
            Ok(())
        })
    }

    fn on_charge_release(
        &self,
        sender: &Identity,
        match_id: Uuid,
        position: Vec2,
        angle: f32,
        power: f32,
        now_ms: u64,
    ) -> Result<(), GameError> {
        self.in_active_match(sender, match_id, |game| {
            self.validator
                .validate_release(position, power, angle)
                .map_err(|r| GameError::InvalidAction(r.to_string()))?;

            game.pending_projectiles
                .retain(|_, p| !self.validator.is_expired(p, now_ms));

            let projectile_id = Uuid::new_v4();
            game.pending_projectiles.insert(
                projectile_id,
                PendingProjectile {
                    owner: sender.clone(),
                    origin: position,
                    angle,
                    power,
                    created_at_ms: now_ms,
                },
            );

            // The archer needs the id too, so this one echoes
            let msg = ServerMsg::BowArrowSpawned {
                match_id,
                projectile_id,
                owner: sender.clone(),
                position,
                angle,
                power,
            };
            self.broadcaster.to_room(game, msg, Echo::Everyone);
            Ok(())
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn on_arrow_hit(
        &self,
        sender: &Identity,
        match_id: Uuid,
        projectile_id: Uuid,
        target: Identity,
        position: Vec2,
        damage: f32,
        now_ms: u64,
    ) -> Result<(), GameError> {
        self.in_active_match(sender, match_id, |game| {
            // Consumed on first report whatever the verdict
            let projectile = game
                .pending_projectiles
                .remove(&projectile_id)
                .ok_or_else(|| GameError::InvalidAction(Rejection::UnknownProjectile.to_string()))?;

            let damage = self
                .validator
                .validate_hit(&projectile, position, damage, now_ms)
                .map_err(|r| GameError::InvalidAction(r.to_string()))?;

            let Some(victim) = game.roster.get_mut(&target) else {
                return Err(GameError::InvalidAction(format!("{target} is not in this match")));
            };
            victim.health = (victim.health - damage).max(0.0);

            let msg = ServerMsg::BowArrowHit {
                match_id,
                projectile_id,
                owner: projectile.owner,
                target,
                position,
                damage,
            };
            self.broadcaster.to_room(game, msg, Echo::Everyone);
            Ok(())
        })
    }

    fn on_collected(&self, sender: &Identity, match_id: Uuid, id: Uuid, powerup: bool) -> Result<(), GameError> {
        self.in_active_match(sender, match_id, |game| {
            let collector = sender.clone();
            let msg = if powerup {
                ServerMsg::PowerupCollected { match_id, id, collector }
            } else {
                ServerMsg::WeaponCollected { match_id, id, collector }
            };
            self.broadcaster.to_room(game, msg, Echo::ExcludeSender(sender));
            Ok(())
        })
    }

    fn on_health(&self, sender: &Identity, match_id: Uuid, health: f32) -> Result<(), GameError> {
        if !health.is_finite() {
            return Err(GameError::InvalidAction("non-finite health".into()));
        }
        let health = health.clamp(0.0, self.max_health);

        self.in_active_match(sender, match_id, |game| {
            // Reports may lower tracked health, never raise it: the time-up
            // winner is decided on this value
            if let Some(me) = game.roster.get_mut(sender) {
                me.health = me.health.min(health);
            }
            let msg = ServerMsg::HealthUpdate {
                match_id,
                identity: sender.clone(),
                health,
            };
            self.broadcaster.to_room(game, msg, Echo::ExcludeSender(sender));
            Ok(())
        })
    }
}
