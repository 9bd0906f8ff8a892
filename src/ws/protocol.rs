//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::Identity;

/// 2D position or velocity in arena units
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance(&self, other: &Vec2) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Horizontal facing of a fighter sprite
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    Left,
    #[default]
    Right,
}

/// Weapon pickups that can appear in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponKind {
    Sword,
    Spear,
    Bow,
    Hammer,
}

impl WeaponKind {
    pub const ALL: [WeaponKind; 4] = [
        WeaponKind::Sword,
        WeaponKind::Spear,
        WeaponKind::Bow,
        WeaponKind::Hammer,
    ];
}

/// Powerup pickups that can appear in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerupKind {
    /// Instant heal
    Health,
    /// Timed movement speed buff
    Speed,
    /// Timed damage buff
    Damage,
}

impl PowerupKind {
    pub const ALL: [PowerupKind; 3] = [PowerupKind::Health, PowerupKind::Speed, PowerupKind::Damage];

    /// Effect parameters clients apply on pickup
    pub fn effect(self) -> PowerupEffect {
        match self {
            PowerupKind::Health => PowerupEffect::Heal { amount: 30.0 },
            PowerupKind::Speed => PowerupEffect::Multiplier {
                factor: 1.5,
                duration_ms: 8000,
            },
            PowerupKind::Damage => PowerupEffect::Multiplier {
                factor: 1.5,
                duration_ms: 10000,
            },
        }
    }
}

/// What a powerup does once collected
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum PowerupEffect {
    Heal { amount: f32 },
    Multiplier { factor: f32, duration_ms: u64 },
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Ask for a match with everyone currently present
    StartMatchRequest,

    /// Join a pending match explicitly
    JoinMatch { match_id: Uuid },

    PlayerMovement {
        match_id: Uuid,
        position: Vec2,
        velocity: Vec2,
        #[serde(default)]
        facing: Facing,
        /// Client animation state name, relayed untouched
        #[serde(default)]
        animation: String,
    },

    /// Melee swing
    PlayerAttack {
        match_id: Uuid,
        position: Vec2,
        facing: Facing,
    },

    /// Melee swing connected with a target
    PlayerAttackHit {
        match_id: Uuid,
        target: Identity,
        position: Vec2,
        #[serde(default)]
        damage: Option<f32>,
    },

    BowChargeStart { match_id: Uuid, position: Vec2 },

    BowChargeRelease {
        match_id: Uuid,
        position: Vec2,
        /// Launch angle in radians
        angle: f32,
        /// Draw strength, 1.0 = full launch speed
        power: f32,
    },

    /// Reported impact of a previously released arrow
    BowArrowHit {
        match_id: Uuid,
        projectile_id: Uuid,
        target: Identity,
        position: Vec2,
        damage: f32,
    },

    WeaponCollected { match_id: Uuid, id: Uuid },

    PowerupCollected { match_id: Uuid, id: Uuid },

    /// The sender died
    PlayerDied { match_id: Uuid },

    /// The sender's own current health
    HealthUpdate { match_id: Uuid, health: f32 },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

impl ClientMsg {
    /// Wire name of the message, used in logs and rejection notices
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMsg::StartMatchRequest => "start_match_request",
            ClientMsg::JoinMatch { .. } => "join_match",
            ClientMsg::PlayerMovement { .. } => "player_movement",
            ClientMsg::PlayerAttack { .. } => "player_attack",
            ClientMsg::PlayerAttackHit { .. } => "player_attack_hit",
            ClientMsg::BowChargeStart { .. } => "bow_charge_start",
            ClientMsg::BowChargeRelease { .. } => "bow_charge_release",
            ClientMsg::BowArrowHit { .. } => "bow_arrow_hit",
            ClientMsg::WeaponCollected { .. } => "weapon_collected",
            ClientMsg::PowerupCollected { .. } => "powerup_collected",
            ClientMsg::PlayerDied { .. } => "player_died",
            ClientMsg::HealthUpdate { .. } => "health_update",
            ClientMsg::Ping { .. } => "ping",
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        identity: Identity,
        server_time: u64,
    },

    PresenceAdded { identity: Identity },

    PresenceRemoved { identity: Identity },

    /// A match was created and will start shortly
    MatchPending { match_id: Uuid, host: Identity },

    MatchStarted {
        match_id: Uuid,
        host: Identity,
        players: Vec<PlayerSlot>,
        time_remaining: u32,
    },

    PlayerJoined {
        match_id: Uuid,
        identity: Identity,
        slot: Option<u32>,
    },

    PlayerLeft {
        match_id: Uuid,
        identity: Identity,
        slot: Option<u32>,
    },

    PlayerMovement {
        match_id: Uuid,
        identity: Identity,
        position: Vec2,
        velocity: Vec2,
        facing: Facing,
        animation: String,
    },

    PlayerAttack {
        match_id: Uuid,
        attacker: Identity,
        position: Vec2,
        facing: Facing,
    },

    PlayerAttackHit {
        match_id: Uuid,
        attacker: Identity,
        target: Identity,
        position: Vec2,
        damage: Option<f32>,
    },

    BowChargeStart {
        match_id: Uuid,
        identity: Identity,
        position: Vec2,
    },

    /// A release passed validation and now has a server-issued id
    BowArrowSpawned {
        match_id: Uuid,
        projectile_id: Uuid,
        owner: Identity,
        position: Vec2,
        angle: f32,
        power: f32,
    },

    /// Validated arrow impact
    BowArrowHit {
        match_id: Uuid,
        projectile_id: Uuid,
        owner: Identity,
        target: Identity,
        position: Vec2,
        damage: f32,
    },

    WeaponSpawned {
        match_id: Uuid,
        id: Uuid,
        variant: WeaponKind,
        position: Vec2,
    },

    PowerupSpawned {
        match_id: Uuid,
        id: Uuid,
        variant: PowerupKind,
        effect: PowerupEffect,
        position: Vec2,
    },

    WeaponCollected {
        match_id: Uuid,
        id: Uuid,
        collector: Identity,
    },

    PowerupCollected {
        match_id: Uuid,
        id: Uuid,
        collector: Identity,
    },

    TimeUpdate { match_id: Uuid, time_remaining: u32 },

    PlayerDied { match_id: Uuid, identity: Identity },

    HealthUpdate {
        match_id: Uuid,
        identity: Identity,
        health: f32,
    },

    MatchEnded {
        match_id: Uuid,
        reason: EndReason,
        winner: Option<Identity>,
        stats: MatchStats,
    },

    /// A reported action failed validation and was dropped
    ActionRejected { action: String, reason: String },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Slot assignment announced at match start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSlot {
    pub identity: Identity,
    pub slot: u32,
    pub spawn: Vec2,
}

/// Why a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    TimeUp,
    LastPlayerStanding,
    NoPlayersRemaining,
    /// Roster fell below the minimum before activation
    InsufficientPlayers,
}

/// Match statistics at end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchStats {
    pub total_players: u32,
    pub elapsed_secs: u32,
    pub ended_at: chrono::DateTime<chrono::Utc>,
}
