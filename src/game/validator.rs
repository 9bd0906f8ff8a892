//! Plausibility checks for client-reported ranged attacks

use crate::config::ValidatorConfig;
use crate::ws::protocol::Vec2;

use super::r#match::PendingProjectile;

/// Why a reported action was refused
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("non-finite values in report")]
    Malformed,

    #[error("implied launch speed {speed:.1} outside [{min}, {max}]")]
    SpeedOutOfRange { speed: f64, min: f64, max: f64 },

    #[error("projectile unknown or already resolved")]
    UnknownProjectile,

    #[error("target reported after {elapsed_ms}ms is {distance:.1} units away, limit {limit:.1}")]
    TravelExceeded {
        distance: f64,
        limit: f64,
        elapsed_ms: u64,
    },
}

/// Stateless gate; the pending-projectile ledger lives on the match
#[derive(Debug, Clone)]
pub struct ActionValidator {
    config: ValidatorConfig,
}

impl ActionValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Speed of an arrow released with the given draw power and angle
    pub fn implied_speed(&self, power: f32, angle: f32) -> f64 {
        let speed = self.config.launch_speed * power as f64;
        let angle = angle as f64;
        let (vx, vy) = (angle.cos() * speed, angle.sin() * speed);
        vx.hypot(vy)
    }

    /// Check a bow release. Returns the implied speed on success.
    pub fn validate_release(&self, position: Vec2, power: f32, angle: f32) -> Result<f64, Rejection> {
        if !power.is_finite() || !angle.is_finite() || !position.is_finite() {
            return Err(Rejection::Malformed);
        }

        let speed = self.implied_speed(power, angle);
        if speed < self.config.min_speed || speed > self.config.max_speed {
            return Err(Rejection::SpeedOutOfRange {
                speed,
                min: self.config.min_speed,
                max: self.config.max_speed,
            });
        }
        Ok(speed)
    }

    /// Check a hit report against its pending release. Returns the damage
    /// to apply, clamped into the configured bounds.
    pub fn validate_hit(
        &self,
        projectile: &PendingProjectile,
        position: Vec2,
        reported_damage: f32,
        now_ms: u64,
    ) -> Result<f32, Rejection> {
        if !position.is_finite() || !reported_damage.is_finite() {
            return Err(Rejection::Malformed);
        }

        let elapsed_ms = now_ms.saturating_sub(projectile.created_at_ms);
        let limit = self.config.max_speed * elapsed_ms as f64 / 1000.0;
        let distance = projectile.origin.distance(&position);
        if distance > limit {
            return Err(Rejection::TravelExceeded {
                distance,
                limit,
                elapsed_ms,
            });
        }

        Ok(self.clamp_damage(reported_damage))
    }

    pub fn clamp_damage(&self, damage: f32) -> f32 {
        damage.clamp(self.config.min_damage, self.config.max_damage)
    }

    /// Whether a pending entry has outlived any plausible flight
    pub fn is_expired(&self, projectile: &PendingProjectile, now_ms: u64) -> bool {
        now_ms.saturating_sub(projectile.created_at_ms) > self.config.projectile_ttl.as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Identity;

    fn validator() -> ActionValidator {
        ActionValidator::new(ValidatorConfig::default())
    }

    fn released_at(origin: Vec2, created_at_ms: u64) -> PendingProjectile {
        PendingProjectile {
            owner: Identity::new("archer"),
            origin,
            angle: 0.0,
            power: 1.0,
            created_at_ms,
        }
    }

    #[test]
    fn full_power_release_is_accepted() {
        let speed = validator().validate_release(Vec2::default(), 1.0, 0.0).unwrap();
        assert!((speed - 800.0).abs() < 1e-9);
    }

    #[test]
    fn overdrawn_release_is_rejected() {
        let err = validator().validate_release(Vec2::default(), 2.0, 0.0).unwrap_err();
        assert!(matches!(err, Rejection::SpeedOutOfRange { speed, .. } if (speed - 1600.0).abs() < 1e-9));
    }

    #[test]
    fn weak_release_is_rejected() {
        // 0.1 * 800 = 80 < 100
        assert!(validator().validate_release(Vec2::default(), 0.1, 1.2).is_err());
        assert!(validator().validate_release(Vec2::default(), 0.13, 1.2).is_ok());
    }

    #[test]
    fn speed_does_not_depend_on_angle() {
        let v = validator();
        let flat = v.implied_speed(1.0, 0.0);
        let steep = v.implied_speed(1.0, -1.3);
        assert!((flat - steep).abs() < 1e-9);
    }

    #[test]
    fn non_finite_release_is_malformed() {
        assert_eq!(
            validator().validate_release(Vec2::default(), f32::NAN, 0.0),
            Err(Rejection::Malformed)
        );
    }

    #[test]
    fn hit_at_max_travel_is_accepted() {
        let projectile = released_at(Vec2::new(0.0, 0.0), 10_000);
        let damage = validator()
            .validate_hit(&projectile, Vec2::new(2400.0, 0.0), 20.0, 12_000)
            .unwrap();
        assert_eq!(damage, 20.0);
    }

    #[test]
    fn hit_beyond_max_travel_is_rejected() {
        let projectile = released_at(Vec2::new(0.0, 0.0), 10_000);
        let err = validator()
            .validate_hit(&projectile, Vec2::new(2400.5, 0.0), 20.0, 12_000)
            .unwrap_err();
        assert!(matches!(err, Rejection::TravelExceeded { elapsed_ms: 2000, .. }));
    }

    #[test]
    fn damage_is_clamped() {
        let v = validator();
        let projectile = released_at(Vec2::new(100.0, 100.0), 0);
        assert_eq!(v.validate_hit(&projectile, Vec2::new(110.0, 100.0), 999.0, 1000), Ok(50.0));
        assert_eq!(v.validate_hit(&projectile, Vec2::new(110.0, 100.0), -5.0, 1000), Ok(1.0));
    }

    #[test]
    fn expiry_uses_ttl() {
        let v = validator();
        let projectile = released_at(Vec2::default(), 0);
        assert!(!v.is_expired(&projectile, 10_000));
        assert!(v.is_expired(&projectile, 10_001));
    }
}
