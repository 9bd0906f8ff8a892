//! Match orchestration modules

pub mod lifecycle;
pub mod r#match;
pub mod spawner;
pub mod validator;

pub use lifecycle::MatchLifecycle;
pub use r#match::{Match, MatchRegistry, MatchState, PendingProjectile};
pub use validator::{ActionValidator, Rejection};
