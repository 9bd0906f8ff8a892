//! HTTP surface: health, records and auth middleware

pub mod middleware;
pub mod routes;

pub use routes::build_router;
