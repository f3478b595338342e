//! Observability: health endpoints and metrics exposition.

pub mod health;

pub use health::{health_router, HealthState};
