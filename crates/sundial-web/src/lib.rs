//! JSON scheduling API for Sundial.
//!
//! Thin routing and validation layer over
//! [`sundial_scheduler::ScheduleService`]; all scheduling semantics live in
//! the core.

mod error;
mod routes;

pub use error::ApiError;
pub use routes::create_router;
