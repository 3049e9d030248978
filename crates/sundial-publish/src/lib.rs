//! Publish delivery for Sundial.
//!
//! This crate owns everything that happens when a job fires:
//! - [`RecordsClient`] and [`WebhookClient`]: the two outbound HTTP surfaces
//! - [`RetryTracker`]: in-memory attempt accounting
//! - [`PublishTrigger`]: the firing state machine (success, retry, give-up)
//! - [`Reconciler`]: startup and periodic catch-up of missed posts

mod catchup;
mod error;
mod records;
mod retry;
mod trigger;
mod webhook;

pub use catchup::{CATCH_UP_DELAY_SECS, CATCH_UP_INTERVAL_SECS, Reconciler};
pub use error::PublishError;
pub use records::RecordsClient;
pub use retry::RetryTracker;
pub use trigger::{MAX_RETRIES, PublishTrigger, RETRY_DELAY_SECS, TriggerConfig};
pub use webhook::WebhookClient;
