//! Durable one-shot job scheduling for Sundial.
//!
//! This crate provides the job lifecycle core:
//! - A durable keyed job store that survives restarts
//! - A dispatch loop firing due jobs onto a bounded worker pool
//! - Single-flight execution per job key
//! - The scheduling operations consumed by the HTTP routing layer

mod dispatcher;
mod error;
mod service;
mod store;
mod types;

pub use dispatcher::{DEFAULT_WORKER_COUNT, Dispatcher, JobExecutor};
pub use error::SchedulerError;
pub use service::{Health, ScheduleReceipt, ScheduleService};
pub use store::{JobStore, MISFIRE_GRACE_SECS};
pub use types::{EnqueueMode, Job, job_key};
