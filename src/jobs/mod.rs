//! Delayed background sends.
//!
//! Queued notifications become [`ScheduledJob`]s that the notification
//! worker claims once their ETA has passed.

mod backend;
mod factory;
mod memory_backend;
mod redis_backend;

pub use backend::{JobScheduler, ScheduledJob, SchedulerError};
pub use factory::create_job_scheduler;
pub use memory_backend::MemoryJobScheduler;
pub use redis_backend::RedisJobScheduler;
