// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod postgres;
pub mod redis;
pub mod telemetry;

// External collaborators
pub mod cache;
pub mod jobs;
pub mod store;

// Dispatch engine
pub mod channel;
pub mod license;
pub mod notification;
pub mod provider;

// Application layer
pub mod api;
pub mod server;
pub mod tasks;
