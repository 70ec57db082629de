//! Notification model and the dispatch engine.
//!
//! A [`Notification`] is built with [`NotificationBuilder`] and handed to the
//! [`NotificationDispatcher`], which folds duplicates, stores the record and
//! either queues it for the background worker or sends it right away through
//! the [`SendNotificationService`].

mod builder;
mod context;
mod dedup;
mod directory;
mod dispatcher;
mod error;
mod maintenance;
pub mod phone;
mod queueing;
mod recipient;
mod service;
mod types;

pub use builder::{Notification, NotificationBuilder};
pub use context::DispatchContext;
pub use dedup::DuplicateDetector;
pub use directory::{MemoryRecipientDirectory, RecipientDirectory};
pub use dispatcher::{DispatchOutcome, NotificationDispatcher};
pub use error::{NotificationError, Result};
pub use maintenance::MaintenanceFeed;
pub use phone::PhoneNumberParser;
pub use queueing::{NotificationQueue, QueueDecision};
pub use recipient::{clean_recipients, Recipient, RecipientProfile, UniqueAttribute};
pub use service::{ChannelFailure, ChannelFailureView, SendNotificationService, SendSummary};
pub use types::{
    delayed_indefinitely, join_channels, parse_channels, ChannelIdentifier, ChannelSet,
    ContentType, DeliveryReport, DeliveryStatus, Message, NotificationLevel, NotificationRecord,
    NotificationType,
};
