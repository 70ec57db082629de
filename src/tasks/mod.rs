mod notification_worker;

pub use notification_worker::{JobOutcome, NotificationWorker};
