//! Calendar events and the guardian notification fan-out

mod scheduler;
mod service;
mod store;

pub use scheduler::{FunctionScheduler, Notification, NotificationScheduler, ScheduleId, Trigger};
pub use service::{EventService, FanOutReport, ReminderKind};
pub use store::{EventStore, RemoteEventStore};
