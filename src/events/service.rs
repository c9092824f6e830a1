//! Event creation and guardian fan-out

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::events::scheduler::{Notification, NotificationScheduler, ScheduleId, Trigger};
use crate::events::store::EventStore;
use crate::models::{Event, Identity, NewEvent, NewEventNotification};

/// Which reminder of the three
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    Immediate,
    DayBefore,
    HourBefore,
}

/// What happened during one fan-out
#[derive(Debug, Clone)]
pub struct FanOutReport {
    pub event: Event,
    /// Notification rows written
    pub notified: usize,
    /// Set when the notification rows could not be written
    pub notification_error: Option<String>,
    pub scheduled: Vec<(ReminderKind, ScheduleId)>,
    /// Reminders whose instant had already passed
    pub skipped: Vec<ReminderKind>,
    pub failed: Vec<(ReminderKind, String)>,
}

/// Creates events and notifies every active guardian
pub struct EventService {
    store: Arc<dyn EventStore>,
    scheduler: Arc<dyn NotificationScheduler>,
}

impl EventService {
    pub fn new(store: Arc<dyn EventStore>, scheduler: Arc<dyn NotificationScheduler>) -> Self {
        Self { store, scheduler }
    }

    /// Insert the event, then write notification rows and schedule reminders
    ///
    /// Only the event insert can fail the call. Later failures are logged and
    /// reported; nothing already written is rolled back.
    pub async fn create_event(&self, actor: &Identity, input: NewEvent, now: DateTime<Utc>) -> Result<FanOutReport> {
        if !actor.is_admin() {
            return Err(Error::forbidden("only admins may create events"));
        }
        let title = input.title.trim();
        if title.is_empty() {
            return Err(Error::validation("title is required"));
        }
        let input = NewEvent {
            title: title.to_string(),
            description: input
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            event_date: input.event_date,
        };

        let event = self.store.insert_event(&input, &actor.id).await?;
        info!(event_id = %event.id, title = %event.title, "event created");

        let mut report = FanOutReport {
            event,
            notified: 0,
            notification_error: None,
            scheduled: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        };

        match self.write_notifications(&report.event).await {
            Ok(count) => report.notified = count,
            Err(e) => {
                warn!(event_id = %report.event.id, error = %e, "writing event notifications failed");
                report.notification_error = Some(e.to_string());
            }
        }

        for (kind, trigger) in reminder_plan(report.event.event_date, now) {
            let Some(trigger) = trigger else {
                report.skipped.push(kind);
                continue;
            };
            match self
                .scheduler
                .schedule(reminder(&report.event, kind), trigger)
                .await
            {
                Ok(id) => report.scheduled.push((kind, id)),
                Err(e) => {
                    warn!(event_id = %report.event.id, ?kind, error = %e, "scheduling reminder failed");
                    report.failed.push((kind, e.to_string()));
                }
            }
        }

        info!(
            event_id = %report.event.id,
            notified = report.notified,
            scheduled = report.scheduled.len(),
            failed = report.failed.len(),
            "event fan-out finished"
        );
        Ok(report)
    }

    async fn write_notifications(&self, event: &Event) -> Result<usize> {
        let guardians = self.store.list_active_guardians().await?;
        let rows: Vec<NewEventNotification> = guardians
            .iter()
            .map(|g| NewEventNotification {
                event_id: event.id.clone(),
                parent_id: g.id.clone(),
                read: false,
            })
            .collect();
        let count = rows.len();

        self.store.insert_notifications(rows).await?;
        Ok(count)
    }
}

/// The three reminders; `None` marks one whose instant is not in the future
fn reminder_plan(event_date: DateTime<Utc>, now: DateTime<Utc>) -> [(ReminderKind, Option<Trigger>); 3] {
    let before = |offset: Duration| {
        let at = event_date - offset;
        (at > now).then_some(Trigger::At(at))
    };

    [
        (ReminderKind::Immediate, Some(Trigger::Now)),
        (ReminderKind::DayBefore, before(Duration::hours(24))),
        (ReminderKind::HourBefore, before(Duration::hours(1))),
    ]
}

fn reminder(event: &Event, kind: ReminderKind) -> Notification {
    let when = event.event_date.format("%a %-d %b %H:%M");
    let (title, body) = match kind {
        ReminderKind::Immediate => (
            format!("New event: {}", event.title),
            event
                .description
                .clone()
                .unwrap_or_else(|| format!("Scheduled for {}", when)),
        ),
        ReminderKind::DayBefore => (
            format!("Tomorrow: {}", event.title),
            format!("{} starts at {}", event.title, when),
        ),
        ReminderKind::HourBefore => (
            format!("In one hour: {}", event.title),
            format!("{} starts at {}", event.title, when),
        ),
    };

    Notification {
        title,
        body,
        data: json!({ "event_id": event.id, "type": "event_reminder" }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn plans_only_future_reminders() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();

        let far = reminder_plan(now + Duration::days(3), now);
        assert!(far.iter().all(|(_, t)| t.is_some()));
        assert_eq!(far[1].1, Some(Trigger::At(now + Duration::days(2))));

        let soon = reminder_plan(now + Duration::hours(5), now);
        assert_eq!(soon[0].1, Some(Trigger::Now));
        assert_eq!(soon[1].1, None);
        assert_eq!(soon[2].1, Some(Trigger::At(now + Duration::hours(4))));

        let exactly_an_hour = reminder_plan(now + Duration::hours(1), now);
        assert_eq!(exactly_an_hour[2].1, None);
    }
}
