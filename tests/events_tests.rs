mod common;

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;

use childcare_supabase::auth::StaticToken;
use childcare_supabase::error::Error;
use childcare_supabase::events::{
    EventService, FunctionScheduler, Notification, NotificationScheduler, ReminderKind, ScheduleId, Trigger,
};
use childcare_supabase::models::NewEvent;
use childcare_supabase::Childcare;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{admin, parent, MemoryEventStore, RecordingScheduler};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn picnic(at: chrono::DateTime<Utc>) -> NewEvent {
    NewEvent {
        title: "  Spring picnic ".to_string(),
        description: Some("Bring a hat".to_string()),
        event_date: at,
    }
}

#[tokio::test]
async fn fans_out_to_every_guardian_and_schedules_three_reminders() {
    let store = Arc::new(MemoryEventStore::with_guardians(&["p1", "p2", "p3"]));
    let scheduler = Arc::new(RecordingScheduler::default());
    let service = EventService::new(store.clone(), scheduler.clone());
    let at = now() + Duration::days(7);

    let report = service.create_event(&admin(), picnic(at), now()).await.unwrap();

    assert_eq!(report.event.title, "Spring picnic");
    assert_eq!(report.event.created_by, "admin-1");
    assert_eq!(report.notified, 3);
    assert!(report.failed.is_empty());
    assert!(report.skipped.is_empty());

    let notifications = store.notifications();
    assert_eq!(notifications.len(), 3);
    assert!(notifications.iter().all(|n| !n.read && n.event_id == report.event.id));

    let triggers: Vec<Trigger> = scheduler.calls().into_iter().map(|(_, t)| t).collect();
    assert_eq!(
        triggers,
        vec![
            Trigger::Now,
            Trigger::At(at - Duration::hours(24)),
            Trigger::At(at - Duration::hours(1)),
        ]
    );
    let kinds: Vec<ReminderKind> = report.scheduled.iter().map(|(k, _)| *k).collect();
    assert_eq!(
        kinds,
        vec![ReminderKind::Immediate, ReminderKind::DayBefore, ReminderKind::HourBefore]
    );
    assert_eq!(scheduler.calls()[0].0.data["event_id"], json!(report.event.id));
}

#[tokio::test]
async fn reminders_in_the_past_are_skipped() {
    let store = Arc::new(MemoryEventStore::with_guardians(&["p1"]));
    let scheduler = Arc::new(RecordingScheduler::default());
    let service = EventService::new(store, scheduler.clone());

    let report = service
        .create_event(&admin(), picnic(now() + Duration::minutes(30)), now())
        .await
        .unwrap();

    assert_eq!(scheduler.calls().len(), 1);
    assert_eq!(scheduler.calls()[0].1, Trigger::Now);
    assert_eq!(report.skipped, vec![ReminderKind::DayBefore, ReminderKind::HourBefore]);
}

#[tokio::test]
async fn scheduling_failures_are_reported_not_rolled_back() {
    let store = Arc::new(MemoryEventStore::with_guardians(&["p1", "p2"]));
    let scheduler = Arc::new(RecordingScheduler::failing_calls(&[1]));
    let service = EventService::new(store.clone(), scheduler.clone());

    let report = service
        .create_event(&admin(), picnic(now() + Duration::days(2)), now())
        .await
        .unwrap();

    assert_eq!(report.scheduled.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, ReminderKind::DayBefore);
    assert_eq!(scheduler.calls().len(), 3);
    assert_eq!(store.events().len(), 1);
    assert_eq!(store.notifications().len(), 2);
}

#[tokio::test]
async fn notification_write_failure_keeps_the_event() {
    let store = Arc::new(MemoryEventStore::with_guardians(&["p1"]));
    store.fail_notifications();
    let scheduler = Arc::new(RecordingScheduler::default());
    let service = EventService::new(store.clone(), scheduler.clone());

    let report = service
        .create_event(&admin(), picnic(now() + Duration::days(2)), now())
        .await
        .unwrap();

    assert_eq!(report.notified, 0);
    assert!(report.notification_error.is_some());
    assert_eq!(store.events().len(), 1);
    assert_eq!(scheduler.calls().len(), 3);
}

#[tokio::test]
async fn blank_title_and_non_admins_are_rejected_before_any_write() {
    let store = Arc::new(MemoryEventStore::with_guardians(&["p1"]));
    let scheduler = Arc::new(RecordingScheduler::default());
    let service = EventService::new(store.clone(), scheduler.clone());
    let at = now() + Duration::days(1);

    let blank = NewEvent {
        title: "   ".to_string(),
        description: None,
        event_date: at,
    };
    assert!(matches!(
        service.create_event(&admin(), blank, now()).await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        service.create_event(&parent(), picnic(at), now()).await,
        Err(Error::Forbidden(_))
    ));
    assert!(store.events().is_empty());
    assert!(scheduler.calls().is_empty());
}

#[tokio::test]
async fn function_scheduler_posts_to_the_configured_function() {
    let server = MockServer::start().await;
    let at = now() + Duration::days(1);
    Mock::given(method("POST"))
        .and(path("/functions/v1/schedule-notification"))
        .and(header("authorization", "Bearer user-token"))
        .and(body_partial_json(json!({
            "title": "Tomorrow: Spring picnic",
            "send_at": at.to_rfc3339()
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "sch-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let childcare = Childcare::new(&server.uri(), "anon-key");
    let scheduler = FunctionScheduler::new(
        childcare.functions(),
        &childcare.options.notification_function,
        Arc::new(StaticToken("user-token".to_string())),
    );

    let id = scheduler
        .schedule(
            Notification {
                title: "Tomorrow: Spring picnic".to_string(),
                body: "Spring picnic starts at Sat 2 Mar 09:00".to_string(),
                data: json!({ "event_id": "event-1" }),
            },
            Trigger::At(at),
        )
        .await
        .unwrap();
    assert_eq!(id, ScheduleId("sch-1".to_string()));
}

#[tokio::test]
async fn function_scheduler_errors_are_scheduling_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/schedule-notification"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "push provider down" })))
        .mount(&server)
        .await;

    let childcare = Childcare::new(&server.uri(), "anon-key");
    let scheduler = FunctionScheduler::new(
        childcare.functions(),
        "schedule-notification",
        Arc::new(StaticToken("user-token".to_string())),
    );

    let result = scheduler
        .schedule(
            Notification {
                title: "New event".to_string(),
                body: String::new(),
                data: json!({}),
            },
            Trigger::Now,
        )
        .await;
    assert!(matches!(result, Err(Error::Scheduling(message)) if message.contains("push provider down")));
}
