//! Runs against a real project configured in `.env`:
//! `SUPABASE_URL`, `SUPABASE_KEY`, `CHILDCARE_TEST_EMAIL`, `CHILDCARE_TEST_PASSWORD`.
//!
//! `cargo test --test live_tests -- --ignored`

use chrono::Utc;
use dotenv::dotenv;
use std::sync::Arc;

use childcare_supabase::attendance::{AttendanceStats, AttendanceStore};
use childcare_supabase::auth::MemorySessionStore;
use childcare_supabase::prelude::*;

#[tokio::test]
#[ignore]
async fn sign_in_and_read_todays_attendance() {
    dotenv().ok();

    let childcare = Childcare::from_env().expect("SUPABASE_URL and SUPABASE_KEY must be set");
    let email = std::env::var("CHILDCARE_TEST_EMAIL").expect("CHILDCARE_TEST_EMAIL must be set");
    let password = std::env::var("CHILDCARE_TEST_PASSWORD").expect("CHILDCARE_TEST_PASSWORD must be set");

    let session = Arc::new(childcare.session_manager(Arc::new(MemorySessionStore::new())));
    let identity = session.sign_in(&email, &password).await.unwrap();
    assert!(!identity.id.is_empty());

    let store = childcare.attendance_store(session.clone());
    let today = Utc::now().date_naive();
    let (children, records) = tokio::try_join!(store.list_children(), store.list_attendance(today)).unwrap();
    assert!(records.iter().all(|r| r.date == today));

    let on_roster = records.iter().filter(|r| children.iter().any(|c| c.id == r.child_id));
    let stats = AttendanceStats::compute(children.len(), on_roster);
    assert_eq!(stats.total(), children.len());

    session.sign_out().await.unwrap();
    assert!(session.current_identity().await.is_none());
}
