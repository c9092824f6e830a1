use chrono::NaiveDate;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::Result;
use crate::models::{tables, AttendanceRecord};
use crate::realtime::{DatabaseChanges, RealtimeClient, RowChange, Subscription, TypedChange};

/// Attendance row changes for one date, delivered into a queue the screen
/// loop drains into [`AttendanceTracker::apply_remote_change`]
///
/// [`AttendanceTracker::apply_remote_change`]: crate::attendance::AttendanceTracker::apply_remote_change
pub struct AttendanceFeed {
    subscription: Subscription,
    receiver: mpsc::UnboundedReceiver<TypedChange<AttendanceRecord>>,
}

impl AttendanceFeed {
    /// Subscribe to inserts, updates and deletes of rows dated `date`
    pub async fn subscribe(realtime: &RealtimeClient, date: NaiveDate) -> Result<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();

        let subscription = realtime
            .channel(&format!("attendance-{}", date))
            .on(
                DatabaseChanges::new(tables::ATTENDANCE).eq("date", date),
                forward(sender),
            )
            .subscribe()
            .await?;

        Ok(Self {
            subscription,
            receiver,
        })
    }

    pub fn topic(&self) -> &str {
        self.subscription.topic()
    }

    /// Wait for the next change; `None` once the subscription is gone
    pub async fn next(&mut self) -> Option<TypedChange<AttendanceRecord>> {
        self.receiver.recv().await
    }

    /// Take a queued change without waiting
    pub fn try_next(&mut self) -> Option<TypedChange<AttendanceRecord>> {
        self.receiver.try_recv().ok()
    }

    /// Leave the channel
    pub async fn close(self) -> Result<()> {
        self.subscription.unsubscribe().await
    }
}

fn forward(
    sender: mpsc::UnboundedSender<TypedChange<AttendanceRecord>>,
) -> impl Fn(RowChange) + Send + Sync + 'static {
    move |change: RowChange| match change.decode::<AttendanceRecord>() {
        Ok(typed) => {
            if sender.send(typed).is_err() {
                warn!("attendance feed receiver dropped");
            }
        }
        Err(e) => warn!(error = %e, "undecodable attendance change"),
    }
}
