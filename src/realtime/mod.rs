//! Realtime row-change subscriptions over the Phoenix websocket protocol

mod channel;
mod client;
mod message;

pub use channel::{ChangeCallback, ChannelBuilder, DatabaseChanges, Subscription};
pub use client::{ConnectionState, RealtimeClient, RealtimeClientOptions};
pub use message::{ChangeKind, RealtimeMessage, RowChange, TypedChange};
