//! Notification seam.
//!
//! The engine decides when a person should hear about something (roster
//! changes); how the message is delivered is somebody else's job.

use async_trait::async_trait;
use tracing::info;

use crate::models::Person;

/// Fire-and-forget delivery of a message to one person.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, person: &Person, message: &str);
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, person: &Person, message: &str) {
        info!(person = %person.id, message, "Notification");
    }
}
