//! Outbound notification events and the best-effort dispatcher.
//!
//! Core operations never talk to a mail provider directly: they commit the
//! financial transaction first and return structured results, and the caller
//! dispatches the corresponding event through this module afterwards. A
//! flaky provider can therefore never roll back or re-run a money mutation.
//! Delivery failures are logged and retried with exponential backoff, then
//! dropped.

use crate::core::session::VALIDATION_EXPIRY_DAYS;
use crate::entities::session;
use sea_orm::prelude::DateTimeUtc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default number of delivery attempts before an event is dropped.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Asks the client to confirm a logged session. Sent after token issuance.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRequest {
    /// The session awaiting confirmation
    pub session_id: i64,
    /// Where to reach the client (email address or phone)
    pub client_contact: String,
    /// Trainer name for the message body
    pub trainer_name: String,
    /// When the session occurred
    pub session_date: DateTimeUtc,
    /// Location name for the message body
    pub location_name: String,
    /// Price attributed to the session
    pub session_value: f64,
    /// Link the client clicks to confirm
    pub validation_url: String,
    /// How many days the client has to respond
    pub expiry_days: i64,
}

impl ValidationRequest {
    /// Builds a confirmation request for a freshly created session, or
    /// `None` for sessions that carry no token (no-shows).
    ///
    /// The caller supplies the contact and display names - client and
    /// location records live outside this crate.
    #[must_use]
    pub fn for_session(
        created: &session::Model,
        base_url: &str,
        client_contact: &str,
        trainer_name: &str,
        location_name: &str,
    ) -> Option<Self> {
        created.validation_token.as_ref().map(|token| Self {
            session_id: created.id,
            client_contact: client_contact.to_string(),
            trainer_name: trainer_name.to_string(),
            session_date: created.session_date,
            location_name: location_name.to_string(),
            session_value: created.session_value,
            validation_url: format!("{base_url}/validate/{token}"),
            expiry_days: VALIDATION_EXPIRY_DAYS,
        })
    }
}

/// Tells the trainer a payment just made more sessions available.
#[derive(Debug, Clone, PartialEq)]
pub struct UnlockEvent {
    /// The package the payment landed on
    pub package_id: i64,
    /// Where to reach the trainer
    pub trainer_contact: String,
    /// How many sessions the payment unlocked
    pub newly_unlocked_sessions: i32,
}

/// An outbound event for the notification collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Session confirmation request to the client
    ValidationRequested(ValidationRequest),
    /// Capacity-unlocked notice to the trainer
    SessionsUnlocked(UnlockEvent),
}

/// Delivery backend for outbound notifications (mail provider, webhook,
/// message queue). Implementations report failure as a plain string; the
/// dispatcher owns retry policy.
#[allow(async_fn_in_trait)]
pub trait NotificationSink {
    /// Attempts one delivery.
    ///
    /// # Errors
    /// Returns a human-readable reason when the delivery attempt failed.
    async fn deliver(&self, notification: &Notification) -> std::result::Result<(), String>;
}

/// A sink that logs and discards every event. Useful for deployments
/// without a notification provider and as a test double.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl NotificationSink for DiscardSink {
    async fn deliver(&self, notification: &Notification) -> std::result::Result<(), String> {
        info!(?notification, "notification discarded (no sink configured)");
        Ok(())
    }
}

/// Delivers a notification with bounded retries and exponential backoff.
///
/// Best-effort by contract: the return value says whether delivery
/// succeeded, and the caller's financial transaction has already committed
/// either way. Failures are logged, never propagated.
pub async fn dispatch_with_retry<S>(
    sink: &S,
    notification: &Notification,
    max_attempts: u32,
) -> bool
where
    S: NotificationSink,
{
    let mut backoff = INITIAL_BACKOFF;
    for attempt in 1..=max_attempts {
        match sink.deliver(notification).await {
            Ok(()) => return true,
            Err(reason) => {
                warn!(attempt, max_attempts, %reason, "notification delivery failed");
            }
        }
        if attempt < max_attempts {
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }
    error!(max_attempts, "notification dropped after exhausting retries");
    false
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` deliveries, then succeeds.
    struct FlakySink {
        failures: u32,
        attempts: AtomicU32,
    }

    impl FlakySink {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                attempts: AtomicU32::new(0),
            }
        }
    }

    impl NotificationSink for FlakySink {
        async fn deliver(&self, _notification: &Notification) -> std::result::Result<(), String> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                Err(format!("provider 503 on attempt {attempt}"))
            } else {
                Ok(())
            }
        }
    }

    fn unlock_event() -> Notification {
        Notification::SessionsUnlocked(UnlockEvent {
            package_id: 1,
            trainer_contact: "trainer@example.com".to_string(),
            newly_unlocked_sessions: 3,
        })
    }

    #[tokio::test]
    async fn test_dispatch_first_try() {
        let sink = FlakySink::new(0);
        assert!(dispatch_with_retry(&sink, &unlock_event(), 3).await);
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_retries_until_success() {
        let sink = FlakySink::new(2);
        assert!(dispatch_with_retry(&sink, &unlock_event(), 3).await);
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dispatch_gives_up_without_panicking() {
        let sink = FlakySink::new(10);
        assert!(!dispatch_with_retry(&sink, &unlock_event(), 2).await);
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_discard_sink_accepts_everything() {
        assert!(dispatch_with_retry(&DiscardSink, &unlock_event(), 1).await);
    }

    #[test]
    fn test_validation_request_skips_no_shows() {
        let no_show = session::Model {
            id: 5,
            organization_id: 1,
            trainer_id: 10,
            client_id: 20,
            package_id: 1,
            location_id: 1,
            session_date: Utc::now(),
            session_value: 100.0,
            notes: None,
            validated: false,
            validated_at: None,
            cancelled: true,
            cancelled_at: Some(Utc::now()),
            validation_token: None,
            validation_expiry: None,
        };
        assert!(
            ValidationRequest::for_session(
                &no_show,
                "https://ledger.example.com",
                "client@example.com",
                "Sam",
                "Main Gym",
            )
            .is_none()
        );
    }

    #[test]
    fn test_validation_request_builds_url() {
        let pending = session::Model {
            id: 6,
            organization_id: 1,
            trainer_id: 10,
            client_id: 20,
            package_id: 1,
            location_id: 1,
            session_date: Utc::now(),
            session_value: 100.0,
            notes: None,
            validated: false,
            validated_at: None,
            cancelled: false,
            cancelled_at: None,
            validation_token: Some("tok123".to_string()),
            validation_expiry: Some(Utc::now()),
        };
        let request = ValidationRequest::for_session(
            &pending,
            "https://ledger.example.com",
            "client@example.com",
            "Sam",
            "Main Gym",
        )
        .unwrap();
        assert_eq!(
            request.validation_url,
            "https://ledger.example.com/validate/tok123"
        );
        assert_eq!(request.expiry_days, VALIDATION_EXPIRY_DAYS);
    }
}
