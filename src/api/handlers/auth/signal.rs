//! Exactly-once delivery of session termination reasons.
//!
//! A keyed, last-write-wins slot per account, not a broadcast queue: at most
//! one signal is pending per account, a second write before the first read
//! overwrites it, and a read atomically clears the slot. This is how a user
//! who was logged out elsewhere learns why on their next visit to the login
//! boundary, without a push channel.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use utoipa::ToSchema;
use uuid::Uuid;

/// Reason a prior session ended, delivered once to the login boundary.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TerminationSignal {
    Expired,
    Locked,
    /// A newer session superseded this account's active session.
    Conflict,
    Deleted,
}

impl TerminationSignal {
    /// User-facing explanation; each kind keeps a distinct message.
    #[must_use]
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Expired => "Your session expired, sign in again",
            Self::Locked => "Your account was locked",
            Self::Conflict => "Your account was signed in from another device",
            Self::Deleted => "Your account was deleted",
        }
    }
}

/// Process-wide termination-signal slots, keyed by account.
#[derive(Debug, Default)]
pub struct SessionSignalChannel {
    slots: Mutex<HashMap<Uuid, TerminationSignal>>,
}

impl SessionSignalChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a termination reason for the account. Last write wins.
    pub async fn publish(&self, account_id: Uuid, signal: TerminationSignal) {
        let mut slots = self.slots.lock().await;
        slots.insert(account_id, signal);
    }

    /// Atomically read and clear the pending signal, if any.
    ///
    /// A signal is delivered at most once; a later call without an
    /// intervening publish returns `None`.
    pub async fn peek_and_clear(&self, account_id: Uuid) -> Option<TerminationSignal> {
        let mut slots = self.slots.lock().await;
        slots.remove(&account_id)
    }
}

#[cfg(test)]
mod tests {
    use super::{SessionSignalChannel, TerminationSignal};
    use uuid::Uuid;

    #[tokio::test]
    async fn signal_is_delivered_exactly_once() {
        let channel = SessionSignalChannel::new();
        let account = Uuid::new_v4();

        channel.publish(account, TerminationSignal::Expired).await;
        assert_eq!(
            channel.peek_and_clear(account).await,
            Some(TerminationSignal::Expired)
        );
        assert_eq!(channel.peek_and_clear(account).await, None);
    }

    #[tokio::test]
    async fn later_write_overwrites_pending_signal() {
        let channel = SessionSignalChannel::new();
        let account = Uuid::new_v4();

        channel.publish(account, TerminationSignal::Expired).await;
        channel.publish(account, TerminationSignal::Conflict).await;
        assert_eq!(
            channel.peek_and_clear(account).await,
            Some(TerminationSignal::Conflict)
        );
        assert_eq!(channel.peek_and_clear(account).await, None);
    }

    #[tokio::test]
    async fn slots_are_keyed_by_account() {
        let channel = SessionSignalChannel::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        channel.publish(alice, TerminationSignal::Locked).await;
        assert_eq!(channel.peek_and_clear(bob).await, None);
        assert_eq!(
            channel.peek_and_clear(alice).await,
            Some(TerminationSignal::Locked)
        );
    }

    #[test]
    fn messages_stay_distinct_per_kind() {
        let kinds = [
            TerminationSignal::Expired,
            TerminationSignal::Locked,
            TerminationSignal::Conflict,
            TerminationSignal::Deleted,
        ];
        let mut messages: Vec<&str> = kinds
            .iter()
            .map(|kind| kind.user_message())
            .collect();
        messages.sort_unstable();
        messages.dedup();
        assert_eq!(messages.len(), kinds.len());
    }
}
