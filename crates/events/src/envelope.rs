use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vishwam_core::UserId;

use crate::event::Event;

/// Envelope for a published notification, scoped to one user's account.
///
/// Notes:
/// - `user_id` is the subscription filter key; a session only consumes
///   envelopes for its own user.
/// - `sequence_number` is the account document version the notification
///   describes, so consumers can drop stale or duplicate deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    user_id: UserId,
    event_type: String,

    /// Account version after the change this envelope describes.
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        user_id: UserId,
        event_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            user_id,
            event_type: event_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap a typed event, taking the type name from the event itself.
    pub fn wrap(user_id: UserId, sequence_number: u64, event: E) -> Self {
        Self::new(
            Uuid::now_v7(),
            user_id,
            event.event_type(),
            sequence_number,
            event,
        )
    }
}
