//! Conversations are keyed by service, not by user pair, so the same two
//! users keep one thread per service they share.

use crate::model::{Message, Service, UserId};

/// The user on the other side of `service`'s conversation, as seen by `me`.
/// `None` while nobody has accepted the service, or when `me` is not a party.
#[must_use]
pub fn other_party<'a>(service: &'a Service, me: &UserId) -> Option<&'a UserId> {
    let client = service.client_id.as_ref()?;
    if &service.author_id == me {
        Some(client)
    } else if client == me {
        Some(&service.author_id)
    } else {
        None
    }
}

/// Inserts `message` keeping `created_at` order. Messages with equal
/// timestamps keep arrival order; a message already present is ignored.
pub fn merge_message(conversation: &mut Vec<Message>, message: Message) -> bool {
    if conversation.iter().any(|m| m.id == message.id) {
        return false;
    }
    let at = conversation.partition_point(|m| m.created_at <= message.created_at);
    conversation.insert(at, message);
    true
}
