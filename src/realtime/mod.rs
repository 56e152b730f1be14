use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{Message, User};
use crate::presence::PresenceRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Dislike,
    Follow,
}

/// The reactions that can notify a post author. Follow has its own path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    Like,
    Dislike,
}

impl From<ReactionKind> for NotificationKind {
    fn from(kind: ReactionKind) -> Self {
        match kind {
            ReactionKind::Like => NotificationKind::Like,
            ReactionKind::Dislike => NotificationKind::Dislike,
        }
    }
}

/// Ephemeral notification payload. Never persisted; a notification that
/// finds no live connection is dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub actor_id: String,
    pub actor_username: String,
    pub target_id: String,
    pub message: String,
}

/// Everything pushed over a live connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum RealtimeEvent {
    #[serde(rename = "newMessage")]
    NewMessage(Message),
    #[serde(rename = "notification")]
    Notification(Notification),
}

/// Fan-out of realtime events, gated on presence. At-most-once delivery,
/// no queue, no retry.
pub struct NotificationDispatcher {
    presence: Arc<PresenceRegistry>,
}

impl NotificationDispatcher {
    pub fn new(presence: Arc<PresenceRegistry>) -> Self {
        Self { presence }
    }

    /// Deliver to the recipient's live connection if there is one.
    /// Returns whether the event was handed to a connection.
    pub fn notify_if_online(&self, recipient_id: &str, event: RealtimeEvent) -> bool {
        match self.presence.lookup(recipient_id) {
            Some(handle) => handle.sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Like/dislike notification to the post author. Suppressed when the
    /// actor reacts to their own post. Dispatches on every call, whether or
    /// not the reaction changed any state.
    pub fn notify_reaction(
        &self,
        kind: ReactionKind,
        actor: &User,
        post_author_id: &str,
        post_id: &str,
    ) -> bool {
        if actor.id == post_author_id {
            return false;
        }
        let message = match kind {
            ReactionKind::Like => format!("{} liked your post", actor.username),
            ReactionKind::Dislike => format!("{} removed their like", actor.username),
        };
        self.notify_if_online(
            post_author_id,
            RealtimeEvent::Notification(Notification {
                kind: kind.into(),
                actor_id: actor.id.clone(),
                actor_username: actor.username.clone(),
                target_id: post_id.to_string(),
                message,
            }),
        )
    }

    /// Follow notification to the user being followed. Suppression of the
    /// self case is structural (self-follow is rejected upstream).
    pub fn notify_follow(&self, actor: &User, followee_id: &str) -> bool {
        self.notify_if_online(
            followee_id,
            RealtimeEvent::Notification(Notification {
                kind: NotificationKind::Follow,
                actor_id: actor.id.clone(),
                actor_username: actor.username.clone(),
                target_id: followee_id.to_string(),
                message: format!("{} started following you", actor.username),
            }),
        )
    }

    /// New direct message to the receiver, unconditional (sender and
    /// receiver are distinct by the conversation invariant).
    pub fn notify_new_message(&self, message: &Message) -> bool {
        self.notify_if_online(
            &message.receiver_id,
            RealtimeEvent::NewMessage(message.clone()),
        )
    }
}
