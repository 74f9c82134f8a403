//! Per-user notifications.
//!
//! The room-membership endpoints live elsewhere; they build one of these
//! payloads and hand it to [`ConnectionRegistry::send_notification_to_user`],
//! which reaches every live connection the user has authenticated, in any
//! room. A user with no live connection simply misses it.

use devsync_core::{RoomId, UserId};
use serde::Serialize;
use tracing::{debug, warn};

use super::broadcast::DeliveryReport;
use super::protocol::ServerMessage;
use super::registry::ConnectionRegistry;

/// Notification `subtype` discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Someone asked to join a room the recipient owns.
    JoinRequest,
    /// The recipient's join request was approved.
    JoinRequestApproved,
    /// The recipient's join request was denied.
    JoinRequestDenied,
    /// A room was shared with the recipient.
    RoomShared,
    /// The recipient lost access to a room.
    RemovedFromRoom,
}

/// Who is asking to join, carried only by `join_request`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JoinRequester {
    /// Requester's email.
    pub requester_email: String,
    /// Requester's identity-provider UID.
    pub requester_uid: UserId,
    /// ID of the pending request.
    pub request_id: String,
}

/// Body of a `{"type":"notification", ...}` message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Which event this is.
    pub subtype: NotificationKind,
    /// Room the event concerns.
    pub room_id: RoomId,
    /// Display name of that room.
    pub room_name: String,
    /// Requester fields for `join_request`.
    #[serde(flatten)]
    pub requester: Option<JoinRequester>,
    /// Human-readable text.
    pub message: String,
}

impl Notification {
    /// Notify a room owner that someone wants in.
    pub fn join_request(
        room_id: RoomId,
        room_name: &str,
        requester_email: &str,
        requester_uid: UserId,
        request_id: &str,
    ) -> Self {
        Self {
            subtype: NotificationKind::JoinRequest,
            room_id,
            room_name: room_name.to_owned(),
            message: format!("{requester_email} requested to join '{room_name}'"),
            requester: Some(JoinRequester {
                requester_email: requester_email.to_owned(),
                requester_uid,
                request_id: request_id.to_owned(),
            }),
        }
    }

    /// Tell a requester they were let in.
    pub fn join_request_approved(room_id: RoomId, room_name: &str) -> Self {
        Self::simple(
            NotificationKind::JoinRequestApproved,
            room_id,
            room_name,
            format!("Your request to join '{room_name}' was approved."),
        )
    }

    /// Tell a requester they were turned away.
    pub fn join_request_denied(room_id: RoomId, room_name: &str) -> Self {
        Self::simple(
            NotificationKind::JoinRequestDenied,
            room_id,
            room_name,
            format!("Your request to join '{room_name}' was denied."),
        )
    }

    /// Tell a user a room was shared with them.
    pub fn room_shared(room_id: RoomId, room_name: &str) -> Self {
        Self::simple(
            NotificationKind::RoomShared,
            room_id,
            room_name,
            format!("'{room_name}' was shared with you."),
        )
    }

    /// Tell a user they no longer have access to a room.
    pub fn removed_from_room(room_id: RoomId, room_name: &str) -> Self {
        Self::simple(
            NotificationKind::RemovedFromRoom,
            room_id,
            room_name,
            format!("You were removed from '{room_name}'."),
        )
    }

    fn simple(subtype: NotificationKind, room_id: RoomId, room_name: &str, message: String) -> Self {
        Self {
            subtype,
            room_id,
            room_name: room_name.to_owned(),
            requester: None,
            message,
        }
    }
}

impl ConnectionRegistry {
    /// Deliver a notification to every live connection of `user_id`.
    pub fn send_notification_to_user(
        &self,
        user_id: &UserId,
        notification: &Notification,
    ) -> DeliveryReport {
        let payload = match ServerMessage::Notification(notification.clone()).encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%user_id, error = %e, "failed to encode notification");
                return DeliveryReport::default();
            }
        };
        let recipients = self.user_connections(user_id);
        if recipients.is_empty() {
            debug!(%user_id, subtype = ?notification.subtype, "no live connections for user");
            return DeliveryReport::default();
        }
        debug!(
            %user_id,
            subtype = ?notification.subtype,
            recipients = recipients.len(),
            "notify user"
        );
        self.deliver(&recipients, &payload)
    }
}
