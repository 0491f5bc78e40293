use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ConversationId, MessageId, UserId, UserRef},
    error::ApiError,
};

/// Conversation summary as returned by `GET /conversations`. The partner of
/// the local user is derived client-side from the two participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub participant_a: UserRef,
    pub participant_b: UserRef,
    pub last_message_text: String,
    pub is_read: bool,
    pub last_receiver: UserId,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Body of `GET /messages/{conversationId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadResponse {
    pub messages: Vec<MessagePayload>,
}

/// Body of `POST /messages/{partnerId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

/// Response of `POST /messages/{partnerId}`: the persisted message plus the
/// conversation id the server filed it under. For the first message of a
/// brand-new conversation this id is freshly minted and the client has never
/// seen it before.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub conversation_id: ConversationId,
    pub id: MessageId,
    pub sender_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Live message event, identical on the outbound (`send_message`) and inbound
/// (`receive_message`) legs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub message: String,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub conversation_id: ConversationId,
}

/// New-conversation event, identical on the outbound (`send_conversation`)
/// and inbound (`receive_conversation`) legs. Emitted only for the first
/// message of a brand-new conversation so the receiving client can
/// materialize a list entry it has no placeholder for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEvent {
    pub last_message: String,
    pub is_read: bool,
    pub sender: UserId,
    pub sender_name: String,
    pub sender_avatar: String,
    pub sender_username: String,
    pub receiver: UserId,
    pub receiver_name: String,
    pub receiver_avatar: String,
    pub receiver_username: String,
    pub conversation_id: ConversationId,
}

impl ConversationEvent {
    pub fn sender_ref(&self) -> UserRef {
        UserRef {
            id: self.sender.clone(),
            display_name: self.sender_name.clone(),
            avatar_url: self.sender_avatar.clone(),
            handle: self.sender_username.clone(),
        }
    }
}

/// Frames the client pushes over the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ClientFrame {
    JoinRoom(UserId),
    SendMessage(MessageEvent),
    SendConversation(ConversationEvent),
}

/// Frames the server pushes to a joined client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ServerFrame {
    ReceiveMessage(MessageEvent),
    ReceiveConversation(ConversationEvent),
    Error(ApiError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_room_frame_carries_bare_user_id() {
        let frame = ClientFrame::JoinRoom(UserId::from("u1"));
        let json = serde_json::to_value(&frame).expect("serialize");
        assert_eq!(json["event"], "join_room");
        assert_eq!(json["payload"], "u1");
    }

    #[test]
    fn message_event_round_trips_with_camel_case_fields() {
        let frame = ClientFrame::SendMessage(MessageEvent {
            message: "hi".into(),
            sender_id: UserId::from("u1"),
            receiver_id: UserId::from("u2"),
            conversation_id: ConversationId::from("c100"),
        });
        let json = serde_json::to_value(&frame).expect("serialize");
        assert_eq!(json["event"], "send_message");
        assert_eq!(json["payload"]["senderId"], "u1");
        assert_eq!(json["payload"]["receiverId"], "u2");
        assert_eq!(json["payload"]["conversationId"], "c100");
    }

    #[test]
    fn receive_conversation_frame_parses_wire_shape() {
        let raw = r#"{
            "event": "receive_conversation",
            "payload": {
                "lastMessage": "hi",
                "isRead": false,
                "sender": "u1",
                "senderName": "Uma",
                "senderAvatar": "https://cdn.example/u1.png",
                "senderUsername": "uma",
                "receiver": "u2",
                "receiverName": "Vic",
                "receiverAvatar": "https://cdn.example/u2.png",
                "receiverUsername": "vic",
                "conversationId": "c100"
            }
        }"#;
        let frame: ServerFrame = serde_json::from_str(raw).expect("parse");
        match frame {
            ServerFrame::ReceiveConversation(event) => {
                assert_eq!(event.sender, UserId::from("u1"));
                assert_eq!(event.receiver, UserId::from("u2"));
                assert_eq!(event.conversation_id, ConversationId::from("c100"));
                assert!(!event.is_read);
                let sender = event.sender_ref();
                assert_eq!(sender.display_name, "Uma");
                assert_eq!(sender.handle, "uma");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn conversation_summary_parses_participant_pair() {
        let raw = r#"{
            "id": "c7",
            "participantA": {"id": "u1", "displayName": "Uma", "avatarUrl": "", "handle": "uma"},
            "participantB": {"id": "u2", "displayName": "Vic", "avatarUrl": "", "handle": "vic"},
            "lastMessageText": "see you",
            "isRead": true,
            "lastReceiver": "u1",
            "updatedAt": "2024-03-01T10:00:00Z"
        }"#;
        let summary: ConversationSummary = serde_json::from_str(raw).expect("parse");
        assert_eq!(summary.participant_a.id, UserId::from("u1"));
        assert_eq!(summary.participant_b.handle, "vic");
        assert_eq!(summary.last_receiver, UserId::from("u1"));
    }
}
