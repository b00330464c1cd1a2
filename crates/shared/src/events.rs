use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Subscription topics
// ============================================================================

/// A change-feed scope. Serialized as `"<kind>:<id>"` so clients can treat
/// topics as opaque channel names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Topic {
    /// Message inserts within one conversation.
    Conversation(String),
    /// Conversation-level updates for everything a user participates in.
    Conversations(String),
    /// Meeting changes where the user is either party.
    Meetings(String),
    /// Message inserts within one study room.
    Room(String),
    /// Roster changes within one study room.
    RoomParticipants(String),
}

#[derive(Debug, Error)]
#[error("invalid topic: {0}")]
pub struct ParseTopicError(String);

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Conversation(id) => write!(f, "conversation:{id}"),
            Topic::Conversations(user_id) => write!(f, "conversations:{user_id}"),
            Topic::Meetings(user_id) => write!(f, "meetings:{user_id}"),
            Topic::Room(id) => write!(f, "room:{id}"),
            Topic::RoomParticipants(id) => write!(f, "room_participants:{id}"),
        }
    }
}

impl FromStr for Topic {
    type Err = ParseTopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s.split_once(':').ok_or_else(|| ParseTopicError(s.to_string()))?;
        if id.is_empty() {
            return Err(ParseTopicError(s.to_string()));
        }
        match kind {
            "conversation" => Ok(Topic::Conversation(id.to_string())),
            "conversations" => Ok(Topic::Conversations(id.to_string())),
            "meetings" => Ok(Topic::Meetings(id.to_string())),
            "room" => Ok(Topic::Room(id.to_string())),
            "room_participants" => Ok(Topic::RoomParticipants(id.to_string())),
            _ => Err(ParseTopicError(s.to_string())),
        }
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> String {
        topic.to_string()
    }
}

impl TryFrom<String> for Topic {
    type Error = ParseTopicError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ============================================================================
// Change events
// ============================================================================

/// A row-level change delivered on a topic. Payload field names mirror the
/// stored rows so clients can merge events into locally cached lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    MessageCreated { message: MessageEvent },
    ConversationUpdated { conversation_id: String, updated_at: String },
    MeetingChanged { meeting: MeetingEvent },
    RoomMessageCreated { message: RoomMessageEvent },
    ParticipantJoined { room_id: String, user_id: String, username: String },
    ParticipantLeft { room_id: String, user_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingEvent {
    pub id: String,
    pub student_id: String,
    pub student_username: String,
    pub tutor_id: String,
    pub tutor_username: String,
    pub subject: String,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomMessageEvent {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub content: String,
    pub created_at: String,
}

// ============================================================================
// Client <-> Server frames
// ============================================================================

/// Frames sent by a subscriber over the websocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientToServer {
    /// Must be the first frame on the connection.
    Authenticate { token: String },
    Subscribe { topic: Topic },
    Unsubscribe { topic: Topic },
}

/// Frames sent by the server to a subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerToClient {
    Authenticated { user_id: String },
    AuthenticationFailed { reason: String },
    Subscribed { topic: Topic },
    Unsubscribed { topic: Topic },
    /// `seq` is assigned by the server and strictly increases across all
    /// topics; clients reconcile ordering by it, not by arrival.
    Event {
        seq: u64,
        topic: Topic,
        event: ChangeEvent,
    },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_string_roundtrip() {
        let topics = [
            Topic::Conversation("c1".to_string()),
            Topic::Conversations("u1".to_string()),
            Topic::Meetings("u2".to_string()),
            Topic::Room("r1".to_string()),
            Topic::RoomParticipants("r1".to_string()),
        ];
        for topic in topics {
            let s = topic.to_string();
            assert_eq!(s.parse::<Topic>().unwrap(), topic);
        }
    }

    #[test]
    fn test_topic_rejects_malformed() {
        assert!("conversation".parse::<Topic>().is_err());
        assert!("conversation:".parse::<Topic>().is_err());
        assert!("mailbox:abc".parse::<Topic>().is_err());
    }

    #[test]
    fn test_subscribe_serialization() {
        let msg = ClientToServer::Subscribe {
            topic: Topic::Room("room-9".to_string()),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"subscribe\""));
        assert!(json.contains("\"topic\":\"room:room-9\""));

        let deserialized: ClientToServer = serde_json::from_str(&json).unwrap();
        match deserialized {
            ClientToServer::Subscribe { topic } => {
                assert_eq!(topic, Topic::Room("room-9".to_string()))
            }
            _ => panic!("Expected Subscribe variant"),
        }
    }

    #[test]
    fn test_event_serialization() {
        let msg = ServerToClient::Event {
            seq: 42,
            topic: Topic::Conversation("c7".to_string()),
            event: ChangeEvent::MessageCreated {
                message: MessageEvent {
                    id: "m1".to_string(),
                    conversation_id: "c7".to_string(),
                    sender_id: "u1".to_string(),
                    sender_username: "ada".to_string(),
                    content: "hi".to_string(),
                    created_at: "2026-01-01T00:00:00.000000Z".to_string(),
                },
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"event\""));
        assert!(json.contains("\"seq\":42"));
        assert!(json.contains("\"type\":\"message_created\""));

        let deserialized: ServerToClient = serde_json::from_str(&json).unwrap();
        match deserialized {
            ServerToClient::Event { seq, topic, .. } => {
                assert_eq!(seq, 42);
                assert_eq!(topic, Topic::Conversation("c7".to_string()));
            }
            _ => panic!("Expected Event variant"),
        }
    }
}
