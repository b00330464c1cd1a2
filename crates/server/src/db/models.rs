use serde::Serialize;
use shared::Subject;
use sqlx::types::Json;
use sqlx::FromRow;

/// Raw authenticated account. The domain identity layered on top is
/// [`Profile`]; rows here only ever matter to the auth routes.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Profile {
    pub user_id: String,
    pub username: String,
    pub role: String,
    pub email: String,
    pub hourly_rate: Option<f64>,
    pub specialties: Json<Vec<Subject>>,
    pub struggles: Json<Vec<Subject>>,
    pub bio: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Ticket {
    pub id: String,
    pub student_id: String,
    pub student_username: String,
    pub subject: String,
    pub topic: String,
    pub description: String,
    pub closed: bool,
    pub created_at: String,
    pub last_response_at: Option<String>,
}

/// Either the owning student or a tutor authors a response; the other
/// side's columns stay NULL.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Response {
    pub id: String,
    pub ticket_id: String,
    pub tutor_id: Option<String>,
    pub tutor_username: Option<String>,
    pub student_id: Option<String>,
    pub student_username: Option<String>,
    pub content: String,
    pub parent_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketWithResponses {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub responses: Vec<Response>,
}

/// `pair_key` is the lexicographically ordered participant pair; its UNIQUE
/// index is what makes create-or-get idempotent under concurrent calls.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Conversation {
    pub id: String,
    pub pair_key: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ConversationParticipant {
    pub conversation_id: String,
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub participants: Vec<ConversationParticipant>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Meeting {
    pub id: String,
    pub student_id: String,
    pub student_username: String,
    pub tutor_id: String,
    pub tutor_username: String,
    pub subject: String,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StudyRoom {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub description: Option<String>,
    pub created_by: String,
    pub is_private: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StudyRoomParticipant {
    pub room_id: String,
    pub user_id: String,
    pub username: String,
    pub joined_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudyRoomWithParticipants {
    #[serde(flatten)]
    pub room: StudyRoom,
    pub participants: Vec<StudyRoomParticipant>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StudyRoomMessage {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StudyRoomInvitation {
    pub id: String,
    pub room_id: String,
    pub invitee_id: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ConnectionInvitation {
    pub id: String,
    pub student_id: String,
    pub tutor_id: String,
    pub invited_by: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Durable pairing produced by an accepted connection invitation; scopes
/// the "your students" / "your tutors" views.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StudentTutorConnection {
    pub student_id: String,
    pub student_username: String,
    pub tutor_id: String,
    pub tutor_username: String,
    pub created_at: String,
}
