use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use shared::{ChangeEvent, RoomMessageEvent, Subject, Topic};

use crate::{
    db::{StudyRoomInvitation, StudyRoomMessage, StudyRoomParticipant, StudyRoomWithParticipants},
    error::AppError,
    routes::require_user,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    pub subject: Subject,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListRoomsQuery {
    pub subject: Option<Subject>,
}

#[derive(Debug, Deserialize)]
pub struct SendRoomMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub invitee_email: String,
}

pub async fn create_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateRoomRequest>,
) -> Result<Json<StudyRoomWithParticipants>, AppError> {
    let caller = require_user(&state, &headers)?;
    let room = state
        .db
        .create_study_room(
            &req.name,
            req.subject,
            req.description.as_deref(),
            &caller,
            req.is_private,
        )
        .await?;
    Ok(Json(room))
}

pub async fn list_rooms(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListRoomsQuery>,
) -> Result<Json<Vec<StudyRoomWithParticipants>>, AppError> {
    let caller = require_user(&state, &headers)?;
    Ok(Json(state.db.list_study_rooms(&caller, query.subject).await?))
}

pub async fn join_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
) -> Result<Json<StudyRoomParticipant>, AppError> {
    let caller = require_user(&state, &headers)?;
    let participant = state.db.join_study_room(&room_id, &caller).await?;

    state.hub.publish(
        Topic::RoomParticipants(room_id),
        ChangeEvent::ParticipantJoined {
            room_id: participant.room_id.clone(),
            user_id: participant.user_id.clone(),
            username: participant.username.clone(),
        },
    );
    Ok(Json(participant))
}

pub async fn leave_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let caller = require_user(&state, &headers)?;
    state.db.leave_study_room(&room_id, &caller).await?;

    state.hub.publish(
        Topic::RoomParticipants(room_id.clone()),
        ChangeEvent::ParticipantLeft {
            room_id,
            user_id: caller,
        },
    );
    Ok(Json(serde_json::json!({ "left": true })))
}

pub async fn messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<StudyRoomMessage>>, AppError> {
    let caller = require_user(&state, &headers)?;
    Ok(Json(
        state.db.get_study_room_messages(&room_id, &caller).await?,
    ))
}

pub async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
    Json(req): Json<SendRoomMessageRequest>,
) -> Result<Json<StudyRoomMessage>, AppError> {
    let caller = require_user(&state, &headers)?;
    let message = state
        .db
        .send_study_room_message(&room_id, &caller, &req.content)
        .await?;

    state.hub.publish(
        Topic::Room(room_id),
        ChangeEvent::RoomMessageCreated {
            message: RoomMessageEvent {
                id: message.id.clone(),
                room_id: message.room_id.clone(),
                sender_id: message.sender_id.clone(),
                sender_username: message.sender_username.clone(),
                content: message.content.clone(),
                created_at: message.created_at.clone(),
            },
        },
    );
    Ok(Json(message))
}

pub async fn invite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
    Json(req): Json<InviteRequest>,
) -> Result<Json<StudyRoomInvitation>, AppError> {
    let caller = require_user(&state, &headers)?;
    let invitation = state
        .db
        .invite_to_study_room(&room_id, &caller, &req.invitee_email)
        .await?;
    Ok(Json(invitation))
}

pub async fn list_invitations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<StudyRoomInvitation>>, AppError> {
    let caller = require_user(&state, &headers)?;
    Ok(Json(state.db.list_study_room_invitations(&caller).await?))
}

pub async fn accept_invitation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(invitation_id): Path<String>,
) -> Result<Json<StudyRoomParticipant>, AppError> {
    let caller = require_user(&state, &headers)?;
    let participant = state
        .db
        .accept_study_room_invitation(&invitation_id, &caller)
        .await?;

    state.hub.publish(
        Topic::RoomParticipants(participant.room_id.clone()),
        ChangeEvent::ParticipantJoined {
            room_id: participant.room_id.clone(),
            user_id: participant.user_id.clone(),
            username: participant.username.clone(),
        },
    );
    Ok(Json(participant))
}
