use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use shared::{ChangeEvent, MessageEvent, Topic};

use crate::{
    db::{Conversation, ConversationSummary, Message},
    error::AppError,
    routes::require_user,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub other_user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Create-or-get for the caller and one other user. Both usernames come
/// from profiles, not the request, so participant rows cannot be spoofed.
pub async fn create_or_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateConversationRequest>,
) -> Result<Json<Conversation>, AppError> {
    let caller = require_user(&state, &headers)?;
    let caller_profile = state
        .db
        .get_profile(&caller)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;
    let other_profile = state
        .db
        .get_profile(&req.other_user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Other user's profile not found".to_string()))?;

    let conversation = state
        .db
        .create_or_get_conversation(
            &caller,
            &caller_profile.username,
            &req.other_user_id,
            &other_profile.username,
        )
        .await?;
    Ok(Json(conversation))
}

pub async fn user_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ConversationSummary>>, AppError> {
    let caller = require_user(&state, &headers)?;
    if caller != user_id {
        return Err(AppError::Forbidden(
            "Cannot list another user's conversations".to_string(),
        ));
    }
    Ok(Json(state.db.get_user_conversations(&user_id).await?))
}

pub async fn messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
) -> Result<Json<Vec<Message>>, AppError> {
    let caller = require_user(&state, &headers)?;
    let messages = state
        .db
        .get_conversation_messages(&conversation_id, &caller)
        .await?;
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<Message>, AppError> {
    let caller = require_user(&state, &headers)?;
    let (message, participants) = state
        .db
        .send_message(&conversation_id, &caller, &req.content)
        .await?;

    // Fan out to the conversation feed and to each participant's inbox view
    state.hub.publish(
        Topic::Conversation(conversation_id.clone()),
        ChangeEvent::MessageCreated {
            message: MessageEvent {
                id: message.id.clone(),
                conversation_id: message.conversation_id.clone(),
                sender_id: message.sender_id.clone(),
                sender_username: message.sender_username.clone(),
                content: message.content.clone(),
                created_at: message.created_at.clone(),
            },
        },
    );
    for participant in &participants {
        state.hub.publish(
            Topic::Conversations(participant.user_id.clone()),
            ChangeEvent::ConversationUpdated {
                conversation_id: conversation_id.clone(),
                updated_at: message.created_at.clone(),
            },
        );
    }

    Ok(Json(message))
}
