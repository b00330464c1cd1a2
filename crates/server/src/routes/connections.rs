use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use crate::{
    db::{ConnectionInvitation, Profile, StudentTutorConnection},
    error::AppError,
    routes::require_user,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct InviteConnectionRequest {
    pub other_user_id: String,
}

pub async fn invite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<InviteConnectionRequest>,
) -> Result<Json<ConnectionInvitation>, AppError> {
    let caller = require_user(&state, &headers)?;
    let invitation = state
        .db
        .invite_connection(&caller, &req.other_user_id)
        .await?;
    Ok(Json(invitation))
}

pub async fn list_invitations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ConnectionInvitation>>, AppError> {
    let caller = require_user(&state, &headers)?;
    Ok(Json(state.db.list_connection_invitations(&caller).await?))
}

pub async fn accept(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(invitation_id): Path<String>,
) -> Result<Json<StudentTutorConnection>, AppError> {
    let caller = require_user(&state, &headers)?;
    let connection = state
        .db
        .accept_connection_invitation(&invitation_id, &caller)
        .await?;
    Ok(Json(connection))
}

/// The "your students" view, creator-scoped.
pub async fn connected_students(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tutor_id): Path<String>,
) -> Result<Json<Vec<Profile>>, AppError> {
    let caller = require_user(&state, &headers)?;
    if caller != tutor_id {
        return Err(AppError::Forbidden(
            "Cannot list another tutor's students".to_string(),
        ));
    }
    Ok(Json(state.db.get_connected_students(&tutor_id).await?))
}

pub async fn connected_tutors(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(student_id): Path<String>,
) -> Result<Json<Vec<Profile>>, AppError> {
    let caller = require_user(&state, &headers)?;
    if caller != student_id {
        return Err(AppError::Forbidden(
            "Cannot list another student's tutors".to_string(),
        ));
    }
    Ok(Json(state.db.get_connected_tutors(&student_id).await?))
}
