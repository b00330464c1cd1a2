use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use shared::{Role, Subject};

use crate::{
    db::{Response, Ticket, TicketWithResponses},
    error::AppError,
    routes::require_user,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub subject: Subject,
    pub topic: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateResponseRequest {
    pub content: String,
    pub role: Role,
    #[serde(default)]
    pub parent_id: Option<String>,
}

pub async fn create_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateTicketRequest>,
) -> Result<Json<Ticket>, AppError> {
    let student_id = require_user(&state, &headers)?;
    let ticket = state
        .db
        .create_ticket(&student_id, req.subject, &req.topic, &req.description)
        .await?;
    Ok(Json(ticket))
}

pub async fn student_tickets(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<TicketWithResponses>>, AppError> {
    let caller = require_user(&state, &headers)?;
    if caller != user_id {
        return Err(AppError::Forbidden(
            "Cannot list another student's tickets".to_string(),
        ));
    }
    Ok(Json(state.db.get_student_tickets(&user_id).await?))
}

pub async fn tutor_tickets(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<TicketWithResponses>>, AppError> {
    let caller = require_user(&state, &headers)?;
    if caller != user_id {
        return Err(AppError::Forbidden(
            "Cannot list another tutor's feed".to_string(),
        ));
    }
    Ok(Json(state.db.get_tutor_tickets(&user_id).await?))
}

pub async fn close_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(ticket_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let caller = require_user(&state, &headers)?;
    state.db.close_ticket(&ticket_id, &caller).await?;
    Ok(Json(serde_json::json!({ "closed": true })))
}

pub async fn create_response(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(ticket_id): Path<String>,
    Json(req): Json<CreateResponseRequest>,
) -> Result<Json<Response>, AppError> {
    let caller = require_user(&state, &headers)?;
    let response = state
        .db
        .create_response(
            &ticket_id,
            &caller,
            req.role,
            &req.content,
            req.parent_id.as_deref(),
        )
        .await?;
    Ok(Json(response))
}
