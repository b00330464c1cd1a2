use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use shared::{ChangeEvent, MeetingEvent, MeetingStatus, Role, Subject, Topic};

use crate::{db::Meeting, error::AppError, routes::require_user, state::AppState};

#[derive(Debug, Deserialize)]
pub struct RequestMeetingRequest {
    pub tutor_id: String,
    pub subject: Subject,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: MeetingStatus,
}

pub async fn request_meeting(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RequestMeetingRequest>,
) -> Result<Json<Meeting>, AppError> {
    let student_id = require_user(&state, &headers)?;
    let meeting = state
        .db
        .request_meeting(
            &student_id,
            &req.tutor_id,
            req.subject,
            &req.start_time,
            &req.end_time,
            req.notes.as_deref(),
        )
        .await?;

    publish_meeting(&state, &meeting);
    Ok(Json(meeting))
}

pub async fn user_meetings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Meeting>>, AppError> {
    let caller = require_user(&state, &headers)?;
    if caller != user_id {
        return Err(AppError::Forbidden(
            "Cannot list another user's meetings".to_string(),
        ));
    }
    let profile = state
        .db
        .get_profile(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;
    let role: Role = profile
        .role
        .parse()
        .map_err(|_| AppError::Internal(format!("corrupt profile role: {}", profile.role)))?;

    Ok(Json(state.db.get_user_meetings(&user_id, role).await?))
}

pub async fn update_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(meeting_id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Meeting>, AppError> {
    let caller = require_user(&state, &headers)?;
    let meeting = state
        .db
        .update_meeting_status(&meeting_id, req.status, &caller)
        .await?;

    publish_meeting(&state, &meeting);
    Ok(Json(meeting))
}

/// Both parties' meeting feeds hear about every change.
fn publish_meeting(state: &AppState, meeting: &Meeting) {
    let event = MeetingEvent {
        id: meeting.id.clone(),
        student_id: meeting.student_id.clone(),
        student_username: meeting.student_username.clone(),
        tutor_id: meeting.tutor_id.clone(),
        tutor_username: meeting.tutor_username.clone(),
        subject: meeting.subject.clone(),
        start_time: meeting.start_time.clone(),
        end_time: meeting.end_time.clone(),
        status: meeting.status.clone(),
        notes: meeting.notes.clone(),
    };
    for user_id in [&meeting.student_id, &meeting.tutor_id] {
        state.hub.publish(
            Topic::Meetings(user_id.clone()),
            ChangeEvent::MeetingChanged {
                meeting: event.clone(),
            },
        );
    }
}
