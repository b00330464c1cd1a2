use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use shared::{Role, Subject};

use crate::{
    db::{NewProfile, Profile, ProfilePatch},
    error::AppError,
    routes::require_user,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateProfileRequest {
    pub username: String,
    pub role: Role,
    #[serde(default)]
    pub hourly_rate: Option<f64>,
    #[serde(default)]
    pub specialties: Vec<Subject>,
    #[serde(default)]
    pub struggles: Vec<Subject>,
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub hourly_rate: Option<f64>,
    pub specialties: Option<Vec<Subject>>,
    pub struggles: Option<Vec<Subject>>,
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub role: Option<Role>,
}

/// Creates a profile for an account registered without one (the signup
/// endpoint normally does this in the same breath).
pub async fn create_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateProfileRequest>,
) -> Result<Json<Profile>, AppError> {
    let user_id = require_user(&state, &headers)?;
    let user = state
        .db
        .get_user_by_id(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Account not found".to_string()))?;

    let profile = state
        .db
        .create_profile(NewProfile {
            user_id,
            username: req.username,
            email: user.email,
            role: req.role,
            hourly_rate: req.hourly_rate,
            specialties: req.specialties,
            struggles: req.struggles,
            bio: req.bio,
        })
        .await?;
    Ok(Json(profile))
}

pub async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Profile>, AppError> {
    require_user(&state, &headers)?;
    let profile = state
        .db
        .get_profile(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;
    Ok(Json(profile))
}

pub async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>, AppError> {
    let caller = require_user(&state, &headers)?;
    if caller != user_id {
        return Err(AppError::Forbidden(
            "Cannot update another user's profile".to_string(),
        ));
    }

    let profile = state
        .db
        .update_profile(
            &user_id,
            ProfilePatch {
                username: req.username,
                hourly_rate: req.hourly_rate,
                specialties: req.specialties,
                struggles: req.struggles,
                bio: req.bio,
            },
        )
        .await?;
    Ok(Json(profile))
}

pub async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Profile>>, AppError> {
    require_user(&state, &headers)?;
    let profiles = state.db.search_users(&query.q, query.role).await?;
    Ok(Json(profiles))
}
