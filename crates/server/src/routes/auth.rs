use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, http::header, http::HeaderMap, Json};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use shared::Role;
use std::time::Duration;
use uuid::Uuid;

use crate::{
    db::{self, NewProfile, Profile, User},
    error::AppError,
    state::AppState,
};

/// Profile creation retries this many times before the signup fails.
const PROFILE_CREATE_ATTEMPTS: u32 = 3;
const PROFILE_CREATE_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub exp: usize,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    if req.username.trim().is_empty() {
        return Err(AppError::BadRequest("Username is required".to_string()));
    }
    if req.password.len() < 6 {
        return Err(AppError::BadRequest(
            "Password must be at least 6 characters".to_string(),
        ));
    }

    // Check if user already exists
    if state.db.get_user_by_email(&req.email).await?.is_some() {
        return Err(AppError::BadRequest("Email already registered".to_string()));
    }

    // Hash password
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(e.to_string()))?
        .to_string();

    // Create user
    let user_id = Uuid::new_v4().to_string();
    let user = User {
        id: user_id.clone(),
        email: req.email.clone(),
        password_hash,
        created_at: db::now(),
    };
    state.db.create_user(&user).await?;

    // Profile creation gets a short retry window: losing the profile here
    // strands the account behind an email-uniqueness check
    let mut attempt = 0;
    let profile = loop {
        attempt += 1;
        let new_profile = NewProfile {
            user_id: user_id.clone(),
            username: req.username.trim().to_string(),
            email: req.email.clone(),
            role: req.role,
            hourly_rate: None,
            specialties: Vec::new(),
            struggles: Vec::new(),
            bio: None,
        };
        match state.db.create_profile(new_profile).await {
            Ok(profile) => break profile,
            Err(AppError::Database(err)) if attempt < PROFILE_CREATE_ATTEMPTS => {
                tracing::warn!("profile creation attempt {attempt} failed: {err}");
                tokio::time::sleep(PROFILE_CREATE_BACKOFF).await;
            }
            Err(err) => return Err(err),
        }
    };

    // Generate token
    let token = generate_token(&user_id, &state.config.auth)?;

    Ok(Json(AuthResponse {
        token,
        user_id,
        profile: Some(profile),
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    // Find user
    let user = state
        .db
        .get_user_by_email(&req.email)
        .await?
        .ok_or_else(|| AppError::AuthError("Invalid email or password".to_string()))?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::AuthError("Invalid email or password".to_string()))?;

    // Generate token
    let token = generate_token(&user.id, &state.config.auth)?;

    Ok(Json(AuthResponse {
        token,
        user_id: user.id,
        profile: None,
    }))
}

fn generate_token(
    user_id: &str,
    auth_config: &crate::config::AuthConfig,
) -> Result<String, AppError> {
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::hours(auth_config.token_expiry_hours as i64))
        .ok_or_else(|| AppError::Internal("Failed to calculate expiration".to_string()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(auth_config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(e.to_string()))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    jsonwebtoken::decode::<Claims>(
        token,
        &jsonwebtoken::DecodingKey::from_secret(secret.as_bytes()),
        &jsonwebtoken::Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::AuthError(e.to_string()))
}

/// Extracts and verifies the bearer token, returning the caller's user id.
/// Every authenticated route goes through here.
pub fn require_user(state: &AppState, headers: &HeaderMap) -> Result<String, AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::AuthError("Missing or invalid Authorization header".to_string())
        })?;

    let claims = verify_token(token, &state.config.auth.jwt_secret)?;
    Ok(claims.sub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;

    fn auth_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".to_string(),
            token_expiry_hours: 1,
        }
    }

    #[test]
    fn test_token_roundtrip() {
        let config = auth_config();
        let token = generate_token("user-1", &config).unwrap();
        let claims = verify_token(&token, &config.jwt_secret).unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let config = auth_config();
        let token = generate_token("user-1", &config).unwrap();
        assert!(verify_token(&token, "other-secret").is_err());
    }
}
