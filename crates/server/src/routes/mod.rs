use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod auth;
mod connections;
mod conversations;
mod health;
mod meetings;
mod profiles;
mod rooms;
mod storage;
mod tickets;
mod ws;

pub use auth::require_user;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Auth routes
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        // Profiles
        .route("/profiles", post(profiles::create_profile))
        .route("/profiles/search", get(profiles::search))
        .route("/profiles/:user_id", get(profiles::get_profile))
        .route("/profiles/:user_id", put(profiles::update_profile))
        // Tickets and responses
        .route("/tickets", post(tickets::create_ticket))
        .route("/tickets/student/:user_id", get(tickets::student_tickets))
        .route("/tickets/tutor/:user_id", get(tickets::tutor_tickets))
        .route("/tickets/:id/close", post(tickets::close_ticket))
        .route("/tickets/:id/responses", post(tickets::create_response))
        // Conversations and messages
        .route("/conversations", post(conversations::create_or_get))
        .route("/conversations/user/:user_id", get(conversations::user_conversations))
        .route("/conversations/:id/messages", get(conversations::messages))
        .route("/conversations/:id/messages", post(conversations::send_message))
        // Meetings
        .route("/meetings", post(meetings::request_meeting))
        .route("/meetings/user/:user_id", get(meetings::user_meetings))
        .route("/meetings/:id/status", put(meetings::update_status))
        // Study rooms
        .route("/study-rooms", post(rooms::create_room))
        .route("/study-rooms", get(rooms::list_rooms))
        .route("/study-rooms/invitations", get(rooms::list_invitations))
        .route("/study-rooms/invitations/:id/accept", post(rooms::accept_invitation))
        .route("/study-rooms/:id/join", post(rooms::join_room))
        .route("/study-rooms/:id/leave", post(rooms::leave_room))
        .route("/study-rooms/:id/messages", get(rooms::messages))
        .route("/study-rooms/:id/messages", post(rooms::send_message))
        .route("/study-rooms/:id/invitations", post(rooms::invite))
        // Student-tutor connections
        .route("/connections/invitations", post(connections::invite))
        .route("/connections/invitations", get(connections::list_invitations))
        .route("/connections/invitations/:id/accept", post(connections::accept))
        .route("/connections/students/:tutor_id", get(connections::connected_students))
        .route("/connections/tutors/:student_id", get(connections::connected_tutors))
        // Upload storage
        .route("/storage/upload-url", post(storage::upload_url))
        .route("/storage/download-url", post(storage::download_url))
        .route("/storage/delete", delete(storage::delete))
        // Realtime change feed
        .route("/ws", get(ws::ws_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, db::Database, storage::ObjectStorage};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn test_router() -> Router {
        let mut config = Config::default();
        config.auth.jwt_secret = "test-secret".to_string();
        config.storage.region = "us-east-1".to_string();
        config.storage.bucket = "test-bucket".to_string();
        config.storage.access_key = "AKIA".to_string();
        config.storage.secret_key = "shhh".to_string();

        let db = Database::new_in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        let storage = ObjectStorage::connect(&config.storage).await;
        create_router(AppState::new(db, config, storage))
    }

    async fn send_json(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn register(app: &Router, username: &str, role: &str) -> (String, String) {
        let (status, body) = send_json(
            app,
            "POST",
            "/auth/register",
            None,
            json!({
                "email": format!("{username}@example.com"),
                "password": "hunter22",
                "username": username,
                "role": role,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        (
            body["token"].as_str().unwrap().to_string(),
            body["user_id"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let app = test_router().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_routes_require_bearer() {
        let app = test_router().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/study-rooms")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_login_and_duplicate_email() {
        let app = test_router().await;
        register(&app, "ada", "student").await;

        let (status, _) = send_json(
            &app,
            "POST",
            "/auth/register",
            None,
            json!({
                "email": "ada@example.com",
                "password": "hunter22",
                "username": "ada2",
                "role": "student",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send_json(
            &app,
            "POST",
            "/auth/login",
            None,
            json!({ "email": "ada@example.com", "password": "hunter22" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["token"].as_str().is_some());

        let (status, _) = send_json(
            &app,
            "POST",
            "/auth/login",
            None,
            json!({ "email": "ada@example.com", "password": "wrong" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    /// The ticket lifecycle across both roles, end to end over HTTP.
    #[tokio::test]
    async fn test_ticket_scenario() {
        let app = test_router().await;
        let (student_token, student_id) = register(&app, "ada", "student").await;
        let (tutor_token, tutor_id) = register(&app, "turing", "tutor").await;

        // Tutor registers for Math
        let (status, _) = send_json(
            &app,
            "PUT",
            &format!("/profiles/{tutor_id}"),
            Some(&tutor_token),
            json!({ "specialties": ["Math"] }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // Student opens a Math ticket
        let (status, ticket) = send_json(
            &app,
            "POST",
            "/tickets",
            Some(&student_token),
            json!({ "subject": "Math", "topic": "Derivatives", "description": "chain rule?" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ticket["closed"], json!(false));
        let ticket_id = ticket["id"].as_str().unwrap();

        // Visible to its owner and to the Math tutor
        let (_, mine) = send_json(
            &app,
            "GET",
            &format!("/tickets/student/{student_id}"),
            Some(&student_token),
            json!({}),
        )
        .await;
        assert_eq!(mine.as_array().unwrap().len(), 1);

        let (_, feed) = send_json(
            &app,
            "GET",
            &format!("/tickets/tutor/{tutor_id}"),
            Some(&tutor_token),
            json!({}),
        )
        .await;
        assert_eq!(feed.as_array().unwrap().len(), 1);

        // Tutor responds; the response nests under the ticket for the student
        let (status, _) = send_json(
            &app,
            "POST",
            &format!("/tickets/{ticket_id}/responses"),
            Some(&tutor_token),
            json!({ "content": "use the chain rule", "role": "tutor" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, mine) = send_json(
            &app,
            "GET",
            &format!("/tickets/student/{student_id}"),
            Some(&student_token),
            json!({}),
        )
        .await;
        assert_eq!(mine[0]["responses"].as_array().unwrap().len(), 1);
        assert!(mine[0]["last_response_at"].as_str().is_some());

        // A student cannot read someone else's ticket list
        let (status, _) = send_json(
            &app,
            "GET",
            &format!("/tickets/student/{student_id}"),
            Some(&tutor_token),
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_meeting_status_over_http() {
        let app = test_router().await;
        let (student_token, _) = register(&app, "ada", "student").await;
        let (tutor_token, tutor_id) = register(&app, "turing", "tutor").await;

        let (status, meeting) = send_json(
            &app,
            "POST",
            "/meetings",
            Some(&student_token),
            json!({
                "tutor_id": tutor_id,
                "subject": "Math",
                "start_time": "2026-09-01T10:00:00Z",
                "end_time": "2026-09-01T11:00:00Z",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(meeting["status"], json!("pending"));
        let meeting_id = meeting["id"].as_str().unwrap();

        // pending -> completed is not a legal move
        let (status, _) = send_json(
            &app,
            "PUT",
            &format!("/meetings/{meeting_id}/status"),
            Some(&tutor_token),
            json!({ "status": "completed" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, meeting) = send_json(
            &app,
            "PUT",
            &format!("/meetings/{meeting_id}/status"),
            Some(&tutor_token),
            json!({ "status": "accepted" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(meeting["status"], json!("accepted"));
    }
}
