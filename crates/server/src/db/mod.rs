use crate::error::AppError;
use chrono::{SecondsFormat, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;

mod connections;
mod conversations;
mod meetings;
mod models;
mod profiles;
mod rooms;
mod tickets;

pub use models::*;
pub use profiles::{NewProfile, ProfilePatch};

/// Fixed-width UTC timestamp so lexicographic ordering matches time order.
pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(path: &str) -> anyhow::Result<Self> {
        // Ensure the directory exists
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let database_url = format!("sqlite:{}?mode=rwc", path);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Single-connection pool; a shared in-memory database evaporates per
    /// connection otherwise.
    #[cfg(test)]
    pub async fn new_in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY REFERENCES users(id),
                username TEXT UNIQUE NOT NULL,
                role TEXT NOT NULL,
                email TEXT NOT NULL,
                hourly_rate REAL,
                specialties TEXT NOT NULL DEFAULT '[]',
                struggles TEXT NOT NULL DEFAULT '[]',
                bio TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tutor_subjects (
                tutor_id TEXT NOT NULL REFERENCES profiles(user_id),
                subject TEXT NOT NULL,
                PRIMARY KEY (tutor_id, subject)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL REFERENCES profiles(user_id),
                student_username TEXT NOT NULL,
                subject TEXT NOT NULL,
                topic TEXT NOT NULL,
                description TEXT NOT NULL,
                closed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_response_at TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS responses (
                id TEXT PRIMARY KEY,
                ticket_id TEXT NOT NULL REFERENCES tickets(id),
                tutor_id TEXT,
                tutor_username TEXT,
                student_id TEXT,
                student_username TEXT,
                content TEXT NOT NULL,
                parent_id TEXT REFERENCES responses(id),
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                pair_key TEXT UNIQUE NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS conversation_participants (
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                user_id TEXT NOT NULL,
                username TEXT NOT NULL,
                PRIMARY KEY (conversation_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                sender_id TEXT NOT NULL,
                sender_username TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS meetings (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL REFERENCES profiles(user_id),
                student_username TEXT NOT NULL,
                tutor_id TEXT NOT NULL REFERENCES profiles(user_id),
                tutor_username TEXT NOT NULL,
                subject TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS study_rooms (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                subject TEXT NOT NULL,
                description TEXT,
                created_by TEXT NOT NULL REFERENCES profiles(user_id),
                is_private INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS study_room_participants (
                room_id TEXT NOT NULL REFERENCES study_rooms(id),
                user_id TEXT NOT NULL,
                username TEXT NOT NULL,
                joined_at TEXT NOT NULL,
                PRIMARY KEY (room_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS study_room_messages (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL REFERENCES study_rooms(id),
                sender_id TEXT NOT NULL,
                sender_username TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS study_room_invitations (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL REFERENCES study_rooms(id),
                invitee_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (room_id, invitee_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS connection_invitations (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL,
                tutor_id TEXT NOT NULL,
                invited_by TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (student_id, tutor_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS student_tutor_connections (
                student_id TEXT NOT NULL,
                student_username TEXT NOT NULL,
                tutor_id TEXT NOT NULL,
                tutor_username TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (student_id, tutor_id)
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        tracing::info!("Database migrations completed");
        Ok(())
    }

    // User operations
    pub async fn create_user(&self, user: &User) -> Result<(), AppError> {
        sqlx::query("INSERT INTO users (id, email, password_hash, created_at) VALUES (?, ?, ?, ?)")
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use shared::{Role, Subject};
    use uuid::Uuid;

    pub async fn mem_db() -> Database {
        let db = Database::new_in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        db
    }

    pub async fn account(db: &Database, username: &str, role: Role) -> Profile {
        let user_id = Uuid::new_v4().to_string();
        let email = format!("{username}@example.com");
        db.create_user(&User {
            id: user_id.clone(),
            email: email.clone(),
            password_hash: "hash".to_string(),
            created_at: now(),
        })
        .await
        .unwrap();
        db.create_profile(NewProfile {
            user_id,
            username: username.to_string(),
            email,
            role,
            hourly_rate: None,
            specialties: Vec::new(),
            struggles: Vec::new(),
            bio: None,
        })
        .await
        .unwrap()
    }

    pub async fn tutor_with_subjects(
        db: &Database,
        username: &str,
        subjects: &[Subject],
    ) -> Profile {
        let profile = account(db, username, Role::Tutor).await;
        db.update_profile(
            &profile.user_id,
            ProfilePatch {
                specialties: Some(subjects.to_vec()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }
}
