use super::{now, Database, Meeting};
use crate::error::AppError;
use shared::{MeetingStatus, Role, Subject};
use uuid::Uuid;

impl Database {
    pub async fn request_meeting(
        &self,
        student_id: &str,
        tutor_id: &str,
        subject: Subject,
        start_time: &str,
        end_time: &str,
        notes: Option<&str>,
    ) -> Result<Meeting, AppError> {
        let student = self
            .get_profile(student_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Student profile not found".to_string()))?;
        let tutor = self
            .get_profile(tutor_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Tutor profile not found".to_string()))?;

        let timestamp = now();
        let meeting = Meeting {
            id: Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            student_username: student.username,
            tutor_id: tutor_id.to_string(),
            tutor_username: tutor.username,
            subject: subject.to_string(),
            start_time: start_time.to_string(),
            end_time: end_time.to_string(),
            status: MeetingStatus::Pending.to_string(),
            notes: notes.map(str::to_string),
            created_at: timestamp.clone(),
            updated_at: timestamp,
        };

        sqlx::query(
            r#"
            INSERT INTO meetings
                (id, student_id, student_username, tutor_id, tutor_username, subject,
                 start_time, end_time, status, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&meeting.id)
        .bind(&meeting.student_id)
        .bind(&meeting.student_username)
        .bind(&meeting.tutor_id)
        .bind(&meeting.tutor_username)
        .bind(&meeting.subject)
        .bind(&meeting.start_time)
        .bind(&meeting.end_time)
        .bind(&meeting.status)
        .bind(&meeting.notes)
        .bind(&meeting.created_at)
        .bind(&meeting.updated_at)
        .execute(self.pool())
        .await?;

        Ok(meeting)
    }

    pub async fn get_user_meetings(
        &self,
        user_id: &str,
        role: Role,
    ) -> Result<Vec<Meeting>, AppError> {
        let column = match role {
            Role::Student => "student_id",
            Role::Tutor => "tutor_id",
        };
        let sql = format!("SELECT * FROM meetings WHERE {column} = ? ORDER BY start_time ASC");
        let meetings = sqlx::query_as::<_, Meeting>(&sql)
            .bind(user_id)
            .fetch_all(self.pool())
            .await?;
        Ok(meetings)
    }

    /// Status changes go through the transition table; an illegal move is
    /// rejected here, not written and reconciled later. Only the two
    /// parties to the meeting may move it.
    pub async fn update_meeting_status(
        &self,
        meeting_id: &str,
        next: MeetingStatus,
        caller_id: &str,
    ) -> Result<Meeting, AppError> {
        let mut meeting = sqlx::query_as::<_, Meeting>("SELECT * FROM meetings WHERE id = ?")
            .bind(meeting_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("Meeting not found".to_string()))?;

        if meeting.student_id != caller_id && meeting.tutor_id != caller_id {
            return Err(AppError::Forbidden(
                "Not a party to this meeting".to_string(),
            ));
        }

        let current: MeetingStatus = meeting
            .status
            .parse()
            .map_err(|_| AppError::Internal(format!("corrupt meeting status: {}", meeting.status)))?;
        if !current.can_transition_to(next) {
            return Err(AppError::BadRequest(format!(
                "illegal meeting status transition: {current} -> {next}"
            )));
        }

        let timestamp = now();
        sqlx::query("UPDATE meetings SET status = ?, updated_at = ? WHERE id = ?")
            .bind(next.as_str())
            .bind(&timestamp)
            .bind(meeting_id)
            .execute(self.pool())
            .await?;

        meeting.status = next.to_string();
        meeting.updated_at = timestamp;
        Ok(meeting)
    }
}
