use super::{now, Database, Response, Ticket, TicketWithResponses};
use crate::error::AppError;
use shared::{Role, Subject};
use std::collections::HashMap;
use uuid::Uuid;

impl Database {
    /// Only students open tickets; the author's username is denormalized
    /// onto the row so listings never need a profile join.
    pub async fn create_ticket(
        &self,
        student_id: &str,
        subject: Subject,
        topic: &str,
        description: &str,
    ) -> Result<Ticket, AppError> {
        if Uuid::parse_str(student_id).is_err() {
            return Err(AppError::BadRequest("Invalid user ID format".to_string()));
        }

        let profile = self
            .get_profile(student_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Student profile not found".to_string()))?;
        if profile.role != Role::Student.as_str() {
            return Err(AppError::BadRequest(
                "Only students can create tickets".to_string(),
            ));
        }

        let ticket = Ticket {
            id: Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            student_username: profile.username,
            subject: subject.to_string(),
            topic: topic.to_string(),
            description: description.to_string(),
            closed: false,
            created_at: now(),
            last_response_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO tickets
                (id, student_id, student_username, subject, topic, description, closed, created_at, last_response_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&ticket.id)
        .bind(&ticket.student_id)
        .bind(&ticket.student_username)
        .bind(&ticket.subject)
        .bind(&ticket.topic)
        .bind(&ticket.description)
        .bind(ticket.closed)
        .bind(&ticket.created_at)
        .bind(&ticket.last_response_at)
        .execute(self.pool())
        .await?;

        Ok(ticket)
    }

    pub async fn get_student_tickets(
        &self,
        student_id: &str,
    ) -> Result<Vec<TicketWithResponses>, AppError> {
        let tickets = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE student_id = ? ORDER BY created_at DESC",
        )
        .bind(student_id)
        .fetch_all(self.pool())
        .await?;

        self.attach_responses(tickets).await
    }

    /// Open tickets in the subjects the tutor registered. A tutor with no
    /// registered subjects sees nothing.
    pub async fn get_tutor_tickets(
        &self,
        tutor_id: &str,
    ) -> Result<Vec<TicketWithResponses>, AppError> {
        let subjects = self.get_tutor_subjects(tutor_id).await?;
        if subjects.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; subjects.len()].join(", ");
        let sql = format!(
            "SELECT * FROM tickets WHERE closed = 0 AND subject IN ({placeholders}) \
             ORDER BY created_at DESC"
        );
        let mut query = sqlx::query_as::<_, Ticket>(&sql);
        for subject in &subjects {
            query = query.bind(subject);
        }
        let tickets = query.fetch_all(self.pool()).await?;

        self.attach_responses(tickets).await
    }

    pub async fn close_ticket(&self, ticket_id: &str, caller_id: &str) -> Result<(), AppError> {
        let ticket = self.get_ticket(ticket_id).await?;
        if ticket.student_id != caller_id {
            return Err(AppError::Forbidden(
                "Only the ticket owner can close it".to_string(),
            ));
        }

        sqlx::query("UPDATE tickets SET closed = 1 WHERE id = ?")
            .bind(ticket_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Students may only respond to their own tickets; tutors may respond
    /// anywhere. The parent ticket's `last_response_at` moves in the same
    /// transaction as the insert.
    pub async fn create_response(
        &self,
        ticket_id: &str,
        user_id: &str,
        role: Role,
        content: &str,
        parent_id: Option<&str>,
    ) -> Result<Response, AppError> {
        let profile = self
            .get_profile(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User profile not found".to_string()))?;
        if profile.role != role.as_str() {
            return Err(AppError::BadRequest(
                "Role does not match the author's profile".to_string(),
            ));
        }
        let ticket = self.get_ticket(ticket_id).await?;

        if role == Role::Student && ticket.student_id != user_id {
            return Err(AppError::Forbidden(
                "Not authorized to respond to this ticket".to_string(),
            ));
        }

        let response = Response {
            id: Uuid::new_v4().to_string(),
            ticket_id: ticket_id.to_string(),
            tutor_id: (role == Role::Tutor).then(|| user_id.to_string()),
            tutor_username: (role == Role::Tutor).then(|| profile.username.clone()),
            student_id: (role == Role::Student).then(|| user_id.to_string()),
            student_username: (role == Role::Student).then(|| profile.username.clone()),
            content: content.to_string(),
            parent_id: parent_id.map(str::to_string),
            created_at: now(),
        };

        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"
            INSERT INTO responses
                (id, ticket_id, tutor_id, tutor_username, student_id, student_username, content, parent_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&response.id)
        .bind(&response.ticket_id)
        .bind(&response.tutor_id)
        .bind(&response.tutor_username)
        .bind(&response.student_id)
        .bind(&response.student_username)
        .bind(&response.content)
        .bind(&response.parent_id)
        .bind(&response.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE tickets SET last_response_at = ? WHERE id = ?")
            .bind(&response.created_at)
            .bind(ticket_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(response)
    }

    async fn get_ticket(&self, ticket_id: &str) -> Result<Ticket, AppError> {
        sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = ?")
            .bind(ticket_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))
    }

    async fn attach_responses(
        &self,
        tickets: Vec<Ticket>,
    ) -> Result<Vec<TicketWithResponses>, AppError> {
        if tickets.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; tickets.len()].join(", ");
        let sql = format!(
            "SELECT * FROM responses WHERE ticket_id IN ({placeholders}) ORDER BY created_at ASC"
        );
        let mut query = sqlx::query_as::<_, Response>(&sql);
        for ticket in &tickets {
            query = query.bind(&ticket.id);
        }
        let responses = query.fetch_all(self.pool()).await?;

        let mut by_ticket: HashMap<String, Vec<Response>> = HashMap::new();
        for response in responses {
            by_ticket
                .entry(response.ticket_id.clone())
                .or_default()
                .push(response);
        }

        Ok(tickets
            .into_iter()
            .map(|ticket| {
                let responses = by_ticket.remove(&ticket.id).unwrap_or_default();
                TicketWithResponses { ticket, responses }
            })
            .collect())
    }
}
