use super::{now, ConnectionInvitation, Database, Profile, StudentTutorConnection};
use crate::error::{is_unique_violation, AppError};
use shared::{InvitationStatus, Role};
use uuid::Uuid;

impl Database {
    /// Either side may start the handshake; the pair is always stored as
    /// (student, tutor) regardless of who sent it.
    pub async fn invite_connection(
        &self,
        inviter_id: &str,
        other_user_id: &str,
    ) -> Result<ConnectionInvitation, AppError> {
        let inviter = self
            .get_profile(inviter_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User profile not found".to_string()))?;
        let other = self
            .get_profile(other_user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User profile not found".to_string()))?;

        let (student_id, tutor_id) = match (inviter.role.as_str(), other.role.as_str()) {
            ("student", "tutor") => (inviter_id, other_user_id),
            ("tutor", "student") => (other_user_id, inviter_id),
            _ => {
                return Err(AppError::BadRequest(
                    "A connection links one student and one tutor".to_string(),
                ))
            }
        };

        let connected: Option<String> = sqlx::query_scalar(
            "SELECT student_id FROM student_tutor_connections WHERE student_id = ? AND tutor_id = ?",
        )
        .bind(student_id)
        .bind(tutor_id)
        .fetch_optional(self.pool())
        .await?;
        if connected.is_some() {
            return Err(AppError::Conflict("Already connected".to_string()));
        }

        let timestamp = now();
        let invitation = ConnectionInvitation {
            id: Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            tutor_id: tutor_id.to_string(),
            invited_by: inviter_id.to_string(),
            status: InvitationStatus::Pending.to_string(),
            created_at: timestamp.clone(),
            updated_at: timestamp,
        };
        sqlx::query(
            r#"
            INSERT INTO connection_invitations (id, student_id, tutor_id, invited_by, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&invitation.id)
        .bind(&invitation.student_id)
        .bind(&invitation.tutor_id)
        .bind(&invitation.invited_by)
        .bind(&invitation.status)
        .bind(&invitation.created_at)
        .bind(&invitation.updated_at)
        .execute(self.pool())
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::Conflict("Invitation already exists".to_string())
            } else {
                AppError::Database(err)
            }
        })?;

        Ok(invitation)
    }

    /// Accepting flips the invitation and records the durable pairing in
    /// one transaction. Only the invited party can accept.
    pub async fn accept_connection_invitation(
        &self,
        invitation_id: &str,
        user_id: &str,
    ) -> Result<StudentTutorConnection, AppError> {
        let invitation = sqlx::query_as::<_, ConnectionInvitation>(
            "SELECT * FROM connection_invitations WHERE id = ?",
        )
        .bind(invitation_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| AppError::NotFound("Invitation not found".to_string()))?;

        let is_party = user_id == invitation.student_id || user_id == invitation.tutor_id;
        if !is_party || user_id == invitation.invited_by {
            return Err(AppError::Forbidden(
                "Only the invited user can accept".to_string(),
            ));
        }
        if invitation.status != InvitationStatus::Pending.as_str() {
            return Err(AppError::Conflict(
                "Invitation already handled".to_string(),
            ));
        }

        let student = self.require_profile(&invitation.student_id).await?;
        let tutor = self.require_profile(&invitation.tutor_id).await?;

        let connection = StudentTutorConnection {
            student_id: invitation.student_id.clone(),
            student_username: student.username,
            tutor_id: invitation.tutor_id.clone(),
            tutor_username: tutor.username,
            created_at: now(),
        };

        let mut tx = self.pool().begin().await?;
        sqlx::query("UPDATE connection_invitations SET status = 'accepted', updated_at = ? WHERE id = ?")
            .bind(&connection.created_at)
            .bind(invitation_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO student_tutor_connections (student_id, student_username, tutor_id, tutor_username, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&connection.student_id)
        .bind(&connection.student_username)
        .bind(&connection.tutor_id)
        .bind(&connection.tutor_username)
        .bind(&connection.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::Conflict("Already connected".to_string())
            } else {
                AppError::Database(err)
            }
        })?;
        tx.commit().await?;

        Ok(connection)
    }

    pub async fn list_connection_invitations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConnectionInvitation>, AppError> {
        let invitations = sqlx::query_as::<_, ConnectionInvitation>(
            r#"
            SELECT * FROM connection_invitations
            WHERE (student_id = ? OR tutor_id = ?) AND invited_by != ? AND status = 'pending'
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(invitations)
    }

    pub async fn get_connected_students(&self, tutor_id: &str) -> Result<Vec<Profile>, AppError> {
        let students = sqlx::query_as::<_, Profile>(
            r#"
            SELECT profiles.* FROM profiles
            JOIN student_tutor_connections c ON c.student_id = profiles.user_id
            WHERE c.tutor_id = ?
            ORDER BY profiles.username
            "#,
        )
        .bind(tutor_id)
        .fetch_all(self.pool())
        .await?;
        Ok(students)
    }

    pub async fn get_connected_tutors(&self, student_id: &str) -> Result<Vec<Profile>, AppError> {
        let tutors = sqlx::query_as::<_, Profile>(
            r#"
            SELECT profiles.* FROM profiles
            JOIN student_tutor_connections c ON c.tutor_id = profiles.user_id
            WHERE c.student_id = ?
            ORDER BY profiles.username
            "#,
        )
        .bind(student_id)
        .fetch_all(self.pool())
        .await?;
        Ok(tutors)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{account, mem_db};
    use super::*;

    #[tokio::test]
    async fn test_handshake_produces_durable_pairing() {
        let db = mem_db().await;
        let ada = account(&db, "ada", Role::Student).await;
        let turing = account(&db, "turing", Role::Tutor).await;

        let invitation = db
            .invite_connection(&ada.user_id, &turing.user_id)
            .await
            .unwrap();
        assert_eq!(invitation.invited_by, ada.user_id);

        let listed = db.list_connection_invitations(&turing.user_id).await.unwrap();
        assert_eq!(listed.len(), 1);

        let connection = db
            .accept_connection_invitation(&invitation.id, &turing.user_id)
            .await
            .unwrap();
        assert_eq!(connection.student_username, "ada");
        assert_eq!(connection.tutor_username, "turing");

        let students = db.get_connected_students(&turing.user_id).await.unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].username, "ada");
        let tutors = db.get_connected_tutors(&ada.user_id).await.unwrap();
        assert_eq!(tutors[0].username, "turing");
    }

    #[tokio::test]
    async fn test_same_role_pairs_rejected() {
        let db = mem_db().await;
        let ada = account(&db, "ada", Role::Student).await;
        let grace = account(&db, "grace", Role::Student).await;
        let err = db
            .invite_connection(&ada.user_id, &grace.user_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_inviter_cannot_accept_own_invitation() {
        let db = mem_db().await;
        let ada = account(&db, "ada", Role::Student).await;
        let turing = account(&db, "turing", Role::Tutor).await;
        let invitation = db
            .invite_connection(&ada.user_id, &turing.user_id)
            .await
            .unwrap();

        let err = db
            .accept_connection_invitation(&invitation.id, &ada.user_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_duplicate_invitations_and_connections_conflict() {
        let db = mem_db().await;
        let ada = account(&db, "ada", Role::Student).await;
        let turing = account(&db, "turing", Role::Tutor).await;

        let invitation = db
            .invite_connection(&ada.user_id, &turing.user_id)
            .await
            .unwrap();
        // Same pair from the other direction collides with the pending row
        let err = db
            .invite_connection(&turing.user_id, &ada.user_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        db.accept_connection_invitation(&invitation.id, &turing.user_id)
            .await
            .unwrap();
        let err = db
            .invite_connection(&ada.user_id, &turing.user_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
