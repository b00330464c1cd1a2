use super::{
    now, Database, StudyRoom, StudyRoomInvitation, StudyRoomMessage, StudyRoomParticipant,
    StudyRoomWithParticipants,
};
use crate::error::{is_unique_violation, AppError};
use shared::{InvitationStatus, Subject};
use uuid::Uuid;

impl Database {
    /// Room insert and creator auto-join are one transaction; a room can
    /// never exist without its creator on the roster.
    pub async fn create_study_room(
        &self,
        name: &str,
        subject: Subject,
        description: Option<&str>,
        created_by: &str,
        is_private: bool,
    ) -> Result<StudyRoomWithParticipants, AppError> {
        let creator = self
            .get_profile(created_by)
            .await?
            .ok_or_else(|| AppError::NotFound("User profile not found".to_string()))?;

        let timestamp = now();
        let room = StudyRoom {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            subject: subject.to_string(),
            description: description.map(str::to_string),
            created_by: created_by.to_string(),
            is_private,
            created_at: timestamp.clone(),
            updated_at: timestamp.clone(),
        };
        let participant = StudyRoomParticipant {
            room_id: room.id.clone(),
            user_id: created_by.to_string(),
            username: creator.username,
            joined_at: timestamp,
        };

        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"
            INSERT INTO study_rooms
                (id, name, subject, description, created_by, is_private, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&room.id)
        .bind(&room.name)
        .bind(&room.subject)
        .bind(&room.description)
        .bind(&room.created_by)
        .bind(room.is_private)
        .bind(&room.created_at)
        .bind(&room.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO study_room_participants (room_id, user_id, username, joined_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&participant.room_id)
        .bind(&participant.user_id)
        .bind(&participant.username)
        .bind(&participant.joined_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(StudyRoomWithParticipants {
            room,
            participants: vec![participant],
        })
    }

    /// Public rooms, plus private rooms the caller participates in or was
    /// invited to. Private rooms never surface to anyone else.
    pub async fn list_study_rooms(
        &self,
        caller_id: &str,
        subject: Option<Subject>,
    ) -> Result<Vec<StudyRoomWithParticipants>, AppError> {
        let subject = subject.map(|s| s.to_string());
        let rooms = sqlx::query_as::<_, StudyRoom>(
            r#"
            SELECT * FROM study_rooms
            WHERE (? IS NULL OR subject = ?)
              AND (is_private = 0
                   OR EXISTS (SELECT 1 FROM study_room_participants p
                              WHERE p.room_id = study_rooms.id AND p.user_id = ?)
                   OR EXISTS (SELECT 1 FROM study_room_invitations i
                              WHERE i.room_id = study_rooms.id AND i.invitee_id = ?))
            ORDER BY created_at DESC
            "#,
        )
        .bind(&subject)
        .bind(&subject)
        .bind(caller_id)
        .bind(caller_id)
        .fetch_all(self.pool())
        .await?;

        let mut result = Vec::with_capacity(rooms.len());
        for room in rooms {
            let participants = self.room_participants(&room.id).await?;
            result.push(StudyRoomWithParticipants { room, participants });
        }
        Ok(result)
    }

    pub async fn join_study_room(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<StudyRoomParticipant, AppError> {
        let room = self.get_study_room(room_id).await?;
        let profile = self
            .get_profile(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User profile not found".to_string()))?;

        if room.is_private && room.created_by != user_id {
            let accepted: Option<String> = sqlx::query_scalar(
                "SELECT id FROM study_room_invitations WHERE room_id = ? AND invitee_id = ? AND status = 'accepted'",
            )
            .bind(room_id)
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
            if accepted.is_none() {
                return Err(AppError::Forbidden(
                    "This is a private room. You need an invitation to join.".to_string(),
                ));
            }
        }

        let participant = StudyRoomParticipant {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            username: profile.username,
            joined_at: now(),
        };
        sqlx::query(
            "INSERT INTO study_room_participants (room_id, user_id, username, joined_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&participant.room_id)
        .bind(&participant.user_id)
        .bind(&participant.username)
        .bind(&participant.joined_at)
        .execute(self.pool())
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::Conflict("Already a participant".to_string())
            } else {
                AppError::Database(err)
            }
        })?;

        Ok(participant)
    }

    /// Leaving is idempotent; leaving a room you never joined is a no-op.
    pub async fn leave_study_room(&self, room_id: &str, user_id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM study_room_participants WHERE room_id = ? AND user_id = ?")
            .bind(room_id)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn get_study_room_messages(
        &self,
        room_id: &str,
        caller_id: &str,
    ) -> Result<Vec<StudyRoomMessage>, AppError> {
        self.require_participant(room_id, caller_id).await?;
        let messages = sqlx::query_as::<_, StudyRoomMessage>(
            "SELECT * FROM study_room_messages WHERE room_id = ? ORDER BY created_at ASC",
        )
        .bind(room_id)
        .fetch_all(self.pool())
        .await?;
        Ok(messages)
    }

    pub async fn send_study_room_message(
        &self,
        room_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<StudyRoomMessage, AppError> {
        let sender = self.require_participant(room_id, sender_id).await?;

        let message = StudyRoomMessage {
            id: Uuid::new_v4().to_string(),
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            sender_username: sender.username,
            content: content.to_string(),
            created_at: now(),
        };

        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"
            INSERT INTO study_room_messages (id, room_id, sender_id, sender_username, content, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.room_id)
        .bind(&message.sender_id)
        .bind(&message.sender_username)
        .bind(&message.content)
        .bind(&message.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE study_rooms SET updated_at = ? WHERE id = ?")
            .bind(&message.created_at)
            .bind(room_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(message)
    }

    /// Only the creator of a private room can invite; invitees are looked
    /// up by the email on their profile.
    pub async fn invite_to_study_room(
        &self,
        room_id: &str,
        inviter_id: &str,
        invitee_email: &str,
    ) -> Result<StudyRoomInvitation, AppError> {
        let room = self.get_study_room(room_id).await?;
        if !room.is_private {
            return Err(AppError::BadRequest("Room is not private".to_string()));
        }
        if room.created_by != inviter_id {
            return Err(AppError::Forbidden(
                "Only the room creator can invite".to_string(),
            ));
        }

        let invitee = self
            .get_profile_by_email(invitee_email)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let timestamp = now();
        let invitation = StudyRoomInvitation {
            id: Uuid::new_v4().to_string(),
            room_id: room_id.to_string(),
            invitee_id: invitee.user_id,
            status: InvitationStatus::Pending.to_string(),
            created_at: timestamp.clone(),
            updated_at: timestamp,
        };
        sqlx::query(
            r#"
            INSERT INTO study_room_invitations (id, room_id, invitee_id, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&invitation.id)
        .bind(&invitation.room_id)
        .bind(&invitation.invitee_id)
        .bind(&invitation.status)
        .bind(&invitation.created_at)
        .bind(&invitation.updated_at)
        .execute(self.pool())
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::Conflict("User already invited".to_string())
            } else {
                AppError::Database(err)
            }
        })?;

        Ok(invitation)
    }

    /// Accepting joins the room and flips the invitation in one transaction.
    pub async fn accept_study_room_invitation(
        &self,
        invitation_id: &str,
        user_id: &str,
    ) -> Result<StudyRoomParticipant, AppError> {
        let invitation = sqlx::query_as::<_, StudyRoomInvitation>(
            "SELECT * FROM study_room_invitations WHERE id = ? AND invitee_id = ?",
        )
        .bind(invitation_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| AppError::NotFound("Invitation not found".to_string()))?;

        if invitation.status != InvitationStatus::Pending.as_str() {
            return Err(AppError::Conflict(
                "Invitation already handled".to_string(),
            ));
        }

        let profile = self
            .get_profile(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User profile not found".to_string()))?;

        let timestamp = now();
        let participant = StudyRoomParticipant {
            room_id: invitation.room_id.clone(),
            user_id: user_id.to_string(),
            username: profile.username,
            joined_at: timestamp.clone(),
        };

        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "INSERT INTO study_room_participants (room_id, user_id, username, joined_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&participant.room_id)
        .bind(&participant.user_id)
        .bind(&participant.username)
        .bind(&participant.joined_at)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::Conflict("Already a participant".to_string())
            } else {
                AppError::Database(err)
            }
        })?;

        sqlx::query("UPDATE study_room_invitations SET status = 'accepted', updated_at = ? WHERE id = ?")
            .bind(&timestamp)
            .bind(invitation_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(participant)
    }

    pub async fn list_study_room_invitations(
        &self,
        user_id: &str,
    ) -> Result<Vec<StudyRoomInvitation>, AppError> {
        let invitations = sqlx::query_as::<_, StudyRoomInvitation>(
            "SELECT * FROM study_room_invitations WHERE invitee_id = ? AND status = 'pending' ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(invitations)
    }

    async fn get_study_room(&self, room_id: &str) -> Result<StudyRoom, AppError> {
        sqlx::query_as::<_, StudyRoom>("SELECT * FROM study_rooms WHERE id = ?")
            .bind(room_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("Study room not found".to_string()))
    }

    pub(crate) async fn room_participants(
        &self,
        room_id: &str,
    ) -> Result<Vec<StudyRoomParticipant>, AppError> {
        let participants = sqlx::query_as::<_, StudyRoomParticipant>(
            "SELECT * FROM study_room_participants WHERE room_id = ? ORDER BY joined_at ASC",
        )
        .bind(room_id)
        .fetch_all(self.pool())
        .await?;
        Ok(participants)
    }

    async fn require_participant(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<StudyRoomParticipant, AppError> {
        // Distinguish "no such room" from "not in it"
        self.get_study_room(room_id).await?;
        sqlx::query_as::<_, StudyRoomParticipant>(
            "SELECT * FROM study_room_participants WHERE room_id = ? AND user_id = ?",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| AppError::Forbidden("Not a participant in this room".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{account, mem_db};
    use super::*;
    use shared::Role;

    #[tokio::test]
    async fn test_create_auto_joins_creator() {
        let db = mem_db().await;
        let ada = account(&db, "ada", Role::Student).await;
        let room = db
            .create_study_room("calc crunch", Subject::Math, None, &ada.user_id, false)
            .await
            .unwrap();

        assert_eq!(room.participants.len(), 1);
        assert_eq!(room.participants[0].user_id, ada.user_id);
    }

    #[tokio::test]
    async fn test_private_room_hidden_from_strangers() {
        let db = mem_db().await;
        let ada = account(&db, "ada", Role::Student).await;
        let grace = account(&db, "grace", Role::Student).await;
        db.create_study_room("secret", Subject::Math, None, &ada.user_id, true)
            .await
            .unwrap();
        db.create_study_room("open", Subject::Math, None, &ada.user_id, false)
            .await
            .unwrap();

        let for_creator = db.list_study_rooms(&ada.user_id, None).await.unwrap();
        assert_eq!(for_creator.len(), 2);

        let for_stranger = db.list_study_rooms(&grace.user_id, None).await.unwrap();
        assert_eq!(for_stranger.len(), 1);
        assert_eq!(for_stranger[0].room.name, "open");
    }

    #[tokio::test]
    async fn test_invited_user_sees_private_room() {
        let db = mem_db().await;
        let ada = account(&db, "ada", Role::Student).await;
        let grace = account(&db, "grace", Role::Student).await;
        let room = db
            .create_study_room("secret", Subject::Math, None, &ada.user_id, true)
            .await
            .unwrap();
        db.invite_to_study_room(&room.room.id, &ada.user_id, "grace@example.com")
            .await
            .unwrap();

        let listed = db.list_study_rooms(&grace.user_id, None).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_subject_filter() {
        let db = mem_db().await;
        let ada = account(&db, "ada", Role::Student).await;
        db.create_study_room("calc", Subject::Math, None, &ada.user_id, false)
            .await
            .unwrap();
        db.create_study_room("essays", Subject::English, None, &ada.user_id, false)
            .await
            .unwrap();

        let math = db
            .list_study_rooms(&ada.user_id, Some(Subject::Math))
            .await
            .unwrap();
        assert_eq!(math.len(), 1);
        assert_eq!(math[0].room.name, "calc");
    }

    #[tokio::test]
    async fn test_private_join_requires_accepted_invitation() {
        let db = mem_db().await;
        let ada = account(&db, "ada", Role::Student).await;
        let grace = account(&db, "grace", Role::Student).await;
        let room = db
            .create_study_room("secret", Subject::Math, None, &ada.user_id, true)
            .await
            .unwrap();
        let room_id = room.room.id;

        let err = db.join_study_room(&room_id, &grace.user_id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        // A pending invitation is not enough to walk in directly
        db.invite_to_study_room(&room_id, &ada.user_id, "grace@example.com")
            .await
            .unwrap();
        let err = db.join_study_room(&room_id, &grace.user_id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_accept_invitation_joins_and_flips_status() {
        let db = mem_db().await;
        let ada = account(&db, "ada", Role::Student).await;
        let grace = account(&db, "grace", Role::Student).await;
        let room = db
            .create_study_room("secret", Subject::Math, None, &ada.user_id, true)
            .await
            .unwrap();
        let invitation = db
            .invite_to_study_room(&room.room.id, &ada.user_id, "grace@example.com")
            .await
            .unwrap();

        let participant = db
            .accept_study_room_invitation(&invitation.id, &grace.user_id)
            .await
            .unwrap();
        assert_eq!(participant.username, "grace");

        // No longer pending, so it cannot be accepted twice
        let err = db
            .accept_study_room_invitation(&invitation.id, &grace.user_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(db
            .list_study_room_invitations(&grace.user_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_only_creator_invites_and_only_to_private_rooms() {
        let db = mem_db().await;
        let ada = account(&db, "ada", Role::Student).await;
        let grace = account(&db, "grace", Role::Student).await;
        let public = db
            .create_study_room("open", Subject::Math, None, &ada.user_id, false)
            .await
            .unwrap();
        let private = db
            .create_study_room("secret", Subject::Math, None, &ada.user_id, true)
            .await
            .unwrap();

        let err = db
            .invite_to_study_room(&public.room.id, &ada.user_id, "grace@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = db
            .invite_to_study_room(&private.room.id, &grace.user_id, "grace@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_messages_are_participant_scoped() {
        let db = mem_db().await;
        let ada = account(&db, "ada", Role::Student).await;
        let grace = account(&db, "grace", Role::Student).await;
        let room = db
            .create_study_room("open", Subject::Math, None, &ada.user_id, false)
            .await
            .unwrap();
        let room_id = room.room.id;

        let err = db
            .send_study_room_message(&room_id, &grace.user_id, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        db.join_study_room(&room_id, &grace.user_id).await.unwrap();
        let message = db
            .send_study_room_message(&room_id, &grace.user_id, "hi")
            .await
            .unwrap();

        let messages = db
            .get_study_room_messages(&room_id, &ada.user_id)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, message.id);

        // Sending also refreshes the room's activity timestamp
        let rooms = db.list_study_rooms(&ada.user_id, None).await.unwrap();
        assert_eq!(rooms[0].room.updated_at, message.created_at);
    }

    #[tokio::test]
    async fn test_double_join_conflicts_and_leave_is_idempotent() {
        let db = mem_db().await;
        let ada = account(&db, "ada", Role::Student).await;
        let grace = account(&db, "grace", Role::Student).await;
        let room = db
            .create_study_room("open", Subject::Math, None, &ada.user_id, false)
            .await
            .unwrap();
        let room_id = room.room.id;

        db.join_study_room(&room_id, &grace.user_id).await.unwrap();
        let err = db.join_study_room(&room_id, &grace.user_id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        db.leave_study_room(&room_id, &grace.user_id).await.unwrap();
        db.leave_study_room(&room_id, &grace.user_id).await.unwrap();
        assert_eq!(db.room_participants(&room_id).await.unwrap().len(), 1);
    }
}
