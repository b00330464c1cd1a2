use super::{now, Conversation, ConversationParticipant, ConversationSummary, Database, Message};
use crate::error::{is_unique_violation, AppError};
use uuid::Uuid;

/// Order-independent key for a participant pair.
fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}:{b}")
    } else {
        format!("{b}:{a}")
    }
}

impl Database {
    /// Returns the conversation for the unordered pair, creating it on first
    /// use. Idempotent under concurrent first calls: losers of the UNIQUE
    /// race on `pair_key` fall back to the winner's row.
    pub async fn create_or_get_conversation(
        &self,
        user_id: &str,
        username: &str,
        other_id: &str,
        other_username: &str,
    ) -> Result<Conversation, AppError> {
        if user_id == other_id {
            return Err(AppError::BadRequest(
                "Cannot start a conversation with yourself".to_string(),
            ));
        }

        let key = pair_key(user_id, other_id);
        if let Some(existing) = self.get_conversation_by_pair(&key).await? {
            return Ok(existing);
        }

        let timestamp = now();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            pair_key: key.clone(),
            created_at: timestamp.clone(),
            updated_at: timestamp,
        };

        let mut tx = self.pool().begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO conversations (id, pair_key, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&conversation.id)
        .bind(&conversation.pair_key)
        .bind(&conversation.created_at)
        .bind(&conversation.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(err) = inserted {
            if is_unique_violation(&err) {
                // Lost the race; the other caller's row is authoritative
                drop(tx);
                return self
                    .get_conversation_by_pair(&key)
                    .await?
                    .ok_or_else(|| AppError::Database(err));
            }
            return Err(AppError::Database(err));
        }

        for (id, name) in [(user_id, username), (other_id, other_username)] {
            sqlx::query(
                "INSERT INTO conversation_participants (conversation_id, user_id, username) VALUES (?, ?, ?)",
            )
            .bind(&conversation.id)
            .bind(id)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(conversation)
    }

    /// Everything the user participates in, most recently active first.
    pub async fn get_user_conversations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationSummary>, AppError> {
        let conversations = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT c.* FROM conversations c
            JOIN conversation_participants p ON p.conversation_id = c.id
            WHERE p.user_id = ?
            ORDER BY c.updated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let participants = self.conversation_participants(&conversation.id).await?;
            let messages = self.messages_in(&conversation.id).await?;
            summaries.push(ConversationSummary {
                conversation,
                participants,
                messages,
            });
        }
        Ok(summaries)
    }

    pub async fn get_conversation_messages(
        &self,
        conversation_id: &str,
        caller_id: &str,
    ) -> Result<Vec<Message>, AppError> {
        let participants = self.conversation_participants(conversation_id).await?;
        if participants.is_empty() {
            return Err(AppError::NotFound("Conversation not found".to_string()));
        }
        if !participants.iter().any(|p| p.user_id == caller_id) {
            return Err(AppError::Forbidden(
                "Not a participant in this conversation".to_string(),
            ));
        }
        self.messages_in(conversation_id).await
    }

    /// Inserts the message and touches the conversation's `updated_at`
    /// together. Returns the participants too so the caller can fan out
    /// change events without a second lookup.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<(Message, Vec<ConversationParticipant>), AppError> {
        let participants = self.conversation_participants(conversation_id).await?;
        if participants.is_empty() {
            return Err(AppError::NotFound("Conversation not found".to_string()));
        }
        let sender = participants
            .iter()
            .find(|p| p.user_id == sender_id)
            .ok_or_else(|| {
                AppError::Forbidden("Not a participant in this conversation".to_string())
            })?;

        let message = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            sender_username: sender.username.clone(),
            content: content.to_string(),
            created_at: now(),
        };

        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, sender_username, content, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.sender_id)
        .bind(&message.sender_username)
        .bind(&message.content)
        .bind(&message.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(&message.created_at)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok((message, participants))
    }

    async fn get_conversation_by_pair(
        &self,
        key: &str,
    ) -> Result<Option<Conversation>, AppError> {
        let conversation =
            sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE pair_key = ?")
                .bind(key)
                .fetch_optional(self.pool())
                .await?;
        Ok(conversation)
    }

    pub(crate) async fn conversation_participants(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ConversationParticipant>, AppError> {
        let participants = sqlx::query_as::<_, ConversationParticipant>(
            "SELECT * FROM conversation_participants WHERE conversation_id = ? ORDER BY user_id",
        )
        .bind(conversation_id)
        .fetch_all(self.pool())
        .await?;
        Ok(participants)
    }

    async fn messages_in(&self, conversation_id: &str) -> Result<Vec<Message>, AppError> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE conversation_id = ? ORDER BY created_at ASC",
        )
        .bind(conversation_id)
        .fetch_all(self.pool())
        .await?;
        Ok(messages)
    }
}
