//! Message Repository Implementation
//!
//! PostgreSQL implementation of the message log. Reactions and read
//! receipts live in their own tables keyed so that an identity appears at
//! most once per emoji (reactions) or once per message (receipts).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::domain::{
    Attachment, DeletedByModel, DeletionState, EditState, Identity, IdentityModel, IdentityRef,
    Message, MessageKind, MessageRepository, Reaction, ReadReceipt, ReplySnapshot,
};
use crate::shared::error::AppError;

/// PostgreSQL message repository implementation.
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    /// Creates a new PgMessageRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach reactions and receipts to message rows.
    async fn hydrate(&self, rows: Vec<MessageRow>) -> Result<Vec<Message>, AppError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

        let reaction_rows = sqlx::query_as::<_, ReactionRow>(
            r#"
            SELECT message_id, emoji, identity_id, identity_model, identity_name
            FROM chat_message_reactions
            WHERE message_id = ANY($1)
            ORDER BY reacted_at ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let read_rows = sqlx::query_as::<_, ReadRow>(
            r#"
            SELECT message_id, identity_id, identity_model, identity_name, read_at
            FROM chat_message_reads
            WHERE message_id = ANY($1)
            ORDER BY read_at ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut reactions: HashMap<i64, Vec<Reaction>> = HashMap::new();
        for row in reaction_rows {
            let buckets = reactions.entry(row.message_id).or_default();
            let identity = IdentityRef {
                id: row.identity_id,
                model: IdentityModel::from_str(&row.identity_model),
                name: row.identity_name,
            };
            match buckets.iter_mut().find(|b| b.emoji == row.emoji) {
                Some(bucket) => {
                    bucket.users.push(identity);
                    bucket.count = bucket.users.len() as i64;
                }
                None => buckets.push(Reaction {
                    emoji: row.emoji,
                    users: vec![identity],
                    count: 1,
                }),
            }
        }

        let mut reads: HashMap<i64, Vec<ReadReceipt>> = HashMap::new();
        for row in read_rows {
            reads.entry(row.message_id).or_default().push(ReadReceipt {
                identity: IdentityRef {
                    id: row.identity_id,
                    model: IdentityModel::from_str(&row.identity_model),
                    name: row.identity_name,
                },
                read_at: row.read_at,
            });
        }

        rows.into_iter()
            .map(|row| {
                let id = row.id;
                row.into_message(
                    reactions.remove(&id).unwrap_or_default(),
                    reads.remove(&id).unwrap_or_default(),
                )
            })
            .collect()
    }

    async fn find_visible(&self, id: i64) -> Result<Option<Message>, AppError> {
        Ok(self.find_by_id(id).await?.filter(|m| !m.is_deleted()))
    }
}

/// Internal row type for message queries.
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    room_id: String,
    sender: Json<Identity>,
    content: String,
    message_type: String,
    attachment: Option<Json<Attachment>>,
    reply_to: Option<Json<ReplySnapshot>>,
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<String>,
    deleted_by_model: Option<String>,
    is_edited: bool,
    edited_at: Option<DateTime<Utc>>,
    original_content: Option<String>,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    /// Converts database row to domain Message entity.
    fn into_message(
        self,
        reactions: Vec<Reaction>,
        read_by: Vec<ReadReceipt>,
    ) -> Result<Message, AppError> {
        let kind = MessageKind::from_parts(&self.message_type, self.attachment.map(|j| j.0))
            .map_err(|e| {
                AppError::Persistence(format!("message {} has an invalid body: {}", self.id, e))
            })?;

        Ok(Message {
            id: self.id,
            room_id: self.room_id,
            sender: self.sender.0,
            content: self.content,
            kind,
            reply_to: self.reply_to.map(|j| j.0),
            reactions,
            read_by,
            deleted: DeletionState {
                is_deleted: self.is_deleted,
                deleted_at: self.deleted_at,
                deleted_by: self.deleted_by,
                deleted_by_model: self.deleted_by_model.as_deref().map(DeletedByModel::from_str),
            },
            edited: EditState {
                is_edited: self.is_edited,
                edited_at: self.edited_at,
                original_content: self.original_content,
            },
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReactionRow {
    message_id: i64,
    emoji: String,
    identity_id: String,
    identity_model: String,
    identity_name: String,
}

#[derive(Debug, sqlx::FromRow)]
struct ReadRow {
    message_id: i64,
    identity_id: String,
    identity_model: String,
    identity_name: String,
    read_at: DateTime<Utc>,
}

const MESSAGE_COLUMNS: &str = r#"
    id, room_id, sender, content, message_type, attachment, reply_to,
    is_deleted, deleted_at, deleted_by, deleted_by_model,
    is_edited, edited_at, original_content, created_at
"#;

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn insert(&self, message: &Message) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO chat_messages
                (id, room_id, sender, content, message_type, attachment, reply_to,
                 is_deleted, is_edited, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, FALSE, $8)
            "#,
        )
        .bind(message.id)
        .bind(&message.room_id)
        .bind(Json(&message.sender))
        .bind(&message.content)
        .bind(message.kind.as_str())
        .bind(message.kind.attachment().map(Json))
        .bind(message.reply_to.as_ref().map(Json))
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {} FROM chat_messages WHERE id = $1",
            MESSAGE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Keyset page of visible messages, newest first.
    async fn find_recent(
        &self,
        room_id: &str,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<Message>, AppError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {}
            FROM chat_messages
            WHERE room_id = $1
              AND NOT is_deleted
              AND ($2::timestamptz IS NULL OR created_at < $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(room_id)
        .bind(before)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn soft_delete(
        &self,
        id: i64,
        deletion: &DeletionState,
    ) -> Result<Option<Message>, AppError> {
        let updated = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE chat_messages
            SET is_deleted = TRUE, deleted_at = $2, deleted_by = $3, deleted_by_model = $4
            WHERE id = $1 AND NOT is_deleted
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(deletion.deleted_at)
        .bind(deletion.deleted_by.as_deref())
        .bind(deletion.deleted_by_model.map(|m| m.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(_) => self.find_by_id(id).await,
            None => Ok(None),
        }
    }

    async fn toggle_reaction(
        &self,
        id: i64,
        identity: &IdentityRef,
        emoji: &str,
    ) -> Result<Option<Message>, AppError> {
        let mut tx = self.pool.begin().await?;

        let visible = sqlx::query_scalar::<_, bool>(
            "SELECT NOT is_deleted FROM chat_messages WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        if visible != Some(true) {
            return Ok(None);
        }

        let removed = sqlx::query(
            r#"
            DELETE FROM chat_message_reactions
            WHERE message_id = $1 AND emoji = $2 AND identity_id = $3
            "#,
        )
        .bind(id)
        .bind(emoji)
        .bind(&identity.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed == 0 {
            sqlx::query(
                r#"
                INSERT INTO chat_message_reactions
                    (message_id, emoji, identity_id, identity_model, identity_name)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(id)
            .bind(emoji)
            .bind(&identity.id)
            .bind(identity.model.as_str())
            .bind(&identity.name)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.find_visible(id).await
    }

    async fn update_content(
        &self,
        id: i64,
        content: &str,
        edited: &EditState,
    ) -> Result<Option<Message>, AppError> {
        let updated = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE chat_messages
            SET content = $2, is_edited = $3, edited_at = $4, original_content = $5
            WHERE id = $1 AND NOT is_deleted
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(content)
        .bind(edited.is_edited)
        .bind(edited.edited_at)
        .bind(edited.original_content.as_deref())
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(_) => self.find_by_id(id).await,
            None => Ok(None),
        }
    }

    async fn mark_read(
        &self,
        room_ids: &[String],
        identity: &IdentityRef,
        at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO chat_message_reads (message_id, identity_id, identity_model, identity_name, read_at)
            SELECT id, $2, $3, $4, $5
            FROM chat_messages
            WHERE room_id = ANY($1) AND NOT is_deleted
            ON CONFLICT (message_id, identity_id) DO NOTHING
            "#,
        )
        .bind(room_ids)
        .bind(&identity.id)
        .bind(identity.model.as_str())
        .bind(&identity.name)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
