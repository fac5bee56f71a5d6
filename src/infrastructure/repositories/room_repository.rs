//! Room Repository Implementation
//!
//! PostgreSQL implementation of the room directory. Membership lives in its
//! own table so the primary key rules out duplicate members, and counters are
//! recomputed or incremented inside the statement that changes them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::{
    IdentityModel, IdentityRef, LastMessage, MemberPermissions, MemberRole, Room, RoomFilter,
    RoomMember, RoomMetadata, RoomRepository, RoomSettings, RoomStats, RoomType,
};
use crate::shared::error::AppError;

/// PostgreSQL room repository implementation.
pub struct PgRoomRepository {
    pool: PgPool,
}

impl PgRoomRepository {
    /// Creates a new PgRoomRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_members(&self, room_ids: &[String]) -> Result<Vec<MemberRow>, AppError> {
        let rows = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT room_id, identity_id, identity_model, identity_name,
                   role_in_room, permissions, joined_at
            FROM chat_room_members
            WHERE room_id = ANY($1)
            ORDER BY joined_at ASC, identity_id ASC
            "#,
        )
        .bind(room_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn hydrate(&self, rows: Vec<RoomRow>) -> Result<Vec<Room>, AppError> {
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut members = self.load_members(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let (mine, rest): (Vec<_>, Vec<_>) =
                    members.drain(..).partition(|m| m.room_id == row.id);
                members = rest;
                row.into_room(mine.into_iter().map(MemberRow::into_member).collect())
            })
            .collect())
    }

    /// Lock the room row for the rest of the transaction. False if missing.
    async fn lock_room(
        tx: &mut Transaction<'_, Postgres>,
        room_id: &str,
    ) -> Result<bool, AppError> {
        let found = sqlx::query_scalar::<_, String>(
            "SELECT id FROM chat_rooms WHERE id = $1 FOR UPDATE",
        )
        .bind(room_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(found.is_some())
    }

    async fn recount_members(
        tx: &mut Transaction<'_, Postgres>,
        room_id: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE chat_rooms
            SET total_members = (SELECT COUNT(*) FROM chat_room_members WHERE room_id = $1)
            WHERE id = $1
            "#,
        )
        .bind(room_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_member(
        tx: &mut Transaction<'_, Postgres>,
        room_id: &str,
        member: &RoomMember,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO chat_room_members
                (room_id, identity_id, identity_model, identity_name, role_in_room, permissions, joined_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (room_id, identity_id) DO NOTHING
            "#,
        )
        .bind(room_id)
        .bind(&member.identity.id)
        .bind(member.identity.model.as_str())
        .bind(&member.identity.name)
        .bind(member.role_in_room.as_str())
        .bind(Json(member.permissions))
        .bind(member.joined_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

/// Internal row type for room queries.
#[derive(Debug, sqlx::FromRow)]
struct RoomRow {
    id: String,
    name: String,
    description: String,
    room_type: String,
    avatar: String,
    settings: Json<RoomSettings>,
    metadata: Json<RoomMetadata>,
    last_message: Option<Json<LastMessage>>,
    total_messages: i64,
    total_members: i64,
    last_activity: DateTime<Utc>,
    is_active: bool,
    created_by: Json<IdentityRef>,
    created_at: DateTime<Utc>,
}

impl RoomRow {
    fn into_room(self, members: Vec<RoomMember>) -> Room {
        Room {
            room_type: RoomType::parse(&self.room_type).unwrap_or_default(),
            id: self.id,
            name: self.name,
            description: self.description,
            avatar: self.avatar,
            settings: self.settings.0,
            members,
            last_message: self.last_message.map(|j| j.0),
            stats: RoomStats {
                total_messages: self.total_messages,
                total_members: self.total_members,
                last_activity: self.last_activity,
            },
            metadata: self.metadata.0,
            is_active: self.is_active,
            created_by: self.created_by.0,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    room_id: String,
    identity_id: String,
    identity_model: String,
    identity_name: String,
    role_in_room: String,
    permissions: Json<MemberPermissions>,
    joined_at: DateTime<Utc>,
}

impl MemberRow {
    fn into_member(self) -> RoomMember {
        RoomMember {
            identity: IdentityRef {
                id: self.identity_id,
                model: IdentityModel::from_str(&self.identity_model),
                name: self.identity_name,
            },
            role_in_room: MemberRole::from_str(&self.role_in_room),
            permissions: self.permissions.0,
            joined_at: self.joined_at,
        }
    }
}

const ROOM_COLUMNS: &str = r#"
    id, name, description, room_type, avatar, settings, metadata, last_message,
    total_messages, total_members, last_activity, is_active, created_by, created_at
"#;

#[async_trait]
impl RoomRepository for PgRoomRepository {
    async fn insert(&self, room: &Room) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO chat_rooms
                (id, name, description, room_type, avatar, settings, metadata, last_message,
                 total_messages, total_members, last_activity, is_active, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, $10, $11, $12, $13)
            "#,
        )
        .bind(&room.id)
        .bind(&room.name)
        .bind(&room.description)
        .bind(room.room_type.as_str())
        .bind(&room.avatar)
        .bind(Json(&room.settings))
        .bind(Json(&room.metadata))
        .bind(room.last_message.as_ref().map(Json))
        .bind(room.stats.total_messages)
        .bind(room.stats.last_activity)
        .bind(room.is_active)
        .bind(Json(&room.created_by))
        .bind(room.created_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            let duplicate = e
                .as_database_error()
                .map(|d| d.is_unique_violation())
                .unwrap_or(false);
            if duplicate {
                return Err(AppError::Conflict(format!("Room '{}' already exists", room.id)));
            }
            return Err(e.into());
        }

        for member in &room.members {
            Self::insert_member(&mut tx, &room.id, member).await?;
        }
        Self::recount_members(&mut tx, &room.id).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Room>, AppError> {
        let row = sqlx::query_as::<_, RoomRow>(&format!(
            "SELECT {} FROM chat_rooms WHERE id = $1",
            ROOM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find(&self, filter: &RoomFilter) -> Result<Vec<Room>, AppError> {
        let limit = if filter.limit == 0 { i64::MAX } else { i64::from(filter.limit) };

        let rows = sqlx::query_as::<_, RoomRow>(&format!(
            r#"
            SELECT {}
            FROM chat_rooms
            WHERE ($1::text IS NULL OR room_type = $1)
              AND ($2::bool IS NULL OR is_active = $2)
              AND ($3::text IS NULL OR lower(metadata->>'subject') = lower($3))
              AND ($4::text IS NULL OR lower(metadata->>'classLevel') = lower($4))
            ORDER BY last_activity DESC, id ASC
            LIMIT $5
            "#,
            ROOM_COLUMNS
        ))
        .bind(filter.room_type.map(|t| t.as_str()))
        .bind(filter.is_active)
        .bind(filter.subject.as_deref())
        .bind(filter.class_level.as_deref())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn add_member(
        &self,
        room_id: &str,
        member: &RoomMember,
    ) -> Result<Option<Room>, AppError> {
        let mut tx = self.pool.begin().await?;
        if !Self::lock_room(&mut tx, room_id).await? {
            return Ok(None);
        }
        Self::insert_member(&mut tx, room_id, member).await?;
        Self::recount_members(&mut tx, room_id).await?;
        tx.commit().await?;

        self.find_by_id(room_id).await
    }

    async fn remove_member(
        &self,
        room_id: &str,
        identity_id: &str,
    ) -> Result<Option<Room>, AppError> {
        let mut tx = self.pool.begin().await?;
        if !Self::lock_room(&mut tx, room_id).await? {
            return Ok(None);
        }
        sqlx::query("DELETE FROM chat_room_members WHERE room_id = $1 AND identity_id = $2")
            .bind(room_id)
            .bind(identity_id)
            .execute(&mut *tx)
            .await?;
        Self::recount_members(&mut tx, room_id).await?;
        tx.commit().await?;

        self.find_by_id(room_id).await
    }

    async fn record_message(
        &self,
        room_id: &str,
        preview: &LastMessage,
    ) -> Result<Option<Room>, AppError> {
        let updated = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE chat_rooms
            SET last_message = $2,
                total_messages = total_messages + 1,
                last_activity = NOW()
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(room_id)
        .bind(Json(preview))
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(_) => self.find_by_id(room_id).await,
            None => Ok(None),
        }
    }

    async fn set_last_message(
        &self,
        room_id: &str,
        preview: Option<&LastMessage>,
    ) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE chat_rooms SET last_message = $2 WHERE id = $1")
            .bind(room_id)
            .bind(preview.map(Json))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Room '{}' not found", room_id)));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
