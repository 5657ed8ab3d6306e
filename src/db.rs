use anyhow::anyhow;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{LibError, Result};
use crate::models::{
    AccountId, ListId, ListMemberRow, ListSelection, Owner, OwnerId, Video, VideoId, VideoList,
};
use crate::store::{GraphStore, StoreTx};

pub static MIGRATOR: Lazy<Migrator> = Lazy::new(|| {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
});

pub async fn create_list_tables(pool: &PgPool) -> std::result::Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Clone, FromRow)]
struct OwnerRow {
    id: Uuid,
    account_id: Uuid,
    created_at: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, FromRow)]
struct VideoRow {
    id: Uuid,
    owner_id: Uuid,
    url: String,
    name: String,
    created_at: chrono::NaiveDateTime,
    updated_at: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, FromRow)]
struct ListRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    slug: String,
    created_at: chrono::NaiveDateTime,
    updated_at: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, FromRow)]
struct ListMemberJoinRow {
    list_id: Uuid,
    list_owner_id: Uuid,
    list_name: String,
    list_slug: String,
    list_created_at: chrono::NaiveDateTime,
    list_updated_at: chrono::NaiveDateTime,
    video_id: Option<Uuid>,
    video_owner_id: Option<Uuid>,
    video_url: Option<String>,
    video_name: Option<String>,
    video_created_at: Option<chrono::NaiveDateTime>,
    video_updated_at: Option<chrono::NaiveDateTime>,
}

impl From<OwnerRow> for Owner {
    fn from(value: OwnerRow) -> Self {
        Self {
            id: OwnerId(value.id),
            account_id: AccountId(value.account_id),
            created_at: value.created_at,
        }
    }
}

impl From<VideoRow> for Video {
    fn from(value: VideoRow) -> Self {
        Self {
            id: VideoId(value.id),
            owner_id: OwnerId(value.owner_id),
            url: value.url,
            name: value.name,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<ListRow> for VideoList {
    fn from(value: ListRow) -> Self {
        Self {
            id: ListId(value.id),
            owner_id: OwnerId(value.owner_id),
            name: value.name,
            slug: value.slug,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<ListMemberJoinRow> for ListMemberRow {
    fn from(value: ListMemberJoinRow) -> Self {
        let video = match (
            value.video_id,
            value.video_owner_id,
            value.video_url,
            value.video_name,
            value.video_created_at,
            value.video_updated_at,
        ) {
            (Some(id), Some(owner_id), Some(url), Some(name), Some(created_at), Some(updated_at)) => {
                Some(Video {
                    id: VideoId(id),
                    owner_id: OwnerId(owner_id),
                    url,
                    name,
                    created_at,
                    updated_at,
                })
            }
            _ => None,
        };

        Self {
            list: VideoList {
                id: ListId(value.list_id),
                owner_id: OwnerId(value.list_owner_id),
                name: value.list_name,
                slug: value.list_slug,
                created_at: value.list_created_at,
                updated_at: value.list_updated_at,
            },
            video,
        }
    }
}

fn db_err(public: &'static str, err: sqlx::Error) -> LibError {
    LibError::database(public, anyhow!(err))
}

fn list_write_err(public: &'static str, err: sqlx::Error) -> LibError {
    let is_unique_violation = err
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION);
    if is_unique_violation {
        LibError::invalid_with_code("slug_taken", "Slug is already in use", anyhow!(err))
    } else {
        db_err(public, err)
    }
}

/// Splits a selection into the optional filters bound by the list queries.
fn selection_filters(selection: &ListSelection) -> (Option<Vec<Uuid>>, Option<Uuid>) {
    match selection {
        ListSelection::All => (None, None),
        ListSelection::Owner(owner_id) => (None, Some(owner_id.0)),
        ListSelection::Ids(ids) => (Some(ids.iter().map(|id| id.0).collect()), None),
    }
}

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the owner profile for an account if none exists, as account provisioning would.
    pub async fn provision_owner(&self, account_id: AccountId) -> Result<Owner> {
        sqlx::query(
            r#"
            INSERT INTO lists.owners (id, account_id)
            VALUES ($1, $2)
            ON CONFLICT (account_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(account_id.0)
        .execute(&self.pool)
        .await
        .map_err(|err| db_err("Failed to provision owner", err))?;

        self.find_owner_by_account(account_id).await?.ok_or_else(|| {
            LibError::message("Owner provisioning did not persist")
        })
    }
}

#[async_trait]
impl GraphStore for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|err| db_err("Failed to start transaction", err))?;
        Ok(PgTx { tx })
    }

    async fn find_owner_by_account(&self, account_id: AccountId) -> Result<Option<Owner>> {
        let row = sqlx::query_as::<_, OwnerRow>(
            r#"
            SELECT id, account_id, created_at
            FROM lists.owners
            WHERE account_id = $1
            "#,
        )
        .bind(account_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| db_err("Failed to query owner", err))?;

        Ok(row.map(Owner::from))
    }

    async fn find_video(&self, video_id: VideoId) -> Result<Option<Video>> {
        let row = sqlx::query_as::<_, VideoRow>(
            r#"
            SELECT id, owner_id, url, name, created_at, updated_at
            FROM lists.videos
            WHERE id = $1
            "#,
        )
        .bind(video_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| db_err("Failed to query video", err))?;

        Ok(row.map(Video::from))
    }

    async fn find_list(&self, list_id: ListId) -> Result<Option<VideoList>> {
        let row = sqlx::query_as::<_, ListRow>(
            r#"
            SELECT id, owner_id, name, slug, created_at, updated_at
            FROM lists.video_lists
            WHERE id = $1
            "#,
        )
        .bind(list_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| db_err("Failed to query video list", err))?;

        Ok(row.map(VideoList::from))
    }

    async fn find_list_by_slug(&self, slug: &str) -> Result<Option<VideoList>> {
        let row = sqlx::query_as::<_, ListRow>(
            r#"
            SELECT id, owner_id, name, slug, created_at, updated_at
            FROM lists.video_lists
            WHERE slug = $1
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| db_err("Failed to query video list", err))?;

        Ok(row.map(VideoList::from))
    }

    async fn fetch_lists(&self, selection: &ListSelection) -> Result<Vec<VideoList>> {
        let (ids, owner_id) = selection_filters(selection);
        let rows = sqlx::query_as::<_, ListRow>(
            r#"
            SELECT id, owner_id, name, slug, created_at, updated_at
            FROM lists.video_lists
            WHERE ($1::uuid[] IS NULL OR id = ANY($1))
              AND ($2::uuid IS NULL OR owner_id = $2)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(ids)
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| db_err("Failed to list video lists", err))?;

        Ok(rows.into_iter().map(VideoList::from).collect())
    }

    async fn fetch_list_members(&self, selection: &ListSelection) -> Result<Vec<ListMemberRow>> {
        let (ids, owner_id) = selection_filters(selection);
        let rows = sqlx::query_as::<_, ListMemberJoinRow>(
            r#"
            SELECT
                l.id AS list_id,
                l.owner_id AS list_owner_id,
                l.name AS list_name,
                l.slug AS list_slug,
                l.created_at AS list_created_at,
                l.updated_at AS list_updated_at,
                v.id AS video_id,
                v.owner_id AS video_owner_id,
                v.url AS video_url,
                v.name AS video_name,
                v.created_at AS video_created_at,
                v.updated_at AS video_updated_at
            FROM lists.video_lists l
            LEFT JOIN lists.memberships m
            ON m.video_list_id = l.id
            LEFT JOIN lists.videos v
            ON v.id = m.video_id
            WHERE ($1::uuid[] IS NULL OR l.id = ANY($1))
              AND ($2::uuid IS NULL OR l.owner_id = $2)
            ORDER BY l.created_at ASC, l.id ASC, v.created_at ASC, v.id ASC
            "#,
        )
        .bind(ids)
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| db_err("Failed to load video list members", err))?;

        Ok(rows.into_iter().map(ListMemberRow::from).collect())
    }

    async fn fetch_videos(&self, owner_id: Option<OwnerId>) -> Result<Vec<Video>> {
        let rows = sqlx::query_as::<_, VideoRow>(
            r#"
            SELECT id, owner_id, url, name, created_at, updated_at
            FROM lists.videos
            WHERE ($1::uuid IS NULL OR owner_id = $1)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(owner_id.map(|id| id.0))
        .fetch_all(&self.pool)
        .await
        .map_err(|err| db_err("Failed to list videos", err))?;

        Ok(rows.into_iter().map(Video::from).collect())
    }

    async fn count_lists_by_owner(&self, owner_id: OwnerId) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)::bigint
            FROM lists.video_lists
            WHERE owner_id = $1
            "#,
        )
        .bind(owner_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| db_err("Failed to count video lists", err))?;

        Ok(count.0)
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_video(&mut self, video_id: VideoId) -> Result<Option<Video>> {
        let row = sqlx::query_as::<_, VideoRow>(
            r#"
            SELECT id, owner_id, url, name, created_at, updated_at
            FROM lists.videos
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(video_id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to lock video", err))?;

        Ok(row.map(Video::from))
    }

    async fn lock_list(&mut self, list_id: ListId) -> Result<Option<VideoList>> {
        let row = sqlx::query_as::<_, ListRow>(
            r#"
            SELECT id, owner_id, name, slug, created_at, updated_at
            FROM lists.video_lists
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(list_id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to lock video list", err))?;

        Ok(row.map(VideoList::from))
    }

    async fn insert_video(&mut self, video: &Video) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO lists.videos (id, owner_id, url, name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(video.id.0)
        .bind(video.owner_id.0)
        .bind(&video.url)
        .bind(&video.name)
        .bind(video.created_at)
        .bind(video.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to create video", err))?;

        Ok(())
    }

    async fn update_video(&mut self, video: &Video) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE lists.videos
            SET url = $1,
                name = $2,
                updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(&video.url)
        .bind(&video.name)
        .bind(video.updated_at)
        .bind(video.id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to update video", err))?;

        Ok(())
    }

    async fn delete_video(&mut self, video_id: VideoId) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM lists.videos
            WHERE id = $1
            "#,
        )
        .bind(video_id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to delete video", err))?;

        Ok(())
    }

    async fn insert_list(&mut self, list: &VideoList) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO lists.video_lists (id, owner_id, name, slug, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(list.id.0)
        .bind(list.owner_id.0)
        .bind(&list.name)
        .bind(&list.slug)
        .bind(list.created_at)
        .bind(list.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| list_write_err("Failed to create video list", err))?;

        Ok(())
    }

    async fn update_list(&mut self, list: &VideoList) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE lists.video_lists
            SET name = $1,
                slug = $2,
                updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(&list.name)
        .bind(&list.slug)
        .bind(list.updated_at)
        .bind(list.id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| list_write_err("Failed to update video list", err))?;

        Ok(())
    }

    async fn delete_list(&mut self, list_id: ListId) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM lists.video_lists
            WHERE id = $1
            "#,
        )
        .bind(list_id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to delete video list", err))?;

        Ok(())
    }

    async fn video_ids_for_list(&mut self, list_id: ListId) -> Result<Vec<VideoId>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT video_id
            FROM lists.memberships
            WHERE video_list_id = $1
            ORDER BY video_id ASC
            "#,
        )
        .bind(list_id.0)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to query list members", err))?;

        Ok(rows.into_iter().map(|(id,)| VideoId(id)).collect())
    }

    async fn list_ids_for_video(&mut self, video_id: VideoId) -> Result<Vec<ListId>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT video_list_id
            FROM lists.memberships
            WHERE video_id = $1
            ORDER BY video_list_id ASC
            "#,
        )
        .bind(video_id.0)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to query video memberships", err))?;

        Ok(rows.into_iter().map(|(id,)| ListId(id)).collect())
    }

    async fn insert_membership(&mut self, video_id: VideoId, list_id: ListId) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO lists.memberships (video_list_id, video_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(list_id.0)
        .bind(video_id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to write list membership", err))?;

        Ok(())
    }

    async fn delete_membership(&mut self, video_id: VideoId, list_id: ListId) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM lists.memberships
            WHERE video_list_id = $1
              AND video_id = $2
            "#,
        )
        .bind(list_id.0)
        .bind(video_id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to remove list membership", err))?;

        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|err| db_err("Failed to commit transaction", err))
    }
}
