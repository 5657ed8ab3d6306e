use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;

use crate::error::{LibError, Result};
use crate::membership::MembershipDiff;
use crate::models::{
    ListChanges, ListDefinition, ListId, Owner, OwnerId, Video, VideoChanges, VideoDefinition,
    VideoId, VideoList,
};
use crate::permissions::ensure_owner;
use crate::store::{GraphStore, StoreTx};

/// Applies every write to videos, lists and their memberships.
///
/// Each public method runs in exactly one store transaction and commits before it
/// returns, so both directions of a membership edge always change together.
/// Ownership is checked after the row lock is taken.
pub struct RelationshipEngine<S> {
    store: Arc<S>,
}

impl<S> Clone for RelationshipEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: GraphStore> RelationshipEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn create_video(&self, owner: &Owner, definition: VideoDefinition) -> Result<Video> {
        let now = Utc::now().naive_utc();
        let video = Video {
            id: VideoId::new_v4(),
            owner_id: owner.id,
            url: definition.url,
            name: definition.name,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        tx.insert_video(&video).await?;
        tx.commit().await?;
        Ok(video)
    }

    pub async fn update_video(
        &self,
        actor: OwnerId,
        video_id: VideoId,
        changes: VideoChanges,
    ) -> Result<Video> {
        let mut tx = self.store.begin().await?;
        let mut video = lock_video(&mut tx, video_id).await?;
        ensure_owner(actor, &video)?;

        if let Some(url) = changes.url {
            video.url = url;
        }
        if let Some(name) = changes.name {
            video.name = name;
        }
        video.updated_at = Utc::now().naive_utc();

        tx.update_video(&video).await?;
        tx.commit().await?;
        Ok(video)
    }

    /// Creates the list and attaches its initial members in the same transaction.
    pub async fn create_list(&self, owner: &Owner, definition: ListDefinition) -> Result<VideoList> {
        let now = Utc::now().naive_utc();
        let list = VideoList {
            id: ListId::new_v4(),
            owner_id: owner.id,
            name: definition.name,
            slug: definition.slug,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        tx.insert_list(&list).await?;
        replace_members(&mut tx, list.id, &definition.video_ids).await?;
        tx.commit().await?;
        Ok(list)
    }

    pub async fn update_list(
        &self,
        actor: OwnerId,
        list_id: ListId,
        changes: ListChanges,
    ) -> Result<VideoList> {
        let mut tx = self.store.begin().await?;
        let mut list = lock_list(&mut tx, list_id).await?;
        ensure_owner(actor, &list)?;

        if let Some(name) = changes.name {
            list.name = name;
        }
        if let Some(slug) = changes.slug {
            list.slug = slug;
        }
        list.updated_at = Utc::now().naive_utc();
        tx.update_list(&list).await?;

        if let Some(video_ids) = changes.video_ids {
            replace_members(&mut tx, list_id, &video_ids).await?;
        }

        tx.commit().await?;
        Ok(list)
    }

    /// Adds the edge between `video_id` and `list_id`. An existing edge is left alone.
    pub async fn attach(&self, actor: OwnerId, video_id: VideoId, list_id: ListId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let list = lock_list(&mut tx, list_id).await?;
        ensure_owner(actor, &list)?;
        lock_video(&mut tx, video_id).await?;

        tx.insert_membership(video_id, list_id).await?;
        tx.commit().await
    }

    /// Removes the edge between `video_id` and `list_id`. A missing edge is not an error.
    pub async fn detach(&self, actor: OwnerId, video_id: VideoId, list_id: ListId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let list = lock_list(&mut tx, list_id).await?;
        ensure_owner(actor, &list)?;
        lock_video(&mut tx, video_id).await?;

        tx.delete_membership(video_id, list_id).await?;
        tx.commit().await
    }

    /// Makes `video_ids` the exact member set of the list.
    pub async fn replace_list_membership(
        &self,
        actor: OwnerId,
        list_id: ListId,
        video_ids: &[VideoId],
    ) -> Result<MembershipDiff> {
        let mut tx = self.store.begin().await?;
        let list = lock_list(&mut tx, list_id).await?;
        ensure_owner(actor, &list)?;

        let diff = replace_members(&mut tx, list_id, video_ids).await?;
        tx.commit().await?;
        Ok(diff)
    }

    /// Detaches the video from every list, then deletes it.
    pub async fn delete_video(&self, actor: OwnerId, video_id: VideoId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let video = lock_video(&mut tx, video_id).await?;
        ensure_owner(actor, &video)?;

        for list_id in tx.list_ids_for_video(video_id).await? {
            tx.delete_membership(video_id, list_id).await?;
        }
        tx.delete_video(video_id).await?;
        tx.commit().await
    }

    /// Detaches every member video from the list, then deletes it.
    pub async fn delete_list(&self, actor: OwnerId, list_id: ListId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let list = lock_list(&mut tx, list_id).await?;
        ensure_owner(actor, &list)?;

        for video_id in tx.video_ids_for_list(list_id).await? {
            tx.delete_membership(video_id, list_id).await?;
        }
        tx.delete_list(list_id).await?;
        tx.commit().await
    }
}

async fn lock_video<T: StoreTx>(tx: &mut T, video_id: VideoId) -> Result<Video> {
    tx.lock_video(video_id).await?.ok_or_else(|| {
        LibError::not_found("Video not found", anyhow!("video {} not found", video_id))
    })
}

async fn lock_list<T: StoreTx>(tx: &mut T, list_id: ListId) -> Result<VideoList> {
    tx.lock_list(list_id).await?.ok_or_else(|| {
        LibError::not_found(
            "Video list not found",
            anyhow!("video list {} not found", list_id),
        )
    })
}

/// Every desired video must exist before any edge changes.
async fn replace_members<T: StoreTx>(
    tx: &mut T,
    list_id: ListId,
    video_ids: &[VideoId],
) -> Result<MembershipDiff> {
    let current = tx.video_ids_for_list(list_id).await?;
    let diff = MembershipDiff::between(&current, video_ids);

    for video_id in &diff.added {
        lock_video(tx, *video_id).await?;
    }
    for video_id in &diff.removed {
        tx.delete_membership(*video_id, list_id).await?;
    }
    for video_id in &diff.added {
        tx.insert_membership(*video_id, list_id).await?;
    }

    Ok(diff)
}
