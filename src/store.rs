use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    AccountId, ListId, ListMemberRow, ListSelection, Owner, OwnerId, Video, VideoId, VideoList,
};

/// Durable storage for owners, videos, lists and the membership relation.
///
/// Plain reads run outside any transaction. Everything that writes goes through
/// [`StoreTx`], obtained from [`GraphStore::begin`].
#[async_trait]
pub trait GraphStore: Send + Sync + 'static {
    type Tx: StoreTx;

    async fn begin(&self) -> Result<Self::Tx>;

    async fn find_owner_by_account(&self, account_id: AccountId) -> Result<Option<Owner>>;

    async fn find_video(&self, video_id: VideoId) -> Result<Option<Video>>;

    async fn find_list(&self, list_id: ListId) -> Result<Option<VideoList>>;

    async fn find_list_by_slug(&self, slug: &str) -> Result<Option<VideoList>>;

    /// Lists without members, in storage order.
    async fn fetch_lists(&self, selection: &ListSelection) -> Result<Vec<VideoList>>;

    /// One bulk join of lists to their member videos.
    ///
    /// Yields one row per (list, video) pair and a single row with `video: None` for each
    /// selected list that has no members. Row order is unspecified.
    async fn fetch_list_members(&self, selection: &ListSelection) -> Result<Vec<ListMemberRow>>;

    async fn fetch_videos(&self, owner_id: Option<OwnerId>) -> Result<Vec<Video>>;

    async fn count_lists_by_owner(&self, owner_id: OwnerId) -> Result<i64>;
}

/// A single atomic unit of work against the store.
///
/// Dropping a transaction without calling [`StoreTx::commit`] discards every change made
/// through it.
#[async_trait]
pub trait StoreTx: Send {
    /// Reads the video and holds it against concurrent writers until the transaction ends.
    async fn lock_video(&mut self, video_id: VideoId) -> Result<Option<Video>>;

    async fn lock_list(&mut self, list_id: ListId) -> Result<Option<VideoList>>;

    async fn insert_video(&mut self, video: &Video) -> Result<()>;

    async fn update_video(&mut self, video: &Video) -> Result<()>;

    async fn delete_video(&mut self, video_id: VideoId) -> Result<()>;

    async fn insert_list(&mut self, list: &VideoList) -> Result<()>;

    async fn update_list(&mut self, list: &VideoList) -> Result<()>;

    async fn delete_list(&mut self, list_id: ListId) -> Result<()>;

    async fn video_ids_for_list(&mut self, list_id: ListId) -> Result<Vec<VideoId>>;

    async fn list_ids_for_video(&mut self, video_id: VideoId) -> Result<Vec<ListId>>;

    /// Adds the edge; an existing edge is left as is.
    async fn insert_membership(&mut self, video_id: VideoId, list_id: ListId) -> Result<()>;

    /// Removes the edge; a missing edge is not an error.
    async fn delete_membership(&mut self, video_id: VideoId, list_id: ListId) -> Result<()>;

    async fn commit(self) -> Result<()>;
}
