use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{LibError, Result};
use crate::membership::MembershipIndex;
use crate::models::{
    AccountId, ListId, ListMemberRow, ListSelection, Owner, OwnerId, Video, VideoId, VideoList,
};
use crate::store::{GraphStore, StoreTx};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    owners: HashMap<OwnerId, Owner>,
    owners_by_account: HashMap<AccountId, OwnerId>,
    videos: HashMap<VideoId, Video>,
    lists: HashMap<ListId, VideoList>,
    memberships: MembershipIndex,
}

impl MemoryState {
    fn selected_lists(&self, selection: &ListSelection) -> Vec<&VideoList> {
        let mut lists = match selection {
            ListSelection::All => self.lists.values().collect::<Vec<_>>(),
            ListSelection::Owner(owner_id) => self
                .lists
                .values()
                .filter(|list| list.owner_id == *owner_id)
                .collect(),
            ListSelection::Ids(ids) => {
                let wanted: HashSet<&ListId> = ids.iter().collect();
                self.lists
                    .values()
                    .filter(|list| wanted.contains(&list.id))
                    .collect()
            }
        };
        lists.sort_by_key(|list| (list.created_at, list.id));
        lists
    }

    fn ensure_slug_free(&self, slug: &str, except: Option<ListId>) -> Result<()> {
        let taken = self
            .lists
            .values()
            .any(|list| list.slug == slug && Some(list.id) != except);
        if taken {
            return Err(LibError::invalid_with_code(
                "slug_taken",
                "Slug is already in use",
                anyhow!("slug {:?} already exists", slug),
            ));
        }
        Ok(())
    }
}

/// Process-local store, used by tests and single-node tooling.
///
/// A transaction holds the store lock for its whole lifetime and writes in place,
/// recording an undo entry per change that is replayed if it is dropped uncommitted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the owner profile for an account, as account provisioning would.
    pub async fn provision_owner(&self, account_id: AccountId) -> Owner {
        let mut state = self.state.lock().await;
        if let Some(owner) = state
            .owners_by_account
            .get(&account_id)
            .and_then(|owner_id| state.owners.get(owner_id))
        {
            return owner.clone();
        }

        let owner = Owner {
            id: OwnerId::new_v4(),
            account_id,
            created_at: Utc::now().naive_utc(),
        };
        state.owners_by_account.insert(account_id, owner.id);
        state.owners.insert(owner.id, owner.clone());
        owner
    }

    /// Ids of every stored membership edge as (video, list) pairs.
    pub async fn membership_edges(&self) -> Vec<(VideoId, ListId)> {
        let state = self.state.lock().await;
        state.memberships.edges_by_video().collect()
    }

    /// Lists that the stored video-side edges point at, for symmetry checks.
    pub async fn lists_of_video(&self, video_id: VideoId) -> Vec<ListId> {
        let state = self.state.lock().await;
        state.memberships.lists_of(video_id)
    }

    pub async fn is_symmetric(&self) -> bool {
        let state = self.state.lock().await;
        state.memberships.symmetry_violations().is_empty()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        Ok(MemoryTx {
            guard,
            undo: Vec::new(),
        })
    }

    async fn find_owner_by_account(&self, account_id: AccountId) -> Result<Option<Owner>> {
        let state = self.state.lock().await;
        Ok(state
            .owners_by_account
            .get(&account_id)
            .and_then(|owner_id| state.owners.get(owner_id))
            .cloned())
    }

    async fn find_video(&self, video_id: VideoId) -> Result<Option<Video>> {
        let state = self.state.lock().await;
        Ok(state.videos.get(&video_id).cloned())
    }

    async fn find_list(&self, list_id: ListId) -> Result<Option<VideoList>> {
        let state = self.state.lock().await;
        Ok(state.lists.get(&list_id).cloned())
    }

    async fn find_list_by_slug(&self, slug: &str) -> Result<Option<VideoList>> {
        let state = self.state.lock().await;
        Ok(state.lists.values().find(|list| list.slug == slug).cloned())
    }

    async fn fetch_lists(&self, selection: &ListSelection) -> Result<Vec<VideoList>> {
        let state = self.state.lock().await;
        Ok(state
            .selected_lists(selection)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn fetch_list_members(&self, selection: &ListSelection) -> Result<Vec<ListMemberRow>> {
        let state = self.state.lock().await;
        let ordered = state.selected_lists(selection);

        // One lead row per list in storage order, then every edge again walked video-first,
        // so list rows repeat and interleave like a relational join.
        let mut rows = Vec::new();
        for list in &ordered {
            let lead = state
                .memberships
                .videos_of(list.id)
                .into_iter()
                .find_map(|video_id| state.videos.get(&video_id));
            rows.push(ListMemberRow {
                list: (*list).clone(),
                video: lead.cloned(),
            });
        }

        let selected = ordered
            .into_iter()
            .map(|list| (list.id, list))
            .collect::<HashMap<_, _>>();
        for (video_id, list_id) in state.memberships.edges_by_video() {
            let (Some(list), Some(video)) = (selected.get(&list_id), state.videos.get(&video_id))
            else {
                continue;
            };
            rows.push(ListMemberRow {
                list: (*list).clone(),
                video: Some(video.clone()),
            });
        }
        Ok(rows)
    }

    async fn fetch_videos(&self, owner_id: Option<OwnerId>) -> Result<Vec<Video>> {
        let state = self.state.lock().await;
        let mut videos = state
            .videos
            .values()
            .filter(|video| owner_id.is_none_or(|owner_id| video.owner_id == owner_id))
            .cloned()
            .collect::<Vec<_>>();
        videos.sort_by_key(|video| (video.created_at, video.id));
        Ok(videos)
    }

    async fn count_lists_by_owner(&self, owner_id: OwnerId) -> Result<i64> {
        let state = self.state.lock().await;
        let count = state
            .lists
            .values()
            .filter(|list| list.owner_id == owner_id)
            .count();
        Ok(count as i64)
    }
}

/// Prior value of one changed row or edge.
enum Undo {
    Video(VideoId, Option<Video>),
    List(ListId, Option<VideoList>),
    Attached(VideoId, ListId),
    Detached(VideoId, ListId),
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    undo: Vec<Undo>,
}

impl MemoryTx {
    fn put_video(&mut self, video: &Video) {
        let previous = self.guard.videos.insert(video.id, video.clone());
        self.undo.push(Undo::Video(video.id, previous));
    }

    fn put_list(&mut self, list: &VideoList) {
        let previous = self.guard.lists.insert(list.id, list.clone());
        self.undo.push(Undo::List(list.id, previous));
    }

    fn rollback(&mut self) {
        let state = &mut *self.guard;
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Video(video_id, Some(video)) => {
                    state.videos.insert(video_id, video);
                }
                Undo::Video(video_id, None) => {
                    state.videos.remove(&video_id);
                }
                Undo::List(list_id, Some(list)) => {
                    state.lists.insert(list_id, list);
                }
                Undo::List(list_id, None) => {
                    state.lists.remove(&list_id);
                }
                Undo::Attached(video_id, list_id) => {
                    state.memberships.detach(video_id, list_id);
                }
                Undo::Detached(video_id, list_id) => {
                    state.memberships.attach(video_id, list_id);
                }
            }
        }
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        self.rollback();
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_video(&mut self, video_id: VideoId) -> Result<Option<Video>> {
        Ok(self.guard.videos.get(&video_id).cloned())
    }

    async fn lock_list(&mut self, list_id: ListId) -> Result<Option<VideoList>> {
        Ok(self.guard.lists.get(&list_id).cloned())
    }

    async fn insert_video(&mut self, video: &Video) -> Result<()> {
        if !self.guard.owners.contains_key(&video.owner_id) {
            return Err(LibError::database(
                "Failed to create video",
                anyhow!("owner {} does not exist", video.owner_id),
            ));
        }
        self.put_video(video);
        Ok(())
    }

    async fn update_video(&mut self, video: &Video) -> Result<()> {
        if self.guard.videos.contains_key(&video.id) {
            self.put_video(video);
        }
        Ok(())
    }

    async fn delete_video(&mut self, video_id: VideoId) -> Result<()> {
        if !self.guard.memberships.lists_of(video_id).is_empty() {
            return Err(LibError::database(
                "Failed to delete video",
                anyhow!("video {} is still a member of a list", video_id),
            ));
        }
        if let Some(previous) = self.guard.videos.remove(&video_id) {
            self.undo.push(Undo::Video(video_id, Some(previous)));
        }
        Ok(())
    }

    async fn insert_list(&mut self, list: &VideoList) -> Result<()> {
        if !self.guard.owners.contains_key(&list.owner_id) {
            return Err(LibError::database(
                "Failed to create video list",
                anyhow!("owner {} does not exist", list.owner_id),
            ));
        }
        self.guard.ensure_slug_free(&list.slug, None)?;
        self.put_list(list);
        Ok(())
    }

    async fn update_list(&mut self, list: &VideoList) -> Result<()> {
        self.guard.ensure_slug_free(&list.slug, Some(list.id))?;
        if self.guard.lists.contains_key(&list.id) {
            self.put_list(list);
        }
        Ok(())
    }

    async fn delete_list(&mut self, list_id: ListId) -> Result<()> {
        if !self.guard.memberships.videos_of(list_id).is_empty() {
            return Err(LibError::database(
                "Failed to delete video list",
                anyhow!("video list {} still has members", list_id),
            ));
        }
        if let Some(previous) = self.guard.lists.remove(&list_id) {
            self.undo.push(Undo::List(list_id, Some(previous)));
        }
        Ok(())
    }

    async fn video_ids_for_list(&mut self, list_id: ListId) -> Result<Vec<VideoId>> {
        Ok(self.guard.memberships.videos_of(list_id))
    }

    async fn list_ids_for_video(&mut self, video_id: VideoId) -> Result<Vec<ListId>> {
        Ok(self.guard.memberships.lists_of(video_id))
    }

    async fn insert_membership(&mut self, video_id: VideoId, list_id: ListId) -> Result<()> {
        if !self.guard.videos.contains_key(&video_id) || !self.guard.lists.contains_key(&list_id) {
            return Err(LibError::database(
                "Failed to write list membership",
                anyhow!("membership {} -> {} references a missing row", video_id, list_id),
            ));
        }
        if self.guard.memberships.attach(video_id, list_id) {
            self.undo.push(Undo::Attached(video_id, list_id));
        }
        Ok(())
    }

    async fn delete_membership(&mut self, video_id: VideoId, list_id: ListId) -> Result<()> {
        if self.guard.memberships.detach(video_id, list_id) {
            self.undo.push(Undo::Detached(video_id, list_id));
        }
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        self.undo.clear();
        Ok(())
    }
}
