use std::sync::Arc;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::config::ListsConfig;
use crate::directory::{IdentityProvider, OwnerDirectory};
use crate::engine::RelationshipEngine;
use crate::error::{LibError, Result};
use crate::loader::GraphLoader;
use crate::membership::MembershipDiff;
use crate::models::{
    CreateListPayload, CreateVideoPayload, ListId, ListSelection, ListWithVideos, Owner,
    UpdateListPayload, UpdateVideoPayload, Video, VideoId, VideoList,
};
use crate::permissions;
use crate::slug::SlugResolver;
use crate::store::GraphStore;

/// High-level list and video actions, for job runners and tool integrations.
///
/// The identity passed to [`ListOperations::execute`] must come from validated
/// session state, never from the operation arguments.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum ListOperation {
    CreateVideo {
        payload: CreateVideoPayload,
    },
    UpdateVideo {
        video_id: VideoId,
        payload: UpdateVideoPayload,
    },
    GetVideo {
        video_id: VideoId,
    },
    ListVideos {
        #[serde(default)]
        current_user_only: bool,
    },
    DeleteVideo {
        video_id: VideoId,
    },
    CreateList {
        payload: CreateListPayload,
    },
    UpdateList {
        list_id: ListId,
        payload: UpdateListPayload,
    },
    GetList {
        list_id: ListId,
    },
    ListLists {
        #[serde(default)]
        eager: bool,
        #[serde(default)]
        current_user_only: bool,
    },
    DeleteList {
        list_id: ListId,
    },
    AttachVideo {
        list_id: ListId,
        video_id: VideoId,
    },
    DetachVideo {
        list_id: ListId,
        video_id: VideoId,
    },
    ReplaceListVideos {
        list_id: ListId,
        video_ids: Vec<VideoId>,
    },
    ResolveSlug {
        slug: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ListOperationResult {
    Video { video: Video },
    Videos { items: Vec<Video> },
    List { list: VideoList },
    ListWithVideos { list: ListWithVideos },
    Lists { items: ListsView },
    Membership { diff: MembershipDiff },
    Deleted,
}

/// Lists with or without their members, depending on whether the read was eager.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ListsView {
    Plain(Vec<VideoList>),
    Eager(Vec<ListWithVideos>),
}

impl ListsView {
    pub fn len(&self) -> usize {
        match self {
            ListsView::Plain(lists) => lists.len(),
            ListsView::Eager(lists) => lists.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ListOperations<S> {
    store: Arc<S>,
    config: ListsConfig,
    engine: RelationshipEngine<S>,
    loader: GraphLoader<S>,
    directory: OwnerDirectory<S>,
    slugs: SlugResolver<S>,
}

impl<S> Clone for ListOperations<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            engine: self.engine.clone(),
            loader: self.loader.clone(),
            directory: self.directory.clone(),
            slugs: self.slugs.clone(),
        }
    }
}

impl<S: GraphStore> ListOperations<S> {
    pub fn new(store: Arc<S>, config: ListsConfig) -> Self {
        Self {
            engine: RelationshipEngine::new(Arc::clone(&store)),
            loader: GraphLoader::new(Arc::clone(&store)),
            directory: OwnerDirectory::new(Arc::clone(&store)),
            slugs: SlugResolver::new(Arc::clone(&store)),
            store,
            config,
        }
    }

    pub async fn current_owner<I>(&self, identity: &I) -> Result<Owner>
    where
        I: IdentityProvider + ?Sized,
    {
        self.directory.current_owner(identity).await
    }

    pub async fn execute<I>(
        &self,
        identity: &I,
        operation: ListOperation,
    ) -> Result<ListOperationResult>
    where
        I: IdentityProvider + ?Sized,
    {
        match operation {
            ListOperation::CreateVideo { payload } => {
                let owner = self.current_owner(identity).await?;
                let video = self.create_video(&owner, payload).await?;
                Ok(ListOperationResult::Video { video })
            }
            ListOperation::UpdateVideo { video_id, payload } => {
                let owner = self.current_owner(identity).await?;
                let video = self.update_video(&owner, video_id, payload).await?;
                Ok(ListOperationResult::Video { video })
            }
            ListOperation::GetVideo { video_id } => {
                let video = self.get_video(video_id).await?;
                Ok(ListOperationResult::Video { video })
            }
            ListOperation::ListVideos { current_user_only } => {
                let items = if current_user_only {
                    let owner = self.current_owner(identity).await?;
                    self.videos_for_owner(&owner).await?
                } else {
                    self.list_videos().await?
                };
                Ok(ListOperationResult::Videos { items })
            }
            ListOperation::DeleteVideo { video_id } => {
                let owner = self.current_owner(identity).await?;
                self.delete_video(&owner, video_id).await?;
                Ok(ListOperationResult::Deleted)
            }
            ListOperation::CreateList { payload } => {
                let owner = self.current_owner(identity).await?;
                let list = self.create_list(&owner, payload).await?;
                Ok(ListOperationResult::List { list })
            }
            ListOperation::UpdateList { list_id, payload } => {
                let owner = self.current_owner(identity).await?;
                let list = self.update_list(&owner, list_id, payload).await?;
                Ok(ListOperationResult::List { list })
            }
            ListOperation::GetList { list_id } => {
                let list = self.get_list(list_id).await?;
                Ok(ListOperationResult::ListWithVideos { list })
            }
            ListOperation::ListLists {
                eager,
                current_user_only,
            } => {
                let items = if current_user_only {
                    let owner = self.current_owner(identity).await?;
                    self.lists_for_owner(&owner, eager).await?
                } else {
                    self.list_all(eager).await?
                };
                Ok(ListOperationResult::Lists { items })
            }
            ListOperation::DeleteList { list_id } => {
                let owner = self.current_owner(identity).await?;
                self.delete_list(&owner, list_id).await?;
                Ok(ListOperationResult::Deleted)
            }
            ListOperation::AttachVideo { list_id, video_id } => {
                let owner = self.current_owner(identity).await?;
                self.attach_video(&owner, list_id, video_id).await?;
                let list = self.get_list(list_id).await?;
                Ok(ListOperationResult::ListWithVideos { list })
            }
            ListOperation::DetachVideo { list_id, video_id } => {
                let owner = self.current_owner(identity).await?;
                self.detach_video(&owner, list_id, video_id).await?;
                let list = self.get_list(list_id).await?;
                Ok(ListOperationResult::ListWithVideos { list })
            }
            ListOperation::ReplaceListVideos { list_id, video_ids } => {
                let owner = self.current_owner(identity).await?;
                let diff = self
                    .replace_list_videos(&owner, list_id, &video_ids)
                    .await?;
                Ok(ListOperationResult::Membership { diff })
            }
            ListOperation::ResolveSlug { slug } => {
                let list = self.resolve_by_slug(&slug).await?;
                Ok(ListOperationResult::ListWithVideos { list })
            }
        }
    }

    pub async fn create_video(&self, owner: &Owner, payload: CreateVideoPayload) -> Result<Video> {
        tracing::debug!(owner = %owner.id, "create video");
        let definition = payload.normalize()?;
        self.engine.create_video(owner, definition).await
    }

    pub async fn update_video(
        &self,
        owner: &Owner,
        video_id: VideoId,
        payload: UpdateVideoPayload,
    ) -> Result<Video> {
        tracing::debug!(owner = %owner.id, video = %video_id, "update video");
        let changes = payload.normalize()?;
        self.engine.update_video(owner.id, video_id, changes).await
    }

    pub async fn get_video(&self, video_id: VideoId) -> Result<Video> {
        tracing::debug!(video = %video_id, "get video");
        self.store.find_video(video_id).await?.ok_or_else(|| {
            LibError::not_found("Video not found", anyhow!("video {} not found", video_id))
        })
    }

    pub async fn list_videos(&self) -> Result<Vec<Video>> {
        tracing::debug!("list all videos");
        self.store.fetch_videos(None).await
    }

    pub async fn videos_for_owner(&self, owner: &Owner) -> Result<Vec<Video>> {
        tracing::debug!(owner = %owner.id, "list owner videos");
        self.store.fetch_videos(Some(owner.id)).await
    }

    pub async fn delete_video(&self, owner: &Owner, video_id: VideoId) -> Result<()> {
        tracing::debug!(owner = %owner.id, video = %video_id, "delete video");
        self.engine.delete_video(owner.id, video_id).await?;
        tracing::info!(video = %video_id, "video deleted");
        Ok(())
    }

    /// Validates the payload, checks the owner's list quota, then creates the list.
    pub async fn create_list(&self, owner: &Owner, payload: CreateListPayload) -> Result<VideoList> {
        tracing::debug!(owner = %owner.id, "create video list");
        let definition = payload.normalize()?;
        permissions::ensure_under_quota(
            self.store.as_ref(),
            owner,
            self.config.max_lists_per_owner,
        )
        .await?;
        self.engine.create_list(owner, definition).await
    }

    pub async fn update_list(
        &self,
        owner: &Owner,
        list_id: ListId,
        payload: UpdateListPayload,
    ) -> Result<VideoList> {
        tracing::debug!(owner = %owner.id, list = %list_id, "update video list");
        let changes = payload.normalize()?;
        self.engine.update_list(owner.id, list_id, changes).await
    }

    pub async fn delete_list(&self, owner: &Owner, list_id: ListId) -> Result<()> {
        tracing::debug!(owner = %owner.id, list = %list_id, "delete video list");
        self.engine.delete_list(owner.id, list_id).await?;
        tracing::info!(list = %list_id, "video list deleted");
        Ok(())
    }

    pub async fn attach_video(
        &self,
        owner: &Owner,
        list_id: ListId,
        video_id: VideoId,
    ) -> Result<()> {
        tracing::debug!(owner = %owner.id, list = %list_id, video = %video_id, "attach video");
        self.engine.attach(owner.id, video_id, list_id).await
    }

    pub async fn detach_video(
        &self,
        owner: &Owner,
        list_id: ListId,
        video_id: VideoId,
    ) -> Result<()> {
        tracing::debug!(owner = %owner.id, list = %list_id, video = %video_id, "detach video");
        self.engine.detach(owner.id, video_id, list_id).await
    }

    pub async fn replace_list_videos(
        &self,
        owner: &Owner,
        list_id: ListId,
        video_ids: &[VideoId],
    ) -> Result<MembershipDiff> {
        tracing::debug!(owner = %owner.id, list = %list_id, count = video_ids.len(), "replace list videos");
        self.engine
            .replace_list_membership(owner.id, list_id, video_ids)
            .await
    }

    pub async fn get_list(&self, list_id: ListId) -> Result<ListWithVideos> {
        tracing::debug!(list = %list_id, "get video list");
        self.loader.load_one(list_id).await
    }

    /// Eagerly loads the given lists in the order the ids were given.
    pub async fn lists_by_ids(&self, list_ids: Vec<ListId>) -> Result<Vec<ListWithVideos>> {
        tracing::debug!(count = list_ids.len(), "get video lists by id");
        self.loader.load(&ListSelection::Ids(list_ids)).await
    }

    pub async fn list_all(&self, eager: bool) -> Result<ListsView> {
        tracing::debug!(eager, "list all video lists");
        self.fetch_lists(ListSelection::All, eager).await
    }

    pub async fn lists_for_owner(&self, owner: &Owner, eager: bool) -> Result<ListsView> {
        tracing::debug!(owner = %owner.id, eager, "list owner video lists");
        self.fetch_lists(ListSelection::Owner(owner.id), eager)
            .await
    }

    pub async fn resolve_by_slug(&self, slug: &str) -> Result<ListWithVideos> {
        tracing::debug!(slug, "resolve video list slug");
        self.slugs.resolve(slug).await
    }

    async fn fetch_lists(&self, selection: ListSelection, eager: bool) -> Result<ListsView> {
        if eager {
            Ok(ListsView::Eager(self.loader.load(&selection).await?))
        } else {
            Ok(ListsView::Plain(self.store.fetch_lists(&selection).await?))
        }
    }
}
