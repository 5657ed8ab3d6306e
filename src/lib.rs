#[cfg(feature = "api")]
pub mod api;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod directory;
pub mod engine;
pub mod error;
pub mod loader;
pub mod membership;
pub mod memory;
pub mod models;
pub mod operations;
pub mod permissions;
pub mod slug;
pub mod store;

pub mod prelude {
    #[cfg(feature = "api")]
    pub use crate::api::{CurrentAccount, ListApp};
    pub use crate::config::ListsConfig;
    #[cfg(feature = "sqlx")]
    pub use crate::db::{PgStore, create_list_tables};
    pub use crate::directory::{IdentityProvider, OwnerDirectory};
    pub use crate::engine::RelationshipEngine;
    pub use crate::error::{ErrorKind, LibError, Result};
    pub use crate::loader::{GraphLoader, collate_list_rows};
    pub use crate::membership::{MembershipDiff, MembershipIndex};
    pub use crate::memory::MemoryStore;
    pub use crate::models::{
        AccountId, CreateListPayload, CreateVideoPayload, ListId, ListSelection, ListWithVideos,
        Owner, OwnerId, UpdateListPayload, UpdateVideoPayload, Video, VideoId, VideoList,
    };
    pub use crate::operations::{ListOperation, ListOperationResult, ListOperations, ListsView};
    pub use crate::slug::SlugResolver;
    pub use crate::store::{GraphStore, StoreTx};
}
