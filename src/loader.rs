use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::anyhow;

use crate::error::{LibError, Result};
use crate::models::{ListId, ListMemberRow, ListSelection, ListWithVideos, VideoId, VideoList};
use crate::store::GraphStore;

/// Loads lists together with their member videos in one bulk query.
pub struct GraphLoader<S> {
    store: Arc<S>,
}

impl<S> Clone for GraphLoader<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: GraphStore> GraphLoader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn load(&self, selection: &ListSelection) -> Result<Vec<ListWithVideos>> {
        if matches!(selection, ListSelection::Ids(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }
        let rows = self.store.fetch_list_members(selection).await?;
        Ok(collate_list_rows(rows, selection.input_order()))
    }

    pub async fn load_one(&self, list_id: ListId) -> Result<ListWithVideos> {
        self.load(&ListSelection::Ids(vec![list_id]))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                LibError::not_found(
                    "Video list not found",
                    anyhow!("video list {} not found", list_id),
                )
            })
    }
}

/// Folds join rows into one entry per list.
///
/// The first row seen for a list supplies its fields; member videos are deduplicated and
/// keep their first-seen order. With `input_order`, results follow the position of each
/// id's first occurrence there. Lists absent from `input_order` go last, in row order.
pub fn collate_list_rows(
    rows: Vec<ListMemberRow>,
    input_order: Option<&[ListId]>,
) -> Vec<ListWithVideos> {
    let mut position: HashMap<ListId, usize> = HashMap::new();
    let mut collated: Vec<(ListWithVideos, HashSet<VideoId>)> = Vec::new();

    for row in rows {
        let slot = *position.entry(row.list.id).or_insert_with(|| {
            collated.push((empty_entry(row.list), HashSet::new()));
            collated.len() - 1
        });
        let (entry, seen) = &mut collated[slot];
        if let Some(video) = row.video {
            if seen.insert(video.id) {
                entry.videos.push(video);
            }
        }
    }

    let mut lists = collated
        .into_iter()
        .map(|(entry, _)| entry)
        .collect::<Vec<_>>();

    if let Some(order) = input_order {
        let mut requested: HashMap<ListId, usize> = HashMap::with_capacity(order.len());
        for (index, list_id) in order.iter().enumerate() {
            requested.entry(*list_id).or_insert(index);
        }
        lists.sort_by_key(|entry| {
            requested
                .get(&entry.list.id)
                .copied()
                .unwrap_or(usize::MAX)
        });
    }

    lists
}

fn empty_entry(list: VideoList) -> ListWithVideos {
    ListWithVideos {
        list,
        videos: Vec::new(),
    }
}
