use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use crate::models::{ListId, VideoId};

/// Edges added and removed when a list's member set is replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipDiff {
    pub added: Vec<VideoId>,
    pub removed: Vec<VideoId>,
}

impl MembershipDiff {
    /// Symmetric difference between the current and desired member sets.
    ///
    /// `removed` follows the order of `current`, `added` the order of `desired`.
    pub fn between(current: &[VideoId], desired: &[VideoId]) -> Self {
        let current_set: HashSet<VideoId> = current.iter().copied().collect();
        let desired_set: HashSet<VideoId> = desired.iter().copied().collect();

        let mut seen = HashSet::with_capacity(desired.len());
        let added = desired
            .iter()
            .copied()
            .filter(|id| !current_set.contains(id) && seen.insert(*id))
            .collect();
        let removed = current
            .iter()
            .copied()
            .filter(|id| !desired_set.contains(id))
            .collect();

        Self { added, removed }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// A membership edge present on one side of the index but missing on the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmetryViolation {
    MissingVideoSide { list_id: ListId, video_id: VideoId },
    MissingListSide { list_id: ListId, video_id: VideoId },
}

/// Video/list membership kept as two edge sets, one per direction.
///
/// Both sides only change together, through the methods below.
#[derive(Debug, Clone, Default)]
pub struct MembershipIndex {
    videos_by_list: BTreeMap<ListId, BTreeSet<VideoId>>,
    lists_by_video: BTreeMap<VideoId, BTreeSet<ListId>>,
}

impl MembershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the edge was already present.
    pub fn attach(&mut self, video_id: VideoId, list_id: ListId) -> bool {
        let inserted = self
            .videos_by_list
            .entry(list_id)
            .or_default()
            .insert(video_id);
        self.lists_by_video
            .entry(video_id)
            .or_default()
            .insert(list_id);
        inserted
    }

    /// Returns `false` when there was no edge to remove.
    pub fn detach(&mut self, video_id: VideoId, list_id: ListId) -> bool {
        let removed = remove_edge(&mut self.videos_by_list, list_id, video_id);
        remove_edge(&mut self.lists_by_video, video_id, list_id);
        removed
    }

    pub fn contains(&self, video_id: VideoId, list_id: ListId) -> bool {
        self.videos_by_list
            .get(&list_id)
            .is_some_and(|videos| videos.contains(&video_id))
    }

    pub fn videos_of(&self, list_id: ListId) -> Vec<VideoId> {
        self.videos_by_list
            .get(&list_id)
            .map(|videos| videos.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn lists_of(&self, video_id: VideoId) -> Vec<ListId> {
        self.lists_by_video
            .get(&video_id)
            .map(|lists| lists.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Detaches the video from every list and returns those lists.
    pub fn remove_video(&mut self, video_id: VideoId) -> Vec<ListId> {
        let lists = self.lists_of(video_id);
        for list_id in &lists {
            self.detach(video_id, *list_id);
        }
        lists
    }

    /// Detaches every member video from the list and returns them.
    pub fn remove_list(&mut self, list_id: ListId) -> Vec<VideoId> {
        let videos = self.videos_of(list_id);
        for video_id in &videos {
            self.detach(*video_id, list_id);
        }
        videos
    }

    /// Applies a diff computed against this index for `list_id`.
    pub fn apply(&mut self, list_id: ListId, diff: &MembershipDiff) {
        for video_id in &diff.removed {
            self.detach(*video_id, list_id);
        }
        for video_id in &diff.added {
            self.attach(*video_id, list_id);
        }
    }

    /// Iterates edges grouped by video, the way a join over the membership table reads.
    pub fn edges_by_video(&self) -> impl Iterator<Item = (VideoId, ListId)> + '_ {
        self.lists_by_video
            .iter()
            .flat_map(|(video_id, lists)| lists.iter().map(move |list_id| (*video_id, *list_id)))
    }

    pub fn edge_count(&self) -> usize {
        self.videos_by_list.values().map(BTreeSet::len).sum()
    }

    pub fn symmetry_violations(&self) -> Vec<SymmetryViolation> {
        let mut violations = Vec::new();
        for (list_id, videos) in &self.videos_by_list {
            for video_id in videos {
                let mirrored = self
                    .lists_by_video
                    .get(video_id)
                    .is_some_and(|lists| lists.contains(list_id));
                if !mirrored {
                    violations.push(SymmetryViolation::MissingListSide {
                        list_id: *list_id,
                        video_id: *video_id,
                    });
                }
            }
        }
        for (video_id, lists) in &self.lists_by_video {
            for list_id in lists {
                if !self.contains(*video_id, *list_id) {
                    violations.push(SymmetryViolation::MissingVideoSide {
                        list_id: *list_id,
                        video_id: *video_id,
                    });
                }
            }
        }
        violations
    }
}

fn remove_edge<K: Ord + Copy, V: Ord>(
    edges: &mut BTreeMap<K, BTreeSet<V>>,
    key: K,
    value: V,
) -> bool {
    let Some(values) = edges.get_mut(&key) else {
        return false;
    };
    let removed = values.remove(&value);
    if values.is_empty() {
        edges.remove(&key);
    }
    removed
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use uuid::Uuid;

    use super::*;

    fn video(n: u128) -> VideoId {
        VideoId(Uuid::from_u128(n))
    }

    fn list(n: u128) -> ListId {
        ListId(Uuid::from_u128(n))
    }

    #[test]
    fn attach_is_idempotent() {
        let mut index = MembershipIndex::new();
        assert!(index.attach(video(1), list(1)));
        assert!(!index.attach(video(1), list(1)));
        assert_eq!(index.edge_count(), 1);
        assert_eq!(index.lists_of(video(1)), vec![list(1)]);
        assert!(index.symmetry_violations().is_empty());
    }

    #[test]
    fn detach_missing_edge_is_a_no_op() {
        let mut index = MembershipIndex::new();
        assert!(!index.detach(video(1), list(1)));
        index.attach(video(1), list(2));
        assert!(!index.detach(video(1), list(1)));
        assert_eq!(index.edge_count(), 1);
    }

    #[test]
    fn remove_list_clears_both_sides() {
        let mut index = MembershipIndex::new();
        for n in 1..=3 {
            index.attach(video(n), list(9));
            index.attach(video(n), list(8));
        }

        let detached = index.remove_list(list(9));
        assert_eq!(detached, vec![video(1), video(2), video(3)]);
        for n in 1..=3 {
            assert_eq!(index.lists_of(video(n)), vec![list(8)]);
        }
        assert!(index.videos_of(list(9)).is_empty());
        assert!(index.symmetry_violations().is_empty());
    }

    #[test]
    fn remove_video_clears_both_sides() {
        let mut index = MembershipIndex::new();
        index.attach(video(1), list(1));
        index.attach(video(1), list(2));
        index.attach(video(2), list(2));

        assert_eq!(index.remove_video(video(1)), vec![list(1), list(2)]);
        assert!(index.videos_of(list(1)).is_empty());
        assert_eq!(index.videos_of(list(2)), vec![video(2)]);
        assert!(index.symmetry_violations().is_empty());
    }

    #[test]
    fn diff_is_symmetric_difference() {
        let current = [video(1), video(2), video(3)];
        let desired = [video(4), video(2), video(4), video(5)];
        let diff = MembershipDiff::between(&current, &desired);
        assert_eq!(diff.added, vec![video(4), video(5)]);
        assert_eq!(diff.removed, vec![video(1), video(3)]);

        let unchanged = MembershipDiff::between(&current, &current);
        assert!(unchanged.is_empty());
    }

    #[test]
    fn apply_replaces_member_set() {
        let mut index = MembershipIndex::new();
        index.attach(video(1), list(1));
        index.attach(video(2), list(1));

        let diff = MembershipDiff::between(&index.videos_of(list(1)), &[video(2), video(3)]);
        index.apply(list(1), &diff);
        assert_eq!(index.videos_of(list(1)), vec![video(2), video(3)]);
        assert!(index.lists_of(video(1)).is_empty());
        assert!(index.symmetry_violations().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Step {
        Attach(u8, u8),
        Detach(u8, u8),
        RemoveVideo(u8),
        RemoveList(u8),
        Replace(u8, Vec<u8>),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0u8..6, 0u8..4).prop_map(|(v, l)| Step::Attach(v, l)),
            (0u8..6, 0u8..4).prop_map(|(v, l)| Step::Detach(v, l)),
            (0u8..6).prop_map(Step::RemoveVideo),
            (0u8..4).prop_map(Step::RemoveList),
            (0u8..4, proptest::collection::vec(0u8..6, 0..6)).prop_map(|(l, vs)| Step::Replace(l, vs)),
        ]
    }

    proptest! {
        #[test]
        fn random_mutations_keep_index_symmetric(steps in proptest::collection::vec(step(), 0..64)) {
            let mut index = MembershipIndex::new();
            for step in steps {
                match step {
                    Step::Attach(v, l) => { index.attach(video(v.into()), list(l.into())); }
                    Step::Detach(v, l) => { index.detach(video(v.into()), list(l.into())); }
                    Step::RemoveVideo(v) => {
                        index.remove_video(video(v.into()));
                        prop_assert!(index.lists_of(video(v.into())).is_empty());
                    }
                    Step::RemoveList(l) => {
                        index.remove_list(list(l.into()));
                        prop_assert!(index.videos_of(list(l.into())).is_empty());
                    }
                    Step::Replace(l, vs) => {
                        let desired = vs.into_iter().map(|v| video(v.into())).collect::<Vec<_>>();
                        let diff = MembershipDiff::between(&index.videos_of(list(l.into())), &desired);
                        index.apply(list(l.into()), &diff);
                        let mut expected = desired.clone();
                        expected.sort();
                        expected.dedup();
                        prop_assert_eq!(index.videos_of(list(l.into())), expected);
                    }
                }
                prop_assert!(index.symmetry_violations().is_empty());
            }
        }
    }
}
