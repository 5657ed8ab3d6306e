use anyhow::anyhow;

use crate::error::{LibError, Result};
use crate::models::{Owner, OwnerId, Video, VideoList};
use crate::store::GraphStore;

/// Default cap on how many lists one owner may create.
pub const DEFAULT_MAX_LISTS_PER_OWNER: i64 = 1000;

/// A stored record with a single recorded owner.
pub trait Owned {
    const ENTITY: &'static str;

    fn owner_id(&self) -> OwnerId;

    fn resource_id(&self) -> String;
}

impl Owned for Video {
    const ENTITY: &'static str = "video";

    fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    fn resource_id(&self) -> String {
        self.id.to_string()
    }
}

impl Owned for VideoList {
    const ENTITY: &'static str = "video list";

    fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    fn resource_id(&self) -> String {
        self.id.to_string()
    }
}

/// Fails with `Forbidden` unless `actor` is the recorded owner of `resource`.
///
/// The error never names the real owner.
pub fn ensure_owner<R: Owned>(actor: OwnerId, resource: &R) -> Result<()> {
    if resource.owner_id() == actor {
        return Ok(());
    }

    tracing::warn!(
        actor = %actor,
        entity = R::ENTITY,
        resource_id = %resource.resource_id(),
        "ownership check rejected mutation"
    );
    Err(LibError::forbidden(
        "You do not own this resource",
        anyhow!(
            "owner {} may not modify {} {}",
            actor,
            R::ENTITY,
            resource.resource_id()
        ),
    ))
}

/// Fails with `QuotaExceeded` once the owner holds `max_lists` lists or more.
///
/// The count is read outside the creating transaction, so concurrent creators can
/// overshoot the limit by at most one list each.
pub async fn ensure_under_quota<S: GraphStore>(
    store: &S,
    owner: &Owner,
    max_lists: i64,
) -> Result<()> {
    let count = store.count_lists_by_owner(owner.id).await?;
    if count < max_lists {
        return Ok(());
    }

    tracing::warn!(owner = %owner.id, count, max_lists, "list quota reached");
    Err(LibError::quota_exceeded(
        "You cannot create more video lists",
        anyhow!("owner {} has {} lists (max {})", owner.id, count, max_lists),
    ))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::*;
    use crate::error::ErrorKind;
    use crate::models::ListId;

    fn list_owned_by(owner: OwnerId) -> VideoList {
        let now = NaiveDate::from_ymd_opt(2026, 1, 1)
            .expect("valid date")
            .and_hms_opt(0, 0, 0)
            .expect("valid datetime");
        VideoList {
            id: ListId(Uuid::from_u128(7)),
            owner_id: owner,
            name: "Faves".to_string(),
            slug: "faves".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn owner_passes_by_identifier() {
        let owner = OwnerId(Uuid::from_u128(1));
        let list = list_owned_by(OwnerId(Uuid::from_u128(1)));
        assert!(ensure_owner(owner, &list).is_ok());
    }

    #[test]
    fn other_owner_is_forbidden_without_leaking_owner() {
        let real_owner = OwnerId(Uuid::from_u128(1));
        let intruder = OwnerId(Uuid::from_u128(2));
        let list = list_owned_by(real_owner);

        let err = ensure_owner(intruder, &list).expect_err("should be forbidden");
        assert_eq!(err.kind, ErrorKind::Forbidden);
        assert!(!format!("{:#}", err.source).contains(&real_owner.to_string()));
        assert!(!err.public.contains(&real_owner.to_string()));
    }
}
