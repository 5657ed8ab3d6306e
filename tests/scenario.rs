use std::sync::Arc;

use serde_json::json;
use subseq_lists::prelude::*;

async fn setup(config: ListsConfig) -> (Arc<MemoryStore>, ListOperations<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let ops = ListOperations::new(Arc::clone(&store), config);
    (store, ops)
}

fn list_payload(name: &str, slug: &str) -> CreateListPayload {
    CreateListPayload {
        name: name.to_string(),
        slug: slug.to_string(),
        video_ids: None,
    }
}

#[tokio::test]
async fn owner_builds_shares_and_hits_quota() {
    let (store, ops) = setup(ListsConfig::default()).await;
    let account_a = AccountId::new_v4();
    let account_b = AccountId::new_v4();
    store.provision_owner(account_a).await;
    store.provision_owner(account_b).await;

    let owner_a = ops.current_owner(&account_a).await.expect("owner a");
    let owner_b = ops.current_owner(&account_b).await.expect("owner b");

    let faves = ops
        .create_list(&owner_a, list_payload("Faves", "faves"))
        .await
        .expect("create list");
    let clip = ops
        .create_video(
            &owner_a,
            CreateVideoPayload {
                url: "https://youtu.be/abc12345678".to_string(),
                name: "Clip".to_string(),
            },
        )
        .await
        .expect("create video");
    ops.attach_video(&owner_a, faves.id, clip.id)
        .await
        .expect("attach");

    let resolved = ops.resolve_by_slug("faves").await.expect("resolve slug");
    assert_eq!(resolved.list.id, faves.id);
    assert_eq!(resolved.videos.len(), 1);
    assert_eq!(resolved.videos[0].name, "Clip");

    let err = ops
        .delete_list(&owner_b, faves.id)
        .await
        .expect_err("b does not own the list");
    assert_eq!(err.kind, ErrorKind::Forbidden);
    assert!(ops.get_list(faves.id).await.is_ok());

    for index in 1..1000 {
        ops.create_list(&owner_a, list_payload("Bulk", &format!("bulk-{index}")))
            .await
            .unwrap_or_else(|err| panic!("list {index} should fit the quota: {err}"));
    }
    let err = ops
        .create_list(&owner_a, list_payload("Overflow", "overflow"))
        .await
        .expect_err("1001st list");
    assert_eq!(err.kind, ErrorKind::QuotaExceeded);
    assert!(store.find_list_by_slug("overflow").await.unwrap().is_none());

    ops.create_list(&owner_b, list_payload("Other", "other"))
        .await
        .expect("quota is per owner");
}

#[tokio::test]
async fn quota_frees_up_after_delete() {
    let (store, ops) = setup(ListsConfig::default().with_max_lists_per_owner(2)).await;
    let owner = store.provision_owner(AccountId::new_v4()).await;

    let first = ops.create_list(&owner, list_payload("One", "one")).await.unwrap();
    ops.create_list(&owner, list_payload("Two", "two")).await.unwrap();
    let err = ops
        .create_list(&owner, list_payload("Three", "three"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::QuotaExceeded);

    ops.delete_list(&owner, first.id).await.unwrap();
    ops.create_list(&owner, list_payload("Three", "three"))
        .await
        .expect("room after delete");
}

#[tokio::test]
async fn slug_resolution_failures_are_distinguished() {
    let (store, ops) = setup(ListsConfig::default()).await;
    let owner = store.provision_owner(AccountId::new_v4()).await;
    ops.create_list(&owner, list_payload("Empty", "empty"))
        .await
        .unwrap();

    for slug in ["api", "internal-use", "my-list_1", "", "has space"] {
        let err = ops.resolve_by_slug(slug).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidSlug, "slug {slug:?}");
    }

    let err = ops.resolve_by_slug("missing").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let err = ops.resolve_by_slug("empty").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::EmptyCollection);
}

#[tokio::test]
async fn reserved_and_malformed_slugs_cannot_be_created() {
    let (store, ops) = setup(ListsConfig::default()).await;
    let owner = store.provision_owner(AccountId::new_v4()).await;

    let err = ops
        .create_list(&owner, list_payload("Api", "api"))
        .await
        .unwrap_err();
    assert_eq!(err.code, "slug_reserved");

    let err = ops
        .create_list(&owner, list_payload("Bad", "bad_slug"))
        .await
        .unwrap_err();
    assert_eq!(err.code, "slug_invalid");

    let err = ops
        .create_list(&owner, list_payload("", "blank-name"))
        .await
        .unwrap_err();
    assert_eq!(err.code, "name_length");

    assert!(ops.list_all(false).await.unwrap().is_empty());
}

#[tokio::test]
async fn identity_is_required_for_writes() {
    let (store, ops) = setup(ListsConfig::default()).await;
    let provisioned = AccountId::new_v4();
    store.provision_owner(provisioned).await;

    let anonymous: Option<AccountId> = None;
    let err = ops
        .execute(
            &anonymous,
            ListOperation::CreateList {
                payload: list_payload("Faves", "faves"),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotAuthenticated);

    let stranger = AccountId::new_v4();
    let err = ops
        .execute(
            &stranger,
            ListOperation::CreateList {
                payload: list_payload("Faves", "faves"),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::OwnerNotFound);

    let result = ops
        .execute(
            &anonymous,
            ListOperation::ListLists {
                eager: false,
                current_user_only: false,
            },
        )
        .await
        .expect("reads do not need an identity");
    let ListOperationResult::Lists { items } = result else {
        panic!("lists result expected");
    };
    assert!(items.is_empty());
}

#[tokio::test]
async fn operations_dispatch_from_json() {
    let (store, ops) = setup(ListsConfig::default()).await;
    let account = AccountId::new_v4();
    store.provision_owner(account).await;

    let create_video: ListOperation = serde_json::from_value(json!({
        "operation": "create_video",
        "payload": { "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ", "name": "Song" }
    }))
    .expect("valid operation");
    let ListOperationResult::Video { video } = ops.execute(&account, create_video).await.unwrap()
    else {
        panic!("video result expected");
    };

    let create_list: ListOperation = serde_json::from_value(json!({
        "operation": "create_list",
        "payload": { "name": "Songs", "slug": "songs", "videoIds": [video.id] }
    }))
    .expect("valid operation");
    let ListOperationResult::List { list } = ops.execute(&account, create_list).await.unwrap()
    else {
        panic!("list result expected");
    };

    let replace: ListOperation = serde_json::from_value(json!({
        "operation": "replace_list_videos",
        "list_id": list.id,
        "video_ids": []
    }))
    .expect("valid operation");
    let ListOperationResult::Membership { diff } = ops.execute(&account, replace).await.unwrap()
    else {
        panic!("membership result expected");
    };
    assert_eq!(diff.removed, vec![video.id]);
    assert!(diff.added.is_empty());

    let listed = ops
        .execute(
            &account,
            ListOperation::ListLists {
                eager: true,
                current_user_only: true,
            },
        )
        .await
        .unwrap();
    let body = serde_json::to_value(&listed).unwrap();
    assert_eq!(body["result"], "lists");
    assert_eq!(body["items"][0]["slug"], "songs");
    assert_eq!(body["items"][0]["videos"], json!([]));

    let delete: ListOperation = serde_json::from_value(json!({
        "operation": "delete_video",
        "video_id": video.id
    }))
    .expect("valid operation");
    assert!(matches!(
        ops.execute(&account, delete).await.unwrap(),
        ListOperationResult::Deleted
    ));
    assert!(ops.list_videos().await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_attaches_keep_membership_symmetric() {
    let (store, ops) = setup(ListsConfig::default()).await;
    let owner = store.provision_owner(AccountId::new_v4()).await;
    let list = ops
        .create_list(&owner, list_payload("Busy", "busy"))
        .await
        .unwrap();

    let mut videos = Vec::new();
    for index in 0..16 {
        let video = ops
            .create_video(
                &owner,
                CreateVideoPayload {
                    url: format!("https://youtu.be/clip{index:08}"),
                    name: format!("Clip {index}"),
                },
            )
            .await
            .unwrap();
        videos.push(video);
    }

    let mut handles = Vec::new();
    for video in &videos {
        let ops = ops.clone();
        let owner = owner.clone();
        let (list_id, video_id) = (list.id, video.id);
        handles.push(tokio::spawn(async move {
            ops.attach_video(&owner, list_id, video_id).await
        }));
    }
    for handle in handles {
        handle.await.expect("task").expect("attach");
    }

    assert_eq!(ops.get_list(list.id).await.unwrap().videos.len(), videos.len());
    assert_eq!(store.membership_edges().await.len(), videos.len());
    assert!(store.is_symmetric().await);
}
