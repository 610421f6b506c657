//! Integration tests for share links and token-based access.

mod helpers;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use drivehub_core::ErrorKind;
use drivehub_core::events::AuditAction;
use drivehub_core::result::AppResult;
use drivehub_database::{MemoryMetadataStore, ShareRepository, ShareWrite};
use drivehub_entity::share::{MembershipRef, ShareLink, ShareResolution};
use drivehub_storage::MemoryBlobStore;

/// Share repository that records the ids passed to `find_by_roots` and
/// can hold a token lookup after it has read the store.
#[derive(Debug)]
struct CountingShares {
    inner: MemoryMetadataStore,
    root_lookups: Mutex<Vec<Vec<Uuid>>>,
    token_gate: helpers::Gate,
}

impl CountingShares {
    fn new(inner: MemoryMetadataStore) -> Self {
        Self {
            inner,
            root_lookups: Mutex::new(Vec::new()),
            token_gate: helpers::Gate::default(),
        }
    }

    fn lookups(&self) -> Vec<Vec<Uuid>> {
        self.root_lookups.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ShareRepository for CountingShares {
    async fn find_by_token(&self, token: &str) -> AppResult<Option<ShareLink>> {
        let link = self.inner.find_by_token(token).await;
        self.token_gate.pass().await;
        link
    }

    async fn find_by_root(&self, owner_id: Uuid, root_file_id: Uuid) -> AppResult<Option<ShareLink>> {
        self.inner.find_by_root(owner_id, root_file_id).await
    }

    async fn find_by_roots(&self, owner_id: Uuid, root_ids: &[Uuid]) -> AppResult<Vec<ShareLink>> {
        if let Ok(mut lookups) = self.root_lookups.lock() {
            lookups.push(root_ids.to_vec());
        }
        self.inner.find_by_roots(owner_id, root_ids).await
    }

    async fn commit_shares(&self, writes: &[ShareWrite]) -> AppResult<()> {
        self.inner.commit_shares(writes).await
    }

    async fn is_member(&self, token: &str, file_id: Uuid) -> AppResult<bool> {
        self.inner.is_member(token, file_id).await
    }

    async fn member_ids(&self, token: &str) -> AppResult<Vec<Uuid>> {
        self.inner.member_ids(token).await
    }

    async fn memberships_for_files(&self, file_ids: &[Uuid]) -> AppResult<Vec<MembershipRef>> {
        self.inner.memberships_for_files(file_ids).await
    }

    async fn delete_links(&self, tokens: &[String]) -> AppResult<Vec<Uuid>> {
        self.inner.delete_links(tokens).await
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<ShareLink>> {
        self.inner.find_expired(now).await
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> AppResult<Vec<ShareLink>> {
        self.inner.list_by_owner(owner_id).await
    }
}

#[tokio::test]
async fn test_share_browse_download_revoke() {
    let app = helpers::TestApp::new().await;
    let owner = Uuid::new_v4();
    let album = app.folder(owner, "Album", None).await;
    let day = app.folder(owner, "Day 1", Some(album.id)).await;
    app.file(owner, "cover.jpg", b"cover", Some(album.id)).await;
    let photo = app.file(owner, "photo.jpg", b"photo", Some(day.id)).await;

    let link = app.shares.create_or_extend(owner, album.id, None).await.unwrap();
    assert_eq!(link.token.len(), 48);

    match app.access.resolve(&link.token).await.unwrap() {
        ShareResolution::Active { node, .. } => assert_eq!(node.id, album.id),
        other => panic!("unexpected resolution: {other:?}"),
    }

    let listing = app.access.list_shared_folder(&link.token, album.id).await.unwrap();
    let names: Vec<&str> = listing.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["Day 1", "cover.jpg"]);

    let node = app.access.shared_node(&link.token, photo.id).await.unwrap();
    assert_eq!(node.id, photo.id);

    let mut entries: Vec<String> = app
        .access
        .archive_entries(&link.token, day.id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.relative_name)
        .collect();
    entries.sort();
    assert_eq!(entries, vec!["Day 1/photo.jpg"]);

    app.shares.revoke(owner, album.id).await.unwrap();
    assert_eq!(
        app.access.resolve(&link.token).await.unwrap_err().kind,
        ErrorKind::NotFound
    );
    assert_eq!(
        app.access
            .list_shared_folder(&link.token, album.id)
            .await
            .unwrap_err()
            .kind,
        ErrorKind::NotFound
    );
    assert_eq!(
        app.audit.actions(),
        vec![AuditAction::ShareCreated, AuditAction::ShareRevoked]
    );
}

#[tokio::test]
async fn test_cached_link_never_outlives_expiry() {
    let app = helpers::TestApp::new().await;
    let owner = Uuid::new_v4();
    let folder = app.folder(owner, "Soon", None).await;
    let expires_at = Utc::now() + chrono::Duration::milliseconds(1500);
    let link = app
        .shares
        .create_or_extend(owner, folder.id, Some(expires_at))
        .await
        .unwrap();

    assert!(!app.access.resolve(&link.token).await.unwrap().is_expired());
    assert!(app.access.list_shared_folder(&link.token, folder.id).await.unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(1700)).await;
    assert!(app.access.resolve(&link.token).await.unwrap().is_expired());
    assert_eq!(
        app.access
            .list_shared_folder(&link.token, folder.id)
            .await
            .unwrap_err()
            .kind,
        ErrorKind::Expired
    );
}

#[tokio::test]
async fn test_expired_link_is_revived_by_extend() {
    let app = helpers::TestApp::new().await;
    let owner = Uuid::new_v4();
    let folder = app.folder(owner, "Folder", None).await;
    app.store
        .commit_shares(&[ShareWrite::Create {
            link: ShareLink {
                token: "lapsed".into(),
                root_file_id: folder.id,
                owner_id: owner,
                expires_at: Some(Utc::now() - chrono::Duration::hours(1)),
                created_at: Utc::now() - chrono::Duration::days(1),
            },
            members: vec![folder.id],
        }])
        .await
        .unwrap();
    assert!(app.access.resolve("lapsed").await.unwrap().is_expired());

    let revived = app.shares.create_or_extend(owner, folder.id, None).await.unwrap();
    assert_eq!(revived.token, "lapsed");
    assert_eq!(revived.expires_at, None);
    assert!(!app.access.resolve("lapsed").await.unwrap().is_expired());
}

#[tokio::test]
async fn test_moving_out_of_share_revokes_access() {
    let app = helpers::TestApp::new().await;
    let owner = Uuid::new_v4();
    let public = app.folder(owner, "Public", None).await;
    let private = app.folder(owner, "Private", None).await;
    let doc = app.file(owner, "doc", b"d", Some(public.id)).await;
    let link = app.shares.create_or_extend(owner, public.id, None).await.unwrap();
    assert_eq!(app.access.list_shared_folder(&link.token, public.id).await.unwrap().len(), 1);

    app.nodes.move_nodes(owner, &[doc.id], Some(private.id)).await.unwrap();

    assert_eq!(
        app.access.shared_node(&link.token, doc.id).await.unwrap_err().kind,
        ErrorKind::NotFound
    );
    assert!(app.access.list_shared_folder(&link.token, public.id).await.unwrap().is_empty());

    // Moving back does not re-add it until the share is extended.
    app.nodes.move_nodes(owner, &[doc.id], Some(public.id)).await.unwrap();
    assert!(!app.access.is_member(&link.token, doc.id).await.unwrap());
    app.shares.link_to_parent_share(owner, doc.id).await.unwrap();
    assert!(app.access.is_member(&link.token, doc.id).await.unwrap());
}

#[tokio::test]
async fn test_moving_within_share_keeps_access() {
    let app = helpers::TestApp::new().await;
    let owner = Uuid::new_v4();
    let public = app.folder(owner, "Public", None).await;
    let a = app.folder(owner, "A", Some(public.id)).await;
    let b = app.folder(owner, "B", Some(public.id)).await;
    let doc = app.file(owner, "doc", b"d", Some(a.id)).await;
    let link = app.shares.create_or_extend(owner, public.id, None).await.unwrap();

    app.nodes.move_nodes(owner, &[doc.id], Some(b.id)).await.unwrap();
    let listing = app.access.list_shared_folder(&link.token, b.id).await.unwrap();
    assert_eq!(listing.len(), 1);
    assert!(app.nodes.get(owner, doc.id).await.unwrap().shared);
}

#[tokio::test]
async fn test_deleting_shared_root_kills_token() {
    let app = helpers::TestApp::new().await;
    let owner = Uuid::new_v4();
    let folder = app.folder(owner, "Gone", None).await;
    let link = app.shares.create_or_extend(owner, folder.id, None).await.unwrap();
    assert!(!app.access.resolve(&link.token).await.unwrap().is_expired());

    app.nodes.permanently_delete(owner, &[folder.id]).await.unwrap();
    assert_eq!(
        app.access.resolve(&link.token).await.unwrap_err().kind,
        ErrorKind::NotFound
    );
    assert_eq!(app.store.link_count().await, 0);
    assert_eq!(app.store.membership_count().await, 0);
}

#[tokio::test]
async fn test_trashed_root_hides_share_until_restored() {
    let app = helpers::TestApp::new().await;
    let owner = Uuid::new_v4();
    let folder = app.folder(owner, "Folder", None).await;
    let link = app.shares.create_or_extend(owner, folder.id, None).await.unwrap();

    app.nodes.soft_delete(owner, &[folder.id]).await.unwrap();
    assert_eq!(
        app.access.resolve(&link.token).await.unwrap_err().kind,
        ErrorKind::NotFound
    );

    app.nodes.restore(owner, &[folder.id]).await.unwrap();
    assert!(!app.access.resolve(&link.token).await.unwrap().is_expired());
}

#[tokio::test]
async fn test_links_for_files_loads_only_misses() {
    let store = MemoryMetadataStore::new();
    let counting = Arc::new(CountingShares::new(store.clone()));
    let app = helpers::TestApp::build(
        store.clone(),
        Arc::new(store),
        counting.clone(),
        Arc::new(MemoryBlobStore::new()),
    )
    .await;
    let owner = Uuid::new_v4();
    let a = app.folder(owner, "A", None).await;
    let b = app.folder(owner, "B", None).await;
    let c = app.folder(owner, "C", None).await;
    app.shares.create_or_extend(owner, a.id, None).await.unwrap();
    let before = counting.lookups().len();

    let first = app
        .shares
        .links_for_files(owner, &[a.id, b.id, c.id])
        .await
        .unwrap();
    assert_eq!(first.len(), 1);
    let lookups = counting.lookups();
    assert_eq!(lookups.len(), before + 1);
    assert_eq!(lookups[before], vec![a.id, b.id, c.id]);

    let second = app
        .shares
        .links_for_files(owner, &[a.id, b.id, c.id])
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(counting.lookups().len(), before + 1);

    app.shares.create_or_extend(owner, b.id, None).await.unwrap();
    let third = app
        .shares
        .links_for_files(owner, &[a.id, b.id, c.id])
        .await
        .unwrap();
    assert_eq!(third.len(), 2);
    let lookups = counting.lookups();
    assert_eq!(lookups.last(), Some(&vec![b.id]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lookup_racing_revoke_does_not_cache_the_link() {
    let store = MemoryMetadataStore::new();
    let gated = Arc::new(CountingShares::new(store.clone()));
    let app = Arc::new(
        helpers::TestApp::build(
            store.clone(),
            Arc::new(store),
            gated.clone(),
            Arc::new(MemoryBlobStore::new()),
        )
        .await,
    );
    let owner = Uuid::new_v4();
    let folder = app.folder(owner, "Shared", None).await.id;
    let token = app.shares.create_or_extend(owner, folder, None).await.unwrap().token;

    gated.token_gate.arm();
    let reader = {
        let app = Arc::clone(&app);
        let token = token.clone();
        tokio::spawn(async move { app.access.resolve(&token).await })
    };
    gated.token_gate.reached().await;

    app.shares.revoke(owner, folder).await.unwrap();
    gated.token_gate.release();
    reader.await.unwrap().unwrap();

    assert_eq!(
        app.access.resolve(&token).await.unwrap_err().kind,
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn test_update_expiry_and_list_links() {
    let app = helpers::TestApp::new().await;
    let owner = Uuid::new_v4();
    let folder = app.folder(owner, "F", None).await;
    app.shares.create_or_extend(owner, folder.id, None).await.unwrap();

    let later = Utc::now() + chrono::Duration::days(7);
    let updated = app.shares.update_expiry(owner, folder.id, Some(later)).await.unwrap();
    assert_eq!(updated.expires_at, Some(later));

    let links = app.shares.list_links(owner).await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].expires_at, Some(later));

    let cleared = app.shares.update_expiry(owner, folder.id, None).await.unwrap();
    assert_eq!(cleared.expires_at, None);

    let err = app
        .shares
        .update_expiry(owner, Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}
