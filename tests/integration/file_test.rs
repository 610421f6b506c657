//! Integration tests for the file tree: listing, trash, restore, copy,
//! move and permanent deletion.

mod helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use drivehub_core::ErrorKind;
use drivehub_core::error::AppError;
use drivehub_core::result::AppResult;
use drivehub_core::traits::storage::BlobStore;
use drivehub_core::types::{SortBy, SortDirection, SortOrder};
use drivehub_database::{MemoryMetadataStore, NodeRepository};
use drivehub_entity::file::FileNode;
use drivehub_entity::share::ShareMembership;
use drivehub_storage::{LocalBlobStore, MemoryBlobStore};

/// Node repository whose bulk insert can be made to fail and whose
/// listing can be held after it has read the store.
#[derive(Debug)]
struct FaultyNodes {
    inner: MemoryMetadataStore,
    fail_insert_many: AtomicBool,
    list_gate: helpers::Gate,
}

impl FaultyNodes {
    fn new(inner: MemoryMetadataStore) -> Self {
        Self {
            inner,
            fail_insert_many: AtomicBool::new(false),
            list_gate: helpers::Gate::default(),
        }
    }
}

#[async_trait]
impl NodeRepository for FaultyNodes {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<FileNode>> {
        self.inner.find_by_id(id).await
    }

    async fn find_owned(&self, owner_id: Uuid, ids: &[Uuid]) -> AppResult<Vec<FileNode>> {
        self.inner.find_owned(owner_id, ids).await
    }

    async fn list_children(
        &self,
        owner_id: Uuid,
        parent_id: Option<Uuid>,
        order: SortOrder,
    ) -> AppResult<Vec<FileNode>> {
        let children = self.inner.list_children(owner_id, parent_id, order).await;
        self.list_gate.pass().await;
        children
    }

    async fn children_of(&self, owner_id: Uuid, parent_ids: &[Uuid]) -> AppResult<Vec<FileNode>> {
        self.inner.children_of(owner_id, parent_ids).await
    }

    async fn insert(&self, node: &FileNode) -> AppResult<FileNode> {
        self.inner.insert(node).await
    }

    async fn insert_many(&self, nodes: &[FileNode]) -> AppResult<()> {
        if self.fail_insert_many.load(Ordering::SeqCst) {
            return Err(AppError::database("connection reset"));
        }
        self.inner.insert_many(nodes).await
    }

    async fn rename(
        &self,
        owner_id: Uuid,
        id: Uuid,
        name: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.inner.rename(owner_id, id, name, now).await
    }

    async fn set_starred(&self, owner_id: Uuid, ids: &[Uuid], starred: bool) -> AppResult<u64> {
        self.inner.set_starred(owner_id, ids, starred).await
    }

    async fn move_nodes(
        &self,
        owner_id: Uuid,
        ids: &[Uuid],
        new_parent_id: Option<Uuid>,
        prune: &[ShareMembership],
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.inner
            .move_nodes(owner_id, ids, new_parent_id, prune, now)
            .await
    }

    async fn trash(&self, owner_id: Uuid, ids: &[Uuid], at: DateTime<Utc>) -> AppResult<u64> {
        self.inner.trash(owner_id, ids, at).await
    }

    async fn restore(
        &self,
        owner_id: Uuid,
        clear: &[Uuid],
        reattach: &[Uuid],
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.inner.restore(owner_id, clear, reattach, now).await
    }

    async fn delete_many(&self, owner_id: Uuid, ids: &[Uuid]) -> AppResult<Vec<FileNode>> {
        self.inner.delete_many(owner_id, ids).await
    }

    async fn search(&self, owner_id: Uuid, query: &str, limit: i64) -> AppResult<Vec<FileNode>> {
        self.inner.search(owner_id, query, limit).await
    }

    async fn list_trash(&self, owner_id: Uuid) -> AppResult<Vec<FileNode>> {
        self.inner.list_trash(owner_id).await
    }

    async fn find_trashed_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<FileNode>> {
        self.inner.find_trashed_before(cutoff).await
    }
}

fn names(nodes: &[FileNode]) -> Vec<&str> {
    nodes.iter().map(|n| n.name.as_str()).collect()
}

#[tokio::test]
async fn test_listing_orders() {
    let app = helpers::TestApp::new().await;
    let owner = Uuid::new_v4();
    app.file(owner, "b.txt", b"12345", None).await;
    app.file(owner, "a.txt", b"1", None).await;
    app.folder(owner, "c", None).await;

    let by_name = app
        .nodes
        .list_children(owner, None, SortOrder::new(SortBy::Name, SortDirection::Asc))
        .await
        .unwrap();
    assert_eq!(names(&by_name), vec!["a.txt", "b.txt", "c"]);

    let by_size = app
        .nodes
        .list_children(owner, None, SortOrder::new(SortBy::Size, SortDirection::Desc))
        .await
        .unwrap();
    assert_eq!(names(&by_size), vec!["b.txt", "a.txt", "c"]);

    let by_name_desc = app
        .nodes
        .list_children(owner, None, SortOrder::new(SortBy::Name, SortDirection::Desc))
        .await
        .unwrap();
    assert_eq!(names(&by_name_desc), vec!["c", "b.txt", "a.txt"]);
}

#[tokio::test]
async fn test_owners_are_isolated() {
    let app = helpers::TestApp::new().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let private = app.folder(alice, "Private", None).await;

    assert!(
        app.nodes
            .list_children(bob, None, SortOrder::default())
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        app.nodes.get(bob, private.id).await.unwrap_err().kind,
        ErrorKind::NotFound
    );
    assert_eq!(app.nodes.soft_delete(bob, &[private.id]).await.unwrap(), 0);
    assert_eq!(
        app.nodes.rename(bob, private.id, "Mine").await.unwrap_err().kind,
        ErrorKind::NotFound
    );
    let err = app
        .nodes
        .create_folder(bob, "Sneaky", Some(private.id))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidParent);
}

#[tokio::test]
async fn test_trash_restore_preserves_attributes() {
    let app = helpers::TestApp::new().await;
    let owner = Uuid::new_v4();
    let root = app.folder(owner, "Root", None).await;
    let sub = app.folder(owner, "Sub", Some(root.id)).await;
    let doc = app.file(owner, "doc.txt", b"hello", Some(sub.id)).await;
    app.nodes.set_starred(owner, &[doc.id], true).await.unwrap();
    let before = app.nodes.get(owner, doc.id).await.unwrap();

    assert_eq!(app.nodes.soft_delete(owner, &[root.id]).await.unwrap(), 3);
    assert_eq!(
        app.nodes.get(owner, doc.id).await.unwrap_err().kind,
        ErrorKind::NotFound
    );
    assert!(
        app.nodes
            .list_children(owner, None, SortOrder::default())
            .await
            .unwrap()
            .is_empty()
    );

    assert_eq!(app.nodes.restore(owner, &[root.id]).await.unwrap(), 3);
    let after = app.nodes.get(owner, doc.id).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_separately_trashed_child_keeps_its_stamp() {
    let app = helpers::TestApp::new().await;
    let owner = Uuid::new_v4();
    let parent = app.folder(owner, "Parent", None).await;
    let child = app.folder(owner, "Child", Some(parent.id)).await;

    app.nodes.soft_delete(owner, &[child.id]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    app.nodes.soft_delete(owner, &[parent.id]).await.unwrap();

    let trash = app.nodes.list_trash(owner).await.unwrap();
    assert_eq!(names(&trash), vec!["Parent", "Child"]);

    app.nodes.restore(owner, &[parent.id]).await.unwrap();
    let trash = app.nodes.list_trash(owner).await.unwrap();
    assert_eq!(names(&trash), vec!["Child"]);
    assert!(
        app.nodes
            .list_children(owner, Some(parent.id), SortOrder::default())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_move_nodes_between_folders() {
    let app = helpers::TestApp::new().await;
    let owner = Uuid::new_v4();
    let inbox = app.folder(owner, "Inbox", None).await;
    let archive = app.folder(owner, "Archive", None).await;
    let a = app.file(owner, "a", b"a", Some(inbox.id)).await;
    let b = app.file(owner, "b", b"b", Some(inbox.id)).await;
    let foreign = app.file(Uuid::new_v4(), "x", b"x", None).await;

    let moved = app
        .nodes
        .move_nodes(owner, &[a.id, b.id, foreign.id], Some(archive.id))
        .await
        .unwrap();
    assert_eq!(moved.len(), 2);

    let order = SortOrder::new(SortBy::Name, SortDirection::Asc);
    assert!(
        app.nodes
            .list_children(owner, Some(inbox.id), order)
            .await
            .unwrap()
            .is_empty()
    );
    let archived = app
        .nodes
        .list_children(owner, Some(archive.id), order)
        .await
        .unwrap();
    assert_eq!(names(&archived), vec!["a", "b"]);

    app.nodes.move_nodes(owner, &[a.id], None).await.unwrap();
    assert_eq!(app.nodes.get(owner, a.id).await.unwrap().parent_id, None);
}

#[tokio::test]
async fn test_copy_is_deep_and_independent() {
    let app = helpers::TestApp::new().await;
    let owner = Uuid::new_v4();
    let src = app.folder(owner, "Src", None).await;
    let nested = app.folder(owner, "Nested", Some(src.id)).await;
    let file = app.file(owner, "data.bin", b"payload", Some(nested.id)).await;
    let dest = app.folder(owner, "Dest", None).await;

    let copies = app.nodes.copy_nodes(owner, &[src.id], Some(dest.id)).await.unwrap();
    assert_eq!(copies.len(), 1);
    let copied_src = &copies[0];
    assert_eq!(copied_src.parent_id, Some(dest.id));

    let copied_nested = app
        .nodes
        .list_children(owner, Some(copied_src.id), SortOrder::default())
        .await
        .unwrap();
    assert_eq!(names(&copied_nested), vec!["Nested"]);
    let copied_files = app
        .nodes
        .list_children(owner, Some(copied_nested[0].id), SortOrder::default())
        .await
        .unwrap();
    assert_eq!(copied_files.len(), 1);
    let copied_file = &copied_files[0];
    assert_eq!(
        copied_file.storage_ref.as_deref(),
        Some(format!("{owner}/{}", copied_file.id).as_str())
    );

    // Deleting the original leaves the copy readable.
    app.nodes.permanently_delete(owner, &[src.id]).await.unwrap();
    let original_ref = file.storage_ref.clone().unwrap();
    assert!(!app.blobs.exists(&original_ref).await.unwrap());
    let content = app.nodes.read_content(owner, copied_file.id).await.unwrap();
    assert_eq!(&content[..], b"payload");
}

#[tokio::test]
async fn test_failed_copy_removes_copied_blobs() {
    let store = MemoryMetadataStore::new();
    let faulty = Arc::new(FaultyNodes::new(store.clone()));
    let blobs = Arc::new(MemoryBlobStore::new());
    let app = helpers::TestApp::build(store.clone(), faulty.clone(), Arc::new(store), blobs.clone()).await;
    let owner = Uuid::new_v4();
    let src = app.folder(owner, "Src", None).await;
    app.file(owner, "one", b"1", Some(src.id)).await;
    app.file(owner, "two", b"2", Some(src.id)).await;
    assert_eq!(blobs.len(), 2);

    faulty.fail_insert_many.store(true, Ordering::SeqCst);
    let err = app.nodes.copy_nodes(owner, &[src.id], None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::TransientStore);
    assert_eq!(blobs.len(), 2);
    let top = app
        .nodes
        .list_children(owner, None, SortOrder::default())
        .await
        .unwrap();
    assert_eq!(top.len(), 1);
}

#[tokio::test]
async fn test_local_blob_store_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_string_lossy().to_string();
    let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(&root).await.unwrap());
    let store = MemoryMetadataStore::new();
    let repo = Arc::new(store.clone());
    let app = helpers::TestApp::build(store, repo.clone(), repo, blobs).await;
    let owner = Uuid::new_v4();

    let file = app.file(owner, "notes.md", b"# notes", None).await;
    let storage_ref = file.storage_ref.clone().unwrap();
    assert!(app.blobs.exists(&storage_ref).await.unwrap());

    let copies = app.nodes.copy_nodes(owner, &[file.id], None).await.unwrap();
    let copy_ref = copies[0].storage_ref.clone().unwrap();
    assert_eq!(&app.blobs.read_bytes(&copy_ref).await.unwrap()[..], b"# notes");

    app.nodes.permanently_delete(owner, &[file.id, copies[0].id]).await.unwrap();
    assert!(!app.blobs.exists(&storage_ref).await.unwrap());
    assert!(!app.blobs.exists(&copy_ref).await.unwrap());
}

#[tokio::test]
async fn test_recursive_ids_include_trashed_descendants() {
    let app = helpers::TestApp::new().await;
    let owner = Uuid::new_v4();
    let root = app.folder(owner, "Root", None).await;
    let gone = app.folder(owner, "Gone", Some(root.id)).await;
    let kept = app.file(owner, "kept", b"k", Some(root.id)).await;
    app.nodes.soft_delete(owner, &[gone.id]).await.unwrap();

    let mut ids = app.nodes.recursive_ids(owner, &[root.id]).await.unwrap();
    ids.sort();
    let mut expected = vec![root.id, gone.id, kept.id];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_names_are_validated() {
    let app = helpers::TestApp::new().await;
    let owner = Uuid::new_v4();
    for bad in ["", "   ", "a/b"] {
        let err = app.nodes.create_folder(owner, bad, None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation, "name {bad:?}");
    }
    let folder = app.folder(owner, "  Padded  ", None).await;
    assert_eq!(folder.name, "Padded");
}

#[tokio::test]
async fn test_rename_shows_in_listing() {
    let app = helpers::TestApp::new().await;
    let owner = Uuid::new_v4();
    let folder = app.folder(owner, "Draft", None).await;
    let before = app.nodes.list_children(owner, None, Default::default()).await.unwrap();
    assert_eq!(before[0].name, "Draft");

    let renamed = app.nodes.rename(owner, folder.id, " Final ").await.unwrap();
    assert_eq!(renamed.name, "Final");

    let after = app.nodes.list_children(owner, None, Default::default()).await.unwrap();
    assert_eq!(after[0].name, "Final");
    assert_eq!(
        app.nodes.rename(owner, folder.id, "bad/name").await.unwrap_err().kind,
        ErrorKind::Validation
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_listing_read_before_create_is_not_cached() {
    let store = MemoryMetadataStore::new();
    let gated = Arc::new(FaultyNodes::new(store.clone()));
    let app = Arc::new(
        helpers::TestApp::build(
            store.clone(),
            gated.clone(),
            Arc::new(store),
            Arc::new(MemoryBlobStore::new()),
        )
        .await,
    );
    let owner = Uuid::new_v4();

    gated.list_gate.arm();
    let reader = {
        let app = Arc::clone(&app);
        tokio::spawn(async move { app.nodes.list_children(owner, None, Default::default()).await })
    };
    gated.list_gate.reached().await;

    app.folder(owner, "New", None).await;
    gated.list_gate.release();
    assert!(reader.await.unwrap().unwrap().is_empty());

    let listing = app.nodes.list_children(owner, None, Default::default()).await.unwrap();
    assert_eq!(names(&listing), ["New"]);
}
