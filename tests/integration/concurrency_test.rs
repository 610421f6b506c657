//! Integration tests for concurrent mutations of one owner's tree.

mod helpers;

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use uuid::Uuid;

use drivehub_core::ErrorKind;
use drivehub_database::{ShareRepository, ShareWrite};
use drivehub_entity::share::ShareLink;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_shares_create_one_link() {
    let app = Arc::new(helpers::TestApp::new().await);
    let owner = Uuid::new_v4();
    let folder = app.folder(owner, "Shared", None).await.id;
    app.file(owner, "a.txt", b"a", Some(folder)).await;

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let app = Arc::clone(&app);
            tokio::spawn(async move { app.shares.create_or_extend(owner, folder, None).await })
        })
        .collect();

    let mut tokens = Vec::new();
    for handle in join_all(handles).await {
        tokens.push(handle.unwrap().unwrap().token);
    }
    tokens.dedup();
    assert_eq!(tokens.len(), 1);
    assert_eq!(app.store.link_count().await, 1);
    assert_eq!(app.store.membership_count().await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_crossing_moves_never_form_a_cycle() {
    let app = Arc::new(helpers::TestApp::new().await);
    let owner = Uuid::new_v4();
    let a = app.folder(owner, "A", None).await.id;
    let b = app.folder(owner, "B", None).await.id;

    let first = {
        let app = Arc::clone(&app);
        tokio::spawn(async move { app.nodes.move_nodes(owner, &[a], Some(b)).await })
    };
    let second = {
        let app = Arc::clone(&app);
        tokio::spawn(async move { app.nodes.move_nodes(owner, &[b], Some(a)).await })
    };
    let results = [first.await.unwrap(), second.await.unwrap()];

    let failures: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, ErrorKind::InvalidParent);

    // Exactly one of the two folders is still at the top level.
    let top = app.nodes.list_children(owner, None, Default::default()).await.unwrap();
    assert_eq!(top.len(), 1);
    let nested = if top[0].id == a { b } else { a };
    let path = app.nodes.breadcrumbs(owner, nested).await.unwrap();
    assert_eq!(path.len(), 2);
    assert_eq!(path[0].id, top[0].id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_only_one_admin_claim_wins() {
    let app = Arc::new(helpers::TestApp::new().await);
    let users: Vec<Uuid> = (0..20).map(|_| Uuid::new_v4()).collect();

    let handles: Vec<_> = users
        .iter()
        .map(|user| {
            let app = Arc::clone(&app);
            let user = *user;
            tokio::spawn(async move { app.settings.claim_admin(user).await })
        })
        .collect();

    let winners = join_all(handles)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(true))))
        .count();
    assert_eq!(winners, 1);

    let settings = app.settings.settings().await.unwrap();
    assert!(settings.admin_user_id.is_some_and(|id| users.contains(&id)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sweep_racing_extend_leaves_one_live_link() {
    let app = Arc::new(helpers::TestApp::new().await);
    let owner = Uuid::new_v4();
    let folder = app.folder(owner, "Folder", None).await.id;
    app.store
        .commit_shares(&[ShareWrite::Create {
            link: ShareLink {
                token: "stale".into(),
                root_file_id: folder,
                owner_id: owner,
                expires_at: Some(Utc::now() - chrono::Duration::minutes(5)),
                created_at: Utc::now() - chrono::Duration::days(1),
            },
            members: vec![folder],
        }])
        .await
        .unwrap();

    let sweep = {
        let app = Arc::clone(&app);
        tokio::spawn(async move { app.shares.sweep_expired().await })
    };
    let extend = {
        let app = Arc::clone(&app);
        tokio::spawn(async move { app.shares.create_or_extend(owner, folder, None).await })
    };
    sweep.await.unwrap().unwrap();
    let link = extend.await.unwrap().unwrap();

    assert_eq!(app.store.link_count().await, 1);
    let current = app.store.find_by_root(owner, folder).await.unwrap().unwrap();
    assert_eq!(current.token, link.token);
    assert!(!current.is_expired());
    assert!(app.access.is_member(&link.token, folder).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_uploads_all_land() {
    let app = Arc::new(helpers::TestApp::new().await);
    let owner = Uuid::new_v4();
    let folder = app.folder(owner, "Inbox", None).await.id;

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let app = Arc::clone(&app);
            tokio::spawn(async move {
                app.nodes
                    .upload(
                        owner,
                        &format!("file-{i:02}.bin"),
                        None,
                        bytes::Bytes::from(vec![i as u8; 8]),
                        Some(folder),
                    )
                    .await
            })
        })
        .collect();
    for handle in join_all(handles).await {
        handle.unwrap().unwrap();
    }

    let children = app
        .nodes
        .list_children(owner, Some(folder), Default::default())
        .await
        .unwrap();
    assert_eq!(children.len(), 16);
    let content = app.nodes.read_content(owner, children[3].id).await.unwrap();
    assert_eq!(content.len(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_trash_and_share_of_same_folder_stay_consistent() {
    let app = Arc::new(helpers::TestApp::new().await);
    let owner = Uuid::new_v4();
    let folder = app.folder(owner, "Racy", None).await.id;
    app.file(owner, "x", b"x", Some(folder)).await;

    let trash = {
        let app = Arc::clone(&app);
        tokio::spawn(async move { app.nodes.soft_delete(owner, &[folder]).await })
    };
    let share = {
        let app = Arc::clone(&app);
        tokio::spawn(async move { app.shares.create_or_extend(owner, folder, None).await })
    };
    assert_eq!(trash.await.unwrap().unwrap(), 2);

    match share.await.unwrap() {
        // Shared first: the link survives but its root is trashed.
        Ok(link) => assert_eq!(
            app.access.resolve(&link.token).await.unwrap_err().kind,
            ErrorKind::NotFound
        ),
        // Trashed first: sharing a trashed node fails.
        Err(e) => {
            assert_eq!(e.kind, ErrorKind::NotFound);
            assert_eq!(app.store.link_count().await, 0);
        }
    }
}
