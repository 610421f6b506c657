//! Share link registry: create, extend, re-expire, revoke and sweep links.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use drivehub_cache::{CacheLayer, keys};
use drivehub_core::error::AppError;
use drivehub_core::events::{AuditAction, AuditEvent};
use drivehub_core::result::AppResult;
use drivehub_core::traits::audit::AuditSink;
use drivehub_core::types::LockKey;
use drivehub_database::{NodeRepository, ShareRepository, ShareWrite};
use drivehub_entity::file::FileNode;
use drivehub_entity::share::ShareLink;

use crate::invalidate;
use crate::lock::OperationSerializer;
use crate::node::TreeWalker;
use crate::retry::read_retry;
use crate::time::now;

use super::token::TokenGenerator;

/// Owner-side management of share links.
///
/// There is at most one link per (root, owner). Sharing a root again
/// extends the existing link with any descendants added since.
#[derive(Debug, Clone)]
pub struct ShareService {
    /// Node repository.
    nodes: Arc<dyn NodeRepository>,
    /// Share repository.
    shares: Arc<dyn ShareRepository>,
    /// Link cache.
    cache: CacheLayer,
    /// Per-owner operation locks.
    locks: Arc<OperationSerializer>,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Closure and ancestor walks.
    tree: TreeWalker,
    /// Token source.
    tokens: TokenGenerator,
}

impl ShareService {
    /// Creates a new share service.
    pub fn new(
        nodes: Arc<dyn NodeRepository>,
        shares: Arc<dyn ShareRepository>,
        cache: CacheLayer,
        locks: Arc<OperationSerializer>,
        audit: Arc<dyn AuditSink>,
        tokens: TokenGenerator,
    ) -> Self {
        let tree = TreeWalker::new(nodes.clone());
        Self {
            nodes,
            shares,
            cache,
            locks,
            audit,
            tree,
            tokens,
        }
    }

    /// Share `root_id`, or extend its existing link.
    ///
    /// An explicit `expires_at` replaces the link's expiry. Without one the
    /// expiry is kept, unless the link has already expired, in which case
    /// it is revived without an expiry.
    pub async fn create_or_extend(
        &self,
        owner_id: Uuid,
        root_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<ShareLink> {
        let stamp = now();
        validate_expiry(expires_at, stamp)?;
        let _guard = self.locks.acquire(LockKey::User(owner_id)).await;

        let root = self.live_node(owner_id, root_id).await?;
        let (write, link) = self.plan(owner_id, &root, expires_at, stamp).await?;
        self.shares.commit_shares(std::slice::from_ref(&write)).await?;
        self.after_commit(owner_id, std::slice::from_ref(&link)).await;
        self.record(owner_id, &write, &link);

        Ok(link)
    }

    /// Share several roots in one atomic commit.
    ///
    /// If any root is unknown, trashed or foreign, nothing is shared.
    pub async fn share_many(
        &self,
        owner_id: Uuid,
        root_ids: &[Uuid],
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<ShareLink>> {
        let stamp = now();
        validate_expiry(expires_at, stamp)?;
        let _guard = self.locks.acquire(LockKey::User(owner_id)).await;

        let mut seen = HashSet::new();
        let mut writes = Vec::new();
        let mut links = Vec::new();
        for root_id in root_ids.iter().filter(|id| seen.insert(**id)) {
            let root = self.live_node(owner_id, *root_id).await?;
            let (write, link) = self.plan(owner_id, &root, expires_at, stamp).await?;
            writes.push(write);
            links.push(link);
        }
        if writes.is_empty() {
            return Ok(Vec::new());
        }

        self.shares.commit_shares(&writes).await?;
        self.after_commit(owner_id, &links).await;
        for (write, link) in writes.iter().zip(&links) {
            self.record(owner_id, write, link);
        }

        Ok(links)
    }

    /// Add `node_id`'s subtree to the live link of its nearest shared
    /// ancestor. Fails with `NotFound` if no ancestor has a live link.
    pub async fn link_to_parent_share(&self, owner_id: Uuid, node_id: Uuid) -> AppResult<ShareLink> {
        let _guard = self.locks.acquire(LockKey::User(owner_id)).await;
        let node = self.live_node(owner_id, node_id).await?;
        let ancestors = self.tree.ancestors(&node).await?;
        let ancestor_ids: Vec<Uuid> = ancestors.iter().map(|a| a.id).collect();

        let stamp = now();
        let by_root: HashMap<Uuid, ShareLink> =
            read_retry("find ancestor links", || self.shares.find_by_roots(owner_id, &ancestor_ids))
                .await?
                .into_iter()
                .map(|l| (l.root_file_id, l))
                .collect();
        let link = ancestor_ids
            .iter()
            .filter_map(|id| by_root.get(id))
            .find(|l| !l.is_expired_at(stamp))
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("No shared folder above {node_id}")))?;

        let members = self.new_members(owner_id, node.id, &link.token).await?;
        let write = ShareWrite::Extend {
            token: link.token.clone(),
            members,
            expires_at: link.expires_at,
        };
        self.shares.commit_shares(std::slice::from_ref(&write)).await?;
        self.after_commit(owner_id, std::slice::from_ref(&link)).await;
        self.record(owner_id, &write, &link);

        Ok(link)
    }

    /// Change the expiry of the link rooted at `root_id`. `None` makes it
    /// never expire.
    pub async fn update_expiry(
        &self,
        owner_id: Uuid,
        root_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<ShareLink> {
        validate_expiry(expires_at, now())?;
        let _guard = self.locks.acquire(LockKey::User(owner_id)).await;

        let existing = self.link_for_root(owner_id, root_id).await?;
        self.shares
            .commit_shares(&[ShareWrite::Extend {
                token: existing.token.clone(),
                members: Vec::new(),
                expires_at,
            }])
            .await?;
        let link = ShareLink {
            expires_at,
            ..existing
        };
        self.after_commit(owner_id, std::slice::from_ref(&link)).await;

        info!(owner_id = %owner_id, root_id = %root_id, expires_at = ?expires_at, "Share expiry updated");
        self.audit.record(
            AuditEvent::success(AuditAction::ShareExpiryUpdated, link.token.clone())
                .by(owner_id)
                .with_metadata(serde_json::json!({ "expires_at": expires_at })),
        );
        Ok(link)
    }

    /// Delete the link rooted at `root_id` with all its memberships.
    pub async fn revoke(&self, owner_id: Uuid, root_id: Uuid) -> AppResult<()> {
        let _guard = self.locks.acquire(LockKey::User(owner_id)).await;
        let link = self.link_for_root(owner_id, root_id).await?;
        let released = self
            .shares
            .delete_links(std::slice::from_ref(&link.token))
            .await?;
        self.after_commit(owner_id, std::slice::from_ref(&link)).await;

        info!(owner_id = %owner_id, root_id = %root_id, released = released.len(), "Share revoked");
        self.audit.record(
            AuditEvent::success(AuditAction::ShareRevoked, link.token)
                .by(owner_id)
                .with_metadata(serde_json::json!({ "released": released.len() })),
        );
        Ok(())
    }

    /// All links owned by `owner_id`, expired ones included.
    pub async fn list_links(&self, owner_id: Uuid) -> AppResult<Vec<ShareLink>> {
        read_retry("list links", || self.shares.list_by_owner(owner_id)).await
    }

    /// The link rooted at each of `file_ids`, where one exists.
    ///
    /// Answers from the cache where possible and loads every miss in a
    /// single query. Files without a link are cached as such too.
    pub async fn links_for_files(
        &self,
        owner_id: Uuid,
        file_ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, ShareLink>> {
        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = file_ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        let cache_keys: Vec<String> = ids
            .iter()
            .map(|id| keys::share_for_root(owner_id, *id))
            .collect();
        let ticket = self.cache.ticket().await;
        let cached: Vec<Option<Option<ShareLink>>> = self.cache.get_many(&cache_keys).await;

        let mut result = HashMap::new();
        let mut missing = Vec::new();
        for (id, hit) in ids.iter().zip(cached) {
            match hit {
                Some(Some(link)) => {
                    result.insert(*id, link);
                }
                Some(None) => {}
                None => missing.push(*id),
            }
        }
        if missing.is_empty() {
            return Ok(result);
        }

        let mut loaded: HashMap<Uuid, ShareLink> =
            read_retry("find links", || self.shares.find_by_roots(owner_id, &missing))
                .await?
                .into_iter()
                .map(|l| (l.root_file_id, l))
                .collect();
        for id in missing {
            let key = keys::share_for_root(owner_id, id);
            match loaded.remove(&id) {
                Some(link) => {
                    self.cache
                        .put_bounded(
                            ticket,
                            &key,
                            &Some(&link),
                            self.cache.default_ttl(),
                            link.expires_at,
                        )
                        .await;
                    result.insert(id, link);
                }
                None => {
                    self.cache.put(ticket, &key, &None::<ShareLink>).await;
                }
            }
        }

        Ok(result)
    }

    /// Delete every link whose expiry has passed. Returns the number of
    /// links removed.
    pub async fn sweep_expired(&self) -> AppResult<u64> {
        let stamp = now();
        let expired = read_retry("find expired links", || self.shares.find_expired(stamp)).await?;
        let mut by_owner: HashMap<Uuid, Vec<ShareLink>> = HashMap::new();
        for link in expired {
            by_owner.entry(link.owner_id).or_default().push(link);
        }

        let mut swept = 0;
        for (owner_id, links) in by_owner {
            match self.sweep_owner(owner_id, links, stamp).await {
                Ok(count) => swept += count,
                Err(e) => warn!(owner_id = %owner_id, error = %e, "Failed to sweep expired shares"),
            }
        }

        if swept > 0 {
            info!(swept, "Expired shares swept");
            self.audit.record(
                AuditEvent::success(AuditAction::SharesSwept, "share_links")
                    .with_metadata(serde_json::json!({ "links": swept })),
            );
        }
        Ok(swept)
    }

    async fn sweep_owner(
        &self,
        owner_id: Uuid,
        candidates: Vec<ShareLink>,
        stamp: DateTime<Utc>,
    ) -> AppResult<u64> {
        let _guard = self.locks.acquire(LockKey::User(owner_id)).await;
        // Re-read under the lock: a link may have been extended meanwhile.
        let mut due = Vec::new();
        for candidate in candidates {
            if let Some(current) = self.shares.find_by_token(&candidate.token).await? {
                if current.is_expired_at(stamp) {
                    due.push(current);
                }
            }
        }
        if due.is_empty() {
            return Ok(0);
        }

        let tokens: Vec<String> = due.iter().map(|l| l.token.clone()).collect();
        self.shares.delete_links(&tokens).await?;
        self.after_commit(owner_id, &due).await;
        Ok(due.len() as u64)
    }

    /// Build the write that shares `root`, and the link as it will be
    /// after the write commits.
    async fn plan(
        &self,
        owner_id: Uuid,
        root: &FileNode,
        expires_at: Option<DateTime<Utc>>,
        stamp: DateTime<Utc>,
    ) -> AppResult<(ShareWrite, ShareLink)> {
        let existing =
            read_retry("find link", || self.shares.find_by_root(owner_id, root.id)).await?;
        match existing {
            None => {
                let members = self.tree.closure(owner_id, &[root.id]).await?.ids();
                let link = ShareLink {
                    token: self.tokens.generate(),
                    root_file_id: root.id,
                    owner_id,
                    expires_at,
                    created_at: stamp,
                };
                Ok((
                    ShareWrite::Create {
                        link: link.clone(),
                        members,
                    },
                    link,
                ))
            }
            Some(existing) => {
                let members = self.new_members(owner_id, root.id, &existing.token).await?;
                let expires_at = match expires_at {
                    Some(at) => Some(at),
                    None if existing.is_expired_at(stamp) => None,
                    None => existing.expires_at,
                };
                let write = ShareWrite::Extend {
                    token: existing.token.clone(),
                    members,
                    expires_at,
                };
                Ok((
                    write,
                    ShareLink {
                        expires_at,
                        ..existing
                    },
                ))
            }
        }
    }

    /// Nodes under `root_id` not yet members of `token`.
    async fn new_members(&self, owner_id: Uuid, root_id: Uuid, token: &str) -> AppResult<Vec<Uuid>> {
        let closure = self.tree.closure(owner_id, &[root_id]).await?;
        let current: HashSet<Uuid> = read_retry("find members", || self.shares.member_ids(token))
            .await?
            .into_iter()
            .collect();
        Ok(closure
            .ids()
            .into_iter()
            .filter(|id| !current.contains(id))
            .collect())
    }

    async fn live_node(&self, owner_id: Uuid, id: Uuid) -> AppResult<FileNode> {
        match read_retry("find node", || self.nodes.find_by_id(id)).await? {
            Some(node) if node.owner_id == owner_id && !node.is_trashed() => Ok(node),
            _ => Err(AppError::not_found(format!("Node {id} not found"))),
        }
    }

    async fn link_for_root(&self, owner_id: Uuid, root_id: Uuid) -> AppResult<ShareLink> {
        read_retry("find link", || self.shares.find_by_root(owner_id, root_id))
            .await?
            .ok_or_else(|| AppError::not_found(format!("No share link for {root_id}")))
    }

    async fn after_commit(&self, owner_id: Uuid, links: &[ShareLink]) {
        invalidate::links(&self.cache, links).await;
        invalidate::owner_views(&self.cache, owner_id).await;
    }

    fn record(&self, owner_id: Uuid, write: &ShareWrite, link: &ShareLink) {
        let (action, added) = match write {
            ShareWrite::Create { members, .. } => (AuditAction::ShareCreated, members.len()),
            ShareWrite::Extend { members, .. } => (AuditAction::ShareExtended, members.len()),
        };
        info!(
            owner_id = %owner_id,
            root_id = %link.root_file_id,
            action = ?action,
            added,
            "Share committed"
        );
        self.audit.record(
            AuditEvent::success(action, link.token.clone())
                .by(owner_id)
                .with_metadata(serde_json::json!({
                    "root_file_id": link.root_file_id,
                    "added": added,
                    "expires_at": link.expires_at,
                })),
        );
    }
}

fn validate_expiry(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> AppResult<()> {
    match expires_at {
        Some(at) if at <= now => Err(AppError::validation("Expiry must be in the future")),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use chrono::Duration;

    use drivehub_core::ErrorKind;

    use crate::testing::Harness;

    use super::*;

    #[tokio::test]
    async fn test_create_then_extend_reuses_link() {
        let h = Harness::new().await;
        let owner = Uuid::new_v4();
        let folder = h.nodes.create_folder(owner, "Shared", None).await.unwrap();

        let first = h.shares.create_or_extend(owner, folder.id, None).await.unwrap();
        let added = h
            .nodes
            .upload(owner, "late", None, Bytes::from_static(b"l"), Some(folder.id))
            .await
            .unwrap();
        assert!(!h.store.is_member(&first.token, added.id).await.unwrap());

        let second = h.shares.create_or_extend(owner, folder.id, None).await.unwrap();
        assert_eq!(first.token, second.token);
        assert!(h.store.is_member(&first.token, added.id).await.unwrap());
        assert_eq!(h.store.link_count().await, 1);
    }

    #[tokio::test]
    async fn test_expiry_rules_on_extend() {
        let h = Harness::new().await;
        let owner = Uuid::new_v4();
        let folder = h.nodes.create_folder(owner, "F", None).await.unwrap();
        let later = Utc::now() + Duration::hours(1);

        let link = h.shares.create_or_extend(owner, folder.id, Some(later)).await.unwrap();
        assert_eq!(link.expires_at, Some(later));

        let kept = h.shares.create_or_extend(owner, folder.id, None).await.unwrap();
        assert_eq!(kept.expires_at, Some(later));

        let err = h
            .shares
            .create_or_extend(owner, folder.id, Some(Utc::now() - Duration::seconds(5)))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_share_many_is_all_or_nothing() {
        let h = Harness::new().await;
        let owner = Uuid::new_v4();
        let a = h.nodes.create_folder(owner, "A", None).await.unwrap();
        let foreign = h.nodes.create_folder(Uuid::new_v4(), "B", None).await.unwrap();

        let err = h
            .shares
            .share_many(owner, &[a.id, foreign.id], None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(h.store.link_count().await, 0);

        let links = h.shares.share_many(owner, &[a.id, a.id], None).await.unwrap();
        assert_eq!(links.len(), 1);
    }

    #[tokio::test]
    async fn test_link_to_parent_share() {
        let h = Harness::new().await;
        let owner = Uuid::new_v4();
        let top = h.nodes.create_folder(owner, "Top", None).await.unwrap();
        let link = h.shares.create_or_extend(owner, top.id, None).await.unwrap();
        let sub = h.nodes.create_folder(owner, "Sub", Some(top.id)).await.unwrap();

        let joined = h.shares.link_to_parent_share(owner, sub.id).await.unwrap();
        assert_eq!(joined.token, link.token);
        assert!(h.store.is_member(&link.token, sub.id).await.unwrap());

        let loose = h.nodes.create_folder(owner, "Loose", None).await.unwrap();
        let err = h.shares.link_to_parent_share(owner, loose.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_revoke_clears_shared_flag() {
        let h = Harness::new().await;
        let owner = Uuid::new_v4();
        let folder = h.nodes.create_folder(owner, "F", None).await.unwrap();
        h.shares.create_or_extend(owner, folder.id, None).await.unwrap();
        assert!(h.nodes.get(owner, folder.id).await.unwrap().shared);

        h.shares.revoke(owner, folder.id).await.unwrap();
        assert!(!h.nodes.get(owner, folder.id).await.unwrap().shared);
        assert_eq!(h.store.membership_count().await, 0);

        let err = h.shares.revoke(owner, folder.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_links_for_files_caches_hits_and_misses() {
        let h = Harness::new().await;
        let owner = Uuid::new_v4();
        let a = h.nodes.create_folder(owner, "A", None).await.unwrap();
        let b = h.nodes.create_folder(owner, "B", None).await.unwrap();
        let link = h.shares.create_or_extend(owner, a.id, None).await.unwrap();

        let found = h.shares.links_for_files(owner, &[a.id, b.id]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[&a.id].token, link.token);

        let cached: Option<Option<ShareLink>> =
            h.cache.get(&keys::share_for_root(owner, b.id)).await;
        assert_eq!(cached, Some(None));

        // Sharing b drops its negative entry.
        h.shares.create_or_extend(owner, b.id, None).await.unwrap();
        let found = h.shares.links_for_files(owner, &[a.id, b.id]).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let h = Harness::new().await;
        let owner = Uuid::new_v4();
        let a = h.nodes.create_folder(owner, "A", None).await.unwrap();
        let b = h.nodes.create_folder(owner, "B", None).await.unwrap();
        h.shares.create_or_extend(owner, b.id, None).await.unwrap();
        h.store
            .commit_shares(&[ShareWrite::Create {
                link: ShareLink {
                    token: "stale".into(),
                    root_file_id: a.id,
                    owner_id: owner,
                    expires_at: Some(Utc::now() - Duration::minutes(1)),
                    created_at: Utc::now() - Duration::hours(1),
                },
                members: vec![a.id],
            }])
            .await
            .unwrap();

        assert_eq!(h.shares.sweep_expired().await.unwrap(), 1);
        assert_eq!(h.store.link_count().await, 1);
        assert!(!h.nodes.get(owner, a.id).await.unwrap().shared);
        assert_eq!(h.audit.actions().last(), Some(&AuditAction::SharesSwept));
    }
}
