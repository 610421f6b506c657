//! Token-based read access to shared content.
//!
//! Nothing here takes an operation lock. Every read checks the link's
//! expiry, the node's membership in the link, and that the node is not
//! in the trash.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use drivehub_cache::{CacheLayer, keys};
use drivehub_core::error::AppError;
use drivehub_core::result::AppResult;
use drivehub_core::types::{SortBy, SortDirection, SortOrder};
use drivehub_database::{NodeRepository, ShareRepository};
use drivehub_entity::file::FileNode;
use drivehub_entity::share::{ArchiveEntry, ShareLink, ShareResolution};

use crate::node::TreeWalker;
use crate::retry::read_retry;

/// Serves shared content to holders of a token.
#[derive(Debug, Clone)]
pub struct AccessService {
    /// Node repository.
    nodes: Arc<dyn NodeRepository>,
    /// Share repository.
    shares: Arc<dyn ShareRepository>,
    /// Token and listing cache.
    cache: CacheLayer,
    /// Subtree walks.
    tree: TreeWalker,
    /// TTL for cached shared-folder listings.
    listing_ttl: Duration,
}

impl AccessService {
    /// Creates a new access service.
    pub fn new(
        nodes: Arc<dyn NodeRepository>,
        shares: Arc<dyn ShareRepository>,
        cache: CacheLayer,
        listing_ttl: Duration,
    ) -> Self {
        let tree = TreeWalker::new(nodes.clone());
        Self {
            nodes,
            shares,
            cache,
            tree,
            listing_ttl,
        }
    }

    /// Resolve a token to its link and root node.
    ///
    /// Unknown tokens and links whose root is gone or trashed fail with
    /// `NotFound`; an expired link resolves to
    /// [`ShareResolution::Expired`].
    pub async fn resolve(&self, token: &str) -> AppResult<ShareResolution> {
        let link = self.lookup(token).await?;
        if link.is_expired() {
            return Ok(ShareResolution::Expired { token: link.token });
        }
        let node = self.visible(&link, link.root_file_id).await?;
        Ok(ShareResolution::Active { link, node })
    }

    /// Whether `file_id` belongs to the link `token`.
    pub async fn is_member(&self, token: &str, file_id: Uuid) -> AppResult<bool> {
        read_retry("check membership", || self.shares.is_member(token, file_id)).await
    }

    /// A single shared node.
    pub async fn shared_node(&self, token: &str, file_id: Uuid) -> AppResult<FileNode> {
        let link = self.active_link(token).await?;
        self.member_node(&link, file_id).await
    }

    /// Children of a shared folder that belong to the link, by name.
    pub async fn list_shared_folder(&self, token: &str, folder_id: Uuid) -> AppResult<Vec<FileNode>> {
        let ticket = self.cache.ticket().await;
        let link = self.active_link(token).await?;
        let key = keys::shared_listing(link.owner_id, token, folder_id);
        if let Some(cached) = self.cache.get::<Vec<FileNode>>(&key).await {
            return Ok(cached);
        }

        let folder = self.member_node(&link, folder_id).await?;
        if !folder.is_folder() {
            return Err(AppError::not_found(format!("Folder {folder_id} not found")));
        }
        let members = self.members(token).await?;
        let order = SortOrder::new(SortBy::Name, SortDirection::Asc);
        let children: Vec<FileNode> = read_retry("list children", || {
            self.nodes.list_children(link.owner_id, Some(folder_id), order)
        })
        .await?
        .into_iter()
        .filter(|n| members.contains(&n.id))
        .collect();

        self.cache
            .put_bounded(ticket, &key, &children, self.listing_ttl, link.expires_at)
            .await;
        Ok(children)
    }

    /// The shared subtree under `root_id`, parent first.
    ///
    /// A node is included only if it and every node between it and
    /// `root_id` are untrashed members of the link.
    pub async fn subtree(&self, token: &str, root_id: Uuid) -> AppResult<Vec<FileNode>> {
        let link = self.active_link(token).await?;
        let root = self.member_node(&link, root_id).await?;
        let members = self.members(token).await?;
        let closure = self.tree.closure(link.owner_id, &[root.id]).await?;

        let mut kept = HashSet::new();
        let mut out = Vec::new();
        for node in closure.nodes {
            let reachable =
                node.id == root.id || node.parent_id.is_some_and(|p| kept.contains(&p));
            if reachable && !node.is_trashed() && members.contains(&node.id) {
                kept.insert(node.id);
                out.push(node);
            }
        }
        Ok(out)
    }

    /// Blob references and archive paths for downloading `root_id` as one
    /// archive. Paths start with the root's own name.
    pub async fn archive_entries(&self, token: &str, root_id: Uuid) -> AppResult<Vec<ArchiveEntry>> {
        let nodes = self.subtree(token, root_id).await?;
        let mut paths: HashMap<Uuid, String> = HashMap::new();
        let mut entries = Vec::new();

        for node in &nodes {
            let path = match node.parent_id.and_then(|p| paths.get(&p)) {
                Some(parent_path) if node.id != root_id => format!("{parent_path}/{}", node.name),
                _ => node.name.clone(),
            };
            if let Some(storage_ref) = &node.storage_ref {
                entries.push(ArchiveEntry {
                    storage_ref: storage_ref.clone(),
                    relative_name: path.clone(),
                });
            }
            paths.insert(node.id, path);
        }

        Ok(entries)
    }

    async fn lookup(&self, token: &str) -> AppResult<ShareLink> {
        let key = keys::share_by_token(token);
        let ticket = self.cache.ticket().await;
        if let Some(link) = self.cache.get::<ShareLink>(&key).await {
            return Ok(link);
        }
        let link = read_retry("find link", || self.shares.find_by_token(token))
            .await?
            .ok_or_else(|| AppError::not_found("Share link not found"))?;
        self.cache
            .put_bounded(ticket, &key, &link, self.cache.default_ttl(), link.expires_at)
            .await;
        Ok(link)
    }

    async fn active_link(&self, token: &str) -> AppResult<ShareLink> {
        let link = self.lookup(token).await?;
        if link.is_expired() {
            return Err(AppError::expired("Share link has expired"));
        }
        Ok(link)
    }

    async fn member_node(&self, link: &ShareLink, file_id: Uuid) -> AppResult<FileNode> {
        if !self.is_member(&link.token, file_id).await? {
            return Err(AppError::not_found(format!("Node {file_id} not found")));
        }
        self.visible(link, file_id).await
    }

    async fn visible(&self, link: &ShareLink, file_id: Uuid) -> AppResult<FileNode> {
        match read_retry("find node", || self.nodes.find_by_id(file_id)).await? {
            Some(node) if node.owner_id == link.owner_id && !node.is_trashed() => Ok(node),
            _ => Err(AppError::not_found(format!("Node {file_id} not found"))),
        }
    }

    async fn members(&self, token: &str) -> AppResult<HashSet<Uuid>> {
        Ok(read_retry("find members", || self.shares.member_ids(token))
            .await?
            .into_iter()
            .collect())
    }
}
