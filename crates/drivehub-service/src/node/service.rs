//! Node lifecycle: create, list, move, copy, rename, star, trash, restore
//! and permanent deletion.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use drivehub_cache::{CacheLayer, keys};
use drivehub_core::error::AppError;
use drivehub_core::events::{AuditAction, AuditEvent};
use drivehub_core::result::AppResult;
use drivehub_core::traits::audit::AuditSink;
use drivehub_core::traits::storage::BlobStore;
use drivehub_core::types::{LockKey, SortOrder};
use drivehub_database::{NodeRepository, ShareRepository};
use drivehub_entity::file::FileNode;
use drivehub_entity::share::ShareMembership;

use crate::invalidate;
use crate::lock::OperationSerializer;
use crate::retry::read_retry;
use crate::time::now;

use super::name::validate_name;
use super::tree::{Closure, TreeWalker};

/// Upper bound on search results.
pub const MAX_SEARCH_LIMIT: i64 = 200;

/// Metadata for a file whose content is already in the blob store.
#[derive(Debug, Clone)]
pub struct NewFile {
    /// Display name.
    pub name: String,
    /// Size in bytes.
    pub size: i64,
    /// MIME type, if known.
    pub mime_type: Option<String>,
    /// Blob store key of the content.
    pub storage_ref: String,
}

/// Owner-facing operations on the node tree.
///
/// Every mutation runs under the owner's [`LockKey::User`] lock and drops
/// the owner's cached listings after it commits.
#[derive(Debug, Clone)]
pub struct NodeService {
    /// Node repository.
    nodes: Arc<dyn NodeRepository>,
    /// Share repository, for membership pruning.
    shares: Arc<dyn ShareRepository>,
    /// Blob store holding file content.
    blobs: Arc<dyn BlobStore>,
    /// Listing cache.
    cache: CacheLayer,
    /// Per-owner operation locks.
    locks: Arc<OperationSerializer>,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Closure and ancestor walks.
    tree: TreeWalker,
}

impl NodeService {
    /// Creates a new node service.
    pub fn new(
        nodes: Arc<dyn NodeRepository>,
        shares: Arc<dyn ShareRepository>,
        blobs: Arc<dyn BlobStore>,
        cache: CacheLayer,
        locks: Arc<OperationSerializer>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let tree = TreeWalker::new(nodes.clone());
        Self {
            nodes,
            shares,
            blobs,
            cache,
            locks,
            audit,
            tree,
        }
    }

    /// Get an untrashed node owned by `owner_id`.
    pub async fn get(&self, owner_id: Uuid, id: Uuid) -> AppResult<FileNode> {
        match read_retry("find node", || self.nodes.find_by_id(id)).await? {
            Some(node) if node.owner_id == owner_id && !node.is_trashed() => Ok(node),
            _ => Err(AppError::not_found(format!("Node {id} not found"))),
        }
    }

    /// Untrashed children of a folder, or of the top level when
    /// `parent_id` is `None`.
    pub async fn list_children(
        &self,
        owner_id: Uuid,
        parent_id: Option<Uuid>,
        order: SortOrder,
    ) -> AppResult<Vec<FileNode>> {
        let key = keys::children(owner_id, parent_id, order);
        let ticket = self.cache.ticket().await;
        if let Some(cached) = self.cache.get::<Vec<FileNode>>(&key).await {
            return Ok(cached);
        }

        if let Some(parent_id) = parent_id {
            let parent = self.get(owner_id, parent_id).await?;
            if !parent.is_folder() {
                return Err(AppError::not_found(format!("Folder {parent_id} not found")));
            }
        }

        let children = read_retry("list children", || {
            self.nodes.list_children(owner_id, parent_id, order)
        })
        .await?;
        self.cache.put(ticket, &key, &children).await;
        Ok(children)
    }

    /// Create a folder.
    pub async fn create_folder(
        &self,
        owner_id: Uuid,
        name: &str,
        parent_id: Option<Uuid>,
    ) -> AppResult<FileNode> {
        let name = validate_name(name)?;
        let _guard = self.locks.acquire(LockKey::User(owner_id)).await;
        self.require_parent(owner_id, parent_id).await?;

        let folder = self
            .nodes
            .insert(&FileNode::folder(name, parent_id, owner_id, now()))
            .await?;
        invalidate::owner_views(&self.cache, owner_id).await;

        info!(owner_id = %owner_id, folder_id = %folder.id, "Folder created");
        Ok(folder)
    }

    /// Record a file whose content is already stored under
    /// `file.storage_ref`.
    pub async fn create_file(
        &self,
        owner_id: Uuid,
        file: NewFile,
        parent_id: Option<Uuid>,
    ) -> AppResult<FileNode> {
        let name = validate_name(&file.name)?;
        if file.size < 0 {
            return Err(AppError::validation("File size must not be negative"));
        }
        if file.storage_ref.is_empty() {
            return Err(AppError::validation("Storage reference must not be empty"));
        }
        let _guard = self.locks.acquire(LockKey::User(owner_id)).await;
        self.require_parent(owner_id, parent_id).await?;

        let node = FileNode::file(
            name,
            file.size,
            file.mime_type,
            file.storage_ref,
            parent_id,
            owner_id,
            now(),
        );
        let node = self.nodes.insert(&node).await?;
        invalidate::owner_views(&self.cache, owner_id).await;

        info!(owner_id = %owner_id, file_id = %node.id, size = node.size, "File created");
        Ok(node)
    }

    /// Store `data` in the blob store and record it as a new file.
    ///
    /// The blob is removed again if the metadata insert fails.
    pub async fn upload(
        &self,
        owner_id: Uuid,
        name: &str,
        mime_type: Option<String>,
        data: Bytes,
        parent_id: Option<Uuid>,
    ) -> AppResult<FileNode> {
        let name = validate_name(name)?;
        let _guard = self.locks.acquire(LockKey::User(owner_id)).await;
        self.require_parent(owner_id, parent_id).await?;

        let size = i64::try_from(data.len())
            .map_err(|_| AppError::validation("File is too large"))?;
        let mut node = FileNode::file(name, size, mime_type, "", parent_id, owner_id, now());
        let storage_ref = blob_key(owner_id, node.id);
        node.storage_ref = Some(storage_ref.clone());

        self.blobs.write(&storage_ref, data).await?;
        let node = match self.nodes.insert(&node).await {
            Ok(node) => node,
            Err(e) => {
                self.discard_blobs(&[storage_ref]).await;
                return Err(e);
            }
        };
        invalidate::owner_views(&self.cache, owner_id).await;

        info!(owner_id = %owner_id, file_id = %node.id, size, "File uploaded");
        Ok(node)
    }

    /// Read the content of an untrashed file.
    pub async fn read_content(&self, owner_id: Uuid, id: Uuid) -> AppResult<Bytes> {
        let node = self.get(owner_id, id).await?;
        let storage_ref = node
            .storage_ref
            .ok_or_else(|| AppError::validation(format!("Node {id} is not a file")))?;
        self.blobs.read_bytes(&storage_ref).await
    }

    /// Move nodes under `new_parent_id` (top level when `None`).
    ///
    /// Unknown, foreign and trashed ids are skipped. Memberships that no
    /// longer follow from a link rooted inside the moved subtree or above
    /// the new location are dropped. Returns the ids actually moved.
    pub async fn move_nodes(
        &self,
        owner_id: Uuid,
        ids: &[Uuid],
        new_parent_id: Option<Uuid>,
    ) -> AppResult<Vec<Uuid>> {
        let _guard = self.locks.acquire(LockKey::User(owner_id)).await;
        let parent = self.require_parent(owner_id, new_parent_id).await?;
        let live = self.live_ids(owner_id, ids).await?;
        let closure = self.tree.closure(owner_id, &live).await?;
        if closure.is_empty() {
            return Ok(Vec::new());
        }

        let target_chain = self.target_chain(parent.as_ref()).await?;
        let root_ids = closure.root_ids();
        ensure_acyclic(&closure, &target_chain)?;

        let closure_ids = closure.ids();
        let inside: HashSet<Uuid> = closure_ids.iter().copied().collect();
        let memberships = read_retry("find memberships", || {
            self.shares.memberships_for_files(&closure_ids)
        })
        .await?;
        let prune: Vec<ShareMembership> = memberships
            .into_iter()
            .filter(|m| !inside.contains(&m.root_file_id) && !target_chain.contains(&m.root_file_id))
            .map(|m| ShareMembership {
                token: m.token,
                file_id: m.file_id,
            })
            .collect();

        self.nodes
            .move_nodes(owner_id, &root_ids, new_parent_id, &prune, now())
            .await?;
        invalidate::owner_views(&self.cache, owner_id).await;

        info!(
            owner_id = %owner_id,
            moved = root_ids.len(),
            pruned_memberships = prune.len(),
            new_parent_id = ?new_parent_id,
            "Nodes moved"
        );
        Ok(root_ids)
    }

    /// Deep-copy nodes under `new_parent_id`.
    ///
    /// Trashed nodes are not copied. Copies get new ids, new blobs, and
    /// start unstarred and unshared. Returns the copied roots.
    pub async fn copy_nodes(
        &self,
        owner_id: Uuid,
        ids: &[Uuid],
        new_parent_id: Option<Uuid>,
    ) -> AppResult<Vec<FileNode>> {
        let _guard = self.locks.acquire(LockKey::User(owner_id)).await;
        let parent = self.require_parent(owner_id, new_parent_id).await?;
        let live = self.live_ids(owner_id, ids).await?;
        let closure = self.tree.closure(owner_id, &live).await?;
        if closure.is_empty() {
            return Ok(Vec::new());
        }
        let target_chain = self.target_chain(parent.as_ref()).await?;
        ensure_acyclic(&closure, &target_chain)?;

        let stamp = now();
        let roots: HashSet<Uuid> = closure.root_ids().into_iter().collect();
        let mut mapping: HashMap<Uuid, Uuid> = HashMap::new();
        let mut copies = Vec::new();
        let mut blob_pairs = Vec::new();

        for node in closure.nodes.iter().filter(|n| !n.is_trashed()) {
            let parent_id = if roots.contains(&node.id) {
                new_parent_id
            } else {
                match node.parent_id.and_then(|p| mapping.get(&p)) {
                    Some(copied_parent) => Some(*copied_parent),
                    None => continue,
                }
            };
            let id = Uuid::new_v4();
            mapping.insert(node.id, id);

            let storage_ref = node.storage_ref.as_ref().map(|from| {
                let to = blob_key(owner_id, id);
                blob_pairs.push((from.clone(), to.clone()));
                to
            });
            copies.push(FileNode {
                id,
                parent_id,
                storage_ref,
                starred: false,
                shared: false,
                created_at: stamp,
                modified_at: stamp,
                deleted_at: None,
                ..node.clone()
            });
        }

        let mut written = Vec::with_capacity(blob_pairs.len());
        for (from, to) in &blob_pairs {
            if let Err(e) = self.blobs.copy(from, to).await {
                self.discard_blobs(&written).await;
                return Err(e);
            }
            written.push(to.clone());
        }
        if let Err(e) = self.nodes.insert_many(&copies).await {
            self.discard_blobs(&written).await;
            return Err(e);
        }
        invalidate::owner_views(&self.cache, owner_id).await;

        let copied_roots: HashSet<Uuid> = roots.iter().filter_map(|r| mapping.get(r)).copied().collect();
        info!(
            owner_id = %owner_id,
            nodes = copies.len(),
            blobs = written.len(),
            "Nodes copied"
        );
        Ok(copies
            .into_iter()
            .filter(|c| copied_roots.contains(&c.id))
            .collect())
    }

    /// Rename an untrashed node.
    pub async fn rename(&self, owner_id: Uuid, id: Uuid, name: &str) -> AppResult<FileNode> {
        let name = validate_name(name)?;
        let _guard = self.locks.acquire(LockKey::User(owner_id)).await;
        if !self.nodes.rename(owner_id, id, name, now()).await? {
            return Err(AppError::not_found(format!("Node {id} not found")));
        }
        invalidate::owner_views(&self.cache, owner_id).await;
        self.get(owner_id, id).await
    }

    /// Set or clear the starred flag. Returns the number of nodes updated.
    pub async fn set_starred(&self, owner_id: Uuid, ids: &[Uuid], starred: bool) -> AppResult<u64> {
        let _guard = self.locks.acquire(LockKey::User(owner_id)).await;
        let updated = self.nodes.set_starred(owner_id, ids, starred).await?;
        if updated > 0 {
            invalidate::owner_views(&self.cache, owner_id).await;
        }
        Ok(updated)
    }

    /// Move nodes and their subtrees to the trash.
    ///
    /// Every node trashed by one call carries the same timestamp.
    /// Descendants already in the trash keep their own. Returns the number
    /// of nodes stamped.
    pub async fn soft_delete(&self, owner_id: Uuid, ids: &[Uuid]) -> AppResult<u64> {
        let _guard = self.locks.acquire(LockKey::User(owner_id)).await;
        let live = self.live_ids(owner_id, ids).await?;
        let closure = self.tree.closure(owner_id, &live).await?;
        let targets: Vec<Uuid> = closure
            .nodes
            .iter()
            .filter(|n| !n.is_trashed())
            .map(|n| n.id)
            .collect();
        if targets.is_empty() {
            return Ok(0);
        }

        let stamp = now();
        let trashed = self.nodes.trash(owner_id, &targets, stamp).await?;
        invalidate::owner_views(&self.cache, owner_id).await;

        info!(owner_id = %owner_id, trashed, deleted_at = %stamp, "Nodes moved to trash");
        Ok(trashed)
    }

    /// Bring trashed nodes back.
    ///
    /// Restores each root together with the descendants trashed in the same
    /// call. A root whose parent is gone or still trashed lands at the top
    /// level. Returns the number of nodes restored.
    pub async fn restore(&self, owner_id: Uuid, ids: &[Uuid]) -> AppResult<u64> {
        let _guard = self.locks.acquire(LockKey::User(owner_id)).await;
        let roots: Vec<FileNode> = read_retry("find trashed", || self.nodes.find_owned(owner_id, ids))
            .await?
            .into_iter()
            .filter(FileNode::is_trashed)
            .collect();
        if roots.is_empty() {
            return Err(AppError::not_found("Nothing to restore"));
        }

        let mut clear = Vec::new();
        let mut cleared: HashSet<Uuid> = HashSet::new();
        for root in &roots {
            let closure = self.tree.closure(owner_id, &[root.id]).await?;
            for node in closure.nodes {
                if node.deleted_at == root.deleted_at && cleared.insert(node.id) {
                    clear.push(node.id);
                }
            }
        }

        let mut reattach = Vec::new();
        for root in &roots {
            let Some(parent_id) = root.parent_id else {
                continue;
            };
            if cleared.contains(&parent_id) {
                continue;
            }
            let parent = read_retry("find parent", || self.nodes.find_by_id(parent_id)).await?;
            let parent_usable = parent.is_some_and(|p| p.owner_id == owner_id && !p.is_trashed());
            if !parent_usable {
                reattach.push(root.id);
            }
        }

        self.nodes.restore(owner_id, &clear, &reattach, now()).await?;
        invalidate::owner_views(&self.cache, owner_id).await;

        info!(
            owner_id = %owner_id,
            restored = clear.len(),
            reattached = reattach.len(),
            "Nodes restored from trash"
        );
        Ok(clear.len() as u64)
    }

    /// Delete nodes and their subtrees for good, trashed or not.
    ///
    /// Links rooted in the subtree disappear with it. Blobs are released
    /// after the metadata commit; a blob that cannot be deleted is logged
    /// and left behind. Returns the number of nodes deleted.
    pub async fn permanently_delete(&self, owner_id: Uuid, ids: &[Uuid]) -> AppResult<u64> {
        let _guard = self.locks.acquire(LockKey::User(owner_id)).await;
        self.purge_locked(owner_id, ids).await
    }

    /// Permanently delete trash items trashed before `cutoff`, across all
    /// owners. Returns the number of nodes deleted.
    pub async fn purge_trash_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let items = read_retry("find expired trash", || self.nodes.find_trashed_before(cutoff)).await?;
        let mut by_owner: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for item in items {
            by_owner.entry(item.owner_id).or_default().push(item.id);
        }

        let mut purged = 0;
        for (owner_id, ids) in by_owner {
            let _guard = self.locks.acquire(LockKey::User(owner_id)).await;
            // Re-read under the lock: items may have been restored meanwhile.
            let still_due: Vec<Uuid> = self
                .nodes
                .find_owned(owner_id, &ids)
                .await?
                .into_iter()
                .filter(|n| n.deleted_at.is_some_and(|at| at < cutoff))
                .map(|n| n.id)
                .collect();
            match self.purge_locked(owner_id, &still_due).await {
                Ok(count) => purged += count,
                Err(e) => warn!(owner_id = %owner_id, error = %e, "Failed to purge trash"),
            }
        }

        Ok(purged)
    }

    /// The closure of `root_ids`, self-inclusive, trashed nodes included.
    pub async fn recursive_ids(&self, owner_id: Uuid, root_ids: &[Uuid]) -> AppResult<Vec<Uuid>> {
        Ok(self.tree.closure(owner_id, root_ids).await?.ids())
    }

    /// Case-insensitive name search over untrashed nodes.
    pub async fn search(&self, owner_id: Uuid, query: &str, limit: i64) -> AppResult<Vec<FileNode>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT);
        read_retry("search", || self.nodes.search(owner_id, query, limit)).await
    }

    /// Top-level trash items, newest first.
    pub async fn list_trash(&self, owner_id: Uuid) -> AppResult<Vec<FileNode>> {
        read_retry("list trash", || self.nodes.list_trash(owner_id)).await
    }

    /// Path from the top level down to `id`, inclusive.
    pub async fn breadcrumbs(&self, owner_id: Uuid, id: Uuid) -> AppResult<Vec<FileNode>> {
        let node = self.get(owner_id, id).await?;
        let mut path = self.tree.ancestors(&node).await?;
        path.reverse();
        path.push(node);
        Ok(path)
    }

    async fn purge_locked(&self, owner_id: Uuid, ids: &[Uuid]) -> AppResult<u64> {
        let closure = self.tree.closure(owner_id, ids).await?;
        if closure.is_empty() {
            return Ok(0);
        }
        let closure_ids = closure.ids();
        let links = read_retry("find links", || self.shares.find_by_roots(owner_id, &closure_ids)).await?;

        let deleted = self.nodes.delete_many(owner_id, &closure_ids).await?;
        let refs: Vec<String> = deleted.iter().filter_map(|n| n.storage_ref.clone()).collect();
        self.discard_blobs(&refs).await;

        invalidate::owner_views(&self.cache, owner_id).await;
        invalidate::links(&self.cache, &links).await;

        info!(
            owner_id = %owner_id,
            deleted = deleted.len(),
            links = links.len(),
            "Nodes permanently deleted"
        );
        self.audit.record(
            AuditEvent::success(AuditAction::NodesPurged, owner_id.to_string())
                .by(owner_id)
                .with_metadata(serde_json::json!({
                    "roots": closure.root_ids(),
                    "deleted": deleted.len(),
                    "links": links.len(),
                })),
        );
        Ok(deleted.len() as u64)
    }

    /// Owned, untrashed ids among `ids`.
    async fn live_ids(&self, owner_id: Uuid, ids: &[Uuid]) -> AppResult<Vec<Uuid>> {
        Ok(read_retry("find nodes", || self.nodes.find_owned(owner_id, ids))
            .await?
            .into_iter()
            .filter(|n| !n.is_trashed())
            .map(|n| n.id)
            .collect())
    }

    async fn require_parent(
        &self,
        owner_id: Uuid,
        parent_id: Option<Uuid>,
    ) -> AppResult<Option<FileNode>> {
        let Some(parent_id) = parent_id else {
            return Ok(None);
        };
        match read_retry("find parent", || self.nodes.find_by_id(parent_id)).await? {
            Some(parent) if parent.owner_id == owner_id && parent.is_folder() && !parent.is_trashed() => {
                Ok(Some(parent))
            }
            _ => Err(AppError::invalid_parent(format!(
                "Node {parent_id} is not a usable folder"
            ))),
        }
    }

    /// The target folder and all its ancestors.
    async fn target_chain(&self, parent: Option<&FileNode>) -> AppResult<Vec<Uuid>> {
        let Some(parent) = parent else {
            return Ok(Vec::new());
        };
        let mut chain = vec![parent.id];
        chain.extend(self.tree.ancestors(parent).await?.iter().map(|n| n.id));
        Ok(chain)
    }

    async fn discard_blobs(&self, refs: &[String]) {
        for storage_ref in refs {
            if let Err(e) = self.blobs.delete(storage_ref).await {
                warn!(storage_ref = %storage_ref, error = %e, "Failed to delete blob");
            }
        }
    }
}

/// Blob key for a node's content.
fn blob_key(owner_id: Uuid, node_id: Uuid) -> String {
    format!("{owner_id}/{node_id}")
}

/// Reject a target that lies inside one of the subtrees being placed.
fn ensure_acyclic(closure: &Closure, target_chain: &[Uuid]) -> AppResult<()> {
    if let Some(root) = closure.roots.iter().find(|r| target_chain.contains(&r.id)) {
        return Err(AppError::invalid_parent(format!(
            "Cannot place {} inside itself",
            root.id
        )));
    }
    Ok(())
}
