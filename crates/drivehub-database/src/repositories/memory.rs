//! In-process implementation of every repository trait.
//!
//! Used by tests and by deployments without PostgreSQL. All state lives
//! behind one [`RwLock`]; each multi-row write validates first and then
//! mutates while holding the write guard, so a failed write changes nothing.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use drivehub_core::error::AppError;
use drivehub_core::result::AppResult;
use drivehub_core::types::{SortBy, SortDirection, SortOrder};
use drivehub_entity::file::FileNode;
use drivehub_entity::settings::SystemSettings;
use drivehub_entity::share::{MembershipRef, ShareLink, ShareMembership};

use super::node::NodeRepository;
use super::settings::SettingsRepository;
use super::share::{ShareRepository, ShareWrite};

#[derive(Debug)]
struct State {
    nodes: HashMap<Uuid, FileNode>,
    links: HashMap<String, ShareLink>,
    members: HashMap<String, HashSet<Uuid>>,
    settings: SystemSettings,
}

impl State {
    fn is_covered(&self, file_id: Uuid) -> bool {
        self.members.values().any(|set| set.contains(&file_id))
    }

    fn recompute_shared(&mut self, file_ids: impl IntoIterator<Item = Uuid>) {
        for id in file_ids {
            let covered = self.is_covered(id);
            if let Some(node) = self.nodes.get_mut(&id) {
                node.shared = covered;
            }
        }
    }

    fn add_members(&mut self, token: &str, members: &[Uuid]) {
        let set = self.members.entry(token.to_string()).or_default();
        set.extend(members.iter().copied());
        for id in members {
            if let Some(node) = self.nodes.get_mut(id) {
                node.shared = true;
            }
        }
    }

    fn is_top_level_trash(&self, node: &FileNode) -> bool {
        let Some(stamp) = node.deleted_at else {
            return false;
        };
        match node.parent_id.and_then(|p| self.nodes.get(&p)) {
            None => true,
            Some(parent) => parent.deleted_at != Some(stamp),
        }
    }
}

/// Metadata store held entirely in memory.
///
/// Clones share the same state, so one instance can be handed out as
/// node, share and settings repository at once.
#[derive(Debug, Clone)]
pub struct MemoryMetadataStore {
    state: Arc<RwLock<State>>,
}

impl MemoryMetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                nodes: HashMap::new(),
                links: HashMap::new(),
                members: HashMap::new(),
                settings: SystemSettings::initial(Utc::now()),
            })),
        }
    }

    /// Number of membership rows, across all links.
    pub async fn membership_count(&self) -> usize {
        self.state.read().await.members.values().map(HashSet::len).sum()
    }

    /// Number of link rows.
    pub async fn link_count(&self) -> usize {
        self.state.read().await.links.len()
    }
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

fn compare(a: &FileNode, b: &FileNode, order: SortOrder) -> Ordering {
    let primary = match order.by {
        SortBy::Name => a.name.cmp(&b.name),
        SortBy::Size => a.size.unwrap_or(0).cmp(&b.size.unwrap_or(0)),
        SortBy::ModifiedAt => a.modified_at.cmp(&b.modified_at),
        SortBy::CreatedAt => a.created_at.cmp(&b.created_at),
        SortBy::Kind => a.kind.as_str().cmp(b.kind.as_str()),
    };
    let primary = match order.direction {
        SortDirection::Asc => primary,
        SortDirection::Desc => primary.reverse(),
    };
    primary
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl NodeRepository for MemoryMetadataStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<FileNode>> {
        Ok(self.state.read().await.nodes.get(&id).cloned())
    }

    async fn find_owned(&self, owner_id: Uuid, ids: &[Uuid]) -> AppResult<Vec<FileNode>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.nodes.get(id))
            .filter(|n| n.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_children(
        &self,
        owner_id: Uuid,
        parent_id: Option<Uuid>,
        order: SortOrder,
    ) -> AppResult<Vec<FileNode>> {
        let state = self.state.read().await;
        let mut children: Vec<FileNode> = state
            .nodes
            .values()
            .filter(|n| n.owner_id == owner_id && n.parent_id == parent_id && !n.is_trashed())
            .cloned()
            .collect();
        children.sort_by(|a, b| compare(a, b, order));
        Ok(children)
    }

    async fn children_of(&self, owner_id: Uuid, parent_ids: &[Uuid]) -> AppResult<Vec<FileNode>> {
        let parents: HashSet<Uuid> = parent_ids.iter().copied().collect();
        let state = self.state.read().await;
        Ok(state
            .nodes
            .values()
            .filter(|n| n.owner_id == owner_id && n.parent_id.is_some_and(|p| parents.contains(&p)))
            .cloned()
            .collect())
    }

    async fn insert(&self, node: &FileNode) -> AppResult<FileNode> {
        let mut state = self.state.write().await;
        if state.nodes.contains_key(&node.id) {
            return Err(AppError::conflict(format!("Node {} already exists", node.id)));
        }
        state.nodes.insert(node.id, node.clone());
        Ok(node.clone())
    }

    async fn insert_many(&self, nodes: &[FileNode]) -> AppResult<()> {
        let mut state = self.state.write().await;
        let mut seen = HashSet::new();
        for node in nodes {
            if state.nodes.contains_key(&node.id) || !seen.insert(node.id) {
                return Err(AppError::conflict(format!("Node {} already exists", node.id)));
            }
        }
        for node in nodes {
            state.nodes.insert(node.id, node.clone());
        }
        Ok(())
    }

    async fn rename(
        &self,
        owner_id: Uuid,
        id: Uuid,
        name: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.nodes.get_mut(&id) {
            Some(node) if node.owner_id == owner_id && !node.is_trashed() => {
                node.name = name.to_string();
                node.modified_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_starred(&self, owner_id: Uuid, ids: &[Uuid], starred: bool) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for id in ids {
            if let Some(node) = state.nodes.get_mut(id) {
                if node.owner_id == owner_id && !node.is_trashed() {
                    node.starred = starred;
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn move_nodes(
        &self,
        owner_id: Uuid,
        ids: &[Uuid],
        new_parent_id: Option<Uuid>,
        prune: &[ShareMembership],
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        for id in ids {
            if let Some(node) = state.nodes.get_mut(id) {
                if node.owner_id == owner_id {
                    node.parent_id = new_parent_id;
                    node.modified_at = now;
                }
            }
        }
        for membership in prune {
            if let Some(set) = state.members.get_mut(&membership.token) {
                set.remove(&membership.file_id);
            }
        }
        state.recompute_shared(prune.iter().map(|m| m.file_id));
        Ok(())
    }

    async fn trash(&self, owner_id: Uuid, ids: &[Uuid], at: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for id in ids {
            if let Some(node) = state.nodes.get_mut(id) {
                if node.owner_id == owner_id && !node.is_trashed() {
                    node.deleted_at = Some(at);
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn restore(
        &self,
        owner_id: Uuid,
        clear: &[Uuid],
        reattach: &[Uuid],
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        for id in clear {
            if let Some(node) = state.nodes.get_mut(id) {
                if node.owner_id == owner_id {
                    node.deleted_at = None;
                }
            }
        }
        for id in reattach {
            if let Some(node) = state.nodes.get_mut(id) {
                if node.owner_id == owner_id {
                    node.parent_id = None;
                    node.modified_at = now;
                }
            }
        }
        Ok(())
    }

    async fn delete_many(&self, owner_id: Uuid, ids: &[Uuid]) -> AppResult<Vec<FileNode>> {
        let mut state = self.state.write().await;
        let targets: HashSet<Uuid> = ids
            .iter()
            .filter(|id| state.nodes.get(*id).is_some_and(|n| n.owner_id == owner_id))
            .copied()
            .collect();

        let rooted: Vec<String> = state
            .links
            .values()
            .filter(|l| l.owner_id == owner_id && targets.contains(&l.root_file_id))
            .map(|l| l.token.clone())
            .collect();

        let mut covered = HashSet::new();
        for token in &rooted {
            state.links.remove(token);
            if let Some(set) = state.members.remove(token) {
                covered.extend(set);
            }
        }
        for set in state.members.values_mut() {
            set.retain(|id| !targets.contains(id));
        }

        let deleted: Vec<FileNode> = targets
            .iter()
            .filter_map(|id| state.nodes.remove(id))
            .collect();
        state.recompute_shared(covered);
        Ok(deleted)
    }

    async fn search(&self, owner_id: Uuid, query: &str, limit: i64) -> AppResult<Vec<FileNode>> {
        let needle = query.to_lowercase();
        let state = self.state.read().await;
        let mut hits: Vec<FileNode> = state
            .nodes
            .values()
            .filter(|n| {
                n.owner_id == owner_id
                    && !n.is_trashed()
                    && n.name.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.modified_at.cmp(&a.modified_at).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(hits)
    }

    async fn list_trash(&self, owner_id: Uuid) -> AppResult<Vec<FileNode>> {
        let state = self.state.read().await;
        let mut items: Vec<FileNode> = state
            .nodes
            .values()
            .filter(|n| n.owner_id == owner_id && state.is_top_level_trash(n))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn find_trashed_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<FileNode>> {
        let state = self.state.read().await;
        let mut items: Vec<FileNode> = state
            .nodes
            .values()
            .filter(|n| state.is_top_level_trash(n) && n.deleted_at.is_some_and(|at| at < cutoff))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.owner_id
                .cmp(&b.owner_id)
                .then_with(|| a.deleted_at.cmp(&b.deleted_at))
        });
        Ok(items)
    }
}

#[async_trait]
impl ShareRepository for MemoryMetadataStore {
    async fn find_by_token(&self, token: &str) -> AppResult<Option<ShareLink>> {
        Ok(self.state.read().await.links.get(token).cloned())
    }

    async fn find_by_root(
        &self,
        owner_id: Uuid,
        root_file_id: Uuid,
    ) -> AppResult<Option<ShareLink>> {
        let state = self.state.read().await;
        Ok(state
            .links
            .values()
            .find(|l| l.owner_id == owner_id && l.root_file_id == root_file_id)
            .cloned())
    }

    async fn find_by_roots(&self, owner_id: Uuid, root_ids: &[Uuid]) -> AppResult<Vec<ShareLink>> {
        let roots: HashSet<Uuid> = root_ids.iter().copied().collect();
        let state = self.state.read().await;
        Ok(state
            .links
            .values()
            .filter(|l| l.owner_id == owner_id && roots.contains(&l.root_file_id))
            .cloned()
            .collect())
    }

    async fn commit_shares(&self, writes: &[ShareWrite]) -> AppResult<()> {
        let mut state = self.state.write().await;

        let mut new_tokens = HashSet::new();
        let mut new_roots = HashSet::new();
        for write in writes {
            match write {
                ShareWrite::Create { link, .. } => {
                    let root_taken = state
                        .links
                        .values()
                        .any(|l| l.owner_id == link.owner_id && l.root_file_id == link.root_file_id);
                    if state.links.contains_key(&link.token)
                        || root_taken
                        || !new_tokens.insert(link.token.clone())
                        || !new_roots.insert((link.owner_id, link.root_file_id))
                    {
                        return Err(AppError::conflict(format!(
                            "Share link for {} already exists",
                            link.root_file_id
                        )));
                    }
                }
                ShareWrite::Extend { token, .. } => {
                    if !state.links.contains_key(token) && !new_tokens.contains(token) {
                        return Err(AppError::not_found(format!("Share {token} not found")));
                    }
                }
            }
        }

        for write in writes {
            match write {
                ShareWrite::Create { link, members } => {
                    state.links.insert(link.token.clone(), link.clone());
                    state.add_members(&link.token, members);
                }
                ShareWrite::Extend {
                    token,
                    members,
                    expires_at,
                } => {
                    if let Some(link) = state.links.get_mut(token) {
                        link.expires_at = *expires_at;
                    }
                    state.add_members(token, members);
                }
            }
        }
        Ok(())
    }

    async fn is_member(&self, token: &str, file_id: Uuid) -> AppResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .members
            .get(token)
            .is_some_and(|set| set.contains(&file_id)))
    }

    async fn member_ids(&self, token: &str) -> AppResult<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(state
            .members
            .get(token)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn memberships_for_files(&self, file_ids: &[Uuid]) -> AppResult<Vec<MembershipRef>> {
        let wanted: HashSet<Uuid> = file_ids.iter().copied().collect();
        let state = self.state.read().await;
        let mut refs = Vec::new();
        for (token, set) in &state.members {
            let Some(link) = state.links.get(token) else {
                continue;
            };
            for file_id in set.iter().filter(|id| wanted.contains(id)) {
                refs.push(MembershipRef {
                    token: token.clone(),
                    file_id: *file_id,
                    root_file_id: link.root_file_id,
                    expires_at: link.expires_at,
                });
            }
        }
        Ok(refs)
    }

    async fn delete_links(&self, tokens: &[String]) -> AppResult<Vec<Uuid>> {
        let mut state = self.state.write().await;
        let mut former = HashSet::new();
        for token in tokens {
            state.links.remove(token);
            if let Some(set) = state.members.remove(token) {
                former.extend(set);
            }
        }
        let former: Vec<Uuid> = former.into_iter().collect();
        state.recompute_shared(former.iter().copied());
        Ok(former)
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<ShareLink>> {
        let state = self.state.read().await;
        let mut expired: Vec<ShareLink> = state
            .links
            .values()
            .filter(|l| l.is_expired_at(now))
            .cloned()
            .collect();
        expired.sort_by(|a, b| {
            a.owner_id
                .cmp(&b.owner_id)
                .then_with(|| a.expires_at.cmp(&b.expires_at))
        });
        Ok(expired)
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> AppResult<Vec<ShareLink>> {
        let state = self.state.read().await;
        let mut links: Vec<ShareLink> = state
            .links
            .values()
            .filter(|l| l.owner_id == owner_id)
            .cloned()
            .collect();
        links.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.token.cmp(&b.token))
        });
        Ok(links)
    }
}

#[async_trait]
impl SettingsRepository for MemoryMetadataStore {
    async fn get(&self) -> AppResult<SystemSettings> {
        Ok(self.state.read().await.settings.clone())
    }

    async fn claim_admin(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let mut state = self.state.write().await;
        if state.settings.admin_user_id.is_some() {
            return Ok(false);
        }
        state.settings.admin_user_id = Some(user_id);
        state.settings.updated_at = now;
        Ok(true)
    }

    async fn set_signups_enabled(
        &self,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> AppResult<SystemSettings> {
        let mut state = self.state.write().await;
        state.settings.signups_enabled = enabled;
        state.settings.updated_at = now;
        Ok(state.settings.clone())
    }
}
