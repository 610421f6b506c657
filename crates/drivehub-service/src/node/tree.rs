//! Subtree closure and ancestor walks.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use uuid::Uuid;

use drivehub_core::error::AppError;
use drivehub_core::result::AppResult;
use drivehub_database::NodeRepository;
use drivehub_entity::file::FileNode;

use crate::retry::read_retry;

/// Deepest tree the walker will follow before giving up.
pub const MAX_TREE_DEPTH: usize = 512;

/// The self-inclusive descendant set of a group of roots.
#[derive(Debug, Clone, Default)]
pub struct Closure {
    /// Requested roots that are not inside another requested root.
    pub roots: Vec<FileNode>,
    /// Every node in the closure, each parent before its children.
    pub nodes: Vec<FileNode>,
}

impl Closure {
    /// IDs of every node in the closure.
    pub fn ids(&self) -> Vec<Uuid> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    /// IDs of the top roots.
    pub fn root_ids(&self) -> Vec<Uuid> {
        self.roots.iter().map(|n| n.id).collect()
    }

    /// Whether the closure is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Walks an owner's tree through the node repository.
#[derive(Debug, Clone)]
pub struct TreeWalker {
    nodes: Arc<dyn NodeRepository>,
}

impl TreeWalker {
    /// Creates a new tree walker.
    pub fn new(nodes: Arc<dyn NodeRepository>) -> Self {
        Self { nodes }
    }

    /// Closure of the given roots, trashed nodes included.
    ///
    /// Roots not owned by `owner_id` are ignored. A root that lies inside
    /// another root's subtree is folded into it.
    pub async fn closure(&self, owner_id: Uuid, root_ids: &[Uuid]) -> AppResult<Closure> {
        let roots = read_retry("find roots", || self.nodes.find_owned(owner_id, root_ids)).await?;
        if roots.is_empty() {
            return Ok(Closure::default());
        }
        let ids: Vec<Uuid> = roots.iter().map(|n| n.id).collect();

        let found = match read_retry("closure query", || {
            self.nodes.closure_hint(owner_id, &ids, MAX_TREE_DEPTH)
        })
        .await?
        {
            Some(nodes) => nodes,
            None => self.walk_levels(owner_id, &roots).await?,
        };

        Ok(order_closure(roots, found))
    }

    /// Level-by-level walk, one query per depth.
    async fn walk_levels(&self, owner_id: Uuid, roots: &[FileNode]) -> AppResult<Vec<FileNode>> {
        let mut visited: HashSet<Uuid> = HashSet::new();
        let mut found = Vec::new();
        let mut frontier = Vec::new();
        for root in roots {
            if visited.insert(root.id) {
                frontier.push(root.id);
                found.push(root.clone());
            }
        }

        let mut depth = 0;
        while !frontier.is_empty() {
            if depth >= MAX_TREE_DEPTH {
                return Err(AppError::validation(format!(
                    "Tree is deeper than {MAX_TREE_DEPTH} levels"
                )));
            }
            let children =
                read_retry("children query", || self.nodes.children_of(owner_id, &frontier))
                    .await?;
            frontier = Vec::new();
            for child in children {
                if visited.insert(child.id) {
                    frontier.push(child.id);
                    found.push(child);
                }
            }
            depth += 1;
        }

        Ok(found)
    }

    /// Ancestors of `node`, nearest first, stopping at the top level or at
    /// the first missing parent.
    pub async fn ancestors(&self, node: &FileNode) -> AppResult<Vec<FileNode>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([node.id]);
        let mut current = node.parent_id;

        while let Some(parent_id) = current {
            if chain.len() >= MAX_TREE_DEPTH {
                return Err(AppError::validation(format!(
                    "Tree is deeper than {MAX_TREE_DEPTH} levels"
                )));
            }
            if !seen.insert(parent_id) {
                return Err(AppError::internal(format!(
                    "Parent chain of {} loops at {parent_id}",
                    node.id
                )));
            }
            match read_retry("find parent", || self.nodes.find_by_id(parent_id)).await? {
                Some(parent) => {
                    current = parent.parent_id;
                    chain.push(parent);
                }
                None => break,
            }
        }

        Ok(chain)
    }
}

/// Drop nested roots and order the closure parent-first.
fn order_closure(roots: Vec<FileNode>, found: Vec<FileNode>) -> Closure {
    let by_id: HashMap<Uuid, FileNode> = found.into_iter().map(|n| (n.id, n)).collect();
    let root_ids: HashSet<Uuid> = roots.iter().map(|n| n.id).collect();

    let top: Vec<FileNode> = roots
        .into_iter()
        .filter(|root| !is_nested(root, &root_ids, &by_id))
        .collect();

    let mut children: HashMap<Uuid, Vec<&FileNode>> = HashMap::new();
    for node in by_id.values() {
        if let Some(parent_id) = node.parent_id {
            children.entry(parent_id).or_default().push(node);
        }
    }
    for list in children.values_mut() {
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    }

    let mut visited = HashSet::new();
    let mut ordered = Vec::with_capacity(by_id.len());
    let mut queue: VecDeque<&FileNode> = top.iter().collect();
    while let Some(node) = queue.pop_front() {
        if !visited.insert(node.id) {
            continue;
        }
        ordered.push(node.clone());
        if let Some(list) = children.get(&node.id) {
            queue.extend(list.iter().copied());
        }
    }

    Closure {
        roots: top,
        nodes: ordered,
    }
}

/// Whether `root` sits below another requested root.
fn is_nested(root: &FileNode, root_ids: &HashSet<Uuid>, by_id: &HashMap<Uuid, FileNode>) -> bool {
    let mut seen = HashSet::from([root.id]);
    let mut current = root.parent_id;
    while let Some(parent_id) = current {
        if root_ids.contains(&parent_id) {
            return true;
        }
        if !seen.insert(parent_id) {
            return false;
        }
        current = by_id.get(&parent_id).and_then(|p| p.parent_id);
    }
    false
}
