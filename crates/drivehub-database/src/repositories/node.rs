//! File node repository.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use drivehub_core::result::AppResult;
use drivehub_core::types::SortOrder;
use drivehub_entity::file::FileNode;
use drivehub_entity::share::ShareMembership;

use crate::timeout::{bounded, db_error};

/// Storage operations on the `files` table.
///
/// Every method is scoped to an owner where the caller is acting on behalf
/// of one; rows belonging to other owners are never touched.
#[async_trait]
pub trait NodeRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Find a node by ID regardless of owner or trash state.
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<FileNode>>;

    /// Find the given nodes that belong to `owner`, trashed or not.
    async fn find_owned(&self, owner_id: Uuid, ids: &[Uuid]) -> AppResult<Vec<FileNode>>;

    /// Untrashed direct children of `parent_id` (`None` = top level).
    async fn list_children(
        &self,
        owner_id: Uuid,
        parent_id: Option<Uuid>,
        order: SortOrder,
    ) -> AppResult<Vec<FileNode>>;

    /// All direct children of any of `parent_ids`, trashed included.
    async fn children_of(&self, owner_id: Uuid, parent_ids: &[Uuid]) -> AppResult<Vec<FileNode>>;

    /// Single-query closure of `root_ids`, if the backend supports one.
    ///
    /// Returns `None` when unsupported or when the tree is deeper than
    /// `max_depth`; callers then fall back to a level-by-level walk.
    async fn closure_hint(
        &self,
        _owner_id: Uuid,
        _root_ids: &[Uuid],
        _max_depth: usize,
    ) -> AppResult<Option<Vec<FileNode>>> {
        Ok(None)
    }

    /// Insert one node.
    async fn insert(&self, node: &FileNode) -> AppResult<FileNode>;

    /// Insert several nodes atomically. Parents must precede children.
    async fn insert_many(&self, nodes: &[FileNode]) -> AppResult<()>;

    /// Rename an untrashed node. Returns `false` if nothing matched.
    async fn rename(
        &self,
        owner_id: Uuid,
        id: Uuid,
        name: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Set the starred flag on untrashed nodes. Returns the number updated.
    async fn set_starred(&self, owner_id: Uuid, ids: &[Uuid], starred: bool) -> AppResult<u64>;

    /// Reparent `ids`, drop the `prune` memberships and recompute the
    /// `shared` flag of every pruned file, atomically.
    async fn move_nodes(
        &self,
        owner_id: Uuid,
        ids: &[Uuid],
        new_parent_id: Option<Uuid>,
        prune: &[ShareMembership],
        now: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Stamp `deleted_at = at` on those of `ids` not already trashed.
    async fn trash(&self, owner_id: Uuid, ids: &[Uuid], at: DateTime<Utc>) -> AppResult<u64>;

    /// Clear `deleted_at` on `clear` and move `reattach` to the top level,
    /// atomically.
    async fn restore(
        &self,
        owner_id: Uuid,
        clear: &[Uuid],
        reattach: &[Uuid],
        now: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Delete nodes with their memberships and any link rooted at them,
    /// then recompute `shared` on the survivors those links covered.
    /// Returns the deleted rows.
    async fn delete_many(&self, owner_id: Uuid, ids: &[Uuid]) -> AppResult<Vec<FileNode>>;

    /// Case-insensitive name substring search over untrashed nodes.
    async fn search(&self, owner_id: Uuid, query: &str, limit: i64) -> AppResult<Vec<FileNode>>;

    /// Top-level trash items of `owner`, newest first.
    ///
    /// A trashed node is top level when its parent is missing, untrashed,
    /// or was trashed at a different instant.
    async fn list_trash(&self, owner_id: Uuid) -> AppResult<Vec<FileNode>>;

    /// Top-level trash items of every owner trashed before `cutoff`.
    async fn find_trashed_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<FileNode>>;
}

/// PostgreSQL implementation of [`NodeRepository`].
#[derive(Debug, Clone)]
pub struct PgNodeRepository {
    pool: PgPool,
    timeout: Duration,
}

impl PgNodeRepository {
    /// Create a new node repository.
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[derive(FromRow)]
struct ClosureRow {
    #[sqlx(flatten)]
    node: FileNode,
    depth: i32,
}

/// Escape `%`, `_` and `\` for use inside a `LIKE` pattern.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

const TOP_LEVEL_TRASH: &str = "f.deleted_at IS NOT NULL \
     AND (p.id IS NULL OR p.deleted_at IS NULL OR p.deleted_at <> f.deleted_at)";

#[async_trait]
impl NodeRepository for PgNodeRepository {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<FileNode>> {
        bounded(self.timeout, "find node", async {
            sqlx::query_as::<_, FileNode>("SELECT * FROM files WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to find node", e))
        })
        .await
    }

    async fn find_owned(&self, owner_id: Uuid, ids: &[Uuid]) -> AppResult<Vec<FileNode>> {
        bounded(self.timeout, "find owned nodes", async {
            sqlx::query_as::<_, FileNode>(
                "SELECT * FROM files WHERE owner_id = $1 AND id = ANY($2)",
            )
            .bind(owner_id)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to find owned nodes", e))
        })
        .await
    }

    async fn list_children(
        &self,
        owner_id: Uuid,
        parent_id: Option<Uuid>,
        order: SortOrder,
    ) -> AppResult<Vec<FileNode>> {
        let sql = format!(
            "SELECT * FROM files WHERE owner_id = $1 AND parent_id IS NOT DISTINCT FROM $2 \
             AND deleted_at IS NULL ORDER BY {}",
            order.to_sql()
        );
        bounded(self.timeout, "list children", async {
            sqlx::query_as::<_, FileNode>(&sql)
                .bind(owner_id)
                .bind(parent_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("Failed to list children", e))
        })
        .await
    }

    async fn children_of(&self, owner_id: Uuid, parent_ids: &[Uuid]) -> AppResult<Vec<FileNode>> {
        bounded(self.timeout, "load children", async {
            sqlx::query_as::<_, FileNode>(
                "SELECT * FROM files WHERE owner_id = $1 AND parent_id = ANY($2)",
            )
            .bind(owner_id)
            .bind(parent_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to load children", e))
        })
        .await
    }

    async fn closure_hint(
        &self,
        owner_id: Uuid,
        root_ids: &[Uuid],
        max_depth: usize,
    ) -> AppResult<Option<Vec<FileNode>>> {
        let depth_limit = i32::try_from(max_depth).unwrap_or(i32::MAX);
        let rows = bounded(self.timeout, "closure", async {
            sqlx::query_as::<_, ClosureRow>(
                "WITH RECURSIVE tree AS ( \
                    SELECT f.*, 0 AS depth FROM files f \
                    WHERE f.owner_id = $1 AND f.id = ANY($2) \
                    UNION ALL \
                    SELECT c.*, t.depth + 1 FROM files c \
                    INNER JOIN tree t ON c.parent_id = t.id \
                    WHERE c.owner_id = $1 AND t.depth < $3 \
                 ) SELECT * FROM tree",
            )
            .bind(owner_id)
            .bind(root_ids)
            .bind(depth_limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to compute closure", e))
        })
        .await?;

        if rows.iter().any(|row| row.depth >= depth_limit) {
            return Ok(None);
        }
        Ok(Some(rows.into_iter().map(|row| row.node).collect()))
    }

    async fn insert(&self, node: &FileNode) -> AppResult<FileNode> {
        bounded(self.timeout, "insert node", async {
            sqlx::query_as::<_, FileNode>(
                "INSERT INTO files (id, name, kind, size, mime_type, storage_ref, owner_id, \
                 parent_id, starred, shared, created_at, modified_at, deleted_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING *",
            )
            .bind(node.id)
            .bind(&node.name)
            .bind(node.kind)
            .bind(node.size)
            .bind(&node.mime_type)
            .bind(&node.storage_ref)
            .bind(node.owner_id)
            .bind(node.parent_id)
            .bind(node.starred)
            .bind(node.shared)
            .bind(node.created_at)
            .bind(node.modified_at)
            .bind(node.deleted_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to insert node", e))
        })
        .await
    }

    async fn insert_many(&self, nodes: &[FileNode]) -> AppResult<()> {
        bounded(self.timeout, "insert nodes", async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| db_error("Failed to begin transaction", e))?;
            for node in nodes {
                sqlx::query(
                    "INSERT INTO files (id, name, kind, size, mime_type, storage_ref, owner_id, \
                     parent_id, starred, shared, created_at, modified_at, deleted_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
                )
                .bind(node.id)
                .bind(&node.name)
                .bind(node.kind)
                .bind(node.size)
                .bind(&node.mime_type)
                .bind(&node.storage_ref)
                .bind(node.owner_id)
                .bind(node.parent_id)
                .bind(node.starred)
                .bind(node.shared)
                .bind(node.created_at)
                .bind(node.modified_at)
                .bind(node.deleted_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to insert node", e))?;
            }
            tx.commit()
                .await
                .map_err(|e| db_error("Failed to commit node inserts", e))
        })
        .await
    }

    async fn rename(
        &self,
        owner_id: Uuid,
        id: Uuid,
        name: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        bounded(self.timeout, "rename node", async {
            let result = sqlx::query(
                "UPDATE files SET name = $3, modified_at = $4 \
                 WHERE id = $1 AND owner_id = $2 AND deleted_at IS NULL",
            )
            .bind(id)
            .bind(owner_id)
            .bind(name)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to rename node", e))?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn set_starred(&self, owner_id: Uuid, ids: &[Uuid], starred: bool) -> AppResult<u64> {
        bounded(self.timeout, "star nodes", async {
            let result = sqlx::query(
                "UPDATE files SET starred = $3 \
                 WHERE owner_id = $1 AND id = ANY($2) AND deleted_at IS NULL",
            )
            .bind(owner_id)
            .bind(ids)
            .bind(starred)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to update starred flag", e))?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn move_nodes(
        &self,
        owner_id: Uuid,
        ids: &[Uuid],
        new_parent_id: Option<Uuid>,
        prune: &[ShareMembership],
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let tokens: Vec<String> = prune.iter().map(|m| m.token.clone()).collect();
        let files: Vec<Uuid> = prune.iter().map(|m| m.file_id).collect();

        bounded(self.timeout, "move nodes", async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| db_error("Failed to begin transaction", e))?;

            sqlx::query(
                "UPDATE files SET parent_id = $3, modified_at = $4 \
                 WHERE owner_id = $1 AND id = ANY($2)",
            )
            .bind(owner_id)
            .bind(ids)
            .bind(new_parent_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to move nodes", e))?;

            if !prune.is_empty() {
                sqlx::query(
                    "DELETE FROM share_link_files m \
                     USING UNNEST($1::text[], $2::uuid[]) AS p(token, file_id) \
                     WHERE m.token = p.token AND m.file_id = p.file_id",
                )
                .bind(&tokens)
                .bind(&files)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to prune memberships", e))?;

                sqlx::query(
                    "UPDATE files f SET shared = EXISTS \
                     (SELECT 1 FROM share_link_files m WHERE m.file_id = f.id) \
                     WHERE f.id = ANY($1)",
                )
                .bind(&files)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to recompute shared flags", e))?;
            }

            tx.commit()
                .await
                .map_err(|e| db_error("Failed to commit move", e))
        })
        .await
    }

    async fn trash(&self, owner_id: Uuid, ids: &[Uuid], at: DateTime<Utc>) -> AppResult<u64> {
        bounded(self.timeout, "trash nodes", async {
            let result = sqlx::query(
                "UPDATE files SET deleted_at = $3 \
                 WHERE owner_id = $1 AND id = ANY($2) AND deleted_at IS NULL",
            )
            .bind(owner_id)
            .bind(ids)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to trash nodes", e))?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn restore(
        &self,
        owner_id: Uuid,
        clear: &[Uuid],
        reattach: &[Uuid],
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        bounded(self.timeout, "restore nodes", async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| db_error("Failed to begin transaction", e))?;

            sqlx::query("UPDATE files SET deleted_at = NULL WHERE owner_id = $1 AND id = ANY($2)")
                .bind(owner_id)
                .bind(clear)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to restore nodes", e))?;

            if !reattach.is_empty() {
                sqlx::query(
                    "UPDATE files SET parent_id = NULL, modified_at = $3 \
                     WHERE owner_id = $1 AND id = ANY($2)",
                )
                .bind(owner_id)
                .bind(reattach)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to reattach restored nodes", e))?;
            }

            tx.commit()
                .await
                .map_err(|e| db_error("Failed to commit restore", e))
        })
        .await
    }

    async fn delete_many(&self, owner_id: Uuid, ids: &[Uuid]) -> AppResult<Vec<FileNode>> {
        bounded(self.timeout, "delete nodes", async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| db_error("Failed to begin transaction", e))?;

            let covered: Vec<Uuid> = sqlx::query_scalar(
                "SELECT DISTINCT m.file_id FROM share_link_files m \
                 INNER JOIN share_links l ON l.token = m.token \
                 WHERE l.owner_id = $1 AND l.root_file_id = ANY($2)",
            )
            .bind(owner_id)
            .bind(ids)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to load covered nodes", e))?;

            sqlx::query("DELETE FROM share_links WHERE owner_id = $1 AND root_file_id = ANY($2)")
                .bind(owner_id)
                .bind(ids)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to delete share links", e))?;

            sqlx::query("DELETE FROM share_link_files WHERE file_id = ANY($1)")
                .bind(ids)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to delete memberships", e))?;

            let deleted = sqlx::query_as::<_, FileNode>(
                "DELETE FROM files WHERE owner_id = $1 AND id = ANY($2) RETURNING *",
            )
            .bind(owner_id)
            .bind(ids)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to delete nodes", e))?;

            if !covered.is_empty() {
                sqlx::query(
                    "UPDATE files f SET shared = EXISTS \
                     (SELECT 1 FROM share_link_files m WHERE m.file_id = f.id) \
                     WHERE f.id = ANY($1)",
                )
                .bind(&covered)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to recompute shared flags", e))?;
            }

            tx.commit()
                .await
                .map_err(|e| db_error("Failed to commit delete", e))?;
            Ok(deleted)
        })
        .await
    }

    async fn search(&self, owner_id: Uuid, query: &str, limit: i64) -> AppResult<Vec<FileNode>> {
        let pattern = format!("%{}%", escape_like(query));
        bounded(self.timeout, "search nodes", async {
            sqlx::query_as::<_, FileNode>(
                "SELECT * FROM files WHERE owner_id = $1 AND deleted_at IS NULL \
                 AND name ILIKE $2 ORDER BY modified_at DESC, id ASC LIMIT $3",
            )
            .bind(owner_id)
            .bind(pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to search nodes", e))
        })
        .await
    }

    async fn list_trash(&self, owner_id: Uuid) -> AppResult<Vec<FileNode>> {
        let sql = format!(
            "SELECT f.* FROM files f LEFT JOIN files p ON p.id = f.parent_id \
             WHERE f.owner_id = $1 AND {TOP_LEVEL_TRASH} \
             ORDER BY f.deleted_at DESC, f.id ASC"
        );
        bounded(self.timeout, "list trash", async {
            sqlx::query_as::<_, FileNode>(&sql)
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("Failed to list trash", e))
        })
        .await
    }

    async fn find_trashed_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<FileNode>> {
        let sql = format!(
            "SELECT f.* FROM files f LEFT JOIN files p ON p.id = f.parent_id \
             WHERE {TOP_LEVEL_TRASH} AND f.deleted_at < $1 \
             ORDER BY f.owner_id, f.deleted_at ASC"
        );
        bounded(self.timeout, "find expired trash", async {
            sqlx::query_as::<_, FileNode>(&sql)
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("Failed to find expired trash", e))
        })
        .await
    }
}
