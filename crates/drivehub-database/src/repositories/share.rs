//! Share link and membership repository.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use drivehub_core::error::AppError;
use drivehub_core::result::AppResult;
use drivehub_entity::share::{MembershipRef, ShareLink};

use crate::timeout::{bounded, db_error};

/// One step of an atomic share commit.
#[derive(Debug, Clone, PartialEq)]
pub enum ShareWrite {
    /// Insert a new link and seed its memberships.
    Create {
        /// The link to insert.
        link: ShareLink,
        /// Nodes that become members.
        members: Vec<Uuid>,
    },
    /// Add members to an existing link and set its expiry.
    Extend {
        /// The existing link's token.
        token: String,
        /// Nodes that become members. Existing members are ignored.
        members: Vec<Uuid>,
        /// The link's new expiry.
        expires_at: Option<DateTime<Utc>>,
    },
}

/// Storage operations on `share_links` and `share_link_files`.
#[async_trait]
pub trait ShareRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Find a link by token.
    async fn find_by_token(&self, token: &str) -> AppResult<Option<ShareLink>>;

    /// Find the link rooted at `root_file_id` for `owner_id`.
    async fn find_by_root(&self, owner_id: Uuid, root_file_id: Uuid)
    -> AppResult<Option<ShareLink>>;

    /// Find all links of `owner_id` rooted at any of `root_ids`.
    async fn find_by_roots(&self, owner_id: Uuid, root_ids: &[Uuid]) -> AppResult<Vec<ShareLink>>;

    /// Apply all writes or none of them.
    ///
    /// Every member gets `shared = true`. A `Create` that collides with an
    /// existing token or `(root, owner)` pair fails with `Conflict`; an
    /// `Extend` of an unknown token fails with `NotFound`.
    async fn commit_shares(&self, writes: &[ShareWrite]) -> AppResult<()>;

    /// Whether `file_id` is a member of `token`.
    async fn is_member(&self, token: &str, file_id: Uuid) -> AppResult<bool>;

    /// All member node IDs of `token`.
    async fn member_ids(&self, token: &str) -> AppResult<Vec<Uuid>>;

    /// Memberships of any of `file_ids`, joined with their link.
    async fn memberships_for_files(&self, file_ids: &[Uuid]) -> AppResult<Vec<MembershipRef>>;

    /// Delete links and their memberships, then recompute `shared` on every
    /// former member. Returns the former members.
    async fn delete_links(&self, tokens: &[String]) -> AppResult<Vec<Uuid>>;

    /// Links whose expiry is at or before `now`.
    async fn find_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<ShareLink>>;

    /// All links of an owner, newest first.
    async fn list_by_owner(&self, owner_id: Uuid) -> AppResult<Vec<ShareLink>>;
}

/// PostgreSQL implementation of [`ShareRepository`].
#[derive(Debug, Clone)]
pub struct PgShareRepository {
    pool: PgPool,
    timeout: Duration,
}

impl PgShareRepository {
    /// Create a new share repository.
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

async fn add_members(
    tx: &mut Transaction<'_, Postgres>,
    token: &str,
    members: &[Uuid],
) -> AppResult<()> {
    if members.is_empty() {
        return Ok(());
    }
    sqlx::query(
        "INSERT INTO share_link_files (token, file_id) \
         SELECT $1, UNNEST($2::uuid[]) ON CONFLICT DO NOTHING",
    )
    .bind(token)
    .bind(members)
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error("Failed to insert memberships", e))?;

    sqlx::query("UPDATE files SET shared = TRUE WHERE id = ANY($1)")
        .bind(members)
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to mark nodes shared", e))?;
    Ok(())
}

#[async_trait]
impl ShareRepository for PgShareRepository {
    async fn find_by_token(&self, token: &str) -> AppResult<Option<ShareLink>> {
        bounded(self.timeout, "find share", async {
            sqlx::query_as::<_, ShareLink>("SELECT * FROM share_links WHERE token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to find share by token", e))
        })
        .await
    }

    async fn find_by_root(
        &self,
        owner_id: Uuid,
        root_file_id: Uuid,
    ) -> AppResult<Option<ShareLink>> {
        bounded(self.timeout, "find share", async {
            sqlx::query_as::<_, ShareLink>(
                "SELECT * FROM share_links WHERE owner_id = $1 AND root_file_id = $2",
            )
            .bind(owner_id)
            .bind(root_file_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to find share by root", e))
        })
        .await
    }

    async fn find_by_roots(&self, owner_id: Uuid, root_ids: &[Uuid]) -> AppResult<Vec<ShareLink>> {
        bounded(self.timeout, "find shares", async {
            sqlx::query_as::<_, ShareLink>(
                "SELECT * FROM share_links WHERE owner_id = $1 AND root_file_id = ANY($2)",
            )
            .bind(owner_id)
            .bind(root_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to find shares by root", e))
        })
        .await
    }

    async fn commit_shares(&self, writes: &[ShareWrite]) -> AppResult<()> {
        bounded(self.timeout, "commit shares", async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| db_error("Failed to begin transaction", e))?;

            for write in writes {
                match write {
                    ShareWrite::Create { link, members } => {
                        sqlx::query(
                            "INSERT INTO share_links (token, root_file_id, owner_id, expires_at, created_at) \
                             VALUES ($1, $2, $3, $4, $5)",
                        )
                        .bind(&link.token)
                        .bind(link.root_file_id)
                        .bind(link.owner_id)
                        .bind(link.expires_at)
                        .bind(link.created_at)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| db_error("Failed to create share link", e))?;
                        add_members(&mut tx, &link.token, members).await?;
                    }
                    ShareWrite::Extend {
                        token,
                        members,
                        expires_at,
                    } => {
                        let result =
                            sqlx::query("UPDATE share_links SET expires_at = $2 WHERE token = $1")
                                .bind(token)
                                .bind(expires_at)
                                .execute(&mut *tx)
                                .await
                                .map_err(|e| db_error("Failed to update share link", e))?;
                        if result.rows_affected() == 0 {
                            return Err(AppError::not_found(format!("Share {token} not found")));
                        }
                        add_members(&mut tx, token, members).await?;
                    }
                }
            }

            tx.commit()
                .await
                .map_err(|e| db_error("Failed to commit shares", e))
        })
        .await
    }

    async fn is_member(&self, token: &str, file_id: Uuid) -> AppResult<bool> {
        bounded(self.timeout, "check membership", async {
            sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM share_link_files WHERE token = $1 AND file_id = $2)",
            )
            .bind(token)
            .bind(file_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to check membership", e))
        })
        .await
    }

    async fn member_ids(&self, token: &str) -> AppResult<Vec<Uuid>> {
        bounded(self.timeout, "list members", async {
            sqlx::query_scalar::<_, Uuid>("SELECT file_id FROM share_link_files WHERE token = $1")
                .bind(token)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("Failed to list members", e))
        })
        .await
    }

    async fn memberships_for_files(&self, file_ids: &[Uuid]) -> AppResult<Vec<MembershipRef>> {
        bounded(self.timeout, "load memberships", async {
            sqlx::query_as::<_, MembershipRef>(
                "SELECT m.token, m.file_id, l.root_file_id, l.expires_at \
                 FROM share_link_files m INNER JOIN share_links l ON l.token = m.token \
                 WHERE m.file_id = ANY($1)",
            )
            .bind(file_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to load memberships", e))
        })
        .await
    }

    async fn delete_links(&self, tokens: &[String]) -> AppResult<Vec<Uuid>> {
        bounded(self.timeout, "delete shares", async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| db_error("Failed to begin transaction", e))?;

            let members: Vec<Uuid> = sqlx::query_scalar(
                "SELECT DISTINCT file_id FROM share_link_files WHERE token = ANY($1)",
            )
            .bind(tokens)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to load members", e))?;

            sqlx::query("DELETE FROM share_link_files WHERE token = ANY($1)")
                .bind(tokens)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to delete memberships", e))?;

            sqlx::query("DELETE FROM share_links WHERE token = ANY($1)")
                .bind(tokens)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to delete share links", e))?;

            sqlx::query(
                "UPDATE files f SET shared = EXISTS \
                 (SELECT 1 FROM share_link_files m WHERE m.file_id = f.id) \
                 WHERE f.id = ANY($1)",
            )
            .bind(&members)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to recompute shared flags", e))?;

            tx.commit()
                .await
                .map_err(|e| db_error("Failed to commit share deletion", e))?;
            Ok(members)
        })
        .await
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<ShareLink>> {
        bounded(self.timeout, "find expired shares", async {
            sqlx::query_as::<_, ShareLink>(
                "SELECT * FROM share_links WHERE expires_at IS NOT NULL AND expires_at <= $1 \
                 ORDER BY owner_id, expires_at",
            )
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to find expired shares", e))
        })
        .await
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> AppResult<Vec<ShareLink>> {
        bounded(self.timeout, "list shares", async {
            sqlx::query_as::<_, ShareLink>(
                "SELECT * FROM share_links WHERE owner_id = $1 ORDER BY created_at DESC, token ASC",
            )
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list shares", e))
        })
        .await
    }
}
