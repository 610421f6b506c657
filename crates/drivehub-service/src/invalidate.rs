//! Cache keys a writer must drop after committing.

use uuid::Uuid;

use drivehub_cache::{CacheLayer, keys};
use drivehub_entity::share::ShareLink;

/// Drop every listing of `owner`: their own folder listings and the
/// public listings of all their links.
pub(crate) async fn owner_views(cache: &CacheLayer, owner_id: Uuid) {
    cache
        .invalidate_prefix(&keys::children_prefix(owner_id))
        .await;
    cache
        .invalidate_prefix(&keys::shared_listing_prefix(owner_id))
        .await;
}

/// Drop the token and root lookups of the given links.
pub(crate) async fn links(cache: &CacheLayer, links: &[ShareLink]) {
    for link in links {
        cache.invalidate(&keys::share_by_token(&link.token)).await;
        cache
            .invalidate(&keys::share_for_root(link.owner_id, link.root_file_id))
            .await;
    }
}
