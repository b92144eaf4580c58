//! Utility functions and helpers.

pub mod dates;
pub mod http;

use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Root of the site serving `base`, e.g. `https://host/` for any path on it.
pub fn site_root(base: &Url) -> Url {
    base.join("/").unwrap_or_else(|_| base.clone())
}

/// Resolve a bulletin link to an absolute URL on the listing's site.
///
/// Root-relative (`/upload/x.xls`) and bare-relative (`upload/x.xls`) links
/// both resolve against the site root, not the listing path.
pub fn resolve_file_url(listing: &Url, href: &str) -> String {
    resolve_url(&site_root(listing), href)
}
