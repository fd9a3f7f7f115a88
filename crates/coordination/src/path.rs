//! Helpers for absolute, slash-separated node paths.

/// Joins `base` and `segment`, collapsing repeated and trailing slashes.
///
/// The result is always absolute.
#[must_use]
pub fn join_path(base: &str, segment: &str) -> String {
    let joined: Vec<&str> = base
        .split('/')
        .chain(segment.split('/'))
        .filter(|part| !part.is_empty())
        .collect();

    format!("/{}", joined.join("/"))
}

/// Returns every proper ancestor of `path`, root-to-leaf, excluding `/`.
///
/// `ancestors("/a/b/c")` yields `["/a", "/a/b"]`.
#[must_use]
pub fn ancestors(path: &str) -> Vec<String> {
    let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();

    let mut acc = String::new();
    let mut out = Vec::with_capacity(parts.len().saturating_sub(1));
    for part in parts.iter().take(parts.len().saturating_sub(1)) {
        acc.push('/');
        acc.push_str(part);
        out.push(acc.clone());
    }

    out
}

/// Returns the parent of `path`, or `None` for the root.
#[must_use]
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }

    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Returns the last segment of `path`.
#[must_use]
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Returns true if `path` is absolute, has no empty, `.` or `..` segments and
/// no trailing slash (the root `/` itself is valid).
#[must_use]
pub fn is_valid_path(path: &str) -> bool {
    if path == "/" {
        return true;
    }

    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };

    rest.split('/')
        .all(|part| !part.is_empty() && part != "." && part != "..")
}
