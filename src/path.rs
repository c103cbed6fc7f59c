//! FTP-style path helpers.
//!
//! Remote paths are always `/`-separated regardless of the local platform,
//! so these operate on strings rather than `std::path::Path`.

/// Normalize a remote path: ensure a leading slash, strip trailing slashes,
/// and collapse duplicate separators (empty segments would otherwise leak
/// into parent-listing lookups).
pub fn normalize(path: &str) -> String {
    let mut p = String::with_capacity(path.len() + 1);
    p.push('/');
    for seg in path.split('/').filter(|s| !s.is_empty()) {
        if p.len() > 1 {
            p.push('/');
        }
        p.push_str(seg);
    }
    p
}

/// True if the (normalized) path is the root directory.
pub fn is_root(path: &str) -> bool {
    normalize(path) == "/"
}

/// Split a normalized path into `(parent, base)`.
///
/// Returns `None` for the root, which has no parent.
pub fn split(path: &str) -> Option<(String, String)> {
    let p = normalize(path);
    if p == "/" {
        return None;
    }
    let idx = p.rfind('/').unwrap_or(0);
    let parent = if idx == 0 { "/".to_string() } else { p[..idx].to_string() };
    let base = p[idx + 1..].to_string();
    Some((parent, base))
}

/// Join a directory path and a child name.
pub fn join(dir: &str, name: &str) -> String {
    let d = normalize(dir);
    if d == "/" {
        format!("/{name}")
    } else {
        format!("{d}/{name}")
    }
}
