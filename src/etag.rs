//! Validator (etag) computation.
//!
//! An etag is an opaque content fingerprint used to short-circuit redundant
//! transfers: two equal validators mean the caller may treat the content as
//! unchanged. It is derived deterministically from `(mtime, size)`, falling
//! back to `(path, size)` when the listing carried no usable timestamp.
//! Never a cryptographic guarantee.

use xxhash_rust::xxh3::xxh3_64;

/// Compute the validator for a resource.
///
/// Format mirrors HTTP weak validators: `"<mtime36>-<size36>"`, quotes
/// included, with the path hash standing in for a missing mtime.
pub fn calc_etag(path: &str, mtime: Option<i64>, size: u64) -> String {
    match mtime {
        Some(t) => format!("\"{}-{}\"", base36(t as u64), base36(size)),
        None => format!("\"{}-{}\"", base36(xxh3_64(path.as_bytes())), base36(size)),
    }
}

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = [0u8; 13];
    let mut i = buf.len();
    while n > 0 {
        i -= 1;
        buf[i] = DIGITS[(n % 36) as usize];
        n /= 36;
    }
    String::from_utf8_lossy(&buf[i..]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_matches_known_values() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
        assert_eq!(base36(1234567890), "kf12oi");
    }

    #[test]
    fn etag_is_deterministic() {
        let a = calc_etag("/a.txt", Some(1234567890), 42);
        let b = calc_etag("/a.txt", Some(1234567890), 42);
        assert_eq!(a, b);
        assert_eq!(a, "\"kf12oi-16\"");
    }

    #[test]
    fn etag_changes_with_size_and_time() {
        let base = calc_etag("/a", Some(100), 10);
        assert_ne!(base, calc_etag("/a", Some(101), 10));
        assert_ne!(base, calc_etag("/a", Some(100), 11));
    }

    #[test]
    fn fallback_uses_path() {
        let a = calc_etag("/a", None, 10);
        let b = calc_etag("/b", None, 10);
        assert_ne!(a, b);
        // Same path, same size: stable across calls.
        assert_eq!(a, calc_etag("/a", None, 10));
    }
}
