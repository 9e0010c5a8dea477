//! Resource classification by file extension.
//!
//! Only the final path segment is looked at, and matching is case-insensitive.
//! Query strings are not part of the path and never affect the result.

/// Formats that are already entropy-dense; gzip gains nothing on them.
pub const INCOMPRESSIBLE_EXTENSIONS: &[&str] = &["PNG", "JPG", "JPEG", "IPA", "PLIST"];

/// Extensions treated as static assets.
pub const STATIC_EXTENSIONS: &[&str] = &["PNG", "JPG", "JPEG", "GIF", "CSS", "JS"];

/// Extension of the last path segment, without the dot.
pub fn extension(path: &str) -> Option<&str> {
    let segment = path.rsplit('/').next().unwrap_or(path);
    match segment.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Some(ext),
        _ => None,
    }
}

fn extension_in(path: &str, set: &[&str]) -> bool {
    extension(path)
        .map(|ext| set.iter().any(|candidate| candidate.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Whether a response for `path` is worth gzipping.
pub fn is_compressible(path: &str) -> bool {
    !extension_in(path, INCOMPRESSIBLE_EXTENSIONS)
}

/// Whether `path` looks like a static asset (images, stylesheets, scripts).
pub fn is_static_resource(path: &str) -> bool {
    extension_in(path, STATIC_EXTENSIONS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_of_last_segment() {
        assert_eq!(extension("/a/b/c.json"), Some("json"));
        assert_eq!(extension("/archive.tar.gz"), Some("gz"));
        assert_eq!(extension("/dir.png/file"), None);
        assert_eq!(extension("/"), None);
        assert_eq!(extension("/trailing."), None);
    }

    #[test]
    fn incompressible_formats() {
        for path in ["/a.png", "/a.PNG", "/x/y.Jpg", "/b.jpeg", "/app.ipa", "/manifest.plist"] {
            assert!(!is_compressible(path), "{path}");
        }
        for path in ["/a.json", "/", "/index.html", "/a.gif", "/png"] {
            assert!(is_compressible(path), "{path}");
        }
    }

    #[test]
    fn static_resources() {
        assert!(is_static_resource("/site.css"));
        assert!(is_static_resource("/app.JS"));
        assert!(is_static_resource("/logo.gif"));
        assert!(!is_static_resource("/api/users"));
        assert!(!is_static_resource("/data.json"));
    }
}
