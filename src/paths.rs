//! Conversions between OS paths under the content root and the rooted, forward-slash document
//! paths (`/notes/a.md`) used as identities everywhere else in the crate.
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR_STR};

/// Utility function to replace separators and convert to unicode (via to_string_lossy) on os path.
pub fn os_path_to_string<P: AsRef<Path>>(os_path_ref: P) -> String {
    os_path_ref
        .as_ref()
        .components()
        .filter_map(|c| match c {
            Component::RootDir | Component::Prefix(_) | Component::CurDir => None,
            _ => Some(c.as_os_str().to_string_lossy().into_owned()),
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub fn string_to_os_path(path_string: &str) -> PathBuf {
    PathBuf::from(path_string.trim_start_matches('/').replace('/', MAIN_SEPARATOR_STR))
}

/// Rooted document path for a file under `root`, or `None` when `abs` lies outside of it.
pub fn doc_path_from_abs(root: &Path, abs: &Path) -> Option<String> {
    let rel = abs.strip_prefix(root).ok()?;
    let joined = os_path_to_string(rel);
    if joined.is_empty() {
        return None;
    }
    Some(format!("/{joined}"))
}

pub fn abs_from_doc_path(root: &Path, doc_path: &str) -> PathBuf {
    root.join(string_to_os_path(doc_path))
}

/// Lexically resolve `.` and `..` against the root. Leading `..` components are dropped, so the
/// result can never escape the content root.
pub fn clean_rooted(path: &str) -> String {
    let mut components: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            _ => components.push(part),
        }
    }
    format!("/{}", components.join("/"))
}

/// True for targets carrying a URI scheme (`https:`, `mailto:`) or a protocol-relative `//` prefix.
pub fn is_external(target: &str) -> bool {
    if target.starts_with("//") {
        return true;
    }
    match target.find(':') {
        Some(idx) if idx > 0 => {
            let scheme = &target[..idx];
            let mut chars = scheme.chars();
            chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

/// Normalize a raw link target into a rooted document path. Fragments and query strings are
/// stripped; external and empty targets yield `None`.
pub fn normalize_link(target: &str) -> Option<String> {
    let target = target.trim().trim_start_matches('<').trim_end_matches('>');
    if target.is_empty() || is_external(target) {
        return None;
    }
    let end = target.find(['#', '?']).unwrap_or(target.len());
    let bare = &target[..end];
    if bare.is_empty() {
        return None;
    }
    let cleaned = clean_rooted(bare);
    if cleaned == "/" {
        return None;
    }
    Some(cleaned)
}

pub fn has_extension(doc_path: &str, extension: &str) -> bool {
    let file = doc_path.rsplit('/').next().unwrap_or(doc_path);
    match file.rsplit_once('.') {
        Some((stem, ext)) => !stem.is_empty() && ext.eq_ignore_ascii_case(extension),
        None => false,
    }
}

/// Any component below `root` starting with a '.'.
pub fn is_hidden(root: &Path, abs: &Path) -> bool {
    abs.strip_prefix(root)
        .map(|rel| {
            rel.components().any(|c| match c {
                Component::Normal(name) => name.to_string_lossy().starts_with('.'),
                _ => false,
            })
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_normalization() {
        assert_eq!(normalize_link("/b.md"), Some("/b.md".to_string()));
        assert_eq!(normalize_link("b.md"), Some("/b.md".to_string()));
        assert_eq!(normalize_link("./dir/../b.md#intro"), Some("/b.md".to_string()));
        assert_eq!(normalize_link("../../img.png?v=2"), Some("/img.png".to_string()));
        assert_eq!(normalize_link("<notes/c d.md>"), Some("/notes/c d.md".to_string()));
        assert_eq!(normalize_link("#section"), None);
        assert_eq!(normalize_link("https://example.com/a.md"), None);
        assert_eq!(normalize_link("mailto:someone@example.com"), None);
        assert_eq!(normalize_link("//cdn.example.com/x.js"), None);
        assert_eq!(normalize_link(""), None);
    }

    #[test]
    fn doc_paths_round_trip_through_os_paths() {
        let root = Path::new("/srv/content");
        let abs = root.join("notes").join("a.md");
        let doc = doc_path_from_abs(root, &abs).unwrap();
        assert_eq!(doc, "/notes/a.md");
        assert_eq!(abs_from_doc_path(root, &doc), abs);
        assert_eq!(doc_path_from_abs(root, Path::new("/elsewhere/a.md")), None);
    }

    #[test]
    fn extensions_and_hidden() {
        assert!(has_extension("/a/b.md", "md"));
        assert!(has_extension("/a/B.MD", "md"));
        assert!(!has_extension("/a/.md", "md"));
        assert!(!has_extension("/a.md/img.png", "md"));
        let root = Path::new("/srv");
        assert!(is_hidden(root, Path::new("/srv/.git/config")));
        assert!(!is_hidden(Path::new("/srv/.root"), Path::new("/srv/.root/a.md")));
    }
}
