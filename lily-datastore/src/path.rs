use crate::FsError;

/// Check a single node name: non-empty, no path separator, no dot
/// components.
pub fn validate_node_name(name: &str) -> Result<(), FsError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(FsError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Split a drive path into its components.
///
/// A single leading `/` is optional; the empty path (or `/`) identifies the
/// root. Empty segments and `.`/`..` components are rejected.
pub fn split_path(path: &str) -> Result<Vec<String>, FsError> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let mut components = Vec::new();
    for segment in trimmed.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(FsError::InvalidName(path.to_string()));
        }
        components.push(segment.to_string());
    }
    Ok(components)
}

/// The canonical rendering of a component list, used in error messages and
/// for the lexicographic part of the lock order.
pub fn join_path(components: &[String]) -> String {
    if components.is_empty() {
        return "/".to_string();
    }
    let mut path = String::new();
    for component in components {
        path.push('/');
        path.push_str(component);
    }
    path
}

/// True when `ancestor` is a (not necessarily proper) prefix of `path`.
pub fn is_prefix(ancestor: &[String], path: &[String]) -> bool {
    ancestor.len() <= path.len() && ancestor.iter().zip(path.iter()).all(|(a, b)| a == b)
}

#[cfg(test)]
mod test {
    use super::{is_prefix, join_path, split_path};

    #[test]
    fn test_split_path() {
        assert!(split_path("").unwrap().is_empty());
        assert!(split_path("/").unwrap().is_empty());
        assert_eq!(split_path("/a/b").unwrap(), vec!["a", "b"]);
        assert_eq!(split_path("a/b").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_split_path_rejects() {
        assert!(split_path("a//b").is_err());
        assert!(split_path("a/").is_err());
        assert!(split_path("//").is_err());
        assert!(split_path("./a").is_err());
        assert!(split_path("a/../b").is_err());
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path(&[]), "/");
        assert_eq!(
            join_path(&["a".to_string(), "b".to_string()]),
            "/a/b"
        );
    }

    #[test]
    fn test_is_prefix() {
        let a = vec!["x".to_string()];
        let ab = vec!["x".to_string(), "y".to_string()];
        assert!(is_prefix(&a, &ab));
        assert!(is_prefix(&a, &a));
        assert!(!is_prefix(&ab, &a));
    }
}
