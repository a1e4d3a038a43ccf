use crate::error::{StorageError, StorageResult};

/// Reduces a client supplied filename to its last path component.
///
/// Both separators are honoured since browsers on Windows may send the
/// full local path.
pub fn sanitize_filename(raw: &str) -> StorageResult<String> {
    let name = raw
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "." || name == ".." {
        return Err(StorageError::validation(format!(
            "{:?} is not a usable filename",
            raw
        )));
    }

    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_pass_through() {
        assert_eq!(sanitize_filename("diagram.png").ok().as_deref(), Some("diagram.png"));
        assert_eq!(sanitize_filename(" a b.txt ").ok().as_deref(), Some("a b.txt"));
    }

    #[test]
    fn test_directories_are_stripped() {
        assert_eq!(sanitize_filename("../../etc/passwd").ok().as_deref(), Some("passwd"));
        assert_eq!(
            sanitize_filename("C:\\Users\\me\\cat.jpg").ok().as_deref(),
            Some("cat.jpg"),
        );
    }

    #[test]
    fn test_unusable_names() {
        for raw in ["", "  ", ".", "..", "uploads/", "a/.."] {
            assert!(sanitize_filename(raw).is_err(), "{:?} should be rejected", raw);
        }
    }
}
