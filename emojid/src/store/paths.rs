use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NameError {
    #[error("name is empty")]
    Empty,
    #[error("name contains unsupported characters: {0}")]
    Unsupported(String),
}

/// Category and asset names become single path components under the asset
/// root, so anything that could escape or nest is rejected outright.
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name == "." || name == ".." {
        return Err(NameError::Unsupported(name.to_string()));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(NameError::Unsupported(name.to_string()));
    }
    Ok(())
}

pub fn category_path(root: &Path, category: &str) -> Result<PathBuf, NameError> {
    validate_name(category)?;
    Ok(root.join(category))
}

pub fn asset_path(root: &Path, category: &str, filename: &str) -> Result<PathBuf, NameError> {
    validate_name(category)?;
    validate_name(filename)?;
    Ok(root.join(category).join(filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_names_under_root() {
        let root = PathBuf::from("/data/emoji");
        let mapped = asset_path(&root, "cats", "a.png").unwrap();
        assert_eq!(mapped, PathBuf::from("/data/emoji/cats/a.png"));
    }

    #[test]
    fn rejects_traversal_components() {
        let root = PathBuf::from("/data/emoji");
        assert!(matches!(
            category_path(&root, ".."),
            Err(NameError::Unsupported(_))
        ));
        assert!(matches!(
            asset_path(&root, "cats", "../../etc/passwd"),
            Err(NameError::Unsupported(_))
        ));
    }

    #[test]
    fn rejects_empty_names() {
        let root = PathBuf::from("/data/emoji");
        assert!(matches!(category_path(&root, ""), Err(NameError::Empty)));
    }
}
