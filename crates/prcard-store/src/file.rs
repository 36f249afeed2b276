//! JSON file helpers shared by the stores

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};

/// Create the parent directory of `path` if it does not exist yet
pub(crate) async fn ensure_parent(path: &Path) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }
    }
    Ok(())
}

/// Read and decode a JSON file. A missing or blank file reads as `None`.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    if content.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StoreError::serde(path, e))
}

/// Encode `value` and replace `path` with it.
///
/// The bytes go to a sibling temp file first and are renamed into place, so
/// readers never observe a half-written file.
pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let content = serde_json::to_vec(value).map_err(|e| StoreError::serde(path, e))?;
    let tmp = temp_path(path);

    tokio::fs::write(&tmp, content)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))?;

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}.tmp", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_and_blank_files_read_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let missing: Option<serde_json::Value> = read_json(&path).await.unwrap();
        assert!(missing.is_none());

        tokio::fs::write(&path, "  \n").await.unwrap();
        let blank: Option<serde_json::Value> = read_json(&path).await.unwrap();
        assert!(blank.is_none());
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_json_atomic(&path, &serde_json::json!({"a": 1})).await.unwrap();

        let value: Option<serde_json::Value> = read_json(&path).await.unwrap();
        assert_eq!(value.unwrap()["a"], 1);
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_serde_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let result: StoreResult<Option<serde_json::Value>> = read_json(&path).await;
        assert!(matches!(result, Err(StoreError::Serde { .. })));
    }
}
