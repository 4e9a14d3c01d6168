use crate::error::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Serialize `value` as YAML and write it atomically.
pub fn write_yaml<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_yaml::to_string(value)?;
    atomic_write(path, data.as_bytes())
}

/// Read a YAML file, returning `None` when it does not exist.
pub fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    Ok(Some(serde_yaml::from_str(&data)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/state.yaml");
        atomic_write(&path, b"data").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "data");
    }

    #[test]
    fn atomic_write_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.yaml");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn read_yaml_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let got: Option<BTreeMap<String, u32>> =
            read_yaml(&dir.path().join("nope.yaml")).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn yaml_helpers_agree() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.yaml");
        let mut map = BTreeMap::new();
        map.insert("polls".to_string(), 3u32);
        write_yaml(&path, &map).unwrap();
        let back: BTreeMap<String, u32> = read_yaml(&path).unwrap().unwrap();
        assert_eq!(back["polls"], 3);
    }
}
