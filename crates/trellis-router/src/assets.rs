//! Static asset listing

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RouteError};

/// A file served verbatim from the static directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Path relative to the static directory, `/`-separated
    pub file: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime: Option<String>,
}

/// Lists every file under `dir`, recursively, in name order
///
/// `.DS_Store` files are skipped. A missing directory yields no assets.
pub fn list_assets(dir: &Path) -> Result<Vec<Asset>> {
    let mut assets = Vec::new();
    if dir.is_dir() {
        collect(dir, "", &mut assets)?;
    }
    Ok(assets)
}

fn collect(dir: &Path, prefix: &str, assets: &mut Vec<Asset>) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| RouteError::io(dir, e))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| RouteError::io(dir, e))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        let joined = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", prefix, name)
        };

        let metadata = fs::metadata(&path).map_err(|e| RouteError::io(&path, e))?;
        if metadata.is_dir() {
            collect(&path, &joined, assets)?;
        } else if name != ".DS_Store" {
            assets.push(Asset {
                mime: mime_guess::from_path(&joined)
                    .first_raw()
                    .map(str::to_string),
                file: joined,
                size: metadata.len(),
            });
        }
    }

    Ok(())
}

/// Writes an asset list as a JSON array of `{file, size, type}`
pub fn write_assets(path: &Path, assets: &[Asset]) -> Result<()> {
    let json = serde_json::to_string_pretty(assets).map_err(|source| RouteError::AssetManifest {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RouteError::io(parent, e))?;
    }
    fs::write(path, json).map_err(|e| RouteError::io(path, e))
}

/// Reads an asset list written by [`write_assets`]
pub fn read_assets(path: &Path) -> Result<Vec<Asset>> {
    let json = fs::read_to_string(path).map_err(|e| RouteError::io(path, e))?;
    serde_json::from_str(&json).map_err(|source| RouteError::AssetManifest {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_list_assets() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("img")).unwrap();
        fs::write(dir.path().join("robots.txt"), "User-agent: *").unwrap();
        fs::write(dir.path().join("img/logo.png"), [0u8; 4]).unwrap();
        fs::write(dir.path().join(".DS_Store"), "").unwrap();

        let assets = list_assets(dir.path()).unwrap();

        assert_eq!(
            assets,
            vec![
                Asset {
                    file: "img/logo.png".into(),
                    size: 4,
                    mime: Some("image/png".into()),
                },
                Asset {
                    file: "robots.txt".into(),
                    size: 13,
                    mime: Some("text/plain".into()),
                },
            ]
        );
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_assets(&dir.path().join("static")).unwrap().is_empty());
    }

    #[test]
    fn test_json_shape() {
        let asset = Asset {
            file: "favicon.ico".into(),
            size: 10,
            mime: None,
        };
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json, serde_json::json!({"file": "favicon.ico", "size": 10, "type": null}));
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build/assets.json");
        let assets = vec![Asset {
            file: "a.css".into(),
            size: 1,
            mime: Some("text/css".into()),
        }];

        write_assets(&path, &assets).unwrap();
        assert_eq!(read_assets(&path).unwrap(), assets);
    }
}
