//! File-based storage implementation.

use super::{BoxFuture, Storage, StorageError, StorageResult, is_valid_image_name};
use crate::placement::{Placement, PlacementId};
use std::fs;
use std::path::{Path, PathBuf};

const PLACEMENTS_DIR: &str = "placements";
const IMAGES_DIR: &str = "images";

/// File-based storage.
///
/// Placements are stored as `<base>/placements/<id>.json`, images as
/// `<base>/images/<name>`.
pub struct FileStorage {
    /// Base directory for storage.
    base_path: PathBuf,
}

impl FileStorage {
    /// Create a new file storage with the given base directory.
    ///
    /// Creates the directory tree if it doesn't exist.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        for dir in [PLACEMENTS_DIR, IMAGES_DIR] {
            let path = base_path.join(dir);
            fs::create_dir_all(&path).map_err(|e| {
                StorageError::Io(format!("Failed to create {}: {}", path.display(), e))
            })?;
        }
        Ok(Self { base_path })
    }

    /// Create file storage in the default location.
    ///
    /// On Unix: `~/.local/share/mosaic/`
    /// On Windows: `%LOCALAPPDATA%\mosaic\`
    pub fn default_location() -> StorageResult<Self> {
        Self::new(Self::default_path()?)
    }

    /// The directory used by [`FileStorage::default_location`].
    pub fn default_path() -> StorageResult<PathBuf> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StorageError::Io("Could not determine home directory".to_string()))?;
        Ok(base.join("mosaic"))
    }

    /// Get the base path.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn placement_path(&self, id: PlacementId) -> PathBuf {
        self.base_path
            .join(PLACEMENTS_DIR)
            .join(format!("{}.json", id.as_hyphenated()))
    }

    fn image_path(&self, name: &str) -> StorageResult<PathBuf> {
        if !is_valid_image_name(name) {
            return Err(StorageError::NotFound(name.to_string()));
        }
        Ok(self.base_path.join(IMAGES_DIR).join(name))
    }
}

/// Run filesystem work on tokio's blocking pool when called from a runtime,
/// or inline when there is none.
async fn blocking<T, F>(work: F) -> StorageResult<T>
where
    F: FnOnce() -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle
            .spawn_blocking(work)
            .await
            .map_err(|e| StorageError::Other(format!("Storage task failed: {}", e)))?,
        Err(_) => work(),
    }
}

impl Storage for FileStorage {
    fn save_placement(&self, placement: &Placement) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.placement_path(placement.id);
        let json = match serde_json::to_string_pretty(placement) {
            Ok(j) => j,
            Err(e) => {
                return Box::pin(async move { Err(StorageError::Serialization(e.to_string())) });
            }
        };

        Box::pin(blocking(move || {
            // Write then rename so a crash never leaves a half-written record.
            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, json).map_err(|e| {
                StorageError::Io(format!("Failed to write {}: {}", tmp.display(), e))
            })?;
            fs::rename(&tmp, &path).map_err(|e| {
                StorageError::Io(format!("Failed to write {}: {}", path.display(), e))
            })
        }))
    }

    fn delete_placement(&self, id: PlacementId) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.placement_path(id);

        Box::pin(blocking(move || {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    StorageError::Io(format!("Failed to delete {}: {}", path.display(), e))
                })?;
            }
            Ok(())
        }))
    }

    fn list_placements(&self) -> BoxFuture<'_, StorageResult<Vec<Placement>>> {
        let dir = self.base_path.join(PLACEMENTS_DIR);

        Box::pin(blocking(move || {
            let entries = fs::read_dir(&dir).map_err(|e| {
                StorageError::Io(format!("Failed to read directory: {}", e))
            })?;

            let mut placements = Vec::new();
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().map(|e| e != "json").unwrap_or(true) {
                    continue;
                }
                let json = fs::read_to_string(&path).map_err(|e| {
                    StorageError::Io(format!("Failed to read {}: {}", path.display(), e))
                })?;
                match serde_json::from_str::<Placement>(&json) {
                    Ok(placement) => placements.push(placement),
                    Err(e) => log::warn!("Skipping unreadable placement {}: {}", path.display(), e),
                }
            }
            Ok(placements)
        }))
    }

    fn put_image(&self, name: &str, data: Vec<u8>) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.image_path(name);

        Box::pin(blocking(move || {
            let path = path?;
            fs::write(&path, data).map_err(|e| {
                StorageError::Io(format!("Failed to write {}: {}", path.display(), e))
            })
        }))
    }

    fn get_image(&self, name: &str) -> BoxFuture<'_, StorageResult<Vec<u8>>> {
        let path = self.image_path(name);
        let name_owned = name.to_string();

        Box::pin(blocking(move || {
            let path = path?;
            if !path.exists() {
                return Err(StorageError::NotFound(name_owned));
            }
            fs::read(&path).map_err(|e| {
                StorageError::Io(format!("Failed to read {}: {}", path.display(), e))
            })
        }))
    }

    fn delete_image(&self, name: &str) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.image_path(name);

        Box::pin(blocking(move || {
            let Ok(path) = path else {
                return Ok(());
            };
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    StorageError::Io(format!("Failed to delete {}: {}", path.display(), e))
                })?;
            }
            Ok(())
        }))
    }

    fn list_images(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        let dir = self.base_path.join(IMAGES_DIR);

        Box::pin(blocking(move || {
            let entries = fs::read_dir(&dir).map_err(|e| {
                StorageError::Io(format!("Failed to read directory: {}", e))
            })?;

            let mut names: Vec<String> = entries
                .flatten()
                .filter_map(|entry| entry.file_name().into_string().ok())
                .filter(|name| is_valid_image_name(name))
                .collect();
            names.sort();
            Ok(names)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::storage::block_on;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn placement(x: f64, caption: Option<&str>) -> Placement {
        Placement {
            id: Uuid::new_v4(),
            rect: Rect::new(x, 5.0, 100.0, 50.0).unwrap(),
            image_ref: "tile.png".to_string(),
            caption: caption.map(str::to_string),
            seq: 7,
        }
    }

    #[test]
    fn test_file_storage_save_list() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();

        let a = placement(0.0, Some("first"));
        let b = placement(100.0, None);
        block_on(storage.save_placement(&a)).unwrap();
        block_on(storage.save_placement(&b)).unwrap();

        let mut listed = block_on(storage.list_placements()).unwrap();
        listed.sort_by(|p, q| p.rect.x().total_cmp(&q.rect.x()));
        assert_eq!(listed, vec![a, b]);
    }

    #[test]
    fn test_file_storage_reopen() {
        let dir = tempdir().unwrap();
        let p = placement(0.0, None);
        {
            let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
            block_on(storage.save_placement(&p)).unwrap();
        }

        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(block_on(storage.list_placements()).unwrap(), vec![p]);
    }

    #[test]
    fn test_file_storage_skips_corrupt_records() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        let p = placement(0.0, None);
        block_on(storage.save_placement(&p)).unwrap();

        fs::write(dir.path().join(PLACEMENTS_DIR).join("junk.json"), "{not json").unwrap();
        fs::write(
            dir.path().join(PLACEMENTS_DIR).join("negative.json"),
            r#"{"id":"00000000-0000-0000-0000-000000000000","x":0,"y":0,"w":-1,"h":1,"image_ref":"a"}"#,
        )
        .unwrap();

        assert_eq!(block_on(storage.list_placements()).unwrap(), vec![p]);
    }

    #[test]
    fn test_file_storage_delete() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();

        let p = placement(0.0, None);
        block_on(storage.save_placement(&p)).unwrap();
        block_on(storage.delete_placement(p.id)).unwrap();
        assert!(block_on(storage.list_placements()).unwrap().is_empty());
        block_on(storage.delete_placement(p.id)).unwrap();
    }

    #[test]
    fn test_file_storage_images() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();

        block_on(storage.put_image("b.jpg", vec![0xFF, 0xD8])).unwrap();
        block_on(storage.put_image("a.png", vec![0x89, 0x50])).unwrap();
        assert_eq!(block_on(storage.get_image("b.jpg")).unwrap(), vec![0xFF, 0xD8]);
        assert_eq!(
            block_on(storage.list_images()).unwrap(),
            vec!["a.png".to_string(), "b.jpg".to_string()]
        );

        block_on(storage.delete_image("b.jpg")).unwrap();
        assert!(matches!(
            block_on(storage.get_image("b.jpg")),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_file_storage_inside_runtime() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let p = placement(0.0, None);

        runtime.block_on(async {
            storage.save_placement(&p).await.unwrap();
            storage.put_image("a.png", vec![0x89, 0x50]).await.unwrap();
            assert_eq!(storage.list_placements().await.unwrap(), vec![p.clone()]);
            assert_eq!(storage.get_image("a.png").await.unwrap(), vec![0x89, 0x50]);
        });
    }

    #[test]
    fn test_file_storage_rejects_traversal() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("store")).unwrap();
        fs::write(dir.path().join("secret"), "hidden").unwrap();

        assert!(block_on(storage.put_image("../escape", vec![1])).is_err());
        assert!(matches!(
            block_on(storage.get_image("../secret")),
            Err(StorageError::NotFound(_))
        ));
        block_on(storage.delete_image("../secret")).unwrap();
        assert!(dir.path().join("secret").exists());
    }
}
