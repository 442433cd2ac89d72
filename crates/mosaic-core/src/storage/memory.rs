//! In-memory storage implementation.

use super::{BoxFuture, Storage, StorageError, StorageResult};
use crate::placement::{Placement, PlacementId};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// In-memory storage for testing and ephemeral use.
#[derive(Default)]
pub struct MemoryStorage {
    placements: RwLock<HashMap<PlacementId, Placement>>,
    images: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    /// Create a new empty memory storage.
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(format!("Lock error: {}", e))
}

impl Storage for MemoryStorage {
    fn save_placement(&self, placement: &Placement) -> BoxFuture<'_, StorageResult<()>> {
        let placement = placement.clone();
        Box::pin(async move {
            let mut placements = self.placements.write().map_err(lock_error)?;
            placements.insert(placement.id, placement);
            Ok(())
        })
    }

    fn delete_placement(&self, id: PlacementId) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            let mut placements = self.placements.write().map_err(lock_error)?;
            placements.remove(&id);
            Ok(())
        })
    }

    fn list_placements(&self) -> BoxFuture<'_, StorageResult<Vec<Placement>>> {
        Box::pin(async move {
            let placements = self.placements.read().map_err(lock_error)?;
            Ok(placements.values().cloned().collect())
        })
    }

    fn put_image(&self, name: &str, data: Vec<u8>) -> BoxFuture<'_, StorageResult<()>> {
        let name = name.to_string();
        Box::pin(async move {
            let mut images = self.images.write().map_err(lock_error)?;
            images.insert(name, data);
            Ok(())
        })
    }

    fn get_image(&self, name: &str) -> BoxFuture<'_, StorageResult<Vec<u8>>> {
        let name = name.to_string();
        Box::pin(async move {
            let images = self.images.read().map_err(lock_error)?;
            images
                .get(&name)
                .cloned()
                .ok_or(StorageError::NotFound(name))
        })
    }

    fn delete_image(&self, name: &str) -> BoxFuture<'_, StorageResult<()>> {
        let name = name.to_string();
        Box::pin(async move {
            let mut images = self.images.write().map_err(lock_error)?;
            images.remove(&name);
            Ok(())
        })
    }

    fn list_images(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        Box::pin(async move {
            let images = self.images.read().map_err(lock_error)?;
            Ok(images.keys().cloned().collect())
        })
    }
}
