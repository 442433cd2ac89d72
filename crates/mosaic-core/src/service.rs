//! The mosaic service: the guard plus persistence.
//!
//! Every accepted commit is written to storage before it is reported as
//! accepted, and deleting a placement frees the image it referenced.

use crate::guard::{Authorizer, CommitError, DeleteError, GuardConfig, PlacementGuard};
use crate::image::ImageFormat;
use crate::placement::{NewPlacement, Placement, PlacementId};
use crate::storage::{Storage, StorageError, is_valid_image_name};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by [`MosaicService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error(transparent)]
    Delete(#[from] DeleteError),
    #[error("unsupported image format")]
    UnsupportedImage,
    #[error("image {0} not found")]
    ImageNotFound(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A mass delete removed some placements but could not delete the stored
    /// records of others, which were put back.
    #[error("removed {} placements, {failed} could not be deleted: {source}", .removed.len())]
    ClearIncomplete {
        removed: Vec<Placement>,
        failed: usize,
        source: StorageError,
    },
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Summary of a startup restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub skipped: usize,
}

/// Guard and storage composed behind one API.
pub struct MosaicService {
    guard: PlacementGuard,
    storage: Arc<dyn Storage>,
    /// Images whose deletion is in progress, with the number of releases
    /// running for each.
    releasing: DashMap<String, usize>,
}

impl MosaicService {
    /// Create a service with an empty guard, ignoring anything already stored.
    pub fn new(storage: Arc<dyn Storage>, config: GuardConfig) -> Self {
        Self {
            guard: PlacementGuard::new(config),
            storage,
            releasing: DashMap::new(),
        }
    }

    /// Create a service and load every stored placement back into the guard.
    ///
    /// Records are replayed in commit order; any record that fails validation
    /// or overlaps one restored earlier is skipped and logged.
    pub async fn open(
        storage: Arc<dyn Storage>,
        config: GuardConfig,
    ) -> ServiceResult<(Self, RestoreReport)> {
        let service = Self::new(storage, config);
        let mut stored = service.storage.list_placements().await?;
        stored.sort_by_key(|p| p.seq);

        let mut report = RestoreReport::default();
        for placement in stored {
            let id = placement.id;
            match service.guard.restore(placement) {
                Ok(_) => report.restored += 1,
                Err(e) => {
                    log::warn!("Skipping stored placement {}: {}", id, e);
                    report.skipped += 1;
                }
            }
        }
        log::info!(
            "Restored {} placements ({} skipped)",
            report.restored,
            report.skipped
        );
        Ok((service, report))
    }

    pub fn guard(&self) -> &PlacementGuard {
        &self.guard
    }

    /// Every settled placement, in commit order.
    pub fn list(&self) -> Vec<Placement> {
        self.guard.list()
    }

    pub fn get(&self, id: PlacementId) -> Option<Placement> {
        self.guard.get(id)
    }

    /// Commit a proposal and persist it.
    ///
    /// If the placement cannot be written the guard is rolled back, so a
    /// placement is never visible without being stored.
    pub async fn commit(&self, proposal: NewPlacement) -> ServiceResult<Placement> {
        let placement = self.guard.commit(proposal)?;
        // Checked after the insert: a release that started earlier either saw
        // this placement or is visible here.
        if self.releasing.contains_key(&placement.image_ref) {
            self.guard.remove(placement.id);
            return Err(CommitError::InvalidProposal(format!(
                "image {} is being deleted",
                placement.image_ref
            ))
            .into());
        }
        if let Err(e) = self.storage.save_placement(&placement).await {
            log::error!("Failed to persist placement {}: {}", placement.id, e);
            self.guard.remove(placement.id);
            return Err(e.into());
        }
        Ok(placement)
    }

    /// Delete a placement, its stored record and (if unshared) its image.
    pub async fn delete(
        &self,
        id: PlacementId,
        credential: Option<&str>,
        authorizer: &dyn Authorizer,
    ) -> ServiceResult<Placement> {
        let placement = self.guard.delete(id, credential, authorizer)?;
        if let Err(e) = self.storage.delete_placement(id).await {
            log::error!("Failed to delete stored placement {}: {}", id, e);
            if let Err(restore_err) = self.guard.restore(placement) {
                log::error!("Could not roll back delete of {}: {}", id, restore_err);
            }
            return Err(e.into());
        }
        self.release_image(&placement.image_ref).await;
        Ok(placement)
    }

    /// Delete every placement. Returns what was removed.
    ///
    /// A placement whose stored record cannot be deleted is put back into the
    /// guard with its image, and the call reports
    /// [`ServiceError::ClearIncomplete`].
    pub async fn clear(
        &self,
        credential: Option<&str>,
        authorizer: &dyn Authorizer,
    ) -> ServiceResult<Vec<Placement>> {
        let cleared = self.guard.clear(credential, authorizer)?;
        let mut removed = Vec::with_capacity(cleared.len());
        let mut failed = 0;
        let mut first_error = None;
        for placement in cleared {
            match self.storage.delete_placement(placement.id).await {
                Ok(()) => removed.push(placement),
                Err(e) => {
                    log::error!("Failed to delete stored placement {}: {}", placement.id, e);
                    let id = placement.id;
                    if let Err(restore_err) = self.guard.restore(placement) {
                        log::error!("Could not roll back delete of {}: {}", id, restore_err);
                    }
                    failed += 1;
                    first_error.get_or_insert(e);
                }
            }
        }
        for placement in &removed {
            self.release_image(&placement.image_ref).await;
        }
        log::info!("Cleared {} placements", removed.len());
        match first_error {
            None => Ok(removed),
            Some(source) => Err(ServiceError::ClearIncomplete {
                removed,
                failed,
                source,
            }),
        }
    }

    /// Store an uploaded image under a fresh name and return that name.
    pub async fn upload_image(&self, data: Vec<u8>) -> ServiceResult<String> {
        let format = ImageFormat::from_magic_bytes(&data).ok_or(ServiceError::UnsupportedImage)?;
        let name = format!("{}.{}", Uuid::new_v4(), format.extension());
        let len = data.len();
        self.storage.put_image(&name, data).await?;
        log::info!("Stored image {} ({} bytes)", name, len);
        Ok(name)
    }

    /// Load a stored image and its format.
    pub async fn image(&self, name: &str) -> ServiceResult<(Vec<u8>, ImageFormat)> {
        if !is_valid_image_name(name) {
            return Err(ServiceError::ImageNotFound(name.to_string()));
        }
        let data = match self.storage.get_image(name).await {
            Ok(data) => data,
            Err(StorageError::NotFound(_)) => {
                return Err(ServiceError::ImageNotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let format = ImageFormat::from_magic_bytes(&data)
            .or_else(|| ImageFormat::from_name(name))
            .ok_or(ServiceError::UnsupportedImage)?;
        Ok((data, format))
    }

    /// Names of all stored images.
    pub async fn list_images(&self) -> ServiceResult<Vec<String>> {
        Ok(self.storage.list_images().await?)
    }

    /// Delete a stored image once no settled placement refers to it.
    ///
    /// External URLs are not stored images and are left alone.
    async fn release_image(&self, image_ref: &str) {
        if !is_valid_image_name(image_ref) {
            return;
        }
        // Announce the release before scanning, so a commit racing with it
        // either shows up in the scan or sees the announcement and backs out.
        *self.releasing.entry(image_ref.to_string()).or_insert(0) += 1;
        if !self.guard.list().iter().any(|p| p.image_ref == image_ref) {
            if let Err(e) = self.storage.delete_image(image_ref).await {
                log::warn!("Failed to delete image {}: {}", image_ref, e);
            }
        }
        if let Some(mut count) = self.releasing.get_mut(image_ref) {
            *count -= 1;
        }
        self.releasing.remove_if(image_ref, |_, count| *count == 0);
    }
}
