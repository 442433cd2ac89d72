//! Placement consistency guard.
//!
//! The guard is the single source of truth for which tiles are settled. Its
//! [`PlacementGuard::commit`] is an atomic check-and-insert: a proposal is
//! accepted only if, at the instant of commit, it overlaps no settled tile.
//!
//! Mutual exclusion is per region rather than global. The plane is divided
//! into square cells and each cell owns a mutex over the ids of placements
//! that touch it. A commit locks every cell its rectangle covers (in sorted
//! order, so concurrent commits cannot deadlock), checks only the placements
//! registered there, and inserts before releasing. Two rectangles that
//! overlap always share at least one cell, so they serialize and exactly one
//! wins; commits in disjoint cells never contend.

use crate::geometry::{DEFAULT_TOLERANCE, GeometryError, Rect, overlaps};
use crate::placement::{NewPlacement, Placement, PlacementId, normalize_caption};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use uuid::Uuid;

/// Default edge length of a locking cell (in world units).
pub const DEFAULT_CELL_SIZE: f64 = 512.0;

/// Default upper bound on a tile's width or height.
pub const DEFAULT_MAX_EXTENT: f64 = 16_384.0;

/// Default bound on how far any tile edge may lie from the origin.
pub const DEFAULT_MAX_COORDINATE: f64 = 1.0e9;

/// Default maximum caption length, in characters.
pub const DEFAULT_MAX_CAPTION_LEN: usize = 280;

/// Guard configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Overlap tolerance; touching within this distance is allowed.
    pub tolerance: f64,
    /// Edge length of a locking cell.
    pub cell_size: f64,
    /// Largest accepted width or height.
    pub max_extent: f64,
    /// Largest accepted absolute coordinate of any edge.
    pub max_coordinate: f64,
    /// Longest accepted caption.
    pub max_caption_len: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            cell_size: DEFAULT_CELL_SIZE,
            max_extent: DEFAULT_MAX_EXTENT,
            max_coordinate: DEFAULT_MAX_COORDINATE,
            max_caption_len: DEFAULT_MAX_CAPTION_LEN,
        }
    }
}

/// Why a commit was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommitError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(#[from] GeometryError),
    #[error("invalid placement: {0}")]
    InvalidProposal(String),
    /// Another settled placement occupies part of the proposed area.
    #[error("overlaps existing placement {0}")]
    OverlapConflict(PlacementId),
}

/// Why a deletion was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeleteError {
    #[error("not authorized to delete placements")]
    Unauthorized,
    #[error("placement {0} not found")]
    NotFound(PlacementId),
}

/// Decides whether a caller-supplied credential grants deletion rights.
///
/// How the credential is checked is up to the implementation; the guard only
/// needs a yes or no.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, credential: Option<&str>) -> bool;
}

type CellKey = (i64, i64);
type Cell = Arc<Mutex<Vec<PlacementId>>>;

fn lock_cell(cell: &Cell) -> MutexGuard<'_, Vec<PlacementId>> {
    // A panic while holding a cell leaves at worst a stale id, which lookups skip.
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Authoritative, concurrency-safe set of settled placements.
pub struct PlacementGuard {
    config: GuardConfig,
    placements: DashMap<PlacementId, Placement>,
    cells: DashMap<CellKey, Cell>,
    next_seq: AtomicU64,
}

impl Default for PlacementGuard {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}

impl PlacementGuard {
    /// Create an empty guard.
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            placements: DashMap::new(),
            cells: DashMap::new(),
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Number of settled placements.
    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Look up a placement by id.
    pub fn get(&self, id: PlacementId) -> Option<Placement> {
        self.placements.get(&id).map(|entry| entry.value().clone())
    }

    /// Snapshot of every settled placement, in commit order.
    pub fn list(&self) -> Vec<Placement> {
        let mut all: Vec<Placement> = self
            .placements
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|p| p.seq);
        all
    }

    /// Validate and atomically insert a proposal.
    pub fn commit(&self, proposal: NewPlacement) -> Result<Placement, CommitError> {
        let caption = self.validate(&proposal)?;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let placement = Placement {
            id: Uuid::new_v4(),
            rect: proposal.rect,
            image_ref: proposal.image_ref,
            caption,
            seq,
        };
        self.insert(placement)
    }

    /// Re-admit a previously stored placement (startup load).
    ///
    /// The same overlap check applies, so a corrupted store cannot smuggle
    /// overlapping tiles back in.
    pub fn restore(&self, placement: Placement) -> Result<Placement, CommitError> {
        self.check_rect(&placement.rect)?;
        if self.placements.contains_key(&placement.id) {
            return Err(CommitError::InvalidProposal(format!(
                "duplicate placement id {}",
                placement.id
            )));
        }
        self.next_seq.fetch_max(placement.seq.saturating_add(1), Ordering::Relaxed);
        self.insert(placement)
    }

    /// Delete a placement once the authorizer accepts the credential.
    pub fn delete(
        &self,
        id: PlacementId,
        credential: Option<&str>,
        authorizer: &dyn Authorizer,
    ) -> Result<Placement, DeleteError> {
        if !authorizer.authorize(credential) {
            log::warn!("Rejected unauthorized delete of placement {}", id);
            return Err(DeleteError::Unauthorized);
        }
        self.remove(id).ok_or(DeleteError::NotFound(id))
    }

    /// Delete every placement once the authorizer accepts the credential.
    pub fn clear(
        &self,
        credential: Option<&str>,
        authorizer: &dyn Authorizer,
    ) -> Result<Vec<Placement>, DeleteError> {
        if !authorizer.authorize(credential) {
            log::warn!("Rejected unauthorized mass delete");
            return Err(DeleteError::Unauthorized);
        }
        let ids: Vec<PlacementId> = self.placements.iter().map(|entry| *entry.key()).collect();
        Ok(ids.into_iter().filter_map(|id| self.remove(id)).collect())
    }

    /// Remove a placement without an authorization check.
    ///
    /// Used to roll back a commit whose persistence failed.
    pub fn remove(&self, id: PlacementId) -> Option<Placement> {
        let (_, placement) = self.placements.remove(&id)?;
        for key in self.cell_keys(&placement.rect) {
            let Some(cell) = self.cells.get(&key).map(|entry| entry.value().clone()) else {
                continue;
            };
            lock_cell(&cell).retain(|other| *other != id);
            drop(cell);
            // Only reclaim a cell nobody else holds; handles are cloned solely
            // under the map's shard lock, which remove_if also holds.
            self.cells.remove_if(&key, |_, cell| {
                Arc::strong_count(cell) == 1 && lock_cell(cell).is_empty()
            });
        }
        log::info!("Removed placement {}", id);
        Some(placement)
    }

    fn validate(&self, proposal: &NewPlacement) -> Result<Option<String>, CommitError> {
        self.check_rect(&proposal.rect)?;
        if proposal.image_ref.trim().is_empty() {
            return Err(CommitError::InvalidProposal(
                "image_ref must not be empty".to_string(),
            ));
        }
        let caption = normalize_caption(proposal.caption.clone());
        if let Some(caption) = &caption {
            let len = caption.chars().count();
            if len > self.config.max_caption_len {
                return Err(CommitError::InvalidProposal(format!(
                    "caption is {} characters, limit is {}",
                    len, self.config.max_caption_len
                )));
            }
        }
        Ok(caption)
    }

    fn check_rect(&self, rect: &Rect) -> Result<(), GeometryError> {
        rect.check_extent(self.config.max_extent)?;
        rect.check_bounds(self.config.max_coordinate)
    }

    /// Every cell the rectangle's closed extent touches, in sorted order.
    fn cell_keys(&self, rect: &Rect) -> Vec<CellKey> {
        let size = self.config.cell_size;
        let x0 = (rect.x() / size).floor() as i64;
        let x1 = (rect.right() / size).floor() as i64;
        let y0 = (rect.y() / size).floor() as i64;
        let y1 = (rect.bottom() / size).floor() as i64;
        let mut keys = Vec::with_capacity(((x1 - x0 + 1) * (y1 - y0 + 1)) as usize);
        for cx in x0..=x1 {
            for cy in y0..=y1 {
                keys.push((cx, cy));
            }
        }
        keys
    }

    fn insert(&self, placement: Placement) -> Result<Placement, CommitError> {
        let keys = self.cell_keys(&placement.rect);
        // Clone the handles first so no map shard lock is held while waiting on a cell.
        let cells: Vec<Cell> = keys
            .iter()
            .map(|key| self.cells.entry(*key).or_default().value().clone())
            .collect();
        let mut guards: Vec<MutexGuard<'_, Vec<PlacementId>>> = cells.iter().map(lock_cell).collect();

        for guard in &guards {
            for other_id in guard.iter() {
                let Some(other) = self.placements.get(other_id) else {
                    continue;
                };
                if overlaps(&placement.rect, &other.rect, self.config.tolerance) {
                    log::info!(
                        "Rejected placement at ({}, {}): overlaps {}",
                        placement.rect.x(),
                        placement.rect.y(),
                        other.id
                    );
                    return Err(CommitError::OverlapConflict(other.id));
                }
            }
        }

        self.placements.insert(placement.id, placement.clone());
        for guard in &mut guards {
            guard.push(placement.id);
        }
        log::info!(
            "Committed placement {} at ({}, {}) {}x{}",
            placement.id,
            placement.rect.x(),
            placement.rect.y(),
            placement.rect.width(),
            placement.rect.height()
        );
        Ok(placement)
    }

    #[cfg(test)]
    fn cell_count(&self) -> usize {
        self.cells.len()
    }
}
