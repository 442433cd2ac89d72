//! Storage abstraction for persistence.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::placement::{Placement, PlacementId};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for async operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for mosaic storage backends.
///
/// Holds two kinds of records: committed placements, keyed by id, and
/// uploaded tile images, keyed by their stored name. The guard stays the
/// source of truth at runtime; storage is only read back on startup.
pub trait Storage: Send + Sync {
    /// Save a placement, replacing any record with the same id.
    fn save_placement(&self, placement: &Placement) -> BoxFuture<'_, StorageResult<()>>;

    /// Delete a placement. Deleting a missing record is not an error.
    fn delete_placement(&self, id: PlacementId) -> BoxFuture<'_, StorageResult<()>>;

    /// List every stored placement, in no particular order.
    fn list_placements(&self) -> BoxFuture<'_, StorageResult<Vec<Placement>>>;

    /// Store image bytes under `name`.
    fn put_image(&self, name: &str, data: Vec<u8>) -> BoxFuture<'_, StorageResult<()>>;

    /// Load image bytes.
    fn get_image(&self, name: &str) -> BoxFuture<'_, StorageResult<Vec<u8>>>;

    /// Delete an image. Deleting a missing image is not an error.
    fn delete_image(&self, name: &str) -> BoxFuture<'_, StorageResult<()>>;

    /// List all stored image names, sorted.
    fn list_images(&self) -> BoxFuture<'_, StorageResult<Vec<String>>>;
}

/// Whether `name` is safe to use as a stored image name.
///
/// Only ASCII alphanumerics, `-`, `_` and a single `.` are accepted, which
/// keeps names from escaping the image directory.
pub fn is_valid_image_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && !name.starts_with('.')
        && name.matches('.').count() <= 1
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
pub(crate) fn block_on<F: Future>(f: F) -> F::Output {
    // Simple blocking executor for tests
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn dummy_raw_waker() -> RawWaker {
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            dummy_raw_waker()
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    let mut f = std::pin::pin!(f);

    loop {
        match f.as_mut().poll(&mut cx) {
            Poll::Ready(result) => return result,
            Poll::Pending => {}
        }
    }
}
