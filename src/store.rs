//! The shared, reference-counted pixel store.
//!
//! One [`SharedPixelStore`] is the unit of sharing between [`Image`](crate::Image)
//! handles: handles clone the `Arc`, and the `Arc`'s atomic strong count is
//! the refcount — incremented on handle clone, decremented on drop, with the
//! buffer and record destroyed when the last handle goes away. The count is
//! the only cross-thread state; pixel data is only ever written through a
//! handle that holds the sole reference.
//!
//! A process-wide empty store backs every default-constructed handle. The
//! static keeps it alive for the life of the process, so dropping a handle to
//! it merely decrements the count — its release path is a true no-op.

use std::sync::{Arc, LazyLock};

use crate::buffer::PixelBuffer;

/// Reference-counted record wrapping the pixel storage of one image.
///
/// `None` is the invalid/default state represented by the empty singleton.
/// Never exposed outside the handle type.
#[derive(Clone, Debug, Default)]
pub(crate) struct SharedPixelStore {
    pub(crate) buffer: Option<PixelBuffer>,
}

static EMPTY: LazyLock<Arc<SharedPixelStore>> =
    LazyLock::new(|| Arc::new(SharedPixelStore::default()));

/// A new reference to the process-wide empty store.
pub(crate) fn empty_store() -> Arc<SharedPixelStore> {
    Arc::clone(&EMPTY)
}
