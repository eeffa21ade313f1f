//! Working-memory buffers: owned vs borrowed, plus arena carving
//!
//! Backends need persistent memory (recurrent state), scratch memory
//! (activations), or a single tensor arena. The caller may hand in
//! statically placed buffers (SRAM sections on a device) or let the
//! middleware allocate. [`Buffer`] makes the ownership split explicit:
//! `Owned` memory is freed when the model object drops, `Borrowed` memory
//! is never touched. A partially initialized backend that errors out drops
//! whatever it had allocated so far, which is exactly the rollback the
//! lifecycle requires.

use crate::error::{MlError, Result};

/// Alignment for arena carving, matches typical tensor alignment on MCUs.
pub const ARENA_ALIGN: usize = 16;

/// A working-memory region, either allocated by the middleware or borrowed
/// from the caller.
#[derive(Debug)]
pub enum Buffer<'buf> {
    /// Middleware-allocated, freed on drop.
    Owned(Box<[u8]>),
    /// Caller-provided, never freed by the middleware.
    Borrowed(&'buf mut [u8]),
}

impl<'buf> Buffer<'buf> {
    /// Allocate an owned, zeroed buffer of `len` bytes.
    ///
    /// Allocation failure is reported as [`MlError::AllocFailed`] rather
    /// than aborting, since model buffers are often the largest objects in
    /// a firmware image.
    ///
    /// # Errors
    ///
    /// Returns [`MlError::AllocFailed`] when the allocator cannot satisfy
    /// the request.
    pub fn owned(what: &str, len: usize) -> Result<Self> {
        let mut v: Vec<u8> = Vec::new();
        v.try_reserve_exact(len)
            .map_err(|_| MlError::alloc_failed(what, len))?;
        v.resize(len, 0);
        Ok(Buffer::Owned(v.into_boxed_slice()))
    }

    /// Wrap a caller-provided region, validating it is large enough.
    ///
    /// # Errors
    ///
    /// Returns [`MlError::BadArg`] when the region is smaller than `min_len`.
    pub fn borrowed(what: &str, region: &'buf mut [u8], min_len: usize) -> Result<Self> {
        if region.len() < min_len {
            return Err(MlError::bad_arg(format!(
                "{what} buffer too small: {} < {min_len}",
                region.len()
            )));
        }
        Ok(Buffer::Borrowed(region))
    }

    /// Whether the middleware owns (and will free) this region.
    pub fn is_owned(&self) -> bool {
        matches!(self, Buffer::Owned(_))
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Whether the region is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read access to the region.
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Buffer::Owned(b) => b,
            Buffer::Borrowed(b) => b,
        }
    }

    /// Write access to the region.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Buffer::Owned(b) => b,
            Buffer::Borrowed(b) => b,
        }
    }

    /// Zero the region.
    pub fn clear(&mut self) {
        self.as_mut_slice().fill(0);
    }
}

/// Allocate a zeroed `Vec<T>` of `len` elements, reporting failure as
/// [`MlError::AllocFailed`].
pub(crate) fn try_vec<T: Clone + Default>(what: &str, len: usize) -> Result<Vec<T>> {
    let mut v: Vec<T> = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| MlError::alloc_failed(what, len * std::mem::size_of::<T>()))?;
    v.resize(len, T::default());
    Ok(v)
}

/// Bump-style offset planner over a fixed-capacity arena.
///
/// Hands out aligned byte ranges; the backend indexes its arena buffer with
/// them. Tracks high-water usage so the runtime can report how much arena a
/// model actually needs.
#[derive(Debug)]
pub struct Arena {
    capacity: usize,
    offset: usize,
}

impl Arena {
    /// Create a planner over `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            offset: 0,
        }
    }

    /// Carve `len` bytes, aligned to [`ARENA_ALIGN`].
    ///
    /// # Errors
    ///
    /// Returns [`MlError::BadModel`] when the arena cannot hold the request.
    pub fn carve(&mut self, len: usize) -> Result<std::ops::Range<usize>> {
        let start = self.offset.div_ceil(ARENA_ALIGN) * ARENA_ALIGN;
        let end = start.checked_add(len).ok_or_else(|| {
            MlError::bad_model("tensor arena request overflows address space")
        })?;
        if end > self.capacity {
            return Err(MlError::bad_model(format!(
                "tensor arena exhausted: need {len} bytes, {} remaining",
                self.capacity.saturating_sub(start)
            )));
        }
        self.offset = end;
        Ok(start..end)
    }

    /// Bytes consumed so far (including alignment padding).
    pub fn used(&self) -> usize {
        self.offset
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
