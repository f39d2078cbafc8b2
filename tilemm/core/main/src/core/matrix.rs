//! Row-major matrix views over caller-owned buffers.

use std::marker::PhantomData;

use crate::api::error::{CoreError, CoreResult};

/// Panic unless `actual >= needed`.
///
/// Kernel entry points call this at the call boundary: an undersized buffer
/// is a contract violation, never something to truncate around.
#[inline]
#[track_caller]
pub fn require_len(what: &str, actual: usize, needed: usize) {
    assert!(
        actual >= needed,
        "{} buffer too small: need {} elements, got {}",
        what,
        needed,
        actual
    );
}

#[track_caller]
fn operand_size(rows: usize, cols: usize) -> usize {
    rows.checked_mul(cols)
        .unwrap_or_else(|| panic!("{}x{} overflows usize", rows, cols))
}

fn checked_size(rows: usize, cols: usize) -> CoreResult<usize> {
    rows.checked_mul(cols)
        .ok_or_else(|| CoreError::DimensionMismatch(format!("{}x{} overflows usize", rows, cols)))
}

/// Immutable row-major view: `data.len() >= rows * cols`.
#[derive(Debug, Clone, Copy)]
pub struct MatRef<'a, T> {
    data: &'a [T],
    rows: usize,
    cols: usize,
}

impl<'a, T> MatRef<'a, T> {
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> CoreResult<Self> {
        let needed = checked_size(rows, cols)?;
        if data.len() < needed {
            return Err(CoreError::BufferTooSmall {
                what: "matrix view",
                needed,
                actual: data.len(),
            });
        }
        Ok(Self { data, rows, cols })
    }

    /// View of a kernel operand named `what`; panics through [`require_len`]
    /// on a short buffer.
    #[track_caller]
    pub fn operand(what: &str, data: &'a [T], rows: usize, cols: usize) -> Self {
        require_len(what, data.len(), operand_size(rows, cols));
        Self { data, rows, cols }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_ptr(&self) -> *const T {
        self.data.as_ptr()
    }

    /// The `rows * cols` prefix of the underlying buffer.
    pub fn as_slice(&self) -> &'a [T] {
        &self.data[..self.rows * self.cols]
    }

    pub fn row(&self, i: usize) -> &'a [T] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }
}

/// Mutable row-major view: `data.len() >= rows * cols`.
#[derive(Debug)]
pub struct MatMut<'a, T> {
    data: &'a mut [T],
    rows: usize,
    cols: usize,
}

impl<'a, T> MatMut<'a, T> {
    pub fn new(data: &'a mut [T], rows: usize, cols: usize) -> CoreResult<Self> {
        let needed = checked_size(rows, cols)?;
        if data.len() < needed {
            return Err(CoreError::BufferTooSmall {
                what: "matrix view",
                needed,
                actual: data.len(),
            });
        }
        Ok(Self { data, rows, cols })
    }

    #[track_caller]
    pub fn operand(what: &str, data: &'a mut [T], rows: usize, cols: usize) -> Self {
        require_len(what, data.len(), operand_size(rows, cols));
        Self { data, rows, cols }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.data.as_mut_ptr()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data[..self.rows * self.cols]
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data[..self.rows * self.cols]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [T] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }
}

/// A mutable buffer shared by workers that each write a disjoint region.
///
/// Holding a `DisjointMut` borrows the buffer mutably for `'a`; the unsafe
/// accessors make each caller responsible for keeping regions apart.
#[derive(Debug)]
pub struct DisjointMut<'a, T> {
    ptr: *mut T,
    len: usize,
    _borrow: PhantomData<&'a mut [T]>,
}

unsafe impl<T: Send> Send for DisjointMut<'_, T> {}
unsafe impl<T: Send> Sync for DisjointMut<'_, T> {}

impl<'a, T> DisjointMut<'a, T> {
    pub fn new(data: &'a mut [T]) -> Self {
        Self {
            ptr: data.as_mut_ptr(),
            len: data.len(),
            _borrow: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_mut_ptr(&self) -> *mut T {
        self.ptr
    }

    /// # Safety
    ///
    /// No other reference may access `start..start + len` while the returned
    /// slice is alive.
    pub unsafe fn slice_mut(&self, start: usize, len: usize) -> &'a mut [T] {
        assert!(
            start.checked_add(len).is_some_and(|end| end <= self.len),
            "region {}..{} outside buffer of {} elements",
            start,
            start.wrapping_add(len),
            self.len
        );
        std::slice::from_raw_parts_mut(self.ptr.add(start), len)
    }
}
