//! Shared, double-buffered value function storage.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};

/// Which float width backs a [`ValueFunctions`], selected by the
/// `usefloat`/`usedouble` configuration directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatWidth {
    F32,
    F64,
}

/// A flat buffer shared across worker threads. Safety relies on the
/// scheduler handing out disjoint index ranges to each worker for the
/// duration of a sweep: no two threads ever touch the same slot
/// concurrently, so no lock is needed on the hot path.
enum RawBuffer {
    F32(Box<[UnsafeCell<f32>]>),
    F64(Box<[UnsafeCell<f64>]>),
}

unsafe impl Sync for RawBuffer {}

impl RawBuffer {
    fn new(width: FloatWidth, len: usize) -> Self {
        match width {
            FloatWidth::F32 => RawBuffer::F32((0..len).map(|_| UnsafeCell::new(0.0f32)).collect()),
            FloatWidth::F64 => RawBuffer::F64((0..len).map(|_| UnsafeCell::new(0.0f64)).collect()),
        }
    }

    fn len(&self) -> usize {
        match self {
            RawBuffer::F32(data) => data.len(),
            RawBuffer::F64(data) => data.len(),
        }
    }

    fn get(&self, index: usize) -> f64 {
        match self {
            RawBuffer::F32(data) => unsafe { *data[index].get() as f64 },
            RawBuffer::F64(data) => unsafe { *data[index].get() },
        }
    }

    /// Caller must guarantee exclusive access to `index` for the
    /// duration of the write (enforced by the scheduler's disjoint
    /// partitioning, not by the type system).
    fn set(&self, index: usize, value: f64) {
        match self {
            RawBuffer::F32(data) => unsafe { *data[index].get() = value as f32 },
            RawBuffer::F64(data) => unsafe { *data[index].get() = value },
        }
    }
}

/// The state-value function over the valid state space, double
/// buffered so a value sweep can read the previous iterate while
/// writing the next one without copying. The two buffers are fixed in
/// place; "swapping" just flips which one is considered current, so
/// the operation is `&self` and safe to call from a designated worker
/// while the others wait at a barrier.
pub struct ValueFunctions {
    buffers: [RawBuffer; 2],
    current_is_zero: AtomicBool,
}

impl ValueFunctions {
    pub fn new(space_size: usize) -> Self {
        Self::with_width(space_size, FloatWidth::F64)
    }

    pub fn with_width(space_size: usize, width: FloatWidth) -> Self {
        ValueFunctions {
            buffers: [RawBuffer::new(width, space_size), RawBuffer::new(width, space_size)],
            current_is_zero: AtomicBool::new(true),
        }
    }

    pub fn len(&self) -> usize {
        self.buffers[0].len()
    }

    fn current_index(&self) -> usize {
        if self.current_is_zero.load(Ordering::SeqCst) {
            0
        } else {
            1
        }
    }

    pub fn get_current(&self, index: usize) -> f64 {
        self.buffers[self.current_index()].get(index)
    }

    pub fn get_next(&self, index: usize) -> f64 {
        self.buffers[1 - self.current_index()].get(index)
    }

    pub fn set_next(&self, index: usize, value: f64) {
        self.buffers[1 - self.current_index()].set(index, value);
    }

    /// Flip which buffer is current. Every worker must have finished
    /// its value sweep before this is called, and no worker may read
    /// or write either buffer concurrently with the flip.
    pub fn swap(&self) {
        let was_zero = self.current_is_zero.load(Ordering::SeqCst);
        self.current_is_zero.store(!was_zero, Ordering::SeqCst);
    }

    /// Largest absolute difference between the two buffers over `range`,
    /// used as the convergence criterion.
    pub fn max_abs_delta_in_range(&self, range: std::ops::Range<usize>) -> f64 {
        range
            .map(|i| (self.get_current(i) - self.get_next(i)).abs())
            .fold(0.0, f64::max)
    }

    pub fn max_abs_delta(&self) -> f64 {
        self.max_abs_delta_in_range(0..self.len())
    }
}
