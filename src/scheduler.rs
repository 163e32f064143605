//! Frame Scheduler - The animation-frame stand-in.
//!
//! Observations never re-run inside the write that invalidated them. They
//! request a frame instead, and the host drives frames by calling
//! [`run_frame`] (once per display refresh) or [`settle`] (until nothing is
//! pending).
//!
//! # Pattern
//!
//! - `request_frame` queues a callback and returns its id
//! - `cancel_frame` drops a queued callback, so a requester can replace it
//! - `run_frame` runs everything queued before the call; callbacks queued
//!   while it runs wait for the next frame
//!
//! # Example
//!
//! ```ignore
//! use blixt::scheduler::{request_frame, run_frame};
//!
//! let id = request_frame(|| println!("painted"));
//! run_frame();
//! ```

use std::cell::{Cell, RefCell};

use indexmap::IndexMap;
use tracing::{trace, warn};

use crate::config;

/// Handle to a queued frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(u64);

type FrameCallback = Box<dyn FnOnce()>;

thread_local! {
    /// Callbacks waiting for the next frame, in request order.
    static QUEUE: RefCell<IndexMap<u64, FrameCallback>> = RefCell::new(IndexMap::new());

    static NEXT_FRAME: Cell<u64> = const { Cell::new(1) };
}

// =============================================================================
// PUBLIC API
// =============================================================================

/// Queue a callback for the next frame.
pub fn request_frame<F>(callback: F) -> FrameId
where
    F: FnOnce() + 'static,
{
    let id = NEXT_FRAME.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    });

    QUEUE.with(|queue| {
        queue.borrow_mut().insert(id, Box::new(callback));
    });

    FrameId(id)
}

/// Drop a queued callback. Returns false if it already ran or was cancelled.
pub fn cancel_frame(id: FrameId) -> bool {
    QUEUE.with(|queue| queue.borrow_mut().shift_remove(&id.0).is_some())
}

/// Run every callback queued so far. Returns how many ran.
pub fn run_frame() -> usize {
    let callbacks = QUEUE.with(|queue| std::mem::take(&mut *queue.borrow_mut()));
    let count = callbacks.len();

    for (_, callback) in callbacks {
        callback();
    }

    if count > 0 {
        trace!(callbacks = count, "frame");
    }

    count
}

pub fn has_pending_frame() -> bool {
    QUEUE.with(|queue| !queue.borrow().is_empty())
}

pub fn pending_frames() -> usize {
    QUEUE.with(|queue| queue.borrow().len())
}

/// Run frames until nothing is pending. Returns the number of frames run.
///
/// Stops after [`settle_limit`](config::settle_limit) frames, leaving the
/// rest queued, so a callback that keeps invalidating itself cannot hang
/// the caller.
pub fn settle() -> usize {
    let limit = config::settle_limit();
    let mut frames = 0;

    while has_pending_frame() {
        if frames == limit {
            warn!(limit, pending = pending_frames(), "settle limit reached");
            break;
        }
        run_frame();
        frames += 1;
    }

    frames
}

/// Drop all queued callbacks (for testing).
pub fn reset_frames() {
    QUEUE.with(|queue| queue.borrow_mut().clear());
}
