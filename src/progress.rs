//! Progress reporting for batch operations.
//!
//! Batch loops invoke the callback once per item, before the transfer, with
//! a 1-based index, the item count, and a display label. Loops are strictly
//! sequential, so indices are monotonically increasing.

/// Callback signature: `(current, total, label)`.
pub type ProgressFn<'a> = dyn FnMut(usize, usize, &str) + Send + 'a;

/// Invokes an optional progress callback.
pub(crate) fn report(on_progress: &mut Option<&mut ProgressFn<'_>>, current: usize, total: usize, label: &str) {
    if let Some(cb) = on_progress.as_deref_mut() {
        cb(current, total, label);
    }
}
