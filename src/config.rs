//! Runtime options.
//!
//! Options are thread-local, like every other piece of runtime state, so two
//! independent runtimes (or two tests) never see each other's settings.

use std::cell::Cell;

/// Frames `settle()` will run before giving up on a feedback loop.
pub const DEFAULT_SETTLE_LIMIT: usize = 64;

/// Tunable runtime behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Upper bound on frames run by [`settle`](crate::scheduler::settle).
    ///
    /// An observation whose callback writes to one of its own dependencies
    /// requeues itself every frame; the limit keeps `settle()` finite.
    pub settle_limit: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            settle_limit: DEFAULT_SETTLE_LIMIT,
        }
    }
}

thread_local! {
    static OPTIONS: Cell<Options> = Cell::new(Options::default());
}

/// Get the current options.
pub fn options() -> Options {
    OPTIONS.with(|o| o.get())
}

/// Replace the current options.
pub fn set_options(options: Options) {
    OPTIONS.with(|o| o.set(options));
}

/// Get the settle limit.
pub fn settle_limit() -> usize {
    options().settle_limit
}

/// Set the settle limit. Zero is treated as one.
pub fn set_settle_limit(limit: usize) {
    OPTIONS.with(|o| {
        let mut current = o.get();
        current.settle_limit = limit.max(1);
        o.set(current);
    });
}

/// Restore default options (for testing).
pub fn reset_options() {
    set_options(Options::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_update() {
        reset_options();
        assert_eq!(settle_limit(), DEFAULT_SETTLE_LIMIT);

        set_settle_limit(3);
        assert_eq!(settle_limit(), 3);

        set_settle_limit(0);
        assert_eq!(settle_limit(), 1);

        reset_options();
        assert_eq!(options(), Options::default());
    }
}
