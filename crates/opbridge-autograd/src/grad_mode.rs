//! Gradient Mode - Thread-Local Recording Switch
//!
//! Operations only record into a graph while gradient mode is enabled on the
//! current thread. Guards restore the previous mode when dropped, including
//! during unwinding, so an early return cannot leak a changed mode.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use std::cell::Cell;

// =============================================================================
// Thread-Local Gradient State
// =============================================================================

thread_local! {
    /// Whether gradient recording is enabled for this thread.
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Returns whether gradient recording is currently enabled.
#[must_use]
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

fn set_grad_enabled(enabled: bool) {
    GRAD_ENABLED.with(|g| g.set(enabled));
}

// =============================================================================
// Guards
// =============================================================================

/// RAII guard that sets gradient mode for its scope.
#[derive(Debug)]
pub struct GradModeGuard {
    prev_state: bool,
}

impl GradModeGuard {
    /// Sets gradient mode to `enabled` until the guard is dropped.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        let prev_state = is_grad_enabled();
        set_grad_enabled(enabled);
        Self { prev_state }
    }
}

impl Drop for GradModeGuard {
    fn drop(&mut self) {
        set_grad_enabled(self.prev_state);
    }
}

/// RAII guard that disables gradient recording within its scope.
#[derive(Debug)]
pub struct NoGradGuard {
    _inner: GradModeGuard,
}

impl NoGradGuard {
    /// Disables gradient recording until the guard is dropped.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _inner: GradModeGuard::new(false),
        }
    }
}

impl Default for NoGradGuard {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Executes a closure with gradient recording disabled.
pub fn no_grad<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = NoGradGuard::new();
    f()
}

/// Executes a closure with gradient recording enabled.
pub fn enable_grad<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = GradModeGuard::new(true);
    f()
}

// =============================================================================
// Tests
// =============================================================================
