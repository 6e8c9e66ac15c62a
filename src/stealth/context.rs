//! Scoped call-stack sanitization around protected operations.

use log::debug;

/// Capability that alters and restores caller-visible execution context.
///
/// A sanitizer temporarily scrubs frame metadata that stack-walking
/// introspection would otherwise observe (return addresses, frame markers,
/// thread-local breadcrumbs). The concrete mechanism is platform-specific
/// and supplied by the embedder; the crate guarantees only the pairing
/// discipline: every `sanitize` is matched by exactly one `restore`.
pub trait FrameSanitizer: Send + Sync {
    /// Scrubs caller-visible frame metadata.
    fn sanitize(&self);

    /// Restores the metadata captured by the matching [`Self::sanitize`].
    fn restore(&self);
}

/// A sanitizer that does nothing.
///
/// Used where call-stack protection is configured off, and as the default
/// for composition roots built without a platform sanitizer.
pub struct NoopSanitizer;

impl FrameSanitizer for NoopSanitizer {
    fn sanitize(&self) {}

    fn restore(&self) {}
}

/// Scoped wrapper that sanitizes execution context for the duration of a
/// protected operation.
///
/// On entry the sanitizer scrubs caller-visible frame metadata (when
/// enabled); the prior state is restored when the context is dropped -
/// exactly once, on every exit path, including unwinding out of the wrapped
/// operation.
///
/// # Examples
///
/// ```rust
/// use veilhook::{NoopSanitizer, StealthContext};
///
/// let sanitizer = NoopSanitizer;
/// let result = StealthContext::run(&sanitizer, true, || 2 + 2);
/// assert_eq!(result, 4);
/// ```
pub struct StealthContext<'a> {
    sanitizer: &'a dyn FrameSanitizer,
    active: bool,
}

impl<'a> StealthContext<'a> {
    /// Enters a sanitized scope.
    ///
    /// When `enabled` is false the context is inert: nothing is sanitized
    /// and nothing will be restored.
    #[must_use]
    pub fn enter(sanitizer: &'a dyn FrameSanitizer, enabled: bool) -> Self {
        if enabled {
            sanitizer.sanitize();
            debug!("entered sanitized execution scope");
        }
        StealthContext {
            sanitizer,
            active: enabled,
        }
    }

    /// Runs `operation` inside a sanitized scope and returns its value.
    ///
    /// Restoration happens when the scope guard drops, whether `operation`
    /// returns normally or unwinds.
    pub fn run<T>(sanitizer: &'a dyn FrameSanitizer, enabled: bool, operation: impl FnOnce() -> T) -> T {
        let _scope = StealthContext::enter(sanitizer, enabled);
        operation()
    }

    /// Returns `true` if this scope sanitized on entry (and will restore).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for StealthContext<'_> {
    fn drop(&mut self) {
        if self.active {
            // Drop runs once per value, so restoration cannot double-fire.
            self.sanitizer.restore();
            debug!("restored execution scope");
        }
    }
}
