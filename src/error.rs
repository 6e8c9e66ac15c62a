use thiserror::Error;

macro_rules! invalid_argument {
    // Single string version
    ($msg:expr) => {
        crate::Error::InvalidArgument($msg.to_string())
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidArgument(format!($fmt, $($arg)*))
    };
}

macro_rules! backend_failure {
    ($msg:expr) => {
        crate::Error::BackendFailure($msg.to_string())
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::BackendFailure(format!($fmt, $($arg)*))
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every fallible operation in the crate returns one of these kinds; nothing in the
/// library aborts the process. Failed operations never leave a registry partially
/// mutated - an error means the tracked state is exactly what it was before the call.
///
/// # Error Categories
///
/// ## Argument Validation
/// - [`Error::InvalidArgument`] - Null address, zero or oversized length
///
/// ## Registry State
/// - [`Error::AlreadyExists`] - Duplicate hook target or already-protected region
/// - [`Error::NotFound`] - Unhook/unprotect requested for an untracked entry
///
/// ## Platform
/// - [`Error::BackendFailure`] - The native redirection mechanism rejected the operation
/// - [`Error::PlatformUnsupported`] - Method interception requested without a
///   dynamic-dispatch runtime
///
/// # Examples
///
/// ```rust
/// use veilhook::{Address, Error, HookRegistry, SlotBackend};
/// use std::sync::Arc;
///
/// let registry = HookRegistry::new(Arc::new(SlotBackend::new()));
///
/// match registry.unregister_hook(Address::new(0x1000)) {
///     Ok(()) => println!("unhooked"),
///     Err(Error::NotFound(key)) => println!("nothing tracked at {key}"),
///     Err(e) => println!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// An argument failed validation before any state was touched.
    ///
    /// Raised for null target or replacement addresses, zero-length protection
    /// requests, and protection lengths exceeding the configured maximum.
    #[error("Invalid argument - {0}")]
    InvalidArgument(String),

    /// The target is already tracked by the registry.
    ///
    /// Hook targets and protected-region addresses are unique keys; a second
    /// install attempt fails with this kind and leaves the existing entry
    /// untouched. Also raised when a concurrent install to the same target is
    /// still in flight.
    ///
    /// The payload names the conflicting key.
    #[error("Entry already exists - {0}")]
    AlreadyExists(String),

    /// No entry is tracked under the given key.
    ///
    /// Raised by unhook/unprotect operations on targets that were never
    /// installed (or were already removed). All registries are left unchanged.
    ///
    /// The payload names the missing key.
    #[error("Entry not found - {0}")]
    NotFound(String),

    /// The native redirection mechanism rejected the operation.
    ///
    /// Unsupported instruction patterns, protected pages, misaligned slots and
    /// similar platform conditions are reported through this kind rather than
    /// crashing the process. When raised during an install, the registry is
    /// unchanged; when raised during a removal, the entry stays tracked so the
    /// registry never claims "unhooked" for code that is still patched.
    #[error("Hook backend failure - {0}")]
    BackendFailure(String),

    /// No dynamic-dispatch runtime is available on this platform.
    ///
    /// Method interception resolves (type, member) pairs through a runtime
    /// selected at startup; on platforms without one, every interceptor
    /// operation fails with this kind instead of being compiled out.
    #[error("No dynamic-dispatch runtime is available on this platform")]
    PlatformUnsupported,
}
