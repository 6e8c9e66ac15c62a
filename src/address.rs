//! Opaque handle types for code addresses.
//!
//! Registries key their entries by [`Address`] and hand out [`OriginalEntry`]
//! handles for preserved entry points. Callers never receive ownership of raw
//! trampoline buffers - only these handles, which wrap the numeric address
//! without exposing pointer semantics.

use std::fmt;

/// An opaque handle wrapping a numeric code address.
///
/// `Address` is the key type for every registry in the crate. It is a plain
/// value type - copying it has no effect on the memory it names, and it can
/// be null (zero). APIs that require a usable target reject null addresses
/// with [`crate::Error::InvalidArgument`] instead of assuming validity.
///
/// # Examples
///
/// ```rust
/// use veilhook::Address;
///
/// let a = Address::new(0x7fff_0040);
/// assert!(!a.is_null());
/// assert_eq!(a.value(), 0x7fff_0040);
/// assert_eq!(format!("{a}"), "0x7fff0040");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(usize);

impl Address {
    /// The null address.
    pub const NULL: Address = Address(0);

    /// Creates an address handle from a raw numeric value.
    #[must_use]
    pub const fn new(value: usize) -> Self {
        Address(value)
    }

    /// Creates an address handle from a raw pointer.
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Address(ptr as usize)
    }

    /// Returns the raw numeric value of this address.
    #[must_use]
    pub const fn value(&self) -> usize {
        self.0
    }

    /// Returns `true` if this is the null (zero) address.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A handle to the preserved original entry point of a hooked function.
///
/// Returned by [`crate::HookRegistry::register_hook`] on success. The handle
/// stays valid for as long as the hook is installed; calling through it
/// reaches the pre-hook implementation. The backing trampoline (if any) is
/// owned by the backend, never by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OriginalEntry(Address);

impl OriginalEntry {
    /// Wraps an address as an original-entry handle.
    #[must_use]
    pub const fn new(address: Address) -> Self {
        OriginalEntry(address)
    }

    /// Returns the address of the preserved entry point.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.0
    }
}

impl fmt::Display for OriginalEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
