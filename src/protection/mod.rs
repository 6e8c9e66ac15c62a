//! Memory signature obfuscation and restoration.
//!
//! The [`ProtectionRegistry`] applies a reversible, address-keyed byte
//! transform to memory regions so that signature scanners do not find the
//! bytes they are looking for, and restores the saved original bytes on
//! demand. The registry exclusively owns the saved buffers; callers only
//! name regions by address.
//!
//! # Invariants
//!
//! - At most one [`RegionState::Active`] region per address.
//! - `saved.len()` always equals the protected length.
//! - Protect followed by unprotect restores the region bit-for-bit.

mod transform;

pub use transform::{apply_keyed_transform, region_key};

use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, warn};

use crate::{stealth::CallbackBus, Address, Error, Result};

/// Lifecycle state of a protected region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    /// The region currently holds obfuscated bytes.
    Active,
    /// The original bytes have been written back.
    Restored,
}

/// A tracked memory region with its saved pre-obfuscation bytes.
#[derive(Debug)]
pub struct ProtectedRegion {
    /// Start address of the region.
    pub address: Address,
    /// Length of the region in bytes.
    pub len: usize,
    /// The original bytes, owned by the registry.
    saved: Vec<u8>,
    /// Current lifecycle state.
    pub state: RegionState,
}

impl ProtectedRegion {
    /// The saved original bytes (read-only).
    #[must_use]
    pub fn saved_bytes(&self) -> &[u8] {
        &self.saved
    }
}

/// Registry of obfuscated memory regions.
///
/// # Region Contract
///
/// Every address passed to [`ProtectionRegistry::protect`] must name a
/// readable, writable region of at least the given length that stays alive
/// and is not concurrently rewritten by other code until it is unprotected.
/// The registry copies bytes in and out through raw pointers; passing an
/// address that violates the contract is undefined behavior.
///
/// # Examples
///
/// ```rust
/// use veilhook::{Address, ProtectionRegistry};
///
/// let registry = ProtectionRegistry::new(64 * 1024);
///
/// let mut buffer = vec![0xCCu8; 64];
/// let address = Address::from_ptr(buffer.as_mut_ptr());
///
/// registry.protect(address, buffer.len())?;
/// assert_ne!(buffer, vec![0xCCu8; 64]); // signature gone
///
/// registry.unprotect(address)?;
/// assert_eq!(buffer, vec![0xCCu8; 64]); // bit-for-bit restore
/// # Ok::<(), veilhook::Error>(())
/// ```
pub struct ProtectionRegistry {
    regions: DashMap<Address, ProtectedRegion>,
    max_len: usize,
    bus: Option<Arc<CallbackBus>>,
}

impl ProtectionRegistry {
    /// Creates a registry accepting regions up to `max_len` bytes.
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        ProtectionRegistry {
            regions: DashMap::new(),
            max_len,
            bus: None,
        }
    }

    /// Creates a registry that notifies the bus's protection callbacks on
    /// every successful protect.
    #[must_use]
    pub fn with_callbacks(max_len: usize, bus: Arc<CallbackBus>) -> Self {
        ProtectionRegistry {
            regions: DashMap::new(),
            max_len,
            bus: Some(bus),
        }
    }

    /// Obfuscates `len` bytes at `address` and tracks the region as Active.
    ///
    /// The original bytes are copied into a registry-owned buffer before the
    /// keyed transform is applied in place.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for a null address, zero length, or a
    ///   length exceeding the configured maximum.
    /// - [`Error::AlreadyExists`] if the address already has an Active
    ///   region; its saved buffer is unchanged (no double-wrap).
    pub fn protect(&self, address: Address, len: usize) -> Result<()> {
        if address.is_null() {
            return Err(invalid_argument!("null region address"));
        }
        if len == 0 {
            return Err(invalid_argument!("zero-length region"));
        }
        if len > self.max_len {
            return Err(invalid_argument!(
                "region length {len} exceeds maximum {}",
                self.max_len
            ));
        }

        match self.regions.entry(address) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(Error::AlreadyExists(address.to_string()));
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let mut saved = vec![0u8; len];
                // SAFETY: the region contract guarantees `address..address+len`
                // is readable and alive for the duration of the protection.
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        address.value() as *const u8,
                        saved.as_mut_ptr(),
                        len,
                    );
                }

                let mut obfuscated = saved.clone();
                apply_keyed_transform(&mut obfuscated, region_key(address));

                // SAFETY: same contract; the region is also writable.
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        obfuscated.as_ptr(),
                        address.value() as *mut u8,
                        len,
                    );
                }

                vacant.insert(ProtectedRegion {
                    address,
                    len,
                    saved,
                    state: RegionState::Active,
                });
            }
        }
        debug!("protected {len} bytes at {address}");
        // Fired outside the shard lock so callbacks may re-enter the
        // registry.
        if let Some(bus) = &self.bus {
            bus.notify_protection_callbacks();
        }
        Ok(())
    }

    /// Writes the saved original bytes back and releases the region.
    ///
    /// The write-back happens while the entry is still tracked, so a
    /// concurrent `protect` of the same address can never observe the region
    /// untracked with obfuscated bytes still in place and snapshot those as
    /// its "original".
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no Active region is tracked at
    /// `address` (including while a concurrent restore is in flight); all
    /// registries are left unchanged.
    pub fn unprotect(&self, address: Address) -> Result<()> {
        {
            let Some(mut region) = self.regions.get_mut(&address) else {
                return Err(Error::NotFound(address.to_string()));
            };
            if region.state != RegionState::Active {
                // Another thread's restore is in flight.
                return Err(Error::NotFound(address.to_string()));
            }

            // SAFETY: region contract as in `protect`; `saved.len() == len`.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    region.saved.as_ptr(),
                    address.value() as *mut u8,
                    region.len,
                );
            }
            region.state = RegionState::Restored;
            debug!("restored {} bytes at {address}", region.len);
        }
        // Untracked only after the write-back has committed.
        self.regions.remove(&address);
        Ok(())
    }

    /// Best-effort restoration of every Active region.
    ///
    /// Never fails; returns the number of regions restored.
    pub fn clear_all(&self) -> usize {
        let addresses: Vec<Address> = self.regions.iter().map(|entry| *entry.key()).collect();

        let mut cleared = 0;
        for address in addresses {
            if self.unprotect(address).is_ok() {
                cleared += 1;
            } else {
                warn!("region at {address} vanished during clear");
            }
        }
        debug!("cleared {cleared} protected regions");
        cleared
    }

    /// Returns `true` if an Active region is tracked at `address`.
    #[must_use]
    pub fn is_protected(&self, address: Address) -> bool {
        self.regions.contains_key(&address)
    }

    /// Number of Active regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns `true` if no regions are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Length of the saved buffer tracked for `address`, if Active.
    #[must_use]
    pub fn region_len(&self, address: Address) -> Option<usize> {
        self.regions.get(&address).map(|region| region.len)
    }
}
