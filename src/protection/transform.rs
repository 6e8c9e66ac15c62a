//! Keyed, self-inverse byte transform used for memory obfuscation.
//!
//! The transform XORs a region with a keystream generated from a 64-bit key,
//! so applying it twice with the same key is the identity. The key is derived
//! from the region's address, which makes the obfuscated bytes differ between
//! regions holding identical content - the property that defeats signature
//! scanning.

use crate::Address;

/// Derives the keystream key for a region from its address.
///
/// Uses the splitmix64 finalizer so that nearby addresses produce unrelated
/// keys. A zero result is remapped to a fixed non-zero constant so the
/// keystream never degenerates to identity.
#[must_use]
pub fn region_key(address: Address) -> u64 {
    let mut z = (address.value() as u64).wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^= z >> 31;
    if z == 0 {
        0x6a09_e667_f3bc_c909
    } else {
        z
    }
}

/// Applies the keyed transform to `bytes` in place.
///
/// The transform is its own inverse: calling it a second time with the same
/// key restores the original bytes exactly.
///
/// # Examples
///
/// ```rust
/// use veilhook::protection::{apply_keyed_transform, region_key};
///
/// let key = region_key(veilhook::Address::new(0x1000));
/// let mut bytes = *b"signature";
/// apply_keyed_transform(&mut bytes, key);
/// assert_ne!(&bytes, b"signature");
/// apply_keyed_transform(&mut bytes, key);
/// assert_eq!(&bytes, b"signature");
/// ```
pub fn apply_keyed_transform(bytes: &mut [u8], key: u64) {
    let mut state = key;
    for chunk in bytes.chunks_mut(8) {
        // splitmix64 step per 8-byte block of keystream.
        state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^= z >> 31;

        for (byte, pad) in chunk.iter_mut().zip(z.to_le_bytes()) {
            *byte ^= pad;
        }
    }
}
