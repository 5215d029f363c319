//! Alignment helpers.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

/// Aligns `value` up to the next multiple of `align`.
///
/// Returns an error if `align` is not a power of two or the result overflows.
///
/// ## Example
///
/// ```
/// use fvfs_sdk::base::align_up;
///
/// assert_eq!(align_up(0x19, 8), Ok(0x20));
/// assert_eq!(align_up(0x20, 8), Ok(0x20));
/// assert!(align_up(0x20, 3).is_err());
/// ```
pub const fn align_up(value: usize, align: usize) -> Result<usize, &'static str> {
    if !align.is_power_of_two() {
        return Err("`align` must be a power of two");
    }
    let align_mask = align - 1;
    if value & align_mask == 0 {
        Ok(value)
    } else {
        match (value | align_mask).checked_add(1) {
            Some(aligned) => Ok(aligned),
            None => Err("attempt to add with overflow"),
        }
    }
}
