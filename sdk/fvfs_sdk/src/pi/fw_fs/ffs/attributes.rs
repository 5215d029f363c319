//! Firmware File System (FFS) File Attribute Definitions
//!
//! Based on the values defined in the UEFI Platform Initialization (PI) Specification V1.8A Section 3.2.3.1
//! EFI_FFS_FILE_HEADER.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

/// Type alias for the FFS attribute byte
pub type EfiFfsFileAttributes = u8;

/// Raw FFS attribute constant definitions
pub mod raw {
    /// Large file attribute; the header carries a 64-bit extended size
    pub const LARGE_FILE: u8 = 0x01;
    /// Selects the second data alignment table (128 KB and above)
    pub const DATA_ALIGNMENT_2: u8 = 0x02;
    /// File must be at a fixed address
    pub const FIXED: u8 = 0x04;
    /// Data alignment mask
    pub const DATA_ALIGNMENT: u8 = 0x38;
    /// File checksum attribute
    pub const CHECKSUM: u8 = 0x40;
}

/// Shift of the data alignment field within the attribute byte.
pub const DATA_ALIGNMENT_SHIFT: u8 = 3;

/// Alignment exponents selected by the data alignment field, indexed by its value.
///
/// Table 3.3 in PI spec 1.8 Part III.
pub const DATA_ALIGNMENT_EXPONENTS: [u8; 8] = [0, 4, 7, 9, 10, 12, 15, 16];

/// Alignment exponents selected by the data alignment field when [`raw::DATA_ALIGNMENT_2`] is set.
pub const DATA_ALIGNMENT_2_EXPONENTS: [u8; 8] = [17, 18, 19, 20, 21, 22, 23, 24];
