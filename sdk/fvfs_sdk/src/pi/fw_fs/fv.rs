//! Firmware Volume (FV) Definitions
//!
//! Based on the values defined in the UEFI Platform Initialization (PI) Specification V1.8A 3.1 Firmware Storage
//! Code Definitions and 3.2.1 Firmware Volume.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use r_efi::efi;

pub mod attributes;
pub mod file;

/// Firmware File System revision number
pub const FFS_REVISION: u8 = 2;

/// `_FVH`
pub const SIGNATURE: u32 = u32::from_le_bytes(*b"_FVH");

/// Size of the fixed part of `EFI_FIRMWARE_VOLUME_HEADER`, up to the block map.
pub const HEADER_SIZE: usize = 56;
/// Size of one `EFI_FV_BLOCK_MAP_ENTRY`.
pub const BLOCK_MAP_ENTRY_SIZE: usize = 8;
/// Size of `EFI_FIRMWARE_VOLUME_EXT_HEADER`.
pub const EXT_HEADER_SIZE: usize = 20;

/// `EFI_FIRMWARE_FILE_SYSTEM2_GUID`
pub const FFS2_GUID: efi::Guid =
    efi::Guid::from_fields(0x8c8ce578, 0x8a3d, 0x4f1c, 0x99, 0x35, &[0x89, 0x61, 0x85, 0xc3, 0x2d, 0xd3]);
/// `EFI_FIRMWARE_FILE_SYSTEM3_GUID`, the format that allows files larger than 16MB
pub const FFS3_GUID: efi::Guid =
    efi::Guid::from_fields(0x5473c07a, 0x3dcb, 0x4dca, 0xbd, 0x6f, &[0x1e, 0x96, 0x89, 0xe7, 0x34, 0x9a]);
/// `EFI_FFS_VOLUME_TOP_FILE_GUID`
pub const TOP_FILE_GUID: efi::Guid =
    efi::Guid::from_fields(0x1ba0062e, 0xc779, 0x4582, 0x85, 0x66, &[0x33, 0x6a, 0xe8, 0xf7, 0x8f, 0x09]);

/// Byte offsets of the `EFI_FIRMWARE_VOLUME_HEADER` fields.
pub mod offset {
    /// Sixteen reserved bytes.
    pub const ZERO_VECTOR: usize = 0;
    /// File system GUID.
    pub const FILE_SYSTEM_GUID: usize = 16;
    /// Total volume length.
    pub const FV_LENGTH: usize = 32;
    /// `_FVH` signature.
    pub const SIGNATURE: usize = 40;
    /// `EFI_FVB_ATTRIBUTES_2` captured when the volume was built.
    pub const ATTRIBUTES: usize = 44;
    /// Header length including the block map.
    pub const HEADER_LENGTH: usize = 48;
    /// 16-bit header checksum.
    pub const CHECKSUM: usize = 50;
    /// Offset of the extended header, or zero.
    pub const EXT_HEADER_OFFSET: usize = 52;
    /// Reserved byte.
    pub const RESERVED: usize = 54;
    /// Header revision.
    pub const REVISION: usize = 55;
    /// First block map entry.
    pub const BLOCK_MAP: usize = 56;
}

/// Firmware Volume Write Policy bit definitions
/// Note: Typically named `EFI_FV_*` in EDK II code.
mod raw {
    pub(super) mod write_policy {
        pub const UNRELIABLE_WRITE: u32 = 0x00000000;
        pub const RELIABLE_WRITE: u32 = 0x00000001;
    }
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Firmware volume write policy enumeration
pub enum WritePolicy {
    /// Files in a multi-file write become visible one by one
    UnreliableWrite = raw::write_policy::UNRELIABLE_WRITE,
    /// All files in a multi-file write become visible together or not at all
    ReliableWrite = raw::write_policy::RELIABLE_WRITE,
}

impl TryFrom<u32> for WritePolicy {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            raw::write_policy::UNRELIABLE_WRITE => Ok(WritePolicy::UnreliableWrite),
            raw::write_policy::RELIABLE_WRITE => Ok(WritePolicy::ReliableWrite),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Firmware volume block map entry describing physical layout
pub struct BlockMapEntry {
    /// Number of blocks of this size
    pub num_blocks: u32,
    /// Length of each block
    pub length: u32,
}

impl BlockMapEntry {
    /// True for the `(0, 0)` entry that ends the block map.
    pub const fn is_terminator(&self) -> bool {
        self.num_blocks == 0 && self.length == 0
    }
}
