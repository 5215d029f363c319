//! Firmware Volume Block Attributes
//!
//! Based on the values defined in the UEFI Platform Initialization (PI) Specification V1.8A Section 3.2.1.1
//! EFI_FIRMWARE_VOLUME_HEADER.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

/// Type alias for firmware volume block attributes (version 2) as defined in the PI Specification
pub type EfiFvbAttributes2 = u32;

/// EFI_FVB_ATTRIBUTES_2 bit definitions
/// Note: Typically named `EFI_FVB2_*` in EDK II code.
pub mod raw {
    /// Raw FVB2 attribute constant definitions
    pub mod fvb2 {
        /// Capability to disable read operations
        pub const READ_DISABLED_CAP: u32 = 0x00000001;
        /// Capability to enable read operations
        pub const READ_ENABLED_CAP: u32 = 0x00000002;
        /// Current read enable/disable status
        pub const READ_STATUS: u32 = 0x00000004;
        /// Capability to disable write operations
        pub const WRITE_DISABLED_CAP: u32 = 0x00000008;
        /// Capability to enable write operations
        pub const WRITE_ENABLED_CAP: u32 = 0x00000010;
        /// Current write enable/disable status
        pub const WRITE_STATUS: u32 = 0x00000020;
        /// Capability to lock the firmware volume block
        pub const LOCK_CAP: u32 = 0x00000040;
        /// Current lock status
        pub const LOCK_STATUS: u32 = 0x00000080;
        /// Sticky write attribute - data persists across resets
        pub const STICKY_WRITE: u32 = 0x00000200;
        /// Block can be memory-mapped
        pub const MEMORY_MAPPED: u32 = 0x00000400;
        /// Erase polarity bit - set when erased bits read as one
        pub const ERASE_POLARITY: u32 = 0x00000800;
        /// Capability to lock read operations
        pub const READ_LOCK_CAP: u32 = 0x00001000;
        /// Current read lock status
        pub const READ_LOCK_STATUS: u32 = 0x00002000;
        /// Capability to lock write operations
        pub const WRITE_LOCK_CAP: u32 = 0x00004000;
        /// Current write lock status
        pub const WRITE_LOCK_STATUS: u32 = 0x00008000;
        /// Alignment field mask (power of two exponent in bits 16..=20)
        pub const ALIGNMENT: u32 = 0x001F0000;
        /// Files may request alignment beyond the volume alignment
        pub const WEAK_ALIGNMENT: u32 = 0x80000000;
    }

    /// Capability bits; a set-attributes request may never change these.
    pub const CAPABILITIES: u32 = fvb2::READ_DISABLED_CAP
        | fvb2::READ_ENABLED_CAP
        | fvb2::WRITE_DISABLED_CAP
        | fvb2::WRITE_ENABLED_CAP
        | fvb2::LOCK_CAP
        | fvb2::READ_LOCK_CAP
        | fvb2::WRITE_LOCK_CAP;
}

/// The byte an erased location reads back as under the given attributes.
pub const fn erase_byte(attributes: EfiFvbAttributes2) -> u8 {
    if attributes & raw::fvb2::ERASE_POLARITY != 0 { 0xFF } else { 0x00 }
}
