//! Firmware Volume Attributes
//!
//! Based on the values defined in the UEFI Platform Initialization (PI) Specification V1.8A Section 3.4.1
//! EFI_FIRMWARE_VOLUME2_PROTOCOL.GetVolumeAttributes().
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

/// Type alias for firmware volume attributes (64-bit)
pub type EfiFvAttributes = u64;

/// EFI_FV_ATTRIBUTES bit definitions
pub mod raw {
    /// Firmware volume attribute raw constants (version 2)
    pub mod fv2 {
        /// Capability to disable read operations
        pub const READ_DISABLE_CAP: u64 = 0x0000000000000001;
        /// Capability to enable read operations
        pub const READ_ENABLE_CAP: u64 = 0x0000000000000002;
        /// Current read enable/disable status
        pub const READ_STATUS: u64 = 0x0000000000000004;
        /// Capability to disable write operations
        pub const WRITE_DISABLE_CAP: u64 = 0x0000000000000008;
        /// Capability to enable write operations
        pub const WRITE_ENABLE_CAP: u64 = 0x0000000000000010;
        /// Current write enable/disable status
        pub const WRITE_STATUS: u64 = 0x0000000000000020;
        /// Capability to lock the firmware volume
        pub const LOCK_CAP: u64 = 0x0000000000000040;
        /// Current lock status
        pub const LOCK_STATUS: u64 = 0x0000000000000080;
        /// Multi-file writes can be made all-or-nothing
        pub const WRITE_POLICY_RELIABLE: u64 = 0x0000000000000100;
        /// Capability to lock read operations
        pub const READ_LOCK_CAP: u64 = 0x0000000000001000;
        /// Current read lock status
        pub const READ_LOCK_STATUS: u64 = 0x0000000000002000;
        /// Capability to lock write operations
        pub const WRITE_LOCK_CAP: u64 = 0x0000000000004000;
        /// Current write lock status
        pub const WRITE_LOCK_STATUS: u64 = 0x0000000000008000;
        /// Alignment field mask (power of two exponent in bits 16..=20)
        pub const ALIGNMENT: u64 = 0x00000000001F0000;
    }
}
