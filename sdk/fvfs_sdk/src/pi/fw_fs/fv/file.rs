//! Firmware Volume File Definitions
//!
//! Based on the bindings and definitions in the UEFI Platform Initialization (PI)
//! Specification V1.8A 3.1 Firmware Storage Code Definitions.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

/// Type alias for firmware volume file attributes as defined in the PI Specification
pub type EfiFvFileAttributes = u32;

/// Raw constant definitions for firmware volume file attributes
pub mod raw {
    /// Note: Typically named `EFI_FV_FILE_ATTRIB_*` in EDK II code.
    pub mod attribute {
        /// File alignment requirement mask; the value is a power of two exponent
        pub const ALIGNMENT: u32 = 0x0000001F;
        /// File must be loaded at a fixed address
        pub const FIXED: u32 = 0x00000100;
        /// File can be memory-mapped
        pub const MEMORY_MAPPED: u32 = 0x00000200;
    }
}
