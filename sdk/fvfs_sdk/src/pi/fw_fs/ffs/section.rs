//! Firmware File System (FFS) Section Definition
//!
//! Based on the values defined in the UEFI Platform Initialization (PI) Specification V1.8A Section 3.2.4
//! Firmware File Section.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

/// Type alias for section type identifiers
pub type EfiSectionType = u8;

/// Size of `EFI_COMMON_SECTION_HEADER`.
pub const HEADER_SIZE: usize = 4;
/// Size of `EFI_COMMON_SECTION_HEADER2`, used when the 24-bit size field is all ones.
pub const HEADER2_SIZE: usize = 8;
/// Sections within a file begin on 4-byte boundaries.
pub const SECTION_ALIGNMENT: usize = 4;

/// Firmware File System Section Types
/// Note: Typically called `EFI_SECTION_*` in EDK II code.
pub mod raw_type {
    /// Pseudo type. It is used as a wild card when retrieving sections to match all types.
    pub const ALL: u8 = 0x00;
    /// Encapsulated section type constants
    pub mod encapsulated {
        /// Compression encapsulated section
        pub const COMPRESSION: u8 = 0x01;
        /// GUID-defined encapsulated section
        pub const GUID_DEFINED: u8 = 0x02;
        /// Disposable encapsulated section
        pub const DISPOSABLE: u8 = 0x03;
    }
    /// PE32 executable section
    pub const PE32: u8 = 0x10;
    /// Position-independent code section
    pub const PIC: u8 = 0x11;
    /// Terse executable section
    pub const TE: u8 = 0x12;
    /// DXE dependency expression section
    pub const DXE_DEPEX: u8 = 0x13;
    /// Version information section
    pub const VERSION: u8 = 0x14;
    /// User interface string section
    pub const USER_INTERFACE: u8 = 0x15;
    /// Compatibility16 section
    pub const COMPATIBILITY16: u8 = 0x16;
    /// Firmware volume image section
    pub const FIRMWARE_VOLUME_IMAGE: u8 = 0x17;
    /// Freeform GUID subtype section
    pub const FREEFORM_SUBTYPE_GUID: u8 = 0x18;
    /// Raw data section
    pub const RAW: u8 = 0x19;
    /// PEI dependency expression section
    pub const PEI_DEPEX: u8 = 0x1B;
    /// MM dependency expression section
    pub const MM_DEPEX: u8 = 0x1C;
}

/// True for the section types whose body holds further sections.
pub const fn is_encapsulation(section_type: EfiSectionType) -> bool {
    matches!(
        section_type,
        raw_type::encapsulated::COMPRESSION | raw_type::encapsulated::GUID_DEFINED | raw_type::encapsulated::DISPOSABLE
    )
}
