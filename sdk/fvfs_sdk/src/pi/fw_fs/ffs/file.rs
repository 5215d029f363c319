//! Firmware File System (FFS) File Definitions
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

/// Size of `EFI_FFS_FILE_HEADER`.
pub const HEADER_SIZE: usize = 24;
/// Size of `EFI_FFS_FILE_HEADER2`, used when the large file attribute is set.
pub const HEADER2_SIZE: usize = 32;
/// Largest total file size that fits the 24-bit size field of the small header.
pub const MAX_SMALL_FILE_SIZE: usize = 0x00FF_FFFF;
/// Value of the file checksum field when the checksum attribute is clear.
pub const FIXED_CHECKSUM: u8 = 0xAA;

/// Byte offsets of the `EFI_FFS_FILE_HEADER2` fields.
pub mod offset {
    /// Name GUID.
    pub const NAME: usize = 0;
    /// 8-bit header checksum.
    pub const INTEGRITY_CHECK_HEADER: usize = 16;
    /// 8-bit file data checksum.
    pub const INTEGRITY_CHECK_FILE: usize = 17;
    /// File type.
    pub const TYPE: usize = 18;
    /// FFS attributes.
    pub const ATTRIBUTES: usize = 19;
    /// 24-bit little-endian size.
    pub const SIZE: usize = 20;
    /// File state.
    pub const STATE: usize = 23;
    /// 64-bit extended size, large header only.
    pub const EXTENDED_SIZE: usize = 24;
}

/// Raw FFS file constant definitions
pub mod raw {
    /// File State Bits
    pub mod state {
        /// File header is under construction
        pub const HEADER_CONSTRUCTION: u8 = 0x01;
        /// File header is valid
        pub const HEADER_VALID: u8 = 0x02;
        /// File data is valid
        pub const DATA_VALID: u8 = 0x04;
        /// File is marked for update
        pub const MARKED_FOR_UPDATE: u8 = 0x08;
        /// File has been deleted
        pub const DELETED: u8 = 0x10;
        /// File header is invalid
        pub const HEADER_INVALID: u8 = 0x20;
    }

    /// File Type Definitions
    pub mod r#type {
        /// All file types. Only meaningful as a search filter.
        pub const ALL: u8 = 0x00;
        /// Raw data file
        pub const RAW: u8 = 0x01;
        /// Freeform file
        pub const FREEFORM: u8 = 0x02;
        /// Security (SEC) core file
        pub const SECURITY_CORE: u8 = 0x03;
        /// PEI core file
        pub const PEI_CORE: u8 = 0x04;
        /// DXE core file
        pub const DXE_CORE: u8 = 0x05;
        /// Pre-EFI module (PEIM) file
        pub const PEIM: u8 = 0x06;
        /// DXE driver file
        pub const DRIVER: u8 = 0x07;
        /// Combined PEIM and driver file
        pub const COMBINED_PEIM_DRIVER: u8 = 0x08;
        /// Application file
        pub const APPLICATION: u8 = 0x09;
        /// Management Mode (MM) file
        pub const MM: u8 = 0x0A;
        /// Firmware volume image file
        pub const FIRMWARE_VOLUME_IMAGE: u8 = 0x0B;
        /// Combined MM and DXE file
        pub const COMBINED_MM_DXE: u8 = 0x0C;
        /// MM core file
        pub const MM_CORE: u8 = 0x0D;
        /// MM standalone module file
        pub const MM_STANDALONE: u8 = 0x0E;
        /// MM standalone core file
        pub const MM_CORE_STANDALONE: u8 = 0x0F;
        /// OEM-defined file type minimum value
        pub const OEM_MIN: u8 = 0xC0;
        /// OEM-defined file type maximum value
        pub const OEM_MAX: u8 = 0xDF;
        /// Debug file type minimum value
        pub const DEBUG_MIN: u8 = 0xE0;
        /// Debug file type maximum value
        pub const DEBUG_MAX: u8 = 0xEF;
        /// FFS pad file type
        pub const FFS_PAD: u8 = 0xF0;
        /// FFS-defined file type minimum value
        pub const FFS_MIN: u8 = 0xF1;
        /// FFS-defined file type maximum value
        pub const FFS_MAX: u8 = 0xFF;
    }
}

/// Firmware file type.
///
/// Closed over the byte range: values the PI specification leaves unassigned decode to
/// [`Type::Reserved`] instead of failing, so callers decide whether to reject them.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Type {
    /// Wildcard used when searching; never stored in a file header.
    All,
    /// Raw file type
    Raw,
    /// Free form file
    FreeForm,
    /// Security core file
    SecurityCore,
    /// PEI core file
    PeiCore,
    /// DXE core file
    DxeCore,
    /// PEI module file
    Peim,
    /// Driver file
    Driver,
    /// Combined PEIM driver file
    CombinedPeimDriver,
    /// Application file
    Application,
    /// Traditional Management Mode (MM) file
    Mm,
    /// Firmware volume image file
    FirmwareVolumeImage,
    /// Combined MM/DXE file
    CombinedMmDxe,
    /// Traditional Management Mode (MM) core file
    MmCore,
    /// Standalone MM driver file
    MmStandalone,
    /// Standalone MM Core file
    MmCoreStandalone,
    /// OEM file type (0xC0..=0xDF)
    Oem(u8),
    /// Debug file type (0xE0..=0xEF)
    Debug(u8),
    /// A FFS padding file
    FfsPad,
    /// FFS-internal file type (0xF1..=0xFF)
    Ffs(u8),
    /// A value in one of the unassigned ranges
    Reserved(u8),
}

impl Type {
    /// Decodes a raw file type byte.
    pub const fn from_raw(value: u8) -> Self {
        use raw::r#type::*;
        match value {
            ALL => Type::All,
            RAW => Type::Raw,
            FREEFORM => Type::FreeForm,
            SECURITY_CORE => Type::SecurityCore,
            PEI_CORE => Type::PeiCore,
            DXE_CORE => Type::DxeCore,
            PEIM => Type::Peim,
            DRIVER => Type::Driver,
            COMBINED_PEIM_DRIVER => Type::CombinedPeimDriver,
            APPLICATION => Type::Application,
            MM => Type::Mm,
            FIRMWARE_VOLUME_IMAGE => Type::FirmwareVolumeImage,
            COMBINED_MM_DXE => Type::CombinedMmDxe,
            MM_CORE => Type::MmCore,
            MM_STANDALONE => Type::MmStandalone,
            MM_CORE_STANDALONE => Type::MmCoreStandalone,
            OEM_MIN..=OEM_MAX => Type::Oem(value),
            DEBUG_MIN..=DEBUG_MAX => Type::Debug(value),
            FFS_PAD => Type::FfsPad,
            FFS_MIN..=FFS_MAX => Type::Ffs(value),
            _ => Type::Reserved(value),
        }
    }

    /// The raw file type byte.
    pub const fn as_raw(&self) -> u8 {
        use raw::r#type::*;
        match *self {
            Type::All => ALL,
            Type::Raw => RAW,
            Type::FreeForm => FREEFORM,
            Type::SecurityCore => SECURITY_CORE,
            Type::PeiCore => PEI_CORE,
            Type::DxeCore => DXE_CORE,
            Type::Peim => PEIM,
            Type::Driver => DRIVER,
            Type::CombinedPeimDriver => COMBINED_PEIM_DRIVER,
            Type::Application => APPLICATION,
            Type::Mm => MM,
            Type::FirmwareVolumeImage => FIRMWARE_VOLUME_IMAGE,
            Type::CombinedMmDxe => COMBINED_MM_DXE,
            Type::MmCore => MM_CORE,
            Type::MmStandalone => MM_STANDALONE,
            Type::MmCoreStandalone => MM_CORE_STANDALONE,
            Type::FfsPad => FFS_PAD,
            Type::Oem(value) | Type::Debug(value) | Type::Ffs(value) | Type::Reserved(value) => value,
        }
    }

    /// True for types a caller may store through a firmware volume write.
    ///
    /// Pad files are owned by the file system, FFS-internal and reserved types have no defined meaning, and
    /// `All` is only a search wildcard.
    pub const fn is_writable(&self) -> bool {
        !matches!(self, Type::All | Type::FfsPad | Type::Ffs(_) | Type::Reserved(_))
    }
}

impl From<u8> for Type {
    fn from(value: u8) -> Self {
        Type::from_raw(value)
    }
}

/// Firmware File State
///
/// Each state sets exactly one more bit than the one before it, relative to the erase polarity of the
/// volume, so a state byte only ever moves from erased toward written. The recovered state is the highest
/// set bit.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    /// File header is under construction and not yet valid
    HeaderConstruction = raw::state::HEADER_CONSTRUCTION,
    /// File header has been constructed and is valid
    HeaderValid = raw::state::HEADER_VALID,
    /// File data has been written and is valid
    DataValid = raw::state::DATA_VALID,
    /// A replacement for this file is being written
    MarkedForUpdate = raw::state::MARKED_FOR_UPDATE,
    /// File has been deleted and should not be processed
    Deleted = raw::state::DELETED,
    /// The header fields are no longer trustworthy; the content is described by what follows it
    HeaderInvalid = raw::state::HEADER_INVALID,
}

impl State {
    /// Decodes a single state bit. Returns `None` for zero, the reserved bits, or more than one bit.
    pub const fn from_bit(bit: u8) -> Option<Self> {
        match bit {
            raw::state::HEADER_CONSTRUCTION => Some(State::HeaderConstruction),
            raw::state::HEADER_VALID => Some(State::HeaderValid),
            raw::state::DATA_VALID => Some(State::DataValid),
            raw::state::MARKED_FOR_UPDATE => Some(State::MarkedForUpdate),
            raw::state::DELETED => Some(State::Deleted),
            raw::state::HEADER_INVALID => Some(State::HeaderInvalid),
            _ => None,
        }
    }

    /// The state bit.
    pub const fn bit(&self) -> u8 {
        *self as u8
    }
}
