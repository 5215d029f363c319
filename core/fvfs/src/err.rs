//! Error types and conversions for the firmware volume engine.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use fvfs_sdk::error::EfiError;
use r_efi::efi;

/// Error definitions for the firmware volume engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FvError {
    /// A parameter provided by the caller is invalid.
    InvalidParameter,
    /// The volume format, revision, or requested operation is unsupported.
    Unsupported,
    /// No live file carries the requested name, or enumeration is exhausted.
    NotFound,
    /// The caller's buffer cannot hold the file.
    BufferTooSmall,
    /// No free space or reusable pad file is large enough, or an allocation failed.
    OutOfResources,
    /// The volume violates a structural invariant.
    VolumeCorrupted,
    /// A header is not in a state the requested transition can start from.
    InvalidState,
    /// The volume is not currently writable.
    WriteProtected,
    /// The block device attributes do not permit the access.
    AccessDenied,
    /// A write extends past the last block of the volume.
    BadBufferSize,
    /// The block device reported an error.
    Device(EfiError),
}

impl From<FvError> for EfiError {
    fn from(value: FvError) -> Self {
        match value {
            FvError::InvalidParameter => EfiError::InvalidParameter,
            FvError::Unsupported => EfiError::Unsupported,
            FvError::NotFound => EfiError::NotFound,
            FvError::BufferTooSmall => EfiError::BufferTooSmall,
            FvError::OutOfResources => EfiError::OutOfResources,
            FvError::VolumeCorrupted | FvError::InvalidState => EfiError::VolumeCorrupted,
            FvError::WriteProtected => EfiError::WriteProtected,
            FvError::AccessDenied => EfiError::AccessDenied,
            FvError::BadBufferSize => EfiError::BadBufferSize,
            FvError::Device(status) => status,
        }
    }
}

impl From<FvError> for efi::Status {
    fn from(value: FvError) -> Self {
        let err: EfiError = value.into();
        err.into()
    }
}

// Every structure decoded with scroll lives inside the cached volume; running off the end means the
// volume lied about a size.
impl From<scroll::Error> for FvError {
    fn from(_: scroll::Error) -> Self {
        FvError::VolumeCorrupted
    }
}
