//! Module for converting rusty errors to UEFI status codes.
//!
//! Only the statuses that firmware storage drivers produce or consume get a named variant. Anything
//! else round-trips through [`EfiError::Unknown`].
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use r_efi::efi;

/// EDK II Error Code equivalent as a Rust Error enum
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EfiError {
    /// The parameter was incorrect.
    InvalidParameter,
    /// The operation is not supported.
    Unsupported,
    /// The buffer was not the proper size for the request.
    BadBufferSize,
    /// The buffer was not large enough to hold the requested data.
    BufferTooSmall,
    /// There is no data pending upon return.
    NotReady,
    /// The physical device reported an error while attempting the operation.
    DeviceError,
    /// The device can not be written to.
    WriteProtected,
    /// The resource has run out.
    OutOfResources,
    /// An inconsistency was detected on the file system causing the operation to fail.
    VolumeCorrupted,
    /// There is no more space on the file system.
    VolumeFull,
    /// The item was not found.
    NotFound,
    /// Access was denied.
    AccessDenied,
    /// The operation was aborted.
    Aborted,
    /// A CRC error was detected.
    CrcError,
    /// The end of the file was reached.
    EndOfFile,
    /// A status without a dedicated variant.
    Unknown(efi::Status),
}

impl From<EfiError> for efi::Status {
    fn from(e: EfiError) -> efi::Status {
        match e {
            EfiError::InvalidParameter => efi::Status::INVALID_PARAMETER,
            EfiError::Unsupported => efi::Status::UNSUPPORTED,
            EfiError::BadBufferSize => efi::Status::BAD_BUFFER_SIZE,
            EfiError::BufferTooSmall => efi::Status::BUFFER_TOO_SMALL,
            EfiError::NotReady => efi::Status::NOT_READY,
            EfiError::DeviceError => efi::Status::DEVICE_ERROR,
            EfiError::WriteProtected => efi::Status::WRITE_PROTECTED,
            EfiError::OutOfResources => efi::Status::OUT_OF_RESOURCES,
            EfiError::VolumeCorrupted => efi::Status::VOLUME_CORRUPTED,
            EfiError::VolumeFull => efi::Status::VOLUME_FULL,
            EfiError::NotFound => efi::Status::NOT_FOUND,
            EfiError::AccessDenied => efi::Status::ACCESS_DENIED,
            EfiError::Aborted => efi::Status::ABORTED,
            EfiError::CrcError => efi::Status::CRC_ERROR,
            EfiError::EndOfFile => efi::Status::END_OF_FILE,
            EfiError::Unknown(status) => status,
        }
    }
}
