//! Block device collaborator.
//!
//! The engine never touches flash directly. Everything goes through [`FirmwareVolumeBlock`], which mirrors the
//! shape of `EFI_FIRMWARE_VOLUME_BLOCK2_PROTOCOL`: attributes, and reads/writes addressed by
//! (LBA, offset within the block).
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

use fvfs_sdk::{error::EfiError, pi::fw_fs::fvb::attributes::EfiFvbAttributes2};
use r_efi::efi;

/// Access to the storage backing one firmware volume.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait FirmwareVolumeBlock {
    /// Returns the current `EFI_FVB_ATTRIBUTES_2` of the device.
    fn attributes(&self) -> Result<EfiFvbAttributes2, EfiError>;

    /// Applies new attributes and returns the attributes now in effect.
    fn set_attributes(&mut self, attributes: EfiFvbAttributes2) -> Result<EfiFvbAttributes2, EfiError>;

    /// Reads from block `lba` starting `offset` bytes into the block.
    ///
    /// Returns the number of bytes read. A count shorter than `buffer` means the read reached the end of the
    /// block.
    fn read(&self, lba: efi::Lba, offset: usize, buffer: &mut [u8]) -> Result<usize, EfiError>;

    /// Programs `buffer` into block `lba` starting `offset` bytes into the block.
    ///
    /// Returns the number of bytes written. A count shorter than `buffer` is the `EFI_BAD_BUFFER_SIZE` case of
    /// the protocol: the write stopped at the end of `lba` and the caller continues at the start of the next
    /// block.
    fn write(&mut self, lba: efi::Lba, offset: usize, buffer: &[u8]) -> Result<usize, EfiError>;
}
