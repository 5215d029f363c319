//! Writable Firmware File System (FFS) engine.
//!
//! Mounts an FFS2 or FFS3 firmware volume stored on a block device and keeps its files consistent across
//! power loss. Files are created, replaced and deleted by advancing the one-way state byte in each file
//! header, so a volume interrupted at any write remounts to either the old or the new content.
//!
//! ## Layout
//!
//! - [`volume`]: [`FirmwareVolume`], the mount point and the entry to every operation.
//! - [`device`]: the [`FirmwareVolumeBlock`] trait the engine reads and writes through.
//! - [`header`]: the FFS file header codec: state bytes, checksums, sizes and alignment.
//! - [`volume_header`]: firmware volume header validation and formatting of empty volumes.
//! - [`section`]: section lookup inside file data.
//! - [`config`]: mount-time configuration.
//!
//! ## Example
//!
//! ```ignore
//! use fvfs::{FileRecord, FirmwareVolume, config::VolumeConfig};
//! use fvfs_sdk::pi::fw_fs::{ffs::file::Type, fv::WritePolicy};
//!
//! let mut volume = FirmwareVolume::mount(device, VolumeConfig::default())?;
//! volume.write_files(WritePolicy::ReliableWrite, &[FileRecord::new(name, Type::Raw, &data)])?;
//! let (info, bytes) = volume.read_file(&name)?;
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(test), not(feature = "mockall")), no_std)]

extern crate alloc;

mod block_io;
mod cache;
mod scan;
mod space;
mod write;

pub mod config;
pub mod device;
pub mod err;
pub mod header;
pub mod section;
pub mod volume;
pub mod volume_header;

#[cfg(test)]
mod test_support;

pub use device::FirmwareVolumeBlock;
#[cfg(any(test, feature = "mockall"))]
pub use device::MockFirmwareVolumeBlock;
pub use err::FvError;
pub use section::{LeafSectionExtractor, SectionExtractor};
pub use volume::{FileInfo, FileKey, FileRecord, FirmwareVolume, VolumeInfo};
