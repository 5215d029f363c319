//! Common Test Infrastructure for Firmware Volume Integration Tests
//!
//! Volume builders and helpers shared by every test module.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent

use std::sync::Once;

use fvfs::{config::VolumeConfig, volume_header::format_volume, FileKey, FirmwareVolume, FvError};
use fvfs_sdk::pi::fw_fs::{
    ffs::file::Type,
    fv::BlockMapEntry,
    fvb::attributes::{raw::fvb2, EfiFvbAttributes2},
};
use r_efi::efi;

pub use crate::fvfs_integration::flash::FlashDevice;

/// Readable, writable and memory mapped, with every capability. Erased bytes read 0xFF.
pub const ATTRIBUTES: EfiFvbAttributes2 = fvb2::READ_DISABLED_CAP
    | fvb2::READ_ENABLED_CAP
    | fvb2::READ_STATUS
    | fvb2::WRITE_DISABLED_CAP
    | fvb2::WRITE_ENABLED_CAP
    | fvb2::WRITE_STATUS
    | fvb2::LOCK_CAP
    | fvb2::MEMORY_MAPPED
    | fvb2::ERASE_POLARITY;

/// Same as [`ATTRIBUTES`] with erased bytes reading 0x00.
pub const ZERO_ERASE_ATTRIBUTES: EfiFvbAttributes2 = ATTRIBUTES & !fvb2::ERASE_POLARITY;

static INIT: Once = Once::new();

pub fn init_logger() {
    INIT.call_once(|| {
        // No logging unless RUST_LOG is set.
        let mut builder = env_logger::Builder::from_default_env();
        if std::env::var("RUST_LOG").is_err() {
            builder.filter_level(log::LevelFilter::Off);
        }
        let _ = builder.is_test(true).try_init();
    });
}

impl FlashDevice {
    /// An empty volume of `file_system_guid` format over `block_map`.
    pub fn formatted(
        file_system_guid: efi::Guid,
        attributes: EfiFvbAttributes2,
        block_map: &[BlockMapEntry],
        fv_name: Option<efi::Guid>,
    ) -> Self {
        let image = format_volume(file_system_guid, attributes, block_map, fv_name).unwrap();
        Self::new(image, block_map, attributes)
    }
}

/// `count` blocks of `length` bytes.
pub fn uniform(count: u32, length: u32) -> Vec<BlockMapEntry> {
    vec![BlockMapEntry { num_blocks: count, length }]
}

pub fn mount(device: FlashDevice) -> Result<FirmwareVolume<FlashDevice>, FvError> {
    init_logger();
    FirmwareVolume::mount(device, VolumeConfig::default())
}

/// Unmounts, restores power and mounts again from the flash contents.
pub fn remount(volume: FirmwareVolume<FlashDevice>) -> FirmwareVolume<FlashDevice> {
    let mut device = volume.into_device();
    device.restore_power();
    mount(device).unwrap()
}

/// Names of the live files in enumeration order.
pub fn names(volume: &FirmwareVolume<FlashDevice>) -> Vec<efi::Guid> {
    let mut key = FileKey::default();
    let mut names = Vec::new();
    while let Ok(info) = volume.get_next_file(&mut key, Type::All) {
        names.push(info.name);
    }
    names
}

/// A distinct file name for each `id`.
pub fn guid(id: u32) -> efi::Guid {
    efi::Guid::from_fields(id, 0x5a5a, 0xa5a5, 0x12, 0x34, &[0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0])
}

/// Offset of the header of the file named `name` in `image`.
pub fn header_offset(image: &[u8], name: &efi::Guid) -> usize {
    image.windows(16).position(|window| window == name.as_bytes()).expect("file name not found in image")
}
