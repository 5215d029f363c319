//! Firmware Volume Test Support
//!
//! The in-memory flash device and helpers for building file images.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use alloc::{vec, vec::Vec};

use fvfs_sdk::pi::fw_fs::{
    ffs::{
        attributes::raw as attribute,
        file::{self, State, Type},
    },
    fv::BlockMapEntry,
    fvb::attributes::{raw::fvb2, EfiFvbAttributes2},
};
use log::{Level, LevelFilter, Metadata, Record};
use r_efi::efi;

use crate::{
    header::{created_state_byte, FileHeader, PAD_FILE_NAME},
    volume_header::format_volume,
};


pub(crate) use flash::FlashDevice;

/// Readable and writable, erasing to 0xFF, with every capability.
pub(crate) const DEFAULT_ATTRIBUTES: EfiFvbAttributes2 = fvb2::READ_DISABLED_CAP
    | fvb2::READ_ENABLED_CAP
    | fvb2::READ_STATUS
    | fvb2::WRITE_DISABLED_CAP
    | fvb2::WRITE_ENABLED_CAP
    | fvb2::WRITE_STATUS
    | fvb2::LOCK_CAP
    | fvb2::MEMORY_MAPPED
    | fvb2::ERASE_POLARITY;

impl FlashDevice {
    /// A freshly formatted volume of `num_blocks` blocks of `block_size` bytes.
    pub(crate) fn formatted(
        file_system_guid: efi::Guid,
        attributes: EfiFvbAttributes2,
        num_blocks: u32,
        block_size: u32,
    ) -> Self {
        let block_map = [BlockMapEntry { num_blocks, length: block_size }];
        let image = format_volume(file_system_guid, attributes, &block_map, None).unwrap();
        Self::new(image, &block_map, attributes)
    }
}

/// Description of one file image for [`file_bytes`].
pub(crate) struct FileSpec<'a> {
    name: efi::Guid,
    file_type: Type,
    attributes: u8,
    data: &'a [u8],
    pad_len: usize,
    state: State,
}

impl<'a> FileSpec<'a> {
    pub(crate) fn new(name: efi::Guid, data: &'a [u8]) -> Self {
        Self { name, file_type: Type::Raw, attributes: 0, data, pad_len: 0, state: State::DataValid }
    }

    /// A pad file of `file_size` bytes in total with an erased data area.
    pub(crate) fn pad(file_size: usize) -> Self {
        Self {
            name: PAD_FILE_NAME,
            file_type: Type::FfsPad,
            attributes: 0,
            data: &[],
            pad_len: file_size - file::HEADER_SIZE,
            state: State::DataValid,
        }
    }

    pub(crate) fn checksum(mut self) -> Self {
        self.attributes |= attribute::CHECKSUM;
        self
    }

    /// The state the file was left in, reached along the path the engine takes.
    pub(crate) fn state(mut self, state: State) -> Self {
        self.state = state;
        self
    }
}

/// Header and data bytes of a file, without trailing alignment padding.
pub(crate) fn file_bytes(spec: &FileSpec<'_>, erase: u8) -> Vec<u8> {
    let data = if spec.file_type == Type::FfsPad { vec![erase; spec.pad_len] } else { spec.data.to_vec() };
    let mut header =
        FileHeader::new(spec.name, spec.file_type, spec.attributes, FileHeader::file_size_for(data.len()));
    header.seal(&data);
    let data_valid = created_state_byte(erase, State::DataValid);
    header.state = match spec.state {
        State::HeaderConstruction | State::HeaderValid | State::DataValid => created_state_byte(erase, spec.state),
        State::MarkedForUpdate => data_valid ^ State::MarkedForUpdate.bit(),
        State::Deleted => data_valid ^ State::Deleted.bit(),
        State::HeaderInvalid => data_valid ^ State::MarkedForUpdate.bit() ^ State::HeaderInvalid.bit(),
    };

    let mut bytes = vec![0u8; header.header_size()];
    header.write_to(&mut bytes).unwrap();
    bytes.extend_from_slice(&data);
    bytes
}

// Sample logger for log crate to dump stuff in tests
struct SimpleLogger;
impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("{}", record.args());
        }
    }

    fn flush(&self) {}
}
static LOGGER: SimpleLogger = SimpleLogger;

pub(crate) fn set_logger() {
    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Info));
}
