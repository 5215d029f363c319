//! Section lookup within file data.
//!
//! Section decoding is delegated to a [`SectionExtractor`]. [`LeafSectionExtractor`] covers files whose sections
//! are all leaves; encapsulation sections (compression, GUID-defined) need an extractor that understands them.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use alloc::vec::Vec;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

use fvfs_sdk::{
    base::align_up,
    pi::fw_fs::ffs::section::{self, raw_type, EfiSectionType},
};
use scroll::Pread;

use crate::FvError;

/// 24-bit size value that defers to the 32-bit extended size.
const EXTENDED_SIZE_MARKER: usize = 0x00FF_FFFF;

/// Finds sections inside the data of one file.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait SectionExtractor {
    /// Returns the body of the `instance`-th section (zero based) of `section_type` in `file_data`.
    ///
    /// [`raw_type::ALL`] matches any section. Returns [`FvError::NotFound`] when there are fewer matching
    /// sections.
    fn find_section(
        &self,
        file_data: &[u8],
        section_type: EfiSectionType,
        instance: usize,
    ) -> Result<Vec<u8>, FvError>;
}

/// Walks the top-level sections of a file without descending into encapsulations.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeafSectionExtractor;

/// One top-level section: its type and body range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SectionSpan {
    section_type: EfiSectionType,
    body_start: usize,
    end: usize,
}

fn read_section(data: &[u8], offset: usize) -> Result<SectionSpan, FvError> {
    let mut size_bytes = [0u8; 4];
    size_bytes[..3].copy_from_slice(data.get(offset..offset + 3).ok_or(FvError::VolumeCorrupted)?);
    let section_type = data.pread_with::<u8>(offset + 3, scroll::LE)?;

    let (size, header_size) = match u32::from_le_bytes(size_bytes) as usize {
        EXTENDED_SIZE_MARKER => (data.pread_with::<u32>(offset + 4, scroll::LE)? as usize, section::HEADER2_SIZE),
        size => (size, section::HEADER_SIZE),
    };
    let end = offset.checked_add(size).ok_or(FvError::VolumeCorrupted)?;
    if size < header_size || end > data.len() {
        log::error!("Section at {:#x} has an invalid size {:#x}.", offset, size);
        return Err(FvError::VolumeCorrupted);
    }
    Ok(SectionSpan { section_type, body_start: offset + header_size, end })
}

impl SectionExtractor for LeafSectionExtractor {
    fn find_section(
        &self,
        file_data: &[u8],
        section_type: EfiSectionType,
        instance: usize,
    ) -> Result<Vec<u8>, FvError> {
        let mut remaining = instance;
        let mut offset = 0usize;
        while offset + section::HEADER_SIZE <= file_data.len() {
            let span = read_section(file_data, offset)?;
            if section_type == raw_type::ALL || span.section_type == section_type {
                if remaining == 0 {
                    return Ok(file_data[span.body_start..span.end].to_vec());
                }
                remaining -= 1;
            }
            offset = align_up(span.end, section::SECTION_ALIGNMENT).map_err(|_| FvError::VolumeCorrupted)?;
        }
        Err(FvError::NotFound)
    }
}
