//! Mount-time volume scan.
//!
//! Walks the cached volume once from the first content offset to the end and builds the ordered free-space
//! list and live-file index. Remnants of interrupted writes are skipped, duplicates left behind by an
//! interrupted update are resolved, and any header that fails its checksum fails the whole scan. Erased bytes
//! are only ever skipped as free space or as the short remainder at the end of a carved pad file.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use alloc::vec::Vec;

use fvfs_sdk::{
    base::align_up,
    pi::fw_fs::ffs::{
        self,
        file::{self, State, Type},
    },
};

use crate::{
    cache::VolumeCache,
    config::LargeFilePolicy,
    header::{self, file_state, inspect_header, FileHeader, HeaderCheck},
    FvError,
};

/// A run of erased bytes available for new files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FreeSpaceEntry {
    pub(crate) start: usize,
    pub(crate) length: usize,
}

/// A live file, addressed by the offset of its header in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileEntry {
    pub(crate) offset: usize,
}

impl FileEntry {
    pub(crate) fn header(&self, cache: &VolumeCache) -> Result<FileHeader, FvError> {
        FileHeader::read_from(cache.tail(self.offset)?)
    }

    pub(crate) fn state(&self, cache: &VolumeCache) -> Option<State> {
        let raw = cache.byte(self.offset + file::offset::STATE).ok()?;
        file_state(cache.erase_byte(), raw)
    }

    /// Offset of the first data byte.
    pub(crate) fn data_offset(&self, cache: &VolumeCache) -> Result<usize, FvError> {
        Ok(self.offset + self.header(cache)?.header_size())
    }
}

/// The indexes produced by a scan.
#[derive(Debug, Default)]
pub(crate) struct ScanResult {
    pub(crate) files: Vec<FileEntry>,
    pub(crate) free_space: Vec<FreeSpaceEntry>,
}

struct Found {
    offset: usize,
    header: FileHeader,
    state: State,
}

/// Scans `cache` starting at `content_offset`.
///
/// Files left Marked-For-Update are resolved in the cache only: pad files and files with a Data-Valid
/// replacement move to Deleted and drop out of the index. Nothing is written to the device.
pub(crate) fn scan(
    cache: &mut VolumeCache,
    content_offset: usize,
    ffs3: bool,
    large_file_policy: LargeFilePolicy,
) -> Result<ScanResult, FvError> {
    let len = cache.len();
    let erase_byte = cache.erase_byte();
    let mut result = ScanResult::default();
    let mut found = Vec::new();
    // Ends of the areas of pad files that were carved into new files.
    let mut carved_ends = Vec::new();
    let mut offset = content_offset;

    while offset < len {
        if let Some(end) = carved_tail_end(cache, &carved_ends, offset) {
            log::debug!("Skipping the {:#x} byte tail of a carved pad file at {:#x}.", end - offset, offset);
            offset = end;
            continue;
        }

        match inspect_header(cache.tail(offset)?, erase_byte) {
            HeaderCheck::Erased => {
                let start = offset;
                while offset < len {
                    let chunk = file::HEADER_SIZE.min(len - offset);
                    if !cache.is_erased(offset, chunk) {
                        break;
                    }
                    offset += chunk;
                }
                log::debug!("Free space at {:#x}, {:#x} bytes.", start, offset - start);
                result.free_space.push(FreeSpaceEntry { start, length: offset - start });
                continue;
            }
            HeaderCheck::Incomplete { state: State::HeaderInvalid, skip } => {
                if let Some(end) = carved_area_end(cache, offset) {
                    log::debug!("Pad file at {:#x} was carved up to {:#x}.", offset, end);
                    carved_ends.push(end);
                }
                offset = next_file_offset(offset, skip)?;
                continue;
            }
            HeaderCheck::Incomplete { state, skip } => {
                log::warn!("Skipping interrupted header at {:#x} in state {:?}.", offset, state);
                offset = next_file_offset(offset, skip)?;
                continue;
            }
            HeaderCheck::Corrupt => {
                log::error!("Corrupt file header at {:#x}.", offset);
                return Err(FvError::VolumeCorrupted);
            }
            HeaderCheck::Valid { header, state } => {
                if header.is_large() && !ffs3 {
                    match large_file_policy {
                        LargeFilePolicy::Tolerate => {
                            log::warn!("Large file {:?} at {:#x} in an FFS2 volume.", header.name, offset)
                        }
                        LargeFilePolicy::Reject => {
                            log::error!("Large file {:?} at {:#x} in an FFS2 volume.", header.name, offset);
                            return Err(FvError::VolumeCorrupted);
                        }
                    }
                }

                let file_size = header.file_size();
                if file_size < header.header_size() || file_size > len - offset {
                    log::error!("File at {:#x} declares {:#x} bytes, beyond the volume.", offset, file_size);
                    return Err(FvError::VolumeCorrupted);
                }

                match state {
                    State::HeaderValid => {
                        log::warn!("Skipping file {:?} at {:#x} with incomplete data.", header.name, offset);
                    }
                    State::Deleted => {}
                    State::MarkedForUpdate if header.file_type() == Type::FfsPad => {
                        found.push(Found { offset, header, state });
                    }
                    _ => {
                        let data = cache.bytes(offset + header.header_size(), header.data_size())?;
                        if !header.verify_file_checksum(data) {
                            log::error!("File {:?} at {:#x} fails its data checksum.", header.name, offset);
                            return Err(FvError::VolumeCorrupted);
                        }
                        found.push(Found { offset, header, state });
                    }
                }
                offset = next_file_offset(offset, file_size)?;
            }
        }
    }

    result.files = resolve(cache, &found)?;
    Ok(result)
}

/// End of the area a Header-Invalid pad file at `offset` covered, if its header is still readable.
fn carved_area_end(cache: &VolumeCache, offset: usize) -> Option<usize> {
    let header = FileHeader::read_from(cache.tail(offset).ok()?).ok()?;
    if !header.verify_header_checksum() || header.file_size() < header.header_size() {
        return None;
    }
    next_file_offset(offset, header.file_size()).ok().filter(|&end| end <= cache.len())
}

/// End of a carved area when `offset` starts the erased remainder after its last file.
///
/// Carving leaves a remainder too short for a pad header unformatted, so it can only sit right before the end
/// of a carved area.
fn carved_tail_end(cache: &VolumeCache, carved_ends: &[usize], offset: usize) -> Option<usize> {
    carved_ends
        .iter()
        .copied()
        .find(|&end| end > offset && end - offset < file::HEADER_SIZE && cache.is_erased(offset, end - offset))
}

fn next_file_offset(offset: usize, size: usize) -> Result<usize, FvError> {
    let end = offset.checked_add(size).ok_or(FvError::VolumeCorrupted)?;
    align_up(end, ffs::FILE_ALIGNMENT).map_err(|_| FvError::VolumeCorrupted)
}

/// Applies the Marked-For-Update and duplicate name rules, returning the live files in scan order.
fn resolve(cache: &mut VolumeCache, found: &[Found]) -> Result<Vec<FileEntry>, FvError> {
    let mut files = Vec::new();
    for (index, candidate) in found.iter().enumerate() {
        let is_pad = candidate.header.file_type() == Type::FfsPad;
        let same_name_valid = |other: &Found| {
            other.offset != candidate.offset
                && other.header.name == candidate.header.name
                && other.state == State::DataValid
        };

        match candidate.state {
            State::MarkedForUpdate if is_pad => {
                log::warn!("Pad file at {:#x} was being reused; treating it as deleted.", candidate.offset);
                mark_deleted(cache, candidate.offset)?;
            }
            State::MarkedForUpdate if found.iter().any(same_name_valid) => {
                log::warn!(
                    "File {:?} at {:#x} was replaced; treating it as deleted.",
                    candidate.header.name,
                    candidate.offset
                );
                mark_deleted(cache, candidate.offset)?;
            }
            State::DataValid if !is_pad && found[index + 1..].iter().any(same_name_valid) => {
                log::warn!(
                    "File {:?} at {:#x} has a later copy; ignoring this one.",
                    candidate.header.name,
                    candidate.offset
                );
            }
            _ => files.push(FileEntry { offset: candidate.offset }),
        }
    }
    Ok(files)
}

fn mark_deleted(cache: &mut VolumeCache, offset: usize) -> Result<(), FvError> {
    // Cache only; the change is re-derived by every scan.
    let _ = header::advance_state(cache, offset, State::Deleted)?;
    Ok(())
}
