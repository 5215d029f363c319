//! Placement of new files in free space or inside existing pad files.
//!
//! All placement decisions are made here, before anything is written, so that an operation that cannot fit
//! fails without touching the device.
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
    header::FileHeader,
    scan::{FileEntry, FreeSpaceEntry},
};

/// Size and data alignment of one file to place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Request {
    /// Total file size, header included
    pub(crate) file_size: usize,
    /// Required data alignment in bytes, a power of two
    pub(crate) alignment: usize,
}

/// Where one requested file goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Placement {
    /// Offset of the file header
    pub(crate) offset: usize,
    /// Size of the pad file directly before the header, zero for none
    pub(crate) leading_pad: usize,
}

/// Subdivision of a pad file's data area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CarveLayout {
    /// One placement per request, in request order
    pub(crate) placements: Vec<Placement>,
    /// Offset and size of the pad file covering what is left, if a header fits there
    pub(crate) trailing_pad: Option<(usize, usize)>,
    /// First byte of the area
    pub(crate) start: usize,
    /// End of the area, 8-byte aligned
    pub(crate) end: usize,
}

/// Size of the pad file needed in front of a file of `file_size` bytes whose header would start at `start`,
/// so that its data lands on `alignment`.
///
/// Zero means no pad. A gap too small to hold a pad header grows by whole alignment units until it can.
pub(crate) fn calculate_pad_size(start: usize, file_size: usize, alignment: usize) -> usize {
    let alignment = alignment.max(1);
    let data_start = start + FileHeader::header_size_for(file_size);
    let pad = (alignment - data_start % alignment) % alignment;
    if pad == 0 || pad >= file::HEADER_SIZE {
        return pad;
    }
    file::HEADER_SIZE + (alignment - (data_start + file::HEADER_SIZE) % alignment) % alignment
}

fn align8(value: usize) -> Option<usize> {
    align_up(value, ffs::FILE_ALIGNMENT).ok()
}

/// First free-space extent that holds the file once aligned. Returns its index and the leading pad size.
pub(crate) fn locate_free_space(free_space: &[FreeSpaceEntry], request: Request) -> Option<(usize, usize)> {
    let size = align8(request.file_size)?;
    free_space.iter().enumerate().find_map(|(index, extent)| {
        let pad = calculate_pad_size(extent.start, request.file_size, request.alignment);
        (pad.checked_add(size)? <= extent.length).then_some((index, pad))
    })
}

/// Places `requests` one after the other from `start`, each aligned on its own. Returns the placements and
/// the aligned end of the last file, or `None` if they run past `end`.
fn place(start: usize, end: usize, requests: &[Request]) -> Option<(Vec<Placement>, usize)> {
    let mut placements = Vec::with_capacity(requests.len());
    let mut cursor = start;
    for request in requests {
        let leading_pad = calculate_pad_size(cursor, request.file_size, request.alignment);
        let offset = cursor.checked_add(leading_pad)?;
        cursor = align8(offset.checked_add(request.file_size)?)?;
        if cursor > end {
            return None;
        }
        placements.push(Placement { offset, leading_pad });
    }
    Some((placements, cursor))
}

/// Subdivides the area `[start, start + len)` of a pad file for `requests`.
///
/// What is left after the last file becomes a trailing pad file when a header fits; a shorter remainder stays
/// erased. A trailing pad that would need the large header is only possible in FFS3 volumes.
pub(crate) fn plan_carve(start: usize, len: usize, requests: &[Request], ffs3: bool) -> Option<CarveLayout> {
    let end = align8(start.checked_add(len)?)?;
    let (placements, cursor) = place(start, end, requests)?;
    let tail = end - cursor;
    let trailing_pad = if tail >= file::HEADER_SIZE {
        if tail > file::MAX_SMALL_FILE_SIZE && !ffs3 {
            return None;
        }
        Some((cursor, tail))
    } else {
        None
    };
    Some(CarveLayout { placements, trailing_pad, start, end })
}

/// First Data-Valid pad file with an erased data area that holds all of `requests`.
pub(crate) fn locate_pad_file(
    cache: &VolumeCache,
    files: &[FileEntry],
    requests: &[Request],
    ffs3: bool,
) -> Option<(usize, CarveLayout)> {
    files.iter().enumerate().find_map(|(index, entry)| {
        let header = entry.header(cache).ok()?;
        if header.file_type() != Type::FfsPad || entry.state(cache) != Some(State::DataValid) {
            return None;
        }
        let start = entry.offset + header.header_size();
        if !cache.is_erased(start, align8(header.data_size())?) {
            return None;
        }
        let layout = plan_carve(start, header.data_size(), requests, ffs3)?;
        Some((index, layout))
    })
}

/// Plans a new pad file at the start of a free-space extent sized to hold all of `requests` exactly.
///
/// Returns the extent index, the size of the new pad file and the layout of its data area.
pub(crate) fn plan_free_space_pad(
    free_space: &[FreeSpaceEntry],
    requests: &[Request],
    ffs3: bool,
) -> Option<(usize, usize, CarveLayout)> {
    free_space.iter().enumerate().find_map(|(index, extent)| {
        let extent_end = extent.start.checked_add(extent.length)?;
        [file::HEADER_SIZE, file::HEADER2_SIZE].into_iter().find_map(|header_size| {
            let start = extent.start.checked_add(header_size)?;
            let (placements, cursor) = place(start, extent_end, requests)?;
            let pad_size = cursor - extent.start;
            if FileHeader::header_size_for(pad_size) != header_size || (header_size == file::HEADER2_SIZE && !ffs3) {
                return None;
            }
            Some((index, pad_size, CarveLayout { placements, trailing_pad: None, start, end: cursor }))
        })
    })
}
