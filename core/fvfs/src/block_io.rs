//! Translation between volume byte offsets and block device addresses.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use alloc::{vec, vec::Vec};

use fvfs_sdk::{
    error::EfiError,
    pi::fw_fs::{fv::BlockMapEntry, fvb::attributes::raw::fvb2},
};
use r_efi::efi;

use crate::{FirmwareVolumeBlock, FvError};

/// One block of the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LbaEntry {
    /// Offset of the block from the start of the volume
    pub(crate) start: usize,
    /// Block length in bytes
    pub(crate) length: usize,
}

/// Every block of the volume in LBA order.
#[derive(Debug)]
pub(crate) struct LbaMap {
    blocks: Vec<LbaEntry>,
    len: usize,
}

impl LbaMap {
    /// Expands a volume block map into one entry per LBA.
    pub(crate) fn from_block_map(block_map: &[BlockMapEntry]) -> Result<Self, FvError> {
        let count: usize = block_map.iter().map(|entry| entry.num_blocks as usize).sum();
        let mut blocks = Vec::new();
        blocks.try_reserve_exact(count).map_err(|_| FvError::OutOfResources)?;

        let mut start = 0usize;
        for entry in block_map {
            for _ in 0..entry.num_blocks {
                blocks.push(LbaEntry { start, length: entry.length as usize });
                start = start.checked_add(entry.length as usize).ok_or(FvError::VolumeCorrupted)?;
            }
        }
        Ok(Self { blocks, len: start })
    }

    /// Bytes covered by all blocks.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn blocks(&self) -> &[LbaEntry] {
        &self.blocks
    }

    /// Finds the block holding `offset`. Returns the LBA and the offset within that block.
    pub(crate) fn locate(&self, offset: usize) -> Option<(usize, usize)> {
        if offset >= self.len {
            return None;
        }
        let lba = self.blocks.partition_point(|block| block.start + block.length <= offset);
        let block = self.blocks.get(lba)?;
        Some((lba, offset - block.start))
    }
}

/// Reads `len` bytes from the start of the device before its block layout is known.
///
/// Short reads mark the end of a block; reading resumes at the start of the next one.
pub(crate) fn read_from_start<D: FirmwareVolumeBlock + ?Sized>(device: &D, len: usize) -> Result<Vec<u8>, FvError> {
    let mut buffer = vec![0u8; len];
    let mut lba: efi::Lba = 0;
    let mut offset = 0usize;
    let mut done = 0usize;
    while done < len {
        let count = device.read(lba, offset, &mut buffer[done..]).map_err(FvError::Device)?;
        if count == 0 || count > len - done {
            log::error!("Read of LBA {} returned {} bytes.", lba, count);
            return Err(FvError::Device(EfiError::DeviceError));
        }
        done += count;
        lba += 1;
        offset = 0;
    }
    Ok(buffer)
}

/// Copies the whole volume into memory, block by block.
pub(crate) fn read_volume<D: FirmwareVolumeBlock + ?Sized>(device: &D, map: &LbaMap) -> Result<Vec<u8>, FvError> {
    let mut image = Vec::new();
    image.try_reserve_exact(map.len()).map_err(|_| FvError::OutOfResources)?;
    image.resize(map.len(), 0);

    for (lba, block) in map.blocks().iter().enumerate() {
        let buffer = &mut image[block.start..block.start + block.length];
        let count = device.read(lba as efi::Lba, 0, buffer).map_err(FvError::Device)?;
        if count != block.length {
            log::error!("Read of LBA {} returned {:#x} of {:#x} bytes.", lba, count, block.length);
            return Err(FvError::Device(EfiError::DeviceError));
        }
    }
    Ok(image)
}

/// Persists `data` at volume offset `offset`, splitting the write at block boundaries.
pub(crate) fn write<D: FirmwareVolumeBlock + ?Sized>(
    device: &mut D,
    map: &LbaMap,
    offset: usize,
    data: &[u8],
) -> Result<(), FvError> {
    let attributes = device.attributes().map_err(FvError::Device)?;
    if attributes & fvb2::WRITE_STATUS == 0 {
        return Err(FvError::AccessDenied);
    }
    if data.is_empty() {
        return Ok(());
    }
    let end = offset.checked_add(data.len()).ok_or(FvError::BadBufferSize)?;
    if end > map.len() {
        log::error!("Write of {:#x} bytes at {:#x} runs past the last block.", data.len(), offset);
        return Err(FvError::BadBufferSize);
    }

    let (mut lba, mut in_block) = map.locate(offset).ok_or(FvError::BadBufferSize)?;
    let mut done = 0usize;
    while done < data.len() {
        let block_remaining = map.blocks()[lba].length - in_block;
        let count = device.write(lba as efi::Lba, in_block, &data[done..]).map_err(|err| {
            log::error!("Write to LBA {} at {:#x} failed: {:?}", lba, in_block, err);
            FvError::Device(err)
        })?;
        done += count;
        if count == 0 || count > block_remaining || (done < data.len() && count != block_remaining) {
            log::error!("Write to LBA {} stopped after {:#x} bytes.", lba, count);
            return Err(FvError::Device(EfiError::DeviceError));
        }
        lba += 1;
        in_block = 0;
    }
    Ok(())
}
