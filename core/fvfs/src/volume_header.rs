//! Firmware volume header codec.
//!
//! Decodes and validates `EFI_FIRMWARE_VOLUME_HEADER`, its block map and the optional
//! `EFI_FIRMWARE_VOLUME_EXT_HEADER`, and can format a blank volume image for a given block layout.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use alloc::{vec, vec::Vec};

use fvfs_sdk::{
    base::align_up,
    pi::fw_fs::{
        ffs::{self, file::State},
        fv::{self, BlockMapEntry},
        fvb::attributes::{erase_byte, EfiFvbAttributes2},
    },
};
use r_efi::efi;
use scroll::{
    ctx::{TryFromCtx, TryIntoCtx},
    Endian, Pread, Pwrite,
};

use crate::{
    header::{created_state_byte, FileHeader},
    FvError,
};

/// Decoded `EFI_FIRMWARE_VOLUME_HEADER`, block map included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeHeader {
    /// Format of the files in the volume, FFS2 or FFS3
    pub file_system_guid: efi::Guid,
    /// Total volume length, header included
    pub fv_length: u64,
    /// Must be [`fv::SIGNATURE`]
    pub signature: u32,
    /// `EFI_FVB_ATTRIBUTES_2` captured when the volume was built
    pub attributes: EfiFvbAttributes2,
    /// Header length, block map included
    pub header_length: u16,
    /// 16-bit checksum of the header
    pub checksum: u16,
    /// Offset of the extended header, or zero
    pub ext_header_offset: u16,
    /// Must be [`fv::FFS_REVISION`]
    pub revision: u8,
    /// Block map without its terminator
    pub block_map: Vec<BlockMapEntry>,
}

impl<'a> TryFromCtx<'a, Endian> for VolumeHeader {
    type Error = scroll::Error;

    fn try_from_ctx(src: &'a [u8], ctx: Endian) -> Result<(Self, usize), Self::Error> {
        let mut offset = fv::offset::FILE_SYSTEM_GUID;
        let mut guid = [0u8; 16];
        src.gread_inout_with(&mut offset, &mut guid, ctx)?;
        let fv_length: u64 = src.gread_with(&mut offset, ctx)?;
        let signature: u32 = src.gread_with(&mut offset, ctx)?;
        let attributes: u32 = src.gread_with(&mut offset, ctx)?;
        let header_length: u16 = src.gread_with(&mut offset, ctx)?;
        let checksum: u16 = src.gread_with(&mut offset, ctx)?;
        let ext_header_offset: u16 = src.gread_with(&mut offset, ctx)?;
        let _reserved: u8 = src.gread_with(&mut offset, ctx)?;
        let revision: u8 = src.gread_with(&mut offset, ctx)?;
        let header = Self {
            file_system_guid: efi::Guid::from_bytes(&guid),
            fv_length,
            signature,
            attributes,
            header_length,
            checksum,
            ext_header_offset,
            revision,
            block_map: Vec::new(),
        };
        Ok((header, offset))
    }
}

impl TryIntoCtx<Endian> for &VolumeHeader {
    type Error = scroll::Error;

    fn try_into_ctx(self, dest: &mut [u8], ctx: Endian) -> Result<usize, Self::Error> {
        let mut offset = 0;
        dest.gwrite_with([0u8; 16].as_slice(), &mut offset, ())?;
        dest.gwrite_with(self.file_system_guid.as_bytes().as_slice(), &mut offset, ())?;
        dest.gwrite_with(self.fv_length, &mut offset, ctx)?;
        dest.gwrite_with(self.signature, &mut offset, ctx)?;
        dest.gwrite_with(self.attributes, &mut offset, ctx)?;
        dest.gwrite_with(self.header_length, &mut offset, ctx)?;
        dest.gwrite_with(self.checksum, &mut offset, ctx)?;
        dest.gwrite_with(self.ext_header_offset, &mut offset, ctx)?;
        dest.gwrite_with(0u8, &mut offset, ctx)?;
        dest.gwrite_with(self.revision, &mut offset, ctx)?;
        for entry in self.block_map.iter().chain(core::iter::once(&BlockMapEntry { num_blocks: 0, length: 0 })) {
            dest.gwrite_with(entry.num_blocks, &mut offset, ctx)?;
            dest.gwrite_with(entry.length, &mut offset, ctx)?;
        }
        Ok(offset)
    }
}

/// Where file content starts, and the volume name when an extended header is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentLayout {
    /// Offset of the first possible file header
    pub content_offset: usize,
    /// Name from the extended header
    pub fv_name: Option<efi::Guid>,
}

impl VolumeHeader {
    /// Reads the header length field. `bytes` needs to cover the fixed part of the header only.
    pub fn header_length_of(bytes: &[u8]) -> Result<usize, FvError> {
        if bytes.len() < fv::HEADER_SIZE
            || bytes.pread_with::<u32>(fv::offset::SIGNATURE, scroll::LE)? != fv::SIGNATURE
        {
            return Err(FvError::VolumeCorrupted);
        }
        Ok(bytes.pread_with::<u16>(fv::offset::HEADER_LENGTH, scroll::LE)? as usize)
    }

    /// Decodes and validates a volume header. `bytes` must cover at least `header_length` bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, FvError> {
        if bytes.len() < fv::HEADER_SIZE {
            log::error!("Volume header truncated: {} bytes.", bytes.len());
            return Err(FvError::VolumeCorrupted);
        }
        let mut header: VolumeHeader = bytes.pread_with(0, scroll::LE)?;

        if header.signature != fv::SIGNATURE {
            log::error!("Volume signature {:#x} is not _FVH.", header.signature);
            return Err(FvError::VolumeCorrupted);
        }

        let header_length = header.header_length as usize;
        if header_length < fv::HEADER_SIZE + fv::BLOCK_MAP_ENTRY_SIZE
            || header_length & 0x01 != 0
            || header_length > bytes.len()
            || header.fv_length < header_length as u64
        {
            log::error!("Volume header length {:#x} is invalid.", header_length);
            return Err(FvError::VolumeCorrupted);
        }

        if checksum16(&bytes[..header_length]) != 0 {
            log::error!("Volume header checksum does not sum to zero.");
            return Err(FvError::VolumeCorrupted);
        }

        if header.revision != fv::FFS_REVISION {
            log::error!("Volume revision {} is not supported.", header.revision);
            return Err(FvError::Unsupported);
        }

        if header.file_system_guid != fv::FFS2_GUID && header.file_system_guid != fv::FFS3_GUID {
            log::error!("Volume file system {:?} is not supported.", header.file_system_guid);
            return Err(FvError::Unsupported);
        }

        header.block_map = parse_block_map(&bytes[fv::offset::BLOCK_MAP..header_length])?;
        let mapped: u64 =
            header.block_map.iter().map(|entry| entry.num_blocks as u64 * entry.length as u64).sum();
        if mapped != header.fv_length {
            log::error!("Block map covers {:#x} bytes of a {:#x} byte volume.", mapped, header.fv_length);
            return Err(FvError::VolumeCorrupted);
        }

        Ok(header)
    }

    /// The byte an erased location reads back as.
    pub fn erase_byte(&self) -> u8 {
        erase_byte(self.attributes)
    }

    /// True for volumes in the FFS3 format, the only one that holds large files.
    pub fn is_ffs3(&self) -> bool {
        self.file_system_guid == fv::FFS3_GUID
    }

    /// Locates the first file header and the volume name within the full volume `image`.
    pub fn content_layout(&self, image: &[u8]) -> Result<ContentLayout, FvError> {
        let mut fv_name = None;
        let mut content_end = self.header_length as usize;

        if self.ext_header_offset != 0 {
            let ext_offset = self.ext_header_offset as usize;
            if ext_offset < self.header_length as usize || ext_offset + fv::EXT_HEADER_SIZE > image.len() {
                log::error!("Extended header at {:#x} lies outside the volume.", ext_offset);
                return Err(FvError::VolumeCorrupted);
            }
            let mut offset = ext_offset;
            let mut name = [0u8; 16];
            image.gread_inout_with(&mut offset, &mut name, scroll::LE)?;
            let ext_size = image.gread_with::<u32>(&mut offset, scroll::LE)? as usize;
            if ext_size < fv::EXT_HEADER_SIZE || ext_offset + ext_size > image.len() {
                log::error!("Extended header size {:#x} is invalid.", ext_size);
                return Err(FvError::VolumeCorrupted);
            }
            fv_name = Some(efi::Guid::from_bytes(&name));
            content_end = ext_offset + ext_size;
        }

        let content_offset = align_up(content_end, ffs::FILE_ALIGNMENT).map_err(|_| FvError::VolumeCorrupted)?;
        Ok(ContentLayout { content_offset, fv_name })
    }
}

/// 16-bit word sum of `bytes`.
pub fn checksum16(bytes: &[u8]) -> u16 {
    bytes.chunks_exact(2).fold(0u16, |sum, word| sum.wrapping_add(u16::from_le_bytes([word[0], word[1]])))
}

fn parse_block_map(bytes: &[u8]) -> Result<Vec<BlockMapEntry>, FvError> {
    let mut block_map = Vec::new();
    let mut offset = 0;
    while offset + fv::BLOCK_MAP_ENTRY_SIZE <= bytes.len() {
        let entry = BlockMapEntry {
            num_blocks: bytes.gread_with(&mut offset, scroll::LE)?,
            length: bytes.gread_with(&mut offset, scroll::LE)?,
        };
        if entry.is_terminator() {
            if block_map.is_empty() {
                log::error!("Block map is empty.");
                return Err(FvError::VolumeCorrupted);
            }
            return Ok(block_map);
        }
        if entry.num_blocks == 0 || entry.length == 0 {
            log::error!("Block map entry {:?} is invalid.", entry);
            return Err(FvError::VolumeCorrupted);
        }
        block_map.push(entry);
    }
    log::error!("Block map has no terminator.");
    Err(FvError::VolumeCorrupted)
}

/// Builds the image of an empty volume.
///
/// The image covers every block in `block_map`. When `fv_name` is given, an extended header carrying it is
/// placed inside a pad file directly after the header, so scanning starts past it.
pub fn format_volume(
    file_system_guid: efi::Guid,
    attributes: EfiFvbAttributes2,
    block_map: &[BlockMapEntry],
    fv_name: Option<efi::Guid>,
) -> Result<Vec<u8>, FvError> {
    let fv_length: u64 = block_map.iter().map(|entry| entry.num_blocks as u64 * entry.length as u64).sum();
    let header_length = fv::HEADER_SIZE + (block_map.len() + 1) * fv::BLOCK_MAP_ENTRY_SIZE;
    let fv_length_usize = usize::try_from(fv_length).map_err(|_| FvError::InvalidParameter)?;
    if block_map.is_empty() || header_length > fv_length_usize {
        return Err(FvError::InvalidParameter);
    }

    let erase = erase_byte(attributes);
    let mut image = vec![erase; fv_length_usize];

    let mut ext_header_offset = 0usize;
    if let Some(name) = fv_name {
        let pad_offset = align_up(header_length, ffs::FILE_ALIGNMENT).map_err(|_| FvError::InvalidParameter)?;
        let mut ext = [0u8; fv::EXT_HEADER_SIZE];
        ext[..16].copy_from_slice(name.as_bytes());
        ext.as_mut_slice().pwrite_with(fv::EXT_HEADER_SIZE as u32, 16, scroll::LE)?;

        let mut pad = FileHeader::pad(ffs::file::HEADER_SIZE + fv::EXT_HEADER_SIZE);
        pad.seal(&ext);
        pad.state = created_state_byte(erase, State::DataValid);
        let data_offset = pad_offset + pad.write_to(image.get_mut(pad_offset..).ok_or(FvError::InvalidParameter)?)?;
        image
            .get_mut(data_offset..data_offset + fv::EXT_HEADER_SIZE)
            .ok_or(FvError::InvalidParameter)?
            .copy_from_slice(&ext);
        ext_header_offset = data_offset;
    }

    let mut header = VolumeHeader {
        file_system_guid,
        fv_length,
        signature: fv::SIGNATURE,
        attributes,
        header_length: u16::try_from(header_length).map_err(|_| FvError::InvalidParameter)?,
        checksum: 0,
        ext_header_offset: u16::try_from(ext_header_offset).map_err(|_| FvError::InvalidParameter)?,
        revision: fv::FFS_REVISION,
        block_map: block_map.to_vec(),
    };
    image.pwrite_with(&header, 0, scroll::LE)?;
    header.checksum = 0u16.wrapping_sub(checksum16(&image[..header_length]));
    image.pwrite_with(header.checksum, fv::offset::CHECKSUM, scroll::LE)?;

    Ok(image)
}
