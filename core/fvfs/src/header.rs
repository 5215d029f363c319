//! Firmware File System (FFS) file header codec.
//!
//! Pure translation between the persisted bytes of an `EFI_FFS_FILE_HEADER`/`EFI_FFS_FILE_HEADER2` and its
//! logical properties:
//! - the state byte, which only ever gains bits (relative to the erase polarity) as a file moves through its
//!   lifecycle, and whose highest set bit is the current [`State`];
//! - the 8-bit header checksum (state and file checksum excluded) and the data checksum or its fixed sentinel;
//! - size and data alignment decoding for both header variants.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use fvfs_sdk::pi::fw_fs::{
    ffs::{
        attributes::{self, raw as attribute},
        file::{self, State, Type},
    },
    fv::file::{raw::attribute as fv_attribute, EfiFvFileAttributes},
};
use r_efi::efi;
use scroll::{
    ctx::{TryFromCtx, TryIntoCtx},
    Endian, Pread, Pwrite,
};

use crate::{cache::VolumeCache, FvError};

/// Name used for every pad file this crate creates.
pub const PAD_FILE_NAME: efi::Guid = efi::Guid::from_bytes(&[0u8; 16]);

/// Decoded `EFI_FFS_FILE_HEADER`, with the extended size of `EFI_FFS_FILE_HEADER2` when the large file
/// attribute is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// File name GUID
    pub name: efi::Guid,
    /// Header checksum
    pub integrity_check_header: u8,
    /// Data checksum, or [`file::FIXED_CHECKSUM`] when the checksum attribute is clear
    pub integrity_check_file: u8,
    /// Raw file type
    pub file_type: u8,
    /// Raw FFS attributes
    pub attributes: u8,
    /// 24-bit size; zero for large files
    pub size: [u8; 3],
    /// Raw state byte
    pub state: u8,
    /// 64-bit size, present only for large files
    pub extended_size: Option<u64>,
}

impl<'a> TryFromCtx<'a, Endian> for FileHeader {
    type Error = scroll::Error;

    fn try_from_ctx(src: &'a [u8], ctx: Endian) -> Result<(Self, usize), Self::Error> {
        let mut offset = 0;
        let mut name = [0u8; 16];
        src.gread_inout_with(&mut offset, &mut name, ctx)?;
        let integrity_check_header: u8 = src.gread_with(&mut offset, ctx)?;
        let integrity_check_file: u8 = src.gread_with(&mut offset, ctx)?;
        let file_type: u8 = src.gread_with(&mut offset, ctx)?;
        let attributes: u8 = src.gread_with(&mut offset, ctx)?;
        let mut size = [0u8; 3];
        src.gread_inout_with(&mut offset, &mut size, ctx)?;
        let state: u8 = src.gread_with(&mut offset, ctx)?;
        let extended_size = if attributes & attribute::LARGE_FILE != 0 {
            Some(src.gread_with::<u64>(&mut offset, ctx)?)
        } else {
            None
        };
        let header = Self {
            name: efi::Guid::from_bytes(&name),
            integrity_check_header,
            integrity_check_file,
            file_type,
            attributes,
            size,
            state,
            extended_size,
        };
        Ok((header, offset))
    }
}

impl TryIntoCtx<Endian> for FileHeader {
    type Error = scroll::Error;

    fn try_into_ctx(self, dest: &mut [u8], ctx: Endian) -> Result<usize, Self::Error> {
        let mut offset = 0;
        dest.gwrite_with(self.name.as_bytes().as_slice(), &mut offset, ())?;
        dest.gwrite_with(self.integrity_check_header, &mut offset, ctx)?;
        dest.gwrite_with(self.integrity_check_file, &mut offset, ctx)?;
        dest.gwrite_with(self.file_type, &mut offset, ctx)?;
        dest.gwrite_with(self.attributes, &mut offset, ctx)?;
        dest.gwrite_with(self.size.as_slice(), &mut offset, ())?;
        dest.gwrite_with(self.state, &mut offset, ctx)?;
        if let Some(extended_size) = self.extended_size {
            dest.gwrite_with(extended_size, &mut offset, ctx)?;
        }
        Ok(offset)
    }
}

impl FileHeader {
    /// Builds an unsealed header for a file occupying `file_size` bytes in total, header included.
    ///
    /// Sizes above [`file::MAX_SMALL_FILE_SIZE`] select the large header. Checksums and state are left zero
    /// until [`FileHeader::seal`].
    pub fn new(name: efi::Guid, file_type: Type, attributes: u8, file_size: usize) -> Self {
        let mut header = Self {
            name,
            integrity_check_header: 0,
            integrity_check_file: 0,
            file_type: file_type.as_raw(),
            attributes: attributes & !attribute::LARGE_FILE,
            size: [0; 3],
            state: 0,
            extended_size: None,
        };
        header.set_file_size(file_size);
        header
    }

    /// Builds an unsealed pad file header covering `file_size` bytes.
    pub fn pad(file_size: usize) -> Self {
        Self::new(PAD_FILE_NAME, Type::FfsPad, 0, file_size)
    }

    /// Total file size (header included) needed to store `data_len` bytes of data.
    pub fn file_size_for(data_len: usize) -> usize {
        if data_len + file::HEADER_SIZE > file::MAX_SMALL_FILE_SIZE {
            data_len + file::HEADER2_SIZE
        } else {
            data_len + file::HEADER_SIZE
        }
    }

    /// Header size used by a file of `file_size` total bytes.
    pub fn header_size_for(file_size: usize) -> usize {
        if file_size > file::MAX_SMALL_FILE_SIZE { file::HEADER2_SIZE } else { file::HEADER_SIZE }
    }

    /// Rewrites the size fields, switching between the small and large layouts as needed.
    pub fn set_file_size(&mut self, file_size: usize) {
        if file_size > file::MAX_SMALL_FILE_SIZE {
            self.attributes |= attribute::LARGE_FILE;
            self.size = [0; 3];
            self.extended_size = Some(file_size as u64);
        } else {
            self.attributes &= !attribute::LARGE_FILE;
            let bytes = (file_size as u32).to_le_bytes();
            self.size.copy_from_slice(&bytes[..3]);
            self.extended_size = None;
        }
    }

    /// True when the large file attribute is set.
    pub fn is_large(&self) -> bool {
        self.attributes & attribute::LARGE_FILE != 0
    }

    /// Bytes occupied by the header itself.
    pub fn header_size(&self) -> usize {
        if self.is_large() { file::HEADER2_SIZE } else { file::HEADER_SIZE }
    }

    /// Total file size including the header. The 24-bit size is ignored for large files.
    pub fn file_size(&self) -> usize {
        match self.extended_size {
            Some(size) if self.is_large() => size as usize,
            _ => u32::from_le_bytes([self.size[0], self.size[1], self.size[2], 0]) as usize,
        }
    }

    /// Bytes of file data following the header.
    pub fn data_size(&self) -> usize {
        self.file_size().saturating_sub(self.header_size())
    }

    /// Decoded file type.
    pub fn file_type(&self) -> Type {
        Type::from_raw(self.file_type)
    }

    /// Required data alignment in bytes.
    pub fn data_alignment(&self) -> usize {
        1usize << alignment_exponent(self.attributes)
    }

    /// Decodes the FFS attributes into `EFI_FV_FILE_ATTRIBUTES`.
    pub fn fv_file_attributes(&self) -> EfiFvFileAttributes {
        let mut fv_attributes = alignment_exponent(self.attributes) as u32;
        if self.attributes & attribute::FIXED != 0 {
            fv_attributes |= fv_attribute::FIXED;
        }
        fv_attributes
    }

    /// Sum of the bytes covered by the header checksum. Zero for a header with a correct checksum.
    fn checksum_sum(&self) -> u8 {
        let mut sum = self.name.as_bytes().iter().fold(0u8, |sum, b| sum.wrapping_add(*b));
        sum = sum.wrapping_add(self.integrity_check_header);
        sum = sum.wrapping_add(self.file_type);
        sum = sum.wrapping_add(self.attributes);
        sum = self.size.iter().fold(sum, |sum, b| sum.wrapping_add(*b));
        if let Some(extended_size) = self.extended_size {
            sum = extended_size.to_le_bytes().iter().fold(sum, |sum, b| sum.wrapping_add(*b));
        }
        sum
    }

    /// True if the header checksum is correct. The state byte and the file checksum do not participate.
    pub fn verify_header_checksum(&self) -> bool {
        self.checksum_sum() == 0
    }

    /// True if `data` matches the file checksum, or the fixed sentinel is present when checksums are off.
    pub fn verify_file_checksum(&self, data: &[u8]) -> bool {
        if self.attributes & attribute::CHECKSUM != 0 {
            data_checksum(data) == self.integrity_check_file
        } else {
            self.integrity_check_file == file::FIXED_CHECKSUM
        }
    }

    /// Fills in the data checksum for `data`, then the header checksum.
    pub fn seal(&mut self, data: &[u8]) {
        self.integrity_check_file =
            if self.attributes & attribute::CHECKSUM != 0 { data_checksum(data) } else { file::FIXED_CHECKSUM };
        self.integrity_check_header = 0;
        self.integrity_check_header = 0u8.wrapping_sub(self.checksum_sum());
    }

    /// Serializes the header into the start of `dest`.
    pub fn write_to(&self, dest: &mut [u8]) -> Result<usize, FvError> {
        Ok(dest.pwrite_with(*self, 0, scroll::LE)?)
    }

    /// Decodes a header from the start of `src`.
    pub fn read_from(src: &[u8]) -> Result<Self, FvError> {
        Ok(src.pread_with(0, scroll::LE)?)
    }
}

/// Checksum that makes the bytes of `data` sum to zero.
pub fn data_checksum(data: &[u8]) -> u8 {
    0u8.wrapping_sub(data.iter().fold(0u8, |sum, b| sum.wrapping_add(*b)))
}

/// Recovers the file state from a raw state byte.
///
/// The byte is normalized against the erase value, then the highest set bit wins. Returns `None` when no bit is
/// set (the byte is still erased) or when the highest bit is one of the reserved bits.
pub fn file_state(erase_byte: u8, raw_state: u8) -> Option<State> {
    let bits = raw_state ^ erase_byte;
    if bits == 0 {
        return None;
    }
    State::from_bit(0x80u8 >> bits.leading_zeros())
}

/// Returns the raw state byte after advancing to `to`, or `None` if `to` is not ahead of the current state.
pub fn advanced_state_byte(erase_byte: u8, raw_state: u8, to: State) -> Option<u8> {
    let bits = raw_state ^ erase_byte;
    if bits >= to.bit() {
        return None;
    }
    Some(raw_state ^ to.bit())
}

/// Raw state byte of a header that passed through every creation state up to and including `state`.
pub fn created_state_byte(erase_byte: u8, state: State) -> u8 {
    erase_byte ^ ((state.bit() << 1) - 1)
}

/// Decodes the data alignment exponent from raw FFS attributes.
pub fn alignment_exponent(ffs_attributes: u8) -> u8 {
    let field = ((ffs_attributes & attribute::DATA_ALIGNMENT) >> attributes::DATA_ALIGNMENT_SHIFT) as usize;
    if ffs_attributes & attribute::DATA_ALIGNMENT_2 != 0 {
        attributes::DATA_ALIGNMENT_2_EXPONENTS[field]
    } else {
        attributes::DATA_ALIGNMENT_EXPONENTS[field]
    }
}

/// Encodes `EFI_FV_FILE_ATTRIBUTES` into raw FFS attributes.
///
/// The alignment exponent rounds down to the nearest table entry; exponents above 16 need the second table,
/// which only exists in FFS3 volumes. Returns `None` for exponents the volume cannot express.
pub fn ffs_attributes(fv_attributes: EfiFvFileAttributes, ffs3: bool) -> Option<u8> {
    let exponent = (fv_attributes & fv_attribute::ALIGNMENT) as u8;
    let (field, second_table) = match exponent {
        0..=3 => (0, false),
        4..=6 => (1, false),
        7 | 8 => (2, false),
        9 => (3, false),
        10 | 11 => (4, false),
        12..=14 => (5, false),
        15 => (6, false),
        16 => (7, false),
        17..=24 if ffs3 => (exponent - 17, true),
        _ => return None,
    };
    let mut raw = field << attributes::DATA_ALIGNMENT_SHIFT;
    if second_table {
        raw |= attribute::DATA_ALIGNMENT_2;
    }
    if fv_attributes & fv_attribute::FIXED != 0 {
        raw |= attribute::FIXED;
    }
    Some(raw)
}

/// Outcome of examining the bytes at a possible header location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderCheck {
    /// The location is unwritten.
    Erased,
    /// Remnant of an interrupted create or a carved pad file. The next possible header is `skip` bytes on.
    Incomplete {
        /// Recovered state, `HeaderConstruction` or `HeaderInvalid`
        state: State,
        /// Distance to the next possible header
        skip: usize,
    },
    /// A header with a verified checksum.
    Valid {
        /// Decoded header
        header: FileHeader,
        /// Recovered state
        state: State,
    },
    /// Not erased and not a usable header.
    Corrupt,
}

/// Examines `bytes` (the volume from a candidate header offset to its end) for a file header.
///
/// An incomplete header is skipped by the large header size when its checksum verifies with the large file
/// attribute, or when the attributes byte was written with that attribute set. Header writes land as a prefix,
/// so a written attributes byte is the one intended.
pub fn inspect_header(bytes: &[u8], erase_byte: u8) -> HeaderCheck {
    let window = bytes.len().min(file::HEADER_SIZE);
    if bytes[..window].iter().all(|&b| b == erase_byte) {
        return HeaderCheck::Erased;
    }
    if bytes.len() < file::HEADER_SIZE {
        return HeaderCheck::Corrupt;
    }

    let state = file_state(erase_byte, bytes[file::offset::STATE]);
    let header = FileHeader::read_from(bytes).ok();
    let checksum_ok = header.is_some_and(|h| h.verify_header_checksum());

    match (state, header) {
        (Some(state @ (State::HeaderConstruction | State::HeaderInvalid)), header) => {
            let attributes = bytes[file::offset::ATTRIBUTES];
            let skip = match header {
                Some(header) if checksum_ok => header.header_size(),
                _ if attributes != erase_byte && attributes & attribute::LARGE_FILE != 0 => file::HEADER2_SIZE,
                _ => file::HEADER_SIZE,
            };
            HeaderCheck::Incomplete { state, skip }
        }
        (Some(state), Some(header)) if checksum_ok => HeaderCheck::Valid { header, state },
        _ => HeaderCheck::Corrupt,
    }
}

/// Record of one tentative state advance in the cache, kept until the matching device write succeeds.
#[must_use]
pub(crate) struct StateChange {
    offset: usize,
    previous: u8,
}

impl StateChange {
    /// Restores the state byte to its value before the advance.
    pub(crate) fn rollback(self, cache: &mut VolumeCache) {
        // The offset was read successfully when the change was made.
        let _ = cache.set_byte(self.offset, self.previous);
    }
}

/// Advances the state of the header at `header_offset` in the cache to `to`.
pub(crate) fn advance_state(cache: &mut VolumeCache, header_offset: usize, to: State) -> Result<StateChange, FvError> {
    let offset = header_offset + file::offset::STATE;
    let previous = cache.byte(offset)?;
    let next = advanced_state_byte(cache.erase_byte(), previous, to).ok_or(FvError::InvalidState)?;
    cache.set_byte(offset, next)?;
    Ok(StateChange { offset, previous })
}
