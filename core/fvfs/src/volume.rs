//! Mounted firmware volume.
//!
//! [`FirmwareVolume`] owns the block device, the cached image and the two indexes built at mount: the live
//! files in volume order and the free-space extents. Reads are served from the cache; writes go through the
//! write engine and keep the cache and indexes in step with the device.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use alloc::vec::Vec;

use fvfs_sdk::pi::fw_fs::{
    ffs::{
        attributes::raw as attribute,
        file::{self, State, Type},
        section::EfiSectionType,
    },
    fv::{
        self,
        attributes::{raw::fv2, EfiFvAttributes},
        file::{raw::attribute as fv_attribute, EfiFvFileAttributes},
        WritePolicy,
    },
    fvb::attributes::{erase_byte, raw as fvb_raw, raw::fvb2, EfiFvbAttributes2},
};
use r_efi::efi;

use crate::{
    block_io::{self, LbaMap},
    cache::VolumeCache,
    config::VolumeConfig,
    header::{self, FileHeader},
    scan::{self, FileEntry, FreeSpaceEntry, ScanResult},
    section::SectionExtractor,
    volume_header::VolumeHeader,
    write::NewFile,
    FirmwareVolumeBlock, FvError,
};

/// Bits of the device attributes reported as volume attributes.
const REPORTED_FVB_ATTRIBUTES: EfiFvbAttributes2 = 0xFFFF_F0FF;

/// Status bits a caller may change through [`FirmwareVolume::set_volume_attributes`].
const SETTABLE_STATUS: EfiFvbAttributes2 =
    fvb2::READ_STATUS | fvb2::WRITE_STATUS | fvb2::LOCK_STATUS | fvb2::READ_LOCK_STATUS | fvb2::WRITE_LOCK_STATUS;

/// One file in a [`FirmwareVolume::write_files`] request.
///
/// Data for a name that already exists replaces that file. Empty data deletes it.
#[derive(Debug, Clone, Copy)]
pub struct FileRecord<'a> {
    /// File name
    pub name: efi::Guid,
    /// File type; pad, reserved and FFS-internal types are rejected
    pub file_type: Type,
    /// `EFI_FV_FILE_ATTRIBUTES`: alignment exponent and `FIXED`
    pub attributes: EfiFvFileAttributes,
    /// Store a data checksum instead of the fixed sentinel
    pub checksum: bool,
    /// File data
    pub data: &'a [u8],
}

impl<'a> FileRecord<'a> {
    /// A file of `file_type` holding `data`, byte aligned and without a data checksum.
    pub fn new(name: efi::Guid, file_type: Type, data: &'a [u8]) -> Self {
        Self { name, file_type, attributes: 0, checksum: false, data }
    }

    /// A request to delete the file named `name`.
    pub fn delete(name: efi::Guid) -> Self {
        Self::new(name, Type::All, &[])
    }

    /// Sets the `EFI_FV_FILE_ATTRIBUTES` of the file.
    pub fn with_attributes(mut self, attributes: EfiFvFileAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Stores a checksum of the data in the header.
    pub fn with_checksum(mut self) -> Self {
        self.checksum = true;
        self
    }
}

/// What enumeration and reads report about a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    /// File name
    pub name: efi::Guid,
    /// File type
    pub file_type: Type,
    /// `EFI_FV_FILE_ATTRIBUTES` decoded from the header
    pub attributes: EfiFvFileAttributes,
    /// Size of the file data in bytes
    pub size: usize,
}

/// Enumeration cursor for [`FirmwareVolume::get_next_file`]. Start from [`FileKey::default`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileKey(usize);

/// Summary of a mounted volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    /// Name from the extended header, if the volume has one
    pub fv_name: Option<efi::Guid>,
    /// FFS2 or FFS3 file system GUID
    pub file_system_guid: efi::Guid,
    /// Total volume length in bytes
    pub fv_length: u64,
    /// Value of an erased byte
    pub erase_byte: u8,
    /// Live files, pad files excluded
    pub file_count: usize,
    /// Bytes left in free space
    pub free_bytes: usize,
}

enum Operation<'a> {
    Create(NewFile<'a>),
    Update(usize, NewFile<'a>),
    Delete(usize),
}

/// A firmware volume mounted on a block device.
pub struct FirmwareVolume<D: FirmwareVolumeBlock> {
    pub(crate) device: D,
    pub(crate) config: VolumeConfig,
    pub(crate) header: VolumeHeader,
    pub(crate) fv_name: Option<efi::Guid>,
    pub(crate) cache: VolumeCache,
    pub(crate) lba_map: LbaMap,
    pub(crate) free_space: Vec<FreeSpaceEntry>,
    pub(crate) files: Vec<FileEntry>,
    /// A write failed part way; the cache and indexes may not match the device.
    pub(crate) needs_rescan: bool,
}

impl<D: FirmwareVolumeBlock> core::fmt::Debug for FirmwareVolume<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FirmwareVolume")
            .field("fv_name", &self.fv_name)
            .field("fv_length", &self.header.fv_length)
            .field("files", &self.files.len())
            .field("free_space", &self.free_space)
            .finish()
    }
}

impl<D: FirmwareVolumeBlock> FirmwareVolume<D> {
    /// Reads and validates the volume on `device`, then indexes its files and free space.
    ///
    /// Interrupted writes found on the volume are resolved in memory; nothing is written to the device.
    pub fn mount(device: D, config: VolumeConfig) -> Result<Self, FvError> {
        let attributes = device.attributes().map_err(FvError::Device)?;
        if attributes & fvb2::READ_STATUS == 0 {
            log::error!("Volume device is not readable.");
            return Err(FvError::AccessDenied);
        }

        let fixed = block_io::read_from_start(&device, fv::HEADER_SIZE)?;
        let header_length = VolumeHeader::header_length_of(&fixed)?.max(fv::HEADER_SIZE);
        let header = VolumeHeader::parse(&block_io::read_from_start(&device, header_length)?)?;

        let lba_map = LbaMap::from_block_map(&header.block_map)?;
        let (cache, fv_name, scanned) = load(&device, &header, &lba_map, erase_byte(attributes), &config)?;

        let volume = Self {
            device,
            config,
            header,
            fv_name,
            cache,
            lba_map,
            free_space: scanned.free_space,
            files: scanned.files,
            needs_rescan: false,
        };
        let info = volume.volume_info();
        log::info!(
            "Mounted {} volume {:?}: {:#x} bytes, {} files, {:#x} bytes free.",
            if volume.header.is_ffs3() { "FFS3" } else { "FFS2" },
            info.fv_name,
            info.fv_length,
            info.file_count,
            info.free_bytes
        );
        Ok(volume)
    }

    /// Rebuilds the cache and indexes from the device the way a mount does.
    fn rescan(&mut self) -> Result<(), FvError> {
        let (cache, _, scanned) =
            load(&self.device, &self.header, &self.lba_map, self.cache.erase_byte(), &self.config)?;
        self.cache = cache;
        self.files = scanned.files;
        self.free_space = scanned.free_space;
        self.needs_rescan = false;
        Ok(())
    }

    /// Unmounts the volume and hands back the device.
    pub fn into_device(self) -> D {
        self.device
    }

    /// Summary of the mounted volume.
    pub fn volume_info(&self) -> VolumeInfo {
        VolumeInfo {
            fv_name: self.fv_name,
            file_system_guid: self.header.file_system_guid,
            fv_length: self.header.fv_length,
            erase_byte: self.cache.erase_byte(),
            file_count: self.files.iter().filter(|entry| !self.is_pad(entry)).count(),
            free_bytes: self.free_space.iter().map(|extent| extent.length).sum(),
        }
    }

    /// `EFI_FV_ATTRIBUTES` of the volume: the device attributes with the write-policy bit added.
    pub fn volume_attributes(&self) -> Result<EfiFvAttributes, FvError> {
        let attributes = self.device.attributes().map_err(FvError::Device)?;
        Ok((attributes & REPORTED_FVB_ATTRIBUTES) as EfiFvAttributes | fv2::WRITE_POLICY_RELIABLE)
    }

    /// Changes the read, write and lock status of the volume.
    ///
    /// Capabilities and alignment cannot change, each status change needs its capability, and a locked volume
    /// cannot be changed at all. Returns the attributes now in effect.
    pub fn set_volume_attributes(&mut self, attributes: EfiFvAttributes) -> Result<EfiFvAttributes, FvError> {
        let current = self.device.attributes().map_err(FvError::Device)?;
        let requested = (attributes as EfiFvbAttributes2) & REPORTED_FVB_ATTRIBUTES;

        if current & fvb2::LOCK_STATUS != 0 {
            log::warn!("Volume is locked; attributes {:#x} refused.", attributes);
            return Err(FvError::AccessDenied);
        }
        if requested & fvb_raw::CAPABILITIES != current & fvb_raw::CAPABILITIES
            || requested & fvb2::ALIGNMENT != current & fvb2::ALIGNMENT
        {
            return Err(FvError::InvalidParameter);
        }

        let changed = requested ^ current;
        let toggles = [
            (fvb2::READ_STATUS, fvb2::READ_ENABLED_CAP, fvb2::READ_DISABLED_CAP, fvb2::READ_LOCK_STATUS),
            (fvb2::WRITE_STATUS, fvb2::WRITE_ENABLED_CAP, fvb2::WRITE_DISABLED_CAP, fvb2::WRITE_LOCK_STATUS),
        ];
        for (status, enable_cap, disable_cap, lock) in toggles {
            if changed & status == 0 {
                continue;
            }
            if current & lock != 0 {
                return Err(FvError::AccessDenied);
            }
            let cap = if requested & status != 0 { enable_cap } else { disable_cap };
            if current & cap == 0 {
                return Err(FvError::InvalidParameter);
            }
        }

        let locks = [
            (fvb2::LOCK_STATUS, fvb2::LOCK_CAP),
            (fvb2::READ_LOCK_STATUS, fvb2::READ_LOCK_CAP),
            (fvb2::WRITE_LOCK_STATUS, fvb2::WRITE_LOCK_CAP),
        ];
        for (status, cap) in locks {
            if changed & status == 0 {
                continue;
            }
            if current & status != 0 {
                return Err(FvError::AccessDenied);
            }
            if current & cap == 0 {
                return Err(FvError::InvalidParameter);
            }
        }

        let new = (current & !SETTABLE_STATUS) | (requested & SETTABLE_STATUS);
        let applied = self.device.set_attributes(new).map_err(FvError::Device)?;
        log::info!("Volume attributes changed from {:#x} to {:#x}.", current, applied);
        Ok((applied & REPORTED_FVB_ATTRIBUTES) as EfiFvAttributes | fv2::WRITE_POLICY_RELIABLE)
    }

    /// Returns the next live file after `key` matching `file_type`, and advances `key` past it.
    ///
    /// [`Type::All`] matches every type. Pad files are never returned.
    pub fn get_next_file(&self, key: &mut FileKey, file_type: Type) -> Result<FileInfo, FvError> {
        let memory_mapped = self.readable_attributes()? & fvb2::MEMORY_MAPPED != 0;
        if matches!(file_type, Type::Reserved(_) | Type::FfsPad | Type::Ffs(_)) {
            return Err(FvError::NotFound);
        }

        while let Some(entry) = self.files.get(key.0) {
            key.0 += 1;
            let header = entry.header(&self.cache)?;
            if header.file_type() == Type::FfsPad {
                continue;
            }
            if file_type != Type::All && header.file_type() != file_type {
                continue;
            }
            if entry.state(&self.cache) == Some(State::MarkedForUpdate)
                && self.find_entry(&header.name).is_some_and(|live| live.offset != entry.offset)
            {
                continue;
            }
            return self.file_info_of(entry, &header, memory_mapped);
        }
        Err(FvError::NotFound)
    }

    /// Type, attributes and size of the live file `name`.
    pub fn file_info(&self, name: &efi::Guid) -> Result<FileInfo, FvError> {
        let memory_mapped = self.readable_attributes()? & fvb2::MEMORY_MAPPED != 0;
        let entry = self.find_entry(name).ok_or(FvError::NotFound)?;
        self.file_info_of(&entry, &entry.header(&self.cache)?, memory_mapped)
    }

    /// Copies the data of the live file `name`.
    pub fn read_file(&self, name: &efi::Guid) -> Result<(FileInfo, Vec<u8>), FvError> {
        let info = self.file_info(name)?;
        let mut data = Vec::new();
        data.try_reserve_exact(info.size).map_err(|_| FvError::OutOfResources)?;
        data.resize(info.size, 0);
        self.read_file_into(name, &mut data)?;
        Ok((info, data))
    }

    /// Copies the data of the live file `name` into the start of `buffer`.
    pub fn read_file_into(&self, name: &efi::Guid, buffer: &mut [u8]) -> Result<FileInfo, FvError> {
        let info = self.file_info(name)?;
        if buffer.len() < info.size {
            return Err(FvError::BufferTooSmall);
        }
        let entry = self.find_entry(name).ok_or(FvError::NotFound)?;
        let (start, len) = self.file_data_range(&entry)?;
        buffer[..len].copy_from_slice(self.cache.bytes(start, len)?);
        Ok(info)
    }

    /// Returns the body of the `instance`-th section of `section_type` in the live file `name`.
    pub fn read_section(
        &self,
        name: &efi::Guid,
        section_type: EfiSectionType,
        instance: usize,
        extractor: &dyn SectionExtractor,
    ) -> Result<Vec<u8>, FvError> {
        self.readable_attributes()?;
        let entry = self.find_entry(name).ok_or(FvError::NotFound)?;
        let header = entry.header(&self.cache)?;
        let data = self.cache.bytes(entry.offset + header.header_size(), header.data_size())?;
        extractor.find_section(data, section_type, instance)
    }

    /// Creates, replaces or deletes the files in `records`.
    ///
    /// The whole request is validated before the device is touched. A single record, or several under
    /// [`WritePolicy::UnreliableWrite`], runs one file at a time and stops at the first failure. Several records
    /// under [`WritePolicy::ReliableWrite`] become valid together; deletes in such a batch run after it.
    pub fn write_files(&mut self, policy: WritePolicy, records: &[FileRecord<'_>]) -> Result<(), FvError> {
        if records.len() > self.config.max_files_per_write() {
            log::warn!("Write of {} files exceeds the limit of {}.", records.len(), self.config.max_files_per_write());
            return Err(FvError::Unsupported);
        }
        if records.is_empty() {
            return Err(FvError::InvalidParameter);
        }
        if self.device.attributes().map_err(FvError::Device)? & fvb2::WRITE_STATUS == 0 {
            return Err(FvError::WriteProtected);
        }
        if self.needs_rescan {
            log::info!("Rescanning the volume after a failed write.");
            self.rescan()?;
        }

        let mut prepared = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            if records[..index].iter().any(|other| other.name == record.name) {
                log::warn!("File {:?} appears twice in one write.", record.name);
                return Err(FvError::InvalidParameter);
            }
            prepared.push(self.prepare(record)?);
        }

        let mut operations = Vec::with_capacity(records.len());
        for (record, file) in records.iter().zip(prepared) {
            let existing = self.find_entry(&record.name).map(|entry| entry.offset);
            operations.push(match (existing, file) {
                (Some(offset), Some(file)) => Operation::Update(offset, file),
                (Some(offset), None) => Operation::Delete(offset),
                (None, Some(file)) => Operation::Create(file),
                (None, None) => return Err(FvError::NotFound),
            });
        }

        let result = self.commit(policy, operations);
        if result.is_err() {
            // The next write places files from the device contents.
            self.needs_rescan = true;
        }
        result
    }

    fn commit(&mut self, policy: WritePolicy, operations: Vec<Operation<'_>>) -> Result<(), FvError> {
        if operations.len() == 1 || policy == WritePolicy::UnreliableWrite {
            return operations.into_iter().try_for_each(|operation| self.apply(operation));
        }

        let mut batch = Vec::new();
        let mut deletes = Vec::new();
        for operation in operations {
            match operation {
                Operation::Create(file) => batch.push((None, file)),
                Operation::Update(offset, file) => batch.push((Some(offset), file)),
                Operation::Delete(offset) => deletes.push(offset),
            }
        }
        if !batch.is_empty() {
            self.write_batch(&batch)?;
        }
        deletes.into_iter().try_for_each(|offset| self.delete_file(offset))
    }

    /// Validates one record. Returns `None` for a delete.
    fn prepare<'a>(&self, record: &FileRecord<'a>) -> Result<Option<NewFile<'a>>, FvError> {
        if record.data.is_empty() {
            return Ok(None);
        }
        if !record.file_type.is_writable() {
            log::warn!("File {:?} has type {:?}, which cannot be written.", record.name, record.file_type);
            return Err(FvError::InvalidParameter);
        }
        let ffs3 = self.header.is_ffs3();
        let mut attributes = header::ffs_attributes(record.attributes, ffs3).ok_or(FvError::InvalidParameter)?;
        if record.checksum {
            attributes |= attribute::CHECKSUM;
        }
        let file_size = FileHeader::file_size_for(record.data.len());
        if file_size > file::MAX_SMALL_FILE_SIZE && !ffs3 {
            log::warn!("File {:?} needs a large header, which FFS2 volumes cannot hold.", record.name);
            return Err(FvError::InvalidParameter);
        }
        let alignment = 1usize << (record.attributes & fv_attribute::ALIGNMENT);
        Ok(Some(NewFile {
            header: FileHeader::new(record.name, record.file_type, attributes, file_size),
            data: record.data,
            alignment,
        }))
    }

    fn apply(&mut self, operation: Operation<'_>) -> Result<(), FvError> {
        match operation {
            Operation::Create(file) => self.create_file(&file).map(|_| ()),
            Operation::Update(offset, file) => self.update_file(offset, &file),
            Operation::Delete(offset) => self.delete_file(offset),
        }
    }

    fn readable_attributes(&self) -> Result<EfiFvbAttributes2, FvError> {
        let attributes = self.device.attributes().map_err(FvError::Device)?;
        if attributes & fvb2::READ_STATUS == 0 {
            return Err(FvError::AccessDenied);
        }
        Ok(attributes)
    }

    fn is_pad(&self, entry: &FileEntry) -> bool {
        entry.header(&self.cache).is_ok_and(|header| header.file_type() == Type::FfsPad)
    }

    /// Live entry named `name`. A Data-Valid copy wins over one left Marked-For-Update.
    fn find_entry(&self, name: &efi::Guid) -> Option<FileEntry> {
        let mut found = None;
        for entry in &self.files {
            let Ok(header) = entry.header(&self.cache) else { continue };
            if header.name != *name || header.file_type() == Type::FfsPad {
                continue;
            }
            if entry.state(&self.cache) == Some(State::DataValid) {
                return Some(*entry);
            }
            found.get_or_insert(*entry);
        }
        found
    }

    /// Offset and length of the data reported for a file. The volume top file drops its leading zero words.
    fn file_data_range(&self, entry: &FileEntry) -> Result<(usize, usize), FvError> {
        let header = entry.header(&self.cache)?;
        let mut start = entry.offset + header.header_size();
        let mut len = header.data_size();
        if header.name == fv::TOP_FILE_GUID {
            while len >= 4 && self.cache.bytes(start, 4)? == [0u8; 4] {
                start += 4;
                len -= 4;
            }
        }
        Ok((start, len))
    }

    fn file_info_of(&self, entry: &FileEntry, header: &FileHeader, memory_mapped: bool) -> Result<FileInfo, FvError> {
        let (_, size) = self.file_data_range(entry)?;
        let mut attributes = header.fv_file_attributes();
        if memory_mapped {
            attributes |= fv_attribute::MEMORY_MAPPED;
        }
        Ok(FileInfo { name: header.name, file_type: header.file_type(), attributes, size })
    }
}

/// Reads the whole volume into a cache and scans it.
fn load<D: FirmwareVolumeBlock>(
    device: &D,
    header: &VolumeHeader,
    lba_map: &LbaMap,
    erase_byte: u8,
    config: &VolumeConfig,
) -> Result<(VolumeCache, Option<efi::Guid>, ScanResult), FvError> {
    let image = block_io::read_volume(device, lba_map)?;
    let layout = header.content_layout(&image)?;
    let mut cache = VolumeCache::new(image, erase_byte);
    let scanned = scan::scan(&mut cache, layout.content_offset, header.is_ffs3(), config.large_file_policy())?;
    Ok((cache, layout.fv_name, scanned))
}
