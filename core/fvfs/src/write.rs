//! Crash-consistent file creation, update and deletion.
//!
//! Every mutation is a sequence of device writes, each persisted before the next one is prepared. A state
//! advance is applied to the cache first and rolled back there if its device write fails. Whatever reached
//! the device before a failure stays there; the next mount resolves it.
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
    pi::fw_fs::ffs::{self, file::State},
};

use crate::{
    block_io,
    header::{self, created_state_byte, FileHeader},
    scan::FileEntry,
    space::{self, CarveLayout, Request},
    FirmwareVolume, FirmwareVolumeBlock, FvError,
};

/// A validated file ready to be placed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NewFile<'a> {
    /// Unsealed header with name, type, attributes and total size filled in
    pub(crate) header: FileHeader,
    pub(crate) data: &'a [u8],
    /// Required data alignment in bytes
    pub(crate) alignment: usize,
}

impl NewFile<'_> {
    fn request(&self) -> Request {
        Request { file_size: self.header.file_size(), alignment: self.alignment }
    }
}

/// Where a lock-step batch is committed.
enum BatchTarget {
    /// Inside the pad file at this index.
    PadFile(usize, CarveLayout),
    /// Inside a new pad file of the given size at the start of this free-space extent.
    FreeSpace(usize, usize, CarveLayout),
}

impl<D: FirmwareVolumeBlock> FirmwareVolume<D> {
    /// Writes `len` cached bytes at `offset` to the device.
    fn persist(&mut self, offset: usize, len: usize) -> Result<(), FvError> {
        block_io::write(&mut self.device, &self.lba_map, offset, self.cache.bytes(offset, len)?)
    }

    /// Advances the state of the file whose header is at `offset` and persists the state byte.
    fn set_file_state(&mut self, offset: usize, state: State) -> Result<(), FvError> {
        let change = header::advance_state(&mut self.cache, offset, state)?;
        if let Err(err) = self.persist(offset + ffs::file::offset::STATE, 1) {
            log::error!("Failed to move file at {:#x} to {:?}: {:?}", offset, state, err);
            change.rollback(&mut self.cache);
            return Err(err);
        }
        Ok(())
    }

    fn position(&self, offset: usize) -> Option<usize> {
        self.files.iter().position(|entry| entry.offset == offset)
    }

    /// Indexes a new file at `offset`, keeping the index in volume order. Returns its position.
    fn insert_entry(&mut self, offset: usize) -> usize {
        let index = self.files.partition_point(|entry| entry.offset < offset);
        self.files.insert(index, FileEntry { offset });
        index
    }

    fn remove_entry(&mut self, offset: usize) {
        if let Some(index) = self.position(offset) {
            self.files.remove(index);
        }
    }

    /// Removes the first `len` bytes from a free-space extent.
    fn consume_free_space(&mut self, index: usize, len: usize) {
        let extent = &mut self.free_space[index];
        extent.start += len;
        extent.length = extent.length.saturating_sub(len);
        if extent.length == 0 {
            self.free_space.remove(index);
        }
    }

    /// Runs the creation sequence for one file at `offset` in erased space.
    ///
    /// The state goes Header-Construction, then the full header is written, then Header-Valid, the data, and
    /// finally Data-Valid. Pad files carry no data of their own and skip the data write.
    fn commit_file(&mut self, offset: usize, mut header: FileHeader, data: &[u8]) -> Result<(), FvError> {
        let header_size = header.header_size();
        header.seal(data);

        self.set_file_state(offset, State::HeaderConstruction)?;

        header.state = self.cache.byte(offset + ffs::file::offset::STATE)?;
        header.write_to(self.cache.bytes_mut(offset, header_size)?)?;
        self.persist(offset, header_size)?;

        self.set_file_state(offset, State::HeaderValid)?;

        if !data.is_empty() {
            self.cache.write(offset + header_size, data)?;
            self.persist(offset + header_size, data.len())?;
        }

        self.set_file_state(offset, State::DataValid)
    }

    /// Writes a header and data straight into the cache with the Data-Valid state, for a bulk write.
    fn stage_file(&mut self, offset: usize, mut header: FileHeader, data: &[u8]) -> Result<(), FvError> {
        let header_size = header.header_size();
        header.seal(data);
        header.state = created_state_byte(self.cache.erase_byte(), State::DataValid);
        header.write_to(self.cache.bytes_mut(offset, header_size)?)?;
        self.cache.write(offset + header_size, data)
    }

    /// Creates one file, in free space if an extent fits and inside a pad file otherwise.
    pub(crate) fn create_file(&mut self, file: &NewFile<'_>) -> Result<usize, FvError> {
        let request = file.request();

        if let Some((index, pad)) = space::locate_free_space(&self.free_space, request) {
            let start = self.free_space[index].start;
            let consumed = align_up(pad + request.file_size, ffs::FILE_ALIGNMENT).map_err(|_| FvError::OutOfResources)?;
            log::debug!("Placing {:?} at {:#x} after a {:#x} byte pad.", file.header.name, start + pad, pad);
            // The extent is spent even if a write below fails.
            self.consume_free_space(index, consumed);

            if pad > 0 {
                self.commit_file(start, FileHeader::pad(pad), &[])?;
                self.insert_entry(start);
            }
            let offset = start + pad;
            self.commit_file(offset, file.header, file.data)?;
            self.insert_entry(offset);
            log::info!("Created {:?} at {:#x}.", file.header.name, offset);
            return Ok(offset);
        }

        if let Some((pad_index, layout)) =
            space::locate_pad_file(&self.cache, &self.files, &[request], self.header.is_ffs3())
        {
            let offsets = self.carve_pad_file(pad_index, &layout, &[*file])?;
            log::info!("Created {:?} at {:#x} inside a pad file.", file.header.name, offsets[0]);
            return Ok(offsets[0]);
        }

        log::warn!("No room for {:?} ({:#x} bytes).", file.header.name, request.file_size);
        Err(FvError::OutOfResources)
    }

    /// Replaces the file at `old` with `file`.
    ///
    /// The old copy is Marked-For-Update while the new one is created and Deleted afterwards. It leaves the
    /// index only once it is Deleted.
    pub(crate) fn update_file(&mut self, old: usize, file: &NewFile<'_>) -> Result<(), FvError> {
        if (FileEntry { offset: old }).state(&self.cache) == Some(State::DataValid) {
            self.set_file_state(old, State::MarkedForUpdate)?;
        }
        self.create_file(file)?;
        self.set_file_state(old, State::Deleted)?;
        self.remove_entry(old);
        log::info!("Updated {:?}.", file.header.name);
        Ok(())
    }

    /// Deletes the file at `offset`.
    pub(crate) fn delete_file(&mut self, offset: usize) -> Result<(), FvError> {
        self.set_file_state(offset, State::Deleted)?;
        self.remove_entry(offset);
        log::info!("Deleted file at {:#x}.", offset);
        Ok(())
    }

    /// Commits `files` inside the pad file at `pad_index` with a single bulk write.
    ///
    /// The pad goes Marked-For-Update, the new headers (already Data-Valid), their data and any leading or
    /// trailing pads are staged in the cache, the whole area is written at once, and only then does the pad
    /// header move to Header-Invalid. The pad leaves the index on any failure after it was marked.
    fn carve_pad_file(
        &mut self,
        pad_index: usize,
        layout: &CarveLayout,
        files: &[NewFile<'_>],
    ) -> Result<Vec<usize>, FvError> {
        let pad_offset = self.files[pad_index].offset;
        self.set_file_state(pad_offset, State::MarkedForUpdate)?;

        let mut entries = Vec::new();
        let mut offsets = Vec::new();
        for (placement, file) in layout.placements.iter().zip(files) {
            if placement.leading_pad > 0 {
                let pad_at = placement.offset - placement.leading_pad;
                self.stage_file(pad_at, FileHeader::pad(placement.leading_pad), &[])?;
                entries.push(FileEntry { offset: pad_at });
            }
            self.stage_file(placement.offset, file.header, file.data)?;
            entries.push(FileEntry { offset: placement.offset });
            offsets.push(placement.offset);
        }
        if let Some((offset, size)) = layout.trailing_pad {
            self.stage_file(offset, FileHeader::pad(size), &[])?;
            entries.push(FileEntry { offset });
        }

        let result = self
            .persist(layout.start, layout.end - layout.start)
            .and_then(|()| self.set_file_state(pad_offset, State::HeaderInvalid));
        if let Err(err) = result {
            log::error!("Reusing the pad file at {:#x} failed: {:?}", pad_offset, err);
            self.files.remove(pad_index);
            return Err(err);
        }

        self.files.splice(pad_index..=pad_index, entries);
        Ok(offsets)
    }

    /// Writes several files so that all of them become valid together or none do.
    ///
    /// Each item carries the offset of the copy it replaces, if any. Placement is decided before the first
    /// device write: an existing pad file if one holds the whole batch, otherwise a new pad file in free space.
    pub(crate) fn write_batch(&mut self, items: &[(Option<usize>, NewFile<'_>)]) -> Result<(), FvError> {
        let requests: Vec<Request> = items.iter().map(|(_, file)| file.request()).collect();
        let ffs3 = self.header.is_ffs3();

        let target = if let Some((index, layout)) = space::locate_pad_file(&self.cache, &self.files, &requests, ffs3)
        {
            BatchTarget::PadFile(index, layout)
        } else if let Some((index, pad_size, layout)) = space::plan_free_space_pad(&self.free_space, &requests, ffs3)
        {
            BatchTarget::FreeSpace(index, pad_size, layout)
        } else {
            log::warn!("No room for a batch of {} files.", items.len());
            return Err(FvError::OutOfResources);
        };

        let (pad_index, layout) = match target {
            BatchTarget::PadFile(index, layout) => (index, layout),
            BatchTarget::FreeSpace(index, pad_size, layout) => {
                let start = self.free_space[index].start;
                self.consume_free_space(index, pad_size);
                self.commit_file(start, FileHeader::pad(pad_size), &[])?;
                (self.insert_entry(start), layout)
            }
        };
        log::debug!("Committing {} files between {:#x} and {:#x}.", items.len(), layout.start, layout.end);

        for old in items.iter().filter_map(|(old, _)| *old) {
            if (FileEntry { offset: old }).state(&self.cache) == Some(State::DataValid) {
                self.set_file_state(old, State::MarkedForUpdate)?;
            }
        }

        let files: Vec<NewFile<'_>> = items.iter().map(|(_, file)| *file).collect();
        self.carve_pad_file(pad_index, &layout, &files)?;

        for old in items.iter().filter_map(|(old, _)| *old) {
            self.set_file_state(old, State::Deleted)?;
            self.remove_entry(old);
        }
        log::info!("Committed a batch of {} files.", items.len());
        Ok(())
    }
}
