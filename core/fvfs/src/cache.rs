//! In-memory image of a mounted volume.
//!
//! The whole volume is copied into one buffer at mount. Every header, state byte and data region is addressed by
//! its byte offset from the start of the volume, with bounds checks on each access.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use alloc::vec::Vec;

use crate::FvError;

pub(crate) struct VolumeCache {
    image: Vec<u8>,
    erase_byte: u8,
}

impl VolumeCache {
    pub(crate) fn new(image: Vec<u8>, erase_byte: u8) -> Self {
        Self { image, erase_byte }
    }

    pub(crate) fn len(&self) -> usize {
        self.image.len()
    }

    /// The value of an unwritten byte on this volume.
    pub(crate) fn erase_byte(&self) -> u8 {
        self.erase_byte
    }

    pub(crate) fn bytes(&self, offset: usize, len: usize) -> Result<&[u8], FvError> {
        let end = offset.checked_add(len).ok_or(FvError::VolumeCorrupted)?;
        self.image.get(offset..end).ok_or(FvError::VolumeCorrupted)
    }

    pub(crate) fn bytes_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8], FvError> {
        let end = offset.checked_add(len).ok_or(FvError::VolumeCorrupted)?;
        self.image.get_mut(offset..end).ok_or(FvError::VolumeCorrupted)
    }

    /// Everything from `offset` to the end of the volume.
    pub(crate) fn tail(&self, offset: usize) -> Result<&[u8], FvError> {
        self.image.get(offset..).ok_or(FvError::VolumeCorrupted)
    }

    pub(crate) fn byte(&self, offset: usize) -> Result<u8, FvError> {
        self.image.get(offset).copied().ok_or(FvError::VolumeCorrupted)
    }

    pub(crate) fn set_byte(&mut self, offset: usize, value: u8) -> Result<(), FvError> {
        let byte = self.image.get_mut(offset).ok_or(FvError::VolumeCorrupted)?;
        *byte = value;
        Ok(())
    }

    /// True if every byte in the range reads as erased. Out-of-range bytes never do.
    pub(crate) fn is_erased(&self, offset: usize, len: usize) -> bool {
        self.bytes(offset, len).is_ok_and(|bytes| bytes.iter().all(|&b| b == self.erase_byte))
    }

    pub(crate) fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), FvError> {
        self.bytes_mut(offset, data.len())?.copy_from_slice(data);
        Ok(())
    }
}
