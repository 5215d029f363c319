//! Where files land in the volume image, and how an image laid out by another writer is read.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent

use fvfs::{
    header::{created_state_byte, FileHeader},
    volume_header::format_volume,
    FileRecord, FvError,
};
use fvfs_sdk::pi::fw_fs::{
    ffs::file::{State, Type},
    fv::{self, WritePolicy},
};
use r_efi::efi;

use crate::fvfs_integration::common::{
    guid, header_offset, mount, names, remount, uniform, FlashDevice, ATTRIBUTES, ZERO_ERASE_ATTRIBUTES,
};

const CONTENT_OFFSET: usize = 0x48;

#[test]
fn files_are_packed_on_eight_byte_boundaries() {
    for attributes in [ATTRIBUTES, ZERO_ERASE_ATTRIBUTES] {
        let erase = if attributes == ATTRIBUTES { 0xFF } else { 0x00 };
        let device = FlashDevice::formatted(fv::FFS2_GUID, attributes, &uniform(2, 0x1000), None);
        let mut volume = mount(device).unwrap();
        for (id, len) in [(1, 1usize), (2, 5), (3, 13)] {
            let data = vec![0x5A; len];
            volume.write_files(WritePolicy::ReliableWrite, &[FileRecord::new(guid(id), Type::Raw, &data)]).unwrap();
        }

        let volume = remount(volume);
        assert_eq!(names(&volume), [guid(1), guid(2), guid(3)]);
        let device = volume.into_device();
        let image = device.image();
        assert_eq!(header_offset(image, &guid(1)), CONTENT_OFFSET);
        assert_eq!(header_offset(image, &guid(2)), 0x68);
        assert_eq!(header_offset(image, &guid(3)), 0x88);
        assert!(image[CONTENT_OFFSET + 25..0x68].iter().all(|&b| b == erase));
        assert!(image[0x68 + 29..0x88].iter().all(|&b| b == erase));
        assert!(image[0x88 + 37..].iter().all(|&b| b == erase));
    }
}

#[test]
fn data_lands_on_the_requested_alignment() {
    let device = FlashDevice::formatted(fv::FFS2_GUID, ATTRIBUTES, &uniform(8, 0x1000), None);
    let mut volume = mount(device).unwrap();
    let exponents = [3u32, 4, 7, 9, 12, 5];
    for (id, exponent) in (1..).zip(exponents) {
        let data = vec![id as u8; 0x30];
        let record = FileRecord::new(guid(id), Type::Driver, &data).with_attributes(exponent);
        volume.write_files(WritePolicy::ReliableWrite, &[record]).unwrap();
    }

    let volume = remount(volume);
    assert_eq!(names(&volume), (1..=exponents.len() as u32).map(guid).collect::<Vec<_>>());
    for (id, _) in (1..).zip(exponents) {
        assert_eq!(volume.read_file(&guid(id)).unwrap().1, vec![id as u8; 0x30]);
    }
    let device = volume.into_device();
    for (id, exponent) in (1..).zip(exponents) {
        let data_offset = header_offset(device.image(), &guid(id)) + 24;
        assert_eq!(data_offset % (1 << exponent), 0, "file {id} with alignment 2^{exponent}");
    }
}

#[test]
fn short_remainders_of_a_reused_pad_stay_erased() {
    for tail in [8usize, 16] {
        let device = FlashDevice::formatted(fv::FFS2_GUID, ATTRIBUTES, &uniform(2, 0x1000), None);
        let mut volume = mount(device).unwrap();

        // The alignment puts a 0xFA0 byte pad file at the content offset. Eight bytes before this name, erased
        // bytes and the name add up to a checksummed Data-Valid header.
        let a = [0xAA; 0x100];
        let a_name = efi::Guid::from_bytes(&[8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xF8]);
        let record = FileRecord::new(a_name, Type::Raw, &a).with_attributes(12);
        volume.write_files(WritePolicy::ReliableWrite, &[record]).unwrap();
        let b = vec![0xBB; 0xEE0];
        volume.write_files(WritePolicy::ReliableWrite, &[FileRecord::new(guid(2), Type::Raw, &b)]).unwrap();
        assert_eq!(volume.volume_info().free_bytes, 8);

        // Pad data spans 0x60..0xFE8; this file ends `tail` bytes short of it.
        let c = vec![0xCC; 0xF88 - tail - 24];
        volume.write_files(WritePolicy::ReliableWrite, &[FileRecord::new(guid(3), Type::Raw, &c)]).unwrap();

        let volume = remount(volume);
        assert_eq!(names(&volume), [guid(3), a_name, guid(2)]);
        assert_eq!(volume.read_file(&guid(3)).unwrap().1, c);
        assert_eq!(volume.read_file(&a_name).unwrap().1, a);
        let device = volume.into_device();
        assert_eq!(header_offset(device.image(), &guid(3)), 0x60);
        assert!(device.image()[0xFE8 - tail..0xFE8].iter().all(|&b| b == 0xFF));
    }
}

#[test]
fn later_copies_of_a_name_win() {
    let block_map = uniform(2, 0x1000);
    let mut image = format_volume(fv::FFS2_GUID, ATTRIBUTES, &block_map, None).unwrap();
    let name = guid(7);
    let mut offset = CONTENT_OFFSET;
    for data in [[1u8; 8], [2u8; 8]] {
        let mut header = FileHeader::new(name, Type::Raw, 0, FileHeader::file_size_for(data.len()));
        header.seal(&data);
        header.state = created_state_byte(0xFF, State::DataValid);
        let written = header.write_to(&mut image[offset..]).unwrap();
        image[offset + written..offset + written + data.len()].copy_from_slice(&data);
        offset += 32;
    }

    let mut volume = mount(FlashDevice::new(image, &block_map, ATTRIBUTES)).unwrap();
    assert_eq!(names(&volume), [name]);
    assert_eq!(volume.read_file(&name).unwrap().1, [2u8; 8]);

    volume.write_files(WritePolicy::ReliableWrite, &[FileRecord::new(name, Type::Raw, &[3u8; 3])]).unwrap();
    let volume = remount(volume);
    assert_eq!(names(&volume), [name]);
    assert_eq!(volume.read_file(&name).unwrap().1, [3u8; 3]);
}

#[test]
fn files_that_cannot_fit_are_rejected_untouched() {
    let device = FlashDevice::formatted(fv::FFS2_GUID, ATTRIBUTES, &uniform(1, 0x1000), None);
    let mut volume = mount(device).unwrap();
    let data = vec![0x11; 0x1000];
    assert_eq!(
        volume.write_files(WritePolicy::ReliableWrite, &[FileRecord::new(guid(1), Type::Raw, &data)]),
        Err(FvError::OutOfResources)
    );
    let batch =
        [FileRecord::new(guid(1), Type::Raw, &data[..0x800]), FileRecord::new(guid(2), Type::Raw, &data[..0x800])];
    assert_eq!(volume.write_files(WritePolicy::ReliableWrite, &batch), Err(FvError::OutOfResources));

    let device = remount(volume).into_device();
    assert_eq!(device.writes(), 0);
    assert_eq!(device.image(), format_volume(fv::FFS2_GUID, ATTRIBUTES, &uniform(1, 0x1000), None).unwrap());
}
