//! Files written through the public API read back unchanged, before and after a remount.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent

use fvfs::{FileRecord, FvError, LeafSectionExtractor};
use fvfs_sdk::pi::fw_fs::{
    ffs::{attributes::raw as attribute, file::Type, section::raw_type},
    fv::{self, file::raw::attribute as fv_attribute, WritePolicy},
};

use crate::fvfs_integration::common::{
    guid, header_offset, mount, names, remount, uniform, FlashDevice, ATTRIBUTES, ZERO_ERASE_ATTRIBUTES,
};

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

#[test]
fn files_survive_a_remount_in_both_polarities() {
    for attributes in [ATTRIBUTES, ZERO_ERASE_ATTRIBUTES] {
        let device = FlashDevice::formatted(fv::FFS2_GUID, attributes, &uniform(4, 0x1000), None);
        let mut volume = mount(device).unwrap();

        let files = [
            (guid(1), Type::Driver, pattern(1, 1)),
            (guid(2), Type::Application, pattern(0x333, 2)),
            (guid(3), Type::FreeForm, pattern(0x1000, 3)),
            (guid(4), Type::Oem(0xC1), pattern(17, 4)),
        ];
        for (name, file_type, data) in &files {
            volume.write_files(WritePolicy::ReliableWrite, &[FileRecord::new(*name, *file_type, data)]).unwrap();
        }

        let volume = remount(volume);
        assert_eq!(names(&volume), files.iter().map(|(name, _, _)| *name).collect::<Vec<_>>());
        for (name, file_type, data) in &files {
            let (info, bytes) = volume.read_file(name).unwrap();
            assert_eq!(info.file_type, *file_type);
            assert_eq!(&bytes, data);
        }
        assert_eq!(volume.volume_info().erase_byte, if attributes == ATTRIBUTES { 0xFF } else { 0x00 });
    }
}

#[test]
fn large_files_need_an_ffs3_volume() {
    let data = pattern(0x0100_0000, 9);

    let device = FlashDevice::formatted(fv::FFS2_GUID, ATTRIBUTES, &uniform(4, 0x1000), None);
    let mut volume = mount(device).unwrap();
    assert_eq!(
        volume.write_files(WritePolicy::ReliableWrite, &[FileRecord::new(guid(1), Type::Raw, &data)]),
        Err(FvError::InvalidParameter)
    );

    let device = FlashDevice::formatted(fv::FFS3_GUID, ATTRIBUTES, &uniform(0x120, 0x10000), None);
    let mut volume = mount(device).unwrap();
    volume.write_files(WritePolicy::ReliableWrite, &[FileRecord::new(guid(1), Type::Raw, &data)]).unwrap();
    volume.write_files(WritePolicy::ReliableWrite, &[FileRecord::new(guid(2), Type::Raw, &[1, 2, 3])]).unwrap();
    assert_eq!(volume.file_info(&guid(1)).unwrap().size, data.len());

    let volume = remount(volume);
    assert_eq!(names(&volume), [guid(1), guid(2)]);
    assert_eq!(volume.read_file(&guid(1)).unwrap().1, data);
    assert_eq!(volume.read_file(&guid(2)).unwrap().1, [1, 2, 3]);

    let device = volume.into_device();
    let offset = header_offset(device.image(), &guid(1));
    let header = &device.image()[offset..offset + 32];
    assert_eq!(header[20..23], [0, 0, 0]);
    assert_ne!(header[19] & attribute::LARGE_FILE, 0);
    assert_eq!(u64::from_le_bytes(header[24..32].try_into().unwrap()), data.len() as u64 + 32);
}

#[test]
fn named_volumes_report_their_name() {
    let name = guid(0xF00D);
    let device = FlashDevice::formatted(fv::FFS2_GUID, ATTRIBUTES, &uniform(2, 0x1000), Some(name));
    let mut volume = mount(device).unwrap();
    assert_eq!(volume.volume_info().fv_name, Some(name));
    assert!(names(&volume).is_empty());

    volume.write_files(WritePolicy::ReliableWrite, &[FileRecord::new(guid(1), Type::Raw, &[5; 5])]).unwrap();
    let volume = remount(volume);
    assert_eq!(volume.volume_info().fv_name, Some(name));
    assert_eq!(names(&volume), [guid(1)]);
}

#[test]
fn attributes_are_reported_back() {
    let device = FlashDevice::formatted(fv::FFS2_GUID, ATTRIBUTES, &uniform(2, 0x1000), None);
    let mut volume = mount(device).unwrap();
    let record = FileRecord::new(guid(1), Type::Peim, &[1; 0x20]).with_attributes(fv_attribute::FIXED | 4);
    volume.write_files(WritePolicy::ReliableWrite, &[record.with_checksum()]).unwrap();

    let volume = remount(volume);
    let info = volume.file_info(&guid(1)).unwrap();
    assert_eq!(info.file_type, Type::Peim);
    assert_eq!(info.attributes & fv_attribute::ALIGNMENT, 4);
    assert_ne!(info.attributes & fv_attribute::FIXED, 0);
    assert_ne!(info.attributes & fv_attribute::MEMORY_MAPPED, 0);
}

#[test]
fn sections_are_found_inside_files() {
    let mut data = vec![0x0A, 0x00, 0x00, raw_type::USER_INTERFACE, b'f', 0, b'v', 0, 0, 0, 0, 0];
    data.extend_from_slice(&[0x08, 0x00, 0x00, raw_type::RAW, 0xDE, 0xAD, 0xBE, 0xEF]);

    let device = FlashDevice::formatted(fv::FFS2_GUID, ATTRIBUTES, &uniform(2, 0x1000), None);
    let mut volume = mount(device).unwrap();
    volume.write_files(WritePolicy::ReliableWrite, &[FileRecord::new(guid(1), Type::FreeForm, &data)]).unwrap();

    let volume = remount(volume);
    assert_eq!(
        volume.read_section(&guid(1), raw_type::RAW, 0, &LeafSectionExtractor).unwrap(),
        [0xDE, 0xAD, 0xBE, 0xEF]
    );
    assert_eq!(
        volume.read_section(&guid(1), raw_type::USER_INTERFACE, 0, &LeafSectionExtractor).unwrap(),
        [b'f', 0, b'v', 0, 0, 0]
    );
    assert_eq!(volume.read_section(&guid(1), raw_type::PE32, 0, &LeafSectionExtractor), Err(FvError::NotFound));
}
