//! Power loss at every device write, followed by a remount.
//!
//! A write that loses power leaves the volume holding either the content from before the request or the
//! content after it. Requests are then retried on the remounted volume until they complete.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent

use fvfs::{
    header::{created_state_byte, FileHeader},
    volume_header::format_volume,
    FileRecord, FirmwareVolume, FvError,
};
use fvfs_sdk::pi::fw_fs::{
    ffs::file::{State, Type},
    fv::{self, WritePolicy},
};

use crate::fvfs_integration::common::{
    guid, header_offset, mount, names, remount, uniform, FlashDevice, ATTRIBUTES, ZERO_ERASE_ATTRIBUTES,
};

const FILE_IDS: u32 = 4;

type Contents = Vec<Option<Vec<u8>>>;

/// One step of a workload: each entry names a file and its new data, `None` deleting it.
type Step = Vec<(u32, Option<Vec<u8>>)>;

fn contents(volume: &FirmwareVolume<FlashDevice>) -> Contents {
    (1..=FILE_IDS)
        .map(|id| match volume.read_file(&guid(id)) {
            Ok((_, data)) => Some(data),
            Err(FvError::NotFound) => None,
            Err(err) => panic!("reading file {id} failed: {err:?}"),
        })
        .collect()
}

fn applied(before: &Contents, step: &Step, include_deletes: bool) -> Contents {
    let mut after = before.clone();
    for (id, data) in step {
        if data.is_some() || include_deletes {
            after[*id as usize - 1] = data.clone();
        }
    }
    after
}

fn records(step: &Step) -> Vec<FileRecord<'_>> {
    step.iter()
        .map(|(id, data)| match data {
            Some(data) => FileRecord::new(guid(*id), Type::Raw, data),
            None => FileRecord::delete(guid(*id)),
        })
        .collect()
}

/// Runs `step` with power lost after 0, 1, 2... writes, remounting after every attempt, until it completes.
///
/// Deletes in a batch run after the batch itself, so a cut between the two may also leave the writes applied
/// without the deletes. Returns the remounted volume and the number of attempts that failed.
fn run_with_power_cuts(
    mut volume: FirmwareVolume<FlashDevice>,
    step: &Step,
) -> (FirmwareVolume<FlashDevice>, usize) {
    let before = contents(&volume);
    let writes_only = applied(&before, step, false);
    let after = applied(&before, step, true);

    for cut in 0.. {
        let mut device = volume.into_device();
        device.cut_power_after(cut, 0);
        let mut attempt = mount(device).unwrap();
        let result = attempt.write_files(WritePolicy::ReliableWrite, &records(step));

        volume = remount(attempt);
        let now = contents(&volume);
        assert!(
            now == before || now == writes_only || now == after,
            "power cut after {cut} writes left {now:?}, expected {before:?} or {after:?}"
        );
        assert_eq!(
            names(&volume).len(),
            now.iter().filter(|data| data.is_some()).count(),
            "power cut after {cut} writes left duplicate names"
        );
        match result {
            Ok(()) => {
                assert_eq!(now, after);
                return (volume, cut);
            }
            Err(err) => assert_eq!(err, FvError::Device(fvfs_sdk::error::EfiError::DeviceError)),
        }
    }
    unreachable!()
}

fn workload() -> Vec<Step> {
    vec![
        vec![(1, Some(vec![0x11; 0x40]))],
        vec![(2, Some(vec![0x22; 0x123]))],
        vec![(1, Some(vec![0x13; 0x80]))],
        vec![(2, Some(vec![0x23; 0x30])), (3, Some(vec![0x33; 0x200])), (4, Some(vec![0x44; 9]))],
        vec![(1, None), (3, Some(vec![0x34; 0x10]))],
        vec![(4, None)],
        vec![(1, Some(vec![0x15; 0x21])), (4, Some(vec![0x45; 0x21]))],
    ]
}

#[test]
fn every_power_cut_recovers_to_old_or_new_content() {
    for attributes in [ATTRIBUTES, ZERO_ERASE_ATTRIBUTES] {
        let device = FlashDevice::formatted(fv::FFS2_GUID, attributes, &uniform(16, 0x1000), None);
        let mut volume = mount(device).unwrap();
        for step in workload() {
            let (remounted, failed_attempts) = run_with_power_cuts(volume, &step);
            assert!(failed_attempts > 0);
            volume = remounted;
        }
        assert_eq!(
            contents(&volume),
            [Some(vec![0x15; 0x21]), Some(vec![0x23; 0x30]), Some(vec![0x34; 0x10]), Some(vec![0x45; 0x21])]
        );
        assert_eq!(names(&volume), [guid(2), guid(3), guid(1), guid(4)]);
    }
}

#[test]
fn an_update_cut_after_marking_keeps_the_old_file() {
    let device = FlashDevice::formatted(fv::FFS2_GUID, ATTRIBUTES, &uniform(2, 0x1000), None);
    let mut volume = mount(device).unwrap();
    volume.write_files(WritePolicy::ReliableWrite, &[FileRecord::new(guid(1), Type::Raw, &[1; 4])]).unwrap();

    // Only the Marked-For-Update state reaches the device.
    let mut device = volume.into_device();
    let writes = device.writes();
    device.cut_power_after(1, 0);
    let mut volume = mount(device).unwrap();
    assert!(volume.write_files(WritePolicy::ReliableWrite, &[FileRecord::new(guid(1), Type::Raw, &[2; 4])]).is_err());

    let mut volume = remount(volume);
    assert_eq!(names(&volume), [guid(1)]);
    assert_eq!(volume.read_file(&guid(1)).unwrap().1, [1; 4]);

    volume.write_files(WritePolicy::ReliableWrite, &[FileRecord::new(guid(1), Type::Raw, &[3; 4])]).unwrap();
    let volume = remount(volume);
    assert_eq!(names(&volume), [guid(1)]);
    assert_eq!(volume.read_file(&guid(1)).unwrap().1, [3; 4]);
    // Marking is skipped the second time round: five writes create the copy and one deletes the old one.
    assert_eq!(volume.into_device().writes(), writes + 1 + 6);
}

#[test]
fn interrupted_headers_and_data_are_skipped() {
    for (attributes, erase) in [(ATTRIBUTES, 0xFFu8), (ZERO_ERASE_ATTRIBUTES, 0x00)] {
        let block_map = uniform(2, 0x1000);
        let mut image = format_volume(fv::FFS2_GUID, attributes, &block_map, None).unwrap();

        // A header that never became valid.
        let mut header = FileHeader::new(guid(1), Type::Raw, 0, FileHeader::file_size_for(0x40));
        header.seal(&[0x11; 0x40]);
        header.state = created_state_byte(erase, State::HeaderConstruction);
        header.write_to(&mut image[0x48..]).unwrap();

        // A valid header whose data was cut short.
        let mut header = FileHeader::new(guid(2), Type::Raw, 0, FileHeader::file_size_for(0x40));
        header.seal(&[0x22; 0x40]);
        header.state = created_state_byte(erase, State::HeaderValid);
        header.write_to(&mut image[0xA0..]).unwrap();
        image[0xB8..0xC8].fill(0x22);

        let mut volume = mount(FlashDevice::new(image, &block_map, attributes)).unwrap();
        assert!(names(&volume).is_empty());
        assert_eq!(volume.read_file(&guid(1)), Err(FvError::NotFound));
        assert_eq!(volume.read_file(&guid(2)), Err(FvError::NotFound));

        volume.write_files(WritePolicy::ReliableWrite, &[FileRecord::new(guid(2), Type::Raw, &[0x23; 0x40])]).unwrap();
        let volume = remount(volume);
        assert_eq!(names(&volume), [guid(2)]);
        assert_eq!(volume.read_file(&guid(2)).unwrap().1, [0x23; 0x40]);
    }
}

#[test]
fn a_torn_large_header_is_skipped_whole() {
    for attributes in [ATTRIBUTES, ZERO_ERASE_ATTRIBUTES] {
        let mut device = FlashDevice::formatted(fv::FFS3_GUID, attributes, &uniform(0x120, 0x10000), None);
        // Header-Construction lands, then all but the last four bytes of the 32 byte header.
        device.cut_power_after(1, 28);
        let mut volume = mount(device).unwrap();
        let data = vec![0x6B; 0x100_0000];
        let result = volume.write_files(WritePolicy::ReliableWrite, &[FileRecord::new(guid(1), Type::Raw, &data)]);
        assert_eq!(result, Err(FvError::Device(fvfs_sdk::error::EfiError::DeviceError)));

        let mut volume = remount(volume);
        assert!(names(&volume).is_empty());
        volume.write_files(WritePolicy::ReliableWrite, &[FileRecord::new(guid(2), Type::Raw, &[0x22; 0x10])]).unwrap();

        let volume = remount(volume);
        assert_eq!(names(&volume), [guid(2)]);
        assert_eq!(volume.read_file(&guid(2)).unwrap().1, [0x22; 0x10]);
        assert_eq!(header_offset(volume.into_device().image(), &guid(2)), 0x48 + 32);
    }
}
