//! Firmware File System (FFS) Definitions
//!
//! Based on the values defined in the UEFI Platform Initialization (PI) Specification V1.8A Section 3.2.3
//! Firmware File System Format.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

pub mod attributes;
pub mod file;
pub mod section;

/// Every file in a firmware file system begins on an 8-byte boundary.
pub const FILE_ALIGNMENT: usize = 8;
