//! Firmware Storage Definitions
//!
//! Based on the UEFI Platform Initialization (PI) Specification V1.8A Volume 3, Shared Architectural Elements.
//!
//! - [`ffs`]: Firmware File System files and sections.
//! - [`fv`]: Firmware Volume header, volume attributes and file attributes.
//! - [`fvb`]: Firmware Volume Block device attributes.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

pub mod ffs;
pub mod fv;
pub mod fvb;
