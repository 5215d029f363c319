//! UEFI Platform Initialization (PI) Specification definitions.
//!
//! Only the firmware storage portion (Volume 3) is modeled here.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

pub mod fw_fs;
