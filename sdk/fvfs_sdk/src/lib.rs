//! Shared definitions for the firmware volume crates.
//!
//! - [`error`]: the [`EfiError`](error::EfiError) status enum and its conversions to and from `efi::Status`.
//! - [`base`]: alignment helpers.
//! - [`pi`]: firmware storage definitions from the UEFI Platform Initialization (PI) Specification.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(not(test), no_std)]

pub mod base;
pub mod error;
pub mod pi;
