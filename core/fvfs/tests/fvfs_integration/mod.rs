//! Firmware Volume Integration Tests
//!
//! Mounts volume images on an in-memory flash device, runs operations through the public API, cuts power at
//! chosen writes, and remounts from what reached the flash.
//!
//! ## Logging
//!
//! The `env_logger` crate can be used to enable logging during tests. Set `RUST_LOG` to the desired level
//! before running them:
//!
//! ```sh
//! RUST_LOG=debug cargo test -p fvfs --test fvfs_integration
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent

mod common;
#[path = "../../src/test_support/flash.rs"]
mod flash;

mod crash_recovery;
mod layout;
mod round_trip;
