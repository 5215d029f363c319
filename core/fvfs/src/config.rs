//! Mount-time configuration for a firmware volume.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

/// Default upper bound on the number of files in one write request.
pub const DEFAULT_MAX_FILES_PER_WRITE: usize = 32;

/// How the scanner treats a file using the large header inside a volume formatted as FFS2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LargeFilePolicy {
    /// Log a warning, then index the file with its large header.
    #[default]
    Tolerate,
    /// Fail the mount with [`FvError::VolumeCorrupted`](crate::FvError::VolumeCorrupted).
    Reject,
}

/// Configuration applied when a volume is mounted.
///
/// ## Example
///
/// ```
/// use fvfs::config::{LargeFilePolicy, VolumeConfig};
///
/// let config = VolumeConfig::default().with_max_files_per_write(8).with_large_file_policy(LargeFilePolicy::Reject);
/// assert_eq!(config.max_files_per_write(), 8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeConfig {
    max_files_per_write: usize,
    large_file_policy: LargeFilePolicy,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self { max_files_per_write: DEFAULT_MAX_FILES_PER_WRITE, large_file_policy: LargeFilePolicy::default() }
    }
}

impl VolumeConfig {
    /// Sets the largest accepted batch size. Zero is raised to one.
    pub fn with_max_files_per_write(mut self, max: usize) -> Self {
        self.max_files_per_write = max.max(1);
        self
    }

    /// Sets the large-header policy for FFS2 volumes.
    pub fn with_large_file_policy(mut self, policy: LargeFilePolicy) -> Self {
        self.large_file_policy = policy;
        self
    }

    /// Largest accepted batch size.
    pub fn max_files_per_write(&self) -> usize {
        self.max_files_per_write
    }

    /// Large-header policy for FFS2 volumes.
    pub fn large_file_policy(&self) -> LargeFilePolicy {
        self.large_file_policy
    }
}
