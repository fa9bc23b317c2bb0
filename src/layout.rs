// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Describe the target kernel image to the invariant suite.
// Author: Lukas Bower

//! Kernel layout configuration.
//!
//! The built-in defaults describe the AdrOS x86 image. A partial TOML file
//! can override any field, e.g.
//!
//! ```toml
//! heap_low = 0xd0000000
//! heap_high = 0xd0800000
//! checkpoint = "sched_init"
//! ```

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Addresses, symbols, and constants of the inspected kernel image.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelLayout {
    /// Symbol reached once kernel bootstrap is complete.
    pub checkpoint: String,
    /// Symbol holding the allocator's first block pointer.
    pub heap_head: String,
    /// Inclusive lower bound of the heap region.
    pub heap_low: u64,
    /// Exclusive upper bound of the heap region.
    pub heap_high: u64,
    /// Sentinel word at the head block.
    pub heap_magic: u32,
    /// Symbol of the physical frame allocation bitmap.
    pub pmm_bitmap: String,
    /// Symbol of the frame count discovered at boot.
    pub pmm_max_frames: String,
    /// Symbol of the total memory size discovered at boot.
    pub pmm_total_memory: String,
    /// Virtual address expected to be mapped to the VGA text buffer.
    pub device_probe: u64,
}

impl Default for KernelLayout {
    fn default() -> Self {
        Self {
            checkpoint: "process_init".to_owned(),
            heap_head: "head".to_owned(),
            heap_low: 0xd000_0000,
            heap_high: 0xd400_0000,
            heap_magic: 0xcafe_babe,
            pmm_bitmap: "memory_bitmap".to_owned(),
            pmm_max_frames: "max_frames".to_owned(),
            pmm_total_memory: "total_memory".to_owned(),
            device_probe: 0xc00b_8000,
        }
    }
}

/// Failure loading or validating a layout file.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// File could not be read.
    #[error("failed to read layout {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying filesystem error.
        source: io::Error,
    },
    /// File is not valid layout TOML.
    #[error("invalid layout TOML: {0}")]
    Parse(#[from] toml::de::Error),
    /// Heap bounds do not form a half-open range.
    #[error("heap range {low:#x}..{high:#x} is empty")]
    EmptyHeapRange {
        /// Configured lower bound.
        low: u64,
        /// Configured upper bound.
        high: u64,
    },
}

impl KernelLayout {
    /// Reject layouts the suite cannot evaluate meaningfully.
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.heap_low >= self.heap_high {
            return Err(LayoutError::EmptyHeapRange {
                low: self.heap_low,
                high: self.heap_high,
            });
        }
        Ok(())
    }
}

/// Load a layout from a TOML file, applying built-in defaults for absent keys.
pub fn load_layout(path: &Path) -> Result<KernelLayout, LayoutError> {
    let text = std::fs::read_to_string(path).map_err(|source| LayoutError::Read {
        path: path.to_owned(),
        source,
    })?;
    let layout: KernelLayout = toml::from_str(&text)?;
    layout.validate()?;
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_describe_the_stock_image() {
        let layout = KernelLayout::default();
        assert_eq!(layout.checkpoint, "process_init");
        assert_eq!(layout.heap_low, 0xd000_0000);
        assert_eq!(layout.heap_high, 0xd400_0000);
        assert_eq!(layout.heap_magic, 0xcafe_babe);
        assert_eq!(layout.device_probe, 0xc00b_8000);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "heap_low = 0xd0000000").unwrap();
        writeln!(file, "heap_high = 0xd0800000").unwrap();
        writeln!(file, "checkpoint = \"sched_init\"").unwrap();
        let layout = load_layout(file.path()).unwrap();
        assert_eq!(layout.heap_high, 0xd080_0000);
        assert_eq!(layout.checkpoint, "sched_init");
        // Untouched fields keep their defaults.
        assert_eq!(layout.heap_head, "head");
        assert_eq!(layout.heap_magic, 0xcafe_babe);
    }

    #[test]
    fn empty_heap_range_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "heap_low = 0xd4000000").unwrap();
        writeln!(file, "heap_high = 0xd0000000").unwrap();
        let result = load_layout(file.path());
        assert!(matches!(result, Err(LayoutError::EmptyHeapRange { .. })));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "heap_lo = 0xd0000000").unwrap();
        let result = load_layout(file.path());
        assert!(matches!(result, Err(LayoutError::Parse(_))));
    }
}
