//! # Memory Configuration
//!
//! Arena and pool sizing, loaded once at engine startup from TOML.
//!
//! ```toml
//! arena_size = 67108864
//! scrub = false
//!
//! [fsa]
//! align = 16
//! #         2    4    8   16   32   64  128  256  512 1024 2048 4096
//! counts = [0, 256, 256, 512, 512, 256, 128, 64, 32, 16, 8, 8]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::block::HEADER_SIZE;
use crate::error::{MemoryError, MemoryResult};
use crate::fsa::{FsaLayout, FSA_CLASS_COUNT};

/// Fixed-size sub-allocator configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsaConfig {
    /// Desired sub-block count per class, smallest (2 bytes) first.
    /// Rounded down to a multiple of 8 by [`FsaConfig::normalized`].
    pub counts: [u32; FSA_CLASS_COUNT],
    /// Alignment of every class's storage, relative to the arena base.
    pub align: usize,
}

impl FsaConfig {
    /// Default storage alignment.
    pub const DEFAULT_ALIGN: usize = 16;

    /// A configuration with every class disabled.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { counts: [0; FSA_CLASS_COUNT], align: Self::DEFAULT_ALIGN }
    }

    /// Returns whether any class is enabled (after normalization).
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.counts.iter().any(|&count| count >= 8)
    }

    /// Returns a copy with every count rounded down to a multiple of 8.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut counts = self.counts;
        for count in &mut counts {
            *count -= *count % 8;
        }
        Self { counts, align: self.align.max(1) }
    }

    /// Exact size in bytes of the region the sub-allocator needs.
    ///
    /// Computed from the table alone, before any memory exists.
    #[must_use]
    pub fn data_size(&self) -> usize {
        FsaLayout::compute(&self.normalized()).total
    }
}

impl Default for FsaConfig {
    fn default() -> Self {
        Self {
            counts: [0, 256, 256, 512, 512, 256, 128, 64, 32, 16, 8, 8],
            align: Self::DEFAULT_ALIGN,
        }
    }
}

/// Engine memory configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Total arena size in bytes.
    pub arena_size: usize,
    /// Fill padding and released memory with recognizable patterns.
    pub scrub: bool,
    /// Fixed-size sub-allocator table.
    pub fsa: FsaConfig,
}

impl MemoryConfig {
    /// Default arena size: 64MB.
    pub const DEFAULT_ARENA_SIZE: usize = 64 * 1024 * 1024;

    /// Creates a config of `arena_size` bytes with default pools.
    #[must_use]
    pub fn new(arena_size: usize) -> Self {
        Self { arena_size, ..Self::default() }
    }

    /// Replaces the pool table.
    #[must_use]
    pub fn with_fsa(mut self, fsa: FsaConfig) -> Self {
        self.fsa = fsa;
        self
    }

    /// Enables or disables scrubbing.
    #[must_use]
    pub const fn with_scrub(mut self, scrub: bool) -> Self {
        self.scrub = scrub;
        self
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` on syntax errors or failed validation.
    pub fn from_toml_str(text: &str) -> MemoryResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| MemoryError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> MemoryResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| MemoryError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks that the pools fit in the arena and the alignment is sane.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the problem.
    pub fn validate(&self) -> MemoryResult<()> {
        if !self.fsa.align.max(1).is_power_of_two() {
            return Err(MemoryError::InvalidConfig(format!(
                "fsa.align must be a power of two, got {}",
                self.fsa.align
            )));
        }
        let needed = if self.fsa.is_enabled() {
            2 * HEADER_SIZE + self.fsa.data_size() + self.fsa.align
        } else {
            HEADER_SIZE + 1
        };
        if self.arena_size < needed {
            return Err(MemoryError::InvalidConfig(format!(
                "arena_size {} is smaller than the {} bytes the pools need",
                self.arena_size, needed
            )));
        }
        Ok(())
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            arena_size: Self::DEFAULT_ARENA_SIZE,
            scrub: cfg!(debug_assertions),
            fsa: FsaConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_round_down_to_eight() {
        let mut fsa = FsaConfig::disabled();
        fsa.counts[0] = 13;
        fsa.counts[3] = 7;
        let normalized = fsa.normalized();
        assert_eq!(normalized.counts[0], 8);
        assert_eq!(normalized.counts[3], 0);
    }

    #[test]
    fn test_disabled_has_no_data() {
        assert!(!FsaConfig::disabled().is_enabled());
        assert_eq!(FsaConfig::disabled().data_size(), 0);
    }

    #[test]
    fn test_parse_toml() {
        let config = MemoryConfig::from_toml_str(
            r#"
            arena_size = 1048576
            scrub = true

            [fsa]
            align = 8
            counts = [8, 16, 0, 0, 0, 0, 0, 0, 0, 0, 0, 8]
            "#,
        )
        .unwrap();
        assert_eq!(config.arena_size, 1 << 20);
        assert!(config.scrub);
        assert_eq!(config.fsa.align, 8);
        assert_eq!(config.fsa.counts[11], 8);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = MemoryConfig::from_toml_str("arena_size = 8388608").unwrap();
        assert_eq!(config.fsa, FsaConfig::default());
    }

    #[test]
    fn test_rejects_tiny_arena() {
        let result = MemoryConfig::from_toml_str("arena_size = 64");
        assert!(matches!(result, Err(MemoryError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_alignment() {
        let config = MemoryConfig::new(1 << 20).with_fsa(FsaConfig { align: 24, ..FsaConfig::default() });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sample_config_parses() {
        let config = MemoryConfig::from_toml_str(include_str!("../../../assets/config/memory.toml")).unwrap();
        assert!(config.fsa.is_enabled());
    }
}
