//! Performance-profile configuration handed to the matching backend.
//!
//! A profile picks a preset along the memory/latency trade-off. The secondary
//! knobs are forwarded as-is: the backend reads them, nothing here validates them.

use serde::{Deserialize, Serialize};

/// Named preset trading memory footprint against lookup latency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PerformanceProfile {
    #[default]
    Default,
    LowMemory,
    BalancedTemp,
    Balanced,
    HighPerformance,
    InMemory,
    SingleLoaded,
}

impl PerformanceProfile {
    pub const ALL: [PerformanceProfile; 7] = [
        Self::Default,
        Self::LowMemory,
        Self::BalancedTemp,
        Self::Balanced,
        Self::HighPerformance,
        Self::InMemory,
        Self::SingleLoaded,
    ];

    /// Map a raw ordinal onto a profile. Out-of-range values are `Default`.
    pub fn from_raw(raw: i32) -> Self {
        usize::try_from(raw)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .unwrap_or_default()
    }

    /// Parse a profile name, ignoring case, `-` and `_`. Unknown names are `Default`.
    pub fn parse_lossy(name: &str) -> Self {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_' && !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "lowmemory" => Self::LowMemory,
            "balancedtemp" => Self::BalancedTemp,
            "balanced" => Self::Balanced,
            "highperformance" => Self::HighPerformance,
            "inmemory" => Self::InMemory,
            "singleloaded" => Self::SingleLoaded,
            _ => Self::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "Default",
            Self::LowMemory => "LowMemory",
            Self::BalancedTemp => "BalancedTemp",
            Self::Balanced => "Balanced",
            Self::HighPerformance => "HighPerformance",
            Self::InMemory => "InMemory",
            Self::SingleLoaded => "SingleLoaded",
        }
    }
}

/// How the backend keeps dataset collections resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionMode {
    /// Whole dataset read into memory.
    InMemory,
    /// Hot entries cached, the rest read from file on demand.
    Cached,
    /// Every read goes to the file.
    Streamed,
}

/// Matching configuration built from a [`PerformanceProfile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpiConfig {
    profile: PerformanceProfile,
    collection_mode: CollectionMode,
    use_temp_file: bool,
    /// Expected number of concurrent lookups.
    pub concurrency: u16,
    pub trace_route: bool,
    pub use_upper_prefix_headers: bool,
    pub allow_unmatched: bool,
}

impl IpiConfig {
    pub fn new(profile: PerformanceProfile) -> Self {
        let (collection_mode, use_temp_file) = match profile {
            PerformanceProfile::InMemory | PerformanceProfile::HighPerformance => {
                (CollectionMode::InMemory, false)
            }
            PerformanceProfile::Default | PerformanceProfile::Balanced => {
                (CollectionMode::Cached, false)
            }
            PerformanceProfile::BalancedTemp => (CollectionMode::Cached, true),
            PerformanceProfile::LowMemory | PerformanceProfile::SingleLoaded => {
                (CollectionMode::Streamed, false)
            }
        };
        let concurrency = match profile {
            PerformanceProfile::SingleLoaded => 1,
            _ => default_concurrency(),
        };

        Self {
            profile,
            collection_mode,
            use_temp_file,
            concurrency,
            trace_route: false,
            use_upper_prefix_headers: false,
            allow_unmatched: false,
        }
    }

    /// Build from a raw profile ordinal; invalid input yields the `Default` preset.
    pub fn from_raw(raw: i32) -> Self {
        Self::new(PerformanceProfile::from_raw(raw))
    }

    pub fn profile(&self) -> PerformanceProfile {
        self.profile
    }

    pub fn collection_mode(&self) -> CollectionMode {
        self.collection_mode
    }

    pub fn use_temp_file(&self) -> bool {
        self.use_temp_file
    }

    pub fn with_concurrency(mut self, concurrency: u16) -> Self {
        self.concurrency = concurrency;
        self
    }
}

impl Default for IpiConfig {
    fn default() -> Self {
        Self::new(PerformanceProfile::Default)
    }
}

fn default_concurrency() -> u16 {
    u16::try_from(num_cpus::get()).unwrap_or(u16::MAX).max(1)
}
