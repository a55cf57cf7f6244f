use core::{fmt, str::FromStr};

use crate::{error::ConfigError, ledger::FRAMING_WORDS, tag::MAX_TAG_SIZE, ClientPtr};

pub const DEFAULT_WORD_SIZE: usize = 4;
pub const DEFAULT_INITIAL_HEAP_WORDS: usize = 1000;
pub const DEFAULT_MAX_HEAP_WORDS: usize = 100_000;
pub const DEFAULT_MAX_CLIENT_PTR: ClientPtr = 999;

/// The largest ceiling a heap may have: one region whose payload size is the
/// largest a boundary tag holds.
pub const MAX_HEAP_CEILING: usize = MAX_TAG_SIZE + FRAMING_WORDS;

/// How the ledger tracks regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListMode {
    /// Every region lives in one address ordered list. Placement walks all of
    /// them and free looks up a block by scanning for its owner.
    Implicit,
    /// Free regions are additionally threaded on their own list, and allocated
    /// blocks are indexed by their owner.
    Explicit,
}

impl FromStr for ListMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "I" => Ok(ListMode::Implicit),
            "E" => Ok(ListMode::Explicit),
            other => Err(ConfigError::InvalidListMode(other.to_string())),
        }
    }
}

impl fmt::Display for ListMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListMode::Implicit => f.write_str("implicit"),
            ListMode::Explicit => f.write_str("explicit"),
        }
    }
}

/// How a free region is chosen for an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FitPolicy {
    /// The first free region that can hold the block.
    First,
    /// The free region leaving the least space over, lowest address on ties.
    Best,
}

impl FromStr for FitPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "F" => Ok(FitPolicy::First),
            "B" => Ok(FitPolicy::Best),
            other => Err(ConfigError::InvalidFitPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for FitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitPolicy::First => f.write_str("first-fit"),
            FitPolicy::Best => f.write_str("best-fit"),
        }
    }
}

/// The parameters of one simulation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    pub list_mode: ListMode,
    pub fit_policy: FitPolicy,

    /// Bytes per word. Payloads are aligned to twice this.
    pub word_size: usize,

    /// The heap capacity at the start of the run. The heap is never trimmed
    /// below it.
    pub initial_heap_words: usize,

    /// The capacity the heap may never grow past.
    pub max_heap_words: usize,

    /// The largest legal pointer identifier. The smallest is 0.
    pub max_client_ptr: ClientPtr,
}

impl SimConfig {
    /// Creates a configuration with the default heap geometry.
    pub fn new(list_mode: ListMode, fit_policy: FitPolicy) -> Self {
        Self {
            list_mode,
            fit_policy,
            word_size: DEFAULT_WORD_SIZE,
            initial_heap_words: DEFAULT_INITIAL_HEAP_WORDS,
            max_heap_words: DEFAULT_MAX_HEAP_WORDS,
            max_client_ptr: DEFAULT_MAX_CLIENT_PTR,
        }
    }

    pub fn with_word_size(mut self, word_size: usize) -> Self {
        self.word_size = word_size;
        self
    }

    pub fn with_heap_bounds(mut self, initial_heap_words: usize, max_heap_words: usize) -> Self {
        self.initial_heap_words = initial_heap_words;
        self.max_heap_words = max_heap_words;
        self
    }

    /// Checks that the configuration describes a usable heap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.word_size.is_power_of_two() {
            return Err(ConfigError::InvalidWordSize(self.word_size));
        }
        if self.initial_heap_words < crate::heap::MIN_HEAP_WORDS
            || self.initial_heap_words > self.max_heap_words
        {
            return Err(ConfigError::InvalidHeapBounds {
                initial: self.initial_heap_words,
                ceiling: self.max_heap_words,
            });
        }
        if self.max_heap_words > MAX_HEAP_CEILING {
            return Err(ConfigError::CeilingTooLarge {
                ceiling: self.max_heap_words,
                max: MAX_HEAP_CEILING,
            });
        }
        Ok(())
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::new(ListMode::Implicit, FitPolicy::First)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cli_letters() {
        assert_eq!("I".parse::<ListMode>(), Ok(ListMode::Implicit));
        assert_eq!("E".parse::<ListMode>(), Ok(ListMode::Explicit));
        assert_eq!("F".parse::<FitPolicy>(), Ok(FitPolicy::First));
        assert_eq!("B".parse::<FitPolicy>(), Ok(FitPolicy::Best));
    }

    #[test]
    fn rejects_unknown_letters() {
        assert_eq!(
            "i".parse::<ListMode>(),
            Err(ConfigError::InvalidListMode("i".to_string()))
        );
        assert_eq!(
            "W".parse::<FitPolicy>(),
            Err(ConfigError::InvalidFitPolicy("W".to_string()))
        );
    }

    #[test]
    fn default_geometry_is_valid() {
        let config = SimConfig::new(ListMode::Explicit, FitPolicy::Best);
        assert_eq!(config.word_size, 4);
        assert_eq!(config.initial_heap_words, 1000);
        assert_eq!(config.max_heap_words, 100_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_geometry() {
        let config = SimConfig::default().with_word_size(6);
        assert_eq!(config.validate(), Err(ConfigError::InvalidWordSize(6)));

        let config = SimConfig::default().with_word_size(0);
        assert_eq!(config.validate(), Err(ConfigError::InvalidWordSize(0)));

        let config = SimConfig::default().with_heap_bounds(1, 100);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidHeapBounds { .. })
        ));

        let config = SimConfig::default().with_heap_bounds(200, 100);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidHeapBounds { .. })
        ));
    }

    #[test]
    fn validate_rejects_a_ceiling_past_the_tag_size() {
        let config = SimConfig::default().with_heap_bounds(1000, MAX_HEAP_CEILING);
        assert_eq!(config.validate(), Ok(()));

        let config = SimConfig::default().with_heap_bounds(1000, MAX_HEAP_CEILING + 1);
        assert_eq!(
            config.validate(),
            Err(ConfigError::CeilingTooLarge {
                ceiling: MAX_HEAP_CEILING + 1,
                max: MAX_HEAP_CEILING,
            })
        );
    }
}
