use std::fmt;

use serde::{Serialize, Serializer};

/// Fused classification of a single track.
///
/// Fusion is a sticky OR: once any crop is classified positive the track stays
/// positive for the rest of its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FusionState {
    /// No crop of this track has been classified yet
    #[default]
    Unclassified,
    /// Every classified crop so far was negative
    Negative,
    /// At least one classified crop was positive
    Positive,
}

impl FusionState {
    /// Fold one classification outcome into the state.
    #[inline]
    pub fn fold(self, positive: bool) -> Self {
        match (self, positive) {
            (_, true) | (FusionState::Positive, _) => FusionState::Positive,
            _ => FusionState::Negative,
        }
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self == FusionState::Positive
    }
}

/// Terminal category of a physical object.
///
/// Target-class objects are `Fresh` unless fusion turned positive, in which
/// case they are `Rotten`. Everything else is `NonTarget`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Fresh,
    Rotten,
    NonTarget,
}

impl Category {
    /// Apply the verdict rule to a track's detected class and fused state.
    pub fn resolve(detected_class: &str, target_class: &str, fusion: FusionState) -> Self {
        if detected_class != target_class {
            Category::NonTarget
        } else if fusion.is_positive() {
            Category::Rotten
        } else {
            Category::Fresh
        }
    }

    /// Tally bucket name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Fresh => "fresh",
            Category::Rotten => "rotten",
            Category::NonTarget => "non_target",
        }
    }

    /// Single-byte token sent to the actuator for a finalized object.
    ///
    /// Non-target objects are rejected the same way rotten ones are.
    pub fn token(&self) -> u8 {
        match self {
            Category::Fresh => b'F',
            Category::Rotten | Category::NonTarget => b'R',
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_is_sticky() {
        let state = FusionState::default()
            .fold(false)
            .fold(true)
            .fold(false)
            .fold(false);
        assert_eq!(state, FusionState::Positive);
    }

    #[test]
    fn test_fold_negative_only() {
        let state = FusionState::Unclassified.fold(false).fold(false);
        assert_eq!(state, FusionState::Negative);
        assert!(!state.is_positive());
    }

    #[test]
    fn test_resolve() {
        assert_eq!(
            Category::resolve("orange", "orange", FusionState::Unclassified),
            Category::Fresh
        );
        assert_eq!(
            Category::resolve("orange", "orange", FusionState::Negative),
            Category::Fresh
        );
        assert_eq!(
            Category::resolve("orange", "orange", FusionState::Positive),
            Category::Rotten
        );
        assert_eq!(
            Category::resolve("apple", "orange", FusionState::Positive),
            Category::NonTarget
        );
    }

    #[test]
    fn test_tokens() {
        assert_eq!(Category::Fresh.token(), b'F');
        assert_eq!(Category::Rotten.token(), b'R');
        assert_eq!(Category::NonTarget.token(), b'R');
        assert_eq!(Category::NonTarget.to_string(), "non_target");
    }
}
