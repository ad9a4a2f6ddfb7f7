use std::fmt;
use std::str::FromStr;

use crate::shared::constants::{DEFAULT_DETECT_SHADOWS, DEFAULT_HISTORY};
use crate::shared::error::PipelineError;

/// Background subtraction algorithm family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Mog,
    Mog2,
    Gmg,
    Knn,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [Algorithm::Mog, Algorithm::Mog2, Algorithm::Gmg, Algorithm::Knn];
    pub const NAMES: [&'static str; 4] = ["MOG", "MOG2", "GMG", "KNN"];

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Mog => "MOG",
            Algorithm::Mog2 => "MOG2",
            Algorithm::Gmg => "GMG",
            Algorithm::Knn => "KNN",
        }
    }

    /// Whether the variant can label shadows.
    pub fn supports_shadows(self) -> bool {
        matches!(self, Algorithm::Mog2 | Algorithm::Knn)
    }
}

impl FromStr for Algorithm {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| PipelineError::UnsupportedVariant {
                name: s.to_string(),
                supported: Self::NAMES.to_vec(),
            })
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validated, immutable model construction parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelConfig {
    algorithm: Algorithm,
    history: usize,
    detect_shadows: bool,
}

impl ModelConfig {
    /// `history` is a rolling window for MOG, MOG2 and KNN and the number of
    /// initialization frames for GMG. It must be positive.
    pub fn new(algorithm: Algorithm, history: i64, detect_shadows: bool) -> Result<Self, PipelineError> {
        if history <= 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "history must be positive, got {history}"
            )));
        }
        Ok(Self {
            algorithm,
            history: history as usize,
            detect_shadows,
        })
    }

    pub fn with_defaults(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            history: DEFAULT_HISTORY as usize,
            detect_shadows: DEFAULT_DETECT_SHADOWS,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn history(&self) -> usize {
        self.history
    }

    /// Requested shadow labelling. Variants without shadow support ignore it.
    pub fn detect_shadows(&self) -> bool {
        self.detect_shadows
    }

    /// Shadow labelling as the chosen variant will actually perform it.
    pub fn shadows_enabled(&self) -> bool {
        self.detect_shadows && self.algorithm.supports_shadows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::mog("MOG", Algorithm::Mog)]
    #[case::mog2("MOG2", Algorithm::Mog2)]
    #[case::gmg("GMG", Algorithm::Gmg)]
    #[case::knn("KNN", Algorithm::Knn)]
    fn test_parse_supported_names(#[case] name: &str, #[case] expected: Algorithm) {
        assert_eq!(name.parse::<Algorithm>().unwrap(), expected);
        assert_eq!(expected.to_string(), name);
    }

    #[rstest]
    #[case::unknown("INVALIDO")]
    #[case::lowercase("mog2")]
    #[case::empty("")]
    fn test_parse_unsupported_name_lists_all(#[case] name: &str) {
        let err = name.parse::<Algorithm>().unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedVariant { .. }));
        let msg = err.to_string();
        for supported in Algorithm::NAMES {
            assert!(msg.contains(supported), "{msg} should list {supported}");
        }
    }

    #[rstest]
    #[case::zero(0)]
    #[case::negative(-5)]
    fn test_non_positive_history_rejected(#[case] history: i64) {
        let result = ModelConfig::new(Algorithm::Mog2, history, true);
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_defaults() {
        let config = ModelConfig::with_defaults(Algorithm::Knn);
        assert_eq!(config.history(), 500);
        assert!(config.detect_shadows());
    }

    #[rstest]
    #[case::mog(Algorithm::Mog, false)]
    #[case::mog2(Algorithm::Mog2, true)]
    #[case::gmg(Algorithm::Gmg, false)]
    #[case::knn(Algorithm::Knn, true)]
    fn test_shadow_flag_only_honored_by_shadow_variants(
        #[case] algorithm: Algorithm,
        #[case] enabled: bool,
    ) {
        let config = ModelConfig::new(algorithm, 100, true).unwrap();
        assert!(config.detect_shadows());
        assert_eq!(config.shadows_enabled(), enabled);
    }
}
