use std::fmt::Display;

use thiserror::Error;

use crate::query_planner::analyzer::navigation_expansion::NavigationExpansionError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum Pass {
    NavigationExpansion,
}

impl Display for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pass::NavigationExpansion => write!(f, "NavigationExpansion"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalyzerError {
    #[error("{pass}: {source}")]
    NavigationExpansion {
        pass: Pass,
        #[source]
        source: NavigationExpansionError,
    },

    #[error("Invalid query plan: {0}")]
    InvalidPlan(String),
}

impl AnalyzerError {
    /// The navigation expansion failure behind this error, if any.
    pub fn navigation_error(&self) -> Option<&NavigationExpansionError> {
        match self {
            AnalyzerError::NavigationExpansion { source, .. } => Some(source),
            _ => None,
        }
    }
}
