use thiserror::Error;

use super::analyzer::errors::AnalyzerError;

#[derive(Debug, Error)]
pub enum QueryPlannerError {
    #[error("AnalyzerError: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("Failed to read query file '{path}': {source}")]
    QueryRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse query: {0}")]
    QueryParse(#[from] serde_json::Error),
    #[error("Navigation expansion produced no result")]
    MissingExpansionResult,
}
