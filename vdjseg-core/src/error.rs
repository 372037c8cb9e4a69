//! Error taxonomy for the boundary search

use crate::types::{CutPointPair, Region};
use thiserror::Error;

/// Errors raised while slicing, decoding, or searching
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid cut points {cut_points} for query of length {query_len}")]
    InvalidCutPoints {
        cut_points: CutPointPair,
        query_len: usize,
    },

    #[error("No germline genes available for region {region}")]
    EmptyGeneSet { region: Region },

    #[error("Degenerate alignment for {gene}: {message}")]
    DegenerateAlignment { gene: String, message: String },

    #[error("Decode cache invariant violated for {gene}: {message}")]
    CacheRace { gene: String, message: String },

    #[error("Invalid sweep bounds: {message}")]
    InvalidSweep { message: String },

    #[error("Decode engine error for {gene}: {message}")]
    Engine { gene: String, message: String },

    #[error("No valid candidate cut points")]
    NoValidCandidate,

    #[error("Unknown {region} gene: {gene}")]
    UnknownGene { region: Region, gene: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl SearchError {
    pub fn degenerate<S: Into<String>>(gene: &str, message: S) -> Self {
        Self::DegenerateAlignment {
            gene: gene.to_string(),
            message: message.into(),
        }
    }

    pub fn cache_race<S: Into<String>>(gene: &str, message: S) -> Self {
        Self::CacheRace {
            gene: gene.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_sweep<S: Into<String>>(message: S) -> Self {
        Self::InvalidSweep {
            message: message.into(),
        }
    }

    pub fn engine<S: Into<String>>(gene: &str, message: S) -> Self {
        Self::Engine {
            gene: gene.to_string(),
            message: message.into(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error only invalidates a single gene or cut-point pair.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SearchError::InvalidCutPoints { .. }
                | SearchError::DegenerateAlignment { .. }
                | SearchError::Engine { .. }
        )
    }
}

pub type SearchResult<T> = Result<T, SearchError>;
