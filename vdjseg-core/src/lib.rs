//! vdjseg Core Library
//!
//! Cut-point search, decode caching and path interpretation for splitting a
//! rearranged query into V, D and J germline regions.

pub mod types;
pub mod error;
pub mod engine;
pub mod catalog;
pub mod slicer;
pub mod cache;
pub mod scorer;
pub mod path;
pub mod search;
pub mod config;

// Re-export commonly used types and functions
pub use types::{Algorithm, CutPointPair, Gene, PathLabel, Region};
pub use error::{SearchError, SearchResult};
pub use engine::{DecodeEngine, DecodeRequest, Decoded};
pub use catalog::{GermlineCatalog, InMemoryCatalog};
pub use slicer::{slice, RegionSubsequences};
pub use cache::{CacheStats, DecodeCache, DecodeResult};
pub use scorer::{ranked, GeneScore, RegionScorer, RegionScores};
pub use path::{erosion_length, insertion_length, PathStats, Side};
pub use search::{
    BestAssignment, CancellationToken, DegenerateRecord, JobHolder, KSetScore, RegionBest, RegionCall,
    RunReport,
};
pub use config::SearchConfig;

/// Version information for the vdjseg core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
