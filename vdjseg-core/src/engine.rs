//! Decode engine capability
//!
//! The HMM itself (model files, trellis fill, traceback) lives outside this
//! crate. The search only needs something that turns a gene model and a query
//! subsequence into a best path and a score, so that is all this trait asks for.

use crate::types::{Algorithm, Gene, PathLabel};
use std::path::Path;

/// Everything an engine needs to decode one subsequence against one gene.
#[derive(Debug, Clone, Copy)]
pub struct DecodeRequest<'a> {
    /// Directory holding the per-gene model files
    pub model_dir: &'a Path,
    pub algorithm: Algorithm,
    pub gene: &'a Gene,
    pub subsequence: &'a [u8],
}

/// Output of a single decode.
#[derive(Debug, Clone)]
pub struct Decoded<T> {
    /// Engine-specific trellis, kept alive by the cache for later inspection
    pub trellis: T,
    /// Best-path labels, one per subsequence position
    pub path: Vec<PathLabel>,
    /// Log-space score
    pub score: f64,
}

/// Trait for HMM decode engines
///
/// Implementations must be deterministic: identical requests must produce
/// identical paths and scores, otherwise cached results would diverge from
/// fresh ones.
pub trait DecodeEngine: Send + Sync {
    /// Opaque trellis handle returned alongside each path
    type Trellis: Send + Sync + 'static;

    /// Decode `request.subsequence` against `request.gene`
    fn decode(&self, request: &DecodeRequest<'_>) -> anyhow::Result<Decoded<Self::Trellis>>;

    /// Get the name/identifier of this engine
    fn name(&self) -> &'static str;
}

impl<E: DecodeEngine + ?Sized> DecodeEngine for &E {
    type Trellis = E::Trellis;

    fn decode(&self, request: &DecodeRequest<'_>) -> anyhow::Result<Decoded<Self::Trellis>> {
        (**self).decode(request)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
