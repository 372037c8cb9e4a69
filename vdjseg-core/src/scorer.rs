//! Per-region scoring of one subsequence against every candidate gene

use crate::cache::{DecodeCache, DecodeResult};
use crate::catalog::GermlineCatalog;
use crate::engine::DecodeEngine;
use crate::error::{SearchError, SearchResult};
use crate::path;
use crate::types::{Gene, PathLabel, Region};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::sync::Arc;

/// Decode outcome for one gene on one region subsequence
#[derive(Debug)]
pub struct GeneScore<T> {
    pub gene: Arc<Gene>,
    pub decode: Arc<DecodeResult<T>>,
}

impl<T> Clone for GeneScore<T> {
    fn clone(&self) -> Self {
        Self {
            gene: Arc::clone(&self.gene),
            decode: Arc::clone(&self.decode),
        }
    }
}

impl<T> GeneScore<T> {
    pub fn score(&self) -> f64 {
        self.decode.score
    }

    pub fn path(&self) -> &[PathLabel] {
        &self.decode.path
    }

    /// Whether this decode can take part in ranking
    pub fn check(&self, subsequence_len: usize) -> SearchResult<()> {
        path::check_alignment(self.path(), self.score(), &self.gene, subsequence_len)
    }
}

/// Decodes of one region subsequence, split by outcome
#[derive(Debug)]
pub struct RegionScores<T> {
    /// Successful decodes in catalog order, degenerate ones included
    pub scored: Vec<GeneScore<T>>,
    /// Genes the engine failed to decode
    pub failed: Vec<(Arc<Gene>, SearchError)>,
}

/// Sort gene scores best-first. Ties keep catalog order.
pub fn ranked<T>(scores: &[GeneScore<T>]) -> Vec<GeneScore<T>> {
    let mut ranked = scores.to_vec();
    ranked.sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap_or(Ordering::Equal));
    ranked
}

type GeneOutcome<T> = Result<GeneScore<T>, (Arc<Gene>, SearchError)>;

/// Scores region subsequences through the decode cache
pub struct RegionScorer<'a, E: DecodeEngine, C: GermlineCatalog> {
    catalog: &'a C,
    cache: &'a DecodeCache<E>,
    parallel: bool,
}

impl<'a, E: DecodeEngine, C: GermlineCatalog> RegionScorer<'a, E, C> {
    pub fn new(catalog: &'a C, cache: &'a DecodeCache<E>) -> Self {
        Self {
            catalog,
            cache,
            parallel: false,
        }
    }

    /// Decode genes concurrently on the current rayon pool
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Decode `subsequence` against the first `n_max_versions` genes of
    /// `region` (0 = all of them). Results come back in catalog order and
    /// include degenerate decodes; choosing among them is up to the caller.
    ///
    /// An engine failure only removes that gene. Cache invariant violations
    /// and an empty region are errors.
    pub fn score_region(
        &self,
        region: Region,
        subsequence: &[u8],
        n_max_versions: usize,
    ) -> SearchResult<RegionScores<E::Trellis>> {
        let genes = self.catalog.genes_capped(region, n_max_versions);
        if genes.is_empty() {
            return Err(SearchError::EmptyGeneSet { region });
        }

        let score_gene = |gene: &Arc<Gene>| -> SearchResult<GeneOutcome<E::Trellis>> {
            match self.cache.get_or_compute(gene, subsequence) {
                Ok(decode) => Ok(Ok(GeneScore {
                    gene: Arc::clone(gene),
                    decode,
                })),
                Err(e) if e.is_recoverable() => Ok(Err((Arc::clone(gene), e))),
                Err(e) => Err(e),
            }
        };

        let outcomes = if self.parallel && genes.len() > 1 {
            genes.par_iter().map(score_gene).collect::<SearchResult<Vec<_>>>()?
        } else {
            genes.iter().map(score_gene).collect::<SearchResult<Vec<_>>>()?
        };

        let mut scores = RegionScores {
            scored: Vec::with_capacity(outcomes.len()),
            failed: Vec::new(),
        };
        for outcome in outcomes {
            match outcome {
                Ok(score) => scores.scored.push(score),
                Err(failure) => scores.failed.push(failure),
            }
        }
        Ok(scores)
    }
}
