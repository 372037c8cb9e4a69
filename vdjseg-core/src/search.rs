//! Boundary search over cut-point pairs
//!
//! For every `(k_v, k_d)` in the requested window the query is sliced into
//! V, D and J subsequences, each is decoded against its region's genes, and
//! the best score per region is summed into a total for the pair. Scores are
//! log-space, so the sum is the joint likelihood of three independent calls.
//!
//! Results live in a write-once table keyed by cut-point pair. Repeated or
//! overlapping runs only evaluate pairs that are not in the table yet, and
//! the decode cache is shared across runs.

use crate::cache::{CacheStats, DecodeCache};
use crate::catalog::GermlineCatalog;
use crate::config::SearchConfig;
use crate::engine::DecodeEngine;
use crate::error::{SearchError, SearchResult};
use crate::path::{self, PathStats};
use crate::scorer::{self, GeneScore, RegionScorer, RegionScores};
use crate::slicer;
use crate::types::{CutPointPair, Gene, PathLabel, QueryPos, Region};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag for stopping a sweep between cut-point pairs.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so the next run can proceed
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Winning gene of one region for one cut-point pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionBest {
    pub region: Region,
    pub gene: Arc<str>,
    pub score: f64,
}

/// Candidate score table entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KSetScore {
    pub cut_points: CutPointPair,
    /// Sum of the per-region best scores
    pub total: f64,
    /// Best gene per region, in V, D, J order
    pub regions: Vec<RegionBest>,
}

impl KSetScore {
    pub fn region(&self, region: Region) -> &RegionBest {
        &self.regions[region.index()]
    }
}

/// A gene excluded from ranking because its decode failed or was unusable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegenerateRecord {
    pub cut_points: CutPointPair,
    pub region: Region,
    pub gene: Arc<str>,
    pub message: String,
}

/// Summary of one call to [`JobHolder::run`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Pairs in the requested window
    pub requested: usize,
    /// Pairs skipped because the table already held them
    pub already_scored: usize,
    pub scored: usize,
    /// Pairs with invalid cut points or no usable gene in some region
    pub failed: usize,
    /// Pairs never started because the run was cancelled
    pub not_started: usize,
    pub cancelled: bool,
    /// Engine invocations made by this run
    pub decodes: u64,
}

/// Final call for one region of the best cut-point pair
#[derive(Debug, Clone, Serialize)]
pub struct RegionCall {
    pub region: Region,
    pub gene: Arc<str>,
    pub score: f64,
    /// Raw query bytes of the region, in the engine's alphabet
    pub subsequence: Vec<u8>,
    pub path: Vec<PathLabel>,
    pub stats: PathStats,
}

/// The arg-max cut-point pair with everything needed to describe its paths
#[derive(Debug, Clone, Serialize)]
pub struct BestAssignment {
    pub cut_points: CutPointPair,
    pub total_score: f64,
    pub regions: Vec<RegionCall>,
}

impl BestAssignment {
    pub fn region(&self, region: Region) -> &RegionCall {
        &self.regions[region.index()]
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

enum PairOutcome {
    Scored,
    Failed,
    Cancelled,
}

/// Boundary search controller for one query sequence
pub struct JobHolder<E: DecodeEngine, C: GermlineCatalog> {
    config: SearchConfig,
    query: Vec<u8>,
    catalog: C,
    cache: DecodeCache<E>,
    pool: Option<rayon::ThreadPool>,
    scores: RwLock<BTreeMap<CutPointPair, KSetScore>>,
    failures: RwLock<BTreeMap<CutPointPair, String>>,
    degenerate: Mutex<BTreeMap<(CutPointPair, Region, Arc<str>), String>>,
    cancel: CancellationToken,
}

impl<E: DecodeEngine, C: GermlineCatalog> JobHolder<E, C> {
    pub fn new(config: SearchConfig, engine: E, catalog: C, query: impl Into<Vec<u8>>) -> SearchResult<Self> {
        let pool = if config.is_parallel() {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.threads)
                .thread_name(|i| format!("vdjseg-worker-{}", i))
                .build()
                .map_err(|e| SearchError::config(format!("Failed to build worker pool: {}", e)))?;
            Some(pool)
        } else {
            None
        };

        let cache = DecodeCache::new(engine, config.model_dir.clone(), config.algorithm);

        Ok(Self {
            config,
            query: query.into(),
            catalog,
            cache,
            pool,
            scores: RwLock::new(BTreeMap::new()),
            failures: RwLock::new(BTreeMap::new()),
            degenerate: Mutex::new(BTreeMap::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn query(&self) -> &[u8] {
        &self.query
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        self.cache.engine()
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Evaluate every pair with `k_v` in `[k_v_start, k_v_start + n_k_v)` and
    /// `k_d` in `[k_d_start, k_d_start + n_k_d)`.
    ///
    /// Pairs already in the score table are left untouched. Invalid pairs and
    /// pairs without a usable gene in some region are recorded and skipped.
    /// A gene the engine fails on is excluded like a degenerate alignment.
    /// Cache invariant violations abort the run, leaving everything scored
    /// so far in place.
    pub fn run(
        &self,
        k_v_start: QueryPos,
        n_k_v: usize,
        k_d_start: QueryPos,
        n_k_d: usize,
    ) -> SearchResult<RunReport> {
        if n_k_v == 0 || n_k_d == 0 {
            return Err(SearchError::invalid_sweep(format!(
                "empty sweep window (n_k_v = {}, n_k_d = {})",
                n_k_v, n_k_d
            )));
        }
        let k_v_end = k_v_start
            .checked_add(n_k_v)
            .ok_or_else(|| SearchError::invalid_sweep("k_v range overflows"))?;
        let k_d_end = k_d_start
            .checked_add(n_k_d)
            .ok_or_else(|| SearchError::invalid_sweep("k_d range overflows"))?;
        let requested = n_k_v
            .checked_mul(n_k_d)
            .ok_or_else(|| SearchError::invalid_sweep("too many cut-point pairs"))?;

        for region in Region::ALL {
            if self.catalog.genes(region).is_empty() {
                return Err(SearchError::EmptyGeneSet { region });
            }
        }

        let tasks: Vec<CutPointPair> = {
            let scores = self.scores.read();
            (k_v_start..k_v_end)
                .flat_map(|k_v| (k_d_start..k_d_end).map(move |k_d| CutPointPair::new(k_v, k_d)))
                .filter(|cut_points| !scores.contains_key(cut_points))
                .collect()
        };

        log::info!(
            "Sweeping k_v in [{}, {}) and k_d in [{}, {}) over {} bp query: {} pairs, {} already scored",
            k_v_start,
            k_v_end,
            k_d_start,
            k_d_end,
            self.query.len(),
            requested,
            requested - tasks.len()
        );

        let decodes_before = self.cache.stats().decodes;
        let outcomes = match &self.pool {
            Some(pool) => pool.install(|| {
                tasks
                    .par_iter()
                    .map(|&cut_points| self.evaluate_pair(cut_points))
                    .collect::<SearchResult<Vec<_>>>()
            })?,
            None => {
                let mut outcomes = Vec::with_capacity(tasks.len());
                for &cut_points in &tasks {
                    let outcome = self.evaluate_pair(cut_points)?;
                    let stop = matches!(outcome, PairOutcome::Cancelled);
                    outcomes.push(outcome);
                    if stop {
                        break;
                    }
                }
                outcomes
            }
        };

        let mut report = RunReport {
            requested,
            already_scored: requested - tasks.len(),
            ..Default::default()
        };
        for outcome in &outcomes {
            match outcome {
                PairOutcome::Scored => report.scored += 1,
                PairOutcome::Failed => report.failed += 1,
                PairOutcome::Cancelled => report.cancelled = true,
            }
        }
        report.not_started = tasks.len() - report.scored - report.failed;
        report.decodes = self.cache.stats().decodes - decodes_before;

        if report.cancelled {
            log::info!(
                "Sweep cancelled: {} scored, {} failed, {} not started",
                report.scored,
                report.failed,
                report.not_started
            );
        } else {
            log::info!(
                "Sweep finished: {} scored, {} failed, {} decodes",
                report.scored,
                report.failed,
                report.decodes
            );
        }

        Ok(report)
    }

    /// Score of `cut_points`, if it has been evaluated successfully
    pub fn score(&self, cut_points: CutPointPair) -> Option<f64> {
        self.scores.read().get(&cut_points).map(|entry| entry.total)
    }

    /// Snapshot of the candidate score table
    pub fn score_table(&self) -> BTreeMap<CutPointPair, KSetScore> {
        self.scores.read().clone()
    }

    /// Pairs that could not be scored, with the reason
    pub fn failed_cut_points(&self) -> BTreeMap<CutPointPair, String> {
        self.failures.read().clone()
    }

    pub fn degenerate_alignments(&self) -> Vec<DegenerateRecord> {
        self.degenerate
            .lock()
            .iter()
            .map(|((cut_points, region, gene), message)| DegenerateRecord {
                cut_points: *cut_points,
                region: *region,
                gene: Arc::clone(gene),
                message: message.clone(),
            })
            .collect()
    }

    /// Highest-scoring table entry. Among equal totals the smallest
    /// cut-point pair wins.
    pub fn best_cut_points(&self) -> SearchResult<KSetScore> {
        let scores = self.scores.read();
        let mut best: Option<&KSetScore> = None;
        for entry in scores.values() {
            if best.map_or(true, |b| entry.total > b.total) {
                best = Some(entry);
            }
        }
        best.cloned().ok_or(SearchError::NoValidCandidate)
    }

    /// The best cut-point pair with per-region gene, path and path statistics
    pub fn best(&self) -> SearchResult<BestAssignment> {
        let top = self.best_cut_points()?;
        let regions = slicer::slice(&self.query, top.cut_points)?;

        let calls = top
            .regions
            .iter()
            .map(|best| {
                let gene = self.find_gene(best.region, &best.gene)?;
                let subsequence = regions.get(best.region);
                let decode = self.cache.get_or_compute(gene, subsequence)?;
                let stats = path::path_stats(&decode.path, gene)?;
                Ok(RegionCall {
                    region: best.region,
                    gene: Arc::clone(&best.gene),
                    score: best.score,
                    subsequence: subsequence.to_vec(),
                    path: decode.path.clone(),
                    stats,
                })
            })
            .collect::<SearchResult<Vec<_>>>()?;

        Ok(BestAssignment {
            cut_points: top.cut_points,
            total_score: top.total,
            regions: calls,
        })
    }

    /// Every gene's decode of `region` for `cut_points`, in catalog order,
    /// plus the genes the engine failed on
    pub fn region_scores(
        &self,
        cut_points: CutPointPair,
        region: Region,
    ) -> SearchResult<RegionScores<E::Trellis>> {
        let regions = slicer::slice(&self.query, cut_points)?;
        let subsequence = regions.get(region);
        self.in_pool(|| {
            self.scorer()
                .score_region(region, subsequence, self.config.n_max_versions)
        })
    }

    /// Successful decodes of `region` for `cut_points`, best-first
    pub fn ranked_region_scores(
        &self,
        cut_points: CutPointPair,
        region: Region,
    ) -> SearchResult<Vec<GeneScore<E::Trellis>>> {
        Ok(scorer::ranked(&self.region_scores(cut_points, region)?.scored))
    }

    /// Erosion and insertion statistics for one gene at `cut_points`
    pub fn path_stats(
        &self,
        cut_points: CutPointPair,
        region: Region,
        gene_name: &str,
    ) -> SearchResult<PathStats> {
        let regions = slicer::slice(&self.query, cut_points)?;
        let gene = self.find_gene(region, gene_name)?;
        let decode = self.cache.get_or_compute(gene, regions.get(region))?;
        path::path_stats(&decode.path, gene)
    }

    fn scorer(&self) -> RegionScorer<'_, E, C> {
        RegionScorer::new(&self.catalog, &self.cache).with_parallel(self.pool.is_some())
    }

    /// Run `op` on the holder's worker pool, if it has one
    fn in_pool<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn exclude(
        &self,
        cut_points: CutPointPair,
        region: Region,
        gene: &Arc<str>,
        error: &SearchError,
    ) {
        self.degenerate
            .lock()
            .insert((cut_points, region, Arc::clone(gene)), error.to_string());
    }

    fn find_gene(&self, region: Region, name: &str) -> SearchResult<&Arc<Gene>> {
        self.catalog
            .genes_capped(region, self.config.n_max_versions)
            .iter()
            .find(|gene| &*gene.name == name)
            .ok_or_else(|| SearchError::UnknownGene {
                region,
                gene: name.to_string(),
            })
    }

    fn evaluate_pair(&self, cut_points: CutPointPair) -> SearchResult<PairOutcome> {
        if self.cancel.is_cancelled() {
            return Ok(PairOutcome::Cancelled);
        }

        let regions = match slicer::slice(&self.query, cut_points) {
            Ok(regions) => regions,
            Err(e) if e.is_recoverable() => {
                log::warn!("Skipping {}: {}", cut_points, e);
                self.failures.write().insert(cut_points, e.to_string());
                return Ok(PairOutcome::Failed);
            }
            Err(e) => return Err(e),
        };

        let scorer = self.scorer();
        let mut bests = Vec::with_capacity(Region::ALL.len());
        for region in Region::ALL {
            let subsequence = regions.get(region);
            let scores = scorer.score_region(region, subsequence, self.config.n_max_versions)?;
            for (gene, e) in &scores.failed {
                log::warn!("Excluding {} at {}: {}", gene.name, cut_points, e);
                self.exclude(cut_points, region, &gene.name, e);
            }
            match self.pick_best(cut_points, region, subsequence.len(), &scores.scored) {
                Some(best) => bests.push(best),
                None => {
                    let message = format!("no usable {} gene", region);
                    log::warn!("Skipping {}: {}", cut_points, message);
                    self.failures.write().insert(cut_points, message);
                    return Ok(PairOutcome::Failed);
                }
            }
        }

        let total: f64 = bests.iter().map(|best| best.score).sum();
        log::debug!("{} scored {:.4}", cut_points, total);

        self.scores.write().entry(cut_points).or_insert(KSetScore {
            cut_points,
            total,
            regions: bests,
        });
        Ok(PairOutcome::Scored)
    }

    /// Highest-scoring usable gene; ties go to the earlier catalog entry.
    fn pick_best<T>(
        &self,
        cut_points: CutPointPair,
        region: Region,
        subsequence_len: usize,
        scores: &[GeneScore<T>],
    ) -> Option<RegionBest> {
        let mut best: Option<&GeneScore<T>> = None;
        for candidate in scores {
            if let Err(e) = candidate.check(subsequence_len) {
                log::debug!("Excluding {} at {}: {}", candidate.gene.name, cut_points, e);
                self.exclude(cut_points, region, &candidate.gene.name, &e);
                continue;
            }
            if best.map_or(true, |b| candidate.score() > b.score()) {
                best = Some(candidate);
            }
        }

        best.map(|candidate| RegionBest {
            region,
            gene: Arc::clone(&candidate.gene.name),
            score: candidate.score(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::engine::{DecodeRequest, Decoded};

    /// Every base is matched in order; the score is a fixed value per gene.
    struct FlatEngine;

    impl DecodeEngine for FlatEngine {
        type Trellis = ();

        fn decode(&self, request: &DecodeRequest<'_>) -> anyhow::Result<Decoded<()>> {
            let len = request.gene.len();
            let path = (0..request.subsequence.len())
                .map(|i| if i < len { PathLabel::Germline(i) } else { PathLabel::Insert })
                .collect();
            let score = match &*request.gene.name {
                "V2" => 2.0,
                _ => 1.0,
            };
            Ok(Decoded { trellis: (), path, score })
        }

        fn name(&self) -> &'static str {
            "flat"
        }
    }

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::from_genes(vec![
            Gene::new("V1", Region::V, "ACGTACGT"),
            Gene::new("V2", Region::V, "ACGTACGA"),
            Gene::new("D1", Region::D, "GGGG"),
            Gene::new("J1", Region::J, "TTTTTTTT"),
        ])
    }

    fn holder() -> JobHolder<FlatEngine, InMemoryCatalog> {
        let config = SearchConfig::default().with_threads(1);
        JobHolder::new(config, FlatEngine, catalog(), "ACGTTTGGCA").unwrap()
    }

    #[test]
    fn test_best_gene_is_summed_per_region() {
        let holder = holder();
        let report = holder.run(2, 1, 5, 1).unwrap();
        assert_eq!(report.scored, 1);

        let entry = holder.best_cut_points().unwrap();
        assert_eq!(entry.cut_points, CutPointPair::new(2, 5));
        assert_eq!(entry.total, 4.0);
        assert_eq!(&*entry.region(Region::V).gene, "V2");
    }

    #[test]
    fn test_empty_window_is_rejected_before_decoding() {
        let holder = holder();
        assert!(matches!(holder.run(2, 0, 5, 2), Err(SearchError::InvalidSweep { .. })));
        assert!(matches!(holder.run(2, 2, 5, 0), Err(SearchError::InvalidSweep { .. })));
        assert!(matches!(holder.run(usize::MAX, 2, 5, 1), Err(SearchError::InvalidSweep { .. })));
        assert_eq!(holder.cache_stats().decodes, 0);
    }

    #[test]
    fn test_invalid_pairs_do_not_abort_the_sweep() {
        let holder = holder();
        // k_d = 12 runs past the end of the 10 bp query; k_v = 6 > k_d = 5
        let report = holder.run(5, 2, 5, 8).unwrap();
        assert_eq!(report.requested, 16);
        assert!(report.scored > 0);
        assert!(holder.failed_cut_points().contains_key(&CutPointPair::new(6, 5)));
        assert!(holder.failed_cut_points().contains_key(&CutPointPair::new(5, 12)));
        assert_eq!(report.scored + report.failed, 16);
    }

    #[test]
    fn test_empty_d_region_is_degenerate_not_invalid() {
        let holder = holder();
        let report = holder.run(4, 1, 4, 1).unwrap();
        assert_eq!(report.failed, 1);
        let failures = holder.failed_cut_points();
        assert_eq!(failures[&CutPointPair::new(4, 4)], "no usable d gene");
        let degenerate = holder.degenerate_alignments();
        assert_eq!(degenerate.len(), 1);
        assert_eq!(degenerate[0].region, Region::D);
        assert!(matches!(holder.best(), Err(SearchError::NoValidCandidate)));
    }

    #[test]
    fn test_cancelled_before_start_leaves_table_empty() {
        let holder = holder();
        holder.cancellation_token().cancel();
        let report = holder.run(2, 2, 5, 2).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.not_started, 4);
        assert!(holder.score_table().is_empty());

        holder.cancellation_token().reset();
        let report = holder.run(2, 2, 5, 2).unwrap();
        assert_eq!(report.scored, 4);
    }

    #[test]
    fn test_best_describes_paths() {
        let holder = holder();
        holder.run(3, 1, 6, 1).unwrap();
        let best = holder.best().unwrap();

        assert_eq!(best.cut_points, CutPointPair::new(3, 6));
        assert_eq!(best.region(Region::V).subsequence, b"ACG");
        assert_eq!(best.region(Region::D).subsequence, b"TTT");
        assert_eq!(best.region(Region::J).subsequence, b"GGCA");
        // 3 of 8 V bases matched from the 5' end
        assert_eq!(best.region(Region::V).stats.right_erosion, 5);
        assert!(best.to_json().unwrap().contains("\"cut_points\""));
    }

    #[test]
    fn test_subsequence_keeps_raw_bytes() {
        let config = SearchConfig::default().with_threads(1);
        let query = vec![b'A', 0xFF, b'G', b'T', 0x80, b'T', b'G', b'G', b'C', b'A'];
        let holder = JobHolder::new(config, FlatEngine, catalog(), query).unwrap();
        holder.run(3, 1, 6, 1).unwrap();

        let best = holder.best().unwrap();
        assert_eq!(best.region(Region::V).subsequence, [b'A', 0xFF, b'G']);
        assert_eq!(best.region(Region::D).subsequence, [b'T', 0x80, b'T']);
    }

    /// Reports the size of the rayon pool each decode ran on.
    #[derive(Default)]
    struct PoolSizeEngine {
        seen: Mutex<Vec<usize>>,
    }

    impl DecodeEngine for PoolSizeEngine {
        type Trellis = ();

        fn decode(&self, request: &DecodeRequest<'_>) -> anyhow::Result<Decoded<()>> {
            self.seen.lock().push(rayon::current_num_threads());
            FlatEngine.decode(request)
        }

        fn name(&self) -> &'static str {
            "pool-size"
        }
    }

    #[test]
    fn test_region_scores_run_on_the_holder_pool() {
        let config = SearchConfig::default().with_threads(3);
        let holder = JobHolder::new(config, PoolSizeEngine::default(), catalog(), "ACGTTTGGCA").unwrap();

        let scores = holder.region_scores(CutPointPair::new(2, 5), Region::V).unwrap();
        assert_eq!(scores.scored.len(), 2);
        let ranked = holder.ranked_region_scores(CutPointPair::new(3, 5), Region::V).unwrap();
        assert_eq!(&*ranked[0].gene.name, "V2");

        let seen = holder.engine().seen.lock().clone();
        assert_eq!(seen, vec![3; 4]);
    }

    #[test]
    fn test_unknown_gene_in_path_stats() {
        let holder = holder();
        let err = holder.path_stats(CutPointPair::new(2, 5), Region::J, "J9").unwrap_err();
        assert!(matches!(err, SearchError::UnknownGene { region: Region::J, .. }));
        let stats = holder.path_stats(CutPointPair::new(2, 5), Region::J, "J1").unwrap();
        assert_eq!(stats.matched, 5);
        assert_eq!(stats.right_erosion, 3);
    }
}
