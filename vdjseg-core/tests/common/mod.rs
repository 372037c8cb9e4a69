//! Engines and fixtures shared by the integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use vdjseg_core::{
    CancellationToken, DecodeEngine, DecodeRequest, Decoded, Gene, InMemoryCatalog, PathLabel,
    Region,
};

pub const V_GENE: &str = "CAGGTGCAGCTGGTGCAGTCTGGG";
pub const D_GENE: &str = "GTATTACTATGGTTCG";
pub const J_GENE: &str = "ACTACTTTGACTACTGGGGCCAGGG";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// V eroded by 2 at 3', "CC" VD insertion, D eroded 2 / 4, "A" DJ insertion,
/// J eroded by 3 at 5'.
pub fn rearranged_query() -> Vec<u8> {
    [&V_GENE[..22], "CC", &D_GENE[2..12], "A", &J_GENE[3..]]
        .concat()
        .into_bytes()
}

pub fn single_gene_catalog() -> InMemoryCatalog {
    InMemoryCatalog::from_genes(vec![
        Gene::new("IGHV1-2*02", Region::V, V_GENE),
        Gene::new("IGHD3-10*01", Region::D, D_GENE),
        Gene::new("IGHJ4*02", Region::J, J_GENE),
    ])
}

/// Catalog with decoys: point mutants of each gene and an unrelated V.
pub fn decoy_catalog() -> InMemoryCatalog {
    single_gene_catalog()
        .with_gene(Gene::new("IGHV1-2*04", Region::V, "CAGGTGCAGCTGGTGCAGTCTGGA"))
        .with_gene(Gene::new("IGHV3-23*01", Region::V, "GAGGTGCAGCTGTTGGAGTCTGGG"))
        .with_gene(Gene::new("IGHD3-10*02", Region::D, "GTATTACTATGCTTCG"))
        .with_gene(Gene::new("IGHJ6*02", Region::J, "ATTACTACTACTACGGTATGGACG"))
}

/// Records every request it serves, so tests can compare engine work with
/// the distinct keys encountered.
#[derive(Default)]
pub struct Recorder {
    calls: AtomicUsize,
    keys: Mutex<Vec<(String, Vec<u8>)>>,
}

impl Recorder {
    /// Returns the 1-based number of this call
    fn record(&self, request: &DecodeRequest<'_>) -> usize {
        self.keys
            .lock()
            .push((request.gene.name.to_string(), request.subsequence.to_vec()));
        self.calls.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn distinct_keys(&self) -> usize {
        self.keys.lock().iter().cloned().collect::<HashSet<_>>().len()
    }
}

/// Scores 1.0 for every subsequence, matching bases in order from the 5' end.
#[derive(Default)]
pub struct PerfectEngine {
    pub recorder: Recorder,
}

impl DecodeEngine for PerfectEngine {
    type Trellis = ();

    fn decode(&self, request: &DecodeRequest<'_>) -> anyhow::Result<Decoded<()>> {
        self.recorder.record(request);
        let len = request.gene.len();
        let path = (0..request.subsequence.len())
            .map(|i| if i < len { PathLabel::Germline(i) } else { PathLabel::Insert })
            .collect();
        Ok(Decoded {
            trellis: (),
            path,
            score: 1.0,
        })
    }

    fn name(&self) -> &'static str {
        "perfect"
    }
}

/// Ungapped alignment of a germline window against the subsequence.
///
/// V and D models place non-templated bases after the germline, the J model
/// before it. Match +1, mismatch -2, inserted base -0.5. The trellis is the
/// best score for each germline start offset.
#[derive(Default)]
pub struct UngappedEngine {
    pub recorder: Recorder,
    /// Cancelled once, when this many decodes have been served
    pub cancel_after: Option<(usize, CancellationToken)>,
    /// Gene whose decodes fail
    pub failing_gene: Option<String>,
}

impl UngappedEngine {
    pub fn cancelling_after(n: usize, token: CancellationToken) -> Self {
        Self {
            cancel_after: Some((n, token)),
            ..Default::default()
        }
    }

    pub fn failing_on(gene: &str) -> Self {
        Self {
            failing_gene: Some(gene.to_string()),
            ..Default::default()
        }
    }
}

impl DecodeEngine for UngappedEngine {
    type Trellis = Vec<f64>;

    fn decode(&self, request: &DecodeRequest<'_>) -> anyhow::Result<Decoded<Vec<f64>>> {
        let call = self.recorder.record(request);
        if let Some((n, token)) = &self.cancel_after {
            if call == *n {
                token.cancel();
            }
        }
        if self.failing_gene.as_deref() == Some(&*request.gene.name) {
            anyhow::bail!("model file for {} is unreadable", request.gene.name);
        }

        let query = request.subsequence;
        let germline = &request.gene.seq;
        let n = query.len();
        let inserts_first = request.gene.region == Region::J;

        let mut trellis = Vec::with_capacity(germline.len());
        let mut best: Option<(f64, usize, usize)> = None;
        for offset in 0..germline.len() {
            let mut best_at_offset = f64::NEG_INFINITY;
            for m in 0..=n.min(germline.len() - offset) {
                let window = if inserts_first { &query[n - m..] } else { &query[..m] };
                let matched: f64 = window
                    .iter()
                    .zip(&germline[offset..offset + m])
                    .map(|(q, g)| if q == g { 1.0 } else { -2.0 })
                    .sum();
                let score = matched - 0.5 * (n - m) as f64;
                best_at_offset = best_at_offset.max(score);
                if best.map_or(true, |(s, _, _)| score > s) {
                    best = Some((score, offset, m));
                }
            }
            trellis.push(best_at_offset);
        }

        let (score, offset, m) = best.unwrap_or((0.0, 0, 0));
        let germline_labels = (offset..offset + m).map(PathLabel::Germline);
        let insert_labels = std::iter::repeat(PathLabel::Insert).take(n - m);
        let path: Vec<PathLabel> = if inserts_first {
            insert_labels.chain(germline_labels).collect()
        } else {
            germline_labels.chain(insert_labels).collect()
        };

        Ok(Decoded { trellis, path, score })
    }

    fn name(&self) -> &'static str {
        "ungapped"
    }
}
