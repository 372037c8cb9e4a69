//! Erosion and insertion statistics from a decoded label path

use crate::error::{SearchError, SearchResult};
use crate::types::{Gene, PathLabel};
use serde::{Deserialize, Serialize};

/// End of a germline gene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// 5' end
    Left,
    /// 3' end
    Right,
}

/// Per-gene statistics for one decoded path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStats {
    pub left_erosion: usize,
    pub right_erosion: usize,
    pub insertion: usize,
    /// Query positions emitted by the germline
    pub matched: usize,
}

/// Number of germline bases trimmed from `side` of `gene`.
///
/// Fails with `DegenerateAlignment` if the path never visits the gene, or
/// visits a position past the end of its reference.
pub fn erosion_length(side: Side, path: &[PathLabel], gene: &Gene) -> SearchResult<usize> {
    let (first, last) = matched_span(path, gene)?;
    Ok(match side {
        Side::Left => first,
        Side::Right => gene.len() - 1 - last,
    })
}

/// Number of non-templated bases at the boundaries of the subsequence
/// (leading run plus trailing run of insert labels).
pub fn insertion_length(path: &[PathLabel]) -> usize {
    let leading = path.iter().take_while(|label| label.is_insert()).count();
    if leading == path.len() {
        return leading;
    }
    let trailing = path.iter().rev().take_while(|label| label.is_insert()).count();
    leading + trailing
}

/// Erosions, insertion and match count in one pass over the path.
pub fn path_stats(path: &[PathLabel], gene: &Gene) -> SearchResult<PathStats> {
    let (first, last) = matched_span(path, gene)?;
    Ok(PathStats {
        left_erosion: first,
        right_erosion: gene.len() - 1 - last,
        insertion: insertion_length(path),
        matched: path.iter().filter(|label| !label.is_insert()).count(),
    })
}

/// Check that a decode is usable for ranking: one label per query position,
/// a finite score, and at least one matched germline position.
pub fn check_alignment(
    path: &[PathLabel],
    score: f64,
    gene: &Gene,
    subsequence_len: usize,
) -> SearchResult<()> {
    if path.len() != subsequence_len {
        return Err(SearchError::degenerate(
            &gene.name,
            format!("path has {} labels for {} query bases", path.len(), subsequence_len),
        ));
    }
    if !score.is_finite() {
        return Err(SearchError::degenerate(&gene.name, format!("score is {}", score)));
    }
    matched_span(path, gene).map(|_| ())
}

/// Smallest and largest germline positions visited by the path.
fn matched_span(path: &[PathLabel], gene: &Gene) -> SearchResult<(usize, usize)> {
    let mut span: Option<(usize, usize)> = None;
    for pos in path.iter().filter_map(|label| label.germline_position()) {
        if pos >= gene.len() {
            return Err(SearchError::degenerate(
                &gene.name,
                format!("germline position {} past reference length {}", pos, gene.len()),
            ));
        }
        span = Some(match span {
            Some((lo, hi)) => (lo.min(pos), hi.max(pos)),
            None => (pos, pos),
        });
    }
    span.ok_or_else(|| SearchError::degenerate(&gene.name, "no matched germline positions"))
}
