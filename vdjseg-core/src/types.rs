use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Offset into the query sequence.
pub type QueryPos = usize;

/// Germline region of a rearranged sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    V,
    D,
    J,
}

impl Region {
    /// All regions in the order they appear along the query.
    pub const ALL: [Region; 3] = [Region::V, Region::D, Region::J];

    pub fn index(self) -> usize {
        match self {
            Region::V => 0,
            Region::D => 1,
            Region::J => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Region::V => "v",
            Region::D => "d",
            Region::J => "j",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pair of hypothesised region boundaries (a "k-set").
///
/// `k_v` is where the V region (with its trailing VD insertion) ends and D
/// begins; `k_d` is where D (with its trailing DJ insertion) ends and J
/// begins. Ordering is lexicographic on `(k_v, k_d)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CutPointPair {
    pub k_v: QueryPos,
    pub k_d: QueryPos,
}

impl CutPointPair {
    pub const fn new(k_v: QueryPos, k_d: QueryPos) -> Self {
        Self { k_v, k_d }
    }
}

impl From<(QueryPos, QueryPos)> for CutPointPair {
    fn from((k_v, k_d): (QueryPos, QueryPos)) -> Self {
        Self::new(k_v, k_d)
    }
}

impl fmt::Display for CutPointPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.k_v, self.k_d)
    }
}

/// A germline gene candidate from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gene {
    /// Gene name, e.g. `IGHV1-18*01`
    pub name: Arc<str>,
    pub region: Region,
    /// Reference germline sequence
    pub seq: Vec<u8>,
}

impl Gene {
    pub fn new(name: impl Into<Arc<str>>, region: Region, seq: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            region,
            seq: seq.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }
}

/// One label of a decoded best path, aligned to one query position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathLabel {
    /// Emitted by the germline reference at this 0-based position
    Germline(usize),
    /// Non-templated insertion
    Insert,
}

impl PathLabel {
    pub fn is_insert(self) -> bool {
        matches!(self, PathLabel::Insert)
    }

    pub fn germline_position(self) -> Option<usize> {
        match self {
            PathLabel::Germline(pos) => Some(pos),
            PathLabel::Insert => None,
        }
    }
}

/// Which decoding algorithm the engine should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Best single path
    #[default]
    Viterbi,
    /// Total probability over all paths (the path is still the engine's best)
    Forward,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Viterbi => f.write_str("viterbi"),
            Algorithm::Forward => f.write_str("forward"),
        }
    }
}
