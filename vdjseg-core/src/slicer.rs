//! Query slicing for a cut-point pair
//!
//! Insertions are modeled together with the germline region they follow, so
//! the three pieces are disjoint and concatenate back to the query:
//! `v = query[..k_v]`, `d = query[k_v..k_d]`, `j = query[k_d..]`.

use crate::error::{SearchError, SearchResult};
use crate::types::{CutPointPair, Region};

/// The three region subsequences for one cut-point pair, borrowed from the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSubsequences<'a> {
    /// V germline plus the VD insertion
    pub v: &'a [u8],
    /// D germline plus the DJ insertion
    pub d: &'a [u8],
    pub j: &'a [u8],
}

impl<'a> RegionSubsequences<'a> {
    pub fn get(&self, region: Region) -> &'a [u8] {
        match region {
            Region::V => self.v,
            Region::D => self.d,
            Region::J => self.j,
        }
    }
}

/// Slice `query` at `cut_points`.
///
/// Requires `k_v <= k_d <= query.len()`. Out-of-range pairs are rejected
/// rather than clamped, since a clamped pair would alias another pair's
/// subsequences in the decode cache.
pub fn slice(query: &[u8], cut_points: CutPointPair) -> SearchResult<RegionSubsequences<'_>> {
    let CutPointPair { k_v, k_d } = cut_points;
    if k_v > k_d || k_d > query.len() {
        return Err(SearchError::InvalidCutPoints {
            cut_points,
            query_len: query.len(),
        });
    }

    Ok(RegionSubsequences {
        v: &query[..k_v],
        d: &query[k_v..k_d],
        j: &query[k_d..],
    })
}
