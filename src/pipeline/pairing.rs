//! Adjacency Pair Builder
//!
//! For every scored interval, pairs each competitor with the one running
//! immediately ahead of it.

use std::collections::BTreeMap;

use crate::models::LapRecord;

/// Candidate attacker/defender pair at one interval (not yet labeled)
#[derive(Debug, Clone, Copy)]
pub struct CandidatePair<'a> {
    /// Trailing competitor, one standing behind the defender
    pub attacker: &'a LapRecord,
    pub defender: &'a LapRecord,
}

/// Builds standing-adjacent pairs
pub struct AdjacencyPairBuilder;

impl AdjacencyPairBuilder {
    /// Build candidate pairs for every (session, interval) group
    ///
    /// Groups are visited in (session, interval) order so the output is
    /// deterministic regardless of input order.
    pub fn build(records: &[LapRecord]) -> Vec<CandidatePair<'_>> {
        let mut groups: BTreeMap<(&str, u32), Vec<&LapRecord>> = BTreeMap::new();
        for record in records {
            groups
                .entry((record.session.as_str(), record.interval))
                .or_default()
                .push(record);
        }

        let mut pairs = Vec::new();
        for (_, mut group) in groups {
            pairs.extend(Self::pair_group(&mut group));
        }
        pairs
    }

    /// Pair one interval group
    ///
    /// Sorts by standing and accepts consecutive entries only when their
    /// standings differ by exactly one, so a retirement gap never produces a
    /// false adjacency.
    pub fn pair_group<'a>(group: &mut [&'a LapRecord]) -> Vec<CandidatePair<'a>> {
        group.sort_by_key(|r| r.standing);

        group
            .windows(2)
            .filter(|w| w[0].standing.checked_add(1) == Some(w[1].standing))
            .map(|w| CandidatePair {
                attacker: w[1],
                defender: w[0],
            })
            .collect()
    }
}
