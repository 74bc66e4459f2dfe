//! Hash-chain agreement across peers.
//!
//! Each hash-phase worker contributes the listing one peer reported for the
//! requested heights. The listings are then reduced position by position
//! into the longest prefix on which a plurality of peers agrees, together
//! with the whitelist of streams that voted with the plurality on every
//! included position.

use meridian_types::{BlockHeight, Hash, StreamId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Votes at a single height: which hash each stream reported.
pub(crate) type HashVotes = HashMap<StreamId, Hash>;

/// Plurality vote over one height's reported hashes.
///
/// Votes are restricted to `prior` when it is non-empty. The winner is the
/// hash with the strictly greatest count; among equal counts the
/// lexicographically smallest hash wins, which keeps resolution independent
/// of map iteration order. The returned whitelist contains exactly the
/// restricted voters of the winner.
///
/// No votes (or no whitelisted votes) resolves to [`Hash::EMPTY`] and an
/// empty whitelist.
pub(crate) fn tally_votes(votes: &HashVotes, prior: &HashSet<StreamId>) -> (Hash, HashSet<StreamId>) {
    let mut counts: HashMap<Hash, usize> = HashMap::new();
    for (stream, hash) in votes {
        if !prior.is_empty() && !prior.contains(stream) {
            continue;
        }
        *counts.entry(*hash).or_insert(0) += 1;
    }

    let mut winner = Hash::EMPTY;
    let mut max_count = 0;
    for (hash, count) in &counts {
        if *count > max_count || (*count == max_count && *hash < winner) {
            max_count = *count;
            winner = *hash;
        }
    }
    if max_count == 0 {
        return (Hash::EMPTY, HashSet::new());
    }

    let next = votes
        .iter()
        .filter(|(stream, hash)| {
            **hash == winner && (prior.is_empty() || prior.contains(*stream))
        })
        .map(|(stream, _)| stream.clone())
        .collect();
    (winner, next)
}

/// Per-height vote tables filled by the hash-phase workers.
pub(crate) struct HashChainTable {
    heights: Vec<BlockHeight>,
    votes: Mutex<Vec<HashVotes>>,
}

impl HashChainTable {
    pub(crate) fn new(heights: Vec<BlockHeight>) -> Self {
        let votes = heights.iter().map(|_| HashVotes::new()).collect();
        Self {
            heights,
            votes: Mutex::new(votes),
        }
    }

    pub(crate) fn heights(&self) -> &[BlockHeight] {
        &self.heights
    }

    /// Record one peer's listing. The listing is truncated at its first
    /// [`Hash::EMPTY`] element: the peer has no block from that height on.
    ///
    /// Length validation against the requested heights happens at the
    /// request site, before the listing reaches the table.
    pub(crate) fn add_listing(&self, hashes: &[Hash], stream: &StreamId) {
        let mut votes = self.votes.lock();
        for (i, hash) in hashes.iter().enumerate() {
            if hash.is_empty() {
                return;
            }
            votes[i].insert(stream.clone(), *hash);
        }
    }

    /// Reduce the vote tables into the longest agreed prefix.
    ///
    /// Resolution walks heights left to right, carrying the whitelist of
    /// streams that agreed on every position so far; the whitelist can only
    /// shrink. The chain terminates at the first height whose winner is
    /// [`Hash::EMPTY`] or whose surviving whitelist is empty.
    pub(crate) fn longest_chain(&self) -> (Vec<Hash>, HashSet<StreamId>) {
        let votes = self.votes.lock();
        let mut whitelist = HashSet::new();
        let mut chain = Vec::new();

        for votes_at_height in votes.iter() {
            let (winner, next) = tally_votes(votes_at_height, &whitelist);
            if winner.is_empty() || next.is_empty() {
                break;
            }
            chain.push(winner);
            whitelist = next;
        }
        (chain, whitelist)
    }
}
