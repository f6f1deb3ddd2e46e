//! Per-frame candidate accumulation.
//!
//! During one expansion step every live hypothesis proposes several
//! successors. The buffer collects them, drops obvious losers early against
//! the running best score, merges successors that are equivalent for the
//! future of the search, and finally hands the top of the beam to the next
//! frame.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;

use crate::decoder::trie::TrieNodeId;

/// One partial decoding path.
///
/// `parent` is the slot of the predecessor inside the previous frame's
/// hypothesis list, or `-1` for the seed. Keeping slots instead of pointers
/// lets the pruner shift whole frames without touching the links.
#[derive(Clone)]
pub struct Hypothesis<S> {
    /// Cumulative path score.
    pub score: f32,

    /// Language-model context after this transition.
    pub lm_state: S,

    /// Position inside the current word's spelling.
    pub lex: TrieNodeId,

    /// Slot of the parent in the previous frame, `-1` for the seed.
    pub parent: i32,

    /// Token emitted on the transition into this state.
    pub token: i32,

    /// Word label emitted on this transition, `-1` if none.
    pub word: i32,

    /// The emission was a CTC blank.
    pub prev_blank: bool,

    /// Acoustic part of `score`.
    pub am_score: f32,

    /// Unweighted LM part of `score`.
    pub lm_score: f32,
}

/// Two hypotheses merge when they agree on everything that determines the
/// future of the search.
#[derive(Clone, PartialEq, Eq, Hash)]
struct MergeKey<S> {
    lm_state: S,
    lex: TrieNodeId,
    word: i32,
    prev_blank: bool,
}

/// Accumulator for the candidates of a single frame.
pub struct CandidateBuffer<S> {
    beam_threshold: f32,
    log_add: bool,
    best_score: f32,
    candidates: Vec<Hypothesis<S>>,
    merge_index: HashMap<MergeKey<S>, usize>,
}

impl<S: Clone + Eq + Hash> CandidateBuffer<S> {
    pub fn new(beam_size: usize, beam_threshold: f32, log_add: bool) -> Self {
        Self {
            beam_threshold,
            log_add,
            best_score: f32::NEG_INFINITY,
            candidates: Vec::with_capacity(4 * beam_size),
            merge_index: HashMap::with_capacity(2 * beam_size),
        }
    }

    /// Clear the buffer for a new frame.
    pub fn reset(&mut self) {
        self.best_score = f32::NEG_INFINITY;
        self.candidates.clear();
        self.merge_index.clear();
    }

    /// Insert a candidate, early-pruning against the running best and
    /// merging with an equivalent candidate when one exists.
    pub fn add(&mut self, candidate: Hypothesis<S>) {
        if candidate.score < self.best_score - self.beam_threshold {
            return;
        }
        if candidate.score > self.best_score {
            self.best_score = candidate.score;
        }
        let key = MergeKey {
            lm_state: candidate.lm_state.clone(),
            lex: candidate.lex,
            word: candidate.word,
            prev_blank: candidate.prev_blank,
        };
        match self.merge_index.entry(key) {
            Entry::Occupied(slot) => {
                merge(&mut self.candidates[*slot.get()], candidate, self.log_add);
            }
            Entry::Vacant(slot) => {
                slot.insert(self.candidates.len());
                self.candidates.push(candidate);
            }
        }
    }

    /// Move the top `beam_size` candidates above the threshold floor into
    /// `output`, ordered by descending score. Ties keep insertion order, so
    /// the beam is deterministic.
    pub fn store(&mut self, output: &mut Vec<Hypothesis<S>>, beam_size: usize) {
        output.clear();
        let floor = self.best_score - self.beam_threshold;
        let mut order: Vec<usize> = (0..self.candidates.len())
            .filter(|&i| self.candidates[i].score >= floor)
            .collect();

        let by_score_desc = |a: &usize, b: &usize| -> Ordering {
            self.candidates[*b]
                .score
                .total_cmp(&self.candidates[*a].score)
                .then_with(|| a.cmp(b))
        };
        if order.len() > beam_size {
            pdqselect::select_by(&mut order, beam_size, by_score_desc);
            order.truncate(beam_size);
        }
        order.sort_by(by_score_desc);

        output.extend(order.into_iter().map(|i| self.candidates[i].clone()));
    }
}

/// Combine two equivalent candidates. The surviving entry keeps the fields
/// of the higher-scoring branch; the score is the max of the two or their
/// log-sum-exp when `log_add` is set.
fn merge<S>(existing: &mut Hypothesis<S>, incoming: Hypothesis<S>, log_add: bool) {
    let max = existing.score.max(incoming.score);
    let min = existing.score.min(incoming.score);
    if incoming.score > existing.score {
        *existing = incoming;
    }
    existing.score = if log_add {
        max + (min - max).exp().ln_1p()
    } else {
        max
    };
}
