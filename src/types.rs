//! Core decoding result types.

use serde::{Deserialize, Serialize};

/// A single decoded hypothesis, backtracked over the whole utterance.
///
/// The `words`, `tokens` and `frame_scores` rows are frame-indexed and all
/// have the same length (number of decoded frames plus the seed frame).
/// `words[f]` is the word label emitted on the transition into frame `f`, or
/// `-1` when that transition emitted no word.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodeResult {
    /// Cumulative path score (acoustic + weighted LM + bonuses).
    pub score: f32,

    /// Acoustic part of `score`.
    pub am_score: f32,

    /// Unweighted language-model part of `score`.
    pub lm_score: f32,

    /// Word label per frame, `-1` when no word was emitted.
    pub words: Vec<i32>,

    /// Token emitted per frame.
    pub tokens: Vec<i32>,

    /// Cumulative path score at each frame.
    pub frame_scores: Vec<f32>,
}

impl DecodeResult {
    /// Create an empty result spanning `len` frames.
    pub(crate) fn with_len(len: usize) -> Self {
        Self {
            score: 0.0,
            am_score: 0.0,
            lm_score: 0.0,
            words: vec![-1; len],
            tokens: vec![-1; len],
            frame_scores: vec![0.0; len],
        }
    }

    /// True when the result carries no frames at all.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The emitted word labels in order, with the `-1` fillers removed.
    pub fn word_sequence(&self) -> Vec<i32> {
        self.words.iter().copied().filter(|&w| w >= 0).collect()
    }

    /// The token row with blanks and consecutive repeats collapsed away,
    /// i.e. the CTC reduction of the frame-level alignment.
    pub fn collapsed_tokens(&self, blank: i32) -> Vec<i32> {
        let mut output = Vec::new();
        let mut last = blank;
        for &token in &self.tokens {
            if token != last && token != blank && token >= 0 {
                output.push(token);
            }
            last = token;
        }
        output
    }
}
