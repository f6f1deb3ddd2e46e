//! Language-model seam.
//!
//! The decoder is polymorphic over the language model through the
//! [`LanguageModel`] trait. States are opaque handles owned by the adapter;
//! the decoder only clones, compares and hashes them — two equal states must
//! produce identical future scores, because state equality is the merge key
//! for equivalent hypotheses.

use std::hash::Hash;

/// A stateful incremental scorer over token or word indices.
///
/// Whether `score` is fed acoustic tokens or word labels is the decoder's
/// choice (its `is_lm_token` mode); the contract here is the same either way.
/// All scores are log-domain.
pub trait LanguageModel {
    /// Opaque conditioning-context handle.
    type State: Clone + Eq + Hash;

    /// Initial state at utterance start.
    fn start(&mut self, start_with_nothing: bool) -> Self::State;

    /// Incremental log-probability of `token` given `state`, with the
    /// successor state.
    fn score(&mut self, state: &Self::State, token: i32) -> (Self::State, f32);

    /// Closing log-probability (e.g. end-of-sentence) for `state`.
    fn finish(&mut self, state: &Self::State) -> (Self::State, f32);

    /// Cache-eviction hook, invoked after every stored frame with the states
    /// still referenced by live hypotheses. The default does nothing.
    fn clean_up(&mut self, _live: &[Self::State]) {}
}

/// A language model that scores everything as zero.
///
/// Useful for acoustic-only decoding and as a baseline in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroLm;

impl LanguageModel for ZeroLm {
    type State = ();

    fn start(&mut self, _start_with_nothing: bool) -> Self::State {}

    fn score(&mut self, _state: &Self::State, _token: i32) -> (Self::State, f32) {
        ((), 0.0)
    }

    fn finish(&mut self, _state: &Self::State) -> (Self::State, f32) {
        ((), 0.0)
    }
}
