//! Lexicon-constrained beam-search decoding.
//!
//! This module contains the components of the decoding engine: the lexicon
//! trie the search is constrained by, the language-model seam, the per-frame
//! candidate buffer, and the beam-search driver itself.

mod candidate;
pub mod lm;
mod search;
pub mod trie;

pub use lm::{LanguageModel, ZeroLm};
pub use search::LexiconDecoder;
pub use trie::{SmearingMode, Trie, TrieNode, TrieNodeId};
