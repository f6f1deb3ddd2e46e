//! The `lexbeam` core library.
//!
//! This crate provides a lexicon-constrained beam-search decoder that turns
//! per-frame acoustic emission scores into a ranked list of word hypotheses.
//! At every frame it combines three signals: the acoustic emission score of a
//! token, a language-model score updated at word boundaries (or per token),
//! and a pronunciation constraint expressed as a prefix trie over token
//! sequences. Both CTC (blank + repeat collapse) and ASG (token transition
//! matrix) emission criteria are supported.
//!
//! The acoustic model, the language-model backend, and the tokenizer are
//! external collaborators: emissions arrive as plain `&[f32]` matrices, the
//! LM is anything implementing [`LanguageModel`], and the lexicon is a
//! [`Trie`] built by the caller.

pub mod config;
pub mod decoder;
pub mod error;
pub mod types;

pub use config::{CriterionType, DecoderOptions, SpecialTokens};
pub use decoder::{LanguageModel, LexiconDecoder, SmearingMode, Trie, TrieNode, TrieNodeId, ZeroLm};
pub use error::{DecodeError, Result};
pub use types::DecodeResult;
