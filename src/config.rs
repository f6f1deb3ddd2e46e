//! Decoder configuration.
//!
//! This module centralizes the tunable knobs of the beam search. Options are
//! plain serde-derived records so callers can load them from whatever
//! configuration source they use; validation happens once, when a decoder is
//! constructed.

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, Result};

/// Training criterion of the acoustic model.
///
/// The criterion decides which transition rules apply during the beam
/// expansion: CTC uses a blank symbol and forbids same-token repeats without
/// an intervening blank, ASG uses a dense token-to-token transition matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CriterionType {
    /// Connectionist Temporal Classification.
    Ctc,
    /// Auto Segmentation criterion.
    Asg,
}

/// Distinguished token indices of the acoustic vocabulary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpecialTokens {
    /// Silence / word-separator token.
    pub sil: i32,

    /// CTC blank token. Unused for ASG; set to `-1` in that case.
    pub blank: i32,

    /// Unknown-word label in the word dictionary.
    pub unk: i32,
}

/// Tunable options of the beam search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderOptions {
    /// Maximum number of hypotheses retained per frame.
    pub beam_size: usize,

    /// Maximum number of tokens considered for expansion at each frame.
    pub beam_size_token: usize,

    /// Candidates scoring more than this below the frame's best are dropped.
    pub beam_threshold: f32,

    /// Scaling of language-model log-probabilities.
    pub lm_weight: f32,

    /// Bonus added every time a word is emitted.
    pub word_score: f32,

    /// Bonus (typically negative) for emitting the unknown word.
    /// `f32::NEG_INFINITY` disables unknown-word emission entirely.
    pub unk_score: f32,

    /// Bonus for emitting the silence token.
    pub sil_score: f32,

    /// Merge equivalent hypotheses with log-sum-exp instead of max.
    pub log_add: bool,

    /// Training criterion of the acoustic model.
    pub criterion_type: CriterionType,

    /// Strength of the score boost for words in the custom vocabulary.
    pub custom_word_factor: f32,

    /// Length calibration of the custom-vocabulary boost. The boost for a
    /// word of `n` tokens is `|total * custom_word_factor / (calibration / n)|`,
    /// so this should track the longest word in the custom vocabulary.
    pub custom_word_calibration: f32,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            beam_size: 2500,
            beam_size_token: 250_000,
            beam_threshold: 25.0,
            lm_weight: 0.0,
            word_score: 0.0,
            unk_score: f32::NEG_INFINITY,
            sil_score: 0.0,
            log_add: false,
            criterion_type: CriterionType::Ctc,
            custom_word_factor: 0.0,
            custom_word_calibration: 15.0,
        }
    }
}

impl DecoderOptions {
    /// Validate the option set.
    ///
    /// Returns a [`DecodeError::Configuration`] describing the first invalid
    /// option encountered.
    pub fn validate(&self) -> Result<()> {
        if self.beam_size == 0 {
            return Err(DecodeError::Configuration(
                "beam_size must be positive".to_string(),
            ));
        }
        if self.beam_size_token == 0 {
            return Err(DecodeError::Configuration(
                "beam_size_token must be positive".to_string(),
            ));
        }
        if !(self.beam_threshold >= 0.0) {
            return Err(DecodeError::Configuration(format!(
                "beam_threshold must be non-negative, got {}",
                self.beam_threshold
            )));
        }
        if !self.lm_weight.is_finite() {
            return Err(DecodeError::Configuration(format!(
                "lm_weight must be finite, got {}",
                self.lm_weight
            )));
        }
        if !(self.custom_word_calibration > 0.0) {
            return Err(DecodeError::Configuration(format!(
                "custom_word_calibration must be positive, got {}",
                self.custom_word_calibration
            )));
        }
        Ok(())
    }
}
