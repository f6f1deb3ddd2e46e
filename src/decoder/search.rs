//! The lexicon-constrained beam-search driver.
//!
//! A decoding session is a three-phase lifecycle: [`begin`] seeds the
//! hypothesis graph, [`step`] extends it frame by frame from an emission
//! matrix, and [`end`] closes open hypotheses with the language model's
//! finish score. Hypotheses can be extracted at any point, and [`prune`]
//! commits the stable prefix of a long-running session so the buffer stays
//! bounded.
//!
//! [`begin`]: LexiconDecoder::begin
//! [`step`]: LexiconDecoder::step
//! [`end`]: LexiconDecoder::end
//! [`prune`]: LexiconDecoder::prune

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::config::{CriterionType, DecoderOptions, SpecialTokens};
use crate::decoder::candidate::{CandidateBuffer, Hypothesis};
use crate::decoder::lm::LanguageModel;
use crate::decoder::trie::Trie;
use crate::error::{DecodeError, Result};
use crate::types::DecodeResult;

/// Beam-search decoder constrained by a lexicon trie.
///
/// Generic over the language model; the LM adapter instance is owned by the
/// decoder, so separate decoder instances can run on separate threads
/// without any shared mutable state. The trie is read-only and shared.
pub struct LexiconDecoder<L: LanguageModel> {
    opts: DecoderOptions,
    trie: Arc<Trie>,
    lm: L,
    tokens: SpecialTokens,
    /// ASG token-to-token transition scores, row-major `[token][prev_token]`.
    transitions: Vec<f32>,
    /// Score the LM per acoustic token instead of per emitted word.
    is_lm_token: bool,
    /// Word labels receiving the custom-vocabulary score boost.
    custom_vocab: HashSet<i32>,
    /// Hypothesis lists indexed by frame, relative to the pruned origin.
    hyp: Vec<Vec<Hypothesis<L::State>>>,
    candidates: CandidateBuffer<L::State>,
    /// Scratch for the per-frame token preselection.
    token_order: Vec<usize>,
    /// Vocabulary size, locked by the first `step` of a session.
    vocab_size: Option<usize>,
    n_decoded_frames: usize,
    n_pruned_frames: usize,
}

impl<L: LanguageModel> LexiconDecoder<L> {
    /// Create a decoder.
    ///
    /// `transitions` is the ASG transition matrix, row-major with
    /// `transitions[token * n + prev_token]`; pass an empty vector for CTC.
    /// `is_lm_token` selects token-level LM scoring instead of word-level.
    /// `custom_vocab` holds word labels whose completions get the
    /// custom-vocabulary boost.
    pub fn new(
        opts: DecoderOptions,
        trie: Arc<Trie>,
        lm: L,
        tokens: SpecialTokens,
        transitions: Vec<f32>,
        is_lm_token: bool,
        custom_vocab: HashSet<i32>,
    ) -> Result<Self> {
        opts.validate()?;
        if tokens.sil < 0 {
            return Err(DecodeError::Configuration(
                "sil token index must be non-negative".to_string(),
            ));
        }
        if opts.criterion_type == CriterionType::Ctc && tokens.blank < 0 {
            return Err(DecodeError::Configuration(
                "CTC criterion requires a blank token index".to_string(),
            ));
        }
        let beam_size = opts.beam_size;
        let beam_threshold = opts.beam_threshold;
        let log_add = opts.log_add;
        Ok(Self {
            opts,
            trie,
            lm,
            tokens,
            transitions,
            is_lm_token,
            custom_vocab,
            hyp: Vec::new(),
            candidates: CandidateBuffer::new(beam_size, beam_threshold, log_add),
            token_order: Vec::new(),
            vocab_size: None,
            n_decoded_frames: 0,
            n_pruned_frames: 0,
        })
    }

    /// Reset the session and seed frame 0 with the empty hypothesis.
    pub fn begin(&mut self) {
        self.hyp.clear();
        self.hyp.push(Vec::new());
        let lm_state = self.lm.start(false);
        self.hyp[0].push(Hypothesis {
            score: 0.0,
            lm_state,
            lex: Trie::ROOT,
            parent: -1,
            token: self.tokens.sil,
            word: -1,
            prev_blank: false,
            am_score: 0.0,
            lm_score: 0.0,
        });
        self.vocab_size = None;
        self.n_decoded_frames = 0;
        self.n_pruned_frames = 0;
        debug!("decode session reset");
    }

    /// Extend the hypothesis graph by `frames` frames.
    ///
    /// `emissions` is row-major `frames x vocab`: the score of token `n` at
    /// frame `t` is `emissions[t * vocab + n]`.
    pub fn step(&mut self, emissions: &[f32], frames: usize, vocab: usize) -> Result<()> {
        if self.hyp.is_empty() {
            return Err(DecodeError::Input(
                "begin() must be called before step()".to_string(),
            ));
        }
        self.check_dimensions(emissions, frames, vocab)?;
        match self.vocab_size {
            Some(n) if n != vocab => {
                return Err(DecodeError::Input(format!(
                    "vocabulary size changed from {} to {} mid-session",
                    n, vocab
                )));
            }
            None => self.vocab_size = Some(vocab),
            _ => {}
        }
        if frames == 0 {
            return Ok(());
        }

        let start_frame = self.n_decoded_frames - self.n_pruned_frames;
        while self.hyp.len() < start_frame + frames + 2 {
            self.hyp.push(Vec::new());
        }

        let is_ctc = self.opts.criterion_type == CriterionType::Ctc;
        let is_asg = self.opts.criterion_type == CriterionType::Asg;

        for t in 0..frames {
            let row = &emissions[t * vocab..(t + 1) * vocab];

            // Preselect the tokens worth expanding at this frame. Token index
            // is the secondary key, so equal emissions select deterministically.
            self.token_order.clear();
            self.token_order.extend(0..vocab);
            let beam_tokens = vocab.min(self.opts.beam_size_token);
            if vocab > self.opts.beam_size_token {
                pdqselect::select_by(&mut self.token_order, beam_tokens, |a: &usize, b: &usize| {
                    row[*b].total_cmp(&row[*a]).then_with(|| a.cmp(b))
                });
            }

            self.candidates.reset();
            for slot in 0..self.hyp[start_frame + t].len() {
                let prev = self.hyp[start_frame + t][slot].clone();
                let prev_lex = prev.lex;
                let prev_token = prev.token;
                let lex_max_score = if prev_lex == Trie::ROOT {
                    0.0
                } else {
                    self.trie.node(prev_lex).max_score
                };

                // (1) Advance within the trie.
                for &index in self.token_order.iter().take(beam_tokens) {
                    let token = index as i32;
                    let Some(child) = self.trie.child(prev_lex, token) else {
                        continue;
                    };
                    let mut am_score = row[index];
                    if self.n_decoded_frames + t > 0 && is_asg {
                        am_score += self.transitions[index * vocab + prev_token as usize];
                    }
                    let mut score = prev.score + am_score;
                    if token == self.tokens.sil {
                        score += self.opts.sil_score;
                    }

                    let mut token_lm_state = None;
                    let mut token_lm_score = 0.0;
                    if self.is_lm_token {
                        let (state, lm_score) = self.lm.score(&prev.lm_state, token);
                        token_lm_state = Some(state);
                        token_lm_score = lm_score;
                    }

                    let child_node = self.trie.node(child);

                    // Eat up a new token. CTC forbids consuming the same
                    // token again without a blank in between.
                    if (!is_ctc || prev.prev_blank || token != prev_token)
                        && !child_node.children.is_empty()
                    {
                        let (lm_state, lm_score) = match &token_lm_state {
                            Some(state) => (state.clone(), token_lm_score),
                            None => (
                                prev.lm_state.clone(),
                                child_node.max_score - lex_max_score,
                            ),
                        };
                        self.candidates.add(Hypothesis {
                            score: score + self.opts.lm_weight * lm_score,
                            lm_state,
                            lex: child,
                            parent: slot as i32,
                            token,
                            word: -1,
                            prev_blank: false,
                            am_score: prev.am_score + am_score,
                            lm_score: prev.lm_score + lm_score,
                        });
                    }

                    // The transition completes one or more words.
                    for &label in &child_node.labels {
                        if prev_lex == Trie::ROOT && prev_token == token {
                            // A word with a single-token spelling would
                            // otherwise be emitted once per frame while the
                            // token keeps winning; CTC requires a blank
                            // between two identical tokens.
                            continue;
                        }
                        let (lm_state, lm_score) = match &token_lm_state {
                            Some(state) => (state.clone(), token_lm_score),
                            None => {
                                let (state, lm_score) = self.lm.score(&prev.lm_state, label);
                                (state, lm_score - lex_max_score)
                            }
                        };
                        let mut total =
                            score + self.opts.lm_weight * lm_score + self.opts.word_score;
                        if self.custom_vocab.contains(&label) {
                            let word_len = (child_node.depth - 1) as f32;
                            if word_len > 0.0 {
                                total += (total * self.opts.custom_word_factor
                                    / (self.opts.custom_word_calibration / word_len))
                                    .abs();
                            }
                        }
                        self.candidates.add(Hypothesis {
                            score: total,
                            lm_state,
                            lex: Trie::ROOT,
                            parent: slot as i32,
                            token,
                            word: label,
                            prev_blank: false,
                            am_score: prev.am_score + am_score,
                            lm_score: prev.lm_score + lm_score,
                        });
                    }

                    // Dead end in the lexicon: emit the unknown word.
                    if child_node.labels.is_empty() && self.opts.unk_score > f32::NEG_INFINITY {
                        let (lm_state, lm_score) = match &token_lm_state {
                            Some(state) => (state.clone(), token_lm_score),
                            None => {
                                let (state, lm_score) =
                                    self.lm.score(&prev.lm_state, self.tokens.unk);
                                (state, lm_score - lex_max_score)
                            }
                        };
                        self.candidates.add(Hypothesis {
                            score: score + self.opts.lm_weight * lm_score + self.opts.unk_score,
                            lm_state,
                            lex: Trie::ROOT,
                            parent: slot as i32,
                            token,
                            word: self.tokens.unk,
                            prev_blank: false,
                            am_score: prev.am_score + am_score,
                            lm_score: prev.lm_score + lm_score,
                        });
                    }
                }

                // (2) Stay on the same trie node.
                if !is_ctc || !prev.prev_blank || prev_lex == Trie::ROOT {
                    let token = if prev_lex == Trie::ROOT {
                        self.tokens.sil
                    } else {
                        prev_token
                    };
                    let mut am_score = row[token as usize];
                    if self.n_decoded_frames + t > 0 && is_asg {
                        am_score += self.transitions[token as usize * vocab + prev_token as usize];
                    }
                    let mut score = prev.score + am_score;
                    if token == self.tokens.sil {
                        score += self.opts.sil_score;
                    }
                    self.candidates.add(Hypothesis {
                        score,
                        lm_state: prev.lm_state.clone(),
                        lex: prev_lex,
                        parent: slot as i32,
                        token,
                        word: -1,
                        prev_blank: false,
                        am_score: prev.am_score + am_score,
                        lm_score: prev.lm_score,
                    });
                }

                // (3) CTC only: emit a blank.
                if is_ctc {
                    let blank = self.tokens.blank;
                    let am_score = row[blank as usize];
                    self.candidates.add(Hypothesis {
                        score: prev.score + am_score,
                        lm_state: prev.lm_state.clone(),
                        lex: prev_lex,
                        parent: slot as i32,
                        token: blank,
                        word: -1,
                        prev_blank: true,
                        am_score: prev.am_score + am_score,
                        lm_score: prev.lm_score,
                    });
                }
            }

            let out_frame = start_frame + t + 1;
            self.candidates
                .store(&mut self.hyp[out_frame], self.opts.beam_size);
            let live: Vec<L::State> = self.hyp[out_frame]
                .iter()
                .map(|h| h.lm_state.clone())
                .collect();
            self.lm.clean_up(&live);
        }

        self.n_decoded_frames += frames;
        debug!(
            "decoded {} frames, beam holds {} hypotheses",
            frames,
            self.n_hypothesis()
        );
        Ok(())
    }

    /// Close the utterance: apply the LM finish score to open hypotheses.
    ///
    /// When at least one hypothesis ends at a word boundary, hypotheses
    /// stranded mid-word are dropped in its favor.
    pub fn end(&mut self) {
        let final_frame = self.n_decoded_frames - self.n_pruned_frames;
        while self.hyp.len() < final_frame + 2 {
            self.hyp.push(Vec::new());
        }

        self.candidates.reset();
        let has_nice_ending = self.hyp[final_frame]
            .iter()
            .any(|h| h.lex == Trie::ROOT);
        for slot in 0..self.hyp[final_frame].len() {
            let prev = self.hyp[final_frame][slot].clone();
            if !has_nice_ending || prev.lex == Trie::ROOT {
                let (lm_state, lm_score) = self.lm.finish(&prev.lm_state);
                self.candidates.add(Hypothesis {
                    score: prev.score + self.opts.lm_weight * lm_score,
                    lm_state,
                    lex: prev.lex,
                    parent: slot as i32,
                    token: self.tokens.sil,
                    word: -1,
                    prev_blank: false,
                    am_score: prev.am_score,
                    lm_score: prev.lm_score + lm_score,
                });
            }
        }

        self.candidates
            .store(&mut self.hyp[final_frame + 1], self.opts.beam_size);
        self.n_decoded_frames += 1;
        debug!(
            "decode session closed with {} hypotheses",
            self.n_hypothesis()
        );
    }

    /// Number of live hypotheses at the final frame.
    pub fn n_hypothesis(&self) -> usize {
        let final_frame = self.n_decoded_frames - self.n_pruned_frames;
        self.hyp.get(final_frame).map_or(0, |frame| frame.len())
    }

    /// Number of frames currently buffered, seed frame included.
    pub fn n_decoded_frames_in_buffer(&self) -> usize {
        self.n_decoded_frames - self.n_pruned_frames + 1
    }

    /// Backtrack the best hypothesis, starting `look_back` frames before the
    /// final frame.
    ///
    /// Returns an empty result when fewer than `look_back + 1` frames are
    /// buffered or the beam is empty.
    pub fn get_best_hypothesis(&self, look_back: usize) -> DecodeResult {
        let buffered = self.n_decoded_frames - self.n_pruned_frames;
        if buffered < look_back + 1 {
            return DecodeResult::default();
        }
        match self.find_best_ancestor(look_back) {
            Some((frame, slot)) => self.backtrack(frame, slot),
            None => DecodeResult::default(),
        }
    }

    /// Backtrack every live hypothesis at the final frame, best first.
    pub fn get_all_final_hypothesis(&self) -> Vec<DecodeResult> {
        let final_frame = self.n_decoded_frames - self.n_pruned_frames;
        if final_frame < 1 || final_frame >= self.hyp.len() {
            return Vec::new();
        }
        let mut results: Vec<DecodeResult> = (0..self.hyp[final_frame].len())
            .map(|slot| self.backtrack(final_frame, slot))
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results
    }

    /// Commit the prefix older than `look_back` frames and discard it,
    /// keeping exactly `look_back + 1` frames in the buffer.
    ///
    /// Pruning only acts once the best path has emitted a word at or before
    /// the commit boundary; until then the whole history is kept. The
    /// retained suffix continues exactly where the prefix returned by
    /// `get_best_hypothesis(look_back)` stopped. Scores of surviving
    /// hypotheses are rebased so they track the suffix alone; `am_score`
    /// and `lm_score` keep their absolute values.
    pub fn prune(&mut self, look_back: usize) {
        let buffered = self.n_decoded_frames - self.n_pruned_frames;
        if buffered <= look_back + 1 {
            return; // nothing strictly older than the boundary
        }

        // Find the last emitted word in the best path; without one there is
        // no committed history to drop yet.
        let Some((frame, slot)) = self.find_best_ancestor(look_back) else {
            return;
        };
        if !self.has_committed_word(frame, slot) {
            return;
        }

        // Shift the retained frames to the origin.
        let start_frame = buffered - look_back;
        for i in 0..=look_back {
            self.hyp.swap(i, i + start_frame);
        }
        self.hyp.truncate(look_back + 1);

        // The new origin is the committed boundary: its states must not be
        // backtracked past, and their words are already part of the prefix.
        for h in &mut self.hyp[0] {
            h.parent = -1;
            h.word = -1;
        }

        // Rebase so the best retained state starts from zero.
        let mut largest = f32::NEG_INFINITY;
        for h in &self.hyp[0] {
            largest = largest.max(h.score);
        }
        if largest.is_finite() {
            for frame in &mut self.hyp {
                for h in frame {
                    h.score -= largest;
                }
            }
        }

        self.n_pruned_frames = self.n_decoded_frames - look_back;
        debug!(
            "pruned to {} buffered frames (committed {} frames)",
            look_back + 1,
            start_frame
        );
    }

    fn check_dimensions(&self, emissions: &[f32], frames: usize, vocab: usize) -> Result<()> {
        if vocab == 0 {
            return Err(DecodeError::Input("vocabulary size is zero".to_string()));
        }
        let needed = frames.checked_mul(vocab).ok_or_else(|| {
            DecodeError::Input(format!("emission shape {}x{} overflows", frames, vocab))
        })?;
        if emissions.len() < needed {
            return Err(DecodeError::Input(format!(
                "emission matrix holds {} scores, {}x{} requires {}",
                emissions.len(),
                frames,
                vocab,
                needed
            )));
        }
        if self.tokens.sil as usize >= vocab {
            return Err(DecodeError::Input(format!(
                "sil token {} outside vocabulary of size {}",
                self.tokens.sil, vocab
            )));
        }
        if self.opts.criterion_type == CriterionType::Ctc && self.tokens.blank as usize >= vocab {
            return Err(DecodeError::Input(format!(
                "blank token {} outside vocabulary of size {}",
                self.tokens.blank, vocab
            )));
        }
        if self.opts.criterion_type == CriterionType::Asg
            && self.transitions.len() != vocab * vocab
        {
            return Err(DecodeError::Input(format!(
                "ASG transition matrix holds {} scores, vocabulary of {} requires {}",
                self.transitions.len(),
                vocab,
                vocab * vocab
            )));
        }
        Ok(())
    }

    /// Locate the ancestor of the best final hypothesis `look_back` frames
    /// up the parent chain. Returns its `(frame, slot)`, or `None` when the
    /// beam is empty or the chain is shorter than `look_back`.
    fn find_best_ancestor(&self, look_back: usize) -> Option<(usize, usize)> {
        let final_frame = self.n_decoded_frames - self.n_pruned_frames;
        let hyps = self.hyp.get(final_frame)?;
        if hyps.is_empty() {
            return None;
        }
        let mut slot = 0;
        for (i, h) in hyps.iter().enumerate() {
            if h.score > hyps[slot].score {
                slot = i;
            }
        }

        let mut frame = final_frame;
        let mut walked = 0;
        while walked < look_back {
            let parent = self.hyp[frame][slot].parent;
            if parent < 0 {
                return None;
            }
            frame -= 1;
            slot = parent as usize;
            walked += 1;
        }

        Some((frame, slot))
    }

    /// True when the path into `(frame, slot)` has emitted a word.
    fn has_committed_word(&self, frame: usize, slot: usize) -> bool {
        let (mut frame, mut slot) = (frame, slot);
        loop {
            let h = &self.hyp[frame][slot];
            if h.word >= 0 {
                return true;
            }
            if h.parent < 0 {
                return false;
            }
            slot = h.parent as usize;
            frame -= 1;
        }
    }

    /// Walk the parent chain from `(frame, slot)` down to the origin,
    /// filling one token/word/score entry per frame.
    fn backtrack(&self, frame: usize, slot: usize) -> DecodeResult {
        let mut result = DecodeResult::with_len(frame + 1);
        let head = &self.hyp[frame][slot];
        result.score = head.score;
        result.am_score = head.am_score;
        result.lm_score = head.lm_score;

        let (mut frame, mut slot) = (frame, slot);
        loop {
            let h = &self.hyp[frame][slot];
            result.words[frame] = h.word;
            result.tokens[frame] = h.token;
            result.frame_scores[frame] = h.score;
            if h.parent < 0 {
                break;
            }
            slot = h.parent as usize;
            frame -= 1;
        }
        result
    }
}
