// ============================================================
// Layer 5 — Beam Search Decoding
// ============================================================
// Deterministic beam search over any next-token scorer.
//
// Each step:
//   1. Ask the scorer for log-probabilities of the next token
//      for every live beam.
//   2. Drop tokens that would repeat an n-gram already present
//      in that beam (no-repeat n-gram constraint).
//   3. Keep the 2 × num_beams best (beam, token) extensions.
//   4. Extensions ending in EOS become finished hypotheses
//      (only if they rank inside the top num_beams); the rest
//      become the next live beams, up to num_beams.
//   5. Early stopping: once num_beams hypotheses are finished,
//      stop.
//
// When the token budget runs out, live beams are finalised as
// they are. The best hypothesis by length-normalised score
// (sum_logprobs / generated_len ^ length_penalty) wins.
//
// Every beam starts with the decoder-start token; it is not
// part of the returned sequence.

use anyhow::Result;
use std::cmp::Ordering;

/// Produces next-token log-probabilities for a set of prefixes.
pub trait StepScorer {
    /// One row of `vocab` log-probabilities per prefix, same order.
    fn log_probs(&mut self, prefixes: &[Vec<u32>]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Debug, Clone)]
pub struct BeamConfig {
    pub num_beams:            usize,
    pub max_new_tokens:       usize,
    pub no_repeat_ngram_size: usize,
    pub length_penalty:       f32,
    pub early_stopping:       bool,
    pub eos_token_id:         u32,
    pub decoder_start_id:     u32,
}

impl BeamConfig {
    /// Width 4, trigram blocking, early stopping, no length bias
    pub fn new(max_new_tokens: usize, eos_token_id: u32, decoder_start_id: u32) -> Self {
        Self {
            num_beams: 4,
            max_new_tokens,
            no_repeat_ngram_size: 3,
            length_penalty: 1.0,
            early_stopping: true,
            eos_token_id,
            decoder_start_id,
        }
    }
}

#[derive(Debug, Clone)]
struct Beam {
    tokens: Vec<u32>,
    score:  f32,
}

#[derive(Debug, Clone)]
struct Finished {
    tokens: Vec<u32>,
    score:  f32,
}

/// Run beam search and return the generated tokens of the best
/// hypothesis (decoder-start removed, trailing EOS kept if produced).
pub fn beam_search<S: StepScorer + ?Sized>(scorer: &mut S, cfg: &BeamConfig) -> Result<Vec<u32>> {
    let num_beams = cfg.num_beams.max(1);
    let mut beams = vec![Beam { tokens: vec![cfg.decoder_start_id], score: 0.0 }];
    let mut finished: Vec<Finished> = Vec::new();

    for _ in 0..cfg.max_new_tokens {
        let prefixes: Vec<Vec<u32>> = beams.iter().map(|b| b.tokens.clone()).collect();
        let rows = scorer.log_probs(&prefixes)?;
        anyhow::ensure!(
            rows.len() == beams.len(),
            "scorer returned {} rows for {} beams",
            rows.len(),
            beams.len()
        );

        // ── Collect candidate extensions ──────────────────────────────────────
        let mut candidates: Vec<(f32, usize, u32)> = Vec::new();
        for (b, (beam, row)) in beams.iter().zip(rows.iter()).enumerate() {
            let banned = banned_ngram_tokens(&beam.tokens, cfg.no_repeat_ngram_size);
            for (token, &lp) in row.iter().enumerate() {
                let token = token as u32;
                if !lp.is_finite() || banned.contains(&token) {
                    continue;
                }
                candidates.push((beam.score + lp, b, token));
            }
        }
        if candidates.is_empty() {
            break;
        }

        let keep = (2 * num_beams).min(candidates.len());
        candidates.select_nth_unstable_by(keep - 1, |a, b| descending(a.0, b.0));
        candidates.truncate(keep);
        candidates.sort_by(|a, b| descending(a.0, b.0));

        // ── Split into finished hypotheses and next live beams ────────────────
        let mut next = Vec::with_capacity(num_beams);
        for (rank, (score, b, token)) in candidates.into_iter().enumerate() {
            let mut tokens = beams[b].tokens.clone();
            tokens.push(token);

            if token == cfg.eos_token_id {
                if rank < num_beams {
                    finished.push(Finished {
                        score: normalise(score, tokens.len() - 1, cfg.length_penalty),
                        tokens,
                    });
                }
                continue;
            }

            next.push(Beam { tokens, score });
            if next.len() == num_beams {
                break;
            }
        }

        if (cfg.early_stopping && finished.len() >= num_beams) || next.is_empty() {
            beams.clear();
            break;
        }
        beams = next;
    }

    // ── Token budget exhausted: finalise live beams ───────────────────────────
    for beam in beams {
        let generated = beam.tokens.len() - 1;
        if generated == 0 {
            continue;
        }
        finished.push(Finished {
            score: normalise(beam.score, generated, cfg.length_penalty),
            tokens: beam.tokens,
        });
    }

    let best = finished
        .into_iter()
        .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal));

    Ok(best.map(|h| h.tokens[1..].to_vec()).unwrap_or_default())
}

/// Tokens that would complete an n-gram already present in `tokens`.
pub fn banned_ngram_tokens(tokens: &[u32], n: usize) -> Vec<u32> {
    if n == 0 || tokens.len() + 1 < n {
        return Vec::new();
    }
    let prefix = &tokens[tokens.len() + 1 - n..];
    tokens
        .windows(n)
        .filter(|w| &w[..n - 1] == prefix)
        .map(|w| w[n - 1])
        .collect()
}

fn normalise(score: f32, generated_len: usize, length_penalty: f32) -> f32 {
    score / (generated_len.max(1) as f32).powf(length_penalty)
}

fn descending(a: f32, b: f32) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}
