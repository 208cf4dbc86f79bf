//! Built-in valence-lexicon sentiment scorer.
//!
//! A compact rule-based scorer: per-token valence lookup with negation
//! flipping and intensity boosting, folded into proportional
//! negative/neutral/positive masses and a normalized compound scalar.

use std::collections::HashMap;

use super::{ScoreError, SentimentScore, SentimentScorer};

/// Normalization constant for the compound score: `s / sqrt(s^2 + ALPHA)`.
const ALPHA: f64 = 15.0;

/// Scalar applied to a valence preceded by a negation.
const NEGATION_SCALAR: f64 = -0.74;

/// Valence increment contributed by an intensity booster.
const BOOSTER_INCR: f64 = 0.293;

/// Dampening applied to a booster two tokens away.
const SECOND_PRECEDING_DAMP: f64 = 0.95;

const VALENCES: &[(&str, f64)] = &[
    // positive
    ("amazing", 2.8),
    ("awesome", 3.1),
    ("beautiful", 2.9),
    ("best", 3.2),
    ("better", 1.9),
    ("brilliant", 2.8),
    ("clean", 1.7),
    ("clear", 1.6),
    ("cool", 1.3),
    ("delighted", 2.9),
    ("easy", 1.9),
    ("elegant", 2.1),
    ("enjoy", 2.2),
    ("enjoyed", 2.3),
    ("excellent", 2.7),
    ("excited", 2.4),
    ("fantastic", 2.6),
    ("favorite", 2.0),
    ("fun", 2.3),
    ("glad", 2.0),
    ("good", 1.9),
    ("great", 3.1),
    ("happy", 2.7),
    ("helpful", 1.8),
    ("impressed", 2.2),
    ("impressive", 2.3),
    ("improved", 1.9),
    ("improvement", 1.5),
    ("interesting", 1.7),
    ("like", 1.5),
    ("liked", 1.6),
    ("love", 3.2),
    ("loved", 2.9),
    ("nice", 1.8),
    ("perfect", 2.7),
    ("pleasant", 2.3),
    ("pleased", 2.1),
    ("powerful", 1.6),
    ("recommend", 1.6),
    ("reliable", 1.9),
    ("simple", 1.2),
    ("smooth", 1.5),
    ("solid", 1.5),
    ("stable", 1.3),
    ("succeeded", 2.2),
    ("success", 2.7),
    ("thanks", 1.9),
    ("useful", 1.9),
    ("win", 2.8),
    ("wonderful", 2.7),
    ("works", 1.4),
    ("worth", 1.3),
    // negative
    ("angry", -2.3),
    ("annoying", -1.9),
    ("awful", -2.0),
    ("bad", -2.5),
    ("broken", -1.6),
    ("confusing", -1.3),
    ("crash", -1.8),
    ("crashes", -1.9),
    ("difficult", -1.5),
    ("disappointed", -2.1),
    ("disappointing", -2.2),
    ("dislike", -1.6),
    ("fail", -2.5),
    ("failed", -2.3),
    ("fails", -2.1),
    ("failure", -2.4),
    ("frustrated", -2.2),
    ("frustrating", -2.1),
    ("hard", -0.4),
    ("hate", -2.7),
    ("hated", -2.6),
    ("horrible", -2.5),
    ("hurt", -2.0),
    ("lose", -1.9),
    ("lost", -1.3),
    ("mess", -1.6),
    ("miss", -1.0),
    ("missing", -1.2),
    ("painful", -2.2),
    ("poor", -2.1),
    ("problem", -1.7),
    ("problems", -1.7),
    ("sad", -2.1),
    ("terrible", -2.1),
    ("ugly", -2.0),
    ("unhappy", -1.9),
    ("unreliable", -1.9),
    ("unstable", -1.5),
    ("useless", -1.8),
    ("weird", -0.7),
    ("worse", -2.1),
    ("worst", -3.1),
    ("wrong", -2.1),
];

const NEGATIONS: &[&str] = &[
    "aint", "cannot", "cant", "didnt", "doesnt", "dont", "isnt", "neither", "never", "no", "nor",
    "not", "shouldnt", "wasnt", "without", "wont", "wouldnt",
];

const BOOSTERS: &[&str] = &[
    "absolutely",
    "completely",
    "extremely",
    "highly",
    "incredibly",
    "really",
    "remarkably",
    "so",
    "totally",
    "truly",
    "very",
];

/// Deterministic valence-lexicon scorer.
pub struct LexiconScorer {
    valences: HashMap<&'static str, f64>,
}

impl LexiconScorer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            valences: VALENCES.iter().copied().collect(),
        }
    }

    fn polarity(&self, text: &str) -> SentimentScore {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return SentimentScore::NEUTRAL;
        }

        let mut sentiments = Vec::with_capacity(tokens.len());
        for (i, token) in tokens.iter().enumerate() {
            let Some(&valence) = self.valences.get(token.as_str()) else {
                sentiments.push(0.0);
                continue;
            };
            sentiments.push(contextual_valence(valence, &tokens, i));
        }

        aggregate(&sentiments)
    }
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> Result<SentimentScore, ScoreError> {
        Ok(self.polarity(text))
    }

    fn version(&self) -> &str {
        "lexicon/1"
    }
}

/// Adjust a token's valence based on the two preceding tokens.
fn contextual_valence(valence: f64, tokens: &[String], index: usize) -> f64 {
    let mut v = valence;
    for back in 1..=2 {
        let Some(prev_index) = index.checked_sub(back) else {
            break;
        };
        let prev = tokens[prev_index].as_str();
        if NEGATIONS.contains(&prev) {
            v *= NEGATION_SCALAR;
        } else if BOOSTERS.contains(&prev) {
            let damp = if back == 2 { SECOND_PRECEDING_DAMP } else { 1.0 };
            v += v.signum() * BOOSTER_INCR * damp;
        }
    }
    v
}

/// Fold per-token valences into the final 4-tuple.
fn aggregate(sentiments: &[f64]) -> SentimentScore {
    let sum: f64 = sentiments.iter().sum();
    let compound = (sum / (sum * sum + ALPHA).sqrt()).clamp(-1.0, 1.0);

    let mut pos_sum = 0.0;
    let mut neg_sum = 0.0;
    let mut neu_count = 0.0;
    for &s in sentiments {
        if s > 0.0 {
            pos_sum += s + 1.0;
        } else if s < 0.0 {
            neg_sum += s - 1.0;
        } else {
            neu_count += 1.0;
        }
    }

    let total = pos_sum + neg_sum.abs() + neu_count;
    if total <= f64::EPSILON {
        return SentimentScore::NEUTRAL;
    }

    SentimentScore {
        neg: round3(neg_sum.abs() / total),
        neu: round3(neu_count / total),
        pos: round3(pos_sum / total),
        compound: round4(compound),
    }
}

/// Lowercase, strip apostrophes (so contractions fold onto their negation
/// form), split on non-alphanumeric boundaries, and drop single characters.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace(['\'', '\u{2019}'], "")
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
        .map(ToString::to_string)
        .collect()
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

fn round4(x: f64) -> f64 {
    (x * 10000.0).round() / 10000.0
}
