//! Rule-based polarity scoring for short social-media text.
//!
//! Each token found in the lexicon contributes its score. A negation flips and
//! dampens the next scored token; an intensifier scales it. The text's
//! polarity is the mean of the contributions, clamped to [-1, 1].

use std::collections::HashMap;

use crate::traits::SentimentClassifier;

const NEGATION_FACTOR: f64 = -0.5;

const WORDS: &[(&str, f64)] = &[
    // positive
    ("love", 0.5),
    ("loved", 0.7),
    ("loving", 0.6),
    ("lovely", 0.5),
    ("like", 0.2),
    ("good", 0.7),
    ("great", 0.8),
    ("amazing", 0.6),
    ("awesome", 1.0),
    ("beautiful", 0.85),
    ("gorgeous", 0.7),
    ("stunning", 0.6),
    ("incredible", 0.9),
    ("perfect", 1.0),
    ("best", 1.0),
    ("nice", 0.6),
    ("cute", 0.5),
    ("cool", 0.35),
    ("fun", 0.3),
    ("funny", 0.25),
    ("happy", 0.8),
    ("glad", 0.5),
    ("excited", 0.4),
    ("wonderful", 1.0),
    ("fantastic", 0.4),
    ("brilliant", 0.9),
    ("excellent", 1.0),
    ("impressive", 1.0),
    ("inspiring", 0.5),
    ("fire", 0.4),
    ("goat", 0.5),
    ("legend", 0.4),
    ("wow", 0.1),
    ("yes", 0.2),
    ("thanks", 0.2),
    ("thank", 0.2),
    ("congrats", 0.6),
    ("congratulations", 0.6),
    ("proud", 0.8),
    ("delicious", 1.0),
    ("fresh", 0.3),
    ("favorite", 0.5),
    ("favourite", 0.5),
    ("recommend", 0.3),
    ("helpful", 0.5),
    ("blessed", 0.6),
    // negative
    ("bad", -0.7),
    ("worse", -0.4),
    ("worst", -1.0),
    ("awful", -1.0),
    ("terrible", -1.0),
    ("horrible", -1.0),
    ("hate", -0.8),
    ("hated", -0.9),
    ("ugly", -0.7),
    ("boring", -1.0),
    ("sad", -0.5),
    ("angry", -0.5),
    ("annoying", -0.8),
    ("disappointing", -0.6),
    ("disappointed", -0.75),
    ("disgusting", -1.0),
    ("stupid", -0.8),
    ("dumb", -0.4),
    ("fake", -0.5),
    ("scam", -0.9),
    ("trash", -0.8),
    ("cringe", -0.6),
    ("lame", -0.5),
    ("overrated", -0.5),
    ("poor", -0.4),
    ("wrong", -0.5),
    ("broken", -0.4),
    ("rude", -0.6),
    ("sucks", -0.6),
    ("waste", -0.6),
    ("useless", -0.5),
    ("unfollow", -0.5),
];

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "none", "nothing", "cannot", "cant", "can't", "dont", "don't",
    "doesnt", "doesn't", "didnt", "didn't", "isnt", "isn't", "wasnt", "wasn't", "arent",
    "aren't", "wont", "won't", "hardly", "barely",
];

const INTENSIFIERS: &[(&str, f64)] = &[
    ("very", 1.3),
    ("so", 1.3),
    ("really", 1.3),
    ("super", 1.4),
    ("extremely", 1.5),
    ("absolutely", 1.5),
    ("totally", 1.3),
    ("truly", 1.2),
    ("too", 1.2),
    ("pretty", 0.8),
    ("kinda", 0.7),
    ("slightly", 0.5),
    ("somewhat", 0.7),
];

const EMOJI: &[(char, f64)] = &[
    ('😍', 0.8),
    ('❤', 0.7),
    ('🥰', 0.8),
    ('😊', 0.6),
    ('😂', 0.4),
    ('🔥', 0.5),
    ('👏', 0.5),
    ('🙌', 0.5),
    ('👍', 0.4),
    ('💯', 0.5),
    ('😢', -0.5),
    ('😭', -0.4),
    ('😡', -0.8),
    ('🤮', -0.9),
    ('👎', -0.6),
    ('💩', -0.6),
];

/// Lexicon-based [`SentimentClassifier`].
pub struct LexiconClassifier {
    words: HashMap<&'static str, f64>,
    intensifiers: HashMap<&'static str, f64>,
    emoji: HashMap<char, f64>,
    score_emoji: bool,
}

impl Default for LexiconClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LexiconClassifier {
    pub fn new() -> Self {
        Self {
            words: WORDS.iter().copied().collect(),
            intensifiers: INTENSIFIERS.iter().copied().collect(),
            emoji: EMOJI.iter().copied().collect(),
            score_emoji: true,
        }
    }

    /// Score words only.
    pub fn without_emoji(mut self) -> Self {
        self.score_emoji = false;
        self
    }

    fn is_negation(token: &str) -> bool {
        NEGATIONS.contains(&token)
    }

    /// Per-token contributions after negation and intensifier handling.
    fn contributions(&self, text: &str) -> Vec<f64> {
        let mut scores = Vec::new();
        let mut negate = false;
        let mut multiplier = 1.0;

        for token in tokens(text) {
            if Self::is_negation(&token) {
                negate = true;
                continue;
            }
            if let Some(&m) = self.intensifiers.get(token.as_str()) {
                multiplier *= m;
                continue;
            }
            let Some(&base) = self.words.get(token.as_str()) else {
                continue;
            };

            let mut score = base * multiplier;
            if negate {
                score *= NEGATION_FACTOR;
            }
            scores.push(score);
            negate = false;
            multiplier = 1.0;
        }

        if self.score_emoji {
            scores.extend(text.chars().filter_map(|c| self.emoji.get(&c).copied()));
        }
        scores
    }
}

impl SentimentClassifier for LexiconClassifier {
    fn classify(&self, text: &str) -> f64 {
        let scores = self.contributions(text);
        if scores.is_empty() {
            return 0.0;
        }
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        mean.clamp(-1.0, 1.0)
    }
}

/// Lowercased word tokens. Apostrophes stay inside words.
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '’'))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase().replace('’', "'"))
}
