//! Heuristic scoring used when the text generator is unavailable.

use crate::core::{AnalysisSource, IntentAnalysis, SentimentAnalysis, SentimentLabel};
use regex::Regex;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::LazyLock;

/// Local scoring functions behind the analysis stages.
pub trait ScoringStrategy: Send + Sync + Debug {
    /// Scores the sentiment of `text`.
    fn sentiment(&self, text: &str) -> SentimentAnalysis;

    /// Classifies the intent of `text`.
    fn intent(&self, text: &str) -> IntentAnalysis;

    /// Returns how relevant `content` is to `query`, in `[0, 1]`.
    fn relevance(&self, query: &str, content: &str) -> f64;

    /// Estimates rapport from `text`, in `[0, 1]`.
    fn rapport(&self, text: &str) -> f64;

    /// Estimates how worth remembering `text` is, in `[0, 1]`.
    fn importance(&self, text: &str) -> f64;
}

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "love", "like", "happy", "glad", "thanks", "thank", "awesome", "excellent",
    "nice", "wonderful", "enjoy", "amazing", "helpful",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "hate", "sad", "angry", "terrible", "awful", "annoyed", "upset", "wrong", "broken",
    "worst", "frustrated", "disappointed", "useless", "horrible",
];

const POLITE_WORDS: &[&str] = &["please", "thanks", "thank", "sorry", "appreciate", "kind"];

/// Confidence assigned to each intent pattern.
const GREETING_CONFIDENCE: f64 = 0.9;
const QUESTION_CONFIDENCE: f64 = 0.8;
const REQUEST_CONFIDENCE: f64 = 0.7;
const STATEMENT_CONFIDENCE: f64 = 0.4;

/// Rapport starts neutral; each polite word and the sentiment score move it.
const BASE_RAPPORT: f64 = 0.5;
const POLITE_WORD_WEIGHT: f64 = 0.1;
const SENTIMENT_RAPPORT_WEIGHT: f64 = 0.2;

/// Importance grows with message length until this many words.
const IMPORTANCE_SATURATION_WORDS: f64 = 40.0;
const BASE_IMPORTANCE: f64 = 0.3;
const PERSONAL_IMPORTANCE_BONUS: f64 = 0.2;

/// Words shorter than this are ignored when matching.
const MIN_TERM_LEN: usize = 3;

static WORD_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[\p{L}\p{N}']+").ok());
static GREETING_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(hi|hello|hey|good (morning|afternoon|evening))\b").ok());
static QUESTION_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(\?\s*$|^\s*(who|what|when|where|why|how|which|is|are|can|do|does)\b)").ok()
});
static REQUEST_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(please|could you|can you|would you|i need|help me)\b").ok());
static PERSONAL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(i am|i'm|my|i like|i love|i prefer|remember)\b").ok());

fn matches(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(text))
}

/// Splits `text` into lowercase words.
pub(crate) fn words(text: &str) -> Vec<String> {
    WORD_RE.as_ref().map_or_else(
        || text.split_whitespace().map(str::to_lowercase).collect(),
        |re| re.find_iter(text).map(|m| m.as_str().to_lowercase()).collect(),
    )
}

fn count_in(words: &[String], list: &[&str]) -> usize {
    words.iter().filter(|w| list.contains(&w.as_str())).count()
}

/// Word-list and regex based scoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScoring;

impl HeuristicScoring {
    /// Creates the strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ScoringStrategy for HeuristicScoring {
    fn sentiment(&self, text: &str) -> SentimentAnalysis {
        let words = words(text);
        let positive = count_in(&words, POSITIVE_WORDS);
        let negative = count_in(&words, NEGATIVE_WORDS);
        let total = positive + negative;
        #[allow(clippy::cast_precision_loss)]
        let score = if total == 0 {
            0.0
        } else {
            (positive as f64 - negative as f64) / total as f64
        };
        SentimentAnalysis {
            label: SentimentLabel::from_score(score),
            score,
            source: AnalysisSource::Heuristic,
        }
    }

    fn intent(&self, text: &str) -> IntentAnalysis {
        let (intent, confidence) = if matches(&GREETING_RE, text) {
            ("greeting", GREETING_CONFIDENCE)
        } else if matches(&QUESTION_RE, text) {
            ("question", QUESTION_CONFIDENCE)
        } else if matches(&REQUEST_RE, text) {
            ("request", REQUEST_CONFIDENCE)
        } else {
            ("statement", STATEMENT_CONFIDENCE)
        };
        IntentAnalysis {
            intent: intent.to_string(),
            confidence,
            source: AnalysisSource::Heuristic,
        }
    }

    fn relevance(&self, query: &str, content: &str) -> f64 {
        let terms: HashSet<String> = words(query)
            .into_iter()
            .filter(|w| w.len() >= MIN_TERM_LEN)
            .collect();
        if terms.is_empty() {
            return 0.0;
        }
        let content_words: HashSet<String> = words(content).into_iter().collect();
        let hits = terms.iter().filter(|t| content_words.contains(*t)).count();
        #[allow(clippy::cast_precision_loss)]
        let relevance = hits as f64 / terms.len() as f64;
        relevance
    }

    fn rapport(&self, text: &str) -> f64 {
        let words = words(text);
        #[allow(clippy::cast_precision_loss)]
        let polite = count_in(&words, POLITE_WORDS) as f64;
        let sentiment = self.sentiment(text).score;
        (BASE_RAPPORT + POLITE_WORD_WEIGHT * polite + SENTIMENT_RAPPORT_WEIGHT * sentiment)
            .clamp(0.0, 1.0)
    }

    fn importance(&self, text: &str) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let length = (words(text).len() as f64 / IMPORTANCE_SATURATION_WORDS).min(1.0);
        let personal = if matches(&PERSONAL_RE, text) {
            PERSONAL_IMPORTANCE_BONUS
        } else {
            0.0
        };
        (BASE_IMPORTANCE + (1.0 - BASE_IMPORTANCE - PERSONAL_IMPORTANCE_BONUS) * length + personal)
            .clamp(0.0, 1.0)
    }
}
