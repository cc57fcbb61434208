use crate::error::{NlqError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use strsim::normalized_levenshtein;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Scoring strategy used to pick the best stored value for a literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    /// Token-set similarity on normalized text (0-100).
    TokenSet,
    /// Case-insensitive equality only; no match keeps the input with score 0.
    Exact,
}

impl FromStr for ScorerKind {
    type Err = NlqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "token_set" | "token-set" | "tokenset" => Ok(ScorerKind::TokenSet),
            "exact" => Ok(ScorerKind::Exact),
            other => Err(NlqError::Config(format!(
                "unknown fuzzy scorer '{}' (expected token_set or exact)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub value: String,
    /// 0-100, higher is closer.
    pub score: f64,
}

/// Fuzzy matcher for filter literals against stored column values
#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    pub scorer: ScorerKind,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self {
            scorer: ScorerKind::TokenSet,
        }
    }
}

impl FuzzyMatcher {
    pub fn new(scorer: ScorerKind) -> Self {
        Self { scorer }
    }

    /// Normalize a string for fuzzy matching
    /// - Converts to lowercase
    /// - Folds accented Latin letters to their base letter
    /// - Replaces punctuation with spaces
    /// - Collapses whitespace
    pub fn normalize_string(&self, s: &str) -> String {
        let folded: String = s
            .to_lowercase()
            .chars()
            .map(fold_diacritic)
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();
        WHITESPACE.replace_all(folded.trim(), " ").to_string()
    }

    /// Token-set ratio between two strings, 0-100.
    ///
    /// Both sides are split into unique sorted tokens. When every token of one
    /// side appears in the other the score is 100; otherwise the best edit
    /// similarity among the shared-token and remainder combinations wins.
    pub fn token_set_ratio(&self, a: &str, b: &str) -> f64 {
        let norm_a = self.normalize_string(a);
        let norm_b = self.normalize_string(b);
        if norm_a.is_empty() || norm_b.is_empty() {
            return 0.0;
        }

        let tokens_a: BTreeSet<&str> = norm_a.split(' ').collect();
        let tokens_b: BTreeSet<&str> = norm_b.split(' ').collect();

        let shared = join(tokens_a.intersection(&tokens_b));
        let only_a = join(tokens_a.difference(&tokens_b));
        let only_b = join(tokens_b.difference(&tokens_a));

        if !shared.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
            return 100.0;
        }

        let combined_a = concat(&shared, &only_a);
        let combined_b = concat(&shared, &only_b);

        let mut best = ratio(&combined_a, &combined_b);
        if !shared.is_empty() {
            best = best.max(ratio(&shared, &combined_a)).max(ratio(&shared, &combined_b));
        }
        best
    }

    /// Best stored value for `input`.
    ///
    /// A candidate equal to the input is returned as-is. With no candidates
    /// the input comes back with a zero score.
    pub fn best_match(&self, input: &str, candidates: &[String]) -> MatchOutcome {
        if let Some(exact) = candidates.iter().find(|c| c.as_str() == input) {
            return MatchOutcome {
                value: exact.clone(),
                score: 100.0,
            };
        }

        match self.scorer {
            ScorerKind::Exact => {
                let wanted = input.trim().to_lowercase();
                candidates
                    .iter()
                    .find(|c| c.trim().to_lowercase() == wanted)
                    .map(|c| MatchOutcome {
                        value: c.clone(),
                        score: 100.0,
                    })
                    .unwrap_or_else(|| MatchOutcome {
                        value: input.to_string(),
                        score: 0.0,
                    })
            }
            ScorerKind::TokenSet => {
                let mut best = MatchOutcome {
                    value: input.to_string(),
                    score: 0.0,
                };
                let mut found = false;
                for candidate in candidates {
                    let score = self.token_set_ratio(input, candidate);
                    // Strictly greater keeps the first candidate on ties
                    if !found || score > best.score {
                        best = MatchOutcome {
                            value: candidate.clone(),
                            score,
                        };
                        found = true;
                    }
                }
                best
            }
        }
    }
}

fn join<'a, 'b: 'a>(tokens: impl Iterator<Item = &'a &'b str>) -> String {
    tokens.copied().collect::<Vec<_>>().join(" ")
}

fn concat(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (_, true) => head.to_string(),
        _ => format!("{} {}", head, tail),
    }
}

fn ratio(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b) * 100.0
}

fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}
