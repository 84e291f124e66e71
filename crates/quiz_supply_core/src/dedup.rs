//! crates/quiz_supply_core/src/dedup.rs
//!
//! Duplicate and near-duplicate detection for generated questions.
//!
//! Checks run cheapest first and short-circuit:
//! 1. exact text after normalization
//! 2. category classification (math / factual / definition / concept)
//! 3. structural pattern comparison for math questions
//! 4. answer-set overlap
//! 5. semantic similarity against a per-category threshold
//!
//! Steps 1 to 4 need nothing but the two questions. Step 5 needs a similarity score
//! from an external collaborator; callers should only fetch one when
//! [`Deduplicator::structural_verdict`] is inconclusive.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::domain::{QuestionCandidate, QuestionContent};

//=========================================================================================
// Normalization
//=========================================================================================

/// Lowercases, folds accented letters to ASCII, collapses whitespace and strips
/// trailing punctuation.
pub fn normalize(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        fold_into(c, &mut folded);
    }
    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || matches!(c, '？' | '。' | '！' | '…'))
        .trim_end()
        .to_string()
}

/// Folds one lowercase Latin-1 or Latin Extended-A letter to its ASCII base.
/// Combining marks (left behind by lowercasing `İ`, or by decomposed input) are dropped.
fn fold_into(c: char, out: &mut String) {
    let base = match c {
        '\u{0300}'..='\u{036f}' => return,
        'ß' => {
            out.push_str("ss");
            return;
        }
        'æ' => {
            out.push_str("ae");
            return;
        }
        'œ' => {
            out.push_str("oe");
            return;
        }
        'þ' => {
            out.push_str("th");
            return;
        }
        'ĳ' => {
            out.push_str("ij");
            return;
        }
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => 'c',
        'ð' | 'ď' | 'đ' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => 'g',
        'ĥ' | 'ħ' => 'h',
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => 'i',
        'ĵ' => 'j',
        'ķ' | 'ĸ' => 'k',
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => 'l',
        'ñ' | 'ń' | 'ņ' | 'ň' | 'ŉ' | 'ŋ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => 'o',
        'ŕ' | 'ŗ' | 'ř' => 'r',
        'ś' | 'ŝ' | 'ş' | 'š' | 'ſ' => 's',
        'ţ' | 'ť' | 'ŧ' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => 'u',
        'ŵ' => 'w',
        'ý' | 'ÿ' | 'ŷ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        other => other,
    };
    out.push(base);
}

//=========================================================================================
// Classification
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionCategory {
    Math,
    Factual,
    Definition,
    Concept,
}

struct Patterns {
    math: Regex,
    factual: Regex,
    definition: Regex,
    number: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        math: Regex::new(
            r"\d\s*[-+*/×÷^=]\s*\d|√|\b(compute|calculate|evaluate|solve|root|sqrt|derivative|integral)\b",
        )
        .unwrap(),
        factual: Regex::new(r"\b(1\d{3}|20\d{2})\b|\b(when|who|where)\b").unwrap(),
        definition: Regex::new(r"\bwhat (is|are)\b|\bdefinition\b|\bdefine\b").unwrap(),
        number: Regex::new(r"\d+(?:[.,]\d+)?").unwrap(),
    })
}

/// Classifies an already-normalized question text.
pub fn classify(normalized: &str) -> QuestionCategory {
    let p = patterns();
    if p.math.is_match(normalized) {
        QuestionCategory::Math
    } else if p.factual.is_match(normalized) {
        QuestionCategory::Factual
    } else if p.definition.is_match(normalized) {
        QuestionCategory::Definition
    } else {
        QuestionCategory::Concept
    }
}

/// The expression shape of a math question (numeric literals replaced by `<n>`)
/// together with the literals in order of appearance.
pub fn math_pattern(normalized: &str) -> (String, Vec<String>) {
    let p = patterns();
    let operands = p
        .number
        .find_iter(normalized)
        .map(|m| m.as_str().to_string())
        .collect();
    let shape = p.number.replace_all(normalized, "<n>");
    let shape = shape.split_whitespace().collect::<String>();
    (shape, operands)
}

/// Jaccard similarity of the two normalized answer sets.
pub fn answer_overlap(a: &[String], b: &[String]) -> f64 {
    let a: HashSet<String> = a.iter().map(|s| normalize(s)).collect();
    let b: HashSet<String> = b.iter().map(|s| normalize(s)).collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

//=========================================================================================
// Verdicts
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DuplicateReason {
    ExactText,
    AnswerOverlap,
    Semantic(QuestionCategory),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DedupVerdict {
    Unique,
    Duplicate { reason: DuplicateReason, score: f64 },
}

impl DedupVerdict {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DedupVerdict::Duplicate { .. })
    }
}

/// The text and four options of one side of a comparison.
#[derive(Debug, Clone)]
pub struct DedupSubject {
    pub text: String,
    pub options: Vec<String>,
}

impl DedupSubject {
    pub fn new(text: impl Into<String>, options: Vec<String>) -> Self {
        Self { text: text.into(), options }
    }
}

impl From<&QuestionCandidate> for DedupSubject {
    fn from(c: &QuestionCandidate) -> Self {
        let options = std::iter::once(c.correct_answer.clone())
            .chain(c.wrong_answers.iter().cloned())
            .collect();
        Self::new(c.text.clone(), options)
    }
}

impl From<&QuestionContent> for DedupSubject {
    fn from(c: &QuestionContent) -> Self {
        Self::new(c.text.clone(), c.options())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DedupConfig {
    pub answer_overlap_threshold: f64,
    pub math_threshold: f64,
    pub factual_threshold: f64,
    pub concept_threshold: f64,
    pub definition_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            answer_overlap_threshold: 0.75,
            math_threshold: 0.97,
            factual_threshold: 0.93,
            concept_threshold: 0.92,
            definition_threshold: 0.90,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Deduplicator {
    config: DedupConfig,
}

impl Deduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    pub fn threshold_for(&self, category: QuestionCategory) -> f64 {
        match category {
            QuestionCategory::Math => self.config.math_threshold,
            QuestionCategory::Factual => self.config.factual_threshold,
            QuestionCategory::Concept => self.config.concept_threshold,
            QuestionCategory::Definition => self.config.definition_threshold,
        }
    }

    /// Runs the structural checks. `None` means only a semantic score can decide.
    pub fn structural_verdict(&self, new: &DedupSubject, existing: &DedupSubject) -> Option<DedupVerdict> {
        let a = normalize(&new.text);
        let b = normalize(&existing.text);
        if a == b {
            return Some(DedupVerdict::Duplicate {
                reason: DuplicateReason::ExactText,
                score: 1.0,
            });
        }

        if classify(&a) == QuestionCategory::Math && classify(&b) == QuestionCategory::Math {
            let (shape_a, operands_a) = math_pattern(&a);
            let (shape_b, operands_b) = math_pattern(&b);
            if shape_a != shape_b || operands_a != operands_b {
                return Some(DedupVerdict::Unique);
            }
        }

        let overlap = answer_overlap(&new.options, &existing.options);
        if overlap > self.config.answer_overlap_threshold {
            return Some(DedupVerdict::Duplicate {
                reason: DuplicateReason::AnswerOverlap,
                score: overlap,
            });
        }

        None
    }

    /// The full decision. Without a similarity score the semantic step is skipped.
    pub fn check(
        &self,
        new: &DedupSubject,
        existing: &DedupSubject,
        similarity: Option<f64>,
    ) -> DedupVerdict {
        if let Some(verdict) = self.structural_verdict(new, existing) {
            return verdict;
        }
        let Some(score) = similarity else {
            return DedupVerdict::Unique;
        };

        // Mixed categories are judged by the stricter threshold.
        let cat_new = classify(&normalize(&new.text));
        let cat_old = classify(&normalize(&existing.text));
        let category = if self.threshold_for(cat_new) >= self.threshold_for(cat_old) {
            cat_new
        } else {
            cat_old
        };
        if score > self.threshold_for(category) {
            DedupVerdict::Duplicate {
                reason: DuplicateReason::Semantic(category),
                score,
            }
        } else {
            DedupVerdict::Unique
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(text: &str, options: [&str; 4]) -> DedupSubject {
        DedupSubject::new(text, options.iter().map(|o| o.to_string()).collect())
    }

    #[test]
    fn normalize_folds_case_accents_whitespace_and_trailing_punctuation() {
        assert_eq!(normalize("  Türkiye'nin   BAŞKENTİ neresidir?! "), "turkiye'nin baskenti neresidir");
        assert_eq!(normalize("Où   est-il ?"), "ou est-il");
        assert_eq!(normalize("2 + 2"), "2 + 2");
    }

    #[test]
    fn uppercase_accented_letters_fold_like_their_lowercase_forms() {
        assert_eq!(normalize("ÁRBOL"), normalize("árbol"));
        assert_eq!(normalize("ÁRBOL"), "arbol");
        assert_eq!(normalize("ÑANDÚ"), "nandu");
        assert_eq!(normalize("ŽELVA Ó ŁÓDŹ"), "zelva o lodz");
        assert_eq!(normalize("STRAẞE"), normalize("straße"));
        assert_eq!(normalize("Ærø"), "aero");
        // Decomposed input: base letter followed by a combining acute accent.
        assert_eq!(normalize("A\u{301}rbol"), "arbol");
    }

    #[test]
    fn exact_text_check_ignores_accent_case() {
        let d = Deduplicator::default();
        let a = subject("¿Qué es un ÁRBOL?", ["Una planta", "Un animal", "Un mineral", "Un río"]);
        let b = subject("¿qué es un árbol", ["Planta leñosa", "Ave", "Roca", "Lago"]);
        assert!(matches!(
            d.check(&a, &b, None),
            DedupVerdict::Duplicate {
                reason: DuplicateReason::ExactText,
                ..
            }
        ));
    }

    #[test]
    fn classify_uses_text_heuristics() {
        assert_eq!(classify("what is 2 + 2"), QuestionCategory::Math);
        assert_eq!(classify("compute the square root of 81"), QuestionCategory::Math);
        assert_eq!(classify("in which year did the war end, 1918 or 1945"), QuestionCategory::Factual);
        assert_eq!(classify("who wrote hamlet"), QuestionCategory::Factual);
        assert_eq!(classify("what is photosynthesis"), QuestionCategory::Definition);
        assert_eq!(classify("why does ice float on water"), QuestionCategory::Concept);
    }

    #[test]
    fn identical_normalized_text_is_always_a_duplicate() {
        let d = Deduplicator::default();
        let a = subject("What is 2 + 2?", ["4", "3", "5", "6"]);
        let b = subject("what  is 2 + 2", ["four", "three", "five", "six"]);
        for similarity in [None, Some(0.0), Some(1.0)] {
            assert_eq!(
                d.check(&a, &b, similarity),
                DedupVerdict::Duplicate {
                    reason: DuplicateReason::ExactText,
                    score: 1.0
                }
            );
        }
    }

    #[test]
    fn math_questions_with_different_structure_are_never_duplicates() {
        let d = Deduplicator::default();
        let a = subject("What is 2 + 2?", ["4", "3", "5", "6"]);
        let b = subject("What is 7 * 8 - 1?", ["55", "56", "57", "54"]);
        assert_eq!(d.check(&a, &b, Some(0.99)), DedupVerdict::Unique);

        let c = subject("What is 7 + 8?", ["15", "14", "16", "13"]);
        assert_eq!(d.check(&a, &c, Some(0.99)), DedupVerdict::Unique);
    }

    #[test]
    fn matching_answer_sets_are_duplicates() {
        let d = Deduplicator::default();
        let a = subject("Which planet is largest?", ["Jupiter", "Mars", "Venus", "Earth"]);
        let b = subject("Name the biggest planet", ["earth", "venus", "mars", "jupiter"]);
        let verdict = d.check(&a, &b, None);
        assert!(matches!(
            verdict,
            DedupVerdict::Duplicate {
                reason: DuplicateReason::AnswerOverlap,
                ..
            }
        ));
    }

    #[test]
    fn semantic_step_uses_per_category_thresholds() {
        let d = Deduplicator::default();
        let a = subject("What is osmosis?", ["a", "b", "c", "d"]);
        let b = subject("What is the definition of osmosis?", ["e", "f", "g", "h"]);
        assert!(d.check(&a, &b, Some(0.91)).is_duplicate());
        assert!(!d.check(&a, &b, Some(0.89)).is_duplicate());

        let c = subject("Why do leaves change colour?", ["a", "b", "c", "d"]);
        let e = subject("Why do leaves turn red in autumn?", ["e", "f", "g", "h"]);
        assert!(!d.check(&c, &e, Some(0.91)).is_duplicate());
        assert!(d.check(&c, &e, Some(0.95)).is_duplicate());
    }

    #[test]
    fn missing_similarity_defaults_to_unique() {
        let d = Deduplicator::default();
        let a = subject("Why is the sky blue?", ["a", "b", "c", "d"]);
        let b = subject("Why does the sky look blue?", ["e", "f", "g", "h"]);
        assert_eq!(d.structural_verdict(&a, &b), None);
        assert_eq!(d.check(&a, &b, None), DedupVerdict::Unique);
    }
}
