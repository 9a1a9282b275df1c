//! Attempt grading and imported mock-answer parsing.
//!
//! # Import formats
//! A fixed-length string, one answer per item in bank order:
//! ```text
//! ABCDE-ABCD...
//! ```
//! or numbered entries, separated by newlines, commas or semicolons:
//! ```text
//! 1 A, 2 C
//! 3: BD
//! 4 -
//! ```
//! `-`, `_` and `?` mark an unanswered item. Letters are case-insensitive and
//! whitespace is ignored.

use crate::bank::ItemBank;
use crate::error::{EngineError, ImportError};
use crate::types::{format_choices, ChoiceSet, Item};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

const PLACEHOLDERS: [char; 3] = ['-', '_', '?'];
const CHOICES: std::ops::RangeInclusive<char> = 'A'..='E';

/// Set equality between the canonical answer and the submitted choices.
pub fn grade(item: &Item, selected: &ChoiceSet) -> bool {
    item.answer == *selected
}

/// Per-item answers in bank order; `None` is unanswered.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnswerSheet {
    pub answers: Vec<Option<ChoiceSet>>,
}

impl AnswerSheet {
    pub fn unanswered(len: usize) -> Self {
        Self {
            answers: vec![None; len],
        }
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Literal answers as recorded in the attempt history.
    pub fn literal(&self) -> Vec<String> {
        self.answers
            .iter()
            .map(|a| a.as_ref().map(format_choices).unwrap_or_else(|| "-".to_string()))
            .collect()
    }
}

/// Score of one answer sheet against the bank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MockScore {
    pub correct: usize,
    pub total: usize,
    /// Every item not answered correctly, unanswered ones included.
    pub wrong_ordinals: Vec<usize>,
    pub unanswered_ordinals: Vec<usize>,
    pub tag_miss_counts: BTreeMap<String, u32>,
    /// Correctness per item in bank order.
    pub results: Vec<bool>,
}

impl MockScore {
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.correct as f64 / self.total as f64) * 100.0).round() as u32
    }
}

/// Score a sheet covering every item of the bank.
pub fn score_sheet(bank: &ItemBank, sheet: &AnswerSheet) -> Result<MockScore, EngineError> {
    if bank.is_empty() {
        return Err(EngineError::EmptyItemSet);
    }
    if sheet.len() != bank.len() {
        return Err(EngineError::SheetMismatch {
            expected: bank.len(),
            actual: sheet.len(),
        });
    }

    let mut score = MockScore {
        correct: 0,
        total: bank.len(),
        wrong_ordinals: Vec::new(),
        unanswered_ordinals: Vec::new(),
        tag_miss_counts: BTreeMap::new(),
        results: Vec::with_capacity(bank.len()),
    };

    for (idx, (item, answer)) in bank.items().iter().zip(&sheet.answers).enumerate() {
        let ordinal = idx + 1;
        let ok = answer.as_ref().map_or(false, |selected| grade(item, selected));
        score.results.push(ok);
        if ok {
            score.correct += 1;
            continue;
        }
        if answer.is_none() {
            score.unanswered_ordinals.push(ordinal);
        }
        score.wrong_ordinals.push(ordinal);
        *score.tag_miss_counts.entry(item.tag.clone()).or_insert(0) += 1;
    }

    Ok(score)
}

/// Parse imported answer text for a bank of `item_count` items.
///
/// All problems are collected; on any error no partial sheet is returned.
pub fn parse_answer_text(text: &str, item_count: usize) -> Result<AnswerSheet, Vec<ImportError>> {
    if item_count == 0 {
        return Err(vec![ImportError::NoItems]);
    }
    let text = text.trim();
    if text.is_empty() {
        return Err(vec![ImportError::Empty]);
    }

    if text.chars().any(|c| c.is_ascii_digit()) {
        parse_numbered(text, item_count)
    } else {
        parse_fixed(text, item_count)
    }
}

fn parse_fixed(text: &str, item_count: usize) -> Result<AnswerSheet, Vec<ImportError>> {
    let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    let mut errors = Vec::new();

    if chars.len() != item_count {
        errors.push(ImportError::LengthMismatch {
            expected: item_count,
            actual: chars.len(),
        });
    }

    let mut answers = Vec::with_capacity(chars.len());
    for (idx, &c) in chars.iter().enumerate() {
        let upper = c.to_ascii_uppercase();
        if PLACEHOLDERS.contains(&c) {
            answers.push(None);
        } else if CHOICES.contains(&upper) {
            answers.push(Some(ChoiceSet::from([upper])));
        } else {
            errors.push(ImportError::InvalidCharacter {
                position: idx + 1,
                found: c,
            });
        }
    }

    if errors.is_empty() {
        Ok(AnswerSheet { answers })
    } else {
        Err(errors)
    }
}

fn parse_numbered(text: &str, item_count: usize) -> Result<AnswerSheet, Vec<ImportError>> {
    let mut sheet = AnswerSheet::unanswered(item_count);
    let mut seen = HashSet::new();
    let mut errors = Vec::new();

    let entries = text
        .split(['\n', ',', ';'])
        .map(str::trim)
        .filter(|e| !e.is_empty());

    for entry in entries {
        let digits_end = entry
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(entry.len());
        if digits_end == 0 {
            errors.push(ImportError::UnparseableEntry {
                entry: entry.to_string(),
            });
            continue;
        }
        let (number, rest) = entry.split_at(digits_end);
        let answer = rest
            .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '.' | ')' | '='))
            .trim();

        let ordinal = match number.parse::<usize>() {
            Ok(n) if (1..=item_count).contains(&n) => n,
            _ => {
                errors.push(ImportError::OrdinalOutOfRange {
                    ordinal: number.to_string(),
                    max: item_count,
                });
                continue;
            }
        };
        if !seen.insert(ordinal) {
            errors.push(ImportError::DuplicateOrdinal { ordinal });
            continue;
        }
        if answer.is_empty() {
            errors.push(ImportError::UnparseableEntry {
                entry: entry.to_string(),
            });
            continue;
        }

        match parse_choice_token(answer) {
            Some(choice) => sheet.answers[ordinal - 1] = choice,
            None => errors.push(ImportError::InvalidAnswer {
                ordinal,
                answer: answer.to_string(),
            }),
        }
    }

    if errors.is_empty() {
        Ok(sheet)
    } else {
        Err(errors)
    }
}

/// `Some(None)` for a placeholder, `Some(Some(set))` for letters, `None` if invalid.
fn parse_choice_token(token: &str) -> Option<Option<ChoiceSet>> {
    let mut chars = token.chars().filter(|c| !c.is_whitespace()).peekable();
    let first = *chars.peek()?;
    if PLACEHOLDERS.contains(&first) {
        chars.next();
        return chars.next().is_none().then_some(None);
    }

    let mut set = ChoiceSet::new();
    for c in chars {
        let upper = c.to_ascii_uppercase();
        if !CHOICES.contains(&upper) {
            return None;
        }
        set.insert(upper);
    }
    Some(Some(set))
}
