//! Question bank view used by the engine.
//!
//! The bank fixes the canonical item order: ordinals in mock exams and
//! imported answer strings are 1-based positions in this order.

use crate::error::BankError;
use crate::types::Item;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Deserialize)]
struct BankFile {
    #[serde(default)]
    questions: Vec<Item>,
}

/// Immutable, indexed list of items.
#[derive(Debug, Clone, Default)]
pub struct ItemBank {
    items: Vec<Item>,
    index: HashMap<String, usize>,
}

impl ItemBank {
    pub fn new(items: Vec<Item>) -> Result<Self, BankError> {
        let mut index = HashMap::with_capacity(items.len());
        for (pos, item) in items.iter().enumerate() {
            if index.insert(item.id.clone(), pos).is_some() {
                return Err(BankError::DuplicateId(item.id.clone()));
            }
        }
        Ok(Self { items, index })
    }

    /// Parse a `{"questions": [...]}` bank document.
    pub fn from_json(content: &str) -> Result<Self, BankError> {
        let file: BankFile = serde_json::from_str(content)?;
        Self::new(file.questions)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.index.get(id).map(|&pos| &self.items[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Item at a 1-based ordinal.
    pub fn by_ordinal(&self, ordinal: usize) -> Option<&Item> {
        ordinal.checked_sub(1).and_then(|pos| self.items.get(pos))
    }

    /// 1-based ordinal of an item.
    pub fn ordinal(&self, id: &str) -> Option<usize> {
        self.index.get(id).map(|pos| pos + 1)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Topic -> tag -> item count. Items without a topic are grouped under "other".
    pub fn tags_by_topic(&self) -> BTreeMap<String, BTreeMap<String, usize>> {
        let mut topics: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
        for item in &self.items {
            let topic = item.topic.clone().unwrap_or_else(|| "other".to_string());
            *topics
                .entry(topic)
                .or_default()
                .entry(item.tag.clone())
                .or_insert(0) += 1;
        }
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANK: &str = r#"{
        "version": 2,
        "questions": [
            {"id": "n-001", "answer": ["A"], "tag": "brainstem", "topic": "anatomy"},
            {"id": "n-002", "answer": ["B", "D"], "tag": "cranial nerves", "topic": "anatomy", "concepts": ["brainstem"]},
            {"id": "n-003", "answer": ["E"], "tag": "basal ganglia"}
        ]
    }"#;

    #[test]
    fn parse_bank_preserves_order() {
        let bank = ItemBank::from_json(BANK).unwrap();
        assert_eq!(bank.len(), 3);
        assert_eq!(bank.ordinal("n-002"), Some(2));
        assert_eq!(bank.by_ordinal(3).map(|i| i.id.as_str()), Some("n-003"));
        assert!(bank.by_ordinal(0).is_none());
    }

    #[test]
    fn reject_duplicate_ids() {
        let json = r#"{"questions": [{"id": "x", "answer": ["A"]}, {"id": "x", "answer": ["B"]}]}"#;
        assert!(matches!(ItemBank::from_json(json), Err(BankError::DuplicateId(id)) if id == "x"));
    }

    #[test]
    fn tags_grouped_by_topic() {
        let bank = ItemBank::from_json(BANK).unwrap();
        let topics = bank.tags_by_topic();
        assert_eq!(topics["anatomy"].len(), 2);
        assert_eq!(topics["other"]["basal ganglia"], 1);
    }
}
