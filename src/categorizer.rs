use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use regex::Regex;
use tracing::debug;

use crate::error::{CashbookError, Result};
use crate::models::{TrainingExample, UNKNOWN_CATEGORY};

const TOKEN_PATTERN: &str = r"[a-z0-9]+";

#[derive(Debug, Default)]
struct CategoryStats {
    counts: HashMap<String, u32>,
    total: u32,
}

/// Bag-of-words classifier over transaction descriptions.
///
/// A model is immutable once built; retraining means building a new one.
#[derive(Debug)]
pub struct Model {
    categories: BTreeMap<String, CategoryStats>,
    tokenizer: Regex,
}

fn tokenize(tokenizer: &Regex, text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    tokenizer
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|t| t.len() >= 2 && !t.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

impl Model {
    pub fn empty() -> Result<Self> {
        Self::build(&[])
    }

    /// Build from labeled history. When a description was labeled more than
    /// once the last label wins; `Unknown` labels teach nothing and are skipped.
    pub fn build(examples: &[TrainingExample]) -> Result<Self> {
        let tokenizer =
            Regex::new(TOKEN_PATTERN).map_err(|e| CashbookError::Categorization(e.to_string()))?;

        let mut labeled: BTreeMap<&str, &str> = BTreeMap::new();
        for ex in examples {
            labeled.insert(ex.description.as_str(), ex.category.as_str());
        }

        let mut categories: BTreeMap<String, CategoryStats> = BTreeMap::new();
        for (description, category) in labeled {
            if category == UNKNOWN_CATEGORY {
                continue;
            }
            let stats = categories.entry(category.to_string()).or_default();
            for token in tokenize(&tokenizer, description) {
                *stats.counts.entry(token).or_default() += 1;
                stats.total += 1;
            }
        }
        categories.retain(|_, stats| stats.total > 0);

        Ok(Self {
            categories,
            tokenizer,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    /// Highest-scoring category, or `None` when nothing in the description
    /// was ever seen in training. Equal scores go to the alphabetically first
    /// category.
    pub fn infer(&self, description: &str) -> Option<String> {
        let tokens: BTreeSet<String> = tokenize(&self.tokenizer, description).into_iter().collect();
        let mut best: Option<(&str, f64)> = None;
        for (name, stats) in &self.categories {
            let score: f64 = tokens
                .iter()
                .map(|t| f64::from(stats.counts.get(t).copied().unwrap_or(0)) / f64::from(stats.total))
                .sum();
            if score > 0.0 && best.map_or(true, |(_, top)| score > top) {
                best = Some((name.as_str(), score));
            }
        }
        best.map(|(name, _)| name.to_string())
    }
}

/// Process-wide model handle. Readers get an `Arc` to a complete model;
/// `rebuild` swaps in a new one only after it is fully built.
#[derive(Debug)]
pub struct SharedModel {
    current: RwLock<Arc<Model>>,
}

impl SharedModel {
    pub fn new() -> Result<Self> {
        Ok(Self {
            current: RwLock::new(Arc::new(Model::empty()?)),
        })
    }

    pub fn current(&self) -> Result<Arc<Model>> {
        let guard = self
            .current
            .read()
            .map_err(|_| CashbookError::Categorization("model lock poisoned".to_string()))?;
        Ok(Arc::clone(&guard))
    }

    pub fn rebuild(&self, examples: &[TrainingExample]) -> Result<()> {
        let model = Arc::new(Model::build(examples)?);
        let mut guard = self
            .current
            .write()
            .map_err(|_| CashbookError::Categorization("model lock poisoned".to_string()))?;
        *guard = Arc::clone(&model);
        debug!(
            examples = examples.len(),
            categories = model.category_count(),
            "rebuilt categorizer model"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(description: &str, category: &str) -> TrainingExample {
        TrainingExample {
            description: description.to_string(),
            category: category.to_string(),
        }
    }

    #[test]
    fn test_infers_from_shared_tokens() {
        let model = Model::build(&[
            example("Mortgage payment", "Home"),
            example("Starbucks run", "Food"),
        ])
        .unwrap();
        assert_eq!(model.infer("Starbucks Coffee").as_deref(), Some("Food"));
        assert_eq!(model.infer("MORTGAGE PMT 0042").as_deref(), Some("Home"));
    }

    #[test]
    fn test_empty_model_has_no_signal() {
        let model = Model::empty().unwrap();
        assert!(model.is_empty());
        assert_eq!(model.infer("Starbucks Coffee"), None);
    }

    #[test]
    fn test_unseen_tokens_have_no_signal() {
        let model = Model::build(&[example("Starbucks run", "Food")]).unwrap();
        assert_eq!(model.infer("Shell Oil 5512"), None);
        assert_eq!(model.infer(""), None);
    }

    #[test]
    fn test_ties_break_alphabetically() {
        let model = Model::build(&[
            example("AMAZON MKTPLACE", "Shopping"),
            example("AMAZON FRESH", "Groceries"),
        ])
        .unwrap();
        // "amazon" scores 0.5 in both categories
        for _ in 0..5 {
            assert_eq!(model.infer("AMAZON").as_deref(), Some("Groceries"));
        }
    }

    #[test]
    fn test_frequency_outweighs_single_hit() {
        let model = Model::build(&[
            example("SHELL OIL", "Transportation"),
            example("SHELL GAS STATION", "Transportation"),
            example("SHELL GIFT SHOP", "Shopping"),
            example("TARGET", "Shopping"),
            example("TARGET STORE", "Shopping"),
        ])
        .unwrap();
        assert_eq!(model.infer("SHELL 12").as_deref(), Some("Transportation"));
    }

    #[test]
    fn test_last_label_for_description_wins() {
        let model = Model::build(&[
            example("VENMO PAYMENT", "Food"),
            example("VENMO PAYMENT", "Transfer"),
        ])
        .unwrap();
        assert_eq!(model.infer("VENMO").as_deref(), Some("Transfer"));
        assert_eq!(model.category_count(), 1);
    }

    #[test]
    fn test_unknown_labels_are_not_learned() {
        let model = Model::build(&[example("MYSTERY CHARGE", UNKNOWN_CATEGORY)]).unwrap();
        assert!(model.is_empty());
        assert_eq!(model.infer("MYSTERY CHARGE"), None);
    }

    #[test]
    fn test_numbers_and_single_letters_are_ignored() {
        let model = Model::build(&[example("POS 1234 X", "Food")]).unwrap();
        assert_eq!(model.infer("1234"), None);
        assert_eq!(model.infer("X"), None);
        assert_eq!(model.infer("pos").as_deref(), Some("Food"));
    }

    #[test]
    fn test_shared_model_swap_keeps_old_readers_whole() {
        let shared = SharedModel::new().unwrap();
        let before = shared.current().unwrap();
        assert!(before.is_empty());

        shared.rebuild(&[example("Starbucks run", "Food")]).unwrap();
        let after = shared.current().unwrap();

        assert_eq!(before.infer("Starbucks"), None);
        assert_eq!(after.infer("Starbucks").as_deref(), Some("Food"));
    }

    #[test]
    fn test_concurrent_readers_see_complete_models() {
        let shared = Arc::new(SharedModel::new().unwrap());
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let model = shared.current().unwrap();
                        let got = model.infer("Starbucks Coffee");
                        assert!(got.is_none() || got.as_deref() == Some("Food"));
                    }
                })
            })
            .collect();
        for _ in 0..50 {
            shared
                .rebuild(&[example("Starbucks run", "Food"), example("Mortgage", "Home")])
                .unwrap();
        }
        for r in readers {
            r.join().unwrap();
        }
    }
}
