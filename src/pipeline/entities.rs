//! Entity extraction (spec §4.C step 5).
//!
//! Regex-pattern matching over `title ⧺ content` for names, organizations, locations,
//! money amounts, percentages, dates and plausible ticker symbols. Tickers are gated by
//! a financial-context check so that ordinary all-caps acronyms don't get tagged.
//! Deduplicates by `(name_lower, type)` and keeps the top-N by confidence.

use std::collections::HashSet;

use regex::Regex;

use crate::models::{Entity, EntityType};

const MAX_ENTITIES: usize = 10;

pub struct EntityExtractor {
    person_org_pattern: Regex,
    org_suffix_pattern: Regex,
    location_pattern: Regex,
    money_pattern: Regex,
    percentage_pattern: Regex,
    date_pattern: Regex,
    ticker_pattern: Regex,
    financial_context: Regex,
    stopwords: HashSet<&'static str>,
}

impl EntityExtractor {
    pub fn new() -> Self {
        Self {
            // Two-or-more capitalized words in a row: "Acme Corp", "Jane Doe".
            person_org_pattern: Regex::new(r"\b([A-Z][a-zA-Z&.]*(?:\s+[A-Z][a-zA-Z&.]*){1,3})\b")
                .expect("valid regex"),
            org_suffix_pattern: Regex::new(
                r"\b([A-Z][\w&.]*(?:\s+[A-Z][\w&.]*)*\s+(?:Inc|Corp|Corporation|LLC|Ltd|Group|Holdings|Partners|Co)\.?)\b",
            )
            .expect("valid regex"),
            location_pattern: Regex::new(
                r"(?i)\bin\s+([A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+)?)\b",
            )
            .expect("valid regex"),
            money_pattern: Regex::new(
                r"\$\s?\d[\d,]*(?:\.\d+)?\s?(?:million|billion|trillion|[MBK])?",
            )
            .expect("valid regex"),
            percentage_pattern: Regex::new(r"\b\d+(?:\.\d+)?\s?%").expect("valid regex"),
            date_pattern: Regex::new(
                r"(?i)\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2}(?:,\s*\d{4})?\b",
            )
            .expect("valid regex"),
            // 1-5 uppercase letters, optionally preceded by '$' as in "$ACME".
            ticker_pattern: Regex::new(r"\$([A-Z]{1,5})\b|\b([A-Z]{2,5})\b").expect("valid regex"),
            financial_context: Regex::new(
                r"(?i)\b(shares|stock|trading|ticker|nasdaq|nyse|market cap|investors|earnings)\b",
            )
            .expect("valid regex"),
            stopwords: [
                "The", "This", "That", "These", "Those", "Their", "There", "When", "Where",
                "What", "Which", "While", "After", "Before", "According", "Sources", "Statement",
                "Today", "Yesterday", "CEO", "CFO", "IPO", "USA",
            ]
            .into_iter()
            .collect(),
        }
    }

    /// Extract and rank entities from combined title+content text.
    pub fn extract(&self, text: &str) -> Vec<Entity> {
        let mut found: Vec<Entity> = Vec::new();
        let mut seen: HashSet<(String, EntityType)> = HashSet::new();

        let has_financial_context = self.financial_context.is_match(text);

        self.push_matches(&mut found, &mut seen, &self.org_suffix_pattern, text, EntityType::Organization, 0.9);
        self.push_matches(&mut found, &mut seen, &self.money_pattern, text, EntityType::Money, 0.9);
        self.push_matches(&mut found, &mut seen, &self.percentage_pattern, text, EntityType::Percentage, 0.9);
        self.push_matches(&mut found, &mut seen, &self.date_pattern, text, EntityType::Date, 0.85);

        for capture in self.location_pattern.captures_iter(text) {
            if let Some(m) = capture.get(1) {
                self.try_push(&mut found, &mut seen, m.as_str(), EntityType::Location, 0.6);
            }
        }

        for capture in self.person_org_pattern.captures_iter(text) {
            if let Some(m) = capture.get(1) {
                let name = m.as_str();
                if self.is_stopword_only(name) {
                    continue;
                }
                self.try_push(&mut found, &mut seen, name, EntityType::Person, 0.55);
            }
        }

        if has_financial_context {
            for capture in self.ticker_pattern.captures_iter(text) {
                let (symbol, confidence) = match (capture.get(1), capture.get(2)) {
                    (Some(m), _) => (m.as_str(), 0.85),
                    (None, Some(m)) => (m.as_str(), 0.6),
                    (None, None) => continue,
                };
                if self.stopwords.contains(symbol) {
                    continue;
                }
                self.try_push(&mut found, &mut seen, symbol, EntityType::Ticker, confidence);
            }
        }

        found.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        found.truncate(MAX_ENTITIES);
        found
    }

    fn push_matches(
        &self,
        out: &mut Vec<Entity>,
        seen: &mut HashSet<(String, EntityType)>,
        pattern: &Regex,
        text: &str,
        entity_type: EntityType,
        confidence: f64,
    ) {
        for m in pattern.find_iter(text) {
            self.try_push(out, seen, m.as_str(), entity_type, confidence);
        }
    }

    fn try_push(
        &self,
        out: &mut Vec<Entity>,
        seen: &mut HashSet<(String, EntityType)>,
        name: &str,
        entity_type: EntityType,
        confidence: f64,
    ) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        let key = (name.to_lowercase(), entity_type);
        if seen.contains(&key) {
            return;
        }
        seen.insert(key);
        out.push(Entity {
            name: name.to_string(),
            entity_type,
            confidence,
        });
    }

    fn is_stopword_only(&self, name: &str) -> bool {
        name.split_whitespace().all(|w| self.stopwords.contains(w)) || name.len() < 2
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_money_and_percentage_and_org() {
        let extractor = EntityExtractor::new();
        let text = "Acme Corp agreed to acquire Beta Inc for $2 billion, a 15% premium.";
        let entities = extractor.extract(text);

        assert!(entities.iter().any(|e| e.entity_type == EntityType::Money));
        assert!(entities.iter().any(|e| e.entity_type == EntityType::Percentage));
        assert!(entities
            .iter()
            .any(|e| e.entity_type == EntityType::Organization && e.name.contains("Acme")));
    }

    #[test]
    fn ticker_requires_financial_context() {
        let extractor = EntityExtractor::new();
        let with_context = extractor.extract("ACME shares rose after strong earnings on Nasdaq.");
        assert!(with_context.iter().any(|e| e.entity_type == EntityType::Ticker));

        let without_context = extractor.extract("ACME announced a new product line today.");
        assert!(!without_context.iter().any(|e| e.entity_type == EntityType::Ticker));
    }

    #[test]
    fn deduplicates_by_name_and_type() {
        let extractor = EntityExtractor::new();
        let text = "Acme Corp said Acme Corp would expand operations next year.";
        let entities = extractor.extract(text);
        let org_count = entities
            .iter()
            .filter(|e| e.entity_type == EntityType::Organization)
            .count();
        assert_eq!(org_count, 1);
    }

    #[test]
    fn empty_text_yields_no_entities() {
        let extractor = EntityExtractor::new();
        assert!(extractor.extract("").is_empty());
    }
}
