//! Similarity scoring (spec §4.D signal table).
//!
//! Each signal is bounded to [0,1] and never produces `NaN`: empty inputs score 0
//! rather than erroring. `content_sim` builds its TF-IDF vocabulary from the pairwise
//! corpus of the two documents being compared, not a global corpus.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::config::DedupConfig;
use crate::models::{Article, DetectionMethod, SimilarityBreakdown};
use crate::text::{bigrams, normalize, tokenize};

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "is", "are", "was", "were", "be", "been", "being",
    "to", "of", "in", "on", "for", "with", "at", "by", "from", "as", "it", "its", "this",
    "that", "has", "have", "had", "will", "would", "could", "should",
];

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Jaccard similarity over two string sets. 0 for two empty sets (no error).
fn jaccard<T: Eq + std::hash::Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Dice coefficient over character bigram sets, a cheap string-similarity complement
/// to token Jaccard that tolerates word-order shuffles and minor rewording. Expects
/// already-normalized input.
fn dice_bigram(normalized_a: &str, normalized_b: &str) -> f64 {
    let bigrams_a: HashSet<(char, char)> = bigrams(normalized_a).into_iter().collect();
    let bigrams_b: HashSet<(char, char)> = bigrams(normalized_b).into_iter().collect();
    if bigrams_a.is_empty() && bigrams_b.is_empty() {
        return if normalized_a == normalized_b { 1.0 } else { 0.0 };
    }
    let intersection = bigrams_a.intersection(&bigrams_b).count();
    let total = bigrams_a.len() + bigrams_b.len();
    if total == 0 {
        0.0
    } else {
        (2.0 * intersection as f64) / total as f64
    }
}

pub fn title_sim(title_a: &str, title_b: &str) -> f64 {
    let normalized_a = normalize(title_a);
    let normalized_b = normalize(title_b);
    let tokens_a: HashSet<&str> = tokenize(&normalized_a).into_iter().collect();
    let tokens_b: HashSet<&str> = tokenize(&normalized_b).into_iter().collect();
    let jaccard_score = jaccard(&tokens_a, &tokens_b);
    let dice_score = dice_bigram(&normalized_a, &normalized_b);
    (0.4 * jaccard_score + 0.6 * dice_score).clamp(0.0, 1.0)
}

/// TF-IDF cosine similarity over a two-document pairwise corpus.
pub fn content_sim(a: &str, b: &str, max_vocab: usize, max_tokens_per_doc: usize) -> f64 {
    let normalized_a = normalize(a);
    let normalized_b = normalize(b);
    let tokens_a: Vec<String> = tokenize(&normalized_a)
        .into_iter()
        .filter(|t| !is_stopword(t))
        .take(max_tokens_per_doc)
        .map(str::to_string)
        .collect();
    let tokens_b: Vec<String> = tokenize(&normalized_b)
        .into_iter()
        .filter(|t| !is_stopword(t))
        .take(max_tokens_per_doc)
        .map(str::to_string)
        .collect();

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let mut vocab: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for token in tokens_a.iter().chain(tokens_b.iter()) {
        if seen.len() >= max_vocab {
            break;
        }
        if seen.insert(token.as_str()) {
            vocab.push(token.clone());
        }
    }

    let tf = |tokens: &[String]| -> HashMap<&str, f64> {
        let mut counts: HashMap<&str, f64> = HashMap::new();
        for t in tokens {
            *counts.entry(t.as_str()).or_insert(0.0) += 1.0;
        }
        let total = tokens.len() as f64;
        for v in counts.values_mut() {
            *v /= total;
        }
        counts
    };

    let tf_a = tf(&tokens_a);
    let tf_b = tf(&tokens_b);

    // Two-document IDF: ln(2/df) + 1, df in {1,2}.
    let idf = |term: &str| -> f64 {
        let df = [&tf_a, &tf_b].iter().filter(|m| m.contains_key(term)).count();
        ((2.0 / df as f64).ln()) + 1.0
    };

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for term in &vocab {
        let weight_idf = idf(term);
        let weight_a = tf_a.get(term.as_str()).copied().unwrap_or(0.0) * weight_idf;
        let weight_b = tf_b.get(term.as_str()).copied().unwrap_or(0.0) * weight_idf;
        dot += weight_a * weight_b;
        norm_a += weight_a * weight_a;
        norm_b += weight_b * weight_b;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
    }
}

pub fn entity_sim(names_a: &[String], names_b: &[String]) -> f64 {
    let a: HashSet<String> = names_a.iter().map(|n| n.to_lowercase()).collect();
    let b: HashSet<String> = names_b.iter().map(|n| n.to_lowercase()).collect();
    jaccard(&a, &b)
}

pub fn temporal_prox(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    let delta_hours = (a - b).num_seconds().abs() as f64 / 3600.0;
    (1.0 - delta_hours / 24.0).max(0.0)
}

pub fn source_align(
    source_a: &str,
    source_b: &str,
    category_a: &str,
    category_b: &str,
    tags_a: &[String],
    tags_b: &[String],
) -> f64 {
    let same_source = if source_a == source_b { 1.0 } else { 0.0 };
    let same_category = if category_a == category_b { 1.0 } else { 0.0 };
    let tags_a_set: HashSet<&String> = tags_a.iter().collect();
    let tags_b_set: HashSet<&String> = tags_b.iter().collect();
    let tag_overlap = jaccard(&tags_a_set, &tags_b_set);

    0.4 * same_source + 0.3 * same_category + 0.3 * tag_overlap
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0) as f64
    }
}

/// Result of scoring one candidate article against the subject.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Article,
    pub breakdown: SimilarityBreakdown,
    pub overall: f64,
    pub method: DetectionMethod,
}

/// Score `subject` against `candidate`, combining signals per the configured weights.
/// `semantic_sim` is supplied by the caller (it may require an async embedding lookup).
pub fn score_candidate(
    subject: &Article,
    candidate: Article,
    semantic_sim: f64,
    config: &DedupConfig,
) -> ScoredCandidate {
    if subject.content_hash == candidate.content_hash {
        return ScoredCandidate {
            breakdown: SimilarityBreakdown {
                content_hash: 1.0,
                ..Default::default()
            },
            overall: 1.0,
            method: DetectionMethod::ContentHash,
            candidate,
        };
    }

    let title = title_sim(&subject.title, &candidate.title);

    let content = match (&subject.content, &candidate.content) {
        (Some(a), Some(b)) => content_sim(a, b, config.tfidf_max_vocab, config.tfidf_max_tokens_per_doc),
        _ => 0.0,
    };

    let subject_entities: Vec<String> = subject.entities.iter().map(|e| e.name.clone()).collect();
    let candidate_entities: Vec<String> = candidate.entities.iter().map(|e| e.name.clone()).collect();
    let entity = entity_sim(&subject_entities, &candidate_entities);

    let temporal = temporal_prox(subject.published_at, candidate.published_at);
    let source = source_align(
        &subject.source,
        &candidate.source,
        &subject.category,
        &candidate.category,
        &subject.tags,
        &candidate.tags,
    );

    let overall = config.weight_title * title
        + config.weight_content * content
        + config.weight_entity * entity
        + 0.30 * semantic_sim
        + 0.10 * temporal
        + 0.10 * source;
    let overall = overall.clamp(0.0, 1.0);

    let method = if title >= 0.9 {
        DetectionMethod::TitleSimilarity
    } else if semantic_sim >= 0.85 {
        DetectionMethod::SemanticSimilarity
    } else if entity >= 0.8 {
        DetectionMethod::EntitySimilarity
    } else {
        DetectionMethod::ContentSimilarity
    };

    ScoredCandidate {
        breakdown: SimilarityBreakdown {
            content_hash: 0.0,
            title_sim: title,
            content_sim: content,
            entity_sim: entity,
            semantic_sim,
            temporal_prox: temporal,
            source_align: source,
        },
        overall,
        method,
        candidate,
    }
}

/// Threshold `overall` must meet for `method` to count as a confirmed duplicate.
pub fn threshold_for(method: DetectionMethod, configured_similarity_threshold: f64) -> f64 {
    match method {
        DetectionMethod::ContentHash => 1.0,
        DetectionMethod::TitleSimilarity => 0.9,
        DetectionMethod::SemanticSimilarity => 0.85,
        DetectionMethod::EntitySimilarity => 0.8,
        DetectionMethod::ContentSimilarity => configured_similarity_threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jaccard_of_two_empty_sets_is_zero_not_nan() {
        let a: HashSet<String> = HashSet::new();
        let b: HashSet<String> = HashSet::new();
        assert_eq!(jaccard(&a, &b), 0.0);
    }

    #[test]
    fn entity_sim_is_zero_for_empty_entity_sets() {
        assert_eq!(entity_sim(&[], &[]), 0.0);
    }

    #[test]
    fn title_sim_of_identical_titles_is_one() {
        let score = title_sim("Acme buys Beta", "Acme buys Beta");
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn temporal_prox_decays_linearly_to_zero_at_24_hours() {
        let t0 = Utc::now();
        let t24 = t0 + chrono::Duration::hours(24);
        assert!((temporal_prox(t0, t24) - 0.0).abs() < 1e-9);
        let t48 = t0 + chrono::Duration::hours(48);
        assert_eq!(temporal_prox(t0, t48), 0.0);
    }

    #[test]
    fn content_sim_is_zero_when_either_document_is_empty() {
        assert_eq!(content_sim("", "some text here", 2000, 500), 0.0);
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![0.1_f32, 0.2, 0.3];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_handles_mismatched_lengths_without_panicking() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
