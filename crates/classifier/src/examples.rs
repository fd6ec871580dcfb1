//! Labelled example matching
//!
//! Scores an intent against every labelled utterance and keeps the best score
//! per service:
//! - identical after normalization: 1.0
//! - contains a multi-word example as a whole phrase: 0.9
//! - otherwise shared significant words over the larger word set, scaled by 0.8

use std::collections::{HashMap, HashSet};

use intent_router_config::TrainingExample;
use intent_router_core::{Service, ServiceCatalog, ServiceId};

use crate::normalize::{normalize, significant_words};

const EXACT_SCORE: f32 = 1.0;
const PHRASE_SCORE: f32 = 0.9;
const OVERLAP_WEIGHT: f32 = 0.8;

/// Alternatives reported next to the best match
const MAX_ALTERNATIVES: usize = 3;

/// Best example match for an intent
#[derive(Debug, Clone, PartialEq)]
pub struct ExampleMatch {
    pub service: Service,
    pub score: f32,
    /// Runner-up services, best first
    pub alternatives: Vec<(ServiceId, f32)>,
}

#[derive(Debug, Clone)]
struct ExampleEntry {
    service_id: ServiceId,
    text: String,
    normalized: String,
    word_count: usize,
    words: HashSet<String>,
}

/// Matcher over labelled example utterances
#[derive(Debug, Clone)]
pub struct ExampleMatcher {
    entries: Vec<ExampleEntry>,
    exact: HashMap<String, ServiceId>,
    catalog: ServiceCatalog,
}

impl ExampleMatcher {
    /// Build from training examples; examples outside the catalog are ignored
    pub fn new(examples: &[TrainingExample], catalog: &ServiceCatalog) -> Self {
        let mut entries = Vec::with_capacity(examples.len());
        let mut exact = HashMap::new();

        for example in examples {
            if !catalog.contains(example.service_id) {
                continue;
            }

            let normalized = normalize(&example.intent);
            if normalized.is_empty() {
                continue;
            }

            // First label wins for duplicated utterances
            exact.entry(normalized.clone()).or_insert(example.service_id);

            entries.push(ExampleEntry {
                service_id: example.service_id,
                text: example.intent.clone(),
                word_count: normalized.split(' ').count(),
                words: significant_words(&normalized).map(str::to_string).collect(),
                normalized,
            });
        }

        Self {
            entries,
            exact,
            catalog: catalog.clone(),
        }
    }

    /// Best matching service, if any example shares anything with the intent
    pub fn best_match(&self, text: &str) -> Option<ExampleMatch> {
        self.best_match_normalized(&normalize(text))
    }

    /// Same as [`best_match`](Self::best_match) for already-normalized text
    pub fn best_match_normalized(&self, normalized: &str) -> Option<ExampleMatch> {
        if normalized.is_empty() || self.entries.is_empty() {
            return None;
        }

        if let Some(&id) = self.exact.get(normalized) {
            let service = self.catalog.get(id)?.clone();
            return Some(ExampleMatch {
                service,
                score: EXACT_SCORE,
                alternatives: Vec::new(),
            });
        }

        let padded = format!(" {} ", normalized);
        let text_words: HashSet<&str> = significant_words(normalized).collect();

        let mut best: HashMap<ServiceId, f32> = HashMap::new();
        for entry in &self.entries {
            let score = score_entry(entry, &padded, &text_words);
            if score > 0.0 {
                let slot = best.entry(entry.service_id).or_insert(0.0);
                *slot = slot.max(score);
            }
        }

        let mut scores: Vec<(ServiceId, f32)> = best.into_iter().collect();
        // Ties resolve to the lower service id
        scores.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut ranked = scores.into_iter();
        let (id, score) = ranked.next()?;
        let service = self.catalog.get(id)?.clone();

        Some(ExampleMatch {
            service,
            score,
            alternatives: ranked.take(MAX_ALTERNATIVES).collect(),
        })
    }

    /// Example utterances in load order, for prompt building
    pub fn examples(&self) -> impl Iterator<Item = (ServiceId, &str)> {
        self.entries.iter().map(|e| (e.service_id, e.text.as_str()))
    }

    /// Number of services with at least one example
    pub fn service_count(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.service_id)
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn score_entry(entry: &ExampleEntry, padded_text: &str, text_words: &HashSet<&str>) -> f32 {
    if entry.word_count >= 2 && padded_text.contains(&format!(" {} ", entry.normalized)) {
        return PHRASE_SCORE;
    }

    let overlap = entry
        .words
        .iter()
        .filter(|w| text_words.contains(w.as_str()))
        .count();
    if overlap == 0 {
        return 0.0;
    }

    let denominator = entry.words.len().max(text_words.len()).max(1);
    overlap as f32 / denominator as f32 * OVERLAP_WEIGHT
}
