//! Inverted index over a project's decisions.
//!
//! Four posting lists map a term to the ids of decisions carrying it: tags,
//! authors, statuses and words. Words come from the title, description,
//! rationale and tags, lower-cased and split on anything that is not
//! alphanumeric. The index is a derived record: it can always be rebuilt from
//! the decision set, and is whenever it disagrees with it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    migrate::Versioned,
    models::{AgentId, Decision, DecisionStatus},
};

type Postings = BTreeMap<String, BTreeSet<String>>;

/// Posting lists for one project's decisions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionIndex {
    /// Token length the word list was built with
    pub min_token_length: usize,
    #[serde(default)]
    pub by_tag: Postings,
    #[serde(default)]
    pub by_author: Postings,
    #[serde(default)]
    pub by_status: Postings,
    #[serde(default)]
    pub by_word: Postings,
    /// Every decision id present in the lists
    #[serde(default)]
    pub indexed: BTreeSet<String>,
}

impl Versioned for DecisionIndex {
    const KIND: &'static str = "decision_index";
}

/// Search criteria for decisions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecisionQuery {
    /// Free text; empty matches every decision passing the filters
    pub text: String,
    /// Any-of tag filter
    pub tags: Vec<String>,
    pub author: Option<AgentId>,
    pub status: Option<DecisionStatus>,
    pub limit: Option<usize>,
}

impl DecisionQuery {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_author(mut self, author: AgentId) -> Self {
        self.author = Some(author);
        self
    }

    #[must_use]
    pub const fn with_status(mut self, status: DecisionStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Lower-case alphanumeric tokens of at least `min_length` characters.
#[must_use]
pub fn tokenize(text: &str, min_length: usize) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= min_length.max(1))
        .map(str::to_lowercase)
        .collect()
}

impl DecisionIndex {
    #[must_use]
    pub fn new(min_token_length: usize) -> Self {
        Self {
            min_token_length,
            ..Self::default()
        }
    }

    /// Build an index from scratch.
    #[must_use]
    pub fn rebuild<'a>(decisions: impl IntoIterator<Item = &'a Decision>, min_token_length: usize) -> Self {
        let mut index = Self::new(min_token_length);
        for decision in decisions {
            index.upsert(decision);
        }
        index
    }

    /// Replace every entry for `decision.id` with its current terms.
    pub fn upsert(&mut self, decision: &Decision) {
        self.remove(&decision.id);
        let id = &decision.id;

        for tag in &decision.tags {
            insert(&mut self.by_tag, tag.to_lowercase(), id);
        }
        insert(&mut self.by_author, decision.author.to_string(), id);
        insert(&mut self.by_status, decision.status.to_string(), id);

        let text = [
            decision.title.as_str(),
            decision.description.as_str(),
            decision.rationale.as_str(),
            &decision.tags.join(" "),
        ]
        .join(" ");
        for word in tokenize(&text, self.min_token_length) {
            insert(&mut self.by_word, word, id);
        }

        self.indexed.insert(id.clone());
    }

    /// Drop every entry for `id`.
    pub fn remove(&mut self, id: &str) {
        if !self.indexed.remove(id) {
            return;
        }
        for postings in [
            &mut self.by_tag,
            &mut self.by_author,
            &mut self.by_status,
            &mut self.by_word,
        ] {
            postings.retain(|_, ids| {
                ids.remove(id);
                !ids.is_empty()
            });
        }
    }

    /// Whether this index is exactly what a rebuild from `decisions` would produce.
    #[must_use]
    pub fn is_consistent<'a>(&self, decisions: impl IntoIterator<Item = &'a Decision>) -> bool {
        *self == Self::rebuild(decisions, self.min_token_length)
    }

    /// Matching decision ids with their relevance: the number of distinct
    /// query tokens found in the decision.
    ///
    /// With no usable tokens every decision passing the filters matches with
    /// relevance 0; otherwise at least one token must match.
    #[must_use]
    pub fn matches(&self, query: &DecisionQuery) -> BTreeMap<String, usize> {
        let tokens = tokenize(&query.text, self.min_token_length);

        let mut scores: BTreeMap<String, usize> = if tokens.is_empty() {
            self.indexed.iter().map(|id| (id.clone(), 0)).collect()
        } else {
            let mut scores = BTreeMap::new();
            for ids in tokens.iter().filter_map(|t| self.by_word.get(t)) {
                for id in ids {
                    *scores.entry(id.clone()).or_insert(0) += 1;
                }
            }
            scores
        };

        if !query.tags.is_empty() {
            let tagged: BTreeSet<&String> = query
                .tags
                .iter()
                .filter_map(|t| self.by_tag.get(&t.to_lowercase()))
                .flatten()
                .collect();
            scores.retain(|id, _| tagged.contains(id));
        }
        if let Some(author) = &query.author {
            let ids = self.by_author.get(author.as_str());
            scores.retain(|id, _| ids.is_some_and(|ids| ids.contains(id)));
        }
        if let Some(status) = query.status {
            let ids = self.by_status.get(&status.to_string());
            scores.retain(|id, _| ids.is_some_and(|ids| ids.contains(id)));
        }

        scores
    }
}

fn insert(postings: &mut Postings, term: String, id: &str) {
    postings.entry(term).or_default().insert(id.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn decision(title: &str, tags: &[&str], author: &str) -> Decision {
        Decision::new(title, AgentId::new(author), Utc::now()).with_tags(tags.iter().copied())
    }

    #[test]
    fn test_tokenize() {
        let tokens = tokenize("Use JWT for auth-tokens, v2 OK", 3);
        let expected: BTreeSet<String> = ["use", "jwt", "for", "auth", "tokens"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(tokens, expected);
        assert!(tokenize("a b c", 3).is_empty());
    }

    #[test]
    fn test_relevance_counts_distinct_tokens() {
        let jwt = decision("Use JWT tokens", &["security"], "a1");
        let db = decision("Use Postgres", &["database"], "a2");
        let index = DecisionIndex::rebuild([&jwt, &db], 3);

        let scores = index.matches(&DecisionQuery::text("use jwt jwt"));
        assert_eq!(scores.get(&jwt.id), Some(&2));
        assert_eq!(scores.get(&db.id), Some(&1));
    }

    #[test]
    fn test_filters_intersect() {
        let jwt = decision("Use JWT", &["Security", "api"], "a1");
        let db = decision("Use Postgres", &["database"], "a2");
        let index = DecisionIndex::rebuild([&jwt, &db], 3);

        let q = DecisionQuery::text("jwt").with_tags(["security"]);
        assert!(index.matches(&q).contains_key(&jwt.id));

        let q = DecisionQuery::text("jwt").with_tags(["database"]);
        assert!(index.matches(&q).is_empty());

        let q = DecisionQuery::text("").with_tags(["database", "api"]);
        assert_eq!(index.matches(&q).len(), 2);

        let q = DecisionQuery::text("use").with_author(AgentId::new("a2"));
        assert_eq!(index.matches(&q).keys().collect::<Vec<_>>(), vec![&db.id]);

        let q = DecisionQuery::text("use").with_status(DecisionStatus::Proposed);
        assert!(index.matches(&q).is_empty());
    }

    #[test]
    fn test_upsert_replaces_stale_terms() {
        let mut d = decision("Use MySQL", &["database"], "a1");
        let mut index = DecisionIndex::rebuild([&d], 3);

        d.title = "Use Postgres".into();
        d.status = DecisionStatus::Deprecated;
        index.upsert(&d);

        assert!(!index.by_word.contains_key("mysql"));
        assert!(index.by_word["postgres"].contains(&d.id));
        assert!(!index.by_status.contains_key("accepted"));
        assert!(index.is_consistent([&d]));
    }

    #[test]
    fn test_consistency_detects_missing_entries() {
        let a = decision("Alpha choice", &[], "a1");
        let b = decision("Beta choice", &[], "a1");
        let index = DecisionIndex::rebuild([&a], 3);
        assert!(index.is_consistent([&a]));
        assert!(!index.is_consistent([&a, &b]));

        let mut removed = index;
        removed.remove(&a.id);
        assert_eq!(removed, DecisionIndex::new(3));
    }
}
