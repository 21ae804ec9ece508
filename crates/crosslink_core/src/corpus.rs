use std::cmp::Reverse;

use serde::Serialize;

use crate::phrases::{PhraseRules, extract_phrases};

/// One article as handed to the engine. The engine never creates or deletes
/// articles; it only proposes a rewritten body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub slug: String,
    pub title: String,
    pub body: String,
}

/// A phrase eligible for insertion, pointing at the article it was derived
/// from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub phrase: String,
    pub target_slug: String,
}

/// The corpus-wide phrase index: every article's anchor phrases flattened
/// into a single sequence sorted by phrase character count descending.
///
/// The sort is stable, so candidates of equal length keep corpus enumeration
/// order. This single global ordering is what every per-article injection
/// consumes, which keeps link priority consistent regardless of the order in
/// which articles are processed.
#[derive(Debug, Clone, Default)]
pub struct CorpusIndex {
    candidates: Vec<Candidate>,
}

impl CorpusIndex {
    pub fn build(articles: &[Article], rules: &PhraseRules) -> Self {
        let mut candidates = Vec::new();
        for article in articles {
            if article.title.trim().is_empty() {
                continue;
            }
            for phrase in extract_phrases(&article.title, rules) {
                candidates.push(Candidate {
                    phrase,
                    target_slug: article.slug.clone(),
                });
            }
        }
        candidates.sort_by_cached_key(|candidate| Reverse(candidate.phrase.chars().count()));
        Self { candidates }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Filtered view over the shared index that drops candidates targeting
    /// the given article. Self-links are structurally impossible for the
    /// consumer of this view; the index itself is never mutated.
    pub fn candidates_excluding<'a>(
        &'a self,
        slug: &'a str,
    ) -> impl Iterator<Item = &'a Candidate> {
        self.candidates
            .iter()
            .filter(move |candidate| candidate.target_slug != slug)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{Article, CorpusIndex};
    use crate::phrases::PhraseRules;

    fn article(slug: &str, title: &str) -> Article {
        Article {
            slug: slug.to_string(),
            title: title.to_string(),
            body: String::new(),
        }
    }

    fn build(articles: &[Article]) -> CorpusIndex {
        CorpusIndex::build(articles, &PhraseRules::for_locale("de"))
    }

    #[test]
    fn global_order_is_longest_first() {
        let index = build(&[
            article("a", "Birria Tacos"),
            article("b", "Mexikanische Spezialitäten Catering"),
        ]);
        let lengths: Vec<usize> = index
            .candidates()
            .iter()
            .map(|c| c.phrase.chars().count())
            .collect();
        let mut sorted = lengths.clone();
        sorted.sort_by(|l, r| r.cmp(l));
        assert_eq!(lengths, sorted);
    }

    #[test]
    fn equal_lengths_keep_corpus_order() {
        // Both titles yield one 12-char bigram; the first article wins.
        let index = build(&[
            article("first", "Birria Tacos"),
            article("second", "Super Pizzas"),
        ]);
        let pair: Vec<&str> = index
            .candidates()
            .iter()
            .map(|c| c.target_slug.as_str())
            .collect();
        assert_eq!(pair, vec!["first", "second"]);
    }

    #[test]
    fn empty_titles_contribute_nothing() {
        let index = build(&[article("a", "   "), article("b", "Birria Tacos")]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.candidates()[0].target_slug, "b");
    }

    #[test]
    fn excluding_drops_self_targets_without_mutation() {
        let index = build(&[article("a", "Birria Tacos"), article("b", "Super Pizzas")]);
        let for_a: Vec<&str> = index
            .candidates_excluding("a")
            .map(|c| c.target_slug.as_str())
            .collect();
        assert_eq!(for_a, vec!["b"]);
        // shared index keeps both entries
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn title_phrases_flatten_per_article() {
        let index = build(&[article("a", "Birria Tacos Rezept")]);
        assert!(index.len() > 1);
        assert!(index.candidates().iter().all(|c| c.target_slug == "a"));
    }
}
