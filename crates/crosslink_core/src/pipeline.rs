use serde::Serialize;
use similar::TextDiff;

use crate::config::LinkerConfig;
use crate::corpus::{Article, Candidate, CorpusIndex};
use crate::inject::{AddedLink, inject};

/// Injection result for one article. `new_body` is present only when the
/// body actually changed.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleLinkReport {
    pub slug: String,
    pub links: Vec<AddedLink>,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_body: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrosslinkReport {
    pub articles_total: usize,
    pub articles_changed: usize,
    pub links_added: usize,
    pub candidate_count: usize,
    pub articles: Vec<ArticleLinkReport>,
}

/// Run the whole pipeline over one corpus: build the phrase index once, then
/// inject every article against the shared, globally ordered candidate list
/// minus its own entries. Articles are independent of each other; the report
/// is a pure function of the corpus and the configuration.
pub fn run_crosslink(articles: &[Article], config: &LinkerConfig) -> CrosslinkReport {
    let rules = config.rules();
    let prefix = config.path_prefix();
    let index = CorpusIndex::build(articles, &rules);

    let mut report = CrosslinkReport {
        articles_total: articles.len(),
        articles_changed: 0,
        links_added: 0,
        candidate_count: index.len(),
        articles: Vec::with_capacity(articles.len()),
    };

    for article in articles {
        let candidates: Vec<Candidate> = index
            .candidates_excluding(&article.slug)
            .cloned()
            .collect();
        let outcome = inject(&article.slug, &article.body, &candidates, &prefix);
        let changed = outcome.body != article.body;
        if changed {
            report.articles_changed += 1;
        }
        report.links_added += outcome.links.len();
        report.articles.push(ArticleLinkReport {
            slug: article.slug.clone(),
            links: outcome.links,
            changed,
            new_body: changed.then_some(outcome.body),
        });
    }

    report
}

/// Unified diff of one article's rewrite, for dry-run previews.
pub fn render_body_diff(slug: &str, old_body: &str, new_body: &str) -> String {
    let diff = TextDiff::from_lines(old_body, new_body);
    diff.unified_diff()
        .context_radius(2)
        .header(&format!("a/{slug}.md"), &format!("b/{slug}.md"))
        .to_string()
}
