use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::corpus::Article;
use crate::runtime::ResolvedPaths;

/// One markdown file under `content/`, split into its front-matter block and
/// body. The front matter is kept verbatim so a body rewrite reproduces the
/// file byte-for-byte outside the body.
#[derive(Debug, Clone, Serialize)]
pub struct StoredArticle {
    pub slug: String,
    pub title: Option<String>,
    pub relative_path: String,
    pub content_hash: String,
    pub bytes: u64,
    #[serde(skip)]
    pub front_matter: String,
    #[serde(skip)]
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanStats {
    pub total_files: usize,
    pub titled: usize,
    pub untitled: usize,
}

#[derive(Debug, Deserialize, Default)]
struct FrontMatter {
    title: Option<String>,
}

/// Scan `content/` for markdown articles, sorted by relative path so every
/// run enumerates the corpus in the same order.
pub fn scan_articles(paths: &ResolvedPaths) -> Result<Vec<StoredArticle>> {
    let mut articles = Vec::new();
    if !paths.content_dir.exists() {
        return Ok(articles);
    }

    for entry in WalkDir::new(&paths.content_dir).follow_links(false) {
        let entry = entry.context("failed to walk content directory")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("md") {
            continue;
        }
        let Some(slug) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let (front_matter, body) = split_front_matter(&content);
        let title = parse_front_matter_title(front_matter)
            .with_context(|| format!("invalid front matter in {}", path.display()))?;

        let relative_path = path
            .strip_prefix(&paths.project_root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        articles.push(StoredArticle {
            slug: slug.to_string(),
            title,
            relative_path,
            content_hash: sha256_hex(&content),
            bytes: content.len() as u64,
            front_matter: front_matter.to_string(),
            body: body.to_string(),
        });
    }

    articles.sort_by(|left, right| left.relative_path.cmp(&right.relative_path));
    Ok(articles)
}

pub fn scan_stats(paths: &ResolvedPaths) -> Result<ScanStats> {
    let articles = scan_articles(paths)?;
    let titled = articles.iter().filter(|a| a.title.is_some()).count();
    Ok(ScanStats {
        total_files: articles.len(),
        untitled: articles.len() - titled,
        titled,
    })
}

/// Load the corpus handed to the engine. Untitled articles participate with
/// an empty title: they contribute no phrases but still receive links.
pub fn load_corpus(paths: &ResolvedPaths) -> Result<Vec<Article>> {
    Ok(scan_articles(paths)?
        .into_iter()
        .map(|stored| Article {
            slug: stored.slug,
            title: stored.title.unwrap_or_default(),
            body: stored.body,
        })
        .collect())
}

/// Replace an article's body on disk, keeping the front-matter block
/// verbatim.
pub fn write_article_body(paths: &ResolvedPaths, slug: &str, new_body: &str) -> Result<PathBuf> {
    let path = article_path(paths, slug);
    if !path.exists() {
        bail!("article not found in store: {slug}");
    }
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let (front_matter, _) = split_front_matter(&content);
    let rendered = format!("{front_matter}{new_body}");
    fs::write(&path, rendered).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Create or replace a stored article with generated front matter. Used when
/// materializing remote articles locally.
pub fn write_article(paths: &ResolvedPaths, slug: &str, title: &str, body: &str) -> Result<PathBuf> {
    let path = article_path(paths, slug);
    fs::create_dir_all(&paths.content_dir)
        .with_context(|| format!("failed to create {}", paths.content_dir.display()))?;
    let front = format!("---\ntitle: \"{}\"\n---\n", title.replace('"', "\\\""));
    fs::write(&path, format!("{front}{body}"))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

pub fn article_path(paths: &ResolvedPaths, slug: &str) -> PathBuf {
    paths.content_dir.join(format!("{slug}.md"))
}

/// Split a file into its front-matter block (both `---` fences and the
/// trailing newline included) and the body. Files without a front-matter
/// block get an empty front-matter part. Concatenating the two halves always
/// reproduces the input.
pub fn split_front_matter(content: &str) -> (&str, &str) {
    let Some(rest) = content.strip_prefix("---\n") else {
        return ("", content);
    };
    let mut offset = 4;
    for line in rest.split_inclusive('\n') {
        offset += line.len();
        if line.trim_end_matches(['\r', '\n']) == "---" {
            return (&content[..offset], &content[offset..]);
        }
    }
    // unterminated front matter: treat the whole file as body
    ("", content)
}

fn parse_front_matter_title(front_matter: &str) -> Result<Option<String>> {
    let inner = front_matter
        .strip_prefix("---\n")
        .and_then(|rest| rest.strip_suffix("---\n").or_else(|| rest.strip_suffix("---")))
        .unwrap_or("");
    if inner.trim().is_empty() {
        return Ok(None);
    }
    let parsed: FrontMatter =
        serde_yaml::from_str(inner).context("front matter is not valid YAML")?;
    Ok(parsed
        .title
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty()))
}

pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
