use std::env;
use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::runtime::ResolvedPaths;
use crate::store::{scan_articles, write_article};

const DEFAULT_USER_AGENT: &str = "crosslink/0.1";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RETRIES: usize = 2;
const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// One article as served by the persistence API.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteArticle {
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

pub trait ArticleReadApi {
    fn list_articles(&mut self) -> Result<Vec<RemoteArticle>>;
    fn request_count(&self) -> usize;
}

pub trait ArticleWriteApi: ArticleReadApi {
    fn update_body(&mut self, slug: &str, body: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ArticleApiConfig {
    pub api_url: String,
    pub api_token: Option<String>,
    pub user_agent: String,
    pub locale: String,
    pub timeout_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl ArticleApiConfig {
    pub fn from_env(locale: &str) -> Self {
        Self {
            api_url: env_value("CROSSLINK_API_URL", ""),
            api_token: env::var("CROSSLINK_API_TOKEN")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            user_agent: env_value("CROSSLINK_USER_AGENT", DEFAULT_USER_AGENT),
            locale: locale.to_string(),
            timeout_ms: env_value_u64("CROSSLINK_HTTP_TIMEOUT_MS", DEFAULT_TIMEOUT_MS),
            max_retries: env_value_usize("CROSSLINK_HTTP_RETRIES", DEFAULT_RETRIES),
            retry_delay_ms: env_value_u64("CROSSLINK_HTTP_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS),
        }
    }
}

pub struct HttpArticleClient {
    client: Client,
    config: ArticleApiConfig,
    request_count: usize,
}

impl HttpArticleClient {
    pub fn new(config: ArticleApiConfig) -> Result<Self> {
        if config.api_url.trim().is_empty() {
            bail!("article API URL is not configured (set CROSSLINK_API_URL)");
        }
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            config,
            request_count: 0,
        })
    }

    fn send_with_retries<F>(&mut self, build: F) -> Result<reqwest::blocking::Response>
    where
        F: Fn(&Client) -> reqwest::blocking::RequestBuilder,
    {
        let mut attempt = 0usize;
        loop {
            self.request_count += 1;
            let mut request = build(&self.client);
            if let Some(token) = &self.config.api_token {
                request = request.bearer_auth(token);
            }
            match request.send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if is_retryable_status(status) && attempt < self.config.max_retries {
                        attempt += 1;
                        sleep(Duration::from_millis(self.config.retry_delay_ms));
                        continue;
                    }
                    bail!("article API returned {status}");
                }
                Err(error) => {
                    if is_retryable_error(&error) && attempt < self.config.max_retries {
                        attempt += 1;
                        sleep(Duration::from_millis(self.config.retry_delay_ms));
                        continue;
                    }
                    return Err(error).context("article API request failed");
                }
            }
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ArticlesResponse {
    #[serde(default)]
    articles: Vec<RemoteArticle>,
}

#[derive(Debug, Serialize)]
struct UpdateBodyRequest<'a> {
    body: &'a str,
}

impl ArticleReadApi for HttpArticleClient {
    fn list_articles(&mut self) -> Result<Vec<RemoteArticle>> {
        let url = format!(
            "{}/articles?locale={}",
            self.config.api_url.trim_end_matches('/'),
            self.config.locale
        );
        let response = self.send_with_retries(|client| client.get(&url))?;
        let parsed: ArticlesResponse = response
            .json()
            .context("failed to decode article list response")?;
        Ok(parsed.articles)
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

impl ArticleWriteApi for HttpArticleClient {
    fn update_body(&mut self, slug: &str, body: &str) -> Result<()> {
        let url = format!(
            "{}/articles/{}",
            self.config.api_url.trim_end_matches('/'),
            slug
        );
        let payload = UpdateBodyRequest { body };
        self.send_with_retries(|client| client.put(&url).json(&payload))
            .with_context(|| format!("failed to update article {slug}"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    pub overwrite_local: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PullPageResult {
    pub slug: String,
    pub action: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PullReport {
    pub pulled: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub pages: Vec<PullPageResult>,
    pub request_count: usize,
}

/// Materialize remote articles into the local store. Locally modified bodies
/// are left alone unless `overwrite_local` is set.
pub fn pull_from_remote_with_api(
    paths: &ResolvedPaths,
    options: &PullOptions,
    api: &mut impl ArticleReadApi,
) -> Result<PullReport> {
    let remote_articles = api.list_articles()?;
    let local = scan_articles(paths)?;

    let mut report = PullReport {
        pulled: remote_articles.len(),
        created: 0,
        updated: 0,
        unchanged: 0,
        skipped: 0,
        pages: Vec::new(),
        request_count: 0,
    };

    for remote in &remote_articles {
        let existing = local.iter().find(|stored| stored.slug == remote.slug);
        let action = match existing {
            None => {
                write_article(paths, &remote.slug, &remote.title, &remote.body)?;
                report.created += 1;
                "created"
            }
            Some(stored) if stored.body == remote.body => {
                report.unchanged += 1;
                "unchanged"
            }
            Some(_) if options.overwrite_local => {
                write_article(paths, &remote.slug, &remote.title, &remote.body)?;
                report.updated += 1;
                "updated"
            }
            Some(_) => {
                report.skipped += 1;
                "skipped (local body differs; use --overwrite-local)"
            }
        };
        report.pages.push(PullPageResult {
            slug: remote.slug.clone(),
            action: action.to_string(),
        });
    }

    report.request_count = api.request_count();
    Ok(report)
}

/// A rewritten body waiting to be persisted for one article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyUpdate {
    pub slug: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushPageResult {
    pub slug: String,
    pub action: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushReport {
    pub dry_run: bool,
    pub pushed: usize,
    pub errors: Vec<String>,
    pub pages: Vec<PushPageResult>,
    pub request_count: usize,
}

/// Persist rewritten bodies through the write API. With `dry_run` nothing is
/// sent; the report lists what would be pushed.
pub fn push_to_remote_with_api(
    updates: &[BodyUpdate],
    dry_run: bool,
    api: &mut impl ArticleWriteApi,
) -> Result<PushReport> {
    let mut report = PushReport {
        dry_run,
        pushed: 0,
        errors: Vec::new(),
        pages: Vec::new(),
        request_count: 0,
    };

    for update in updates {
        if dry_run {
            report.pages.push(PushPageResult {
                slug: update.slug.clone(),
                action: "would push".to_string(),
            });
            continue;
        }
        match api.update_body(&update.slug, &update.body) {
            Ok(()) => {
                report.pushed += 1;
                report.pages.push(PushPageResult {
                    slug: update.slug.clone(),
                    action: "pushed".to_string(),
                });
            }
            Err(error) => {
                report.errors.push(format!("{}: {error:#}", update.slug));
                report.pages.push(PushPageResult {
                    slug: update.slug.clone(),
                    action: "error".to_string(),
                });
            }
        }
    }

    report.request_count = api.request_count();
    Ok(report)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

fn env_value(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{
        ArticleReadApi, ArticleWriteApi, BodyUpdate, PullOptions, RemoteArticle,
        pull_from_remote_with_api, push_to_remote_with_api,
    };
    use crate::runtime::{PathOverrides, ResolutionContext, resolve_paths};
    use crate::store::scan_articles;

    #[derive(Default)]
    struct MockApi {
        articles: Vec<RemoteArticle>,
        updated: Vec<(String, String)>,
        fail_update_for: Option<String>,
        request_count: usize,
    }

    impl ArticleReadApi for MockApi {
        fn list_articles(&mut self) -> anyhow::Result<Vec<RemoteArticle>> {
            self.request_count += 1;
            Ok(self.articles.clone())
        }

        fn request_count(&self) -> usize {
            self.request_count
        }
    }

    impl ArticleWriteApi for MockApi {
        fn update_body(&mut self, slug: &str, body: &str) -> anyhow::Result<()> {
            self.request_count += 1;
            if self.fail_update_for.as_deref() == Some(slug) {
                anyhow::bail!("server said no");
            }
            self.updated.push((slug.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn remote(slug: &str, title: &str, body: &str) -> RemoteArticle {
        RemoteArticle {
            slug: slug.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        }
    }

    fn paths_for(root: &std::path::Path) -> crate::runtime::ResolvedPaths {
        let context = ResolutionContext {
            cwd: root.to_path_buf(),
            executable_dir: None,
        };
        let overrides = PathOverrides {
            project_root: Some(root.to_path_buf()),
            ..PathOverrides::default()
        };
        resolve_paths(&context, &overrides).expect("resolve paths")
    }

    #[test]
    fn pull_creates_missing_articles() {
        let temp = tempdir().expect("tempdir");
        let paths = paths_for(temp.path());
        let mut api = MockApi {
            articles: vec![remote("tacos", "Birria Tacos", "Der Body.\n")],
            ..MockApi::default()
        };

        let report =
            pull_from_remote_with_api(&paths, &PullOptions::default(), &mut api).expect("pull");
        assert_eq!(report.created, 1);
        assert_eq!(report.request_count, 1);

        let articles = scan_articles(&paths).expect("scan");
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title.as_deref(), Some("Birria Tacos"));
    }

    #[test]
    fn pull_skips_locally_modified_body_without_overwrite() {
        let temp = tempdir().expect("tempdir");
        let paths = paths_for(temp.path());
        fs::create_dir_all(&paths.content_dir).expect("create content");
        fs::write(
            paths.content_dir.join("tacos.md"),
            "---\ntitle: \"Birria Tacos\"\n---\nlokal geändert\n",
        )
        .expect("write local");

        let mut api = MockApi {
            articles: vec![remote("tacos", "Birria Tacos", "remote body\n")],
            ..MockApi::default()
        };
        let report =
            pull_from_remote_with_api(&paths, &PullOptions::default(), &mut api).expect("pull");
        assert_eq!(report.skipped, 1);
        assert_eq!(report.updated, 0);

        let overwrite = PullOptions {
            overwrite_local: true,
        };
        let report = pull_from_remote_with_api(&paths, &overwrite, &mut api).expect("pull again");
        assert_eq!(report.updated, 1);
        let articles = scan_articles(&paths).expect("scan");
        assert_eq!(articles[0].body, "remote body\n");
    }

    #[test]
    fn pull_reports_unchanged_bodies() {
        let temp = tempdir().expect("tempdir");
        let paths = paths_for(temp.path());
        let mut api = MockApi {
            articles: vec![remote("tacos", "Birria Tacos", "Der Body.\n")],
            ..MockApi::default()
        };
        pull_from_remote_with_api(&paths, &PullOptions::default(), &mut api).expect("pull");
        let report = pull_from_remote_with_api(&paths, &PullOptions::default(), &mut api)
            .expect("second pull");
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.created, 0);
    }

    #[test]
    fn push_sends_updates_and_collects_errors() {
        let mut api = MockApi {
            fail_update_for: Some("broken".to_string()),
            ..MockApi::default()
        };
        let updates = vec![
            BodyUpdate {
                slug: "tacos".to_string(),
                body: "neuer body".to_string(),
            },
            BodyUpdate {
                slug: "broken".to_string(),
                body: "egal".to_string(),
            },
        ];

        let report = push_to_remote_with_api(&updates, false, &mut api).expect("push");
        assert_eq!(report.pushed, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(api.updated, vec![("tacos".to_string(), "neuer body".to_string())]);
    }

    #[test]
    fn push_dry_run_sends_nothing() {
        let mut api = MockApi::default();
        let updates = vec![BodyUpdate {
            slug: "tacos".to_string(),
            body: "neuer body".to_string(),
        }];
        let report = push_to_remote_with_api(&updates, true, &mut api).expect("push");
        assert!(report.dry_run);
        assert_eq!(report.pushed, 0);
        assert!(api.updated.is_empty());
        assert_eq!(report.pages[0].action, "would push");
    }
}
