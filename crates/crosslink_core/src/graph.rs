use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::inject::scan_existing_links;
use crate::runtime::ResolvedPaths;
use crate::store::scan_articles;

const GRAPH_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS graph_articles (
    slug TEXT PRIMARY KEY,
    title TEXT,
    relative_path TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    bytes INTEGER NOT NULL,
    indexed_at_unix INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS graph_links (
    source_slug TEXT NOT NULL,
    target_slug TEXT NOT NULL,
    anchor_text TEXT NOT NULL,
    PRIMARY KEY (source_slug, target_slug),
    FOREIGN KEY (source_slug) REFERENCES graph_articles(slug) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_graph_links_target ON graph_links(target_slug);
CREATE INDEX IF NOT EXISTS idx_graph_links_source ON graph_links(source_slug);
"#;

#[derive(Debug, Clone, Serialize)]
pub struct GraphRebuildReport {
    pub db_path: String,
    pub inserted_articles: usize,
    pub inserted_links: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub articles: usize,
    pub links: usize,
    pub linked_articles: usize,
    pub orphan_articles: usize,
}

/// Rebuild the persisted link graph from the local store: one row per
/// article, one edge per existing internal link recognized by the configured
/// path prefix.
pub fn rebuild_graph(paths: &ResolvedPaths, path_prefix: &str) -> Result<GraphRebuildReport> {
    let articles = scan_articles(paths)?;
    ensure_db_parent(paths)?;
    let mut connection = open_connection(paths)?;
    initialize_schema(&connection)?;
    let indexed_at_unix = unix_timestamp()?;

    let transaction = connection
        .transaction()
        .context("failed to start graph rebuild transaction")?;
    transaction
        .execute("DELETE FROM graph_articles", [])
        .context("failed to clear graph_articles table")?;
    transaction
        .execute("DELETE FROM graph_links", [])
        .context("failed to clear graph_links table")?;

    let mut article_statement = transaction
        .prepare(
            "INSERT INTO graph_articles (
                slug, title, relative_path, content_hash, bytes, indexed_at_unix
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .context("failed to prepare graph_articles insert")?;
    let mut link_statement = transaction
        .prepare(
            "INSERT OR IGNORE INTO graph_links (source_slug, target_slug, anchor_text)
             VALUES (?1, ?2, ?3)",
        )
        .context("failed to prepare graph_links insert")?;

    let mut inserted_articles = 0usize;
    let mut inserted_links = 0usize;
    for article in &articles {
        article_statement
            .execute(params![
                article.slug,
                article.title,
                article.relative_path,
                article.content_hash,
                i64::try_from(article.bytes).context("bytes value does not fit into i64")?,
                i64::try_from(indexed_at_unix).context("timestamp does not fit into i64")?,
            ])
            .with_context(|| format!("failed to insert {}", article.slug))?;
        inserted_articles += 1;

        for link in scan_existing_links(&article.body, path_prefix) {
            let affected = link_statement
                .execute(params![article.slug, link.target_slug, link.text])
                .with_context(|| format!("failed to insert links for {}", article.slug))?;
            inserted_links += affected;
        }
    }
    drop(link_statement);
    drop(article_statement);

    transaction
        .commit()
        .context("failed to commit graph rebuild transaction")?;

    Ok(GraphRebuildReport {
        db_path: paths.db_path.to_string_lossy().replace('\\', "/"),
        inserted_articles,
        inserted_links,
    })
}

/// Stats over the persisted graph, or `None` when it has never been built.
pub fn load_graph_stats(paths: &ResolvedPaths) -> Result<Option<GraphStats>> {
    let Some(connection) = open_built_connection(paths)? else {
        return Ok(None);
    };

    let articles = count_query(&connection, "SELECT COUNT(*) FROM graph_articles")?;
    let links = count_query(&connection, "SELECT COUNT(*) FROM graph_links")?;
    let linked_articles = count_query(
        &connection,
        "SELECT COUNT(DISTINCT target_slug) FROM graph_links
         WHERE target_slug IN (SELECT slug FROM graph_articles)",
    )?;
    let orphan_articles = count_query(
        &connection,
        "SELECT COUNT(*) FROM graph_articles
         WHERE slug NOT IN (SELECT target_slug FROM graph_links)",
    )?;

    Ok(Some(GraphStats {
        articles,
        links,
        linked_articles,
        orphan_articles,
    }))
}

/// Slugs of articles linking to the given article, or `None` when the graph
/// has never been built.
pub fn query_backlinks(paths: &ResolvedPaths, slug: &str) -> Result<Option<Vec<String>>> {
    let Some(connection) = open_built_connection(paths)? else {
        return Ok(None);
    };
    let mut statement = connection
        .prepare(
            "SELECT source_slug FROM graph_links WHERE target_slug = ?1 ORDER BY source_slug",
        )
        .context("failed to prepare backlinks query")?;
    let rows = statement
        .query_map(params![slug], |row| row.get::<_, String>(0))
        .context("failed to run backlinks query")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("failed to decode backlinks row")?);
    }
    Ok(Some(out))
}

/// Articles no other article links to, or `None` when the graph has never
/// been built.
pub fn query_orphans(paths: &ResolvedPaths) -> Result<Option<Vec<String>>> {
    let Some(connection) = open_built_connection(paths)? else {
        return Ok(None);
    };
    let mut statement = connection
        .prepare(
            "SELECT slug FROM graph_articles
             WHERE slug NOT IN (SELECT target_slug FROM graph_links)
             ORDER BY slug",
        )
        .context("failed to prepare orphans query")?;
    let rows = statement
        .query_map([], |row| row.get::<_, String>(0))
        .context("failed to run orphans query")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("failed to decode orphans row")?);
    }
    Ok(Some(out))
}

fn open_connection(paths: &ResolvedPaths) -> Result<Connection> {
    Connection::open(&paths.db_path)
        .with_context(|| format!("failed to open {}", paths.db_path.display()))
}

fn open_built_connection(paths: &ResolvedPaths) -> Result<Option<Connection>> {
    if !paths.db_path.exists() {
        return Ok(None);
    }
    let connection = open_connection(paths)?;
    if !table_exists(&connection, "graph_articles")? {
        return Ok(None);
    }
    Ok(Some(connection))
}

fn initialize_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(GRAPH_SCHEMA_SQL)
        .context("failed to initialize graph schema")
}

fn table_exists(connection: &Connection, name: &str) -> Result<bool> {
    let count: i64 = connection
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )
        .context("failed to inspect schema")?;
    Ok(count > 0)
}

fn count_query(connection: &Connection, sql: &str) -> Result<usize> {
    let count: i64 = connection
        .query_row(sql, [], |row| row.get(0))
        .with_context(|| format!("failed to run count query: {sql}"))?;
    usize::try_from(count).context("count does not fit into usize")
}

fn ensure_db_parent(paths: &ResolvedPaths) -> Result<()> {
    let parent = paths
        .db_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("db path has no parent: {}", paths.db_path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))
}

fn unix_timestamp() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before the unix epoch")?
        .as_secs())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::{load_graph_stats, query_backlinks, query_orphans, rebuild_graph};
    use crate::runtime::{PathOverrides, ResolutionContext, resolve_paths};

    const PREFIX: &str = "/de/blog";

    fn paths_for(root: &Path) -> crate::runtime::ResolvedPaths {
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

    fn write_article(paths: &crate::runtime::ResolvedPaths, slug: &str, body: &str) {
        fs::create_dir_all(&paths.content_dir).expect("create content");
        fs::write(
            paths.content_dir.join(format!("{slug}.md")),
            format!("---\ntitle: \"{slug}\"\n---\n{body}"),
        )
        .expect("write article");
    }

    #[test]
    fn queries_return_none_before_first_build() {
        let temp = tempdir().expect("tempdir");
        let paths = paths_for(temp.path());
        assert!(load_graph_stats(&paths).expect("stats").is_none());
        assert!(query_backlinks(&paths, "x").expect("backlinks").is_none());
        assert!(query_orphans(&paths).expect("orphans").is_none());
    }

    #[test]
    fn rebuild_records_articles_and_edges() {
        let temp = tempdir().expect("tempdir");
        let paths = paths_for(temp.path());
        write_article(&paths, "tacos", "Ein Text ohne Links.\n");
        write_article(
            &paths,
            "catering",
            "Wir empfehlen [Birria Tacos](/de/blog/tacos) dazu.\n",
        );

        let report = rebuild_graph(&paths, PREFIX).expect("rebuild");
        assert_eq!(report.inserted_articles, 2);
        assert_eq!(report.inserted_links, 1);

        let stats = load_graph_stats(&paths).expect("stats").expect("built");
        assert_eq!(stats.articles, 2);
        assert_eq!(stats.links, 1);
        assert_eq!(stats.linked_articles, 1);
        assert_eq!(stats.orphan_articles, 1);

        let backlinks = query_backlinks(&paths, "tacos")
            .expect("backlinks")
            .expect("built");
        assert_eq!(backlinks, vec!["catering".to_string()]);

        let orphans = query_orphans(&paths).expect("orphans").expect("built");
        assert_eq!(orphans, vec!["catering".to_string()]);
    }

    #[test]
    fn rebuild_ignores_links_outside_the_prefix() {
        let temp = tempdir().expect("tempdir");
        let paths = paths_for(temp.path());
        write_article(
            &paths,
            "post",
            "Siehe [extern](https://example.org) und [intern](/de/blog/post2).\n",
        );
        write_article(&paths, "post2", "Leer.\n");

        let report = rebuild_graph(&paths, PREFIX).expect("rebuild");
        assert_eq!(report.inserted_links, 1);
    }

    #[test]
    fn rebuild_replaces_previous_state() {
        let temp = tempdir().expect("tempdir");
        let paths = paths_for(temp.path());
        write_article(&paths, "a", "[x](/de/blog/b)\n");
        write_article(&paths, "b", "Leer.\n");
        rebuild_graph(&paths, PREFIX).expect("first rebuild");

        fs::write(
            paths.content_dir.join("a.md"),
            "---\ntitle: \"a\"\n---\nkein link mehr\n",
        )
        .expect("rewrite");
        rebuild_graph(&paths, PREFIX).expect("second rebuild");

        let stats = load_graph_stats(&paths).expect("stats").expect("built");
        assert_eq!(stats.links, 0);
    }
}
