use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use crosslink_core::config::load_config;
use crosslink_core::graph::{
    GraphStats, load_graph_stats, query_backlinks, query_orphans, rebuild_graph,
};
use crosslink_core::phrases::extract_phrases;
use crosslink_core::pipeline::{CrosslinkReport, render_body_diff, run_crosslink};
use crosslink_core::remote::{
    ArticleApiConfig, BodyUpdate, HttpArticleClient, PullOptions,
    pull_from_remote_with_api, push_to_remote_with_api,
};
use crosslink_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, ensure_runtime_ready,
    init_layout, inspect_runtime, resolve_paths,
};
use crosslink_core::store::{ScanStats, load_corpus, scan_stats, write_article_body};

#[derive(Debug, Parser)]
#[command(
    name = "crosslink",
    version,
    about = "Cross-link a markdown article corpus against its own titles"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            data_dir: cli.data_dir.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init(InitArgs),
    Status,
    Phrases(PhrasesArgs),
    Link(LinkArgs),
    Pull(PullArgs),
    Push(PushArgs),
    Graph(GraphArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
    #[arg(long, help = "Skip writing .crosslink/config.toml")]
    no_config: bool,
}

#[derive(Debug, Args)]
struct PhrasesArgs {
    title: String,
}

#[derive(Debug, Args)]
struct LinkArgs {
    #[arg(long, help = "Report without writing rewritten bodies to disk")]
    dry_run: bool,
    #[arg(long, help = "Print a unified diff for every changed article")]
    diff: bool,
    #[arg(long, help = "Print the full report as JSON instead of key: value lines")]
    json: bool,
}

#[derive(Debug, Args)]
struct PullArgs {
    #[arg(long, help = "Overwrite locally modified bodies during pull")]
    overwrite_local: bool,
}

#[derive(Debug, Args)]
struct PushArgs {
    #[arg(long, help = "List what would be pushed without sending anything")]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct GraphArgs {
    #[command(subcommand)]
    command: GraphSubcommand,
}

#[derive(Debug, Subcommand)]
enum GraphSubcommand {
    Rebuild,
    Stats,
    Backlinks { slug: String },
    Orphans,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Status) => run_status(&runtime),
        Some(Commands::Phrases(PhrasesArgs { title })) => run_phrases(&runtime, &title),
        Some(Commands::Link(args)) => run_link(&runtime, args),
        Some(Commands::Pull(args)) => run_pull(&runtime, args),
        Some(Commands::Push(args)) => run_push(&runtime, args),
        Some(Commands::Graph(GraphArgs { command })) => match command {
            GraphSubcommand::Rebuild => run_graph_rebuild(&runtime),
            GraphSubcommand::Stats => run_graph_stats(&runtime),
            GraphSubcommand::Backlinks { slug } => run_graph_backlinks(&runtime, &slug),
            GraphSubcommand::Orphans => run_graph_orphans(&runtime),
        },
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(
        &paths,
        &InitOptions {
            materialize_config: !args.no_config,
            force: args.force,
        },
    )?;

    println!("Initialized crosslink runtime layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("content_dir: {}", normalize_path(&paths.content_dir));
    println!("state_dir: {}", normalize_path(&paths.state_dir));
    println!("data_dir: {}", normalize_path(&paths.data_dir));
    println!("db_path: {}", normalize_path(&paths.db_path));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    print_diagnostics(runtime, &paths);

    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths)?;
    let config = load_config(&paths.config_path)?;
    let scan = scan_stats(&paths)?;

    println!("runtime status");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!(
        "project_root_exists: {}",
        format_flag(status.project_root_exists)
    );
    println!("content_exists: {}", format_flag(status.content_exists));
    println!("state_dir_exists: {}", format_flag(status.state_dir_exists));
    println!("data_dir_exists: {}", format_flag(status.data_dir_exists));
    println!("db_exists: {}", format_flag(status.db_exists));
    println!(
        "db_size_bytes: {}",
        status
            .db_size_bytes
            .map(|size| size.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    );
    println!("config_exists: {}", format_flag(status.config_exists));
    println!("path_prefix: {}", config.path_prefix());
    println!("locale: {}", config.locale());
    print_scan_stats("scan", &scan);
    if !status.warnings.is_empty() {
        println!("warnings:");
        for warning in &status.warnings {
            println!("  - {warning}");
        }
    }
    print_diagnostics(runtime, &paths);

    Ok(())
}

fn run_phrases(runtime: &RuntimeOptions, title: &str) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let phrases = extract_phrases(title, &config.rules());

    println!("phrases");
    println!("title: {title}");
    println!("locale: {}", config.locale());
    println!("phrases.count: {}", phrases.len());
    if phrases.is_empty() {
        println!("phrases: <none>");
    } else {
        for phrase in &phrases {
            println!("phrases.phrase: {phrase}");
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_link(runtime: &RuntimeOptions, args: LinkArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths)?;
    ensure_runtime_ready(&paths, &status)?;

    let config = load_config(&paths.config_path)?;
    let corpus = load_corpus(&paths)?;
    let report = run_crosslink(&corpus, &config);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("link");
        println!("project_root: {}", normalize_path(&paths.project_root));
        println!("path_prefix: {}", config.path_prefix());
        println!("dry_run: {}", args.dry_run);
        print_link_report(&report);
    }

    if args.diff && !args.json {
        for (article, result) in corpus.iter().zip(&report.articles) {
            if let Some(new_body) = &result.new_body {
                println!();
                print!("{}", render_body_diff(&result.slug, &article.body, new_body));
            }
        }
    }

    if !args.dry_run {
        let mut written = 0usize;
        for result in &report.articles {
            if let Some(new_body) = &result.new_body {
                write_article_body(&paths, &result.slug, new_body)?;
                written += 1;
            }
        }
        if !args.json {
            println!("written_files: {written}");
        }
    }
    if !args.json {
        print_diagnostics(runtime, &paths);
    }

    Ok(())
}

fn run_pull(runtime: &RuntimeOptions, args: PullArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths)?;
    ensure_runtime_ready(&paths, &status)?;

    let config = load_config(&paths.config_path)?;
    let mut api = HttpArticleClient::new(ArticleApiConfig::from_env(&config.locale()))?;
    let options = PullOptions {
        overwrite_local: args.overwrite_local,
    };
    let report = pull_from_remote_with_api(&paths, &options, &mut api)?;

    println!("pull");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("locale: {}", config.locale());
    println!("overwrite_local: {}", args.overwrite_local);
    println!("pulled: {}", report.pulled);
    println!("created: {}", report.created);
    println!("updated: {}", report.updated);
    println!("unchanged: {}", report.unchanged);
    println!("skipped: {}", report.skipped);
    println!("request_count: {}", report.request_count);
    for page in &report.pages {
        println!("pull.{}: {}", page.slug, page.action);
    }
    print_diagnostics(runtime, &paths);

    Ok(())
}

fn run_push(runtime: &RuntimeOptions, args: PushArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths)?;
    ensure_runtime_ready(&paths, &status)?;

    let config = load_config(&paths.config_path)?;
    let corpus = load_corpus(&paths)?;
    let report = run_crosslink(&corpus, &config);
    let updates: Vec<BodyUpdate> = report
        .articles
        .iter()
        .filter_map(|result| {
            result.new_body.as_ref().map(|body| BodyUpdate {
                slug: result.slug.clone(),
                body: body.clone(),
            })
        })
        .collect();

    println!("push");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("dry_run: {}", args.dry_run);
    print_link_report(&report);

    if updates.is_empty() {
        println!("pushed: 0");
        print_diagnostics(runtime, &paths);
        return Ok(());
    }

    let mut api = HttpArticleClient::new(ArticleApiConfig::from_env(&config.locale()))?;
    let push_report = push_to_remote_with_api(&updates, args.dry_run, &mut api)?;

    println!("pushed: {}", push_report.pushed);
    println!("request_count: {}", push_report.request_count);
    for page in &push_report.pages {
        println!("push.{}: {}", page.slug, page.action);
    }
    if !push_report.errors.is_empty() {
        println!("errors:");
        for error in &push_report.errors {
            println!("  - {error}");
        }
    }
    print_diagnostics(runtime, &paths);

    if !push_report.errors.is_empty() {
        bail!("{} article(s) failed to push", push_report.errors.len());
    }
    Ok(())
}

fn run_graph_rebuild(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths)?;
    ensure_runtime_ready(&paths, &status)?;

    let config = load_config(&paths.config_path)?;
    let report = rebuild_graph(&paths, &config.path_prefix())?;

    println!("graph rebuild");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("db_path: {}", report.db_path);
    println!("inserted_articles: {}", report.inserted_articles);
    println!("inserted_links: {}", report.inserted_links);
    print_diagnostics(runtime, &paths);

    Ok(())
}

fn run_graph_stats(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let scan = scan_stats(&paths)?;

    println!("graph stats");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("content_dir: {}", normalize_path(&paths.content_dir));
    print_scan_stats("scan", &scan);
    match load_graph_stats(&paths)? {
        Some(stats) => print_graph_stats("graph", &stats),
        None => println!("graph.storage: <not built> (run `crosslink graph rebuild`)"),
    }
    print_diagnostics(runtime, &paths);

    Ok(())
}

fn run_graph_backlinks(runtime: &RuntimeOptions, slug: &str) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let normalized_slug = slug.trim();

    println!("graph backlinks");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("target: {normalized_slug}");
    if normalized_slug.is_empty() {
        bail!("graph backlinks requires a non-empty slug");
    }

    match query_backlinks(&paths, normalized_slug)? {
        Some(backlinks) => {
            println!("backlinks.count: {}", backlinks.len());
            if backlinks.is_empty() {
                println!("backlinks: <none>");
            } else {
                for source in backlinks {
                    println!("backlinks.source: {source}");
                }
            }
        }
        None => {
            println!("graph.storage: <not built> (run `crosslink graph rebuild`)");
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_graph_orphans(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;

    println!("graph orphans");
    println!("project_root: {}", normalize_path(&paths.project_root));
    match query_orphans(&paths)? {
        Some(orphans) => {
            println!("orphans.count: {}", orphans.len());
            if orphans.is_empty() {
                println!("orphans: <none>");
            } else {
                for slug in orphans {
                    println!("orphans.slug: {slug}");
                }
            }
        }
        None => {
            println!("graph.storage: <not built> (run `crosslink graph rebuild`)");
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn print_link_report(report: &CrosslinkReport) {
    println!("articles_total: {}", report.articles_total);
    println!("articles_changed: {}", report.articles_changed);
    println!("links_added: {}", report.links_added);
    println!("candidate_count: {}", report.candidate_count);
    for result in &report.articles {
        for link in &result.links {
            println!(
                "link.{}: [{}] -> {}",
                result.slug, link.phrase, link.target_slug
            );
        }
    }
}

fn print_scan_stats(prefix: &str, stats: &ScanStats) {
    println!("{prefix}.total_files: {}", stats.total_files);
    println!("{prefix}.titled: {}", stats.titled);
    println!("{prefix}.untitled: {}", stats.untitled);
}

fn print_graph_stats(prefix: &str, stats: &GraphStats) {
    println!("{prefix}.articles: {}", stats.articles);
    println!("{prefix}.links: {}", stats.links);
    println!("{prefix}.linked_articles: {}", stats.linked_articles);
    println!("{prefix}.orphan_articles: {}", stats.orphan_articles);
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        data_dir: runtime.data_dir.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
