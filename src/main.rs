// src/main.rs

use anyhow::{bail, Context};
use clap::Parser;
use repo_pulse::analyzer::{self, compute_metrics};
use repo_pulse::cli::{Args, AskArgs, ChartsArgs, CollectArgs, Command, DeveloperArgs, MetricsArgs};
use repo_pulse::config::{AssistantConfig, Settings};
use repo_pulse::dashboard;
use repo_pulse::entities::{EntityCounts, HeuristicRecognizer};
use repo_pulse::github::extract_repo_info;
use repo_pulse::renderer::RenderOptions;
use repo_pulse::session::{Assistant, QueryResponse, Session, SessionCache};
use repo_pulse::snapshot::SnapshotStore;
use repo_pulse::summary::SummaryConfig;
use repo_pulse::{RepoId, RepoTables, Resource};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_logging(args.verbose);

    let settings = Settings::from_env(args.data_dir.clone());
    let start_time = Instant::now();

    match args.command {
        Command::Collect(cmd) => collect(&settings, cmd).await?,
        Command::Metrics(cmd) => metrics(&settings, cmd)?,
        Command::Charts(cmd) => charts(&settings, cmd)?,
        Command::Ask(cmd) => ask(&settings, cmd).await?,
        Command::Developer(cmd) => developer(&settings, cmd)?,
    }

    debug!("Total time: {:.2?}", start_time.elapsed());
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace,hyper=debug,reqwest=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .with_line_number(verbose >= 3)
        .init();
}

fn require_snapshot(store: &SnapshotStore, repo: &RepoId) -> anyhow::Result<()> {
    if !store.exists(repo) {
        bail!(
            "No snapshot for {} in {}. Run `repo-pulse collect https://github.com/{}` first.",
            repo,
            store.repo_dir(repo).display(),
            repo
        );
    }
    Ok(())
}

fn load_tables(store: &SnapshotStore, repo: &RepoId) -> anyhow::Result<RepoTables> {
    require_snapshot(store, repo)?;
    store
        .load(repo)
        .with_context(|| format!("Failed to load snapshot for {}", repo))
}

async fn collect(settings: &Settings, cmd: CollectArgs) -> anyhow::Result<()> {
    let repo = extract_repo_info(&cmd.url)?;
    let client = settings.github_client(cmd.max_pages, !cmd.no_details, true)?;
    let store = SnapshotStore::new(&settings.data_dir);

    if store.exists(&repo) && !cmd.refresh {
        println!(
            "Snapshot for {} already exists at {}. Use --refresh to fetch again.",
            repo,
            store.repo_dir(&repo).display()
        );
        return Ok(());
    }

    let started = Instant::now();
    let outcome = client.fetch_all(&repo).await;
    let failed = outcome.failed();
    let (tables, errors) = outcome.into_tables();

    for error in &errors {
        eprintln!("warning: {}", error);
    }
    if failed.len() == Resource::ALL.len() {
        bail!("Nothing was collected for {}", repo);
    }

    let fetched: Vec<Resource> =
        Resource::ALL.into_iter().filter(|r| !failed.contains(r)).collect();
    let dir = store.save(&repo, &tables, &fetched)?;
    store.save_metrics(&repo, &compute_metrics(&tables).to_rows())?;

    println!(
        "Collected {} commits, {} pull requests and {} issues in {:.2?}.",
        tables.commits.len(),
        tables.pull_requests.len(),
        tables.issues.len(),
        started.elapsed()
    );
    println!("Snapshot written to {}", dir.display());
    Ok(())
}

fn metrics(settings: &Settings, cmd: MetricsArgs) -> anyhow::Result<()> {
    let repo = extract_repo_info(&cmd.url)?;
    let store = SnapshotStore::new(&settings.data_dir);
    let tables = load_tables(&store, &repo)?;

    let snapshot = compute_metrics(&tables);
    println!("Metrics for {}\n", repo);
    println!("{}", snapshot);

    if cmd.export {
        let path = store.save_metrics(&repo, &snapshot.to_rows())?;
        println!("Metric table written to {}", path.display());
    }
    Ok(())
}

fn charts(settings: &Settings, cmd: ChartsArgs) -> anyhow::Result<()> {
    let repo = extract_repo_info(&cmd.url)?;
    let store = SnapshotStore::new(&settings.data_dir);
    let tables = load_tables(&store, &repo)?;

    let entities = EntityCounts::from_commits(&HeuristicRecognizer::default(), &tables.commits);
    let charts = dashboard::dashboard_charts(&tables, &entities, cmd.top_authors);
    if charts.is_empty() {
        bail!("The snapshot for {} has no data to chart", repo);
    }

    let output = cmd.output.unwrap_or_else(|| store.repo_dir(&repo).join("charts"));
    let options = RenderOptions {
        width: cmd.render.width,
        height: cmd.render.height,
    };
    let started = Instant::now();
    let paths = dashboard::render_dashboard(&charts, &output, &options, true)?;

    println!("Rendered {} charts in {:.2?}:", paths.len(), started.elapsed());
    for path in paths {
        println!("  {}", path.display());
    }
    Ok(())
}

async fn open_session(
    store: &SnapshotStore,
    repo: &RepoId,
    summary: &SummaryConfig,
) -> repo_pulse::Result<Session> {
    let tables = store.load(repo)?;
    Ok(Session::new(repo.clone(), Arc::new(tables), &HeuristicRecognizer::default(), summary))
}

async fn ask(settings: &Settings, cmd: AskArgs) -> anyhow::Result<()> {
    let config = AssistantConfig {
        llm: cmd.llm,
        model: cmd.model.clone(),
        classifier: cmd.classifier,
        index: cmd.index,
        embedder: cmd.embedder,
        summary: SummaryConfig {
            top_authors: cmd.top_authors,
            top_entities: cmd.top_entities,
            ..Default::default()
        },
        render: RenderOptions {
            width: cmd.render.width,
            height: cmd.render.height,
        },
    };
    let assistant = settings.assistant(&config)?;
    let store = SnapshotStore::new(&settings.data_dir);
    let sessions = SessionCache::new();

    let mut repo = extract_repo_info(&cmd.url)?;
    require_snapshot(&store, &repo)?;
    let mut session = sessions
        .get_or_try_insert_with(&repo, || open_session(&store, &repo, &config.summary))
        .await?;
    let output = |repo: &RepoId| {
        cmd.output
            .clone()
            .unwrap_or_else(|| store.repo_dir(repo).join("answers"))
    };

    if !cmd.question.is_empty() {
        let question = cmd.question.join(" ");
        return answer(&assistant, &session, &question, &output(&repo)).await;
    }

    println!("Asking about {}. Commands: /repo <url>, /reload, /quit.", repo);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        if line.is_empty() {
            continue;
        } else if line == "/quit" {
            break;
        } else if line == "/reload" {
            sessions.invalidate(&repo);
            match sessions
                .get_or_try_insert_with(&repo, || open_session(&store, &repo, &config.summary))
                .await
            {
                Ok(reloaded) => {
                    session = reloaded;
                    println!("Reloaded {}.", repo);
                }
                Err(e) => eprintln!("error: {}", e),
            }
        } else if let Some(url) = line.strip_prefix("/repo ") {
            match extract_repo_info(url) {
                Ok(next) => {
                    let open = || open_session(&store, &next, &config.summary);
                    let loaded = sessions.get_or_try_insert_with(&next, open).await;
                    match loaded {
                        Ok(next_session) => {
                            repo = next;
                            session = next_session;
                            println!("Now asking about {}.", repo);
                        }
                        Err(e) => eprintln!("error: {:#}", e),
                    }
                }
                Err(e) => eprintln!("error: {}", e),
            }
        } else if let Err(e) = answer(&assistant, &session, line, &output(&repo)).await {
            // One failed question does not end the session
            eprintln!("error: {:#}", e);
        }
    }
    Ok(())
}

async fn answer(
    assistant: &Assistant,
    session: &Session,
    question: &str,
    output: &Path,
) -> anyhow::Result<()> {
    match assistant.ask(session, question).await? {
        QueryResponse::Text(text) => println!("{}", text),
        QueryResponse::Fallback(message) => println!("{}", message),
        QueryResponse::Chart(chart) => {
            fs::create_dir_all(output)?;
            let path: PathBuf = output.join(format!(
                "{}_{}.png",
                chrono::Utc::now().format("%Y%m%d_%H%M%S"),
                chart.template
            ));
            fs::write(&path, &chart.png)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Chart ({}) written to {}", chart.template, path.display());
        }
    }
    Ok(())
}

fn developer(settings: &Settings, cmd: DeveloperArgs) -> anyhow::Result<()> {
    let repo = extract_repo_info(&cmd.url)?;
    let store = SnapshotStore::new(&settings.data_dir);
    let tables = load_tables(&store, &repo)?;

    let Some(profile) = analyzer::developer_profile(&tables, &cmd.author) else {
        warn!(author = %cmd.author, "no commits found");
        bail!("No commits by '{}' in the snapshot for {}", cmd.author, repo);
    };

    println!("Developer {} in {}\n", profile.author, repo);
    println!("Commits:        {}", profile.commits);
    println!("First commit:   {}", profile.first_commit.to_rfc2822());
    println!("Last commit:    {}", profile.last_commit.to_rfc2822());
    println!("Lines added:    {}", profile.additions);
    println!("Lines removed:  {}", profile.deletions);
    println!("Pull requests:  {}", profile.pull_requests);
    if !profile.commit_types.is_empty() {
        println!("\nCommit types:");
        for (kind, count) in &profile.commit_types {
            println!("  {:<12} {}", kind, count);
        }
    }
    Ok(())
}
