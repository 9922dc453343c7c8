///
/// This module implements the CLI interface for wikibridge: command parsing,
/// credential checks, and wiring of the real store clients into the core engine.
///
/// All migration logic (rewriting, hierarchy, naming, batch sync) lives in the
/// [`wikibridge-core`] crate. This module is strictly CLI glue.
///
/// ## Exit codes
/// A command fails (non-zero exit) when required credentials are missing or a
/// source listing cannot be read. Individual documents that fail are reported
/// and do not change the exit code.
///
/// [`wikibridge-core`]: ../../wikibridge-core/
use crate::load_config::{load_config, SourceSection};
use crate::upload::XWikiClient;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use wikibridge_core::config::{CancelFlag, Hierarchy, SyncConfig, DEFAULT_PAGE_SIZE};
use wikibridge_core::confluence::ConfluenceClient;
use wikibridge_core::contract::{
    Dialect, DocumentBody, Namespace, SourceDocument, SourceStore, TargetStore,
};
use wikibridge_core::docx::read_docx;
use wikibridge_core::github::GitHubClient;
use wikibridge_core::memory::StaticSource;
use wikibridge_core::report::MigrationReport;
use wikibridge_core::synchronise::synchronise;

/// CLI for wikibridge: migrate wiki content into XWiki.
#[derive(Parser)]
#[clap(
    name = "wikibridge",
    version,
    about = "Migrate Confluence spaces, GitHub READMEs and Word documents into XWiki"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

/// Target wiki connection, shared by every command.
#[derive(Args, Debug, Clone)]
pub struct XWikiArgs {
    /// XWiki web application root
    #[clap(long = "xwiki-url", env = "XWIKI_EXTERNAL_URL", default_value = "http://localhost:8085/xwiki")]
    pub url: String,
    #[clap(long = "xwiki-user", env = "XWIKI_ADMIN_USER", default_value = "admin")]
    pub user: String,
    #[clap(long = "xwiki-password", env = "XWIKI_ADMIN_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

/// Options shared by every command that runs a migration.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Fetch, rewrite and name pages, print the plan, write nothing
    #[clap(long)]
    pub dry_run: bool,
    /// Print the report as JSON instead of a table
    #[clap(long)]
    pub json: bool,
    /// Per-call network timeout in seconds
    #[clap(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Migrate one Confluence space
    Migrate {
        #[clap(long, env = "CONFLUENCE_URL", default_value = "http://localhost:8090")]
        confluence_url: String,
        #[clap(long, env = "CONFLUENCE_USER", default_value = "admin")]
        confluence_user: String,
        #[clap(long, env = "CONFLUENCE_PASSWORD", hide_env_values = true)]
        confluence_password: Option<String>,
        /// Confluence space key
        #[clap(long, env = "CONFLUENCE_SPACE", default_value = "NETOPS")]
        space: String,
        /// Put every page directly under the space namespace
        #[clap(long)]
        flat: bool,
        #[clap(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
        #[clap(flatten)]
        xwiki: XWikiArgs,
        #[clap(flatten)]
        run: RunArgs,
    },
    /// Migrate all sources listed in a YAML config file
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        dry_run: bool,
        #[clap(long)]
        json: bool,
    },
    /// Import one Word (.docx) document as a page
    ImportWord {
        #[clap(long)]
        file: PathBuf,
        /// Target namespace
        #[clap(long, default_value = "Imported")]
        space: String,
        /// Page title; defaults to the file name without extension
        #[clap(long)]
        title: Option<String>,
        #[clap(flatten)]
        xwiki: XWikiArgs,
        #[clap(flatten)]
        run: RunArgs,
    },
    /// Print the page names of one target namespace
    ListPages {
        /// Dot-separated namespace, e.g. `Confluence_NETOPS`
        #[clap(long)]
        namespace: String,
        #[clap(flatten)]
        xwiki: XWikiArgs,
    },
}

fn store_error(context: &str, e: wikibridge_core::error::StoreError) -> anyhow::Error {
    anyhow::Error::msg(format!("{context}: {e}"))
}

/// A password is only optional when nothing will be written.
fn xwiki_client(args: &XWikiArgs, dry_run: bool, timeout: Duration) -> Result<XWikiClient> {
    let password = match (&args.password, dry_run) {
        (Some(p), _) if !p.is_empty() => p.clone(),
        (_, true) => String::new(),
        _ => anyhow::bail!("XWiki password missing: pass --xwiki-password or set XWIKI_ADMIN_PASSWORD"),
    };
    XWikiClient::new(&args.url, &args.user, password, timeout)
        .map_err(|e| store_error("Failed to construct XWiki client", e))
}

fn print_report(report: &MigrationReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

/// Cancel the run on Ctrl-C; documents already started still finish.
fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received; finishing current document and stopping");
            flag.cancel();
        }
    });
    cancel
}

async fn run_one(
    config: &SyncConfig,
    source: &dyn SourceStore,
    target: &dyn TargetStore,
    cancel: &CancelFlag,
    json: bool,
) -> Result<MigrationReport> {
    config.trace_loaded();
    let report = synchronise(config, source, target, cancel)
        .await
        .with_context(|| format!("Migration of {} failed", config.container))?;
    print_report(&report, json)?;
    Ok(report)
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Migrate {
            confluence_url,
            confluence_user,
            confluence_password,
            space,
            flat,
            page_size,
            xwiki,
            run,
        } => {
            let password = confluence_password
                .filter(|p| !p.is_empty())
                .context("Confluence password missing: pass --confluence-password or set CONFLUENCE_PASSWORD")?;
            let timeout = Duration::from_secs(run.timeout_secs);
            let source = ConfluenceClient::new(&confluence_url, confluence_user, password, timeout)
                .map_err(|e| store_error("Failed to construct Confluence client", e))?;
            let target = xwiki_client(&xwiki, run.dry_run, timeout)?;

            let mut config = SyncConfig::new(space.clone(), format!("Confluence_{space}"));
            config.page_size = page_size;
            config.hierarchy = if flat { Hierarchy::Flat } else { Hierarchy::Nested };
            config.dry_run = run.dry_run;
            config.timeout = timeout;
            config.banner = Some(format!("Confluence space **{space}**"));
            tracing::info!(command = "migrate", space = %space, "Starting migration");
            let cancel = cancel_on_ctrl_c();
            run_one(&config, &source, &target, &cancel, run.json).await?;
            Ok(())
        }
        Commands::Sync {
            config,
            dry_run,
            json,
        } => {
            let config = load_config(config)?;
            tracing::info!(command = "sync", sources = config.sources.len(), "Starting synchronisation process");
            let target_section = &config.target;
            let xwiki = XWikiArgs {
                url: target_section.base_url.clone(),
                user: target_section
                    .user
                    .clone()
                    .or_else(|| config.secrets.xwiki_user.clone())
                    .unwrap_or_else(|| "admin".to_string()),
                password: config.secrets.xwiki_password.clone(),
            };
            let dry_run = dry_run || target_section.dry_run;
            let target = xwiki_client(&xwiki, dry_run, target_section.timeout())?;
            let cancel = cancel_on_ctrl_c();

            let mut failed_sources = Vec::new();
            for section in &config.sources {
                if cancel.is_cancelled() {
                    break;
                }
                let source: Box<dyn SourceStore> = match section {
                    SourceSection::Confluence { base_url, .. } => {
                        let user = config.secrets.confluence_user.clone().unwrap_or_else(|| "admin".to_string());
                        let password = config
                            .secrets
                            .confluence_password
                            .clone()
                            .context("CONFLUENCE_PASSWORD missing in environment")?;
                        Box::new(
                            ConfluenceClient::new(base_url, user, password, target_section.timeout())
                                .map_err(|e| store_error("Failed to construct Confluence client", e))?,
                        )
                    }
                    SourceSection::Github { .. } => Box::new(
                        GitHubClient::new(config.secrets.github_token.clone(), target_section.timeout())
                            .map_err(|e| store_error("Failed to construct GitHub client", e))?,
                    ),
                };
                let sync_config = section.sync_config(target_section, dry_run);
                if let Err(e) = run_one(&sync_config, source.as_ref(), &target, &cancel, json).await {
                    tracing::error!(command = "sync", container = %section.container(), error = %e, "Source failed");
                    failed_sources.push(section.container().to_string());
                }
            }
            if failed_sources.is_empty() {
                tracing::info!(command = "sync", "Synchronisation complete");
                Ok(())
            } else {
                anyhow::bail!("Listing failed for sources: {}", failed_sources.join(", "))
            }
        }
        Commands::ImportWord {
            file,
            space,
            title,
            xwiki,
            run,
        } => {
            let bytes = std::fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let paragraphs = read_docx(&bytes).with_context(|| format!("Failed to read Word document {}", file.display()))?;
            let stem = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Imported".to_string());
            let id = file
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| stem.clone());
            let document = SourceDocument {
                id,
                title: title.unwrap_or(stem),
                body: DocumentBody::Paragraphs(paragraphs),
                dialect: Dialect::DocxParagraphs,
                ancestor_ids: Vec::new(),
                attachments: Vec::new(),
            };
            let timeout = Duration::from_secs(run.timeout_secs);
            let target = xwiki_client(&xwiki, run.dry_run, timeout)?;
            let mut config = SyncConfig::new("word", space);
            config.hierarchy = Hierarchy::Flat;
            config.dry_run = run.dry_run;
            config.timeout = timeout;
            tracing::info!(command = "import-word", file = %file.display(), "Importing Word document");
            let source = StaticSource::new(vec![document]);
            run_one(&config, &source, &target, &CancelFlag::new(), run.json).await?;
            Ok(())
        }
        Commands::ListPages { namespace, xwiki } => {
            let target = xwiki_client(&xwiki, true, Duration::from_secs(30))?;
            let namespace = Namespace::parse(&namespace);
            let pages = target
                .list_pages(&namespace)
                .await
                .map_err(|e| store_error("Failed to list pages", e))?;
            for page in pages {
                println!("{page}");
            }
            Ok(())
        }
    }
}
