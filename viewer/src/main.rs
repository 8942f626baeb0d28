use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use common::{JobId, TableView};
use jobtable::realtime::{spawn_subscriber, RealtimeOptions};
use jobtable::{render, Command, Config, JobTableController, JobsClient};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (.yaml, .yml or .toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Job server base url, e.g. http://localhost:5050/server
    #[arg(short, long, global = true)]
    server: Option<String>,
    /// Rows per page
    #[arg(long, global = true)]
    page_size: Option<usize>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a live job table that refreshes on worker events (default)
    Watch {
        /// Don't subscribe to worker events; refresh only on demand
        #[arg(long)]
        no_realtime: bool,
    },
    /// Print one page of the job table and exit
    List {
        #[arg(short, long, default_value_t = 1)]
        page: usize,
        #[arg(short, long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// Get job details
    Show {
        id: i64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Table,
    Csv,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(server) = cli.server {
        config.server.url = server;
    }
    if let Some(page_size) = cli.page_size {
        config.table.page_size = page_size;
    }
    config.validate()?;
    jobtable::logging::setup_logging(&config.logging)?;

    let client = JobsClient::from_config(&config)?;

    match cli.command.unwrap_or(Commands::Watch { no_realtime: false }) {
        Commands::Watch { no_realtime } => {
            if no_realtime {
                config.realtime.enabled = false;
            }
            watch(config, client).await
        }
        Commands::List { page, format } => list(&config, &client, page, format).await,
        Commands::Show { id } => {
            let job = client.get_job(JobId(id)).await?;
            print!("{}", render::render_job(&job));
            Ok(())
        }
    }
}

async fn list(config: &Config, client: &JobsClient, page: usize, format: Format) -> anyhow::Result<()> {
    let snapshot = client.fetch_jobs().await?;
    let mut table = TableView::new(config.table.sort_spec(), config.table.page_size);
    table.replace_data(snapshot.jobs);
    if !table.is_empty() && !table.go_to_page(page) {
        anyhow::bail!("Page {} does not exist ({} pages)", page, table.total_pages());
    }

    let current = table.current();
    match format {
        Format::Table => {
            println!("{}", render::render_page(&current, table.columns()));
            println!(
                "page {} of {} · {} jobs",
                current.number,
                current.total_pages.max(1),
                current.total_rows
            );
            if !snapshot.quarantined.is_empty() {
                eprintln!("{} malformed entries skipped", snapshot.quarantined.len());
            }
        }
        Format::Csv => print!("{}", render::to_csv(&current.rows, table.columns())?),
        Format::Json => println!("{}", serde_json::to_string_pretty(&current.rows)?),
    }
    Ok(())
}

async fn watch(config: Config, client: JobsClient) -> anyhow::Result<()> {
    let table = TableView::new(config.table.sort_spec(), config.table.page_size);
    let controller = JobTableController::new(Arc::new(client), table);
    let handle = controller.handle();
    let shutdown = CancellationToken::new();

    let subscriber = if config.realtime.enabled {
        let options = RealtimeOptions::from_config(&config)?;
        Some(spawn_subscriber(options, handle.clone(), shutdown.clone()))
    } else {
        log::info!("Worker events disabled, press r to refresh");
        None
    };

    // Line commands from stdin. A plain thread, so a pending read never
    // holds up runtime shutdown.
    let input = handle.clone();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::error!("Failed to read stdin: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(command) => {
                    if !input.command(command) {
                        break;
                    }
                }
                Err(e) => log::warn!("{}", e),
            }
        }
    });

    let interrupt = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.command(Command::Quit);
        }
    });

    controller
        .run(|state| {
            let mut stdout = std::io::stdout().lock();
            let _ = write!(stdout, "{}", render::render_screen(state));
            let _ = stdout.flush();
        })
        .await;

    shutdown.cancel();
    if let Some(subscriber) = subscriber {
        subscriber.await.context("Event subscriber panicked")?;
    }
    Ok(())
}
