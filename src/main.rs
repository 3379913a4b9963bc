//! `rahyab` - strategic intelligence analyst for the terminal
//!
//! Runs a streamed multi-phase analysis against a hosted model, prints
//! progress to stderr and the final briefing to stdout.

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use console::Style;
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::cli::{AnalyzeOptions, Cli, Commands, ConfigCommand, HistoryCommand};
use rahyab_core::agent::{AgentUpdate, AnalysisRequest, Analyst, ChatSession, ModelParameters};
use rahyab_core::config::{Settings, CONFIG_FILE_NAME};
use rahyab_core::llm::{GeminiClient, ModelTransport};
use rahyab_core::output::{OutputFormatter, StatusPrinter};
use rahyab_core::protocol::{InputMode, OperationStatus, StrategicBriefing};
use rahyab_core::store::{BriefingHistory, FeedbackBook, FileStore};
use rahyab_core::RahyabError;

mod cli;

/// Main entry point
#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // Parse command-line arguments
    let cli = Cli::parse();

    if cli.version {
        let blue = Style::new().blue();
        println!(
            "{} v{} ({})",
            blue.apply_to("rahyab"),
            env!("CARGO_PKG_VERSION"),
            env!("GIT_HASH")
        );
        return Ok(());
    }

    // Setup output formatting
    let formatter = OutputFormatter::new();

    // Load configuration
    let settings = Settings::load_with_env().context("Failed to load configuration")?;

    match cli.command {
        Some(Commands::Analyze { query, options }) => {
            handle_analyze(&query.join(" "), &options, &settings, &formatter).await?;
        }

        None if !cli.query.is_empty() => {
            let query = cli.query.join(" ");
            handle_analyze(&query, &AnalyzeOptions::default(), &settings, &formatter).await?;
        }

        Some(Commands::History { cmd }) => {
            handle_history(cmd, &formatter)?;
        }

        Some(Commands::Feedback { url, verdict }) => {
            let store = open_store()?;
            let current = FeedbackBook::new(&store).toggle(url.trim(), verdict)?;
            match current {
                Some(verdict) => println!("Feedback for {} set to {:?}", url, verdict),
                None => println!("Feedback for {} cleared", url),
            }
        }

        Some(Commands::Config { cmd }) => match cmd {
            Some(ConfigCommand::Init { force }) => {
                let path = Settings::user_config_path()?;
                if path.exists() && !force {
                    bail!("{} already exists (use --force to overwrite)", path.display());
                }
                let written = Settings::default().save(Some(&path))?;
                println!("Wrote {}", written.display());
            }
            Some(ConfigCommand::Show) | None => {
                println!("{}", formatter.render_settings(&settings));
                let local = std::path::Path::new(CONFIG_FILE_NAME);
                let source = if local.exists() {
                    local.to_path_buf()
                } else {
                    Settings::user_config_path()?
                };
                println!("- Config file: {}", source.display());
                println!("- Data store: {}", open_store()?.path().display());
            }
        },

        None => {
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}

/// Log to stderr, filtered by `RAHYAB_LOG` (default `warn`)
fn init_tracing() {
    let filter = EnvFilter::try_from_env("RAHYAB_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_store() -> Result<FileStore> {
    FileStore::open_default().context("Failed to open the local data store")
}

async fn handle_analyze(
    query: &str,
    options: &AnalyzeOptions,
    settings: &Settings,
    formatter: &OutputFormatter,
) -> Result<()> {
    if !settings.has_api_key() {
        bail!("No API key configured. Set RAHYAB_API_KEY (or GEMINI_API_KEY) and try again.");
    }

    let client = GeminiClient::new(&settings.endpoint).context("Failed to create model client")?;
    eprintln!("{}", Style::new().dim().apply_to(format!("Model: {}", client.model())));
    let transport: Arc<dyn ModelTransport> = Arc::new(client);
    let analyst = Analyst::new(transport.clone(), settings.clone());

    let level = options.level.unwrap_or(settings.default_search_level);
    let mode = if options.json_input {
        InputMode::Json
    } else {
        InputMode::Text
    };
    let request = AnalysisRequest::from_settings(query, level, mode, settings);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut printer = StatusPrinter::new(formatter.clone());
    printer.print(&OperationStatus::initial());

    let mut updates = analyst.run(request, cancel.clone());
    let mut outcome: Result<StrategicBriefing, RahyabError> = Err(RahyabError::ReportMissing);
    while let Some(item) = updates.next().await {
        match item {
            Ok(AgentUpdate::Status(status)) => printer.print(&status),
            Ok(AgentUpdate::Briefing(briefing)) => {
                outcome = Ok(briefing);
                break;
            }
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }
    drop(updates);

    let store = open_store()?;
    match outcome {
        Ok(mut briefing) => {
            FeedbackBook::new(&store).apply(&mut briefing)?;
            print_briefing(&briefing, options.json, formatter)?;

            if options.save && BriefingHistory::new(&store).save(&briefing)? {
                eprintln!("Saved briefing {}", briefing.id);
            }

            if options.chat {
                let parameters = ModelParameters::from_settings(settings);
                let session = ChatSession::for_briefing(transport, parameters, &briefing);
                run_chat(&session, &cancel).await?;
            }
            Ok(())
        }
        Err(e) => {
            let red = Style::new().red().bold();
            eprintln!("{} {}", red.apply_to("Error:"), e.user_message());

            let sources = printer
                .last()
                .map(|s| s.live_search_results.clone())
                .unwrap_or_default();
            if e != RahyabError::Cancelled && !sources.is_empty() {
                let briefing = StrategicBriefing::emergency(query, level, &e.user_message(), sources);
                print_briefing(&briefing, options.json, formatter)?;
                if options.save {
                    BriefingHistory::new(&store).save(&briefing)?;
                }
            }
            Err(e.into())
        }
    }
}

fn handle_history(cmd: HistoryCommand, formatter: &OutputFormatter) -> Result<()> {
    let store = open_store()?;
    let history = BriefingHistory::new(&store);

    match cmd {
        HistoryCommand::List => {
            println!("{}", formatter.render_history(&history.list()?));
        }
        HistoryCommand::Show { id, json } => {
            let Some(mut briefing) = history.find(&id)? else {
                bail!("No saved briefing with id {}", id);
            };
            FeedbackBook::new(&store).apply(&mut briefing)?;
            print_briefing(&briefing, json, formatter)?;
        }
        HistoryCommand::Delete { id } => {
            if history.delete(&id)? {
                println!("Deleted {}", id);
            } else {
                bail!("No saved briefing with id {}", id);
            }
        }
        HistoryCommand::Clear => {
            history.clear()?;
            println!("History cleared");
        }
    }
    Ok(())
}

fn print_briefing(briefing: &StrategicBriefing, json: bool, formatter: &OutputFormatter) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(briefing)?);
    } else {
        println!();
        println!("{}", formatter.render_briefing(briefing));
    }
    Ok(())
}

/// Read follow-up questions from stdin until EOF, `exit` or Ctrl-C.
async fn run_chat(session: &ChatSession, cancel: &CancellationToken) -> Result<()> {
    let bold = Style::new().bold();
    let red = Style::new().red();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    eprintln!();
    eprintln!("{}", bold.apply_to("Follow-up chat (type 'exit' to leave)"));
    loop {
        eprint!("> ");
        std::io::stderr().flush()?;

        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if matches!(message, "exit" | "quit") {
            break;
        }

        let mut replies = session.send(message);
        let mut printed = 0;
        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => break,
                item = replies.next() => item,
            };
            match item {
                Some(Ok(text)) => {
                    print!("{}", &text[printed..]);
                    std::io::stdout().flush()?;
                    printed = text.len();
                }
                Some(Err(e)) => {
                    println!();
                    eprintln!("{} {}", red.apply_to("Error:"), e.user_message());
                    break;
                }
                None => break,
            }
        }
        println!();
    }
    Ok(())
}
