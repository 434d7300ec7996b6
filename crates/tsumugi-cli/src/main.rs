//! Tsumugi CLI - Streaming chat, documents and usage
//!
//! Thin client over the Tsumugi HTTP API.

mod api;
mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::{Input, Password};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use api::{
    ChatRequest, FileChatRequest, FileQueryRequest, IngestRequest, StreamEvent, TsumugiClient,
};
use config::Config;

#[derive(Parser)]
#[command(name = "tsumugi")]
#[command(about = "Tsumugi CLI - Streaming chat, documents and usage", long_about = None)]
#[command(version)]
struct Cli {
    /// Log requests and raw events to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Login and store API key
    Login {
        /// API key (will prompt if not provided)
        #[arg(short, long)]
        key: Option<String>,
        /// Server URL (keeps the configured one if omitted)
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Send a message and stream the answer
    Chat {
        /// Message text (will prompt if not provided)
        message: Option<String>,
        /// Conversation thread (defaults to the configured thread)
        #[arg(short, long)]
        thread: Option<String>,
        /// Extra system instructions for this turn
        #[arg(short, long)]
        instructions: Option<String>,
    },

    /// Document operations
    Docs {
        #[command(subcommand)]
        action: DocsAction,
    },

    /// Show token usage and cost
    Usage {
        /// Totals per model instead of individual records
        #[arg(short, long)]
        summary: bool,
        /// Only usage of the configured API key
        #[arg(long)]
        key_only: bool,
    },

    /// Show current configuration
    Config {
        /// Set the default thread
        #[arg(long)]
        default_thread: Option<String>,
    },
}

#[derive(Subcommand)]
enum DocsAction {
    /// Search ingested documents
    Search {
        /// Search query
        query: String,
        /// Max results (1-10)
        #[arg(short = 'k', long)]
        top_k: Option<i64>,
        /// Search this thread first
        #[arg(short, long)]
        thread: Option<String>,
    },
    /// Ask a question answered from your documents
    Ask {
        /// Question text
        message: String,
        /// Chunks per search (1-10)
        #[arg(short = 'k', long)]
        top_k: Option<i64>,
        /// Search this thread first
        #[arg(short, long)]
        thread: Option<String>,
    },
    /// Ingest plain text
    Ingest {
        /// Text content (or use -f for file)
        content: Option<String>,
        /// Read content from file
        #[arg(short, long)]
        file: Option<String>,
        /// Document title (defaults to the file name)
        #[arg(long)]
        title: Option<String>,
        /// Attach the document to a thread
        #[arg(short, long)]
        thread: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("tsumugi=debug,tsumugi_cli=debug"))
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Login { key, base_url } => cmd_login(key, base_url).await,
        Commands::Chat {
            message,
            thread,
            instructions,
        } => cmd_chat(message, thread, instructions).await,
        Commands::Docs { action } => cmd_docs(action).await,
        Commands::Usage { summary, key_only } => cmd_usage(summary, key_only).await,
        Commands::Config { default_thread } => cmd_config(default_thread),
    }
}

// ============================================
// Command Implementations
// ============================================

fn client(config: &Config) -> Result<TsumugiClient> {
    Ok(TsumugiClient::new(&config.base_url, config.api_key()?))
}

async fn cmd_login(key: Option<String>, base_url: Option<String>) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(url) = base_url {
        config.base_url = url;
    }

    let api_key = match key {
        Some(k) => k,
        None => Password::new()
            .with_prompt("API Key")
            .interact()
            .context("Failed to read API key")?,
    };

    let client = TsumugiClient::new(&config.base_url, &api_key);
    print!("Testing connection... ");
    std::io::stdout().flush().ok();

    match client.health().await {
        Ok(true) => {}
        _ => {
            println!("{}", "Failed".red());
            bail!("Could not reach Tsumugi API at {}", config.base_url);
        }
    }

    // /health is public; a usage read proves the key works
    if let Err(e) = client.usage_summary(true).await {
        println!("{}", "Failed".red());
        bail!("API key rejected: {}", e);
    }
    println!("{}", "OK".green());

    config.set_api_key(api_key);
    config.save()?;

    println!("{} API key saved to {:?}", "✓".green(), Config::config_path()?);

    if config.default_thread.is_none() {
        println!("\n{}", "Tip: set a default thread to skip --thread:".yellow());
        println!("  tsumugi config --default-thread <THREAD_ID>");
    }

    Ok(())
}

async fn cmd_chat(
    message: Option<String>,
    thread: Option<String>,
    instructions: Option<String>,
) -> Result<()> {
    let config = Config::load()?;
    let client = client(&config)?;

    let thread_id = config
        .thread(thread)
        .context("No thread specified and no default thread set. Use -t <thread>.")?;

    let input = match message {
        Some(m) => m,
        None => Input::new()
            .with_prompt("Message")
            .interact_text()
            .context("Failed to read input")?,
    };

    let request = ChatRequest {
        thread_id,
        input,
        instructions,
    };

    let mut failure = None;
    client
        .chat(&request, |event| match event {
            StreamEvent::Started => {}
            StreamEvent::Delta { content } => {
                print!("{}", content);
                std::io::stdout().flush().ok();
            }
            StreamEvent::Done { .. } => println!(),
            StreamEvent::ToolCall { tool_call } => {
                println!();
                println!("{}", "Tool calls for the client:".yellow());
                for call in tool_call {
                    println!(
                        "  {} {} {}",
                        call.id.dimmed(),
                        call.name.cyan(),
                        call.arguments
                    );
                }
            }
            StreamEvent::Error { message } => failure = Some(message),
        })
        .await?;

    if let Some(message) = failure {
        println!();
        bail!("Chat failed: {}", message);
    }

    Ok(())
}

async fn cmd_docs(action: DocsAction) -> Result<()> {
    let config = Config::load()?;
    let client = client(&config)?;

    match action {
        DocsAction::Search {
            query,
            top_k,
            thread,
        } => {
            let hits = client
                .search_documents(&FileQueryRequest {
                    query: query.clone(),
                    top_k,
                    thread_id: config.thread(thread),
                })
                .await?;

            if hits.is_empty() {
                println!("No documents match '{}'", query);
                return Ok(());
            }

            println!("{} results for '{}':", hits.len().to_string().green(), query);
            for hit in hits {
                println!(
                    "  {} {:.3} {}",
                    format!("[{}]", hit.citation).dimmed(),
                    hit.similarity,
                    truncate_string(&hit.content, 60)
                );
            }
        }

        DocsAction::Ask {
            message,
            top_k,
            thread,
        } => {
            let answer = client
                .ask_documents(&FileChatRequest {
                    message,
                    thread_id: config.thread(thread),
                    top_k,
                })
                .await?;

            println!("{}", answer.answer);
            if answer.no_sources {
                println!("\n{}", "No matching sources in your documents.".yellow());
                return Ok(());
            }

            println!("\n{}", "Sources:".bold());
            for citation in &answer.citations {
                println!("  {}", citation.dimmed());
            }
            for preview in &answer.previews {
                println!(
                    "  [{}] {:.3} {}",
                    preview.index,
                    preview.similarity,
                    truncate_string(&preview.preview, 60)
                );
            }
        }

        DocsAction::Ingest {
            content,
            file,
            title,
            thread,
        } => {
            let (text, filename) = match (content, file) {
                (Some(c), None) => (c, None),
                (None, Some(f)) => {
                    let text = fs::read_to_string(&f)
                        .with_context(|| format!("Failed to read file: {}", f))?;
                    let name = Path::new(&f)
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned());
                    (text, name)
                }
                (Some(_), Some(_)) => bail!("Cannot specify both content and --file"),
                (None, None) => (
                    Input::new()
                        .with_prompt("Document text")
                        .interact_text()
                        .context("Failed to read input")?,
                    None,
                ),
            };

            let document = client
                .ingest_document(&IngestRequest {
                    text,
                    title,
                    filename,
                    thread_id: config.thread(thread),
                })
                .await?;

            println!(
                "{} Ingested {} ({} chunks)",
                "✓".green(),
                document.title.cyan(),
                document.chunk_count
            );
            println!("  {}", document.document_id.to_string().dimmed());
        }
    }

    Ok(())
}

async fn cmd_usage(summary: bool, key_only: bool) -> Result<()> {
    let config = Config::load()?;
    let client = client(&config)?;

    if summary {
        let summary = client.usage_summary(key_only).await?;
        println!("{}", "Usage by model:".bold());
        for row in &summary.by_model {
            println!(
                "  {} {} {} calls, {} in / {} out, {:.6}",
                row.provider.dimmed(),
                row.model.cyan(),
                row.totals.count,
                row.totals.tokens_in,
                row.totals.tokens_out,
                row.totals.cost
            );
        }
        println!(
            "{} {} tokens, {:.6} over {} calls",
            "Total:".bold(),
            summary.totals.tokens_total,
            summary.totals.cost,
            summary.totals.count
        );
        return Ok(());
    }

    let records = client.usage(key_only).await?;
    if records.is_empty() {
        println!("No usage recorded.");
        return Ok(());
    }

    for record in records {
        println!(
            "  {} {} {} tokens {:.6} {}",
            record.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            record.model.cyan(),
            record.tokens_total,
            record.cost,
            record.currency
        );
    }

    Ok(())
}

/// Truncate string safely for UTF-8 (by char count, not bytes)
fn truncate_string(s: &str, max_chars: usize) -> String {
    let chars: Vec<char> = s.chars().take(max_chars).collect();
    if s.chars().count() > max_chars {
        format!("{}...", chars.into_iter().collect::<String>())
    } else {
        s.to_string()
    }
}

fn cmd_config(default_thread: Option<String>) -> Result<()> {
    let mut config = Config::load()?;

    if let Some(thread) = default_thread {
        config.default_thread = Some(thread.clone());
        config.save()?;
        println!("{} Default thread set to '{}'", "✓".green(), thread);
    }

    println!("{}", "Configuration:".bold());
    println!("  Path: {:?}", Config::config_path()?);
    println!("  Base URL: {}", config.base_url);
    println!(
        "  API Key: {}",
        if config.api_key.is_some() {
            "Set".green()
        } else {
            "Not set".red()
        }
    );
    println!(
        "  Default Thread: {}",
        config.default_thread.as_deref().unwrap_or("None").cyan()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string_counts_chars() {
        assert_eq!(truncate_string("紡ぎ糸", 2), "紡ぎ...");
        assert_eq!(truncate_string("short", 10), "short");
    }
}
