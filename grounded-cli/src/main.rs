use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use grounded_core::guardrails::format_source_line;
use grounded_core::{
    answer_question, build_system_prompt, build_user_prompt, plan_question, QaResponse, Row,
};
use grounded_ingest::{write_setting_value, CsvDirectory, Snapshot, SnapshotCache, SETTING_KEYS};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod audit;
mod auth;
mod config;
mod llm;
mod state;

use config::Config;
use llm::LlmClient;

const MAX_QUESTION_CHARS: usize = 1000;

#[derive(Parser, Debug)]
#[command(
    name = "grounded",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GROUNDED_BUILD_SHA"), ")"),
    about = "Answer business questions strictly from sheet data"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer one question
    Ask {
        question: String,

        /// Directory with the sheet's CSV tabs (defaults to [data].dir)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Answer questions read line by line from stdin, sharing one cached snapshot
    Chat {
        #[arg(long)]
        data: Option<PathBuf>,
    },

    /// Show intent, evidence, scope and analysis without calling the model
    Inspect {
        question: String,

        #[arg(long)]
        data: Option<PathBuf>,

        /// Also print the system and user prompts
        #[arg(long)]
        prompt: bool,
    },

    /// Edit the settings tab
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },

    /// Manage ~/.grounded/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Store provider API keys in ~/.grounded/auth.json
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },

    /// Read the answer audit log
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Set one key in settings.csv (creates the row when missing)
    Set {
        key: String,
        value: String,

        #[arg(long)]
        data: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default config if none exists
    Init,
    /// Print the effective config
    Show,
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    SetOpenaiKey,
    SetAnthropicKey,
}

#[derive(Subcommand, Debug)]
enum AuditCommand {
    /// Print the most recent entries
    Tail {
        #[arg(short = 'n', long, default_value_t = 10)]
        n: usize,
    },
}

#[derive(Serialize)]
struct AskOutput<'a> {
    audit_id: Uuid,
    #[serde(flatten)]
    response: &'a QaResponse,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Ask { question, data, json } => {
            let question = validate_question(&question)?;
            let cfg = config::load_config()?;
            let client = LlmClient::new(&cfg.llm, &auth::load_auth()?)?;
            let mut cache = snapshot_cache(&cfg, data);
            let snap = cache.get()?;
            ask(question, &snap, &client, json).await?;
        }

        Command::Chat { data } => {
            let cfg = config::load_config()?;
            let client = LlmClient::new(&cfg.llm, &auth::load_auth()?)?;
            let mut cache = snapshot_cache(&cfg, data);
            chat(&mut cache, &client).await?;
        }

        Command::Inspect { question, data, prompt } => {
            let question = validate_question(&question)?;
            let cfg = config::load_config()?;
            let snap = snapshot_cache(&cfg, data).get()?;
            let plan = plan_question(question, &snap.dataset, &snap.settings);
            println!("{}", serde_json::to_string_pretty(&plan)?);
            if prompt {
                let rows: Vec<Row> = plan.evidence.rows.iter().map(|r| r.row.clone()).collect();
                println!("\n# System prompt\n{}", build_system_prompt(&snap.settings));
                println!(
                    "\n# User prompt\n{}",
                    build_user_prompt(question, &rows, plan.analysis.as_ref())?
                );
            }
        }

        Command::Settings { command } => match command {
            SettingsCommand::Set { key, value, data } => {
                let key = key.trim();
                if key.is_empty() {
                    bail!("setting key must not be empty");
                }
                if !SETTING_KEYS.contains(&key) {
                    warn!(key, "not a recognised setting; writing anyway");
                }
                let cfg = config::load_config()?;
                let dir = data.unwrap_or(cfg.data.dir);
                write_setting_value(&dir, key, &value)?;
                println!("Set {key} in {}", dir.join("settings.csv").display());
            }
        },

        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => {
                let cfg = config::load_config()?;
                println!("# {}", config::config_path()?.display());
                print!("{}", toml::to_string_pretty(&cfg)?);
            }
        },

        Command::Auth { command } => match command {
            AuthCommand::SetOpenaiKey => auth::set_openai_key()?,
            AuthCommand::SetAnthropicKey => auth::set_anthropic_key()?,
        },

        Command::Audit { command } => match command {
            AuditCommand::Tail { n } => {
                let entries = audit::tail(&audit::audit_path()?, n)?;
                audit::print_entries(&entries);
            }
        },
    }

    Ok(())
}

/// Trimmed question, rejected when empty or longer than [`MAX_QUESTION_CHARS`].
fn validate_question(question: &str) -> Result<&str> {
    let q = question.trim();
    if q.is_empty() {
        bail!("question must not be empty");
    }
    let len = q.chars().count();
    if len > MAX_QUESTION_CHARS {
        bail!("question is {len} characters; the limit is {MAX_QUESTION_CHARS}");
    }
    Ok(q)
}

fn snapshot_cache(cfg: &Config, data: Option<PathBuf>) -> SnapshotCache<CsvDirectory> {
    let dir = data.unwrap_or_else(|| cfg.data.dir.clone());
    SnapshotCache::new(CsvDirectory::new(dir, cfg.settings_defaults()))
}

async fn ask(question: &str, snap: &Snapshot, client: &LlmClient, json: bool) -> Result<()> {
    let resp = answer_question(question, &snap.dataset, &snap.settings, client).await?;

    let entry = audit::AuditEntry::from_response(&audit::current_user(), question, &resp)?;
    audit::append(&audit::audit_path()?, &entry)?;
    info!(audit_id = %entry.id, refusal = resp.refusal, "answered");

    if json {
        let out = AskOutput {
            audit_id: entry.id,
            response: &resp,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", resp.answer);
        if !resp.sources.is_empty() {
            eprintln!();
            for g in &resp.sources {
                eprintln!("cited {}", format_source_line(g));
            }
        }
    }
    Ok(())
}

async fn chat(cache: &mut SnapshotCache<CsvDirectory>, client: &LlmClient) -> Result<()> {
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        let question = match validate_question(line) {
            Ok(q) => q,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        let snap = cache.get()?;
        if let Err(e) = ask(question, &snap, client, false).await {
            eprintln!("error: {e:#}");
        }
        println!();
    }
    Ok(())
}
