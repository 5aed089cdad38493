use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::datastore::ThemePreference;
use crate::todo::Priority;
use crate::view::{FilterMode, SortMode};

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "todo",
    version,
    about = "Command-line client for a remote todo service",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "todorc", global = true)]
    pub todorc: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    /// Overrides both `api.url` and `TODO_API_URL`.
    #[arg(long = "api-url", global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create an account and sign in.
    Register(CredentialArgs),
    /// Sign in and keep the session token.
    Login(CredentialArgs),
    /// Sign out and forget the session token.
    Logout,
    /// Show who is signed in.
    Whoami,
    /// List todos.
    List(ListArgs),
    /// Create a todo.
    Add(AddArgs),
    /// Show one todo in detail.
    Show(IdArg),
    /// Change fields of a todo.
    Edit(EditArgs),
    /// Mark a todo completed.
    Done(IdArg),
    /// Mark a todo pending.
    Undo(IdArg),
    /// Flip the completed flag of a todo.
    Toggle(IdArg),
    /// Delete a todo.
    Delete(IdArg),
    /// Show totals over all todos.
    Stats(StatsArgs),
    /// Print or set the color theme.
    Theme {
        #[arg(value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<ThemePreference>()))]
        theme: Option<ThemePreference>,
    },
    /// Check that the server is reachable.
    Health,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Register(_) => "register",
            Command::Login(_) => "login",
            Command::Logout => "logout",
            Command::Whoami => "whoami",
            Command::List(_) => "list",
            Command::Add(_) => "add",
            Command::Show(_) => "show",
            Command::Edit(_) => "edit",
            Command::Done(_) => "done",
            Command::Undo(_) => "undo",
            Command::Toggle(_) => "toggle",
            Command::Delete(_) => "delete",
            Command::Stats(_) => "stats",
            Command::Theme { .. } => "theme",
            Command::Health => "health",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CredentialArgs {
    pub email: String,
    pub password: String,
}

#[derive(Args, Debug, Clone)]
pub struct IdArg {
    pub id: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[arg(long, short = 's')]
    pub search: Option<String>,

    #[arg(
        long,
        short = 'f',
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<FilterMode>())
    )]
    pub filter: Option<FilterMode>,

    #[arg(
        long,
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<SortMode>())
    )]
    pub sort: Option<SortMode>,

    /// Print the visible rows as JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,

    #[arg(long, short = 'd')]
    pub description: Option<String>,

    /// Date, date and time, or one of now/today/tomorrow/yesterday/+Nd.
    #[arg(long)]
    pub due: Option<String>,

    #[arg(
        long,
        short = 'p',
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Priority>())
    )]
    pub priority: Option<Priority>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long, short = 'd', conflicts_with = "clear_description")]
    pub description: Option<String>,

    #[arg(long)]
    pub clear_description: bool,

    #[arg(long, conflicts_with = "clear_due")]
    pub due: Option<String>,

    #[arg(long)]
    pub clear_due: bool,

    #[arg(
        long,
        short = 'p',
        conflicts_with = "clear_priority",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Priority>())
    )]
    pub priority: Option<Priority>,

    #[arg(long)]
    pub clear_priority: bool,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Lifts positional `rc.key=value` and `rc.key:value` arguments out of argv.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest
                .split_once('=')
                .or_else(|| rest.split_once(':'))
                .map(|(k, v)| (format!("rc.{k}"), v.to_string()));

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
