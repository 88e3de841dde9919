//! CLI Module for devmind
//! Command-line surface over the snippet store and the AI explain/refactor
//! pipeline. Each invocation opens a session, runs one command and exits.

pub mod commands;

use crate::config::Config;
use crate::editor::TextRange;
use crate::models::{ExportFormat, SnippetStore, StorageManager};
use crate::session::Session;
use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use color_eyre::eyre::eyre;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "devmind", author, version)]
#[command(about = "Personal code snippet manager with AI-assisted explain and refactor")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Config file (default: <config dir>/devmind/config.toml)
    #[arg(long, global = true, env = "DEVMIND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Snippet data file, overrides the config file
    #[arg(long, global = true, env = "DEVMIND_DATA_FILE")]
    pub data_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "DEVMIND_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List snippets, newest first
    #[command(alias = "ls")]
    List {
        /// Only snippets carrying this tag
        #[arg(long)]
        tag: Option<String>,
    },
    /// Display a snippet
    #[command(aliases = ["view", "cat"])]
    Show { id: i64 },
    /// Search titles, code and tags
    #[command(alias = "find")]
    Search { query: String },
    /// Save a new snippet
    Add(AddArgs),
    /// Change an existing snippet
    Edit(EditArgs),
    /// Delete a snippet
    #[command(alias = "rm")]
    Delete { id: i64 },
    /// List tags with usage counts
    Tags,
    /// Ask the AI to explain code
    Explain(AiTargetArgs),
    /// Ask the AI to refactor code, optionally applying the fix
    Refactor {
        #[command(flatten)]
        target: AiTargetArgs,
        /// Write the suggested code back to the file or snippet
        #[arg(long)]
        apply: bool,
    },
    /// Export all snippets
    Export {
        path: PathBuf,
        /// Defaults to the file extension
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },
    /// Import snippets from an export or data file
    Import {
        path: PathBuf,
        /// Replace snippets whose id already exists
        #[arg(long)]
        overwrite: bool,
    },
    /// Copy the data file into the backups folder
    Backup,
    /// Known language tags
    Languages,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[arg(long)]
    pub title: String,
    /// Language tag; guessed from --file when omitted
    #[arg(long)]
    pub language: Option<String>,
    /// Comma-separated tags
    #[arg(long)]
    pub tags: Option<String>,
    /// Code text; read from stdin when neither --code nor --file is given
    #[arg(long, conflicts_with = "file")]
    pub code: Option<String>,
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    pub id: i64,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub language: Option<String>,
    #[arg(long)]
    pub tags: Option<String>,
    #[arg(long, conflicts_with = "file")]
    pub code: Option<String>,
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AiTargetArgs {
    /// File to send to the AI
    #[arg(long, conflicts_with = "snippet", required_unless_present = "snippet")]
    pub file: Option<PathBuf>,
    /// Stored snippet to send to the AI
    #[arg(long)]
    pub snippet: Option<i64>,
    /// Selection as character offsets START..END; whole document when omitted
    #[arg(long, value_parser = parse_range)]
    pub range: Option<TextRange>,
    /// Language tag; taken from the snippet or guessed from the file
    #[arg(long)]
    pub language: Option<String>,
    /// Seconds to wait for the reply
    #[arg(long, default_value_t = 120)]
    pub wait_secs: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Json,
    Yaml,
}

impl From<FormatArg> for ExportFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Yaml => ExportFormat::Yaml,
        }
    }
}

/// Parses `START..END` into a character range
pub fn parse_range(input: &str) -> std::result::Result<TextRange, String> {
    let (start, end) = input
        .split_once("..")
        .ok_or_else(|| format!("expected START..END, got '{}'", input))?;
    let start: usize = start
        .trim()
        .parse()
        .map_err(|_| format!("invalid range start '{}'", start))?;
    let end: usize = end
        .trim()
        .parse()
        .map_err(|_| format!("invalid range end '{}'", end))?;

    if start > end {
        return Err(format!("range start {} is after end {}", start, end));
    }
    Ok(TextRange::new(start, end))
}

impl Command {
    fn mutates_store(&self) -> bool {
        match self {
            Command::Add(_)
            | Command::Edit(_)
            | Command::Delete { .. }
            | Command::Import { .. } => true,
            Command::Refactor { target, apply } => *apply && target.snippet.is_some(),
            _ => false,
        }
    }
}

/// Executes the parsed command line
pub fn execute_cli(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref()).map_err(|e| eyre!("{:#}", e))?;
    if let Some(data_file) = cli.data_file {
        config.data_file = Some(data_file);
    }

    let data_file = config.data_file().map_err(|e| eyre!("{:#}", e))?;
    tracing::debug!(data_file = %data_file.display(), "opening snippet store");

    let store = SnippetStore::new(StorageManager::new(data_file), config.validation_policy());
    let mut session = Session::new(store, config.search_options(), config.ai.clone());

    if let Err(e) = session.init() {
        if cli.command.mutates_store() {
            return Err(eyre!(
                "{}; refusing to overwrite {} (run `devmind backup` or fix the file first)",
                e,
                session.store().storage().database_file().display()
            ));
        }
        println!("{}  {}: {}", "┃".bright_magenta(), session.status().red(), e);
    }

    match cli.command {
        Command::List { tag } => commands::list_snippets(&session, tag.as_deref()),
        Command::Show { id } => commands::show_snippet(&session, id),
        Command::Search { query } => commands::search_snippets(&session, &query),
        Command::Add(args) => commands::add_snippet(&mut session, args),
        Command::Edit(args) => commands::edit_snippet(&mut session, args),
        Command::Delete { id } => commands::delete_snippet(&mut session, id),
        Command::Tags => commands::list_tags(&session),
        Command::Explain(target) => commands::run_ai(
            &mut session,
            &config,
            crate::handlers::assistant::AiMode::Explain,
            target,
            false,
        ),
        Command::Refactor { target, apply } => commands::run_ai(
            &mut session,
            &config,
            crate::handlers::assistant::AiMode::Refactor,
            target,
            apply,
        ),
        Command::Export { path, format } => commands::export(&session, &path, format),
        Command::Import { path, overwrite } => commands::import(&mut session, &path, overwrite),
        Command::Backup => commands::backup(&session),
        Command::Languages => commands::list_languages(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("10..20").unwrap(), TextRange::new(10, 20));
        assert_eq!(parse_range(" 3 .. 3 ").unwrap(), TextRange::new(3, 3));
        assert!(parse_range("20..10").is_err());
        assert!(parse_range("10-20").is_err());
        assert!(parse_range("a..2").is_err());
    }

    #[test]
    fn test_refactor_args() {
        let cli = Cli::try_parse_from([
            "devmind", "refactor", "--snippet", "42", "--range", "0..5", "--apply",
        ])
        .unwrap();
        match &cli.command {
            Command::Refactor { target, apply } => {
                assert!(*apply);
                assert_eq!(target.snippet, Some(42));
                assert_eq!(target.range, Some(TextRange::new(0, 5)));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(cli.command.mutates_store());
    }

    #[test]
    fn test_ai_target_is_required() {
        assert!(Cli::try_parse_from(["devmind", "explain"]).is_err());
        assert!(
            Cli::try_parse_from(["devmind", "explain", "--file", "a.py", "--snippet", "1"])
                .is_err()
        );
    }

    #[test]
    fn test_read_only_commands_do_not_mutate() {
        let cli = Cli::try_parse_from(["devmind", "search", "fetch"]).unwrap();
        assert!(!cli.command.mutates_store());
        let cli = Cli::try_parse_from(["devmind", "refactor", "--file", "a.js", "--apply"]).unwrap();
        assert!(!cli.command.mutates_store());
    }
}
