use crate::cli::{AddArgs, AiTargetArgs, EditArgs, FormatArg};
use crate::config::Config;
use crate::editor::{ApplyOutcome, TextBuffer};
use crate::handlers::assistant::{AiMode, AssistantClient, dispatch};
use crate::models::snippet::{
    DEFAULT_LANGUAGE, display_name, known_languages, language_from_extension,
};
use crate::models::{ExportFormat, Snippet, export_snippets, import_snippets};
use crate::search::filter_by_tag;
use crate::session::{AiExchange, Session};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, bail, eyre};
use colored::{ColoredString, Colorize};
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn bar() -> ColoredString {
    "┃".bright_magenta()
}

fn rule() {
    println!("{}", "─".repeat(60).bright_magenta());
}

/// Lists snippets newest first, optionally only those carrying `tag`
pub fn list_snippets(session: &Session, tag: Option<&str>) -> Result<()> {
    let snippets: Vec<&Snippet> = match tag {
        Some(tag) => filter_by_tag(session.snippets(), tag),
        None => session.snippets().iter().collect(),
    };

    if snippets.is_empty() {
        match tag {
            Some(tag) => println!("{}  No snippets tagged '{}'.", bar(), tag),
            None => println!(
                "{}  No snippets yet. Add one with `devmind add --title ...`",
                bar()
            ),
        }
        return Ok(());
    }

    println!("{}  {} snippets:", bar(), snippets.len());
    rule();
    print_snippet_rows(&snippets, None);
    Ok(())
}

/// Shows the content of a specific snippet by ID
pub fn show_snippet(session: &Session, id: i64) -> Result<()> {
    if let Some(snippet) = session.store().get(id) {
        display_snippet_content(snippet);
        return Ok(());
    }

    println!("{}  Snippet not found with ID: {}", bar(), id);
    if session.store().is_empty() {
        return Ok(());
    }

    println!("{}  Available snippets:", bar());
    rule();
    for snippet in session.snippets().iter().take(10) {
        println!(
            "{}  {} {}",
            bar(),
            snippet.id.to_string().yellow(),
            snippet.title.bright_white()
        );
    }
    if session.store().len() > 10 {
        println!(
            "{}  ... and {} more",
            bar(),
            session.store().len() - 10
        );
    }
    Ok(())
}

fn display_snippet_content(snippet: &Snippet) {
    println!(
        "{}  {} {}",
        bar(),
        "SNIPPET".bright_green().bold(),
        snippet.title.bold()
    );
    rule();
    println!(
        "{}  {}: {}",
        bar(),
        "Language".bright_yellow(),
        display_name(&snippet.language)
    );
    if !snippet.tags.is_empty() {
        println!(
            "{}  {}: {}",
            bar(),
            "Tags".bright_cyan(),
            snippet.tags.join(", ")
        );
    }
    println!(
        "{}  {}: {}",
        bar(),
        "Lines".bright_blue(),
        snippet.get_line_count()
    );
    println!("{}  {}: {}", bar(), "ID".bright_black(), snippet.id);
    rule();

    for line in snippet.code.lines() {
        println!("{}  {}", bar(), line);
    }
}

/// Searches titles, code and tags
pub fn search_snippets(session: &Session, query: &str) -> Result<()> {
    let results = session.search(query);

    println!(
        "{}  {} '{}'",
        bar(),
        "SEARCH RESULTS FOR".bold(),
        query.bright_white()
    );

    if results.is_empty() {
        println!("{}  No snippets found matching query: {}", bar(), query);
        return Ok(());
    }

    println!(
        "{}  Found {} snippets matching '{}':",
        bar(),
        results.len(),
        query
    );
    rule();
    print_snippet_rows(&results, Some(query));
    Ok(())
}

fn print_snippet_rows(snippets: &[&Snippet], query: Option<&str>) {
    for (idx, snippet) in snippets.iter().enumerate() {
        let matched = query
            .map(|q| format!(" (match in: {})", match_field(snippet, q).bright_green()))
            .unwrap_or_default();

        println!(
            "{}  {}. {} {}{}",
            bar(),
            (idx + 1).to_string().bright_yellow(),
            snippet.title.bright_white().bold(),
            format!("[{}]", display_name(&snippet.language)).bright_green(),
            matched
        );
        if !snippet.tags.is_empty() {
            println!(
                "{}     {}: {}",
                bar(),
                "Tags".bright_cyan(),
                snippet.tags.join(", ")
            );
        }
        println!("{}     {}: {}", bar(), "ID".bright_black(), snippet.id);

        if idx < snippets.len() - 1 {
            println!("{}  {}", bar(), "─".repeat(40).bright_black());
        }
    }
}

fn match_field(snippet: &Snippet, query: &str) -> &'static str {
    let query = query.to_lowercase();
    if snippet.title.to_lowercase().contains(&query) {
        "title"
    } else if snippet
        .tags
        .iter()
        .any(|tag| tag.to_lowercase().contains(&query))
    {
        "tags"
    } else {
        "code"
    }
}

pub fn add_snippet(session: &mut Session, args: AddArgs) -> Result<()> {
    let code = read_code(args.code, args.file.as_deref())?;
    let language = resolve_language(args.language.as_deref(), args.file.as_deref());
    let tags = args.tags.unwrap_or_default();

    let id = session.save_snippet(&args.title, &code, &language, &tags)?;
    check_persisted(session)?;

    let id = id.map(|id| id.to_string()).unwrap_or_default();
    println!(
        "{}  {} {}",
        bar(),
        session.status().bright_green(),
        format!("(ID {})", id).bright_black()
    );
    Ok(())
}

/// Unset fields keep their current value
pub fn edit_snippet(session: &mut Session, args: EditArgs) -> Result<()> {
    let Some(existing) = session.store().get(args.id).cloned() else {
        bail!("Snippet not found with ID: {}", args.id);
    };

    let code = match (args.code, args.file.as_deref()) {
        (None, None) => existing.code,
        (code, file) => read_code(code, file)?,
    };
    let title = args.title.unwrap_or(existing.title);
    let language = args.language.unwrap_or(existing.language);
    let tags = args.tags.unwrap_or_else(|| existing.tags.join(", "));

    session.begin_edit(args.id);
    if session
        .save_snippet(&title, &code, &language, &tags)?
        .is_none()
    {
        bail!("Snippet not found with ID: {}", args.id);
    }
    check_persisted(session)?;

    println!("{}  {}", bar(), session.status().bright_green());
    Ok(())
}

pub fn delete_snippet(session: &mut Session, id: i64) -> Result<()> {
    if !session.delete_snippet(id) {
        println!("{}  Snippet not found with ID: {}", bar(), id);
        return Ok(());
    }
    check_persisted(session)?;

    println!("{}  {} {}", bar(), session.status().bright_green(), id);
    Ok(())
}

pub fn list_tags(session: &Session) -> Result<()> {
    let tags = session.store().tags();
    if tags.is_empty() {
        println!("{}  No tags yet.", bar());
        return Ok(());
    }

    println!("{}  {} tags:", bar(), tags.len());
    rule();
    for tag in tags {
        println!(
            "{}  {} {}",
            bar(),
            tag.name.bright_cyan(),
            format!("({})", tag.usage_count).bright_black()
        );
    }
    Ok(())
}

/// Where the code sent to the AI came from, so a fix can be written back
#[derive(Debug)]
enum Source {
    File(PathBuf),
    Snippet(Snippet),
}

/// Sends the file or snippet to the AI, prints the reply and, for
/// `refactor --apply`, writes the extracted code back.
pub fn run_ai(
    session: &mut Session,
    config: &Config,
    mode: AiMode,
    target: AiTargetArgs,
    apply: bool,
) -> Result<()> {
    let (source, mut buffer, language) = load_target(session, &target)?;

    if let Some(range) = target.range {
        let len = buffer.text().chars().count();
        if range.end() > len {
            bail!(
                "Range {}..{} is outside the document ({} characters)",
                range.start(),
                range.end(),
                len
            );
        }
        buffer.set_selection(Some(range));
    }

    if config.ai.api_key.is_none() {
        tracing::warn!("no API key configured, sending the request without authorization");
    }

    let client = AssistantClient::new(&config.ai)?;
    let outbound = session.start_ai_action(mode, &buffer, &language)?;
    let label = match session.last_selection() {
        Some(range) => format!("selected code (characters {}..{})", range.start(), range.end()),
        None => "whole document".to_string(),
    };
    println!(
        "{}  Asking {} to {} the {}...",
        bar(),
        config.ai.model.bright_white(),
        mode,
        label
    );

    dispatch(client, outbound, session.ai_sender());
    if !session.wait_ai(Duration::from_secs(target.wait_secs)) {
        session.dismiss();
        bail!("No reply within {} seconds", target.wait_secs);
    }

    let Some(exchange) = session.exchange() else {
        bail!("AI exchange was dropped before the reply arrived");
    };
    print_exchange(exchange);
    if exchange.is_error {
        bail!("{}", session.status());
    }

    if mode != AiMode::Refactor {
        session.dismiss();
        return Ok(());
    }

    if !apply {
        if exchange.extracted_code.is_some() {
            println!(
                "{}  {}",
                bar(),
                "Run again with --apply to write this code back.".bright_black()
            );
        }
        session.dismiss();
        return Ok(());
    }

    let outcome = session.apply_fix(&mut buffer)?;
    match outcome {
        ApplyOutcome::NothingToApply => {
            println!(
                "{}  {}",
                bar(),
                "No code block in the reply, nothing applied.".yellow()
            );
            session.dismiss();
            return Ok(());
        }
        ApplyOutcome::ReplacedSelection(range) => println!(
            "{}  {} (characters {}..{}, new code ends at {})",
            bar(),
            session.status().bright_green(),
            range.start(),
            range.end(),
            buffer.cursor()
        ),
        ApplyOutcome::ReplacedDocument | ApplyOutcome::ReplacedDocumentStale => {
            println!("{}  {}", bar(), session.status().bright_green())
        }
    }

    write_back(session, &source, buffer.text())
}

fn load_target(session: &Session, target: &AiTargetArgs) -> Result<(Source, TextBuffer, String)> {
    if let Some(id) = target.snippet {
        let snippet = session
            .store()
            .get(id)
            .cloned()
            .ok_or_else(|| eyre!("Snippet not found with ID: {}", id))?;
        let language = target
            .language
            .clone()
            .unwrap_or_else(|| snippet.language.clone());
        let buffer = TextBuffer::new(snippet.code.clone());
        return Ok((Source::Snippet(snippet), buffer, language));
    }

    let Some(path) = target.file.clone() else {
        bail!("Either --file or --snippet is required");
    };
    let code = fs::read_to_string(&path)
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    let language = resolve_language(target.language.as_deref(), Some(&path));
    Ok((Source::File(path), TextBuffer::new(code), language))
}

fn write_back(session: &mut Session, source: &Source, code: &str) -> Result<()> {
    match source {
        Source::File(path) => {
            fs::write(path, code)
                .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
            println!("{}  Wrote {}", bar(), path.display());
        }
        Source::Snippet(snippet) => {
            if !session.begin_edit(snippet.id) {
                bail!("Snippet {} no longer exists", snippet.id);
            }
            session.save_snippet(
                &snippet.title,
                code,
                &snippet.language,
                &snippet.tags.join(", "),
            )?;
            check_persisted(session)?;
            println!(
                "{}  {} {}",
                bar(),
                session.status().bright_green(),
                format!("(ID {})", snippet.id).bright_black()
            );
        }
    }
    Ok(())
}

fn print_exchange(exchange: &AiExchange) {
    let heading = exchange.mode.to_string().to_uppercase();
    println!(
        "{}  {} {}",
        bar(),
        "AI".bright_cyan().bold(),
        heading.bold()
    );
    rule();

    let text = exchange.response_text.as_deref().unwrap_or_default();
    for line in text.lines() {
        if exchange.is_error {
            println!("{}  {}", bar(), line.red());
        } else {
            println!("{}  {}", bar(), line);
        }
    }
    rule();
}

pub fn export(session: &Session, path: &Path, format: Option<FormatArg>) -> Result<()> {
    let format = format
        .map(ExportFormat::from)
        .unwrap_or_else(|| ExportFormat::from_path(path));
    export_snippets(session.snippets(), path, format).map_err(|e| eyre!("{:#}", e))?;

    println!(
        "{}  Exported {} snippets to {}",
        bar(),
        session.store().len(),
        path.display()
    );
    Ok(())
}

pub fn import(session: &mut Session, path: &Path, overwrite: bool) -> Result<()> {
    let incoming = import_snippets(path).map_err(|e| eyre!("{:#}", e))?;
    let summary = session.import_snippets(incoming, overwrite);
    check_persisted(session)?;

    println!(
        "{}  {}: {} added, {} replaced, {} skipped",
        bar(),
        "Import".bright_green(),
        summary.added,
        summary.replaced,
        summary.skipped
    );
    Ok(())
}

pub fn backup(session: &Session) -> Result<()> {
    let path = session
        .store()
        .storage()
        .backup_database()
        .map_err(|e| eyre!("{:#}", e))?;
    println!("{}  Backup written to {}", bar(), path.display());
    Ok(())
}

pub fn list_languages() -> Result<()> {
    println!("{}  {}", bar(), "LANGUAGES".bold());
    rule();
    for (tag, name) in known_languages() {
        println!("{}  {:<12} {}", bar(), tag.bright_yellow(), name);
    }
    println!(
        "{}  {}",
        bar(),
        "Any other tag is stored as given.".bright_black()
    );
    Ok(())
}

fn check_persisted(session: &Session) -> Result<()> {
    match session.persist_error() {
        Some(e) => Err(eyre!(
            "{} ({})",
            e,
            session.store().storage().database_file().display()
        )),
        None => Ok(()),
    }
}

/// Code from `--code`, else `--file`, else stdin
fn read_code(code: Option<String>, file: Option<&Path>) -> Result<String> {
    if let Some(code) = code {
        return Ok(code);
    }

    if let Some(path) = file {
        return fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read {}", path.display()));
    }

    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        eprintln!("Reading code from stdin, finish with Ctrl-D");
    }
    let mut code = String::new();
    stdin
        .read_to_string(&mut code)
        .wrap_err("Failed to read code from stdin")?;
    Ok(code)
}

fn resolve_language(explicit: Option<&str>, file: Option<&Path>) -> String {
    if let Some(language) = explicit.map(str::trim).filter(|l| !l.is_empty()) {
        return language.to_string();
    }

    file.and_then(|path| path.extension())
        .and_then(|ext| ext.to_str())
        .and_then(language_from_extension)
        .unwrap_or(DEFAULT_LANGUAGE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AiConfig;
    use crate::editor::TextRange;
    use crate::models::storage::DATA_FILE_NAME;
    use crate::models::{SnippetStore, StorageManager, ValidationPolicy};
    use crate::search::SearchOptions;
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn session_in(dir: &TempDir) -> Session {
        let storage = StorageManager::new(dir.path().join(DATA_FILE_NAME));
        let store = SnippetStore::new(storage, ValidationPolicy::default());
        let mut session = Session::new(store, SearchOptions::default(), AiConfig::default());
        session.init().unwrap();
        session
    }

    fn config_for(server: &MockServer) -> Config {
        Config {
            ai: AiConfig {
                base_url: server.base_url(),
                api_key: Some("test-key".to_string()),
                timeout_secs: 5,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        })
    }

    fn target_file(path: &Path, range: Option<TextRange>) -> AiTargetArgs {
        AiTargetArgs {
            file: Some(path.to_path_buf()),
            snippet: None,
            range,
            language: None,
            wait_secs: 10,
        }
    }

    #[test]
    fn test_resolve_language() {
        assert_eq!(resolve_language(Some(" go "), None), "go");
        assert_eq!(resolve_language(None, Some(Path::new("main.py"))), "python");
        assert_eq!(resolve_language(None, Some(Path::new("notes.txt"))), DEFAULT_LANGUAGE);
        assert_eq!(resolve_language(Some(""), None), DEFAULT_LANGUAGE);
    }

    #[test]
    fn test_match_field() {
        let snippet = Snippet::new(1, "Fetch JSON", "await fetch(url)", "js", "http, api");
        assert_eq!(match_field(&snippet, "json"), "title");
        assert_eq!(match_field(&snippet, "API"), "tags");
        assert_eq!(match_field(&snippet, "await"), "code");
    }

    #[test]
    fn test_edit_keeps_unset_fields() {
        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir);
        let id = session
            .save_snippet("Hello", "print('hi')", "python", "greeting, demo")
            .unwrap()
            .unwrap();

        edit_snippet(
            &mut session,
            EditArgs {
                id,
                title: Some("Hello world".to_string()),
                language: None,
                tags: None,
                code: None,
                file: None,
            },
        )
        .unwrap();

        let snippet = session.store().get(id).unwrap();
        assert_eq!(snippet.title, "Hello world");
        assert_eq!(snippet.code, "print('hi')");
        assert_eq!(snippet.tags, vec!["greeting", "demo"]);
    }

    #[test]
    fn test_edit_unknown_id_fails() {
        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir);
        let args = EditArgs {
            id: 404,
            title: None,
            language: None,
            tags: None,
            code: None,
            file: None,
        };
        assert!(edit_snippet(&mut session, args).is_err());
    }

    #[test]
    fn test_export_then_import_into_fresh_store() {
        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir);
        session.save_snippet("A", "a()", "js", "x").unwrap();
        let export_path = dir.path().join("out.yaml");
        export(&session, &export_path, None).unwrap();

        let other = TempDir::new().unwrap();
        let mut fresh = session_in(&other);
        import(&mut fresh, &export_path, false).unwrap();
        assert_eq!(fresh.snippets(), session.snippets());
    }

    #[test]
    fn test_refactor_applies_to_selected_range_in_file() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer test-key");
            then.status(200)
                .json_body(completion("Use const:\n```js\nconst x = 1;\n```"));
        });

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("main.js");
        fs::write(&file, "let x = 1;\nconsole.log(x);\n").unwrap();

        let mut session = session_in(&dir);
        run_ai(
            &mut session,
            &config_for(&server),
            AiMode::Refactor,
            target_file(&file, Some(TextRange::new(0, 10))),
            true,
        )
        .unwrap();

        mock.assert();
        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "const x = 1;\nconsole.log(x);\n"
        );
        assert!(session.exchange().is_none());
    }

    #[test]
    fn test_refactor_without_apply_leaves_file() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200)
                .json_body(completion("```python\nprint(2)\n```"));
        });

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("main.py");
        fs::write(&file, "print(1)\n").unwrap();

        let mut session = session_in(&dir);
        run_ai(
            &mut session,
            &config_for(&server),
            AiMode::Refactor,
            target_file(&file, None),
            false,
        )
        .unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "print(1)\n");
    }

    #[test]
    fn test_refactor_applies_to_snippet() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200)
                .json_body(completion("Done.\n```sql\nSELECT COUNT(*) FROM users;\n```"));
        });

        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir);
        let id = session
            .save_snippet("Count", "select count(*) from users", "sql", "db")
            .unwrap()
            .unwrap();

        let target = AiTargetArgs {
            file: None,
            snippet: Some(id),
            range: None,
            language: None,
            wait_secs: 10,
        };
        run_ai(&mut session, &config_for(&server), AiMode::Refactor, target, true).unwrap();

        let snippet = session.store().get(id).unwrap();
        assert_eq!(snippet.code, "SELECT COUNT(*) FROM users;");
        assert_eq!(snippet.tags, vec!["db"]);

        let reloaded = session_in(&dir);
        assert_eq!(
            reloaded.store().get(id).unwrap().code,
            "SELECT COUNT(*) FROM users;"
        );
    }

    #[test]
    fn test_provider_error_fails_command() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(401)
                .json_body(json!({ "error": { "message": "Incorrect API key provided" } }));
        });

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.js");
        fs::write(&file, "x()").unwrap();

        let mut session = session_in(&dir);
        let result = run_ai(
            &mut session,
            &config_for(&server),
            AiMode::Explain,
            target_file(&file, None),
            false,
        );
        assert!(result.is_err());
        let exchange = session.exchange().unwrap();
        assert!(exchange.is_error);
        assert!(
            exchange
                .response_text
                .as_deref()
                .unwrap()
                .contains("Incorrect API key provided")
        );
    }

    #[test]
    fn test_range_outside_document_is_rejected() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.js");
        fs::write(&file, "short").unwrap();

        let mut session = session_in(&dir);
        let result = run_ai(
            &mut session,
            &Config::default(),
            AiMode::Explain,
            target_file(&file, Some(TextRange::new(2, 50))),
            false,
        );
        assert!(result.is_err());
        assert!(session.exchange().is_none());
    }
}
