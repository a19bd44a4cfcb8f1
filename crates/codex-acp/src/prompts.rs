//! Discovery and parsing of prompt files used as custom slash commands
//!
//! Every `.md`, `.txt` or `.prompt` file in the prompts directory becomes a
//! command. A file may start with a front-matter block:
//!
//! ```text
//! ---
//! description: Deploy the current branch
//! argument-hint: ENV=<name>
//! ---
//! # /deploy
//! Deploy to $ENV.
//! ```
//!
//! The command name comes from a leading `# /name` heading when present,
//! otherwise from the file stem.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{debug, warn};

use crate::template::argument_names;

static COMMAND_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#\s*/([A-Za-z0-9_\-:]+)\b.*$").unwrap());
static COMMAND_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-:]+$").unwrap());
static FRONTMATTER_DELIMITER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*---\s*$").unwrap());

/// Description used when a prompt file does not provide one
pub const DEFAULT_DESCRIPTION: &str = "Run the associated Codex prompt.";

const PROMPTS_PREFIX: &str = "prompts:";
const SUPPORTED_EXTENSIONS: &[&str] = &["md", "txt", "prompt"];

/// A slash command template loaded from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptDefinition {
    pub name: String,
    pub description: String,
    pub argument_hint: Option<String>,
    /// Template body with front matter removed
    pub content: String,
    /// Named placeholders in order of first appearance
    pub argument_names: Vec<String>,
}

impl PromptDefinition {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            name: name.into(),
            description: DEFAULT_DESCRIPTION.to_string(),
            argument_hint: None,
            argument_names: argument_names(&content),
            content,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct FrontMatter {
    description: Option<String>,
    argument_hint: Option<String>,
}

/// Split front matter from the body
///
/// An opening delimiter without a closing one means there is no front matter.
fn parse_front_matter(raw: &str) -> (FrontMatter, String) {
    let lines: Vec<&str> = raw.lines().collect();
    if !lines
        .first()
        .is_some_and(|line| FRONTMATTER_DELIMITER.is_match(line))
    {
        return (FrontMatter::default(), raw.to_string());
    }

    let mut meta = FrontMatter::default();
    let mut body_start = None;

    for (idx, line) in lines.iter().enumerate().skip(1) {
        if FRONTMATTER_DELIMITER.is_match(line) {
            body_start = Some(idx + 1);
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };

        let value = unquote(value.trim()).to_string();
        match key.trim().to_lowercase().as_str() {
            "description" => meta.description = Some(value),
            "argument-hint" | "argument_hint" => meta.argument_hint = Some(value),
            _ => {}
        }
    }

    match body_start {
        Some(start) => (meta, lines[start..].join("\n")),
        None => (FrontMatter::default(), raw.to_string()),
    }
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Name from a `# /name` heading on the first non-blank line, else the file stem
fn command_name(file_stem: &str, body: &str) -> String {
    let first = body.lines().map(str::trim).find(|line| !line.is_empty());

    if let Some(captures) = first.and_then(|line| COMMAND_HEADING.captures(line)) {
        let name = captures[1].trim();
        return name.strip_prefix(PROMPTS_PREFIX).unwrap_or(name).to_string();
    }

    file_stem.to_string()
}

/// Parse one prompt file; `None` if no usable command name can be derived
pub fn parse_prompt_file(file_name: &str, raw: &str) -> Option<PromptDefinition> {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name);

    let (meta, body) = parse_front_matter(raw);
    let name = command_name(stem, &body);
    if !COMMAND_NAME.is_match(&name) {
        return None;
    }

    Some(PromptDefinition {
        name,
        description: meta
            .description
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        argument_hint: meta.argument_hint,
        argument_names: argument_names(&body),
        content: body,
    })
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// Load every prompt file in `dir`, sorted by command name
///
/// Never fails: a missing directory yields nothing, and unreadable or
/// unparseable files are skipped with a warning.
pub async fn load_prompt_definitions(dir: &Path) -> Vec<PromptDefinition> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(directory = %dir.display(), "prompts directory missing");
            return Vec::new();
        }
        Err(e) => {
            warn!(directory = %dir.display(), error = %e, "failed to read prompts directory");
            return Vec::new();
        }
    };

    let mut files = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                let is_file = entry
                    .file_type()
                    .await
                    .map(|file_type| file_type.is_file())
                    .unwrap_or(false);
                if is_file && is_supported(&path) {
                    files.push(path);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(directory = %dir.display(), error = %e, "failed to list prompts directory");
                break;
            }
        }
    }
    // Deterministic order so duplicate names resolve the same way every scan
    files.sort();

    let mut definitions = Vec::with_capacity(files.len());
    for path in files {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();

        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match parse_prompt_file(&file_name, &raw) {
                Some(definition) => definitions.push(definition),
                None => warn!(file = %path.display(), "skipping unparseable prompt"),
            },
            Err(e) => warn!(file = %path.display(), error = %e, "failed to read prompt file"),
        }
    }

    // Stable: files sharing a name keep their path order
    definitions.sort_by(|a, b| a.name.cmp(&b.name));
    definitions
}
