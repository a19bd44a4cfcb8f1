//! Slash command registry
//!
//! Holds the built-in commands plus one pair of aliases per prompt file and
//! rewrites a prompt whose first text block starts with `/name`. The set of
//! commands is an immutable snapshot swapped in whole on every rescan, so
//! sessions matching concurrently always see a consistent set.
//!
//! ## Naming
//!
//! - Built-ins (`plan`, `test`, `web`) are reserved. A prompt file with the
//!   same name only gets its hidden `prompts:<name>` alias.
//! - Every prompt file yields a visible bare alias and a hidden
//!   `prompts:<name>` alias, so a command stays reachable by its namespaced
//!   form even when the bare name is taken.
//! - Names are matched case-insensitively.

use agent_client_protocol::{
    AvailableCommand, AvailableCommandInput, ContentBlock, UnstructuredCommandInput,
};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::ExpansionError;
use crate::prompts::{load_prompt_definitions, PromptDefinition};
use crate::render::{block_text, text_block};
use crate::template::expand_prompt;

/// Minimum age of a snapshot before `refresh_if_needed` rescans
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(5_000);

/// Namespace for prompt-file aliases
pub const PROMPTS_NAMESPACE: &str = "prompts";

static SLASH_COMMAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*/([a-zA-Z0-9_\-:]+)(?:[ \t]+(.*?))?(?:\r?\n([\s\S]*))?$").unwrap()
});

/// Session details available to prompt builders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandContext {
    pub working_directory: String,
    pub model: Option<String>,
}

/// Turns the inline input of a command into the instruction sent to Codex
pub type PromptBuilder =
    Arc<dyn Fn(&str, &CommandContext) -> Result<String, ExpansionError> + Send + Sync>;

/// Wrap a closure as a [`PromptBuilder`]
pub fn prompt_builder<F>(build: F) -> PromptBuilder
where
    F: Fn(&str, &CommandContext) -> Result<String, ExpansionError> + Send + Sync + 'static,
{
    Arc::new(build)
}

/// A registered slash command
#[derive(Clone)]
pub struct CommandDefinition {
    pub name: String,
    pub description: String,
    pub hint: Option<String>,
    /// Hidden commands match but are not advertised
    pub hidden: bool,
    build: PromptBuilder,
}

impl CommandDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        hint: Option<&str>,
        build: PromptBuilder,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            hint: hint.map(str::to_string),
            hidden: false,
            build,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn build_prompt(
        &self,
        input: &str,
        context: &CommandContext,
    ) -> Result<String, ExpansionError> {
        (self.build)(input, context)
    }
}

impl fmt::Debug for CommandDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("hint", &self.hint)
            .field("hidden", &self.hidden)
            .finish_non_exhaustive()
    }
}

/// A slash command found in a prompt
#[derive(Debug, Clone)]
pub struct SlashMatch {
    pub definition: Arc<CommandDefinition>,
    /// Rest of the command line, trimmed
    pub input: String,
    /// Index of the block holding the command
    pub block_index: usize,
    /// Lines after the command line, if any are non-blank
    pub remainder: Option<String>,
}

/// Registry settings taken from the adapter configuration
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    pub prompts_dir: Option<PathBuf>,
    /// Enables the `/test` built-in
    pub allow_commands: bool,
}

struct Snapshot {
    definitions: HashMap<String, Arc<CommandDefinition>>,
    available: Vec<AvailableCommand>,
    loaded_at: Instant,
}

/// Built-in and prompt-file slash commands with a TTL-cached snapshot
pub struct SlashCommandRegistry {
    options: RegistryOptions,
    clock: Arc<dyn Clock>,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    refresh_lock: tokio::sync::Mutex<()>,
    scans: AtomicU64,
}

impl SlashCommandRegistry {
    pub fn new(options: RegistryOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            options,
            clock,
            snapshot: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
            scans: AtomicU64::new(0),
        }
    }

    /// Rebuild the snapshot unconditionally
    pub async fn refresh(&self) {
        let _guard = self.refresh_lock.lock().await;
        self.rescan().await;
    }

    /// Load on first use, then rescan only once the snapshot is older than
    /// [`REFRESH_INTERVAL`]
    ///
    /// Concurrent callers share a single rescan.
    pub async fn refresh_if_needed(&self) {
        if !self.is_stale() {
            return;
        }
        let _guard = self.refresh_lock.lock().await;
        if self.is_stale() {
            self.rescan().await;
        }
    }

    /// Number of completed scans
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.read().is_some()
    }

    fn is_stale(&self) -> bool {
        match self.snapshot.read().as_ref() {
            None => true,
            Some(snapshot) => {
                self.clock.now().saturating_duration_since(snapshot.loaded_at) > REFRESH_INTERVAL
            }
        }
    }

    fn current(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.read().clone()
    }

    async fn rescan(&self) {
        let mut ordered: Vec<Arc<CommandDefinition>> = builtin_definitions(self.options.allow_commands)
            .into_iter()
            .map(Arc::new)
            .collect();

        let prompts = match &self.options.prompts_dir {
            Some(dir) => load_prompt_definitions(dir).await,
            None => Vec::new(),
        };

        let mut definitions: HashMap<String, Arc<CommandDefinition>> = HashMap::new();
        for definition in &ordered {
            definitions.insert(definition.name.to_lowercase(), Arc::clone(definition));
        }

        for prompt in prompts {
            for alias in prompt_aliases(Arc::new(prompt)) {
                let key = alias.name.to_lowercase();
                if let Some(existing) = definitions.get(&key) {
                    warn!(
                        command = %alias.name,
                        existing = %existing.name,
                        "prompt command name already taken, skipping alias"
                    );
                    continue;
                }
                let alias = Arc::new(alias);
                definitions.insert(key, Arc::clone(&alias));
                ordered.push(alias);
            }
        }

        let available: Vec<AvailableCommand> = ordered
            .iter()
            .filter(|definition| !definition.hidden)
            .map(|definition| advertised(definition))
            .collect();

        debug!(
            commands = ?available.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "slash command registry refreshed"
        );

        let snapshot = Snapshot {
            definitions,
            available,
            loaded_at: self.clock.now(),
        };
        *self.snapshot.write() = Some(Arc::new(snapshot));
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    /// Commands to advertise to clients; empty before the first load
    pub fn available_commands(&self) -> Vec<AvailableCommand> {
        self.current()
            .map(|snapshot| snapshot.available.clone())
            .unwrap_or_default()
    }

    /// Look up a definition by name, hidden ones included
    pub fn get(&self, name: &str) -> Option<Arc<CommandDefinition>> {
        self.current()
            .and_then(|snapshot| snapshot.definitions.get(&name.to_lowercase()).cloned())
    }

    /// Find a slash command in the first text block of a prompt
    pub fn match_blocks(&self, blocks: &[ContentBlock]) -> Option<SlashMatch> {
        let snapshot = self.current()?;
        let (block_index, text) = blocks
            .iter()
            .enumerate()
            .find_map(|(index, block)| block_text(block).map(|text| (index, text)))?;

        let captures = SLASH_COMMAND.captures(text)?;
        let definition = snapshot.definitions.get(&captures[1].to_lowercase())?;

        let input = captures
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        let remainder = captures
            .get(3)
            .map(|m| m.as_str())
            .filter(|rest| !rest.trim().is_empty())
            .map(str::to_string);

        Some(SlashMatch {
            definition: Arc::clone(definition),
            input,
            block_index,
            remainder,
        })
    }

    /// Replace the command block with the expanded instruction
    ///
    /// The instruction becomes the first block. If the command block carried
    /// extra lines they stay in its place as a plain text block.
    pub fn apply(
        &self,
        blocks: &[ContentBlock],
        slash: &SlashMatch,
        context: &CommandContext,
    ) -> Result<Vec<ContentBlock>, ExpansionError> {
        let instruction = slash.definition.build_prompt(&slash.input, context)?;

        let mut transformed = Vec::with_capacity(blocks.len() + 1);
        transformed.push(text_block(instruction));
        for (index, block) in blocks.iter().enumerate() {
            if index == slash.block_index {
                if let Some(remainder) = &slash.remainder {
                    transformed.push(text_block(remainder.clone()));
                }
                continue;
            }
            transformed.push(block.clone());
        }

        Ok(transformed)
    }
}

fn advertised(definition: &CommandDefinition) -> AvailableCommand {
    let mut command = AvailableCommand::new(definition.name.clone(), definition.description.clone());
    command.input = definition.hint.as_ref().map(|hint| {
        AvailableCommandInput::Unstructured(UnstructuredCommandInput::new(hint.clone()))
    });
    command
}

fn or_default(input: &str, fallback: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

fn builtin_definitions(allow_commands: bool) -> Vec<CommandDefinition> {
    let mut definitions = vec![CommandDefinition::new(
        "plan",
        "Create a step-by-step plan for the requested work.",
        Some("Describe what you need a plan for"),
        prompt_builder(|input, _| {
            let focus = or_default(input, "the user's latest request");
            Ok([
                "You were invoked via the /plan command.".to_string(),
                format!("Create a detailed implementation plan for {focus}."),
                "Break the work into actionable tasks and keep the todo_list tool updated as you progress.".to_string(),
                "Note any assumptions that need confirmation before making changes.".to_string(),
            ]
            .join("\n\n"))
        }),
    )];

    if allow_commands {
        definitions.push(CommandDefinition::new(
            "test",
            "Run the project's automated tests and report the results.",
            Some("Optional: specify which tests to run"),
            prompt_builder(|input, context| {
                let scope = or_default(input, "the project");
                let mut sections = vec!["You were invoked via the /test command.".to_string()];
                if !context.working_directory.is_empty() {
                    sections.push(format!(
                        "The repository root available to you is {}.",
                        context.working_directory
                    ));
                }
                sections.push(format!(
                    "Identify and run the most relevant automated tests for {scope}."
                ));
                sections.push(
                    "Use shell commands as needed, surface command output, and summarize any failures with next steps."
                        .to_string(),
                );
                Ok(sections.join("\n\n"))
            }),
        ));
    }

    definitions.push(CommandDefinition::new(
        "web",
        "Research on the web and summarize findings with sources.",
        Some("Topic to research"),
        prompt_builder(|input, _| {
            let topic = or_default(input, "the user's question");
            Ok([
                "You were invoked via the /web command.".to_string(),
                format!("Use the web_search tool to research: {topic}."),
                "Collect key findings, include the most relevant sources, and cite them in your summary.".to_string(),
            ]
            .join("\n\n"))
        }),
    ));

    definitions
}

/// Visible bare alias first, then the hidden namespaced one
fn prompt_aliases(prompt: Arc<PromptDefinition>) -> [CommandDefinition; 2] {
    let alias = |name: String| {
        let display = format!("/{name}");
        let prompt = Arc::clone(&prompt);
        let hint = prompt.argument_hint.clone();
        CommandDefinition::new(
            name,
            prompt.description.clone(),
            hint.as_deref(),
            prompt_builder(move |input, _| expand_prompt(&prompt, input, &display)),
        )
    };

    [
        alias(prompt.name.clone()),
        alias(format!("{PROMPTS_NAMESPACE}:{}", prompt.name)).hidden(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use tempfile::TempDir;

    fn registry(dir: Option<&TempDir>, allow_commands: bool) -> (SlashCommandRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let registry = SlashCommandRegistry::new(
            RegistryOptions {
                prompts_dir: dir.map(|d| d.path().to_path_buf()),
                allow_commands,
            },
            clock.clone(),
        );
        (registry, clock)
    }

    fn names(commands: &[AvailableCommand]) -> Vec<&str> {
        commands.iter().map(|c| c.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_unloaded_registry_matches_nothing() {
        let (registry, _) = registry(None, true);
        assert!(!registry.is_loaded());
        assert!(registry.available_commands().is_empty());
        assert!(registry.match_blocks(&[text_block("/plan")]).is_none());
    }

    #[tokio::test]
    async fn test_builtins_respect_allow_commands() {
        let (with_test, _) = registry(None, true);
        with_test.refresh().await;
        assert_eq!(names(&with_test.available_commands()), vec!["plan", "test", "web"]);

        let (without_test, _) = registry(None, false);
        without_test.refresh().await;
        assert_eq!(names(&without_test.available_commands()), vec!["plan", "web"]);
        assert!(without_test.get("test").is_none());
    }

    #[tokio::test]
    async fn test_match_splits_input_and_remainder() {
        let (registry, _) = registry(None, true);
        registry.refresh().await;

        let blocks = vec![text_block("/plan Improve caching\nConsider existing APIs")];
        let slash = registry.match_blocks(&blocks).unwrap();
        assert_eq!(slash.definition.name, "plan");
        assert_eq!(slash.input, "Improve caching");
        assert_eq!(slash.block_index, 0);
        assert_eq!(slash.remainder.as_deref(), Some("Consider existing APIs"));
    }

    #[tokio::test]
    async fn test_bare_command_keeps_next_line_as_remainder() {
        let (registry, _) = registry(None, true);
        registry.refresh().await;

        let blocks = vec![text_block("/plan\nConsider existing APIs")];
        let slash = registry.match_blocks(&blocks).unwrap();
        assert_eq!(slash.definition.name, "plan");
        assert_eq!(slash.input, "");
        assert_eq!(slash.remainder.as_deref(), Some("Consider existing APIs"));

        let blocks = vec![text_block("/plan \r\nConsider existing APIs")];
        let slash = registry.match_blocks(&blocks).unwrap();
        assert_eq!(slash.input, "");
        assert_eq!(slash.remainder.as_deref(), Some("Consider existing APIs"));
    }

    #[tokio::test]
    async fn test_named_prompt_keeps_notes_on_following_lines() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("deploy.md"), "Deploy to $ENV").unwrap();

        let (registry, _) = registry(Some(&dir), true);
        registry.refresh().await;

        let blocks = vec![text_block("/deploy env=prod\nroll back on errors")];
        let slash = registry.match_blocks(&blocks).unwrap();
        let out = registry
            .apply(&blocks, &slash, &CommandContext::default())
            .unwrap();
        assert_eq!(block_text(&out[0]), Some("Deploy to prod"));
        assert_eq!(block_text(&out[1]), Some("roll back on errors"));
    }

    #[tokio::test]
    async fn test_match_is_case_insensitive_and_first_text_block_only() {
        let (registry, _) = registry(None, true);
        registry.refresh().await;

        let blocks = vec![
            serde_json::from_value::<ContentBlock>(json!({
                "type": "image",
                "mimeType": "image/png",
                "data": ""
            }))
            .unwrap(),
            text_block("  /WEB rust async"),
        ];
        let slash = registry.match_blocks(&blocks).unwrap();
        assert_eq!(slash.definition.name, "web");
        assert_eq!(slash.block_index, 1);

        let later = vec![text_block("hello"), text_block("/plan")];
        assert!(registry.match_blocks(&later).is_none());
    }

    #[tokio::test]
    async fn test_unknown_command_does_not_match() {
        let (registry, _) = registry(None, true);
        registry.refresh().await;
        assert!(registry.match_blocks(&[text_block("/nope do it")]).is_none());
        assert!(registry.match_blocks(&[text_block("plan it")]).is_none());
    }

    #[tokio::test]
    async fn test_apply_prepends_instruction_and_keeps_remainder() {
        let (registry, _) = registry(None, true);
        registry.refresh().await;

        let blocks = vec![
            text_block("/plan Improve caching\nConsider existing APIs"),
            text_block("extra context"),
        ];
        let slash = registry.match_blocks(&blocks).unwrap();
        let out = registry
            .apply(&blocks, &slash, &CommandContext::default())
            .unwrap();

        assert_eq!(out.len(), 3);
        let instruction = block_text(&out[0]).unwrap();
        assert!(instruction.starts_with("You were invoked via the /plan command.\n\n"));
        assert!(instruction.contains("Create a detailed implementation plan for Improve caching."));
        assert_eq!(block_text(&out[1]), Some("Consider existing APIs"));
        assert_eq!(block_text(&out[2]), Some("extra context"));
    }

    #[tokio::test]
    async fn test_blank_remainder_is_dropped() {
        let (registry, _) = registry(None, true);
        registry.refresh().await;

        let blocks = vec![text_block("/web\n   \n")];
        let slash = registry.match_blocks(&blocks).unwrap();
        assert_eq!(slash.remainder, None);

        let out = registry
            .apply(&blocks, &slash, &CommandContext::default())
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(block_text(&out[0])
            .unwrap()
            .contains("Use the web_search tool to research: the user's question."));
    }

    #[tokio::test]
    async fn test_test_command_mentions_working_directory() {
        let (registry, _) = registry(None, true);
        registry.refresh().await;

        let context = CommandContext {
            working_directory: "/repo".to_string(),
            model: None,
        };
        let prompt = registry
            .get("test")
            .unwrap()
            .build_prompt("", &context)
            .unwrap();
        assert_eq!(
            prompt,
            "You were invoked via the /test command.\n\n\
             The repository root available to you is /repo.\n\n\
             Identify and run the most relevant automated tests for the project.\n\n\
             Use shell commands as needed, surface command output, and summarize any failures with next steps."
        );
    }

    #[tokio::test]
    async fn test_prompt_files_register_visible_and_hidden_aliases() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("review.md"),
            "---\ndescription: Review a file\nargument-hint: FILE\n---\nReview $1 before merging.",
        )
        .unwrap();

        let (registry, _) = registry(Some(&dir), true);
        registry.refresh().await;

        let advertised = registry.available_commands();
        assert_eq!(names(&advertised), vec!["plan", "test", "web", "review"]);
        match &advertised[3].input {
            Some(AvailableCommandInput::Unstructured(input)) => assert_eq!(input.hint, "FILE"),
            other => panic!("expected unstructured input, got {other:?}"),
        }

        let blocks = vec![text_block("/prompts:review docs/README.md")];
        let slash = registry.match_blocks(&blocks).unwrap();
        assert!(slash.definition.hidden);
        let out = registry
            .apply(&blocks, &slash, &CommandContext::default())
            .unwrap();
        assert_eq!(block_text(&out[0]), Some("Review docs/README.md before merging."));
    }

    #[tokio::test]
    async fn test_prompt_file_cannot_shadow_builtin() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("plan.md"), "Custom plan for $1").unwrap();

        let (registry, _) = registry(Some(&dir), true);
        registry.refresh().await;

        assert_eq!(names(&registry.available_commands()), vec!["plan", "test", "web"]);
        let builtin = registry.get("plan").unwrap();
        assert!(builtin
            .build_prompt("x", &CommandContext::default())
            .unwrap()
            .starts_with("You were invoked via the /plan command."));

        let namespaced = registry.get("prompts:plan").unwrap();
        assert_eq!(
            namespaced
                .build_prompt("x", &CommandContext::default())
                .unwrap(),
            "Custom plan for x"
        );
    }

    #[tokio::test]
    async fn test_named_prompt_missing_args_fails_apply() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("deploy.md"), "Deploy to $ENV").unwrap();

        let (registry, _) = registry(Some(&dir), true);
        registry.refresh().await;

        let blocks = vec![text_block("/deploy")];
        let slash = registry.match_blocks(&blocks).unwrap();
        let err = registry
            .apply(&blocks, &slash, &CommandContext::default())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required args for /deploy: ENV. Provide as key=value (quote values with spaces)."
        );

        let blocks = vec![text_block("/deploy env=prod")];
        let slash = registry.match_blocks(&blocks).unwrap();
        let out = registry
            .apply(&blocks, &slash, &CommandContext::default())
            .unwrap();
        assert_eq!(block_text(&out[0]), Some("Deploy to prod"));
    }

    #[tokio::test]
    async fn test_refresh_if_needed_honors_interval() {
        let dir = TempDir::new().unwrap();
        let (registry, clock) = registry(Some(&dir), true);

        registry.refresh_if_needed().await;
        assert_eq!(registry.scan_count(), 1);

        std::fs::write(dir.path().join("late.md"), "Late prompt").unwrap();

        clock.advance(Duration::from_millis(4_999));
        registry.refresh_if_needed().await;
        assert_eq!(registry.scan_count(), 1);
        assert!(registry.get("late").is_none());

        clock.advance(Duration::from_millis(1));
        registry.refresh_if_needed().await;
        assert_eq!(registry.scan_count(), 1, "exactly the interval is not stale");

        clock.advance(Duration::from_millis(1));
        registry.refresh_if_needed().await;
        assert_eq!(registry.scan_count(), 2);
        assert!(registry.get("late").is_some());
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_scan_once() {
        let (registry, _) = registry(None, true);
        let registry = Arc::new(registry);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.refresh_if_needed().await })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }

        assert_eq!(registry.scan_count(), 1);
    }
}
