//! Placeholder expansion for prompt-file slash commands
//!
//! A template is in *named* mode when its body contains at least one
//! `$UPPER_CASE` placeholder other than `$ARGUMENTS`; input is then parsed as
//! `key=value` pairs and every placeholder must be bound. Otherwise the
//! template is *positional*: `$1`..`$9` and `$ARGUMENTS` take their values
//! from the whitespace-split input.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::error::ExpansionError;
use crate::prompts::PromptDefinition;
use crate::tokenizer::split_args;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$[A-Z][A-Z0-9_]*").unwrap());

const ARGUMENTS: &str = "ARGUMENTS";

/// Iterate over unescaped named placeholders as `(start, end, name)`
fn named_placeholders(content: &str) -> impl Iterator<Item = (usize, usize, &str)> {
    PLACEHOLDER.find_iter(content).filter_map(move |m| {
        let escaped = m.start() > 0 && content.as_bytes()[m.start() - 1] == b'$';
        let name = &m.as_str()[1..];
        if escaped || name == ARGUMENTS {
            None
        } else {
            Some((m.start(), m.end(), name))
        }
    })
}

/// Distinct named placeholders in order of first appearance
pub fn argument_names(content: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (_, _, name) in named_placeholders(content) {
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Substitute `$1`..`$9` and `$ARGUMENTS`
///
/// Out-of-range positions expand to nothing. `$$` is copied through
/// unchanged, as is a `$` followed by anything else.
pub fn expand_positional(content: &str, args: &[String]) -> String {
    let mut result = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(pos) = rest.find('$') {
        result.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let next = tail[1..].chars().next();

        match next {
            Some('$') => {
                result.push_str("$$");
                rest = &tail[2..];
            }
            Some(digit @ '1'..='9') => {
                let index = digit as usize - '1' as usize;
                if let Some(arg) = args.get(index) {
                    result.push_str(arg);
                }
                rest = &tail[2..];
            }
            _ if tail[1..].starts_with(ARGUMENTS) => {
                result.push_str(&args.join(" "));
                rest = &tail[1 + ARGUMENTS.len()..];
            }
            _ => {
                result.push('$');
                rest = &tail[1..];
            }
        }
    }

    result.push_str(rest);
    result
}

/// Parse `key=value` tokens; keys are upper-cased to match placeholder names
///
/// A later occurrence of the same key wins.
pub fn parse_key_value_args(
    input: &str,
    display_command: &str,
) -> Result<HashMap<String, String>, ExpansionError> {
    let mut args = HashMap::new();

    for token in split_args(input) {
        let Some((key, value)) = token.split_once('=') else {
            return Err(ExpansionError::ExpectedKeyValue {
                command: display_command.to_string(),
                token: token.clone(),
            });
        };
        if key.is_empty() {
            return Err(ExpansionError::MissingKey {
                command: display_command.to_string(),
                token: token.clone(),
            });
        }
        args.insert(key.to_uppercase(), value.to_string());
    }

    Ok(args)
}

/// Replace bound named placeholders; unbound and escaped ones stay verbatim
pub fn expand_named(content: &str, args: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(content.len());
    let mut last = 0;

    for (start, end, name) in named_placeholders(content) {
        if let Some(value) = args.get(name) {
            result.push_str(&content[last..start]);
            result.push_str(value);
            last = end;
        }
    }

    result.push_str(&content[last..]);
    result
}

/// Expand a prompt-file template with the user's inline input
pub fn expand_prompt(
    prompt: &PromptDefinition,
    input: &str,
    display_command: &str,
) -> Result<String, ExpansionError> {
    let trimmed = input.trim();

    if prompt.argument_names.is_empty() {
        let args = split_args(trimmed);
        return Ok(expand_positional(&prompt.content, &args));
    }

    let args = parse_key_value_args(trimmed, display_command)?;
    let missing: Vec<String> = prompt
        .argument_names
        .iter()
        .filter(|name| !args.contains_key(name.as_str()))
        .cloned()
        .collect();

    if !missing.is_empty() {
        return Err(ExpansionError::MissingArgs {
            command: display_command.to_string(),
            names: missing,
        });
    }

    Ok(expand_named(&prompt.content, &args))
}
