//! Shell-like argument splitting for slash command input

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Plain,
    Quoted(char),
}

/// Split `input` on whitespace, honoring single and double quotes
///
/// Backslash escapes the next character outside quotes and inside double
/// quotes; single quotes are literal. Malformed input never fails: an
/// unterminated quote is re-attached to the front of the last token and a
/// trailing backslash is kept as-is.
pub fn split_args(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut state = State::Plain;
    let mut escaped = false;

    for ch in input.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }

        match state {
            State::Quoted(quote) if ch == quote => state = State::Plain,
            State::Quoted('"') if ch == '\\' => escaped = true,
            State::Quoted(_) => current.push(ch),
            State::Plain => match ch {
                '"' | '\'' => state = State::Quoted(ch),
                '\\' => escaped = true,
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                c => current.push(c),
            },
        }
    }

    if escaped {
        current.push('\\');
    }
    if let State::Quoted(quote) = state {
        current.insert(0, quote);
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}
