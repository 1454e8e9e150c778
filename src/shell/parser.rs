//! Command line parsing.
//!
//! `ls | grep dev` becomes a [`Pipeline`] of two [`Command`]s. Quoting with
//! `'` or `"` groups words and hides `|` from the pipeline splitter; the
//! quote characters themselves never reach the arguments.

use std::fmt;

use indexmap::IndexMap;

/// What a command does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    /// `ls`
    Ls,
    /// `cd`
    Cd,
    /// `..`
    Back,
    /// `cat`
    Cat,
    /// `tail`, the streaming view under its traditional name.
    Tail,
    /// `send`
    Send,
    /// `pwd`
    Pwd,
    /// `help`
    Help,
    /// `exit`, `quit`, `q`
    Exit,
    /// `source`
    Source,
    /// `grep`
    Grep,
    /// `browse`
    Browse,
    /// `live`
    Live,
    /// `version`
    Version,
    /// Anything else, as typed.
    Unknown(String),
}

impl Verb {
    /// Parse a verb word, case-insensitively.
    pub fn parse(word: &str) -> Self {
        match word.to_lowercase().as_str() {
            "ls" => Self::Ls,
            "cd" => Self::Cd,
            ".." => Self::Back,
            "cat" => Self::Cat,
            "tail" => Self::Tail,
            "send" => Self::Send,
            "pwd" => Self::Pwd,
            "help" => Self::Help,
            "exit" | "quit" | "q" => Self::Exit,
            "source" => Self::Source,
            "grep" => Self::Grep,
            "browse" => Self::Browse,
            "live" => Self::Live,
            "version" => Self::Version,
            _ => Self::Unknown(word.to_string()),
        }
    }

    /// Canonical name.
    pub fn name(&self) -> &str {
        match self {
            Self::Ls => "ls",
            Self::Cd => "cd",
            Self::Back => "..",
            Self::Cat => "cat",
            Self::Tail => "tail",
            Self::Send => "send",
            Self::Pwd => "pwd",
            Self::Help => "help",
            Self::Exit => "exit",
            Self::Source => "source",
            Self::Grep => "grep",
            Self::Browse => "browse",
            Self::Live => "live",
            Self::Version => "version",
            Self::Unknown(word) => word,
        }
    }

    /// Whether the verb may appear after a `|`.
    pub fn is_filter(&self) -> bool {
        matches!(self, Self::Grep)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every verb name, for completion.
pub const VERBS: &[&str] = &[
    "ls", "cd", "cat", "tail", "send", "pwd", "help", "exit", "quit", "source", "grep", "browse",
    "live", "version",
];

/// One parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The verb.
    pub verb: Verb,
    /// Positional arguments.
    pub args: Vec<String>,
    /// Flags without their dashes; switches hold `"true"`.
    pub flags: IndexMap<String, String>,
    /// For `send`: the text after the verb, spacing preserved.
    pub raw_args: String,
}

impl Command {
    /// Parse a single command.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input == ".." {
            return Self::bare(Verb::Back);
        }

        let tokens = tokenize(input);
        let Some(first) = tokens.first() else {
            return Self::bare(Verb::Unknown(String::new()));
        };

        let mut command = Self::bare(Verb::parse(first));

        let mut rest = tokens[1..].iter().peekable();
        while let Some(token) = rest.next() {
            if token.starts_with('-') {
                let name = token.trim_start_matches('-').to_string();
                let value = match rest.peek() {
                    Some(next) if !next.starts_with('-') => {
                        let value = (*next).clone();
                        rest.next();
                        value
                    }
                    _ => "true".to_string(),
                };
                command.flags.insert(name, value);
            } else {
                command.args.push(token.clone());
            }
        }

        if command.verb == Verb::Send && tokens.len() > 1 {
            command.raw_args = input
                .split_once(char::is_whitespace)
                .map(|(_, rest)| strip_enclosing_quotes(rest.trim()).to_string())
                .unwrap_or_default();
        }

        command
    }

    fn bare(verb: Verb) -> Self {
        Self {
            verb,
            args: Vec::new(),
            flags: IndexMap::new(),
            raw_args: String::new(),
        }
    }

    /// Integer flag value, or `default` when absent or malformed.
    pub fn flag_int(&self, name: &str, default: i64) -> i64 {
        self.flags
            .get(name)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Whether a flag is present.
    pub fn flag_bool(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    /// First positional argument.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

/// Commands joined by `|`; never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    /// Stages in order.
    pub commands: Vec<Command>,
}

impl Pipeline {
    /// Parse a full input line.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.is_empty() {
            return Self {
                commands: vec![Command::parse("")],
            };
        }

        Self {
            commands: split_pipeline(input)
                .iter()
                .map(|stage| Command::parse(stage))
                .collect(),
        }
    }

    /// The producing stage.
    pub fn first(&self) -> &Command {
        // Construction guarantees at least one stage
        &self.commands[0]
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Tracks the open quote while scanning.
#[derive(Default)]
struct Quotes {
    open: Option<char>,
}

impl Quotes {
    /// Feed a character; true when it opened or closed a quote.
    fn feed(&mut self, c: char) -> bool {
        match self.open {
            None if c == '"' || c == '\'' => {
                self.open = Some(c);
                true
            }
            Some(q) if q == c => {
                self.open = None;
                true
            }
            _ => false,
        }
    }

    fn is_open(&self) -> bool {
        self.open.is_some()
    }
}

/// Split on unquoted whitespace, dropping quote characters.
pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quotes = Quotes::default();

    for c in input.chars() {
        if quotes.feed(c) {
            continue;
        }
        if c.is_whitespace() && !quotes.is_open() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Split on unquoted `|`, keeping quote characters for the stage parser.
pub fn split_pipeline(input: &str) -> Vec<String> {
    let mut stages = Vec::new();
    let mut current = String::new();
    let mut quotes = Quotes::default();

    for c in input.chars() {
        if c == '|' && !quotes.is_open() {
            stages.push(std::mem::take(&mut current));
            continue;
        }
        quotes.feed(c);
        current.push(c);
    }
    if !current.is_empty() {
        stages.push(current);
    }

    stages
}

/// Whether the input contains an unquoted `|`.
pub fn is_pipeline(input: &str) -> bool {
    let mut quotes = Quotes::default();
    input.chars().any(|c| !quotes.feed(c) && c == '|' && !quotes.is_open())
}

fn strip_enclosing_quotes(text: &str) -> &str {
    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            let inner = &text[1..text.len() - 1];
            // `"a" and "b"` is not one quoted span
            if !inner.contains(quote) {
                return inner;
            }
        }
    }
    text
}
