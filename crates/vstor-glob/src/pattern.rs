//! Single path-component glob matching.
//!
//! Supported syntax:
//! - `*` matches zero or more characters
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]` match one character from a set or range
//! - `[!abc]` or `[^abc]` match one character NOT in the set
//! - `{a,b,c}` brace alternatives, nested braces allowed
//! - `\x` matches `x` literally
//!
//! Patterns are compiled once into token lists so that repeated matching
//! (one pattern tested against every record in a store) doesn't re-parse.

/// Upper bound on match steps per pattern test. Adversarial patterns like
/// `*a*a*a*...b` backtrack exponentially; past this bound the test fails.
const MAX_MATCH_STEPS: usize = 100_000;

/// Check whether a string contains glob syntax.
///
/// ```
/// use vstor_glob::contains_glob;
/// assert!(contains_glob("/src/*.rs"));
/// assert!(contains_glob("/src/{a,b}.rs"));
/// assert!(!contains_glob("/src/main.rs"));
/// ```
pub fn contains_glob(s: &str) -> bool {
    if s.contains('*') || s.contains('?') || s.contains('[') {
        return true;
    }
    match (s.find('{'), s.rfind('}')) {
        (Some(open), Some(close)) => open < close,
        _ => false,
    }
}

/// Match a single string against a glob pattern.
///
/// ```
/// use vstor_glob::glob_match;
/// assert!(glob_match("*.{json,toml}", "Cargo.toml"));
/// assert!(glob_match("file[0-9].txt", "file7.txt"));
/// assert!(!glob_match("*.rs", "main.go"));
/// ```
pub fn glob_match(pattern: &str, input: &str) -> bool {
    ComponentPattern::new(pattern).matches(input)
}

/// Expand `{a,b}` alternatives into the full list of plain patterns.
///
/// Unbalanced braces are kept literally.
///
/// ```
/// use vstor_glob::expand_braces;
/// assert_eq!(expand_braces("a{b,c}d"), vec!["abd", "acd"]);
/// assert_eq!(expand_braces("plain"), vec!["plain"]);
/// ```
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some((open, close)) = first_brace_group(pattern) else {
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];

    split_top_level(&pattern[open + 1..close])
        .into_iter()
        .flat_map(|alt| expand_braces(&format!("{prefix}{alt}{suffix}")))
        .collect()
}

/// Byte offsets of the first balanced top-level `{...}` group.
fn first_brace_group(pattern: &str) -> Option<(usize, usize)> {
    let mut depth = 0usize;
    let mut open = None;
    for (i, c) in pattern.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    open = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return open.map(|o| (o, i));
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level(content: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in content.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&content[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&content[start..]);
    parts
}

#[derive(Debug, Clone, PartialEq)]
enum ClassItem {
    Single(char),
    Range(char, char),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Char(char),
    One,
    Run,
    Class { negate: bool, items: Vec<ClassItem> },
}

impl Token {
    fn accepts(&self, c: char) -> bool {
        match self {
            Token::Char(expected) => *expected == c,
            Token::One => true,
            Token::Run => true,
            Token::Class { negate, items } => {
                let hit = items.iter().any(|item| match item {
                    ClassItem::Single(s) => *s == c,
                    ClassItem::Range(lo, hi) => (*lo..=*hi).contains(&c),
                });
                hit != *negate
            }
        }
    }
}

/// A compiled pattern for one path component.
#[derive(Debug, Clone)]
pub struct ComponentPattern {
    source: String,
    alternatives: Vec<Vec<Token>>,
}

impl ComponentPattern {
    /// Compile a pattern, expanding braces up front.
    pub fn new(pattern: &str) -> Self {
        let alternatives = expand_braces(pattern)
            .iter()
            .map(|alt| tokenize(alt))
            .collect();
        Self {
            source: pattern.to_string(),
            alternatives,
        }
    }

    /// The pattern text this was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when no alternative contains a wildcard or class.
    pub fn is_literal(&self) -> bool {
        self.alternatives.len() == 1
            && self.alternatives[0]
                .iter()
                .all(|t| matches!(t, Token::Char(_)))
    }

    /// The exact text matched by a literal pattern, with escapes removed.
    pub fn literal_text(&self) -> Option<String> {
        if !self.is_literal() {
            return None;
        }
        self.alternatives[0]
            .iter()
            .map(|t| match t {
                Token::Char(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    /// True when the pattern can only match names starting with `.`.
    pub fn starts_with_dot(&self) -> bool {
        self.alternatives
            .iter()
            .all(|alt| matches!(alt.first(), Some(Token::Char('.'))))
    }

    pub fn matches(&self, input: &str) -> bool {
        let chars: Vec<char> = input.chars().collect();
        self.alternatives.iter().any(|tokens| {
            let mut steps = 0;
            match_tokens(tokens, &chars, &mut steps)
        })
    }
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                if tokens.last() != Some(&Token::Run) {
                    tokens.push(Token::Run);
                }
                i += 1;
            }
            '?' => {
                tokens.push(Token::One);
                i += 1;
            }
            '[' => match parse_class(&chars[i..]) {
                Some((class, consumed)) => {
                    tokens.push(class);
                    i += consumed;
                }
                // Unclosed bracket is a literal
                None => {
                    tokens.push(Token::Char('['));
                    i += 1;
                }
            },
            '\\' if i + 1 < chars.len() => {
                tokens.push(Token::Char(chars[i + 1]));
                i += 2;
            }
            c => {
                tokens.push(Token::Char(c));
                i += 1;
            }
        }
    }

    tokens
}

/// Parse `[...]` starting at `chars[0] == '['`. Returns the token and the
/// number of chars consumed, or `None` if the class never closes.
fn parse_class(chars: &[char]) -> Option<(Token, usize)> {
    let mut idx = 1;
    let negate = matches!(chars.get(idx), Some('!') | Some('^'));
    if negate {
        idx += 1;
    }

    // `]` directly after the opener is a literal member
    let first = idx;
    let mut items = Vec::new();

    while idx < chars.len() {
        let c = chars[idx];
        if c == ']' && idx > first {
            return Some((Token::Class { negate, items }, idx + 1));
        }
        if idx + 2 < chars.len() && chars[idx + 1] == '-' && chars[idx + 2] != ']' {
            items.push(ClassItem::Range(c, chars[idx + 2]));
            idx += 3;
        } else {
            items.push(ClassItem::Single(c));
            idx += 1;
        }
    }

    None
}

fn match_tokens(tokens: &[Token], input: &[char], steps: &mut usize) -> bool {
    *steps += 1;
    if *steps > MAX_MATCH_STEPS {
        return false;
    }

    match tokens.split_first() {
        None => input.is_empty(),
        Some((Token::Run, rest)) => {
            if rest.is_empty() {
                return true;
            }
            for skip in 0..=input.len() {
                if match_tokens(rest, &input[skip..], steps) {
                    return true;
                }
            }
            false
        }
        Some((token, rest)) => match input.split_first() {
            Some((c, tail)) => token.accepts(*c) && match_tokens(rest, tail, steps),
            None => false,
        },
    }
}
