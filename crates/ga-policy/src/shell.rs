// shell.rs — Structural parsing of shell command lines.
//
// The profile builder needs to know which commands a command line would run
// and which words it would hand them. This module does that without a shell:
//
// 1. `strip_shell_wrapper` peels off `bash -c '...'`-style wrappers.
// 2. The lexer turns text into words, operators, and redirections, honoring
//    quotes, escapes, substitutions, and here-documents.
// 3. The segmenter splits the token stream into simple commands and rejects
//    malformed structure (empty segments, trailing operators, stray parens).
// 4. The expander finds the command name of every simple command and
//    recursively expands wrappers (`sudo`, `env`, `timeout`, `sh -c`, ...)
//    and command substitutions, so nested commands are never hidden.
//
// Anything the parser cannot analyze statically (substitutions, loops,
// variable command names, `eval`) still parses, but sets `uncertain` so the
// builder can lower its confidence.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ShellParseError;

/// Deepest wrapper/substitution nesting the parser follows.
pub const MAX_NESTING: usize = 8;

static SHELL_WRAPPER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?:sh|bash|zsh)\s+-c|cmd(?:\.exe)?\s+/c|(?:powershell|pwsh)(?:\.exe)?\s+(?:-NoProfile\s+)?-Command)\s+",
    )
    .expect("invalid shell wrapper regex")
});

/// How a redirection uses its target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// `>`, `>|`, `&>`: the file is created or truncated.
    Truncate,
    /// `>>`, `&>>`: the file is created or appended to.
    Append,
    /// `<`, `<>`: the file is read.
    Read,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub target: String,
}

/// One command the line would run: its name (path stripped) and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub name: String,
    pub args: Vec<String>,
    pub redirects: Vec<Redirect>,
}

/// The result of parsing a command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Every invocation in source order; wrapped commands follow their wrapper.
    pub invocations: Vec<Invocation>,
    /// Redirections attached to no command (e.g. `> file` on its own).
    pub bare_redirects: Vec<Redirect>,
    /// Set when a construct was present whose effect cannot be known
    /// statically (substitutions, loops, `eval`, variable command names).
    pub uncertain: bool,
}

impl ParsedCommand {
    /// Command names in first-seen order, without duplicates.
    pub fn roots(&self) -> Vec<String> {
        let mut roots: Vec<String> = Vec::new();
        for invocation in &self.invocations {
            if !invocation.name.is_empty() && !roots.contains(&invocation.name) {
                roots.push(invocation.name.clone());
            }
        }
        roots
    }

    /// All redirections, attached or not.
    pub fn redirects(&self) -> impl Iterator<Item = &Redirect> {
        self.invocations
            .iter()
            .flat_map(|inv| inv.redirects.iter())
            .chain(self.bare_redirects.iter())
    }
}

/// Remove wrapper syntax around the real command: `sh|bash|zsh -c '...'`,
/// `cmd /c`, `powershell -Command`, matching outer quotes left behind by a
/// wrapper, and parentheses enclosing the whole command. Repeats until the
/// text stops changing.
pub fn strip_shell_wrapper(command: &str) -> String {
    let mut current = command.trim().to_string();
    for _ in 0..4 {
        let before = current.clone();
        if let Some(found) = SHELL_WRAPPER.find(&current) {
            let rest = current[found.end()..].trim().to_string();
            current = strip_outer_quotes(&rest).unwrap_or(rest);
        }
        if let Some(inner) = strip_outer_parens(&current) {
            current = inner;
        }
        if current == before {
            break;
        }
    }
    current
}

fn strip_outer_quotes(text: &str) -> Option<String> {
    let quote = text.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    if text.len() < 2 || !text.ends_with(quote) {
        return None;
    }
    let inner = &text[1..text.len() - 1];
    if quote == '\'' {
        return (!inner.contains('\'')).then(|| inner.to_string());
    }
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(n @ ('"' | '\\' | '$' | '`')) => out.push(n),
                Some(n) => {
                    out.push('\\');
                    out.push(n);
                }
                None => return None,
            },
            '"' => return None,
            other => out.push(other),
        }
    }
    Some(out)
}

/// Returns the text inside `( ... )` when the first paren closes at the very
/// end of the command.
fn strip_outer_parens(text: &str) -> Option<String> {
    if !text.starts_with('(') || !text.ends_with(')') {
        return None;
    }
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some('\''), '\'') => quote = None,
            (Some('\''), _) => {}
            (_, '\\') => escaped = true,
            (Some('"'), '"') => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth = depth.checked_sub(1)?;
                if depth == 0 && i != text.len() - 1 {
                    return None;
                }
            }
            _ => {}
        }
    }
    (depth == 0 && quote.is_none()).then(|| text[1..text.len() - 1].trim().to_string())
}

/// Parse a command line into invocations.
pub fn parse(command: &str) -> Result<ParsedCommand, ShellParseError> {
    let mut out = ParsedCommand::default();
    parse_at(command, 0, &mut out)?;
    Ok(out)
}

fn parse_at(src: &str, depth: usize, out: &mut ParsedCommand) -> Result<(), ShellParseError> {
    if depth > MAX_NESTING {
        return Err(ShellParseError::TooDeep { max: MAX_NESTING });
    }
    let lexed = Lexer::new(src).run()?;
    let (commands, uncertain) = segment(lexed.tokens)?;
    out.uncertain |= lexed.uncertain || uncertain;
    for command in commands {
        expand_simple(command, depth, out)?;
    }
    Ok(())
}

// ── Lexer ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct Word {
    /// Text with quotes removed and escapes applied. Substitutions are kept
    /// in their source form (`$(...)`).
    text: String,
    quoted: bool,
    /// Contains a parameter expansion or substitution.
    dynamic: bool,
    /// Bodies of command/process substitutions found inside this word.
    substitutions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    AndIf,
    OrIf,
    Pipe,
    PipeAmp,
    Semi,
    Amp,
    Newline,
    LParen,
    RParen,
}

impl Op {
    fn as_str(self) -> &'static str {
        match self {
            Op::AndIf => "&&",
            Op::OrIf => "||",
            Op::Pipe => "|",
            Op::PipeAmp => "|&",
            Op::Semi => ";",
            Op::Amp => "&",
            Op::Newline => "newline",
            Op::LParen => "(",
            Op::RParen => ")",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RedirectOp {
    Out,
    Append,
    In,
    ReadWrite,
    OutAll,
    AppendAll,
    HereString,
    /// `2>&1`, `<&0`, `>&-`: duplicates a descriptor, no file involved.
    DupFd,
}

impl RedirectOp {
    fn as_str(self) -> &'static str {
        match self {
            RedirectOp::Out => ">",
            RedirectOp::Append => ">>",
            RedirectOp::In => "<",
            RedirectOp::ReadWrite => "<>",
            RedirectOp::OutAll => "&>",
            RedirectOp::AppendAll => "&>>",
            RedirectOp::HereString => "<<<",
            RedirectOp::DupFd => ">&",
        }
    }

    fn kind(self) -> Option<RedirectKind> {
        match self {
            RedirectOp::Out | RedirectOp::OutAll => Some(RedirectKind::Truncate),
            RedirectOp::Append | RedirectOp::AppendAll => Some(RedirectKind::Append),
            RedirectOp::In | RedirectOp::ReadWrite => Some(RedirectKind::Read),
            RedirectOp::HereString | RedirectOp::DupFd => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Token {
    Word(Word),
    Op(Op),
    Redirect(RedirectOp),
}

struct Lexed {
    tokens: Vec<Token>,
    uncertain: bool,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    tokens: Vec<Token>,
    word: Option<Word>,
    /// Set right after `<<` / `<<-`: the next word is a heredoc delimiter.
    /// The flag records whether leading tabs are stripped (`<<-`).
    heredoc_delimiter_next: Option<bool>,
    pending_heredocs: Vec<(String, bool)>,
    uncertain: bool,
}

impl Lexer {
    fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            tokens: Vec::new(),
            word: None,
            heredoc_delimiter_next: None,
            pending_heredocs: Vec::new(),
            uncertain: false,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn word_mut(&mut self) -> &mut Word {
        self.word.get_or_insert_with(Word::default)
    }

    fn flush_word(&mut self) {
        if let Some(word) = self.word.take() {
            if let Some(strip_tabs) = self.heredoc_delimiter_next.take() {
                self.pending_heredocs.push((word.text, strip_tabs));
                self.uncertain = true;
            } else {
                self.tokens.push(Token::Word(word));
            }
        }
    }

    fn ensure_no_dangling_heredoc(&self) -> Result<(), ShellParseError> {
        if self.heredoc_delimiter_next.is_some() {
            return Err(ShellParseError::MissingRedirectTarget {
                op: "<<".to_string(),
            });
        }
        Ok(())
    }

    fn push_op(&mut self, op: Op) -> Result<(), ShellParseError> {
        self.flush_word();
        self.ensure_no_dangling_heredoc()?;
        self.tokens.push(Token::Op(op));
        Ok(())
    }

    fn push_redirect(&mut self, op: RedirectOp) -> Result<(), ShellParseError> {
        self.flush_word();
        self.ensure_no_dangling_heredoc()?;
        self.tokens.push(Token::Redirect(op));
        Ok(())
    }

    /// A bare run of digits right before `<` or `>` is a descriptor number.
    fn drop_fd_prefix(&mut self) {
        let is_fd = self.word.as_ref().is_some_and(|w| {
            !w.quoted
                && !w.dynamic
                && !w.text.is_empty()
                && w.text.chars().all(|c| c.is_ascii_digit())
        });
        if is_fd {
            self.word = None;
        }
    }

    /// Consume the descriptor after `>&` / `<&`. Returns false when what
    /// follows is a file name instead (`>&file` means `&>file`).
    fn eat_dup_target(&mut self) -> bool {
        let mut consumed = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
            consumed = true;
        }
        if !consumed && self.eat('-') {
            consumed = true;
        }
        consumed
    }

    fn run(mut self) -> Result<Lexed, ShellParseError> {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                    self.flush_word();
                }
                '\n' => {
                    self.bump();
                    self.push_op(Op::Newline)?;
                    self.read_heredoc_bodies()?;
                }
                '#' if self.word.is_none() => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.bump();
                    }
                }
                '\\' => {
                    self.bump();
                    match self.bump() {
                        Some('\n') => {}
                        Some(escaped) => {
                            let word = self.word_mut();
                            word.text.push(escaped);
                            word.quoted = true;
                        }
                        None => self.word_mut().text.push('\\'),
                    }
                }
                '\'' => {
                    self.bump();
                    self.single_quoted()?;
                }
                '"' => {
                    self.bump();
                    self.word_mut().quoted = true;
                    self.double_quoted()?;
                }
                '`' => {
                    self.bump();
                    self.backtick()?;
                }
                '$' => {
                    self.bump();
                    self.dollar()?;
                }
                '|' => {
                    self.bump();
                    let op = if self.eat('|') {
                        Op::OrIf
                    } else if self.eat('&') {
                        Op::PipeAmp
                    } else {
                        Op::Pipe
                    };
                    self.push_op(op)?;
                }
                '&' => {
                    self.bump();
                    if self.eat('&') {
                        self.push_op(Op::AndIf)?;
                    } else if self.eat('>') {
                        let op = if self.eat('>') {
                            RedirectOp::AppendAll
                        } else {
                            RedirectOp::OutAll
                        };
                        self.push_redirect(op)?;
                    } else {
                        self.push_op(Op::Amp)?;
                    }
                }
                ';' => {
                    self.bump();
                    self.push_op(Op::Semi)?;
                }
                '(' => {
                    self.bump();
                    self.push_op(Op::LParen)?;
                }
                ')' => {
                    self.bump();
                    self.push_op(Op::RParen)?;
                }
                '<' | '>' if self.peek_at(1) == Some('(') => {
                    self.pos += 2;
                    self.process_substitution(c)?;
                }
                '<' => {
                    self.bump();
                    self.drop_fd_prefix();
                    if self.eat('<') {
                        if self.eat('<') {
                            self.push_redirect(RedirectOp::HereString)?;
                        } else {
                            let strip_tabs = self.eat('-');
                            self.flush_word();
                            self.ensure_no_dangling_heredoc()?;
                            self.heredoc_delimiter_next = Some(strip_tabs);
                        }
                    } else if self.eat('>') {
                        self.push_redirect(RedirectOp::ReadWrite)?;
                    } else if self.eat('&') {
                        let op = if self.eat_dup_target() {
                            RedirectOp::DupFd
                        } else {
                            RedirectOp::In
                        };
                        self.push_redirect(op)?;
                    } else {
                        self.push_redirect(RedirectOp::In)?;
                    }
                }
                '>' => {
                    self.bump();
                    self.drop_fd_prefix();
                    let op = if self.eat('>') {
                        RedirectOp::Append
                    } else if self.eat('&') {
                        if self.eat_dup_target() {
                            RedirectOp::DupFd
                        } else {
                            RedirectOp::OutAll
                        }
                    } else {
                        self.eat('|');
                        RedirectOp::Out
                    };
                    self.push_redirect(op)?;
                }
                other => {
                    self.bump();
                    self.word_mut().text.push(other);
                }
            }
        }
        self.flush_word();
        self.ensure_no_dangling_heredoc()?;
        if let Some((delimiter, _)) = self.pending_heredocs.first() {
            return Err(ShellParseError::UnterminatedHeredoc {
                delimiter: delimiter.clone(),
            });
        }
        Ok(Lexed {
            tokens: self.tokens,
            uncertain: self.uncertain,
        })
    }

    fn single_quoted(&mut self) -> Result<(), ShellParseError> {
        let mut buf = String::new();
        loop {
            match self.bump() {
                None => return Err(ShellParseError::UnterminatedQuote { quote: '\'' }),
                Some('\'') => break,
                Some(c) => buf.push(c),
            }
        }
        let word = self.word_mut();
        word.text.push_str(&buf);
        word.quoted = true;
        Ok(())
    }

    fn double_quoted(&mut self) -> Result<(), ShellParseError> {
        loop {
            match self.bump() {
                None => return Err(ShellParseError::UnterminatedQuote { quote: '"' }),
                Some('"') => return Ok(()),
                Some('\\') => match self.bump() {
                    Some(c @ ('"' | '\\' | '$' | '`')) => self.word_mut().text.push(c),
                    Some('\n') => {}
                    Some(c) => {
                        let word = self.word_mut();
                        word.text.push('\\');
                        word.text.push(c);
                    }
                    None => return Err(ShellParseError::UnterminatedQuote { quote: '"' }),
                },
                Some('$') => self.dollar()?,
                Some('`') => self.backtick()?,
                Some(c) => self.word_mut().text.push(c),
            }
        }
    }

    /// Handle everything that can follow a `$`.
    fn dollar(&mut self) -> Result<(), ShellParseError> {
        match self.peek() {
            Some('(') => {
                self.bump();
                if self.eat('(') {
                    let body = self.scan_balanced('(', ')', 2, "arithmetic")?;
                    let word = self.word_mut();
                    word.text.push_str("$((");
                    word.text.push_str(&body);
                    word.text.push(')');
                    word.dynamic = true;
                } else {
                    let body = self.scan_balanced('(', ')', 1, "command")?;
                    let word = self.word_mut();
                    word.text.push_str("$(");
                    word.text.push_str(&body);
                    word.text.push(')');
                    word.dynamic = true;
                    word.substitutions.push(body);
                }
            }
            Some('{') => {
                self.bump();
                let body = self.scan_balanced('{', '}', 1, "parameter")?;
                if body.contains("@P") {
                    return Err(ShellParseError::PromptTransform);
                }
                if body.contains("$(") || body.contains('`') {
                    self.uncertain = true;
                }
                let word = self.word_mut();
                word.text.push_str("${");
                word.text.push_str(&body);
                word.text.push('}');
                word.dynamic = true;
            }
            Some('\'') => {
                // ANSI-C quoting: $'...'
                self.bump();
                let mut buf = String::new();
                loop {
                    match self.bump() {
                        None => return Err(ShellParseError::UnterminatedQuote { quote: '\'' }),
                        Some('\'') => break,
                        Some('\\') => {
                            if let Some(c) = self.bump() {
                                buf.push(c);
                            }
                        }
                        Some(c) => buf.push(c),
                    }
                }
                let word = self.word_mut();
                word.text.push_str(&buf);
                word.quoted = true;
            }
            Some('"') => {
                self.bump();
                self.word_mut().quoted = true;
                self.double_quoted()?;
            }
            Some(c) if c.is_ascii_alphanumeric() || c == '_' => {
                let mut name = String::from("$");
                while let Some(c) = self.peek().filter(|c| c.is_ascii_alphanumeric() || *c == '_') {
                    name.push(c);
                    self.pos += 1;
                }
                let word = self.word_mut();
                word.text.push_str(&name);
                word.dynamic = true;
            }
            Some(c @ ('@' | '*' | '#' | '?' | '$' | '!' | '-')) => {
                self.bump();
                let word = self.word_mut();
                word.text.push('$');
                word.text.push(c);
                word.dynamic = true;
            }
            _ => self.word_mut().text.push('$'),
        }
        Ok(())
    }

    /// Collect text up to the bracket that brings `depth` back to zero,
    /// skipping over quoted regions. The closing bracket is consumed but not
    /// returned.
    fn scan_balanced(
        &mut self,
        open: char,
        close: char,
        mut depth: usize,
        kind: &'static str,
    ) -> Result<String, ShellParseError> {
        let unterminated = || ShellParseError::UnterminatedSubstitution { kind };
        let mut body = String::new();
        loop {
            let c = self.bump().ok_or_else(unterminated)?;
            match c {
                '\'' if open == '(' => {
                    body.push(c);
                    loop {
                        let q = self.bump().ok_or_else(unterminated)?;
                        body.push(q);
                        if q == '\'' {
                            break;
                        }
                    }
                }
                '"' => {
                    body.push(c);
                    loop {
                        let q = self.bump().ok_or_else(unterminated)?;
                        body.push(q);
                        if q == '\\' {
                            if let Some(n) = self.bump() {
                                body.push(n);
                            }
                        } else if q == '"' {
                            break;
                        }
                    }
                }
                '\\' => {
                    body.push(c);
                    if let Some(n) = self.bump() {
                        body.push(n);
                    }
                }
                c if c == open => {
                    depth += 1;
                    body.push(c);
                }
                c if c == close => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(body);
                    }
                    body.push(c);
                }
                c => body.push(c),
            }
        }
    }

    fn backtick(&mut self) -> Result<(), ShellParseError> {
        let mut body = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(ShellParseError::UnterminatedSubstitution { kind: "backtick" })
                }
                Some('`') => break,
                Some('\\') => match self.bump() {
                    Some(c @ ('`' | '\\' | '$')) => body.push(c),
                    Some(c) => {
                        body.push('\\');
                        body.push(c);
                    }
                    None => {
                        return Err(ShellParseError::UnterminatedSubstitution { kind: "backtick" })
                    }
                },
                Some(c) => body.push(c),
            }
        }
        let word = self.word_mut();
        word.text.push('`');
        word.text.push_str(&body);
        word.text.push('`');
        word.dynamic = true;
        word.substitutions.push(body);
        Ok(())
    }

    fn process_substitution(&mut self, direction: char) -> Result<(), ShellParseError> {
        let body = self.scan_balanced('(', ')', 1, "process")?;
        let word = self.word_mut();
        word.text.push(direction);
        word.text.push('(');
        word.text.push_str(&body);
        word.text.push(')');
        word.dynamic = true;
        word.substitutions.push(body);
        Ok(())
    }

    /// After a newline, skip the bodies of any here-documents opened on the
    /// line that just ended.
    fn read_heredoc_bodies(&mut self) -> Result<(), ShellParseError> {
        let pending = std::mem::take(&mut self.pending_heredocs);
        for (delimiter, strip_tabs) in pending {
            loop {
                if self.pos >= self.chars.len() {
                    return Err(ShellParseError::UnterminatedHeredoc { delimiter });
                }
                let start = self.pos;
                while self.peek().is_some_and(|c| c != '\n') {
                    self.pos += 1;
                }
                let line: String = self.chars[start..self.pos].iter().collect();
                self.eat('\n');
                let line = if strip_tabs {
                    line.trim_start_matches('\t')
                } else {
                    line.as_str()
                };
                if line == delimiter {
                    break;
                }
            }
        }
        Ok(())
    }
}

// ── Segmenter ────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SimpleCommand {
    words: Vec<Word>,
    redirects: Vec<(RedirectOp, Word)>,
}

impl SimpleCommand {
    fn is_empty(&self) -> bool {
        self.words.is_empty() && self.redirects.is_empty()
    }
}

fn segment(tokens: Vec<Token>) -> Result<(Vec<SimpleCommand>, bool), ShellParseError> {
    let mut commands = Vec::new();
    let mut current = SimpleCommand::default();
    let mut depth = 0usize;
    // A binary operator or `(` is still waiting for the command after it.
    let mut need_command = false;
    // A `)` just closed; the group counts as the command before an operator.
    let mut after_group = false;
    let mut uncertain = false;
    let mut tokens = tokens.into_iter().peekable();

    while let Some(token) = tokens.next() {
        match token {
            Token::Word(word) => {
                current.words.push(word);
                need_command = false;
                after_group = false;
            }
            Token::Redirect(RedirectOp::DupFd) => {}
            Token::Redirect(op) => match tokens.next() {
                Some(Token::Word(target)) => {
                    current.redirects.push((op, target));
                    need_command = false;
                }
                _ => {
                    return Err(ShellParseError::MissingRedirectTarget {
                        op: op.as_str().to_string(),
                    })
                }
            },
            Token::Op(Op::Newline) => {
                if need_command || current.is_empty() {
                    continue;
                }
                commands.push(std::mem::take(&mut current));
                after_group = false;
            }
            Token::Op(op @ (Op::Semi | Op::Amp)) => {
                if current.is_empty() && !after_group {
                    return Err(ShellParseError::EmptySegment {
                        near: op.as_str().to_string(),
                    });
                }
                if !current.is_empty() {
                    commands.push(std::mem::take(&mut current));
                }
                after_group = false;
            }
            Token::Op(op @ (Op::AndIf | Op::OrIf | Op::Pipe | Op::PipeAmp)) => {
                if current.is_empty() && !after_group {
                    return Err(ShellParseError::EmptySegment {
                        near: op.as_str().to_string(),
                    });
                }
                if !current.is_empty() {
                    commands.push(std::mem::take(&mut current));
                }
                need_command = true;
                after_group = false;
            }
            Token::Op(Op::LParen) => {
                if !current.is_empty() {
                    // `name()` opens a function definition.
                    let is_function = current.words.len() == 1
                        && current.redirects.is_empty()
                        && matches!(tokens.peek(), Some(Token::Op(Op::RParen)));
                    if !is_function {
                        return Err(ShellParseError::UnbalancedParens);
                    }
                    tokens.next();
                    uncertain = true;
                    current = SimpleCommand::default();
                    continue;
                }
                depth += 1;
                need_command = true;
                after_group = false;
            }
            Token::Op(Op::RParen) => {
                if depth == 0 {
                    return Err(ShellParseError::UnbalancedParens);
                }
                if need_command && current.is_empty() {
                    return Err(ShellParseError::EmptySegment {
                        near: ")".to_string(),
                    });
                }
                if !current.is_empty() {
                    commands.push(std::mem::take(&mut current));
                }
                depth -= 1;
                need_command = false;
                after_group = true;
            }
        }
    }

    if depth != 0 {
        return Err(ShellParseError::UnbalancedParens);
    }
    if need_command {
        return Err(ShellParseError::EmptySegment {
            near: "end of input".to_string(),
        });
    }
    if !current.is_empty() {
        commands.push(current);
    }
    Ok((commands, uncertain))
}

// ── Expander ─────────────────────────────────────────────────────

/// Reserved words that introduce a command (`if rm x; then ...`).
const PREFIX_KEYWORDS: &[&str] = &["if", "then", "else", "elif", "while", "until", "do"];
/// Reserved words that only close a construct.
const CLOSING_KEYWORDS: &[&str] = &["fi", "done", "esac", "}", "!", "{"];
/// Reserved words whose segment is a header rather than a command.
const HEADER_KEYWORDS: &[&str] = &["for", "select", "case", "function"];

/// Wrappers whose nested command receives arguments not visible in the text.
const ARGUMENT_FEEDERS: &[&str] = &["xargs", "eval"];

enum Nested {
    None,
    Argv(Vec<Word>),
    Script(String),
    /// Runs code that is not visible in the command line (a script file,
    /// stdin, a sourced file).
    Opaque,
}

fn expand_simple(
    command: SimpleCommand,
    depth: usize,
    out: &mut ParsedCommand,
) -> Result<(), ShellParseError> {
    if depth > MAX_NESTING {
        return Err(ShellParseError::TooDeep { max: MAX_NESTING });
    }

    let substitutions: Vec<String> = command
        .words
        .iter()
        .chain(command.redirects.iter().map(|(_, target)| target))
        .flat_map(|word| word.substitutions.iter().cloned())
        .collect();

    let redirects: Vec<Redirect> = command
        .redirects
        .iter()
        .filter_map(|(op, target)| {
            op.kind().map(|kind| Redirect {
                kind,
                target: target.text.clone(),
            })
        })
        .collect();

    let mut words: &[Word] = &command.words;
    while let Some(first) = words.first() {
        if first.quoted {
            break;
        }
        let text = first.text.as_str();
        if HEADER_KEYWORDS.contains(&text) {
            out.uncertain = true;
            words = &[];
            break;
        }
        if PREFIX_KEYWORDS.contains(&text) {
            out.uncertain = true;
            words = &words[1..];
        } else if CLOSING_KEYWORDS.contains(&text) {
            words = &words[1..];
        } else {
            break;
        }
    }
    while words.first().is_some_and(is_assignment) {
        words = &words[1..];
    }

    match words.split_first() {
        None => out.bare_redirects.extend(redirects),
        Some((name_word, rest)) => {
            if name_word.dynamic {
                out.uncertain = true;
            }
            let name = command_name(&name_word.text);
            if ARGUMENT_FEEDERS.contains(&name.as_str()) {
                out.uncertain = true;
            }
            out.invocations.push(Invocation {
                name: name.clone(),
                args: rest.iter().map(|w| w.text.clone()).collect(),
                redirects,
            });
            match nested_command(&name, rest) {
                Nested::None => {}
                Nested::Argv(words) if words.is_empty() => {}
                Nested::Argv(words) => expand_simple(
                    SimpleCommand {
                        words,
                        redirects: Vec::new(),
                    },
                    depth + 1,
                    out,
                )?,
                Nested::Script(script) => parse_at(&script, depth + 1, out)?,
                Nested::Opaque => out.uncertain = true,
            }
        }
    }

    for body in substitutions {
        out.uncertain = true;
        parse_at(&body, depth + 1, out)?;
    }
    Ok(())
}

fn is_assignment(word: &Word) -> bool {
    let Some(eq) = word.text.find('=') else {
        return false;
    };
    let name = &word.text[..eq];
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn command_name(text: &str) -> String {
    match text.rsplit('/').next() {
        Some(base) if !base.is_empty() => base.to_string(),
        _ => text.to_string(),
    }
}

/// Skip leading options (and the values of options listed in `with_value`),
/// then `positional` more words; what remains is the wrapped command.
fn after_options(args: &[Word], with_value: &[&str], positional: usize) -> Vec<Word> {
    let mut i = 0;
    while let Some(arg) = args.get(i) {
        let text = arg.text.as_str();
        if text == "--" {
            i += 1;
            break;
        }
        if text.len() > 1 && text.starts_with('-') {
            i += if with_value.contains(&text) { 2 } else { 1 };
            continue;
        }
        break;
    }
    args.iter().skip(i + positional).cloned().collect()
}

fn join_words(words: &[Word]) -> String {
    words
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn nested_command(name: &str, args: &[Word]) -> Nested {
    match name {
        "sudo" => Nested::Argv(after_options(
            args,
            &[
                "-u", "-g", "-C", "-D", "-h", "-p", "-r", "-t", "-U", "-T", "--user", "--group",
                "--chdir", "--prompt", "--host", "--role", "--type", "--other-user",
            ],
            0,
        )),
        "doas" => Nested::Argv(after_options(args, &["-u", "-C"], 0)),
        "su" => su_script(args),
        "env" => env_nested(args),
        "nice" => Nested::Argv(after_options(args, &["-n", "--adjustment"], 0)),
        "ionice" => Nested::Argv(after_options(args, &["-c", "-n", "-p", "--class"], 0)),
        "nohup" | "builtin" => Nested::Argv(args.to_vec()),
        "time" => Nested::Argv(after_options(args, &["-f", "-o", "--format", "--output"], 0)),
        "timeout" => Nested::Argv(after_options(
            args,
            &["-s", "-k", "--signal", "--kill-after"],
            1,
        )),
        "exec" => Nested::Argv(after_options(args, &["-a"], 0)),
        "command" => {
            if args.iter().any(|a| a.text == "-v" || a.text == "-V") {
                Nested::None
            } else {
                Nested::Argv(after_options(args, &[], 0))
            }
        }
        "stdbuf" => Nested::Argv(after_options(
            args,
            &["-i", "-o", "-e", "--input", "--output", "--error"],
            0,
        )),
        "xargs" => Nested::Argv(after_options(
            args,
            &[
                "-I", "-n", "-P", "-L", "-d", "-E", "-s", "-a", "--max-args", "--max-procs",
                "--delimiter", "--arg-file", "--max-lines", "--eof",
            ],
            0,
        )),
        "watch" => {
            let rest = after_options(args, &["-n", "--interval"], 0);
            if rest.is_empty() {
                Nested::None
            } else {
                Nested::Script(join_words(&rest))
            }
        }
        "eval" => {
            if args.is_empty() {
                Nested::None
            } else {
                Nested::Script(join_words(args))
            }
        }
        "sh" | "bash" | "zsh" | "dash" | "ksh" | "fish" => interpreter_nested(args),
        "source" | "." => Nested::Opaque,
        "find" => find_exec(args),
        _ => Nested::None,
    }
}

fn su_script(args: &[Word]) -> Nested {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let text = arg.text.as_str();
        if text == "-c" || text == "--command" {
            return match iter.next() {
                Some(script) => Nested::Script(script.text.clone()),
                None => Nested::Opaque,
            };
        }
        if let Some(script) = text.strip_prefix("--command=") {
            return Nested::Script(script.to_string());
        }
    }
    Nested::None
}

fn env_nested(args: &[Word]) -> Nested {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let text = arg.text.as_str();
        if text == "-S" || text == "--split-string" {
            return match iter.next() {
                Some(script) => Nested::Script(script.text.clone()),
                None => Nested::None,
            };
        }
    }
    Nested::Argv(after_options(args, &["-u", "--unset", "-C", "--chdir"], 0))
}

/// `bash -c 'script'` runs the script; `bash file.sh` or a bare `bash`
/// (reading stdin) runs code we cannot see.
fn interpreter_nested(args: &[Word]) -> Nested {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let text = arg.text.as_str();
        if text == "--" {
            break;
        }
        if text.starts_with('-') && !text.starts_with("--") && text[1..].contains('c') {
            return match iter.next() {
                Some(script) => Nested::Script(script.text.clone()),
                None => Nested::Opaque,
            };
        }
        if text.starts_with('-') || text.starts_with('+') {
            continue;
        }
        break;
    }
    Nested::Opaque
}

fn find_exec(args: &[Word]) -> Nested {
    let Some(start) = args
        .iter()
        .position(|a| matches!(a.text.as_str(), "-exec" | "-execdir" | "-ok" | "-okdir"))
    else {
        return Nested::None;
    };
    let command: Vec<Word> = args[start + 1..]
        .iter()
        .take_while(|a| a.text != ";" && a.text != "+")
        .cloned()
        .collect();
    Nested::Argv(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots(command: &str) -> Vec<String> {
        parse(command).unwrap().roots()
    }

    #[test]
    fn strips_common_wrappers() {
        assert_eq!(strip_shell_wrapper("bash -c 'rm -rf /tmp/x'"), "rm -rf /tmp/x");
        assert_eq!(strip_shell_wrapper("  sh -c \"echo \\\"hi\\\"\""), "echo \"hi\"");
        assert_eq!(strip_shell_wrapper("cmd.exe /c dir"), "dir");
        assert_eq!(
            strip_shell_wrapper("powershell -NoProfile -Command Get-ChildItem"),
            "Get-ChildItem"
        );
        assert_eq!(strip_shell_wrapper("(cd src && ls)"), "cd src && ls");
        assert_eq!(strip_shell_wrapper("(a) && (b)"), "(a) && (b)");
        assert_eq!(strip_shell_wrapper("ls -la"), "ls -la");
    }

    #[test]
    fn splits_on_all_control_operators() {
        assert_eq!(
            roots("ls && cat a || grep x b; echo done | wc -l & sleep 1\nfree -h"),
            vec!["ls", "cat", "grep", "echo", "wc", "sleep", "free"]
        );
    }

    #[test]
    fn quoted_operators_do_not_split() {
        let parsed = parse("echo 'a && b' \"c; d\"").unwrap();
        assert_eq!(parsed.roots(), vec!["echo"]);
        assert_eq!(parsed.invocations[0].args, vec!["a && b", "c; d"]);
    }

    #[test]
    fn env_assignments_and_paths_are_skipped() {
        assert_eq!(roots("FOO=1 BAR=2 /usr/bin/env ls"), vec!["env", "ls"]);
    }

    #[test]
    fn wrappers_expose_nested_commands() {
        assert_eq!(roots("sudo -u root rm -rf /etc/x"), vec!["sudo", "rm"]);
        assert_eq!(roots("timeout 5 curl example.com"), vec!["timeout", "curl"]);
        assert_eq!(roots("nohup nice -n 10 tar czf a.tgz src"), vec!["nohup", "nice", "tar"]);
        assert_eq!(roots("bash -lc 'rm -rf build'"), vec!["bash", "rm"]);
        assert_eq!(roots("su -c 'mkfs /dev/sdb' root"), vec!["su", "mkfs"]);
        assert_eq!(roots("find . -name '*.o' -exec rm {} \\;"), vec!["find", "rm"]);
    }

    #[test]
    fn substitutions_are_parsed_and_uncertain() {
        let parsed = parse("echo $(rm -rf ~) `whoami`").unwrap();
        assert_eq!(parsed.roots(), vec!["echo", "rm", "whoami"]);
        assert!(parsed.uncertain);
    }

    #[test]
    fn redirections_are_recorded() {
        let parsed = parse("cat < in.txt > out.txt 2>&1 >> log.txt").unwrap();
        let redirects: Vec<_> = parsed.redirects().cloned().collect();
        assert_eq!(
            redirects,
            vec![
                Redirect { kind: RedirectKind::Read, target: "in.txt".into() },
                Redirect { kind: RedirectKind::Truncate, target: "out.txt".into() },
                Redirect { kind: RedirectKind::Append, target: "log.txt".into() },
            ]
        );
        assert_eq!(parsed.invocations[0].args, Vec::<String>::new());
    }

    #[test]
    fn heredoc_body_is_skipped() {
        let parsed = parse("cat <<EOF > notes.txt\nrm -rf /\nEOF\nls").unwrap();
        assert_eq!(parsed.roots(), vec!["cat", "ls"]);
        assert!(parsed.uncertain);
    }

    #[test]
    fn control_structures_lower_certainty() {
        let parsed = parse("for f in *.log; do rm \"$f\"; done").unwrap();
        assert_eq!(parsed.roots(), vec!["rm"]);
        assert!(parsed.uncertain);

        let parsed = parse("if test -f a; then cp a b; fi").unwrap();
        assert_eq!(parsed.roots(), vec!["test", "cp"]);
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(matches!(parse("ls &&"), Err(ShellParseError::EmptySegment { .. })));
        assert!(matches!(parse("&& ls"), Err(ShellParseError::EmptySegment { .. })));
        assert!(matches!(parse("ls ;; ls"), Err(ShellParseError::EmptySegment { .. })));
        assert!(matches!(parse("ls |"), Err(ShellParseError::EmptySegment { .. })));
        assert!(matches!(
            parse("echo 'oops"),
            Err(ShellParseError::UnterminatedQuote { quote: '\'' })
        ));
        assert!(matches!(parse("echo $(ls"), Err(ShellParseError::UnterminatedSubstitution { .. })));
        assert!(matches!(parse("ls >"), Err(ShellParseError::MissingRedirectTarget { .. })));
        assert!(matches!(parse("(ls"), Err(ShellParseError::UnbalancedParens)));
        assert!(matches!(parse("ls)"), Err(ShellParseError::UnbalancedParens)));
        assert!(matches!(parse("echo ${PS1@P}"), Err(ShellParseError::PromptTransform)));
        assert!(matches!(parse("cat <<EOF\nno end"), Err(ShellParseError::UnterminatedHeredoc { .. })));
    }

    #[test]
    fn trailing_separators_are_allowed() {
        assert_eq!(roots("ls;"), vec!["ls"]);
        assert_eq!(roots("sleep 10 &"), vec!["sleep"]);
        assert_eq!(roots("ls &&\n  pwd"), vec!["ls", "pwd"]);
        assert_eq!(roots("(cd a && make) | tee log"), vec!["cd", "make", "tee"]);
    }

    #[test]
    fn nesting_is_bounded() {
        let mut command = "ls".to_string();
        for _ in 0..(MAX_NESTING + 2) {
            command = format!("sudo {}", command);
        }
        assert!(matches!(parse(&command), Err(ShellParseError::TooDeep { .. })));
    }
}
