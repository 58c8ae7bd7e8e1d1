//! Urn Expression Scanner
//!
//! Tokenizes the restricted XPath dialect used by urns and level filters.
//! The scanner is pull-based: [`Scanner::next_token`] advances over one token and
//! exposes its side-channel values ([`Scanner::name`], [`Scanner::prefix`],
//! [`Scanner::number`], [`Scanner::string_value`]) until the next call.
//!
//! Malformed input is reported as [`Token::Unknown`]; only an unterminated string
//! and a bad qualified name raise errors directly from the scanner.

use crate::error::{EnumError, Result, XPathErrorCode};

/// XPath axes recognised after `name::`
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AxisKind {
    Ancestor,
    AncestorOrSelf,
    Attribute,
    Child,
    Descendant,
    DescendantOrSelf,
    Following,
    FollowingSibling,
    Namespace,
    Parent,
    Preceding,
    PrecedingSibling,
    #[serde(rename = "self")]
    SelfAxis,
}

impl AxisKind {
    /// Look up an axis keyword
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let axis = match keyword {
            "child" => Self::Child,
            "descendant" => Self::Descendant,
            "parent" => Self::Parent,
            "ancestor" => Self::Ancestor,
            "following-sibling" => Self::FollowingSibling,
            "preceding-sibling" => Self::PrecedingSibling,
            "following" => Self::Following,
            "preceding" => Self::Preceding,
            "attribute" => Self::Attribute,
            "namespace" => Self::Namespace,
            "self" => Self::SelfAxis,
            "descendant-or-self" => Self::DescendantOrSelf,
            "ancestor-or-self" => Self::AncestorOrSelf,
            _ => return None,
        };
        Some(axis)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ancestor => "ancestor",
            Self::AncestorOrSelf => "ancestor-or-self",
            Self::Attribute => "attribute",
            Self::Child => "child",
            Self::Descendant => "descendant",
            Self::DescendantOrSelf => "descendant-or-self",
            Self::Following => "following",
            Self::FollowingSibling => "following-sibling",
            Self::Namespace => "namespace",
            Self::Parent => "parent",
            Self::Preceding => "preceding",
            Self::PrecedingSibling => "preceding-sibling",
            Self::SelfAxis => "self",
        }
    }
}

/// Token kinds produced by the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Comma,
    Slash,
    At,
    Dot,
    LParens,
    RParens,
    LBracket,
    RBracket,
    Colon,
    Semicolon,
    Star,
    Plus,
    Minus,
    Eq,
    Lt,
    Gt,
    Bang,
    Dollar,
    Union,
    Eof,
    DotDot,
    SlashSlash,
    Ne,
    Le,
    Ge,
    ColonColon,
    Name,
    String,
    Number,
    Function,
    Axis(AxisKind),
    Unknown,
}

/// Characters that terminate a name
const fn is_name_terminator(c: char) -> bool {
    matches!(
        c,
        '\0' | ':'
            | '('
            | ')'
            | '|'
            | '['
            | ']'
            | ' '
            | '\n'
            | '\r'
            | '\t'
            | '>'
            | '<'
            | '/'
            | '='
            | '!'
            | '+'
            | '*'
            | ';'
            | ','
    )
}

fn is_name_start_char(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_name_char(c: char) -> bool {
    c == '_' || c == '-' || c == '.' || c.is_alphanumeric()
}

/// Pull scanner over one expression string
pub struct Scanner {
    input: Vec<char>,
    /// Index of `ch` in `input` (equals `input.len()` at end of input)
    position: usize,
    ch: char,
    token_start: usize,
    token: Token,
    name: String,
    prefix: String,
    number: f64,
    text: String,
}

impl Scanner {
    /// Create a scanner positioned before the first token
    pub fn new(query: &str) -> Self {
        let input: Vec<char> = query.chars().collect();
        let ch = input.first().copied().unwrap_or('\0');
        Self {
            input,
            position: 0,
            ch,
            token_start: 0,
            token: Token::Unknown,
            name: String::new(),
            prefix: String::new(),
            number: 0.0,
            text: String::new(),
        }
    }

    /// Current token
    #[must_use]
    pub const fn token(&self) -> Token {
        self.token
    }

    /// Local name of the last `Name` or `Function` token
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace prefix of the last qualified name (empty if none)
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Value of the last `Number` token
    #[must_use]
    pub const fn number(&self) -> f64 {
        self.number
    }

    /// Raw text of the last `String` token; doubled quotes are kept doubled
    #[must_use]
    pub fn string_value(&self) -> &str {
        &self.text
    }

    /// Character following the current token
    #[must_use]
    pub const fn lookahead(&self) -> char {
        self.ch
    }

    /// Query text from the start of the current token, used for diagnostics
    #[must_use]
    pub fn remaining(&self) -> String {
        self.input.get(self.token_start..).map(|s| s.iter().collect()).unwrap_or_default()
    }

    fn advance(&mut self) {
        if self.position < self.input.len() {
            self.position += 1;
        }
        self.ch = self.input.get(self.position).copied().unwrap_or('\0');
    }

    fn peek_char(&self) -> char {
        self.input.get(self.position + 1).copied().unwrap_or('\0')
    }

    fn at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn skip_whitespace(&mut self) {
        while !self.at_end() && self.ch.is_whitespace() {
            self.advance();
        }
    }

    /// Advance over one token
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();
        self.token_start = self.position;
        self.prefix.clear();

        if self.at_end() {
            self.token = Token::Eof;
            return Ok(self.token);
        }

        let single = match self.ch {
            ',' => Some(Token::Comma),
            '@' => Some(Token::At),
            '(' => Some(Token::LParens),
            ')' => Some(Token::RParens),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            ';' => Some(Token::Semicolon),
            '*' => Some(Token::Star),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '=' => Some(Token::Eq),
            '$' => Some(Token::Dollar),
            '|' => Some(Token::Union),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            self.token = token;
            return Ok(token);
        }

        self.token = match self.ch {
            ':' => self.two_char(':', Token::Colon, Token::ColonColon),
            '<' => self.two_char('=', Token::Lt, Token::Le),
            '>' => self.two_char('=', Token::Gt, Token::Ge),
            '/' => self.two_char('/', Token::Slash, Token::SlashSlash),
            '!' => self.two_char('=', Token::Bang, Token::Ne),
            '.' => {
                let token = self.scan_number();
                if token == Token::Unknown {
                    // scan_number consumed the first dot
                    if self.ch == '.' {
                        self.advance();
                        Token::DotDot
                    } else {
                        Token::Dot
                    }
                } else {
                    token
                }
            }
            '\'' | '"' => self.scan_string()?,
            c if c.is_ascii_digit() => self.scan_number(),
            _ => self.scan_name()?,
        };
        Ok(self.token)
    }

    fn two_char(&mut self, second: char, one: Token, two: Token) -> Token {
        self.advance();
        if self.ch == second {
            self.advance();
            two
        } else {
            one
        }
    }

    fn scan_string(&mut self) -> Result<Token> {
        let end_char = self.ch;
        let mut buffer = String::new();
        self.advance();
        loop {
            if self.at_end() {
                return Err(EnumError::syntax(XPathErrorCode::UnclosedString, self.remaining()));
            }
            if self.ch == end_char {
                if self.peek_char() != end_char {
                    break;
                }
                buffer.push(self.ch);
                self.advance();
            }
            buffer.push(self.ch);
            self.advance();
        }
        self.advance();
        self.text = buffer;
        Ok(Token::String)
    }

    fn scan_number(&mut self) -> Token {
        let mut digits = String::new();
        let mut have_decimal = self.ch == '.';
        loop {
            digits.push(self.ch);
            self.advance();
            if self.ch.is_ascii_digit() {
                continue;
            }
            if self.ch == '.' {
                if have_decimal {
                    return Token::Unknown;
                }
                have_decimal = true;
                continue;
            }
            if digits == "." {
                return Token::Unknown;
            }
            break;
        }
        match digits.parse::<f64>() {
            Ok(value) => {
                self.number = value;
                Token::Number
            }
            Err(_) => Token::Unknown,
        }
    }

    /// Scan a (possibly qualified) name; returns `Unknown` if no name starts here
    fn scan_name(&mut self) -> Result<Token> {
        let Some(local) = self.scan_ncname() else {
            return Ok(Token::Unknown);
        };

        if self.ch == ':' {
            if self.peek_char() == ':' {
                self.advance();
                self.advance();
                self.name.clear();
                return Ok(AxisKind::from_keyword(&local).map_or(Token::Unknown, Token::Axis));
            }
            // qualified name: prefix:local or prefix:*
            self.advance();
            if let Some(qualified) = self.scan_ncname() {
                self.prefix = local;
                self.name = qualified;
            } else if self.ch == '*' {
                self.advance();
                self.prefix = local;
                self.name.clear();
                return Ok(Token::Name);
            } else {
                return Err(EnumError::syntax(XPathErrorCode::InvalidName, self.remaining()));
            }
        } else {
            self.name = local;
        }

        if self.ch == '(' {
            Ok(Token::Function)
        } else {
            Ok(Token::Name)
        }
    }

    fn scan_ncname(&mut self) -> Option<String> {
        if !is_name_start_char(self.ch) {
            return None;
        }
        let mut name = String::new();
        while !is_name_terminator(self.ch) && is_name_char(self.ch) {
            name.push(self.ch);
            self.advance();
        }
        Some(name)
    }
}
