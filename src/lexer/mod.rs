use logos::Logos;

use crate::vm::fixed;

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip(r"//[^\n]*", allow_greedy = true))]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum Token {
    // Keywords
    #[token("fn")]
    Fn,
    #[token("var")]
    Var,
    #[token("struct")]
    Struct,
    #[token("syscalldef")]
    SyscallDef,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("return")]
    Return,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token(":")]
    Colon,

    // Assignment
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("<=")]
    LessEq,
    #[token(">=")]
    GreaterEq,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,

    // Literals are converted to 16.16 fixed point while lexing.
    #[regex(r"0[xX][0-9a-fA-F]+", |lex| parse_hex(lex.slice()))]
    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| parse_decimal(lex.slice()))]
    Number(i32),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

/// Largest integer part a literal may have; values above `i16::MAX` wrap
/// into the sign bit, which is how bit patterns like `0xFFFF` are written.
const MAX_LITERAL: u32 = 0xffff;

fn parse_hex(s: &str) -> Option<i32> {
    let v = u32::from_str_radix(&s[2..], 16).ok()?;
    (v <= MAX_LITERAL).then(|| fixed::from_int(v as i32))
}

fn parse_decimal(s: &str) -> Option<i32> {
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    let int: u32 = int_part.parse().ok()?;
    if int > MAX_LITERAL {
        return None;
    }
    // truncate the fraction toward zero, keeping enough digits to fill 16 bits
    let mut frac: u64 = 0;
    let mut scale: u64 = 1;
    for c in frac_part.chars().take(9) {
        frac = frac * 10 + c.to_digit(10)? as u64;
        scale *= 10;
    }
    let frac_bits = (frac << 16) / scale;
    Some(fixed::from_int(int as i32) | frac_bits as i32)
}

/// Lex source code into a stream of tokens with positions.
/// Returns errors as specific locations rather than failing silently.
pub fn lex(source: &str) -> Result<Vec<(Token, std::ops::Range<usize>)>, LexError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => {
                let span = lexer.span();
                let snippet = source[span.clone()].to_string();
                return Err(LexError {
                    code: if snippet.starts_with(|c: char| c.is_ascii_digit()) { "GL-L002" } else { "GL-L001" },
                    position: span.start,
                    suggestion: suggest_fix(&snippet),
                    snippet,
                });
            }
        }
    }

    Ok(tokens)
}

fn suggest_fix(bad_token: &str) -> String {
    if bad_token.starts_with(|c: char| c.is_ascii_digit()) {
        "Numeric literals are 16.16 fixed point: the integer part must be at most 65535.".to_string()
    } else if bad_token.starts_with('"') || bad_token.starts_with('\'') {
        "There are no string or character literals.".to_string()
    } else {
        format!("Unexpected character(s): '{}'.", bad_token)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Lex error at position {position}: '{snippet}'. {suggestion}")]
pub struct LexError {
    pub code: &'static str,
    pub position: usize,
    pub snippet: String,
    pub suggestion: String,
}
