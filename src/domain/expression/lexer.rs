//! Tokenizer for the expression language

use super::error::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    And,
    Or,
    Not,
    If,
    Else,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    StarStar,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    LParen,
    RParen,
    Comma,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Str(s) => format!("'{}'", s),
            Self::Ident(name) => name.clone(),
            Self::True => "True".into(),
            Self::False => "False".into(),
            Self::And => "and".into(),
            Self::Or => "or".into(),
            Self::Not => "not".into(),
            Self::If => "if".into(),
            Self::Else => "else".into(),
            Self::Plus => "+".into(),
            Self::Minus => "-".into(),
            Self::Star => "*".into(),
            Self::Slash => "/".into(),
            Self::Percent => "%".into(),
            Self::StarStar => "**".into(),
            Self::Lt => "<".into(),
            Self::Le => "<=".into(),
            Self::Gt => ">".into(),
            Self::Ge => ">=".into(),
            Self::EqEq => "==".into(),
            Self::NotEq => "!=".into(),
            Self::LParen => "(".into(),
            Self::RParen => ")".into(),
            Self::Comma => ",".into(),
        }
    }
}

/// A token plus its character offset in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Split an expression into tokens
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()))
        {
            let (token, next) = lex_number(source, &chars, i)?;
            tokens.push(Spanned {
                token,
                position: start,
            });
            i = next;
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let token = match word.as_str() {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "if" => Token::If,
                "else" => Token::Else,
                "True" | "true" => Token::True,
                "False" | "false" => Token::False,
                _ => Token::Ident(word),
            };
            tokens.push(Spanned {
                token,
                position: start,
            });
            continue;
        }

        if c == '\'' || c == '"' {
            let (value, next) = lex_string(source, &chars, i)?;
            tokens.push(Spanned {
                token: Token::Str(value),
                position: start,
            });
            i = next;
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (token, width) = match (c, next) {
            ('*', Some('*')) => (Token::StarStar, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('=', Some('=')) => (Token::EqEq, 2),
            ('!', Some('=')) => (Token::NotEq, 2),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            (',', _) => (Token::Comma, 1),
            _ => {
                return Err(ExpressionError::syntax(
                    source,
                    start,
                    format!("unexpected character '{}'", c),
                ));
            }
        };

        tokens.push(Spanned {
            token,
            position: start,
        });
        i += width;
    }

    Ok(tokens)
}

fn lex_number(source: &str, chars: &[char], start: usize) -> Result<(Token, usize), ExpressionError> {
    let mut i = start;
    let mut is_float = false;

    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }

    // A second '.' would make this a range bound ("1..5"), not a fraction
    if i < chars.len() && chars[i] == '.' && chars.get(i + 1) != Some(&'.') {
        is_float = true;
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }

    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            is_float = true;
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }

    let text: String = chars[start..i].iter().collect();

    let token = if is_float {
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| ExpressionError::syntax(source, start, format!("invalid number '{}'", text)))?
    } else {
        match text.parse::<i64>() {
            Ok(v) => Token::Int(v),
            Err(_) => text.parse::<f64>().map(Token::Float).map_err(|_| {
                ExpressionError::syntax(source, start, format!("invalid number '{}'", text))
            })?,
        }
    };

    Ok((token, i))
}

fn lex_string(source: &str, chars: &[char], start: usize) -> Result<(String, usize), ExpressionError> {
    let quote = chars[start];
    let mut value = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                value.push(chars[i + 1]);
                i += 2;
            }
            c if c == quote => return Ok((value, i + 1)),
            c => {
                value.push(c);
                i += 1;
            }
        }
    }

    Err(ExpressionError::syntax(source, start, "unterminated string literal"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_tokenize_arithmetic() {
        assert_eq!(
            kinds("2 ** 3 * (x - 1.5)"),
            vec![
                Token::Int(2),
                Token::StarStar,
                Token::Int(3),
                Token::Star,
                Token::LParen,
                Token::Ident("x".into()),
                Token::Minus,
                Token::Float(1.5),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_tokenize_keywords_and_strings() {
        assert_eq!(
            kinds("mode == 'EDIT' and not done"),
            vec![
                Token::Ident("mode".into()),
                Token::EqEq,
                Token::Str("EDIT".into()),
                Token::And,
                Token::Not,
                Token::Ident("done".into()),
            ]
        );
    }

    #[test]
    fn test_tokenize_scientific_notation() {
        assert_eq!(kinds("1e-3"), vec![Token::Float(0.001)]);
        assert_eq!(kinds(".5"), vec![Token::Float(0.5)]);
    }

    #[test]
    fn test_positions_are_recorded() {
        let tokens = tokenize("a  <= b").unwrap();
        assert_eq!(tokens[1].position, 3);
        assert_eq!(tokens[2].position, 6);
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("a & b").unwrap_err();
        assert!(matches!(err, ExpressionError::Syntax { position: 2, .. }));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(tokenize("'open").is_err());
    }
}
