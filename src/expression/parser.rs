use super::condition::{CompareOp, Condition};
use super::literal::parse_literal;
use crate::error::EvaluationError;
use std::iter::Peekable;
use std::vec::IntoIter;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Compare(CompareOp),
    Word(String),
}

impl Token {
    fn text(&self) -> String {
        match self {
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::And => "and".to_string(),
            Token::Or => "or".to_string(),
            Token::Not => "not".to_string(),
            Token::Compare(op) => op.symbol().to_string(),
            Token::Word(w) => w.clone(),
        }
    }
}

fn is_word_boundary(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '<' | '>' | '=' | '!' | '\'' | '"')
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvaluationError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            _ if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' | '"' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or(EvaluationError::UnterminatedString { position: i })?;
                let end = i + 1 + close;
                // Keep the quotes so `parse_literal` classifies the token as a string.
                tokens.push(Token::Word(chars[i..=end].iter().collect()));
                i = end + 1;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Compare(CompareOp::Eq));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Compare(CompareOp::Ne));
                i += 2;
            }
            '>' if next == Some('=') => {
                tokens.push(Token::Compare(CompareOp::Ge));
                i += 2;
            }
            '<' if next == Some('=') => {
                tokens.push(Token::Compare(CompareOp::Le));
                i += 2;
            }
            '>' => {
                tokens.push(Token::Compare(CompareOp::Gt));
                i += 1;
            }
            '<' => {
                tokens.push(Token::Compare(CompareOp::Lt));
                i += 1;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '=' => {
                return Err(EvaluationError::UnexpectedCharacter {
                    character: c,
                    position: i,
                });
            }
            _ => {
                let start = i;
                while i < chars.len() && !is_word_boundary(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Word(word),
                };
                tokens.push(token);
            }
        }
    }
    Ok(tokens)
}

/// Recursive-descent parser over the token stream.
///
/// ```text
/// or         := and ("or" and)*
/// and        := unary ("and" unary)*
/// unary      := "not" unary | primary
/// primary    := "(" or ")" | comparison
/// comparison := word (op word)?
/// ```
struct Parser {
    tokens: Peekable<IntoIter<Token>>,
}

impl Parser {
    fn parse_or(&mut self) -> Result<Condition, EvaluationError> {
        let mut left = self.parse_and()?;
        while self.tokens.next_if_eq(&Token::Or).is_some() {
            let right = self.parse_and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Condition, EvaluationError> {
        let mut left = self.parse_unary()?;
        while self.tokens.next_if_eq(&Token::And).is_some() {
            let right = self.parse_unary()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Condition, EvaluationError> {
        if self.tokens.next_if_eq(&Token::Not).is_some() {
            return Ok(Condition::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Condition, EvaluationError> {
        match self.tokens.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.tokens.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(EvaluationError::UnexpectedToken {
                        found: other.text(),
                        expected: "')'",
                    }),
                    None => Err(EvaluationError::UnexpectedEnd { expected: "')'" }),
                }
            }
            Some(Token::Word(word)) => {
                let left = parse_literal(&word);
                let op = match self.tokens.peek() {
                    Some(Token::Compare(op)) => *op,
                    _ => return Ok(Condition::Term(left)),
                };
                self.tokens.next();
                match self.tokens.next() {
                    Some(Token::Word(right)) => Ok(Condition::Compare {
                        op,
                        left,
                        right: parse_literal(&right),
                    }),
                    Some(other) => Err(EvaluationError::UnexpectedToken {
                        found: other.text(),
                        expected: "an operand",
                    }),
                    None => Err(EvaluationError::UnexpectedEnd {
                        expected: "an operand",
                    }),
                }
            }
            Some(other) => Err(EvaluationError::UnexpectedToken {
                found: other.text(),
                expected: "an operand or '('",
            }),
            None => Err(EvaluationError::UnexpectedEnd {
                expected: "an operand or '('",
            }),
        }
    }
}

/// Parses a condition string into a `Condition` tree.
pub fn parse_condition(input: &str) -> Result<Condition, EvaluationError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(EvaluationError::Empty);
    }

    let mut parser = Parser {
        tokens: tokens.into_iter().peekable(),
    };
    let condition = parser.parse_or()?;
    match parser.tokens.next() {
        None => Ok(condition),
        Some(extra) => Err(EvaluationError::UnexpectedToken {
            found: extra.text(),
            expected: "end of condition",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_keeps_hyphenated_words_together() {
        let tokens = tokenize("5-3 >= --5").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Word("5-3".to_string()),
                Token::Compare(CompareOp::Ge),
                Token::Word("--5".to_string()),
            ]
        );
    }

    #[test]
    fn tokenizer_splits_operators_without_spaces() {
        let tokens = tokenize("a!=b").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1], Token::Compare(CompareOp::Ne));
    }

    #[test]
    fn tokenizer_keeps_quoted_whitespace() {
        let tokens = tokenize("city == 'New York'").unwrap();
        assert_eq!(tokens[2], Token::Word("'New York'".to_string()));
    }

    #[test]
    fn single_equals_is_rejected() {
        assert!(matches!(
            tokenize("a = b"),
            Err(EvaluationError::UnexpectedCharacter { character: '=', .. })
        ));
    }
}
