use compact_str::{CompactString, ToCompactString};

#[derive(Debug, Default)]
enum TokenizerState {
    #[default]
    Clean,
    InNumber(CompactString),
    InWord(CompactString),
    // Single-character tokens are held back until the next character, so a
    // call to `update` never has more than one token to hand out.
    InSymbol(Token),
}

#[derive(Debug, Default)]
pub struct Tokenizer {
    state: TokenizerState,
}

impl Tokenizer {
    pub fn update(&mut self, c: char) -> Option<Token> {
        use TokenizerState::*;

        match &self.state {
            Clean => {
                self.state = Self::start(c);
                return None;
            }
            InNumber(text) if c.is_ascii_digit() || (c == '.' && !text.contains('.')) => {}
            InWord(_) if c.is_alphanumeric() || c == '_' => {}
            _ => {
                let token = self.finalize();
                self.state = Self::start(c);
                return token;
            }
        }

        if let InNumber(text) | InWord(text) = &mut self.state {
            text.push(c);
        }
        None
    }

    pub fn finalize(&mut self) -> Option<Token> {
        use TokenizerState::*;

        match std::mem::take(&mut self.state) {
            Clean => None,
            InNumber(text) => Some(match text.parse::<f64>() {
                Ok(value) => Token::Num(value),
                // Only a lone "." gets here
                Err(_) => Token::Unrecognized('.'),
            }),
            InWord(word) => Some(Token::Word(word)),
            InSymbol(token) => Some(token),
        }
    }

    fn start(c: char) -> TokenizerState {
        match c {
            '0'..='9' | '.' => TokenizerState::InNumber(c.to_compact_string()),
            _ if c.is_alphabetic() => TokenizerState::InWord(c.to_compact_string()),
            // Ignore whitespace
            _ if c.is_whitespace() => TokenizerState::Clean,
            _ => TokenizerState::InSymbol(Token::symbol(c)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Num(f64),
    Op(Operator),
    Open(Bracket),
    Close(Bracket),
    Word(CompactString),
    Comma,
    Eol,
    Unrecognized(char),
}

impl Token {
    fn symbol(c: char) -> Token {
        match c {
            '+' => Token::Op(Operator::Add),
            '-' => Token::Op(Operator::Sub),
            '*' => Token::Op(Operator::Mul),
            '/' => Token::Op(Operator::Div),
            '^' => Token::Op(Operator::Pow),
            '(' => Token::Open(Bracket::Round),
            '{' => Token::Open(Bracket::Curly),
            ')' => Token::Close(Bracket::Round),
            '}' => Token::Close(Bracket::Curly),
            ',' => Token::Comma,
            _ => Token::Unrecognized(c),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Both bracket kinds mean the same thing, but each must be closed by its own
/// kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bracket {
    Round,
    Curly,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(expr: &str) -> Vec<Token> {
        let mut tokens = vec![];
        let mut tokenizer = Tokenizer::default();
        for c in expr.chars() {
            if let Some(token) = tokenizer.update(c) {
                tokens.push(token)
            }
        }
        if let Some(token) = tokenizer.finalize() {
            tokens.push(token)
        }
        tokens
    }

    #[test]
    fn test_sub_negative() {
        assert_eq!(
            tokenize("-12--3.4"),
            vec![
                Token::Op(Operator::Sub),
                Token::Num(12.0),
                Token::Op(Operator::Sub),
                Token::Op(Operator::Sub),
                Token::Num(3.4),
            ]
        );
    }

    #[test]
    fn test_function_call() {
        assert_eq!(
            tokenize("MAX{1,.5}"),
            vec![
                Token::Word("MAX".into()),
                Token::Open(Bracket::Curly),
                Token::Num(1.0),
                Token::Comma,
                Token::Num(0.5),
                Token::Close(Bracket::Curly),
            ]
        );
    }

    #[test]
    fn test_adjacent_symbols() {
        assert_eq!(
            tokenize("(2)^x_1"),
            vec![
                Token::Open(Bracket::Round),
                Token::Num(2.0),
                Token::Close(Bracket::Round),
                Token::Op(Operator::Pow),
                Token::Word("x_1".into()),
            ]
        );
    }

    #[test]
    fn test_second_dot_starts_new_number() {
        assert_eq!(tokenize("1.2.3"), vec![Token::Num(1.2), Token::Num(0.3)]);
    }

    #[test]
    fn test_unrecognized() {
        assert_eq!(
            tokenize("2 % . 3"),
            vec![
                Token::Num(2.0),
                Token::Unrecognized('%'),
                Token::Unrecognized('.'),
                Token::Num(3.0),
            ]
        );
    }

    #[test]
    fn test_whitespace_only() {
        assert_eq!(tokenize(" \t "), vec![]);
    }
}
