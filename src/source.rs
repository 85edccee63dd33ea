use std::io::BufRead;

use thiserror::Error;

use crate::tokenizer::{Token, Tokenizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineState {
    NeedLine,
    Reading,
    Finished,
}

/// Lazily turns a line-oriented reader into tokens, one line per expression.
///
/// Every line ends with exactly one [`Token::Eol`], whether or not the reader
/// had a trailing newline. The iterator returns `None` once the reader is
/// exhausted.
pub struct TokenStream<R> {
    reader: R,
    tokenizer: Tokenizer,
    line: String,
    pos: usize,
    state: LineState,
}

impl<R: BufRead> TokenStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            tokenizer: Tokenizer::default(),
            line: String::new(),
            pos: 0,
            state: LineState::NeedLine,
        }
    }

    /// Returns whether another expression is available, reading ahead one line
    /// if necessary.
    pub fn has_more(&mut self) -> Result<bool, SourceError> {
        match self.state {
            LineState::NeedLine => self.read_line(),
            LineState::Reading | LineState::Finished => Ok(true),
        }
    }

    /// Drops whatever is left of the current line. Does nothing if the line's
    /// end was already handed out.
    pub fn skip_line(&mut self) {
        if self.state != LineState::NeedLine {
            self.state = LineState::NeedLine;
            self.tokenizer = Tokenizer::default();
        }
    }

    fn read_line(&mut self) -> Result<bool, SourceError> {
        self.line.clear();
        self.pos = 0;
        if self.reader.read_line(&mut self.line)? == 0 {
            return Ok(false);
        }

        let len = self.line.trim_end_matches(['\n', '\r']).len();
        self.line.truncate(len);
        self.state = LineState::Reading;
        Ok(true)
    }

    fn next_token(&mut self) -> Result<Option<Token>, SourceError> {
        loop {
            match self.state {
                LineState::NeedLine => {
                    if !self.read_line()? {
                        return Ok(None);
                    }
                }
                LineState::Reading => match self.line[self.pos..].chars().next() {
                    Some(c) => {
                        self.pos += c.len_utf8();
                        if let Some(token) = self.tokenizer.update(c) {
                            return Ok(Some(token));
                        }
                    }
                    None => {
                        self.state = LineState::Finished;
                        if let Some(token) = self.tokenizer.finalize() {
                            return Ok(Some(token));
                        }
                    }
                },
                LineState::Finished => {
                    self.state = LineState::NeedLine;
                    return Ok(Some(Token::Eol));
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for TokenStream<R> {
    type Item = Result<Token, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

/// Faults of the token source. These abort evaluation and are never reported
/// as a problem with the expression itself.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),
    #[error("Input ended before the end of the expression")]
    UnexpectedEof,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Operator;

    fn collect(input: &str) -> Vec<Token> {
        TokenStream::new(input.as_bytes())
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_lines_end_with_eol() {
        assert_eq!(
            collect("1+2\r\n3\n"),
            vec![
                Token::Num(1.0),
                Token::Op(Operator::Add),
                Token::Num(2.0),
                Token::Eol,
                Token::Num(3.0),
                Token::Eol,
            ]
        );
    }

    #[test]
    fn test_last_line_without_newline() {
        assert_eq!(collect("pi"), vec![Token::Word("pi".into()), Token::Eol]);
    }

    #[test]
    fn test_empty_line() {
        assert_eq!(collect("\n"), vec![Token::Eol]);
        assert_eq!(collect(""), vec![]);
    }

    #[test]
    fn test_skip_line() {
        let mut stream = TokenStream::new("1 + 2\n3\n".as_bytes());
        assert_eq!(stream.next().unwrap().unwrap(), Token::Num(1.0));
        stream.skip_line();
        assert_eq!(stream.next().unwrap().unwrap(), Token::Num(3.0));
        assert_eq!(stream.next().unwrap().unwrap(), Token::Eol);
        // The line is already over, nothing to skip
        stream.skip_line();
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_has_more() {
        let mut stream = TokenStream::new("7\n".as_bytes());
        assert!(stream.has_more().unwrap());
        assert!(stream.has_more().unwrap());
        assert_eq!(stream.next().unwrap().unwrap(), Token::Num(7.0));
        assert_eq!(stream.next().unwrap().unwrap(), Token::Eol);
        assert!(!stream.has_more().unwrap());
    }

    #[test]
    fn test_io_error() {
        struct Broken;

        impl std::io::Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk on fire"))
            }
        }

        let mut stream = TokenStream::new(std::io::BufReader::new(Broken));
        assert!(matches!(stream.next(), Some(Err(SourceError::Io(_)))));
    }
}
