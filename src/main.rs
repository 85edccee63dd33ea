use anyhow::{bail, Error};
use std::ffi::OsString;
use std::io::Write;

use evaluator::{EvaluateError, Evaluator};
use source::TokenStream;

mod evaluator;
mod source;
mod tokenizer;

fn main() {
    env_logger::init();

    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` if any expression was invalid.
fn run() -> Result<bool, Error> {
    let args = std::env::args_os().skip(1);
    let stdout = std::io::stdout();
    let lock = stdout.lock();
    let mut w = std::io::BufWriter::new(lock);

    if args.len() > 0 {
        let expr = join_args(args)?;
        let result = Evaluator::new(TokenStream::new(expr.as_bytes())).evaluate()?;
        writeln!(&mut w, "{}", result)?;
        w.flush()?;
        return Ok(true);
    }

    let stdin = std::io::stdin();
    let mut tokens = TokenStream::new(stdin.lock());
    let is_interactive = atty::is(atty::Stream::Stdin);
    let mut all_valid = true;

    loop {
        if is_interactive {
            write!(&mut w, ">>> ")?;
            w.flush()?;
        }
        if !tokens.has_more()? {
            break;
        }

        match Evaluator::new(&mut tokens).evaluate() {
            Ok(result) => writeln!(&mut w, "{}", result)?,
            Err(EvaluateError::Expression(e)) => {
                w.flush()?;
                eprintln!("Invalid expression: {}", e);
                tokens.skip_line();
                all_valid = false;
            }
            Err(e @ EvaluateError::Source(_)) => return Err(e.into()),
        }
    }
    if is_interactive {
        writeln!(&mut w)?;
    }
    w.flush()?;

    Ok(all_valid)
}

/// Joins the arguments into a single line; an expression never spans lines.
fn join_args(args: impl Iterator<Item = OsString>) -> Result<String, Error> {
    let mut expr = String::new();
    for arg in args {
        let Some(utf8_arg) = arg.to_str() else {
            bail!("Arguments contain invalid UTF-8 string");
        };
        expr.extend(utf8_arg.chars().map(|c| match c {
            '\n' | '\r' => ' ',
            c => c,
        }));
        expr.push(' ');
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_args(args: &[&str]) -> f64 {
        let expr = join_args(args.iter().map(OsString::from)).unwrap();
        Evaluator::new(TokenStream::new(expr.as_bytes()))
            .evaluate()
            .unwrap()
    }

    #[test]
    fn test_args_form_one_expression() {
        assert_eq!(eval_args(&["1", "+", "2"]), 3.0);
        assert_eq!(eval_args(&["1", "\n+ 2"]), 3.0);
        assert_eq!(eval_args(&["max(1,\r\n", "2)"]), 2.0);
    }

    #[test]
    fn test_newline_is_not_an_expression_end() {
        let expr = join_args(["1", "\n2"].iter().map(OsString::from)).unwrap();
        assert!(!expr.contains('\n'));
        let result = Evaluator::new(TokenStream::new(expr.as_bytes())).evaluate();
        assert!(matches!(
            result,
            Err(EvaluateError::Expression(
                evaluator::ExpressionError::TooManyOperands
            ))
        ));
    }
}
