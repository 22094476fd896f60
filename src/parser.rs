//! Line tokenizer and pipeline parser.
//!
//! A line is split into POSIX shell words (quotes group, backslash
//! escapes, whitespace separates) and then grouped into stages at each
//! unquoted `|` token. The parser knows nothing about commands; it only
//! produces `(command, args)` pairs for the executor to dispatch.

use crate::error::{Result, ShellError};

/// One pipeline stage: a command name and its raw argument tokens.
pub type Stage = (String, Vec<String>);

/// Parse a command line into pipeline stages.
///
/// An empty (or all-whitespace) line yields an empty stage list, which
/// callers treat as a no-op. A `|` with no command before or after it
/// is an error.
///
/// # Example
///
/// ```
/// use objsh::parser::parse;
///
/// let stages = parse("ls /tmp | count").unwrap();
/// assert_eq!(stages.len(), 2);
/// assert_eq!(stages[0], ("ls".to_string(), vec!["/tmp".to_string()]));
/// assert_eq!(stages[1], ("count".to_string(), vec![]));
/// ```
pub fn parse(line: &str) -> Result<Vec<Stage>> {
    let tokens = shell_words::split(line)?;
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let mut stages = Vec::new();
    let mut command: Option<String> = None;
    let mut args: Vec<String> = Vec::new();

    for token in tokens {
        if token == "|" {
            let cmd = command.take().ok_or(ShellError::EmptyStage)?;
            stages.push((cmd, std::mem::take(&mut args)));
        } else if command.is_none() {
            command = Some(token);
        } else {
            args.push(token);
        }
    }

    let cmd = command.ok_or(ShellError::EmptyStage)?;
    stages.push((cmd, args));
    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(cmd: &str, args: &[&str]) -> Stage {
        (
            cmd.to_string(),
            args.iter().map(|a| a.to_string()).collect(),
        )
    }

    #[test]
    fn test_single_command() {
        assert_eq!(parse("echo hello").unwrap(), vec![stage("echo", &["hello"])]);
    }

    #[test]
    fn test_pipeline() {
        assert_eq!(
            parse("ls | count").unwrap(),
            vec![stage("ls", &[]), stage("count", &[])]
        );
    }

    #[test]
    fn test_key_value_args() {
        assert_eq!(
            parse("echo name=alice age=30").unwrap(),
            vec![stage("echo", &["name=alice", "age=30"])]
        );
    }

    #[test]
    fn test_multi_stage_pipeline() {
        assert_eq!(
            parse("ls | echo | count").unwrap(),
            vec![stage("ls", &[]), stage("echo", &[]), stage("count", &[])]
        );
    }

    #[test]
    fn test_quoted_arg_keeps_spaces_and_pipe() {
        assert_eq!(
            parse("foreach \"echo x={a} | grep x=hello\"").unwrap(),
            vec![stage("foreach", &["echo x={a} | grep x=hello"])]
        );
    }

    #[test]
    fn test_empty_line() {
        assert_eq!(parse("").unwrap(), vec![]);
        assert_eq!(parse("   ").unwrap(), vec![]);
    }

    #[test]
    fn test_empty_stage_leading_pipe() {
        assert!(matches!(parse("| ls"), Err(ShellError::EmptyStage)));
    }

    #[test]
    fn test_empty_stage_trailing_pipe() {
        assert!(matches!(parse("ls |"), Err(ShellError::EmptyStage)));
    }

    #[test]
    fn test_empty_stage_double_pipe() {
        assert!(matches!(parse("ls | | count"), Err(ShellError::EmptyStage)));
    }

    #[test]
    fn test_unbalanced_quote_is_tokenize_error() {
        assert!(matches!(
            parse("echo 'oops"),
            Err(ShellError::Tokenize(_))
        ));
    }
}
