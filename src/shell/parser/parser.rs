use thiserror::Error;

use super::ast::{Command, CommandList, ControlOp};
use super::lexer::{Lexer, RedirectOp, Token};

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("syntax error: redirection `{0}` before any command")]
    RedirectWithoutCommand(RedirectOpDisplay),
    #[error("syntax error: expected file name after `{0}`")]
    MissingRedirectTarget(RedirectOpDisplay),
    #[error("syntax error near unexpected token `{0}`")]
    UnexpectedToken(String),
    #[error("syntax error: unexpected end of input after `{0}`")]
    TrailingOperator(String),
}

// Wrapper so the error variants can carry the operator without pulling
// `Token` into the public error surface.
#[derive(Debug, PartialEq, Eq)]
pub struct RedirectOpDisplay(RedirectOp);

impl std::fmt::Display for RedirectOpDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current_token: Token,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token();
        Parser {
            lexer,
            current_token,
        }
    }

    fn next_token(&mut self) {
        self.current_token = self.lexer.next_token();
    }

    /// Builds the command list for one input line, left to right. A word
    /// opens a command if none is open; a control operator stamps the open
    /// command's tag and closes it. Returns `None` for a blank line.
    pub fn parse_line(&mut self) -> Result<Option<CommandList>, ParseError> {
        let mut list = CommandList::default();
        // Index of the command currently collecting words, if any.
        let mut open: Option<usize> = None;

        loop {
            match &self.current_token {
                Token::Eof => break,
                Token::Word(word) => {
                    let idx = match open {
                        Some(idx) => idx,
                        None => {
                            list.commands.push(Command::new());
                            let idx = list.commands.len() - 1;
                            open = Some(idx);
                            idx
                        }
                    };
                    list.commands[idx].args.push(word.clone());
                    self.next_token();
                }
                Token::Redirect(op) => {
                    let op = *op;
                    let idx = open.ok_or(ParseError::RedirectWithoutCommand(
                        RedirectOpDisplay(op),
                    ))?;
                    self.next_token();
                    let target = match &self.current_token {
                        Token::Word(target) => target.clone(),
                        _ => {
                            return Err(ParseError::MissingRedirectTarget(
                                RedirectOpDisplay(op),
                            ))
                        }
                    };
                    let redirections = &mut list.commands[idx].redirections;
                    match op {
                        RedirectOp::Stdin => redirections.stdin = Some(target),
                        RedirectOp::Stdout => redirections.stdout = Some(target),
                        RedirectOp::Stderr => redirections.stderr = Some(target),
                    }
                    self.next_token();
                }
                token => {
                    // Control operator: close the open command with its tag.
                    let idx = open
                        .take()
                        .ok_or_else(|| ParseError::UnexpectedToken(token.to_string()))?;
                    list.commands[idx].op = match token {
                        Token::Semi => ControlOp::Sequence,
                        Token::Background => ControlOp::Background,
                        Token::And => ControlOp::And,
                        Token::Or => ControlOp::Or,
                        Token::Pipe => ControlOp::Pipe,
                        _ => unreachable!("word/redirect/eof handled above"),
                    };
                    self.next_token();
                }
            }
        }

        if list.is_empty() {
            return Ok(None);
        }

        // A well-formed list never ends on a connecting operator: `a |`,
        // `a &&`, `a ||` all leave a command expected but never opened.
        if open.is_none() {
            let last = &list.commands[list.len() - 1];
            if matches!(last.op, ControlOp::Pipe | ControlOp::And | ControlOp::Or) {
                let op = match last.op {
                    ControlOp::Pipe => "|",
                    ControlOp::And => "&&",
                    _ => "||",
                };
                return Err(ParseError::TrailingOperator(op.to_string()));
            }
        }

        Ok(Some(list))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(clippy::unwrap_used)]
    fn parse(input: &str) -> CommandList {
        Parser::new(input).parse_line().unwrap().unwrap()
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_simple_command() {
        let list = parse("ls -l");
        assert_eq!(list.len(), 1);
        assert_eq!(list.commands[0].args, vec!["ls", "-l"]);
        assert_eq!(list.commands[0].op, ControlOp::Sequence);
        assert!(list.commands[0].redirections.is_empty());
        assert_eq!(list.commands[0].pid, None);
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_blank_line() {
        assert!(Parser::new("").parse_line().unwrap().is_none());
        assert!(Parser::new("   \t ").parse_line().unwrap().is_none());
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_pipeline_tags() {
        let list = parse("ls | sort | head");
        assert_eq!(list.len(), 3);
        assert_eq!(list.commands[0].op, ControlOp::Pipe);
        assert_eq!(list.commands[1].op, ControlOp::Pipe);
        assert_eq!(list.commands[2].op, ControlOp::Sequence);
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_conditional_chain() {
        let list = parse("true && echo yes || echo no");
        assert_eq!(list.len(), 3);
        assert_eq!(list.commands[0].op, ControlOp::And);
        assert_eq!(list.commands[1].op, ControlOp::Or);
        assert_eq!(list.commands[2].op, ControlOp::Sequence);
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_jobs_on_one_line() {
        let list = parse("sleep 1 & echo done ; pwd");
        assert_eq!(list.len(), 3);
        assert_eq!(list.commands[0].op, ControlOp::Background);
        assert_eq!(list.commands[1].op, ControlOp::Sequence);
        assert_eq!(list.commands[2].op, ControlOp::Sequence);
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_redirections() {
        let list = parse("sort < in.txt > out.txt 2> err.txt");
        assert_eq!(list.len(), 1);
        let redirs = &list.commands[0].redirections;
        assert_eq!(redirs.stdin.as_deref(), Some("in.txt"));
        assert_eq!(redirs.stdout.as_deref(), Some("out.txt"));
        assert_eq!(redirs.stderr.as_deref(), Some("err.txt"));
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_last_redirection_wins() {
        let list = parse("echo hi > first.txt > second.txt");
        assert_eq!(
            list.commands[0].redirections.stdout.as_deref(),
            Some("second.txt")
        );
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_redirect_without_command() {
        let err = Parser::new("> out.txt echo hi").parse_line().unwrap_err();
        assert!(matches!(err, ParseError::RedirectWithoutCommand(_)));
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_redirect_without_target() {
        let err = Parser::new("echo hi >").parse_line().unwrap_err();
        assert!(matches!(err, ParseError::MissingRedirectTarget(_)));
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_leading_operator() {
        let err = Parser::new("&& echo hi").parse_line().unwrap_err();
        assert_eq!(err, ParseError::UnexpectedToken("&&".to_string()));
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_trailing_pipe() {
        let err = Parser::new("echo hi |").parse_line().unwrap_err();
        assert_eq!(err, ParseError::TrailingOperator("|".to_string()));
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_trailing_and() {
        let err = Parser::new("echo hi &&").parse_line().unwrap_err();
        assert_eq!(err, ParseError::TrailingOperator("&&".to_string()));
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_trailing_background_is_fine() {
        let list = parse("sleep 1 &");
        assert_eq!(list.len(), 1);
        assert_eq!(list.commands[0].op, ControlOp::Background);
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_redirection_on_pipeline_stage() {
        let list = parse("echo hello | cat > out.txt");
        assert_eq!(list.len(), 2);
        assert_eq!(list.commands[0].op, ControlOp::Pipe);
        assert_eq!(
            list.commands[1].redirections.stdout.as_deref(),
            Some("out.txt")
        );
    }
}
