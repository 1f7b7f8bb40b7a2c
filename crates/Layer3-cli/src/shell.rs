//! Operator shell - command parsing

use distrual_foundation::{ChildId, Error, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Default argument for `example` when none is given
pub const DEFAULT_EXAMPLE_ARG: i64 = 1;

pub const HELP: &str = "\
Commands:
  create <program> [args...]   start a process
  spawn [port]                 start the configured node program
  kill <id>                    terminate a child
  list                         show live children
  example <from> <to> [x]      have <from> call Example on <to>
  send <id> <text...>          write a line to a child's stdin
  close <id>                   close a child's stdin
  snapshot <id>                ask a node for its state
  help                         this text
  exit                         stop all children and quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Create { program: String, args: Vec<String> },
    Spawn { port: Option<u16> },
    Kill(ChildId),
    List,
    Example { from: ChildId, to: ChildId, x: i64 },
    Send { id: ChildId, text: String },
    Close(ChildId),
    Snapshot(ChildId),
    Help,
    Exit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<ShellCommand>> {
    let words = shlex::split(line)
        .ok_or_else(|| Error::InvalidInput("Unbalanced quotes".to_string()))?;

    let Some((name, args)) = words.split_first() else {
        return Ok(None);
    };

    let command = match name.as_str() {
        "create" => {
            let (program, rest) = args.split_first().ok_or_else(|| {
                Error::InvalidInput("Must provide at least a binary to run".to_string())
            })?;
            ShellCommand::Create {
                program: program.clone(),
                args: rest.to_vec(),
            }
        }
        "spawn" => match args {
            [] => ShellCommand::Spawn { port: None },
            [port] => ShellCommand::Spawn {
                port: Some(parse_number(port, "port")?),
            },
            _ => return Err(wrong_arg_count()),
        },
        "kill" => ShellCommand::Kill(single_id(args)?),
        "list" => no_args(args, ShellCommand::List)?,
        "example" => match args {
            [from, to] => ShellCommand::Example {
                from: parse_id(from)?,
                to: parse_id(to)?,
                x: DEFAULT_EXAMPLE_ARG,
            },
            [from, to, x] => ShellCommand::Example {
                from: parse_id(from)?,
                to: parse_id(to)?,
                x: parse_number(x, "x")?,
            },
            _ => return Err(wrong_arg_count()),
        },
        "send" => match args {
            [id, text @ ..] if !text.is_empty() => ShellCommand::Send {
                id: parse_id(id)?,
                text: text.join(" "),
            },
            _ => return Err(wrong_arg_count()),
        },
        "close" => ShellCommand::Close(single_id(args)?),
        "snapshot" => ShellCommand::Snapshot(single_id(args)?),
        "help" | "?" => ShellCommand::Help,
        "exit" | "quit" => no_args(args, ShellCommand::Exit)?,
        other => {
            return Err(Error::InvalidInput(format!(
                "Unknown command '{}', try 'help'",
                other
            )))
        }
    };

    Ok(Some(command))
}

fn wrong_arg_count() -> Error {
    Error::InvalidInput("Wrong number of arguments".to_string())
}

fn no_args(args: &[String], command: ShellCommand) -> Result<ShellCommand> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(wrong_arg_count())
    }
}

fn single_id(args: &[String]) -> Result<ChildId> {
    match args {
        [id] => parse_id(id),
        _ => Err(wrong_arg_count()),
    }
}

fn parse_id(text: &str) -> Result<ChildId> {
    text.parse()
        .map_err(|_| Error::InvalidInput(format!("'{}' is not a child ID", text)))
}

fn parse_number<T: std::str::FromStr>(text: &str, what: &str) -> Result<T> {
    text.parse()
        .map_err(|_| Error::InvalidInput(format!("'{}' is not a valid {}", text, what)))
}

/// Next input line without its line ending, `None` at end of input
///
/// Bytes that are not UTF-8 are replaced rather than failing the read, so
/// one bad line is rejected by [`parse`] like any other unknown command.
pub async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}
