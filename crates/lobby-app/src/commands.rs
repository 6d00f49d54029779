// Line-oriented user commands read from stdin.

use lobby_core::controller::UserCommand;
use lobby_core::session::GameMode;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub const HELP: &str =
    "Commands: t(ournament) | r(andom) | c(ancel) | o(nline) | h(elp) | q(uit)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    /// Forwarded to the session controller.
    Session(UserCommand),
    /// Refresh the online-user list.
    Online,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command `{0}` (type `h` for help)")]
    Unknown(String),
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<AppCommand>, CommandError> {
    let word = line.trim().to_ascii_lowercase();
    let command = match word.as_str() {
        "" => return Ok(None),
        "t" | "tournament" => AppCommand::Session(UserCommand::Start(GameMode::Tournament)),
        "r" | "random" => AppCommand::Session(UserCommand::Start(GameMode::Random)),
        "c" | "cancel" => AppCommand::Session(UserCommand::Cancel),
        "o" | "online" => AppCommand::Online,
        "h" | "help" | "?" => AppCommand::Help,
        "q" | "quit" | "exit" => AppCommand::Quit,
        _ => return Err(CommandError::Unknown(line.trim().to_string())),
    };
    Ok(Some(command))
}

/// Read commands from `input` until EOF, forwarding parsed ones to `tx`.
/// EOF is forwarded as `Quit`.
pub async fn read_commands<R>(input: R, tx: mpsc::UnboundedSender<AppCommand>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read command input: {e}");
                break;
            }
        };
        match parse_command(&line) {
            Ok(Some(command)) => {
                if tx.send(command).is_err() {
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => {
                debug!("{e}");
                println!("{e}");
            }
        }
    }
    let _ = tx.send(AppCommand::Quit);
}

/// Read commands from the process's stdin.
pub async fn read_stdin(tx: mpsc::UnboundedSender<AppCommand>) {
    read_commands(BufReader::new(tokio::io::stdin()), tx).await;
}
