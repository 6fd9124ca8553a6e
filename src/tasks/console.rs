//! Line-based stand-in for the pointer UI of the number board.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::select;
use tokio::sync::{mpsc::Sender, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::events::ClaimCommand;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Hover(Option<u32>),
    Pick(u32),
    Confirm,
    Dismiss,
    Refresh,
    Help,
}

pub const HELP: &str = "commands: hover [N] | pick N | confirm | dismiss | refresh | help";

pub fn parse_line(line: &str) -> Option<Result<ConsoleInput, String>> {
    let mut words = line.split_whitespace();
    let verb = words.next()?.to_ascii_lowercase();
    let arg = words.next();
    let number = |arg: Option<&str>| -> Result<u32, String> {
        let raw = arg.ok_or_else(|| format!("{verb} needs a number"))?;
        raw.parse::<u32>()
            .map_err(|_| format!("{raw:?} is not a number"))
    };
    let parsed = match verb.as_str() {
        "hover" => match arg {
            None => Ok(ConsoleInput::Hover(None)),
            Some(_) => number(arg).map(|n| ConsoleInput::Hover(Some(n))),
        },
        "pick" | "select" => number(arg).map(ConsoleInput::Pick),
        "confirm" | "yes" => Ok(ConsoleInput::Confirm),
        "dismiss" | "cancel" | "no" => Ok(ConsoleInput::Dismiss),
        "refresh" => Ok(ConsoleInput::Refresh),
        "help" | "?" => Ok(ConsoleInput::Help),
        other => Err(format!("unknown command {other:?}")),
    };
    Some(parsed)
}

/// Reads commands from `input` until it closes, then cancels the program.
pub async fn run<R>(input: R, claims: Sender<ClaimCommand>, cancel: CancellationToken) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    info!("{HELP}");
    loop {
        let line = select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            info!("stdin closed; initiating shutdown");
            cancel.cancel();
            break;
        };
        let input = match parse_line(&line) {
            None => continue,
            Some(Ok(input)) => input,
            Some(Err(message)) => {
                warn!("{message}; {HELP}");
                continue;
            }
        };
        if !forward(input, &claims).await {
            break;
        }
    }
    Ok(())
}

async fn forward(input: ConsoleInput, claims: &Sender<ClaimCommand>) -> bool {
    let sent = match input {
        ConsoleInput::Help => {
            info!("{HELP}");
            return true;
        }
        ConsoleInput::Hover(number) => claims.send(ClaimCommand::Hover(number)).await,
        ConsoleInput::Dismiss => claims.send(ClaimCommand::Dismiss).await,
        ConsoleInput::Refresh => claims.send(ClaimCommand::Refresh).await,
        ConsoleInput::Pick(number) => {
            let (reply, answer) = oneshot::channel();
            if claims.send(ClaimCommand::Select { number, reply }).await.is_err() {
                return false;
            }
            if let Ok(outcome) = answer.await {
                info!(?outcome, "pick {number}");
            }
            return true;
        }
        ConsoleInput::Confirm => {
            let (reply, answer) = oneshot::channel();
            if claims.send(ClaimCommand::Confirm { reply }).await.is_err() {
                return false;
            }
            if let Ok(outcome) = answer.await {
                info!(?outcome, "confirm");
            }
            return true;
        }
    };
    if sent.is_err() {
        warn!("claim board is gone; console stops");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn parses_known_commands() {
        assert_eq!(parse_line("pick 7"), Some(Ok(ConsoleInput::Pick(7))));
        assert_eq!(parse_line("  HOVER  12 "), Some(Ok(ConsoleInput::Hover(Some(12)))));
        assert_eq!(parse_line("hover"), Some(Ok(ConsoleInput::Hover(None))));
        assert_eq!(parse_line("confirm"), Some(Ok(ConsoleInput::Confirm)));
        assert_eq!(parse_line(""), None);
        assert!(matches!(parse_line("pick x"), Some(Err(_))));
        assert!(matches!(parse_line("pick"), Some(Err(_))));
        assert!(matches!(parse_line("dance"), Some(Err(_))));
    }

    #[tokio::test]
    async fn eof_cancels_and_commands_are_forwarded() {
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let input: &[u8] = b"hover 3\nbogus\ndismiss\n";
        run(input, tx, cancel.clone()).await.unwrap();
        assert!(cancel.is_cancelled());
        assert!(matches!(rx.recv().await, Some(ClaimCommand::Hover(Some(3)))));
        assert!(matches!(rx.recv().await, Some(ClaimCommand::Dismiss)));
        assert!(rx.recv().await.is_none());
    }
}
