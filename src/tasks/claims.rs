use std::time::Duration;

use anyhow::Result;
use claim_ledger::ClaimStore;
use tokio::select;
use tokio::sync::mpsc::Receiver;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::claims::ClaimBoard;
use crate::events::ClaimCommand;

/// Owns the claim board: applies commands in order and polls the store.
///
/// Store failures never end the task; the last known claimed set stays in place.
pub async fn run<S: ClaimStore>(
    mut board: ClaimBoard<S>,
    mut commands: Receiver<ClaimCommand>,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    if board.should_poll() {
        refresh(&mut board).await;
    }
    let mut poll = interval_at(Instant::now() + poll_interval, poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            _ = cancel.cancelled() => break,
            _ = poll.tick() => {
                if board.should_poll() {
                    refresh(&mut board).await;
                } else {
                    trace!("not signed in; skipping claim poll");
                }
            }
            command = commands.recv() => match command {
                Some(command) => handle(&mut board, command).await,
                None => {
                    debug!("claim command channel closed");
                    break;
                }
            },
        }
    }
    Ok(())
}

async fn handle<S: ClaimStore>(board: &mut ClaimBoard<S>, command: ClaimCommand) {
    match command {
        ClaimCommand::Hover(number) => {
            let hovered = board.hover(number);
            trace!(?hovered, "hover");
        }
        ClaimCommand::Select { number, reply } => {
            let outcome = board.select_number(number);
            debug!(number, ?outcome, "number selected");
            let _ = reply.send(outcome);
        }
        ClaimCommand::Confirm { reply } => {
            let outcome = board.confirm_selected().await;
            info!(?outcome, "claim confirmation");
            let _ = reply.send(outcome);
        }
        ClaimCommand::Dismiss => board.dismiss(),
        ClaimCommand::Refresh => refresh(board).await,
        ClaimCommand::SetAuth(auth) => {
            board.set_auth(auth);
            if board.should_poll() {
                refresh(board).await;
            }
        }
    }
}

async fn refresh<S: ClaimStore>(board: &mut ClaimBoard<S>) {
    match board.refresh().await {
        Ok(()) => debug!(claimed = board.claimed().len(), "claimed numbers refreshed"),
        Err(err) => warn!("claim poll failed: {err}"),
    }
}
