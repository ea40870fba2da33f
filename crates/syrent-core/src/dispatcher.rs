//! Action dispatcher - hands foreground actions to the engine loop
//!
//! Submission never blocks: the action is queued and a ticket comes back
//! immediately. The loop processes queued actions one by one in submission
//! order.

use crate::error::{Error, Result};
use crate::service::{EngineCommand, LoopHandle, QueuedCommand};
use crate::torrent_list::TorrentList;
use crate::types::{ActionKind, TorrentDescriptor, TorrentId};

/// How the engine dealt with an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied,
    /// The action did not apply to the torrent's state and was dropped
    Ignored,
}

/// Handle to the result of a submitted action
#[derive(Debug)]
pub struct ActionTicket {
    action: ActionKind,
    target: TorrentId,
    reply: async_channel::Receiver<Result<ActionOutcome>>,
}

impl ActionTicket {
    pub fn action(&self) -> ActionKind {
        self.action
    }

    pub fn target(&self) -> &TorrentId {
        &self.target
    }

    /// Non-blocking poll. Returns `Some` exactly once, when the loop has
    /// processed the action (or dropped it because it is shutting down).
    pub fn try_outcome(&self) -> Option<Result<ActionOutcome>> {
        match self.reply.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(async_channel::TryRecvError::Empty) => None,
            Err(async_channel::TryRecvError::Closed) => Some(Err(Error::EngineStopped)),
        }
    }

    pub async fn outcome(self) -> Result<ActionOutcome> {
        self.reply.recv().await.unwrap_or(Err(Error::EngineStopped))
    }

    /// Blocking variant of [`outcome`](Self::outcome), not for the UI thread
    pub fn wait(self) -> Result<ActionOutcome> {
        self.reply
            .recv_blocking()
            .unwrap_or(Err(Error::EngineStopped))
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    handle: LoopHandle,
}

impl Dispatcher {
    pub fn new(handle: LoopHandle) -> Self {
        Self { handle }
    }

    /// Queue pause, resume or remove of `target`
    pub fn submit(&self, action: ActionKind, target: TorrentId) -> Result<ActionTicket> {
        let command = match action {
            ActionKind::Pause => EngineCommand::Pause(target),
            ActionKind::Resume => EngineCommand::Resume(target),
            ActionKind::Remove => EngineCommand::Remove(target),
            ActionKind::Add => {
                return Err(Error::InvalidInput(
                    "adding a torrent requires a descriptor".to_string(),
                ))
            }
        };
        Ok(self.enqueue(command))
    }

    pub fn submit_add(&self, descriptor: TorrentDescriptor) -> ActionTicket {
        self.enqueue(EngineCommand::Add(Box::new(descriptor)))
    }

    /// Apply `action` to every selected torrent not already waiting on one.
    ///
    /// Each submitted item is flagged as waiting before this returns, so
    /// repeated clicks cannot queue the same action twice.
    pub fn submit_selected<H>(
        &self,
        list: &mut TorrentList<H>,
        targets: &[TorrentId],
        action: ActionKind,
    ) -> Result<Vec<ActionTicket>> {
        if action == ActionKind::Add {
            return Err(Error::InvalidInput(
                "adding a torrent requires a descriptor".to_string(),
            ));
        }

        let mut tickets = Vec::new();
        for id in targets {
            if !list.mark_waiting(id)? {
                continue;
            }
            tickets.push(self.submit(action, id.clone())?);
        }
        Ok(tickets)
    }

    fn enqueue(&self, command: EngineCommand) -> ActionTicket {
        let (reply_tx, reply_rx) = async_channel::bounded(1);
        let ticket = ActionTicket {
            action: command.kind(),
            target: command.target().clone(),
            reply: reply_rx,
        };

        // A rejected command drops its reply sender, which resolves the
        // ticket to `EngineStopped`
        if self
            .handle
            .enqueue(QueuedCommand {
                command,
                reply: reply_tx,
            })
            .is_err()
        {
            log::debug!("Engine loop is gone, dropping {} of {}", ticket.action, ticket.target);
        }
        ticket
    }
}
