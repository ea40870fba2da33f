//! Foreground side of the bridge: owns the torrent list, drains engine
//! notifications and turns console commands into dispatched actions

use crate::console::{self, Command};
use std::path::{Path, PathBuf};
use syrent_core::{
    describe_activity, describe_progress, ActionKind, ActionOutcome, ActionTicket, Database,
    Dispatcher, FileTree, Settings, SettingsDb, TorrentDescriptor, TorrentId, TorrentList,
    TorrentState, UiMessage,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::{JoinError, JoinSet};

type Settled = (ActionKind, TorrentId, syrent_core::Result<ActionOutcome>);

pub struct Foreground {
    dispatcher: Dispatcher,
    db: Database,
    settings: Settings,
    list: TorrentList<()>,
    outcomes: JoinSet<Settled>,
}

impl Foreground {
    pub fn new(dispatcher: Dispatcher, db: Database, settings: Settings) -> Self {
        Self {
            dispatcher,
            db,
            settings,
            list: TorrentList::new(),
            outcomes: JoinSet::new(),
        }
    }

    /// Run until the engine loop goes away, `quit` is typed or Ctrl+C
    pub async fn run(&mut self, ui_rx: async_channel::Receiver<UiMessage>, initial: Vec<PathBuf>) {
        let mut initial = Some(initial);
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                msg = ui_rx.recv() => match msg {
                    Ok(UiMessage::EngineReady) => {
                        log::info!("Engine ready");
                        if let Some(paths) = initial.take() {
                            self.add_files(paths);
                        }
                    }
                    Ok(msg) => self.handle_message(msg),
                    Err(_) => {
                        log::warn!("Engine loop is gone");
                        break;
                    }
                },

                line = stdin.next_line(), if stdin_open => match line {
                    Ok(Some(line)) => {
                        if !self.handle_line(&line) {
                            break;
                        }
                    }
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        log::warn!("Failed to read stdin: {}", e);
                        stdin_open = false;
                    }
                },

                Some(joined) = self.outcomes.join_next(), if !self.outcomes.is_empty() => {
                    self.settle(joined);
                }

                _ = &mut ctrl_c => {
                    log::info!("Received Ctrl+C, shutting down");
                    break;
                }
            }
        }
    }

    fn handle_message(&mut self, msg: UiMessage) {
        match &msg {
            UiMessage::TorrentAdded(state) | UiMessage::TorrentChanged(state) => {
                log::info!(
                    "{}: {}",
                    state.suggested_name,
                    describe_activity(state, false)
                );
            }
            UiMessage::TorrentRemoved(id) => log::info!("Torrent {} removed", id),
            UiMessage::TorrentsSuggested(paths) => {
                self.add_files(paths.clone());
                return;
            }
            UiMessage::Error {
                description,
                message,
            } => {
                log::error!("{}: {}", description, message);
                return;
            }
            UiMessage::EngineReady => return,
        }

        if let Err(e) = self.list.apply(&msg, |_| ()) {
            log::warn!("Torrent list out of sync: {}", e);
        }
    }

    /// Returns false when the user asked to quit
    fn handle_line(&mut self, line: &str) -> bool {
        let command = match console::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return true,
            Err(e) => {
                println!("{}", e);
                return true;
            }
        };

        match command {
            Command::List => self.print_list(),
            Command::Help => println!("{}", console::HELP),
            Command::Quit => return false,
            Command::Add(paths) => self.add_files(paths),
            Command::Action(action, positions) => self.dispatch(action, &positions),
        }
        true
    }

    fn dispatch(&mut self, action: ActionKind, positions: &[usize]) {
        let ids: Vec<TorrentId> = positions
            .iter()
            .filter_map(|&n| match self.list.iter().nth(n - 1) {
                Some(entry) => Some(entry.id().clone()),
                None => {
                    println!("no torrent at position {}", n);
                    None
                }
            })
            .collect();

        let available = self.list.available_actions(&ids);
        let allowed = match action {
            ActionKind::Pause => available.pause,
            ActionKind::Resume => available.resume,
            ActionKind::Remove => available.remove,
            ActionKind::Add => false,
        };
        if !allowed {
            println!("nothing to {}", action);
            return;
        }

        match self.dispatcher.submit_selected(&mut self.list, &ids, action) {
            Ok(tickets) => tickets.into_iter().for_each(|t| self.track(t)),
            Err(e) => println!("{}", e),
        }
    }

    fn add_files(&mut self, paths: Vec<PathBuf>) {
        for path in paths {
            if let Some(descriptor) = self.prepare_add(&path) {
                let ticket = self.dispatcher.submit_add(descriptor);
                self.track(ticket);
            }
        }
    }

    fn prepare_add(&mut self, path: &Path) -> Option<TorrentDescriptor> {
        let mut descriptor = match TorrentDescriptor::from_file(path) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                log::error!("Failed to load torrent file {}: {}", path.display(), e);
                return None;
            }
        };
        if let Some(message) = duplicate_add_error(&self.list, path, &descriptor) {
            log::error!("{}", message);
            return None;
        }

        let tree = match FileTree::from_descriptor(&descriptor) {
            Ok(tree) => tree,
            Err(e) => {
                log::error!("Failed to list files of {}: {}", path.display(), e);
                return None;
            }
        };
        let selection = tree.selected_leaves();
        if selection.is_empty() {
            log::warn!("{}: {}", descriptor.suggested_name, selection.label());
            return None;
        }
        log::info!("{}: {}", descriptor.suggested_name, selection.label());

        let download_dir = self.settings.suggested_download_dir().to_string();
        descriptor.select_files(tree.selected_paths());
        descriptor.download_dir = Some(download_dir.clone());

        if let Some(torrent_dir) = path.parent() {
            self.remember_dirs(&torrent_dir.to_string_lossy(), &download_dir);
        }
        Some(descriptor)
    }

    fn remember_dirs(&mut self, torrent_dir: &str, download_dir: &str) {
        self.settings.last_torrent_dir = Some(torrent_dir.to_string());
        self.settings.last_download_dir = Some(download_dir.to_string());

        let saved = SettingsDb::set(&self.db, "last_torrent_dir", torrent_dir)
            .and_then(|()| SettingsDb::set(&self.db, "last_download_dir", download_dir));
        if let Err(e) = saved {
            log::warn!("Failed to remember directories: {}", e);
        }
    }

    fn track(&mut self, ticket: ActionTicket) {
        let action = ticket.action();
        let target = ticket.target().clone();
        self.outcomes.spawn(async move { (action, target, ticket.outcome().await) });
    }

    fn settle(&mut self, joined: Result<Settled, JoinError>) {
        let (action, target, outcome) = match joined {
            Ok(settled) => settled,
            Err(e) => {
                log::warn!("Action task failed: {}", e);
                return;
            }
        };

        match outcome {
            Ok(ActionOutcome::Applied) => log::debug!("{} of {} applied", action, target),
            Ok(ActionOutcome::Ignored) => {
                self.list.settle(&target);
                log::info!("{} of {} did not apply to its current state", action, target);
            }
            Err(e) => {
                self.list.settle(&target);
                log::debug!("{} of {} failed: {}", action, target, e);
            }
        }
    }

    fn print_list(&self) {
        if self.list.is_empty() {
            println!("no torrents");
            return;
        }
        for (i, entry) in self.list.iter().enumerate() {
            let state = entry.state();
            println!("{}", headline(i + 1, state));
            println!("     {}", describe_progress(state));
            println!("     {}", describe_activity(state, entry.waiting_action()));
        }
    }
}

/// Torrents already in the list are rejected before any file selection
fn duplicate_add_error<H>(
    list: &TorrentList<H>,
    path: &Path,
    descriptor: &TorrentDescriptor,
) -> Option<String> {
    list.contains(&descriptor.id).then(|| {
        format!(
            "Failed to add \"{}\": This torrent is already added",
            path.display()
        )
    })
}

/// First line of a list entry: position, name and percentage done
fn headline(position: usize, state: &TorrentState) -> String {
    format!(
        "{:>3}. {} ({:.0}%)",
        position,
        state.suggested_name,
        state.progress() * 100.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use syrent_core::TorrentFileEntry;

    fn descriptor(hash: &str) -> TorrentDescriptor {
        TorrentDescriptor {
            id: TorrentId::from(hash),
            suggested_name: "debian.iso".to_string(),
            single_file_mode: true,
            files: vec![TorrentFileEntry {
                index: 0,
                path: vec!["debian.iso".to_string()],
                length: 400,
            }],
            announce_list: Vec::new(),
            selected_files: None,
            download_dir: None,
            comment: None,
        }
    }

    fn state(hash: &str) -> TorrentState {
        TorrentState {
            id: TorrentId::from(hash),
            suggested_name: "debian.iso".to_string(),
            single_file_mode: true,
            selected_size: 400,
            downloaded_size: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_duplicate_add_is_rejected() {
        let mut list = TorrentList::new();
        list.apply(&UiMessage::TorrentAdded(state("aa")), |_| ()).unwrap();
        let path = Path::new("/downloads/debian.torrent");

        assert_eq!(
            duplicate_add_error(&list, path, &descriptor("aa")).as_deref(),
            Some("Failed to add \"/downloads/debian.torrent\": This torrent is already added")
        );
        assert_eq!(duplicate_add_error(&list, path, &descriptor("bb")), None);
    }

    #[test]
    fn test_headline_shows_percentage() {
        assert_eq!(headline(1, &state("aa")), "  1. debian.iso (25%)");

        let empty = TorrentState {
            selected_size: 0,
            downloaded_size: 0,
            ..state("bb")
        };
        assert_eq!(headline(12, &empty), " 12. debian.iso (0%)");
    }
}
