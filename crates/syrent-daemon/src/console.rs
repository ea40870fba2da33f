//! Line commands read from stdin

use std::path::PathBuf;
use syrent_core::ActionKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the torrent list
    List,
    /// Apply an action to list entries, by 1-based position
    Action(ActionKind, Vec<usize>),
    /// Add torrent files
    Add(Vec<PathBuf>),
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  list                   show torrents
  pause <n>...           pause torrents by list position
  resume <n>...          resume torrents by list position
  remove <n>...          remove torrents by list position
  add <file>...          add torrent files
  quit                   stop the engine and exit";

pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();

    let command = match verb {
        "list" | "ls" => Command::List,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "pause" => Command::Action(ActionKind::Pause, positions(&rest)?),
        "resume" => Command::Action(ActionKind::Resume, positions(&rest)?),
        "remove" | "rm" => Command::Action(ActionKind::Remove, positions(&rest)?),
        "add" => {
            if rest.is_empty() {
                return Err("add needs at least one file".to_string());
            }
            Command::Add(rest.iter().map(PathBuf::from).collect())
        }
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };
    Ok(Some(command))
}

fn positions(words: &[&str]) -> Result<Vec<usize>, String> {
    if words.is_empty() {
        return Err("expected at least one list position".to_string());
    }
    words
        .iter()
        .map(|w| match w.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(format!("'{}' is not a list position", w)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actions() {
        assert_eq!(
            parse("pause 1 3").unwrap(),
            Some(Command::Action(ActionKind::Pause, vec![1, 3]))
        );
        assert_eq!(
            parse("  rm 2 ").unwrap(),
            Some(Command::Action(ActionKind::Remove, vec![2]))
        );
        assert!(parse("resume").is_err());
        assert!(parse("resume 0").is_err());
        assert!(parse("pause x").is_err());
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("list").unwrap(), Some(Command::List));
        assert_eq!(parse("quit").unwrap(), Some(Command::Quit));
        assert_eq!(
            parse("add a.torrent b.torrent").unwrap(),
            Some(Command::Add(vec![
                PathBuf::from("a.torrent"),
                PathBuf::from("b.torrent")
            ]))
        );
        assert!(parse("add").is_err());
        assert!(parse("frobnicate").is_err());
    }
}
