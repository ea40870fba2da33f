//! Reader for `.torrent` metainfo files

use crate::error::{Error, Result};
use crate::types::{TorrentDescriptor, TorrentFileEntry, TorrentId};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct MetaInfo {
    info: InfoDict,
    #[serde(default)]
    announce: Option<String>,
    #[serde(default, rename = "announce-list")]
    announce_list: Option<Vec<Vec<String>>>,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfoDict {
    name: String,
    #[serde(default)]
    length: Option<u64>,
    #[serde(default)]
    files: Option<Vec<FileDict>>,
}

#[derive(Debug, Deserialize)]
struct FileDict {
    length: u64,
    path: Vec<String>,
}

/// The info dictionary kept as a generic value so it can be re-encoded for
/// hashing
#[derive(Debug, Deserialize)]
struct RawInfo {
    info: serde_bencode::value::Value,
}

impl TorrentDescriptor {
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            Error::InvalidTorrent(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let meta: MetaInfo = serde_bencode::from_bytes(bytes)?;
        let raw: RawInfo = serde_bencode::from_bytes(bytes)?;
        let info_hash = Sha1::digest(serde_bencode::to_bytes(&raw.info)?);

        validate_component(&meta.info.name)?;

        let (single_file_mode, files) = match (meta.info.files, meta.info.length) {
            (Some(files), _) => {
                if files.is_empty() {
                    return Err(Error::InvalidTorrent("empty file list".to_string()));
                }
                let entries = files
                    .into_iter()
                    .enumerate()
                    .map(|(index, file)| {
                        if file.path.is_empty() {
                            return Err(Error::InvalidTorrent(format!("file {} has no path", index)));
                        }
                        for component in &file.path {
                            validate_component(component)?;
                        }
                        Ok(TorrentFileEntry {
                            index,
                            path: file.path,
                            length: file.length,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                (false, entries)
            }
            (None, Some(length)) => (
                true,
                vec![TorrentFileEntry {
                    index: 0,
                    path: vec![meta.info.name.clone()],
                    length,
                }],
            ),
            (None, None) => {
                return Err(Error::InvalidTorrent(
                    "info has neither length nor files".to_string(),
                ))
            }
        };

        let announce_list = match (meta.announce_list, meta.announce) {
            (Some(tiers), _) if !tiers.is_empty() => tiers,
            (_, Some(announce)) => vec![vec![announce]],
            _ => Vec::new(),
        };

        Ok(TorrentDescriptor {
            id: TorrentId::from_info_hash(&info_hash),
            suggested_name: meta.info.name,
            single_file_mode,
            files,
            announce_list,
            selected_files: None,
            download_dir: None,
            comment: meta.comment,
        })
    }
}

fn validate_component(component: &str) -> Result<()> {
    if component.is_empty()
        || component == "."
        || component == ".."
        || component.contains('/')
        || component.contains('\\')
    {
        return Err(Error::InvalidTorrent(format!(
            "unsafe path component {:?}",
            component
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE_INFO: &str = "d6:lengthi700e4:name9:movie.mkv12:piece lengthi16384e6:pieces0:e";
    const MULTI_INFO: &str = "d5:filesld6:lengthi100e4:pathl5:a.txteed6:lengthi200e4:pathl3:dir5:b.txteee4:name4:pack12:piece lengthi16384e6:pieces0:e";

    fn wrap(info: &str, extra: &str) -> Vec<u8> {
        format!("d{}4:info{}e", extra, info).into_bytes()
    }

    fn expected_id(info: &str) -> TorrentId {
        TorrentId::from_info_hash(&Sha1::digest(info.as_bytes()))
    }

    #[test]
    fn test_single_file_torrent() {
        let bytes = wrap(SINGLE_INFO, "8:announce18:http://tracker/ann7:comment5:hello");
        let descriptor = TorrentDescriptor::from_bytes(&bytes).unwrap();

        assert_eq!(descriptor.id, expected_id(SINGLE_INFO));
        assert_eq!(descriptor.id.as_str().len(), 40);
        assert_eq!(descriptor.suggested_name, "movie.mkv");
        assert!(descriptor.single_file_mode);
        assert_eq!(descriptor.files.len(), 1);
        assert_eq!(descriptor.files[0].path, vec!["movie.mkv".to_string()]);
        assert_eq!(descriptor.total_size(), 700);
        assert_eq!(
            descriptor.announce_list,
            vec![vec!["http://tracker/ann".to_string()]]
        );
        assert_eq!(descriptor.comment.as_deref(), Some("hello"));
    }

    #[test]
    fn test_multi_file_torrent() {
        let bytes = wrap(MULTI_INFO, "13:announce-listll5:udp:aeel5:udp:bee");
        let descriptor = TorrentDescriptor::from_bytes(&bytes).unwrap();

        assert_eq!(descriptor.id, expected_id(MULTI_INFO));
        assert!(!descriptor.single_file_mode);
        assert_eq!(descriptor.suggested_name, "pack");
        let paths: Vec<_> = descriptor.files.iter().map(|f| f.display_path()).collect();
        assert_eq!(paths, vec!["a.txt", "dir/b.txt"]);
        assert_eq!(descriptor.total_size(), 300);
        assert_eq!(descriptor.announce_list.len(), 2);
    }

    #[test]
    fn test_unsafe_paths_are_rejected() {
        let info = "d5:filesld6:lengthi1e4:pathl2:..6:escapeee4:name1:x12:piece lengthi1e6:pieces0:e";
        assert!(matches!(
            TorrentDescriptor::from_bytes(&wrap(info, "")),
            Err(Error::InvalidTorrent(_))
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            TorrentDescriptor::from_bytes(b"not bencode"),
            Err(Error::InvalidTorrent(_))
        ));
        let no_layout = "d4:name1:x12:piece lengthi1e6:pieces0:e";
        assert!(TorrentDescriptor::from_bytes(&wrap(no_layout, "")).is_err());
    }

    #[test]
    fn test_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            TorrentDescriptor::from_file(&dir.path().join("absent.torrent")),
            Err(Error::InvalidTorrent(_))
        ));
    }
}
