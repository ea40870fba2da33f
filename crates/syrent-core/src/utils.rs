//! Formatting helpers for torrent sizes, speeds and status lines

use crate::types::TorrentState;

/// Format bytes to human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format speed to human-readable string
pub fn format_speed(bytes_per_sec: u64) -> String {
    if bytes_per_sec == 0 {
        return "0 B/s".to_string();
    }
    format!("{}/s", format_bytes(bytes_per_sec))
}

pub fn format_duration(seconds: u64) -> String {
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{}d {}h", days, hours % 24)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

/// Calculate progress fraction in `0.0..=1.0`
pub fn calculate_progress(completed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (completed as f64 / total as f64).min(1.0)
}

/// "X of Y, Ratio: R" line of a list entry
pub fn describe_progress(state: &TorrentState) -> String {
    let sizes = if state.downloaded_size < state.selected_size {
        format!(
            "{} of {}",
            format_bytes(state.downloaded_size),
            format_bytes(state.selected_size)
        )
    } else {
        format!("{} (complete)", format_bytes(state.selected_size))
    };
    format!("{}, Ratio: {:.1}", sizes, state.ratio())
}

/// Activity line of a list entry
pub fn describe_activity(state: &TorrentState, waiting_action: bool) -> String {
    if waiting_action {
        return "Waiting".to_string();
    }
    if state.paused {
        return "Paused".to_string();
    }

    if state.complete {
        let mut text = format!(
            "Uploading to {} of {} peers",
            state.uploading_peer_count, state.total_peer_count
        );
        if state.upload_speed > 0 {
            text.push_str(&format!(" on {}", format_speed(state.upload_speed)));
        }
        return text;
    }

    let mut text = format!(
        "Downloading from {} of {} peers",
        state.downloading_peer_count, state.total_peer_count
    );
    if state.download_speed > 0 {
        text.push_str(&format!(" on {}", format_speed(state.download_speed)));
    }
    if let Some(eta) = state.eta_seconds {
        text.push_str(&format!(", {} remaining", format_duration(eta)));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.00 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(2 * 86400 + 3 * 3600), "2d 3h");
    }

    #[test]
    fn test_calculate_progress() {
        assert_eq!(calculate_progress(0, 0), 0.0);
        assert_eq!(calculate_progress(50, 100), 0.5);
        assert_eq!(calculate_progress(200, 100), 1.0);
    }

    #[test]
    fn test_describe_progress() {
        let mut state = TorrentState {
            selected_size: 2048,
            downloaded_size: 1024,
            uploaded_size: 1024,
            ..Default::default()
        };
        assert_eq!(describe_progress(&state), "1.00 KB of 2.00 KB, Ratio: 0.5");

        state.downloaded_size = 2048;
        assert_eq!(describe_progress(&state), "2.00 KB (complete), Ratio: 0.5");
    }

    #[test]
    fn test_describe_activity() {
        let mut state = TorrentState {
            total_peer_count: 7,
            downloading_peer_count: 3,
            uploading_peer_count: 2,
            download_speed: 1024,
            eta_seconds: Some(65),
            ..Default::default()
        };
        assert_eq!(
            describe_activity(&state, false),
            "Downloading from 3 of 7 peers on 1.00 KB/s, 1m 5s remaining"
        );
        assert_eq!(describe_activity(&state, true), "Waiting");

        state.complete = true;
        assert_eq!(describe_activity(&state, false), "Uploading to 2 of 7 peers");

        state.paused = true;
        assert_eq!(describe_activity(&state, false), "Paused");
    }
}
