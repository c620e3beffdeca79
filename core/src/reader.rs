//! Bulk scan of an existing log file.
//!
//! Used at startup to catch up on a log the game has already been writing:
//! the whole file is memory-mapped, split on newlines, and parsed in
//! parallel. The returned byte offset is where the live tail should resume.

use std::fs;
use std::io::Result;
use std::path::Path;

use memchr::memchr_iter;
use memmap2::Mmap;
use rayon::prelude::*;

use crate::game_log::{self, LogEvent};

/// Parse every recognizable event already present in the file.
///
/// Events come back in file order. Returns the end-of-file byte offset so
/// the caller can tail from exactly where the scan stopped.
pub fn scan_log_file<P: AsRef<Path>>(path: P) -> Result<(Vec<LogEvent>, u64)> {
    let file = fs::File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    let bytes = mmap.as_ref();
    let end_pos = bytes.len() as u64;

    // Find all line boundaries
    let mut line_ranges: Vec<(usize, usize)> = Vec::new();
    let mut start = 0;
    for end in memchr_iter(b'\n', bytes) {
        if end > start {
            line_ranges.push((start, end));
        }
        start = end + 1;
    }
    if start < bytes.len() {
        line_ranges.push((start, bytes.len()));
    }

    let events: Vec<LogEvent> = line_ranges
        .par_iter()
        .filter_map(|&(start, end)| {
            let line = std::str::from_utf8(&bytes[start..end]).ok()?;
            game_log::parse_line(line.trim_end_matches('\r'))
        })
        .collect();

    Ok((events, end_pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_log(tag: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "tacmap-reader-test-{tag}-{}.log",
            std::process::id()
        ));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_scan_extracts_events_in_order() {
        let contents = "\
2024-12-05 14:30:00|  application|scene preset path:maps/customs_preset.bundle\r\n\
2024-12-05 14:30:01|  application|NAT punch success\n\
2024-12-05 14:30:30|  application|MatchingCompleted:5.2 real:5.1\n\
2024-12-05 14:30:35|  application|TRACE-NetworkGameCreate profileStatus Location: bigmap, RaidMode: Online, shortId: ABC123\n\
2024-12-05 14:30:40|  application|GameStarted\n";
        let path = temp_log("order", contents);

        let (events, end) = scan_log_file(&path).unwrap();
        assert_eq!(end, contents.len() as u64);
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], LogEvent::MapLoaded { .. }));
        assert!(matches!(events[1], LogEvent::MatchingCompleted { .. }));
        assert!(matches!(events[2], LogEvent::MatchCreated { .. }));
        assert_eq!(events[3], LogEvent::MatchStarted);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_scan_tolerates_invalid_utf8_and_no_trailing_newline() {
        let contents = b"2024|app|GameStarted\n\xff\xfe broken line\n2024|app|UserMatchOver".to_vec();
        let path = std::env::temp_dir().join(format!(
            "tacmap-reader-test-utf8-{}.log",
            std::process::id()
        ));
        fs::write(&path, &contents).unwrap();

        let (events, _) = scan_log_file(&path).unwrap();
        assert_eq!(events, vec![LogEvent::MatchStarted, LogEvent::MatchEnded]);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_scan_empty_file() {
        let path = temp_log("empty", "");
        let (events, end) = scan_log_file(&path).unwrap();
        assert!(events.is_empty());
        assert_eq!(end, 0);
        let _ = fs::remove_file(path);
    }
}
