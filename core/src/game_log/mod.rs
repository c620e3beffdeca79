//! Game log line recognition.
//!
//! The game appends a verbose application log; a handful of line shapes
//! carry raid-lifecycle information and everything else is noise. The
//! recognizer is a pure function over a single line: it never keeps state
//! and never fails; lines that match no known pattern are `None`.
//!
//! Line shapes (localization-independent markers):
//!
//! ```text
//! ...|scene preset path:maps/customs_preset.bundle
//! ...|MatchingCompleted:5.2 real:5.1
//! ...|TRACE-NetworkGameCreate profileStatus ... Location: bigmap, RaidMode: Online, shortId: ABC123
//! ...|GameStarted
//! ...|UserMatchOver
//! ...|Ip: 203.0.113.7, Port: 17000
//! ```

use std::net::Ipv4Addr;

const SCENE_PRESET_MARKER: &str = "scene preset path:maps/";
const GAME_CREATE_MARKER: &str = "TRACE-NetworkGameCreate profileStatus";
const MATCHING_COMPLETED_MARKER: &str = "MatchingCompleted:";
const GAME_STARTED_MARKER: &str = "GameStarted";
const MATCH_OVER_MARKER: &str = "UserMatchOver";

/// Prefixes after which a raid server address may appear.
const ADDRESS_PREFIXES: [&str; 3] = ["Ip: ", "Server: ", "EndPoint: "];

/// Scene bundle name -> in-game map id.
static MAP_BUNDLES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "city_preset" => "TarkovStreets",
    "customs_preset" => "bigmap",
    "factory_day_preset" => "factory4_day",
    "factory_night_preset" => "factory4_night",
    "laboratory_preset" => "laboratory",
    "labyrinth_preset" => "Labyrinth",
    "lighthouse_preset" => "Lighthouse",
    "rezerv_base_preset" => "RezervBase",
    "sandbox_preset" => "Sandbox",
    "sandbox_high_preset" => "Sandbox_high",
    "shopping_mall" => "Interchange",
    "shoreline_preset" => "Shoreline",
    "woods_preset" => "Woods",
};

/// Map id -> human display name, for freshly created map configs.
static MAP_DISPLAY_NAMES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "TarkovStreets" => "Streets of Tarkov",
    "bigmap" => "Customs",
    "factory4_day" => "Factory (Day)",
    "factory4_night" => "Factory (Night)",
    "laboratory" => "The Lab",
    "Labyrinth" => "Labyrinth",
    "Lighthouse" => "Lighthouse",
    "RezervBase" => "Reserve",
    "Sandbox" => "Ground Zero",
    "Sandbox_high" => "Ground Zero (High)",
    "Interchange" => "Interchange",
    "Shoreline" => "Shoreline",
    "Woods" => "Woods",
};

pub fn map_id_for_bundle(bundle: &str) -> Option<&'static str> {
    MAP_BUNDLES.get(bundle).copied()
}

pub fn display_name_for_map(map_id: &str) -> &str {
    MAP_DISPLAY_NAMES.get(map_id).copied().unwrap_or(map_id)
}

/// A recognized raid-lifecycle event. Closed set; anything the recognizer
/// does not know maps to `None`, never to an error.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    /// The level scene finished loading. Emitted once per raid, usually
    /// before the match itself is announced.
    MapLoaded { map_id: String },
    /// The backend created a match for us.
    MatchCreated {
        location: Option<String>,
        short_id: Option<String>,
        online: bool,
    },
    /// Matchmaking finished; queue duration in seconds.
    MatchingCompleted { queue_secs: f64 },
    MatchStarted,
    MatchEnded,
    /// Raid server endpoint seen in the connection chatter.
    ServerAddress { address: String },
}

/// Recognize a single log line.
///
/// Order-insensitive and side-effect-free; the overwhelming majority of
/// lines return `None`.
pub fn parse_line(line: &str) -> Option<LogEvent> {
    if let Some(rest) = find_after(line, SCENE_PRESET_MARKER) {
        return parse_scene_preset(rest);
    }
    if line.contains(GAME_CREATE_MARKER) {
        return Some(parse_game_create(line));
    }
    if let Some(rest) = find_after(line, MATCHING_COMPLETED_MARKER) {
        return parse_matching_completed(rest);
    }
    if line.contains(GAME_STARTED_MARKER) {
        return Some(LogEvent::MatchStarted);
    }
    if line.contains(MATCH_OVER_MARKER) {
        return Some(LogEvent::MatchEnded);
    }
    parse_server_address(line)
}

fn find_after<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.find(marker).map(|pos| &line[pos + marker.len()..])
}

fn parse_scene_preset(rest: &str) -> Option<LogEvent> {
    let bundle_end = rest.find(".bundle")?;
    let bundle = &rest[..bundle_end];
    if !bundle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    // Unknown bundles (menu scenes, hideout) are noise, not errors.
    let map_id = map_id_for_bundle(bundle)?;
    Some(LogEvent::MapLoaded {
        map_id: map_id.to_string(),
    })
}

fn parse_game_create(line: &str) -> LogEvent {
    let location = find_after(line, "Location: ").map(|rest| {
        rest.split(|c: char| c == ',' || c.is_whitespace())
            .next()
            .unwrap_or("")
            .to_string()
    });
    let location = location.filter(|l| !l.is_empty());

    // Raid short ids are exactly six uppercase alphanumerics.
    let short_id = find_after(line, "shortId: ")
        .map(|rest| {
            rest.chars()
                .take_while(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
                .collect::<String>()
        })
        .filter(|id| id.len() == 6);

    LogEvent::MatchCreated {
        location,
        short_id,
        online: line.contains("RaidMode: Online"),
    }
}

fn parse_matching_completed(rest: &str) -> Option<LogEvent> {
    let value = find_after(rest, "real:")?;
    let end = value
        .find(|c: char| !c.is_ascii_digit() && c != '.' && c != ',')
        .unwrap_or(value.len());
    // Some locales log the queue time with a decimal comma.
    let normalized = value[..end].replace(',', ".");
    let queue_secs = normalized.parse::<f64>().ok()?;
    Some(LogEvent::MatchingCompleted { queue_secs })
}

fn parse_server_address(line: &str) -> Option<LogEvent> {
    for prefix in ADDRESS_PREFIXES {
        let Some(rest) = find_after(line, prefix) else {
            continue;
        };
        let end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        let candidate = &rest[..end];
        let Ok(addr) = candidate.parse::<Ipv4Addr>() else {
            continue;
        };
        // Loopback and LAN addresses show up for offline raids; only a
        // public endpoint identifies the raid server.
        if addr.is_loopback() || candidate.starts_with("192.168.") {
            continue;
        }
        return Some(LogEvent::ServerAddress {
            address: candidate.to_string(),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_preset_maps_bundle_to_map_id() {
        let line =
            "2024-12-05 14:30:00|  application|scene preset path:maps/customs_preset.bundle";
        assert_eq!(
            parse_line(line),
            Some(LogEvent::MapLoaded {
                map_id: "bigmap".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_bundle_is_ignored() {
        let line = "2024-12-05 14:30:00|  application|scene preset path:maps/hideout_preset.bundle";
        assert_eq!(parse_line(line), None);
    }

    #[test]
    fn test_game_create_full_line() {
        let line = "2024-12-05 14:30:35|  application|TRACE-NetworkGameCreate profileStatus Location: bigmap, Sid: x, RaidMode: Online, shortId: ABC123, Side: Pmc";
        assert_eq!(
            parse_line(line),
            Some(LogEvent::MatchCreated {
                location: Some("bigmap".to_string()),
                short_id: Some("ABC123".to_string()),
                online: true,
            })
        );
    }

    #[test]
    fn test_game_create_missing_fields() {
        let line = "ts|  application|TRACE-NetworkGameCreate profileStatus RaidMode: Local";
        assert_eq!(
            parse_line(line),
            Some(LogEvent::MatchCreated {
                location: None,
                short_id: None,
                online: false,
            })
        );
    }

    #[test]
    fn test_malformed_short_id_dropped() {
        let line = "ts| TRACE-NetworkGameCreate profileStatus shortId: AB12, Location: Woods";
        assert_eq!(
            parse_line(line),
            Some(LogEvent::MatchCreated {
                location: Some("Woods".to_string()),
                short_id: None,
                online: false,
            })
        );
    }

    #[test]
    fn test_matching_completed_queue_time() {
        let line = "ts|  application|MatchingCompleted:12.5 real:5.1";
        assert_eq!(
            parse_line(line),
            Some(LogEvent::MatchingCompleted { queue_secs: 5.1 })
        );
    }

    #[test]
    fn test_matching_completed_decimal_comma() {
        let line = "ts|  application|MatchingCompleted:12,5 real:5,25 more";
        assert_eq!(
            parse_line(line),
            Some(LogEvent::MatchingCompleted { queue_secs: 5.25 })
        );
    }

    #[test]
    fn test_match_start_and_end() {
        assert_eq!(parse_line("ts|  application|GameStarted"), Some(LogEvent::MatchStarted));
        assert_eq!(parse_line("ts|  application|UserMatchOver"), Some(LogEvent::MatchEnded));
    }

    #[test]
    fn test_server_address_public() {
        let line = "ts|  network|Ip: 203.0.113.7, Port: 17000";
        assert_eq!(
            parse_line(line),
            Some(LogEvent::ServerAddress {
                address: "203.0.113.7".to_string()
            })
        );
    }

    #[test]
    fn test_server_address_private_excluded() {
        assert_eq!(parse_line("ts|  network|Ip: 192.168.1.20, Port: 17000"), None);
        assert_eq!(parse_line("ts|  network|Server: 127.0.0.1"), None);
    }

    #[test]
    fn test_noise_lines_are_none() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("2024-12-05 14:30:01|  application|NAT punch success"), None);
        assert_eq!(parse_line("garbage \u{fffd} bytes"), None);
    }

    #[test]
    fn test_bundle_table() {
        assert_eq!(map_id_for_bundle("woods_preset"), Some("Woods"));
        assert_eq!(map_id_for_bundle("shopping_mall"), Some("Interchange"));
        assert_eq!(map_id_for_bundle("nope"), None);
        assert_eq!(display_name_for_map("bigmap"), "Customs");
        assert_eq!(display_name_for_map("SomethingNew"), "SomethingNew");
    }
}
