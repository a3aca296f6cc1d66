//! Detection of player activity in Bedrock server output.
//!
//! The server prints free-form text; lines that do not have the exact shape
//! below are simply not events.

const CONNECTED_MARKER: &str = "Player connected:";
const CONNECTED_SEPARATOR: &str = ", xuid: ";
const SPAWNED_MARKER: &str = "Player Spawned:";
const SPAWNED_SEPARATOR: &str = " xuid: ";
const CHAT_MARKER: &str = "] [Chat]";
const CHAT_SEPARATOR: &str = ": ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    PlayerConnected { name: String, xuid: String },
    PlayerSpawned { display_name: String, xuid: String },
    ChatMessage { player: String, text: String },
}

/// Classifies one output line. Markers are checked in order and the first one
/// present decides how the line is read.
pub fn parse_line(line: &str) -> Option<DomainEvent> {
    if let Some((_, rest)) = line.split_once(CONNECTED_MARKER) {
        let (name, tail) = rest.split_once(CONNECTED_SEPARATOR)?;
        let xuid = xuid_field(tail)?;
        return Some(DomainEvent::PlayerConnected {
            name: name.trim().to_string(),
            xuid,
        });
    }

    if let Some((_, rest)) = line.split_once(SPAWNED_MARKER) {
        let (name, tail) = rest.split_once(SPAWNED_SEPARATOR)?;
        let display_name = name.trim();
        if display_name.is_empty() {
            return None;
        }
        let xuid = xuid_field(tail)?;
        return Some(DomainEvent::PlayerSpawned {
            display_name: display_name.to_string(),
            xuid,
        });
    }

    if let Some((_, rest)) = line.split_once(CHAT_MARKER) {
        let (speaker, text) = rest.split_once(CHAT_SEPARATOR)?;
        let player = speaker.trim();
        if player.is_empty() {
            return None;
        }
        return Some(DomainEvent::ChatMessage {
            player: player.to_string(),
            text: text.to_string(),
        });
    }

    None
}

// The xuid runs up to the first comma (`..., pfid: ...` follows on real servers).
fn xuid_field(tail: &str) -> Option<String> {
    let raw = tail.split(',').next().unwrap_or_default().trim();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}
