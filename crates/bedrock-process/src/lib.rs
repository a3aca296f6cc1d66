use std::fmt;

/// Identifies one run of a world. Starting a stopped world again yields a new id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WorldState {
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WorldStatus {
    pub name: String,
    pub world_id: i32,
    pub port: u16,
    pub run_id: RunId,
    pub state: WorldState,
    pub pid: Option<u32>,
    pub started_at_unix_ms: u64,
}

/// Bedrock `permissions.json` levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Visitor,
    Member,
    Operator,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::Visitor => "visitor",
            PermissionLevel::Member => "member",
            PermissionLevel::Operator => "operator",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PermissionRecord {
    pub xuid: String,
    pub permission: PermissionLevel,
}

/// One entry of Bedrock's `allowlist.json`.
///
/// The server itself may write name-only entries, so `xuid` tolerates absence.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AllowlistRecord {
    #[serde(default)]
    pub xuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "ignoresPlayerLimit", default)]
    pub ignores_player_limit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Survival,
    Creative,
    Adventure,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Survival => "survival",
            GameMode::Creative => "creative",
            GameMode::Adventure => "adventure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Peaceful,
    Easy,
    Normal,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Peaceful => "peaceful",
            Difficulty::Easy => "easy",
            Difficulty::Normal => "normal",
            Difficulty::Hard => "hard",
        }
    }
}

/// Settings applied to a world's `server.properties` when it is created or edited.
///
/// Zero numbers and an empty seed leave the template value in place.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WorldSettings {
    pub name: String,
    #[serde(default)]
    pub port: u16,
    pub game_mode: GameMode,
    #[serde(rename = "difficult")]
    pub difficulty: Difficulty,
    #[serde(rename = "allow_cheats", default)]
    pub allow_cheats: bool,
    #[serde(default)]
    pub view_distance: u32,
    #[serde(default)]
    pub seed: Option<String>,
    #[serde(rename = "max_player", default)]
    pub max_players: u32,
    #[serde(rename = "permission_player")]
    pub default_permission: PermissionLevel,
}

/// Partial update of a world. Absent fields, blank strings and zero numbers
/// leave the stored value alone.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct WorldEdit {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub port: u16,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub game_mode: Option<GameMode>,
    #[serde(rename = "difficult", default, deserialize_with = "blank_as_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub allow_cheats: Option<bool>,
    #[serde(default)]
    pub view_distance: u32,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub seed: Option<String>,
    #[serde(rename = "max_player", default)]
    pub max_players: u32,
    #[serde(rename = "permission_player", default, deserialize_with = "blank_as_none")]
    pub default_permission: Option<PermissionLevel>,
}

impl WorldEdit {
    /// Name the world has once this edit is applied.
    pub fn target_name<'a>(&'a self, current: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(current)
    }
}

impl From<&WorldSettings> for WorldEdit {
    fn from(s: &WorldSettings) -> Self {
        Self {
            name: Some(s.name.clone()),
            port: s.port,
            game_mode: Some(s.game_mode),
            difficulty: Some(s.difficulty),
            allow_cheats: Some(s.allow_cheats),
            view_distance: s.view_distance,
            seed: s.seed.clone().filter(|v| !v.trim().is_empty()),
            max_players: s.max_players,
            default_permission: Some(s.default_permission),
        }
    }
}

// `""` and `null` both mean "not provided"; anything else must parse as `T`.
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    use serde::{Deserialize, de::IntoDeserializer};

    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let value: serde::de::value::StrDeserializer<'_, D::Error> = raw.into_deserializer();
    T::deserialize(value).map(Some)
}
