use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{config::format_error_chain, events::DomainEvent, metadata::MetadataStore};

/// Maps detected events to roster updates and the commands written back into
/// the world.
///
/// Chat lines only carry the speaker's name, so the xuid announced by the
/// connect/spawn lines is remembered per name for the lifetime of the run.
#[derive(Clone)]
pub struct Reactor {
    world_id: i32,
    metadata: Arc<dyn MetadataStore>,
    default_role: String,
    xuids: Arc<Mutex<HashMap<String, String>>>,
}

impl Reactor {
    pub fn new(world_id: i32, metadata: Arc<dyn MetadataStore>, default_role: String) -> Self {
        Self {
            world_id,
            metadata,
            default_role,
            xuids: Arc::default(),
        }
    }

    fn remember(&self, name: &str, xuid: &str) {
        let mut xuids = self.xuids.lock().unwrap_or_else(|e| e.into_inner());
        xuids.insert(name.to_string(), xuid.to_string());
    }

    fn xuid_of(&self, name: &str) -> Option<String> {
        let xuids = self.xuids.lock().unwrap_or_else(|e| e.into_inner());
        xuids.get(name).cloned()
    }

    /// Commands to send for `event`, in order. Store failures are logged and
    /// never abort the reaction.
    pub async fn react(&self, world: &str, event: &DomainEvent) -> Vec<String> {
        match event {
            DomainEvent::PlayerConnected { name, xuid } => {
                self.remember(name, xuid);
                if let Err(err) = self.metadata.ensure_player(self.world_id, xuid, name).await {
                    tracing::warn!(
                        world,
                        xuid = %xuid,
                        error = %format_error_chain(&err),
                        "roster upsert failed"
                    );
                }
                Vec::new()
            }
            DomainEvent::PlayerSpawned { display_name, xuid } => {
                self.remember(display_name, xuid);
                let role = self.role_for(world, xuid).await;
                spawn_commands(&role, display_name).to_vec()
            }
            DomainEvent::ChatMessage { player, text } => {
                let role = match self.xuid_of(player) {
                    Some(xuid) => self.role_for(world, &xuid).await,
                    None => self.default_role.clone(),
                };
                vec![chat_relay_command(&role, player, text)]
            }
        }
    }

    async fn role_for(&self, world: &str, xuid: &str) -> String {
        match self.metadata.role_of(self.world_id, xuid).await {
            Ok(Some(role)) if !role.trim().is_empty() => role.trim().to_string(),
            Ok(_) => self.default_role.clone(),
            Err(err) => {
                tracing::warn!(
                    world,
                    xuid,
                    error = %format_error_chain(&err),
                    "role lookup failed, using default role"
                );
                self.default_role.clone()
            }
        }
    }
}

/// Player names with spaces must be quoted to survive command parsing.
pub fn quote_player(name: &str) -> String {
    if name.contains(' ') {
        format!("\"{name}\"")
    } else {
        name.to_string()
    }
}

pub fn spawn_commands(role: &str, display_name: &str) -> [String; 3] {
    let role = role.to_uppercase();
    let player = quote_player(display_name);
    [
        format!("tag {player} add {role}"),
        format!("scoreboard players set {player} role 1"),
        tellraw(&format!("[{role}] {player} joined the world")),
    ]
}

pub fn chat_relay_command(role: &str, player: &str, text: &str) -> String {
    let role = role.to_uppercase();
    tellraw(&format!("[{role}] {}: {text}", quote_player(player)))
}

fn tellraw(text: &str) -> String {
    let payload = serde_json::json!({ "rawtext": [{ "text": text }] });
    format!("tellraw @a {payload}")
}
