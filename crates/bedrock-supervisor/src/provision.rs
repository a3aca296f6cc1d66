use std::path::{Path, PathBuf};

use anyhow::Context;
use bedrock_process::{AllowlistRecord, PermissionRecord, WorldEdit, WorldSettings};

use crate::documents::ensure_document;

const PROPERTIES_FILE: &str = "server.properties";

/// Applies `edit` to the text of a `server.properties` file. Keys the edit
/// leaves unset, comments and line endings are left untouched.
pub fn render_properties(existing: &str, edit: &WorldEdit) -> String {
    existing
        .split('\n')
        .map(|line| {
            let (body, cr) = match line.strip_suffix('\r') {
                Some(body) => (body, "\r"),
                None => (line, ""),
            };
            let Some((key, _)) = body.split_once('=') else {
                return line.to_string();
            };
            let key = key.trim();
            match property_value(key, edit) {
                Some(value) => format!("{key}={value}{cr}"),
                None => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn property_value(key: &str, s: &WorldEdit) -> Option<String> {
    match key {
        "server-name" | "level-name" => s.name.clone(),
        "gamemode" => s.game_mode.map(|v| v.as_str().to_string()),
        "difficulty" => s.difficulty.map(|v| v.as_str().to_string()),
        "max-players" if s.max_players != 0 => Some(s.max_players.to_string()),
        "allow-cheats" => s.allow_cheats.map(|v| v.to_string()),
        "level-seed" => s
            .seed
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string),
        "default-player-permission-level" => s.default_permission.map(|v| v.as_str().to_string()),
        "view-distance" if s.view_distance != 0 => Some(s.view_distance.to_string()),
        "server-port" | "server-portv6" if s.port != 0 => Some(s.port.to_string()),
        _ => None,
    }
}

/// Replaces `dir` with a fresh copy of `template` configured for `settings`.
pub(crate) async fn create_world_dir(
    template: &Path,
    dir: &Path,
    settings: &WorldSettings,
) -> anyhow::Result<()> {
    let template = template.to_path_buf();
    let target = dir.to_path_buf();
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        if !template.is_dir() {
            anyhow::bail!("world template {} does not exist", template.display());
        }
        if target.exists() {
            std::fs::remove_dir_all(&target)
                .with_context(|| format!("remove old world dir {}", target.display()))?;
        }
        copy_dir(&template, &target)
    })
    .await
    .context("join template copy")??;

    rewrite_properties_file(dir, &WorldEdit::from(settings)).await?;
    ensure_document::<PermissionRecord>(dir)
        .await
        .context("initialise permissions.json")?;
    ensure_document::<AllowlistRecord>(dir)
        .await
        .context("initialise allowlist.json")?;
    Ok(())
}

pub(crate) async fn rewrite_properties_file(dir: &Path, edit: &WorldEdit) -> anyhow::Result<()> {
    let path = dir.join(PROPERTIES_FILE);
    let existing = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    let rendered = render_properties(&existing, edit);

    let tmp = dir.join("server.properties.tmp");
    tokio::fs::write(&tmp, rendered)
        .await
        .with_context(|| format!("write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, &path)
        .await
        .with_context(|| format!("persist {}", path.display()))?;
    Ok(())
}

pub(crate) async fn rename_world_dir(from: &Path, to: &Path) -> anyhow::Result<()> {
    if tokio::fs::try_exists(to).await.unwrap_or(false) {
        anyhow::bail!("world dir {} already exists", to.display());
    }
    tokio::fs::rename(from, to)
        .await
        .with_context(|| format!("rename {} to {}", from.display(), to.display()))
}

/// Removes a world directory. A directory that is already gone is fine.
pub(crate) async fn remove_world_dir(dir: &Path) -> anyhow::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove world dir {}", dir.display())),
    }
}

// Recursive copy; `std::fs::copy` keeps the executable bit of the server binary.
fn copy_dir(src: &Path, dst: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dst).with_context(|| format!("create {}", dst.display()))?;
    for entry in std::fs::read_dir(src).with_context(|| format!("read {}", src.display()))? {
        let entry = entry?;
        let from: PathBuf = entry.path();
        let to = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)
                .with_context(|| format!("copy {} to {}", from.display(), to.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use bedrock_process::{Difficulty, GameMode, PermissionLevel};

    use super::*;

    const TEMPLATE: &str = "# Bedrock server\r\nserver-name=Dedicated Server\r\ngamemode=survival\r\ndifficulty=easy\r\nallow-cheats=false\r\nmax-players=10\r\nlevel-name=Bedrock level\r\nlevel-seed=\r\ndefault-player-permission-level=member\r\nview-distance=32\r\nserver-port=19132\r\nserver-portv6=19133\r\nonline-mode=true\r\n";

    fn settings() -> WorldSettings {
        WorldSettings {
            name: "alpha".to_string(),
            port: 19140,
            game_mode: GameMode::Creative,
            difficulty: Difficulty::Hard,
            allow_cheats: true,
            view_distance: 0,
            seed: Some("424242".to_string()),
            max_players: 20,
            default_permission: PermissionLevel::Visitor,
        }
    }

    #[test]
    fn known_keys_are_replaced_and_others_kept() {
        let out = render_properties(TEMPLATE, &WorldEdit::from(&settings()));
        assert!(out.contains("server-name=alpha\r\n"));
        assert!(out.contains("level-name=alpha\r\n"));
        assert!(out.contains("gamemode=creative\r\n"));
        assert!(out.contains("difficulty=hard\r\n"));
        assert!(out.contains("allow-cheats=true\r\n"));
        assert!(out.contains("max-players=20\r\n"));
        assert!(out.contains("level-seed=424242\r\n"));
        assert!(out.contains("default-player-permission-level=visitor\r\n"));
        assert!(out.contains("server-port=19140\r\n"));
        assert!(out.contains("server-portv6=19140\r\n"));
        // zero view distance keeps the template value
        assert!(out.contains("view-distance=32\r\n"));
        assert!(out.contains("online-mode=true\r\n"));
        assert!(out.starts_with("# Bedrock server\r\n"));
        assert!(out.ends_with("\r\n"));
    }

    #[test]
    fn empty_seed_and_zero_port_leave_template_values() {
        let mut s = settings();
        s.seed = Some(String::new());
        s.port = 0;
        s.max_players = 0;
        let out = render_properties(
            "level-seed=abc\nserver-port=19132\nmax-players=10",
            &WorldEdit::from(&s),
        );
        assert_eq!(out, "level-seed=abc\nserver-port=19132\nmax-players=10");
    }

    #[test]
    fn partial_edit_only_touches_provided_keys() {
        let edit = WorldEdit {
            name: Some("beta".to_string()),
            port: 19133,
            ..WorldEdit::default()
        };
        let out = render_properties(TEMPLATE, &edit);
        assert!(out.contains("server-name=beta\r\n"));
        assert!(out.contains("server-port=19133\r\n"));
        assert!(out.contains("gamemode=survival\r\n"));
        assert!(out.contains("difficulty=easy\r\n"));
        assert!(out.contains("allow-cheats=false\r\n"));
        assert!(out.contains("default-player-permission-level=member\r\n"));
        assert!(out.contains("max-players=10\r\n"));

        assert_eq!(render_properties(TEMPLATE, &WorldEdit::default()), TEMPLATE);
    }

    #[tokio::test]
    async fn create_copies_template_and_initialises_documents() {
        let root = tempfile::tempdir().unwrap();
        let template = root.path().join("template");
        std::fs::create_dir_all(template.join("behavior_packs/vanilla")).unwrap();
        std::fs::write(template.join("server.properties"), TEMPLATE).unwrap();
        std::fs::write(template.join("behavior_packs/vanilla/manifest.json"), "{}").unwrap();

        let dir = root.path().join("servers/alpha");
        create_world_dir(&template, &dir, &settings()).await.unwrap();

        let props = std::fs::read_to_string(dir.join("server.properties")).unwrap();
        assert!(props.contains("level-name=alpha"));
        assert!(dir.join("behavior_packs/vanilla/manifest.json").is_file());
        assert_eq!(
            std::fs::read_to_string(dir.join("permissions.json")).unwrap().trim(),
            "[]"
        );
        assert!(dir.join("allowlist.json").is_file());
    }

    #[tokio::test]
    async fn create_without_template_fails() {
        let root = tempfile::tempdir().unwrap();
        let err = create_world_dir(
            &root.path().join("missing"),
            &root.path().join("servers/alpha"),
            &settings(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn remove_of_absent_dir_is_ok() {
        let root = tempfile::tempdir().unwrap();
        remove_world_dir(&root.path().join("gone")).await.unwrap();
    }
}
