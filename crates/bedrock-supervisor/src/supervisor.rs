use std::sync::Arc;

use bedrock_process::{
    AllowlistRecord, PermissionLevel, PermissionRecord, WorldEdit, WorldSettings, WorldState,
    WorldStatus,
};
use tokio::sync::oneshot;

use crate::{
    config::{SupervisorConfig, format_error_chain},
    documents::DocumentStore,
    error::{Result, SupervisorError},
    metadata::MetadataStore,
    provision,
    reactor::Reactor,
    registry::{ProcessRegistry, RunScoped},
    tailer,
    world_process::WorldProcess,
};

/// Entry point for everything that touches a world: its process, its
/// documents and its directory.
#[derive(Clone)]
pub struct Supervisor {
    config: Arc<SupervisorConfig>,
    registry: ProcessRegistry,
    metadata: Arc<dyn MetadataStore>,
    documents: Arc<DocumentStore>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            config: Arc::new(config),
            registry: ProcessRegistry::default(),
            metadata,
            documents: Arc::new(DocumentStore::default()),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub async fn start_world(&self, name: &str, port: u16, world_id: i32) -> Result<WorldStatus> {
        let dir = self.config.world_dir(name)?;
        if self.registry.contains(name).await {
            return Err(SupervisorError::AlreadyRunning(name.to_string()));
        }
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(SupervisorError::LaunchFailed {
                world: name.to_string(),
                reason: format!("world dir {} does not exist", dir.display()),
            });
        }

        let (process, lines) = WorldProcess::launch(&self.config, name, &dir, port, world_id).await?;
        let process = Arc::new(process);
        let reactor = Reactor::new(
            world_id,
            self.metadata.clone(),
            self.config.default_role.clone(),
        );

        let (registered_tx, registered_rx) = oneshot::channel();
        tokio::spawn(tailer::run(
            process.clone(),
            lines,
            reactor,
            self.registry.clone(),
            registered_rx,
        ));

        // Dropping the sender tells the tailer to kill the losing child.
        self.registry.register(name, process.clone()).await?;
        let _ = registered_tx.send(());

        let status = process.status();
        tracing::info!(
            world = name,
            run_id = %status.run_id,
            pid = ?status.pid,
            port,
            "world started"
        );
        Ok(status)
    }

    pub async fn stop_world(&self, name: &str) -> Result<()> {
        let process = self.registry.lookup(name).await?;
        process.set_state(WorldState::Stopping);
        if let Err(source) = process.kill().await {
            process.set_state(WorldState::Running);
            return Err(SupervisorError::KillFailed {
                world: name.to_string(),
                source,
            });
        }
        self.registry.remove_run(name, process.run_id()).await;
        tracing::info!(world = name, run_id = %process.run_id(), "stop requested");
        Ok(())
    }

    pub async fn send_command(&self, name: &str, text: &str) -> Result<()> {
        let process = self.registry.lookup(name).await?;
        process.send(text).await
    }

    pub async fn kick_player(&self, name: &str, player: &str) -> Result<()> {
        self.send_command(name, &format!("kick {}", quoted(player)))
            .await
    }

    pub async fn ban_player(&self, name: &str, player: &str) -> Result<()> {
        self.send_command(name, &format!("ban {}", quoted(player)))
            .await
    }

    pub async fn get_logs(&self, name: &str) -> Result<Vec<String>> {
        let process = self.registry.lookup(name).await?;
        Ok(process.logs().await)
    }

    pub async fn status(&self, name: &str) -> Result<WorldStatus> {
        Ok(self.registry.lookup(name).await?.status())
    }

    pub async fn list_running(&self) -> Vec<WorldStatus> {
        let mut out: Vec<WorldStatus> = self
            .registry
            .snapshot()
            .await
            .iter()
            .map(|p| p.status())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub async fn is_running(&self, name: &str) -> bool {
        self.registry.contains(name).await
    }

    /// Kills every running world. Used when the service shuts down.
    pub async fn shutdown_all(&self) {
        for process in self.registry.snapshot().await {
            process.set_state(WorldState::Stopping);
            if let Err(err) = process.kill().await {
                tracing::warn!(world = %process.name(), %err, "failed to kill world on shutdown");
                continue;
            }
            self.registry
                .remove_run(process.name(), process.run_id())
                .await;
        }
    }

    pub async fn upsert_permission(
        &self,
        world: &str,
        xuid: &str,
        permission: PermissionLevel,
    ) -> Result<()> {
        let dir = self.config.world_dir(world)?;
        let record = PermissionRecord {
            xuid: xuid.to_string(),
            permission,
        };
        self.documents.upsert(world, &dir, record).await
    }

    pub async fn remove_permission(&self, world: &str, xuid: &str) -> Result<()> {
        let dir = self.config.world_dir(world)?;
        self.documents
            .remove::<PermissionRecord>(world, &dir, xuid)
            .await
    }

    pub async fn list_permissions(&self, world: &str) -> Result<Vec<PermissionRecord>> {
        let dir = self.config.world_dir(world)?;
        self.documents.list(world, &dir).await
    }

    pub async fn upsert_allowlist(&self, world: &str, record: AllowlistRecord) -> Result<()> {
        let dir = self.config.world_dir(world)?;
        self.documents.upsert(world, &dir, record).await
    }

    pub async fn remove_allowlist(&self, world: &str, xuid: &str) -> Result<()> {
        let dir = self.config.world_dir(world)?;
        self.documents
            .remove::<AllowlistRecord>(world, &dir, xuid)
            .await
    }

    pub async fn list_allowlist(&self, world: &str) -> Result<Vec<AllowlistRecord>> {
        let dir = self.config.world_dir(world)?;
        self.documents.list(world, &dir).await
    }

    /// Lays out a fresh world directory from the template.
    pub async fn create_world(&self, settings: &WorldSettings) -> Result<()> {
        let dir = self.config.world_dir(&settings.name)?;
        self.ensure_stopped(&settings.name).await?;
        provision::create_world_dir(&self.config.template_dir, &dir, settings)
            .await
            .map_err(|err| provision_error(&settings.name, err))?;
        tracing::info!(world = %settings.name, dir = %dir.display(), "world created");
        Ok(())
    }

    /// Applies a partial edit to a stopped world, renaming its directory when
    /// the name changes.
    pub async fn edit_world(&self, current_name: &str, edit: &WorldEdit) -> Result<()> {
        let target_name = edit.target_name(current_name);
        let current_dir = self.config.world_dir(current_name)?;
        let new_dir = self.config.world_dir(target_name)?;
        self.ensure_stopped(current_name).await?;
        self.ensure_stopped(target_name).await?;
        if !tokio::fs::try_exists(&current_dir).await.unwrap_or(false) {
            return Err(SupervisorError::NotFound(format!("world {current_name}")));
        }

        if current_name != target_name {
            provision::rename_world_dir(&current_dir, &new_dir)
                .await
                .map_err(|err| provision_error(current_name, err))?;
        }
        provision::rewrite_properties_file(&new_dir, edit)
            .await
            .map_err(|err| provision_error(target_name, err))?;
        tracing::info!(world = target_name, previous = current_name, "world edited");
        Ok(())
    }

    pub async fn delete_world(&self, name: &str) -> Result<()> {
        let dir = self.config.world_dir(name)?;
        self.ensure_stopped(name).await?;
        provision::remove_world_dir(&dir)
            .await
            .map_err(|err| provision_error(name, err))?;
        tracing::info!(world = name, "world deleted");
        Ok(())
    }

    async fn ensure_stopped(&self, name: &str) -> Result<()> {
        if self.registry.contains(name).await {
            return Err(SupervisorError::AlreadyRunning(name.to_string()));
        }
        Ok(())
    }
}

fn quoted(player: &str) -> String {
    format!("\"{}\"", player.replace('"', ""))
}

fn provision_error(world: &str, err: anyhow::Error) -> SupervisorError {
    SupervisorError::Provision {
        world: world.to_string(),
        reason: format_error_chain(&err),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{path::PathBuf, time::Duration};

    use bedrock_process::{Difficulty, GameMode};

    use super::*;
    use crate::metadata::testing::FakeMetadata;

    struct Fixture {
        _root: tempfile::TempDir,
        sup: Supervisor,
        fake: Arc<FakeMetadata>,
    }

    fn fixture(binary: &str, worlds: &[&str]) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        for w in worlds {
            std::fs::create_dir_all(root.path().join("servers").join(w)).unwrap();
        }
        let config = SupervisorConfig {
            data_root: root.path().to_path_buf(),
            server_binary: PathBuf::from(binary),
            template_dir: root.path().join("template"),
            log_max_lines: 100,
            default_role: "bocil".to_string(),
        };
        let fake = Arc::new(FakeMetadata::with_role("456", "admin"));
        let sup = Supervisor::new(config, fake.clone());
        Fixture {
            _root: root,
            sup,
            fake,
        }
    }

    async fn wait_for_log(sup: &Supervisor, world: &str, needle: &str) -> Vec<String> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let logs = sup.get_logs(world).await.unwrap();
                if logs.iter().any(|l| l.contains(needle)) {
                    return logs;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("{needle:?} never showed up in {world} logs"))
    }

    async fn wait_until_gone(sup: &Supervisor, world: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while sup.is_running(world).await {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("{world} is still registered"));
    }

    #[tokio::test]
    async fn unknown_world_operations_are_not_found() {
        let f = fixture("/bin/cat", &[]);
        assert!(matches!(
            f.sup.stop_world("ghost").await,
            Err(SupervisorError::NotFound(_))
        ));
        assert!(matches!(
            f.sup.send_command("ghost", "list").await,
            Err(SupervisorError::NotFound(_))
        ));
        assert!(matches!(
            f.sup.get_logs("ghost").await,
            Err(SupervisorError::NotFound(_))
        ));
        assert!(f.sup.list_running().await.is_empty());
    }

    #[tokio::test]
    async fn start_rejects_bad_names_and_missing_dirs() {
        let f = fixture("/bin/cat", &[]);
        for bad in ["", "../x", "a/b"] {
            assert!(matches!(
                f.sup.start_world(bad, 19132, 1).await,
                Err(SupervisorError::InvalidWorldName(_))
            ));
        }
        assert!(matches!(
            f.sup.start_world("nodir", 19132, 1).await,
            Err(SupervisorError::LaunchFailed { .. })
        ));
    }

    #[tokio::test]
    async fn missing_binary_is_launch_failed_and_not_registered() {
        let f = fixture("/nonexistent/bedrock_server", &["alpha"]);
        assert!(matches!(
            f.sup.start_world("alpha", 19132, 1).await,
            Err(SupervisorError::LaunchFailed { .. })
        ));
        assert!(!f.sup.is_running("alpha").await);
    }

    #[tokio::test]
    async fn echoed_spawn_line_drives_reactive_commands() {
        // `cat` echoes every command back, so written commands show up as output.
        let f = fixture("/bin/cat", &["alpha"]);
        let status = f.sup.start_world("alpha", 19132, 5).await.unwrap();
        assert_eq!(status.state, WorldState::Running);
        assert!(matches!(
            f.sup.start_world("alpha", 19132, 5).await,
            Err(SupervisorError::AlreadyRunning(_))
        ));

        f.sup
            .send_command("alpha", "[INFO] Player connected: Steve, xuid: 123")
            .await
            .unwrap();
        f.sup
            .send_command("alpha", "[INFO] Player Spawned: Steve xuid: 123, pfid: x")
            .await
            .unwrap();
        let logs = wait_for_log(&f.sup, "alpha", "joined the world").await;

        let tag = logs.iter().position(|l| l == "tag Steve add BOCIL").unwrap();
        let score = logs
            .iter()
            .position(|l| l == "scoreboard players set Steve role 1")
            .unwrap();
        assert!(tag < score);
        assert_eq!(
            f.fake.ensured(),
            vec![(5, "123".to_string(), "Steve".to_string())]
        );

        f.sup
            .send_command("alpha", "Player connected: Alex, xuid: 456")
            .await
            .unwrap();
        f.sup
            .send_command("alpha", "[INFO] [Chat] Alex: hi")
            .await
            .unwrap();
        wait_for_log(&f.sup, "alpha", "[ADMIN] Alex: hi").await;

        f.sup.stop_world("alpha").await.unwrap();
        assert!(matches!(
            f.sup.status("alpha").await,
            Err(SupervisorError::NotFound(_))
        ));
        assert!(matches!(
            f.sup.stop_world("alpha").await,
            Err(SupervisorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn kick_and_ban_quote_the_player() {
        let f = fixture("/bin/cat", &["alpha"]);
        f.sup.start_world("alpha", 19132, 1).await.unwrap();
        f.sup.kick_player("alpha", "Steve \"Jobs\"").await.unwrap();
        f.sup.ban_player("alpha", "Griefer").await.unwrap();
        let logs = wait_for_log(&f.sup, "alpha", "ban ").await;
        assert!(logs.contains(&"kick \"Steve Jobs\"".to_string()));
        assert!(logs.contains(&"ban \"Griefer\"".to_string()));
        f.sup.shutdown_all().await;
        assert!(f.sup.list_running().await.is_empty());
    }

    #[tokio::test]
    async fn world_exiting_on_its_own_can_be_started_again() {
        // `sh` reads its script from stdin.
        let f = fixture("/bin/sh", &["alpha"]);
        let first = f.sup.start_world("alpha", 19132, 1).await.unwrap();
        f.sup.send_command("alpha", "echo booted").await.unwrap();
        wait_for_log(&f.sup, "alpha", "booted").await;
        f.sup.send_command("alpha", "exit 3").await.unwrap();
        wait_until_gone(&f.sup, "alpha").await;

        let second = f.sup.start_world("alpha", 19132, 1).await.unwrap();
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(f.sup.list_running().await.len(), 1);
        f.sup.stop_world("alpha").await.unwrap();
    }

    #[tokio::test]
    async fn documents_and_provisioning_refuse_running_worlds() {
        let f = fixture("/bin/cat", &[]);
        let template = f.sup.config().template_dir.clone();
        std::fs::create_dir_all(&template).unwrap();
        std::fs::write(
            template.join("server.properties"),
            "server-name=x\nlevel-name=x\ngamemode=survival\n",
        )
        .unwrap();

        let settings = WorldSettings {
            name: "alpha".to_string(),
            port: 19140,
            game_mode: GameMode::Adventure,
            difficulty: Difficulty::Normal,
            allow_cheats: false,
            view_distance: 0,
            seed: None,
            max_players: 0,
            default_permission: PermissionLevel::Member,
        };
        f.sup.create_world(&settings).await.unwrap();
        f.sup
            .upsert_permission("alpha", "42", PermissionLevel::Operator)
            .await
            .unwrap();
        assert_eq!(f.sup.list_permissions("alpha").await.unwrap().len(), 1);

        f.sup.start_world("alpha", 19140, 1).await.unwrap();
        assert!(matches!(
            f.sup.delete_world("alpha").await,
            Err(SupervisorError::AlreadyRunning(_))
        ));
        f.sup.stop_world("alpha").await.unwrap();

        let rename_only = WorldEdit {
            name: Some("beta".to_string()),
            ..WorldEdit::default()
        };
        f.sup.edit_world("alpha", &rename_only).await.unwrap();
        let props = std::fs::read_to_string(
            f.sup.config().world_dir("beta").unwrap().join("server.properties"),
        )
        .unwrap();
        assert!(props.contains("level-name=beta"));
        assert!(props.contains("gamemode=adventure"));
        assert_eq!(f.sup.list_permissions("beta").await.unwrap().len(), 1);
        assert!(matches!(
            f.sup.list_permissions("alpha").await,
            Err(SupervisorError::NotFound(_))
        ));

        f.sup.delete_world("beta").await.unwrap();
        f.sup.delete_world("beta").await.unwrap();
    }
}
