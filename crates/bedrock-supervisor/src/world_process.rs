use std::{
    collections::VecDeque,
    path::Path,
    process::{ExitStatus, Stdio},
    time::{SystemTime, UNIX_EPOCH},
};

use bedrock_process::{RunId, WorldState, WorldStatus};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt, BufWriter},
    process::{Child, ChildStdin, Command},
    sync::{Mutex, mpsc, oneshot, watch},
};

use crate::{
    config::SupervisorConfig,
    error::{Result, SupervisorError},
    registry::RunScoped,
    tailer,
};

type KillReply = oneshot::Sender<std::io::Result<()>>;

/// `None` until the worker exits; then `Some(status)`, with `status` absent
/// when waiting on the child failed.
type ExitSlot = Option<Option<ExitStatus>>;

/// Most recent output lines of a world, oldest first.
#[derive(Debug)]
pub struct LogBuffer {
    max_lines: usize,
    lines: VecDeque<String>,
}

impl LogBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines: max_lines.max(1),
            lines: VecDeque::new(),
        }
    }

    pub fn push_line(&mut self, line: String) {
        self.lines.push_back(line);
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Serializes commands into a worker's stdin. Each command is written and
/// flushed before the lock is released, so concurrent senders never interleave.
#[derive(Debug)]
pub struct CommandChannel<W = ChildStdin> {
    writer: Mutex<BufWriter<W>>,
}

impl<W: AsyncWrite + Unpin + Send> CommandChannel<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
        }
    }

    pub async fn send(&self, command: &str) -> std::io::Result<()> {
        let mut w = self.writer.lock().await;
        w.write_all(command.as_bytes()).await?;
        w.write_all(b"\n").await?;
        w.flush().await
    }
}

/// One running Bedrock worker. The child handle itself lives in a waiter task;
/// [`WorldProcess::kill`] and [`WorldProcess::reap`] talk to that task.
#[derive(Debug)]
pub struct WorldProcess {
    name: String,
    world_id: i32,
    port: u16,
    run_id: RunId,
    pid: Option<u32>,
    started_at_unix_ms: u64,
    kills: mpsc::Sender<KillReply>,
    exited: watch::Receiver<ExitSlot>,
    pub(crate) commands: CommandChannel,
    pub(crate) logs: Mutex<LogBuffer>,
    state: std::sync::Mutex<WorldState>,
}

impl RunScoped for WorldProcess {
    fn run_id(&self) -> &RunId {
        &self.run_id
    }
}

impl WorldProcess {
    /// Spawns the worker for `name` inside `dir` and returns it with the merged
    /// stdout/stderr line stream.
    pub(crate) async fn launch(
        config: &SupervisorConfig,
        name: &str,
        dir: &Path,
        port: u16,
        world_id: i32,
    ) -> Result<(Self, mpsc::Receiver<String>)> {
        let exec = config.server_binary_for(dir);
        let mut cmd = Command::new(&exec);
        cmd.current_dir(dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            unsafe {
                cmd.pre_exec(|| {
                    set_parent_death_signal()?;
                    Ok(())
                });
            }
        }

        let mut child = cmd.spawn().map_err(|e| SupervisorError::LaunchFailed {
            world: name.to_string(),
            reason: format!("spawn {} (cwd {}): {e}", exec.display(), dir.display()),
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.start_kill();
            return Err(SupervisorError::LaunchFailed {
                world: name.to_string(),
                reason: "child stdio was not captured".to_string(),
            });
        };

        let pid = child.id();
        let lines = tailer::merged_output(stdout, stderr);
        let (kills, kill_rx) = mpsc::channel(4);
        let (exit_tx, exited) = watch::channel(None);
        tokio::spawn(wait_for_exit(name.to_string(), child, kill_rx, exit_tx));

        let process = Self {
            name: name.to_string(),
            world_id,
            port,
            run_id: RunId::new(),
            pid,
            started_at_unix_ms: now_unix_ms(),
            kills,
            exited,
            commands: CommandChannel::new(stdin),
            logs: Mutex::new(LogBuffer::new(config.log_max_lines)),
            state: std::sync::Mutex::new(WorldState::Running),
        };
        Ok((process, lines))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn world_id(&self) -> i32 {
        self.world_id
    }

    pub fn state(&self) -> WorldState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_state(&self, state: WorldState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    pub fn status(&self) -> WorldStatus {
        WorldStatus {
            name: self.name.clone(),
            world_id: self.world_id,
            port: self.port,
            run_id: self.run_id.clone(),
            state: self.state(),
            pid: self.pid,
            started_at_unix_ms: self.started_at_unix_ms,
        }
    }

    pub async fn send(&self, command: &str) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|source| SupervisorError::WriteFailed {
                world: self.name.clone(),
                source,
            })
    }

    pub async fn logs(&self) -> Vec<String> {
        self.logs.lock().await.snapshot()
    }

    /// Sends SIGKILL unless the worker has already exited.
    pub(crate) async fn kill(&self) -> std::io::Result<()> {
        let (reply, answer) = oneshot::channel();
        if self.kills.send(reply).await.is_err() {
            // Waiter is gone, so the child has been reaped.
            return Ok(());
        }
        answer.await.unwrap_or(Ok(()))
    }

    /// Waits for the worker to exit.
    pub(crate) async fn reap(&self) -> Option<ExitStatus> {
        let mut exited = self.exited.clone();
        match exited.wait_for(Option::is_some).await {
            Ok(slot) => (*slot).flatten(),
            Err(_) => None,
        }
    }
}

// Owns the child until it exits, serving kill requests in the meantime.
async fn wait_for_exit(
    world: String,
    mut child: Child,
    mut kills: mpsc::Receiver<KillReply>,
    exited: watch::Sender<ExitSlot>,
) {
    let mut handles_open = true;
    let res = loop {
        tokio::select! {
            res = child.wait() => break res,
            request = kills.recv(), if handles_open => match request {
                Some(reply) => {
                    let _ = reply.send(child.start_kill());
                }
                // Every handle was dropped: nothing can stop this world any more.
                None => {
                    handles_open = false;
                    let _ = child.start_kill();
                }
            },
        }
    };
    let status = match res {
        Ok(status) => Some(status),
        Err(err) => {
            tracing::warn!(world = %world, %err, "failed to wait on world process");
            None
        }
    };
    let _ = exited.send(Some(status));

    kills.close();
    while let Ok(reply) = kills.try_recv() {
        let _ = reply.send(Ok(()));
    }
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(target_os = "linux")]
unsafe fn set_parent_death_signal() -> std::io::Result<()> {
    // A supervisor crash must not leave orphaned worlds holding their ports.
    let rc = unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(all(unix, not(target_os = "linux")))]
unsafe fn set_parent_death_signal() -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, BufReader};

    use super::*;

    #[test]
    fn log_buffer_evicts_oldest() {
        let mut buf = LogBuffer::new(3);
        for i in 0..5 {
            buf.push_line(format!("line {i}"));
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.snapshot(), vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn default_config_keeps_last_thousand_lines() {
        let mut buf = LogBuffer::new(SupervisorConfig::default().log_max_lines);
        for i in 0..=1000 {
            buf.push_line(i.to_string());
        }
        let snap = buf.snapshot();
        assert_eq!(snap.len(), 1000);
        assert_eq!(snap.first().map(String::as_str), Some("1"));
        assert_eq!(snap.last().map(String::as_str), Some("1000"));
        assert!(snap.windows(2).all(|w| {
            w[0].parse::<u32>().unwrap() + 1 == w[1].parse::<u32>().unwrap()
        }));
    }

    #[test]
    fn log_buffer_snapshot_is_a_copy() {
        let mut buf = LogBuffer::new(10);
        buf.push_line("a".to_string());
        let snap = buf.snapshot();
        buf.push_line("b".to_string());
        assert_eq!(snap, vec!["a"]);
        assert_eq!(buf.len(), 2);
    }

    #[tokio::test]
    async fn command_channel_appends_newline_and_flushes() {
        let (client, server) = tokio::io::duplex(1024);
        let chan = CommandChannel::new(client);
        chan.send("say hi").await.unwrap();
        chan.send("list").await.unwrap();

        let mut lines = BufReader::new(server).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("say hi"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("list"));
    }

    #[tokio::test]
    async fn concurrent_sends_do_not_interleave() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let chan = std::sync::Arc::new(CommandChannel::new(client));
        let mut tasks = Vec::new();
        for i in 0..16 {
            let chan = chan.clone();
            tasks.push(tokio::spawn(async move {
                chan.send(&format!("say {}", "x".repeat(200 + i))).await
            }));
        }
        for t in tasks {
            t.await.unwrap().unwrap();
        }
        drop(chan);

        let mut lines = BufReader::new(server).lines();
        let mut seen = 0;
        while let Some(line) = lines.next_line().await.unwrap() {
            let body = line.strip_prefix("say ").unwrap();
            assert!(body.chars().all(|c| c == 'x'));
            seen += 1;
        }
        assert_eq!(seen, 16);
    }

    #[tokio::test]
    async fn send_to_closed_reader_is_an_error() {
        let (client, server) = tokio::io::duplex(16);
        drop(server);
        let chan = CommandChannel::new(client);
        assert!(chan.send("stop").await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn kill_then_reap_reports_exit_and_tolerates_repeats() {
        let dir = tempfile::tempdir().unwrap();
        let config = SupervisorConfig {
            server_binary: "/bin/cat".into(),
            ..SupervisorConfig::default()
        };
        let (process, _lines) = WorldProcess::launch(&config, "w", dir.path(), 19132, 1)
            .await
            .unwrap();
        assert!(process.status().pid.is_some());

        process.kill().await.unwrap();
        let status = tokio::time::timeout(std::time::Duration::from_secs(5), process.reap())
            .await
            .expect("worker never exited")
            .expect("exit status");
        assert!(!status.success());

        // Already reaped: both calls return immediately.
        process.kill().await.unwrap();
        assert_eq!(process.reap().await, Some(status));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reap_sees_a_worker_that_exits_by_itself() {
        let dir = tempfile::tempdir().unwrap();
        let config = SupervisorConfig {
            server_binary: "/bin/sh".into(),
            ..SupervisorConfig::default()
        };
        let (process, _lines) = WorldProcess::launch(&config, "w", dir.path(), 19132, 1)
            .await
            .unwrap();
        process.send("exit 3").await.unwrap();
        let status = tokio::time::timeout(std::time::Duration::from_secs(5), process.reap())
            .await
            .expect("worker never exited")
            .expect("exit status");
        assert_eq!(status.code(), Some(3));
    }
}
