use std::sync::Arc;

use bedrock_process::WorldState;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, BufReader},
    sync::{Mutex, mpsc, oneshot},
};

use crate::{
    events::parse_line,
    reactor::Reactor,
    registry::{ProcessRegistry, RunScoped},
    world_process::{CommandChannel, LogBuffer, WorldProcess},
};

const MERGED_CHANNEL_CAPACITY: usize = 1024;
/// Longer lines are cut here and the remainder up to the newline is dropped.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Merges two output streams into one line channel. Ordering holds within a
/// stream only. The channel closes once both streams reach EOF.
pub fn merged_output<O, E>(stdout: O, stderr: E) -> mpsc::Receiver<String>
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(MERGED_CHANNEL_CAPACITY);
    tokio::spawn(pump(stdout, tx.clone()));
    tokio::spawn(pump(stderr, tx));
    rx
}

async fn pump<R: AsyncRead + Unpin>(stream: R, tx: mpsc::Sender<String>) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE_BYTES as u64)
            .read_until(b'\n', &mut buf)
            .await;
        match read {
            Ok(0) => break,
            Ok(_) => {
                let cut = buf.len() >= MAX_LINE_BYTES && buf.last() != Some(&b'\n');
                if cut && let Err(err) = skip_past_newline(&mut reader).await {
                    tracing::debug!(%err, "output pump stopped");
                    break;
                }
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                tracing::debug!(%err, "output pump stopped");
                break;
            }
        }
    }
}

async fn skip_past_newline<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<()> {
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(());
        }
        match chunk.iter().position(|b| *b == b'\n') {
            Some(i) => {
                reader.consume(i + 1);
                return Ok(());
            }
            None => {
                let n = chunk.len();
                reader.consume(n);
            }
        }
    }
}

/// Buffers every line, then reacts to the ones that carry an event. Returns
/// when the stream closes.
pub async fn tail_lines<W>(
    world: &str,
    lines: &mut mpsc::Receiver<String>,
    logs: &Mutex<LogBuffer>,
    commands: &CommandChannel<W>,
    reactor: &Reactor,
) where
    W: AsyncWrite + Unpin + Send,
{
    while let Some(line) = lines.recv().await {
        tracing::debug!(world, "{line}");
        let event = parse_line(&line);
        logs.lock().await.push_line(line);

        let Some(event) = event else {
            continue;
        };
        for command in reactor.react(world, &event).await {
            if let Err(err) = commands.send(&command).await {
                tracing::warn!(world, %err, command = %command, "failed to send reactive command");
            }
        }
    }
}

/// Per-world task: waits until the process is registered, follows its output,
/// then reaps it and drops this run from the registry.
pub(crate) async fn run(
    process: Arc<WorldProcess>,
    mut lines: mpsc::Receiver<String>,
    reactor: Reactor,
    registry: ProcessRegistry,
    registered: oneshot::Receiver<()>,
) {
    if registered.await.is_err() {
        // Registration lost a race; this run never became visible.
        if let Err(err) = process.kill().await {
            tracing::warn!(world = %process.name(), %err, "failed to kill unregistered world");
        }
        process.reap().await;
        process.set_state(WorldState::Stopped);
        return;
    }

    tail_lines(
        process.name(),
        &mut lines,
        &process.logs,
        &process.commands,
        &reactor,
    )
    .await;

    let exit = process.reap().await;
    let requested = process.state() == WorldState::Stopping;
    process.set_state(WorldState::Stopped);
    let run_id = process.run_id().clone();
    registry.remove_run(process.name(), &run_id).await;

    if requested {
        tracing::info!(world = %process.name(), %run_id, "world stopped");
    } else {
        tracing::warn!(
            world = %process.name(),
            %run_id,
            exit_code = ?exit.and_then(|s| s.code()),
            "world exited unexpectedly"
        );
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncWriteExt, BufReader as TokioBufReader};

    use super::*;
    use crate::metadata::testing::FakeMetadata;

    #[tokio::test]
    async fn merged_output_strips_line_endings_and_tolerates_bad_utf8() {
        let (mut out_w, out_r) = tokio::io::duplex(256);
        let (mut err_w, err_r) = tokio::io::duplex(256);
        let mut rx = merged_output(out_r, err_r);

        out_w.write_all(b"hello\r\n\xff\xfebad\n").await.unwrap();
        drop(out_w);
        err_w.write_all(b"warn\nno-newline").await.unwrap();
        drop(err_w);

        let mut got = Vec::new();
        while let Some(line) = rx.recv().await {
            got.push(line);
        }
        got.sort();
        assert_eq!(got.len(), 4);
        assert!(got.contains(&"hello".to_string()));
        assert!(got.contains(&"warn".to_string()));
        assert!(got.contains(&"no-newline".to_string()));
        assert!(got.iter().any(|l| l.ends_with("bad") && l.contains('\u{fffd}')));
    }

    #[tokio::test]
    async fn overlong_line_is_cut_and_the_next_line_survives() {
        let (mut out_w, out_r) = tokio::io::duplex(8 * 1024);
        let mut rx = merged_output(out_r, tokio::io::empty());

        tokio::spawn(async move {
            let junk = vec![b'a'; MAX_LINE_BYTES * 3 + 17];
            out_w.write_all(&junk).await.unwrap();
            out_w.write_all(b"\nPlayer connected: Steve, xuid: 1\n").await.unwrap();
        });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.len(), MAX_LINE_BYTES);
        assert!(first.bytes().all(|b| b == b'a'));
        assert_eq!(
            rx.recv().await.as_deref(),
            Some("Player connected: Steve, xuid: 1")
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn spawn_line_buffers_then_writes_three_commands() {
        let (tx, mut rx) = mpsc::channel(16);
        let logs = Mutex::new(LogBuffer::new(100));
        let (client, server) = tokio::io::duplex(4096);
        let commands = CommandChannel::new(client);
        let fake = Arc::new(FakeMetadata::with_role("123456789", "member"));
        let reactor = Reactor::new(1, fake, "bocil".to_string());

        tx.send("Server started.".to_string()).await.unwrap();
        tx.send("Player Spawned: Steve Jobs xuid: 123456789,otherdata".to_string())
            .await
            .unwrap();
        drop(tx);

        tail_lines("w", &mut rx, &logs, &commands, &reactor).await;
        drop(commands);

        assert_eq!(logs.lock().await.len(), 2);
        let mut out = TokioBufReader::new(server).lines();
        let mut sent = Vec::new();
        while let Some(line) = out.next_line().await.unwrap() {
            sent.push(line);
        }
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], r#"tag "Steve Jobs" add MEMBER"#);
        assert_eq!(sent[1], r#"scoreboard players set "Steve Jobs" role 1"#);
        assert!(sent[2].starts_with("tellraw @a "));
        assert!(sent[2].contains("MEMBER"));
    }

    #[tokio::test]
    async fn connected_line_upserts_roster_without_commands() {
        let (tx, mut rx) = mpsc::channel(16);
        let logs = Mutex::new(LogBuffer::new(100));
        let (client, server) = tokio::io::duplex(4096);
        let commands = CommandChannel::new(client);
        let fake = Arc::new(FakeMetadata::default());
        let reactor = Reactor::new(9, fake.clone(), "bocil".to_string());

        tx.send("Player connected: Steve, xuid: 123456789".to_string())
            .await
            .unwrap();
        drop(tx);
        tail_lines("w", &mut rx, &logs, &commands, &reactor).await;
        drop(commands);

        assert_eq!(
            fake.ensured(),
            vec![(9, "123456789".to_string(), "Steve".to_string())]
        );
        let mut out = TokioBufReader::new(server).lines();
        assert_eq!(out.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_failure_does_not_stop_tailing() {
        let (tx, mut rx) = mpsc::channel(16);
        let logs = Mutex::new(LogBuffer::new(100));
        let (client, server) = tokio::io::duplex(16);
        drop(server);
        let commands = CommandChannel::new(client);
        let reactor = Reactor::new(1, Arc::new(FakeMetadata::default()), "bocil".to_string());

        tx.send("[INFO] [Chat] Steve: hi".to_string()).await.unwrap();
        tx.send("after".to_string()).await.unwrap();
        drop(tx);
        tail_lines("w", &mut rx, &logs, &commands, &reactor).await;

        assert_eq!(
            logs.lock().await.snapshot(),
            vec!["[INFO] [Chat] Steve: hi", "after"]
        );
    }
}
