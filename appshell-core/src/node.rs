use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command as TokioCommand};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// State codes reported to JS when no port is available.
pub const NODE_NOT_YET_STARTED: i32 = -1;
pub const NODE_PORT_NOT_YET_SET: i32 = -2;
pub const NODE_FAILED: i32 = -3;

/// Longest stdout line accepted from the helper before it is discarded.
const MAX_LINE_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    NotStarted,
    Starting,
    Listening(u16),
    Failed,
}

impl NodeState {
    /// The port when listening, otherwise one of the negative state codes.
    pub fn code(self) -> i32 {
        match self {
            NodeState::NotStarted => NODE_NOT_YET_STARTED,
            NodeState::Starting => NODE_PORT_NOT_YET_SET,
            NodeState::Listening(port) => i32::from(port),
            NodeState::Failed => NODE_FAILED,
        }
    }
}

/// One framed command read from the helper's stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCommand {
    Port(u16),
    Ping,
    Other(String),
}

/// Parse one newline-delimited stdout line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Option<NodeCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line == "ping" {
        return Some(NodeCommand::Ping);
    }
    if let Some(rest) = line.strip_prefix("port") {
        let value = rest.trim_start_matches([':', ' ', '\t']);
        if let Ok(port) = value.parse::<u16>() {
            return Some(NodeCommand::Port(port));
        }
    }
    Some(NodeCommand::Other(line.to_string()))
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub executable: PathBuf,
    pub args: Vec<String>,
    /// Restarts allowed inside `restart_window` before giving up.
    pub max_restarts: usize,
    pub restart_window: Duration,
    pub restart_delay: Duration,
}

impl NodeConfig {
    pub fn new(executable: impl Into<PathBuf>, script: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            args: vec![script.into()],
            max_restarts: 5,
            restart_window: Duration::from_secs(60),
            restart_delay: Duration::from_millis(500),
        }
    }
}

/// Shared view of a running supervisor.
#[derive(Clone)]
pub struct NodeHandle {
    state: Arc<Mutex<NodeState>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl NodeHandle {
    /// A handle for a helper that will never run.
    pub fn failed() -> Self {
        let (shutdown, _) = watch::channel(true);
        Self {
            state: Arc::new(Mutex::new(NodeState::Failed)),
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn state(&self) -> NodeState {
        *self.state.lock()
    }

    /// Ask the supervisor to kill the helper and stop restarting it.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

enum ChildExit {
    Exited,
    Shutdown,
}

/// Start supervising the helper. Must be called from inside a tokio runtime.
pub fn spawn_supervisor(config: NodeConfig) -> (NodeHandle, JoinHandle<()>) {
    let state = Arc::new(Mutex::new(NodeState::NotStarted));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = NodeHandle {
        state: state.clone(),
        shutdown: Arc::new(shutdown_tx),
    };
    let task = tokio::spawn(supervise(config, state, shutdown_rx));
    (handle, task)
}

async fn supervise(
    config: NodeConfig,
    state: Arc<Mutex<NodeState>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut recent_exits: VecDeque<Instant> = VecDeque::new();

    loop {
        if *shutdown.borrow() {
            return;
        }
        *state.lock() = NodeState::Starting;

        match run_once(&config, &state, &mut shutdown).await {
            Ok(ChildExit::Shutdown) => {
                log::info!("Node helper stopped");
                return;
            }
            Ok(ChildExit::Exited) => {}
            Err(e) => log::error!("{}", e),
        }

        let now = Instant::now();
        recent_exits.push_back(now);
        while recent_exits
            .front()
            .is_some_and(|t| now.duration_since(*t) > config.restart_window)
        {
            recent_exits.pop_front();
        }
        if recent_exits.len() > config.max_restarts {
            log::error!(
                "Node helper failed {} times within {:?}; giving up",
                recent_exits.len(),
                config.restart_window
            );
            *state.lock() = NodeState::Failed;
            return;
        }

        log::warn!("Node helper exited, restarting in {:?}", config.restart_delay);
        tokio::select! {
            _ = tokio::time::sleep(config.restart_delay) => {}
            _ = shutdown.changed() => return,
        }
    }
}

async fn run_once(
    config: &NodeConfig,
    state: &Arc<Mutex<NodeState>>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<ChildExit, String> {
    log::info!(
        "Starting node helper {:?} with args {:?}",
        config.executable,
        config.args
    );
    let mut child: Child = TokioCommand::new(&config.executable)
        .args(&config.args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("Failed to start node helper {:?}: {}", config.executable, e))?;

    let mut stdin = child.stdin.take().ok_or("Failed to get node stdin")?;
    let stdout = child.stdout.take().ok_or("Failed to get node stdout")?;

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    log::warn!("node stderr: {}", trimmed);
                }
            }
        });
    }

    let mut stdout = BufReader::new(stdout);
    loop {
        tokio::select! {
            line = read_bounded_line(&mut stdout, MAX_LINE_LEN) => match line {
                Ok(Line::Text(line)) => handle_line(&line, state, &mut stdin).await,
                Ok(Line::TooLong(len)) => {
                    log::warn!("Node helper line too long ({} bytes), skipping", len);
                }
                Ok(Line::Eof) | Err(_) => break,
            },
            _ = shutdown.changed() => {
                let _ = child.kill().await;
                return Ok(ChildExit::Shutdown);
            }
        }
    }

    let status = child.wait().await;
    log::warn!("Node helper exited with status: {:?}", status);
    Ok(ChildExit::Exited)
}

#[derive(Debug, PartialEq, Eq)]
enum Line {
    Text(String),
    /// A line over the limit was skipped; carries its length in bytes.
    TooLong(usize),
    Eof,
}

/// Read one `\n`-terminated line, buffering at most `max + 1` bytes of it.
async fn read_bounded_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    max: usize,
) -> std::io::Result<Line> {
    let limit = max as u64 + 1;
    let mut buf = Vec::new();
    let read = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if read == 0 {
        return Ok(Line::Eof);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.len() <= max {
        return Ok(Line::Text(String::from_utf8_lossy(&buf).into_owned()));
    }

    // Discard the rest of the line in bounded chunks
    let mut skipped = buf.len();
    loop {
        buf.clear();
        let read = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
        if read == 0 {
            break;
        }
        if buf.last() == Some(&b'\n') {
            skipped += read - 1;
            break;
        }
        skipped += read;
    }
    Ok(Line::TooLong(skipped))
}

async fn handle_line(line: &str, state: &Arc<Mutex<NodeState>>, stdin: &mut ChildStdin) {
    match parse_command(line) {
        Some(NodeCommand::Port(port)) => {
            log::info!("Node helper listening on port {}", port);
            *state.lock() = NodeState::Listening(port);
        }
        Some(NodeCommand::Ping) => {
            if let Err(e) = stdin.write_all(b"pong\n").await {
                log::warn!("Failed to answer node ping: {}", e);
            } else {
                let _ = stdin.flush().await;
            }
        }
        Some(NodeCommand::Other(text)) => log::debug!("node: {}", text),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_framed_commands() {
        assert_eq!(parse_command("port 53312\n"), Some(NodeCommand::Port(53312)));
        assert_eq!(parse_command("port:8080"), Some(NodeCommand::Port(8080)));
        assert_eq!(parse_command("ping"), Some(NodeCommand::Ping));
        assert_eq!(
            parse_command("port banana"),
            Some(NodeCommand::Other("port banana".to_string()))
        );
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn state_codes() {
        assert_eq!(NodeState::NotStarted.code(), NODE_NOT_YET_STARTED);
        assert_eq!(NodeState::Starting.code(), NODE_PORT_NOT_YET_SET);
        assert_eq!(NodeState::Failed.code(), NODE_FAILED);
        assert_eq!(NodeState::Listening(4000).code(), 4000);
        assert_eq!(NodeHandle::failed().state(), NodeState::Failed);
    }

    #[tokio::test]
    async fn long_lines_are_skipped_without_buffering() {
        let mut input: &[u8] = b"port 1\nabcdefghijkl\nping\nabcdefgh\ntail";
        assert_eq!(
            read_bounded_line(&mut input, 8).await.unwrap(),
            Line::Text("port 1".to_string())
        );
        assert_eq!(read_bounded_line(&mut input, 8).await.unwrap(), Line::TooLong(12));
        assert_eq!(
            read_bounded_line(&mut input, 8).await.unwrap(),
            Line::Text("ping".to_string())
        );
        assert_eq!(
            read_bounded_line(&mut input, 8).await.unwrap(),
            Line::Text("abcdefgh".to_string())
        );
        assert_eq!(
            read_bounded_line(&mut input, 8).await.unwrap(),
            Line::Text("tail".to_string())
        );
        assert_eq!(read_bounded_line(&mut input, 8).await.unwrap(), Line::Eof);

        let long = vec![b'x'; 100];
        let mut input: &[u8] = &long;
        assert_eq!(read_bounded_line(&mut input, 8).await.unwrap(), Line::TooLong(100));
        assert_eq!(read_bounded_line(&mut input, 8).await.unwrap(), Line::Eof);
    }

    #[cfg(unix)]
    fn sh_config(script: &str) -> NodeConfig {
        NodeConfig {
            executable: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
            max_restarts: 2,
            restart_window: Duration::from_secs(30),
            restart_delay: Duration::from_millis(10),
        }
    }

    #[cfg(unix)]
    async fn wait_for_state(handle: &NodeHandle, wanted: NodeState) -> bool {
        for _ in 0..200 {
            if handle.state() == wanted {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        false
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn records_port_and_shuts_down() {
        let (handle, task) = spawn_supervisor(sh_config("echo 'port 4321'; sleep 30"));
        assert!(wait_for_state(&handle, NodeState::Listening(4321)).await);

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("supervisor did not stop")
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let (handle, task) = spawn_supervisor(sh_config(
            "echo ping; read x; [ \"$x\" = pong ] && echo 'port 1111'; sleep 30",
        ));
        assert!(wait_for_state(&handle, NodeState::Listening(1111)).await);

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("supervisor did not stop")
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn gives_up_after_restart_budget() {
        let (handle, task) = spawn_supervisor(sh_config("exit 1"));
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("supervisor kept restarting")
            .unwrap();
        assert_eq!(handle.state(), NodeState::Failed);
    }
}
