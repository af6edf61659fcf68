/// Single-instance coordination.
///
/// At startup every process races for the instance lock of its
/// [`InstanceKey`]. The winner becomes the primary: it binds the local
/// endpoint and republishes whatever later processes send it on the
/// [`SignalBus`]. Every loser is a secondary: it forwards its
/// [`LaunchArgument`] to the primary and reports back so the entry point can
/// exit with [`DUPLICATE_INSTANCE_EXIT_CODE`].
///
/// Handoff wire format: the UTF-8 bytes of the argument, no framing,
/// terminated by the sender closing its side.
///
/// The primary reads several connections at once but publishes their
/// arguments in accept order. A peer that connects and stays silent therefore
/// holds back the messages accepted after it until its read times out; the
/// stall is bounded by one read timeout no matter how many such peers there
/// are.
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use futures::stream::{FuturesOrdered, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::bus::SignalBus;
use crate::endpoint::{Endpoint, Listener};
use crate::error::{HandoffError, StartupError};
use crate::event::AppEvent;
use crate::lock::{self, InstanceLock};

pub const APP_NAME: &str = "Groove";
pub const DEFAULT_LAUNCH_ARGUMENT: &str = "show";
/// Exit status of a secondary instance, whether or not the handoff arrived.
pub const DUPLICATE_INSTANCE_EXIT_CODE: i32 = 1;
/// Ceiling for each connect, write and read step of a handoff.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);
/// Payloads are cut off here; anything longer is not a path.
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

const READ_CHUNK_BYTES: usize = 4096;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);
/// Connections read concurrently before the primary stops accepting.
const MAX_PENDING_READS: usize = 16;

// ── Data model ────────────────────────────────────────────────────────────────

/// Names both the instance lock and the local endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceKey(String);

impl InstanceKey {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.is_empty() {
            Self(APP_NAME.to_string())
        } else {
            Self(name)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key with every character outside `[A-Za-z0-9._-]` replaced by `_`.
    pub fn file_stem(&self) -> String {
        self.as_str()
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
                _ => '_',
            })
            .collect()
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The single token a process was launched with: a file path or `show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchArgument(String);

impl LaunchArgument {
    pub fn new(argument: impl Into<String>) -> Self {
        Self(argument.into())
    }

    /// Uses the first command-line argument, or `show` when there is none.
    pub fn from_arg(arg: Option<String>) -> Self {
        arg.map(Self::new).unwrap_or_default()
    }

    /// Decodes a received handoff. Empty or non-UTF-8 payloads become `show`.
    pub fn from_payload(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) if !text.is_empty() => Self::new(text),
            Ok(_) => Self::default(),
            Err(e) => {
                log::warn!("Discarding malformed handoff payload ({} bytes): {e}", bytes.len());
                Self::default()
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Default for LaunchArgument {
    fn default() -> Self {
        Self(DEFAULT_LAUNCH_ARGUMENT.to_string())
    }
}

impl fmt::Display for LaunchArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of [`Coordinator::start`], decided once per process.
#[derive(Debug)]
pub enum Startup {
    /// This process owns the instance; keep the handle alive until exit.
    Primary(PrimaryInstance),
    /// Another process owns the instance; this one should exit.
    Secondary(HandoffOutcome),
}

#[derive(Debug)]
pub enum HandoffOutcome {
    Delivered,
    Failed(HandoffError),
}

/// Ownership of the instance lock and the listener task.
///
/// Dropping it stops the listener, removes the socket and releases the lock,
/// in that order. A crashed primary skips all of this; the OS releases the
/// lock and the next primary clears the socket.
#[derive(Debug)]
pub struct PrimaryInstance {
    endpoint: Endpoint,
    listener: JoinHandle<()>,
    lock: InstanceLock,
}

impl Drop for PrimaryInstance {
    fn drop(&mut self) {
        self.listener.abort();
        self.endpoint.remove();
        log::debug!("Released instance lock {}", self.lock.path().display());
    }
}

// ── Coordinator ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Coordinator {
    key: InstanceKey,
    runtime_dir: PathBuf,
    timeout: Duration,
    bus: SignalBus,
}

impl Coordinator {
    pub fn new(key: InstanceKey, runtime_dir: impl Into<PathBuf>, bus: SignalBus) -> Self {
        Self {
            key,
            runtime_dir: runtime_dir.into(),
            timeout: DEFAULT_TIMEOUT,
            bus,
        }
    }

    /// Overrides the per-step handoff timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn key(&self) -> &InstanceKey {
        &self.key
    }

    pub fn lock_path(&self) -> PathBuf {
        self.runtime_dir.join(format!("{}.lock", self.key.file_stem()))
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(&self.runtime_dir, &self.key.file_stem())
    }

    /// Runs the startup protocol.
    ///
    /// Must be called from within a tokio runtime; the primary's listener is
    /// spawned onto it. Only resource failures on the primary path are
    /// errors; a failed handoff is reported through [`HandoffOutcome`].
    pub async fn start(&self, argument: LaunchArgument) -> Result<Startup, StartupError> {
        let lock_path = self.lock_path();
        let acquired = InstanceLock::try_acquire(&lock_path).map_err(|source| {
            StartupError::FlagAcquisition {
                path: lock_path.clone(),
                source,
            }
        })?;
        let endpoint = self.endpoint();

        let Some(lock) = acquired else {
            match lock::holder_pid(&lock_path) {
                Some(pid) => log::info!("{} is already running (pid {pid}); forwarding '{argument}'", self.key),
                None => log::info!("{} is already running; forwarding '{argument}'", self.key),
            }
            let outcome = match handoff(&endpoint, &argument, self.timeout).await {
                Ok(()) => HandoffOutcome::Delivered,
                Err(e) => {
                    log::error!("Failed to forward launch argument to the running instance: {e}");
                    HandoffOutcome::Failed(e)
                }
            };
            return Ok(Startup::Secondary(outcome));
        };

        let listener = endpoint.bind().map_err(|source| StartupError::ListenerBind {
            endpoint: endpoint.to_string(),
            source,
        })?;
        log::info!("Primary instance of {} listening on {endpoint}", self.key);

        let listener = tokio::spawn(serve(listener, self.bus.clone(), self.timeout));
        Ok(Startup::Primary(PrimaryInstance {
            endpoint,
            listener,
            lock,
        }))
    }
}

// ── Secondary side ────────────────────────────────────────────────────────────

/// Sends `argument` to the primary listening on `endpoint`.
///
/// Connecting and writing each get their own `timeout`. There is no retry.
pub async fn handoff(
    endpoint: &Endpoint,
    argument: &LaunchArgument,
    timeout: Duration,
) -> Result<(), HandoffError> {
    let mut stream = match time::timeout(timeout, endpoint.connect()).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => {
            return Err(HandoffError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })
        }
        Err(_) => {
            return Err(HandoffError::ConnectTimeout {
                endpoint: endpoint.to_string(),
                timeout,
            })
        }
    };

    let write = async {
        stream.write_all(argument.as_str().as_bytes()).await?;
        stream.flush().await?;
        // The peer may already be gone; the bytes are in its buffer either way.
        let _ = stream.shutdown().await;
        Ok::<(), io::Error>(())
    };
    match time::timeout(timeout, write).await {
        Ok(Ok(())) => {
            log::debug!("Forwarded '{argument}' to {endpoint}");
            Ok(())
        }
        Ok(Err(e)) => Err(HandoffError::Write(e)),
        Err(_) => Err(HandoffError::WriteTimeout(timeout)),
    }
}

// ── Primary side ──────────────────────────────────────────────────────────────

/// Accept loop of the primary. Payloads are read concurrently and
/// published in accept order.
async fn serve(mut listener: Listener, bus: SignalBus, timeout: Duration) {
    let mut pending = FuturesOrdered::new();
    loop {
        tokio::select! {
            accepted = listener.accept(), if pending.len() < MAX_PENDING_READS => match accepted {
                Ok(stream) => pending.push_back(read_payload(stream, timeout)),
                Err(e) => {
                    log::warn!("Failed to accept handoff connection: {e}");
                    time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(received) = pending.next(), if !pending.is_empty() => {
                let Some(argument) = received else {
                    continue;
                };
                log::info!("Received launch argument from another instance: '{argument}'");
                if !bus.publish(AppEvent::AppMessage(argument.into_string())).await {
                    log::debug!("Notification bus closed; stopping instance listener");
                    break;
                }
            }
        }
    }
}

/// Reads one handoff until the peer closes, `MAX_PAYLOAD_BYTES` arrive or
/// `timeout` elapses. Returns `None` only when nothing usable was received
/// before a timeout or read error.
async fn read_payload<S>(mut stream: S, timeout: Duration) -> Option<LaunchArgument>
where
    S: AsyncRead + Unpin,
{
    let deadline = Instant::now() + timeout;
    let mut payload = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_BYTES];

    loop {
        match time::timeout_at(deadline, stream.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                payload.extend_from_slice(&chunk[..n]);
                if payload.len() >= MAX_PAYLOAD_BYTES {
                    log::warn!("Handoff payload exceeds {MAX_PAYLOAD_BYTES} bytes; truncating");
                    payload.truncate(MAX_PAYLOAD_BYTES);
                    break;
                }
            }
            // A named pipe reports the client closing as a broken pipe.
            Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => break,
            Ok(Err(e)) if payload.is_empty() => {
                log::warn!("Failed to read handoff payload: {e}");
                return None;
            }
            Ok(Err(e)) => {
                log::warn!("Handoff read ended early after {} bytes: {e}", payload.len());
                break;
            }
            Err(_) if payload.is_empty() => {
                log::warn!("Timed out after {timeout:?} waiting for a handoff payload");
                return None;
            }
            Err(_) => {
                log::warn!("Timed out after {timeout:?}; using the {} bytes received", payload.len());
                break;
            }
        }
    }

    trim_incomplete_char(&mut payload);
    Some(LaunchArgument::from_payload(&payload))
}

/// Drops a multi-byte character cut off at the end of `payload`, as left by
/// truncation or an early stop. Invalid bytes elsewhere are kept.
fn trim_incomplete_char(payload: &mut Vec<u8>) {
    let valid = match std::str::from_utf8(payload) {
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        _ => return,
    };
    payload.truncate(valid);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use std::path::Path;

    const TEST_TIMEOUT: Duration = Duration::from_millis(300);

    fn coordinator(dir: &Path, key: &str) -> (Coordinator, mpsc::Receiver<AppEvent>) {
        let (bus, rx) = SignalBus::new();
        let coordinator =
            Coordinator::new(InstanceKey::new(key), dir, bus).with_timeout(TEST_TIMEOUT);
        (coordinator, rx)
    }

    async fn next_message(rx: &mut mpsc::Receiver<AppEvent>) -> String {
        match time::timeout(DEFAULT_TIMEOUT, rx.recv()).await {
            Ok(Some(AppEvent::AppMessage(message))) => message,
            other => panic!("expected an AppMessage, got {other:?}"),
        }
    }

    async fn start_primary(c: &Coordinator) -> PrimaryInstance {
        match c.start(LaunchArgument::default()).await.unwrap() {
            Startup::Primary(primary) => primary,
            Startup::Secondary(outcome) => panic!("expected primary, got secondary: {outcome:?}"),
        }
    }

    // ── InstanceKey / LaunchArgument ──────────────────────────────────────────

    #[test]
    fn empty_key_falls_back_to_app_name() {
        assert_eq!(InstanceKey::new("").as_str(), APP_NAME);
    }

    #[test]
    fn key_file_stem_replaces_unsafe_characters() {
        assert_eq!(InstanceKey::new("Groove Music/1").file_stem(), "Groove_Music_1");
        assert_eq!(InstanceKey::new("groove-player_2.0").file_stem(), "groove-player_2.0");
    }

    #[test]
    fn missing_argument_defaults_to_show() {
        assert_eq!(LaunchArgument::from_arg(None).as_str(), "show");
        assert_eq!(LaunchArgument::from_arg(Some("a.mp3".into())).as_str(), "a.mp3");
    }

    #[test]
    fn payload_decoding() {
        assert_eq!(LaunchArgument::from_payload("/music/ça.flac".as_bytes()).as_str(), "/music/ça.flac");
        assert_eq!(LaunchArgument::from_payload(b"").as_str(), "show");
        assert_eq!(LaunchArgument::from_payload(&[0xff, 0xfe, 0x00]).as_str(), "show");
    }

    #[test]
    fn lock_and_endpoint_share_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let (c, _rx) = coordinator(dir.path(), "Groove");
        assert_eq!(c.lock_path(), dir.path().join("Groove.lock"));
        assert!(c.endpoint().to_string().contains("Groove"));
    }

    // ── Role decision ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn exactly_one_of_many_becomes_primary() {
        let dir = tempfile::tempdir().unwrap();
        let mut coordinators = Vec::new();
        for _ in 0..5 {
            coordinators.push(coordinator(dir.path(), "exclusive"));
        }

        let mut startups = Vec::new();
        for (c, _) in &coordinators {
            startups.push(c.start(LaunchArgument::default()).await.unwrap());
        }

        let primaries = startups.iter().filter(|s| matches!(s, Startup::Primary(_))).count();
        assert_eq!(primaries, 1);
        assert_eq!(startups.len() - primaries, 4);
    }

    #[tokio::test]
    async fn concurrent_starts_elect_one_primary() {
        let dir = tempfile::tempdir().unwrap();
        let (a, _ra) = coordinator(dir.path(), "race");
        let (b, _rb) = coordinator(dir.path(), "race");
        let (c, _rc) = coordinator(dir.path(), "race");

        let (sa, sb, sc) = tokio::join!(
            a.start(LaunchArgument::default()),
            b.start(LaunchArgument::default()),
            c.start(LaunchArgument::default()),
        );
        let startups = [sa.unwrap(), sb.unwrap(), sc.unwrap()];
        assert_eq!(startups.iter().filter(|s| matches!(s, Startup::Primary(_))).count(), 1);
    }

    #[tokio::test]
    async fn distinct_keys_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let (a, _ra) = coordinator(dir.path(), "one");
        let (b, _rb) = coordinator(dir.path(), "two");
        let _pa = start_primary(&a).await;
        let _pb = start_primary(&b).await;
    }

    #[tokio::test]
    async fn lock_is_released_when_primary_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (first, _r1) = coordinator(dir.path(), "lifetime");
        let primary = start_primary(&first).await;
        drop(primary);

        let (second, mut r2) = coordinator(dir.path(), "lifetime");
        let _primary = start_primary(&second).await;

        // The new primary serves handoffs, not the old one.
        let (third, _r3) = coordinator(dir.path(), "lifetime");
        let startup = third.start(LaunchArgument::new("after.ogg")).await.unwrap();
        assert!(matches!(startup, Startup::Secondary(HandoffOutcome::Delivered)));
        assert_eq!(next_message(&mut r2).await, "after.ogg");
    }

    #[tokio::test]
    async fn unusable_runtime_dir_is_a_startup_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let (c, _rx) = coordinator(&blocker.join("run"), "Groove");
        let err = c.start(LaunchArgument::default()).await.unwrap_err();
        assert!(matches!(err, StartupError::FlagAcquisition { .. }), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unbindable_endpoint_is_a_startup_error() {
        let dir = tempfile::tempdir().unwrap();
        // Socket paths are limited to about a hundred bytes; lock file paths are not.
        let long_dir = dir.path().join("r".repeat(120));
        let (c, _rx) = coordinator(&long_dir, "Groove");
        let err = c.start(LaunchArgument::default()).await.unwrap_err();
        assert!(matches!(err, StartupError::ListenerBind { .. }), "{err}");
    }

    // ── Handoff delivery ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn secondary_argument_reaches_primary_bus() {
        let dir = tempfile::tempdir().unwrap();
        let (primary_side, mut rx) = coordinator(dir.path(), "delivery");
        let _primary = start_primary(&primary_side).await;

        let (secondary_side, _) = coordinator(dir.path(), "delivery");
        let startup = secondary_side
            .start(LaunchArgument::new("/path/to/file.mp3"))
            .await
            .unwrap();

        assert!(matches!(startup, Startup::Secondary(HandoffOutcome::Delivered)));
        assert_eq!(next_message(&mut rx).await, "/path/to/file.mp3");
        // Exactly one event per handoff.
        assert!(time::timeout(TEST_TIMEOUT, rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn secondary_without_argument_forwards_show() {
        let dir = tempfile::tempdir().unwrap();
        let (primary_side, mut rx) = coordinator(dir.path(), "default-arg");
        let _primary = start_primary(&primary_side).await;

        let (secondary_side, _) = coordinator(dir.path(), "default-arg");
        secondary_side
            .start(LaunchArgument::from_arg(None))
            .await
            .unwrap();

        assert_eq!(next_message(&mut rx).await, "show");
    }

    #[tokio::test]
    async fn messages_arrive_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (primary_side, mut rx) = coordinator(dir.path(), "ordering");
        let _primary = start_primary(&primary_side).await;

        for name in ["one.mp3", "two.mp3", "three.mp3"] {
            handoff(&primary_side.endpoint(), &LaunchArgument::new(name), TEST_TIMEOUT)
                .await
                .unwrap();
        }
        for name in ["one.mp3", "two.mp3", "three.mp3"] {
            assert_eq!(next_message(&mut rx).await, name);
        }
    }

    #[tokio::test]
    async fn empty_connection_dispatches_show() {
        let dir = tempfile::tempdir().unwrap();
        let (primary_side, mut rx) = coordinator(dir.path(), "empty");
        let _primary = start_primary(&primary_side).await;

        let mut stream = primary_side.endpoint().connect().await.unwrap();
        stream.shutdown().await.unwrap();
        drop(stream);

        assert_eq!(next_message(&mut rx).await, "show");
    }

    #[tokio::test]
    async fn malformed_payload_dispatches_show() {
        let dir = tempfile::tempdir().unwrap();
        let (primary_side, mut rx) = coordinator(dir.path(), "malformed");
        let _primary = start_primary(&primary_side).await;

        let mut stream = primary_side.endpoint().connect().await.unwrap();
        stream.write_all(&[0xc3, 0x28, 0xff]).await.unwrap();
        stream.shutdown().await.unwrap();
        drop(stream);

        assert_eq!(next_message(&mut rx).await, "show");
    }

    #[tokio::test]
    async fn stalled_peer_does_not_block_later_handoffs() {
        let dir = tempfile::tempdir().unwrap();
        let (primary_side, mut rx) = coordinator(dir.path(), "stalled");
        let _primary = start_primary(&primary_side).await;

        // Connects and then says nothing while holding the connection open.
        let _stalled = primary_side.endpoint().connect().await.unwrap();

        handoff(&primary_side.endpoint(), &LaunchArgument::new("next.flac"), TEST_TIMEOUT * 2)
            .await
            .unwrap();
        assert_eq!(next_message(&mut rx).await, "next.flac");
    }

    #[tokio::test]
    async fn silent_peers_time_out_together() {
        let dir = tempfile::tempdir().unwrap();
        let (primary_side, mut rx) = coordinator(dir.path(), "silent-peers");
        let _primary = start_primary(&primary_side).await;

        let started = Instant::now();
        let mut silent = Vec::new();
        for _ in 0..3 {
            silent.push(primary_side.endpoint().connect().await.unwrap());
        }
        handoff(&primary_side.endpoint(), &LaunchArgument::new("queued.flac"), TEST_TIMEOUT)
            .await
            .unwrap();

        assert_eq!(next_message(&mut rx).await, "queued.flac");
        // Read one at a time, three silent peers would cost three timeouts.
        assert!(started.elapsed() < TEST_TIMEOUT * 2, "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn partial_payload_is_used_on_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let (primary_side, mut rx) = coordinator(dir.path(), "partial");
        let _primary = start_primary(&primary_side).await;

        // Writes but never closes; the read deadline cuts it off.
        let mut stream = primary_side.endpoint().connect().await.unwrap();
        stream.write_all(b"half.wav").await.unwrap();

        assert_eq!(next_message(&mut rx).await, "half.wav");
        drop(stream);
    }

    // ── Failure paths on the secondary ────────────────────────────────────────

    #[tokio::test]
    async fn refused_handoff_still_ends_as_secondary() {
        let dir = tempfile::tempdir().unwrap();
        let (c, _rx) = coordinator(dir.path(), "refused");
        // Hold the flag without any listener behind it.
        let _held = InstanceLock::try_acquire(&c.lock_path()).unwrap().unwrap();

        let startup = c.start(LaunchArgument::new("song.flac")).await.unwrap();
        match startup {
            Startup::Secondary(HandoffOutcome::Failed(HandoffError::Connect { .. })) => {}
            other => panic!("expected a failed handoff, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn secondary_finishes_when_primary_never_accepts() {
        let dir = tempfile::tempdir().unwrap();
        let (c, _rx) = coordinator(dir.path(), "never-accepts");
        let _held = InstanceLock::try_acquire(&c.lock_path()).unwrap().unwrap();
        // Bound but never accepted from.
        let _listener = c.endpoint().bind().unwrap();

        let started = Instant::now();
        let startup = c.start(LaunchArgument::new("song.flac")).await.unwrap();
        assert!(matches!(startup, Startup::Secondary(_)));
        assert!(started.elapsed() <= TEST_TIMEOUT * 2 + Duration::from_millis(200));
    }

    #[tokio::test]
    async fn read_payload_truncates_oversized_input() {
        let (mut client, server) = tokio::io::duplex(MAX_PAYLOAD_BYTES * 2);
        client.write_all(&vec![b'a'; MAX_PAYLOAD_BYTES + 10]).await.unwrap();
        drop(client);

        let argument = read_payload(server, TEST_TIMEOUT).await.unwrap();
        assert_eq!(argument.as_str().len(), MAX_PAYLOAD_BYTES);
    }

    #[tokio::test]
    async fn truncation_keeps_whole_characters() {
        let (mut client, server) = tokio::io::duplex(MAX_PAYLOAD_BYTES * 2);
        let mut payload = vec![b'a'; MAX_PAYLOAD_BYTES - 1];
        payload.extend_from_slice("é/song.flac".as_bytes());
        client.write_all(&payload).await.unwrap();
        drop(client);

        let argument = read_payload(server, TEST_TIMEOUT).await.unwrap();
        assert_eq!(argument.as_str().len(), MAX_PAYLOAD_BYTES - 1);
        assert!(argument.as_str().bytes().all(|b| b == b'a'));
    }

    #[test]
    fn trailing_partial_character_is_dropped() {
        let mut payload = "ça".as_bytes().to_vec();
        payload.push(0xc3);
        trim_incomplete_char(&mut payload);
        assert_eq!(payload, "ça".as_bytes());

        // Invalid bytes in the middle are left for from_payload to reject.
        let mut invalid = vec![0xff, b'a'];
        trim_incomplete_char(&mut invalid);
        assert_eq!(invalid, vec![0xff, b'a']);
    }

    #[tokio::test]
    async fn read_payload_times_out_on_silence() {
        let (_client, server) = tokio::io::duplex(64);
        let started = Instant::now();
        assert!(read_payload(server, TEST_TIMEOUT).await.is_none());
        assert!(started.elapsed() >= TEST_TIMEOUT);
    }
}
