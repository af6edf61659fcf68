/// Local listening endpoint shared by the primary and secondary instances.
///
/// Unix uses a domain socket `<runtime_dir>/<name>.sock`; Windows uses the
/// named pipe `\\.\pipe\<name>`. Both expose the same small surface: the
/// primary binds a [`Listener`] and accepts streams, a secondary connects a
/// client stream. Neither side applies timeouts here; callers wrap every
/// step in `tokio::time::timeout`.
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

pub use imp::{ClientStream, Listener};

/// Address of the local endpoint for one instance key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    address: PathBuf,
}

impl Endpoint {
    /// `name` must already be safe for use as a file name.
    pub fn new(runtime_dir: &Path, name: &str) -> Self {
        Self {
            address: imp::address(runtime_dir, name),
        }
    }

    /// Binds the listener. Only the holder of the instance lock may call
    /// this: on unix it first unlinks a socket left behind by a crashed
    /// primary.
    pub fn bind(&self) -> io::Result<Listener> {
        imp::bind(&self.address)
    }

    pub async fn connect(&self) -> io::Result<ClientStream> {
        imp::connect(&self.address).await
    }

    /// Removes the socket file so later connects fail fast. No-op on Windows.
    pub fn remove(&self) {
        imp::remove(&self.address);
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address.display())
    }
}

// ── Unix domain socket ────────────────────────────────────────────────────────

#[cfg(unix)]
mod imp {
    use std::io;
    use std::path::{Path, PathBuf};
    use tokio::net::{UnixListener, UnixStream};

    pub type ClientStream = UnixStream;
    pub type ServerStream = UnixStream;

    pub fn address(runtime_dir: &Path, name: &str) -> PathBuf {
        runtime_dir.join(format!("{name}.sock"))
    }

    #[derive(Debug)]
    pub struct Listener {
        inner: UnixListener,
    }

    impl Listener {
        pub async fn accept(&mut self) -> io::Result<ServerStream> {
            let (stream, _) = self.inner.accept().await?;
            Ok(stream)
        }
    }

    pub fn bind(path: &Path) -> io::Result<Listener> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::remove_file(path) {
            Ok(()) => log::debug!("Removed stale socket {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok(Listener {
            inner: UnixListener::bind(path)?,
        })
    }

    pub async fn connect(path: &Path) -> io::Result<ClientStream> {
        UnixStream::connect(path).await
    }

    pub fn remove(path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!("Failed to remove socket {}: {e}", path.display());
            }
        }
    }
}

// ── Windows named pipe ────────────────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use std::io;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tokio::net::windows::named_pipe::{
        ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions,
    };

    /// `ERROR_PIPE_BUSY`: every server instance is currently connected.
    const ERROR_PIPE_BUSY: i32 = 231;
    const BUSY_RETRY_DELAY: Duration = Duration::from_millis(20);

    pub type ClientStream = NamedPipeClient;
    pub type ServerStream = NamedPipeServer;

    pub fn address(_runtime_dir: &Path, name: &str) -> PathBuf {
        PathBuf::from(format!(r"\\.\pipe\{name}"))
    }

    /// Holds the next unconnected server instance. Accepting hands out the
    /// connected instance and immediately creates a fresh one.
    #[derive(Debug)]
    pub struct Listener {
        address: PathBuf,
        next: NamedPipeServer,
    }

    impl Listener {
        pub async fn accept(&mut self) -> io::Result<ServerStream> {
            self.next.connect().await?;
            let fresh = ServerOptions::new().create(&self.address)?;
            Ok(std::mem::replace(&mut self.next, fresh))
        }
    }

    pub fn bind(path: &Path) -> io::Result<Listener> {
        let next = ServerOptions::new()
            .first_pipe_instance(true)
            .create(path)?;
        Ok(Listener {
            address: path.to_path_buf(),
            next,
        })
    }

    pub async fn connect(path: &Path) -> io::Result<ClientStream> {
        loop {
            match ClientOptions::new().open(path) {
                Ok(client) => return Ok(client),
                Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) => {}
                Err(e) => return Err(e),
            }
            tokio::time::sleep(BUSY_RETRY_DELAY).await;
        }
    }

    pub fn remove(_path: &Path) {}
}
