//! Streaming server: control listener and per-connection sessions.
//!
//! The server accepts reliable control connections on TCP and hands each
//! one to a thread owning a [`ServerSession`]. Media leaves over a
//! per-session UDP socket driven by the [`sender`] worker while the
//! session is playing.

pub mod assets;
mod sender;
pub mod session;

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

pub use assets::{NullTranscoder, Transcoder};
pub use session::ServerSession;

use crate::error::{Result, StreamError};
use crate::protocol::ControlRequest;

/// Server-level configuration shared by all sessions.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Frame interval used when setup carries no `Frame-Rate` header
    /// (defaults to 50 ms, i.e. 20 fps).
    pub frame_interval: Duration,
    /// Pacing delay between the fragments of one frame.
    pub fragment_pacing: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(50),
            fragment_pacing: Duration::from_micros(100),
        }
    }
}

/// Control-plane server exposing the assets under one root directory.
pub struct Server {
    bind_addr: String,
    asset_root: PathBuf,
    running: Arc<AtomicBool>,
    config: Arc<ServerConfig>,
    transcoder: Arc<dyn Transcoder>,
}

impl Server {
    /// Server with default config and no transcoder (missing variants
    /// resolve to 404).
    pub fn new(bind_addr: &str, asset_root: impl Into<PathBuf>) -> Self {
        Self::with_config(bind_addr, asset_root, ServerConfig::default())
    }

    pub fn with_config(
        bind_addr: &str,
        asset_root: impl Into<PathBuf>,
        config: ServerConfig,
    ) -> Self {
        Self {
            bind_addr: bind_addr.to_string(),
            asset_root: asset_root.into(),
            running: Arc::new(AtomicBool::new(false)),
            config: Arc::new(config),
            transcoder: Arc::new(NullTranscoder),
        }
    }

    /// Install an offline transcoder used to regenerate missing asset
    /// variants.
    pub fn with_transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = transcoder;
        self
    }

    /// Bind the control listener and spawn the accept loop.
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(StreamError::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.bind_addr)?;
        listener.set_nonblocking(true)?;
        self.running.store(true, Ordering::SeqCst);

        tracing::info!(addr = %self.bind_addr, root = %self.asset_root.display(), "control server listening");

        let running = self.running.clone();
        let asset_root = self.asset_root.clone();
        let config = self.config.clone();
        let transcoder = self.transcoder.clone();
        thread::spawn(move || {
            accept_loop(listener, asset_root, config, transcoder, running);
        });

        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("server stopping");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Non-blocking accept loop with a 50 ms poll so `stop` terminates it
/// promptly.
fn accept_loop(
    listener: TcpListener,
    asset_root: PathBuf,
    config: Arc<ServerConfig>,
    transcoder: Arc<dyn Transcoder>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let root = asset_root.clone();
                let config = config.clone();
                let transcoder = transcoder.clone();
                let running = running.clone();
                thread::spawn(move || {
                    handle_connection(stream, peer, root, config, transcoder, running);
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "control accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// Control request/reply loop for one connection.
///
/// Each read yields one request (the peer writes one message per send);
/// requests the session drops get no reply on the wire.
fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    asset_root: PathBuf,
    config: Arc<ServerConfig>,
    transcoder: Arc<dyn Transcoder>,
    running: Arc<AtomicBool>,
) {
    tracing::info!(%peer, "client connected");

    let mut session = ServerSession::new(peer.ip(), asset_root, config, transcoder);
    let mut buf = [0u8; 2048];

    let reason = loop {
        if !running.load(Ordering::SeqCst) {
            break "server shutting down";
        }

        let n = match stream.read(&mut buf) {
            Ok(0) => break "connection closed by client",
            Ok(n) => n,
            Err(_) => break "read error",
        };

        let text = String::from_utf8_lossy(&buf[..n]);
        let request = match ControlRequest::parse(&text) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "unparseable control request dropped");
                continue;
            }
        };

        tracing::debug!(
            %peer,
            method = %request.method,
            resource = %request.resource,
            cseq = request.cseq().unwrap_or(0),
            "request"
        );

        if let Some(response) = session.handle(&request) {
            tracing::debug!(%peer, status = response.status_code, "reply");
            if stream.write_all(response.serialize().as_bytes()).is_err() {
                break "write error";
            }
        }
    };

    session.close();
    tracing::info!(%peer, reason, "client disconnected");
}
