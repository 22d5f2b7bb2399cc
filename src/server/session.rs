//! Server-side session state machine.
//!
//! One `ServerSession` per accepted control connection. It resolves and
//! opens the asset on setup, owns the datagram send endpoint and the frame
//! store, and starts/stops the sender worker as the session moves between
//! Ready and Playing.
//!
//! Requests arriving outside their legal source state produce **no reply**
//! ([`handle`](ServerSession::handle) returns `None`); the client relies on
//! user-triggered re-requests, not retransmission.

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use rand::RngExt;

use super::assets::{self, Transcoder};
use super::sender::{self, SenderContext};
use super::ServerConfig;
use crate::protocol::{ControlRequest, ControlResponse, Method};
use crate::session::SessionState;
use crate::store::FrameStore;
use crate::sync::Signal;

/// Per-connection session state on the server.
pub struct ServerSession {
    state: SessionState,
    /// Random 6-digit token, assigned at setup.
    id: u32,
    peer_ip: IpAddr,
    asset_root: PathBuf,
    config: Arc<ServerConfig>,
    transcoder: Arc<dyn Transcoder>,
    store: Option<Arc<Mutex<FrameStore>>>,
    send_interval: Duration,
    data_socket: Option<Arc<UdpSocket>>,
    data_addr: Option<SocketAddr>,
    stop: Arc<Signal>,
    sender: Option<JoinHandle<()>>,
}

impl ServerSession {
    pub fn new(
        peer_ip: IpAddr,
        asset_root: PathBuf,
        config: Arc<ServerConfig>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        let send_interval = config.frame_interval;
        Self {
            state: SessionState::Init,
            id: 0,
            peer_ip,
            asset_root,
            config,
            transcoder,
            store: None,
            send_interval,
            data_socket: None,
            data_addr: None,
            stop: Arc::new(Signal::new()),
            sender: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Per-session frame interval (from the setup `Frame-Rate` header, or
    /// the server default of ~20 fps).
    pub fn send_interval(&self) -> Duration {
        self.send_interval
    }

    /// Process one control request.
    ///
    /// `None` means no reply is written: the request arrived outside its
    /// legal source state and is dropped.
    pub fn handle(&mut self, request: &ControlRequest) -> Option<ControlResponse> {
        let cseq = request.cseq().unwrap_or(0);

        match request.method {
            Method::Setup => self.handle_setup(cseq, request),
            Method::Play => self.handle_play(cseq),
            Method::Pause => self.handle_pause(cseq),
            Method::Teardown => Some(self.handle_teardown(cseq)),
        }
    }

    fn handle_setup(&mut self, cseq: u32, request: &ControlRequest) -> Option<ControlResponse> {
        if self.state != SessionState::Init {
            tracing::warn!(state = ?self.state, "SETUP outside Init dropped");
            return None;
        }

        let path = match assets::prepare_asset(
            &self.asset_root,
            &request.resource,
            request.quality(),
            self.transcoder.as_ref(),
        ) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(resource = %request.resource, error = %e, "asset resolution failed");
                return Some(ControlResponse::not_found(cseq));
            }
        };

        let store = match FrameStore::open(&path) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "frame store open failed");
                return Some(ControlResponse::not_found(cseq));
            }
        };
        let total = match store.count_frames() {
            Ok(total) => total,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "frame count failed");
                return Some(ControlResponse::server_error(cseq));
            }
        };

        let Some(client_port) = request.client_port() else {
            tracing::warn!(%cseq, "SETUP missing client_port in Transport header");
            return Some(ControlResponse::server_error(cseq));
        };

        if let Some(fps) = request.frame_rate() {
            self.send_interval = Duration::from_secs_f64(1.0 / f64::from(fps));
        }

        self.data_addr = Some(SocketAddr::new(self.peer_ip, client_port));
        self.store = Some(Arc::new(Mutex::new(store)));
        self.id = rand::rng().random_range(100_000..=999_999);
        self.state = SessionState::Ready;

        tracing::info!(
            session_id = self.id,
            resource = %request.resource,
            total_frames = total,
            interval_ms = self.send_interval.as_millis() as u64,
            client_port,
            "session ready"
        );

        let mut response = ControlResponse::ok(cseq, self.id);
        if total > 0 {
            response = response.with_total_frames(total);
        }
        Some(response)
    }

    fn handle_play(&mut self, cseq: u32) -> Option<ControlResponse> {
        if self.state != SessionState::Ready {
            tracing::warn!(state = ?self.state, "PLAY outside Ready dropped");
            return None;
        }

        let (Some(store), Some(dest)) = (self.store.clone(), self.data_addr) else {
            tracing::error!(session_id = self.id, "PLAY with no prepared session resources");
            return Some(ControlResponse::server_error(cseq));
        };

        // The send endpoint is opened once and survives pause cycles.
        let socket = match &self.data_socket {
            Some(socket) => socket.clone(),
            None => match UdpSocket::bind(("0.0.0.0", 0)) {
                Ok(socket) => {
                    let socket = Arc::new(socket);
                    self.data_socket = Some(socket.clone());
                    socket
                }
                Err(e) => {
                    tracing::error!(session_id = self.id, error = %e, "data socket bind failed");
                    return Some(ControlResponse::server_error(cseq));
                }
            },
        };

        self.state = SessionState::Playing;
        self.stop.clear();
        self.sender = Some(sender::spawn(SenderContext {
            session_id: self.id,
            store,
            socket,
            dest,
            interval: self.send_interval,
            pacing: self.config.fragment_pacing,
            stop: self.stop.clone(),
        }));

        tracing::info!(session_id = self.id, "session playing");
        Some(ControlResponse::ok(cseq, self.id))
    }

    fn handle_pause(&mut self, cseq: u32) -> Option<ControlResponse> {
        if self.state != SessionState::Playing {
            tracing::warn!(state = ?self.state, "PAUSE outside Playing dropped");
            return None;
        }

        self.stop.set();
        self.state = SessionState::Ready;
        tracing::info!(session_id = self.id, "session paused");
        Some(ControlResponse::ok(cseq, self.id))
    }

    /// Teardown is accepted from any state; from Init it is a bare
    /// acknowledgment with session id 0.
    fn handle_teardown(&mut self, cseq: u32) -> ControlResponse {
        let id = self.id;
        self.release();
        tracing::info!(session_id = id, "session torn down");
        ControlResponse::ok(cseq, id)
    }

    /// Release all session resources; also invoked when the control
    /// connection drops.
    pub fn close(&mut self) {
        if self.state != SessionState::Init || self.sender.is_some() {
            self.release();
            tracing::debug!(session_id = self.id, "session closed with connection");
        }
    }

    fn release(&mut self) {
        // Signal first, then join, then drop the socket: the sender checks
        // the signal before every send, so it can never write to a closed
        // endpoint.
        self.stop.set();
        if let Some(handle) = self.sender.take() {
            let _ = handle.join();
        }
        self.data_socket = None;
        self.store = None;
        self.state = SessionState::Init;
    }
}
