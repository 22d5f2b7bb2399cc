//! Streaming client: control session, reply correlation, and playback
//! buffering.
//!
//! A [`Client`] owns one control connection and, after setup, one datagram
//! receive endpoint bound to a fixed local port. Three workers cooperate:
//!
//! - the **reply listener** reads the control connection and applies
//!   replies that correlate with the last sent request;
//! - the **receiver worker** drains the datagram socket, reassembles
//!   frames, and drives the watermark flow control;
//! - the embedder's playback loop pops frames via
//!   [`next_frame`](Client::next_frame).
//!
//! A client instance is one-shot: after teardown has been acknowledged it
//! cannot be set up again.

mod receiver;

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::buffer::{FlowPolicy, PlaybackQueue};
use crate::error::{Result, StreamError};
use crate::protocol::{ControlRequest, ControlResponse, Method, Quality};
use crate::session::SessionState;
use crate::store::Frame;
use crate::sync::Signal;

/// Client-side knobs sent with setup or governing the receive path.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Requested playback frame rate (the `Frame-Rate` setup header).
    pub frame_rate: u32,
    /// Requested asset quality (the `X-Quality` setup header).
    pub quality: Quality,
    /// Watermark policy for the adaptive buffer controller.
    pub policy: FlowPolicy,
    /// Bounded wait on the datagram socket, so the receiver re-evaluates
    /// watermarks and shutdown even with no traffic.
    pub receive_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            frame_rate: 20,
            quality: Quality::Normal,
            policy: FlowPolicy::default(),
            receive_timeout: Duration::from_millis(500),
        }
    }
}

/// Handle to one client session.
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    /// Write half of the control connection. The reply listener reads a
    /// cloned handle.
    control: Mutex<TcpStream>,
    resource: String,
    data_port: u16,
    config: ClientConfig,
    state: Mutex<SessionState>,
    /// Monotonic request counter; +1 per request sent.
    seq: AtomicU32,
    /// Kind of the most recently sent request; doubles as the
    /// "pause outstanding" state for flow control.
    last_request: Mutex<Option<Method>>,
    /// 0 until the first correlated reply assigns it.
    session_id: AtomicU32,
    teardown_acked: AtomicBool,
    pre_buffering: AtomicBool,
    total_frames: AtomicU64,
    queue: PlaybackQueue,
    data_socket: Mutex<Option<Arc<UdpSocket>>>,
    /// Set when a pause reply lands; releases waiters blocked on
    /// sender-stopped.
    pause_acked: Signal,
    receiver_running: AtomicBool,
}

impl Client {
    /// Open the control connection. `data_port` is the fixed local port the
    /// datagram receiver will bind during setup.
    ///
    /// A failed connect surfaces as [`StreamError::Io`].
    pub fn connect(server_addr: impl ToSocketAddrs, data_port: u16, resource: &str) -> Result<Self> {
        Self::connect_with_config(server_addr, data_port, resource, ClientConfig::default())
    }

    pub fn connect_with_config(
        server_addr: impl ToSocketAddrs,
        data_port: u16,
        resource: &str,
        config: ClientConfig,
    ) -> Result<Self> {
        let stream = TcpStream::connect(server_addr)?;
        tracing::info!(peer = %stream.peer_addr()?, resource, "control connection established");

        Ok(Self {
            inner: Arc::new(ClientInner {
                control: Mutex::new(stream),
                resource: resource.to_string(),
                data_port,
                config,
                state: Mutex::new(SessionState::Init),
                seq: AtomicU32::new(0),
                last_request: Mutex::new(None),
                session_id: AtomicU32::new(0),
                teardown_acked: AtomicBool::new(false),
                pre_buffering: AtomicBool::new(false),
                total_frames: AtomicU64::new(0),
                queue: PlaybackQueue::new(),
                data_socket: Mutex::new(None),
                pause_acked: Signal::new(),
                receiver_running: AtomicBool::new(false),
            }),
        })
    }

    /// Request a session. Legal from Init only; otherwise a no-op.
    ///
    /// Binds the local datagram port up front (surfacing
    /// [`StreamError::PortBind`]), spawns the reply listener, and sends
    /// Setup. On the server's 200 the client moves to Ready, starts the
    /// receiver worker, and auto-issues Play so the buffer pre-fills
    /// before user-initiated playback.
    pub fn setup(&self) -> Result<()> {
        if *self.inner.state.lock() != SessionState::Init {
            tracing::debug!("setup outside Init ignored");
            return Ok(());
        }

        self.inner.open_data_socket()?;
        self.inner.pre_buffering.store(true, Ordering::SeqCst);

        let reader = self.inner.control.lock().try_clone()?;
        let inner = self.inner.clone();
        thread::spawn(move || reply_listener(inner, reader));

        self.inner.send_request(Method::Setup)
    }

    /// Start or resume playback. Legal from Ready only; otherwise a no-op.
    ///
    /// Sends Play only when the server's sender actually needs (re)starting,
    /// i.e. when the last sent request was Pause or Setup.
    pub fn play(&self) -> Result<()> {
        {
            let state = self.inner.state.lock();
            if *state != SessionState::Ready {
                tracing::debug!(state = ?*state, "play outside Ready ignored");
                return Ok(());
            }
        }

        self.inner.pre_buffering.store(false, Ordering::SeqCst);
        ensure_receiver(&self.inner);

        let last = *self.inner.last_request.lock();
        if last == Some(Method::Pause) || last == Some(Method::Setup) {
            self.inner.send_request(Method::Play)?;
        }

        *self.inner.state.lock() = SessionState::Playing;
        tracing::info!("playback started");
        Ok(())
    }

    /// Freeze playback locally. Legal from Playing only; otherwise a no-op.
    ///
    /// Deliberately sends **no** control message: the server keeps
    /// streaming so the buffer refills while playback is frozen, and the
    /// watermark controller pauses it when the queue is full.
    pub fn pause(&self) {
        let mut state = self.inner.state.lock();
        if *state != SessionState::Playing {
            tracing::debug!(state = ?*state, "pause outside Playing ignored");
            return;
        }
        *state = SessionState::Ready;
        tracing::info!("playback frozen; buffer keeps filling");
    }

    /// Tear the session down. Sent unconditionally unless still in Init.
    pub fn teardown(&self) -> Result<()> {
        if *self.inner.state.lock() == SessionState::Init {
            tracing::debug!("teardown in Init ignored");
            return Ok(());
        }
        self.inner.send_request(Method::Teardown)
    }

    /// Pop the next reassembled frame for presentation.
    pub fn next_frame(&self) -> Option<Frame> {
        self.inner.queue.pop()
    }

    pub fn queue_depth(&self) -> usize {
        self.inner.queue.depth()
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Session id assigned by the server (0 before setup completes).
    pub fn session_id(&self) -> u32 {
        self.inner.session_id.load(Ordering::SeqCst)
    }

    /// Asset length reported in the setup reply (0 if unknown).
    pub fn total_frames(&self) -> u64 {
        self.inner.total_frames.load(Ordering::SeqCst)
    }

    pub fn teardown_acknowledged(&self) -> bool {
        self.inner.teardown_acked.load(Ordering::SeqCst)
    }

    /// Block until the server acknowledged a pause (its sender stopped) or
    /// the timeout elapses.
    pub fn wait_sender_stopped(&self, timeout: Duration) -> bool {
        self.inner.pause_acked.wait_timeout(timeout)
    }
}

impl ClientInner {
    /// Serialize and send one control request, advancing the sequence
    /// counter by exactly one and recording the request kind.
    pub(crate) fn send_request(&self, method: Method) -> Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;

        let mut request =
            ControlRequest::new(method, &self.resource).add_header("CSeq", &seq.to_string());
        match method {
            Method::Setup => {
                request = request
                    .add_header(
                        "Transport",
                        &format!("RTP/UDP; client_port={}", self.data_port),
                    )
                    .add_header("Frame-Rate", &self.config.frame_rate.to_string())
                    .add_header("X-Quality", self.config.quality.as_str());
            }
            Method::Play | Method::Pause | Method::Teardown => {
                request = request.add_header(
                    "Session",
                    &self.session_id.load(Ordering::SeqCst).to_string(),
                );
            }
        }

        if method == Method::Play {
            // Arm the pause waiter again for the next pause cycle.
            self.pause_acked.clear();
        }
        *self.last_request.lock() = Some(method);

        self.control
            .lock()
            .write_all(request.serialize().as_bytes())?;
        tracing::debug!(%method, seq, "control request sent");
        Ok(())
    }

    /// Bind the datagram receiver on the fixed local port with a bounded
    /// read timeout.
    fn open_data_socket(&self) -> Result<()> {
        let socket = UdpSocket::bind(("0.0.0.0", self.data_port)).map_err(|e| {
            StreamError::PortBind {
                port: self.data_port,
                source: e,
            }
        })?;
        socket.set_read_timeout(Some(self.config.receive_timeout))?;
        *self.data_socket.lock() = Some(Arc::new(socket));
        tracing::debug!(port = self.data_port, "data socket bound");
        Ok(())
    }
}

/// Background loop reading the control connection and applying replies.
fn reply_listener(inner: Arc<ClientInner>, mut stream: TcpStream) {
    tracing::debug!("reply listener started");
    let mut buf = [0u8; 1024];
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => {
                tracing::debug!("control connection closed by server");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "control read failed");
                break;
            }
        };

        let text = String::from_utf8_lossy(&buf[..n]);
        match ControlResponse::parse(&text) {
            Ok(reply) => handle_reply(&inner, reply),
            // Malformed replies are dropped; the user re-requests, the
            // stack never retries on its own.
            Err(e) => tracing::warn!(error = %e, "malformed reply dropped"),
        }

        if inner.teardown_acked.load(Ordering::SeqCst) {
            break;
        }
    }
    tracing::debug!("reply listener exited");
}

/// Whether a reply correlates with the last sent request.
///
/// The echoed CSeq must equal the most recently sent sequence number, and
/// once a session id has been assigned the reply must carry it.
fn reply_is_relevant(reply: &ControlResponse, expected_seq: u32, session_id: u32) -> bool {
    if reply.cseq != expected_seq {
        tracing::warn!(
            got = reply.cseq,
            expected = expected_seq,
            "reply CSeq mismatch dropped"
        );
        return false;
    }
    if session_id != 0 && reply.session != session_id {
        tracing::warn!(
            got = reply.session,
            expected = session_id,
            "reply session mismatch dropped"
        );
        return false;
    }
    true
}

fn handle_reply(inner: &Arc<ClientInner>, reply: ControlResponse) {
    let expected_seq = inner.seq.load(Ordering::SeqCst);
    let session_id = inner.session_id.load(Ordering::SeqCst);
    if !reply_is_relevant(&reply, expected_seq, session_id) {
        return;
    }

    if session_id == 0 {
        inner.session_id.store(reply.session, Ordering::SeqCst);
    }
    if let Some(total) = reply.total_frames {
        inner.total_frames.store(total, Ordering::SeqCst);
    }

    if !reply.is_ok() {
        tracing::warn!(status = reply.status_code, reason = %reply.reason, "request failed");
        return;
    }

    let last = *inner.last_request.lock();
    match last {
        Some(Method::Setup) => on_setup_ok(inner),
        Some(Method::Pause) => {
            tracing::debug!("pause acknowledged; sender stopped");
            inner.pause_acked.set();
        }
        Some(Method::Teardown) => {
            *inner.state.lock() = SessionState::Init;
            inner.teardown_acked.store(true, Ordering::SeqCst);
            tracing::info!("teardown acknowledged");
        }
        Some(Method::Play) | None => {}
    }
}

fn on_setup_ok(inner: &Arc<ClientInner>) {
    *inner.state.lock() = SessionState::Ready;
    ensure_receiver(inner);

    tracing::info!(
        session_id = inner.session_id.load(Ordering::SeqCst),
        total_frames = inner.total_frames.load(Ordering::SeqCst),
        "session ready; pre-buffering"
    );

    // Kick the server's sender so the buffer fills before user play.
    if let Err(e) = inner.send_request(Method::Play) {
        tracing::warn!(error = %e, "pre-buffer play failed");
    }
}

/// Start the receiver worker unless it is already running.
fn ensure_receiver(inner: &Arc<ClientInner>) {
    if inner.receiver_running.swap(true, Ordering::SeqCst) {
        return;
    }
    let Some(socket) = inner.data_socket.lock().clone() else {
        inner.receiver_running.store(false, Ordering::SeqCst);
        tracing::warn!("receiver not started: data socket unbound");
        return;
    };
    let inner = inner.clone();
    thread::spawn(move || receiver::run(inner, socket));
}
