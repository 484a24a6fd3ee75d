use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use crate::addr::SocketAddrV4;
use super::builder::{ServerConfig, SocketConfig};
use super::cancel::CancelToken;
use super::dispatch::{Connection, Dispatch, WorkerPool};
use super::{PollMode, Socket};

/// Callback run on a worker thread for each accepted connection.
///
/// The connection is closed once the callback returns.
pub type Handler = Arc<dyn Fn(&mut Connection) + Send + Sync>;

/// Lifecycle of a `ServerSocket`.
///
/// `Created -> Open -> Running -> Stopped`. A failed `open()` stays in `Created`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Open,
    Running,
    Stopped,
}

/// A listening TCP socket with one acceptor thread and a worker pool.
///
/// Exactly one thread calls `accept()`. Each accepted connection goes to
/// exactly one worker, which runs the handler and then closes it.
///
/// ```ignore
/// let mut server = ServerSocket::new(ServerConfig::new().max_connections(5));
/// server.on_accept(|conn| {
///     let mut text = Vec::new();
///     conn.read_to(&mut text).ok();
/// });
/// if server.open("127.0.0.1", 5555) && server.start() {
///     server.wait();
/// }
/// ```
pub struct ServerSocket {
    config: ServerConfig,
    state: ServerState,
    listener: Option<Socket>,
    local: Option<SocketAddrV4>,
    handler: Option<Handler>,
    token: CancelToken,
    running: Arc<AtomicBool>,
    accepted: Arc<AtomicUsize>,
    outstanding: Option<Arc<AtomicUsize>>,
    acceptor: Option<JoinHandle<Socket>>,
    pool: Option<WorkerPool>,
}

impl ServerSocket {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_token(config, CancelToken::new())
    }

    /// Uses `token` for shutdown. Cancelling it from anywhere stops the acceptor,
    /// and every `Connection` observes it.
    ///
    /// The server works on a child of `token`: stopping the server never
    /// cancels `token` itself, so other servers sharing it keep running.
    pub fn with_token(config: ServerConfig, token: CancelToken) -> Self {
        Self {
            config,
            state: ServerState::Created,
            listener: None,
            local: None,
            handler: None,
            token: token.child(),
            running: Arc::new(AtomicBool::new(false)),
            accepted: Arc::new(AtomicUsize::new(0)),
            outstanding: None,
            acceptor: None,
            pool: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// This server's own token, as seen by its connections.
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bound address once open. Useful after binding port 0.
    pub fn local_addr(&self) -> Option<SocketAddrV4> {
        self.local
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Connections queued or being handled right now.
    pub fn outstanding(&self) -> usize {
        self.outstanding.as_ref().map_or(0, |n| n.load(Ordering::SeqCst))
    }

    /// Sets the handler. Only takes effect for the next `start()`.
    pub fn on_accept<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut Connection) + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Creates the listening socket, binds and listens.
    ///
    /// An empty `address` binds every interface. Failures are logged and leave
    /// the server in `Created`, so `open` can be retried. A stopped server cannot
    /// be reopened. Returns whether the server is now open.
    pub fn open(&mut self, address: &str, port: u16) -> bool {
        if self.state != ServerState::Created {
            log::warn!("open({}:{}) ignored: server is {:?}", address, port, self.state);
            return false;
        }
        match self.try_open(address, port) {
            Ok(listener) => {
                self.local = listener.local_addr().ok();
                self.listener = Some(listener);
                self.state = ServerState::Open;
                log::debug!("server listening on {}", self.local.map_or_else(String::new, |a| a.to_string()));
                true
            }
            Err(err) => {
                log::warn!("server open({}:{}) failed: {}", address, port, err);
                self.state = ServerState::Created;
                false
            }
        }
    }

    fn try_open(&self, address: &str, port: u16) -> std::io::Result<Socket> {
        let addr = SocketAddrV4::parse(address, port)?;
        let mut listener = Socket::with_config(SocketConfig::tcp().blocking(false));
        listener.create()?;
        self.config.reuse.apply(&listener)?;
        self.config.listener.apply(&listener)?;
        listener.bind(&addr)?;
        listener.listen(self.config.backlog)?;
        Ok(listener)
    }

    /// Starts the worker pool and the acceptor thread.
    pub fn start(&mut self) -> bool {
        if self.state == ServerState::Running {
            return true;
        }
        let Some(listener) = self.listener.take() else {
            log::warn!("start() on a server that is not open");
            return false;
        };
        let pool = match WorkerPool::new(self.config.workers, self.config.queue_capacity, self.handler.clone()) {
            Ok(pool) => pool,
            Err(err) => {
                log::warn!("failed to start workers: {}", err);
                self.listener = Some(listener);
                return false;
            }
        };
        let Some(dispatch) = pool.dispatch() else {
            self.listener = Some(listener);
            return false;
        };
        let acceptor = Acceptor {
            config: self.config,
            token: self.token.clone(),
            running: Arc::clone(&self.running),
            accepted: Arc::clone(&self.accepted),
            dispatch,
        };
        self.running.store(true, Ordering::SeqCst);
        // the listener moves into the thread and comes back on join
        let spawned = std::thread::Builder::new()
            .name("socklane-acceptor".into())
            .spawn(move || acceptor.run(listener));
        match spawned {
            Ok(handle) => {
                self.outstanding = Some(pool.counter());
                self.pool = Some(pool);
                self.acceptor = Some(handle);
                self.state = ServerState::Running;
                log::debug!("server started with {} worker(s)", self.config.workers.max(1));
                true
            }
            Err(err) => {
                log::warn!("failed to spawn acceptor: {}", err);
                self.running.store(false, Ordering::SeqCst);
                pool.shutdown(Duration::ZERO);
                self.state = ServerState::Stopped;
                false
            }
        }
    }

    /// Stops accepting, then drains in-flight handlers for up to `drain_timeout`.
    ///
    /// Cancels the server's own token, so handlers polling it can bail out early.
    /// A token passed to `with_token` is left alone.
    pub fn stop(&mut self) {
        match self.state {
            ServerState::Running => {
                self.running.store(false, Ordering::SeqCst);
                self.token.cancel();
                self.finish();
            }
            ServerState::Open => {
                if let Some(mut listener) = self.listener.take() {
                    listener.close();
                }
                self.state = ServerState::Stopped;
                log::debug!("server closed before start");
            }
            ServerState::Created | ServerState::Stopped => {}
        }
    }

    /// Blocks until the acceptor ends on its own (max connections reached or
    /// token cancelled elsewhere), then drains like `stop()`.
    pub fn wait(&mut self) {
        if self.state == ServerState::Running {
            self.finish();
        }
    }

    fn finish(&mut self) {
        let started = Instant::now();
        if let Some(acceptor) = self.acceptor.take() {
            match acceptor.join() {
                Ok(mut listener) => listener.close(),
                Err(_) => log::warn!("acceptor thread panicked"),
            }
        }
        self.running.store(false, Ordering::SeqCst);
        if let Some(pool) = self.pool.take() {
            pool.shutdown(self.config.drain_timeout);
        }
        self.state = ServerState::Stopped;
        log::debug!(
            "server stopped after {} connection(s) in {:?}",
            self.accepted(), started.elapsed()
        );
    }
}

impl Drop for ServerSocket {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ServerSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSocket")
            .field("state", &self.state)
            .field("local", &self.local)
            .field("accepted", &self.accepted())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

/// Everything the acceptor thread needs, moved into it at `start()`.
struct Acceptor {
    config: ServerConfig,
    token: CancelToken,
    running: Arc<AtomicBool>,
    accepted: Arc<AtomicUsize>,
    dispatch: Dispatch,
}

impl Acceptor {
    fn keep_going(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.token.is_cancelled()
    }

    fn run(self, listener: Socket) -> Socket {
        let poll_ms = self.config.poll_interval_ms.max(0);
        let retry = Duration::from_millis(poll_ms.max(1) as u64);
        while self.keep_going() {
            if let Some(max) = self.config.max_connections
                && self.accepted.load(Ordering::SeqCst) >= max
            {
                log::debug!("accepted {} connection(s), acceptor done", max);
                break;
            }
            match listener.poll(poll_ms, PollMode::Read) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    log::trace!("listener poll: {}", err);
                    std::thread::yield_now();
                    continue;
                }
            }
            let (socket, peer) = match listener.accept() {
                Ok(pair) => pair,
                Err(err) => {
                    // spurious readiness or an aborted handshake
                    log::trace!("{}", err);
                    continue;
                }
            };
            if let Err(err) = self.config.connection.apply(&socket) {
                log::debug!("options on connection from {}: {}", peer, err);
            }
            let ordinal = self.accepted.fetch_add(1, Ordering::SeqCst) + 1;
            log::debug!("accepted #{} from {}", ordinal, peer);
            let deadline = self.config.handler_timeout.map(|t| Instant::now() + t);
            let conn = Connection::new(socket, peer, ordinal, self.token.clone(), deadline, self.config.stream);
            self.dispatch.submit(conn, retry, || !self.keep_going());
        }
        self.running.store(false, Ordering::SeqCst);
        listener
    }
}
