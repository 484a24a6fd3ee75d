use std::time::Duration;
use crate::addr::AddressFamily;
use super::{Protocol, Socket, SocketType};

/// Default kernel buffer size for client sockets.
pub const DEFAULT_IO_BUFFER_SIZE: usize = 8192;
/// Default send/receive timeout, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: i32 = 2000;
/// Default listen backlog.
pub const DEFAULT_BACKLOG: i32 = 256;

// ============================================================================
// Shared Configuration Structs
// ============================================================================

/// Family/type/protocol used when the socket is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketConfig {
	pub family: AddressFamily,
	pub sock_type: SocketType,
	pub protocol: Protocol,
	pub blocking: bool,
}

impl Default for SocketConfig {
	fn default() -> Self {
		Self {
			family: AddressFamily::Unspecified,
			sock_type: SocketType::Unknown,
			protocol: Protocol::Unspecified,
			blocking: true,
		}
	}
}

impl SocketConfig {
	pub fn new() -> Self {
		Self::default()
	}

	/// IPv4 TCP stream.
	pub fn tcp() -> Self {
		Self {
			family: AddressFamily::INet,
			sock_type: SocketType::Stream,
			protocol: Protocol::Tcp,
			blocking: true,
		}
	}

	pub fn family(mut self, family: AddressFamily) -> Self {
		self.family = family;
		self
	}

	pub fn sock_type(mut self, sock_type: SocketType) -> Self {
		self.sock_type = sock_type;
		self
	}

	pub fn protocol(mut self, protocol: Protocol) -> Self {
		self.protocol = protocol;
		self
	}

	pub fn blocking(mut self, blocking: bool) -> Self {
		self.blocking = blocking;
		self
	}
}

/// Buffer size configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferConfig {
	pub recv: Option<usize>,
	pub send: Option<usize>,
}

impl BufferConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn recv(mut self, size: usize) -> Self {
		self.recv = Some(size);
		self
	}

	pub fn send(mut self, size: usize) -> Self {
		self.send = Some(size);
		self
	}

	pub fn both(mut self, size: usize) -> Self {
		self.recv = Some(size);
		self.send = Some(size);
		self
	}

	fn apply(&self, socket: &Socket) -> std::io::Result<()> {
		if let Some(size) = self.recv {
			socket.set_receive_buffer_size(size)?;
		}
		if let Some(size) = self.send {
			socket.set_send_buffer_size(size)?;
		}
		Ok(())
	}
}

/// Kernel send/receive timeouts in milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutConfig {
	pub send_ms: Option<i32>,
	pub recv_ms: Option<i32>,
}

impl TimeoutConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn send(mut self, ms: i32) -> Self {
		self.send_ms = Some(ms);
		self
	}

	pub fn recv(mut self, ms: i32) -> Self {
		self.recv_ms = Some(ms);
		self
	}

	pub fn both(mut self, ms: i32) -> Self {
		self.send_ms = Some(ms);
		self.recv_ms = Some(ms);
		self
	}

	fn apply(&self, socket: &Socket) -> std::io::Result<()> {
		if let Some(ms) = self.send_ms {
			socket.set_send_timeout(ms)?;
		}
		if let Some(ms) = self.recv_ms {
			socket.set_receive_timeout(ms)?;
		}
		Ok(())
	}
}

/// Address reuse configuration.
#[derive(Debug, Clone, Copy)]
pub struct ReuseConfig {
	pub addr: bool,
	pub port: bool,
}

impl Default for ReuseConfig {
	fn default() -> Self {
		Self {
			addr: true,  // Almost always want this for servers
			port: false,
		}
	}
}

impl ReuseConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn addr(mut self, enable: bool) -> Self {
		self.addr = enable;
		self
	}

	pub fn port(mut self, enable: bool) -> Self {
		self.port = enable;
		self
	}

	pub(crate) fn apply(&self, socket: &Socket) -> std::io::Result<()> {
		if self.addr {
			socket.set_reuse_address(true)?;
		}
		if self.port {
			socket.set_reuse_port(true)?;
		}
		Ok(())
	}
}

/// Keep-alive timing configuration.
#[derive(Debug, Clone, Copy)]
pub struct KeepaliveConfig {
	pub idle_secs: u32,
	pub interval_secs: u32,
	pub count: u32,
}

impl Default for KeepaliveConfig {
	fn default() -> Self {
		Self {
			idle_secs: 60,
			interval_secs: 10,
			count: 5,
		}
	}
}

impl KeepaliveConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn idle(mut self, secs: u32) -> Self {
		self.idle_secs = secs;
		self
	}

	pub fn interval(mut self, secs: u32) -> Self {
		self.interval_secs = secs;
		self
	}

	pub fn count(mut self, count: u32) -> Self {
		self.count = count;
		self
	}
}

/// Options applied to a freshly created or accepted socket.
///
/// `None` leaves the kernel default untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketOptions {
	pub keepalive: Option<bool>,
	pub keepalive_timing: Option<KeepaliveConfig>,
	pub debug: Option<bool>,
	pub do_not_route: Option<bool>,
	pub broadcast: Option<bool>,
	pub nodelay: Option<bool>,
	pub blocking: Option<bool>,
	pub buffers: BufferConfig,
	pub timeouts: TimeoutConfig,
}

impl SocketOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn keepalive(mut self, enable: bool) -> Self {
		self.keepalive = Some(enable);
		self
	}

	/// Enables keep-alive with explicit probe timing.
	pub fn keepalive_timing(mut self, config: KeepaliveConfig) -> Self {
		self.keepalive = Some(true);
		self.keepalive_timing = Some(config);
		self
	}

	pub fn debug(mut self, enable: bool) -> Self {
		self.debug = Some(enable);
		self
	}

	pub fn do_not_route(mut self, enable: bool) -> Self {
		self.do_not_route = Some(enable);
		self
	}

	pub fn broadcast(mut self, enable: bool) -> Self {
		self.broadcast = Some(enable);
		self
	}

	pub fn nodelay(mut self, enable: bool) -> Self {
		self.nodelay = Some(enable);
		self
	}

	pub fn blocking(mut self, enable: bool) -> Self {
		self.blocking = Some(enable);
		self
	}

	pub fn buffers(mut self, config: BufferConfig) -> Self {
		self.buffers = config;
		self
	}

	pub fn timeouts(mut self, config: TimeoutConfig) -> Self {
		self.timeouts = config;
		self
	}

	pub fn apply(&self, socket: &Socket) -> std::io::Result<()> {
		if let Some(enable) = self.keepalive {
			socket.set_keep_alive(enable)?;
		}
		if let Some(timing) = self.keepalive_timing {
			socket.set_keepalive_timing(timing)?;
		}
		if let Some(enable) = self.debug {
			socket.set_debug(enable)?;
		}
		if let Some(enable) = self.do_not_route {
			socket.set_do_not_route(enable)?;
		}
		if let Some(enable) = self.broadcast {
			socket.set_broadcast(enable)?;
		}
		if let Some(enable) = self.nodelay {
			socket.set_nodelay(enable)?;
		}
		if let Some(enable) = self.blocking {
			socket.set_blocking(enable)?;
		}
		self.buffers.apply(socket)?;
		self.timeouts.apply(socket)
	}
}

/// Block size and timeout used by the stream adapters.
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
	pub block_size: usize,
	pub timeout_ms: i32,
}

impl Default for StreamConfig {
	fn default() -> Self {
		Self {
			block_size: 4096,
			timeout_ms: DEFAULT_TIMEOUT_MS,
		}
	}
}

impl StreamConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn block_size(mut self, size: usize) -> Self {
		self.block_size = size;
		self
	}

	pub fn timeout_ms(mut self, ms: i32) -> Self {
		self.timeout_ms = ms;
		self
	}
}

// ============================================================================
// Client
// ============================================================================

/// Settings applied by `ClientSocket` before it connects.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
	pub options: SocketOptions,
	pub stream: StreamConfig,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			options: SocketOptions::new()
				.keepalive(true)
				.buffers(BufferConfig::new().both(DEFAULT_IO_BUFFER_SIZE))
				.timeouts(TimeoutConfig::new().both(DEFAULT_TIMEOUT_MS)),
			stream: StreamConfig::default(),
		}
	}
}

impl ClientConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn options(mut self, options: SocketOptions) -> Self {
		self.options = options;
		self
	}

	pub fn stream(mut self, config: StreamConfig) -> Self {
		self.stream = config;
		self
	}
}

// ============================================================================
// Server
// ============================================================================

/// Settings for `ServerSocket`.
///
/// # Example
/// ```ignore
/// use socklane::{ServerConfig, StreamConfig};
///
/// let config = ServerConfig::new()
///     .backlog(512)
///     .workers(8)
///     .max_connections(5)
///     .stream(StreamConfig::new().block_size(72).timeout_ms(500));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
	pub backlog: i32,
	pub reuse: ReuseConfig,
	/// Applied to the listening socket.
	pub listener: SocketOptions,
	/// Applied to every accepted connection.
	pub connection: SocketOptions,
	/// The acceptor stops on its own after this many connections.
	pub max_connections: Option<usize>,
	pub workers: usize,
	pub queue_capacity: usize,
	pub poll_interval_ms: i32,
	pub drain_timeout: Duration,
	/// Per-connection deadline, measured from accept.
	pub handler_timeout: Option<Duration>,
	pub stream: StreamConfig,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			backlog: DEFAULT_BACKLOG,
			reuse: ReuseConfig::default(),
			listener: SocketOptions::default(),
			connection: SocketOptions::default(),
			max_connections: None,
			workers: 4,
			queue_capacity: 64,
			poll_interval_ms: 10,
			drain_timeout: Duration::from_secs(1),
			handler_timeout: None,
			stream: StreamConfig::default(),
		}
	}
}

impl ServerConfig {
	pub fn new() -> Self {
		Self::default()
	}

	/// Set listen backlog. Default: 256.
	pub fn backlog(mut self, backlog: i32) -> Self {
		self.backlog = backlog;
		self
	}

	pub fn reuse(mut self, config: ReuseConfig) -> Self {
		self.reuse = config;
		self
	}

	pub fn listener(mut self, options: SocketOptions) -> Self {
		self.listener = options;
		self
	}

	pub fn connection(mut self, options: SocketOptions) -> Self {
		self.connection = options;
		self
	}

	pub fn max_connections(mut self, max: usize) -> Self {
		self.max_connections = Some(max);
		self
	}

	/// Number of handler threads. At least one is always started.
	pub fn workers(mut self, workers: usize) -> Self {
		self.workers = workers;
		self
	}

	/// Accepted connections waiting for a worker before the acceptor blocks.
	pub fn queue_capacity(mut self, capacity: usize) -> Self {
		self.queue_capacity = capacity;
		self
	}

	pub fn poll_interval_ms(mut self, ms: i32) -> Self {
		self.poll_interval_ms = ms;
		self
	}

	pub fn drain_timeout(mut self, timeout: Duration) -> Self {
		self.drain_timeout = timeout;
		self
	}

	pub fn handler_timeout(mut self, timeout: Duration) -> Self {
		self.handler_timeout = Some(timeout);
		self
	}

	pub fn stream(mut self, config: StreamConfig) -> Self {
		self.stream = config;
		self
	}
}
