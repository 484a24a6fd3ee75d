use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use crate::addr::{AddressFamily, SocketAddrV4};
use super::builder::{KeepaliveConfig, SocketConfig, StreamConfig};
use super::options::{self, SocketOption};
use super::stream::{SocketReader, SocketWriter};
use super::{Handle, INVALID_HANDLE, PollMode, Protocol, SocketType, Status, platform};

/// An OS socket plus the family/type/protocol it was (or will be) created with.
///
/// The handle is optional: `Socket::new()` holds none until `create()` succeeds,
/// and `close()` drops it again. Option accessors on a socket without a handle
/// do nothing (setters) or return the default value (getters).
///
/// ```ignore
/// let mut socket = Socket::with_config(SocketConfig::tcp());
/// socket.create()?;
/// socket.set_keep_alive(true)?;
/// assert!(socket.keep_alive()?);
/// socket.close();
/// assert!(!socket.is_valid());
/// ```
#[derive(Debug, Default)]
pub struct Socket {
	fd: Option<OwnedFd>,
	config: SocketConfig,
}

impl Socket {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_config(config: SocketConfig) -> Self {
		Self { fd: None, config }
	}

	/// Wraps a handle returned by `accept()`.
	pub(crate) fn from_accepted(fd: OwnedFd, config: SocketConfig) -> Self {
		Self { fd: Some(fd), config }
	}

	/// Creates the OS socket, closing any handle this socket already held.
	///
	/// An unset family or type falls back to `INet`/`Stream`.
	pub fn create(&mut self) -> std::io::Result<()> {
		self.close();
		if self.config.family == AddressFamily::Unspecified {
			self.config.family = AddressFamily::INet;
		}
		if self.config.sock_type == SocketType::Unknown {
			self.config.sock_type = SocketType::Stream;
		}
		let fd = platform::create(
			self.config.family,
			self.config.sock_type,
			self.config.protocol,
			self.config.blocking,
		)?;
		self.fd = Some(fd);
		Ok(())
	}

	/// Closes the handle. Safe to call any number of times.
	pub fn close(&mut self) {
		platform::close(&mut self.fd);
	}

	#[inline]
	pub fn is_valid(&self) -> bool {
		self.fd.is_some()
	}

	/// Raw descriptor, or `INVALID_HANDLE` once closed.
	#[inline]
	pub fn handle(&self) -> Handle {
		self.fd.as_ref().map_or(INVALID_HANDLE, |fd| fd.as_raw_fd())
	}

	pub fn config(&self) -> SocketConfig {
		self.config
	}

	pub fn family(&self) -> AddressFamily {
		self.config.family
	}

	/// Takes effect on the next `create()`.
	pub fn set_family(&mut self, family: AddressFamily) {
		self.config.family = family;
	}

	pub fn sock_type(&self) -> SocketType {
		self.config.sock_type
	}

	/// Takes effect on the next `create()`.
	pub fn set_sock_type(&mut self, sock_type: SocketType) {
		self.config.sock_type = sock_type;
	}

	pub fn protocol(&self) -> Protocol {
		self.config.protocol
	}

	/// Takes effect on the next `create()`.
	pub fn set_protocol(&mut self, protocol: Protocol) {
		self.config.protocol = protocol;
	}

	fn guarded<T>(&self, default: T, f: impl FnOnce(&OwnedFd) -> std::io::Result<T>) -> std::io::Result<T> {
		match &self.fd {
			Some(fd) => f(fd),
			None => Ok(default),
		}
	}

	// ------------------------------------------------------------------
	// Lifecycle calls. These fail with EBADF on a socket without a handle.
	// ------------------------------------------------------------------

	pub fn bind(&self, addr: &SocketAddrV4) -> std::io::Result<()> {
		platform::bind(self, addr)
	}

	pub fn listen(&self, backlog: i32) -> std::io::Result<()> {
		platform::listen(self, backlog)
	}

	pub fn connect(&self, addr: &SocketAddrV4) -> std::io::Result<()> {
		platform::connect(self, addr)
	}

	/// Accepts one connection. The new socket inherits this socket's configuration
	/// and is always blocking.
	pub fn accept(&self) -> std::io::Result<(Socket, SocketAddrV4)> {
		let (fd, peer) = platform::accept(self)?;
		platform::set_blocking(&fd, true)?;
		let config = self.config.blocking(true);
		Ok((Socket::from_accepted(fd, config), peer))
	}

	pub fn local_addr(&self) -> std::io::Result<SocketAddrV4> {
		platform::local_addr(self)
	}

	pub fn poll(&self, timeout_ms: i32, mode: PollMode) -> std::io::Result<bool> {
		platform::poll(self, timeout_ms, mode)
	}

	/// One `read_socket` call. A socket without a handle reports `Error`.
	pub fn read(&self, buf: &mut [u8], timeout_ms: i32) -> (Status, usize) {
		platform::read_socket(self, buf, timeout_ms)
	}

	/// One `write_socket` call.
	pub fn write(&self, buf: &[u8], timeout_ms: i32) -> std::io::Result<usize> {
		platform::write_socket(self, buf, timeout_ms)
	}

	pub fn reader(&self, config: StreamConfig) -> SocketReader<'_> {
		SocketReader::new(self, config)
	}

	pub fn writer(&self, config: StreamConfig) -> SocketWriter<'_> {
		SocketWriter::new(self, config)
	}

	// ------------------------------------------------------------------
	// Options
	// ------------------------------------------------------------------

	pub fn set_blocking(&self, blocking: bool) -> std::io::Result<()> {
		self.guarded((), |fd| platform::set_blocking(fd, blocking))
	}

	pub fn is_blocking(&self) -> std::io::Result<bool> {
		self.guarded(self.config.blocking, |fd| platform::is_blocking(fd))
	}

	pub fn set_keep_alive(&self, enable: bool) -> std::io::Result<()> {
		self.guarded((), |fd| options::set_option_bool(fd, SocketOption::KeepAlive, enable))
	}

	pub fn keep_alive(&self) -> std::io::Result<bool> {
		self.guarded(false, |fd| options::option_bool(fd, SocketOption::KeepAlive))
	}

	/// Sets idle time, probe interval and probe count for TCP keep-alive.
	pub fn set_keepalive_timing(&self, timing: KeepaliveConfig) -> std::io::Result<()> {
		self.guarded((), |fd| {
			options::set_option(fd, SocketOption::KeepaliveIdle, timing.idle_secs as i32)?;
			options::set_option(fd, SocketOption::KeepaliveInterval, timing.interval_secs as i32)?;
			options::set_option(fd, SocketOption::KeepaliveCount, timing.count as i32)
		})
	}

	pub fn set_reuse_address(&self, enable: bool) -> std::io::Result<()> {
		self.guarded((), |fd| options::set_option_bool(fd, SocketOption::ReuseAddress, enable))
	}

	pub fn reuse_address(&self) -> std::io::Result<bool> {
		self.guarded(false, |fd| options::option_bool(fd, SocketOption::ReuseAddress))
	}

	pub fn set_reuse_port(&self, enable: bool) -> std::io::Result<()> {
		self.guarded((), |fd| options::set_option_bool(fd, SocketOption::ReusePort, enable))
	}

	pub fn reuse_port(&self) -> std::io::Result<bool> {
		self.guarded(false, |fd| options::option_bool(fd, SocketOption::ReusePort))
	}

	/// SO_DEBUG. Unprivileged processes usually get EACCES enabling it.
	pub fn set_debug(&self, enable: bool) -> std::io::Result<()> {
		self.guarded((), |fd| options::set_option_bool(fd, SocketOption::Debug, enable))
	}

	pub fn is_debug(&self) -> std::io::Result<bool> {
		self.guarded(false, |fd| options::option_bool(fd, SocketOption::Debug))
	}

	pub fn set_do_not_route(&self, enable: bool) -> std::io::Result<()> {
		self.guarded((), |fd| options::set_option_bool(fd, SocketOption::DoNotRoute, enable))
	}

	pub fn do_not_route(&self) -> std::io::Result<bool> {
		self.guarded(false, |fd| options::option_bool(fd, SocketOption::DoNotRoute))
	}

	/// Only meaningful for datagram sockets; ignored for every other type.
	pub fn set_broadcast(&self, enable: bool) -> std::io::Result<()> {
		if self.config.sock_type != SocketType::Datagram {
			return Ok(());
		}
		self.guarded((), |fd| options::set_option_bool(fd, SocketOption::Broadcast, enable))
	}

	pub fn is_broadcasting(&self) -> std::io::Result<bool> {
		if self.config.sock_type != SocketType::Datagram {
			return Ok(false);
		}
		self.guarded(false, |fd| options::option_bool(fd, SocketOption::Broadcast))
	}

	pub fn set_nodelay(&self, enable: bool) -> std::io::Result<()> {
		self.guarded((), |fd| options::set_option_bool(fd, SocketOption::TcpNoDelay, enable))
	}

	pub fn nodelay(&self) -> std::io::Result<bool> {
		self.guarded(false, |fd| options::option_bool(fd, SocketOption::TcpNoDelay))
	}

	pub fn set_send_buffer_size(&self, size: usize) -> std::io::Result<()> {
		self.guarded((), |fd| options::set_option(fd, SocketOption::SendBufferSize, clamp_size(size)))
	}

	/// Linux reports twice the requested value (the kernel adds bookkeeping overhead).
	pub fn send_buffer_size(&self) -> std::io::Result<usize> {
		self.guarded(0, |fd| options::option(fd, SocketOption::SendBufferSize).map(|v| v.max(0) as usize))
	}

	pub fn set_receive_buffer_size(&self, size: usize) -> std::io::Result<()> {
		self.guarded((), |fd| options::set_option(fd, SocketOption::ReceiveBufferSize, clamp_size(size)))
	}

	pub fn receive_buffer_size(&self) -> std::io::Result<usize> {
		self.guarded(0, |fd| options::option(fd, SocketOption::ReceiveBufferSize).map(|v| v.max(0) as usize))
	}

	/// Milliseconds. Zero disables the timeout.
	pub fn set_send_timeout(&self, ms: i32) -> std::io::Result<()> {
		self.guarded((), |fd| options::set_timeout(fd, SocketOption::SendTimeout, ms))
	}

	pub fn send_timeout(&self) -> std::io::Result<i32> {
		self.guarded(0, |fd| options::timeout(fd, SocketOption::SendTimeout))
	}

	/// Milliseconds. Zero disables the timeout.
	pub fn set_receive_timeout(&self, ms: i32) -> std::io::Result<()> {
		self.guarded((), |fd| options::set_timeout(fd, SocketOption::ReceiveTimeout, ms))
	}

	pub fn receive_timeout(&self) -> std::io::Result<i32> {
		self.guarded(0, |fd| options::timeout(fd, SocketOption::ReceiveTimeout))
	}
}

fn clamp_size(size: usize) -> i32 {
	size.min(i32::MAX as usize) as i32
}

/// Recovers family/type/protocol from a live descriptor.
fn probe_config(fd: &OwnedFd) -> SocketConfig {
	let family = platform::family(fd).unwrap_or_default();
	let sock_type = options::option(fd, SocketOption::Type)
		.map(SocketType::from_raw)
		.unwrap_or_default();
	#[cfg(any(target_os = "linux", target_os = "android"))]
	let protocol = options::option(fd, SocketOption::Protocol)
		.map(Protocol::from_raw)
		.unwrap_or_default();
	#[cfg(not(any(target_os = "linux", target_os = "android")))]
	let protocol = Protocol::Unspecified;
	let blocking = platform::is_blocking(fd).unwrap_or(true);
	SocketConfig { family, sock_type, protocol, blocking }
}

impl From<OwnedFd> for Socket {
	fn from(fd: OwnedFd) -> Self {
		let config = probe_config(&fd);
		Self { fd: Some(fd), config }
	}
}

impl AsRawFd for Socket {
	fn as_raw_fd(&self) -> RawFd {
		self.handle()
	}
}

impl FromRawFd for Socket {
	unsafe fn from_raw_fd(fd: RawFd) -> Self {
		Self::from(unsafe { OwnedFd::from_raw_fd(fd) })
	}
}

impl IntoRawFd for Socket {
	fn into_raw_fd(mut self) -> RawFd {
		self.fd.take().map_or(INVALID_HANDLE, IntoRawFd::into_raw_fd)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::os::unix::net::UnixStream;

	#[test]
	fn unset_config_defaults_on_create() {
		let mut socket = Socket::new();
		assert_eq!(socket.handle(), INVALID_HANDLE);
		socket.create().unwrap();
		assert_eq!(socket.family(), AddressFamily::INet);
		assert_eq!(socket.sock_type(), SocketType::Stream);
		assert!(socket.handle() >= 0);
	}

	#[test]
	fn invalid_socket_options_are_noops() {
		let socket = Socket::new();
		socket.set_keep_alive(true).unwrap();
		assert!(!socket.keep_alive().unwrap());
		assert_eq!(socket.receive_timeout().unwrap(), 0);
		assert_eq!(socket.read(&mut [0u8; 4], 0).0, Status::Error);
	}

	#[test]
	fn broadcast_ignored_for_streams() {
		let mut socket = Socket::with_config(SocketConfig::tcp());
		socket.create().unwrap();
		socket.set_broadcast(true).unwrap();
		assert!(!socket.is_broadcasting().unwrap());

		let mut udp = Socket::with_config(SocketConfig::new().sock_type(SocketType::Datagram));
		udp.create().unwrap();
		udp.set_broadcast(true).unwrap();
		assert!(udp.is_broadcasting().unwrap());
	}

	#[test]
	fn probes_foreign_descriptor() {
		let (a, _b) = UnixStream::pair().unwrap();
		let socket = Socket::from(OwnedFd::from(a));
		assert_eq!(socket.family(), AddressFamily::Unix);
		assert_eq!(socket.sock_type(), SocketType::Stream);
		assert!(socket.is_valid());
	}

	#[test]
	fn recreate_replaces_handle() {
		let mut socket = Socket::with_config(SocketConfig::tcp());
		socket.create().unwrap();
		socket.set_reuse_address(true).unwrap();
		socket.create().unwrap();
		assert!(socket.is_valid());
		assert!(!socket.reuse_address().unwrap());
	}
}
