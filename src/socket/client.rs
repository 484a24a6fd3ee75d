use std::io::Write;
use crate::addr::{SocketAddrV4, inet_host, resolve};
use crate::error::{IoError, SocketError};
use super::builder::{ClientConfig, SocketConfig};
use super::stream::{SocketReader, SocketWriter};
use super::Socket;

/// Blocking TCP client.
///
/// `connect` and `connect_host` never return an error: a failure is logged and
/// leaves the client closed. Use `open` to get the error instead.
#[derive(Debug, Default)]
pub struct ClientSocket {
	socket: Socket,
	config: ClientConfig,
	peer: Option<SocketAddrV4>,
}

impl ClientSocket {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_config(config: ClientConfig) -> Self {
		Self {
			socket: Socket::new(),
			config,
			peer: None,
		}
	}

	/// Connects to a dotted-decimal `address`. Returns `is_open()`.
	pub fn connect(&mut self, address: &str, port: u16) -> bool {
		let result = SocketAddrV4::parse(address, port).and_then(|addr| self.open(addr));
		if let Err(err) = result {
			log::warn!("connect({}:{}) failed: {}", address, port, err);
		}
		self.is_open()
	}

	/// Resolves `name` and connects to its first IPv4 address. Returns `is_open()`.
	pub fn connect_host(&mut self, name: &str, port: u16) -> bool {
		let result = resolve(name).and_then(|hosts| {
			let host = inet_host(&hosts).ok_or_else(|| SocketError::Resolve {
				name: name.to_string(),
				reason: "no IPv4 address".to_string(),
			})?;
			let addr = SocketAddrV4::parse(&host.address, port)?;
			self.open(addr)
		});
		if let Err(err) = result {
			log::warn!("connect({}:{}) failed: {}", name, port, err);
		}
		self.is_open()
	}

	/// Creates a fresh TCP socket, applies the configured options and connects.
	///
	/// Any previous connection is closed first. On failure the client stays closed.
	pub fn open(&mut self, addr: SocketAddrV4) -> std::io::Result<()> {
		self.close();
		self.socket = Socket::with_config(SocketConfig::tcp());
		let result = self.socket.create()
			.and_then(|()| self.config.options.apply(&self.socket))
			.and_then(|()| self.socket.connect(&addr));
		match result {
			Ok(()) => {
				log::debug!("connected to {}", addr);
				self.peer = Some(addr);
				Ok(())
			}
			Err(err) => {
				self.socket.close();
				Err(err)
			}
		}
	}

	#[inline]
	pub fn is_open(&self) -> bool {
		self.socket.is_valid()
	}

	pub fn peer_addr(&self) -> Option<SocketAddrV4> {
		self.peer
	}

	pub fn local_addr(&self) -> std::io::Result<SocketAddrV4> {
		self.socket.local_addr()
	}

	pub fn socket(&self) -> &Socket {
		&self.socket
	}

	/// One send of at most `bytes.len()` bytes. A short count is not retried;
	/// use `writer().write_all()` for that.
	pub fn write(&self, bytes: &[u8]) -> std::io::Result<usize> {
		if !self.is_open() {
			return Err(IoError::NotOpen.into());
		}
		self.socket.write(bytes, self.config.stream.timeout_ms)
	}

	pub fn writer(&self) -> SocketWriter<'_> {
		self.socket.writer(self.config.stream)
	}

	pub fn reader(&self) -> SocketReader<'_> {
		self.socket.reader(self.config.stream)
	}

	/// Copies the reply into `sink` until the server closes or goes quiet.
	pub fn read_to<W: Write + ?Sized>(&self, sink: &mut W) -> std::io::Result<u64> {
		if !self.is_open() {
			return Err(IoError::NotOpen.into());
		}
		self.reader().copy_to(sink)
	}

	pub fn close(&mut self) {
		if self.is_open() {
			log::debug!("closing connection to {:?}", self.peer);
		}
		self.socket.close();
		self.peer = None;
	}
}
