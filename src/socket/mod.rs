mod builder;
mod cancel;
mod client;
mod dispatch;
mod handle;
mod options;
pub mod platform;
mod server;
mod stream;

pub use self::builder::{BufferConfig, ClientConfig, KeepaliveConfig, ReuseConfig, ServerConfig,
						SocketConfig, SocketOptions, StreamConfig, TimeoutConfig};
pub use self::cancel::CancelToken;
pub use self::client::ClientSocket;
pub use self::dispatch::Connection;
pub use self::handle::Socket;
pub use self::options::SocketOption;
pub use self::server::{Handler, ServerSocket, ServerState};
pub use self::stream::{MAX_BLOCK_SIZE, SocketReader, SocketWriter, StreamBuffer};

/// OS-level socket descriptor.
pub type Handle = std::os::fd::RawFd;

/// Sentinel for "no socket".
pub const INVALID_HANDLE: Handle = -1;

/// Largest buffer accepted by `read_socket`/`write_socket`.
pub const MAX_BUFFER_SIZE: usize = 0x7F_FFFF;

/// Socket type.
///
/// - `Stream`: reliable, ordered byte stream (TCP)
/// - `Datagram`: unreliable packets (UDP)
///
/// `Unknown` doubles as "not set yet"; `Socket::create` replaces it with `Stream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketType {
	#[default]
	Unknown,
	Stream,
	Datagram,
	Raw,
	Rdm,
	SeqPacket,
}

impl SocketType {
	/// Returns the libc constant for this socket type.
	#[inline]
	pub fn raw(self) -> libc::c_int {
		match self {
			SocketType::Unknown => 0,
			SocketType::Stream => libc::SOCK_STREAM,
			SocketType::Datagram => libc::SOCK_DGRAM,
			SocketType::Raw => libc::SOCK_RAW,
			SocketType::Rdm => libc::SOCK_RDM,
			SocketType::SeqPacket => libc::SOCK_SEQPACKET,
		}
	}

	pub(crate) fn from_raw(raw: libc::c_int) -> Self {
		match raw {
			libc::SOCK_STREAM => SocketType::Stream,
			libc::SOCK_DGRAM => SocketType::Datagram,
			libc::SOCK_RAW => SocketType::Raw,
			libc::SOCK_RDM => SocketType::Rdm,
			libc::SOCK_SEQPACKET => SocketType::SeqPacket,
			_ => SocketType::Unknown,
		}
	}
}

impl std::fmt::Display for SocketType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			SocketType::Unknown => "UnknownSocket",
			SocketType::Stream => "SOCK_STREAM",
			SocketType::Datagram => "SOCK_DGRAM",
			SocketType::Raw => "SOCK_RAW",
			SocketType::Rdm => "SOCK_RDM",
			SocketType::SeqPacket => "SOCK_SEQPACKET",
		})
	}
}

/// Transport protocol. `Unspecified` lets the kernel pick the default for the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
	#[default]
	Unspecified,
	Tcp,
	Udp,
	Raw,
}

impl Protocol {
	#[inline]
	pub fn raw(self) -> libc::c_int {
		match self {
			Protocol::Unspecified => 0,
			Protocol::Tcp => libc::IPPROTO_TCP,
			Protocol::Udp => libc::IPPROTO_UDP,
			Protocol::Raw => libc::IPPROTO_RAW,
		}
	}

	pub(crate) fn from_raw(raw: libc::c_int) -> Self {
		match raw {
			libc::IPPROTO_TCP => Protocol::Tcp,
			libc::IPPROTO_UDP => Protocol::Udp,
			libc::IPPROTO_RAW => Protocol::Raw,
			_ => Protocol::Unspecified,
		}
	}
}

impl std::fmt::Display for Protocol {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Protocol::Unspecified => "PF_UNSPEC",
			Protocol::Tcp => "IPPROTO_TCP",
			Protocol::Udp => "IPPROTO_UDP",
			Protocol::Raw => "IPPROTO_RAW",
		})
	}
}

/// Outcome of one I/O attempt.
///
/// `Done` means no further data is expected. It is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
	Ok,
	Done,
	Error,
}

impl Status {
	/// `Done` and `Error` never move back to `Ok`.
	#[inline]
	pub fn is_terminal(self) -> bool {
		self != Status::Ok
	}
}

/// Readiness to wait for in `platform::poll`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
	Read,
	Write,
	ReadWrite,
}

impl PollMode {
	fn events(self) -> libc::c_short {
		match self {
			PollMode::Read => libc::POLLIN,
			PollMode::Write => libc::POLLOUT,
			PollMode::ReadWrite => libc::POLLIN | libc::POLLOUT,
		}
	}
}
