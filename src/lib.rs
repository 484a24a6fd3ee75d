pub mod socket;
mod addr;
mod error;

pub use self::error::{IoError, SocketError, describe, errno, last_error};
pub use self::addr::{AddressFamily, FromSockAddr, Host, HostList, SocketAddrV4, ToSockAddr,
					 ascii_to_network, inet_host, network_to_ascii, resolve};
pub use self::socket::{BufferConfig, ClientConfig, KeepaliveConfig, ReuseConfig, ServerConfig,
					   SocketConfig, SocketOptions, StreamConfig, TimeoutConfig};
pub use self::socket::{CancelToken, ClientSocket, Connection, Handler, ServerSocket, ServerState,
					   Socket, SocketOption, SocketReader, SocketWriter, StreamBuffer};
pub use self::socket::{Handle, INVALID_HANDLE, MAX_BLOCK_SIZE, MAX_BUFFER_SIZE, PollMode, Protocol, SocketType, Status};
