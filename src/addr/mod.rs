//! Address families and related types.
//!
//! - `AddressFamily` selects the family passed to `socket()`
//! - `SocketAddrV4` is the only concrete address (IPv4 + port)
//! - `host` resolves symbolic names into candidate addresses

mod host;
mod ipv4;
pub use self::host::{Host, HostList, inet_host, resolve};
pub use self::ipv4::{SocketAddrV4, ascii_to_network, network_to_ascii};

/// Address family of a socket.
///
/// `Unspecified` doubles as "not set yet"; `Socket::create` replaces it with `INet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressFamily {
	#[default]
	Unspecified,
	Unix,
	INet,
}

impl AddressFamily {
	/// Returns the libc constant for this address family.
	#[inline]
	pub fn raw(self) -> libc::c_int {
		match self {
			AddressFamily::Unspecified => libc::AF_UNSPEC,
			AddressFamily::Unix => libc::AF_UNIX,
			AddressFamily::INet => libc::AF_INET,
		}
	}

	pub(crate) fn from_raw(raw: libc::c_int) -> Self {
		match raw {
			libc::AF_UNIX => AddressFamily::Unix,
			libc::AF_INET => AddressFamily::INet,
			_ => AddressFamily::Unspecified,
		}
	}
}

impl std::fmt::Display for AddressFamily {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			AddressFamily::Unspecified => "AF_UNSPEC",
			AddressFamily::Unix => "AF_UNIX",
			AddressFamily::INet => "AF_INET",
		})
	}
}

/// Trait for address types that can be converted to raw sockaddr for syscalls.
pub trait ToSockAddr {
	/// Calls the provided closure with a pointer to the raw sockaddr and its size.
	/// Returns None if the address cannot be expressed as a sockaddr.
	/// The pointer is only valid inside the closure.
	fn with_raw<F, R>(&self, f: F) -> Option<R>
	where
		F: FnOnce(*const libc::sockaddr, libc::socklen_t) -> R;
}

/// Trait for address types that can be created from raw sockaddr.
pub trait FromSockAddr: Sized {
	/// Creates address from raw sockaddr storage.
	///
	/// # Safety
	/// `addr` must point to at least `len` readable bytes.
	unsafe fn from_sockaddr(addr: *const libc::sockaddr, len: libc::socklen_t) -> Option<Self>;
}

impl FromSockAddr for SocketAddrV4 {
	unsafe fn from_sockaddr(addr: *const libc::sockaddr, len: libc::socklen_t) -> Option<Self> {
		if len < std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t {
			return None;
		}
		let raw = unsafe { &*(addr as *const libc::sockaddr_in) };
		if raw.sin_family as libc::c_int != libc::AF_INET {
			return None;
		}
		Some(Self::from_raw(raw))
	}
}
