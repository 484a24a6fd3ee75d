use std::os::fd::AsRawFd;
use crate::error::{SocketError, errno};

/// Logical socket options and the OS option each one maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketOption {
	KeepAlive,
	ReuseAddress,
	ReusePort,
	Debug,
	DoNotRoute,
	Broadcast,
	SendBufferSize,
	ReceiveBufferSize,
	SendTimeout,
	ReceiveTimeout,
	TcpNoDelay,
	KeepaliveIdle,
	KeepaliveInterval,
	KeepaliveCount,
	/// Read-only.
	Type,
	/// Read-only.
	#[cfg(any(target_os = "linux", target_os = "android"))]
	Protocol,
}

impl SocketOption {
	/// Returns `(level, optname)` for setsockopt/getsockopt.
	pub fn raw(self) -> (libc::c_int, libc::c_int) {
		match self {
			SocketOption::KeepAlive => (libc::SOL_SOCKET, libc::SO_KEEPALIVE),
			SocketOption::ReuseAddress => (libc::SOL_SOCKET, libc::SO_REUSEADDR),
			SocketOption::ReusePort => (libc::SOL_SOCKET, libc::SO_REUSEPORT),
			SocketOption::Debug => (libc::SOL_SOCKET, libc::SO_DEBUG),
			SocketOption::DoNotRoute => (libc::SOL_SOCKET, libc::SO_DONTROUTE),
			SocketOption::Broadcast => (libc::SOL_SOCKET, libc::SO_BROADCAST),
			SocketOption::SendBufferSize => (libc::SOL_SOCKET, libc::SO_SNDBUF),
			SocketOption::ReceiveBufferSize => (libc::SOL_SOCKET, libc::SO_RCVBUF),
			SocketOption::SendTimeout => (libc::SOL_SOCKET, libc::SO_SNDTIMEO),
			SocketOption::ReceiveTimeout => (libc::SOL_SOCKET, libc::SO_RCVTIMEO),
			SocketOption::TcpNoDelay => (libc::IPPROTO_TCP, libc::TCP_NODELAY),
			#[cfg(not(target_vendor = "apple"))]
			SocketOption::KeepaliveIdle => (libc::IPPROTO_TCP, libc::TCP_KEEPIDLE),
			#[cfg(target_vendor = "apple")]
			SocketOption::KeepaliveIdle => (libc::IPPROTO_TCP, libc::TCP_KEEPALIVE),
			SocketOption::KeepaliveInterval => (libc::IPPROTO_TCP, libc::TCP_KEEPINTVL),
			SocketOption::KeepaliveCount => (libc::IPPROTO_TCP, libc::TCP_KEEPCNT),
			SocketOption::Type => (libc::SOL_SOCKET, libc::SO_TYPE),
			#[cfg(any(target_os = "linux", target_os = "android"))]
			SocketOption::Protocol => (libc::SOL_SOCKET, libc::SO_PROTOCOL),
		}
	}

	/// Name used in error messages.
	pub fn name(self) -> &'static str {
		match self {
			SocketOption::KeepAlive => "SO_KEEPALIVE",
			SocketOption::ReuseAddress => "SO_REUSEADDR",
			SocketOption::ReusePort => "SO_REUSEPORT",
			SocketOption::Debug => "SO_DEBUG",
			SocketOption::DoNotRoute => "SO_DONTROUTE",
			SocketOption::Broadcast => "SO_BROADCAST",
			SocketOption::SendBufferSize => "SO_SNDBUF",
			SocketOption::ReceiveBufferSize => "SO_RCVBUF",
			SocketOption::SendTimeout => "SO_SNDTIMEO",
			SocketOption::ReceiveTimeout => "SO_RCVTIMEO",
			SocketOption::TcpNoDelay => "TCP_NODELAY",
			SocketOption::KeepaliveIdle => "TCP_KEEPIDLE",
			SocketOption::KeepaliveInterval => "TCP_KEEPINTVL",
			SocketOption::KeepaliveCount => "TCP_KEEPCNT",
			SocketOption::Type => "SO_TYPE",
			#[cfg(any(target_os = "linux", target_os = "android"))]
			SocketOption::Protocol => "SO_PROTOCOL",
		}
	}

	/// Timeout options carry a `timeval`, everything else a `c_int`.
	pub fn is_timeout(self) -> bool {
		matches!(self, SocketOption::SendTimeout | SocketOption::ReceiveTimeout)
	}
}

/// Sets an integer-valued option. Booleans use 0/1.
pub fn set_option<S: AsRawFd>(socket: &S, option: SocketOption, value: i32) -> std::io::Result<()> {
	debug_assert!(!option.is_timeout(), "use set_timeout for {}", option.name());
	let (level, name) = option.raw();
	let val = value as libc::c_int;
	let result = unsafe {
		libc::setsockopt(
			socket.as_raw_fd(),
			level,
			name,
			&val as *const _ as *const libc::c_void,
			std::mem::size_of::<libc::c_int>() as libc::socklen_t,
		)
	};
	if result == -1 {
		Err(SocketError::SetOption { errno: errno(), option: option.name() }.into())
	} else {
		Ok(())
	}
}

/// Reads an integer-valued option.
pub fn option<S: AsRawFd>(socket: &S, option: SocketOption) -> std::io::Result<i32> {
	debug_assert!(!option.is_timeout(), "use timeout for {}", option.name());
	let (level, name) = option.raw();
	let mut val: libc::c_int = 0;
	let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
	let result = unsafe {
		libc::getsockopt(
			socket.as_raw_fd(),
			level,
			name,
			&mut val as *mut _ as *mut libc::c_void,
			&mut len,
		)
	};
	if result == -1 {
		Err(SocketError::GetOption { errno: errno(), option: option.name() }.into())
	} else {
		Ok(val)
	}
}

pub fn set_option_bool<S: AsRawFd>(socket: &S, option: SocketOption, enable: bool) -> std::io::Result<()> {
	set_option(socket, option, if enable { 1 } else { 0 })
}

/// Any nonzero value reads back as `true`.
pub fn option_bool<S: AsRawFd>(socket: &S, option: SocketOption) -> std::io::Result<bool> {
	self::option(socket, option).map(|val| val != 0)
}

/// Sets SO_SNDTIMEO / SO_RCVTIMEO from milliseconds.
///
/// The kernel takes a `timeval`, so `ms` is split into whole seconds plus microseconds.
/// Zero disables the timeout. Negative values are treated as zero.
pub fn set_timeout<S: AsRawFd>(socket: &S, option: SocketOption, ms: i32) -> std::io::Result<()> {
	debug_assert!(option.is_timeout());
	let (level, name) = option.raw();
	let val = ms_to_timeval(ms);
	let result = unsafe {
		libc::setsockopt(
			socket.as_raw_fd(),
			level,
			name,
			&val as *const _ as *const libc::c_void,
			std::mem::size_of::<libc::timeval>() as libc::socklen_t,
		)
	};
	if result == -1 {
		Err(SocketError::SetOption { errno: errno(), option: option.name() }.into())
	} else {
		Ok(())
	}
}

/// Reads SO_SNDTIMEO / SO_RCVTIMEO back as milliseconds.
pub fn timeout<S: AsRawFd>(socket: &S, option: SocketOption) -> std::io::Result<i32> {
	debug_assert!(option.is_timeout());
	let (level, name) = option.raw();
	let mut val: libc::timeval = unsafe { std::mem::zeroed() };
	let mut len = std::mem::size_of::<libc::timeval>() as libc::socklen_t;
	let result = unsafe {
		libc::getsockopt(
			socket.as_raw_fd(),
			level,
			name,
			&mut val as *mut _ as *mut libc::c_void,
			&mut len,
		)
	};
	if result == -1 {
		Err(SocketError::GetOption { errno: errno(), option: option.name() }.into())
	} else {
		Ok(timeval_to_ms(&val))
	}
}

pub(crate) fn ms_to_timeval(ms: i32) -> libc::timeval {
	let ms = ms.max(0);
	let mut val: libc::timeval = unsafe { std::mem::zeroed() };
	val.tv_sec = (ms / 1000) as libc::time_t;
	val.tv_usec = ((ms % 1000) * 1000) as libc::suseconds_t;
	val
}

/// Sub-millisecond remainders from kernel tick rounding are dropped.
pub(crate) fn timeval_to_ms(val: &libc::timeval) -> i32 {
	(val.tv_sec as i64 * 1000 + val.tv_usec as i64 / 1000) as i32
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::os::unix::net::UnixStream;

	#[test]
	fn timeval_split_is_lossless_to_the_millisecond() {
		for ms in [0, 1, 999, 1000, 1001, 2500, 86_400_000] {
			assert_eq!(timeval_to_ms(&ms_to_timeval(ms)), ms);
		}
		assert_eq!(timeval_to_ms(&ms_to_timeval(-5)), 0);
	}

	#[test]
	fn timeout_round_trip_on_a_live_socket() {
		let (a, _b) = UnixStream::pair().unwrap();
		set_timeout(&a, SocketOption::ReceiveTimeout, 1500).unwrap();
		assert_eq!(timeout(&a, SocketOption::ReceiveTimeout).unwrap(), 1500);
		// multiples of 500 ms are whole ticks at every common HZ
		set_timeout(&a, SocketOption::SendTimeout, 500).unwrap();
		assert_eq!(timeout(&a, SocketOption::SendTimeout).unwrap(), 500);
	}

	#[test]
	fn bool_option_round_trip() {
		let (a, _b) = UnixStream::pair().unwrap();
		set_option_bool(&a, SocketOption::KeepAlive, true).unwrap();
		assert!(option_bool(&a, SocketOption::KeepAlive).unwrap());
		set_option_bool(&a, SocketOption::KeepAlive, false).unwrap();
		assert!(!option_bool(&a, SocketOption::KeepAlive).unwrap());
	}
}
