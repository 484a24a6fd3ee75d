//! Stateless wrappers over the OS socket calls.
//!
//! Every function takes the handle explicitly. Nothing here keeps state between calls.

use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd};
use crate::addr::{AddressFamily, FromSockAddr, SocketAddrV4, ToSockAddr};
use crate::error::{IoError, SocketError, describe, errno};
use super::{MAX_BUFFER_SIZE, PollMode, Protocol, SocketType, Status};

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

/// Creates a socket.
///
/// The descriptor is close-on-exec. With `blocking == false` it is switched to `O_NONBLOCK`.
pub fn create(
	family: AddressFamily,
	sock_type: SocketType,
	protocol: Protocol,
	blocking: bool,
) -> std::io::Result<OwnedFd> {
	#[cfg(any(target_os = "linux", target_os = "android"))]
	let ty = sock_type.raw() | libc::SOCK_CLOEXEC;
	#[cfg(not(any(target_os = "linux", target_os = "android")))]
	let ty = sock_type.raw();

	let fd = unsafe { libc::socket(family.raw(), ty, protocol.raw()) };
	if fd == -1 {
		return Err(SocketError::Create { errno: errno() }.into());
	}
	let fd = unsafe { OwnedFd::from_raw_fd(fd) };

	#[cfg(not(any(target_os = "linux", target_os = "android")))]
	unsafe {
		libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC);
	}

	if !blocking {
		set_blocking(&fd, false)?;
	}
	log::trace!("created {} {} {} fd={}", family, sock_type, protocol, fd.as_raw_fd());
	Ok(fd)
}

/// Closes the handle if there is one. Calling it again is a no-op.
pub fn close(handle: &mut Option<OwnedFd>) {
	if let Some(fd) = handle.take() {
		let raw = fd.into_raw_fd();
		if unsafe { libc::close(raw) } == -1 {
			log::debug!("close(fd={}) failed: {}", raw, describe(errno()));
		}
	}
}

/// Sets or clears `O_NONBLOCK`.
pub fn set_blocking<S: AsRawFd>(socket: &S, blocking: bool) -> std::io::Result<()> {
	let flags = unsafe { libc::fcntl(socket.as_raw_fd(), libc::F_GETFL) };
	if flags == -1 {
		return Err(SocketError::GetOption { errno: errno(), option: "F_GETFL" }.into());
	}
	let new_flags = if blocking {
		flags & !libc::O_NONBLOCK
	} else {
		flags | libc::O_NONBLOCK
	};
	let result = unsafe { libc::fcntl(socket.as_raw_fd(), libc::F_SETFL, new_flags) };
	if result == -1 {
		return Err(SocketError::SetOption { errno: errno(), option: "O_NONBLOCK" }.into());
	}
	Ok(())
}

/// Returns true when `socket` reports `O_NONBLOCK` cleared.
pub fn is_blocking<S: AsRawFd>(socket: &S) -> std::io::Result<bool> {
	let flags = unsafe { libc::fcntl(socket.as_raw_fd(), libc::F_GETFL) };
	if flags == -1 {
		return Err(SocketError::GetOption { errno: errno(), option: "F_GETFL" }.into());
	}
	Ok(flags & libc::O_NONBLOCK == 0)
}

/// Waits for readiness on a single socket.
///
/// Negative timeout blocks indefinitely, zero checks and returns immediately.
/// Returns `Ok(false)` when the timeout elapses (or a signal interrupts the wait).
/// Hang-up and error conditions count as ready so the next call observes them.
pub fn poll<S: AsRawFd>(socket: &S, timeout_ms: i32, mode: PollMode) -> std::io::Result<bool> {
	if socket.as_raw_fd() < 0 {
		// poll() silently skips negative descriptors
		return Err(IoError::Poll { errno: libc::EBADF }.into());
	}
	let mut pfd = libc::pollfd {
		fd: socket.as_raw_fd(),
		events: mode.events(),
		revents: 0,
	};
	let timeout = if timeout_ms < 0 { -1 } else { timeout_ms };
	let n = unsafe { libc::poll(&mut pfd, 1, timeout) };
	if n == -1 {
		let e = errno();
		if e == libc::EINTR {
			return Ok(false);
		}
		return Err(IoError::Poll { errno: e }.into());
	}
	if pfd.revents & libc::POLLNVAL != 0 {
		return Err(IoError::Poll { errno: libc::EBADF }.into());
	}
	let ready = mode.events() | libc::POLLHUP | libc::POLLERR;
	Ok(n > 0 && pfd.revents & ready != 0)
}

pub fn bind<S: AsRawFd>(socket: &S, addr: &SocketAddrV4) -> std::io::Result<()> {
	let result = addr.with_raw(|ptr, len| unsafe { libc::bind(socket.as_raw_fd(), ptr, len) });
	match result {
		Some(-1) => Err(SocketError::Bind { errno: errno(), addr: addr.to_string() }.into()),
		Some(_) => Ok(()),
		None => Err(SocketError::InvalidAddress {
			address: addr.to_string(),
			reason: "not representable as sockaddr",
		}.into()),
	}
}

pub fn listen<S: AsRawFd>(socket: &S, backlog: i32) -> std::io::Result<()> {
	let result = unsafe { libc::listen(socket.as_raw_fd(), backlog) };
	if result == -1 {
		return Err(SocketError::Listen { errno: errno(), backlog }.into());
	}
	Ok(())
}

/// Connects to `addr`. Blocks unless the socket is non-blocking.
pub fn connect<S: AsRawFd>(socket: &S, addr: &SocketAddrV4) -> std::io::Result<()> {
	let result = addr.with_raw(|ptr, len| unsafe { libc::connect(socket.as_raw_fd(), ptr, len) });
	match result {
		Some(-1) => Err(SocketError::Connect { errno: errno(), addr: addr.to_string() }.into()),
		Some(_) => Ok(()),
		None => Err(SocketError::InvalidAddress {
			address: addr.to_string(),
			reason: "not representable as sockaddr",
		}.into()),
	}
}

/// Accepts one pending connection and captures the peer address.
///
/// On a non-blocking listener with nothing pending this fails with `WouldBlock`.
pub fn accept<S: AsRawFd>(listener: &S) -> std::io::Result<(OwnedFd, SocketAddrV4)> {
	let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
	let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

	#[cfg(any(target_os = "linux", target_os = "android"))]
	let fd = unsafe {
		libc::accept4(
			listener.as_raw_fd(),
			&mut storage as *mut _ as *mut libc::sockaddr,
			&mut len,
			libc::SOCK_CLOEXEC,
		)
	};
	#[cfg(not(any(target_os = "linux", target_os = "android")))]
	let fd = unsafe {
		libc::accept(
			listener.as_raw_fd(),
			&mut storage as *mut _ as *mut libc::sockaddr,
			&mut len,
		)
	};

	if fd == -1 {
		return Err(SocketError::Accept { errno: errno() }.into());
	}
	let fd = unsafe { OwnedFd::from_raw_fd(fd) };

	let peer = unsafe { SocketAddrV4::from_sockaddr(&storage as *const _ as *const libc::sockaddr, len) }
		.ok_or_else(|| SocketError::InvalidAddress {
			address: String::new(),
			reason: "peer is not an IPv4 address",
		})?;
	Ok((fd, peer))
}

/// Returns the address the socket is bound to.
pub fn local_addr<S: AsRawFd>(socket: &S) -> std::io::Result<SocketAddrV4> {
	let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
	let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
	let result = unsafe {
		libc::getsockname(
			socket.as_raw_fd(),
			&mut storage as *mut _ as *mut libc::sockaddr,
			&mut len,
		)
	};
	if result == -1 {
		return Err(SocketError::GetOption { errno: errno(), option: "getsockname" }.into());
	}
	unsafe { SocketAddrV4::from_sockaddr(&storage as *const _ as *const libc::sockaddr, len) }
		.ok_or_else(|| SocketError::InvalidAddress {
			address: String::new(),
			reason: "socket is not bound to an IPv4 address",
		}.into())
}

/// Returns the address family reported by `getsockname`.
pub fn family<S: AsRawFd>(socket: &S) -> std::io::Result<AddressFamily> {
	let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
	let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
	let result = unsafe {
		libc::getsockname(
			socket.as_raw_fd(),
			&mut storage as *mut _ as *mut libc::sockaddr,
			&mut len,
		)
	};
	if result == -1 {
		return Err(SocketError::GetOption { errno: errno(), option: "getsockname" }.into());
	}
	Ok(AddressFamily::from_raw(storage.ss_family as libc::c_int))
}

/// Reads at most `buf.len()` bytes, waiting up to `timeout_ms` for data.
///
/// | outcome                            | result          |
/// |------------------------------------|-----------------|
/// | nothing arrived within the timeout | `(Done, 0)`     |
/// | peer closed                        | `(Done, 0)`     |
/// | fewer bytes than `buf.len()`       | `(Done, n)`     |
/// | exactly `buf.len()` bytes          | `(Ok, n)`       |
/// | poll/recv failure                  | `(Error, 0)`    |
///
/// A read that fills `buf` exactly reports `Ok` even if nothing else is pending,
/// so the following read may wait for the full timeout before reporting `Done`.
///
/// # Panics
/// If `buf` is larger than `MAX_BUFFER_SIZE`.
pub fn read_socket<S: AsRawFd>(socket: &S, buf: &mut [u8], timeout_ms: i32) -> (Status, usize) {
	assert!(buf.len() <= MAX_BUFFER_SIZE, "read buffer of {} bytes exceeds MAX_BUFFER_SIZE", buf.len());
	if buf.is_empty() {
		return (Status::Ok, 0);
	}

	match poll(socket, timeout_ms, PollMode::Read) {
		Ok(true) => {}
		Ok(false) => {
			log::trace!("fd={} not readable within {} ms", socket.as_raw_fd(), timeout_ms);
			return (Status::Done, 0);
		}
		Err(err) => {
			log::debug!("fd={} {}", socket.as_raw_fd(), err);
			return (Status::Error, 0);
		}
	}

	let n = loop {
		let n = unsafe {
			libc::recv(
				socket.as_raw_fd(),
				buf.as_mut_ptr() as *mut libc::c_void,
				buf.len(),
				0,
			)
		};
		if n == -1 && errno() == libc::EINTR {
			continue;
		}
		break n;
	};

	match n {
		-1 => {
			let e = errno();
			if e == libc::EAGAIN {
				// readable but nothing there; same as a timeout
				(Status::Done, 0)
			} else {
				log::debug!("{}", IoError::Read { errno: e });
				(Status::Error, 0)
			}
		}
		0 => (Status::Done, 0),
		n if n as usize == buf.len() => (Status::Ok, buf.len()),
		n => (Status::Done, n as usize),
	}
}

/// Sends `buf` with a single `send()` once the socket is writable.
///
/// Short writes are returned as-is. Retrying the remainder is up to the caller.
///
/// # Panics
/// If `buf` is larger than `MAX_BUFFER_SIZE`.
pub fn write_socket<S: AsRawFd>(socket: &S, buf: &[u8], timeout_ms: i32) -> std::io::Result<usize> {
	assert!(buf.len() <= MAX_BUFFER_SIZE, "write buffer of {} bytes exceeds MAX_BUFFER_SIZE", buf.len());
	if buf.is_empty() {
		return Ok(0);
	}
	if !poll(socket, timeout_ms, PollMode::Write)? {
		return Err(IoError::TimedOut { timeout_ms }.into());
	}
	loop {
		let n = unsafe {
			libc::send(
				socket.as_raw_fd(),
				buf.as_ptr() as *const libc::c_void,
				buf.len(),
				SEND_FLAGS,
			)
		};
		if n == -1 {
			let e = errno();
			match e {
				libc::EINTR => continue,
				libc::EPIPE | libc::ECONNRESET => return Err(IoError::ConnectionClosed.into()),
				_ => return Err(IoError::Write { errno: e }.into()),
			}
		}
		return Ok(n as usize);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use std::os::unix::net::UnixStream;
	use std::time::{Duration, Instant};

	#[test]
	fn read_times_out_as_done() {
		let (a, _b) = UnixStream::pair().unwrap();
		let mut buf = [0u8; 16];
		let start = Instant::now();
		assert_eq!(read_socket(&a, &mut buf, 100), (Status::Done, 0));
		let elapsed = start.elapsed();
		assert!(elapsed >= Duration::from_millis(90), "{elapsed:?}");
		assert!(elapsed < Duration::from_secs(1), "{elapsed:?}");
	}

	#[test]
	fn short_read_is_done_and_exact_fill_is_ok() {
		let (a, mut b) = UnixStream::pair().unwrap();
		b.write_all(b"abcd").unwrap();
		let mut buf = [0u8; 4];
		assert_eq!(read_socket(&a, &mut buf, 100), (Status::Ok, 4));
		assert_eq!(&buf, b"abcd");

		b.write_all(b"xy").unwrap();
		assert_eq!(read_socket(&a, &mut buf, 100), (Status::Done, 2));
		assert_eq!(&buf[..2], b"xy");
	}

	#[test]
	fn peer_close_is_done() {
		let (a, b) = UnixStream::pair().unwrap();
		drop(b);
		let mut buf = [0u8; 8];
		assert_eq!(read_socket(&a, &mut buf, 100), (Status::Done, 0));
	}

	#[test]
	fn write_reports_bytes_sent() {
		let (a, b) = UnixStream::pair().unwrap();
		assert_eq!(write_socket(&a, b"hello", 100).unwrap(), 5);
		let mut buf = [0u8; 8];
		assert_eq!(read_socket(&b, &mut buf, 100), (Status::Done, 5));
		assert_eq!(&buf[..5], b"hello");
	}

	#[test]
	fn poll_zero_timeout_returns_immediately() {
		let (a, mut b) = UnixStream::pair().unwrap();
		assert!(!poll(&a, 0, PollMode::Read).unwrap());
		assert!(poll(&a, 0, PollMode::Write).unwrap());
		b.write_all(b"!").unwrap();
		assert!(poll(&a, 0, PollMode::Read).unwrap());
	}

	#[test]
	fn close_is_idempotent() {
		let mut handle = Some(create(AddressFamily::INet, SocketType::Stream, Protocol::Unspecified, true).unwrap());
		close(&mut handle);
		assert!(handle.is_none());
		close(&mut handle);
		assert!(handle.is_none());
	}

	#[test]
	fn nonblocking_create() {
		let fd = create(AddressFamily::INet, SocketType::Stream, Protocol::Tcp, false).unwrap();
		assert!(!is_blocking(&fd).unwrap());
		set_blocking(&fd, true).unwrap();
		assert!(is_blocking(&fd).unwrap());
	}

	#[test]
	#[should_panic(expected = "exceeds MAX_BUFFER_SIZE")]
	fn oversize_buffer_panics() {
		let (a, _b) = UnixStream::pair().unwrap();
		let mut buf = vec![0u8; MAX_BUFFER_SIZE + 1];
		let _ = read_socket(&a, &mut buf, 0);
	}
}
