use std::io::{BufRead, Read, Write};
use std::str::FromStr;
use crate::error::IoError;
use super::builder::StreamConfig;
use super::{MAX_BUFFER_SIZE, Socket, Status};

/// Largest block a `SocketReader` asks for in one fill.
pub const MAX_BLOCK_SIZE: usize = 0x7FFF;

/// Bytes received so far, a read cursor, and the status of the last fill.
///
/// The byte sequence only grows. Consumed bytes stay in place so the cursor
/// can step back over them. Status moves from `Ok` to `Done` or `Error` and
/// stays there.
#[derive(Debug, Clone)]
pub struct StreamBuffer {
	data: Vec<u8>,
	cursor: usize,
	status: Status,
}

impl Default for StreamBuffer {
	fn default() -> Self {
		Self {
			data: Vec::new(),
			cursor: 0,
			status: Status::Ok,
		}
	}
}

impl StreamBuffer {
	pub fn new() -> Self {
		Self::default()
	}

	#[inline]
	pub fn status(&self) -> Status {
		self.status
	}

	/// Ignored once the status is terminal.
	pub fn set_status(&mut self, status: Status) {
		if !self.status.is_terminal() {
			self.status = status;
		}
	}

	/// Everything received, consumed or not.
	pub fn as_bytes(&self) -> &[u8] {
		&self.data
	}

	/// Received but not yet consumed.
	pub fn available(&self) -> &[u8] {
		&self.data[self.cursor..]
	}

	#[inline]
	pub fn cursor(&self) -> usize {
		self.cursor
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.data.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	pub fn extend(&mut self, bytes: &[u8]) {
		self.data.extend_from_slice(bytes);
	}

	/// Moves the cursor forward, never past the end.
	pub fn consume(&mut self, n: usize) {
		self.cursor = (self.cursor + n).min(self.data.len());
	}

	pub fn next_byte(&mut self) -> Option<u8> {
		let byte = self.data.get(self.cursor).copied()?;
		self.cursor += 1;
		Some(byte)
	}

	pub fn peek(&self) -> Option<u8> {
		self.data.get(self.cursor).copied()
	}

	/// Steps the cursor back one byte. False at the start of the buffer.
	pub fn unread(&mut self) -> bool {
		if self.cursor == 0 {
			return false;
		}
		self.cursor -= 1;
		true
	}

	/// Appends up to `block` bytes produced by `read` and records its status.
	fn fill_with(&mut self, block: usize, read: impl FnOnce(&mut [u8]) -> (Status, usize)) -> Status {
		let start = self.data.len();
		self.data.resize(start + block, 0);
		let (status, n) = read(&mut self.data[start..]);
		self.data.truncate(start + n);
		self.set_status(status);
		self.status
	}
}

/// Input adapter over a borrowed socket.
///
/// Each fill is exactly one `read_socket` call of `block_size` bytes. A fill
/// that times out or sees the peer close moves the status to `Done`.
pub struct SocketReader<'a> {
	socket: &'a Socket,
	buffer: StreamBuffer,
	config: StreamConfig,
}

impl<'a> SocketReader<'a> {
	/// # Panics
	/// If `config.block_size` is zero or above `MAX_BLOCK_SIZE`.
	pub fn new(socket: &'a Socket, config: StreamConfig) -> Self {
		assert!(
			config.block_size > 0 && config.block_size <= MAX_BLOCK_SIZE,
			"block size {} outside 1..={}", config.block_size, MAX_BLOCK_SIZE
		);
		Self {
			socket,
			buffer: StreamBuffer::new(),
			config,
		}
	}

	/// Continues from a buffer taken out of an earlier reader with `into_buffer`,
	/// so bytes it fetched but never consumed are not lost.
	pub fn resume(socket: &'a Socket, config: StreamConfig, buffer: StreamBuffer) -> Self {
		let mut reader = Self::new(socket, config);
		reader.buffer = buffer;
		reader
	}

	#[inline]
	pub fn status(&self) -> Status {
		self.buffer.status()
	}

	pub fn buffer(&self) -> &StreamBuffer {
		&self.buffer
	}

	pub fn into_buffer(self) -> StreamBuffer {
		self.buffer
	}

	/// Performs one read unless the status is already terminal.
	pub fn fill(&mut self) -> Status {
		if self.buffer.status().is_terminal() {
			return self.buffer.status();
		}
		let socket = self.socket;
		let timeout_ms = self.config.timeout_ms;
		let status = self.buffer.fill_with(self.config.block_size, |buf| {
			socket.read(buf, timeout_ms)
		});
		log::trace!("fd={} fill -> {:?}, {} bytes buffered", socket.handle(), status, self.buffer.len());
		status
	}

	/// Fills only when every buffered byte has been consumed.
	fn ensure(&mut self) -> bool {
		if self.buffer.available().is_empty() {
			self.fill();
		}
		!self.buffer.available().is_empty()
	}

	pub fn read_byte(&mut self) -> Option<u8> {
		if self.ensure() { self.buffer.next_byte() } else { None }
	}

	pub fn peek_byte(&mut self) -> Option<u8> {
		if self.ensure() { self.buffer.peek() } else { None }
	}

	/// Pushes the last consumed byte back.
	pub fn unread(&mut self) -> bool {
		self.buffer.unread()
	}

	/// Next whitespace-delimited token. The delimiter is left unread.
	pub fn read_token(&mut self) -> Option<String> {
		let mut token = Vec::new();
		loop {
			match self.read_byte() {
				Some(b) if b.is_ascii_whitespace() => {
					if token.is_empty() {
						continue;
					}
					self.unread();
					break;
				}
				Some(b) => token.push(b),
				None => break,
			}
		}
		if token.is_empty() {
			None
		} else {
			Some(String::from_utf8_lossy(&token).into_owned())
		}
	}

	/// Reads one token and parses it. The token is consumed even if parsing fails.
	pub fn read_value<T: FromStr>(&mut self) -> Option<T> {
		self.read_token()?.parse().ok()
	}

	/// Writes everything still to come into `sink`, filling until `Done` or `Error`.
	///
	/// Returns the number of bytes written. Bytes received before a failed fill
	/// are still written; the failure is reported afterwards.
	pub fn copy_to<W: Write + ?Sized>(&mut self, sink: &mut W) -> std::io::Result<u64> {
		let mut total = 0u64;
		loop {
			let chunk = self.buffer.available();
			if !chunk.is_empty() {
				sink.write_all(chunk)?;
				total += chunk.len() as u64;
				let n = chunk.len();
				self.buffer.consume(n);
			}
			match self.buffer.status() {
				Status::Ok => {
					self.fill();
				}
				Status::Done => {
					if self.buffer.available().is_empty() {
						return Ok(total);
					}
				}
				Status::Error => {
					if self.buffer.available().is_empty() {
						return Err(IoError::Broken.into());
					}
				}
			}
		}
	}
}

impl Read for SocketReader<'_> {
	fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
		let available = self.fill_buf()?;
		let n = available.len().min(out.len());
		out[..n].copy_from_slice(&available[..n]);
		self.consume(n);
		Ok(n)
	}
}

impl BufRead for SocketReader<'_> {
	fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
		if !self.ensure() && self.buffer.status() == Status::Error {
			return Err(IoError::Broken.into());
		}
		Ok(self.buffer.available())
	}

	fn consume(&mut self, amt: usize) {
		self.buffer.consume(amt);
	}
}

/// Output adapter. Nothing is buffered: every `write` is one `write_socket`.
pub struct SocketWriter<'a> {
	socket: &'a Socket,
	timeout_ms: i32,
	written: u64,
}

impl<'a> SocketWriter<'a> {
	pub fn new(socket: &'a Socket, config: StreamConfig) -> Self {
		Self {
			socket,
			timeout_ms: config.timeout_ms,
			written: 0,
		}
	}

	/// Total bytes accepted by the kernel through this writer.
	pub fn written(&self) -> u64 {
		self.written
	}
}

impl Write for SocketWriter<'_> {
	fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
		let len = buf.len().min(MAX_BUFFER_SIZE);
		let n = self.socket.write(&buf[..len], self.timeout_ms)?;
		self.written += n as u64;
		Ok(n)
	}

	fn flush(&mut self) -> std::io::Result<()> {
		Ok(())  // nothing held back
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::os::fd::OwnedFd;
	use std::os::unix::net::UnixStream;

	fn pair() -> (Socket, UnixStream) {
		let (a, b) = UnixStream::pair().unwrap();
		(Socket::from(OwnedFd::from(a)), b)
	}

	fn config(block: usize) -> StreamConfig {
		StreamConfig::new().block_size(block).timeout_ms(100)
	}

	#[test]
	fn status_never_leaves_a_terminal_state() {
		let mut buffer = StreamBuffer::new();
		buffer.set_status(Status::Done);
		buffer.set_status(Status::Ok);
		assert_eq!(buffer.status(), Status::Done);
		buffer.set_status(Status::Error);
		assert_eq!(buffer.status(), Status::Done);
	}

	#[test]
	fn unread_at_start_is_refused() {
		let mut buffer = StreamBuffer::new();
		assert!(!buffer.unread());
		buffer.extend(b"ab");
		assert_eq!(buffer.next_byte(), Some(b'a'));
		assert!(buffer.unread());
		assert_eq!(buffer.next_byte(), Some(b'a'));
		assert_eq!(buffer.next_byte(), Some(b'b'));
		assert_eq!(buffer.next_byte(), None);
	}

	#[test]
	fn exact_block_fill_stays_ok() {
		let (socket, mut peer) = pair();
		peer.write_all(b"abcd").unwrap();
		let mut reader = SocketReader::new(&socket, config(4));
		assert_eq!(reader.fill(), Status::Ok);
		assert_eq!(reader.buffer().available(), b"abcd");
		// nothing more pending: the next fill waits out the timeout
		assert_eq!(reader.fill(), Status::Done);
	}

	#[test]
	fn tokens_and_values() {
		let (socket, mut peer) = pair();
		peer.write_all(b"  GET 42\n-7 x").unwrap();
		drop(peer);
		let mut reader = SocketReader::new(&socket, config(3));
		assert_eq!(reader.read_token().as_deref(), Some("GET"));
		assert_eq!(reader.read_value::<u32>(), Some(42));
		assert_eq!(reader.read_value::<i64>(), Some(-7));
		assert_eq!(reader.read_value::<i64>(), None);
		assert_eq!(reader.read_token(), None);
		assert_eq!(reader.status(), Status::Done);
	}

	#[test]
	fn writer_sends_immediately() {
		let (socket, mut peer) = pair();
		let mut writer = socket.writer(config(16));
		writer.write_all(b"ping").unwrap();
		assert_eq!(writer.written(), 4);
		let mut buf = [0u8; 4];
		peer.read_exact(&mut buf).unwrap();
		assert_eq!(&buf, b"ping");
	}

	#[test]
	fn read_trait_drains_to_eof() {
		let (socket, mut peer) = pair();
		peer.write_all(b"line one\nline two\n").unwrap();
		drop(peer);
		let mut reader = socket.reader(config(5));
		let lines: Vec<String> = (&mut reader).lines().map(|l| l.unwrap()).collect();
		assert_eq!(lines, ["line one", "line two"]);
		assert_eq!(reader.read(&mut [0u8; 8]).unwrap(), 0);
	}

	#[test]
	#[should_panic(expected = "outside")]
	fn oversize_block_panics() {
		let (socket, _peer) = pair();
		let _ = SocketReader::new(&socket, config(MAX_BLOCK_SIZE + 1));
	}
}
