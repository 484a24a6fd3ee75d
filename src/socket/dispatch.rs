use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use crate::addr::SocketAddrV4;
use super::builder::StreamConfig;
use super::cancel::CancelToken;
use super::server::Handler;
use super::stream::{SocketReader, SocketWriter, StreamBuffer};
use super::Socket;

/// One accepted connection, owned by whichever worker runs its handler.
#[derive(Debug)]
pub struct Connection {
	socket: Socket,
	peer: SocketAddrV4,
	ordinal: usize,
	token: CancelToken,
	deadline: Option<Instant>,
	stream: StreamConfig,
}

impl Connection {
	pub(crate) fn new(
		socket: Socket,
		peer: SocketAddrV4,
		ordinal: usize,
		token: CancelToken,
		deadline: Option<Instant>,
		stream: StreamConfig,
	) -> Self {
		Self { socket, peer, ordinal, token, deadline, stream }
	}

	pub fn socket(&self) -> &Socket {
		&self.socket
	}

	/// Address of the client, captured at accept.
	pub fn peer(&self) -> SocketAddrV4 {
		self.peer
	}

	/// 1-based position in accept order.
	pub fn ordinal(&self) -> usize {
		self.ordinal
	}

	pub fn token(&self) -> &CancelToken {
		&self.token
	}

	pub fn is_cancelled(&self) -> bool {
		self.token.is_cancelled()
	}

	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	/// Time left before the deadline. `None` without a deadline.
	pub fn remaining(&self) -> Option<Duration> {
		self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
	}

	pub fn is_expired(&self) -> bool {
		self.remaining() == Some(Duration::ZERO)
	}

	/// Stream timeout clamped to the remaining deadline.
	fn stream_config(&self) -> StreamConfig {
		let Some(left) = self.remaining() else {
			return self.stream;
		};
		let left_ms = left.as_millis().min(i32::MAX as u128) as i32;
		let timeout_ms = if self.stream.timeout_ms < 0 {
			left_ms
		} else {
			self.stream.timeout_ms.min(left_ms)
		};
		self.stream.timeout_ms(timeout_ms)
	}

	/// Fresh reader with an empty buffer.
	///
	/// Bytes an earlier reader fetched but did not consume are not seen here.
	/// Keep one reader for the whole exchange, or hand its `into_buffer()` to
	/// `resume_reader`.
	pub fn reader(&self) -> SocketReader<'_> {
		self.socket.reader(self.stream_config())
	}

	pub fn resume_reader(&self, buffer: StreamBuffer) -> SocketReader<'_> {
		SocketReader::resume(&self.socket, self.stream_config(), buffer)
	}

	pub fn writer(&self) -> SocketWriter<'_> {
		self.socket.writer(self.stream_config())
	}

	/// Drains the connection into `sink` until the peer is done.
	///
	/// Starts from an empty buffer, like `reader()`.
	pub fn read_to<W: Write + ?Sized>(&self, sink: &mut W) -> std::io::Result<u64> {
		self.reader().copy_to(sink)
	}

	/// Writes all of `bytes`, looping over short sends.
	pub fn write_all(&self, bytes: &[u8]) -> std::io::Result<()> {
		self.writer().write_all(bytes)
	}

	pub fn close(&mut self) {
		self.socket.close();
	}
}

/// Decrements the outstanding count when dropped, even during a panic.
struct Slot<'a>(&'a AtomicUsize);

impl Drop for Slot<'_> {
	fn drop(&mut self) {
		self.0.fetch_sub(1, Ordering::SeqCst);
	}
}

/// Sending half used by the acceptor.
pub(crate) struct Dispatch {
	sender: SyncSender<Connection>,
	outstanding: Arc<AtomicUsize>,
}

impl Dispatch {
	/// Queues `conn`. While the queue is full this retries every `retry`
	/// until `give_up` returns true, then drops the connection.
	pub(crate) fn submit(&self, conn: Connection, retry: Duration, give_up: impl Fn() -> bool) -> bool {
		self.outstanding.fetch_add(1, Ordering::SeqCst);
		let mut conn = conn;
		loop {
			match self.sender.try_send(conn) {
				Ok(()) => return true,
				Err(TrySendError::Full(back)) => {
					if give_up() {
						log::debug!("dropping connection #{} from {}: queue full", back.ordinal, back.peer);
						break;
					}
					conn = back;
					std::thread::sleep(retry);
				}
				Err(TrySendError::Disconnected(back)) => {
					log::debug!("dropping connection #{} from {}: pool closed", back.ordinal, back.peer);
					break;
				}
			}
		}
		self.outstanding.fetch_sub(1, Ordering::SeqCst);
		false
	}
}

/// Fixed set of handler threads fed through a bounded queue.
pub(crate) struct WorkerPool {
	sender: Option<SyncSender<Connection>>,
	workers: Vec<JoinHandle<()>>,
	outstanding: Arc<AtomicUsize>,
}

impl WorkerPool {
	pub(crate) fn new(workers: usize, capacity: usize, handler: Option<Handler>) -> std::io::Result<Self> {
		let (sender, receiver) = sync_channel(capacity);
		let receiver = Arc::new(Mutex::new(receiver));
		let outstanding = Arc::new(AtomicUsize::new(0));

		let mut pool = Self {
			sender: Some(sender),
			workers: Vec::with_capacity(workers.max(1)),
			outstanding,
		};
		for id in 0..workers.max(1) {
			let receiver = Arc::clone(&receiver);
			let outstanding = Arc::clone(&pool.outstanding);
			let handler = handler.clone();
			let worker = std::thread::Builder::new()
				.name(format!("socklane-worker-{id}"))
				.spawn(move || work(id, &receiver, &outstanding, handler.as_ref()))?;
			pool.workers.push(worker);
		}
		Ok(pool)
	}

	pub(crate) fn dispatch(&self) -> Option<Dispatch> {
		self.sender.as_ref().map(|sender| Dispatch {
			sender: sender.clone(),
			outstanding: Arc::clone(&self.outstanding),
		})
	}

	pub(crate) fn counter(&self) -> Arc<AtomicUsize> {
		Arc::clone(&self.outstanding)
	}

	/// Closes the queue and waits up to `grace` for queued and running handlers.
	///
	/// Returns true when everything drained and the workers were joined.
	/// Otherwise the workers are left to finish on their own.
	pub(crate) fn shutdown(mut self, grace: Duration) -> bool {
		self.sender = None;
		let deadline = Instant::now() + grace;
		while self.outstanding.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
			std::thread::sleep(Duration::from_millis(10));
		}
		let left = self.outstanding.load(Ordering::SeqCst);
		if left > 0 {
			log::warn!("{} connection(s) still in flight after {:?}; detaching workers", left, grace);
			self.workers.clear();
			return false;
		}
		for worker in self.workers.drain(..) {
			if worker.join().is_err() {
				log::warn!("worker thread panicked");
			}
		}
		true
	}
}

fn work(id: usize, receiver: &Mutex<Receiver<Connection>>, outstanding: &AtomicUsize, handler: Option<&Handler>) {
	loop {
		let next = receiver.lock().unwrap_or_else(PoisonError::into_inner).recv();
		let Ok(mut conn) = next else {
			break;
		};
		let _slot = Slot(outstanding);
		log::debug!("worker {} handling #{} from {}", id, conn.ordinal, conn.peer);
		if let Some(handler) = handler {
			if catch_unwind(AssertUnwindSafe(|| handler(&mut conn))).is_err() {
				log::warn!("handler panicked on connection #{} from {}", conn.ordinal, conn.peer);
			}
		}
		conn.close();
	}
	log::debug!("worker {} exiting", id);
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::AtomicBool;

	fn connection(ordinal: usize) -> Connection {
		let mut socket = Socket::new();
		socket.create().unwrap();
		Connection::new(
			socket,
			SocketAddrV4::new([127, 0, 0, 1], 9),
			ordinal,
			CancelToken::new(),
			None,
			StreamConfig::default(),
		)
	}

	#[test]
	fn every_connection_reaches_the_handler() {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&seen);
		let handler: Handler = Arc::new(move |conn: &mut Connection| {
			sink.lock().unwrap().push(conn.ordinal());
		});
		let pool = WorkerPool::new(2, 4, Some(handler)).unwrap();
		let dispatch = pool.dispatch().unwrap();
		for k in 1..=6 {
			assert!(dispatch.submit(connection(k), Duration::from_millis(1), || false));
		}
		drop(dispatch);
		assert!(pool.shutdown(Duration::from_secs(5)));
		let mut seen = seen.lock().unwrap().clone();
		seen.sort();
		assert_eq!(seen, [1, 2, 3, 4, 5, 6]);
	}

	#[test]
	fn panicking_handler_releases_its_slot() {
		let handler: Handler = Arc::new(|conn: &mut Connection| {
			if conn.ordinal() == 1 {
				panic!("boom");
			}
		});
		let pool = WorkerPool::new(1, 2, Some(handler)).unwrap();
		let counter = pool.counter();
		let dispatch = pool.dispatch().unwrap();
		assert!(dispatch.submit(connection(1), Duration::from_millis(1), || false));
		assert!(dispatch.submit(connection(2), Duration::from_millis(1), || false));
		drop(dispatch);
		assert!(pool.shutdown(Duration::from_secs(5)));
		assert_eq!(counter.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn slow_handler_is_detached_after_grace() {
		let release = Arc::new(AtomicBool::new(false));
		let gate = Arc::clone(&release);
		let handler: Handler = Arc::new(move |_: &mut Connection| {
			while !gate.load(Ordering::SeqCst) {
				std::thread::sleep(Duration::from_millis(5));
			}
		});
		let pool = WorkerPool::new(1, 1, Some(handler)).unwrap();
		let dispatch = pool.dispatch().unwrap();
		assert!(dispatch.submit(connection(1), Duration::from_millis(1), || false));
		drop(dispatch);
		let start = Instant::now();
		assert!(!pool.shutdown(Duration::from_millis(100)));
		assert!(start.elapsed() < Duration::from_secs(2));
		release.store(true, Ordering::SeqCst);
	}

	#[test]
	fn full_queue_retries_then_gives_up() {
		let started = Arc::new(AtomicBool::new(false));
		let release = Arc::new(AtomicBool::new(false));
		let seen = Arc::new(Mutex::new(Vec::new()));
		let (busy, gate, sink) = (Arc::clone(&started), Arc::clone(&release), Arc::clone(&seen));
		let handler: Handler = Arc::new(move |conn: &mut Connection| {
			sink.lock().unwrap().push(conn.ordinal());
			busy.store(true, Ordering::SeqCst);
			while !gate.load(Ordering::SeqCst) {
				std::thread::sleep(Duration::from_millis(5));
			}
		});
		let pool = WorkerPool::new(1, 1, Some(handler)).unwrap();
		let counter = pool.counter();
		let dispatch = pool.dispatch().unwrap();

		// #1 occupies the only worker, #2 fills the queue
		assert!(dispatch.submit(connection(1), Duration::from_millis(1), || false));
		while !started.load(Ordering::SeqCst) {
			std::thread::sleep(Duration::from_millis(1));
		}
		assert!(dispatch.submit(connection(2), Duration::from_millis(1), || false));
		assert_eq!(counter.load(Ordering::SeqCst), 2);

		assert!(!dispatch.submit(connection(3), Duration::from_millis(1), || true));
		assert_eq!(counter.load(Ordering::SeqCst), 2);

		let opener = std::thread::spawn(move || {
			std::thread::sleep(Duration::from_millis(30));
			release.store(true, Ordering::SeqCst);
		});
		let retries = std::cell::Cell::new(0);
		assert!(dispatch.submit(connection(4), Duration::from_millis(2), || {
			retries.set(retries.get() + 1);
			false
		}));
		assert!(retries.get() > 0);
		opener.join().unwrap();

		drop(dispatch);
		assert!(pool.shutdown(Duration::from_secs(5)));
		assert_eq!(counter.load(Ordering::SeqCst), 0);
		assert_eq!(*seen.lock().unwrap(), [1, 2, 4]);
	}

	#[test]
	fn deadline_clamps_stream_timeout() {
		let mut conn = connection(1);
		assert_eq!(conn.stream_config().timeout_ms, StreamConfig::default().timeout_ms);
		conn.deadline = Some(Instant::now() + Duration::from_millis(200));
		assert!(conn.stream_config().timeout_ms <= 200);
		conn.deadline = Some(Instant::now());
		assert!(conn.is_expired());
		assert_eq!(conn.stream_config().timeout_ms, 0);
	}
}
