use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Shared stop flag passed explicitly to a server and every connection it dispatches.
///
/// Clones observe the same flag. Cancelling is one-way.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
	flag: Arc<AtomicBool>,
	parent: Option<Box<CancelToken>>,
}

impl CancelToken {
	pub fn new() -> Self {
		Self::default()
	}

	/// New token that is cancelled when `self` is, but whose own `cancel()`
	/// leaves `self` untouched.
	pub fn child(&self) -> Self {
		Self {
			flag: Arc::new(AtomicBool::new(false)),
			parent: Some(Box::new(self.clone())),
		}
	}

	pub fn cancel(&self) {
		self.flag.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.flag.load(Ordering::SeqCst)
			|| self.parent.as_ref().is_some_and(|p| p.is_cancelled())
	}

	/// Sleeps in short steps until cancelled or `timeout` elapses.
	/// Returns whether the token was cancelled.
	pub fn wait_timeout(&self, timeout: Duration) -> bool {
		let deadline = Instant::now() + timeout;
		while !self.is_cancelled() {
			let now = Instant::now();
			if now >= deadline {
				return false;
			}
			std::thread::sleep((deadline - now).min(Duration::from_millis(10)));
		}
		true
	}
}
