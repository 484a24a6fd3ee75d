use socklane::{AddressFamily, INVALID_HANDLE, Socket, SocketConfig, SocketOptions, SocketType, TimeoutConfig};

#[test]
fn close_is_idempotent() {
	let mut socket = Socket::new();
	assert!(!socket.is_valid());
	socket.create().unwrap();
	assert!(socket.is_valid());
	for _ in 0..3 {
		socket.close();
		assert!(!socket.is_valid());
		assert_eq!(socket.handle(), INVALID_HANDLE);
	}
}

#[test]
fn bool_options_read_back() {
	let mut socket = Socket::with_config(SocketConfig::tcp());
	socket.create().unwrap();
	for value in [true, false, true] {
		socket.set_keep_alive(value).unwrap();
		assert_eq!(socket.keep_alive().unwrap(), value);
		socket.set_reuse_address(value).unwrap();
		assert_eq!(socket.reuse_address().unwrap(), value);
		socket.set_do_not_route(value).unwrap();
		assert_eq!(socket.do_not_route().unwrap(), value);
	}
}

#[test]
fn timeouts_read_back_in_milliseconds() {
	let mut socket = Socket::new();
	socket.create().unwrap();
	socket.set_receive_timeout(2500).unwrap();
	assert_eq!(socket.receive_timeout().unwrap(), 2500);
	socket.set_send_timeout(1000).unwrap();
	assert_eq!(socket.send_timeout().unwrap(), 1000);
	socket.set_send_timeout(0).unwrap();
	assert_eq!(socket.send_timeout().unwrap(), 0);
}

#[test]
fn options_apply_in_one_step() {
	let mut socket = Socket::with_config(SocketConfig::tcp());
	socket.create().unwrap();
	SocketOptions::new()
		.keepalive(true)
		.nodelay(true)
		.timeouts(TimeoutConfig::new().both(500))
		.apply(&socket)
		.unwrap();
	assert!(socket.keep_alive().unwrap());
	assert!(socket.nodelay().unwrap());
	assert_eq!(socket.receive_timeout().unwrap(), 500);
	assert_eq!(socket.send_timeout().unwrap(), 500);
}

#[test]
fn nonblocking_flag_follows_config() {
	let mut socket = Socket::with_config(SocketConfig::new().blocking(false));
	socket.create().unwrap();
	assert_eq!(socket.family(), AddressFamily::INet);
	assert_eq!(socket.sock_type(), SocketType::Stream);
	assert!(!socket.is_blocking().unwrap());
	socket.set_blocking(true).unwrap();
	assert!(socket.is_blocking().unwrap());
}

#[test]
fn buffer_size_is_at_least_requested() {
	let mut socket = Socket::new();
	socket.create().unwrap();
	socket.set_receive_buffer_size(8192).unwrap();
	assert!(socket.receive_buffer_size().unwrap() >= 8192);
}
