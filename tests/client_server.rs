use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use socklane::{ClientSocket, Connection, ServerConfig, ServerSocket, ServerState, StreamConfig};

fn collecting_server(config: ServerConfig, port: u16) -> (ServerSocket, Arc<Mutex<Vec<String>>>) {
	let messages = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&messages);
	let mut server = ServerSocket::new(config);
	server.on_accept(move |conn: &mut Connection| {
		let mut bytes = Vec::new();
		conn.read_to(&mut bytes).unwrap();
		sink.lock().unwrap().push(String::from_utf8(bytes).unwrap());
	});
	assert!(server.open("127.0.0.1", port));
	assert!(server.start());
	(server, messages)
}

fn send(port: u16, text: &str) {
	let mut client = ClientSocket::new();
	assert!(client.connect("127.0.0.1", port));
	client.writer().write_all(text.as_bytes()).unwrap();
	client.close();
}

#[test]
fn hello_on_fixed_port() {
	let config = ServerConfig::new()
		.max_connections(1)
		.stream(StreamConfig::new().block_size(72).timeout_ms(1000));
	let (mut server, messages) = collecting_server(config, 5555);

	let mut client = ClientSocket::new();
	assert!(client.connect("127.0.0.1", 5555));
	assert_eq!(client.write(b"Hello from client #1").unwrap(), 20);
	client.close();

	server.wait();
	assert_eq!(server.state(), ServerState::Stopped);
	assert_eq!(*messages.lock().unwrap(), ["Hello from client #1"]);
}

#[test]
fn bounded_server_handles_exactly_n() {
	let config = ServerConfig::new().max_connections(5).workers(2);
	let (mut server, messages) = collecting_server(config, 0);
	let port = server.local_addr().unwrap().port();

	for k in 1..=5 {
		send(port, &format!("Hello from client #{k}"));
	}
	server.wait();

	assert_eq!(server.accepted(), 5);
	assert_eq!(server.outstanding(), 0);
	let mut got = messages.lock().unwrap().clone();
	got.sort();
	let expected: Vec<String> = (1..=5).map(|k| format!("Hello from client #{k}")).collect();
	assert_eq!(got, expected);
}

#[test]
fn stop_refuses_new_connections() {
	let (mut server, messages) = collecting_server(ServerConfig::new(), 0);
	let port = server.local_addr().unwrap().port();
	send(port, "before");

	let start = Instant::now();
	server.stop();
	assert!(start.elapsed() < Duration::from_secs(3));
	assert_eq!(server.state(), ServerState::Stopped);
	assert!(!server.is_running());

	let mut late = ClientSocket::new();
	assert!(!late.connect("127.0.0.1", port));
	assert!(messages.lock().unwrap().len() <= 1);
}

#[test]
fn connect_to_closed_port_fails_quietly() {
	let port = {
		let mut server = ServerSocket::new(ServerConfig::new());
		assert!(server.open("127.0.0.1", 0));
		server.local_addr().unwrap().port()
	};
	let mut client = ClientSocket::new();
	assert!(!client.connect("127.0.0.1", port));
	assert!(!client.is_open());
}

#[test]
fn reply_reaches_client() {
	let mut server = ServerSocket::new(ServerConfig::new().max_connections(1));
	server.on_accept(|conn: &mut Connection| {
		let mut reader = conn.reader();
		let name = reader.read_token().unwrap_or_default();
		drop(reader);
		conn.write_all(format!("hi {name}").as_bytes()).unwrap();
	});
	assert!(server.open("", 0));
	assert!(server.start());
	let port = server.local_addr().unwrap().port();

	let mut client = ClientSocket::new();
	assert!(client.connect_host("localhost", port) || client.connect("127.0.0.1", port));
	client.writer().write_all(b"bob\n").unwrap();
	let mut reply = Vec::new();
	client.read_to(&mut reply).unwrap();
	assert_eq!(reply, b"hi bob");
	client.close();
	server.wait();
}

#[test]
fn resumed_reader_keeps_buffered_bytes() {
	let mut server = ServerSocket::new(ServerConfig::new().max_connections(1));
	server.on_accept(|conn: &mut Connection| {
		let mut reader = conn.reader();
		let name = reader.read_token().unwrap_or_default();
		// the first fill pulled in the whole line; carry it over
		let saved = reader.into_buffer();
		let rest = conn.resume_reader(saved).read_token().unwrap_or_default();
		conn.write_all(format!("hi {name} {rest}").as_bytes()).unwrap();
	});
	assert!(server.open("127.0.0.1", 0));
	assert!(server.start());
	let port = server.local_addr().unwrap().port();

	let mut client = ClientSocket::new();
	assert!(client.connect("127.0.0.1", port));
	client.writer().write_all(b"bob smith\n").unwrap();
	let mut reply = Vec::new();
	client.read_to(&mut reply).unwrap();
	assert_eq!(reply, b"hi bob smith");
	client.close();
	server.wait();
}
