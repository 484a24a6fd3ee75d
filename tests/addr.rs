use socklane::{SocketAddrV4, ascii_to_network, network_to_ascii, resolve, inet_host};

#[test]
fn dotted_decimal_round_trip() {
	let samples = [
		"0.0.0.0", "127.0.0.1", "255.255.255.255", "10.0.0.254",
		"192.168.1.1", "1.22.133.4", "9.99.199.249",
	];
	for s in samples {
		assert_eq!(network_to_ascii(ascii_to_network(s).unwrap()), s);
	}
	// every single-octet value in each position
	for v in 0..=255u32 {
		for pos in 0..4 {
			let mut octets = ["1"; 4].map(String::from);
			octets[pos] = v.to_string();
			let s = octets.join(".");
			assert_eq!(network_to_ascii(ascii_to_network(&s).unwrap()), s);
		}
	}
}

#[test]
fn out_of_range_octet_is_rejected() {
	assert!(ascii_to_network("999.1.1.1").is_err());
	let loopback = ascii_to_network("127.0.0.1").unwrap();
	assert_eq!(network_to_ascii(loopback), "127.0.0.1");
}

#[test]
fn socket_addr_display_and_parse() {
	let addr: SocketAddrV4 = "127.0.0.1:5555".parse().unwrap();
	assert_eq!(addr.ip(), [127, 0, 0, 1]);
	assert_eq!(addr.port(), 5555);
	assert_eq!(addr.to_string(), "127.0.0.1:5555");
	assert!("127.0.0.1".parse::<SocketAddrV4>().is_err());
	assert!("127.0.0.1:70000".parse::<SocketAddrV4>().is_err());
}

#[test]
fn localhost_literal_resolves() {
	let hosts = resolve("127.0.0.1").unwrap();
	let host = inet_host(&hosts).unwrap();
	assert_eq!(host.address, "127.0.0.1");
}
