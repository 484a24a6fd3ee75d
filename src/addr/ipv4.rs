use crate::addr::ToSockAddr;
use crate::error::SocketError;

/// IPv4 socket address (IP + port).
///
/// Also serves as the peer address captured by `accept()`. It never changes after capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketAddrV4 {
	ip: [u8; 4],
	port: u16,
}

impl SocketAddrV4 {
	/// Creates a new IPv4 address.
	pub fn new(ip: [u8; 4], port: u16) -> Self {
		Self { ip, port }
	}

	/// Parses a dotted-decimal address. The empty string means "any" (0.0.0.0).
	pub fn parse(address: &str, port: u16) -> std::io::Result<Self> {
		let network = ascii_to_network(address)?;
		Ok(Self {
			ip: network.to_ne_bytes(),
			port,
		})
	}

	/// Creates from raw sockaddr_in.
	pub(crate) fn from_raw(raw: &libc::sockaddr_in) -> Self {
		Self {
			ip: raw.sin_addr.s_addr.to_ne_bytes(),
			port: u16::from_be(raw.sin_port),
		}
	}

	/// Returns the IP bytes.
	pub fn ip(&self) -> [u8; 4] {
		self.ip
	}

	/// Returns the address as a dotted-decimal string.
	pub fn address(&self) -> String {
		network_to_ascii(u32::from_ne_bytes(self.ip))
	}

	/// Returns the port.
	pub fn port(&self) -> u16 {
		self.port
	}

	/// Converts to the raw sockaddr_in for syscalls.
	pub(crate) fn to_raw(&self) -> libc::sockaddr_in {
		let mut raw: libc::sockaddr_in = unsafe { std::mem::zeroed() };
		raw.sin_family = libc::AF_INET as libc::sa_family_t;
		raw.sin_port = self.port.to_be();
		// ip is already in network order, so the in-memory bytes are copied as-is
		raw.sin_addr = libc::in_addr {
			s_addr: u32::from_ne_bytes(self.ip),
		};
		raw
	}
}

impl std::fmt::Display for SocketAddrV4 {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let [a, b, c, d] = self.ip;
		write!(f, "{}.{}.{}.{}:{}", a, b, c, d, self.port)
	}
}

impl std::str::FromStr for SocketAddrV4 {
	type Err = std::io::Error;

	/// Parses `a.b.c.d:port`.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let invalid = |reason| SocketError::InvalidAddress {
			address: s.to_string(),
			reason,
		};
		let (address, port) = s.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
		let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;
		Self::parse(address, port)
	}
}

impl ToSockAddr for SocketAddrV4 {
	fn with_raw<F, R>(&self, f: F) -> Option<R>
	where
		F: FnOnce(*const libc::sockaddr, libc::socklen_t) -> R,
	{
		let raw = self.to_raw();
		let ptr = &raw as *const _ as *const libc::sockaddr;
		let len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
		Some(f(ptr, len))
	}
}

/// Converts a dotted-decimal string to an IPv4 address in network byte order.
///
/// Accepts exactly four octets, each 1-3 digits, no leading zeros, value at most 255.
/// The empty string yields INADDR_ANY.
pub fn ascii_to_network(address: &str) -> std::io::Result<u32> {
	if address.is_empty() {
		return Ok(libc::INADDR_ANY);
	}
	let invalid = |reason| -> std::io::Error {
		SocketError::InvalidAddress {
			address: address.to_string(),
			reason,
		}
		.into()
	};

	let mut octets = [0u8; 4];
	let mut count = 0;
	for part in address.split('.') {
		if count == 4 {
			return Err(invalid("expected four octets"));
		}
		octets[count] = parse_octet(part).map_err(invalid)?;
		count += 1;
	}
	if count != 4 {
		return Err(invalid("expected four octets"));
	}
	Ok(u32::from_ne_bytes(octets))
}

fn parse_octet(part: &str) -> Result<u8, &'static str> {
	if part.is_empty() || part.len() > 3 {
		return Err("octet must have one to three digits");
	}
	if !part.bytes().all(|b| b.is_ascii_digit()) {
		return Err("octet is not a decimal number");
	}
	if part.len() > 1 && part.starts_with('0') {
		return Err("octet has a leading zero");
	}
	let value: u16 = part.parse().map_err(|_| "octet is not a decimal number")?;
	u8::try_from(value).map_err(|_| "octet out of range")
}

/// Converts an IPv4 address in network byte order to dotted-decimal.
pub fn network_to_ascii(network: u32) -> String {
	let [a, b, c, d] = network.to_ne_bytes();
	format!("{}.{}.{}.{}", a, b, c, d)
}
