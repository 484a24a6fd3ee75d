use std::ffi::{CStr, CString};
use crate::addr::{AddressFamily, FromSockAddr, SocketAddrV4};
use crate::error::SocketError;
use crate::socket::{Protocol, SocketType};

/// One candidate returned by host resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
	pub name: String,
	/// Dotted-decimal address; empty unless `family` is `INet`.
	pub address: String,
	pub family: AddressFamily,
	pub sock_type: SocketType,
	pub protocol: Protocol,
}

/// Resolves `name` into every candidate the system resolver reports.
///
/// Literal addresses resolve without touching the network.
pub fn resolve(name: &str) -> std::io::Result<Vec<Host>> {
	let c_name = CString::new(name).map_err(|_| SocketError::Resolve {
		name: name.to_string(),
		reason: "name contains a NUL byte".into(),
	})?;

	let mut res: *mut libc::addrinfo = std::ptr::null_mut();
	let err = unsafe { libc::getaddrinfo(c_name.as_ptr(), std::ptr::null(), std::ptr::null(), &mut res) };
	if err != 0 {
		let reason = unsafe { CStr::from_ptr(libc::gai_strerror(err)) }
			.to_string_lossy()
			.into_owned();
		return Err(SocketError::Resolve { name: name.to_string(), reason }.into());
	}

	let mut hosts = Vec::new();
	let mut cur = res;
	while !cur.is_null() {
		let info = unsafe { &*cur };
		let family = AddressFamily::from_raw(info.ai_family);
		let address = if family == AddressFamily::INet && !info.ai_addr.is_null() {
			unsafe { SocketAddrV4::from_sockaddr(info.ai_addr, info.ai_addrlen) }
				.map(|addr| addr.address())
				.unwrap_or_default()
		} else {
			String::new()
		};
		hosts.push(Host {
			name: name.to_string(),
			address,
			family,
			sock_type: SocketType::from_raw(info.ai_socktype),
			protocol: Protocol::from_raw(info.ai_protocol),
		});
		cur = info.ai_next;
	}
	unsafe { libc::freeaddrinfo(res) };

	log::trace!("resolved {:?} to {} candidate(s)", name, hosts.len());
	Ok(hosts)
}

/// Picks the first IPv4 candidate.
pub fn inet_host(hosts: &[Host]) -> Option<&Host> {
	hosts.iter().find(|host| host.family == AddressFamily::INet)
}

/// Multi-line listing of resolution results, for diagnostics.
pub struct HostList<'a>(pub &'a [Host]);

impl std::fmt::Display for HostList<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		for (i, host) in self.0.iter().enumerate() {
			writeln!(f, "Host[{}]", i)?;
			writeln!(f, " - name:     {}", host.name)?;
			writeln!(f, " - address:  {}", host.address)?;
			writeln!(f, " - family:   {}", host.family)?;
			writeln!(f, " - type:     {}", host.sock_type)?;
			writeln!(f, " - protocol: {}", host.protocol)?;
		}
		Ok(())
	}
}
