/// Socket creation/configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("socket() failed: {}", describe(*.errno))]
    Create { errno: i32 },

    #[error("bind({addr}) failed: {}", describe(*.errno))]
    Bind { errno: i32, addr: String },

    #[error("listen(backlog={backlog}) failed: {}", describe(*.errno))]
    Listen { errno: i32, backlog: i32 },

    #[error("connect({addr}) failed: {}", describe(*.errno))]
    Connect { errno: i32, addr: String },

    #[error("accept() failed: {}", describe(*.errno))]
    Accept { errno: i32 },

    #[error("setsockopt({option}) failed: {}", describe(*.errno))]
    SetOption { errno: i32, option: &'static str },

    #[error("getsockopt({option}) failed: {}", describe(*.errno))]
    GetOption { errno: i32, option: &'static str },

    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: &'static str },

    #[error("failed to resolve {name:?}: {reason}")]
    Resolve { name: String, reason: String },
}

/// I/O operation errors.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("recv() failed: {}", describe(*.errno))]
    Read { errno: i32 },

    #[error("send() failed: {}", describe(*.errno))]
    Write { errno: i32 },

    #[error("poll() failed: {}", describe(*.errno))]
    Poll { errno: i32 },

    #[error("socket not ready within {timeout_ms} ms")]
    TimedOut { timeout_ms: i32 },

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("socket is not open")]
    NotOpen,

    #[error("stream unusable after a failed read")]
    Broken,
}

/// Returns the calling thread's last OS error code.
#[inline]
pub fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Text for the last OS error on this thread.
pub fn last_error() -> String {
    describe(errno())
}

/// Converts an OS error code to a human-readable string.
///
/// Only meant for diagnostics. Nothing in the crate branches on the text.
pub fn describe(errno: i32) -> String {
    match errno {
        0 => "no error".into(),
        libc::EACCES => "permission denied".into(),
        libc::EADDRINUSE => "address already in use".into(),
        libc::EADDRNOTAVAIL => "address not available".into(),
        libc::EAFNOSUPPORT => "address family not supported".into(),
        libc::EAGAIN => "resource temporarily unavailable".into(),
        libc::EALREADY => "operation already in progress".into(),
        libc::EBADF => "bad file descriptor".into(),
        libc::ECONNABORTED => "connection aborted".into(),
        libc::ECONNREFUSED => "connection refused".into(),
        libc::ECONNRESET => "connection reset by peer".into(),
        libc::EDESTADDRREQ => "destination address required".into(),
        libc::EFAULT => "bad address".into(),
        libc::EHOSTDOWN => "host is down".into(),
        libc::EHOSTUNREACH => "no route to host".into(),
        libc::EINPROGRESS => "operation in progress".into(),
        libc::EINTR => "interrupted by signal".into(),
        libc::EINVAL => "invalid argument".into(),
        libc::EISCONN => "socket is already connected".into(),
        libc::EMFILE => "too many open files".into(),
        libc::EMSGSIZE => "message too long".into(),
        libc::ENETDOWN => "network is down".into(),
        libc::ENETRESET => "network dropped connection on reset".into(),
        libc::ENETUNREACH => "network unreachable".into(),
        libc::ENFILE => "too many open files in system".into(),
        libc::ENOBUFS => "no buffer space available".into(),
        libc::ENOPROTOOPT => "protocol not available".into(),
        libc::ENOTCONN => "not connected".into(),
        libc::ENOTSOCK => "not a socket".into(),
        libc::EOPNOTSUPP => "operation not supported".into(),
        libc::EPERM => "operation not permitted".into(),
        libc::EPIPE => "broken pipe".into(),
        libc::EPROTONOSUPPORT => "protocol not supported".into(),
        libc::EPROTOTYPE => "protocol wrong type for socket".into(),
        libc::ESHUTDOWN => "cannot send after socket shutdown".into(),
        libc::ESOCKTNOSUPPORT => "socket type not supported".into(),
        libc::ETIMEDOUT => "connection timed out".into(),
        _ => format!("errno {}", errno),
    }
}

/// Maps errno to std::io::ErrorKind.
fn errno_to_kind(errno: i32) -> std::io::ErrorKind {
    match errno {
        libc::EACCES | libc::EPERM => std::io::ErrorKind::PermissionDenied,
        libc::EADDRINUSE => std::io::ErrorKind::AddrInUse,
        libc::EADDRNOTAVAIL => std::io::ErrorKind::AddrNotAvailable,
        libc::EAGAIN => std::io::ErrorKind::WouldBlock,
        libc::ECONNABORTED => std::io::ErrorKind::ConnectionAborted,
        libc::ECONNREFUSED => std::io::ErrorKind::ConnectionRefused,
        libc::ECONNRESET => std::io::ErrorKind::ConnectionReset,
        libc::EINTR => std::io::ErrorKind::Interrupted,
        libc::EINVAL => std::io::ErrorKind::InvalidInput,
        libc::ENOTCONN => std::io::ErrorKind::NotConnected,
        libc::EPIPE => std::io::ErrorKind::BrokenPipe,
        libc::ETIMEDOUT => std::io::ErrorKind::TimedOut,
        _ => std::io::ErrorKind::Other,
    }
}

impl From<SocketError> for std::io::Error {
    fn from(err: SocketError) -> Self {
        let kind = match &err {
            SocketError::Create { errno }
            | SocketError::Bind { errno, .. }
            | SocketError::Listen { errno, .. }
            | SocketError::Connect { errno, .. }
            | SocketError::Accept { errno }
            | SocketError::SetOption { errno, .. }
            | SocketError::GetOption { errno, .. } => errno_to_kind(*errno),
            SocketError::InvalidAddress { .. } => std::io::ErrorKind::InvalidInput,
            SocketError::Resolve { .. } => std::io::ErrorKind::NotFound,
        };
        std::io::Error::new(kind, err)
    }
}

impl From<IoError> for std::io::Error {
    fn from(err: IoError) -> Self {
        let kind = match &err {
            IoError::Read { errno } | IoError::Write { errno } | IoError::Poll { errno } => {
                errno_to_kind(*errno)
            }
            IoError::TimedOut { .. } => std::io::ErrorKind::TimedOut,
            IoError::ConnectionClosed => std::io::ErrorKind::ConnectionReset,
            IoError::NotOpen => std::io::ErrorKind::NotConnected,
            IoError::Broken => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}
