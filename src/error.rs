//! Error taxonomy and OS-error translation.
//!
//! `NetError` is the single error type returned by every public operation in
//! this crate. System-call failures are translated at the call site via
//! [`os_error_to_exception`]; everything else raises one of the named
//! variants directly.

use std::io;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, NetError>;

#[derive(thiserror::Error, Debug)]
pub enum NetError {
    // -- Address / format -----------------------------------------------
    #[error("invalid IP address: {0}")]
    InvalidIpAddress(String),
    #[error("invalid network address: {0}")]
    InvalidNetworkAddress(String),
    #[error("invalid netmask or prefix length: {0}")]
    InvalidNetmaskOrPrefixlen(String),

    // -- Resolver ---------------------------------------------------------
    #[error("host not found: {0}")]
    HostNotFound(String),
    #[error("try again")]
    TryAgain,
    #[error("DNS query failed: {0}")]
    QueryFailed(String),
    #[error("no result")]
    NoResult,
    #[error("unknown host: {0}")]
    UnknownHost(String),
    #[error("IDN conversion failed: {0}")]
    IdnConversion(String),

    // -- Socket ------------------------------------------------------------
    #[error("could not open socket: {0}")]
    CouldNotOpenSocket(String),
    #[error("could not bind to interface: {0}")]
    CouldNotBindToInterface(String),
    #[error("illegal port: {0}")]
    IllegalPort(u32),
    #[error("not connected")]
    NotConnected,
    #[error("socket already connected")]
    SocketAlreadyConnected,
    #[error("invalid socket")]
    InvalidSocket,
    #[error("connection refused")]
    ConnectionRefused,
    #[error("connection reset by peer")]
    ConnectionResetByPeer,
    #[error("network is down")]
    NetworkDown,
    #[error("network is unreachable")]
    NetworkUnreachable,
    #[error("no route to host")]
    NoRouteToHost,
    #[error("host is down")]
    HostDown,
    #[error("broken pipe")]
    BrokenPipe,
    #[error("operation timed out")]
    Timeout,
    #[error("operation would block")]
    OperationBlocked,
    #[error("operation aborted")]
    OperationAborted,
    #[error("operation interrupted")]
    OperationInterrupted,
    #[error("out-of-band data received")]
    OutOfBandDataReceived,
    #[error("software caused connection abort")]
    SoftwareCausedConnectionAbort,
    #[error("no buffer space available")]
    NoBufferSpace,
    #[error("can't send after socket shutdown")]
    CantSendAfterSocketShutdown,
    #[error("too many references")]
    TooManyReferences,
    #[error("unknown socket option")]
    UnknownOption,

    // -- TLS -----------------------------------------------------------
    #[error("TLS not started")]
    SslNotStarted,
    #[error("TLS connection failed: {0}")]
    SslConnectionFailed(String),
    #[error("TLS context not initialized")]
    SslContextUninitialized,
    #[error("TLS context in use")]
    SslContextInUse,
    #[error("TLS reference counter mismatch")]
    SslReferenceCounterMismatch,
    #[error("invalid SSL certificate: {0}")]
    InvalidSslCertificate(String),
    #[error("invalid SSL cipher list")]
    InvalidSslCipher,
    #[error("SSL private key error: {0}")]
    SslPrivateKey(String),
    #[error("failed to read DH parameters: {0}")]
    SslFailedToReadDhParams(String),
    #[error("SSL error: {0}")]
    Ssl(String),

    // -- Framing ---------------------------------------------------------
    #[error("no data available")]
    NoDataAvailable,
    #[error("data in other format")]
    DataInOtherFormat,
    #[error("invalid protocol version")]
    InvalidProtocolVersion,
    #[error("invalid packet: {0}")]
    InvalidPacket(String),
    #[error("payload too big")]
    PayloadTooBig,

    // -- Generic ----------------------------------------------------------
    #[error("out of memory")]
    OutOfMemory,
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
    #[error("buffer too small")]
    BufferTooSmall,
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    // -- OS-level errno translation (spec.md §4.H, filesystem-flavored
    // codes a shared errno mapper also carries) ---------------------------
    #[error("invalid file name")]
    InvalidFileName,
    #[error("permission denied")]
    PermissionDenied,
    #[error("file not found")]
    FileNotFound,
    #[error("too many symbolic links")]
    TooManySymbolicLinks,
    #[error("not a regular file")]
    NoRegularFile,
    #[error("read-only file system")]
    ReadOnly,
    #[error("too many open files")]
    TooManyOpenFiles,
    #[error("unsupported file operation")]
    UnsupportedFileOperation,
    #[error("file system full")]
    FilesystemFull,
    #[error("disk quota exceeded")]
    QuotaExceeded,
    #[error("I/O error")]
    IoError,
    #[error("bad file descriptor")]
    BadFileDescriptor,
    #[error("bad address")]
    BadAddress,
    #[error("overflow")]
    Overflow,
    #[error("file exists")]
    FileExists,
    #[error("resource deadlock avoided")]
    Deadlock,
    #[error("too many locks")]
    TooManyLocks,
    #[error("illegal operation on pipe")]
    IllegalOperationOnPipe,

    /// Catch-all for an OS error this table does not name; carries the
    /// platform error string plus the caller-supplied context.
    #[error("{context}: {message}")]
    Os { message: String, context: String },
}

/// Translates a raw POSIX `errno` (as surfaced by [`io::Error::raw_os_error`])
/// into a typed [`NetError`], per the table in spec.md §4.H.
pub fn os_error_to_exception(err: &io::Error, context: &str) -> NetError {
    let Some(code) = err.raw_os_error() else {
        return NetError::Os { message: err.to_string(), context: context.to_string() };
    };

    match code {
        libc::ENOMEM => NetError::OutOfMemory,
        libc::EINVAL => NetError::IllegalArgument(context.to_string()),
        libc::ENOTDIR | libc::ENAMETOOLONG => NetError::InvalidFileName,
        libc::EACCES | libc::EPERM => NetError::PermissionDenied,
        libc::ENOENT => NetError::FileNotFound,
        libc::ELOOP => NetError::TooManySymbolicLinks,
        libc::EISDIR => NetError::NoRegularFile,
        libc::EROFS => NetError::ReadOnly,
        libc::EMFILE => NetError::TooManyOpenFiles,
        libc::EOPNOTSUPP => NetError::UnsupportedFileOperation,
        libc::ENOSPC => NetError::FilesystemFull,
        libc::EDQUOT => NetError::QuotaExceeded,
        libc::EIO => NetError::IoError,
        libc::EBADF => NetError::BadFileDescriptor,
        libc::EFAULT => NetError::BadAddress,
        libc::EOVERFLOW => NetError::Overflow,
        libc::EEXIST => NetError::FileExists,
        libc::EAGAIN => NetError::OperationBlocked,
        libc::EDEADLK => NetError::Deadlock,
        libc::EINTR => NetError::OperationInterrupted,
        libc::ENOLCK => NetError::TooManyLocks,
        libc::ESPIPE => NetError::IllegalOperationOnPipe,
        libc::ETIMEDOUT => NetError::Timeout,
        libc::ENETDOWN => NetError::NetworkDown,
        libc::ENETUNREACH => NetError::NetworkUnreachable,
        libc::ENETRESET => NetError::Os { message: "network dropped connection on reset".into(), context: context.to_string() },
        libc::ECONNABORTED => NetError::SoftwareCausedConnectionAbort,
        libc::ECONNRESET => NetError::ConnectionResetByPeer,
        libc::ENOBUFS => NetError::NoBufferSpace,
        libc::EISCONN => NetError::SocketAlreadyConnected,
        libc::ENOTCONN => NetError::NotConnected,
        libc::ESHUTDOWN => NetError::CantSendAfterSocketShutdown,
        libc::ETOOMANYREFS => NetError::TooManyReferences,
        libc::ECONNREFUSED => NetError::ConnectionRefused,
        libc::EHOSTDOWN => NetError::HostDown,
        libc::EHOSTUNREACH => NetError::NoRouteToHost,
        libc::ENOTSOCK => NetError::InvalidSocket,
        libc::ENOPROTOOPT => NetError::UnknownOption,
        libc::EPIPE => NetError::BrokenPipe,
        _ => NetError::Os { message: err.to_string(), context: context.to_string() },
    }
}

// `libc` only defines the `EAI_*` constants for a handful of targets
// (android, the l4re/emscripten linux variants, the BSDs, ...) — the plain
// `*-unknown-linux-gnu` target this crate is built for is not among them,
// so these are glibc's own `<netdb.h>` values, hardcoded the same way
// `tcp::X509_V_ERR_DEPTH_ZERO_SELF_SIGNED_CERT` hardcodes an OpenSSL
// constant not re-exported by its wrapper crate.
pub(crate) const EAI_AGAIN: i32 = -3;
pub(crate) const EAI_NODATA: i32 = -5;
pub(crate) const EAI_NONAME: i32 = -2;
const EAI_SYSTEM: i32 = -11;

/// `getaddrinfo`/`getnameinfo` failure codes, translated separately from
/// `errno` per spec.md §4.H. `EAI_SYSTEM` defers to [`os_error_to_exception`]
/// using the last OS error.
pub fn gai_error_to_exception(gai_code: i32, host: &str) -> NetError {
    match gai_code {
        EAI_NONAME | EAI_NODATA => NetError::HostNotFound(host.to_string()),
        EAI_AGAIN => NetError::TryAgain,
        EAI_SYSTEM => os_error_to_exception(&io::Error::last_os_error(), "getaddrinfo"),
        _ => NetError::QueryFailed(format!("getaddrinfo({host}) failed with code {gai_code}")),
    }
}

impl From<io::Error> for NetError {
    fn from(err: io::Error) -> Self {
        os_error_to_exception(&err, "I/O operation")
    }
}
