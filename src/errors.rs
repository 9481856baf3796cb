use snafu::Snafu;
use std::io;
use std::sync::Arc;

/// A type alias for handling errors throughout duramq.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Specific error cases returned by duramq.
///
/// `Error` is `Clone` so a single failure can be fanned out to every party
/// that needs to observe it (consumers, confirm callbacks, blocked callers);
/// I/O causes are held behind `Arc` for that reason.
#[derive(Clone, Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// Could not parse a string as an AMQP URI.
    #[snafu(display("could not parse url: {}", source))]
    UrlParse { source: url::ParseError },

    /// A URL parsed, but is not a valid `amqp://` or `amqps://` endpoint.
    #[snafu(display("invalid amqp url: {}", url))]
    InvalidUrl { url: String },

    /// A TLS endpoint was supplied, but duramq was built without TLS support.
    #[snafu(display("duramq built without TLS support"))]
    TlsFeatureNotEnabled,

    /// The TLS handshake failed.
    #[snafu(display("TLS handshake failed: {}", message))]
    TlsHandshake { message: String },

    /// Failed to open the initial TCP connection.
    #[snafu(display("could not connect to {}: {}", endpoint, source))]
    TcpConnect {
        endpoint: String,
        #[snafu(source(from(io::Error, Arc::new)))]
        source: Arc<io::Error>,
    },

    /// Timeout occurred while performing the initial TCP connection.
    #[snafu(display("timeout occurred while waiting for TCP connection"))]
    ConnectionTimeout,

    /// The underlying socket was closed.
    #[snafu(display("underlying socket closed unexpectedly"))]
    UnexpectedSocketClose,

    /// An I/O error occurred while reading the socket.
    #[snafu(display("I/O error reading socket: {}", source))]
    IoErrorReadingSocket {
        #[snafu(source(from(io::Error, Arc::new)))]
        source: Arc<io::Error>,
    },

    /// An I/O error occurred while writing the socket.
    #[snafu(display("I/O error writing socket: {}", source))]
    IoErrorWritingSocket {
        #[snafu(source(from(io::Error, Arc::new)))]
        source: Arc<io::Error>,
    },

    // --------------------------------------------------------------------
    // Wire codec
    // --------------------------------------------------------------------
    /// Ran out of bytes in the middle of decoding a frame or field.
    #[snafu(display("buffer truncated while decoding"))]
    TruncatedBuffer,

    /// A field-table value carried a type tag we do not know.
    #[snafu(display("unknown field value type tag 0x{:02x}", tag))]
    UnknownTypeTag { tag: u8 },

    /// A length-prefixed region did not match the bytes actually consumed.
    #[snafu(display(
        "length mismatch while decoding (declared {} bytes, consumed {})",
        declared,
        consumed
    ))]
    LengthMismatch { declared: usize, consumed: usize },

    /// A method frame ended before all fields of the method were read.
    #[snafu(display(
        "method body truncated (class_id={}, method_id={})",
        class_id,
        method_id
    ))]
    MethodBodyTruncated { class_id: u16, method_id: u16 },

    /// We received a method id we do not recognize.
    #[snafu(display("unknown method (class_id={}, method_id={})", class_id, method_id))]
    UnknownMethod { class_id: u16, method_id: u16 },

    /// We received a frame type other than method/header/body/heartbeat.
    #[snafu(display("unknown frame type {}", frame_type))]
    UnknownFrameType { frame_type: u8 },

    /// A frame did not end with the 0xCE end marker.
    #[snafu(display("frame missing 0xce end marker"))]
    FrameEndMissing,

    /// We received data that could not be parsed as an AMQP frame.
    #[snafu(display("received malformed data - expected AMQP frame"))]
    ReceivedMalformed,

    /// We received a valid AMQP frame but not one we expected; e.g., a
    /// content header with no preceding content-bearing method, or an
    /// incorrect response to a synchronous method call.
    #[snafu(display("AMQP protocol error - received unexpected frame"))]
    FrameUnexpected,

    // --------------------------------------------------------------------
    // Handshake
    // --------------------------------------------------------------------
    /// None of our authentication mechanisms is supported by the server.
    #[snafu(display(
        "no usable auth mechanism (server advertised \"{}\", client supports \"{}\")",
        available,
        requested
    ))]
    AuthMechanismUnavailable { available: String, requested: String },

    /// The server does not support the requested locale.
    #[snafu(display(
        "requested locale unavailable (server advertised \"{}\", requested \"{}\")",
        available,
        requested
    ))]
    UnsupportedLocale { available: String, requested: String },

    /// The negotiated frame size is smaller than the minimum required by AMQP.
    #[snafu(display("frame max too small (min = {}, requested = {})", min, requested))]
    FrameMaxTooSmall { min: u32, requested: u32 },

    /// The server requested a Secure/Secure-Ok exchange, which our supported
    /// mechanisms (PLAIN and EXTERNAL) never need.
    #[snafu(display("SASL secure/secure-ok exchanges are not supported"))]
    SaslSecureNotSupported,

    /// The supplied authentication credentials were not accepted by the server.
    #[snafu(display("invalid credentials"))]
    InvalidCredentials,

    // --------------------------------------------------------------------
    // Connection & channels
    // --------------------------------------------------------------------
    /// The server missed too many successive heartbeats.
    #[snafu(display("missed heartbeats from server"))]
    MissedServerHeartbeats,

    /// The server closed the connection with the given reply code and text.
    #[snafu(display("server closed connection (code={} message={})", code, message))]
    ServerClosedConnection { code: u16, message: String },

    /// The client closed the connection.
    #[snafu(display("client closed connection"))]
    ClientClosedConnection,

    /// The server closed the given channel with the given reply code and text.
    #[snafu(display(
        "server closed channel {} (code={}, message={})",
        channel_id,
        code,
        message
    ))]
    ServerClosedChannel {
        channel_id: u16,
        code: u16,
        message: String,
    },

    /// The server sent frames for a channel ID we don't know about.
    #[snafu(display("received frame for nonexistent channel {}", channel_id))]
    ReceivedFrameWithBogusChannelId { channel_id: u16 },

    /// No more channels can be opened because channel_max channels are open.
    #[snafu(display("no more channel ids are available"))]
    ExhaustedChannelIds,

    /// An explicit channel ID was requested, but that channel is unavailable.
    #[snafu(display("requested channel id {} is unavailable", channel_id))]
    UnavailableChannelId { channel_id: u16 },

    /// The server sent us a consumer tag equal to another consumer tag we
    /// already have on the same channel.
    #[snafu(display(
        "server sent duplicate consumer tag for channel {}: {}",
        channel_id,
        consumer_tag
    ))]
    DuplicateConsumerTag { channel_id: u16, consumer_tag: String },

    /// The server sent us a delivery for a consumer we don't know about.
    #[snafu(display(
        "received delivery with unknown consumer tag for channel {}: {}",
        channel_id,
        consumer_tag
    ))]
    UnknownConsumerTag { channel_id: u16, consumer_tag: String },

    /// The client sent an AMQP exception to the server and closed the
    /// connection.
    #[snafu(display("internal client exception - received unhandled frames from server"))]
    ClientException,

    // --------------------------------------------------------------------
    // I/O thread plumbing
    // --------------------------------------------------------------------
    /// Failed to create the I/O thread's polling handle.
    #[snafu(display("failed to create I/O polling handle: {}", source))]
    CreatePollHandle {
        #[snafu(source(from(io::Error, Arc::new)))]
        source: Arc<io::Error>,
    },

    /// Failed to register an event source with the I/O polling handle.
    #[snafu(display("failed to register with I/O polling handle: {}", source))]
    RegisterWithPollHandle {
        #[snafu(source(from(io::Error, Arc::new)))]
        source: Arc<io::Error>,
    },

    /// Failed to deregister an event source from the I/O polling handle.
    #[snafu(display("failed to deregister with I/O polling handle: {}", source))]
    DeregisterWithPollHandle {
        #[snafu(source(from(io::Error, Arc::new)))]
        source: Arc<io::Error>,
    },

    /// Polling for I/O events failed.
    #[snafu(display("failed to poll for I/O readiness: {}", source))]
    FailedToPoll {
        #[snafu(source(from(io::Error, Arc::new)))]
        source: Arc<io::Error>,
    },

    /// Forking the I/O thread failed.
    #[snafu(display("fork failed: {}", source))]
    ForkFailed {
        #[snafu(source(from(io::Error, Arc::new)))]
        source: Arc<io::Error>,
    },

    /// The I/O thread panicked.
    #[snafu(display("I/O thread panicked"))]
    IoThreadPanic,

    /// The I/O thread tried to send a message to a caller that did not exist.
    #[snafu(display("i/o thread tried to communicate with a nonexistent client"))]
    EventLoopClientDropped,

    /// The I/O thread has dropped the sending side of a channel, typically
    /// because it has exited due to another error.
    #[snafu(display("i/o thread dropped sending side of a channel"))]
    EventLoopDropped,

    // --------------------------------------------------------------------
    // Session supervisor
    // --------------------------------------------------------------------
    /// Re-declaring a topology entity with different properties.
    #[snafu(display("conflicting redeclaration of {} \"{}\"", kind, name))]
    TopologyConflict { kind: &'static str, name: String },

    /// Replaying declared topology after a reconnect failed; the session is
    /// unrecoverable and must be rebuilt by the application.
    #[snafu(display("topology replay failed after reconnect: {}", source))]
    TopologyReplayFailed {
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    /// The session hit its limit of consecutive protocol violations.
    #[snafu(display("giving up after {} consecutive protocol violations", violations))]
    TooManyProtocolViolations { violations: u32 },

    /// An operation was attempted on a session that has already closed.
    #[snafu(display("session is closed"))]
    SessionClosed,

    /// A session was opened with an empty endpoint list.
    #[snafu(display("endpoint list is empty"))]
    NoEndpoints,

    /// A bounded wait elapsed before the awaited condition was reached.
    #[snafu(display("timed out waiting for broker"))]
    WaitTimedOut,
}

impl Error {
    /// True for failures that must not trigger a reconnect attempt.
    pub(crate) fn is_fatal(&self) -> bool {
        match self {
            Error::AuthMechanismUnavailable { .. }
            | Error::UnsupportedLocale { .. }
            | Error::SaslSecureNotSupported
            | Error::InvalidCredentials
            | Error::FrameMaxTooSmall { .. }
            | Error::TlsFeatureNotEnabled
            | Error::InvalidUrl { .. }
            | Error::UrlParse { .. }
            | Error::TopologyConflict { .. }
            | Error::TopologyReplayFailed { .. }
            | Error::TooManyProtocolViolations { .. }
            | Error::ClientClosedConnection
            | Error::SessionClosed => true,
            // 403 access-refused and 530 not-allowed at connection level are
            // authorization problems; retrying cannot help.
            Error::ServerClosedConnection { code, .. } => *code == 403 || *code == 530,
            _ => false,
        }
    }

    /// True for failures that count against the consecutive
    /// protocol-violation limit: decode errors, framing errors, and
    /// ordering violations.
    pub(crate) fn is_protocol_violation(&self) -> bool {
        match self {
            Error::TruncatedBuffer
            | Error::UnknownTypeTag { .. }
            | Error::LengthMismatch { .. }
            | Error::MethodBodyTruncated { .. }
            | Error::UnknownMethod { .. }
            | Error::UnknownFrameType { .. }
            | Error::FrameEndMissing
            | Error::ReceivedMalformed
            | Error::FrameUnexpected
            | Error::ReceivedFrameWithBogusChannelId { .. } => true,
            _ => false,
        }
    }
}
