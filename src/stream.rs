use mio::net::TcpStream;
use mio::Evented;
use std::io::{Read, Write};

#[cfg(feature = "native-tls")]
use crate::errors::Result;

/// The byte stream a connection runs over: anything readable, writable, and
/// pollable. Implemented for `mio::net::TcpStream` and for the TLS wrapper
/// when the `native-tls` feature is enabled.
pub(crate) trait IoStream: Read + Write + Evented + Send + 'static {}

impl IoStream for TcpStream {}

/// A stream whose TLS handshake is still in flight; the I/O loop drives it
/// to completion before the AMQP protocol header is sent.
#[cfg(feature = "native-tls")]
pub(crate) trait HandshakeStream: Evented + Send + 'static {
    type Stream: IoStream;

    fn progress_handshake(&mut self) -> Result<Option<Self::Stream>>;
}

#[cfg(feature = "native-tls")]
mod native_tls;

#[cfg(feature = "native-tls")]
pub(crate) use self::native_tls::TlsConnector;
