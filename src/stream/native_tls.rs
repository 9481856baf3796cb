//! TLS via `native-tls`. The connector may finish its handshake immediately
//! or leave it mid-flight on the nonblocking socket; the I/O loop then calls
//! `progress_handshake` on readiness events until the stream is usable,
//! before the AMQP protocol header goes out.

use super::{HandshakeStream, IoStream};
use crate::errors::*;
use mio::{Evented, Poll, PollOpt, Ready, Token};
use native_tls::HandshakeError;
use std::io::{self, Read, Write};

fn tls_error(err: native_tls::Error) -> Error {
    // native_tls errors are not Clone, and our Error must be; keep the text.
    Error::TlsHandshake {
        message: err.to_string(),
    }
}

/// Wrapper around a `native_tls::TlsConnector` usable by duramq's I/O loop.
pub(crate) struct TlsConnector(native_tls::TlsConnector);

impl TlsConnector {
    pub(crate) fn connect<S>(&self, domain: &str, stream: S) -> Result<TlsHandshakeStream<S>>
    where
        S: Read + Write,
    {
        let progress = match self.0.connect(domain, stream) {
            Ok(done) => Progress::Done(done),
            Err(HandshakeError::WouldBlock(mid)) => Progress::MidHandshake(mid),
            Err(HandshakeError::Failure(err)) => return Err(tls_error(err)),
        };
        Ok(TlsHandshakeStream(progress))
    }
}

impl From<native_tls::TlsConnector> for TlsConnector {
    fn from(inner: native_tls::TlsConnector) -> TlsConnector {
        TlsConnector(inner)
    }
}

enum Progress<S> {
    MidHandshake(native_tls::MidHandshakeTlsStream<S>),
    Done(native_tls::TlsStream<S>),
    // Transient while progress_handshake owns the previous state; never
    // observable from outside because that method holds &mut self.
    Driving,
}

impl<S: Read + Write> Progress<S> {
    fn socket(&self) -> &S {
        match self {
            Progress::MidHandshake(mid) => mid.get_ref(),
            Progress::Done(done) => done.get_ref(),
            Progress::Driving => unreachable!("handshake state observed mid-drive"),
        }
    }
}

/// A TLS stream whose handshake may still be in flight.
pub(crate) struct TlsHandshakeStream<S>(Progress<S>);

impl<S: Evented + Read + Write + Send + 'static> HandshakeStream for TlsHandshakeStream<S> {
    type Stream = TlsStream<S>;

    fn progress_handshake(&mut self) -> Result<Option<TlsStream<S>>> {
        let mid = match std::mem::replace(&mut self.0, Progress::Driving) {
            Progress::Done(done) => return Ok(Some(TlsStream(done))),
            Progress::MidHandshake(mid) => mid,
            Progress::Driving => unreachable!("handshake re-entered mid-drive"),
        };
        match mid.handshake() {
            Ok(done) => Ok(Some(TlsStream(done))),
            Err(HandshakeError::WouldBlock(mid)) => {
                self.0 = Progress::MidHandshake(mid);
                Ok(None)
            }
            Err(HandshakeError::Failure(err)) => Err(tls_error(err)),
        }
    }
}

/// An established TLS stream.
pub(crate) struct TlsStream<S>(native_tls::TlsStream<S>);

impl<S: Evented + Read + Write + Send + 'static> IoStream for TlsStream<S> {}

impl<S: Read + Write> Read for TlsStream<S> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<S: Read + Write> Write for TlsStream<S> {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

// mio readiness is always driven by the raw socket underneath the TLS
// session, whichever handshake state we're in.
macro_rules! delegate_evented {
    ($type:ty, |$this:ident| $socket:expr) => {
        impl<S: Evented + Read + Write> Evented for $type {
            #[inline]
            fn register(
                &self,
                poll: &Poll,
                token: Token,
                interest: Ready,
                opts: PollOpt,
            ) -> io::Result<()> {
                let $this = self;
                $socket.register(poll, token, interest, opts)
            }

            #[inline]
            fn reregister(
                &self,
                poll: &Poll,
                token: Token,
                interest: Ready,
                opts: PollOpt,
            ) -> io::Result<()> {
                let $this = self;
                $socket.reregister(poll, token, interest, opts)
            }

            #[inline]
            fn deregister(&self, poll: &Poll) -> io::Result<()> {
                let $this = self;
                $socket.deregister(poll)
            }
        }
    };
}

delegate_evented!(TlsHandshakeStream<S>, |this| this.0.socket());
delegate_evented!(TlsStream<S>, |this| this.0.get_ref());
