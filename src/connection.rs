use crate::auth::{Auth, Sasl};
use crate::connection_options::ConnectionOptions;
use crate::endpoint::Endpoint;
use crate::errors::*;
use crate::io_loop::{Channel0Handle, ChannelHandle, IoLoop};
use crate::stream::IoStream;
use crate::wire::FieldTable;
use crossbeam_channel::Receiver;
use log::debug;
use snafu::ResultExt;
use std::net::ToSocketAddrs;
use std::thread::JoinHandle;
use std::time::Duration;

#[cfg(feature = "native-tls")]
use crate::stream::TlsConnector;

/// Notifications the server sends when it pauses (and later resumes) the
/// whole connection, e.g. because it is low on memory or disk.
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionBlockedNotification {
    Blocked { reason: String },
    Unblocked,
}

/// Internal buffer sizing knobs for a connection's I/O thread. The defaults
/// are fine for almost all uses.
#[derive(Clone)]
pub struct ConnectionTuning {
    /// Bound on the in-memory channels carrying data into the I/O thread.
    pub mem_channel_bound: usize,

    /// Once this many bytes are buffered for writing, stop accepting more
    /// work from data channels until we drain below
    /// [`buffered_writes_low_water`](#structfield.buffered_writes_low_water).
    pub buffered_writes_high_water: usize,
    pub buffered_writes_low_water: usize,
}

impl Default for ConnectionTuning {
    fn default() -> Self {
        ConnectionTuning {
            mem_channel_bound: 16,
            buffered_writes_high_water: 16 << 20,
            buffered_writes_low_water: 0,
        }
    }
}

impl ConnectionTuning {
    pub fn mem_channel_bound(self, mem_channel_bound: usize) -> Self {
        ConnectionTuning {
            mem_channel_bound,
            ..self
        }
    }

    pub fn buffered_writes_high_water(self, buffered_writes_high_water: usize) -> Self {
        ConnectionTuning {
            buffered_writes_high_water,
            ..self
        }
    }

    pub fn buffered_writes_low_water(self, buffered_writes_low_water: usize) -> Self {
        ConnectionTuning {
            buffered_writes_low_water,
            ..self
        }
    }
}

/// A single AMQP connection: one socket, one I/O thread, up to `channel_max`
/// channels. One of these exists per [`Session`](struct.Session.html)
/// generation; the supervisor replaces it wholesale on reconnect.
pub(crate) struct Connection {
    join_handle: Option<JoinHandle<Result<()>>>,
    channel0: Channel0Handle,
    server_properties: FieldTable,
    closed: bool,
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.close_impl();
    }
}

impl Connection {
    /// Opens a connection over an already-established stream.
    pub(crate) fn open<Auth: Sasl, S: IoStream>(
        stream: S,
        options: ConnectionOptions<Auth>,
        tuning: ConnectionTuning,
    ) -> Result<Connection> {
        let io_loop = IoLoop::new(tuning)?;
        let (join_handle, server_properties, channel0) = io_loop.start(stream, options)?;
        Ok(Connection {
            join_handle: Some(join_handle),
            channel0,
            server_properties,
            closed: false,
        })
    }

    /// Opens a connection over an already-established stream, negotiating
    /// TLS first.
    #[cfg(feature = "native-tls")]
    pub(crate) fn open_tls<Auth: Sasl, C: Into<TlsConnector>, S: IoStream>(
        connector: C,
        domain: &str,
        stream: S,
        options: ConnectionOptions<Auth>,
        tuning: ConnectionTuning,
    ) -> Result<Connection> {
        let stream = connector.into().connect(domain, stream)?;
        let io_loop = IoLoop::new(tuning)?;
        let (join_handle, server_properties, channel0) = io_loop.start_tls(stream, options)?;
        Ok(Connection {
            join_handle: Some(join_handle),
            channel0,
            server_properties,
            closed: false,
        })
    }

    /// Connects to a broker endpoint: TCP connect, optional TLS, then the
    /// AMQP handshake. Credentials embedded in the endpoint override the
    /// options' auth; the endpoint's vhost always wins.
    pub(crate) fn open_endpoint(
        endpoint: &Endpoint,
        options: ConnectionOptions<Auth>,
        tuning: ConnectionTuning,
    ) -> Result<Connection> {
        let mut options = options.virtual_host(endpoint.vhost.clone());
        if let (Some(username), Some(password)) = (&endpoint.username, &endpoint.password) {
            options = options.auth(Auth::Plain {
                username: username.clone(),
                password: password.clone(),
            });
        }

        let stream = connect_stream(endpoint, options.connection_timeout)?;

        if endpoint.tls {
            #[cfg(feature = "native-tls")]
            {
                let connector =
                    native_tls::TlsConnector::new().map_err(|err| Error::TlsHandshake {
                        message: err.to_string(),
                    })?;
                return Connection::open_tls(connector, &endpoint.host, stream, options, tuning);
            }
            #[cfg(not(feature = "native-tls"))]
            {
                return TlsFeatureNotEnabledSnafu.fail();
            }
        }

        Connection::open(stream, options, tuning)
    }

    /// Properties reported by the server during the handshake (product,
    /// version, supported capabilities, ...).
    pub(crate) fn server_properties(&self) -> &FieldTable {
        &self.server_properties
    }

    /// Asks the I/O thread to deliver connection-blocked notifications to
    /// the returned receiver. Only one listener is active at a time; a later
    /// registration replaces the earlier one.
    pub(crate) fn register_blocked_listener(
        &mut self,
    ) -> Result<Receiver<ConnectionBlockedNotification>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.channel0.set_blocked_tx(tx)?;
        Ok(rx)
    }

    /// Opens a new channel, either with an explicit id or the next free one.
    pub(crate) fn open_channel(&mut self, channel_id: Option<u16>) -> Result<ChannelHandle> {
        self.channel0.open_channel(channel_id)
    }

    /// Takes ownership of the I/O thread's join handle, e.g. to watch for
    /// the thread's exit from a supervisor. After this, `close` still sends
    /// connection.close but no longer joins the thread.
    pub(crate) fn take_join_handle(&mut self) -> Option<JoinHandle<Result<()>>> {
        self.join_handle.take()
    }

    /// Sends connection.close and waits for the server to confirm.
    pub(crate) fn close(mut self) -> Result<()> {
        self.close_impl()
    }

    fn close_impl(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!("closing connection");
        let close_result = self.channel0.close_connection();
        match self.join_handle.take() {
            Some(join_handle) => {
                let join_result = join_handle.join().map_err(|_| Error::IoThreadPanic)?;
                close_result.and(join_result)
            }
            // The supervisor took the join handle (or close was already
            // called); it is responsible for observing the thread's exit.
            None => close_result,
        }
    }
}

fn connect_stream(
    endpoint: &Endpoint,
    timeout: Option<Duration>,
) -> Result<mio::net::TcpStream> {
    let addrs = (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()
        .context(TcpConnectSnafu {
            endpoint: endpoint.display_name(),
        })?;

    let mut last_err = None;
    for addr in addrs {
        let result = match timeout {
            Some(timeout) => std::net::TcpStream::connect_timeout(&addr, timeout),
            None => std::net::TcpStream::connect(addr),
        };
        match result {
            Ok(stream) => {
                stream.set_nodelay(true).context(TcpConnectSnafu {
                    endpoint: endpoint.display_name(),
                })?;
                stream.set_nonblocking(true).context(TcpConnectSnafu {
                    endpoint: endpoint.display_name(),
                })?;
                return mio::net::TcpStream::from_stream(stream).context(TcpConnectSnafu {
                    endpoint: endpoint.display_name(),
                });
            }
            Err(err) => last_err = Some(err),
        }
    }

    let err = last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no addresses resolved")
    });
    Err(err).context(TcpConnectSnafu {
        endpoint: endpoint.display_name(),
    })
}
