use super::Inner;
use crate::auth::Sasl;
use crate::connection_options::ConnectionOptions;
use crate::errors::*;
use crate::wire::method::{ConnectionClose, ConnectionMethod, TuneOk};
use crate::wire::{FieldTable, Frame, Method};
use log::{debug, error};

#[derive(Debug)]
pub(super) enum HandshakeState<Auth: Sasl> {
    Start(ConnectionOptions<Auth>),
    Secure(ConnectionOptions<Auth>, FieldTable),
    Tune(ConnectionOptions<Auth>, FieldTable),
    Open(TuneOk, FieldTable),
    ServerClosing(ConnectionClose),
    Done(TuneOk, FieldTable),
}

impl<Auth: Sasl> HandshakeState<Auth> {
    pub(super) fn process(&mut self, inner: &mut Inner, frame: Frame) -> Result<()> {
        Ok(match self {
            HandshakeState::Start(options) => {
                let start = match frame {
                    Frame::Method(0, Method::Connection(ConnectionMethod::Start(start))) => start,
                    _ => return FrameUnexpectedSnafu.fail(),
                };
                debug!("received handshake {:?}", start);

                let (start_ok, server_properties) = options.make_start_ok(start)?;
                debug!("sending handshake {:?}", start_ok);
                inner.push_method(0, ConnectionMethod::StartOk(start_ok));

                *self = HandshakeState::Secure(options.clone(), server_properties);
            }
            HandshakeState::Secure(options, server_properties) => {
                // We only support PLAIN and EXTERNAL, neither of which needs
                // a secure/secure-ok exchange.
                if let Frame::Method(0, Method::Connection(ConnectionMethod::Secure(secure))) =
                    &frame
                {
                    error!("received unsupported handshake {:?}", secure);
                    return SaslSecureNotSupportedSnafu.fail();
                }
                *self = HandshakeState::Tune(options.clone(), std::mem::take(server_properties));
                return self.process(inner, frame);
            }
            HandshakeState::Tune(options, server_properties) => {
                let tune = match frame {
                    Frame::Method(0, Method::Connection(ConnectionMethod::Tune(tune))) => tune,
                    _ => return FrameUnexpectedSnafu.fail(),
                };
                debug!("received handshake {:?}", tune);

                let tune_ok = options.make_tune_ok(tune)?;
                inner.start_heartbeats(tune_ok.heartbeat);

                debug!("sending handshake {:?}", tune_ok);
                inner.push_method(0, ConnectionMethod::TuneOk(tune_ok.clone()));

                let open = options.make_open();
                debug!("sending handshake {:?}", open);
                inner.push_method(0, ConnectionMethod::Open(open));

                *self = HandshakeState::Open(tune_ok, std::mem::take(server_properties));
            }
            HandshakeState::Open(tune_ok, server_properties) => {
                // If we sent bad tune params or a bad vhost, the server may
                // send us a Close instead of Open-Ok.
                match frame {
                    Frame::Method(0, Method::Connection(ConnectionMethod::Close(close))) => {
                        inner.push_method(0, ConnectionMethod::CloseOk);
                        inner.seal_writes();
                        *self = HandshakeState::ServerClosing(close);
                    }
                    Frame::Method(0, Method::Connection(ConnectionMethod::OpenOk(open_ok))) => {
                        debug!("received handshake {:?}", open_ok);
                        *self = HandshakeState::Done(
                            tune_ok.clone(),
                            std::mem::take(server_properties),
                        );
                    }
                    _ => return FrameUnexpectedSnafu.fail(),
                }
            }
            HandshakeState::ServerClosing(_) | HandshakeState::Done(_, _) => {
                return FrameUnexpectedSnafu.fail()
            }
        })
    }
}
