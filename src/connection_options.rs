use crate::errors::*;
use crate::wire::method::{ConnectionOpen, Start, StartOk, Tune, TuneOk};
use crate::wire::{FieldTable, FieldValue, FRAME_MIN_SIZE};
use crate::auth::Sasl;
use std::time::Duration;

/// Options that control the overall AMQP connection, built from
/// [`SessionOptions`](struct.SessionOptions.html) for each connection
/// attempt.
///
/// `ConnectionOptions` uses the builder pattern. The defaults: guest/guest
/// PLAIN auth, virtual host `/`, locale `en_US`, server-chosen channel and
/// frame maxima, a 60 second heartbeat, and no connection timeout.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ConnectionOptions<Auth: Sasl> {
    pub(crate) auth: Auth,
    pub(crate) virtual_host: String,
    pub(crate) locale: String,
    pub(crate) channel_max: u16,
    pub(crate) frame_max: u32,
    pub(crate) heartbeat: u16,
    pub(crate) connection_timeout: Option<Duration>,
    information: Option<String>,
}

impl<Auth: Sasl> Default for ConnectionOptions<Auth> {
    // NOTE: If we change this, make sure to change the doc comment above.
    fn default() -> Self {
        ConnectionOptions {
            auth: Auth::default(),
            virtual_host: "/".to_string(),
            locale: "en_US".to_string(),
            channel_max: 0,
            frame_max: 0,
            heartbeat: 60,
            connection_timeout: None,
            information: None,
        }
    }
}

impl<Auth: Sasl> ConnectionOptions<Auth> {
    /// Sets the SASL authentication method.
    pub fn auth(self, auth: Auth) -> Self {
        ConnectionOptions { auth, ..self }
    }

    /// Sets the AMQP virtual host.
    pub fn virtual_host<T: Into<String>>(self, virtual_host: T) -> Self {
        ConnectionOptions {
            virtual_host: virtual_host.into(),
            ..self
        }
    }

    /// Sets the locale. AMQP requires servers to support the `en_US` locale
    /// (which is also the default locale for `ConnectionOptions`).
    pub fn locale<T: Into<String>>(self, locale: T) -> Self {
        ConnectionOptions {
            locale: locale.into(),
            ..self
        }
    }

    /// Sets the maximum number of channels that can be opened simultaneously
    /// on this connection. 0 means to let the server choose; if both sides
    /// propose a nonzero value, the lower wins.
    pub fn channel_max(self, channel_max: u16) -> Self {
        ConnectionOptions {
            channel_max,
            ..self
        }
    }

    /// Sets the maximum size in bytes of frames used for this connection.
    /// 0 means to let the server choose; if both sides propose a nonzero
    /// value, the lower wins.
    ///
    /// The frame max setting says nothing about the maximum size of
    /// messages; message bodies larger than the negotiated value are broken
    /// up into multiple frames.
    ///
    /// AMQP specifies a minimum frame_max of 4096; setting a lower nonzero
    /// value results in an error when opening the connection.
    pub fn frame_max(self, frame_max: u32) -> Self {
        ConnectionOptions { frame_max, ..self }
    }

    /// Sets the heartbeat interval in seconds. 0 disables heartbeats. If
    /// both sides propose a nonzero value, the lower wins.
    pub fn heartbeat(self, heartbeat: u16) -> Self {
        ConnectionOptions { heartbeat, ..self }
    }

    /// Sets the timeout for the initial TCP connection and handshake. If
    /// `None` (the default), there is no timeout.
    pub fn connection_timeout(self, connection_timeout: Option<Duration>) -> Self {
        ConnectionOptions {
            connection_timeout,
            ..self
        }
    }

    /// Sets the "information" string reported to the server during the
    /// handshake. This string is displayed in the RabbitMQ management
    /// interface under "Client properties" of a connection.
    pub fn information(self, information: Option<String>) -> Self {
        ConnectionOptions {
            information,
            ..self
        }
    }

    pub(crate) fn make_start_ok(&self, start: Start) -> Result<(StartOk, FieldTable)> {
        // helper to search space-separated strings (mechanisms and locales)
        fn server_supports(server: &str, client: &str) -> bool {
            server.split(' ').any(|s| s == client)
        }

        // intersect the server's mechanism list with ours; an empty
        // intersection is fatal and never retried.
        let mechanism = self.auth.mechanism();
        if !server_supports(&start.mechanisms, &mechanism) {
            return AuthMechanismUnavailableSnafu {
                available: start.mechanisms.clone(),
                requested: mechanism,
            }
            .fail();
        }
        if !server_supports(&start.locales, &self.locale) {
            return UnsupportedLocaleSnafu {
                available: start.locales.clone(),
                requested: self.locale.clone(),
            }
            .fail();
        }

        // bundle up info about this crate as client properties
        let mut client_properties = FieldTable::new();
        let mut set_prop = |k: &str, v: String| {
            client_properties.insert(k, FieldValue::LongString(v.into()));
        };
        set_prop("product", env!("CARGO_PKG_NAME").to_string());
        set_prop("version", env!("CARGO_PKG_VERSION").to_string());
        set_prop("platform", std::env::consts::OS.to_string());
        if let Some(information) = &self.information {
            set_prop("information", information.to_string());
        }
        let mut capabilities = FieldTable::new();
        capabilities.insert("consumer_cancel_notify", FieldValue::Boolean(true));
        capabilities.insert("connection.blocked", FieldValue::Boolean(true));
        client_properties.insert("capabilities", FieldValue::Table(capabilities));

        Ok((
            StartOk {
                client_properties,
                mechanism,
                response: self.auth.response(),
                locale: self.locale.clone(),
            },
            start.server_properties,
        ))
    }

    pub(crate) fn make_tune_ok(&self, tune: Tune) -> Result<TuneOk> {
        // For channel_max and frame_max, 0 means "no limit"; promote it so
        // min() lets the nonzero side win, and both-zero stays unlimited.
        fn promote_0_u16(mut val: u16) -> u16 {
            if val == 0 {
                val = u16::max_value();
            }
            val
        }
        fn promote_0_u32(mut val: u32) -> u32 {
            if val == 0 {
                val = u32::max_value();
            }
            val
        }

        let chan_max0 = promote_0_u16(tune.channel_max);
        let chan_max1 = promote_0_u16(self.channel_max);

        let frame_max0 = promote_0_u32(tune.frame_max);
        let frame_max1 = promote_0_u32(self.frame_max);

        let channel_max = u16::min(chan_max0, chan_max1);
        let frame_max = u32::min(frame_max0, frame_max1);

        // Heartbeats are different: 0 means "disabled", and plain min()
        // already lets either side disable them.
        let heartbeat = u16::min(tune.heartbeat, self.heartbeat);

        if frame_max < FRAME_MIN_SIZE {
            return FrameMaxTooSmallSnafu {
                min: FRAME_MIN_SIZE,
                requested: frame_max,
            }
            .fail();
        }

        Ok(TuneOk {
            channel_max,
            frame_max,
            heartbeat,
        })
    }

    pub(crate) fn make_open(&self) -> ConnectionOpen {
        ConnectionOpen {
            virtual_host: self.virtual_host.clone(),
            capabilities: "".to_string(), // reserved
            insist: false,                // reserved
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Auth;

    #[test]
    fn channel_max_tie_breaks() {
        fn tune_with_channel_max(channel_max: u16) -> Tune {
            Tune {
                channel_max,
                frame_max: 1 << 17,
                heartbeat: 60,
            }
        }

        let options = ConnectionOptions::<Auth>::default().channel_max(0);
        let tune = tune_with_channel_max(0);
        let tune_ok = options.make_tune_ok(tune).unwrap();
        assert_eq!(tune_ok.channel_max, 65535);

        let options = ConnectionOptions::<Auth>::default().channel_max(10);
        let tune = tune_with_channel_max(0);
        let tune_ok = options.make_tune_ok(tune).unwrap();
        assert_eq!(tune_ok.channel_max, 10);

        let options = ConnectionOptions::<Auth>::default().channel_max(0);
        let tune = tune_with_channel_max(10);
        let tune_ok = options.make_tune_ok(tune).unwrap();
        assert_eq!(tune_ok.channel_max, 10);

        let options = ConnectionOptions::<Auth>::default().channel_max(20);
        let tune = tune_with_channel_max(10);
        let tune_ok = options.make_tune_ok(tune).unwrap();
        assert_eq!(tune_ok.channel_max, 10);

        let options = ConnectionOptions::<Auth>::default().channel_max(10);
        let tune = tune_with_channel_max(20);
        let tune_ok = options.make_tune_ok(tune).unwrap();
        assert_eq!(tune_ok.channel_max, 10);
    }

    #[test]
    fn heartbeat_zero_disables() {
        let options = ConnectionOptions::<Auth>::default().heartbeat(0);
        let tune = Tune {
            channel_max: 0,
            frame_max: 1 << 17,
            heartbeat: 60,
        };
        let tune_ok = options.make_tune_ok(tune).unwrap();
        assert_eq!(tune_ok.heartbeat, 0);
    }

    #[test]
    fn unsupported_auth_mechanism() {
        let options = ConnectionOptions::<Auth>::default();

        let server_mechanisms = "NOTPLAIN SOMETHINGELSE";
        let start = Start {
            version_major: 0,
            version_minor: 9,
            server_properties: FieldTable::new(),
            mechanisms: server_mechanisms.to_string(),
            locales: options.locale.clone(),
        };

        let res = options.make_start_ok(start);
        match res.unwrap_err() {
            Error::AuthMechanismUnavailable { available, .. } => {
                assert_eq!(available, server_mechanisms);
            }
            err => panic!("unexpected error {}", err),
        }
    }

    #[test]
    fn external_mechanism_accepted_when_advertised() {
        let options = ConnectionOptions::<Auth>::default().auth(Auth::External);

        let start = Start {
            version_major: 0,
            version_minor: 9,
            server_properties: FieldTable::new(),
            mechanisms: "PLAIN EXTERNAL".to_string(),
            locales: options.locale.clone(),
        };

        let (start_ok, _) = options.make_start_ok(start).unwrap();
        assert_eq!(start_ok.mechanism, "EXTERNAL");
        assert_eq!(start_ok.response, "");
    }

    #[test]
    fn unsupported_locale() {
        let server_locales = "en_US es_ES";

        let options = ConnectionOptions::<Auth>::default().locale("nonexistent");

        let start = Start {
            version_major: 0,
            version_minor: 9,
            server_properties: FieldTable::new(),
            mechanisms: options.auth.mechanism(),
            locales: server_locales.to_string(),
        };

        let res = options.make_start_ok(start);
        match res.unwrap_err() {
            Error::UnsupportedLocale { .. } => (),
            err => panic!("unexpected error {}", err),
        }
    }

    #[test]
    fn frame_max_too_small() {
        let options = ConnectionOptions::<Auth>::default().frame_max(FRAME_MIN_SIZE - 1);

        let tune = Tune {
            channel_max: u16::max_value(),
            frame_max: 1 << 17,
            heartbeat: 60,
        };

        let res = options.make_tune_ok(tune);
        match res.unwrap_err() {
            Error::FrameMaxTooSmall { .. } => (),
            err => panic!("unexpected error {}", err),
        }
    }
}
