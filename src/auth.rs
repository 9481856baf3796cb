/// A SASL authentication mechanism usable during the connection handshake.
pub(crate) trait Sasl: Default + Clone + Send + 'static {
    fn mechanism(&self) -> String;
    fn response(&self) -> String;
}

/// Built-in authentication mechanisms: `PLAIN` (username/password) and
/// `EXTERNAL` (identity taken from the transport, typically a TLS client
/// certificate).
#[derive(Debug, Clone, PartialEq)]
pub enum Auth {
    Plain { username: String, password: String },
    External,
}

impl Default for Auth {
    fn default() -> Auth {
        Auth::Plain {
            username: "guest".to_string(),
            password: "guest".to_string(),
        }
    }
}

impl Sasl for Auth {
    fn mechanism(&self) -> String {
        match *self {
            Auth::Plain { .. } => "PLAIN".to_string(),
            Auth::External => "EXTERNAL".to_string(),
        }
    }

    fn response(&self) -> String {
        match self {
            Auth::Plain { username, password } => format!("\x00{}\x00{}", username, password),
            Auth::External => "".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_response_is_nul_separated() {
        let auth = Auth::Plain {
            username: "user".to_string(),
            password: "pass".to_string(),
        };
        assert_eq!(auth.mechanism(), "PLAIN");
        assert_eq!(auth.response(), "\x00user\x00pass");
    }

    #[test]
    fn external_response_is_empty() {
        assert_eq!(Auth::External.mechanism(), "EXTERNAL");
        assert_eq!(Auth::External.response(), "");
    }
}
