//! Process configuration read from the environment.
//!
//! | Variable            | Default | Meaning                                  |
//! |---------------------|---------|------------------------------------------|
//! | `PORT`              | `8080`  | TCP port, bound on all interfaces        |
//! | `BIND_ADDR`         |         | Full `host:port`, overrides `PORT`       |
//! | `JWT_SECRET`        |         | HS256 signing secret (required)          |
//! | `JWT_ISSUER`        |         | Expected `iss` claim, if set             |
//! | `MAILBOX_CAPACITY`  | `256`   | Outbound messages queued per connection  |
//! | `ROOM_GRACE_SECS`   | `30`    | How long an empty room lingers           |

use std::str::FromStr;
use std::time::Duration;

use kanabattle_room::RoomSettings;
use kanabattle_session::{JwtAuthenticator, SessionConfig};

const DEFAULT_PORT: u16 = 8080;

/// Why the environment could not be turned into a [`ServerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Everything the server binary needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
    pub session: SessionConfig,
    pub rooms: RoomSettings,
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    /// See [`from_lookup`](Self::from_lookup).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    /// - [`ConfigError::Missing`] if `JWT_SECRET` is unset or blank
    /// - [`ConfigError::Invalid`] if a numeric setting does not parse
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = match get("BIND_ADDR") {
            Some(addr) => addr,
            None => {
                let port: u16 = parse(&get, "PORT")?.unwrap_or(DEFAULT_PORT);
                format!("0.0.0.0:{port}")
            }
        };

        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let mut session = SessionConfig::default();
        if let Some(capacity) = parse::<usize>(&get, "MAILBOX_CAPACITY")? {
            if capacity == 0 {
                return Err(ConfigError::Invalid {
                    key: "MAILBOX_CAPACITY",
                    value: capacity.to_string(),
                });
            }
            session.mailbox_capacity = capacity;
        }

        let mut rooms = RoomSettings::default();
        if let Some(secs) = parse::<u64>(&get, "ROOM_GRACE_SECS")? {
            rooms = rooms.with_grace_period(Duration::from_secs(secs));
        }

        Ok(Self {
            bind_addr,
            jwt_secret,
            jwt_issuer: get("JWT_ISSUER"),
            session,
            rooms,
        })
    }

    /// Builds the token validator these settings describe.
    pub fn authenticator(&self) -> JwtAuthenticator {
        let auth = JwtAuthenticator::new(self.jwt_secret.as_bytes());
        match &self.jwt_issuer {
            Some(issuer) => auth.with_issuer(issuer),
            None => auth,
        }
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(None),
    }
}
