use crate::errors::{ConfigError, ConfigResult};
use serde::Serialize;
use sqlx::postgres::PgConnectOptions;
use std::fmt;
use std::str::FromStr;

/// Where to connect, parsed from the `-d host:port:database:username` flag.
///
/// The password is never part of the descriptor; it is supplied separately
/// when building connect options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
}

impl ConnectionDescriptor {
    pub fn parse(input: &str) -> ConfigResult<Self> {
        let fields: Vec<&str> = input.split(':').collect();
        if fields.len() != 4 {
            return Err(ConfigError::connection_string(
                input,
                &format!("expected 4 colon-separated fields, found {}", fields.len()),
            ));
        }

        let names = ["host", "port", "database", "username"];
        for (name, value) in names.iter().zip(&fields) {
            if value.trim().is_empty() {
                return Err(ConfigError::connection_string(
                    input,
                    &format!("{} is empty", name),
                ));
            }
        }

        let port = fields[1].trim().parse::<u16>().map_err(|_| {
            ConfigError::connection_string(input, &format!("port '{}' is not a number", fields[1]))
        })?;

        Ok(Self {
            host: fields[0].trim().to_string(),
            port,
            database: fields[2].trim().to_string(),
            username: fields[3].trim().to_string(),
        })
    }

    /// PostgreSQL connect options for this descriptor
    pub fn connect_options(&self, password: Option<&str>) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.username)
            .application_name("suitec-data-sync");

        match password {
            Some(password) => options.password(password),
            None => options,
        }
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}/{}", self.username, self.host, self.port, self.database)
    }
}
