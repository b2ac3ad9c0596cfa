use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Error, StayPolicy, Validator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    #[serde(default = "default_pool_size")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Booking rules applied by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingConfig {
    /// hour of the check-in day a stay starts at
    pub check_in_hour: u32,
    /// hour of the check-out day a stay ends at
    pub check_out_hour: u32,
    /// platform commission in basis points of the total price
    pub commission_rate_bp: i64,
    /// how many times a booking is re-run after a serialization conflict
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

fn default_pool_size() -> u32 {
    5
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            check_in_hour: 13,
            check_out_hour: 12,
            commission_rate_bp: 0,
            max_retries: 3,
            retry_base_delay_ms: 50,
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
        }
    }
}

impl Config {
    pub fn load(filename: impl AsRef<Path>) -> Result<Self, Error> {
        let config = fs::read_to_string(filename.as_ref()).map_err(|_| Error::ConfigReadError)?;
        let config: Self = serde_yaml::from_str(&config).map_err(|_| Error::ConfigParseError)?;
        config.booking.validate()?;
        Ok(config)
    }
}

impl DbConfig {
    pub fn server_url(&self) -> String {
        if self.password.is_empty() {
            format!("postgres://{}@{}:{}", self.user, self.host, self.port)
        } else {
            format!(
                "postgres://{}:{}@{}:{}",
                self.user, self.password, self.host, self.port
            )
        }
    }

    pub fn url(&self) -> String {
        format!("{}/{}", self.server_url(), self.dbname)
    }
}

impl BookingConfig {
    pub fn stay_policy(&self) -> StayPolicy {
        StayPolicy {
            check_in_hour: self.check_in_hour,
            check_out_hour: self.check_out_hour,
        }
    }
}

impl Validator for BookingConfig {
    fn validate(&self) -> Result<(), Error> {
        if self.check_in_hour > 23 || self.check_out_hour > 23 {
            return Err(Error::InvalidConfig(format!(
                "check-in and check-out hours must be 0-23, got {} and {}",
                self.check_in_hour, self.check_out_hour
            )));
        }
        if !(0..=10_000).contains(&self.commission_rate_bp) {
            return Err(Error::InvalidConfig(format!(
                "commission_rate_bp must be 0-10000, got {}",
                self.commission_rate_bp
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_should_be_loaded() {
        let config = Config::load("../service/fixtures/config.yml").unwrap();
        assert_eq!(
            config,
            Config {
                db: DbConfig {
                    host: "localhost".to_string(),
                    port: 5432,
                    user: "postgres".to_string(),
                    password: "postgres".to_string(),
                    dbname: "reservation".to_string(),
                    max_connections: 5,
                },
                server: ServerConfig {
                    host: "0.0.0.0".to_string(),
                    port: 8080,
                },
                booking: BookingConfig {
                    commission_rate_bp: 1000,
                    ..Default::default()
                },
                sweeper: SweeperConfig {
                    enabled: true,
                    interval_secs: 3600,
                },
            }
        );
    }

    #[test]
    fn missing_config_file_should_fail() {
        let err = Config::load("../service/fixtures/nope.yml").unwrap_err();
        assert_eq!(err, Error::ConfigReadError);
    }

    #[test]
    fn out_of_range_booking_hours_should_be_rejected_at_load() {
        let booking = BookingConfig {
            check_in_hour: 25,
            ..Default::default()
        };
        assert!(matches!(booking.validate(), Err(Error::InvalidConfig(_))));

        let booking = BookingConfig {
            commission_rate_bp: -1,
            ..Default::default()
        };
        assert!(matches!(booking.validate(), Err(Error::InvalidConfig(_))));
        assert!(BookingConfig::default().validate().is_ok());

        let err = Config::load("../service/fixtures/bad_hours.yml").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn db_url_should_omit_empty_password() {
        let db = DbConfig {
            host: "localhost".to_string(),
            port: 5432,
            user: "alice".to_string(),
            password: "".to_string(),
            dbname: "rsvp".to_string(),
            max_connections: 5,
        };
        assert_eq!(db.url(), "postgres://alice@localhost:5432/rsvp");
    }
}
