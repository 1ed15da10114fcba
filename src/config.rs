use crate::error::{Error, Result};
use dotenvy::dotenv;
use rust_decimal::Decimal;
use std::env;
use std::sync::OnceLock;

pub const DEFAULT_QUESTIONS_PER_SESSION: usize = 15;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub questions_per_session: usize,
    /// Percentage a session must reach to count as passed.
    pub pass_threshold: Decimal,
    pub selection_seed: Option<u64>,
    pub log_format: LogFormat,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let config = Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            database_max_connections: get_env_parse_or(
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_MAX_CONNECTIONS,
            )?,
            jwt_secret: get_env("JWT_SECRET")?,
            questions_per_session: get_env_parse_or(
                "QUESTIONS_PER_SESSION",
                DEFAULT_QUESTIONS_PER_SESSION,
            )?,
            pass_threshold: get_env_parse_or("PASS_THRESHOLD", Decimal::from(50))?,
            selection_seed: get_env_parse_opt("SELECTION_SEED")?,
            log_format: match env::var("LOG_FORMAT").ok().as_deref() {
                Some("json") => LogFormat::Json,
                None | Some("pretty") => LogFormat::Pretty,
                Some(other) => {
                    return Err(Error::Config(format!(
                        "Invalid value for LOG_FORMAT: {}",
                        other
                    )))
                }
            },
        };
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.questions_per_session == 0 {
            return Err(Error::Config(
                "QUESTIONS_PER_SESSION must be greater than zero".to_string(),
            ));
        }
        if self.pass_threshold < Decimal::ZERO || self.pass_threshold > Decimal::ONE_HUNDRED {
            return Err(Error::Config(
                "PASS_THRESHOLD must be between 0 and 100".to_string(),
            ));
        }
        Ok(())
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e)))
}

fn get_env_parse_opt<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => parse_value(name, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    Ok(get_env_parse_opt(name)?.unwrap_or(default))
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> Result<&'static Config> {
    CONFIG
        .get()
        .ok_or_else(|| Error::Config("Configuration has not been initialized".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_reports_the_variable() {
        let err = parse_value::<u32>("QUESTIONS_PER_SESSION", "many").unwrap_err();
        assert!(err.to_string().contains("QUESTIONS_PER_SESSION"));
        assert_eq!(parse_value::<u32>("X", " 12 ").unwrap(), 12);
    }

    #[test]
    fn decimal_thresholds_parse() {
        let threshold: Decimal = parse_value("PASS_THRESHOLD", "62.5").unwrap();
        assert_eq!(threshold.to_string(), "62.5");
    }
}
