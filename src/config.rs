use std::{str::FromStr, time::Duration};

use anyhow::Context;
use crate::credentials::password::DEFAULT_COST;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => AppEnv::Development,
            _ => AppEnv::Production,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub access_ttl: Duration,
    pub refresh_secret: String,
    pub refresh_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub from: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub starttls: bool,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: AppEnv,
    pub public_url: String,
    pub cors_origins: Vec<String>,
    pub cookie_secure: bool,
    pub bcrypt_cost: u32,
    pub jwt: JwtConfig,
    pub email: EmailConfig,
    pub storage: StorageConfig,
}

const DEFAULT_ORIGINS: &str =
    "http://localhost:2000,http://localhost:3000,https://mobileacademy.io,https://wecancode.in";

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

/// Unset falls back to `default`; set but unparsable is a startup error.
fn parsed_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} is not valid: {raw:?}")),
        Err(_) => Ok(default),
    }
}

/// Accepts plain seconds (`300`) or a humantime span (`7d`, `15m`).
pub(crate) fn parse_ttl(raw: &str) -> anyhow::Result<Duration> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw).with_context(|| format!("invalid duration {raw:?}"))
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let env = AppEnv::parse(&var_or("APP_ENV", "production"));

        let jwt = JwtConfig {
            access_secret: std::env::var("JWT_ACCESS_TOKEN_SECRET")
                .context("JWT_ACCESS_TOKEN_SECRET is not set")?,
            access_ttl: parse_ttl(&var_or("JWT_ACCESS_TOKEN_EXPIRES_IN", "300"))?,
            refresh_secret: std::env::var("JWT_REFRESH_TOKEN_SECRET")
                .context("JWT_REFRESH_TOKEN_SECRET is not set")?,
            refresh_ttl: parse_ttl(&var_or("JWT_REFRESH_TOKEN_EXPIRES_IN", "7d"))?,
        };
        anyhow::ensure!(
            jwt.access_secret != jwt.refresh_secret,
            "access and refresh token secrets must differ"
        );

        let email = EmailConfig {
            from: var_or("EMAIL_FROM", "Accounts <no-reply@localhost>"),
            host: var_or("EMAIL_HOST", "localhost"),
            port: parsed_or("EMAIL_PORT", 587u16)?,
            username: var_or("EMAIL_USERNAME", ""),
            password: var_or("EMAIL_PASSWORD", ""),
            starttls: flag("EMAIL_STARTTLS", env == AppEnv::Production),
        };

        let bcrypt_cost: u32 = parsed_or("BCRYPT_COST", DEFAULT_COST)?;
        anyhow::ensure!(
            (4..=31).contains(&bcrypt_cost),
            "BCRYPT_COST must be between 4 and 31, got {bcrypt_cost}"
        );

        let storage = StorageConfig {
            endpoint: std::env::var("S3_ENDPOINT").context("S3_ENDPOINT is not set")?,
            bucket: std::env::var("S3_BUCKET").context("S3_BUCKET is not set")?,
            access_key: std::env::var("S3_ACCESS_KEY").context("S3_ACCESS_KEY is not set")?,
            secret_key: std::env::var("S3_SECRET_KEY").context("S3_SECRET_KEY is not set")?,
            region: var_or("S3_REGION", "us-east-1"),
        };

        Ok(Self {
            database_url,
            env,
            public_url: var_or("APP_PUBLIC_URL", "http://localhost:8080")
                .trim_end_matches('/')
                .to_string(),
            cors_origins: var_or("CORS_ALLOWED_ORIGINS", DEFAULT_ORIGINS)
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            cookie_secure: flag("COOKIE_SECURE", env == AppEnv::Production),
            bcrypt_cost,
            jwt,
            email,
            storage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [(&str, Option<&str>); 7] = [
        ("DATABASE_URL", Some("postgres://localhost/accounts")),
        ("JWT_ACCESS_TOKEN_SECRET", Some("access-secret")),
        ("JWT_REFRESH_TOKEN_SECRET", Some("refresh-secret")),
        ("S3_ENDPOINT", Some("http://localhost:9000")),
        ("S3_BUCKET", Some("avatars")),
        ("S3_ACCESS_KEY", Some("minio")),
        ("S3_SECRET_KEY", Some("minio123")),
    ];

    #[test]
    fn ttl_accepts_seconds_and_humantime() {
        assert_eq!(parse_ttl("300").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_ttl("7d").unwrap(), Duration::from_secs(7 * 24 * 3600));
        assert_eq!(parse_ttl("15m").unwrap(), Duration::from_secs(900));
        assert!(parse_ttl("soon").is_err());
    }

    #[test]
    fn from_env_applies_defaults() {
        let mut vars: Vec<(&str, Option<&str>)> = REQUIRED.to_vec();
        vars.extend([
            ("APP_ENV", None),
            ("JWT_ACCESS_TOKEN_EXPIRES_IN", None),
            ("JWT_REFRESH_TOKEN_EXPIRES_IN", None),
            ("BCRYPT_COST", None),
            ("COOKIE_SECURE", None),
            ("CORS_ALLOWED_ORIGINS", None),
            ("S3_REGION", None),
            ("APP_PUBLIC_URL", Some("https://api.example.com/")),
        ]);
        temp_env::with_vars(vars, || {
            let cfg = AppConfig::from_env().expect("config loads");
            assert_eq!(cfg.env, AppEnv::Production);
            assert_eq!(cfg.jwt.access_ttl, Duration::from_secs(300));
            assert_eq!(cfg.jwt.refresh_ttl, Duration::from_secs(7 * 24 * 3600));
            assert_eq!(cfg.bcrypt_cost, 12);
            assert!(cfg.cookie_secure);
            assert_eq!(cfg.public_url, "https://api.example.com");
            assert_eq!(cfg.cors_origins.len(), 4);
            assert_eq!(cfg.storage.region, "us-east-1");
        });
    }

    #[test]
    fn from_env_rejects_shared_secrets() {
        let mut vars: Vec<(&str, Option<&str>)> = REQUIRED.to_vec();
        vars[2] = ("JWT_REFRESH_TOKEN_SECRET", Some("access-secret"));
        temp_env::with_vars(vars, || {
            let err = AppConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("must differ"));
        });
    }

    #[test]
    fn from_env_requires_database_url() {
        let mut vars: Vec<(&str, Option<&str>)> = REQUIRED.to_vec();
        vars[0] = ("DATABASE_URL", None);
        temp_env::with_vars(vars, || {
            let err = AppConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("DATABASE_URL"));
        });
    }

    #[test]
    fn from_env_rejects_bad_numbers() {
        let cases = [
            ("BCRYPT_COST", "twelve", "BCRYPT_COST is not valid"),
            ("BCRYPT_COST", "3", "between 4 and 31"),
            ("BCRYPT_COST", "32", "between 4 and 31"),
            ("EMAIL_PORT", "smtp", "EMAIL_PORT is not valid"),
            ("EMAIL_PORT", "70000", "EMAIL_PORT is not valid"),
        ];
        for (key, value, expected) in cases {
            let mut vars: Vec<(&str, Option<&str>)> = REQUIRED.to_vec();
            vars.extend([("BCRYPT_COST", None), ("EMAIL_PORT", None)]);
            vars.retain(|(k, _)| *k != key);
            vars.push((key, Some(value)));
            temp_env::with_vars(vars, || {
                let err = AppConfig::from_env().unwrap_err();
                assert!(err.to_string().contains(expected), "{key}={value}: {err}");
            });
        }
    }

    #[test]
    fn from_env_reads_numbers_when_set() {
        let mut vars: Vec<(&str, Option<&str>)> = REQUIRED.to_vec();
        vars.extend([("BCRYPT_COST", Some(" 10 ")), ("EMAIL_PORT", Some("2525"))]);
        temp_env::with_vars(vars, || {
            let cfg = AppConfig::from_env().expect("config loads");
            assert_eq!(cfg.bcrypt_cost, 10);
            assert_eq!(cfg.email.port, 2525);
        });
    }
}
