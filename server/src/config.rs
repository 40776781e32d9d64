use anyhow::Context;
use std::str::FromStr;

/// Default per-file upload limit (50 MB)
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageKind {
    /// Directory tree under `STORAGE_PATH`
    Local,
    /// Empty in-memory store
    Memory,
    /// In-memory store seeded with demo content
    Mock,
    /// S3-compatible bucket
    S3,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "fs" | "filesystem" => Ok(StorageKind::Local),
            "memory" => Ok(StorageKind::Memory),
            "mock" => Ok(StorageKind::Mock),
            "s3" => Ok(StorageKind::S3),
            other => anyhow::bail!("unknown STORAGE_BACKEND: {}", other),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Custom endpoint for S3-compatible services (MinIO, R2, ...)
    pub endpoint: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_name: String,
    pub database_url: String,
    pub storage_backend: StorageKind,
    pub storage_path: String,
    pub s3: S3Config,
    pub rest_port: u16,
    pub jwt_secret: String,
    /// Base URL used when minting share links
    pub public_url: String,
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let rest_port: u16 = env_or("REST_PORT", "3001")
            .parse()
            .context("REST_PORT must be a port number")?;

        Ok(Config {
            server_name: env_or("SERVER_NAME", "Shelf"),
            database_url: env_or("DATABASE_URL", "sqlite://./data/shelf.db"),
            storage_backend: env_or("STORAGE_BACKEND", "local").parse()?,
            storage_path: env_or("STORAGE_PATH", "./data/storage"),
            s3: S3Config {
                bucket: env_or("S3_BUCKET_NAME", ""),
                region: env_or("AWS_REGION", "us-east-1"),
                access_key_id: env_or("AWS_ACCESS_KEY_ID", ""),
                secret_access_key: env_or("AWS_SECRET_ACCESS_KEY", ""),
                endpoint: env_or("S3_ENDPOINT", ""),
            },
            rest_port,
            jwt_secret: std::env::var("JWT_SECRET").context(
                "JWT_SECRET environment variable must be set. Generate with: openssl rand -hex 32",
            )?,
            public_url: env_or("PUBLIC_URL", &format!("http://localhost:{}", rest_port))
                .trim_end_matches('/')
                .to_string(),
            cors_origins: env_or("CORS_ORIGINS", "http://localhost:3000")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            max_upload_bytes: match std::env::var("MAX_UPLOAD_BYTES") {
                Ok(value) => value.parse().context("MAX_UPLOAD_BYTES must be a byte count")?,
                Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
            },
        })
    }

    /// Configuration for tests: in-memory database and storage
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            server_name: "Shelf".to_string(),
            database_url: "sqlite::memory:".to_string(),
            storage_backend: StorageKind::Memory,
            storage_path: String::new(),
            s3: S3Config::default(),
            rest_port: 3001,
            jwt_secret: "test_secret".to_string(),
            public_url: "http://localhost:3001".to_string(),
            cors_origins: vec!["http://localhost:3000".to_string()],
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_kind_parse() {
        assert_eq!("S3".parse::<StorageKind>().unwrap(), StorageKind::S3);
        assert_eq!(" local ".parse::<StorageKind>().unwrap(), StorageKind::Local);
        assert_eq!("mock".parse::<StorageKind>().unwrap(), StorageKind::Mock);
        assert!("ftp".parse::<StorageKind>().is_err());
    }
}
