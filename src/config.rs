use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::{env, fmt, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Deadline applied to every call against the object store.
    pub request_timeout: Duration,
    /// Largest multipart upload body accepted, in bytes.
    pub max_upload_bytes: usize,
    pub storage: StorageConfig,
}

/// Connection settings for the S3-compatible object store.
#[derive(Clone)]
pub struct StorageConfig {
    /// Host name or address of the store, without scheme or port.
    pub endpoint: String,
    pub port: u16,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    /// Use HTTPS when talking to the store.
    pub secure: bool,
}

impl StorageConfig {
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.endpoint, self.port)
    }
}

// Keeps the secret out of startup logs.
impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("port", &self.port)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .field("secure", &self.secure)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Object storage manager with file verification")]
pub struct Args {
    /// Host to bind to (overrides OSM_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides OSM_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Object store host name (overrides OSM_STORAGE_ENDPOINT)
    #[arg(long)]
    pub storage_endpoint: Option<String>,

    /// Object store port (overrides OSM_STORAGE_PORT)
    #[arg(long)]
    pub storage_port: Option<u16>,

    /// Object store region (overrides OSM_STORAGE_REGION)
    #[arg(long)]
    pub storage_region: Option<String>,

    /// Talk to the object store over HTTPS (overrides OSM_STORAGE_SECURE)
    #[arg(long)]
    pub storage_secure: bool,

    /// Per-call deadline in seconds (overrides OSM_REQUEST_TIMEOUT_SECS)
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Args::parse(), |name| env::var(name))
    }

    /// Merge CLI args over variables returned by `lookup`, falling back to defaults.
    /// Credentials are only read from the environment so they never show up in `ps`.
    pub fn resolve<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        // --- Environment fallback ---
        let env_host = optional(&lookup, "OSM_HOST")?.unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parsed(&lookup, "OSM_PORT")?.unwrap_or(8080);
        let env_timeout = parsed(&lookup, "OSM_REQUEST_TIMEOUT_SECS")?.unwrap_or(30);
        let max_upload_bytes = parsed(&lookup, "OSM_MAX_UPLOAD_BYTES")?.unwrap_or(64 * 1024 * 1024);

        let env_endpoint =
            optional(&lookup, "OSM_STORAGE_ENDPOINT")?.unwrap_or_else(|| "localhost".into());
        let env_storage_port = parsed(&lookup, "OSM_STORAGE_PORT")?.unwrap_or(9000);
        let env_region =
            optional(&lookup, "OSM_STORAGE_REGION")?.unwrap_or_else(|| "us-east-1".into());
        let env_secure = parsed(&lookup, "OSM_STORAGE_SECURE")?.unwrap_or(false);
        let access_key_id = optional(&lookup, "OSM_STORAGE_ACCESS_KEY_ID")?
            .ok_or_else(|| anyhow!("OSM_STORAGE_ACCESS_KEY_ID must be set"))?;
        let secret_access_key = optional(&lookup, "OSM_STORAGE_SECRET_ACCESS_KEY")?
            .ok_or_else(|| anyhow!("OSM_STORAGE_SECRET_ACCESS_KEY must be set"))?;

        // --- Merge ---
        let timeout_secs = args.request_timeout_secs.unwrap_or(env_timeout);
        if timeout_secs == 0 {
            anyhow::bail!("request timeout must be at least one second");
        }

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            request_timeout: Duration::from_secs(timeout_secs),
            max_upload_bytes,
            storage: StorageConfig {
                endpoint: args.storage_endpoint.unwrap_or(env_endpoint),
                port: args.storage_port.unwrap_or(env_storage_port),
                access_key_id,
                secret_access_key,
                region: args.storage_region.unwrap_or(env_region),
                secure: args.storage_secure || env_secure,
            },
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn optional<F>(lookup: &F, name: &str) -> Result<Option<String>>
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    match lookup(name) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn parsed<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Result<String, env::VarError>,
{
    optional(lookup, name)?
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", name, value))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(
        vars: &[(&str, &str)],
    ) -> impl Fn(&str) -> Result<String, env::VarError> + use<> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned().ok_or(env::VarError::NotPresent)
    }

    const CREDENTIALS: [(&str, &str); 2] = [
        ("OSM_STORAGE_ACCESS_KEY_ID", "minio"),
        ("OSM_STORAGE_SECRET_ACCESS_KEY", "minio-secret"),
    ];

    #[test]
    fn defaults_apply_when_only_credentials_are_set() {
        let cfg = AppConfig::resolve(Args::default(), lookup_from(&CREDENTIALS)).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:8080");
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.storage.endpoint_url(), "http://localhost:9000");
        assert_eq!(cfg.storage.region, "us-east-1");
        assert_eq!(cfg.storage.access_key_id, "minio");
    }

    #[test]
    fn cli_overrides_environment() {
        let mut vars = CREDENTIALS.to_vec();
        vars.extend([
            ("OSM_PORT", "9090"),
            ("OSM_STORAGE_ENDPOINT", "minio.internal"),
            ("OSM_STORAGE_SECURE", "true"),
        ]);
        let args = Args {
            port: Some(7000),
            storage_port: Some(443),
            ..Args::default()
        };
        let cfg = AppConfig::resolve(args, lookup_from(&vars)).unwrap();
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.storage.endpoint_url(), "https://minio.internal:443");
    }

    #[test]
    fn invalid_port_is_reported() {
        let mut vars = CREDENTIALS.to_vec();
        vars.push(("OSM_STORAGE_PORT", "ninety"));
        let err = AppConfig::resolve(Args::default(), lookup_from(&vars)).unwrap_err();
        assert!(err.to_string().contains("OSM_STORAGE_PORT"));
    }

    #[test]
    fn missing_credentials_are_fatal() {
        let err = AppConfig::resolve(Args::default(), lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("OSM_STORAGE_ACCESS_KEY_ID"));
    }

    #[test]
    fn debug_output_redacts_secret() {
        let cfg = AppConfig::resolve(Args::default(), lookup_from(&CREDENTIALS)).unwrap();
        let rendered = format!("{:?}", cfg);
        assert!(!rendered.contains("minio-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
