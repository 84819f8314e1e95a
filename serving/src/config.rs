use std::{env, io, num::NonZeroUsize, path::PathBuf, str::FromStr, time::Duration};

use artifact::VersionSelector;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_ARTIFACT_DIR: &str = "artifacts";

/// The inclusive range predicted ratings are clamped into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingRange {
    min: f32,
    max: f32,
}

impl RatingRange {
    /// Creates a new range, `None` if `min > max` or a bound isn't finite.
    pub fn new(min: f32, max: f32) -> Option<Self> {
        (min.is_finite() && max.is_finite() && min <= max).then_some(Self { min, max })
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn clamp(&self, rating: f32) -> f32 {
        rating.clamp(self.min, self.max)
    }
}

impl Default for RatingRange {
    fn default() -> Self {
        Self {
            min: 1.0,
            max: 10.0,
        }
    }
}

/// Settings of a serving gateway and its front end.
#[derive(Debug, Clone)]
pub struct ServingConfig {
    pub artifact_dir: PathBuf,
    pub host: String,
    pub port: u16,
    /// The version to serve, `Latest` follows new artifacts on refresh.
    pub model_version: VersionSelector,
    pub predict_timeout: Duration,
    pub batch_timeout: Duration,
    /// The budget of a single artifact load, distinct from the prediction ones.
    pub load_timeout: Duration,
    /// How often to look for a new artifact, `None` disables the refresh loop.
    pub refresh_interval: Option<Duration>,
    /// Load attempts on initialization, the first retry waits `load_backoff` and each one after
    /// that waits twice as long as the previous one.
    pub load_attempts: NonZeroUsize,
    pub load_backoff: Duration,
    pub max_batch: usize,
    /// The longest command line the front end accepts, in bytes.
    pub max_line_bytes: usize,
    pub rating_range: RatingRange,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from(DEFAULT_ARTIFACT_DIR),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            model_version: VersionSelector::Latest,
            predict_timeout: Duration::from_millis(500),
            batch_timeout: Duration::from_secs(5),
            load_timeout: Duration::from_secs(30),
            refresh_interval: Some(Duration::from_secs(60)),
            load_attempts: NonZeroUsize::MIN.saturating_add(2),
            load_backoff: Duration::from_millis(200),
            max_batch: 100,
            max_line_bytes: 1 << 20,
            rating_range: RatingRange::default(),
        }
    }
}

impl ServingConfig {
    /// Reads the configuration from the environment, unset variables keep their defaults.
    ///
    /// Variables: `ARTIFACT_DIR`, `HOST`, `PORT`, `MODEL_VERSION` (an id or `latest`),
    /// `PREDICT_TIMEOUT_MS`, `BATCH_TIMEOUT_MS`, `LOAD_TIMEOUT_MS`, `REFRESH_INTERVAL_SECS`
    /// (`0` disables refreshing), `LOAD_ATTEMPTS`, `LOAD_BACKOFF_MS`, `MAX_BATCH`,
    /// `MAX_LINE_BYTES`.
    ///
    /// # Returns
    /// The configuration or an `InvalidInput` error naming the variable that failed to parse.
    pub fn from_env() -> io::Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = env::var("ARTIFACT_DIR") {
            config.artifact_dir = dir.into();
        }
        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var("PORT")? {
            config.port = port;
        }
        if let Some(version) = parse_var("MODEL_VERSION")? {
            config.model_version = version;
        }
        if let Some(ms) = parse_var("PREDICT_TIMEOUT_MS")? {
            config.predict_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var("BATCH_TIMEOUT_MS")? {
            config.batch_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var("LOAD_TIMEOUT_MS")? {
            config.load_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>("REFRESH_INTERVAL_SECS")? {
            config.refresh_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(attempts) = parse_var("LOAD_ATTEMPTS")? {
            config.load_attempts = attempts;
        }
        if let Some(ms) = parse_var("LOAD_BACKOFF_MS")? {
            config.load_backoff = Duration::from_millis(ms);
        }
        if let Some(max) = parse_var("MAX_BATCH")? {
            config.max_batch = max;
        }
        if let Some(max) = parse_var("MAX_LINE_BYTES")? {
            config.max_line_bytes = max;
        }

        Ok(config)
    }

    /// The address the front end listens at.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(name: &str) -> io::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Ok(raw) = env::var(name) else {
        return Ok(None);
    };

    raw.trim().parse().map(Some).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid {name}={raw:?}: {e}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_range_clamps() {
        let range = RatingRange::default();
        assert_eq!(range.clamp(25.0), 10.0);
        assert_eq!(range.clamp(-3.0), 1.0);
        assert_eq!(range.clamp(7.25), 7.25);
    }

    #[test]
    fn test_rating_range_rejects_inverted_bounds() {
        assert!(RatingRange::new(10.0, 1.0).is_none());
        assert!(RatingRange::new(f32::NAN, 1.0).is_none());
        assert!(RatingRange::new(0.0, 5.0).is_some());
    }

    #[test]
    fn test_defaults() {
        let config = ServingConfig::default();
        assert_eq!(config.max_batch, 100);
        assert_eq!(config.max_line_bytes, 1024 * 1024);
        assert_eq!(config.load_attempts.get(), 3);
        assert_eq!(config.model_version, VersionSelector::Latest);
        assert_eq!(config.addr(), "127.0.0.1:8000");
    }
}
