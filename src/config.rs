use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use regex::Regex;
use serde::Deserialize;
use serde::de::{self, Deserializer, Visitor};

use crate::events::SourceKind;
use crate::selector::RotationMode;

pub const DEFAULT_PICSUM_URL: &str = "https://picsum.photos/";
pub const DEFAULT_GEOCODER_ENDPOINT: &str = "https://nominatim.openstreetmap.org/reverse";
pub const LOCATION_CACHE_CAPACITY: usize = 50;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Which repository images are drawn from.
    pub image_repository: SourceKind,
    pub repository_config: RepositoryConfig,
    /// Time each image stays on screen. Integer seconds or a humantime string.
    #[serde(deserialize_with = "deserialize_seconds_or_humantime")]
    pub update_interval: Duration,
    /// Optional periodic re-listing of the repository.
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Option<Duration>,
    /// Random rotation when true, sequential otherwise. Direct sources are always random.
    pub random: bool,
    /// Deterministic seed for random rotation.
    pub rotation_seed: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub grayscale: bool,
    pub blur: bool,
    pub blur_amount: u8,
    pub opacity: f32,
    #[serde(with = "humantime_serde")]
    pub animation_speed: Duration,
    /// Do not start advancing until an explicit resume arrives.
    pub start_hidden: bool,
    /// Show one image on startup, then stay paused.
    pub start_paused: bool,
    pub show_status_icon: bool,
    #[serde(deserialize_with = "deserialize_lenient")]
    pub status_icon_mode: OverlayMode,
    #[serde(deserialize_with = "deserialize_lenient")]
    pub status_icon_position: ScreenCorner,
    #[serde(deserialize_with = "deserialize_lenient")]
    pub image_fit: ImageFit,
    pub show_metadata: bool,
    #[serde(deserialize_with = "deserialize_metadata_position")]
    pub metadata_position: ScreenCorner,
    #[serde(deserialize_with = "deserialize_lenient")]
    pub metadata_mode: OverlayMode,
    /// Number of per-image metadata entries kept in memory.
    pub metadata_cache_size: usize,
    pub geocoder: GeocoderConfig,
    /// Unix domain socket accepting runtime control commands.
    pub control_socket_path: Option<PathBuf>,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(mut self) -> Result<Self> {
        ensure!(
            !self.update_interval.is_zero(),
            "update-interval must be greater than zero"
        );
        if let Some(refresh) = self.refresh_interval {
            ensure!(!refresh.is_zero(), "refresh-interval must be greater than zero");
        }
        ensure!(
            self.metadata_cache_size > 0,
            "metadata-cache-size must be greater than zero"
        );
        ensure!(
            self.width > 0 && self.height > 0,
            "width and height must be greater than zero"
        );
        ensure!(
            (0.0..=1.0).contains(&self.opacity),
            "opacity must be within 0.0..=1.0"
        );
        self.blur_amount = self.blur_amount.clamp(1, 10);

        match self.image_repository {
            SourceKind::Direct => {
                if self.repository_config.path.trim().is_empty() {
                    self.repository_config.path = DEFAULT_PICSUM_URL.to_string();
                }
            }
            SourceKind::LocalFile => {
                ensure!(
                    !self.repository_config.path.trim().is_empty(),
                    "repository-config.path is required for localdirectory"
                );
            }
            SourceKind::RemoteShare => {
                reqwest::Url::parse(&self.repository_config.path).with_context(|| {
                    format!(
                        "repository-config.path must be a URL for nextcloud, got {:?}",
                        self.repository_config.path
                    )
                })?;
            }
        }
        self.repository_config
            .exclude_patterns()
            .context("invalid repository-config.exclude")?;
        self.geocoder
            .validate()
            .context("invalid geocoder configuration")?;
        if let Some(socket) = &self.control_socket_path {
            ensure!(
                socket.file_name().is_some(),
                "control-socket-path must include a socket file name"
            );
        }
        Ok(self)
    }

    /// Direct sources cannot be stepped through, so they always rotate randomly.
    pub fn rotation_mode(&self) -> RotationMode {
        if self.image_repository.is_listed() {
            RotationMode::from_random_flag(self.random)
        } else {
            RotationMode::Random
        }
    }

    /// Previous-image requests only make sense for an ordered, listed source.
    pub fn allows_previous(&self) -> bool {
        self.rotation_mode() == RotationMode::Sequential && self.image_repository.is_listed()
    }

    /// Metadata overlays are produced for listed sources only.
    pub fn wants_metadata(&self) -> bool {
        self.show_metadata
            && self.metadata_mode != OverlayMode::Hide
            && self.image_repository.is_listed()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            image_repository: SourceKind::Direct,
            repository_config: RepositoryConfig::default(),
            update_interval: Duration::from_secs(60),
            refresh_interval: None,
            random: true,
            rotation_seed: None,
            width: 1920,
            height: 1080,
            grayscale: false,
            blur: false,
            blur_amount: 1,
            opacity: 0.3,
            animation_speed: Duration::from_millis(500),
            start_hidden: false,
            start_paused: false,
            show_status_icon: true,
            status_icon_mode: OverlayMode::Show,
            status_icon_position: ScreenCorner::TopRight,
            image_fit: ImageFit::Cover,
            show_metadata: true,
            metadata_position: ScreenCorner::BottomLeft,
            metadata_mode: OverlayMode::Show,
            metadata_cache_size: 100,
            geocoder: GeocoderConfig::default(),
            control_socket_path: None,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Base URL (picsum, nextcloud) or root directory (localdirectory).
    pub path: String,
    pub username: String,
    pub password: String,
    /// Descend into subdirectories of a local root.
    pub recursive: bool,
    /// Regular expressions matched against entry base names.
    pub exclude: Vec<String>,
    /// Re-list a local root when its contents change.
    pub watch: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            username: String::new(),
            password: String::new(),
            recursive: false,
            exclude: Vec::new(),
            watch: true,
        }
    }
}

impl fmt::Debug for RepositoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryConfig")
            .field("path", &self.path)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "<redacted>" })
            .field("recursive", &self.recursive)
            .field("exclude", &self.exclude)
            .field("watch", &self.watch)
            .finish()
    }
}

impl RepositoryConfig {
    pub fn exclude_patterns(&self) -> Result<Vec<Regex>> {
        self.exclude
            .iter()
            .map(|raw| Regex::new(raw).with_context(|| format!("bad exclude pattern {raw:?}")))
            .collect()
    }

    /// Credentials for basic authentication, when a user name is set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() {
            None
        } else {
            Some((self.username.as_str(), self.password.as_str()))
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct GeocoderConfig {
    /// When false, coordinates are shown as formatted numbers instead of place names.
    pub enabled: bool,
    pub endpoint: String,
    pub user_agent: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_GEOCODER_ENDPOINT.to_string(),
            user_agent: concat!("random-photo/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl GeocoderConfig {
    fn validate(&self) -> Result<()> {
        if self.enabled {
            reqwest::Url::parse(&self.endpoint)
                .with_context(|| format!("geocoder.endpoint is not a URL: {:?}", self.endpoint))?;
        }
        ensure!(!self.timeout.is_zero(), "geocoder.timeout must be positive");
        Ok(())
    }
}

/// Option sets that fall back to their default on unrecognized input.
pub trait ClosedSet: Sized + Default + fmt::Debug {
    const NAMES: &'static [&'static str];

    fn parse(normalized: &str) -> Option<Self>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFit {
    #[default]
    Cover,
    Contain,
    Fill,
}

impl ClosedSet for ImageFit {
    const NAMES: &'static [&'static str] = &["cover", "contain", "fill"];

    fn parse(normalized: &str) -> Option<Self> {
        match normalized {
            "cover" => Some(Self::Cover),
            "contain" => Some(Self::Contain),
            "fill" => Some(Self::Fill),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScreenCorner {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
}

impl ClosedSet for ScreenCorner {
    const NAMES: &'static [&'static str] = &["top-left", "top-right", "bottom-left", "bottom-right"];

    fn parse(normalized: &str) -> Option<Self> {
        match normalized {
            "top-left" => Some(Self::TopLeft),
            "top-right" => Some(Self::TopRight),
            "bottom-left" => Some(Self::BottomLeft),
            "bottom-right" => Some(Self::BottomRight),
            _ => None,
        }
    }
}

/// How an overlay (status icon or metadata) is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayMode {
    #[default]
    Show,
    /// Shown briefly after each change, then faded out.
    Fade,
    Hide,
}

impl ClosedSet for OverlayMode {
    const NAMES: &'static [&'static str] = &["show", "fade", "hide"];

    fn parse(normalized: &str) -> Option<Self> {
        match normalized {
            "show" => Some(Self::Show),
            "fade" => Some(Self::Fade),
            "hide" => Some(Self::Hide),
            _ => None,
        }
    }
}

/// Accepts `bottom_left`, `Bottom-Left` and friends; anything unknown becomes `fallback`.
fn lenient<T: ClosedSet>(raw: &str, fallback: T) -> T {
    let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
    T::parse(&normalized).unwrap_or_else(|| {
        tracing::warn!(
            value = %raw,
            expected = ?T::NAMES,
            fallback = ?fallback,
            "unrecognized option value; using default"
        );
        fallback
    })
}

fn deserialize_lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: ClosedSet,
{
    let raw = String::deserialize(deserializer)?;
    Ok(lenient(&raw, T::default()))
}

// The metadata overlay defaults to the opposite corner from the status icon.
fn deserialize_metadata_position<'de, D>(deserializer: D) -> Result<ScreenCorner, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(lenient(&raw, ScreenCorner::BottomLeft))
}

fn deserialize_seconds_or_humantime<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct SecondsVisitor;

    impl<'de> Visitor<'de> for SecondsVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a number of seconds or a duration string like \"90s\"")
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(value))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            u64::try_from(value)
                .map(Duration::from_secs)
                .map_err(|_| E::invalid_value(de::Unexpected::Signed(value), &self))
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Duration::try_from_secs_f64(value)
                .map_err(|_| E::invalid_value(de::Unexpected::Float(value), &self))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(value.trim()).map_err(E::custom)
        }
    }

    deserializer.deserialize_any(SecondsVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_module_defaults() {
        let cfg = Configuration::default();
        assert_eq!(cfg.update_interval, Duration::from_secs(60));
        assert_eq!(cfg.metadata_cache_size, 100);
        assert_eq!(cfg.image_fit, ImageFit::Cover);
        assert_eq!(cfg.status_icon_position, ScreenCorner::TopRight);
        assert!(cfg.random);
    }

    #[test]
    fn seconds_and_humantime_intervals() {
        let cfg: Configuration = serde_yaml::from_str("update-interval: 30").unwrap();
        assert_eq!(cfg.update_interval, Duration::from_secs(30));
        let cfg: Configuration = serde_yaml::from_str("update-interval: 2m").unwrap();
        assert_eq!(cfg.update_interval, Duration::from_secs(120));
    }

    #[test]
    fn normalizes_closed_set_spellings() {
        let cfg: Configuration = serde_yaml::from_str(
            "status-icon-position: bottom_left\nimage-fit: CONTAIN\nmetadata-mode: fade",
        )
        .unwrap();
        assert_eq!(cfg.status_icon_position, ScreenCorner::BottomLeft);
        assert_eq!(cfg.image_fit, ImageFit::Contain);
        assert_eq!(cfg.metadata_mode, OverlayMode::Fade);
    }

    #[test]
    fn unknown_positions_fall_back_per_field() {
        let cfg: Configuration = serde_yaml::from_str(
            "status-icon-position: middle\nmetadata-position: center\nimage-fit: zoom",
        )
        .unwrap();
        assert_eq!(cfg.status_icon_position, ScreenCorner::TopRight);
        assert_eq!(cfg.metadata_position, ScreenCorner::BottomLeft);
        assert_eq!(cfg.image_fit, ImageFit::Cover);
    }
}
