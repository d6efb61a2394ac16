use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// What the loader does when a single grid cell cannot be fetched or decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Fail the whole load on the first bad cell.
    #[default]
    Abort,
    /// Leave the cell zero-filled, report it as a gap and keep going.
    Skip,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "abort" | "fail" => Ok(Self::Abort),
            "skip" | "continue" => Ok(Self::Skip),
            other => Err(format!("invalid failure policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ViewerConfig {
    pub version: u32,
    #[serde(default)]
    pub render: RenderSettings,
    #[serde(default)]
    pub loader: LoaderSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub shaders: ShaderSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Physical spacing between neighbouring cameras, in scene units.
    pub camera_gap: f32,
    /// Disparity offset at which the raw views are already registered.
    pub baseline: f32,
    pub aperture: f32,
    pub focus: f32,
    pub background: [f32; 4],
    pub grid_overlay: bool,
    pub head_tracking_scale: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            camera_gap: 0.1,
            baseline: 1.0,
            aperture: 0.0,
            focus: 1.0,
            background: [0.0, 0.0, 0.0, 1.0],
            grid_overlay: false,
            head_tracking_scale: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoaderSettings {
    pub on_error: FailurePolicy,
    pub retries: u32,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub retry_delay: Duration,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub timeout: Duration,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            on_error: FailurePolicy::Abort,
            retries: 0,
            retry_delay: default_retry_delay(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    pub base_url: String,
    pub results_path: String,
    pub rating_scale_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/".into(),
            results_path: "api/write_light_field_results".into(),
            rating_scale_path: "api/getACR_Scale/".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ShaderSettings {
    /// Directory holding `vertex.wgsl` and `fragment.wgsl`; embedded shaders otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(250)
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl ViewerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: ViewerConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Default configuration with the current schema version.
    pub fn current() -> Self {
        Self {
            version: 1,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        let render = &self.render;
        if !(render.camera_gap > 0.0) {
            return Err(ConfigError::Invalid(
                "render.camera_gap must be greater than zero".into(),
            ));
        }
        if !(render.baseline > 0.0) {
            return Err(ConfigError::Invalid(
                "render.baseline must be greater than zero".into(),
            ));
        }
        if !(render.aperture >= 0.0) {
            return Err(ConfigError::Invalid("render.aperture must be >= 0".into()));
        }
        if !(render.focus > 0.0) {
            return Err(ConfigError::Invalid(
                "render.focus must be greater than zero".into(),
            ));
        }
        if !(render.head_tracking_scale > 0.0) {
            return Err(ConfigError::Invalid(
                "render.head_tracking_scale must be greater than zero".into(),
            ));
        }
        if let Some(component) = render
            .background
            .iter()
            .find(|value| !(0.0..=1.0).contains(*value))
        {
            return Err(ConfigError::Invalid(format!(
                "render.background component {component} is outside [0, 1]"
            )));
        }

        if self.loader.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "loader.timeout must be greater than zero".into(),
            ));
        }

        if self.server.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "server.base_url may not be empty".into(),
            ));
        }

        Ok(())
    }
}
