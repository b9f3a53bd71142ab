//! Configuration management for the capture engine
//!
//! Every threshold the scorers use is tunable here. Values ship with the
//! defaults observed to work on ID-1 cards under phone cameras; they are
//! expected to be re-tuned per target hardware.

use crate::errors::CaptureError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IdCaptureConfig {
    pub readiness: ReadinessConfig,
    pub ovd: OvdConfig,
    pub motion: MotionConfig,
    pub mrz: MrzConfig,
    pub guide: GuideConfig,
    pub detector: DetectorConfig,
    pub flow: FlowConfig,
}

/// Front/back readiness gates and hysteresis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Accepted short/long side ratio of the detected document
    pub aspect_min: f32,
    pub aspect_max: f32,
    /// Accepted fraction of the guide covered by the document
    pub coverage_min: f32,
    pub coverage_max: f32,
    /// Hysteresis counter ceiling
    pub score_max: u32,
    /// Score needed before a frame may fire
    pub fire_threshold: u32,
    /// Minimum seconds between two fires of the same step
    pub cooldown_secs: f64,
    /// Continuous stillness required before front/back capture
    pub required_stable_secs: f64,
    /// Sharpness floor at full coverage
    pub sharpness_base: f32,
    /// Extra sharpness demanded per unit of missing coverage below the knee
    pub sharpness_slope: f32,
    pub sharpness_knee: f32,
    /// Score bonus per frame while the MRZ probe reports presence (back step)
    pub mrz_bonus: u32,
}

/// OVD hologram detector thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OvdConfig {
    /// Run the OVD step between front and back
    pub enabled: bool,
    pub rainbow_abs_floor: f32,
    pub rainbow_rise_floor: f32,
    pub min_bins: u8,
    pub chroma_abs_floor: f32,
    pub chroma_rise_floor: f32,
    /// Hold increment on a passing frame (decay is always 1)
    pub hold_step: u32,
    pub hold_max: u32,
    pub hold_fire: u32,
    /// Seconds after step entry before a hit is allowed
    pub min_dwell_secs: f64,
    pub torch_level: f32,
}

/// Device-motion stability thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub sample_interval_secs: f64,
    /// Summed |rotation rate| (rad/s) below which the device counts as still
    pub still_rotation: f64,
    /// Summed |user acceleration| (g) below which the device counts as still
    pub still_acceleration: f64,
    pub moving_rotation: f64,
    pub moving_acceleration: f64,
    pub movement_max: u32,
    /// Movement score at which the device is reported as moving
    pub moving_score: u32,
}

/// MRZ presence probe heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MrzConfig {
    /// Lower fraction of the guide ROI scanned for MRZ text
    pub band_fraction: f32,
    pub chevrons_strong: usize,
    pub chevrons_weak: usize,
    /// Three-letter issuing-state tokens accepted as a country code
    pub country_codes: Vec<String>,
}

/// On-screen guide geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuideConfig {
    /// Preview view size in points; `None` uses the default centred ROI
    pub view_width: Option<f32>,
    pub view_height: Option<f32>,
    pub margin: f32,
    pub max_height_fraction: f32,
    pub default_width_fraction: f32,
}

/// Filters handed to the rectangle detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub min_aspect: f32,
    pub min_size: f32,
    pub quadrature_tolerance: f32,
    pub min_confidence: f32,
    /// Minimum share of the crop a quad must cover before the shot is rectified
    pub min_rectify_area_ratio: f32,
}

/// Pipeline cadence and hand-off settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Minimum spacing between two geometry analyses
    pub analysis_interval_secs: f64,
    /// Verification flag hold after an outcome arrives
    pub settle_delay_secs: f64,
    pub jpeg_quality: u8,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            aspect_min: 0.45,
            aspect_max: 0.78,
            coverage_min: 0.40,
            coverage_max: 1.05,
            score_max: 15,
            fire_threshold: 8,
            cooldown_secs: 1.0,
            required_stable_secs: 0.6,
            sharpness_base: 0.0035,
            sharpness_slope: 0.001,
            sharpness_knee: 0.8,
            mrz_bonus: 2,
        }
    }
}

impl Default for OvdConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rainbow_abs_floor: 0.055,
            rainbow_rise_floor: 0.030,
            min_bins: 4,
            chroma_abs_floor: 0.022,
            chroma_rise_floor: 0.006,
            hold_step: 1,
            hold_max: 12,
            hold_fire: 4,
            min_dwell_secs: 0.8,
            torch_level: 0.6,
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: 1.0 / 60.0,
            still_rotation: 0.5,
            still_acceleration: 0.05,
            moving_rotation: 0.8,
            moving_acceleration: 0.08,
            movement_max: 10,
            moving_score: 3,
        }
    }
}

impl Default for MrzConfig {
    fn default() -> Self {
        Self {
            band_fraction: 0.45,
            chevrons_strong: 10,
            chevrons_weak: 6,
            country_codes: vec!["TUR".to_string()],
        }
    }
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            view_width: None,
            view_height: None,
            margin: 24.0,
            max_height_fraction: 0.45,
            default_width_fraction: 0.6,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_aspect: 0.5,
            min_size: 0.04,
            quadrature_tolerance: 25.0,
            min_confidence: 0.5,
            min_rectify_area_ratio: 0.25,
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            analysis_interval_secs: 0.18,
            settle_delay_secs: 3.0,
            jpeg_quality: 90,
        }
    }
}

impl IdCaptureConfig {
    /// Load configuration from a TOML file; a missing file yields defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CaptureError::Config(format!("Failed to read config file: {}", e)))?;

        let config: IdCaptureConfig = toml::from_str(&contents)
            .map_err(|e| CaptureError::Config(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load an optional TOML file, then apply `IDCAPTURE__SECTION__KEY` overrides.
    pub fn load_layered<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()).required(false))
            .add_source(
                ::config::Environment::with_prefix("IDCAPTURE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CaptureError::Config(format!("Failed to build config: {}", e)))?;

        let config: IdCaptureConfig = settings
            .try_deserialize()
            .map_err(|e| CaptureError::Config(format!("Failed to deserialize config: {}", e)))?;
        config.validate().map_err(CaptureError::Config)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CaptureError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    CaptureError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CaptureError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| CaptureError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("idcapture.toml")
    }

    /// Load from default location, falling back to defaults on any error
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        let r = &self.readiness;
        if !(0.0..=1.0).contains(&r.aspect_min) || !(0.0..=1.0).contains(&r.aspect_max) {
            return Err("Aspect bounds must be between 0.0 and 1.0".to_string());
        }
        if r.aspect_min > r.aspect_max {
            return Err("aspect_min must not exceed aspect_max".to_string());
        }
        if r.coverage_min < 0.0 || r.coverage_min > r.coverage_max {
            return Err("Coverage bounds must satisfy 0 <= coverage_min <= coverage_max".to_string());
        }
        if r.score_max == 0 || r.fire_threshold == 0 || r.fire_threshold > r.score_max {
            return Err("fire_threshold must be between 1 and score_max".to_string());
        }
        if r.cooldown_secs < 0.0 || r.required_stable_secs < 0.0 {
            return Err("Durations must not be negative".to_string());
        }
        if r.sharpness_base < 0.0 || r.sharpness_slope < 0.0 {
            return Err("Sharpness floor parameters must not be negative".to_string());
        }

        let o = &self.ovd;
        if o.min_bins > 6 {
            return Err("min_bins cannot exceed the 6 hue bins".to_string());
        }
        if o.hold_step == 0 || o.hold_max == 0 || o.hold_fire == 0 || o.hold_fire > o.hold_max {
            return Err("hold_fire must be between 1 and hold_max, hold_step at least 1".to_string());
        }
        if o.min_dwell_secs < 0.0 {
            return Err("min_dwell_secs must not be negative".to_string());
        }
        if !(0.0..=1.0).contains(&o.torch_level) {
            return Err("Torch level must be between 0.0 and 1.0".to_string());
        }

        let m = &self.motion;
        if m.sample_interval_secs <= 0.0 {
            return Err("Motion sample interval must be positive".to_string());
        }
        if m.moving_score > m.movement_max {
            return Err("moving_score must not exceed movement_max".to_string());
        }

        if !(0.05..=1.0).contains(&self.mrz.band_fraction) {
            return Err("MRZ band fraction must be between 0.05 and 1.0".to_string());
        }
        if self.mrz.chevrons_weak > self.mrz.chevrons_strong {
            return Err("chevrons_weak must not exceed chevrons_strong".to_string());
        }
        if self.mrz.country_codes.iter().any(|c| c.len() != 3) {
            return Err("Country codes must be three letters".to_string());
        }

        if !(0.1..=1.0).contains(&self.guide.default_width_fraction) {
            return Err("Default guide width fraction must be between 0.1 and 1.0".to_string());
        }

        if self.flow.jpeg_quality == 0 || self.flow.jpeg_quality > 100 {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }
        if self.flow.analysis_interval_secs < 0.0 || self.flow.settle_delay_secs < 0.0 {
            return Err("Flow delays must not be negative".to_string());
        }

        Ok(())
    }
}
