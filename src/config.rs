use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::capture::{CameraTiming, SimulatedLatency, DEFAULT_PICTURE_EXTENSION};
use crate::displacement::threshold_from_fov;
use crate::velocity::SyntheticVelocityConfig;

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_PICTURES_DIR: &str = "pictures";
const DEFAULT_SAMPLE_RATE_HZ: f64 = 50.0;
const DEFAULT_BASE_VELOCITY: f64 = 30.0;
const DEFAULT_JITTER_VELOCITY: f64 = 2.0;
const DEFAULT_SPIKE_PROBABILITY: f64 = 0.02;
const DEFAULT_CYCLE_PERIOD_MS: u64 = 2000;
const DEFAULT_FOV_CM: f64 = 25.0;
const DEFAULT_SMOOTHING_WINDOW: usize = crate::conditioning::DEFAULT_SMOOTHING_WINDOW;
const DEFAULT_OPEN_BASE_MS: u64 = 1000;
const DEFAULT_OPEN_JITTER_MS: u64 = 500;
const DEFAULT_COLLECT_BASE_MS: u64 = 4000;
const DEFAULT_COLLECT_JITTER_MS: u64 = 1000;
const DEFAULT_QUEUE_CAPACITY: usize = 32;
const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Deserialize, Default)]
struct WeavingConfigFile {
    server_url: Option<String>,
    pictures: Option<PicturesConfigFile>,
    sampling: Option<SamplingConfigFile>,
    surface: Option<SurfaceConfigFile>,
    cameras: Option<CamerasConfigFile>,
    delivery: Option<DeliveryConfigFile>,
    log_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct PicturesConfigFile {
    dir: Option<PathBuf>,
    extension: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplingConfigFile {
    rate_hz: Option<f64>,
    base_velocity_cm_per_min: Option<f64>,
    jitter_cm_per_min: Option<f64>,
    spike_probability: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct SurfaceConfigFile {
    cycle_period_ms: Option<u64>,
    camera_vertical_fov_cm: Option<f64>,
    smoothing_window: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct CamerasConfigFile {
    open_base_ms: Option<u64>,
    open_jitter_ms: Option<u64>,
    collect_base_ms: Option<u64>,
    collect_jitter_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DeliveryConfigFile {
    queue_capacity: Option<usize>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct WeavingConfig {
    pub server_url: String,
    pub pictures: PictureSettings,
    pub sampling: SamplingSettings,
    pub surface: SurfaceSettings,
    pub cameras: CameraTiming,
    pub delivery: DeliverySettings,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PictureSettings {
    pub dir: PathBuf,
    pub extension: String,
}

#[derive(Debug, Clone)]
pub struct SamplingSettings {
    pub rate_hz: f64,
    pub base_velocity_cm_per_min: f64,
    pub jitter_cm_per_min: f64,
    pub spike_probability: f64,
}

#[derive(Debug, Clone)]
pub struct SurfaceSettings {
    pub cycle_period: Duration,
    pub camera_vertical_fov_cm: f64,
    pub smoothing_window: usize,
}

#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub queue_capacity: usize,
    pub timeout: Duration,
}

impl Default for WeavingConfig {
    fn default() -> Self {
        Self::from_file(WeavingConfigFile::default())
    }
}

impl WeavingConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WEAVING_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: WeavingConfigFile) -> Self {
        let server_url = file
            .server_url
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let pictures = PictureSettings {
            dir: file
                .pictures
                .as_ref()
                .and_then(|pictures| pictures.dir.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PICTURES_DIR)),
            extension: file
                .pictures
                .and_then(|pictures| pictures.extension)
                .unwrap_or_else(|| DEFAULT_PICTURE_EXTENSION.to_string()),
        };
        let sampling = file.sampling.unwrap_or_default();
        let sampling = SamplingSettings {
            rate_hz: sampling.rate_hz.unwrap_or(DEFAULT_SAMPLE_RATE_HZ),
            base_velocity_cm_per_min: sampling
                .base_velocity_cm_per_min
                .unwrap_or(DEFAULT_BASE_VELOCITY),
            jitter_cm_per_min: sampling
                .jitter_cm_per_min
                .unwrap_or(DEFAULT_JITTER_VELOCITY),
            spike_probability: sampling
                .spike_probability
                .unwrap_or(DEFAULT_SPIKE_PROBABILITY),
        };
        let surface = file.surface.unwrap_or_default();
        let surface = SurfaceSettings {
            cycle_period: Duration::from_millis(
                surface.cycle_period_ms.unwrap_or(DEFAULT_CYCLE_PERIOD_MS),
            ),
            camera_vertical_fov_cm: surface.camera_vertical_fov_cm.unwrap_or(DEFAULT_FOV_CM),
            smoothing_window: surface.smoothing_window.unwrap_or(DEFAULT_SMOOTHING_WINDOW),
        };
        let cameras = file.cameras.unwrap_or_default();
        let cameras = CameraTiming {
            open: SimulatedLatency::new(
                Duration::from_millis(cameras.open_base_ms.unwrap_or(DEFAULT_OPEN_BASE_MS)),
                Duration::from_millis(cameras.open_jitter_ms.unwrap_or(DEFAULT_OPEN_JITTER_MS)),
            ),
            collect: SimulatedLatency::new(
                Duration::from_millis(cameras.collect_base_ms.unwrap_or(DEFAULT_COLLECT_BASE_MS)),
                Duration::from_millis(
                    cameras
                        .collect_jitter_ms
                        .unwrap_or(DEFAULT_COLLECT_JITTER_MS),
                ),
            ),
        };
        let delivery = file.delivery.unwrap_or_default();
        let delivery = DeliverySettings {
            queue_capacity: delivery.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
            timeout: Duration::from_millis(
                delivery.timeout_ms.unwrap_or(DEFAULT_DELIVERY_TIMEOUT_MS),
            ),
        };
        Self {
            server_url,
            pictures,
            sampling,
            surface,
            cameras,
            delivery,
            log_file: file.log_file,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("WEAVING_SERVER_URL") {
            if !url.trim().is_empty() {
                self.server_url = url.trim().to_string();
            }
        }
        if let Ok(dir) = std::env::var("WEAVING_PICTURES_DIR") {
            if !dir.trim().is_empty() {
                self.pictures.dir = PathBuf::from(dir);
            }
        }
        if let Ok(rate) = std::env::var("WEAVING_SAMPLE_RATE_HZ") {
            if !rate.trim().is_empty() {
                self.sampling.rate_hz = rate
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("WEAVING_SAMPLE_RATE_HZ must be a number"))?;
            }
        }
        if let Ok(period) = std::env::var("WEAVING_CYCLE_PERIOD_MS") {
            if !period.trim().is_empty() {
                let millis: u64 = period.trim().parse().map_err(|_| {
                    anyhow!("WEAVING_CYCLE_PERIOD_MS must be an integer number of milliseconds")
                })?;
                self.surface.cycle_period = Duration::from_millis(millis);
            }
        }
        if let Ok(path) = std::env::var("WEAVING_LOG_FILE") {
            if !path.trim().is_empty() {
                self.log_file = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.server_url)
            .map_err(|e| anyhow!("invalid server_url '{}': {}", self.server_url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!("server_url must use http or https"));
        }
        if self.pictures.extension.trim().is_empty() {
            return Err(anyhow!("pictures.extension must not be empty"));
        }
        if !(self.sampling.rate_hz.is_finite() && self.sampling.rate_hz > 0.0) {
            return Err(anyhow!("sampling.rate_hz must be greater than zero"));
        }
        if !self.sampling.base_velocity_cm_per_min.is_finite() {
            return Err(anyhow!("sampling.base_velocity_cm_per_min must be a finite number"));
        }
        if !(self.sampling.jitter_cm_per_min.is_finite() && self.sampling.jitter_cm_per_min >= 0.0)
        {
            return Err(anyhow!(
                "sampling.jitter_cm_per_min must be finite and not negative"
            ));
        }
        if !(0.0..=1.0).contains(&self.sampling.spike_probability) {
            return Err(anyhow!("sampling.spike_probability must be within [0, 1]"));
        }
        if self.surface.cycle_period.is_zero() {
            return Err(anyhow!("surface.cycle_period_ms must be greater than zero"));
        }
        if !(self.surface.camera_vertical_fov_cm.is_finite()
            && self.surface.camera_vertical_fov_cm > 0.0)
        {
            return Err(anyhow!("surface.camera_vertical_fov_cm must be greater than zero"));
        }
        if self.surface.smoothing_window == 0 {
            return Err(anyhow!("surface.smoothing_window must be greater than zero"));
        }
        if self.delivery.queue_capacity == 0 {
            return Err(anyhow!("delivery.queue_capacity must be greater than zero"));
        }
        Ok(())
    }

    /// Capture threshold in cm.
    pub fn displacement_threshold_cm(&self) -> f64 {
        threshold_from_fov(self.surface.camera_vertical_fov_cm)
    }

    pub fn velocity_config(&self) -> SyntheticVelocityConfig {
        SyntheticVelocityConfig {
            base_cm_per_min: self.sampling.base_velocity_cm_per_min,
            jitter_cm_per_min: self.sampling.jitter_cm_per_min,
            spike_probability: self.sampling.spike_probability,
            seed: None,
        }
    }
}

fn read_config_file(path: &Path) -> Result<WeavingConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
