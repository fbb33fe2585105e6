use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Engine tuning shared by every player created from a registry.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Frames rendered per scratch block inside one callback.
    pub max_callback_frames: usize,
    /// Queued audio (seconds) above which a backlog warning is logged; `0` disables it.
    pub high_watermark_seconds: f32,
    /// Capacity of the channel returning consumed chunks to the control path.
    pub spent_chunk_slots: usize,
    /// Upper bound of the gain range; `set_volume` clamps into `[0.0, max_volume]`.
    pub max_volume: f32,
    /// Bound on waiting for an in-flight render callback during release.
    pub release_timeout_ms: u64,
}

impl Default for EngineConfig {
    /// Defaults tuned for low-risk playback across common devices.
    fn default() -> Self {
        Self {
            max_callback_frames: 4096,
            high_watermark_seconds: 10.0,
            spent_chunk_slots: 64,
            max_volume: 1.0,
            release_timeout_ms: 500,
        }
    }
}

impl EngineConfig {
    /// Load engine settings from a TOML file; missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::from_toml(&raw).with_context(|| format!("parse config {:?}", path))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let cfg = toml::from_str::<EngineConfig>(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_callback_frames == 0 {
            anyhow::bail!("max_callback_frames must be > 0");
        }
        if !self.max_volume.is_finite() || self.max_volume <= 0.0 {
            anyhow::bail!("max_volume must be a positive number");
        }
        if !self.high_watermark_seconds.is_finite() || self.high_watermark_seconds < 0.0 {
            anyhow::bail!("high_watermark_seconds must be >= 0");
        }
        Ok(())
    }

    /// Clamp a requested gain into the supported range.
    pub fn clamp_volume(&self, gain: f32) -> f32 {
        gain.clamp(0.0, self.max_volume)
    }
}
