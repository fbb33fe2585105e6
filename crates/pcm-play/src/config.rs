//! Config loading for the `pcm-play` CLI.

use std::path::Path;

use anyhow::{Context, Result};
use pcm_player::EngineConfig;
use serde::Deserialize;

use crate::cli::Args;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayConfig {
    pub device: Option<String>,
    pub chunk_bytes: usize,
    pub volume: f32,
    pub lead_seconds: f32,
    /// Device callback size; `None` lets the device choose.
    pub buffer_frames: Option<u32>,
    pub engine: EngineConfig,
}

impl Default for PlayConfig {
    fn default() -> Self {
        Self {
            device: None,
            chunk_bytes: 16 * 1024,
            volume: 1.0,
            lead_seconds: 0.5,
            buffer_frames: None,
            engine: EngineConfig::default(),
        }
    }
}

impl PlayConfig {
    /// Load the file named by `--config` (if any) and apply CLI overrides on top.
    pub fn resolve(args: &Args) -> Result<Self> {
        let mut cfg = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(device) = &args.device {
            cfg.device = Some(device.clone());
        }
        if let Some(bytes) = args.chunk_bytes {
            cfg.chunk_bytes = bytes;
        }
        if let Some(volume) = args.volume {
            cfg.volume = volume;
        }
        if let Some(lead) = args.lead_seconds {
            cfg.lead_seconds = lead;
        }
        if let Some(frames) = args.buffer_frames {
            cfg.buffer_frames = Some(frames);
        }
        cfg.engine.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        toml::from_str(&raw).with_context(|| format!("parse config {:?}", path))
    }
}
