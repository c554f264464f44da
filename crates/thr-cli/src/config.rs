//! Configuration loading – reads the scene description from `thr.toml`.
//!
//! The file holds a [`SceneConfig`] at its top level plus optional
//! `[[static_frames]]` used to seed the in-process transform graph:
//!
//! ```toml
//! rate_hz = 20.0
//!
//! [[objects]]
//! name = "/toolbox/handle"
//!
//! [[static_frames]]
//! parent = "base"
//! child = "/toolbox/handle"
//! pose = { translation = [0.6, 0.0, 0.1], rotation = [1.0, 0.0, 0.0, 0.0] }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thr_perception::{TfGateway, Transform3D};
use thr_scene::SceneConfig;

pub const DEFAULT_CONFIG_FILE: &str = "thr.toml";

/// A fixed edge of the transform graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticFrame {
    pub parent: String,
    pub child: String,
    pub pose: Transform3D,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub scene: SceneConfig,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_frames: Vec<StaticFrame>,
}

impl Config {
    /// Insert every static frame into `gateway`.
    pub fn seed(&self, gateway: &TfGateway) {
        for frame in &self.static_frames {
            gateway.set_transform(&frame.parent, &frame.child, frame.pose);
        }
    }
}

/// Resolve the config path: `--config` first, then `THR_CONFIG`, then
/// `./thr.toml`.
pub fn config_path(cli_arg: Option<&str>) -> PathBuf {
    resolve_path(cli_arg, std::env::var("THR_CONFIG").ok().as_deref())
}

pub(crate) fn resolve_path(cli_arg: Option<&str>, env: Option<&str>) -> PathBuf {
    cli_arg
        .or(env)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `THR_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `THR_RATE_HZ` | `rate_hz` |
/// | `THR_WORLD_FRAME` | `world_frame` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("THR_RATE_HZ")
        && let Ok(rate) = v.parse::<f64>()
    {
        cfg.scene.rate_hz = rate;
    }
    if let Ok(v) = std::env::var("THR_WORLD_FRAME")
        && !v.is_empty()
    {
        cfg.scene.world_frame = v;
    }
}
