use std::{env, path::PathBuf, str::FromStr};

use anyhow::{Context, Result, anyhow};

use crate::overlay::VideoGravity;

pub const DEFAULT_PREFERRED_CAMERA: &str = "Razer Kiyo Pro";

const ENV_CAMERA: &str = "HAND_POSE_CAMERA";
const ENV_MAX_HANDS: &str = "HAND_POSE_MAX_HANDS";
const ENV_MODEL_DIR: &str = "HAND_POSE_MODEL_DIR";
const ENV_SAMPLE_SCALE: &str = "HAND_POSE_SAMPLE_SCALE";
const ENV_GRAVITY: &str = "HAND_POSE_GRAVITY";

#[derive(Clone, Debug, PartialEq)]
pub struct PreviewConfig {
    /// Exact device label preferred over the default front camera.
    pub preferred_camera: String,
    pub max_hands: usize,
    pub min_hand_confidence: f32,
    pub sample_scale: f32,
    pub analysis_width: u32,
    pub analysis_height: u32,
    pub model_dir: PathBuf,
    pub gravity: VideoGravity,
    pub marker_radius: f32,
    pub marker_color: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            preferred_camera: DEFAULT_PREFERRED_CAMERA.to_string(),
            max_hands: 2,
            min_hand_confidence: 0.2,
            sample_scale: 0.5,
            analysis_width: 640,
            analysis_height: 480,
            model_dir: PathBuf::from("models"),
            gravity: VideoGravity::ResizeAspectFill,
            marker_radius: 5.0,
            marker_color: 0xff9500,
        }
    }
}

impl PreviewConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Applies overrides from `lookup` on top of the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup(ENV_CAMERA) {
            config.preferred_camera = name;
        }
        if let Some(raw) = lookup(ENV_MAX_HANDS) {
            let max_hands: usize = parse_value(ENV_MAX_HANDS, &raw)?;
            if max_hands == 0 {
                return Err(anyhow!("{ENV_MAX_HANDS} must be at least 1"));
            }
            config.max_hands = max_hands;
        }
        if let Some(dir) = lookup(ENV_MODEL_DIR) {
            config.model_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(ENV_SAMPLE_SCALE) {
            let scale: f32 = parse_value(ENV_SAMPLE_SCALE, &raw)?;
            if !(scale > 0.0 && scale <= 1.0) {
                return Err(anyhow!("{ENV_SAMPLE_SCALE} must be in (0, 1], got {scale}"));
            }
            config.sample_scale = scale;
        }
        if let Some(raw) = lookup(ENV_GRAVITY) {
            config.gravity = parse_value(ENV_GRAVITY, &raw)?;
        }

        Ok(config)
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("invalid value {raw:?} for {key}"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_capture_pipeline() {
        let config = PreviewConfig::default();
        assert_eq!(config.preferred_camera, "Razer Kiyo Pro");
        assert_eq!(config.max_hands, 2);
        assert_eq!(config.sample_scale, 0.5);
        assert_eq!((config.analysis_width, config.analysis_height), (640, 480));
        assert_eq!(config.gravity, VideoGravity::ResizeAspectFill);
    }

    #[test]
    fn overrides_are_applied() {
        let config = PreviewConfig::from_lookup(lookup_from(&[
            (ENV_CAMERA, "Logitech BRIO"),
            (ENV_MAX_HANDS, "1"),
            (ENV_MODEL_DIR, "/opt/models"),
            (ENV_GRAVITY, "fit"),
        ]))
        .unwrap();
        assert_eq!(config.preferred_camera, "Logitech BRIO");
        assert_eq!(config.max_hands, 1);
        assert_eq!(config.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(config.gravity, VideoGravity::ResizeAspect);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(PreviewConfig::from_lookup(lookup_from(&[(ENV_MAX_HANDS, "two")])).is_err());
        assert!(PreviewConfig::from_lookup(lookup_from(&[(ENV_MAX_HANDS, "0")])).is_err());
        assert!(PreviewConfig::from_lookup(lookup_from(&[(ENV_SAMPLE_SCALE, "1.5")])).is_err());
        assert!(PreviewConfig::from_lookup(lookup_from(&[(ENV_GRAVITY, "zoom")])).is_err());
    }
}
