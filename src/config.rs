use serde::{Deserialize, Serialize};

use crate::convert::ToneOperator;
use crate::env_config;

/// Default SDR white point used when tone mapping HDR content, in nits.
pub const DEFAULT_SDR_BRIGHTNESS_NITS: f32 = 200.0;

pub const DEFAULT_CAPTURE_RETRY_COUNT: u32 = 3;
pub const MIN_CAPTURE_RETRY_COUNT: u32 = 1;
pub const MAX_CAPTURE_RETRY_COUNT: u32 = 10;

/// Capture settings as they appear in the externally-owned settings file.
/// Field names serialize in the file's camelCase spelling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptureConfig {
    /// Target brightness for tone-mapped HDR content, in nits.
    pub sdr_brightness: f32,
    /// Select the ACES filmic curve instead of Reinhard.
    #[serde(rename = "useACESFilmToneMapping")]
    pub use_aces_film_tone_mapping: bool,
    /// Capture attempts per request before falling back.
    pub capture_retry_count: u32,
    /// Emit per-capture diagnostics (format, HDR decision, outcome).
    pub debug_mode: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sdr_brightness: DEFAULT_SDR_BRIGHTNESS_NITS,
            use_aces_film_tone_mapping: false,
            capture_retry_count: DEFAULT_CAPTURE_RETRY_COUNT,
            debug_mode: false,
        }
    }
}

impl CaptureConfig {
    /// Clamp every field into its supported range. Out-of-range values
    /// come from hand-edited settings files and must never panic or
    /// produce a zero-retry capturer.
    pub fn sanitized(&self) -> Self {
        let sdr_brightness = if self.sdr_brightness.is_finite() && self.sdr_brightness > 0.0 {
            self.sdr_brightness
        } else {
            DEFAULT_SDR_BRIGHTNESS_NITS
        };
        Self {
            sdr_brightness,
            use_aces_film_tone_mapping: self.use_aces_film_tone_mapping,
            capture_retry_count: self
                .capture_retry_count
                .clamp(MIN_CAPTURE_RETRY_COUNT, MAX_CAPTURE_RETRY_COUNT),
            debug_mode: self.debug_mode,
        }
    }

    /// Apply diagnostic environment overrides on top of the file-provided
    /// values. Returns the overridden copy; the input is untouched.
    pub fn with_env_overrides(&self) -> Self {
        let mut config = self.clone();
        if env_config::env_var_truthy("LUMICAP_DEBUG") {
            config.debug_mode = true;
        }
        if let Some(count) = env_config::env_var_positive_u32("LUMICAP_RETRY_COUNT") {
            config.capture_retry_count = count;
        }
        if let Some(nits) = env_config::env_var_positive_f32("LUMICAP_SDR_NITS") {
            config.sdr_brightness = nits;
        }
        config
    }

    pub fn tone_operator(&self) -> ToneOperator {
        if self.use_aces_film_tone_mapping {
            ToneOperator::AcesFilmic
        } else {
            ToneOperator::Reinhard
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_documented_camel_case_keys() {
        let json = r#"{
            "sdrBrightness": 250.0,
            "useACESFilmToneMapping": true,
            "captureRetryCount": 5,
            "debugMode": true
        }"#;

        let config: CaptureConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.sdr_brightness, 250.0);
        assert!(config.use_aces_film_tone_mapping);
        assert_eq!(config.capture_retry_count, 5);
        assert!(config.debug_mode);
        assert_eq!(config.tone_operator(), ToneOperator::AcesFilmic);
    }

    #[test]
    fn serializes_the_aces_key_with_its_odd_capitalization() {
        let json = serde_json::to_string(&CaptureConfig::default()).unwrap();
        assert!(json.contains("\"useACESFilmToneMapping\""));
        assert!(json.contains("\"sdrBrightness\""));
        assert!(json.contains("\"captureRetryCount\""));
        assert!(json.contains("\"debugMode\""));
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config: CaptureConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CaptureConfig::default());
        assert_eq!(config.tone_operator(), ToneOperator::Reinhard);
    }

    #[test]
    fn sanitize_clamps_retry_count_at_both_ends() {
        let mut config = CaptureConfig {
            capture_retry_count: 0,
            ..CaptureConfig::default()
        };
        assert_eq!(config.sanitized().capture_retry_count, 1);

        config.capture_retry_count = 99;
        assert_eq!(config.sanitized().capture_retry_count, 10);

        config.capture_retry_count = 7;
        assert_eq!(config.sanitized().capture_retry_count, 7);
    }

    #[test]
    fn sanitize_replaces_unusable_brightness() {
        for bad in [f32::NAN, f32::INFINITY, 0.0, -80.0] {
            let config = CaptureConfig {
                sdr_brightness: bad,
                ..CaptureConfig::default()
            };
            assert_eq!(config.sanitized().sdr_brightness, DEFAULT_SDR_BRIGHTNESS_NITS);
        }
    }
}
