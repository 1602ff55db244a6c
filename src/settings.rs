use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Informal prompt length cap enforced by the UI, not by the backend.
pub const MAX_PROMPT_LEN: usize = 2000;

/// Upper bound for a LoRA strength value.
pub const LORA_STRENGTH_MAX: f64 = 1.5;

/// Fixed default negative prompt used to suppress common visual artifacts.
pub const DEFAULT_NEGATIVE_PROMPT: &str = "lowres, bad anatomy, bad hands, text, error, \
missing fingers, extra digit, fewer digits, cropped, worst quality, low quality, \
normal quality, jpeg artifacts, signature, watermark, username, blurry, deformed, \
disfigured, extra limbs, mutated hands, poorly drawn face, poorly drawn hands, \
bad proportions, malformed limbs, out of frame";

/// Output size preset. `Custom` defers to `custom_width`/`custom_height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSize {
    #[serde(rename = "1024x1024")]
    Square,
    #[serde(rename = "832x1216")]
    Portrait,
    #[serde(rename = "1216x832")]
    Landscape,
    #[serde(rename = "custom")]
    Custom,
}

impl ImageSize {
    /// Preset dimensions, or `None` for `Custom`.
    pub fn dimensions(self) -> Option<(u32, u32)> {
        match self {
            ImageSize::Square => Some((1024, 1024)),
            ImageSize::Portrait => Some((832, 1216)),
            ImageSize::Landscape => Some((1216, 832)),
            ImageSize::Custom => None,
        }
    }
}

/// Whether a LoRA-related value is chosen automatically or by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoraMode {
    Auto,
    Manual,
}

/// Strength applied to one selected LoRA.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoraStrength {
    pub mode: LoraMode,
    pub value: f64,
}

impl Default for LoraStrength {
    fn default() -> Self {
        Self {
            mode: LoraMode::Auto,
            value: 1.0,
        }
    }
}

/// User-controlled parameters for one generation request.
///
/// Invariant: `selected_loras` and `lora_strengths.keys()` are always the
/// same set. Entries are inserted and removed together by the session; this
/// struct never mutates them independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    pub prompt: String,
    pub negative_prompt: String,
    pub image_size: ImageSize,
    pub custom_width: u32,
    pub custom_height: u32,
    pub batch_count: u32,
    pub selected_loras: Vec<String>,
    pub lora_strengths: HashMap<String, LoraStrength>,
    pub lora_selection_mode: LoraMode,
    pub optimize_prompt: bool,
    pub is_public: bool,
    pub cfg_scale: f64,
    pub steps: u32,
    pub seed: Option<i64>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
            image_size: ImageSize::Square,
            custom_width: 1024,
            custom_height: 1024,
            batch_count: 1,
            selected_loras: Vec::new(),
            lora_strengths: HashMap::new(),
            lora_selection_mode: LoraMode::Auto,
            optimize_prompt: true,
            is_public: true,
            cfg_scale: 4.5,
            steps: 30,
            seed: None,
        }
    }
}

impl GenerationSettings {
    /// Effective output dimensions, resolving the active preset.
    pub fn resolved_dimensions(&self) -> (u32, u32) {
        self.image_size
            .dimensions()
            .unwrap_or((self.custom_width, self.custom_height))
    }

    /// Apply a single-field update. Returns `true` when the prompt field
    /// changed, so the caller can reset the prompt-optimization cache.
    pub fn apply(&mut self, update: SettingsUpdate) -> bool {
        match update {
            SettingsUpdate::Prompt(v) => {
                self.prompt = v;
                return true;
            }
            SettingsUpdate::NegativePrompt(v) => self.negative_prompt = v,
            SettingsUpdate::ImageSize(v) => {
                self.image_size = v;
                // Non-custom presets mirror their dimensions into the custom
                // fields so the two stay mutually consistent.
                if let Some((w, h)) = v.dimensions() {
                    self.custom_width = w;
                    self.custom_height = h;
                }
            }
            SettingsUpdate::CustomWidth(v) => self.custom_width = v,
            SettingsUpdate::CustomHeight(v) => self.custom_height = v,
            SettingsUpdate::BatchCount(v) => self.batch_count = v,
            SettingsUpdate::LoraSelectionMode(v) => self.lora_selection_mode = v,
            SettingsUpdate::OptimizePrompt(v) => self.optimize_prompt = v,
            SettingsUpdate::IsPublic(v) => self.is_public = v,
            SettingsUpdate::CfgScale(v) => self.cfg_scale = v,
            SettingsUpdate::Steps(v) => self.steps = v,
            SettingsUpdate::Seed(v) => self.seed = v,
        }
        false
    }

    /// Restore the fixed default record.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A single-field settings update. Exactly one field changes per application.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsUpdate {
    Prompt(String),
    NegativePrompt(String),
    ImageSize(ImageSize),
    CustomWidth(u32),
    CustomHeight(u32),
    BatchCount(u32),
    LoraSelectionMode(LoraMode),
    OptimizePrompt(bool),
    IsPublic(bool),
    CfgScale(f64),
    Steps(u32),
    Seed(Option<i64>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = GenerationSettings::default();
        assert!(settings.prompt.is_empty());
        assert_eq!(settings.negative_prompt, DEFAULT_NEGATIVE_PROMPT);
        assert_eq!(settings.image_size, ImageSize::Square);
        assert_eq!(settings.custom_width, 1024);
        assert_eq!(settings.custom_height, 1024);
        assert_eq!(settings.batch_count, 1);
        assert!(settings.selected_loras.is_empty());
        assert!(settings.lora_strengths.is_empty());
        assert_eq!(settings.lora_selection_mode, LoraMode::Auto);
        assert!(settings.optimize_prompt);
        assert!(settings.is_public);
        assert_eq!(settings.cfg_scale, 4.5);
        assert_eq!(settings.steps, 30);
        assert!(settings.seed.is_none());
    }

    #[test]
    fn test_preset_mirrors_custom_dimensions() {
        let mut settings = GenerationSettings::default();
        settings.apply(SettingsUpdate::ImageSize(ImageSize::Portrait));
        assert_eq!(settings.custom_width, 832);
        assert_eq!(settings.custom_height, 1216);
        assert_eq!(settings.resolved_dimensions(), (832, 1216));
    }

    #[test]
    fn test_custom_dimensions_used_when_custom() {
        let mut settings = GenerationSettings::default();
        settings.apply(SettingsUpdate::ImageSize(ImageSize::Custom));
        settings.apply(SettingsUpdate::CustomWidth(640));
        settings.apply(SettingsUpdate::CustomHeight(480));
        assert_eq!(settings.resolved_dimensions(), (640, 480));
    }

    #[test]
    fn test_prompt_update_signals_cache_reset() {
        let mut settings = GenerationSettings::default();
        assert!(settings.apply(SettingsUpdate::Prompt("a cat".into())));
        assert!(!settings.apply(SettingsUpdate::Steps(20)));
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut settings = GenerationSettings::default();
        settings.apply(SettingsUpdate::Prompt("x".into()));
        settings.apply(SettingsUpdate::BatchCount(8));
        settings.apply(SettingsUpdate::CfgScale(9.0));
        settings.reset();
        assert_eq!(settings, GenerationSettings::default());
    }

    #[test]
    fn test_image_size_wire_format() {
        assert_eq!(
            serde_json::to_string(&ImageSize::Square).unwrap(),
            "\"1024x1024\""
        );
        assert_eq!(
            serde_json::to_string(&ImageSize::Custom).unwrap(),
            "\"custom\""
        );
        let size: ImageSize = serde_json::from_str("\"832x1216\"").unwrap();
        assert_eq!(size, ImageSize::Portrait);
    }

    #[test]
    fn test_settings_roundtrip() {
        let mut settings = GenerationSettings::default();
        settings.selected_loras.push("style-ink".to_string());
        settings
            .lora_strengths
            .insert("style-ink".to_string(), LoraStrength::default());
        let json = serde_json::to_string(&settings).unwrap();
        let back: GenerationSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }
}
