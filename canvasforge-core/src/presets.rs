//! Saved color and gradient presets for the style editor.

use crate::error::PresetError;
use crate::storage::{load_list, store_list, KeyValueStore};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

pub const COLOR_PRESETS_KEY: &str = "canvasforge.presets.colors";
pub const GRADIENT_PRESETS_KEY: &str = "canvasforge.presets.gradients";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorPreset {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub color: String,
    /// Position along the gradient, 0 to 100.
    pub offset: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientPreset {
    pub name: String,
    /// Degrees.
    pub angle: f64,
    pub stops: Vec<GradientStop>,
}

impl GradientPreset {
    /// CSS `linear-gradient(...)` value, stops sorted by offset.
    pub fn css(&self) -> String {
        let mut stops = self.stops.clone();
        stops.sort_by(|a, b| a.offset.total_cmp(&b.offset));
        let stops: Vec<String> = stops
            .iter()
            .map(|s| format!("{} {}%", s.color, s.offset))
            .collect();
        format!("linear-gradient({}deg, {})", self.angle, stops.join(", "))
    }
}

trait Named {
    fn name(&self) -> &str;
}

impl Named for ColorPreset {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for GradientPreset {
    fn name(&self) -> &str {
        &self.name
    }
}

pub struct PresetStore {
    backend: Arc<dyn KeyValueStore>,
    write: Mutex<()>,
}

impl PresetStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            write: Mutex::new(()),
        }
    }

    pub fn colors(&self) -> Vec<ColorPreset> {
        self.read(COLOR_PRESETS_KEY)
    }

    /// Add a color preset, replacing any preset with the same name.
    pub fn add_color(&self, preset: ColorPreset) -> Result<(), PresetError> {
        self.upsert(COLOR_PRESETS_KEY, preset)
    }

    /// Returns whether a preset was removed.
    pub fn remove_color(&self, name: &str) -> Result<bool, PresetError> {
        self.remove::<ColorPreset>(COLOR_PRESETS_KEY, name)
    }

    pub fn gradients(&self) -> Vec<GradientPreset> {
        self.read(GRADIENT_PRESETS_KEY)
    }

    pub fn add_gradient(&self, preset: GradientPreset) -> Result<(), PresetError> {
        self.upsert(GRADIENT_PRESETS_KEY, preset)
    }

    pub fn remove_gradient(&self, name: &str) -> Result<bool, PresetError> {
        self.remove::<GradientPreset>(GRADIENT_PRESETS_KEY, name)
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        load_list(self.backend.as_ref(), key).unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "presets unreadable, treating as empty");
            Vec::new()
        })
    }

    fn upsert<T>(&self, key: &str, preset: T) -> Result<(), PresetError>
    where
        T: Named + Serialize + DeserializeOwned,
    {
        let _write = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let mut presets: Vec<T> = load_list(self.backend.as_ref(), key)?;
        match presets.iter_mut().find(|p| p.name() == preset.name()) {
            Some(existing) => *existing = preset,
            None => presets.push(preset),
        }
        store_list(self.backend.as_ref(), key, &presets)?;
        Ok(())
    }

    fn remove<T>(&self, key: &str, name: &str) -> Result<bool, PresetError>
    where
        T: Named + Serialize + DeserializeOwned,
    {
        let _write = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let mut presets: Vec<T> = load_list(self.backend.as_ref(), key)?;
        let before = presets.len();
        presets.retain(|p| p.name() != name);
        if presets.len() == before {
            return Ok(false);
        }
        store_list(self.backend.as_ref(), key, &presets)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn color(name: &str, value: &str) -> ColorPreset {
        ColorPreset {
            name: name.into(),
            value: value.into(),
        }
    }

    #[test]
    fn test_colors_replace_by_name() {
        let store = PresetStore::new(Arc::new(MemoryStore::new()));
        store.add_color(color("brand", "#ff0000")).unwrap();
        store.add_color(color("ink", "#111111")).unwrap();
        store.add_color(color("brand", "#00ff00")).unwrap();

        let colors = store.colors();
        assert_eq!(colors, vec![color("brand", "#00ff00"), color("ink", "#111111")]);
        assert!(store.remove_color("ink").unwrap());
        assert!(!store.remove_color("ink").unwrap());
    }

    #[test]
    fn test_gradient_css() {
        let preset = GradientPreset {
            name: "sunset".into(),
            angle: 90.0,
            stops: vec![
                GradientStop {
                    color: "#000".into(),
                    offset: 100.0,
                },
                GradientStop {
                    color: "#fff".into(),
                    offset: 0.0,
                },
            ],
        };
        assert_eq!(preset.css(), "linear-gradient(90deg, #fff 0%, #000 100%)");
    }

    #[test]
    fn test_unreadable_presets_degrade() {
        let backend = Arc::new(MemoryStore::new());
        backend.set(GRADIENT_PRESETS_KEY, "nope").unwrap();
        let store = PresetStore::new(backend);
        assert!(store.gradients().is_empty());
        assert!(store.colors().is_empty());
    }
}
