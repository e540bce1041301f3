use std::path::{Path, PathBuf};

use crate::canvas::{DEFAULT_MASK_OPACITY, DEFAULT_MAX_EDGE};
use crate::components::colors::DEFAULT_COLOR_DISTANCE;
use crate::components::history::DEFAULT_HISTORY_CAPACITY;
use crate::components::tools::DEFAULT_BRUSH_STEP;
use crate::ops::crop::DEFAULT_MIN_CROP_SIZE;
use crate::ops::quiz::DEFAULT_QUIZ_TOLERANCE;

const SETTINGS_FILE: &str = "insectmask_settings.cfg";

/// Tunable engine parameters and service endpoints.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    pub service_url: String,
    /// Empty disables the mask log call.
    pub log_url: String,
    pub max_edge: u32,
    pub history_capacity: usize,
    pub brush_step: f32,
    pub mask_opacity: f32,
    pub quiz_tolerance: f32,
    pub legs_color_distance: u32,
    pub min_crop_size: f32,
    pub request_timeout_secs: u64,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            service_url: "http://127.0.0.1:8000".to_string(),
            log_url: String::new(),
            max_edge: DEFAULT_MAX_EDGE,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            brush_step: DEFAULT_BRUSH_STEP,
            mask_opacity: DEFAULT_MASK_OPACITY,
            quiz_tolerance: DEFAULT_QUIZ_TOLERANCE,
            legs_color_distance: DEFAULT_COLOR_DISTANCE,
            min_crop_size: DEFAULT_MIN_CROP_SIZE,
            request_timeout_secs: 120,
        }
    }
}

impl EditorSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/insectmask/insectmask_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\InsectMask\insectmask_settings.cfg
    /// On macOS:   ~/Library/Application Support/InsectMask/insectmask_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            return Some(PathBuf::from(appdata).join("InsectMask").join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("InsectMask")
                    .join(SETTINGS_FILE),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = match std::env::var("XDG_CONFIG_HOME") {
                Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
                _ => PathBuf::from(std::env::var("HOME").ok()?).join(".config"),
            };
            Some(config_dir.join("insectmask").join(SETTINGS_FILE))
        }
    }

    /// Load from the platform settings file, falling back to defaults.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            crate::log_warn!("Failed to save settings to {:?}: {}", path, e);
        }
    }

    /// Missing file → defaults. Unknown keys are skipped and bad values keep
    /// their defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    crate::log_warn!("Failed to read settings {:?}: {}", path, e);
                }
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config())
    }

    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let (key, val) = (key.trim(), val.trim());
            match key {
                "service_url" => s.service_url = val.trim_end_matches('/').to_string(),
                "log_url" => s.log_url = val.to_string(),
                "max_edge" => set_parsed(key, val, &mut s.max_edge),
                "history_capacity" => set_parsed(key, val, &mut s.history_capacity),
                "brush_step" => set_parsed(key, val, &mut s.brush_step),
                "mask_opacity" => set_parsed(key, val, &mut s.mask_opacity),
                "quiz_tolerance" => set_parsed(key, val, &mut s.quiz_tolerance),
                "legs_color_distance" => set_parsed(key, val, &mut s.legs_color_distance),
                "min_crop_size" => set_parsed(key, val, &mut s.min_crop_size),
                "request_timeout_secs" => set_parsed(key, val, &mut s.request_timeout_secs),
                _ => {}
            }
        }
        s.sanitize();
        s
    }

    pub fn to_config(&self) -> String {
        format!(
            "service_url={}\nlog_url={}\nmax_edge={}\nhistory_capacity={}\nbrush_step={}\n\
             mask_opacity={}\nquiz_tolerance={}\nlegs_color_distance={}\nmin_crop_size={}\n\
             request_timeout_secs={}\n",
            self.service_url,
            self.log_url,
            self.max_edge,
            self.history_capacity,
            self.brush_step,
            self.mask_opacity,
            self.quiz_tolerance,
            self.legs_color_distance,
            self.min_crop_size,
            self.request_timeout_secs,
        )
    }

    pub fn log_enabled(&self) -> bool {
        !self.log_url.trim().is_empty()
    }

    // Out-of-range values revert to defaults.
    fn sanitize(&mut self) {
        let d = Self::default();
        if self.history_capacity == 0 {
            self.history_capacity = d.history_capacity;
        }
        if !(self.brush_step > 0.0) {
            self.brush_step = d.brush_step;
        }
        if !(0.0..=1.0).contains(&self.mask_opacity) {
            self.mask_opacity = d.mask_opacity;
        }
        if !(self.quiz_tolerance > 0.0) {
            self.quiz_tolerance = d.quiz_tolerance;
        }
        if !(self.min_crop_size >= 1.0) {
            self.min_crop_size = d.min_crop_size;
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = d.request_timeout_secs;
        }
    }
}

fn set_parsed<T: std::str::FromStr>(key: &str, val: &str, slot: &mut T) {
    match val.parse() {
        Ok(v) => *slot = v,
        Err(_) => crate::log_warn!("Ignoring bad settings value {}={}", key, val),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = EditorSettings::load_from(&dir.path().join("nope.cfg"));
        assert_eq!(s, EditorSettings::default());
        assert!(!s.log_enabled());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);
        let s = EditorSettings {
            service_url: "http://segment.local:9000".into(),
            log_url: "http://segment.local:9000/api/save-mask".into(),
            max_edge: 640,
            quiz_tolerance: 0.15,
            ..EditorSettings::default()
        };
        s.save_to(&path).unwrap();
        assert_eq!(EditorSettings::load_from(&path), s);
    }

    #[test]
    fn bad_values_keep_defaults() {
        let s = EditorSettings::parse(
            "max_edge=abc\nmask_opacity=4\nhistory_capacity=0\nunknown=1\n# comment\nbrush_step=3.5",
        );
        let d = EditorSettings::default();
        assert_eq!(s.max_edge, d.max_edge);
        assert_eq!(s.mask_opacity, d.mask_opacity);
        assert_eq!(s.history_capacity, d.history_capacity);
        assert_eq!(s.brush_step, 3.5);
    }
}
