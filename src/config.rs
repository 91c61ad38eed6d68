use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub main_link_distance: f32,
    pub pendulum_arm: f32,
    pub main_link_strength: f32,
    pub counterparty_link_strength: f32,
    pub main_charge: f32,
    pub counterparty_charge: f32,
    pub charge_softening: f32,
    pub barnes_hut_theta: f32,
    pub collision_padding: f32,
    pub main_collision_padding: f32,
    pub collision_strength: f32,
    pub buffer_multiplier: f32,
    pub buffer_strength: f32,
    pub pendulum_tolerance: f32,
    pub pendulum_strength: f32,
    pub arrow_clearance: f32,
    pub arrow_strength: f32,
    pub alpha_min: f32,
    pub alpha_decay: f32,
    pub gentle_alpha: f32,
    pub drag_alpha: f32,
    pub velocity_decay: f32,
    pub max_speed: f32,
    pub main_radius: f32,
    pub min_radius: f32,
    pub max_radius: f32,
    pub size_damping_threshold: f32,
    pub curvature: f32,
    pub fan_spread: f32,
    pub arrow_length: f32,
    pub drag_follow: f32,
    pub drag_stretch_limit: f32,
    pub drag_stretch_follow: f32,
    pub lock_displacement: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            main_link_distance: 420.0,
            pendulum_arm: 150.0,
            main_link_strength: 0.05,
            counterparty_link_strength: 0.35,
            main_charge: 60_000.0,
            counterparty_charge: 9_000.0,
            charge_softening: 620.0,
            barnes_hut_theta: 0.72,
            collision_padding: 6.0,
            main_collision_padding: 24.0,
            collision_strength: 0.7,
            buffer_multiplier: 2.2,
            buffer_strength: 0.35,
            pendulum_tolerance: 30.0,
            pendulum_strength: 0.08,
            arrow_clearance: 28.0,
            arrow_strength: 0.25,
            alpha_min: 0.001,
            alpha_decay: 0.0228,
            gentle_alpha: 0.3,
            drag_alpha: 0.3,
            velocity_decay: 0.4,
            max_speed: 40.0,
            main_radius: 40.0,
            min_radius: 8.0,
            max_radius: 48.0,
            size_damping_threshold: 24.0,
            curvature: 0.22,
            fan_spread: 80.0,
            arrow_length: 12.0,
            drag_follow: 0.1,
            drag_stretch_limit: 1.3,
            drag_stretch_follow: 0.3,
            lock_displacement: 3.0,
        }
    }
}

impl LayoutConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read layout config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid layout config {}", path.display()))?;
        Ok(config.sanitized())
    }

    pub fn sanitized(mut self) -> Self {
        self.velocity_decay = self.velocity_decay.clamp(0.05, 0.95);
        self.alpha_decay = self.alpha_decay.clamp(0.0001, 0.5);
        self.alpha_min = self.alpha_min.clamp(0.0, 0.5);
        self.gentle_alpha = self.gentle_alpha.clamp(self.alpha_min, 1.0);
        self.drag_alpha = self.drag_alpha.clamp(0.0, 1.0);
        self.barnes_hut_theta = self.barnes_hut_theta.clamp(0.1, 1.5);
        self.max_speed = self.max_speed.max(1.0);
        self.min_radius = self.min_radius.max(1.0);
        self.max_radius = self.max_radius.max(self.min_radius);
        self.main_radius = self.main_radius.max(1.0);
        self.drag_stretch_limit = self.drag_stretch_limit.max(1.0);
        self
    }

    /// Ideal center distance between a main node and one of its counterparties.
    pub fn pendulum_distance(&self, main_radius: f32, counterparty_radius: f32) -> f32 {
        main_radius + counterparty_radius + self.pendulum_arm
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"pendulum_arm": 90.0, "velocity_decay": 3.0}"#)
            .unwrap();

        let config = LayoutConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.pendulum_arm, 90.0);
        assert_eq!(config.velocity_decay, 0.95);
        assert_eq!(config.main_radius, LayoutConfig::default().main_radius);
    }

    #[test]
    fn missing_config_file_is_reported() {
        let error = LayoutConfig::from_json_file(Path::new("/nonexistent/layout.json"))
            .unwrap_err()
            .to_string();
        assert!(error.contains("failed to read layout config"));
    }
}
