//! PBR material definition.

use glam::Vec4;
use serde::{Deserialize, Serialize};

/// PBR metallic-roughness material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    /// Material name.
    pub name: String,
    /// Base color factor (RGBA, linear 0..1).
    pub base_color: Vec4,
    /// Metallic factor (0.0 = dielectric, 1.0 = metallic).
    pub metallic: f32,
    /// Roughness factor (0.0 = smooth, 1.0 = rough).
    pub roughness: f32,
    /// Alpha mode.
    pub alpha_mode: AlphaMode,
    /// Double-sided rendering.
    pub double_sided: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_color: Vec4::ONE,
            metallic: 0.0,
            roughness: 0.5,
            alpha_mode: AlphaMode::Opaque,
            double_sided: false,
        }
    }
}

impl Material {
    /// Create a new default material.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create a simple colored material.
    pub fn colored(name: impl Into<String>, color: Vec4) -> Self {
        Self {
            name: name.into(),
            base_color: color,
            ..Default::default()
        }
    }

    /// The material given to parts that carry none of their own: a
    /// semi-rough light gray, visible from both sides so shells with
    /// inverted normals still render.
    pub fn part_default() -> Self {
        Self {
            name: "DefaultGray".to_string(),
            base_color: Vec4::new(200.0 / 255.0, 200.0 / 255.0, 200.0 / 255.0, 1.0),
            metallic: 0.1,
            roughness: 0.5,
            alpha_mode: AlphaMode::Opaque,
            double_sided: true,
        }
    }

    /// Mark the material double-sided.
    pub fn double_sided(mut self) -> Self {
        self.double_sided = true;
        self
    }
}

/// Alpha blending mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlphaMode {
    /// Fully opaque.
    #[default]
    Opaque,
    /// Masked (alpha test).
    Mask,
    /// Alpha blended.
    Blend,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_default() {
        let m = Material::part_default();
        assert!(m.double_sided);
        assert!((m.base_color.x - 0.784).abs() < 0.001);
        assert_eq!(m.base_color.x, m.base_color.z);
        assert_eq!(m.metallic, 0.1);
        assert_eq!(m.roughness, 0.5);
    }

    #[test]
    fn test_colored_is_single_sided() {
        let m = Material::colored("red", Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert!(!m.double_sided);
        assert!(m.double_sided().double_sided);
    }
}
