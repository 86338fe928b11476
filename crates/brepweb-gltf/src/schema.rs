//! glTF 2.0 JSON schema types.
//!
//! Only the parts of glTF 2.0 that a static, untextured mesh scene needs.
//! Unknown fields are ignored on read, so assets produced by other tools
//! (for example Draco-compressed ones) still deserialize.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Component type: unsigned 16-bit integer.
pub const COMPONENT_UNSIGNED_SHORT: u32 = 5123;
/// Component type: unsigned 32-bit integer.
pub const COMPONENT_UNSIGNED_INT: u32 = 5125;
/// Component type: 32-bit float.
pub const COMPONENT_FLOAT: u32 = 5126;

/// Buffer view target: ARRAY_BUFFER (vertex data).
pub const TARGET_ARRAY_BUFFER: u32 = 34962;
/// Buffer view target: ELEMENT_ARRAY_BUFFER (index data).
pub const TARGET_ELEMENT_ARRAY_BUFFER: u32 = 34963;

/// Primitive mode: TRIANGLES.
pub const MODE_TRIANGLES: u32 = 4;

/// Root glTF object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gltf {
    /// Asset information.
    pub asset: Asset,
    /// Default scene index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<usize>,
    /// Scenes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scenes: Vec<Scene>,
    /// Nodes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Node>,
    /// Meshes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meshes: Vec<Mesh>,
    /// Accessors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accessors: Vec<Accessor>,
    /// Buffer views.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buffer_views: Vec<BufferView>,
    /// Buffers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buffers: Vec<Buffer>,
    /// Materials.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub materials: Vec<GltfMaterial>,
    /// Extension names used.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions_used: Vec<String>,
}

/// Asset metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// glTF version.
    pub version: String,
    /// Generator name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    /// Application-specific data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extras: Option<serde_json::Value>,
}

impl Default for Asset {
    fn default() -> Self {
        Self {
            version: "2.0".to_string(),
            generator: None,
            extras: None,
        }
    }
}

/// A scene containing root nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scene {
    /// Scene name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Root node indices.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<usize>,
}

/// A node in the scene graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Node {
    /// Node name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Mesh index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh: Option<usize>,
}

/// A mesh containing primitives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mesh {
    /// Mesh name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Mesh primitives.
    pub primitives: Vec<Primitive>,
}

/// A mesh primitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Primitive {
    /// Vertex attributes (POSITION, NORMAL), ordered by name.
    pub attributes: BTreeMap<String, usize>,
    /// Index accessor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indices: Option<usize>,
    /// Material index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material: Option<usize>,
    /// Rendering mode.
    #[serde(default = "default_primitive_mode")]
    pub mode: u32,
}

fn default_primitive_mode() -> u32 {
    MODE_TRIANGLES
}

/// An accessor for typed buffer data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accessor {
    /// Buffer view index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_view: Option<usize>,
    /// Byte offset within buffer view.
    #[serde(default)]
    pub byte_offset: usize,
    /// Component type.
    pub component_type: u32,
    /// Number of elements.
    pub count: usize,
    /// Element type ("SCALAR", "VEC3").
    #[serde(rename = "type")]
    pub accessor_type: String,
    /// Minimum values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<Vec<f64>>,
    /// Maximum values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<Vec<f64>>,
}

/// A view into a buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferView {
    /// Buffer index.
    pub buffer: usize,
    /// Byte offset into buffer.
    #[serde(default)]
    pub byte_offset: usize,
    /// Byte length.
    pub byte_length: usize,
    /// Target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<u32>,
}

/// A buffer containing binary data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buffer {
    /// Byte length.
    pub byte_length: usize,
    /// URI (data URI for embedded `.gltf`, absent in GLB).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// A PBR material.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GltfMaterial {
    /// Material name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// PBR metallic-roughness.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pbr_metallic_roughness: Option<PbrMetallicRoughness>,
    /// Alpha mode ("OPAQUE", "MASK", "BLEND").
    #[serde(default = "default_alpha_mode")]
    pub alpha_mode: String,
    /// Double-sided rendering.
    #[serde(default)]
    pub double_sided: bool,
}

fn default_alpha_mode() -> String {
    "OPAQUE".to_string()
}

/// PBR metallic-roughness properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PbrMetallicRoughness {
    /// Base color factor.
    #[serde(default = "default_base_color_factor")]
    pub base_color_factor: [f32; 4],
    /// Metallic factor.
    #[serde(default = "default_factor")]
    pub metallic_factor: f32,
    /// Roughness factor.
    #[serde(default = "default_factor")]
    pub roughness_factor: f32,
}

fn default_base_color_factor() -> [f32; 4] {
    [1.0, 1.0, 1.0, 1.0]
}

fn default_factor() -> f32 {
    1.0
}

impl Accessor {
    /// Number of triangles an index (or non-indexed position) accessor describes.
    pub fn triangle_count(&self) -> usize {
        self.count / 3
    }
}

impl Mesh {
    /// Triangles across all triangle-mode primitives.
    pub fn triangle_count(&self, accessors: &[Accessor]) -> usize {
        self.primitives
            .iter()
            .filter(|p| p.mode == MODE_TRIANGLES)
            .filter_map(|p| {
                let accessor = p.indices.or_else(|| p.attributes.get("POSITION").copied())?;
                accessors.get(accessor).map(Accessor::triangle_count)
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignores_unknown_fields() {
        let json = r#"{
            "asset": {"version": "2.0", "generator": "other"},
            "extensionsUsed": ["KHR_draco_mesh_compression"],
            "meshes": [{"primitives": [{
                "attributes": {"POSITION": 0},
                "indices": 1,
                "extensions": {"KHR_draco_mesh_compression": {"bufferView": 0}}
            }]}],
            "accessors": [
                {"componentType": 5126, "count": 4, "type": "VEC3"},
                {"componentType": 5123, "count": 6, "type": "SCALAR"}
            ]
        }"#;
        let gltf: Gltf = serde_json::from_str(json).unwrap();
        assert_eq!(gltf.extensions_used, vec!["KHR_draco_mesh_compression"]);
        assert_eq!(gltf.meshes[0].primitives[0].mode, MODE_TRIANGLES);
        assert_eq!(gltf.meshes[0].triangle_count(&gltf.accessors), 2);
    }

    #[test]
    fn test_asset_extras_roundtrip() {
        let asset = Asset {
            generator: Some("brepweb".into()),
            extras: Some(serde_json::json!({"unitScale": 0.001})),
            ..Default::default()
        };
        let json = serde_json::to_string(&asset).unwrap();
        assert_eq!(json, r#"{"version":"2.0","generator":"brepweb","extras":{"unitScale":0.001}}"#);
    }
}
