//! glTF and GLB writers for [`brepweb_core::Scene`].

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use brepweb_core::{AlphaMode, Material, Scene, TriangleMesh};
use glam::Vec3;

use crate::error::{ExportError, Result};
use crate::schema::{
    self, Accessor, Asset, Buffer, BufferView, Gltf, GltfMaterial, Mesh, Node, PbrMetallicRoughness, Primitive,
};

/// GLB magic number "glTF".
pub(crate) const GLB_MAGIC: u32 = 0x46546C67;
/// GLB version.
pub(crate) const GLB_VERSION: u32 = 2;
/// JSON chunk type.
pub(crate) const CHUNK_JSON: u32 = 0x4E4F534A;
/// Binary chunk type.
pub(crate) const CHUNK_BIN: u32 = 0x004E4942;

/// Generator recorded in `asset.generator`.
const GENERATOR: &str = "brepweb";

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Binary GLB.
    #[default]
    Glb,
    /// JSON glTF with the buffer embedded as a base64 data URI.
    Gltf,
}

impl ExportFormat {
    /// Pick the container from a file extension; anything but `.gltf` is GLB.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gltf") => Self::Gltf,
            _ => Self::Glb,
        }
    }

    /// Canonical file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Glb => "glb",
            Self::Gltf => "gltf",
        }
    }
}

/// Internal state for building glTF data.
struct GltfBuilder {
    gltf: Gltf,
    buffer_data: Vec<u8>,
    /// Maps scene material index to glTF material index.
    material_to_gltf: HashMap<usize, usize>,
}

impl GltfBuilder {
    fn new(scene: &Scene) -> Self {
        Self {
            gltf: Gltf {
                asset: Asset {
                    version: "2.0".to_string(),
                    generator: Some(GENERATOR.to_string()),
                    extras: Some(serde_json::json!({ "unitScale": scene.unit_scale() })),
                },
                ..Default::default()
            },
            buffer_data: Vec::new(),
            material_to_gltf: HashMap::new(),
        }
    }

    /// Close the bytes written since `byte_offset` into a buffer view.
    fn push_view(&mut self, byte_offset: usize, target: u32) -> usize {
        let byte_length = self.buffer_data.len() - byte_offset;
        // Keep every view 4-byte aligned for the float views that follow.
        let padding = (4 - self.buffer_data.len() % 4) % 4;
        self.buffer_data.extend(std::iter::repeat(0u8).take(padding));

        let view = self.gltf.buffer_views.len();
        self.gltf.buffer_views.push(BufferView {
            buffer: 0,
            byte_offset,
            byte_length,
            target: Some(target),
        });
        view
    }

    /// Add an accessor for Vec3 data (positions, normals).
    fn add_accessor_vec3(&mut self, data: &[Vec3], with_bounds: bool) -> usize {
        let byte_offset = self.buffer_data.len();
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for v in data {
            min = min.min(*v);
            max = max.max(*v);
            for c in v.to_array() {
                self.buffer_data.extend_from_slice(&c.to_le_bytes());
            }
        }
        let view = self.push_view(byte_offset, schema::TARGET_ARRAY_BUFFER);

        let bounds = |v: Vec3| -> Option<Vec<f64>> { Some(v.to_array().iter().map(|&c| c as f64).collect()) };
        let accessor = self.gltf.accessors.len();
        self.gltf.accessors.push(Accessor {
            buffer_view: Some(view),
            byte_offset: 0,
            component_type: schema::COMPONENT_FLOAT,
            count: data.len(),
            accessor_type: "VEC3".to_string(),
            min: if with_bounds { bounds(min) } else { None },
            max: if with_bounds { bounds(max) } else { None },
        });
        accessor
    }

    /// Add an accessor for index data, narrowed to u16 when every index fits.
    fn add_accessor_indices(&mut self, indices: &[u32]) -> usize {
        let byte_offset = self.buffer_data.len();
        let max_index = indices.iter().copied().max().unwrap_or(0);

        let component_type = if max_index <= u16::MAX as u32 {
            for &idx in indices {
                self.buffer_data.extend_from_slice(&(idx as u16).to_le_bytes());
            }
            schema::COMPONENT_UNSIGNED_SHORT
        } else {
            for &idx in indices {
                self.buffer_data.extend_from_slice(&idx.to_le_bytes());
            }
            schema::COMPONENT_UNSIGNED_INT
        };
        let view = self.push_view(byte_offset, schema::TARGET_ELEMENT_ARRAY_BUFFER);

        let accessor = self.gltf.accessors.len();
        self.gltf.accessors.push(Accessor {
            buffer_view: Some(view),
            byte_offset: 0,
            component_type,
            count: indices.len(),
            accessor_type: "SCALAR".to_string(),
            min: None,
            max: None,
        });
        accessor
    }

    fn add_mesh(&mut self, name: &str, mesh: &TriangleMesh, material: usize) -> usize {
        let mut attributes = BTreeMap::new();
        attributes.insert("POSITION".to_string(), self.add_accessor_vec3(&mesh.positions, true));
        if let Some(normals) = &mesh.normals {
            attributes.insert("NORMAL".to_string(), self.add_accessor_vec3(normals, false));
        }
        let indices = self.add_accessor_indices(&mesh.indices);

        let index = self.gltf.meshes.len();
        self.gltf.meshes.push(Mesh {
            name: Some(format!("{name}_Geo")),
            primitives: vec![Primitive {
                attributes,
                indices: Some(indices),
                material: Some(material),
                mode: schema::MODE_TRIANGLES,
            }],
        });
        index
    }

    /// glTF index of a scene material, adding it on first use.
    fn material(&mut self, scene_index: usize, material: &Material) -> usize {
        if let Some(&index) = self.material_to_gltf.get(&scene_index) {
            return index;
        }
        let index = self.gltf.materials.len();
        self.gltf.materials.push(GltfMaterial {
            name: (!material.name.is_empty()).then(|| material.name.clone()),
            pbr_metallic_roughness: Some(PbrMetallicRoughness {
                base_color_factor: material.base_color.to_array(),
                metallic_factor: material.metallic,
                roughness_factor: material.roughness,
            }),
            alpha_mode: match material.alpha_mode {
                AlphaMode::Opaque => "OPAQUE".to_string(),
                AlphaMode::Mask => "MASK".to_string(),
                AlphaMode::Blend => "BLEND".to_string(),
            },
            double_sided: material.double_sided,
        });
        self.material_to_gltf.insert(scene_index, index);
        index
    }

    fn build(&mut self, scene: &Scene) -> Result<()> {
        if scene.is_empty() {
            return Err(ExportError::EmptyScene);
        }

        let mut roots = Vec::with_capacity(scene.node_count());
        for node in scene.nodes() {
            validate_mesh(&node.name, &node.mesh)?;
            let material = scene.materials.get(node.material).ok_or_else(|| ExportError::InvalidMesh {
                node: node.name.clone(),
                reason: format!("missing material {}", node.material),
            })?;
            let material = self.material(node.material, material);
            let mesh = self.add_mesh(&node.name, &node.mesh, material);

            roots.push(self.gltf.nodes.len());
            self.gltf.nodes.push(Node {
                name: Some(node.name.clone()),
                mesh: Some(mesh),
            });
        }

        self.gltf.scenes.push(schema::Scene {
            name: scene.name.clone(),
            nodes: roots,
        });
        self.gltf.scene = Some(0);
        self.gltf.buffers.push(Buffer {
            byte_length: self.buffer_data.len(),
            uri: None,
        });
        Ok(())
    }
}

fn validate_mesh(node: &str, mesh: &TriangleMesh) -> Result<()> {
    let invalid = |reason: String| ExportError::InvalidMesh {
        node: node.to_string(),
        reason,
    };
    if mesh.is_empty() {
        return Err(invalid("no facets".into()));
    }
    if mesh.indices.len() % 3 != 0 {
        return Err(invalid(format!("{} indices is not a whole number of facets", mesh.indices.len())));
    }
    if let Some(&bad) = mesh.indices.iter().find(|&&i| i as usize >= mesh.positions.len()) {
        return Err(invalid(format!("index {bad} out of {} vertices", mesh.positions.len())));
    }
    if let Some(normals) = &mesh.normals {
        if normals.len() != mesh.positions.len() {
            return Err(invalid(format!("{} normals for {} vertices", normals.len(), mesh.positions.len())));
        }
    }
    Ok(())
}

/// Header and chunk lengths of a GLB, all of which must fit in a `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GlbLengths {
    total: u32,
    json: u32,
    bin: u32,
}

impl GlbLengths {
    fn new(json_len: usize, bin_len: usize) -> Result<Self> {
        let total = 12u64 + 8 + json_len as u64 + 8 + bin_len as u64;
        let too_large = || ExportError::TooLarge { bytes: total };
        Ok(Self {
            total: u32::try_from(total).map_err(|_| too_large())?,
            json: u32::try_from(json_len).map_err(|_| too_large())?,
            bin: u32::try_from(bin_len).map_err(|_| too_large())?,
        })
    }
}

/// Encode a scene as a binary GLB.
pub fn write_glb(scene: &Scene) -> Result<Vec<u8>> {
    let mut builder = GltfBuilder::new(scene);
    builder.build(scene)?;

    let json_bytes = serde_json::to_vec(&builder.gltf)?;
    let json_padding = (4 - json_bytes.len() % 4) % 4;
    let padded_json_len = json_bytes.len() + json_padding;

    // Views are already 4-byte aligned, so the BIN chunk needs no padding.
    let bin_len = builder.buffer_data.len();
    let lengths = GlbLengths::new(padded_json_len, bin_len)?;

    let mut output = Vec::with_capacity(lengths.total as usize);
    output.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    output.extend_from_slice(&GLB_VERSION.to_le_bytes());
    output.extend_from_slice(&lengths.total.to_le_bytes());

    output.extend_from_slice(&lengths.json.to_le_bytes());
    output.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    output.extend_from_slice(&json_bytes);
    output.extend(std::iter::repeat(0x20u8).take(json_padding));

    output.extend_from_slice(&lengths.bin.to_le_bytes());
    output.extend_from_slice(&CHUNK_BIN.to_le_bytes());
    output.extend_from_slice(&builder.buffer_data);

    Ok(output)
}

/// Encode a scene as JSON glTF with an embedded base64 buffer.
pub fn write_gltf(scene: &Scene, pretty: bool) -> Result<Vec<u8>> {
    let mut builder = GltfBuilder::new(scene);
    builder.build(scene)?;

    let data_uri = format!("data:application/octet-stream;base64,{}", STANDARD.encode(&builder.buffer_data));
    if let Some(buffer) = builder.gltf.buffers.first_mut() {
        buffer.uri = Some(data_uri);
    }

    let json_bytes = if pretty {
        serde_json::to_vec_pretty(&builder.gltf)
    } else {
        serde_json::to_vec(&builder.gltf)
    }?;
    Ok(json_bytes)
}

/// Encode a scene in the given container.
pub fn to_bytes(scene: &Scene, format: ExportFormat) -> Result<Vec<u8>> {
    let bytes = match format {
        ExportFormat::Glb => write_glb(scene),
        ExportFormat::Gltf => write_gltf(scene, false),
    }?;
    tracing::debug!(
        format = format.extension(),
        nodes = scene.node_count(),
        bytes = bytes.len(),
        "scene encoded"
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::GlbSummary;
    use brepweb_core::SceneNode;
    use glam::{Mat4, Vec4};

    fn triangle() -> TriangleMesh {
        TriangleMesh {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::new(0.5, 1.0, 0.0)],
            normals: Some(vec![Vec3::Z; 3]),
            indices: vec![0, 1, 2],
        }
    }

    fn two_part_scene() -> Scene {
        let mut scene = Scene::new(Mat4::from_scale(Vec3::splat(0.001)));
        let gray = scene.add_material(Material::part_default());
        scene.add_node(SceneNode::new("Solid_0", triangle(), gray)).unwrap();
        scene.add_node(SceneNode::new("Shell_1", triangle(), gray)).unwrap();
        scene
    }

    fn json_chunk(glb: &[u8]) -> serde_json::Value {
        let len = u32::from_le_bytes([glb[12], glb[13], glb[14], glb[15]]) as usize;
        serde_json::from_slice(&glb[20..20 + len]).unwrap()
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ExportFormat::from_path(Path::new("out/part.glb")), ExportFormat::Glb);
        assert_eq!(ExportFormat::from_path(Path::new("out/part.GLTF")), ExportFormat::Gltf);
        assert_eq!(ExportFormat::from_path(Path::new("out/part")), ExportFormat::Glb);
    }

    #[test]
    fn test_empty_scene_rejected() {
        let err = write_glb(&Scene::default()).unwrap_err();
        assert!(matches!(err, ExportError::EmptyScene));
    }

    #[test]
    fn test_glb_layout() {
        let glb = write_glb(&two_part_scene()).unwrap();
        assert_eq!(&glb[0..4], &GLB_MAGIC.to_le_bytes());
        assert_eq!(u32::from_le_bytes([glb[8], glb[9], glb[10], glb[11]]) as usize, glb.len());
        assert_eq!(glb.len() % 4, 0);

        let summary = GlbSummary::parse(&glb).unwrap();
        assert_eq!(summary.node_names, vec!["Solid_0", "Shell_1"]);
        assert_eq!(summary.mesh_triangles, vec![1, 1]);
        assert_eq!(summary.generator.as_deref(), Some("brepweb"));
    }

    #[test]
    fn test_node_and_mesh_names() {
        let json = json_chunk(&write_glb(&two_part_scene()).unwrap());
        assert_eq!(json["nodes"][1]["name"], "Shell_1");
        assert_eq!(json["meshes"][0]["name"], "Solid_0_Geo");
        assert_eq!(json["scenes"][0]["nodes"], serde_json::json!([0, 1]));
        assert_eq!(json["asset"]["extras"]["unitScale"].as_f64().map(|s| (s - 0.001).abs() < 1e-9), Some(true));
    }

    #[test]
    fn test_position_bounds_and_short_indices() {
        let json = json_chunk(&write_glb(&two_part_scene()).unwrap());
        let position = json["meshes"][0]["primitives"][0]["attributes"]["POSITION"].as_u64().unwrap() as usize;
        assert_eq!(json["accessors"][position]["min"], serde_json::json!([0.0, 0.0, 0.0]));
        assert_eq!(json["accessors"][position]["max"], serde_json::json!([1.0, 1.0, 0.0]));
        let indices = json["meshes"][0]["primitives"][0]["indices"].as_u64().unwrap() as usize;
        assert_eq!(json["accessors"][indices]["componentType"], schema::COMPONENT_UNSIGNED_SHORT);
    }

    #[test]
    fn test_wide_indices() {
        let mut mesh = TriangleMesh::new();
        mesh.positions = vec![Vec3::ZERO; 70_000];
        mesh.positions[69_999] = Vec3::X;
        mesh.positions[1] = Vec3::Y;
        mesh.indices = vec![0, 69_999, 1];
        let mut scene = Scene::default();
        let mat = scene.add_material(Material::part_default());
        scene.add_node(SceneNode::new("Solid_0", mesh, mat)).unwrap();

        let json = json_chunk(&write_glb(&scene).unwrap());
        let indices = json["meshes"][0]["primitives"][0]["indices"].as_u64().unwrap() as usize;
        assert_eq!(json["accessors"][indices]["componentType"], schema::COMPONENT_UNSIGNED_INT);
    }

    #[test]
    fn test_materials_shared_and_double_sided() {
        let mut scene = two_part_scene();
        let red = scene.add_material(Material::colored("Red", Vec4::new(1.0, 0.0, 0.0, 1.0)));
        scene.add_node(SceneNode::new("Face_2", triangle(), red)).unwrap();

        let json = json_chunk(&write_glb(&scene).unwrap());
        let materials = json["materials"].as_array().unwrap();
        assert_eq!(materials.len(), 2);
        assert_eq!(materials[0]["name"], "DefaultGray");
        assert_eq!(materials[0]["doubleSided"], true);
        assert_eq!(materials[1]["doubleSided"], false);
        assert_eq!(json["meshes"][1]["primitives"][0]["material"], 0);
        assert_eq!(json["meshes"][2]["primitives"][0]["material"], 1);
    }

    #[test]
    fn test_invalid_mesh_rejected() {
        let mut mesh = triangle();
        mesh.indices = vec![0, 1, 7];
        let mut scene = Scene::default();
        let mat = scene.add_material(Material::part_default());
        scene.add_node(SceneNode::new("Solid_0", mesh, mat)).unwrap();
        let err = write_glb(&scene).unwrap_err();
        assert!(matches!(err, ExportError::InvalidMesh { ref node, .. } if node == "Solid_0"));
    }

    #[test]
    fn test_gltf_embeds_buffer() {
        let bytes = write_gltf(&two_part_scene(), true).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let uri = json["buffers"][0]["uri"].as_str().unwrap();
        let data = STANDARD
            .decode(uri.trim_start_matches("data:application/octet-stream;base64,"))
            .unwrap();
        assert_eq!(json["buffers"][0]["byteLength"].as_u64(), Some(data.len() as u64));
    }

    #[test]
    fn test_glb_lengths_fit_u32() {
        let lengths = GlbLengths::new(64, 1024).unwrap();
        assert_eq!(lengths, GlbLengths { total: 12 + 8 + 64 + 8 + 1024, json: 64, bin: 1024 });

        let max_bin = u32::MAX as usize - (12 + 8 + 64 + 8);
        assert_eq!(GlbLengths::new(64, max_bin).unwrap().total, u32::MAX);
    }

    #[test]
    fn test_oversized_glb_is_rejected() {
        let bin = (1usize << 32) + 16;
        let err = GlbLengths::new(64, bin).unwrap_err();
        assert!(matches!(err, ExportError::TooLarge { bytes } if bytes == (12 + 8 + 64 + 8 + bin) as u64));

        let max_bin = u32::MAX as usize - (12 + 8 + 64 + 8);
        assert!(GlbLengths::new(64, max_bin + 1).is_err());
    }

    #[test]
    fn test_output_is_deterministic() {
        assert_eq!(write_glb(&two_part_scene()).unwrap(), write_glb(&two_part_scene()).unwrap());
    }
}
