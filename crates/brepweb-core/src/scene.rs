//! The ordered scene handed to an exporter.

use glam::Mat4;
use indexmap::IndexMap;

use crate::error::SceneError;
use crate::geometry::TriangleMesh;
use crate::material::Material;

/// A flat, ordered scene of named meshes.
///
/// Node order is insertion order and node names are unique. The
/// `unit_transform` is the single global transform from model units to
/// scene units; producers bake it into vertex data before adding nodes.
#[derive(Debug, Clone)]
pub struct Scene {
    /// Scene name.
    pub name: Option<String>,
    /// Nodes keyed by name, in insertion order.
    nodes: IndexMap<String, SceneNode>,
    /// Materials referenced by nodes.
    pub materials: Vec<Material>,
    /// Model-to-scene unit transform.
    pub unit_transform: Mat4,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY)
    }
}

impl Scene {
    /// Create an empty scene with the given unit transform.
    pub fn new(unit_transform: Mat4) -> Self {
        Self {
            name: None,
            nodes: IndexMap::new(),
            materials: Vec::new(),
            unit_transform,
        }
    }

    /// Uniform scale component of the unit transform.
    pub fn unit_scale(&self) -> f32 {
        self.unit_transform.to_scale_rotation_translation().0.x
    }

    /// Add a material and return its index.
    pub fn add_material(&mut self, material: Material) -> usize {
        let index = self.materials.len();
        self.materials.push(material);
        index
    }

    /// Index of an equal material already in the scene, or add it.
    pub fn intern_material(&mut self, material: Material) -> usize {
        match self.materials.iter().position(|m| *m == material) {
            Some(index) => index,
            None => self.add_material(material),
        }
    }

    /// Append a node and return its index.
    pub fn add_node(&mut self, node: SceneNode) -> Result<usize, SceneError> {
        if node.material >= self.materials.len() {
            return Err(SceneError::MissingMaterial {
                node: node.name,
                material: node.material,
            });
        }
        if self.nodes.contains_key(&node.name) {
            return Err(SceneError::DuplicateNode(node.name));
        }
        let (index, _) = self.nodes.insert_full(node.name.clone(), node);
        Ok(index)
    }

    /// Get a node by name.
    pub fn node(&self, name: &str) -> Option<&SceneNode> {
        self.nodes.get(name)
    }

    /// Iterate nodes in order.
    pub fn nodes(&self) -> impl Iterator<Item = &SceneNode> {
        self.nodes.values()
    }

    /// Node names in order.
    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }

    /// Get the total number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// True when no node has been added.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Total facets across all nodes.
    pub fn facet_count(&self) -> usize {
        self.nodes.values().map(|n| n.mesh.facet_count()).sum()
    }
}

/// A named mesh with its material.
#[derive(Debug, Clone)]
pub struct SceneNode {
    /// Node name, unique within a scene.
    pub name: String,
    /// Geometry in scene units.
    pub mesh: TriangleMesh,
    /// Index into [`Scene::materials`].
    pub material: usize,
}

impl SceneNode {
    /// Create a node.
    pub fn new(name: impl Into<String>, mesh: TriangleMesh, material: usize) -> Self {
        Self {
            name: name.into(),
            mesh,
            material,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn triangle() -> TriangleMesh {
        TriangleMesh {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: None,
            indices: vec![0, 1, 2],
        }
    }

    #[test]
    fn test_empty_scene() {
        let scene = Scene::default();
        assert!(scene.is_empty());
        assert_eq!(scene.node_count(), 0);
        assert_eq!(scene.unit_scale(), 1.0);
    }

    #[test]
    fn test_nodes_keep_insertion_order() {
        let mut scene = Scene::new(Mat4::from_scale(Vec3::splat(0.001)));
        let mat = scene.add_material(Material::part_default());
        for name in ["Solid_0", "Solid_1", "Shell_2"] {
            scene.add_node(SceneNode::new(name, triangle(), mat)).unwrap();
        }
        assert_eq!(scene.node_names(), vec!["Solid_0", "Solid_1", "Shell_2"]);
        assert_eq!(scene.facet_count(), 3);
        assert!((scene.unit_scale() - 0.001).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut scene = Scene::default();
        let mat = scene.add_material(Material::part_default());
        scene.add_node(SceneNode::new("Solid_0", triangle(), mat)).unwrap();
        let err = scene
            .add_node(SceneNode::new("Solid_0", triangle(), mat))
            .unwrap_err();
        assert_eq!(err, SceneError::DuplicateNode("Solid_0".into()));
        assert_eq!(scene.node_count(), 1);
    }

    #[test]
    fn test_missing_material_rejected() {
        let mut scene = Scene::default();
        let err = scene.add_node(SceneNode::new("Face_0", triangle(), 3)).unwrap_err();
        assert!(matches!(err, SceneError::MissingMaterial { material: 3, .. }));
    }

    #[test]
    fn test_intern_material() {
        let mut scene = Scene::default();
        let a = scene.intern_material(Material::part_default());
        let b = scene.intern_material(Material::part_default());
        let c = scene.intern_material(Material::new("other"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(scene.materials.len(), 2);
    }
}
