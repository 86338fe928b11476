//! Scripted in-memory kernel for pipeline tests.

use std::path::Path;
use std::sync::Mutex;

use brepweb_core::{
    BoundingBox, GeometryKernel, KernelError, Material, Result, TessellationParams, Topology, TriangleMesh,
};
use glam::Vec3;

/// Handle into a [`ScriptedKernel`]; [`ROOT`] is the whole model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockShape(pub usize);

pub const ROOT: MockShape = MockShape(usize::MAX);

/// What tessellating a part yields.
#[derive(Debug, Clone)]
pub enum Tessellation {
    /// A closed cube as large as the part.
    Cube,
    Empty,
    Fail(String),
    Mesh(TriangleMesh),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Solid,
    Shell,
    Face,
}

#[derive(Debug, Clone)]
struct Part {
    kind: Kind,
    size: f32,
    shells: Vec<usize>,
    tessellation: Tessellation,
    material: Option<Material>,
    bbox_fails: bool,
}

/// A kernel whose model is built in code.
#[derive(Debug, Default)]
pub struct ScriptedKernel {
    parts: Vec<Part>,
    unreadable: bool,
    calls: Mutex<Vec<(usize, TessellationParams)>>,
}

impl ScriptedKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A kernel whose `read` always fails.
    pub fn unreadable() -> Self {
        Self {
            unreadable: true,
            ..Self::default()
        }
    }

    fn push(&mut self, kind: Kind, size: f32, shells: Vec<usize>) -> MockShape {
        self.parts.push(Part {
            kind,
            size,
            shells,
            tessellation: Tessellation::Cube,
            material: None,
            bbox_fails: false,
        });
        MockShape(self.parts.len() - 1)
    }

    /// A solid with one shell of its own.
    pub fn solid(&mut self, size: f32) -> MockShape {
        let MockShape(shell) = self.push(Kind::Shell, size, Vec::new());
        self.push(Kind::Solid, size, vec![shell])
    }

    /// The shells owned by a solid.
    pub fn shells_of(&self, solid: MockShape) -> Vec<MockShape> {
        self.parts[solid.0].shells.iter().map(|&i| MockShape(i)).collect()
    }

    /// A free shell.
    pub fn shell(&mut self, size: f32) -> MockShape {
        self.push(Kind::Shell, size, Vec::new())
    }

    /// A free face.
    pub fn face(&mut self, size: f32) -> MockShape {
        self.push(Kind::Face, size, Vec::new())
    }

    pub fn set_tessellation(&mut self, shape: MockShape, tessellation: Tessellation) {
        self.parts[shape.0].tessellation = tessellation;
    }

    pub fn set_material(&mut self, shape: MockShape, material: Material) {
        self.parts[shape.0].material = Some(material);
    }

    pub fn fail_bounding_box(&mut self, shape: MockShape) {
        self.parts[shape.0].bbox_fails = true;
    }

    /// Every tessellate call so far, by part index.
    pub fn calls(&self) -> Vec<(usize, TessellationParams)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn of_kind(&self, kind: Kind) -> Vec<MockShape> {
        (0..self.parts.len())
            .filter(|&i| self.parts[i].kind == kind)
            .map(MockShape)
            .collect()
    }

    fn part_box(part: &Part) -> BoundingBox {
        BoundingBox::new(Vec3::ZERO, Vec3::splat(part.size))
    }
}

/// A closed cube with outward winding.
pub fn cube(size: f32) -> TriangleMesh {
    let positions = (0..8u32)
        .map(|i| Vec3::new((i & 1) as f32, ((i >> 1) & 1) as f32, ((i >> 2) & 1) as f32) * size)
        .collect();
    TriangleMesh {
        positions,
        normals: None,
        indices: vec![
            0, 2, 3, 0, 3, 1, // -z
            4, 5, 7, 4, 7, 6, // +z
            0, 1, 5, 0, 5, 4, // -y
            2, 6, 7, 2, 7, 3, // +y
            0, 4, 6, 0, 6, 2, // -x
            1, 3, 7, 1, 7, 5, // +x
        ],
    }
}

impl GeometryKernel for ScriptedKernel {
    type Shape = MockShape;

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn read(&self, path: &Path) -> Result<MockShape> {
        if self.unreadable {
            return Err(KernelError::read(path, "scripted read failure"));
        }
        Ok(ROOT)
    }

    fn bounding_box(&self, shape: &MockShape) -> Result<BoundingBox> {
        if *shape == ROOT {
            let mut bounds = BoundingBox::empty();
            for part in &self.parts {
                bounds.expand(&Self::part_box(part));
            }
            if bounds.is_empty() {
                return Err(KernelError::Degenerate("empty model".into()));
            }
            return Ok(bounds);
        }
        let part = &self.parts[shape.0];
        if part.bbox_fails {
            return Err(KernelError::Degenerate(format!("part {}", shape.0)));
        }
        Ok(Self::part_box(part))
    }

    fn classify(&self, shape: &MockShape) -> Topology<MockShape> {
        if *shape == ROOT {
            return Topology {
                solids: self.of_kind(Kind::Solid),
                shells: self.of_kind(Kind::Shell),
                faces: self.of_kind(Kind::Face),
            };
        }
        let mut topology = Topology::default();
        match self.parts[shape.0].kind {
            Kind::Solid => {
                topology.solids.push(*shape);
                topology.shells = self.shells_of(*shape);
            }
            Kind::Shell => topology.shells.push(*shape),
            Kind::Face => topology.faces.push(*shape),
        }
        topology
    }

    fn solid_shells(&self, solid: &MockShape) -> Vec<MockShape> {
        match self.parts.get(solid.0) {
            Some(part) if part.kind == Kind::Solid => self.shells_of(*solid),
            _ => Vec::new(),
        }
    }

    fn tessellate(&self, shape: &MockShape, params: &TessellationParams) -> Result<TriangleMesh> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((shape.0, *params));
        }
        let Some(part) = self.parts.get(shape.0) else {
            return Err(KernelError::Tessellation("nothing to tessellate".into()));
        };
        match &part.tessellation {
            Tessellation::Cube => Ok(cube(part.size)),
            Tessellation::Empty => Ok(TriangleMesh::new()),
            Tessellation::Fail(reason) => Err(KernelError::Tessellation(reason.clone())),
            Tessellation::Mesh(mesh) => Ok(mesh.clone()),
        }
    }

    fn native_material(&self, shape: &MockShape) -> Option<Material> {
        self.parts.get(shape.0).and_then(|p| p.material.clone())
    }
}
