//! The STEP implementation of [`GeometryKernel`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use brepweb_core::{
    BoundingBox, GeometryKernel, KernelError, Material, Result, TessellationParams, Topology, TriangleMesh,
};

use crate::entities::EntityGraph;
use crate::p21::parse_data_section;
use crate::style::ColourIndex;
use crate::tessellate::{Resolution, Tessellator};

const STEP_MAGIC: &str = "ISO-10303-21";
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// A parsed STEP model: the entity graph plus its resolved colours.
pub struct StepModel {
    source: PathBuf,
    graph: EntityGraph,
    colours: ColourIndex,
}

impl StepModel {
    /// Parse a STEP file's bytes. `source` is used for error messages.
    pub fn parse(bytes: &[u8], source: &Path) -> Result<Self> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let text = String::from_utf8_lossy(bytes);

        if !text.trim_start().starts_with(STEP_MAGIC) {
            return Err(KernelError::read(source, "not an ISO 10303-21 file"));
        }

        let instances = match parse_data_section(&text) {
            Ok((_, instances)) => instances,
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                return Err(KernelError::parse_at(
                    "malformed DATA section",
                    text.len() - e.input.len(),
                ));
            }
            Err(nom::Err::Incomplete(_)) => {
                return Err(KernelError::parse("truncated DATA section"));
            }
        };
        if instances.is_empty() {
            return Err(KernelError::parse("DATA section has no entities"));
        }

        let graph = EntityGraph::new(instances);
        let colours = ColourIndex::build(&graph);
        tracing::debug!(
            path = %source.display(),
            entities = graph.len(),
            solids = graph.solids().len(),
            shells = graph.shells().len(),
            faces = graph.faces().len(),
            styled = colours.len(),
            "parsed STEP model"
        );

        Ok(Self {
            source: source.to_path_buf(),
            graph,
            colours,
        })
    }

    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

/// Which part of a model a [`StepShape`] denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeRef {
    /// The whole model.
    Whole,
    Solid(u64),
    Shell(u64),
    Face(u64),
}

/// A shape handle: a shared model plus the entity it points at.
#[derive(Clone)]
pub struct StepShape {
    model: Arc<StepModel>,
    kind: ShapeRef,
}

impl StepShape {
    fn child(&self, kind: ShapeRef) -> Self {
        Self {
            model: Arc::clone(&self.model),
            kind,
        }
    }

    pub fn kind(&self) -> ShapeRef {
        self.kind
    }

    pub fn model(&self) -> &StepModel {
        &self.model
    }

    /// Faces covered by this shape, in file order.
    pub fn faces(&self) -> Vec<u64> {
        let graph = &self.model.graph;
        match self.kind {
            ShapeRef::Whole => graph.faces(),
            ShapeRef::Solid(id) => graph.solid_faces(id),
            ShapeRef::Shell(id) => graph.shell_faces(id),
            ShapeRef::Face(id) => vec![id],
        }
    }
}

impl PartialEq for StepShape {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.model, &other.model) && self.kind == other.kind
    }
}

impl fmt::Debug for StepShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepShape")
            .field("source", &self.model.source)
            .field("kind", &self.kind)
            .finish()
    }
}

/// B-rep kernel over ISO 10303-21 files.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepKernel;

impl StepKernel {
    pub fn new() -> Self {
        Self
    }

    /// Parse a model from memory.
    pub fn load(&self, bytes: &[u8], source: &Path) -> Result<StepShape> {
        Ok(StepShape {
            model: Arc::new(StepModel::parse(bytes, source)?),
            kind: ShapeRef::Whole,
        })
    }
}

impl GeometryKernel for StepKernel {
    type Shape = StepShape;

    fn name(&self) -> &'static str {
        "step"
    }

    fn read(&self, path: &Path) -> Result<StepShape> {
        let bytes = std::fs::read(path).map_err(|e| KernelError::read(path, e.to_string()))?;
        self.load(&bytes, path)
    }

    fn bounding_box(&self, shape: &StepShape) -> Result<BoundingBox> {
        let tess = Tessellator::new(&shape.model.graph, Resolution::coarse());
        let mut bounds = BoundingBox::empty();
        for face in shape.faces() {
            bounds.expand(&tess.face_extent(face));
        }
        if bounds.is_empty() {
            return Err(KernelError::Degenerate(format!("{:?} has no extent", shape.kind)));
        }
        Ok(bounds)
    }

    fn classify(&self, shape: &StepShape) -> Topology<StepShape> {
        let graph = &shape.model.graph;
        let (solids, shells, faces) = match shape.kind {
            ShapeRef::Whole => (graph.solids(), graph.shells(), graph.faces()),
            ShapeRef::Solid(id) => (vec![id], graph.solid_shells(id), graph.solid_faces(id)),
            ShapeRef::Shell(id) => (Vec::new(), vec![id], graph.shell_faces(id)),
            ShapeRef::Face(id) => (Vec::new(), Vec::new(), vec![id]),
        };
        Topology {
            solids: solids.into_iter().map(|id| shape.child(ShapeRef::Solid(id))).collect(),
            shells: shells.into_iter().map(|id| shape.child(ShapeRef::Shell(id))).collect(),
            faces: faces.into_iter().map(|id| shape.child(ShapeRef::Face(id))).collect(),
        }
    }

    fn solid_shells(&self, solid: &StepShape) -> Vec<StepShape> {
        match solid.kind {
            ShapeRef::Solid(id) => solid
                .model
                .graph
                .solid_shells(id)
                .into_iter()
                .map(|shell| solid.child(ShapeRef::Shell(shell)))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn tessellate(&self, shape: &StepShape, params: &TessellationParams) -> Result<TriangleMesh> {
        let faces = shape.faces();
        if faces.is_empty() {
            return Err(KernelError::Tessellation(format!("{:?} has no faces", shape.kind)));
        }

        let size = if params.relative {
            self.bounding_box(shape)?.max_dimension() as f64
        } else {
            1.0
        };
        let tess = Tessellator::new(&shape.model.graph, Resolution::new(params, size));

        let mut mesh = TriangleMesh::new();
        for face in faces {
            mesh.append(&tess.face(face));
        }
        tracing::trace!(kind = ?shape.kind, facets = mesh.facet_count(), "tessellated");
        Ok(mesh)
    }

    fn native_material(&self, shape: &StepShape) -> Option<Material> {
        let graph = &shape.model.graph;
        let ids: Vec<u64> = match shape.kind {
            ShapeRef::Whole => return None,
            ShapeRef::Solid(id) => std::iter::once(id)
                .chain(graph.solid_shells(id))
                .chain(graph.solid_faces(id))
                .collect(),
            ShapeRef::Shell(id) => std::iter::once(id).chain(graph.shell_faces(id)).collect(),
            ShapeRef::Face(id) => vec![id],
        };
        shape.model.colours.material(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    pub(crate) const TRIANGLE: &str = r#"ISO-10303-21;
HEADER;
FILE_DESCRIPTION(('Test'),'2;1');
FILE_NAME('test.step','2024-01-01',(''),(''),'','','');
FILE_SCHEMA(('AP203'));
ENDSEC;
DATA;
#1=CARTESIAN_POINT('p0',(0.,0.,0.));
#2=CARTESIAN_POINT('p1',(1.,0.,0.));
#3=CARTESIAN_POINT('p2',(0.5,1.,0.));
#4=DIRECTION('z',(0.,0.,1.));
#5=DIRECTION('x',(1.,0.,0.));
#6=AXIS2_PLACEMENT_3D('',#1,#4,#5);
#7=PLANE('',#6);
#8=VERTEX_POINT('',#1);
#9=VERTEX_POINT('',#2);
#10=VERTEX_POINT('',#3);
#11=LINE('',#1,#20);
#12=LINE('',#2,#21);
#13=LINE('',#3,#22);
#20=VECTOR('',#5,1.);
#21=VECTOR('',#4,1.);
#22=VECTOR('',#4,1.);
#14=EDGE_CURVE('',#8,#9,#11,.T.);
#15=EDGE_CURVE('',#9,#10,#12,.T.);
#16=EDGE_CURVE('',#10,#8,#13,.T.);
#17=ORIENTED_EDGE('',*,*,#14,.T.);
#18=ORIENTED_EDGE('',*,*,#15,.T.);
#19=ORIENTED_EDGE('',*,*,#16,.T.);
#30=EDGE_LOOP('',(#17,#18,#19));
#31=FACE_OUTER_BOUND('',#30,.T.);
#32=ADVANCED_FACE('',(#31),#7,.T.);
#33=CLOSED_SHELL('',(#32));
#34=MANIFOLD_SOLID_BREP('triangle',#33);
#40=COLOUR_RGB('Blue',0.,0.,1.);
#41=FILL_AREA_STYLE_COLOUR('',#40);
#42=STYLED_ITEM('color',(#41),#34);
ENDSEC;
END-ISO-10303-21;
"#;

    fn load(text: &str) -> Result<StepShape> {
        StepKernel.load(text.as_bytes(), Path::new("test.step"))
    }

    #[test]
    fn test_rejects_non_step() {
        let err = load("random data").unwrap_err();
        assert!(matches!(err, KernelError::Read { .. }));
    }

    #[test]
    fn test_rejects_empty_data() {
        let err = load("ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\nENDSEC;\nEND-ISO-10303-21;\n").unwrap_err();
        assert!(matches!(err, KernelError::Parse { offset: None, .. }));
    }

    #[test]
    fn test_malformed_data_reports_offset() {
        let err = load("ISO-10303-21;\nDATA;\n#1=CARTESIAN_POINT('',(0.,0.,0.));\n#2=??;\nENDSEC;\n").unwrap_err();
        match err {
            KernelError::Parse { offset, .. } => assert!(offset.is_some()),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_bom_is_accepted() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(TRIANGLE.as_bytes());
        assert!(StepKernel.load(&bytes, Path::new("bom.step")).is_ok());
    }

    #[test]
    fn test_read_missing_file() {
        let err = StepKernel.read(Path::new("/nonexistent/part.step")).unwrap_err();
        assert!(matches!(err, KernelError::Read { .. }));
    }

    #[test]
    fn test_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triangle.step");
        std::fs::write(&path, TRIANGLE).unwrap();
        let shape = StepKernel.read(&path).unwrap();
        assert_eq!(shape.kind(), ShapeRef::Whole);
        assert_eq!(shape.model().source(), path.as_path());
    }

    #[test]
    fn test_classify_triangle_solid() {
        let shape = load(TRIANGLE).unwrap();
        let topo = StepKernel.classify(&shape);
        assert_eq!(topo.solids.len(), 1);
        assert_eq!(topo.shells.len(), 1);
        assert_eq!(topo.faces.len(), 1);
        assert_eq!(topo.solids[0].kind(), ShapeRef::Solid(34));

        let shells = StepKernel.solid_shells(&topo.solids[0]);
        assert_eq!(shells, vec![topo.shells[0].clone()]);
        assert!(StepKernel.solid_shells(&topo.faces[0]).is_empty());
    }

    #[test]
    fn test_tessellate_triangle() {
        let shape = load(TRIANGLE).unwrap();
        let solid = StepKernel.classify(&shape).solids.remove(0);
        let mesh = StepKernel.tessellate(&solid, &TessellationParams::default()).unwrap();
        assert_eq!(mesh.positions.len(), 3);
        assert_eq!(mesh.indices.len(), 3);
    }

    #[test]
    fn test_bounding_box() {
        let shape = load(TRIANGLE).unwrap();
        let bounds = StepKernel.bounding_box(&shape).unwrap();
        assert_eq!(bounds.min, Vec3::ZERO);
        assert_eq!(bounds.max, Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(bounds.max_dimension(), 1.0);
    }

    #[test]
    fn test_native_material() {
        let shape = load(TRIANGLE).unwrap();
        let topo = StepKernel.classify(&shape);
        let material = StepKernel.native_material(&topo.solids[0]).unwrap();
        assert_eq!(material.name, "Blue");
        assert!(material.double_sided);
        // Colour applied to the solid is not visible from its face alone.
        assert!(StepKernel.native_material(&topo.faces[0]).is_none());
        assert!(StepKernel.native_material(&shape).is_none());
    }

    #[test]
    fn test_shape_identity() {
        let a = load(TRIANGLE).unwrap();
        let b = load(TRIANGLE).unwrap();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_tessellate_without_faces_fails() {
        let shape = load("ISO-10303-21;\nDATA;\n#1=CARTESIAN_POINT('',(0.,0.,0.));\nENDSEC;\n").unwrap();
        assert!(StepKernel.tessellate(&shape, &TessellationParams::default()).is_err());
        assert!(matches!(StepKernel.bounding_box(&shape), Err(KernelError::Degenerate(_))));
        assert!(StepKernel.classify(&shape).is_empty());
    }
}
