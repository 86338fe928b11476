//! Typed STEP entities and the entity graph.
//!
//! Only the AP203/AP214/AP242 entities the kernel needs for B-rep topology,
//! surface geometry, and presentation colours are typed. Everything else is
//! kept as [`StepEntity::Unknown`] and remains reachable through the raw
//! instance map.

use glam::{Mat4, Vec3, Vec4};
use std::collections::HashMap;

use crate::p21::{EntityInstance, StepValue};

/// A processed STEP entity.
#[derive(Debug, Clone)]
pub enum StepEntity {
    // Geometry
    CartesianPoint(Vec3),
    Direction(Vec3),
    Vector { direction: u64, magnitude: f64 },
    Axis2Placement3D(Axis2Placement3D),
    Line { point: u64, vector: u64 },
    Circle { position: u64, radius: f64 },
    Ellipse { position: u64, semi_axis_1: f64, semi_axis_2: f64 },
    Plane { position: u64 },
    CylindricalSurface { position: u64, radius: f64 },
    ConicalSurface { position: u64, radius: f64, semi_angle: f64 },
    SphericalSurface { position: u64, radius: f64 },
    ToroidalSurface { position: u64, major_radius: f64, minor_radius: f64 },
    BSplineSurface(BSplineSurface),

    // Topology
    VertexPoint { point: u64 },
    EdgeCurve(EdgeCurve),
    OrientedEdge { edge: u64, orientation: bool },
    EdgeLoop { edges: Vec<u64> },
    PolyLoop { points: Vec<u64> },
    FaceBound(FaceBound),
    Face(Face),
    Shell(Shell),
    Solid(Solid),

    // Presentation
    StyledItem { styles: Vec<u64>, item: u64 },
    ColourRgb { name: String, rgb: Vec3 },
    PredefinedColour { name: String },

    /// Anything the kernel does not interpret.
    Unknown { type_name: String },
}

#[derive(Debug, Clone)]
pub struct Axis2Placement3D {
    pub location: u64,
    pub axis: Option<u64>,
    pub ref_direction: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct BSplineSurface {
    pub u_degree: usize,
    pub v_degree: usize,
    /// Control point ids, one row per U index.
    pub control_points: Vec<Vec<u64>>,
    pub u_knots: Vec<f64>,
    pub v_knots: Vec<f64>,
    pub u_multiplicities: Vec<u32>,
    pub v_multiplicities: Vec<u32>,
    /// Rational weights, same shape as `control_points`.
    pub weights: Option<Vec<Vec<f64>>>,
}

#[derive(Debug, Clone)]
pub struct EdgeCurve {
    pub start_vertex: u64,
    pub end_vertex: u64,
    pub curve: u64,
    pub same_sense: bool,
}

#[derive(Debug, Clone)]
pub struct FaceBound {
    pub bound: u64,
    pub orientation: bool,
    pub outer: bool,
}

/// ADVANCED_FACE or FACE_SURFACE.
#[derive(Debug, Clone)]
pub struct Face {
    pub name: String,
    pub bounds: Vec<u64>,
    pub surface: u64,
    pub same_sense: bool,
}

/// CLOSED_SHELL or OPEN_SHELL.
#[derive(Debug, Clone)]
pub struct Shell {
    pub name: String,
    pub faces: Vec<u64>,
    pub closed: bool,
}

/// MANIFOLD_SOLID_BREP, BREP_WITH_VOIDS, or FACETED_BREP.
#[derive(Debug, Clone)]
pub struct Solid {
    pub name: String,
    pub outer: u64,
    pub voids: Vec<u64>,
}

// ============================================================================
// Value Extraction Helpers
// ============================================================================

fn extract_string(value: &StepValue) -> String {
    match value {
        StepValue::String(s) => s.clone(),
        _ => String::new(),
    }
}

fn extract_real(value: &StepValue) -> f64 {
    match value {
        StepValue::Real(r) => *r,
        StepValue::Integer(i) => *i as f64,
        StepValue::Typed { value, .. } => extract_real(value),
        _ => 0.0,
    }
}

fn extract_ref(value: &StepValue) -> Option<u64> {
    match value {
        StepValue::Reference(r) => Some(*r),
        _ => None,
    }
}

fn extract_bool(value: &StepValue) -> bool {
    match value {
        StepValue::Enum(s) => s == "T" || s == "TRUE",
        _ => false,
    }
}

fn extract_ref_list(value: &StepValue) -> Vec<u64> {
    match value {
        StepValue::List(items) => items.iter().filter_map(extract_ref).collect(),
        _ => Vec::new(),
    }
}

fn extract_real_list(value: &StepValue) -> Vec<f64> {
    match value {
        StepValue::List(items) => items.iter().map(extract_real).collect(),
        _ => Vec::new(),
    }
}

fn extract_int_list(value: &StepValue) -> Vec<u32> {
    match value {
        StepValue::List(items) => items.iter().map(|v| extract_real(v).max(0.0) as u32).collect(),
        _ => Vec::new(),
    }
}

fn extract_coords(value: &StepValue) -> Vec3 {
    let reals = extract_real_list(value);
    Vec3::new(
        reals.first().copied().unwrap_or(0.0) as f32,
        reals.get(1).copied().unwrap_or(0.0) as f32,
        reals.get(2).copied().unwrap_or(0.0) as f32,
    )
}

fn extract_ref_grid(value: &StepValue) -> Vec<Vec<u64>> {
    match value {
        StepValue::List(rows) => rows.iter().map(extract_ref_list).collect(),
        _ => Vec::new(),
    }
}

fn extract_real_grid(value: &StepValue) -> Vec<Vec<f64>> {
    match value {
        StepValue::List(rows) => rows.iter().map(extract_real_list).collect(),
        _ => Vec::new(),
    }
}

// ============================================================================
// Entity Conversion
// ============================================================================

fn param_ref(params: &[StepValue], i: usize) -> u64 {
    params.get(i).and_then(extract_ref).unwrap_or(0)
}

fn param_real(params: &[StepValue], i: usize, default: f64) -> f64 {
    params.get(i).map(extract_real).unwrap_or(default)
}

fn param_bool(params: &[StepValue], i: usize, default: bool) -> bool {
    params.get(i).map(extract_bool).unwrap_or(default)
}

fn param_name(params: &[StepValue]) -> String {
    params.first().map(extract_string).unwrap_or_default()
}

/// B_SPLINE_SURFACE_WITH_KNOTS laid out as a simple instance:
/// (name, u_deg, v_deg, points, form, u_closed, v_closed, self_int,
///  u_mults, v_mults, u_knots, v_knots, knot_spec).
fn bspline_from_params(params: &[StepValue], weights: Option<Vec<Vec<f64>>>) -> BSplineSurface {
    BSplineSurface {
        u_degree: param_real(params, 1, 3.0) as usize,
        v_degree: param_real(params, 2, 3.0) as usize,
        control_points: params.get(3).map(extract_ref_grid).unwrap_or_default(),
        u_multiplicities: params.get(8).map(extract_int_list).unwrap_or_default(),
        v_multiplicities: params.get(9).map(extract_int_list).unwrap_or_default(),
        u_knots: params.get(10).map(extract_real_list).unwrap_or_default(),
        v_knots: params.get(11).map(extract_real_list).unwrap_or_default(),
        weights,
    }
}

/// A rational or polynomial B-spline surface written as a complex instance.
fn bspline_from_complex(instance: &EntityInstance) -> Option<BSplineSurface> {
    let surface = instance.part("B_SPLINE_SURFACE")?;
    let knots = instance.part("B_SPLINE_SURFACE_WITH_KNOTS")?;

    // Re-layout as the simple form: leading name, then surface params, then knots.
    let mut params = Vec::with_capacity(1 + surface.len() + knots.len());
    params.push(StepValue::String(String::new()));
    params.extend(surface.iter().take(7).cloned());
    params.extend(knots.iter().cloned());

    let weights = instance
        .part("RATIONAL_B_SPLINE_SURFACE")
        .and_then(|p| p.first())
        .map(extract_real_grid);

    Some(bspline_from_params(&params, weights))
}

/// Convert a raw entity instance to a typed entity.
pub fn convert_entity(instance: &EntityInstance) -> StepEntity {
    let params = instance.params.as_slice();

    if instance.is_complex() {
        return match bspline_from_complex(instance) {
            Some(surface) => StepEntity::BSplineSurface(surface),
            None => StepEntity::Unknown {
                type_name: instance.type_name.clone(),
            },
        };
    }

    match instance.type_name.as_str() {
        "CARTESIAN_POINT" => {
            StepEntity::CartesianPoint(params.get(1).map(extract_coords).unwrap_or(Vec3::ZERO))
        }
        "DIRECTION" => StepEntity::Direction(params.get(1).map(extract_coords).unwrap_or(Vec3::Z)),
        "VECTOR" => StepEntity::Vector {
            direction: param_ref(params, 1),
            magnitude: param_real(params, 2, 1.0),
        },
        "AXIS2_PLACEMENT_3D" => StepEntity::Axis2Placement3D(Axis2Placement3D {
            location: param_ref(params, 1),
            axis: params.get(2).and_then(extract_ref),
            ref_direction: params.get(3).and_then(extract_ref),
        }),
        "LINE" => StepEntity::Line {
            point: param_ref(params, 1),
            vector: param_ref(params, 2),
        },
        "CIRCLE" => StepEntity::Circle {
            position: param_ref(params, 1),
            radius: param_real(params, 2, 1.0),
        },
        "ELLIPSE" => StepEntity::Ellipse {
            position: param_ref(params, 1),
            semi_axis_1: param_real(params, 2, 1.0),
            semi_axis_2: param_real(params, 3, 1.0),
        },
        "PLANE" => StepEntity::Plane {
            position: param_ref(params, 1),
        },
        "CYLINDRICAL_SURFACE" => StepEntity::CylindricalSurface {
            position: param_ref(params, 1),
            radius: param_real(params, 2, 1.0),
        },
        "CONICAL_SURFACE" => StepEntity::ConicalSurface {
            position: param_ref(params, 1),
            radius: param_real(params, 2, 1.0),
            semi_angle: param_real(params, 3, 0.0),
        },
        "SPHERICAL_SURFACE" => StepEntity::SphericalSurface {
            position: param_ref(params, 1),
            radius: param_real(params, 2, 1.0),
        },
        "TOROIDAL_SURFACE" => StepEntity::ToroidalSurface {
            position: param_ref(params, 1),
            major_radius: param_real(params, 2, 1.0),
            minor_radius: param_real(params, 3, 0.5),
        },
        "B_SPLINE_SURFACE_WITH_KNOTS" => StepEntity::BSplineSurface(bspline_from_params(params, None)),

        // Topology
        "VERTEX_POINT" => StepEntity::VertexPoint {
            point: param_ref(params, 1),
        },
        "EDGE_CURVE" => StepEntity::EdgeCurve(EdgeCurve {
            start_vertex: param_ref(params, 1),
            end_vertex: param_ref(params, 2),
            curve: param_ref(params, 3),
            same_sense: param_bool(params, 4, true),
        }),
        // (name, vertex_1, vertex_2, edge_element, orientation)
        "ORIENTED_EDGE" => StepEntity::OrientedEdge {
            edge: param_ref(params, 3),
            orientation: param_bool(params, 4, true),
        },
        "EDGE_LOOP" => StepEntity::EdgeLoop {
            edges: params.get(1).map(extract_ref_list).unwrap_or_default(),
        },
        "POLY_LOOP" => StepEntity::PolyLoop {
            points: params.get(1).map(extract_ref_list).unwrap_or_default(),
        },
        "FACE_BOUND" | "FACE_OUTER_BOUND" => StepEntity::FaceBound(FaceBound {
            bound: param_ref(params, 1),
            orientation: param_bool(params, 2, true),
            outer: instance.type_name == "FACE_OUTER_BOUND",
        }),
        "ADVANCED_FACE" | "FACE_SURFACE" => StepEntity::Face(Face {
            name: param_name(params),
            bounds: params.get(1).map(extract_ref_list).unwrap_or_default(),
            surface: param_ref(params, 2),
            same_sense: param_bool(params, 3, true),
        }),
        "CLOSED_SHELL" | "OPEN_SHELL" => StepEntity::Shell(Shell {
            name: param_name(params),
            faces: params.get(1).map(extract_ref_list).unwrap_or_default(),
            closed: instance.type_name == "CLOSED_SHELL",
        }),
        "MANIFOLD_SOLID_BREP" | "FACETED_BREP" => StepEntity::Solid(Solid {
            name: param_name(params),
            outer: param_ref(params, 1),
            voids: Vec::new(),
        }),
        "BREP_WITH_VOIDS" => StepEntity::Solid(Solid {
            name: param_name(params),
            outer: param_ref(params, 1),
            voids: params.get(2).map(extract_ref_list).unwrap_or_default(),
        }),

        // Presentation
        "STYLED_ITEM" | "OVER_RIDING_STYLED_ITEM" => StepEntity::StyledItem {
            styles: params.get(1).map(extract_ref_list).unwrap_or_default(),
            item: param_ref(params, 2),
        },
        "COLOUR_RGB" => StepEntity::ColourRgb {
            name: param_name(params),
            rgb: Vec3::new(
                param_real(params, 1, 0.0) as f32,
                param_real(params, 2, 0.0) as f32,
                param_real(params, 3, 0.0) as f32,
            ),
        },
        "DRAUGHTING_PRE_DEFINED_COLOUR" => StepEntity::PredefinedColour {
            name: param_name(params),
        },

        _ => StepEntity::Unknown {
            type_name: instance.type_name.clone(),
        },
    }
}

/// The draughting pre-defined colours.
fn predefined_colour(name: &str) -> Option<Vec3> {
    let rgb = match name.to_ascii_lowercase().as_str() {
        "black" => Vec3::ZERO,
        "red" => Vec3::X,
        "green" => Vec3::Y,
        "blue" => Vec3::Z,
        "yellow" => Vec3::new(1.0, 1.0, 0.0),
        "magenta" => Vec3::new(1.0, 0.0, 1.0),
        "cyan" => Vec3::new(0.0, 1.0, 1.0),
        "white" => Vec3::ONE,
        _ => return None,
    };
    Some(rgb)
}

/// Entity map with file order preserved.
#[derive(Debug, Default)]
pub struct EntityGraph {
    entities: HashMap<u64, StepEntity>,
    raw: HashMap<u64, EntityInstance>,
    /// Instance ids in file order.
    order: Vec<u64>,
}

impl EntityGraph {
    /// Build an entity graph from raw instances.
    pub fn new(instances: Vec<EntityInstance>) -> Self {
        let mut graph = Self {
            entities: HashMap::with_capacity(instances.len()),
            raw: HashMap::with_capacity(instances.len()),
            order: Vec::with_capacity(instances.len()),
        };
        for inst in instances {
            graph.order.push(inst.id);
            graph.entities.insert(inst.id, convert_entity(&inst));
            graph.raw.insert(inst.id, inst);
        }
        graph
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when the file had no instances.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Get an entity by ID.
    pub fn get(&self, id: u64) -> Option<&StepEntity> {
        self.entities.get(&id)
    }

    /// Get the raw instance by ID.
    pub fn raw(&self, id: u64) -> Option<&EntityInstance> {
        self.raw.get(&id)
    }

    /// Get a cartesian point by ID.
    pub fn point(&self, id: u64) -> Option<Vec3> {
        match self.get(id)? {
            StepEntity::CartesianPoint(p) => Some(*p),
            _ => None,
        }
    }

    /// Get a normalized direction by ID.
    pub fn direction(&self, id: u64) -> Option<Vec3> {
        match self.get(id)? {
            StepEntity::Direction(d) => Some(d.normalize_or_zero()),
            _ => None,
        }
    }

    /// Get vertex point coordinates.
    pub fn vertex_coords(&self, id: u64) -> Option<Vec3> {
        match self.get(id)? {
            StepEntity::VertexPoint { point } => self.point(*point),
            _ => None,
        }
    }

    pub fn face(&self, id: u64) -> Option<&Face> {
        match self.get(id)? {
            StepEntity::Face(f) => Some(f),
            _ => None,
        }
    }

    pub fn shell(&self, id: u64) -> Option<&Shell> {
        match self.get(id)? {
            StepEntity::Shell(s) => Some(s),
            _ => None,
        }
    }

    pub fn solid(&self, id: u64) -> Option<&Solid> {
        match self.get(id)? {
            StepEntity::Solid(s) => Some(s),
            _ => None,
        }
    }

    fn ids_where(&self, pred: impl Fn(&StepEntity) -> bool) -> Vec<u64> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.entities.get(id).is_some_and(&pred))
            .collect()
    }

    /// Solids in file order.
    pub fn solids(&self) -> Vec<u64> {
        self.ids_where(|e| matches!(e, StepEntity::Solid(_)))
    }

    /// Shells in file order.
    pub fn shells(&self) -> Vec<u64> {
        self.ids_where(|e| matches!(e, StepEntity::Shell(_)))
    }

    /// Faces in file order.
    pub fn faces(&self) -> Vec<u64> {
        self.ids_where(|e| matches!(e, StepEntity::Face(_)))
    }

    /// Styled items in file order.
    pub fn styled_items(&self) -> Vec<u64> {
        self.ids_where(|e| matches!(e, StepEntity::StyledItem { .. }))
    }

    /// Outer and void shells of a solid.
    pub fn solid_shells(&self, solid_id: u64) -> Vec<u64> {
        match self.solid(solid_id) {
            Some(solid) => std::iter::once(solid.outer)
                .chain(solid.voids.iter().copied())
                .filter(|id| self.shell(*id).is_some())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Faces of a shell.
    pub fn shell_faces(&self, shell_id: u64) -> Vec<u64> {
        self.shell(shell_id)
            .map(|s| s.faces.iter().copied().filter(|f| self.face(*f).is_some()).collect())
            .unwrap_or_default()
    }

    /// Faces of a solid, across all its shells.
    pub fn solid_faces(&self, solid_id: u64) -> Vec<u64> {
        self.solid_shells(solid_id)
            .into_iter()
            .flat_map(|shell| self.shell_faces(shell))
            .collect()
    }

    /// Compute a placement transform: Z is the placement axis, X the
    /// reference direction, origin the location.
    pub fn axis_placement_transform(&self, placement_id: u64) -> Mat4 {
        let placement = match self.get(placement_id) {
            Some(StepEntity::Axis2Placement3D(p)) => p,
            _ => return Mat4::IDENTITY,
        };

        let origin = self.point(placement.location).unwrap_or(Vec3::ZERO);
        let z_axis = placement
            .axis
            .and_then(|id| self.direction(id))
            .filter(|d| *d != Vec3::ZERO)
            .unwrap_or(Vec3::Z);
        let x_hint = placement
            .ref_direction
            .and_then(|id| self.direction(id))
            .filter(|d| d.cross(z_axis).length_squared() > 1e-12)
            .unwrap_or_else(|| if z_axis.x.abs() < 0.9 { Vec3::X } else { Vec3::Y });

        // Gram-Schmidt
        let x_axis = (x_hint - z_axis * z_axis.dot(x_hint)).normalize();
        let y_axis = z_axis.cross(x_axis).normalize();

        Mat4::from_cols(
            x_axis.extend(0.0),
            y_axis.extend(0.0),
            z_axis.extend(0.0),
            origin.extend(1.0),
        )
    }

    /// RGBA colour of a COLOUR_RGB or pre-defined colour entity.
    pub fn colour(&self, id: u64) -> Option<(String, Vec4)> {
        match self.get(id)? {
            StepEntity::ColourRgb { name, rgb } => Some((name.clone(), rgb.extend(1.0))),
            StepEntity::PredefinedColour { name } => {
                predefined_colour(name).map(|rgb| (name.clone(), rgb.extend(1.0)))
            }
            _ => None,
        }
    }
}
