//! Face tessellation driven by linear and angular deflection.
//!
//! Boundaries are sampled from the face's edge loops, then each surface
//! type is meshed in its own parameter space:
//!
//! - planes: ear clipping of the projected loops, holes bridged in
//! - cylinders, cones, spheres, tori: a (u, v) grid trimmed to the outer loop
//! - B-spline surfaces: a grid over the knot domain
//! - anything else: ear clipping in the best-fit plane of the boundary

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use brepweb_core::{BoundingBox, TessellationParams, TriangleMesh};
use glam::{DVec3, Mat4, Vec3};

use crate::bspline::{expand_knots, Surface};
use crate::entities::{BSplineSurface, EdgeCurve, EntityGraph, Face, StepEntity};
use crate::polygon::{self, Uv};

const MAX_ARC_SEGMENTS: usize = 256;
const MAX_LINEAR_SEGMENTS: usize = 64;
const MIN_SPLINE_SEGMENTS: usize = 8;
const MAX_SPLINE_SEGMENTS: usize = 128;

/// Resolved tolerances for one tessellation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    /// Chord height limit in model units. Infinite disables the chord rule.
    pub linear: f64,
    /// Angle limit per segment, in radians.
    pub angular: f64,
}

impl Resolution {
    /// Resolve parameters against the size of the shape being meshed.
    pub fn new(params: &TessellationParams, size: f64) -> Self {
        let linear = if params.relative {
            params.linear_deflection * size
        } else {
            params.linear_deflection
        };
        Self {
            linear: if linear.is_finite() && linear > 0.0 { linear } else { f64::INFINITY },
            angular: if params.angular_deflection > 0.0 { params.angular_deflection } else { 0.5 },
        }
    }

    /// Coarse sampling used for extents.
    pub fn coarse() -> Self {
        Self {
            linear: f64::INFINITY,
            angular: PI / 8.0,
        }
    }

    /// Segments for an arc of `radius` sweeping `span` radians.
    pub fn arc_segments(&self, radius: f64, span: f64) -> usize {
        let span = span.abs();
        if !(span > 1e-12) {
            return 1;
        }

        let by_angle = (span / self.angular).ceil();
        let by_chord = if radius > self.linear {
            let step = 2.0 * (1.0 - self.linear / radius).acos();
            if step > 1e-9 {
                (span / step).ceil()
            } else {
                MAX_ARC_SEGMENTS as f64
            }
        } else {
            1.0
        };
        let floor = (4.0 * span / TAU).ceil();

        by_angle
            .max(by_chord)
            .max(floor)
            .clamp(1.0, MAX_ARC_SEGMENTS as f64) as usize
    }

    /// Segments along a B-spline direction with `controls` control points
    /// whose control polygon turns by `turning` radians.
    pub fn spline_segments(&self, controls: usize, turning: f64) -> usize {
        let by_angle = (turning / self.angular).ceil() as usize;
        (controls * 2)
            .max(by_angle)
            .clamp(MIN_SPLINE_SEGMENTS, MAX_SPLINE_SEGMENTS)
    }
}

/// Outer and inner boundary loops of a face, as sampled 3D points.
#[derive(Debug, Default)]
struct Loops {
    outer: Vec<Vec3>,
    holes: Vec<Vec<Vec3>>,
}

impl Loops {
    fn points(&self) -> impl Iterator<Item = &Vec3> {
        self.outer.iter().chain(self.holes.iter().flatten())
    }
}

/// Surfaces of revolution about the placement Z axis.
#[derive(Debug, Clone, Copy)]
enum Revolved {
    Cylinder { radius: f64 },
    Cone { radius: f64, semi_angle: f64 },
    Sphere { radius: f64 },
    Torus { major: f64, minor: f64 },
}

impl Revolved {
    /// Local point to (angle, v).
    fn to_uv(self, p: Vec3) -> Uv {
        let theta = p.y.atan2(p.x);
        let v = match self {
            Revolved::Cylinder { .. } | Revolved::Cone { .. } => p.z,
            Revolved::Sphere { .. } => {
                let r = p.length();
                if r > 0.0 {
                    (p.z / r).clamp(-1.0, 1.0).asin()
                } else {
                    0.0
                }
            }
            Revolved::Torus { major, .. } => {
                let rho = (p.x * p.x + p.y * p.y).sqrt();
                p.z.atan2(rho - major as f32)
            }
        };
        [theta, v]
    }

    /// (angle, v) to local point.
    fn point(self, u: f64, v: f64) -> DVec3 {
        let (s, c) = u.sin_cos();
        match self {
            Revolved::Cylinder { radius } => DVec3::new(radius * c, radius * s, v),
            Revolved::Cone { radius, semi_angle } => {
                let r = radius + v * semi_angle.tan();
                DVec3::new(r * c, r * s, v)
            }
            Revolved::Sphere { radius } => {
                let (sl, cl) = v.sin_cos();
                DVec3::new(radius * cl * c, radius * cl * s, radius * sl)
            }
            Revolved::Torus { major, minor } => {
                let (sv, cv) = v.sin_cos();
                let rho = major + minor * cv;
                DVec3::new(rho * c, rho * s, minor * sv)
            }
        }
    }

    fn periodic_v(self) -> bool {
        matches!(self, Revolved::Torus { .. })
    }

    /// V range used when the boundary does not bound V.
    fn full_v(self) -> Option<(f64, f64)> {
        match self {
            Revolved::Sphere { .. } => Some((-FRAC_PI_2, FRAC_PI_2)),
            Revolved::Torus { .. } => Some((-PI, PI)),
            Revolved::Cylinder { .. } | Revolved::Cone { .. } => None,
        }
    }

    /// Largest radius swept by the angle parameter over `v0..v1`.
    fn sweep_radius(self, v0: f64, v1: f64) -> f64 {
        match self {
            Revolved::Cylinder { radius } | Revolved::Sphere { radius } => radius.abs(),
            Revolved::Cone { radius, semi_angle } => {
                let t = semi_angle.tan();
                (radius + v0 * t).abs().max((radius + v1 * t).abs())
            }
            Revolved::Torus { major, minor } => major.abs() + minor.abs(),
        }
    }

    fn v_segments(self, res: &Resolution, v0: f64, v1: f64, u_step: f64) -> usize {
        let span = (v1 - v0).abs();
        match self {
            Revolved::Cylinder { .. } | Revolved::Cone { .. } => {
                let length = match self {
                    Revolved::Cone { semi_angle, .. } => span / semi_angle.cos().abs().max(1e-6),
                    _ => span,
                };
                if u_step > 1e-12 {
                    ((length / u_step).ceil() as usize).clamp(1, MAX_LINEAR_SEGMENTS)
                } else {
                    1
                }
            }
            Revolved::Sphere { radius } => res.arc_segments(radius, span),
            Revolved::Torus { minor, .. } => res.arc_segments(minor, span),
        }
    }
}

/// Tessellates faces of one entity graph.
pub struct Tessellator<'a> {
    graph: &'a EntityGraph,
    res: Resolution,
}

impl<'a> Tessellator<'a> {
    pub fn new(graph: &'a EntityGraph, res: Resolution) -> Self {
        Self { graph, res }
    }

    /// Tessellate one face. Faces that cannot be meshed yield an empty mesh.
    pub fn face(&self, face_id: u64) -> TriangleMesh {
        let Some(face) = self.graph.face(face_id) else {
            return TriangleMesh::new();
        };
        let loops = self.face_loops(face);
        let frame = |position: &u64| self.graph.axis_placement_transform(*position);

        match self.graph.get(face.surface) {
            Some(StepEntity::Plane { position }) => self.planar(face, &loops, frame(position)),
            Some(StepEntity::CylindricalSurface { position, radius }) => {
                self.revolved(face, &loops, frame(position), Revolved::Cylinder { radius: *radius })
            }
            Some(StepEntity::ConicalSurface {
                position,
                radius,
                semi_angle,
            }) => self.revolved(
                face,
                &loops,
                frame(position),
                Revolved::Cone {
                    radius: *radius,
                    semi_angle: *semi_angle,
                },
            ),
            Some(StepEntity::SphericalSurface { position, radius }) => {
                self.revolved(face, &loops, frame(position), Revolved::Sphere { radius: *radius })
            }
            Some(StepEntity::ToroidalSurface {
                position,
                major_radius,
                minor_radius,
            }) => self.revolved(
                face,
                &loops,
                frame(position),
                Revolved::Torus {
                    major: *major_radius,
                    minor: *minor_radius,
                },
            ),
            Some(StepEntity::BSplineSurface(surface)) => self
                .bspline(face, surface)
                .unwrap_or_else(|| self.fallback(&loops)),
            _ => self.fallback(&loops),
        }
    }

    /// Extents of a face from its sampled boundary, or from the analytic
    /// surface when the face has no boundary.
    pub fn face_extent(&self, face_id: u64) -> BoundingBox {
        let Some(face) = self.graph.face(face_id) else {
            return BoundingBox::empty();
        };
        let loops = self.face_loops(face);
        let mut bounds = BoundingBox::empty();
        loops.points().for_each(|p| bounds.expand_point(*p));
        if !bounds.is_empty() {
            return bounds;
        }

        let (position, reach) = match self.graph.get(face.surface) {
            Some(StepEntity::SphericalSurface { position, radius }) => (*position, *radius),
            Some(StepEntity::ToroidalSurface {
                position,
                major_radius,
                minor_radius,
            }) => (*position, major_radius + minor_radius),
            _ => return bounds,
        };
        let frame = self.graph.axis_placement_transform(position);
        let r = reach.abs() as f32;
        for corner in 0..8 {
            let sign = |bit: usize| if corner & bit == 0 { -r } else { r };
            bounds.expand_point(frame.transform_point3(Vec3::new(sign(1), sign(2), sign(4))));
        }
        bounds
    }

    // ------------------------------------------------------------------
    // Boundary sampling
    // ------------------------------------------------------------------

    fn face_loops(&self, face: &Face) -> Loops {
        let mut sampled: Vec<(bool, Vec<Vec3>)> = Vec::with_capacity(face.bounds.len());
        for bound_id in &face.bounds {
            if let Some(StepEntity::FaceBound(bound)) = self.graph.get(*bound_id) {
                let mut points = self.loop_points(bound.bound);
                if !bound.orientation {
                    points.reverse();
                }
                if !points.is_empty() {
                    sampled.push((bound.outer, points));
                }
            }
        }

        let outer = sampled.iter().position(|(outer, _)| *outer).unwrap_or(0);
        let mut loops = Loops::default();
        for (i, (_, points)) in sampled.into_iter().enumerate() {
            if i == outer {
                loops.outer = points;
            } else {
                loops.holes.push(points);
            }
        }
        loops
    }

    fn loop_points(&self, loop_id: u64) -> Vec<Vec3> {
        let mut points = Vec::new();
        match self.graph.get(loop_id) {
            Some(StepEntity::EdgeLoop { edges }) => {
                for edge in edges {
                    for p in self.edge_points(*edge) {
                        push_distinct(&mut points, p);
                    }
                }
            }
            Some(StepEntity::PolyLoop { points: ids }) => {
                for p in ids.iter().filter_map(|id| self.graph.point(*id)) {
                    push_distinct(&mut points, p);
                }
            }
            _ => {}
        }
        while points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        points
    }

    /// Points along an oriented edge from its start, excluding its end.
    fn edge_points(&self, edge_id: u64) -> Vec<Vec3> {
        let (curve_edge, orientation) = match self.graph.get(edge_id) {
            Some(StepEntity::OrientedEdge { edge, orientation }) => match self.graph.get(*edge) {
                Some(StepEntity::EdgeCurve(ec)) => (ec, *orientation),
                _ => return Vec::new(),
            },
            Some(StepEntity::EdgeCurve(ec)) => (ec, true),
            _ => return Vec::new(),
        };

        let mut points = self.curve_points(curve_edge);
        if !orientation {
            points.reverse();
        }
        points.pop();
        points
    }

    /// Points along an edge curve from its start vertex to its end vertex.
    fn curve_points(&self, edge: &EdgeCurve) -> Vec<Vec3> {
        let (Some(start), Some(end)) = (
            self.graph.vertex_coords(edge.start_vertex),
            self.graph.vertex_coords(edge.end_vertex),
        ) else {
            return Vec::new();
        };

        match self.graph.get(edge.curve) {
            Some(StepEntity::Circle { position, radius }) => {
                self.arc(*position, *radius, *radius, start, end, edge.same_sense)
            }
            Some(StepEntity::Ellipse {
                position,
                semi_axis_1,
                semi_axis_2,
            }) => self.arc(*position, *semi_axis_1, *semi_axis_2, start, end, edge.same_sense),
            _ => vec![start, end],
        }
    }

    /// Sample a conic arc. `forward` follows the curve's own direction
    /// (counter-clockwise about the placement axis).
    fn arc(&self, position: u64, a: f64, b: f64, start: Vec3, end: Vec3, forward: bool) -> Vec<Vec3> {
        if !(a > 0.0 && b > 0.0) {
            return vec![start, end];
        }
        let frame = self.graph.axis_placement_transform(position);
        let inverse = frame.inverse();
        let local_start = inverse.transform_point3(start);
        let local_end = inverse.transform_point3(end);

        let angle = |p: Vec3| (p.y as f64 / b).atan2(p.x as f64 / a);
        let t0 = angle(local_start);
        let closed = (start - end).length() < 1e-6;

        let mut sweep = if closed { TAU } else { angle(local_end) - t0 };
        if forward {
            while sweep <= 0.0 {
                sweep += TAU;
            }
        } else {
            if closed {
                sweep = -TAU;
            }
            while sweep >= 0.0 {
                sweep -= TAU;
            }
        }

        let n = self.res.arc_segments(a.max(b), sweep);
        let z = local_start.z;
        let mut points: Vec<Vec3> = (0..=n)
            .map(|i| {
                let t = t0 + sweep * i as f64 / n as f64;
                let local = Vec3::new((a * t.cos()) as f32, (b * t.sin()) as f32, z);
                frame.transform_point3(local)
            })
            .collect();
        // Exact endpoints keep adjacent faces watertight.
        points[0] = start;
        points[n] = end;
        points
    }

    // ------------------------------------------------------------------
    // Surfaces
    // ------------------------------------------------------------------

    fn planar(&self, face: &Face, loops: &Loops, frame: Mat4) -> TriangleMesh {
        if loops.outer.len() < 3 {
            return TriangleMesh::new();
        }
        let inverse = frame.inverse();
        triangulate_loops(loops, face.same_sense, |p| {
            let local = inverse.transform_point3(*p);
            [local.x, local.y]
        })
    }

    fn revolved(&self, face: &Face, loops: &Loops, frame: Mat4, kind: Revolved) -> TriangleMesh {
        let inverse = frame.inverse();
        let project = |points: &[Vec3]| -> Vec<Uv> {
            let raw: Vec<Uv> = points
                .iter()
                .map(|p| kind.to_uv(inverse.transform_point3(*p)))
                .collect();
            let uv = polygon::unwrap_angles(&raw, 0);
            if kind.periodic_v() {
                polygon::unwrap_angles(&uv, 1)
            } else {
                uv
            }
        };

        let outer = project(loops.outer.as_slice());
        let holes: Vec<Vec<Uv>> = loops.holes.iter().map(|h| project(h.as_slice())).collect();
        let all: Vec<Uv> = outer.iter().chain(holes.iter().flatten()).copied().collect();

        let (u0, u1, v0, v1) = if all.is_empty() {
            match kind.full_v() {
                Some((v0, v1)) => (-PI, PI, v0, v1),
                None => return TriangleMesh::new(),
            }
        } else {
            let (lo, hi) = polygon::uv_bounds(&all);
            let (mut u0, mut u1) = (lo[0] as f64, hi[0] as f64);
            if u1 - u0 < 1e-4 || u1 - u0 > TAU - 1e-3 {
                u1 = u0 + TAU;
            }
            u0 = u0.min(u1);
            let (v0, v1) = if hi[1] - lo[1] > 1e-6 {
                (lo[1] as f64, hi[1] as f64)
            } else {
                match kind.full_v() {
                    Some(range) => range,
                    None => return TriangleMesh::new(),
                }
            };
            (u0, u1, v0, v1)
        };

        let u_segments = self.res.arc_segments(kind.sweep_radius(v0, v1), u1 - u0);
        let u_step = kind.sweep_radius(v0, v1) * (u1 - u0) / u_segments as f64;
        let v_segments = kind.v_segments(&self.res, v0, v1, u_step);

        let rect = (u1 - u0) * (v1 - v0);
        let trimmed = outer.len() >= 3 && polygon::signed_area(&outer).abs() as f64 > 1e-3 * rect;
        let keep = |u: f64, v: f64| {
            if !trimmed {
                return true;
            }
            let p = [u as f32, v as f32];
            polygon::contains(&outer, p) && !holes.iter().any(|h| polygon::contains(h, p))
        };

        grid(
            (u0, u1, u_segments),
            (v0, v1, v_segments),
            keep,
            |u, v| frame.transform_point3(kind.point(u, v).as_vec3()),
            face.same_sense,
        )
    }

    fn bspline(&self, face: &Face, spline: &BSplineSurface) -> Option<TriangleMesh> {
        let points = spline
            .control_points
            .iter()
            .map(|row| {
                row.iter()
                    .map(|id| self.graph.point(*id).map(|p| p.as_dvec3()))
                    .collect::<Option<Vec<_>>>()
            })
            .collect::<Option<Vec<_>>>()?;

        let rows = points.len();
        let cols = points.first().map_or(0, Vec::len);
        if rows < 2 || cols < 2 || points.iter().any(|r| r.len() != cols) {
            return None;
        }

        let u_knots = expand_knots(&spline.u_knots, &spline.u_multiplicities);
        let v_knots = expand_knots(&spline.v_knots, &spline.v_multiplicities);
        if u_knots.len() != rows + spline.u_degree + 1 || v_knots.len() != cols + spline.v_degree + 1 {
            return None;
        }

        let surface = Surface::new(
            points,
            spline.weights.as_deref(),
            u_knots,
            v_knots,
            spline.u_degree,
            spline.v_degree,
        );
        let ((u0, u1), (v0, v1)) = surface.domain();
        if !(u1 > u0 && v1 > v0) {
            return None;
        }
        let (turn_u, turn_v) = surface.control_turning();

        Some(grid(
            (u0, u1, self.res.spline_segments(rows, turn_u)),
            (v0, v1, self.res.spline_segments(cols, turn_v)),
            |_, _| true,
            |u, v| surface.evaluate(u, v).as_vec3(),
            face.same_sense,
        ))
    }

    /// Ear clipping in the best-fit plane of the outer loop. The loop's own
    /// winding gives the facet orientation.
    fn fallback(&self, loops: &Loops) -> TriangleMesh {
        if loops.outer.len() < 3 {
            return TriangleMesh::new();
        }
        let normal = newell_normal(&loops.outer);
        if normal == Vec3::ZERO {
            return TriangleMesh::new();
        }
        let origin = loops.outer[0];
        let x_axis = normal.any_orthonormal_vector();
        let y_axis = normal.cross(x_axis);
        triangulate_loops(loops, true, |p| {
            let d = *p - origin;
            [d.dot(x_axis), d.dot(y_axis)]
        })
    }
}

fn push_distinct(points: &mut Vec<Vec3>, p: Vec3) {
    if points.last().map_or(true, |last| (*last - p).length() > 1e-6) {
        points.push(p);
    }
}

fn newell_normal(points: &[Vec3]) -> Vec3 {
    let n = points.len();
    (0..n)
        .fold(Vec3::ZERO, |acc, i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            acc + Vec3::new(
                (a.y - b.y) * (a.z + b.z),
                (a.z - b.z) * (a.x + b.x),
                (a.x - b.x) * (a.y + b.y),
            )
        })
        .normalize_or_zero()
}

/// Skip zero-area facets, which carry no surface.
fn push_facet(mesh: &mut TriangleMesh, a: u32, b: u32, c: u32, same_sense: bool) {
    let p = |i: u32| mesh.positions[i as usize];
    if (p(b) - p(a)).cross(p(c) - p(a)).length_squared() > 0.0 {
        mesh.push_triangle(a, b, c, same_sense);
    }
}

/// Triangulate an outer loop with holes in a 2D projection. Facets face
/// +Z of the projection when `same_sense`, -Z otherwise.
fn triangulate_loops(loops: &Loops, same_sense: bool, to_uv: impl Fn(&Vec3) -> Uv) -> TriangleMesh {
    let outer_uv: Vec<Uv> = loops.outer.iter().map(&to_uv).collect();
    let outer_ccw = polygon::signed_area(&outer_uv) > 0.0;

    // Holes must wind against the outer loop for the bridge splice.
    let holes: Vec<(Vec<Uv>, Vec<Vec3>)> = loops
        .holes
        .iter()
        .filter(|h| h.len() >= 3)
        .map(|h| {
            let mut uv: Vec<Uv> = h.iter().map(&to_uv).collect();
            let mut points = h.clone();
            if (polygon::signed_area(&uv) > 0.0) == outer_ccw {
                uv.reverse();
                points.reverse();
            }
            (uv, points)
        })
        .collect();

    let (uv, points) = polygon::merge_holes((&outer_uv, &loops.outer), &holes);
    let mut mesh = TriangleMesh::new();
    mesh.positions = points;

    for [a, b, c] in polygon::triangulate(&uv) {
        let area = polygon::signed_area(&[uv[a], uv[b], uv[c]]);
        if area == 0.0 {
            continue;
        }
        let (b, c) = if area > 0.0 { (b, c) } else { (c, b) };
        push_facet(&mut mesh, a as u32, b as u32, c as u32, same_sense);
    }
    mesh
}

/// Mesh a parametric grid. Cells whose centre fails `keep` are dropped;
/// facets follow dS/du x dS/dv when `same_sense`.
fn grid(
    (u0, u1, nu): (f64, f64, usize),
    (v0, v1, nv): (f64, f64, usize),
    keep: impl Fn(f64, f64) -> bool,
    eval: impl Fn(f64, f64) -> Vec3,
    same_sense: bool,
) -> TriangleMesh {
    let (nu, nv) = (nu.max(1), nv.max(1));
    let u_at = |i: usize| u0 + (u1 - u0) * i as f64 / nu as f64;
    let v_at = |j: usize| v0 + (v1 - v0) * j as f64 / nv as f64;

    let mut mesh = TriangleMesh::new();
    let mut slots: Vec<Option<u32>> = vec![None; (nu + 1) * (nv + 1)];
    let mut vertex = |mesh: &mut TriangleMesh, i: usize, j: usize| -> u32 {
        *slots[j * (nu + 1) + i].get_or_insert_with(|| {
            mesh.positions.push(eval(u_at(i), v_at(j)));
            (mesh.positions.len() - 1) as u32
        })
    };

    for j in 0..nv {
        for i in 0..nu {
            if !keep((u_at(i) + u_at(i + 1)) / 2.0, (v_at(j) + v_at(j + 1)) / 2.0) {
                continue;
            }
            let q0 = vertex(&mut mesh, i, j);
            let q1 = vertex(&mut mesh, i + 1, j);
            let q2 = vertex(&mut mesh, i + 1, j + 1);
            let q3 = vertex(&mut mesh, i, j + 1);
            push_facet(&mut mesh, q0, q1, q2, same_sense);
            push_facet(&mut mesh, q0, q2, q3, same_sense);
        }
    }
    mesh
}
