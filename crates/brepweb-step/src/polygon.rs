//! Planar polygon helpers used by face tessellation.

use std::f32::consts::{PI, TAU};

pub type Uv = [f32; 2];

/// Signed area of a 2D polygon, positive when counter-clockwise.
pub fn signed_area(polygon: &[Uv]) -> f32 {
    let n = polygon.len();
    (0..n)
        .map(|i| {
            let (a, b) = (polygon[i], polygon[(i + 1) % n]);
            a[0] * b[1] - b[0] * a[1]
        })
        .sum::<f32>()
        / 2.0
}

fn cross(o: Uv, a: Uv, b: Uv) -> f32 {
    (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
}

fn point_in_triangle(p: Uv, a: Uv, b: Uv, c: Uv) -> bool {
    let d1 = cross(a, b, p);
    let d2 = cross(b, c, p);
    let d3 = cross(c, a, p);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

/// Proper crossing of segments AB and CD. Shared endpoints do not count.
fn segments_cross(a: Uv, b: Uv, c: Uv, d: Uv) -> bool {
    let d1 = cross(c, d, a);
    let d2 = cross(c, d, b);
    let d3 = cross(a, b, c);
    let d4 = cross(a, b, d);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

/// Ear-clipping triangulation of a simple polygon.
///
/// Triangles keep the winding of the input. When no ear can be found the
/// remainder is fanned from its first vertex so a bad boundary still yields
/// coverage.
pub fn triangulate(polygon: &[Uv]) -> Vec<[usize; 3]> {
    let n = polygon.len();
    if n < 3 {
        return Vec::new();
    }
    if n == 3 {
        return vec![[0, 1, 2]];
    }

    let ccw = signed_area(polygon) > 0.0;
    let convex = |a: Uv, b: Uv, c: Uv| {
        let z = cross(a, b, c);
        if ccw {
            z > 0.0
        } else {
            z < 0.0
        }
    };

    let mut remaining: Vec<usize> = (0..n).collect();
    let mut triangles = Vec::with_capacity(n - 2);

    while remaining.len() > 3 {
        let m = remaining.len();
        let ear = (0..m).find(|&i| {
            let (a, b, c) = (remaining[(i + m - 1) % m], remaining[i], remaining[(i + 1) % m]);
            convex(polygon[a], polygon[b], polygon[c])
                && remaining.iter().all(|&p| {
                    p == a
                        || p == b
                        || p == c
                        || polygon[p] == polygon[a]
                        || polygon[p] == polygon[b]
                        || polygon[p] == polygon[c]
                        || !point_in_triangle(polygon[p], polygon[a], polygon[b], polygon[c])
                })
        });

        match ear {
            Some(i) => {
                triangles.push([remaining[(i + m - 1) % m], remaining[i], remaining[(i + 1) % m]]);
                remaining.remove(i);
            }
            None => {
                for w in 1..m - 1 {
                    triangles.push([remaining[0], remaining[w], remaining[w + 1]]);
                }
                return triangles;
            }
        }
    }

    triangles.push([remaining[0], remaining[1], remaining[2]]);
    triangles
}

/// Splice holes into an outer loop with bridge edges so the result can be
/// ear-clipped. `outer` and each hole carry a payload per vertex (usually
/// the 3D point) that is spliced alongside.
pub fn merge_holes<T: Copy>(
    outer: (&[Uv], &[T]),
    holes: &[(Vec<Uv>, Vec<T>)],
) -> (Vec<Uv>, Vec<T>) {
    let mut uv = outer.0.to_vec();
    let mut payload = outer.1.to_vec();

    for (hole_uv, hole_payload) in holes {
        if hole_uv.len() < 3 || hole_uv.len() != hole_payload.len() {
            continue;
        }

        let start = hole_uv
            .iter()
            .enumerate()
            .fold(0, |best, (i, p)| if p[0] > hole_uv[best][0] { i } else { best });
        let hole_point = hole_uv[start];

        let visible = |i: usize| {
            let target = uv[i];
            let outer_clear = (0..uv.len()).all(|j| {
                let k = (j + 1) % uv.len();
                j == i || k == i || !segments_cross(hole_point, target, uv[j], uv[k])
            });
            let hole_clear = (0..hole_uv.len()).all(|j| {
                let k = (j + 1) % hole_uv.len();
                j == start || k == start || !segments_cross(hole_point, target, hole_uv[j], hole_uv[k])
            });
            outer_clear && hole_clear
        };

        let dist = |i: usize| {
            let d = [uv[i][0] - hole_point[0], uv[i][1] - hole_point[1]];
            d[0] * d[0] + d[1] * d[1]
        };

        let bridge = (0..uv.len())
            .filter(|&i| visible(i))
            .min_by(|&a, &b| dist(a).total_cmp(&dist(b)))
            .unwrap_or(0);

        let mut merged_uv = Vec::with_capacity(uv.len() + hole_uv.len() + 2);
        let mut merged_payload = Vec::with_capacity(merged_uv.capacity());

        merged_uv.extend_from_slice(&uv[..=bridge]);
        merged_payload.extend_from_slice(&payload[..=bridge]);
        for i in 0..=hole_uv.len() {
            let idx = (start + i) % hole_uv.len();
            merged_uv.push(hole_uv[idx]);
            merged_payload.push(hole_payload[idx]);
        }
        merged_uv.push(uv[bridge]);
        merged_payload.push(payload[bridge]);
        merged_uv.extend_from_slice(&uv[bridge + 1..]);
        merged_payload.extend_from_slice(&payload[bridge + 1..]);

        uv = merged_uv;
        payload = merged_payload;
    }

    (uv, payload)
}

/// Ray-casting point-in-polygon test.
pub fn contains(polygon: &[Uv], point: Uv) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi[1] > point[1]) != (pj[1] > point[1])
            && point[0] < (pj[0] - pi[0]) * (point[1] - pi[1]) / (pj[1] - pi[1]) + pi[0]
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Make an angle coordinate (`axis` 0 for U, 1 for V) continuous along a
/// loop so a boundary crossing the ±π seam does not jump by a full turn.
pub fn unwrap_angles(polygon: &[Uv], axis: usize) -> Vec<Uv> {
    let mut out: Vec<Uv> = Vec::with_capacity(polygon.len());
    for &p in polygon {
        let mut q = p;
        if let Some(prev) = out.last() {
            while q[axis] - prev[axis] > PI {
                q[axis] -= TAU;
            }
            while q[axis] - prev[axis] < -PI {
                q[axis] += TAU;
            }
        }
        out.push(q);
    }
    out
}

/// Bounds of a UV loop as `(min, max)`.
pub fn uv_bounds(polygon: &[Uv]) -> (Uv, Uv) {
    polygon.iter().fold(
        ([f32::INFINITY; 2], [f32::NEG_INFINITY; 2]),
        |(lo, hi), p| ([lo[0].min(p[0]), lo[1].min(p[1])], [hi[0].max(p[0]), hi[1].max(p[1])]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_square_two_triangles() {
        let square = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        let tris = triangulate(&square);
        assert_eq!(tris.len(), 2);
        let area: f32 = tris
            .iter()
            .map(|t| signed_area(&[square[t[0]], square[t[1]], square[t[2]]]))
            .sum();
        assert!((area - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_concave_polygon() {
        // L shape, area 3
        let l = [[0.0, 0.0], [2.0, 0.0], [2.0, 1.0], [1.0, 1.0], [1.0, 2.0], [0.0, 2.0]];
        let tris = triangulate(&l);
        assert_eq!(tris.len(), 4);
        let area: f32 = tris
            .iter()
            .map(|t| signed_area(&[l[t[0]], l[t[1]], l[t[2]]]))
            .sum();
        assert!((area - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_clockwise_winding_kept() {
        let cw = [[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]];
        for t in triangulate(&cw) {
            assert!(signed_area(&[cw[t[0]], cw[t[1]], cw[t[2]]]) < 0.0);
        }
    }

    #[test]
    fn test_merge_hole_area() {
        let outer = [[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0]];
        let hole = vec![[1.0, 1.0], [1.0, 3.0], [3.0, 3.0], [3.0, 1.0]];
        let (uv, ids) = merge_holes((&outer, &[0, 1, 2, 3]), &[(hole, vec![4, 5, 6, 7])]);
        assert_eq!(uv.len(), 4 + 4 + 2);
        assert_eq!(ids.len(), uv.len());

        let area: f32 = triangulate(&uv)
            .iter()
            .map(|t| signed_area(&[uv[t[0]], uv[t[1]], uv[t[2]]]))
            .sum();
        assert!((area - 12.0).abs() < 1e-4, "area was {area}");
    }

    #[test]
    fn test_contains() {
        let square = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        assert!(contains(&square, [0.5, 0.5]));
        assert!(!contains(&square, [1.5, 0.5]));
        assert!(!contains(&square[..2], [0.5, 0.5]));
    }

    #[test]
    fn test_unwrap_across_seam() {
        let loop_uv = [[3.0, 0.0], [-3.0, 0.0]];
        let out = unwrap_angles(&loop_uv, 0);
        assert!((out[1][0] - (TAU - 3.0)).abs() < 1e-5);

        let swapped = [[0.0, 3.0], [0.0, -3.0]];
        let out = unwrap_angles(&swapped, 1);
        assert!((out[1][1] - (TAU - 3.0)).abs() < 1e-5);
    }

    proptest! {
        #[test]
        fn prop_convex_polygon_covers_its_area(n in 3usize..48, radius in 0.1f32..100.0, phase in 0.0f32..TAU) {
            let polygon: Vec<Uv> = (0..n)
                .map(|i| {
                    let a = phase + TAU * i as f32 / n as f32;
                    [radius * a.cos(), radius * a.sin()]
                })
                .collect();
            let tris = triangulate(&polygon);
            prop_assert_eq!(tris.len(), n - 2);

            let area: f32 = tris
                .iter()
                .map(|t| signed_area(&[polygon[t[0]], polygon[t[1]], polygon[t[2]]]))
                .sum();
            let expected = signed_area(&polygon);
            prop_assert!((area - expected).abs() <= expected.abs() * 1e-3);
        }
    }
}
