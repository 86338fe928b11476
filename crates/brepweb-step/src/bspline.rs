//! B-spline surface evaluation.

use glam::{DVec3, DVec4};

/// Expand distinct knots and their multiplicities into a full knot vector.
pub fn expand_knots(knots: &[f64], multiplicities: &[u32]) -> Vec<f64> {
    knots
        .iter()
        .zip(multiplicities)
        .flat_map(|(&k, &m)| std::iter::repeat(k).take(m as usize))
        .collect()
}

/// De Boor evaluation of a curve with homogeneous control points.
fn de_boor(points: &[DVec4], knots: &[f64], degree: usize, t: f64) -> DVec4 {
    let n = points.len();
    match n {
        0 => return DVec4::ZERO,
        1 => return points[0],
        _ => {}
    }
    if knots.len() < n + degree + 1 {
        // Malformed knot vector: fall back to the nearest control point.
        let i = ((t.clamp(0.0, 1.0)) * (n - 1) as f64).round() as usize;
        return points[i.min(n - 1)];
    }

    // Span k with knots[k] <= t < knots[k + 1], clamped to the valid range.
    let last = n - 1;
    let k = (degree..=last)
        .find(|&i| t >= knots[i] && t < knots[i + 1])
        .unwrap_or(if t < knots[degree] { degree } else { last });

    let mut d: Vec<DVec4> = (0..=degree).map(|j| points[(k + j).saturating_sub(degree).min(last)]).collect();

    for r in 1..=degree {
        for j in (r..=degree).rev() {
            let i = (k + j).saturating_sub(degree);
            let denom = knots[i + degree + 1 - r] - knots[i];
            let alpha = if denom.abs() > 1e-12 { (t - knots[i]) / denom } else { 0.0 };
            d[j] = d[j - 1] * (1.0 - alpha) + d[j] * alpha;
        }
    }

    d[degree]
}

/// A tensor-product (optionally rational) B-spline surface ready for
/// evaluation.
#[derive(Debug, Clone)]
pub struct Surface {
    /// Homogeneous control net `(w·x, w·y, w·z, w)`, one row per U index.
    pub net: Vec<Vec<DVec4>>,
    pub u_knots: Vec<f64>,
    pub v_knots: Vec<f64>,
    pub u_degree: usize,
    pub v_degree: usize,
}

impl Surface {
    /// Build from Cartesian control points and optional weights.
    pub fn new(
        points: Vec<Vec<DVec3>>,
        weights: Option<&[Vec<f64>]>,
        u_knots: Vec<f64>,
        v_knots: Vec<f64>,
        u_degree: usize,
        v_degree: usize,
    ) -> Self {
        let net = points
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                row.into_iter()
                    .enumerate()
                    .map(|(j, p)| {
                        let w = weights
                            .and_then(|w| w.get(i))
                            .and_then(|r| r.get(j))
                            .copied()
                            .filter(|w| *w > 0.0)
                            .unwrap_or(1.0);
                        (p * w).extend(w)
                    })
                    .collect()
            })
            .collect();
        Self {
            net,
            u_knots,
            v_knots,
            u_degree,
            v_degree,
        }
    }

    /// Parameter domain `((u0, u1), (v0, v1))`.
    pub fn domain(&self) -> ((f64, f64), (f64, f64)) {
        let range = |knots: &[f64], degree: usize| {
            let lo = knots.get(degree).copied().unwrap_or(0.0);
            let hi = knots
                .len()
                .checked_sub(degree + 1)
                .and_then(|i| knots.get(i))
                .copied()
                .unwrap_or(1.0);
            (lo, hi)
        };
        (range(&self.u_knots, self.u_degree), range(&self.v_knots, self.v_degree))
    }

    /// Rows and columns of the control net.
    pub fn net_size(&self) -> (usize, usize) {
        (self.net.len(), self.net.first().map_or(0, Vec::len))
    }

    /// Point at `(u, v)`.
    pub fn evaluate(&self, u: f64, v: f64) -> DVec3 {
        let columns: Vec<DVec4> = self
            .net
            .iter()
            .map(|row| de_boor(row, &self.v_knots, self.v_degree, v))
            .collect();
        let h = de_boor(&columns, &self.u_knots, self.u_degree, u);
        if h.w.abs() > 1e-12 {
            h.truncate() / h.w
        } else {
            h.truncate()
        }
    }

    /// Total turning angle of the control polygon along U and V, the larger
    /// of the per-row maxima.
    pub fn control_turning(&self) -> (f64, f64) {
        fn turning(points: &[DVec3]) -> f64 {
            points
                .windows(3)
                .map(|w| {
                    let a = w[1] - w[0];
                    let b = w[2] - w[1];
                    if a.length_squared() < 1e-18 || b.length_squared() < 1e-18 {
                        0.0
                    } else {
                        a.angle_between(b)
                    }
                })
                .sum()
        }
        let cart = |h: &DVec4| if h.w.abs() > 1e-12 { h.truncate() / h.w } else { h.truncate() };

        let along_v = self
            .net
            .iter()
            .map(|row| turning(&row.iter().map(cart).collect::<Vec<_>>()))
            .fold(0.0, f64::max);
        let (rows, cols) = self.net_size();
        let along_u = (0..cols)
            .map(|j| turning(&(0..rows).map(|i| cart(&self.net[i][j])).collect::<Vec<_>>()))
            .fold(0.0, f64::max);
        (along_u, along_v)
    }
}
