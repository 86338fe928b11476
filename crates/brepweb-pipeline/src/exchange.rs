//! In-memory binary STL exchange buffer.
//!
//! Tessellator output passes through this buffer before it reaches the
//! scene: encoding flattens the mesh to independent facets, decoding checks
//! the buffer and welds bit-identical vertices back into an indexed mesh.

use brepweb_core::{KernelError, TriangleMesh};
use glam::Vec3;
use indexmap::IndexSet;

use crate::error::PartError;

const HEADER: &[u8] = b"brepweb exchange buffer";
const HEADER_LEN: usize = 80;
const FACET_LEN: usize = 50;

/// Encode a mesh as binary STL.
pub fn encode(mesh: &TriangleMesh) -> Result<Vec<u8>, PartError> {
    let facet_count = mesh.facet_count();
    let mut output = Vec::with_capacity(HEADER_LEN + 4 + facet_count * FACET_LEN);

    let mut header = [0x20u8; HEADER_LEN];
    header[..HEADER.len()].copy_from_slice(HEADER);
    output.extend_from_slice(&header);
    output.extend_from_slice(&(facet_count as u32).to_le_bytes());

    for (facet, tri) in mesh.indices.chunks_exact(3).enumerate() {
        let corner = |i: u32| {
            mesh.positions.get(i as usize).copied().ok_or_else(|| {
                PartError::Kernel(KernelError::Tessellation(format!(
                    "facet {facet} refers to vertex {i} of {}",
                    mesh.positions.len()
                )))
            })
        };
        let (v0, v1, v2) = (corner(tri[0])?, corner(tri[1])?, corner(tri[2])?);
        let normal = (v1 - v0).cross(v2 - v0).normalize_or_zero();

        for v in [normal, v0, v1, v2] {
            for c in v.to_array() {
                output.extend_from_slice(&c.to_le_bytes());
            }
        }
        output.extend_from_slice(&0u16.to_le_bytes());
    }

    Ok(output)
}

fn read_f32(data: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

/// Decode a binary STL buffer into an indexed mesh.
///
/// Buffers shorter than `minimum` bytes, or shorter than their facet count
/// implies, are corrupt.
pub fn decode(data: &[u8], minimum: usize) -> Result<TriangleMesh, PartError> {
    if data.len() < minimum.max(HEADER_LEN + 4) {
        return Err(PartError::CorruptIntermediate {
            bytes: data.len(),
            minimum: minimum.max(HEADER_LEN + 4),
        });
    }
    let count_bytes = [data[80], data[81], data[82], data[83]];
    let facet_count = u32::from_le_bytes(count_bytes) as usize;
    let expected = HEADER_LEN + 4 + facet_count * FACET_LEN;
    if data.len() < expected {
        return Err(PartError::CorruptIntermediate {
            bytes: data.len(),
            minimum: expected,
        });
    }

    let mut welded: IndexSet<[u32; 3]> = IndexSet::new();
    let mut indices = Vec::with_capacity(facet_count * 3);
    for facet in 0..facet_count {
        // Skip the 12-byte facet normal.
        let base = HEADER_LEN + 4 + facet * FACET_LEN + 12;
        for corner in 0..3 {
            let offset = base + corner * 12;
            let v = Vec3::new(
                read_f32(data, offset),
                read_f32(data, offset + 4),
                read_f32(data, offset + 8),
            );
            if !v.is_finite() {
                return Err(PartError::NonFiniteVertex { facet });
            }
            let (index, _) = welded.insert_full([v.x.to_bits(), v.y.to_bits(), v.z.to_bits()]);
            indices.push(index as u32);
        }
    }

    Ok(TriangleMesh {
        positions: welded
            .into_iter()
            .map(|[x, y, z]| Vec3::new(f32::from_bits(x), f32::from_bits(y), f32::from_bits(z)))
            .collect(),
        normals: None,
        indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::cube;

    #[test]
    fn test_layout() {
        let stl = encode(&cube(2.0)).unwrap();
        assert_eq!(stl.len(), 84 + 12 * 50);
        assert_eq!(u32::from_le_bytes([stl[80], stl[81], stl[82], stl[83]]), 12);
        assert!(stl.starts_with(HEADER));
    }

    #[test]
    fn test_decode_welds_shared_corners() {
        let mesh = decode(&encode(&cube(2.0)).unwrap(), 100).unwrap();
        assert_eq!(mesh.facet_count(), 12);
        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.compute_bounds().max, Vec3::splat(2.0));
    }

    #[test]
    fn test_facet_order_and_winding_survive() {
        let source = cube(1.0);
        let mesh = decode(&encode(&source).unwrap(), 0).unwrap();
        for (a, b) in source.indices.chunks(3).zip(mesh.indices.chunks(3)) {
            for k in 0..3 {
                assert_eq!(source.positions[a[k] as usize], mesh.positions[b[k] as usize]);
            }
        }
    }

    #[test]
    fn test_undersized_buffer_is_corrupt() {
        let empty = encode(&TriangleMesh::new()).unwrap();
        assert_eq!(empty.len(), 84);
        let err = decode(&empty, 100).unwrap_err();
        assert!(matches!(err, PartError::CorruptIntermediate { bytes: 84, minimum: 100 }));
    }

    #[test]
    fn test_truncated_buffer_is_corrupt() {
        let stl = encode(&cube(1.0)).unwrap();
        let err = decode(&stl[..stl.len() - 10], 100).unwrap_err();
        assert!(matches!(err, PartError::CorruptIntermediate { minimum: 684, .. }));
    }

    #[test]
    fn test_non_finite_vertex() {
        let mut mesh = cube(1.0);
        mesh.positions[7] = Vec3::new(f32::NAN, 0.0, 0.0);
        let err = decode(&encode(&mesh).unwrap(), 100).unwrap_err();
        assert!(matches!(err, PartError::NonFiniteVertex { facet: 2 }));
    }

    #[test]
    fn test_bad_index_is_a_kernel_fault() {
        let mut mesh = cube(1.0);
        mesh.indices[5] = 99;
        assert!(matches!(encode(&mesh), Err(PartError::Kernel(_))));
    }
}
