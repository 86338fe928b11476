//! Read-only inspection of GLB containers.

use crate::error::{ExportError, Result};
use crate::schema::Gltf;
use crate::writer::{CHUNK_BIN, CHUNK_JSON, GLB_MAGIC, GLB_VERSION};

/// A chunk inside a GLB container.
struct Chunk<'a> {
    kind: u32,
    data: &'a [u8],
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Validate the 12-byte header and split the body into chunks.
fn read_chunks(data: &[u8]) -> Result<Vec<Chunk<'_>>> {
    if data.len() < 12 {
        return Err(ExportError::InvalidData("GLB file too short".into()));
    }
    let magic = read_u32(data, 0).unwrap_or_default();
    let version = read_u32(data, 4).unwrap_or_default();
    let length = read_u32(data, 8).unwrap_or_default() as usize;

    if magic != GLB_MAGIC {
        return Err(ExportError::InvalidData("invalid GLB magic".into()));
    }
    if version != GLB_VERSION {
        return Err(ExportError::Unsupported(format!("GLB version {version} not supported")));
    }
    if length != data.len() {
        return Err(ExportError::InvalidData(format!(
            "GLB header declares {length} bytes, file has {}",
            data.len()
        )));
    }

    let mut chunks = Vec::new();
    let mut offset = 12;
    while offset < data.len() {
        let (Some(chunk_length), Some(kind)) = (read_u32(data, offset), read_u32(data, offset + 4)) else {
            return Err(ExportError::InvalidData("truncated GLB chunk header".into()));
        };
        offset += 8;
        let end = offset + chunk_length as usize;
        if end > data.len() {
            return Err(ExportError::InvalidData("GLB chunk extends past end of file".into()));
        }
        chunks.push(Chunk {
            kind,
            data: &data[offset..end],
        });
        // Chunks are 4-byte aligned
        offset = (end + 3) & !3;
    }

    match chunks.first() {
        Some(chunk) if chunk.kind == CHUNK_JSON => Ok(chunks),
        _ => Err(ExportError::InvalidData("GLB must start with a JSON chunk".into())),
    }
}

/// True when `data` is a well-framed GLB 2.0 container.
pub fn is_glb(data: &[u8]) -> bool {
    read_chunks(data).is_ok()
}

/// Shape of a GLB asset: what a viewer would load from it.
#[derive(Debug, Clone, PartialEq)]
pub struct GlbSummary {
    /// Declared total length in bytes.
    pub total_bytes: usize,
    /// Length of the BIN chunk, when present.
    pub bin_bytes: Option<usize>,
    /// `asset.generator`.
    pub generator: Option<String>,
    /// Node names in file order; unnamed nodes are empty strings.
    pub node_names: Vec<String>,
    /// Triangles per mesh, in mesh order.
    pub mesh_triangles: Vec<usize>,
    /// Extensions the asset declares.
    pub extensions_used: Vec<String>,
}

impl GlbSummary {
    /// Parse the container framing and its JSON chunk.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let chunks = read_chunks(data)?;
        let gltf: Gltf = serde_json::from_slice(chunks[0].data)?;
        let bin_bytes = chunks.iter().find(|c| c.kind == CHUNK_BIN).map(|c| c.data.len());

        Ok(Self {
            total_bytes: data.len(),
            bin_bytes,
            generator: gltf.asset.generator.clone(),
            node_names: gltf
                .nodes
                .iter()
                .map(|n| n.name.clone().unwrap_or_default())
                .collect(),
            mesh_triangles: gltf
                .meshes
                .iter()
                .map(|m| m.triangle_count(&gltf.accessors))
                .collect(),
            extensions_used: gltf.extensions_used,
        })
    }

    /// Total triangles across meshes.
    pub fn triangle_count(&self) -> usize {
        self.mesh_triangles.iter().sum()
    }
}
