//! CPU-side vertex data and the uploaded meshes the generators draw.

use std::collections::BTreeMap;

use crate::driver::{Driver, MeshHandle};
use crate::error::{Error, Result};
use crate::shader::VertexSemantic;

/// Vertex streams keyed by semantic plus an optional index list.
///
/// Each stream is a flat run of `f32` components. With no indices the mesh
/// is drawn as a plain triangle list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    streams: BTreeMap<VertexSemantic, Vec<f32>>,
    indices: Vec<u32>,
}

impl MeshData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(mut self, semantic: VertexSemantic, data: impl Into<Vec<f32>>) -> Self {
        self.streams.insert(semantic, data.into());
        self
    }

    pub fn with_indices(mut self, indices: impl Into<Vec<u32>>) -> Self {
        self.indices = indices.into();
        self
    }

    #[inline]
    pub fn stream(&self, semantic: VertexSemantic) -> Option<&[f32]> {
        self.streams.get(&semantic).map(Vec::as_slice)
    }

    pub fn streams(&self) -> impl Iterator<Item = (VertexSemantic, &[f32])> {
        self.streams.iter().map(|(s, d)| (*s, d.as_slice()))
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Vertex count of the first stream; 0 when there are none.
    pub fn vertex_count(&self) -> u32 {
        self.streams
            .iter()
            .next()
            .map(|(s, d)| (d.len() as u32) / s.components())
            .unwrap_or(0)
    }

    /// Indices when present, vertices otherwise.
    pub fn element_count(&self) -> u32 {
        if self.indices.is_empty() {
            self.vertex_count()
        } else {
            self.indices.len() as u32
        }
    }

    /// Checks stream lengths agree and indices stay in range.
    pub fn validate(&self, name: &str) -> Result<()> {
        let invalid = |reason: String| Error::InvalidMesh {
            mesh: name.to_string(),
            reason,
        };
        if self.streams.is_empty() {
            return Err(invalid("no vertex streams".to_string()));
        }
        let count = self.vertex_count();
        if count == 0 {
            return Err(invalid("no vertices".to_string()));
        }
        for (semantic, data) in &self.streams {
            let n = semantic.components() as usize;
            if data.len() % n != 0 {
                return Err(invalid(format!(
                    "{} stream length {} is not a multiple of {}",
                    semantic,
                    data.len(),
                    n
                )));
            }
            if (data.len() / n) as u32 != count {
                return Err(invalid(format!(
                    "{} stream has {} vertices, expected {}",
                    semantic,
                    data.len() / n,
                    count
                )));
            }
        }
        if let Some(&bad) = self.indices.iter().find(|&&i| i >= count) {
            return Err(invalid(format!("index {} out of range ({} vertices)", bad, count)));
        }
        if self.element_count() % 3 != 0 {
            return Err(invalid(format!(
                "{} elements do not form whole triangles",
                self.element_count()
            )));
        }
        Ok(())
    }

    /// Two triangles covering clip space, with uvs mapping (0,0) to the top-left.
    pub fn fullscreen_quad() -> Self {
        MeshData::new()
            .with_stream(
                VertexSemantic::Position,
                [
                    -1.0f32, -1.0, 0.0, //
                    1.0, -1.0, 0.0, //
                    1.0, 1.0, 0.0, //
                    -1.0, 1.0, 0.0,
                ],
            )
            .with_stream(
                VertexSemantic::TexCoord,
                [
                    0.0f32, 1.0, //
                    1.0, 1.0, //
                    1.0, 0.0, //
                    0.0, 0.0,
                ],
            )
            .with_indices([0u32, 1, 2, 0, 2, 3])
    }
}

/// A mesh uploaded to the driver.
#[derive(Debug)]
pub struct Mesh {
    semantics: Vec<VertexSemantic>,
    element_count: u32,
    indexed: bool,
    handle: Option<MeshHandle>,
}

impl Mesh {
    pub(crate) fn upload<D: Driver>(name: &str, data: &MeshData, driver: &mut D) -> Result<Self> {
        data.validate(name)?;
        let handle = driver.upload_mesh(name, data);
        log::debug!(
            "mesh `{}` uploaded ({} vertices, {} elements)",
            name,
            data.vertex_count(),
            data.element_count()
        );
        Ok(Self {
            semantics: data.streams.keys().copied().collect(),
            element_count: data.element_count(),
            indexed: !data.indices.is_empty(),
            handle: Some(handle),
        })
    }

    #[inline]
    pub fn has_semantic(&self, semantic: VertexSemantic) -> bool {
        self.semantics.contains(&semantic)
    }

    #[inline]
    pub fn semantics(&self) -> &[VertexSemantic] {
        &self.semantics
    }

    #[inline]
    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    #[inline]
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    #[inline]
    pub(crate) fn handle(&self) -> Option<MeshHandle> {
        self.handle
    }

    pub(crate) fn release<D: Driver>(&mut self, driver: &mut D) {
        if let Some(h) = self.handle.take() {
            driver.release_mesh(h);
        }
    }
}
