//! Face adjacency over one batch of triangles.

use crate::types::BatchVertex;
use std::collections::BTreeMap;

/// One triangle of a batch, with its attributes already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFace {
    /// Topology vertex indices, used for edge identity.
    pub indices: [usize; 3],
    pub vertices: [BatchVertex; 3],
    /// Index of the source triangle in the mesh.
    pub source: usize,
}

impl BatchFace {
    /// Undirected key of edge `k`: (v0,v1), (v1,v2) or (v2,v0).
    pub fn edge_key(&self, k: usize) -> (usize, usize) {
        let a = self.indices[k];
        let b = self.indices[(k + 1) % 3];
        (a.min(b), a.max(b))
    }

    /// Index of the edge with `key`, if the face has it.
    pub fn edge_index(&self, key: (usize, usize)) -> Option<usize> {
        (0..3).find(|&k| self.edge_key(k) == key)
    }

    fn vertex_at(&self, index: usize) -> Option<&BatchVertex> {
        self.indices
            .iter()
            .position(|&i| i == index)
            .map(|corner| &self.vertices[corner])
    }
}

/// Incidence maps plus the valid-neighbor relation for a face set.
#[derive(Debug, Clone, Default)]
pub struct AdjacencyIndex {
    /// Topology vertex → incident faces.
    pub vertex_faces: BTreeMap<usize, Vec<usize>>,
    /// Undirected edge → incident faces, in face order.
    pub edge_faces: BTreeMap<(usize, usize), Vec<usize>>,
    /// Per face, per edge: neighbors across that edge sharing both endpoints
    /// bit-identically.
    edge_neighbors: Vec<[Vec<usize>; 3]>,
}

impl AdjacencyIndex {
    pub fn build(faces: &[BatchFace]) -> Self {
        let mut vertex_faces: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut edge_faces: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();

        for (f, face) in faces.iter().enumerate() {
            for &v in &face.indices {
                let list = vertex_faces.entry(v).or_default();
                if list.last() != Some(&f) {
                    list.push(f);
                }
            }
            for k in 0..3 {
                let key = face.edge_key(k);
                if key.0 == key.1 {
                    continue;
                }
                let list = edge_faces.entry(key).or_default();
                if list.last() != Some(&f) {
                    list.push(f);
                }
            }
        }

        let mut shareable: BTreeMap<(usize, usize), bool> = BTreeMap::new();
        let mut edge_neighbors = Vec::with_capacity(faces.len());
        for (f, face) in faces.iter().enumerate() {
            let mut per_edge: [Vec<usize>; 3] = Default::default();
            for (k, neighbors) in per_edge.iter_mut().enumerate() {
                let key = face.edge_key(k);
                let Some(incident) = edge_faces.get(&key) else {
                    continue;
                };
                for &g in incident {
                    if g == f {
                        continue;
                    }
                    let pair = (f.min(g), f.max(g));
                    let ok = *shareable
                        .entry(pair)
                        .or_insert_with(|| edge_shareable(face, &faces[g], key));
                    if ok && !neighbors.contains(&g) {
                        neighbors.push(g);
                    }
                }
            }
            edge_neighbors.push(per_edge);
        }

        Self {
            vertex_faces,
            edge_faces,
            edge_neighbors,
        }
    }

    /// Valid neighbors of `face` across edge `k`.
    pub fn edge_neighbors(&self, face: usize, k: usize) -> &[usize] {
        &self.edge_neighbors[face][k]
    }

    /// Valid neighbors of `face`, in edge order, without repeats.
    pub fn valid_neighbors(&self, face: usize) -> Vec<usize> {
        let mut out = Vec::new();
        for list in &self.edge_neighbors[face] {
            for &g in list {
                if !out.contains(&g) {
                    out.push(g);
                }
            }
        }
        out
    }
}

/// Whether both endpoints of `edge` carry identical attributes in `a` and `b`.
fn edge_shareable(a: &BatchFace, b: &BatchFace, edge: (usize, usize)) -> bool {
    [edge.0, edge.1].iter().all(|&v| match (a.vertex_at(v), b.vertex_at(v)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Shade, VertexAttributes};

    fn bv(index: usize, uv: i32) -> BatchVertex {
        BatchVertex {
            attributes: VertexAttributes {
                position: [index as i32, 0, 0],
                uv: [uv, 0],
                shade: Shade::Color([0xFF; 4]),
            },
            frame: 0,
        }
    }

    fn face(indices: [usize; 3], source: usize) -> BatchFace {
        BatchFace {
            indices,
            vertices: indices.map(|i| bv(i, 0)),
            source,
        }
    }

    #[test]
    fn test_quad_neighbors() {
        let faces = vec![face([0, 1, 2], 0), face([0, 2, 3], 1)];
        let index = AdjacencyIndex::build(&faces);
        assert_eq!(index.edge_faces[&(0, 2)], vec![0, 1]);
        assert_eq!(index.vertex_faces[&0], vec![0, 1]);
        assert_eq!(index.valid_neighbors(0), vec![1]);
        // Edge 2 of face 0 is (v2, v0).
        assert_eq!(index.edge_neighbors(0, 2), &[1]);
        assert!(index.edge_neighbors(0, 0).is_empty());
    }

    #[test]
    fn test_uv_seam_is_not_shareable() {
        let mut seam = face([0, 2, 3], 1);
        seam.vertices[1] = bv(2, 99);
        let faces = vec![face([0, 1, 2], 0), seam];
        let index = AdjacencyIndex::build(&faces);
        assert_eq!(index.edge_faces[&(0, 2)].len(), 2);
        assert!(index.valid_neighbors(0).is_empty());
        assert!(index.valid_neighbors(1).is_empty());
    }

    #[test]
    fn test_fanned_edge_keeps_face_order() {
        let faces = vec![
            face([0, 1, 2], 0),
            face([1, 0, 3], 1),
            face([0, 1, 4], 2),
        ];
        let index = AdjacencyIndex::build(&faces);
        assert_eq!(index.edge_faces[&(0, 1)], vec![0, 1, 2]);
        assert_eq!(index.valid_neighbors(0), vec![1, 2]);
        assert_eq!(index.valid_neighbors(2), vec![0, 1]);
    }
}
