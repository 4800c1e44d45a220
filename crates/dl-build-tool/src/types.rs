use crate::error::CompileError;
use crate::material::{Material, MaterialDefaults};
use gbi::Microcode;
use glam::Mat4;
use std::collections::BTreeMap;

/// 1.0 in 16.16 fixed point.
pub const FIXED_ONE: i32 = 1 << 16;

/// Convert a float to 16.16 fixed point (rounded).
pub fn to_fixed(v: f32) -> i32 {
    (v * FIXED_ONE as f32).round() as i32
}

/// Convert 16.16 fixed point back to a float.
pub fn from_fixed(v: i32) -> f32 {
    v as f32 / FIXED_ONE as f32
}

/// A topology vertex shared by every corner that references it.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshVertex {
    /// Model-space position, 16.16 fixed point.
    pub position: [i32; 3],
    /// (group name, weight) pairs.
    pub weights: Vec<(String, f32)>,
}

/// Per-corner attributes of a triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Corner {
    /// Index into [`Mesh::vertices`].
    pub vertex: usize,
    /// Normalized texture coordinate, 16.16 fixed point, V flipped (0 = top row).
    pub uv: [i32; 2],
    pub color: [u8; 4],
    pub normal: [i8; 3],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triangle {
    pub corners: [Corner; 3],
    /// Index into [`Mesh::materials`].
    pub material: usize,
}

/// A triangulated mesh with per-face materials.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<MeshVertex>,
    pub triangles: Vec<Triangle>,
    pub materials: Vec<Material>,
}

impl Mesh {
    /// Check that the mesh has materials and that every index is in range.
    pub fn validate(&self) -> Result<(), CompileError> {
        if self.materials.is_empty() {
            return Err(CompileError::NoMaterials {
                mesh: self.name.clone(),
            });
        }
        for (index, tri) in self.triangles.iter().enumerate() {
            if tri.material >= self.materials.len() {
                return Err(CompileError::UnknownMaterial {
                    triangle: index,
                    material: tri.material,
                    count: self.materials.len(),
                });
            }
            for corner in &tri.corners {
                if corner.vertex >= self.vertices.len() {
                    return Err(CompileError::UnknownVertex {
                        triangle: index,
                        vertex: corner.vertex,
                        count: self.vertices.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Give every vertex full weight to `group`, replacing existing weights.
    pub fn assign_all(&mut self, group: &str) {
        for vertex in &mut self.vertices {
            vertex.weights = vec![(group.to_string(), 1.0)];
        }
    }
}

/// Per-vertex shading payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Shade {
    /// Vertex color, used when lighting is off.
    Color([u8; 4]),
    /// Signed normal plus the color's alpha, used when lighting is on.
    Normal { normal: [i8; 3], alpha: u8 },
}

/// The attributes that decide whether two corners can share a cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexAttributes {
    pub position: [i32; 3],
    pub uv: [i32; 2],
    pub shade: Shade,
}

/// A vertex as the batcher sees it: attributes plus the bone whose frame
/// it is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchVertex {
    pub attributes: VertexAttributes,
    /// Index into [`BoneTree::bones`].
    pub frame: usize,
}

/// One named node of the skeleton.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneGroup {
    pub name: String,
    pub parent: Option<usize>,
    /// Whether this bone draws geometry, as opposed to being a pivot only.
    pub deform: bool,
    /// Bone space to model space.
    pub rest: Mat4,
}

/// Bones in parent-before-child order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneTree {
    pub bones: Vec<BoneGroup>,
}

impl BoneTree {
    /// A tree with a single deform root at the origin.
    pub fn single(name: &str) -> Self {
        Self {
            bones: vec![BoneGroup {
                name: name.to_string(),
                parent: None,
                deform: true,
                rest: Mat4::IDENTITY,
            }],
        }
    }

    /// Check for exactly one root, parents before children and unique names.
    pub fn validate(&self) -> Result<(), CompileError> {
        let roots = self.bones.iter().filter(|b| b.parent.is_none()).count();
        if roots != 1 {
            return Err(CompileError::InvalidBoneTree(format!(
                "expected one root bone, found {}",
                roots
            )));
        }
        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        for (index, bone) in self.bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                if parent >= index {
                    return Err(CompileError::InvalidBoneTree(format!(
                        "bone '{}' is listed before its parent",
                        bone.name
                    )));
                }
            }
            if seen.insert(&bone.name, index).is_some() {
                return Err(CompileError::InvalidBoneTree(format!(
                    "duplicate bone name '{}'",
                    bone.name
                )));
            }
        }
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    /// Closest ancestor with the deform flag, skipping pivot-only bones.
    pub fn nearest_deform_ancestor(&self, bone: usize) -> Option<usize> {
        let mut current = self.bones[bone].parent;
        while let Some(index) = current {
            if self.bones[index].deform {
                return Some(index);
            }
            current = self.bones[index].parent;
        }
        None
    }

    /// Whether `bone` is a strict descendant of `ancestor`.
    pub fn is_descendant(&self, bone: usize, ancestor: usize) -> bool {
        let mut current = self.bones[bone].parent;
        while let Some(index) = current {
            if index == ancestor {
                return true;
            }
            current = self.bones[index].parent;
        }
        false
    }
}

/// Target and naming parameters for one compile.
#[derive(Debug, Clone)]
pub struct CompileParams {
    pub microcode: Microcode,
    /// Vertex cache slots; the microcode's buffer size when `None`.
    pub vertex_capacity: Option<usize>,
    /// Pack two triangles per draw command; the microcode's ability when `None`.
    pub tri2: Option<bool>,
    /// Global render state the material blocks diff against.
    pub defaults: MaterialDefaults,
    /// Model units to output units.
    pub export_scale: f32,
    /// Prefix for every emitted symbol.
    pub prefix: String,
}

impl Default for CompileParams {
    fn default() -> Self {
        Self {
            microcode: Microcode::F3dex2,
            vertex_capacity: None,
            tri2: None,
            defaults: MaterialDefaults::default(),
            export_scale: 1.0,
            prefix: "mesh".to_string(),
        }
    }
}

impl CompileParams {
    /// Reject a vertex capacity the microcode's buffer cannot hold.
    pub fn validate(&self) -> Result<(), CompileError> {
        let limit = self.microcode.vertex_buffer_size();
        match self.vertex_capacity {
            Some(capacity) if !(3..=limit).contains(&capacity) => {
                Err(CompileError::InvalidVertexCapacity {
                    capacity,
                    microcode: self.microcode,
                    limit,
                })
            }
            _ => Ok(()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.vertex_capacity
            .unwrap_or_else(|| self.microcode.vertex_buffer_size())
    }

    pub fn packs_tri2(&self) -> bool {
        self.tri2.unwrap_or_else(|| self.microcode.supports_tri2())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bone(name: &str, parent: Option<usize>, deform: bool) -> BoneGroup {
        BoneGroup {
            name: name.to_string(),
            parent,
            deform,
            rest: Mat4::IDENTITY,
        }
    }

    #[test]
    fn test_fixed_point() {
        assert_eq!(to_fixed(1.0), FIXED_ONE);
        assert_eq!(to_fixed(-0.5), -32768);
        assert_eq!(from_fixed(FIXED_ONE * 3), 3.0);
    }

    #[test]
    fn test_tree_requires_single_root() {
        let tree = BoneTree {
            bones: vec![bone("a", None, true), bone("b", None, true)],
        };
        assert!(matches!(
            tree.validate(),
            Err(CompileError::InvalidBoneTree(_))
        ));
    }

    #[test]
    fn test_tree_rejects_duplicate_names() {
        let tree = BoneTree {
            bones: vec![bone("a", None, true), bone("a", Some(0), true)],
        };
        assert!(tree.validate().is_err());
    }

    #[test]
    fn test_deform_ancestor_skips_pivots() {
        let tree = BoneTree {
            bones: vec![
                bone("root", None, true),
                bone("pivot", Some(0), false),
                bone("hand", Some(1), true),
            ],
        };
        assert!(tree.validate().is_ok());
        assert_eq!(tree.nearest_deform_ancestor(2), Some(0));
        assert_eq!(tree.nearest_deform_ancestor(0), None);
        assert!(tree.is_descendant(2, 0));
        assert!(!tree.is_descendant(0, 2));
    }

    #[test]
    fn test_params_follow_microcode() {
        let params = CompileParams {
            microcode: Microcode::F3d,
            ..Default::default()
        };
        assert_eq!(params.capacity(), 16);
        assert!(!params.packs_tri2());
    }

    #[test]
    fn test_capacity_bounded_by_microcode() {
        let mut params = CompileParams {
            microcode: Microcode::F3d,
            vertex_capacity: Some(32),
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(CompileError::InvalidVertexCapacity {
                capacity: 32,
                limit: 16,
                ..
            })
        ));

        params.vertex_capacity = Some(16);
        assert!(params.validate().is_ok());
        params.vertex_capacity = Some(2);
        assert!(params.validate().is_err());

        params.microcode = Microcode::F3dex;
        params.vertex_capacity = Some(32);
        assert!(params.validate().is_ok());
    }
}
