//! Per-compile state shared by the skin splitter and the scene expander.

use crate::adjacency::BatchFace;
use crate::artifact::{BatchStats, Block};
use crate::error::CompileError;
use crate::identifier::NameAllocator;
use crate::material::{MaterialHandle, MaterialKey, MaterialStateCache};
use crate::skin::{self, BoneFaces};
use crate::types::{BatchVertex, BoneTree, CompileParams, Mesh};
use crate::vertex::resolve_corner;
use std::collections::{BTreeMap, BTreeSet};

/// Identity of one compiled bone draw.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DrawKey {
    pub bone: usize,
    /// Forces every face onto this layer.
    pub layer: Option<u8>,
    /// Original material → substitute, restricted to materials the bone
    /// draws and to entries that actually change something.
    pub substitution: BTreeMap<usize, usize>,
}

/// Display lists produced for one bone, per draw layer in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoneDraw {
    /// Ancestor-frame lists, drawn before the bone's transform.
    pub skinned: Vec<(u8, String)>,
    /// Bone-frame lists, drawn by the bone's node.
    pub local: Vec<(u8, String)>,
}

pub struct CompileContext<'m> {
    pub mesh: &'m Mesh,
    pub bones: &'m BoneTree,
    pub params: &'m CompileParams,
    /// Owning bone of every mesh vertex.
    pub assignment: Vec<usize>,
    /// Face split of every bone.
    pub splits: Vec<BoneFaces>,
    pub materials: MaterialStateCache,
    /// Symbol identifier of every bone, distinct after sanitizing.
    bone_idents: Vec<String>,
    blocks: Vec<Block>,
    stats: Vec<BatchStats>,
    draws: BTreeMap<DrawKey, BoneDraw>,
    variants: BTreeMap<usize, usize>,
}

impl<'m> CompileContext<'m> {
    /// Assign vertices and split every bone's faces.
    pub fn new(
        mesh: &'m Mesh,
        bones: &'m BoneTree,
        params: &'m CompileParams,
    ) -> Result<Self, CompileError> {
        params.validate()?;
        mesh.validate()?;
        bones.validate()?;
        let assignment = skin::assign_vertices(mesh, bones)?;
        let splits = (0..bones.bones.len())
            .map(|bone| skin::split_bone(mesh, bones, &assignment, bone))
            .collect::<Result<Vec<_>, _>>()?;
        let mut names = NameAllocator::new();
        let bone_idents = bones.bones.iter().map(|b| names.allocate(&b.name)).collect();

        Ok(Self {
            mesh,
            bones,
            params,
            assignment,
            splits,
            materials: MaterialStateCache::new(),
            bone_idents,
            blocks: Vec::new(),
            stats: Vec::new(),
            draws: BTreeMap::new(),
            variants: BTreeMap::new(),
        })
    }

    /// Materials of every face `bone` draws.
    pub fn bone_materials(&self, bone: usize) -> BTreeSet<usize> {
        let split = &self.splits[bone];
        split
            .boundary
            .iter()
            .chain(&split.owned)
            .map(|&t| self.mesh.triangles[t].material)
            .collect()
    }

    /// Compiled draw for `key`, compiling it on first use.
    pub fn bone_draw(&mut self, key: DrawKey) -> Result<BoneDraw, CompileError> {
        if let Some(draw) = self.draws.get(&key) {
            return Ok(draw.clone());
        }
        let suffix = if key.layer.is_none() && key.substitution.is_empty() {
            String::new()
        } else {
            let n = self.variants.entry(key.bone).or_insert(0);
            *n += 1;
            format!("_v{n}")
        };
        let draw = skin::compile_bone(self, &key, &suffix)?;
        self.draws.insert(key, draw.clone());
        Ok(draw)
    }

    pub fn bone_ident(&self, bone: usize) -> &str {
        &self.bone_idents[bone]
    }

    /// Whether any draw of `bone` has been compiled.
    pub fn is_drawn(&self, bone: usize) -> bool {
        self.draws.keys().any(|k| k.bone == bone)
    }

    /// Setup/revert names for `material` on `layer`, compiling on first use.
    pub fn material(&mut self, material: usize, layer: u8) -> MaterialHandle {
        let key = MaterialKey::new(material, &self.mesh.materials[material], layer);
        let handle = self
            .materials
            .request(
                key,
                &self.mesh.materials,
                &self.params.defaults,
                self.params.microcode,
                &self.params.prefix,
            )
            .clone();
        self.blocks.extend(self.materials.take_blocks());
        handle
    }

    /// Resolve triangle `t` for drawing with a material that is `lit` or not.
    pub fn batch_face(&self, t: usize, lit: bool) -> BatchFace {
        let tri = &self.mesh.triangles[t];
        BatchFace {
            indices: tri.corners.map(|c| c.vertex),
            vertices: tri.corners.map(|c| BatchVertex {
                attributes: resolve_corner(&c, &self.mesh.vertices[c.vertex], lit),
                frame: self.assignment[c.vertex],
            }),
            source: t,
        }
    }

    pub fn push_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn push_stats(&mut self, stats: BatchStats) {
        self.stats.push(stats);
    }

    /// Hand over the emitted blocks and statistics.
    pub fn finish(self) -> (Vec<Block>, Vec<BatchStats>) {
        for (bone, split) in self.splits.iter().enumerate() {
            let faces = split.boundary.len() + split.owned.len();
            if faces > 0 && !self.is_drawn(bone) {
                log::warn!(
                    "Bone '{}' has {} faces but no scene node draws it",
                    self.bones.bones[bone].name,
                    faces
                );
            }
        }
        (self.blocks, self.stats)
    }
}
