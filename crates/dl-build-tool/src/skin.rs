//! Skinned mesh splitting.
//!
//! Every vertex belongs to exactly one bone. A bone draws the faces it
//! wholly owns in its own frame, plus the boundary faces it shares with its
//! nearest deform ancestor. The ancestor's corners of those boundary faces
//! are loaded by a separate "skinned" list while the ancestor's matrix is
//! still current, and stay resident for the bone's own list.

use crate::artifact::{BatchStats, Block, BlockData};
use crate::batcher::{build_triangle_list, command_byte, ExistingRegion, VertexCacheBatcher};
use crate::context::{BoneDraw, CompileContext, DrawKey};
use crate::error::CompileError;
use crate::material::end_draw_commands;
use crate::types::{BoneTree, Mesh};
use crate::vertex::VertexConverter;
use gbi::{Command, Ref};
use std::collections::BTreeMap;

/// Weight a group needs to own a vertex.
const DOMINANT_WEIGHT: f32 = 0.5;

/// Resolve the owning bone of every vertex.
pub fn assign_vertices(mesh: &Mesh, bones: &BoneTree) -> Result<Vec<usize>, CompileError> {
    let mut assignment = Vec::with_capacity(mesh.vertices.len());
    for (index, vertex) in mesh.vertices.iter().enumerate() {
        let mut owner: Option<(usize, &str)> = None;
        for (group, weight) in &vertex.weights {
            if *weight <= DOMINANT_WEIGHT {
                continue;
            }
            let bone = bones.find(group).ok_or_else(|| CompileError::UnknownGroup {
                vertex: index,
                group: group.clone(),
            })?;
            match owner {
                Some((_, first)) if first != group => {
                    return Err(CompileError::AmbiguousVertex {
                        vertex: index,
                        first: first.to_string(),
                        second: group.clone(),
                    });
                }
                _ => owner = Some((bone, group.as_str())),
            }
        }
        let (bone, _) = owner.ok_or(CompileError::UnassignedVertex { vertex: index })?;
        if !bones.bones[bone].deform {
            return Err(CompileError::NonDeformOwner {
                bone: bones.bones[bone].name.clone(),
            });
        }
        assignment.push(bone);
    }
    Ok(assignment)
}

/// Faces one bone draws.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoneFaces {
    pub bone: usize,
    pub ancestor: Option<usize>,
    /// Faces mixing the bone with its deform ancestor.
    pub boundary: Vec<usize>,
    /// Faces whose corners all belong to the bone.
    pub owned: Vec<usize>,
}

/// Classify every face touching `bone`.
pub fn split_bone(
    mesh: &Mesh,
    bones: &BoneTree,
    assignment: &[usize],
    bone: usize,
) -> Result<BoneFaces, CompileError> {
    let ancestor = bones.nearest_deform_ancestor(bone);
    let mut faces = BoneFaces {
        bone,
        ancestor,
        ..Default::default()
    };

    for (index, tri) in mesh.triangles.iter().enumerate() {
        let owners = tri.corners.map(|c| assignment[c.vertex]);
        if !owners.contains(&bone) {
            continue;
        }
        // The descendant's own boundary covers this face.
        if owners.iter().any(|&o| bones.is_descendant(o, bone)) {
            continue;
        }
        if owners.iter().all(|&o| o == bone) {
            faces.owned.push(index);
            continue;
        }
        if let Some(other) = owners
            .iter()
            .find(|&&o| o != bone && Some(o) != ancestor)
        {
            return Err(CompileError::InvalidSkinning {
                bone: bones.bones[bone].name.clone(),
                triangle: index,
                group: bones.bones[*other].name.clone(),
            });
        }
        faces.boundary.push(index);
    }
    Ok(faces)
}

/// Faces of one draw layer, by (possibly substituted) material.
#[derive(Default)]
struct LayerFaces {
    boundary: BTreeMap<usize, Vec<usize>>,
    owned: BTreeMap<usize, Vec<usize>>,
}

/// Emit the skinned and local lists of one bone draw.
pub fn compile_bone(
    ctx: &mut CompileContext<'_>,
    key: &DrawKey,
    suffix: &str,
) -> Result<BoneDraw, CompileError> {
    let mesh = ctx.mesh;
    let bone_name = ctx.bones.bones[key.bone].name.clone();
    let split = ctx.splits[key.bone].clone();

    if split.boundary.is_empty() && split.owned.is_empty() {
        log::warn!("Bone '{}' has no faces to draw", bone_name);
        return Ok(BoneDraw::default());
    }

    let mut layers: BTreeMap<u8, LayerFaces> = BTreeMap::new();
    for (faces, boundary) in [(&split.boundary, true), (&split.owned, false)] {
        for &t in faces {
            let original = mesh.triangles[t].material;
            let layer = key
                .layer
                .unwrap_or(mesh.materials[original].draw_layer);
            let material = key.substitution.get(&original).copied().unwrap_or(original);
            let bucket = layers.entry(layer).or_default();
            let map = if boundary {
                &mut bucket.boundary
            } else {
                &mut bucket.owned
            };
            map.entry(material).or_default().push(t);
        }
    }

    let prefix = ctx.params.prefix.clone();
    let ident = ctx.bone_ident(key.bone).to_string();
    let mut draw = BoneDraw::default();

    for (layer, faces) in &layers {
        let layer = *layer;
        let region = if faces.boundary.is_empty() {
            None
        } else {
            let name = format!("{prefix}_{ident}_skinned_layer_{layer}{suffix}");
            let region = emit_skinned(ctx, &bone_name, &name, layer, &faces.boundary, split.ancestor)?;
            draw.skinned.push((layer, name));
            Some(region)
        };

        let name = format!("{prefix}_{ident}_mesh_layer_{layer}{suffix}");
        emit_local(ctx, &bone_name, &name, layer, faces, region.as_ref())?;
        draw.local.push((layer, name));
    }

    log::info!(
        "Compiled bone '{}'{}: {} boundary, {} owned faces in {} layer(s)",
        bone_name,
        suffix,
        split.boundary.len(),
        split.owned.len(),
        layers.len()
    );
    Ok(draw)
}

/// Load the ancestor-frame corners of the boundary faces, per material.
fn emit_skinned(
    ctx: &mut CompileContext<'_>,
    bone_name: &str,
    name: &str,
    layer: u8,
    boundary: &BTreeMap<usize, Vec<usize>>,
    ancestor: Option<usize>,
) -> Result<ExistingRegion, CompileError> {
    let mut region = ExistingRegion::default();
    let mut handles = Vec::with_capacity(boundary.len());

    for (&material, tris) in boundary {
        let handle = ctx.material(material, layer);
        let start = region.vertices.len();
        for &t in tris {
            let face = ctx.batch_face(t, handle.lit);
            for vertex in face.vertices {
                if Some(vertex.frame) == ancestor && !region.vertices[start..].contains(&vertex) {
                    region.vertices.push(vertex);
                }
            }
        }
        region.materials.insert(material, start..region.vertices.len());
        handles.push((material, handle));
    }
    region.start = region.vertices.len();

    let limit = ctx.params.capacity().saturating_sub(2);
    if region.start > limit {
        return Err(CompileError::SkinnedVertexLimit {
            bone: bone_name.to_string(),
            layer,
            count: region.start,
            limit,
        });
    }

    let vtx_name = format!("{name}_vtx");
    let origin = format!("skinned vertices of bone '{bone_name}'");
    let mut vertices = Vec::with_capacity(region.start);
    let mut commands = Vec::new();
    let mut tri_blocks = Vec::new();

    for (i, (material, handle)) in handles.iter().enumerate() {
        let converter = VertexConverter::new(ctx.bones, ctx.params.export_scale, handle);
        let range = region.materials[material].clone();
        vertices.extend(region.vertices[range.clone()].iter().map(|v| converter.convert(v)));

        let tri_name = format!("{name}_tri_{i}");
        tri_blocks.push(Block::new(
            &tri_name,
            &origin,
            BlockData::DisplayList(vec![
                Command::Vertex {
                    source: Ref::element(vtx_name.clone(), range.start as u32),
                    count: command_byte("SPVertex", "count", range.len())?,
                    start: command_byte("SPVertex", "v0", range.start)?,
                },
                Command::EndDisplayList,
            ]),
        ));

        commands.push(Command::DisplayList(Ref::new(handle.setup.clone())));
        commands.push(Command::DisplayList(Ref::new(tri_name)));
        if let Some(revert) = &handle.revert {
            commands.push(Command::DisplayList(Ref::new(revert.clone())));
        }
    }
    commands.push(Command::EndDisplayList);

    log::debug!(
        "Bone '{}' layer {}: {} ancestor vertices resident",
        bone_name,
        layer,
        region.start
    );

    ctx.push_block(Block::new(&vtx_name, &origin, BlockData::Vertices(vertices)));
    for block in tri_blocks {
        ctx.push_block(block);
    }
    ctx.push_block(Block::new(name, &origin, BlockData::DisplayList(commands)));
    Ok(region)
}

/// Draw boundary faces against the resident region, then owned faces.
fn emit_local(
    ctx: &mut CompileContext<'_>,
    bone_name: &str,
    name: &str,
    layer: u8,
    faces: &LayerFaces,
    region: Option<&ExistingRegion>,
) -> Result<(), CompileError> {
    let mesh = ctx.mesh;
    let origin = format!("bone '{bone_name}'");
    let capacity = ctx.params.capacity();
    let tri2 = ctx.params.packs_tri2();
    let mut commands = Vec::new();
    let mut counter = 0;

    let runs = faces
        .boundary
        .iter()
        .map(|(m, t)| (m, t, region))
        .chain(faces.owned.iter().map(|(m, t)| (m, t, None)));

    for (&material, tris, existing) in runs {
        let handle = ctx.material(material, layer);
        let converter = VertexConverter::new(ctx.bones, ctx.params.export_scale, &handle);
        let batch: Vec<_> = tris.iter().map(|&t| ctx.batch_face(t, handle.lit)).collect();

        let vtx_name = format!("{name}_vtx_{counter}");
        let tri_name = format!("{name}_tri_{counter}");
        let material_name = &mesh.materials[material].name;
        let mut batcher =
            VertexCacheBatcher::new(capacity, tri2, material, material_name, &vtx_name, &converter);
        if let Some(region) = existing {
            batcher = batcher.with_existing(region);
        }
        let Some(output) = build_triangle_list(&batch, batcher)? else {
            continue;
        };
        counter += 1;

        ctx.push_stats(BatchStats {
            bone: bone_name.to_string(),
            list: tri_name.clone(),
            triangles: output.drawn.len(),
            flushes: output.flushes.len(),
            vertices: output.vertices.len(),
        });
        ctx.push_block(Block::new(&vtx_name, &origin, BlockData::Vertices(output.vertices)));
        ctx.push_block(Block::new(&tri_name, &origin, BlockData::DisplayList(output.commands)));

        commands.push(Command::DisplayList(Ref::new(handle.setup.clone())));
        commands.push(Command::DisplayList(Ref::new(tri_name)));
        if let Some(revert) = handle.revert {
            commands.push(Command::DisplayList(Ref::new(revert)));
        }
    }
    commands.extend(end_draw_commands(&ctx.params.defaults, ctx.params.microcode));
    commands.push(Command::EndDisplayList);
    ctx.push_block(Block::new(name, &origin, BlockData::DisplayList(commands)));
    Ok(())
}
