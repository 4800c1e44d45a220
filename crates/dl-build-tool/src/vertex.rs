use crate::material::MaterialHandle;
use crate::types::{from_fixed, BatchVertex, BoneTree, Corner, MeshVertex, Shade, VertexAttributes};
use gbi::Vtx;
use glam::{Mat4, Vec3};

/// Resolve a corner's attributes. Lit materials carry the normal and the
/// color's alpha; unlit ones carry the color.
pub fn resolve_corner(corner: &Corner, vertex: &MeshVertex, lit: bool) -> VertexAttributes {
    let shade = if lit {
        Shade::Normal {
            normal: corner.normal,
            alpha: corner.color[3],
        }
    } else {
        Shade::Color(corner.color)
    };
    VertexAttributes {
        position: vertex.position,
        uv: corner.uv,
        shade,
    }
}

/// Converts batch vertices to hardware records for one material.
#[derive(Debug, Clone)]
pub struct VertexConverter {
    /// Model space to output space, per bone.
    frames: Vec<Mat4>,
    texture_size: [u32; 2],
    point_sampled: bool,
}

impl VertexConverter {
    pub fn new(bones: &BoneTree, export_scale: f32, material: &MaterialHandle) -> Self {
        let scale = Mat4::from_scale(Vec3::splat(export_scale));
        Self {
            frames: bones
                .bones
                .iter()
                .map(|bone| scale * bone.rest.inverse())
                .collect(),
            texture_size: material.texture_size,
            point_sampled: material.point_sampled,
        }
    }

    pub fn convert(&self, vertex: &BatchVertex) -> Vtx {
        let attrs = &vertex.attributes;
        let frame = self.frames.get(vertex.frame).copied().unwrap_or(Mat4::IDENTITY);
        let [x, y, z] = attrs.position.map(from_fixed);
        let position = frame.transform_point3(Vec3::new(x, y, z));

        let offset = if self.point_sampled { 0.0 } else { 0.5 };
        let [w, h] = self.texture_size.map(|d| d as f32);
        let [u, v] = attrs.uv.map(from_fixed);

        let shade = match attrs.shade {
            Shade::Color(color) => color,
            Shade::Normal { normal, alpha } => {
                let [nx, ny, nz] = normal.map(|n| n as u8);
                [nx, ny, nz, alpha]
            }
        };

        Vtx {
            position: [
                clamp_s16(position.x),
                clamp_s16(position.y),
                clamp_s16(position.z),
            ],
            uv: [
                clamp_s16((u * w - offset) * 32.0),
                clamp_s16((v * h - offset) * 32.0),
            ],
            shade,
        }
    }
}

fn clamp_s16(v: f32) -> i16 {
    v.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
