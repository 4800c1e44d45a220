use crate::error::CompileError;
use crate::identifier::generate_identifier;
use crate::material::{Material, MaterialDefaults};
use crate::types::{to_fixed, Corner, Mesh, MeshVertex, Triangle};
use std::path::Path;

/// Name of the material given to faces without an OBJ material.
pub const DEFAULT_MATERIAL: &str = "default";

/// Load an OBJ file, merge all objects/groups, and weight every vertex to
/// `group`. Each OBJ material becomes a lit, vertex-shaded material.
pub fn load_obj(
    path: &Path,
    defaults: &MaterialDefaults,
    group: &str,
) -> Result<Mesh, CompileError> {
    // Positions stay shared so that faces across UV seams remain adjacent.
    let load_options = tobj::LoadOptions {
        triangulate: true,
        single_index: false,
        ..Default::default()
    };

    let (models, materials) =
        tobj::load_obj(path, &load_options).map_err(|e| CompileError::ObjParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    let obj_materials = materials.unwrap_or_else(|e| {
        log::warn!("Could not load OBJ materials ({}), using default", e);
        Vec::new()
    });

    if models.is_empty() {
        return Err(CompileError::ObjParse {
            path: path.to_path_buf(),
            message: "OBJ file has no geometry".to_string(),
        });
    }
    if models.len() > 1 {
        log::warn!(
            "OBJ contains {} objects/groups, all geometry will be merged",
            models.len()
        );
    }

    let mut materials: Vec<Material> = obj_materials
        .iter()
        .map(|m| convert_material(m, defaults))
        .collect();
    let default_index = materials.len();
    materials.push(Material::new(DEFAULT_MATERIAL, defaults));

    let (vertices, triangles) = merge_models(&models, default_index, group);
    if triangles.is_empty() {
        return Err(CompileError::ObjParse {
            path: path.to_path_buf(),
            message: "mesh has no faces".to_string(),
        });
    }

    // Drop the fallback material when every face has an OBJ material.
    if !triangles.iter().any(|t| t.material == default_index) {
        materials.pop();
    }

    let mesh = Mesh {
        name: generate_identifier(path)?,
        vertices,
        triangles,
        materials,
    };
    log::info!(
        "Loaded {}: {} vertices, {} triangles, {} materials",
        path.display(),
        mesh.vertices.len(),
        mesh.triangles.len(),
        mesh.materials.len()
    );
    Ok(mesh)
}

fn channel(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Lit SHADE material whose light color is the OBJ diffuse color and whose
/// ambient is half of it.
fn convert_material(obj: &tobj::Material, defaults: &MaterialDefaults) -> Material {
    let mut material = Material::new(obj.name.clone(), defaults);
    if let Some(diffuse) = obj.diffuse {
        let color = diffuse.map(channel);
        material.lights.ambient = color.map(|c| c / 2);
        if let Some(light) = material.lights.directional.first_mut() {
            light.color = color;
        }
    }
    material
}

/// Merge all tobj models into one vertex list and one triangle list.
fn merge_models(
    models: &[tobj::Model],
    default_material: usize,
    group: &str,
) -> (Vec<MeshVertex>, Vec<Triangle>) {
    let mut vertices = Vec::new();
    let mut triangles = Vec::new();

    for model in models {
        let mesh = &model.mesh;
        if mesh.positions.is_empty() {
            continue;
        }
        let offset = vertices.len();
        let vert_count = mesh.positions.len() / 3;
        let has_uvs = !mesh.texcoords.is_empty();
        let has_normals = !mesh.normals.is_empty();
        let has_colors = mesh.vertex_color.len() >= vert_count * 3;

        if !has_uvs {
            log::warn!(
                "Mesh '{}' has no UV coordinates, using default (0.0, 0.0)",
                model.name
            );
        }
        if !has_normals {
            log::warn!(
                "Mesh '{}' has no normals, using default (0.0, 0.0, 0.0)",
                model.name
            );
        }

        for i in 0..vert_count {
            vertices.push(MeshVertex {
                position: [
                    to_fixed(mesh.positions[i * 3]),
                    to_fixed(mesh.positions[i * 3 + 1]),
                    to_fixed(mesh.positions[i * 3 + 2]),
                ],
                weights: vec![(group.to_string(), 1.0)],
            });
        }

        let material = mesh.material_id.unwrap_or(default_material);
        let corner = |k: usize| -> Corner {
            let index = mesh.indices[k] as usize;
            // Separate attribute index lists are empty when they match `indices`.
            let uv_index = mesh.texcoord_indices.get(k).map_or(index, |&i| i as usize);
            let normal_index = mesh.normal_indices.get(k).map_or(index, |&i| i as usize);

            let uv = match mesh.texcoords.get(uv_index * 2..uv_index * 2 + 2) {
                Some(&[u, v]) => [to_fixed(u), to_fixed(1.0 - v)],
                _ => [0, 0],
            };
            let normal = match mesh.normals.get(normal_index * 3..normal_index * 3 + 3) {
                Some(&[x, y, z]) => [x, y, z].map(|n| (n.clamp(-1.0, 1.0) * 127.0).round() as i8),
                _ => [0, 0, 0],
            };
            let color = if has_colors {
                let c = &mesh.vertex_color[index * 3..index * 3 + 3];
                [channel(c[0]), channel(c[1]), channel(c[2]), 0xFF]
            } else {
                [0xFF; 4]
            };
            Corner {
                vertex: offset + index,
                uv,
                color,
                normal,
            }
        };

        for face in 0..mesh.indices.len() / 3 {
            triangles.push(Triangle {
                corners: [corner(face * 3), corner(face * 3 + 1), corner(face * 3 + 2)],
                material,
            });
        }
    }

    (vertices, triangles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FIXED_ONE;
    use std::io::Write;

    fn triangle_model(material_id: Option<usize>) -> tobj::Model {
        tobj::Model::new(
            tobj::Mesh {
                positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
                normals: vec![0.0, 0.0, 1.0],
                normal_indices: vec![0, 0, 0],
                texcoords: vec![0.0, 0.0, 1.0, 1.0],
                texcoord_indices: vec![0, 1, 0],
                indices: vec![0, 1, 2],
                material_id,
                ..Default::default()
            },
            "tri".to_string(),
        )
    }

    #[test]
    fn test_merge_empty_models() {
        let (vertices, triangles) = merge_models(&[], 0, "root");
        assert!(vertices.is_empty());
        assert!(triangles.is_empty());
    }

    #[test]
    fn test_merge_offsets_and_attributes() {
        let models = vec![triangle_model(None), triangle_model(Some(0))];
        let (vertices, triangles) = merge_models(&models, 1, "root");
        assert_eq!(vertices.len(), 6);
        assert_eq!(triangles.len(), 2);
        assert_eq!(vertices[1].position, [FIXED_ONE, 0, 0]);
        assert_eq!(vertices[0].weights, vec![("root".to_string(), 1.0)]);

        assert_eq!(triangles[0].material, 1);
        assert_eq!(triangles[1].material, 0);
        assert_eq!(triangles[1].corners[0].vertex, 3);

        let corners = triangles[0].corners;
        // V is flipped.
        assert_eq!(corners[0].uv, [0, FIXED_ONE]);
        assert_eq!(corners[1].uv, [FIXED_ONE, 0]);
        assert_eq!(corners[0].normal, [0, 0, 127]);
        assert_eq!(corners[0].color, [0xFF; 4]);
    }

    #[test]
    fn test_convert_material_lights() {
        let obj = tobj::Material {
            name: "red".to_string(),
            diffuse: Some([1.0, 0.0, 0.5]),
            ..Default::default()
        };
        let material = convert_material(&obj, &MaterialDefaults::default());
        assert_eq!(material.name, "red");
        assert!(material.is_lit());
        assert_eq!(material.lights.directional[0].color, [0xFF, 0, 0x80]);
        assert_eq!(material.lights.ambient, [0x7F, 0, 0x40]);
    }

    #[test]
    fn test_load_obj_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Quad.obj");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1 4//1"
        )
        .unwrap();
        drop(file);

        let mesh = load_obj(&path, &MaterialDefaults::default(), "root").unwrap();
        assert_eq!(mesh.name, "quad");
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.triangles.len(), 2);
        assert_eq!(mesh.materials.len(), 1);
        assert_eq!(mesh.materials[0].name, DEFAULT_MATERIAL);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_obj(
            Path::new("/nonexistent/mesh.obj"),
            &MaterialDefaults::default(),
            "root",
        );
        assert!(matches!(result, Err(CompileError::ObjParse { .. })));
    }
}
