/// Error types for compilation.
pub mod error;

/// Mesh, bone and parameter types.
pub mod types;

/// Identifier generation, sanitization and the symbol table.
pub mod identifier;

/// Material state and the setup/revert cache.
pub mod material;

/// Mesh attributes to vertex records.
pub mod vertex;

/// Face adjacency over shared edges.
pub mod adjacency;

/// Vertex cache batching of triangle lists.
pub mod batcher;

/// Skinned mesh splitting per bone.
pub mod skin;

/// Per-compile state.
pub mod context;

/// Scene graph input and geolayout commands.
pub mod scene;

/// Scene graph expansion into geolayouts.
pub mod expander;

/// Compiled blocks and the artifact.
pub mod artifact;

/// Address assignment, pointer resolution and C emission.
pub mod linker;

/// OBJ to mesh conversion.
pub mod obj_loader;

/// Output file generation (C source or binary + map).
pub mod output_gen;

pub use artifact::{Artifact, BatchStats, Block, BlockData};
pub use error::{CompileError, ErrorKind};
pub use linker::{BinaryLayout, PointerMode, Segment, SegmentTable};
pub use scene::{DrawRef, FunctionRef, NodeKind, OverrideKind, SceneNode, SwitchOption};
pub use types::{BoneGroup, BoneTree, CompileParams, Mesh};

use context::CompileContext;
use expander::SceneGraphExpander;
use identifier::SymbolTable;
use std::fs;
use std::path::{Path, PathBuf};

/// Bone every OBJ vertex is weighted to.
pub const ROOT_BONE: &str = "root";

/// Compile a mesh, its bone tree and the scene graph that draws it.
///
/// Display lists, vertex and material blocks appear in the order the scene
/// graph first draws them, followed by the start geolayout and then every
/// switch option geolayout.
pub fn compile(
    mesh: &Mesh,
    bones: &BoneTree,
    scene: &SceneNode,
    params: &CompileParams,
) -> Result<Artifact, CompileError> {
    let mut ctx = CompileContext::new(mesh, bones, params)?;
    let geolayouts = SceneGraphExpander::new(&mut ctx).expand(scene)?;
    let (mut blocks, stats) = ctx.finish();
    blocks.extend(geolayouts);

    let mut table = SymbolTable::new();
    for block in &blocks {
        table.register(&block.name, &block.origin)?;
    }

    let artifact = Artifact {
        blocks,
        entry: format!("{}_geo", params.prefix),
        stats,
    };
    log::info!(
        "Compiled '{}' for {}: {} blocks, {} bytes",
        mesh.name,
        params.microcode,
        artifact.blocks.len(),
        artifact.total_bytes()
    );
    Ok(artifact)
}

/// A START node drawing `bone` through one display list node.
pub fn single_bone_scene(bone: &str, layer: Option<u8>) -> SceneNode {
    SceneNode::new("root", NodeKind::Start).with_children(vec![SceneNode::new(
        bone,
        NodeKind::DisplayList {
            draw: DrawRef {
                bone: bone.to_string(),
                layer,
            },
        },
    )])
}

/// Output flavor of [`convert_mesh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    /// `<name>.c` and `<name>.h`.
    C,
    /// `<name>.bin` and `<name>.map`.
    Binary(BinaryLayout),
}

/// Load an OBJ as a single root bone and compile it.
pub fn compile_obj(
    input: &Path,
    params: &CompileParams,
    layer: Option<u8>,
) -> Result<(Mesh, Artifact), CompileError> {
    let mesh = obj_loader::load_obj(input, &params.defaults, ROOT_BONE)?;
    let bones = BoneTree::single(ROOT_BONE);
    let scene = single_bone_scene(ROOT_BONE, layer);
    let artifact = compile(&mesh, &bones, &scene, params)?;
    Ok((mesh, artifact))
}

/// Convert a single OBJ mesh. Writes output files named after
/// `params.prefix` to `out_dir` and returns their paths.
pub fn convert_mesh(
    input: &Path,
    out_dir: &Path,
    params: &CompileParams,
    layer: Option<u8>,
    format: &OutputFormat,
) -> Result<(Artifact, Vec<PathBuf>), CompileError> {
    fs::create_dir_all(out_dir)?;
    let (_, artifact) = compile_obj(input, params, layer)?;
    let written = match format {
        OutputFormat::C => {
            output_gen::write_c_output(&artifact, params.microcode, &params.prefix, out_dir)?
        }
        OutputFormat::Binary(layout) => output_gen::write_binary_output(
            &artifact,
            params.microcode,
            layout,
            &params.prefix,
            out_dir,
        )?,
    };
    Ok((artifact, written))
}
