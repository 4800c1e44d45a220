use std::path::PathBuf;

/// Broad class of a [`CompileError`], for callers that report or triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input mesh, bone tree or scene graph is malformed.
    Structural,
    /// A hardware bound (vertex cache, address range) was exceeded.
    Capacity,
    /// Emission produced conflicting names or addresses.
    Consistency,
    /// Reading or writing files failed.
    Io,
}

/// Errors that can occur while compiling a mesh.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// I/O error reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse an OBJ mesh file.
    #[error("OBJ parse error for {path}: {message}")]
    ObjParse { path: PathBuf, message: String },

    #[error("Mesh '{mesh}' has no materials")]
    NoMaterials { mesh: String },

    #[error("Triangle {triangle} references material {material}, but only {count} exist")]
    UnknownMaterial {
        triangle: usize,
        material: usize,
        count: usize,
    },

    #[error("Triangle {triangle} references vertex {vertex}, but only {count} exist")]
    UnknownVertex {
        triangle: usize,
        vertex: usize,
        count: usize,
    },

    /// The bone tree is not a single-rooted tree with unique names.
    #[error("Invalid bone tree: {0}")]
    InvalidBoneTree(String),

    #[error("Vertex {vertex} is weighted to group '{group}', which is not in the bone tree")]
    UnknownGroup { vertex: usize, group: String },

    #[error("Vertex {vertex} has no group with weight above 0.5")]
    UnassignedVertex { vertex: usize },

    #[error("Vertex {vertex} is dominated by both '{first}' and '{second}'")]
    AmbiguousVertex {
        vertex: usize,
        first: String,
        second: String,
    },

    #[error("Bone '{bone}' owns vertices but is not a deform bone")]
    NonDeformOwner { bone: String },

    /// A triangle mixes a bone with a group that is neither its deform
    /// ancestor nor one of its descendants.
    #[error("Triangle {triangle} of bone '{bone}' uses unrelated group '{group}'")]
    InvalidSkinning {
        bone: String,
        triangle: usize,
        group: String,
    },

    #[error("Node '{node}' references unknown bone '{bone}'")]
    UnknownBone { node: String, bone: String },

    #[error("Switch node '{node}' has no options")]
    EmptySwitch { node: String },

    #[error("Switch node '{node}': option 0 must be a plain subtree")]
    NonCanonicalOption { node: String },

    #[error("Bone '{bone}' has skinned geometry but its node is a switch case")]
    SkinnedUnderSwitch { bone: String },

    #[error("Switch '{node}' overrides with material {material}, but only {count} exist")]
    UnknownOverrideMaterial {
        node: String,
        material: usize,
        count: usize,
    },

    #[error("Node '{node}' cannot have children")]
    UnexpectedChildren { node: String },

    /// A symbol is neither a compiled block nor a supplied external.
    #[error("Unresolved symbol '{symbol}' referenced from '{block}'")]
    UnresolvedSymbol { symbol: String, block: String },

    #[error("Bone '{bone}' needs {count} ancestor vertices in layer {layer}, limit is {limit}")]
    SkinnedVertexLimit {
        bone: String,
        layer: u8,
        count: usize,
        limit: usize,
    },

    #[error("Triangle {triangle} (material '{material}') needs {needed} vertex slots, only {available} are free")]
    VertexCacheOverflow {
        triangle: usize,
        material: String,
        needed: usize,
        available: usize,
    },

    #[error("Vertex capacity {capacity} is outside 3..={limit} for {microcode}")]
    InvalidVertexCapacity {
        capacity: usize,
        microcode: gbi::Microcode,
        limit: usize,
    },

    #[error("Output ends at 0x{end:08X}, beyond limit 0x{limit:08X}")]
    AddressRange { end: u64, limit: u32 },

    #[error("Symbol '{name}' is claimed by both {first} and {second}")]
    SymbolCollision {
        name: String,
        first: String,
        second: String,
    },

    #[error("Segments 0x{first:02X} and 0x{second:02X} overlap")]
    SegmentOverlap { first: u8, second: u8 },

    /// A segment must span at most the 24-bit offset field.
    #[error("Segment 0x{id:02X} range 0x{start:08X}..0x{end:08X} is not a valid 16 MiB window")]
    InvalidSegment { id: u8, start: u32, end: u32 },

    #[error("Address 0x{address:08X} is not in any segment")]
    UnmappedAddress { address: u32 },

    /// A command cannot be expressed for the target microcode.
    #[error("Encoding error: {0}")]
    Encoding(#[from] gbi::GbiError),
}

impl CompileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::Io(_) => ErrorKind::Io,
            CompileError::SkinnedVertexLimit { .. }
            | CompileError::VertexCacheOverflow { .. }
            | CompileError::InvalidVertexCapacity { .. }
            | CompileError::AddressRange { .. } => ErrorKind::Capacity,
            CompileError::SymbolCollision { .. }
            | CompileError::SegmentOverlap { .. }
            | CompileError::InvalidSegment { .. }
            | CompileError::UnmappedAddress { .. } => ErrorKind::Consistency,
            _ => ErrorKind::Structural,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = CompileError::SkinnedVertexLimit {
            bone: "arm".into(),
            layer: 1,
            count: 31,
            limit: 30,
        };
        assert_eq!(err.kind(), ErrorKind::Capacity);

        let err = CompileError::SymbolCollision {
            name: "mat_a".into(),
            first: "material 'a'".into(),
            second: "material 'a.'".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Consistency);

        let err = CompileError::InvalidVertexCapacity {
            capacity: 32,
            microcode: gbi::Microcode::F3d,
            limit: 16,
        };
        assert_eq!(err.kind(), ErrorKind::Capacity);

        let err = CompileError::InvalidSegment {
            id: 4,
            start: 0,
            end: 0x0200_0000,
        };
        assert_eq!(err.kind(), ErrorKind::Consistency);

        let err = CompileError::EmptySwitch { node: "sw".into() };
        assert_eq!(err.kind(), ErrorKind::Structural);
    }

    #[test]
    fn test_gbi_error_converts() {
        let err: CompileError = gbi::GbiError::Unsupported {
            command: "SP2Triangles",
            microcode: gbi::Microcode::F3d,
        }
        .into();
        assert!(matches!(err, CompileError::Encoding(_)));
        assert_eq!(err.to_string(), "Encoding error: SP2Triangles is not available on F3D");
    }
}
