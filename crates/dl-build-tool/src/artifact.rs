use crate::error::CompileError;
use crate::scene::GeoCommand;
use gbi::{Command, Lights, Microcode, Ref, Vtx};

/// How a pointer site is resolved at link time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixupKind {
    /// A data pointer, encoded with the layout's pointer mode.
    Data,
    /// A code pointer, always written as the raw external address.
    Function,
}

/// A pointer-sized hole in a block's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixup {
    /// Byte offset of the big-endian word within the block.
    pub offset: usize,
    pub target: Ref,
    pub kind: FixupKind,
}

/// Structured block content.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockData {
    Vertices(Vec<Vtx>),
    Lights(Lights),
    DisplayList(Vec<Command>),
    GeoLayout(Vec<GeoCommand>),
}

/// One named, addressable unit of compiled output.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    /// What produced the block, for diagnostics.
    pub origin: String,
    pub data: BlockData,
}

impl Block {
    pub fn new(name: impl Into<String>, origin: impl Into<String>, data: BlockData) -> Self {
        Self {
            name: name.into(),
            origin: origin.into(),
            data,
        }
    }

    pub fn byte_len(&self) -> usize {
        match &self.data {
            BlockData::Vertices(vertices) => vertices.len() * gbi::vtx::VTX_SIZE as usize,
            BlockData::Lights(lights) => lights.byte_len() as usize,
            BlockData::DisplayList(commands) => commands.len() * 8,
            BlockData::GeoLayout(commands) => commands.iter().map(GeoCommand::byte_len).sum(),
        }
    }

    /// Serialize to bytes with every pointer word left zero.
    pub fn encode(&self, ucode: Microcode) -> Result<(Vec<u8>, Vec<Fixup>), CompileError> {
        let mut bytes = Vec::with_capacity(self.byte_len());
        let mut fixups = Vec::new();
        match &self.data {
            BlockData::Vertices(vertices) => {
                for vtx in vertices {
                    bytes.extend_from_slice(&vtx.to_bytes());
                }
            }
            BlockData::Lights(lights) => bytes.extend(lights.to_bytes()),
            BlockData::DisplayList(commands) => {
                for command in commands {
                    if let Some(target) = command.pointer() {
                        fixups.push(Fixup {
                            offset: bytes.len() + 4,
                            target: target.clone(),
                            kind: FixupKind::Data,
                        });
                    }
                    bytes.extend_from_slice(&command.to_bytes(ucode)?);
                }
            }
            BlockData::GeoLayout(commands) => {
                for command in commands {
                    let base = bytes.len();
                    let (encoded, sites) = command.encode();
                    fixups.extend(sites.into_iter().map(|mut site| {
                        site.offset += base;
                        site
                    }));
                    bytes.extend(encoded);
                }
            }
        }
        Ok((bytes, fixups))
    }

    /// `extern` declaration for the C header.
    pub fn c_declaration(&self) -> String {
        match &self.data {
            BlockData::Vertices(vertices) => format!("extern Vtx {}[{}];", self.name, vertices.len()),
            BlockData::Lights(lights) => format!("extern {} {};", lights.c_type(), self.name),
            BlockData::DisplayList(_) => format!("extern Gfx {}[];", self.name),
            BlockData::GeoLayout(_) => format!("extern const GeoLayout {}[];", self.name),
        }
    }

    /// C definition.
    pub fn to_c(&self, ucode: Microcode) -> String {
        match &self.data {
            BlockData::Vertices(vertices) => {
                let body: Vec<String> = vertices
                    .iter()
                    .map(|v| format!("\t{},\n", v.to_c()))
                    .collect();
                format!(
                    "Vtx {}[{}] = {{\n{}}};\n",
                    self.name,
                    vertices.len(),
                    body.concat()
                )
            }
            BlockData::Lights(lights) => {
                format!("{} {} = {};\n", lights.c_type(), self.name, lights.to_c())
            }
            BlockData::DisplayList(commands) => {
                let body: Vec<String> = commands
                    .iter()
                    .map(|c| format!("\t{},\n", c.to_c(ucode)))
                    .collect();
                format!("Gfx {}[] = {{\n{}}};\n", self.name, body.concat())
            }
            BlockData::GeoLayout(commands) => {
                let mut out = format!("const GeoLayout {}[] = {{\n", self.name);
                let mut depth = 1;
                for command in commands {
                    if matches!(command, GeoCommand::NodeClose) {
                        depth -= 1;
                    }
                    out.push_str(&"\t".repeat(depth));
                    out.push_str(&command.to_c());
                    out.push_str(",\n");
                    if matches!(command, GeoCommand::NodeOpen) {
                        depth += 1;
                    }
                }
                out.push_str("};\n");
                out
            }
        }
    }
}

/// Batching totals for one triangle list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchStats {
    pub bone: String,
    pub list: String,
    pub triangles: usize,
    pub flushes: usize,
    pub vertices: usize,
}

/// The complete output of one compile, in address order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Artifact {
    pub blocks: Vec<Block>,
    /// Name of the start geolayout.
    pub entry: String,
    pub stats: Vec<BatchStats>,
}

impl Artifact {
    pub fn find(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.name == name)
    }

    /// Commands of the display list block `name`, if it exists.
    pub fn display_list(&self, name: &str) -> Option<&[Command]> {
        match self.find(name).map(|b| &b.data) {
            Some(BlockData::DisplayList(commands)) => Some(commands),
            _ => None,
        }
    }

    pub fn total_bytes(&self) -> usize {
        self.blocks.iter().map(Block::byte_len).sum()
    }

    /// Commands of the geolayout block `name`, if it exists.
    pub fn geolayout(&self, name: &str) -> Option<&[GeoCommand]> {
        match self.find(name).map(|b| &b.data) {
            Some(BlockData::GeoLayout(commands)) => Some(commands),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_list_fixups_point_at_second_word() {
        let block = Block::new(
            "dl",
            "test",
            BlockData::DisplayList(vec![
                Command::PipeSync,
                Command::DisplayList(Ref::new("other")),
                Command::EndDisplayList,
            ]),
        );
        let (bytes, fixups) = block.encode(Microcode::F3dex2).unwrap();
        assert_eq!(bytes.len(), 24);
        assert_eq!(fixups.len(), 1);
        assert_eq!(fixups[0].offset, 12);
        assert_eq!(fixups[0].target, Ref::new("other"));
    }

    #[test]
    fn test_vertex_block_c_text() {
        let block = Block::new(
            "v",
            "test",
            BlockData::Vertices(vec![Vtx::default(); 2]),
        );
        assert_eq!(block.c_declaration(), "extern Vtx v[2];");
        let text = block.to_c(Microcode::F3dex2);
        assert!(text.starts_with("Vtx v[2] = {\n"));
        assert_eq!(text.matches("{{{0, 0, 0}").count(), 2);
    }

    #[test]
    fn test_encoding_error_propagates() {
        let block = Block::new(
            "dl",
            "test",
            BlockData::DisplayList(vec![Command::Tri2([0, 1, 2], [0, 2, 3])]),
        );
        assert!(matches!(
            block.encode(Microcode::F3d),
            Err(CompileError::Encoding(_))
        ));
    }
}
