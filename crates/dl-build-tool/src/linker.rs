//! Address assignment and output serialization.

use crate::artifact::{Artifact, FixupKind};
use crate::error::CompileError;
use crate::identifier::SymbolTable;
use gbi::Microcode;
use std::collections::BTreeMap;

/// Block alignment in the binary image.
pub const BLOCK_ALIGN: u32 = 8;

/// Largest span a segment can address through its 24-bit offset.
pub const SEGMENT_SPAN: u32 = 0x0100_0000;

/// How data pointers are written into the binary image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerMode {
    /// `id << 24 | offset` within the segment containing the target.
    #[default]
    Segmented,
    /// The target's address.
    Absolute,
    /// The target's offset from the image base.
    Relative,
}

/// One RSP segment: addresses `[start, end)` map to segment `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub id: u8,
    pub start: u32,
    pub end: u32,
}

impl Segment {
    fn contains(&self, address: u32) -> bool {
        (self.start..self.end).contains(&address)
    }

    fn overlaps(&self, other: &Segment) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Non-overlapping segments used for segmented pointers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentTable {
    segments: Vec<Segment>,
}

impl SegmentTable {
    /// Build a table, rejecting reversed, oversized or overlapping ranges.
    pub fn new(segments: Vec<Segment>) -> Result<Self, CompileError> {
        if let Some(s) = segments
            .iter()
            .find(|s| s.end < s.start || s.end - s.start > SEGMENT_SPAN)
        {
            return Err(CompileError::InvalidSegment {
                id: s.id,
                start: s.start,
                end: s.end,
            });
        }
        for (i, a) in segments.iter().enumerate() {
            for b in &segments[i + 1..] {
                if a.overlaps(b) {
                    return Err(CompileError::SegmentOverlap {
                        first: a.id,
                        second: b.id,
                    });
                }
            }
        }
        Ok(Self { segments })
    }

    /// A table with the single segment `id` covering `[start, end)`.
    pub fn single(id: u8, start: u32, end: u32) -> Result<Self, CompileError> {
        Self::new(vec![Segment { id, start, end }])
    }

    /// Segmented form of `address`, from the first segment containing it.
    pub fn encode(&self, address: u32) -> Result<u32, CompileError> {
        self.segments
            .iter()
            .find(|s| s.contains(address) && address - s.start < SEGMENT_SPAN)
            .map(|s| (u32::from(s.id) << 24) | (address - s.start))
            .ok_or(CompileError::UnmappedAddress { address })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

/// Where and how a binary image is laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryLayout {
    /// Address of the first block.
    pub base: u32,
    /// Exclusive upper bound of the image.
    pub limit: u32,
    pub pointer_mode: PointerMode,
    pub segments: SegmentTable,
    /// Addresses of symbols defined outside the artifact (images, callbacks).
    pub externals: BTreeMap<String, u32>,
}

impl Default for BinaryLayout {
    fn default() -> Self {
        Self {
            base: 0,
            limit: 0x0100_0000,
            pointer_mode: PointerMode::Segmented,
            segments: SegmentTable {
                segments: vec![Segment {
                    id: 0x04,
                    start: 0,
                    end: SEGMENT_SPAN,
                }],
            },
            externals: BTreeMap::new(),
        }
    }
}

/// A placed block, for the map file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedSymbol {
    pub name: String,
    pub address: u32,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedBinary {
    pub bytes: Vec<u8>,
    pub symbols: Vec<PlacedSymbol>,
}

fn align(address: u64) -> u64 {
    let a = u64::from(BLOCK_ALIGN);
    address.div_ceil(a) * a
}

/// Place every block and resolve every pointer.
pub fn link_binary(
    artifact: &Artifact,
    ucode: Microcode,
    layout: &BinaryLayout,
) -> Result<LinkedBinary, CompileError> {
    let mut table = SymbolTable::new();
    for block in &artifact.blocks {
        table.register(&block.name, &block.origin)?;
    }

    // Assign addresses
    let mut addresses: BTreeMap<&str, u32> = BTreeMap::new();
    let mut symbols = Vec::with_capacity(artifact.blocks.len());
    let mut cursor = u64::from(layout.base);
    for block in &artifact.blocks {
        cursor = align(cursor);
        let size = block.byte_len();
        let end = cursor + size as u64;
        if end > u64::from(layout.limit) {
            return Err(CompileError::AddressRange {
                end,
                limit: layout.limit,
            });
        }
        addresses.insert(&block.name, cursor as u32);
        symbols.push(PlacedSymbol {
            name: block.name.clone(),
            address: cursor as u32,
            size,
        });
        cursor = end;
    }

    // Serialize and patch
    let mut bytes = vec![0u8; (cursor - u64::from(layout.base)) as usize];
    for (block, placed) in artifact.blocks.iter().zip(&symbols) {
        let (mut data, fixups) = block.encode(ucode)?;
        for fixup in fixups {
            let symbol = &fixup.target.symbol;
            let offset = fixup.target.byte_offset();
            let value = match (addresses.get(symbol.as_str()), fixup.kind) {
                (Some(&address), FixupKind::Data) => {
                    let target = address + offset;
                    match layout.pointer_mode {
                        PointerMode::Segmented => layout.segments.encode(target)?,
                        PointerMode::Absolute => target,
                        PointerMode::Relative => target - layout.base,
                    }
                }
                _ => match layout.externals.get(symbol) {
                    Some(&address) => address.wrapping_add(offset),
                    None => {
                        return Err(CompileError::UnresolvedSymbol {
                            symbol: symbol.clone(),
                            block: block.name.clone(),
                        })
                    }
                },
            };
            if let Some(word) = data.get_mut(fixup.offset..fixup.offset + 4) {
                word.copy_from_slice(&value.to_be_bytes());
            }
        }
        let start = (placed.address - layout.base) as usize;
        bytes[start..start + data.len()].copy_from_slice(&data);
    }

    log::info!(
        "Linked {} blocks, {} bytes at 0x{:08X}",
        symbols.len(),
        bytes.len(),
        layout.base
    );
    Ok(LinkedBinary { bytes, symbols })
}

/// C header and source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CSource {
    pub header: String,
    pub source: String,
}

/// Render the artifact as C. `name` is the file stem of the pair.
pub fn emit_c(artifact: &Artifact, ucode: Microcode, name: &str) -> Result<CSource, CompileError> {
    let mut table = SymbolTable::new();
    for block in &artifact.blocks {
        table.register(&block.name, &block.origin)?;
        // Text output accepts only what the binary encoder accepts.
        block.encode(ucode)?;
    }

    let guard = format!("{}_H", name.to_uppercase());
    let mut header = format!("#ifndef {guard}\n#define {guard}\n\n#include <ultra64.h>\n\n");
    for block in &artifact.blocks {
        header.push_str(&block.c_declaration());
        header.push('\n');
    }
    header.push_str(&format!("\n#endif /* {guard} */\n"));

    let mut source = format!(
        "#include <ultra64.h>\n#include \"geo_commands.h\"\n#include \"{name}.h\"\n"
    );
    for block in &artifact.blocks {
        source.push('\n');
        source.push_str(&block.to_c(ucode));
    }

    log::info!("Rendered {} blocks as C", artifact.blocks.len());
    Ok(CSource { header, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{Block, BlockData};
    use crate::scene::GeoCommand;
    use gbi::{Command, Ref, Vtx};

    fn artifact() -> Artifact {
        Artifact {
            blocks: vec![
                Block::new(
                    "vtx",
                    "test",
                    BlockData::Vertices(vec![Vtx::default(); 3]),
                ),
                Block::new(
                    "tri",
                    "test",
                    BlockData::DisplayList(vec![
                        Command::Vertex {
                            source: Ref::element("vtx", 1),
                            count: 2,
                            start: 0,
                        },
                        Command::EndDisplayList,
                    ]),
                ),
                Block::new(
                    "geo",
                    "test",
                    BlockData::GeoLayout(vec![
                        GeoCommand::LoadDl {
                            layer: 1,
                            dl: "tri".into(),
                        },
                        GeoCommand::End,
                    ]),
                ),
            ],
            entry: "geo".into(),
            stats: Vec::new(),
        }
    }

    // --- segments ---

    #[test]
    fn test_segment_encode() {
        let table = SegmentTable::new(vec![
            Segment {
                id: 0x04,
                start: 0x1000,
                end: 0x2000,
            },
            Segment {
                id: 0x0E,
                start: 0x2000,
                end: 0x3000,
            },
        ])
        .unwrap();
        assert_eq!(table.encode(0x1010).unwrap(), 0x0400_0010);
        assert_eq!(table.encode(0x2000).unwrap(), 0x0E00_0000);
        assert!(matches!(
            table.encode(0x3000),
            Err(CompileError::UnmappedAddress { address: 0x3000 })
        ));
    }

    #[test]
    fn test_segment_overlap_rejected() {
        let err = SegmentTable::new(vec![
            Segment {
                id: 1,
                start: 0,
                end: 0x100,
            },
            Segment {
                id: 2,
                start: 0xFF,
                end: 0x200,
            },
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            CompileError::SegmentOverlap {
                first: 1,
                second: 2
            }
        ));
    }

    #[test]
    fn test_segment_wider_than_offset_rejected() {
        let err = SegmentTable::single(0x04, 0, 0x0200_0000).unwrap_err();
        assert!(matches!(
            err,
            CompileError::InvalidSegment {
                id: 0x04,
                end: 0x0200_0000,
                ..
            }
        ));
        assert!(SegmentTable::single(0x04, 0x1000, 0x0100_1000).is_ok());
        assert!(SegmentTable::single(0x04, 0x2000, 0x1000).is_err());
    }

    #[test]
    fn test_segment_encode_at_span_end() {
        let table = SegmentTable::single(0x0E, 0x8000_0000, 0x8100_0000).unwrap();
        assert_eq!(table.encode(0x80FF_FFF8).unwrap(), 0x0EFF_FFF8);
        assert!(matches!(
            table.encode(0x8100_0000),
            Err(CompileError::UnmappedAddress { .. })
        ));
    }

    // --- binary ---

    #[test]
    fn test_link_segmented() {
        let linked = link_binary(&artifact(), Microcode::F3dex2, &BinaryLayout::default()).unwrap();
        assert_eq!(linked.symbols[0].address, 0);
        assert_eq!(linked.symbols[1].address, 48);
        assert_eq!(linked.symbols[2].address, 64);
        // Vertex pointer: element 1 of vtx.
        assert_eq!(&linked.bytes[52..56], &[0x04, 0x00, 0x00, 0x10]);
        // LOAD_DL pointer at geolayout offset 4.
        assert_eq!(&linked.bytes[68..72], &[0x04, 0x00, 0x00, 0x30]);
        assert_eq!(linked.bytes.len(), 64 + 12);
    }

    #[test]
    fn test_link_absolute_and_relative() {
        let mut layout = BinaryLayout {
            base: 0x8000_0000,
            limit: 0x8010_0000,
            pointer_mode: PointerMode::Absolute,
            ..Default::default()
        };
        let linked = link_binary(&artifact(), Microcode::F3dex2, &layout).unwrap();
        assert_eq!(&linked.bytes[52..56], &0x8000_0010u32.to_be_bytes());

        layout.pointer_mode = PointerMode::Relative;
        let linked = link_binary(&artifact(), Microcode::F3dex2, &layout).unwrap();
        assert_eq!(&linked.bytes[52..56], &0x10u32.to_be_bytes());
    }

    #[test]
    fn test_link_target_outside_segment_is_unmapped() {
        // The image fits below the limit but the vertex block lies past the
        // segment.
        let mut art = artifact();
        art.blocks.insert(
            0,
            Block::new("pad", "test", BlockData::Vertices(vec![Vtx::default(); 8])),
        );
        let layout = BinaryLayout {
            base: 0,
            limit: 0x0200_0000,
            segments: SegmentTable::single(0x04, 0, 0x40).unwrap(),
            ..Default::default()
        };
        let err = link_binary(&art, Microcode::F3dex2, &layout).unwrap_err();
        assert!(matches!(err, CompileError::UnmappedAddress { .. }));
    }

    #[test]
    fn test_link_range_error_reports_end() {
        let layout = BinaryLayout {
            limit: 64,
            ..Default::default()
        };
        let err = link_binary(&artifact(), Microcode::F3dex2, &layout).unwrap_err();
        assert!(matches!(
            err,
            CompileError::AddressRange { end: 76, limit: 64 }
        ));
    }

    #[test]
    fn test_link_unresolved_external() {
        let mut art = artifact();
        art.blocks[1] = Block::new(
            "tri",
            "test",
            BlockData::DisplayList(vec![
                Command::DisplayList(Ref::new("missing")),
                Command::EndDisplayList,
            ]),
        );
        let err = link_binary(&art, Microcode::F3dex2, &BinaryLayout::default()).unwrap_err();
        assert!(matches!(err, CompileError::UnresolvedSymbol { .. }));

        let mut layout = BinaryLayout::default();
        layout.externals.insert("missing".into(), 0x0700_0000);
        let linked = link_binary(&art, Microcode::F3dex2, &layout).unwrap();
        assert_eq!(&linked.bytes[52..56], &[0x07, 0, 0, 0]);
    }

    #[test]
    fn test_link_rejects_duplicate_names() {
        let mut art = artifact();
        art.blocks[2].name = "tri".into();
        assert!(matches!(
            link_binary(&art, Microcode::F3dex2, &BinaryLayout::default()),
            Err(CompileError::SymbolCollision { .. })
        ));
    }

    // --- C ---

    #[test]
    fn test_emit_c() {
        let c = emit_c(&artifact(), Microcode::F3dex2, "mesh").unwrap();
        assert!(c.header.starts_with("#ifndef MESH_H\n"));
        assert!(c.header.contains("extern Vtx vtx[3];\n"));
        assert!(c.header.contains("extern Gfx tri[];\n"));
        assert!(c.header.contains("extern const GeoLayout geo[];\n"));
        assert!(c.source.contains("#include \"mesh.h\""));
        assert!(c.source.contains("\tGEO_DISPLAY_LIST(1, tri),\n"));
    }

    #[test]
    fn test_emit_c_rejects_unencodable_command() {
        let mut art = artifact();
        art.blocks[1] = Block::new(
            "tri",
            "test",
            BlockData::DisplayList(vec![Command::Tri1([0, 1, 16]), Command::EndDisplayList]),
        );
        assert!(emit_c(&art, Microcode::F3dex, "mesh").is_ok());
        assert!(matches!(
            emit_c(&art, Microcode::F3d, "mesh"),
            Err(CompileError::Encoding(_))
        ));
    }
}
