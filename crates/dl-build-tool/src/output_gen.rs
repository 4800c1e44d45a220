use crate::artifact::Artifact;
use crate::error::CompileError;
use crate::linker::{self, BinaryLayout, LinkedBinary};
use gbi::Microcode;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Write `<name>.h` and `<name>.c`. Returns the written paths.
pub fn write_c_output(
    artifact: &Artifact,
    ucode: Microcode,
    name: &str,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, CompileError> {
    let c = linker::emit_c(artifact, ucode, name)?;

    let header_path = out_dir.join(format!("{}.h", name));
    let source_path = out_dir.join(format!("{}.c", name));
    fs::write(&header_path, c.header)?;
    fs::write(&source_path, c.source)?;

    Ok(vec![header_path, source_path])
}

/// Text listing of every placed block: `0xADDRESS size name`.
pub fn map_text(linked: &LinkedBinary, ucode: Microcode) -> String {
    let mut text = format!(
        "# {} blocks, {} bytes, {}\n",
        linked.symbols.len(),
        linked.bytes.len(),
        ucode.name()
    );
    for symbol in &linked.symbols {
        let _ = writeln!(
            text,
            "0x{:08X} {:6} {}",
            symbol.address, symbol.size, symbol.name
        );
    }
    text
}

/// Link and write `<name>.bin` and `<name>.map`. Returns the written paths.
pub fn write_binary_output(
    artifact: &Artifact,
    ucode: Microcode,
    layout: &BinaryLayout,
    name: &str,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, CompileError> {
    let linked = linker::link_binary(artifact, ucode, layout)?;

    let bin_path = out_dir.join(format!("{}.bin", name));
    let map_path = out_dir.join(format!("{}.map", name));
    fs::write(&bin_path, &linked.bytes)?;
    fs::write(&map_path, map_text(&linked, ucode))?;

    Ok(vec![bin_path, map_path])
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
                Block::new("ship_vtx", "test", BlockData::Vertices(vec![Vtx::default(); 4])),
                Block::new(
                    "ship_dl",
                    "test",
                    BlockData::DisplayList(vec![
                        Command::Vertex {
                            source: Ref::new("ship_vtx"),
                            count: 4,
                            start: 0,
                        },
                        Command::Tri2([0, 1, 2], [0, 2, 3]),
                        Command::EndDisplayList,
                    ]),
                ),
                Block::new(
                    "ship_geo",
                    "test",
                    BlockData::GeoLayout(vec![
                        GeoCommand::LoadDl {
                            layer: 1,
                            dl: "ship_dl".into(),
                        },
                        GeoCommand::End,
                    ]),
                ),
            ],
            entry: "ship_geo".into(),
            stats: Vec::new(),
        }
    }

    #[test]
    fn test_write_c_output() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_c_output(&artifact(), Microcode::F3dex2, "ship", dir.path()).unwrap();
        assert_eq!(paths.len(), 2);

        let header = fs::read_to_string(dir.path().join("ship.h")).unwrap();
        assert!(header.contains("#ifndef SHIP_H"));
        assert!(header.contains("extern Gfx ship_dl[];"));

        let source = fs::read_to_string(dir.path().join("ship.c")).unwrap();
        assert!(source.contains("#include \"ship.h\""));
        assert!(source.contains("Vtx ship_vtx[4] = {"));
        assert!(source.contains("const GeoLayout ship_geo[] = {"));
    }

    #[test]
    fn test_write_binary_output() {
        let dir = tempfile::tempdir().unwrap();
        write_binary_output(
            &artifact(),
            Microcode::F3dex2,
            &BinaryLayout::default(),
            "ship",
            dir.path(),
        )
        .unwrap();

        let bytes = fs::read(dir.path().join("ship.bin")).unwrap();
        // 64 vertex bytes, 24 command bytes, 12 geolayout bytes.
        assert_eq!(bytes.len(), 64 + 24 + 12);
        // gsSPVertex(ship_vtx, 4, 0) on F3DEX2.
        assert_eq!(&bytes[64..72], &[0x01, 0x00, 0x40, 0x08, 0x04, 0x00, 0x00, 0x00]);

        let map = fs::read_to_string(dir.path().join("ship.map")).unwrap();
        let lines: Vec<&str> = map.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("0x00000000"));
        assert!(lines[1].ends_with(" ship_vtx"));
        assert!(lines[3].starts_with("0x00000058"));
    }

    #[test]
    fn test_binary_output_reports_range_error() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BinaryLayout {
            limit: 32,
            ..Default::default()
        };
        let result = write_binary_output(&artifact(), Microcode::F3dex2, &layout, "ship", dir.path());
        assert!(matches!(result, Err(CompileError::AddressRange { .. })));
        assert!(!dir.path().join("ship.bin").exists());
    }
}
