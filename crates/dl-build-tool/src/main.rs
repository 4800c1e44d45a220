use clap::{Parser, Subcommand, ValueEnum};
use dl_build_tool::identifier::generate_identifier;
use dl_build_tool::{BinaryLayout, CompileError, CompileParams, OutputFormat, PointerMode, SegmentTable};
use gbi::Microcode;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "dl-prep")]
#[command(about = "Compile OBJ meshes to F3D display lists and geolayouts (debug CLI)", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Suppress progress output (only show errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// C source and header
    C,
    /// Linked binary image and map file
    Binary,
}

#[derive(Clone, Copy, ValueEnum)]
enum Pointers {
    Segmented,
    Absolute,
    Relative,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an OBJ mesh as a single bone
    Mesh {
        /// Input OBJ file path
        input: PathBuf,

        /// Output directory for generated files
        #[arg(short, long)]
        output: PathBuf,

        /// Symbol prefix and output file stem (default: input file stem)
        #[arg(long)]
        name: Option<String>,

        /// Target microcode: f3d, f3dex or f3dex2
        #[arg(long, default_value = "f3dex2")]
        ucode: Microcode,

        /// Model units to output units
        #[arg(long, default_value = "1.0")]
        scale: f32,

        /// Force every face onto this draw layer
        #[arg(long)]
        layer: Option<u8>,

        /// Output format
        #[arg(long, value_enum, default_value = "c")]
        format: Format,

        /// Binary image base address
        #[arg(long, default_value = "0", value_parser = parse_u32)]
        base: u32,

        /// Binary image end address (exclusive)
        #[arg(long, default_value = "0x01000000", value_parser = parse_u32)]
        limit: u32,

        /// Segment id covering [base, limit) for segmented pointers
        #[arg(long, default_value = "0x04", value_parser = parse_u8)]
        segment: u8,

        /// How pointers are written into the binary image
        #[arg(long, value_enum, default_value = "segmented")]
        pointers: Pointers,
    },
    /// Compile an OBJ mesh and print statistics without writing
    Info {
        /// Input OBJ file path
        input: PathBuf,

        /// Target microcode: f3d, f3dex or f3dex2
        #[arg(long, default_value = "f3dex2")]
        ucode: Microcode,
    },
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", s, e))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let value = parse_u32(s)?;
    u8::try_from(value).map_err(|_| format!("segment id '{}' does not fit in a byte", s))
}

fn params_for(input: &Path, name: Option<String>, ucode: Microcode, scale: f32) -> Result<CompileParams, CompileError> {
    let prefix = match name {
        Some(name) => name,
        None => generate_identifier(input)?,
    };
    Ok(CompileParams {
        microcode: ucode,
        export_scale: scale,
        prefix,
        ..Default::default()
    })
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging (suppressed if --quiet)
    if !cli.quiet {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    let result = match cli.command {
        Commands::Mesh {
            input,
            output,
            name,
            ucode,
            scale,
            layer,
            format,
            base,
            limit,
            segment,
            pointers,
        } => params_for(&input, name, ucode, scale).and_then(|params| {
            let format = match format {
                Format::C => OutputFormat::C,
                Format::Binary => {
                    let pointer_mode = match pointers {
                        Pointers::Segmented => PointerMode::Segmented,
                        Pointers::Absolute => PointerMode::Absolute,
                        Pointers::Relative => PointerMode::Relative,
                    };
                    // Only segmented pointers need [base, limit) to fit one segment
                    let segments = match pointer_mode {
                        PointerMode::Segmented => SegmentTable::single(segment, base, limit)?,
                        _ => SegmentTable::default(),
                    };
                    OutputFormat::Binary(BinaryLayout {
                        base,
                        limit,
                        pointer_mode,
                        segments,
                        ..Default::default()
                    })
                }
            };
            dl_build_tool::convert_mesh(&input, &output, &params, layer, &format).map(
                |(artifact, written)| {
                    if !cli.quiet {
                        eprintln!(
                            "Success: Mesh compiled: {} ({} blocks, {} bytes, {} files)",
                            artifact.entry,
                            artifact.blocks.len(),
                            artifact.total_bytes(),
                            written.len()
                        );
                    }
                },
            )
        }),
        Commands::Info { input, ucode } => params_for(&input, None, ucode, 1.0).and_then(|params| {
            dl_build_tool::compile_obj(&input, &params, None).map(|(mesh, artifact)| {
                println!("{} ({})", mesh.name, params.microcode);
                println!("  vertices:  {}", mesh.vertices.len());
                println!("  triangles: {}", mesh.triangles.len());
                println!("  materials: {}", mesh.materials.len());
                println!("  blocks:    {} ({} bytes)", artifact.blocks.len(), artifact.total_bytes());
                for stats in &artifact.stats {
                    println!(
                        "  {} / {}: {} triangles, {} vertices, {} flushes",
                        stats.bone, stats.list, stats.triangles, stats.vertices, stats.flushes
                    );
                }
            })
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
