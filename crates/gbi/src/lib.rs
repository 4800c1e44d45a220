//! Graphics Binary Interface for the F3D microcode family.
//!
//! Everything here is pure encoding: microcode opcode tables, geometry and
//! other-mode bit layouts, the 64-bit command words, the 16-byte vertex
//! record and the lights record. Each command can also be rendered as the
//! matching libultra static macro for symbolic output.

/// Microcode variants, opcode tables, geometry-mode and other-mode layouts.
pub mod ucode;

/// Color combiner inputs and SETCOMBINE packing.
pub mod combine;

/// Display list commands and their per-microcode encoding.
pub mod command;

/// Texture load-block command sequences.
pub mod texture;

/// Vertex and lights data records.
pub mod vtx;

pub use combine::{AcInput, CcInput, CombineCycle, CombineMode, CombinerUses};
pub use command::{Command, GbiError, Key, MatrixParams, Ref, RefField, TileAxis};
pub use texture::{ImageFormat, ImageSize, TextureLoad};
pub use ucode::{GeometryMode, Microcode, OtherModeH, OtherModeL};
pub use vtx::{DirLight, Lights, Vtx};
