//! Display list commands.
//!
//! A [`Command`] encodes to exactly two big-endian words. Commands that
//! carry a pointer always carry it in the second word; [`Command::encode`]
//! leaves that word zero and [`Command::pointer`] names the target so the
//! linker can patch it in.

use crate::combine::CombineMode;
use crate::texture::{ImageFormat, ImageSize};
use crate::ucode::{moveword, rdp, GeometryMode, Microcode, OtherModeH, OtherModeL};
use crate::vtx::{AMBIENT_SIZE, LIGHT_SIZE, VTX_SIZE};

/// Errors raised when a command cannot be expressed for a microcode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GbiError {
    /// The microcode has no encoding for this command.
    #[error("{command} is not available on {microcode}")]
    Unsupported {
        command: &'static str,
        microcode: Microcode,
    },

    /// A field value does not fit the command.
    #[error("{command}: {field} = {value} is out of range")]
    OutOfRange {
        command: &'static str,
        field: &'static str,
        value: i64,
    },
}

/// Which part of a symbol a pointer addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RefField {
    /// The symbol itself.
    Start,
    /// Element `n` of a `Vtx` array.
    Element(u32),
    /// The ambient light of a lights record.
    Ambient,
    /// Directional light `n` (1-based) of a lights record.
    Light(u8),
}

/// A symbolic pointer, resolved to an address at link time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ref {
    pub symbol: String,
    pub field: RefField,
}

impl Ref {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            field: RefField::Start,
        }
    }

    pub fn element(symbol: impl Into<String>, index: u32) -> Self {
        Self {
            symbol: symbol.into(),
            field: RefField::Element(index),
        }
    }

    pub fn ambient(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            field: RefField::Ambient,
        }
    }

    pub fn light(symbol: impl Into<String>, n: u8) -> Self {
        Self {
            symbol: symbol.into(),
            field: RefField::Light(n),
        }
    }

    /// Byte offset of the addressed field from the symbol's start.
    pub fn byte_offset(&self) -> u32 {
        match self.field {
            RefField::Start | RefField::Ambient => 0,
            RefField::Element(index) => index * VTX_SIZE,
            RefField::Light(n) => AMBIENT_SIZE + u32::from(n.saturating_sub(1)) * LIGHT_SIZE,
        }
    }

    pub fn to_c(&self) -> String {
        match self.field {
            RefField::Start => self.symbol.clone(),
            RefField::Element(index) => format!("{} + {}", self.symbol, index),
            RefField::Ambient => format!("&{}.a", self.symbol),
            RefField::Light(n) => format!("&{}.l[{}]", self.symbol, n.saturating_sub(1)),
        }
    }
}

/// Chroma key parameters for one color channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Key {
    pub center: u8,
    pub scale: u8,
    /// 4.8 fixed-point key width.
    pub width: u16,
}

/// Wrap/mirror/clamp, mask and shift for one tile axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TileAxis {
    pub mirror: bool,
    pub clamp: bool,
    pub mask: u8,
    pub shift: u8,
}

impl TileAxis {
    /// G_TX_MIRROR = 1, G_TX_CLAMP = 2.
    pub fn mode(&self) -> u32 {
        u32::from(self.mirror) | (u32::from(self.clamp) << 1)
    }

    fn c_mode(&self) -> &'static str {
        match (self.mirror, self.clamp) {
            (false, false) => "G_TX_WRAP | G_TX_NOMIRROR",
            (true, false) => "G_TX_WRAP | G_TX_MIRROR",
            (false, true) => "G_TX_CLAMP | G_TX_NOMIRROR",
            (true, true) => "G_TX_CLAMP | G_TX_MIRROR",
        }
    }
}

/// Matrix load parameters, independent of microcode bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MatrixParams {
    pub projection: bool,
    pub load: bool,
    pub push: bool,
}

impl MatrixParams {
    fn bits(&self, ucode: Microcode) -> u32 {
        let (projection, load, push) = if ucode.is_f3dex2() {
            (4, 2, 1)
        } else {
            (1, 2, 4)
        };
        let mut bits = 0;
        if self.projection {
            bits |= projection;
        }
        if self.load {
            bits |= load;
        }
        if self.push {
            bits |= push;
        }
        bits
    }

    fn c_names(&self) -> String {
        [
            if self.projection { "G_MTX_PROJECTION" } else { "G_MTX_MODELVIEW" },
            if self.load { "G_MTX_LOAD" } else { "G_MTX_MUL" },
            if self.push { "G_MTX_PUSH" } else { "G_MTX_NOPUSH" },
        ]
        .join(" | ")
    }
}

/// One display list command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// Load `count` vertices from `source` into slots `start..start+count`.
    Vertex { source: Ref, count: u8, start: u8 },
    Tri1([u8; 3]),
    Tri2([u8; 3], [u8; 3]),
    Matrix { source: Ref, params: MatrixParams },
    /// Pop one modelview matrix.
    PopMatrix,
    /// Call another display list and return.
    DisplayList(Ref),
    /// Jump to another display list without returning.
    BranchList(Ref),
    EndDisplayList,
    Texture {
        scale_s: u16,
        scale_t: u16,
        level: u8,
        tile: u8,
        on: bool,
    },
    /// Combined clear/set (F3DEX2 only).
    GeometryMode { clear: GeometryMode, set: GeometryMode },
    SetGeometryMode(GeometryMode),
    ClearGeometryMode(GeometryMode),
    /// Value is already shifted into the field's position.
    SetOtherModeH { field: OtherModeH, value: u32 },
    SetOtherModeL { field: OtherModeL, value: u32 },
    FogPosition { min: i32, max: i32 },
    NumLights(u8),
    /// Load directional light `index` (1-based), or the ambient when
    /// `index` is one past the light count.
    Light { source: Ref, index: u8 },
    SetCombine(CombineMode),
    SetPrimColor {
        min_level: u8,
        lod_fraction: u8,
        color: [u8; 4],
    },
    SetEnvColor([u8; 4]),
    SetFogColor([u8; 4]),
    SetKeyR(Key),
    SetKeyGB { green: Key, blue: Key },
    SetConvert([i16; 6]),
    SetTextureImage {
        format: ImageFormat,
        size: ImageSize,
        width: u16,
        source: Ref,
    },
    SetTile {
        format: ImageFormat,
        size: ImageSize,
        line: u16,
        tmem: u16,
        tile: u8,
        palette: u8,
        s: TileAxis,
        t: TileAxis,
    },
    LoadBlock {
        tile: u8,
        uls: u16,
        ult: u16,
        lrs: u16,
        dxt: u16,
    },
    SetTileSize {
        tile: u8,
        uls: u16,
        ult: u16,
        lrs: u16,
        lrt: u16,
    },
    TileSync,
    PipeSync,
    LoadSync,
}

/// sizeof(Mtx)
const MTX_SIZE: u32 = 64;

/// G_TX_LDBLK_MAX_TXL
const LOAD_BLOCK_MAX_TEXELS: u16 = 2047;

fn shl(value: u32, shift: u32, width: u32) -> u32 {
    (value & ((1u32 << width) - 1)) << shift
}

fn op(code: u8) -> u32 {
    u32::from(code) << 24
}

fn rgba(color: [u8; 4]) -> u32 {
    u32::from_be_bytes(color)
}

fn dma1p(code: u8, param: u32, len: u32) -> u32 {
    op(code) | shl(param, 16, 8) | shl(len, 0, 16)
}

fn dma2p(code: u8, len: u32, offset: u32, index: u32) -> u32 {
    op(code) | shl((len - 1) / 8, 19, 5) | shl(offset / 8, 8, 8) | shl(index, 0, 8)
}

fn moveword_w0(ucode: Microcode, index: u8, offset: u16) -> u32 {
    let code = ucode.opcodes().moveword;
    if ucode.is_f3dex2() {
        op(code) | shl(u32::from(index), 16, 8) | shl(u32::from(offset), 0, 16)
    } else {
        op(code) | shl(u32::from(offset), 8, 16) | shl(u32::from(index), 0, 8)
    }
}

fn othermode_w0(ucode: Microcode, code: u8, shift: u8, width: u8) -> u32 {
    let (shift, width) = (u32::from(shift), u32::from(width));
    if ucode.is_f3dex2() {
        op(code) | shl(32 - shift - width, 8, 8) | shl(width - 1, 0, 8)
    } else {
        op(code) | shl(shift, 8, 8) | shl(width, 0, 8)
    }
}

fn tri_word(ucode: Microcode, tri: [u8; 3]) -> u32 {
    let scale = if ucode == Microcode::F3d { 10 } else { 2 };
    let [a, b, c] = tri.map(|i| u32::from(i) * scale);
    shl(a, 16, 8) | shl(b, 8, 8) | shl(c, 0, 8)
}

/// Fog multiplier and offset, both s16 as the RSP reads them.
fn fog_word(command: &'static str, min: i32, max: i32) -> Result<u32, GbiError> {
    let (min, max) = (i64::from(min), i64::from(max));
    let range = max - min;
    if range <= 0 {
        return Err(GbiError::OutOfRange {
            command,
            field: "max - min",
            value: range,
        });
    }
    let multiplier = 128_000 / range;
    let offset = (500 - min) * 256 / range;
    let multiplier = i16::try_from(multiplier).map_err(|_| GbiError::OutOfRange {
        command,
        field: "fog multiplier",
        value: multiplier,
    })?;
    let offset = i16::try_from(offset).map_err(|_| GbiError::OutOfRange {
        command,
        field: "fog offset",
        value: offset,
    })?;
    Ok(shl(u32::from(multiplier as u16), 16, 16) | shl(u32::from(offset as u16), 0, 16))
}

/// Every index of `tri` must address a slot of the microcode's buffer.
fn check_indices(command: &'static str, ucode: Microcode, tri: &[u8; 3]) -> Result<(), GbiError> {
    match tri
        .iter()
        .find(|&&i| usize::from(i) >= ucode.vertex_buffer_size())
    {
        Some(&i) => Err(GbiError::OutOfRange {
            command,
            field: "vertex index",
            value: i64::from(i),
        }),
        None => Ok(()),
    }
}

fn num_lights_word(ucode: Microcode, n: u8) -> u32 {
    // NUMLIGHTS_0 is stored as a single black light.
    let n = u32::from(n.max(1));
    if ucode.is_f3dex2() {
        n * 24
    } else {
        (n + 1) * 32 + 0x8000_0000
    }
}

fn convert_words(k: [i16; 6]) -> [u32; 2] {
    let [k0, k1, k2, k3, k4, k5] = k.map(|v| v as u32);
    let k2_high = ((k[2] >> 5) as u32) & 0xF;
    [
        op(rdp::G_SETCONVERT) | shl(k0, 13, 9) | shl(k1, 4, 9) | k2_high,
        shl(k2, 27, 5) | shl(k3, 18, 9) | shl(k4, 9, 9) | shl(k5, 0, 9),
    ]
}

impl Command {
    /// Macro-style name, used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Vertex { .. } => "SPVertex",
            Command::Tri1(_) => "SP1Triangle",
            Command::Tri2(..) => "SP2Triangles",
            Command::Matrix { .. } => "SPMatrix",
            Command::PopMatrix => "SPPopMatrix",
            Command::DisplayList(_) => "SPDisplayList",
            Command::BranchList(_) => "SPBranchList",
            Command::EndDisplayList => "SPEndDisplayList",
            Command::Texture { .. } => "SPTexture",
            Command::GeometryMode { .. } => "SPGeometryMode",
            Command::SetGeometryMode(_) => "SPSetGeometryMode",
            Command::ClearGeometryMode(_) => "SPClearGeometryMode",
            Command::SetOtherModeH { .. } => "SPSetOtherModeH",
            Command::SetOtherModeL { .. } => "SPSetOtherModeL",
            Command::FogPosition { .. } => "SPFogPosition",
            Command::NumLights(_) => "SPNumLights",
            Command::Light { .. } => "SPLight",
            Command::SetCombine(_) => "DPSetCombineLERP",
            Command::SetPrimColor { .. } => "DPSetPrimColor",
            Command::SetEnvColor(_) => "DPSetEnvColor",
            Command::SetFogColor(_) => "DPSetFogColor",
            Command::SetKeyR(_) => "DPSetKeyR",
            Command::SetKeyGB { .. } => "DPSetKeyGB",
            Command::SetConvert(_) => "DPSetConvert",
            Command::SetTextureImage { .. } => "DPSetTextureImage",
            Command::SetTile { .. } => "DPSetTile",
            Command::LoadBlock { .. } => "DPLoadBlock",
            Command::SetTileSize { .. } => "DPSetTileSize",
            Command::TileSync => "DPTileSync",
            Command::PipeSync => "DPPipeSync",
            Command::LoadSync => "DPLoadSync",
        }
    }

    /// Pointer carried in the second word, if any.
    pub fn pointer(&self) -> Option<&Ref> {
        match self {
            Command::Vertex { source, .. }
            | Command::Light { source, .. }
            | Command::SetTextureImage { source, .. }
            | Command::Matrix { source, .. } => Some(source),
            Command::DisplayList(target) | Command::BranchList(target) => Some(target),
            _ => None,
        }
    }

    /// Encode to two words. Pointer words are left zero.
    pub fn encode(&self, ucode: Microcode) -> Result<[u32; 2], GbiError> {
        let ops = ucode.opcodes();
        let unsupported = || GbiError::Unsupported {
            command: self.name(),
            microcode: ucode,
        };

        let words = match self {
            Command::Vertex { count, start, .. } => {
                let (n, v0) = (u32::from(*count), u32::from(*start));
                if n == 0 || (v0 + n) as usize > ucode.vertex_buffer_size() {
                    return Err(GbiError::OutOfRange {
                        command: self.name(),
                        field: "start + count",
                        value: i64::from(v0 + n),
                    });
                }
                let w0 = match ucode {
                    Microcode::F3dex2 => op(ops.vtx) | shl(n, 12, 8) | shl(v0 + n, 1, 7),
                    Microcode::F3dex => dma1p(ops.vtx, v0 * 2, (n << 10) | (VTX_SIZE * n - 1)),
                    Microcode::F3d => dma1p(ops.vtx, ((n - 1) << 4) | v0, VTX_SIZE * n),
                };
                [w0, 0]
            }
            Command::Tri1(tri) => {
                check_indices(self.name(), ucode, tri)?;
                if ucode.is_f3dex2() {
                    [op(ops.tri1) | tri_word(ucode, *tri), 0]
                } else {
                    [op(ops.tri1), tri_word(ucode, *tri)]
                }
            }
            Command::Tri2(first, second) => {
                let code = ops.tri2.ok_or_else(unsupported)?;
                check_indices(self.name(), ucode, first)?;
                check_indices(self.name(), ucode, second)?;
                [
                    op(code) | tri_word(ucode, *first),
                    tri_word(ucode, *second),
                ]
            }
            Command::Matrix { params, .. } => {
                let w0 = if ucode.is_f3dex2() {
                    // G_MTX_PUSH is inverted on F3DEX2.
                    dma2p(ops.mtx, MTX_SIZE, 0, params.bits(ucode) ^ 1)
                } else {
                    dma1p(ops.mtx, params.bits(ucode), MTX_SIZE)
                };
                [w0, 0]
            }
            Command::PopMatrix => {
                if ucode.is_f3dex2() {
                    [dma2p(ops.popmtx, MTX_SIZE, 0, 2), MTX_SIZE]
                } else {
                    [op(ops.popmtx), 0]
                }
            }
            Command::DisplayList(_) => [dma1p(ops.dl, 0, 0), 0],
            Command::BranchList(_) => [dma1p(ops.dl, 1, 0), 0],
            Command::EndDisplayList => [op(ops.enddl), 0],
            Command::Texture {
                scale_s,
                scale_t,
                level,
                tile,
                on,
            } => {
                let on_field = if ucode.is_f3dex2() {
                    shl(u32::from(*on), 1, 7)
                } else {
                    shl(u32::from(*on), 0, 8)
                };
                [
                    op(ops.texture)
                        | shl(u32::from(*level), 11, 3)
                        | shl(u32::from(*tile), 8, 3)
                        | on_field,
                    shl(u32::from(*scale_s), 16, 16) | u32::from(*scale_t),
                ]
            }
            Command::GeometryMode { clear, set } => {
                let code = ops.geometrymode.ok_or_else(unsupported)?;
                [
                    op(code) | (!clear.bits(ucode) & 0x00FF_FFFF),
                    set.bits(ucode),
                ]
            }
            Command::SetGeometryMode(mode) => match ops.setgeometrymode {
                Some(code) => [op(code), mode.bits(ucode)],
                None => {
                    let code = ops.geometrymode.ok_or_else(unsupported)?;
                    [op(code) | 0x00FF_FFFF, mode.bits(ucode)]
                }
            },
            Command::ClearGeometryMode(mode) => match ops.cleargeometrymode {
                Some(code) => [op(code), mode.bits(ucode)],
                None => {
                    let code = ops.geometrymode.ok_or_else(unsupported)?;
                    [op(code) | (!mode.bits(ucode) & 0x00FF_FFFF), 0]
                }
            },
            Command::SetOtherModeH { field, value } => [
                othermode_w0(ucode, ops.setothermode_h, field.shift(), field.width()),
                *value,
            ],
            Command::SetOtherModeL { field, value } => [
                othermode_w0(ucode, ops.setothermode_l, field.shift(), field.width()),
                *value,
            ],
            Command::FogPosition { min, max } => [
                moveword_w0(ucode, moveword::G_MW_FOG, moveword::G_MWO_FOG),
                fog_word(self.name(), *min, *max)?,
            ],
            Command::NumLights(n) => [
                moveword_w0(ucode, moveword::G_MW_NUMLIGHT, moveword::G_MWO_NUMLIGHT),
                num_lights_word(ucode, *n),
            ],
            Command::Light { index, .. } => {
                if *index == 0 {
                    return Err(GbiError::OutOfRange {
                        command: self.name(),
                        field: "index",
                        value: 0,
                    });
                }
                let n = u32::from(*index) - 1;
                let w0 = if ucode.is_f3dex2() {
                    dma2p(
                        ops.movemem,
                        LIGHT_SIZE,
                        n * 24 + moveword::G_MVO_L0,
                        u32::from(moveword::G_MV_LIGHT),
                    )
                } else {
                    dma1p(ops.movemem, n * 2 + u32::from(moveword::G_MV_L0), LIGHT_SIZE)
                };
                [w0, 0]
            }
            Command::SetCombine(mode) => mode.words(),
            Command::SetPrimColor {
                min_level,
                lod_fraction,
                color,
            } => [
                op(rdp::G_SETPRIMCOLOR)
                    | shl(u32::from(*min_level), 8, 8)
                    | u32::from(*lod_fraction),
                rgba(*color),
            ],
            Command::SetEnvColor(color) => [op(rdp::G_SETENVCOLOR), rgba(*color)],
            Command::SetFogColor(color) => [op(rdp::G_SETFOGCOLOR), rgba(*color)],
            Command::SetKeyR(key) => [
                op(rdp::G_SETKEYR),
                shl(u32::from(key.width), 16, 12)
                    | shl(u32::from(key.center), 8, 8)
                    | u32::from(key.scale),
            ],
            Command::SetKeyGB { green, blue } => [
                op(rdp::G_SETKEYGB)
                    | shl(u32::from(green.width), 12, 12)
                    | shl(u32::from(blue.width), 0, 12),
                shl(u32::from(green.center), 24, 8)
                    | shl(u32::from(green.scale), 16, 8)
                    | shl(u32::from(blue.center), 8, 8)
                    | u32::from(blue.scale),
            ],
            Command::SetConvert(k) => convert_words(*k),
            Command::SetTextureImage {
                format,
                size,
                width,
                ..
            } => {
                if *width == 0 {
                    return Err(GbiError::OutOfRange {
                        command: self.name(),
                        field: "width",
                        value: 0,
                    });
                }
                [
                    op(rdp::G_SETTIMG)
                        | shl(format.code(), 21, 3)
                        | shl(size.code(), 19, 2)
                        | shl(u32::from(*width) - 1, 0, 12),
                    0,
                ]
            }
            Command::SetTile {
                format,
                size,
                line,
                tmem,
                tile,
                palette,
                s,
                t,
            } => [
                op(rdp::G_SETTILE)
                    | shl(format.code(), 21, 3)
                    | shl(size.code(), 19, 2)
                    | shl(u32::from(*line), 9, 9)
                    | shl(u32::from(*tmem), 0, 9),
                shl(u32::from(*tile), 24, 3)
                    | shl(u32::from(*palette), 20, 4)
                    | shl(t.mode(), 18, 2)
                    | shl(u32::from(t.mask), 14, 4)
                    | shl(u32::from(t.shift), 10, 4)
                    | shl(s.mode(), 8, 2)
                    | shl(u32::from(s.mask), 4, 4)
                    | shl(u32::from(s.shift), 0, 4),
            ],
            Command::LoadBlock {
                tile,
                uls,
                ult,
                lrs,
                dxt,
            } => [
                op(rdp::G_LOADBLOCK) | shl(u32::from(*uls), 12, 12) | shl(u32::from(*ult), 0, 12),
                shl(u32::from(*tile), 24, 3)
                    | shl(u32::from((*lrs).min(LOAD_BLOCK_MAX_TEXELS)), 12, 12)
                    | shl(u32::from(*dxt), 0, 12),
            ],
            Command::SetTileSize {
                tile,
                uls,
                ult,
                lrs,
                lrt,
            } => [
                op(rdp::G_SETTILESIZE) | shl(u32::from(*uls), 12, 12) | shl(u32::from(*ult), 0, 12),
                shl(u32::from(*tile), 24, 3)
                    | shl(u32::from(*lrs), 12, 12)
                    | shl(u32::from(*lrt), 0, 12),
            ],
            Command::TileSync => [op(rdp::G_RDPTILESYNC), 0],
            Command::PipeSync => [op(rdp::G_RDPPIPESYNC), 0],
            Command::LoadSync => [op(rdp::G_RDPLOADSYNC), 0],
        };
        Ok(words)
    }

    /// Encode to eight big-endian bytes, pointer word zero.
    pub fn to_bytes(&self, ucode: Microcode) -> Result<[u8; 8], GbiError> {
        let [w0, w1] = self.encode(ucode)?;
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&w0.to_be_bytes());
        bytes[4..].copy_from_slice(&w1.to_be_bytes());
        Ok(bytes)
    }

    /// libultra static macro for this command.
    pub fn to_c(&self, ucode: Microcode) -> String {
        match self {
            Command::Vertex {
                source,
                count,
                start,
            } => format!("gsSPVertex({}, {}, {})", source.to_c(), count, start),
            Command::Tri1([a, b, c]) => format!("gsSP1Triangle({a}, {b}, {c}, 0)"),
            Command::Tri2([a, b, c], [d, e, f]) => {
                format!("gsSP2Triangles({a}, {b}, {c}, 0, {d}, {e}, {f}, 0)")
            }
            Command::Matrix { source, params } => {
                format!("gsSPMatrix({}, {})", source.to_c(), params.c_names())
            }
            Command::PopMatrix => "gsSPPopMatrix(G_MTX_MODELVIEW)".to_string(),
            Command::DisplayList(target) => format!("gsSPDisplayList({})", target.to_c()),
            Command::BranchList(target) => format!("gsSPBranchList({})", target.to_c()),
            Command::EndDisplayList => "gsSPEndDisplayList()".to_string(),
            Command::Texture {
                scale_s,
                scale_t,
                level,
                tile,
                on,
            } => format!(
                "gsSPTexture(0x{:04X}, 0x{:04X}, {}, {}, {})",
                scale_s,
                scale_t,
                level,
                tile,
                if *on { "G_ON" } else { "G_OFF" }
            ),
            Command::GeometryMode { clear, set } => format!(
                "gsSPGeometryMode({}, {})",
                clear.c_names(ucode),
                set.c_names(ucode)
            ),
            Command::SetGeometryMode(mode) => {
                format!("gsSPSetGeometryMode({})", mode.c_names(ucode))
            }
            Command::ClearGeometryMode(mode) => {
                format!("gsSPClearGeometryMode({})", mode.c_names(ucode))
            }
            Command::SetOtherModeH { field, value } => {
                format!("{}(0x{:08X})", field.c_macro(), value)
            }
            Command::SetOtherModeL {
                field: OtherModeL::RenderMode,
                value,
            } => format!("gsDPSetRenderMode(0x{:08X}, 0)", value),
            Command::SetOtherModeL { field, value } => {
                format!("{}(0x{:08X})", field.c_macro(), value)
            }
            Command::FogPosition { min, max } => format!("gsSPFogPosition({min}, {max})"),
            Command::NumLights(n) => format!("gsSPNumLights(NUMLIGHTS_{n})"),
            Command::Light { source, index } => {
                format!("gsSPLight({}, {})", source.to_c(), index)
            }
            Command::SetCombine(mode) => format!("gsDPSetCombineLERP({})", mode.c_args()),
            Command::SetPrimColor {
                min_level,
                lod_fraction,
                color: [r, g, b, a],
            } => format!(
                "gsDPSetPrimColor({min_level}, {lod_fraction}, {r}, {g}, {b}, {a})"
            ),
            Command::SetEnvColor([r, g, b, a]) => format!("gsDPSetEnvColor({r}, {g}, {b}, {a})"),
            Command::SetFogColor([r, g, b, a]) => format!("gsDPSetFogColor({r}, {g}, {b}, {a})"),
            Command::SetKeyR(key) => {
                format!("gsDPSetKeyR({}, {}, {})", key.center, key.scale, key.width)
            }
            Command::SetKeyGB { green, blue } => format!(
                "gsDPSetKeyGB({}, {}, {}, {}, {}, {})",
                green.center, green.scale, green.width, blue.center, blue.scale, blue.width
            ),
            Command::SetConvert([k0, k1, k2, k3, k4, k5]) => {
                format!("gsDPSetConvert({k0}, {k1}, {k2}, {k3}, {k4}, {k5})")
            }
            Command::SetTextureImage {
                format,
                size,
                width,
                source,
            } => format!(
                "gsDPSetTextureImage({}, {}, {}, {})",
                format.c_name(),
                size.c_name(),
                width,
                source.to_c()
            ),
            Command::SetTile {
                format,
                size,
                line,
                tmem,
                tile,
                palette,
                s,
                t,
            } => format!(
                "gsDPSetTile({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
                format.c_name(),
                size.c_name(),
                line,
                tmem,
                tile,
                palette,
                t.c_mode(),
                t.mask,
                t.shift,
                s.c_mode(),
                s.mask,
                s.shift
            ),
            Command::LoadBlock {
                tile,
                uls,
                ult,
                lrs,
                dxt,
            } => format!("gsDPLoadBlock({tile}, {uls}, {ult}, {lrs}, {dxt})"),
            Command::SetTileSize {
                tile,
                uls,
                ult,
                lrs,
                lrt,
            } => format!("gsDPSetTileSize({tile}, {uls}, {ult}, {lrs}, {lrt})"),
            Command::TileSync => "gsDPTileSync()".to_string(),
            Command::PipeSync => "gsDPPipeSync()".to_string(),
            Command::LoadSync => "gsDPLoadSync()".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- pointers ---

    #[test]
    fn test_ref_offsets() {
        assert_eq!(Ref::new("dl").byte_offset(), 0);
        assert_eq!(Ref::element("vtx", 3).byte_offset(), 48);
        assert_eq!(Ref::ambient("lights").byte_offset(), 0);
        assert_eq!(Ref::light("lights", 1).byte_offset(), 8);
        assert_eq!(Ref::light("lights", 2).byte_offset(), 24);
    }

    #[test]
    fn test_ref_c_text() {
        assert_eq!(Ref::element("mesh_vtx_0", 6).to_c(), "mesh_vtx_0 + 6");
        assert_eq!(Ref::light("mat_lights", 1).to_c(), "&mat_lights.l[0]");
        assert_eq!(Ref::ambient("mat_lights").to_c(), "&mat_lights.a");
    }

    #[test]
    fn test_pointer_presence() {
        let vtx = Command::Vertex {
            source: Ref::element("v", 0),
            count: 3,
            start: 0,
        };
        assert_eq!(vtx.pointer(), Some(&Ref::element("v", 0)));
        assert!(Command::PipeSync.pointer().is_none());
    }

    // --- errors ---

    #[test]
    fn test_vertex_overflow_rejected() {
        let cmd = Command::Vertex {
            source: Ref::new("v"),
            count: 4,
            start: 14,
        };
        assert!(matches!(
            cmd.encode(Microcode::F3d),
            Err(GbiError::OutOfRange { value: 18, .. })
        ));
        assert!(cmd.encode(Microcode::F3dex).is_ok());
    }

    #[test]
    fn test_fog_requires_range() {
        let cmd = Command::FogPosition { min: 900, max: 900 };
        assert!(cmd.encode(Microcode::F3dex2).is_err());
    }

    #[test]
    fn test_fog_extreme_range_rejected() {
        // (500 - min) * 256 overflows i32 here.
        let cmd = Command::FogPosition {
            min: i32::MIN,
            max: i32::MIN + 1000,
        };
        assert!(matches!(
            cmd.encode(Microcode::F3dex2),
            Err(GbiError::OutOfRange {
                field: "fog offset",
                ..
            })
        ));

        // A one-unit range needs a multiplier of 128000.
        let cmd = Command::FogPosition { min: 0, max: 1 };
        assert!(matches!(
            cmd.encode(Microcode::F3dex2),
            Err(GbiError::OutOfRange {
                field: "fog multiplier",
                value: 128_000,
                ..
            })
        ));
    }

    #[test]
    fn test_triangle_index_beyond_buffer() {
        // Slot 16 does not exist on F3D.
        let cmd = Command::Tri1([0, 1, 16]);
        assert!(matches!(
            cmd.encode(Microcode::F3d),
            Err(GbiError::OutOfRange { value: 16, .. })
        ));
        assert!(cmd.encode(Microcode::F3dex).is_ok());

        let cmd = Command::Tri2([0, 1, 2], [2, 1, 32]);
        assert!(cmd.encode(Microcode::F3dex2).is_err());
    }

    #[test]
    fn test_combined_geometry_mode_unsupported_on_f3d() {
        let cmd = Command::GeometryMode {
            clear: GeometryMode::FOG,
            set: GeometryMode::LIGHTING,
        };
        assert_eq!(
            cmd.encode(Microcode::F3d),
            Err(GbiError::Unsupported {
                command: "SPGeometryMode",
                microcode: Microcode::F3d
            })
        );
    }

    // --- C text ---

    #[test]
    fn test_c_text_samples() {
        let ucode = Microcode::F3dex2;
        assert_eq!(
            Command::Vertex {
                source: Ref::element("mesh_vtx_0", 0),
                count: 3,
                start: 0
            }
            .to_c(ucode),
            "gsSPVertex(mesh_vtx_0 + 0, 3, 0)"
        );
        assert_eq!(
            Command::Tri2([0, 1, 2], [2, 1, 3]).to_c(ucode),
            "gsSP2Triangles(0, 1, 2, 0, 2, 1, 3, 0)"
        );
        assert_eq!(
            Command::SetOtherModeH {
                field: OtherModeH::TextureFilter,
                value: 0
            }
            .to_c(ucode),
            "gsDPSetTextureFilter(0x00000000)"
        );
        assert_eq!(
            Command::ClearGeometryMode(GeometryMode::LIGHTING).to_c(ucode),
            "gsSPClearGeometryMode(G_LIGHTING)"
        );
    }
}
