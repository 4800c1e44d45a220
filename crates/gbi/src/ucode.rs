//! Microcode variants and the bit layouts that differ between them.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// RSP microcode family targeted by an encoded display list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Microcode {
    /// Fast3D: 16 vertex slots, one triangle per draw command.
    F3d,
    /// F3DEX / F3DLX: 32 vertex slots, adds TRI2.
    F3dex,
    /// F3DEX2 / F3DLX2: 32 vertex slots, reorganized opcode space.
    F3dex2,
}

impl Microcode {
    /// Number of vertex slots loaded by a single vertex command.
    pub fn vertex_buffer_size(self) -> usize {
        match self {
            Microcode::F3d => 16,
            Microcode::F3dex | Microcode::F3dex2 => 32,
        }
    }

    /// Whether two triangles can be packed into one draw command.
    pub fn supports_tri2(self) -> bool {
        !matches!(self, Microcode::F3d)
    }

    pub fn is_f3dex2(self) -> bool {
        matches!(self, Microcode::F3dex2)
    }

    /// Opcode table for this microcode.
    pub fn opcodes(self) -> &'static Opcodes {
        match self {
            Microcode::F3d => &F3D_OPCODES,
            Microcode::F3dex => &F3DEX_OPCODES,
            Microcode::F3dex2 => &F3DEX2_OPCODES,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Microcode::F3d => "F3D",
            Microcode::F3dex => "F3DEX",
            Microcode::F3dex2 => "F3DEX2",
        }
    }
}

impl fmt::Display for Microcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Microcode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f3d" => Ok(Microcode::F3d),
            "f3dex" | "f3dlx" => Ok(Microcode::F3dex),
            "f3dex2" | "f3dlx2" => Ok(Microcode::F3dex2),
            other => Err(format!("unknown microcode: {other}")),
        }
    }
}

/// RSP opcodes for one microcode. `None` marks commands the microcode lacks.
#[derive(Debug)]
pub struct Opcodes {
    pub mtx: u8,
    pub popmtx: u8,
    pub vtx: u8,
    pub tri1: u8,
    pub tri2: Option<u8>,
    pub dl: u8,
    pub enddl: u8,
    pub texture: u8,
    pub moveword: u8,
    pub movemem: u8,
    /// Combined set/clear geometry mode (F3DEX2 only).
    pub geometrymode: Option<u8>,
    pub setgeometrymode: Option<u8>,
    pub cleargeometrymode: Option<u8>,
    pub setothermode_h: u8,
    pub setothermode_l: u8,
}

// The F3D immediate opcodes count down from G_IMMFIRST = -65 (0xBF).
const F3D_OPCODES: Opcodes = Opcodes {
    mtx: 0x01,
    popmtx: 0xBD,
    vtx: 0x04,
    tri1: 0xBF,
    tri2: None,
    dl: 0x06,
    enddl: 0xB8,
    texture: 0xBB,
    moveword: 0xBC,
    movemem: 0x03,
    geometrymode: None,
    setgeometrymode: Some(0xB7),
    cleargeometrymode: Some(0xB6),
    setothermode_h: 0xBA,
    setothermode_l: 0xB9,
};

const F3DEX_OPCODES: Opcodes = Opcodes {
    tri2: Some(0xB1),
    ..F3D_OPCODES
};

const F3DEX2_OPCODES: Opcodes = Opcodes {
    mtx: 0xDA,
    popmtx: 0xD8,
    vtx: 0x01,
    tri1: 0x05,
    tri2: Some(0x06),
    dl: 0xDE,
    enddl: 0xDF,
    texture: 0xD7,
    moveword: 0xDB,
    movemem: 0xDC,
    geometrymode: Some(0xD9),
    setgeometrymode: None,
    cleargeometrymode: None,
    setothermode_h: 0xE3,
    setothermode_l: 0xE2,
};

/// RDP opcodes, shared by every microcode.
pub mod rdp {
    pub const G_SETTIMG: u8 = 0xFD;
    pub const G_SETCOMBINE: u8 = 0xFC;
    pub const G_SETENVCOLOR: u8 = 0xFB;
    pub const G_SETPRIMCOLOR: u8 = 0xFA;
    pub const G_SETFOGCOLOR: u8 = 0xF8;
    pub const G_SETTILE: u8 = 0xF5;
    pub const G_LOADBLOCK: u8 = 0xF3;
    pub const G_SETTILESIZE: u8 = 0xF2;
    pub const G_SETCONVERT: u8 = 0xEC;
    pub const G_SETKEYR: u8 = 0xEB;
    pub const G_SETKEYGB: u8 = 0xEA;
    pub const G_RDPTILESYNC: u8 = 0xE8;
    pub const G_RDPPIPESYNC: u8 = 0xE7;
    pub const G_RDPLOADSYNC: u8 = 0xE6;
}

/// MOVEWORD / MOVEMEM indices.
pub mod moveword {
    pub const G_MW_NUMLIGHT: u8 = 0x02;
    pub const G_MW_FOG: u8 = 0x08;
    pub const G_MWO_NUMLIGHT: u16 = 0x00;
    pub const G_MWO_FOG: u16 = 0x00;
    /// F3DEX2 light block index and first-light offset.
    pub const G_MV_LIGHT: u8 = 10;
    pub const G_MVO_L0: u32 = 2 * 24;
    /// F3D first-light index.
    pub const G_MV_L0: u8 = 0x86;
}

/// Logical geometry-mode flags.
///
/// The bit positions here are microcode independent; [`GeometryMode::bits`]
/// maps them onto the words a given microcode expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct GeometryMode(u32);

impl GeometryMode {
    pub const EMPTY: Self = Self(0);
    pub const ZBUFFER: Self = Self(1 << 0);
    pub const SHADE: Self = Self(1 << 1);
    pub const CULL_FRONT: Self = Self(1 << 2);
    pub const CULL_BACK: Self = Self(1 << 3);
    pub const FOG: Self = Self(1 << 4);
    pub const LIGHTING: Self = Self(1 << 5);
    pub const TEXTURE_GEN: Self = Self(1 << 6);
    pub const TEXTURE_GEN_LINEAR: Self = Self(1 << 7);
    pub const SHADING_SMOOTH: Self = Self(1 << 8);
    pub const CLIPPING: Self = Self(1 << 9);

    /// Flags in emission order, with their C names.
    const FLAGS: [(GeometryMode, &'static str); 10] = [
        (Self::ZBUFFER, "G_ZBUFFER"),
        (Self::SHADE, "G_SHADE"),
        (Self::CULL_FRONT, "G_CULL_FRONT"),
        (Self::CULL_BACK, "G_CULL_BACK"),
        (Self::FOG, "G_FOG"),
        (Self::LIGHTING, "G_LIGHTING"),
        (Self::TEXTURE_GEN, "G_TEXTURE_GEN"),
        (Self::TEXTURE_GEN_LINEAR, "G_TEXTURE_GEN_LINEAR"),
        (Self::SHADING_SMOOTH, "G_SHADING_SMOOTH"),
        (Self::CLIPPING, "G_CLIPPING"),
    ];

    pub fn contains(self, other: GeometryMode) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Flags set in `self` but not in `other`.
    pub fn difference(self, other: GeometryMode) -> GeometryMode {
        GeometryMode(self.0 & !other.0)
    }

    /// Hardware word for this set of flags on `ucode`.
    ///
    /// G_CLIPPING does not exist on F3D and contributes nothing there.
    pub fn bits(self, ucode: Microcode) -> u32 {
        Self::FLAGS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(flag, _)| flag_bits(*flag, ucode))
            .fold(0, |acc, b| acc | b)
    }

    /// C expression for this set of flags, `0` when empty.
    pub fn c_names(self, ucode: Microcode) -> String {
        let names: Vec<&str> = Self::FLAGS
            .iter()
            .filter(|(flag, _)| self.contains(*flag) && flag_bits(*flag, ucode) != 0)
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            "0".to_string()
        } else {
            names.join(" | ")
        }
    }
}

fn flag_bits(flag: GeometryMode, ucode: Microcode) -> u32 {
    let ex2 = ucode.is_f3dex2();
    match flag {
        GeometryMode::ZBUFFER => 0x0000_0001,
        GeometryMode::SHADE => 0x0000_0004,
        GeometryMode::FOG => 0x0001_0000,
        GeometryMode::LIGHTING => 0x0002_0000,
        GeometryMode::TEXTURE_GEN => 0x0004_0000,
        GeometryMode::TEXTURE_GEN_LINEAR => 0x0008_0000,
        GeometryMode::CULL_FRONT if ex2 => 0x0000_0200,
        GeometryMode::CULL_FRONT => 0x0000_1000,
        GeometryMode::CULL_BACK if ex2 => 0x0000_0400,
        GeometryMode::CULL_BACK => 0x0000_2000,
        GeometryMode::SHADING_SMOOTH if ex2 => 0x0020_0000,
        GeometryMode::SHADING_SMOOTH => 0x0000_0200,
        GeometryMode::CLIPPING if ucode == Microcode::F3d => 0,
        GeometryMode::CLIPPING => 0x0080_0000,
        _ => 0,
    }
}

impl BitOr for GeometryMode {
    type Output = GeometryMode;

    fn bitor(self, rhs: Self) -> Self::Output {
        GeometryMode(self.0 | rhs.0)
    }
}

impl BitOrAssign for GeometryMode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Fields of the upper other-mode word, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OtherModeH {
    AlphaDither,
    RgbDither,
    CombineKey,
    TextureConvert,
    TextureFilter,
    TextureLut,
    TextureLod,
    TextureDetail,
    TexturePersp,
    CycleType,
    PipelineMode,
}

impl OtherModeH {
    pub const ALL: [OtherModeH; 11] = [
        OtherModeH::AlphaDither,
        OtherModeH::RgbDither,
        OtherModeH::CombineKey,
        OtherModeH::TextureConvert,
        OtherModeH::TextureFilter,
        OtherModeH::TextureLut,
        OtherModeH::TextureLod,
        OtherModeH::TextureDetail,
        OtherModeH::TexturePersp,
        OtherModeH::CycleType,
        OtherModeH::PipelineMode,
    ];

    pub fn shift(self) -> u8 {
        match self {
            OtherModeH::AlphaDither => 4,
            OtherModeH::RgbDither => 6,
            OtherModeH::CombineKey => 8,
            OtherModeH::TextureConvert => 9,
            OtherModeH::TextureFilter => 12,
            OtherModeH::TextureLut => 14,
            OtherModeH::TextureLod => 16,
            OtherModeH::TextureDetail => 17,
            OtherModeH::TexturePersp => 19,
            OtherModeH::CycleType => 20,
            OtherModeH::PipelineMode => 23,
        }
    }

    pub fn width(self) -> u8 {
        match self {
            OtherModeH::CombineKey
            | OtherModeH::TextureLod
            | OtherModeH::TexturePersp
            | OtherModeH::PipelineMode => 1,
            OtherModeH::TextureConvert => 3,
            _ => 2,
        }
    }

    /// Mask of this field within the other-mode word.
    pub fn mask(self) -> u32 {
        ((1u32 << self.width()) - 1) << self.shift()
    }

    pub fn c_macro(self) -> &'static str {
        match self {
            OtherModeH::AlphaDither => "gsDPSetAlphaDither",
            OtherModeH::RgbDither => "gsDPSetColorDither",
            OtherModeH::CombineKey => "gsDPSetCombineKey",
            OtherModeH::TextureConvert => "gsDPSetTextureConvert",
            OtherModeH::TextureFilter => "gsDPSetTextureFilter",
            OtherModeH::TextureLut => "gsDPSetTextureLUT",
            OtherModeH::TextureLod => "gsDPSetTextureLOD",
            OtherModeH::TextureDetail => "gsDPSetTextureDetail",
            OtherModeH::TexturePersp => "gsDPSetTexturePersp",
            OtherModeH::CycleType => "gsDPSetCycleType",
            OtherModeH::PipelineMode => "gsDPPipelineMode",
        }
    }
}

/// Fields of the lower other-mode word, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OtherModeL {
    AlphaCompare,
    DepthSource,
    RenderMode,
}

impl OtherModeL {
    pub const ALL: [OtherModeL; 3] = [
        OtherModeL::AlphaCompare,
        OtherModeL::DepthSource,
        OtherModeL::RenderMode,
    ];

    pub fn shift(self) -> u8 {
        match self {
            OtherModeL::AlphaCompare => 0,
            OtherModeL::DepthSource => 2,
            OtherModeL::RenderMode => 3,
        }
    }

    pub fn width(self) -> u8 {
        match self {
            OtherModeL::AlphaCompare => 2,
            OtherModeL::DepthSource => 1,
            OtherModeL::RenderMode => 29,
        }
    }

    pub fn mask(self) -> u32 {
        ((1u32 << self.width()) - 1) << self.shift()
    }

    pub fn c_macro(self) -> &'static str {
        match self {
            OtherModeL::AlphaCompare => "gsDPSetAlphaCompare",
            OtherModeL::DepthSource => "gsDPSetDepthSource",
            OtherModeL::RenderMode => "gsDPSetRenderMode",
        }
    }
}

/// Common other-mode values (already shifted into place).
pub mod othermode {
    pub const G_AD_PATTERN: u32 = 0;
    pub const G_AD_DISABLE: u32 = 3 << 4;
    pub const G_CD_MAGICSQ: u32 = 0;
    pub const G_CD_DISABLE: u32 = 3 << 6;
    pub const G_CK_NONE: u32 = 0;
    pub const G_CK_KEY: u32 = 1 << 8;
    pub const G_TC_CONV: u32 = 0;
    pub const G_TC_FILTCONV: u32 = 5 << 9;
    pub const G_TC_FILT: u32 = 6 << 9;
    pub const G_TF_POINT: u32 = 0;
    pub const G_TF_BILERP: u32 = 2 << 12;
    pub const G_TF_AVERAGE: u32 = 3 << 12;
    pub const G_TT_NONE: u32 = 0;
    pub const G_TL_TILE: u32 = 0;
    pub const G_TD_CLAMP: u32 = 0;
    pub const G_TP_NONE: u32 = 0;
    pub const G_TP_PERSP: u32 = 1 << 19;
    pub const G_CYC_1CYCLE: u32 = 0;
    pub const G_CYC_2CYCLE: u32 = 1 << 20;
    pub const G_PM_NPRIMITIVE: u32 = 0;
    pub const G_PM_1PRIMITIVE: u32 = 1 << 23;

    pub const G_AC_NONE: u32 = 0;
    pub const G_AC_THRESHOLD: u32 = 1;
    pub const G_AC_DITHER: u32 = 3;
    pub const G_ZS_PIXEL: u32 = 0;
    pub const G_ZS_PRIM: u32 = 1 << 2;

    /// G_RM_AA_ZB_OPA_SURF | G_RM_AA_ZB_OPA_SURF2
    pub const G_RM_AA_ZB_OPA_SURF: u32 = 0x0044_2078 | 0x0011_2078;
    /// G_RM_AA_ZB_XLU_SURF | G_RM_AA_ZB_XLU_SURF2
    pub const G_RM_AA_ZB_XLU_SURF: u32 = 0x0040_49D8 | 0x0010_49D8;
}
