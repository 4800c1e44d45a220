//! Scene graph input and the geolayout commands it compiles to.

use crate::artifact::{Fixup, FixupKind};
use gbi::Ref;

/// A bone's geometry drawn by a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRef {
    pub bone: String,
    /// Forces every face of the bone onto this layer.
    pub layer: Option<u8>,
}

impl DrawRef {
    pub fn new(bone: impl Into<String>) -> Self {
        Self {
            bone: bone.into(),
            layer: None,
        }
    }
}

/// A callback address, either literal or resolved from the external table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FunctionRef {
    Address(u32),
    Symbol(String),
}

impl FunctionRef {
    fn to_c(&self) -> String {
        match self {
            FunctionRef::Address(address) => format!("0x{address:08X}"),
            FunctionRef::Symbol(name) => name.clone(),
        }
    }
}

/// Which materials a material override replaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OverrideKind {
    /// Only the listed materials.
    Specific(Vec<usize>),
    /// Every material except the listed ones.
    All { except: Vec<usize> },
}

/// One runtime-selectable case of a switch node.
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchOption {
    /// An independent subtree. Option 0 is always one.
    Subtree(SceneNode),
    /// Option 0 redrawn with `material` in place of the overridden ones.
    MaterialOverride { material: usize, kind: OverrideKind },
    /// Option 0 redrawn with every draw on `layer`.
    DrawLayer(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Start,
    Shadow {
        shadow_type: u16,
        solidity: u16,
        scale: u16,
    },
    TranslateRotate {
        translation: [i16; 3],
        rotation: [i16; 3],
        draw: Option<DrawRef>,
    },
    Translate {
        translation: [i16; 3],
        draw: Option<DrawRef>,
    },
    Rotate {
        rotation: [i16; 3],
        draw: Option<DrawRef>,
    },
    Billboard {
        translation: [i16; 3],
        draw: Option<DrawRef>,
    },
    Scale {
        /// 16.16 fixed point.
        scale: u32,
        draw: Option<DrawRef>,
    },
    DisplayList {
        draw: DrawRef,
    },
    Function {
        function: FunctionRef,
        param: i16,
    },
    Switch {
        function: FunctionRef,
        default: i16,
        options: Vec<SwitchOption>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: String,
    pub kind: NodeKind,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<SceneNode>) -> Self {
        self.children = children;
        self
    }

    pub fn draw(&self) -> Option<&DrawRef> {
        match &self.kind {
            NodeKind::TranslateRotate { draw, .. }
            | NodeKind::Translate { draw, .. }
            | NodeKind::Rotate { draw, .. }
            | NodeKind::Billboard { draw, .. }
            | NodeKind::Scale { draw, .. } => draw.as_ref(),
            NodeKind::DisplayList { draw } => Some(draw),
            _ => None,
        }
    }
}

/// Optional display list carried by a transform command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDl {
    pub layer: u8,
    pub dl: Option<String>,
}

impl LayerDl {
    pub fn none() -> Self {
        Self {
            layer: 0,
            dl: None,
        }
    }

    fn param(&self) -> u8 {
        (u8::from(self.dl.is_some()) << 7) | (self.layer & 0x0F)
    }
}

/// SM64 geolayout command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoCommand {
    End,
    Branch { target: String, store_return: bool },
    Return,
    NodeOpen,
    NodeClose,
    Start,
    Switch { default: i16, function: FunctionRef },
    TranslateRotate {
        draw: LayerDl,
        translation: [i16; 3],
        rotation: [i16; 3],
    },
    Translate { draw: LayerDl, translation: [i16; 3] },
    Rotate { draw: LayerDl, rotation: [i16; 3] },
    Billboard { draw: LayerDl, translation: [i16; 3] },
    LoadDl { layer: u8, dl: String },
    Shadow {
        shadow_type: u16,
        solidity: u16,
        scale: u16,
    },
    CallAsm { param: i16, function: FunctionRef },
    Scale { draw: LayerDl, scale: u32 },
}

struct GeoWriter {
    bytes: Vec<u8>,
    fixups: Vec<Fixup>,
}

impl GeoWriter {
    fn new(opcode: u8) -> Self {
        Self {
            bytes: vec![opcode],
            fixups: Vec::new(),
        }
    }

    fn u8(&mut self, v: u8) -> &mut Self {
        self.bytes.push(v);
        self
    }

    fn u16(&mut self, v: u16) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self
    }

    fn i16s(&mut self, values: &[i16]) -> &mut Self {
        for v in values {
            self.bytes.extend_from_slice(&v.to_be_bytes());
        }
        self
    }

    fn u32(&mut self, v: u32) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self
    }

    fn pointer(&mut self, symbol: &str) -> &mut Self {
        self.fixups.push(Fixup {
            offset: self.bytes.len(),
            target: Ref::new(symbol),
            kind: FixupKind::Data,
        });
        self.u32(0)
    }

    fn function(&mut self, function: &FunctionRef) -> &mut Self {
        match function {
            FunctionRef::Address(address) => self.u32(*address),
            FunctionRef::Symbol(name) => {
                self.fixups.push(Fixup {
                    offset: self.bytes.len(),
                    target: Ref::new(name.clone()),
                    kind: FixupKind::Function,
                });
                self.u32(0)
            }
        }
    }

    fn optional_dl(&mut self, draw: &LayerDl) -> &mut Self {
        if let Some(dl) = &draw.dl {
            self.pointer(dl);
        }
        self
    }

    fn finish(&mut self) -> (Vec<u8>, Vec<Fixup>) {
        (
            std::mem::take(&mut self.bytes),
            std::mem::take(&mut self.fixups),
        )
    }
}

impl GeoCommand {
    pub fn byte_len(&self) -> usize {
        let dl = |draw: &LayerDl| if draw.dl.is_some() { 4 } else { 0 };
        match self {
            GeoCommand::End
            | GeoCommand::Return
            | GeoCommand::NodeOpen
            | GeoCommand::NodeClose
            | GeoCommand::Start => 4,
            GeoCommand::Branch { .. }
            | GeoCommand::Switch { .. }
            | GeoCommand::LoadDl { .. }
            | GeoCommand::Shadow { .. }
            | GeoCommand::CallAsm { .. } => 8,
            GeoCommand::TranslateRotate { draw, .. } => 16 + dl(draw),
            GeoCommand::Translate { draw, .. }
            | GeoCommand::Rotate { draw, .. }
            | GeoCommand::Billboard { draw, .. }
            | GeoCommand::Scale { draw, .. } => 8 + dl(draw),
        }
    }

    /// Big-endian bytes plus pointer sites (offsets relative to the command).
    pub fn encode(&self) -> (Vec<u8>, Vec<Fixup>) {
        match self {
            GeoCommand::End => GeoWriter::new(0x01).u8(0).u16(0).finish(),
            GeoCommand::Branch {
                target,
                store_return,
            } => GeoWriter::new(0x02)
                .u8(u8::from(*store_return))
                .u16(0)
                .pointer(target)
                .finish(),
            GeoCommand::Return => GeoWriter::new(0x03).u8(0).u16(0).finish(),
            GeoCommand::NodeOpen => GeoWriter::new(0x04).u8(0).u16(0).finish(),
            GeoCommand::NodeClose => GeoWriter::new(0x05).u8(0).u16(0).finish(),
            GeoCommand::Start => GeoWriter::new(0x0B).u8(0).u16(0).finish(),
            GeoCommand::Switch { default, function } => GeoWriter::new(0x0E)
                .u8(0)
                .i16s(&[*default])
                .function(function)
                .finish(),
            GeoCommand::TranslateRotate {
                draw,
                translation,
                rotation,
            } => GeoWriter::new(0x10)
                .u8(draw.param())
                .u16(0)
                .i16s(translation)
                .i16s(rotation)
                .optional_dl(draw)
                .finish(),
            GeoCommand::Translate { draw, translation } => GeoWriter::new(0x11)
                .u8(draw.param())
                .i16s(translation)
                .optional_dl(draw)
                .finish(),
            GeoCommand::Rotate { draw, rotation } => GeoWriter::new(0x12)
                .u8(draw.param())
                .i16s(rotation)
                .optional_dl(draw)
                .finish(),
            GeoCommand::Billboard { draw, translation } => GeoWriter::new(0x14)
                .u8(draw.param())
                .i16s(translation)
                .optional_dl(draw)
                .finish(),
            GeoCommand::LoadDl { layer, dl } => GeoWriter::new(0x15)
                .u8(*layer)
                .u16(0)
                .pointer(dl)
                .finish(),
            GeoCommand::Shadow {
                shadow_type,
                solidity,
                scale,
            } => GeoWriter::new(0x16)
                .u8(0)
                .u16(*shadow_type)
                .u16(*solidity)
                .u16(*scale)
                .finish(),
            GeoCommand::CallAsm { param, function } => GeoWriter::new(0x18)
                .u8(0)
                .i16s(&[*param])
                .function(function)
                .finish(),
            GeoCommand::Scale { draw, scale } => GeoWriter::new(0x1D)
                .u8(draw.param())
                .u16(0)
                .u32(*scale)
                .optional_dl(draw)
                .finish(),
        }
    }

    /// `geo_commands.h` macro text.
    pub fn to_c(&self) -> String {
        let xyz = |v: &[i16; 3]| format!("{}, {}, {}", v[0], v[1], v[2]);
        match self {
            GeoCommand::End => "GEO_END()".to_string(),
            GeoCommand::Branch {
                target,
                store_return,
            } => format!("GEO_BRANCH({}, {})", u8::from(*store_return), target),
            GeoCommand::Return => "GEO_RETURN()".to_string(),
            GeoCommand::NodeOpen => "GEO_OPEN_NODE()".to_string(),
            GeoCommand::NodeClose => "GEO_CLOSE_NODE()".to_string(),
            GeoCommand::Start => "GEO_NODE_START()".to_string(),
            GeoCommand::Switch { default, function } => {
                format!("GEO_SWITCH_CASE({}, {})", default, function.to_c())
            }
            GeoCommand::TranslateRotate {
                draw,
                translation,
                rotation,
            } => match &draw.dl {
                Some(dl) => format!(
                    "GEO_TRANSLATE_ROTATE_WITH_DL({}, {}, {}, {})",
                    draw.layer,
                    xyz(translation),
                    xyz(rotation),
                    dl
                ),
                None => format!(
                    "GEO_TRANSLATE_ROTATE({}, {}, {})",
                    draw.layer,
                    xyz(translation),
                    xyz(rotation)
                ),
            },
            GeoCommand::Translate { draw, translation } => match &draw.dl {
                Some(dl) => format!(
                    "GEO_TRANSLATE_NODE_WITH_DL({}, {}, {})",
                    draw.layer,
                    xyz(translation),
                    dl
                ),
                None => format!("GEO_TRANSLATE_NODE({}, {})", draw.layer, xyz(translation)),
            },
            GeoCommand::Rotate { draw, rotation } => match &draw.dl {
                Some(dl) => format!(
                    "GEO_ROTATION_NODE_WITH_DL({}, {}, {})",
                    draw.layer,
                    xyz(rotation),
                    dl
                ),
                None => format!("GEO_ROTATION_NODE({}, {})", draw.layer, xyz(rotation)),
            },
            GeoCommand::Billboard { draw, translation } => match &draw.dl {
                Some(dl) => format!(
                    "GEO_BILLBOARD_WITH_PARAMS_AND_DL({}, {}, {})",
                    draw.layer,
                    xyz(translation),
                    dl
                ),
                None => format!(
                    "GEO_BILLBOARD_WITH_PARAMS({}, {})",
                    draw.layer,
                    xyz(translation)
                ),
            },
            GeoCommand::LoadDl { layer, dl } => format!("GEO_DISPLAY_LIST({}, {})", layer, dl),
            GeoCommand::Shadow {
                shadow_type,
                solidity,
                scale,
            } => format!("GEO_SHADOW({}, 0x{:02X}, {})", shadow_type, solidity, scale),
            GeoCommand::CallAsm { param, function } => {
                format!("GEO_ASM({}, {})", param, function.to_c())
            }
            GeoCommand::Scale { draw, scale } => match &draw.dl {
                Some(dl) => format!("GEO_SCALE_WITH_DL({}, {}, {})", draw.layer, scale, dl),
                None => format!("GEO_SCALE({}, {})", draw.layer, scale),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_dl(layer: u8, dl: &str) -> LayerDl {
        LayerDl {
            layer,
            dl: Some(dl.to_string()),
        }
    }

    // --- encodings ---

    #[test]
    fn test_fixed_commands() {
        assert_eq!(GeoCommand::End.encode().0, vec![0x01, 0, 0, 0]);
        assert_eq!(GeoCommand::Return.encode().0, vec![0x03, 0, 0, 0]);
        assert_eq!(GeoCommand::NodeOpen.encode().0, vec![0x04, 0, 0, 0]);
        assert_eq!(GeoCommand::NodeClose.encode().0, vec![0x05, 0, 0, 0]);
        assert_eq!(GeoCommand::Start.encode().0, vec![0x0B, 0, 0, 0]);
    }

    #[test]
    fn test_translate_rotate_with_dl() {
        let cmd = GeoCommand::TranslateRotate {
            draw: with_dl(1, "body"),
            translation: [1, -1, 2],
            rotation: [0, 0x4000, 0],
        };
        let (bytes, fixups) = cmd.encode();
        assert_eq!(
            bytes,
            vec![
                0x10, 0x81, 0, 0, 0, 1, 0xFF, 0xFF, 0, 2, 0, 0, 0x40, 0, 0, 0, 0, 0, 0, 0
            ]
        );
        assert_eq!(bytes.len(), cmd.byte_len());
        assert_eq!(fixups.len(), 1);
        assert_eq!(fixups[0].offset, 16);
        assert_eq!(fixups[0].target, Ref::new("body"));
    }

    #[test]
    fn test_translate_without_dl() {
        let cmd = GeoCommand::Translate {
            draw: LayerDl::none(),
            translation: [0x10, 0x20, 0x30],
        };
        let (bytes, fixups) = cmd.encode();
        assert_eq!(bytes, vec![0x11, 0x00, 0, 0x10, 0, 0x20, 0, 0x30]);
        assert!(fixups.is_empty());
    }

    #[test]
    fn test_branch_and_load_dl() {
        let (bytes, fixups) = GeoCommand::Branch {
            target: "opt".into(),
            store_return: true,
        }
        .encode();
        assert_eq!(bytes, vec![0x02, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(fixups[0].offset, 4);

        let (bytes, _) = GeoCommand::LoadDl {
            layer: 4,
            dl: "skin".into(),
        }
        .encode();
        assert_eq!(&bytes[..4], &[0x15, 0x04, 0, 0]);
    }

    #[test]
    fn test_function_pointers() {
        let (bytes, fixups) = GeoCommand::Switch {
            default: 0,
            function: FunctionRef::Address(0x8029_DBD4),
        }
        .encode();
        assert_eq!(bytes, vec![0x0E, 0, 0, 0, 0x80, 0x29, 0xDB, 0xD4]);
        assert!(fixups.is_empty());

        let (_, fixups) = GeoCommand::CallAsm {
            param: 1,
            function: FunctionRef::Symbol("geo_update".into()),
        }
        .encode();
        assert_eq!(fixups[0].kind, FixupKind::Function);
    }

    #[test]
    fn test_scale_and_shadow() {
        let (bytes, _) = GeoCommand::Scale {
            draw: LayerDl::none(),
            scale: 0x0001_0000,
        }
        .encode();
        assert_eq!(bytes, vec![0x1D, 0, 0, 0, 0, 1, 0, 0]);

        let (bytes, _) = GeoCommand::Shadow {
            shadow_type: 1,
            solidity: 0x96,
            scale: 100,
        }
        .encode();
        assert_eq!(bytes, vec![0x16, 0, 0, 1, 0, 0x96, 0, 100]);
    }

    // --- C text ---

    #[test]
    fn test_c_macros() {
        assert_eq!(
            GeoCommand::LoadDl {
                layer: 1,
                dl: "mario_skinned".into()
            }
            .to_c(),
            "GEO_DISPLAY_LIST(1, mario_skinned)"
        );
        assert_eq!(
            GeoCommand::Translate {
                draw: with_dl(4, "dl"),
                translation: [1, 2, 3]
            }
            .to_c(),
            "GEO_TRANSLATE_NODE_WITH_DL(4, 1, 2, 3, dl)"
        );
        assert_eq!(
            GeoCommand::Branch {
                target: "opt1".into(),
                store_return: true
            }
            .to_c(),
            "GEO_BRANCH(1, opt1)"
        );
    }
}
