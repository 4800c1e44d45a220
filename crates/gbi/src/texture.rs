//! Texture image formats and the load-block command sequence.

use crate::command::{Command, Ref, TileAxis};

/// G_TX_LOADTILE
pub const LOAD_TILE: u8 = 7;

/// Fractional bits of SETTILESIZE coordinates.
pub const G_TEXTURE_IMAGE_FRAC: u32 = 2;

/// Fractional bits of the LOADBLOCK dxt value.
const G_TX_DXT_FRAC: u32 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImageFormat {
    Rgba,
    Yuv,
    Ci,
    Ia,
    I,
}

impl ImageFormat {
    pub fn code(self) -> u32 {
        match self {
            ImageFormat::Rgba => 0,
            ImageFormat::Yuv => 1,
            ImageFormat::Ci => 2,
            ImageFormat::Ia => 3,
            ImageFormat::I => 4,
        }
    }

    pub fn c_name(self) -> &'static str {
        match self {
            ImageFormat::Rgba => "G_IM_FMT_RGBA",
            ImageFormat::Yuv => "G_IM_FMT_YUV",
            ImageFormat::Ci => "G_IM_FMT_CI",
            ImageFormat::Ia => "G_IM_FMT_IA",
            ImageFormat::I => "G_IM_FMT_I",
        }
    }
}

/// Texel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImageSize {
    Bits4,
    Bits8,
    Bits16,
    Bits32,
}

impl ImageSize {
    pub fn code(self) -> u32 {
        match self {
            ImageSize::Bits4 => 0,
            ImageSize::Bits8 => 1,
            ImageSize::Bits16 => 2,
            ImageSize::Bits32 => 3,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            ImageSize::Bits4 => 4,
            ImageSize::Bits8 => 8,
            ImageSize::Bits16 => 16,
            ImageSize::Bits32 => 32,
        }
    }

    pub fn c_name(self) -> &'static str {
        match self {
            ImageSize::Bits4 => "G_IM_SIZ_4b",
            ImageSize::Bits8 => "G_IM_SIZ_8b",
            ImageSize::Bits16 => "G_IM_SIZ_16b",
            ImageSize::Bits32 => "G_IM_SIZ_32b",
        }
    }

    /// Texel size used while the image streams through the load tile.
    fn load_block(self) -> ImageSize {
        match self {
            ImageSize::Bits32 => ImageSize::Bits32,
            _ => ImageSize::Bits16,
        }
    }

    /// (INCR, SHIFT) applied to the texel count for LOADBLOCK's lrs.
    fn load_incr_shift(self) -> (u32, u32) {
        match self {
            ImageSize::Bits4 => (3, 2),
            ImageSize::Bits8 => (1, 1),
            ImageSize::Bits16 | ImageSize::Bits32 => (0, 0),
        }
    }
}

/// One texture bound to a render tile, loaded with LOADBLOCK.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureLoad {
    pub image: Ref,
    pub format: ImageFormat,
    pub size: ImageSize,
    pub width: u16,
    pub height: u16,
    /// Render tile (0 for texture 0, 1 for texture 1).
    pub tile: u8,
    /// TMEM address in 64-bit words.
    pub tmem: u16,
    pub palette: u8,
    pub s: TileAxis,
    pub t: TileAxis,
}

impl TextureLoad {
    /// 64-bit TMEM words occupied by the image.
    pub fn tmem_words(&self) -> u16 {
        let bytes = u32::from(self.width) * u32::from(self.height) * self.size.bits() / 8;
        bytes.div_ceil(8) as u16
    }

    /// TMEM words per row of the render tile.
    fn line(&self) -> u16 {
        let width = u32::from(self.width);
        let line_bytes = match self.size {
            ImageSize::Bits4 => width / 2,
            ImageSize::Bits8 => width,
            ImageSize::Bits16 | ImageSize::Bits32 => width * 2,
        };
        line_bytes.div_ceil(8) as u16
    }

    /// Texels per 64-bit word, expressed as the CALC_DXT reciprocal.
    fn dxt(&self) -> u16 {
        let width = u32::from(self.width);
        let words = match self.size {
            ImageSize::Bits4 => (width / 16).max(1),
            size => (width * size.bits() / 8 / 8).max(1),
        };
        (((1 << G_TX_DXT_FRAC) + words - 1) / words) as u16
    }

    fn lrs(&self) -> u16 {
        let (incr, shift) = self.size.load_incr_shift();
        let texels = u32::from(self.width) * u32::from(self.height);
        (((texels + incr) >> shift).saturating_sub(1)) as u16
    }

    /// The SETTIMG .. SETTILESIZE sequence that loads and binds this image.
    pub fn commands(&self) -> Vec<Command> {
        let load_size = self.size.load_block();
        vec![
            Command::SetTextureImage {
                format: self.format,
                size: load_size,
                width: 1,
                source: self.image.clone(),
            },
            Command::SetTile {
                format: self.format,
                size: load_size,
                line: 0,
                tmem: self.tmem,
                tile: LOAD_TILE,
                palette: 0,
                s: self.s,
                t: self.t,
            },
            Command::LoadSync,
            Command::LoadBlock {
                tile: LOAD_TILE,
                uls: 0,
                ult: 0,
                lrs: self.lrs(),
                dxt: self.dxt(),
            },
            Command::PipeSync,
            Command::SetTile {
                format: self.format,
                size: self.size,
                line: self.line(),
                tmem: self.tmem,
                tile: self.tile,
                palette: self.palette,
                s: self.s,
                t: self.t,
            },
            Command::SetTileSize {
                tile: self.tile,
                uls: 0,
                ult: 0,
                lrs: ((u32::from(self.width).saturating_sub(1)) << G_TEXTURE_IMAGE_FRAC) as u16,
                lrt: ((u32::from(self.height).saturating_sub(1)) << G_TEXTURE_IMAGE_FRAC) as u16,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(size: ImageSize, width: u16, height: u16) -> TextureLoad {
        TextureLoad {
            image: Ref::new("tex"),
            format: ImageFormat::Rgba,
            size,
            width,
            height,
            tile: 0,
            tmem: 0,
            palette: 0,
            s: TileAxis::default(),
            t: TileAxis::default(),
        }
    }

    // --- load block parameters ---

    #[test]
    fn test_rgba16_32x32() {
        let tex = load(ImageSize::Bits16, 32, 32);
        assert_eq!(tex.lrs(), 1023);
        // 32 texels * 2 bytes = 8 words per row
        assert_eq!(tex.dxt(), 256);
        assert_eq!(tex.line(), 8);
        assert_eq!(tex.tmem_words(), 256);
    }

    #[test]
    fn test_ci4_loads_as_16b() {
        let tex = load(ImageSize::Bits4, 64, 64);
        assert_eq!(tex.lrs(), 1023);
        assert_eq!(tex.dxt(), 512);
        assert_eq!(tex.line(), 4);
        let cmds = tex.commands();
        assert!(matches!(
            cmds[0],
            Command::SetTextureImage {
                size: ImageSize::Bits16,
                ..
            }
        ));
    }

    #[test]
    fn test_sequence_shape() {
        let cmds = load(ImageSize::Bits8, 16, 16).commands();
        assert_eq!(cmds.len(), 7);
        assert_eq!(cmds[2], Command::LoadSync);
        assert_eq!(cmds[4], Command::PipeSync);
        assert_eq!(
            cmds[6],
            Command::SetTileSize {
                tile: 0,
                uls: 0,
                ult: 0,
                lrs: 60,
                lrt: 60
            }
        );
    }
}
