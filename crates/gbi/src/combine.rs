//! Color combiner inputs and the SETCOMBINE word layout.
//!
//! Each cycle computes `(a - b) * c + d` separately for color and alpha.

/// Color combiner input.
///
/// Several inputs share a mux code (e.g. `Center`, `Scale` and `One`); they
/// are kept distinct so channel usage can be inferred from the combiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CcInput {
    Combined,
    Texel0,
    Texel1,
    Primitive,
    Shade,
    Environment,
    Center,
    Scale,
    One,
    CombinedAlpha,
    Noise,
    K4,
    Texel0Alpha,
    Texel1Alpha,
    PrimitiveAlpha,
    ShadeAlpha,
    EnvAlpha,
    LodFraction,
    PrimLodFrac,
    K5,
    Zero,
}

impl CcInput {
    pub fn code(self) -> u32 {
        match self {
            CcInput::Combined => 0,
            CcInput::Texel0 => 1,
            CcInput::Texel1 => 2,
            CcInput::Primitive => 3,
            CcInput::Shade => 4,
            CcInput::Environment => 5,
            CcInput::Center | CcInput::Scale | CcInput::One => 6,
            CcInput::CombinedAlpha | CcInput::Noise | CcInput::K4 => 7,
            CcInput::Texel0Alpha => 8,
            CcInput::Texel1Alpha => 9,
            CcInput::PrimitiveAlpha => 10,
            CcInput::ShadeAlpha => 11,
            CcInput::EnvAlpha => 12,
            CcInput::LodFraction => 13,
            CcInput::PrimLodFrac => 14,
            CcInput::K5 => 15,
            CcInput::Zero => 31,
        }
    }

    pub fn c_name(self) -> &'static str {
        match self {
            CcInput::Combined => "COMBINED",
            CcInput::Texel0 => "TEXEL0",
            CcInput::Texel1 => "TEXEL1",
            CcInput::Primitive => "PRIMITIVE",
            CcInput::Shade => "SHADE",
            CcInput::Environment => "ENVIRONMENT",
            CcInput::Center => "CENTER",
            CcInput::Scale => "SCALE",
            CcInput::One => "1",
            CcInput::CombinedAlpha => "COMBINED_ALPHA",
            CcInput::Noise => "NOISE",
            CcInput::K4 => "K4",
            CcInput::Texel0Alpha => "TEXEL0_ALPHA",
            CcInput::Texel1Alpha => "TEXEL1_ALPHA",
            CcInput::PrimitiveAlpha => "PRIMITIVE_ALPHA",
            CcInput::ShadeAlpha => "SHADE_ALPHA",
            CcInput::EnvAlpha => "ENV_ALPHA",
            CcInput::LodFraction => "LOD_FRACTION",
            CcInput::PrimLodFrac => "PRIM_LOD_FRAC",
            CcInput::K5 => "K5",
            CcInput::Zero => "0",
        }
    }
}

/// Alpha combiner input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AcInput {
    Combined,
    Texel0,
    Texel1,
    Primitive,
    Shade,
    Environment,
    LodFraction,
    PrimLodFrac,
    One,
    Zero,
}

impl AcInput {
    pub fn code(self) -> u32 {
        match self {
            AcInput::Combined | AcInput::LodFraction => 0,
            AcInput::Texel0 => 1,
            AcInput::Texel1 => 2,
            AcInput::Primitive => 3,
            AcInput::Shade => 4,
            AcInput::Environment => 5,
            AcInput::PrimLodFrac | AcInput::One => 6,
            AcInput::Zero => 7,
        }
    }

    pub fn c_name(self) -> &'static str {
        match self {
            AcInput::Combined => "COMBINED",
            AcInput::Texel0 => "TEXEL0",
            AcInput::Texel1 => "TEXEL1",
            AcInput::Primitive => "PRIMITIVE",
            AcInput::Shade => "SHADE",
            AcInput::Environment => "ENVIRONMENT",
            AcInput::LodFraction => "LOD_FRACTION",
            AcInput::PrimLodFrac => "PRIM_LOD_FRAC",
            AcInput::One => "1",
            AcInput::Zero => "0",
        }
    }
}

/// One combiner cycle: `[a, b, c, d]` for color and for alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CombineCycle {
    pub color: [CcInput; 4],
    pub alpha: [AcInput; 4],
}

impl CombineCycle {
    pub const fn new(color: [CcInput; 4], alpha: [AcInput; 4]) -> Self {
        Self { color, alpha }
    }

    /// G_CC_SHADE: vertex shade color and alpha.
    pub const SHADE: CombineCycle = CombineCycle::new(
        [CcInput::Zero, CcInput::Zero, CcInput::Zero, CcInput::Shade],
        [AcInput::Zero, AcInput::Zero, AcInput::Zero, AcInput::Shade],
    );

    /// G_CC_MODULATERGBA: texel 0 modulated by shade.
    pub const MODULATE_RGBA: CombineCycle = CombineCycle::new(
        [CcInput::Texel0, CcInput::Zero, CcInput::Shade, CcInput::Zero],
        [AcInput::Texel0, AcInput::Zero, AcInput::Shade, AcInput::Zero],
    );

    /// G_CC_PASS2: second cycle passes the first cycle through.
    pub const PASS2: CombineCycle = CombineCycle::new(
        [CcInput::Zero, CcInput::Zero, CcInput::Zero, CcInput::Combined],
        [AcInput::Zero, AcInput::Zero, AcInput::Zero, AcInput::Combined],
    );
}

/// Full combiner state for both cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CombineMode {
    pub cycle1: CombineCycle,
    pub cycle2: CombineCycle,
}

/// Which material channels a combiner references.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CombinerUses {
    pub texel0: bool,
    pub texel1: bool,
    pub primitive: bool,
    pub environment: bool,
    pub shade: bool,
    pub key: bool,
    pub convert: bool,
}

impl CombineMode {
    /// Same cycle in both slots, as single-cycle materials are written.
    pub const fn one_cycle(cycle: CombineCycle) -> Self {
        Self {
            cycle1: cycle,
            cycle2: cycle,
        }
    }

    pub const fn two_cycle(cycle1: CombineCycle, cycle2: CombineCycle) -> Self {
        Self { cycle1, cycle2 }
    }

    /// SETCOMBINE command words.
    pub fn words(&self) -> [u32; 2] {
        let [a0, b0, c0, d0] = self.cycle1.color.map(CcInput::code);
        let [aa0, ab0, ac0, ad0] = self.cycle1.alpha.map(AcInput::code);
        let [a1, b1, c1, d1] = self.cycle2.color.map(CcInput::code);
        let [aa1, ab1, ac1, ad1] = self.cycle2.alpha.map(AcInput::code);

        let c0w0 = shl(a0, 20, 4) | shl(c0, 15, 5) | shl(aa0, 12, 3) | shl(ac0, 9, 3);
        let c1w0 = shl(a1, 5, 4) | shl(c1, 0, 5);
        let c0w1 = shl(b0, 28, 4) | shl(d0, 15, 3) | shl(ab0, 12, 3) | shl(ad0, 9, 3);
        let c1w1 = shl(b1, 24, 4)
            | shl(aa1, 21, 3)
            | shl(ac1, 18, 3)
            | shl(d1, 6, 3)
            | shl(ab1, 3, 3)
            | shl(ad1, 0, 3);

        let w0 = (u32::from(crate::ucode::rdp::G_SETCOMBINE) << 24) | ((c0w0 | c1w0) & 0x00FF_FFFF);
        [w0, c0w1 | c1w1]
    }

    /// Arguments of `gsDPSetCombineLERP`, in macro order.
    pub fn c_args(&self) -> String {
        let mut args: Vec<&str> = Vec::with_capacity(16);
        for cycle in [&self.cycle1, &self.cycle2] {
            args.extend(cycle.color.iter().map(|i| i.c_name()));
            args.extend(cycle.alpha.iter().map(|i| i.c_name()));
        }
        args.join(", ")
    }

    /// Channels referenced by the cycles the cycle type actually runs.
    pub fn uses(&self, two_cycle: bool) -> CombinerUses {
        let mut uses = CombinerUses::default();
        let cycles: &[&CombineCycle] = if two_cycle {
            &[&self.cycle1, &self.cycle2]
        } else {
            &[&self.cycle1]
        };
        for cycle in cycles {
            for input in cycle.color {
                match input {
                    CcInput::Texel0 | CcInput::Texel0Alpha => uses.texel0 = true,
                    CcInput::Texel1 | CcInput::Texel1Alpha => uses.texel1 = true,
                    CcInput::Primitive | CcInput::PrimitiveAlpha | CcInput::PrimLodFrac => {
                        uses.primitive = true
                    }
                    CcInput::Environment | CcInput::EnvAlpha => uses.environment = true,
                    CcInput::Shade | CcInput::ShadeAlpha => uses.shade = true,
                    CcInput::Center | CcInput::Scale => uses.key = true,
                    CcInput::K4 | CcInput::K5 => uses.convert = true,
                    _ => {}
                }
            }
            for input in cycle.alpha {
                match input {
                    AcInput::Texel0 => uses.texel0 = true,
                    AcInput::Texel1 => uses.texel1 = true,
                    AcInput::Primitive | AcInput::PrimLodFrac => uses.primitive = true,
                    AcInput::Environment => uses.environment = true,
                    AcInput::Shade => uses.shade = true,
                    _ => {}
                }
            }
        }
        uses
    }
}

fn shl(value: u32, shift: u32, width: u32) -> u32 {
    (value & ((1 << width) - 1)) << shift
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shade_combiner_words() {
        // gsDPSetCombineMode(G_CC_SHADE, G_CC_SHADE)
        let words = CombineMode::one_cycle(CombineCycle::SHADE).words();
        assert_eq!(words, [0xFCFF_FFFF, 0xFFFE_793C]);
    }

    #[test]
    fn test_modulate_rgba_words() {
        // gsDPSetCombineMode(G_CC_MODULATERGBA, G_CC_MODULATERGBA)
        let words = CombineMode::one_cycle(CombineCycle::MODULATE_RGBA).words();
        assert_eq!(words, [0xFC12_1824, 0xFF33_FFFF]);
    }

    #[test]
    fn test_uses_single_cycle_ignores_second() {
        let mode = CombineMode::two_cycle(
            CombineCycle::SHADE,
            CombineCycle::new(
                [CcInput::Primitive, CcInput::Zero, CcInput::Combined, CcInput::Zero],
                [AcInput::Zero, AcInput::Zero, AcInput::Zero, AcInput::Combined],
            ),
        );
        assert!(!mode.uses(false).primitive);
        assert!(mode.uses(true).primitive);
        assert!(mode.uses(false).shade);
    }

    #[test]
    fn test_uses_key_and_convert() {
        let mode = CombineMode::one_cycle(CombineCycle::new(
            [CcInput::Texel1, CcInput::K4, CcInput::K5, CcInput::Texel1],
            [AcInput::Zero, AcInput::Zero, AcInput::Zero, AcInput::One],
        ));
        let uses = mode.uses(false);
        assert!(uses.convert);
        assert!(uses.texel1);
        assert!(!uses.key);

        let keyed = CombineMode::one_cycle(CombineCycle::new(
            [CcInput::Texel0, CcInput::Center, CcInput::Scale, CcInput::Zero],
            [AcInput::Zero, AcInput::Zero, AcInput::Zero, AcInput::One],
        ));
        assert!(keyed.uses(false).key);
    }

    #[test]
    fn test_one_is_not_a_key_reference() {
        let mode = CombineMode::one_cycle(CombineCycle::new(
            [CcInput::Zero, CcInput::Zero, CcInput::Zero, CcInput::One],
            [AcInput::Zero, AcInput::Zero, AcInput::Zero, AcInput::One],
        ));
        assert_eq!(mode.uses(false), CombinerUses::default());
    }

    #[test]
    fn test_c_args_order() {
        let args = CombineMode::one_cycle(CombineCycle::SHADE).c_args();
        assert_eq!(
            args,
            "0, 0, 0, SHADE, 0, 0, 0, SHADE, 0, 0, 0, SHADE, 0, 0, 0, SHADE"
        );
    }
}
