//! Materials and the cache of compiled setup/revert display lists.
//!
//! A material only emits commands for the render state it actually changes
//! relative to [`MaterialDefaults`], and its revert list restores exactly that
//! state. Compiled lists are shared between every draw that uses the same
//! [`MaterialKey`].

use crate::artifact::{Block, BlockData};
use crate::identifier::NameAllocator;
use gbi::ucode::othermode::*;
use gbi::{
    Command, CombineCycle, CombineMode, GeometryMode, ImageFormat, ImageSize, Key, Lights,
    Microcode, OtherModeH, OtherModeL, Ref, TextureLoad, TileAxis,
};
use std::collections::BTreeMap;

/// G_RM_AA_ZB_TEX_EDGE | G_RM_AA_ZB_TEX_EDGE2
pub const G_RM_AA_ZB_TEX_EDGE: u32 = 0x0044_3078 | 0x0011_3078;

/// Render mode a draw layer implies when the material takes it from the layer.
pub fn layer_render_mode(layer: u8) -> u32 {
    match layer {
        4 => G_RM_AA_ZB_TEX_EDGE,
        5..=7 => G_RM_AA_ZB_XLU_SURF,
        _ => G_RM_AA_ZB_OPA_SURF,
    }
}

/// Default draw layer (LAYER_OPAQUE).
pub const DEFAULT_LAYER: u8 = 1;

/// Default texture dimensions used for UV scaling when nothing is bound.
pub const DEFAULT_TEXTURE_SIZE: [u32; 2] = [32, 32];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fog {
    pub color: [u8; 4],
    pub min: i32,
    pub max: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrimColor {
    pub min_level: u8,
    pub lod_fraction: u8,
    pub color: [u8; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChromaKey {
    pub red: Key,
    pub green: Key,
    pub blue: Key,
}

/// An already-encoded image bound to a texture unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureSlot {
    /// Symbol of the image data (resolved as an external).
    pub image: String,
    pub format: ImageFormat,
    pub size: ImageSize,
    pub width: u16,
    pub height: u16,
    pub palette: u8,
    pub s: TileAxis,
    pub t: TileAxis,
}

/// Where a material's render mode comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// Derived from the draw layer the geometry lands on.
    FromLayer,
    /// A fixed combined (cycle 1 | cycle 2) value.
    Explicit(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub draw_layer: u8,
    pub combine: CombineMode,
    pub geometry_mode: GeometryMode,
    /// Fields this material sets; unset fields keep the default.
    pub other_mode_h: BTreeMap<OtherModeH, u32>,
    /// Alpha compare and depth source. Render mode is [`Material::render_mode`].
    pub other_mode_l: BTreeMap<OtherModeL, u32>,
    /// `None` leaves the render mode alone.
    pub render_mode: Option<RenderMode>,
    pub fog: Fog,
    pub prim: PrimColor,
    pub env: [u8; 4],
    pub key: ChromaKey,
    pub convert: [i16; 6],
    pub lights: Lights,
    pub textures: [Option<TextureSlot>; 2],
    /// SPTexture scale (0xFFFF = 1.0).
    pub texture_scale: [u16; 2],
}

impl Material {
    /// A material identical to `defaults` except for its name.
    pub fn new(name: impl Into<String>, defaults: &MaterialDefaults) -> Self {
        Self {
            name: name.into(),
            draw_layer: DEFAULT_LAYER,
            combine: defaults.combine,
            geometry_mode: defaults.geometry_mode,
            other_mode_h: BTreeMap::new(),
            other_mode_l: BTreeMap::new(),
            render_mode: None,
            fog: defaults.fog,
            prim: defaults.prim,
            env: defaults.env,
            key: defaults.key,
            convert: defaults.convert,
            lights: Lights {
                ambient: [0x7F; 3],
                directional: vec![gbi::DirLight {
                    color: [0xFE; 3],
                    direction: [0x28; 3],
                }],
            },
            textures: [None, None],
            texture_scale: [0xFFFF, 0xFFFF],
        }
    }

    pub fn is_lit(&self) -> bool {
        self.geometry_mode.contains(GeometryMode::LIGHTING)
    }

    fn h(&self, field: OtherModeH, defaults: &MaterialDefaults) -> u32 {
        self.other_mode_h
            .get(&field)
            .copied()
            .unwrap_or_else(|| defaults.h(field))
    }

    fn l(&self, field: OtherModeL, defaults: &MaterialDefaults) -> u32 {
        self.other_mode_l
            .get(&field)
            .copied()
            .unwrap_or_else(|| defaults.l(field))
    }

    pub fn is_two_cycle(&self, defaults: &MaterialDefaults) -> bool {
        self.h(OtherModeH::CycleType, defaults) == G_CYC_2CYCLE
    }

    pub fn is_point_sampled(&self, defaults: &MaterialDefaults) -> bool {
        self.h(OtherModeH::TextureFilter, defaults) == G_TF_POINT
    }

    /// Dimensions of the first referenced, bound texture.
    pub fn texture_size(&self, defaults: &MaterialDefaults) -> [u32; 2] {
        let uses = self.combine.uses(self.is_two_cycle(defaults));
        let used = [uses.texel0, uses.texel1];
        self.textures
            .iter()
            .zip(used)
            .find_map(|(slot, used)| match slot {
                Some(tex) if used => Some([u32::from(tex.width), u32::from(tex.height)]),
                _ => None,
            })
            .unwrap_or(DEFAULT_TEXTURE_SIZE)
    }
}

/// Global render state the setup/revert lists are diffed against.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDefaults {
    pub geometry_mode: GeometryMode,
    pub other_mode_h: BTreeMap<OtherModeH, u32>,
    pub other_mode_l: BTreeMap<OtherModeL, u32>,
    pub combine: CombineMode,
    pub fog: Fog,
    pub prim: PrimColor,
    pub env: [u8; 4],
    pub key: ChromaKey,
    pub convert: [i16; 6],
}

impl Default for MaterialDefaults {
    fn default() -> Self {
        let other_mode_h = BTreeMap::from([
            (OtherModeH::AlphaDither, G_AD_DISABLE),
            (OtherModeH::RgbDither, G_CD_MAGICSQ),
            (OtherModeH::CombineKey, G_CK_NONE),
            (OtherModeH::TextureConvert, G_TC_FILT),
            (OtherModeH::TextureFilter, G_TF_BILERP),
            (OtherModeH::TextureLut, G_TT_NONE),
            (OtherModeH::TextureLod, G_TL_TILE),
            (OtherModeH::TextureDetail, G_TD_CLAMP),
            (OtherModeH::TexturePersp, G_TP_PERSP),
            (OtherModeH::CycleType, G_CYC_1CYCLE),
            (OtherModeH::PipelineMode, G_PM_NPRIMITIVE),
        ]);
        let other_mode_l = BTreeMap::from([
            (OtherModeL::AlphaCompare, G_AC_NONE),
            (OtherModeL::DepthSource, G_ZS_PIXEL),
            (OtherModeL::RenderMode, G_RM_AA_ZB_OPA_SURF),
        ]);
        Self {
            geometry_mode: GeometryMode::ZBUFFER
                | GeometryMode::SHADE
                | GeometryMode::CULL_BACK
                | GeometryMode::LIGHTING
                | GeometryMode::SHADING_SMOOTH,
            other_mode_h,
            other_mode_l,
            combine: CombineMode::one_cycle(CombineCycle::SHADE),
            fog: Fog {
                color: [0xFF; 4],
                min: 970,
                max: 1000,
            },
            prim: PrimColor {
                min_level: 0,
                lod_fraction: 0,
                color: [0xFF; 4],
            },
            env: [0xFF; 4],
            key: ChromaKey::default(),
            convert: [175, -43, -89, 222, 114, 42],
        }
    }
}

impl MaterialDefaults {
    fn h(&self, field: OtherModeH) -> u32 {
        self.other_mode_h.get(&field).copied().unwrap_or(0)
    }

    fn l(&self, field: OtherModeL) -> u32 {
        self.other_mode_l.get(&field).copied().unwrap_or(0)
    }
}

/// Cache key: a material plus the draw layer, when the layer matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialKey {
    pub material: usize,
    pub layer: Option<u8>,
}

impl MaterialKey {
    /// Key for drawing `material` on `layer`. The layer only takes part when
    /// the material overrides the render mode.
    pub fn new(material: usize, material_def: &Material, layer: u8) -> Self {
        Self {
            material,
            layer: material_def.render_mode.map(|_| layer),
        }
    }
}

/// Paired setup and revert lists, built side by side.
#[derive(Default)]
struct StateDiff {
    setup: Vec<Command>,
    revert: Vec<Command>,
}

impl StateDiff {
    fn push(&mut self, setup: Command, revert: Command) {
        self.setup.push(setup);
        self.revert.push(revert);
    }
}

/// Output of compiling one material for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledMaterial {
    pub setup: Vec<Command>,
    /// `None` when nothing needs restoring.
    pub revert: Option<Vec<Command>>,
    pub lights: Option<Lights>,
}

/// Global state restored at the end of a bone's draw list: lighting and
/// texture generation as in `defaults`, the default combiner and texturing
/// off.
pub fn end_draw_commands(defaults: &MaterialDefaults, ucode: Microcode) -> Vec<Command> {
    let tracked = GeometryMode::LIGHTING | GeometryMode::TEXTURE_GEN;
    let clear = tracked.difference(defaults.geometry_mode);
    let set = tracked.difference(clear);

    let mut commands = vec![Command::PipeSync];
    if ucode.is_f3dex2() {
        commands.push(Command::GeometryMode { clear, set });
    } else {
        if !set.is_empty() {
            commands.push(Command::SetGeometryMode(set));
        }
        if !clear.is_empty() {
            commands.push(Command::ClearGeometryMode(clear));
        }
    }
    commands.push(Command::SetCombine(defaults.combine));
    commands.push(Command::Texture {
        scale_s: 0xFFFF,
        scale_t: 0xFFFF,
        level: 0,
        tile: 0,
        on: false,
    });
    commands
}

/// Compile the setup and revert lists of `material` drawn on `layer`.
///
/// `lights_symbol` names the lights record referenced by the light commands.
pub fn compile_material(
    material: &Material,
    layer: u8,
    defaults: &MaterialDefaults,
    ucode: Microcode,
    lights_symbol: &str,
) -> CompiledMaterial {
    let mut diff = StateDiff::default();
    let two_cycle = material.is_two_cycle(defaults);
    let uses = material.combine.uses(two_cycle);

    // combiner
    if material.combine != defaults.combine {
        diff.push(
            Command::SetCombine(material.combine),
            Command::SetCombine(defaults.combine),
        );
    }

    // fog
    if material.geometry_mode.contains(GeometryMode::FOG) {
        if material.fog.color != defaults.fog.color {
            diff.push(
                Command::SetFogColor(material.fog.color),
                Command::SetFogColor(defaults.fog.color),
            );
        }
        if (material.fog.min, material.fog.max) != (defaults.fog.min, defaults.fog.max) {
            diff.push(
                Command::FogPosition {
                    min: material.fog.min,
                    max: material.fog.max,
                },
                Command::FogPosition {
                    min: defaults.fog.min,
                    max: defaults.fog.max,
                },
            );
        }
    }

    // geometry mode
    let set = material.geometry_mode.difference(defaults.geometry_mode);
    let clear = defaults.geometry_mode.difference(material.geometry_mode);
    if ucode.is_f3dex2() {
        if !set.is_empty() || !clear.is_empty() {
            diff.push(
                Command::GeometryMode { clear, set },
                Command::GeometryMode {
                    clear: set,
                    set: clear,
                },
            );
        }
    } else {
        if !set.is_empty() {
            diff.push(
                Command::SetGeometryMode(set),
                Command::ClearGeometryMode(set),
            );
        }
        if !clear.is_empty() {
            diff.push(
                Command::ClearGeometryMode(clear),
                Command::SetGeometryMode(clear),
            );
        }
    }

    // other mode H; key and convert modes are emitted with their colors
    for field in OtherModeH::ALL {
        if matches!(field, OtherModeH::CombineKey | OtherModeH::TextureConvert) {
            continue;
        }
        push_h(&mut diff, material, defaults, field);
    }

    // other mode L
    for field in [OtherModeL::AlphaCompare, OtherModeL::DepthSource] {
        let value = material.l(field, defaults);
        if value != defaults.l(field) {
            diff.push(
                Command::SetOtherModeL { field, value },
                Command::SetOtherModeL {
                    field,
                    value: defaults.l(field),
                },
            );
        }
    }
    if let Some(mode) = material.render_mode {
        let value = match mode {
            RenderMode::FromLayer => layer_render_mode(layer),
            RenderMode::Explicit(value) => value,
        };
        let default = defaults.l(OtherModeL::RenderMode);
        if value != default {
            diff.push(
                Command::SetOtherModeL {
                    field: OtherModeL::RenderMode,
                    value,
                },
                Command::SetOtherModeL {
                    field: OtherModeL::RenderMode,
                    value: default,
                },
            );
        }
    }

    // textures
    let used = [uses.texel0, uses.texel1];
    if used.iter().any(|u| *u) {
        diff.push(
            Command::Texture {
                scale_s: material.texture_scale[0],
                scale_t: material.texture_scale[1],
                level: 0,
                tile: 0,
                on: true,
            },
            Command::Texture {
                scale_s: 0xFFFF,
                scale_t: 0xFFFF,
                level: 0,
                tile: 0,
                on: false,
            },
        );
        let mut tmem = 0;
        for (tile, (slot, used)) in material.textures.iter().zip(used).enumerate() {
            let Some(slot) = slot.as_ref().filter(|_| used) else {
                continue;
            };
            let load = TextureLoad {
                image: Ref::new(slot.image.clone()),
                format: slot.format,
                size: slot.size,
                width: slot.width,
                height: slot.height,
                tile: tile as u8,
                tmem,
                palette: slot.palette,
                s: slot.s,
                t: slot.t,
            };
            tmem += load.tmem_words();
            diff.setup.extend(load.commands());
        }
    }

    // colors
    if uses.primitive && material.prim != defaults.prim {
        diff.push(
            Command::SetPrimColor {
                min_level: material.prim.min_level,
                lod_fraction: material.prim.lod_fraction,
                color: material.prim.color,
            },
            Command::SetPrimColor {
                min_level: defaults.prim.min_level,
                lod_fraction: defaults.prim.lod_fraction,
                color: defaults.prim.color,
            },
        );
    }
    if uses.environment && material.env != defaults.env {
        diff.push(
            Command::SetEnvColor(material.env),
            Command::SetEnvColor(defaults.env),
        );
    }

    // lights
    let mut lights = None;
    if material.is_lit() && uses.shade {
        let count = material.lights.count();
        diff.setup.push(Command::NumLights(count));
        for n in 1..=count {
            diff.setup.push(Command::Light {
                source: Ref::light(lights_symbol, n),
                index: n,
            });
        }
        diff.setup.push(Command::Light {
            source: Ref::ambient(lights_symbol),
            index: count + 1,
        });
        lights = Some(material.lights.clone());
    }

    // chroma key
    push_h(&mut diff, material, defaults, OtherModeH::CombineKey);
    if uses.key && material.key != defaults.key {
        diff.push(
            Command::SetKeyR(material.key.red),
            Command::SetKeyR(defaults.key.red),
        );
        diff.push(
            Command::SetKeyGB {
                green: material.key.green,
                blue: material.key.blue,
            },
            Command::SetKeyGB {
                green: defaults.key.green,
                blue: defaults.key.blue,
            },
        );
    }

    // convert
    push_h(&mut diff, material, defaults, OtherModeH::TextureConvert);
    if uses.convert && material.convert != defaults.convert {
        diff.push(
            Command::SetConvert(material.convert),
            Command::SetConvert(defaults.convert),
        );
    }

    let mut setup = Vec::with_capacity(diff.setup.len() + 2);
    setup.push(Command::PipeSync);
    setup.extend(diff.setup);
    setup.push(Command::EndDisplayList);

    let revert = if diff.revert.is_empty() {
        None
    } else {
        let mut revert = Vec::with_capacity(diff.revert.len() + 2);
        revert.push(Command::PipeSync);
        revert.extend(diff.revert);
        revert.push(Command::EndDisplayList);
        Some(revert)
    };

    CompiledMaterial {
        setup,
        revert,
        lights,
    }
}

fn push_h(diff: &mut StateDiff, material: &Material, defaults: &MaterialDefaults, field: OtherModeH) {
    let value = material.h(field, defaults);
    let default = defaults.h(field);
    if value != default {
        diff.push(
            Command::SetOtherModeH { field, value },
            Command::SetOtherModeH {
                field,
                value: default,
            },
        );
    }
}

/// What a draw needs to know about a compiled material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialHandle {
    pub setup: String,
    pub revert: Option<String>,
    pub texture_size: [u32; 2],
    pub point_sampled: bool,
    pub lit: bool,
}

#[derive(Debug)]
struct CacheEntry {
    handle: MaterialHandle,
    references: usize,
}

/// At most one compiled setup/revert pair per [`MaterialKey`].
#[derive(Debug, Default)]
pub struct MaterialStateCache {
    entries: BTreeMap<MaterialKey, CacheEntry>,
    /// Keys in first-request order.
    order: Vec<MaterialKey>,
    /// Material index → identifier shared by all of its layer variants.
    idents: BTreeMap<usize, String>,
    names: NameAllocator,
    /// Blocks compiled since the last [`MaterialStateCache::take_blocks`].
    pending: Vec<Block>,
}

impl MaterialStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the compiled lists for `key`, compiling them on first request.
    pub fn request(
        &mut self,
        key: MaterialKey,
        materials: &[Material],
        defaults: &MaterialDefaults,
        ucode: Microcode,
        prefix: &str,
    ) -> &MaterialHandle {
        let names = &mut self.names;
        let name = self
            .idents
            .entry(key.material)
            .or_insert_with(|| names.allocate(&materials[key.material].name))
            .clone();
        let pending = &mut self.pending;
        let order = &mut self.order;
        let entry = self.entries.entry(key).or_insert_with(|| {
            let material = &materials[key.material];
            let layer = key.layer.unwrap_or(material.draw_layer);
            let suffix = match key.layer {
                Some(layer) => format!("_layer{layer}"),
                None => String::new(),
            };
            let setup_name = format!("{prefix}_mat_{name}{suffix}");
            let revert_name = format!("{prefix}_mat_revert_{name}{suffix}");
            let lights_name = format!("{setup_name}_lights");
            let origin = format!("material '{}'", material.name);

            let compiled = compile_material(material, layer, defaults, ucode, &lights_name);
            log::debug!(
                "Material '{}' (layer {}): {} setup commands, revert {}",
                material.name,
                layer,
                compiled.setup.len(),
                if compiled.revert.is_some() { "yes" } else { "no" }
            );

            if let Some(lights) = compiled.lights {
                pending.push(Block::new(&lights_name, &origin, BlockData::Lights(lights)));
            }
            pending.push(Block::new(
                &setup_name,
                &origin,
                BlockData::DisplayList(compiled.setup),
            ));
            let revert = compiled.revert.map(|commands| {
                pending.push(Block::new(
                    &revert_name,
                    &origin,
                    BlockData::DisplayList(commands),
                ));
                revert_name
            });
            order.push(key);

            CacheEntry {
                handle: MaterialHandle {
                    setup: setup_name,
                    revert,
                    texture_size: material.texture_size(defaults),
                    point_sampled: material.is_point_sampled(defaults),
                    lit: material.is_lit(),
                },
                references: 0,
            }
        });
        entry.references += 1;
        &entry.handle
    }

    /// Drain the blocks compiled by new entries, in compile order.
    pub fn take_blocks(&mut self) -> Vec<Block> {
        std::mem::take(&mut self.pending)
    }

    pub fn references(&self, key: &MaterialKey) -> usize {
        self.entries.get(key).map_or(0, |e| e.references)
    }

    pub fn keys(&self) -> &[MaterialKey] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gbi::{AcInput, CcInput};

    fn defaults() -> MaterialDefaults {
        MaterialDefaults::default()
    }

    fn textured(defaults: &MaterialDefaults) -> Material {
        let mut mat = Material::new("tex", defaults);
        mat.combine = CombineMode::one_cycle(CombineCycle::MODULATE_RGBA);
        mat.textures[0] = Some(TextureSlot {
            image: "eye_tex".into(),
            format: ImageFormat::Rgba,
            size: ImageSize::Bits16,
            width: 32,
            height: 64,
            palette: 0,
            s: TileAxis::default(),
            t: TileAxis::default(),
        });
        mat
    }

    // --- setup / revert ---

    #[test]
    fn test_default_material_is_minimal() {
        let d = defaults();
        let mat = Material::new("plain", &d);
        let compiled = compile_material(&mat, 1, &d, Microcode::F3dex2, "l");
        // Lit shade material still loads its lights.
        assert_eq!(compiled.setup.first(), Some(&Command::PipeSync));
        assert_eq!(compiled.setup.last(), Some(&Command::EndDisplayList));
        assert_eq!(compiled.setup[1], Command::NumLights(1));
        assert!(compiled.revert.is_none());
        assert!(compiled.lights.is_some());
    }

    #[test]
    fn test_geometry_diff_f3dex2_combined() {
        let d = defaults();
        let mut mat = Material::new("unlit", &d);
        mat.geometry_mode = GeometryMode::ZBUFFER
            | GeometryMode::SHADE
            | GeometryMode::CULL_BACK
            | GeometryMode::SHADING_SMOOTH;
        let compiled = compile_material(&mat, 1, &d, Microcode::F3dex2, "l");
        assert_eq!(
            compiled.setup[1],
            Command::GeometryMode {
                clear: GeometryMode::LIGHTING,
                set: GeometryMode::EMPTY,
            }
        );
        let revert = compiled.revert.unwrap();
        assert_eq!(
            revert[1],
            Command::GeometryMode {
                clear: GeometryMode::EMPTY,
                set: GeometryMode::LIGHTING,
            }
        );
        assert!(compiled.lights.is_none());
    }

    #[test]
    fn test_geometry_diff_f3d_split() {
        let d = defaults();
        let mut mat = Material::new("fog", &d);
        mat.geometry_mode = GeometryMode::ZBUFFER
            | GeometryMode::SHADE
            | GeometryMode::FOG
            | GeometryMode::SHADING_SMOOTH;
        let compiled = compile_material(&mat, 1, &d, Microcode::F3d, "l");
        assert!(compiled
            .setup
            .contains(&Command::SetGeometryMode(GeometryMode::FOG)));
        assert!(compiled.setup.contains(&Command::ClearGeometryMode(
            GeometryMode::CULL_BACK | GeometryMode::LIGHTING
        )));
    }

    #[test]
    fn test_texture_sequence_and_size() {
        let d = defaults();
        let mut mat = textured(&d);
        mat.geometry_mode = GeometryMode::ZBUFFER | GeometryMode::SHADE;
        let compiled = compile_material(&mat, 1, &d, Microcode::F3dex2, "l");
        let texture_at = compiled
            .setup
            .iter()
            .position(|c| matches!(c, Command::Texture { on: true, .. }))
            .unwrap();
        assert!(matches!(
            compiled.setup[texture_at + 1],
            Command::SetTextureImage { .. }
        ));
        assert!(matches!(
            compiled.setup[texture_at + 7],
            Command::SetTileSize { tile: 0, .. }
        ));
        assert_eq!(mat.texture_size(&d), [32, 64]);
        assert!(!mat.is_point_sampled(&d));
        let revert = compiled.revert.unwrap();
        assert!(revert.contains(&Command::Texture {
            scale_s: 0xFFFF,
            scale_t: 0xFFFF,
            level: 0,
            tile: 0,
            on: false,
        }));
    }

    #[test]
    fn test_unused_channel_is_not_emitted() {
        let d = defaults();
        let mut mat = Material::new("env", &d);
        mat.env = [1, 2, 3, 4];
        mat.prim.color = [9, 9, 9, 9];
        let compiled = compile_material(&mat, 1, &d, Microcode::F3dex2, "l");
        assert!(!compiled
            .setup
            .iter()
            .any(|c| matches!(c, Command::SetEnvColor(_) | Command::SetPrimColor { .. })));

        mat.combine = CombineMode::one_cycle(CombineCycle::new(
            [CcInput::Environment, CcInput::Zero, CcInput::Shade, CcInput::Zero],
            [AcInput::Zero, AcInput::Zero, AcInput::Zero, AcInput::Environment],
        ));
        let compiled = compile_material(&mat, 1, &d, Microcode::F3dex2, "l");
        assert!(compiled.setup.contains(&Command::SetEnvColor([1, 2, 3, 4])));
        assert!(compiled
            .revert
            .unwrap()
            .contains(&Command::SetEnvColor([0xFF; 4])));
    }

    #[test]
    fn test_render_mode_from_layer() {
        let d = defaults();
        let mut mat = Material::new("glass", &d);
        mat.render_mode = Some(RenderMode::FromLayer);
        let opaque = compile_material(&mat, 1, &d, Microcode::F3dex2, "l");
        assert!(opaque.revert.is_none());
        let xlu = compile_material(&mat, 5, &d, Microcode::F3dex2, "l");
        assert!(xlu.setup.contains(&Command::SetOtherModeL {
            field: OtherModeL::RenderMode,
            value: G_RM_AA_ZB_XLU_SURF,
        }));
    }

    // --- end of draw ---

    #[test]
    fn test_end_draw_restores_global_state() {
        let d = defaults();
        let commands = end_draw_commands(&d, Microcode::F3d);
        assert_eq!(
            commands,
            vec![
                Command::PipeSync,
                Command::SetGeometryMode(GeometryMode::LIGHTING),
                Command::ClearGeometryMode(GeometryMode::TEXTURE_GEN),
                Command::SetCombine(d.combine),
                Command::Texture {
                    scale_s: 0xFFFF,
                    scale_t: 0xFFFF,
                    level: 0,
                    tile: 0,
                    on: false,
                },
            ]
        );

        let commands = end_draw_commands(&d, Microcode::F3dex2);
        assert_eq!(
            commands[1],
            Command::GeometryMode {
                clear: GeometryMode::TEXTURE_GEN,
                set: GeometryMode::LIGHTING,
            }
        );
        assert_eq!(commands.len(), 4);
    }

    // --- cache ---

    #[test]
    fn test_cache_is_idempotent() {
        let d = defaults();
        let materials = vec![Material::new("a", &d)];
        let mut cache = MaterialStateCache::new();
        let key = MaterialKey::new(0, &materials[0], 1);
        assert_eq!(key.layer, None);
        for _ in 0..3 {
            let handle = cache.request(key, &materials, &d, Microcode::F3dex2, "m");
            assert_eq!(handle.setup, "m_mat_a");
        }
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.references(&key), 3);
        let blocks = cache.take_blocks();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].name, "m_mat_a_lights");
        assert!(cache.take_blocks().is_empty());
    }

    #[test]
    fn test_layer_joins_key_with_render_mode() {
        let d = defaults();
        let mut mat = Material::new("b", &d);
        mat.render_mode = Some(RenderMode::FromLayer);
        let materials = vec![mat];
        let mut cache = MaterialStateCache::new();
        let opaque = MaterialKey::new(0, &materials[0], 1);
        let xlu = MaterialKey::new(0, &materials[0], 5);
        assert_ne!(opaque, xlu);
        let name = cache
            .request(xlu, &materials, &d, Microcode::F3dex2, "m")
            .setup
            .clone();
        assert_eq!(name, "m_mat_b_layer5");
        cache.request(opaque, &materials, &d, Microcode::F3dex2, "m");
        assert_eq!(cache.keys(), &[xlu, opaque]);
    }

    #[test]
    fn test_sanitized_name_clash_gets_counter() {
        let d = defaults();
        let materials = vec![Material::new("Mat.001", &d), Material::new("Mat_001", &d)];
        let mut cache = MaterialStateCache::new();
        let second = MaterialKey::new(1, &materials[1], 1);
        let first = MaterialKey::new(0, &materials[0], 1);
        let a = cache.request(first, &materials, &d, Microcode::F3dex2, "m").clone();
        let b = cache.request(second, &materials, &d, Microcode::F3dex2, "m").clone();
        assert_eq!(a.setup, "m_mat_Mat_001");
        assert_eq!(b.setup, "m_mat_Mat_001_1");
        // Repeated requests keep the allocated name.
        let again = cache.request(second, &materials, &d, Microcode::F3dex2, "m");
        assert_eq!(again.setup, "m_mat_Mat_001_1");
        let names: Vec<String> = cache.take_blocks().into_iter().map(|b| b.name).collect();
        assert!(names.contains(&"m_mat_Mat_001_1_lights".to_string()));
    }
}
