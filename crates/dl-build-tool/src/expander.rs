//! Scene graph expansion into geolayouts.
//!
//! The scene is walked once from the root. Switch option 0 is emitted inline;
//! every other option becomes its own geolayout, reached by a branch, and is
//! produced from a worklist so that options which reuse option 0's structure
//! are traversed again under a different [`Binding`] instead of being copied.

use crate::artifact::{Block, BlockData};
use crate::context::{BoneDraw, CompileContext, DrawKey};
use crate::error::CompileError;
use crate::identifier::NameAllocator;
use crate::scene::{DrawRef, GeoCommand, LayerDl, NodeKind, OverrideKind, SceneNode, SwitchOption};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// How draws below a node are rebound.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Binding {
    /// Substitute material and the materials it replaces.
    pub substitute: Option<(usize, OverrideKind)>,
    /// Forces every draw onto this layer.
    pub layer: Option<u8>,
}

impl Binding {
    /// Effective substitution for a bone drawing `used`.
    fn substitution(&self, used: &BTreeSet<usize>) -> BTreeMap<usize, usize> {
        let Some((substitute, kind)) = &self.substitute else {
            return BTreeMap::new();
        };
        used.iter()
            .copied()
            .filter(|m| m != substitute)
            .filter(|m| match kind {
                OverrideKind::Specific(list) => list.contains(m),
                OverrideKind::All { except } => !except.contains(m),
            })
            .map(|m| (m, *substitute))
            .collect()
    }
}

struct PendingOption<'s> {
    root: &'s SceneNode,
    binding: Binding,
    name: String,
    origin: String,
}

pub struct SceneGraphExpander<'s, 'c, 'm> {
    ctx: &'c mut CompileContext<'m>,
    /// (source node, binding) → geolayout name.
    memo: BTreeMap<(usize, Binding), String>,
    /// Switch node → identifier used in its option names.
    switch_idents: BTreeMap<usize, String>,
    names: NameAllocator,
    worklist: VecDeque<PendingOption<'s>>,
    geolayouts: Vec<Block>,
}

fn node_id(node: &SceneNode) -> usize {
    std::ptr::from_ref(node) as usize
}

impl<'s, 'c, 'm> SceneGraphExpander<'s, 'c, 'm> {
    pub fn new(ctx: &'c mut CompileContext<'m>) -> Self {
        Self {
            ctx,
            memo: BTreeMap::new(),
            switch_idents: BTreeMap::new(),
            names: NameAllocator::new(),
            worklist: VecDeque::new(),
            geolayouts: Vec::new(),
        }
    }

    /// Emit the start geolayout and every option geolayout it reaches.
    /// Returns the geolayout blocks, start first.
    pub fn expand(mut self, scene: &'s SceneNode) -> Result<Vec<Block>, CompileError> {
        let entry = format!("{}_geo", self.ctx.params.prefix);
        let mut commands = Vec::new();
        self.emit_node(scene, &Binding::default(), false, &mut commands)?;
        commands.push(GeoCommand::End);
        self.geolayouts.push(Block::new(
            entry,
            format!("scene root '{}'", scene.name),
            BlockData::GeoLayout(commands),
        ));

        while let Some(option) = self.worklist.pop_front() {
            let mut commands = Vec::new();
            self.emit_node(option.root, &option.binding, true, &mut commands)?;
            commands.push(GeoCommand::Return);
            self.geolayouts.push(Block::new(
                option.name,
                option.origin,
                BlockData::GeoLayout(commands),
            ));
        }

        log::info!("Emitted {} geolayout(s)", self.geolayouts.len());
        Ok(self.geolayouts)
    }

    fn resolve_draw(
        &mut self,
        node: &SceneNode,
        draw: &DrawRef,
        binding: &Binding,
    ) -> Result<BoneDraw, CompileError> {
        let bone = self
            .ctx
            .bones
            .find(&draw.bone)
            .ok_or_else(|| CompileError::UnknownBone {
                node: node.name.clone(),
                bone: draw.bone.clone(),
            })?;
        let used = self.ctx.bone_materials(bone);
        self.ctx.bone_draw(DrawKey {
            bone,
            layer: binding.layer.or(draw.layer),
            substitution: binding.substitution(&used),
        })
    }

    /// Append `node` (and its subtree) to `out`. `case` is set when `node` is
    /// the direct child of a switch.
    fn emit_node(
        &mut self,
        node: &'s SceneNode,
        binding: &Binding,
        case: bool,
        out: &mut Vec<GeoCommand>,
    ) -> Result<(), CompileError> {
        let draw = match node.draw() {
            Some(draw) => {
                let compiled = self.resolve_draw(node, draw, binding)?;
                if !compiled.skinned.is_empty() && case {
                    return Err(CompileError::SkinnedUnderSwitch {
                        bone: draw.bone.clone(),
                    });
                }
                compiled
            }
            None => BoneDraw::default(),
        };

        for (layer, dl) in &draw.skinned {
            out.push(GeoCommand::LoadDl {
                layer: *layer,
                dl: dl.clone(),
            });
        }

        let mut layers = draw.local.into_iter();
        let node_dl = match layers.next() {
            Some((layer, dl)) => LayerDl {
                layer,
                dl: Some(dl),
            },
            None => LayerDl::none(),
        };
        let extra: Vec<GeoCommand> = layers
            .map(|(layer, dl)| GeoCommand::LoadDl { layer, dl })
            .collect();

        let command = match &node.kind {
            NodeKind::Start => GeoCommand::Start,
            NodeKind::Shadow {
                shadow_type,
                solidity,
                scale,
            } => GeoCommand::Shadow {
                shadow_type: *shadow_type,
                solidity: *solidity,
                scale: *scale,
            },
            NodeKind::TranslateRotate {
                translation,
                rotation,
                ..
            } => GeoCommand::TranslateRotate {
                draw: node_dl,
                translation: *translation,
                rotation: *rotation,
            },
            NodeKind::Translate { translation, .. } => GeoCommand::Translate {
                draw: node_dl,
                translation: *translation,
            },
            NodeKind::Rotate { rotation, .. } => GeoCommand::Rotate {
                draw: node_dl,
                rotation: *rotation,
            },
            NodeKind::Billboard { translation, .. } => GeoCommand::Billboard {
                draw: node_dl,
                translation: *translation,
            },
            NodeKind::Scale { scale, .. } => GeoCommand::Scale {
                draw: node_dl,
                scale: *scale,
            },
            NodeKind::DisplayList { .. } => {
                self.reject_children(node)?;
                if let Some(dl) = node_dl.dl {
                    out.push(GeoCommand::LoadDl {
                        layer: node_dl.layer,
                        dl,
                    });
                }
                out.extend(extra);
                return Ok(());
            }
            NodeKind::Function { function, param } => {
                self.reject_children(node)?;
                out.push(GeoCommand::CallAsm {
                    param: *param,
                    function: function.clone(),
                });
                return Ok(());
            }
            NodeKind::Switch {
                function,
                default,
                options,
            } => {
                self.reject_children(node)?;
                out.push(GeoCommand::Switch {
                    default: *default,
                    function: function.clone(),
                });
                out.push(GeoCommand::NodeOpen);
                self.emit_switch(node, options, out)?;
                out.push(GeoCommand::NodeClose);
                return Ok(());
            }
        };

        out.push(command);
        if !node.children.is_empty() || !extra.is_empty() {
            out.push(GeoCommand::NodeOpen);
            out.extend(extra);
            for child in &node.children {
                self.emit_node(child, binding, false, out)?;
            }
            out.push(GeoCommand::NodeClose);
        }
        Ok(())
    }

    fn reject_children(&self, node: &SceneNode) -> Result<(), CompileError> {
        if node.children.is_empty() {
            Ok(())
        } else {
            Err(CompileError::UnexpectedChildren {
                node: node.name.clone(),
            })
        }
    }

    /// Option 0 inline, every other option as a branch to its geolayout.
    /// Bindings never cross into a switch: its options start unbound.
    fn emit_switch(
        &mut self,
        node: &'s SceneNode,
        options: &'s [SwitchOption],
        out: &mut Vec<GeoCommand>,
    ) -> Result<(), CompileError> {
        let canonical = match options.first() {
            None => {
                return Err(CompileError::EmptySwitch {
                    node: node.name.clone(),
                })
            }
            Some(SwitchOption::Subtree(root)) => root,
            Some(_) => {
                return Err(CompileError::NonCanonicalOption {
                    node: node.name.clone(),
                })
            }
        };

        self.emit_node(canonical, &Binding::default(), true, out)?;

        for (k, option) in options.iter().enumerate().skip(1) {
            let (root, binding) = match option {
                SwitchOption::Subtree(root) => (root, Binding::default()),
                SwitchOption::MaterialOverride { material, kind } => {
                    if *material >= self.ctx.mesh.materials.len() {
                        return Err(CompileError::UnknownOverrideMaterial {
                            node: node.name.clone(),
                            material: *material,
                            count: self.ctx.mesh.materials.len(),
                        });
                    }
                    (
                        canonical,
                        Binding {
                            substitute: Some((*material, kind.clone())),
                            layer: None,
                        },
                    )
                }
                SwitchOption::DrawLayer(layer) => (
                    canonical,
                    Binding {
                        substitute: None,
                        layer: Some(*layer),
                    },
                ),
            };

            let memo_key = (node_id(root), binding.clone());
            let target = match self.memo.get(&memo_key) {
                Some(name) => name.clone(),
                None => {
                    let names = &mut self.names;
                    let ident = self
                        .switch_idents
                        .entry(node_id(node))
                        .or_insert_with(|| names.allocate(&node.name));
                    let name = format!("{}_{}_opt{}", self.ctx.params.prefix, ident, k);
                    self.memo.insert(memo_key, name.clone());
                    self.worklist.push_back(PendingOption {
                        root,
                        binding,
                        name: name.clone(),
                        origin: format!("option {} of switch '{}'", k, node.name),
                    });
                    name
                }
            };
            out.push(GeoCommand::Branch {
                target,
                store_return: true,
            });
        }
        Ok(())
    }
}
