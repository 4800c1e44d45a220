//! Vertex cache batching.
//!
//! Converts one material-homogeneous face set into vertex load and triangle
//! commands that never load more vertices than the cache holds. Faces are
//! visited along strips of edge-shareable neighbors so that consecutive
//! triangles reuse already-loaded slots.

use crate::adjacency::{AdjacencyIndex, BatchFace};
use crate::error::CompileError;
use crate::types::BatchVertex;
use crate::vertex::VertexConverter;
use gbi::{Command, GbiError, Ref, Vtx};
use std::collections::BTreeMap;
use std::ops::Range;

/// Vertices already resident in slots `[0, start)` before a batch runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExistingRegion {
    /// Slot at which newly loaded vertices begin.
    pub start: usize,
    /// Material index → slots holding that material's vertices.
    pub materials: BTreeMap<usize, Range<usize>>,
    /// Resident vertex per slot, `start` entries.
    pub vertices: Vec<BatchVertex>,
}

/// Narrow a slot index or count to the byte its command carries.
pub fn command_byte(
    command: &'static str,
    field: &'static str,
    value: usize,
) -> Result<u8, CompileError> {
    u8::try_from(value).map_err(|_| {
        CompileError::from(GbiError::OutOfRange {
            command,
            field,
            value: i64::try_from(value).unwrap_or(i64::MAX),
        })
    })
}

/// One vertex load and the triangles drawn from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushRecord {
    pub loaded: usize,
    pub triangles: usize,
}

/// Result of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutput {
    /// Contents of the batch's vertex array, in load order.
    pub vertices: Vec<Vtx>,
    /// Triangle list, terminated with ENDDL.
    pub commands: Vec<Command>,
    pub flushes: Vec<FlushRecord>,
    /// Source triangle of every emitted triangle, in draw order.
    pub drawn: Vec<usize>,
}

pub struct VertexCacheBatcher<'a> {
    capacity: usize,
    tri2: bool,
    material: usize,
    material_name: &'a str,
    vertex_symbol: String,
    converter: &'a VertexConverter,
    existing: Option<&'a ExistingRegion>,
    /// Resident vertex per slot: the existing region, then the append window.
    buffer: Vec<BatchVertex>,
    /// Index into `output.vertices` of the first vertex in the window.
    window_element: usize,
    pending: Vec<([u8; 3], usize)>,
    output: BatchOutput,
}

impl<'a> VertexCacheBatcher<'a> {
    pub fn new(
        capacity: usize,
        tri2: bool,
        material: usize,
        material_name: &'a str,
        vertex_symbol: impl Into<String>,
        converter: &'a VertexConverter,
    ) -> Self {
        Self {
            capacity,
            tri2,
            material,
            material_name,
            vertex_symbol: vertex_symbol.into(),
            converter,
            existing: None,
            buffer: Vec::with_capacity(capacity),
            window_element: 0,
            pending: Vec::new(),
            output: BatchOutput {
                vertices: Vec::new(),
                commands: Vec::new(),
                flushes: Vec::new(),
                drawn: Vec::new(),
            },
        }
    }

    /// Start every window after `region`, reusing its vertices of this
    /// batch's material.
    pub fn with_existing(mut self, region: &'a ExistingRegion) -> Self {
        self.buffer = region.vertices.clone();
        self.existing = Some(region);
        self
    }

    fn region_start(&self) -> usize {
        self.existing.map_or(0, |r| r.start)
    }

    /// Slot of `vertex` if it can be referenced without loading it.
    fn resident_slot(&self, vertex: &BatchVertex) -> Option<usize> {
        if let Some(range) = self.existing.and_then(|r| r.materials.get(&self.material)) {
            let own = self.buffer.get(range.clone()).unwrap_or_default();
            if let Some(offset) = own.iter().position(|v| v == vertex) {
                return Some(range.start + offset);
            }
        }
        let start = self.region_start();
        self.buffer
            .get(start..)
            .unwrap_or_default()
            .iter()
            .position(|v| v == vertex)
            .map(|offset| start + offset)
    }

    /// Distinct vertices of `face` that are not resident.
    fn missing(&self, face: &BatchFace) -> Vec<BatchVertex> {
        let mut missing: Vec<BatchVertex> = Vec::with_capacity(3);
        for vertex in &face.vertices {
            if self.resident_slot(vertex).is_none() && !missing.contains(vertex) {
                missing.push(*vertex);
            }
        }
        missing
    }

    /// Add one face, flushing first if its new vertices do not fit.
    pub fn add_face(&mut self, face: &BatchFace) -> Result<(), CompileError> {
        let mut missing = self.missing(face);
        if self.buffer.len() + missing.len() > self.capacity {
            self.flush()?;
            missing = self.missing(face);
            if self.buffer.len() + missing.len() > self.capacity {
                return Err(CompileError::VertexCacheOverflow {
                    triangle: face.source,
                    material: self.material_name.to_string(),
                    needed: missing.len(),
                    available: self.capacity.saturating_sub(self.buffer.len()),
                });
            }
        }

        for vertex in missing {
            self.buffer.push(vertex);
            self.output.vertices.push(self.converter.convert(&vertex));
        }

        let mut slots = [0u8; 3];
        for (slot, vertex) in slots.iter_mut().zip(&face.vertices) {
            // Every corner is resident after the append above.
            let index = self.resident_slot(vertex).unwrap_or_default();
            *slot = command_byte("SP1Triangle", "vertex index", index)?;
        }
        self.pending.push((slots, face.source));
        Ok(())
    }

    /// Emit the load for the current window and its triangles, then empty
    /// the window.
    fn flush(&mut self) -> Result<(), CompileError> {
        let start = self.region_start();
        if !self.pending.is_empty() {
            let loaded = self.buffer.len().saturating_sub(start);
            if loaded > 0 {
                self.output.commands.push(Command::Vertex {
                    source: Ref::element(self.vertex_symbol.clone(), self.window_element as u32),
                    count: command_byte("SPVertex", "count", loaded)?,
                    start: command_byte("SPVertex", "v0", start)?,
                });
            }
            let pending = std::mem::take(&mut self.pending);
            if self.tri2 {
                for pair in pending.chunks(2) {
                    match pair {
                        [(a, _), (b, _)] => self.output.commands.push(Command::Tri2(*a, *b)),
                        [(a, _)] => self.output.commands.push(Command::Tri1(*a)),
                        _ => {}
                    }
                }
            } else {
                for (tri, _) in &pending {
                    self.output.commands.push(Command::Tri1(*tri));
                }
            }
            self.output
                .drawn
                .extend(pending.iter().map(|(_, source)| *source));
            self.output.flushes.push(FlushRecord {
                loaded,
                triangles: pending.len(),
            });
            log::debug!(
                "Flush {}: {} vertices at slot {}, {} triangles",
                self.vertex_symbol,
                loaded,
                start,
                pending.len()
            );
        }
        self.buffer.truncate(start);
        self.window_element = self.output.vertices.len();
        Ok(())
    }

    /// Flush the last window and terminate the list. `None` if no face was
    /// ever added.
    pub fn finish(mut self) -> Result<Option<BatchOutput>, CompileError> {
        self.flush()?;
        if self.output.flushes.is_empty() {
            return Ok(None);
        }
        self.output.commands.push(Command::EndDisplayList);
        Ok(Some(self.output))
    }
}

/// Walk `faces` along shareable strips, feeding each to `batcher`.
pub fn walk_faces(
    faces: &[BatchFace],
    batcher: &mut VertexCacheBatcher<'_>,
) -> Result<(), CompileError> {
    let index = AdjacencyIndex::build(faces);
    let mut visited = vec![false; faces.len()];
    let mut possible: Vec<usize> = Vec::new();
    let mut remaining = faces.len();

    while remaining > 0 {
        let Some(seed) = lowest_valence(&index, &visited) else {
            break;
        };
        let mut current = seed;
        let mut entry: Option<usize> = None;
        loop {
            visited[current] = true;
            remaining -= 1;
            possible.retain(|&f| f != current);
            batcher.add_face(&faces[current])?;

            let scan: Vec<usize> = match entry {
                Some(e) => vec![(e + 1) % 3, (e + 2) % 3],
                None => vec![0, 1, 2],
            };
            let mut next: Option<(usize, usize)> = None;
            for k in scan {
                let key = faces[current].edge_key(k);
                for &g in index.edge_neighbors(current, k) {
                    if visited[g] {
                        continue;
                    }
                    if next.is_none() {
                        next = faces[g].edge_index(key).map(|edge| (g, edge));
                    } else {
                        possible.retain(|&f| f != g);
                        possible.insert(0, g);
                    }
                }
            }

            match next {
                Some((face, edge)) => {
                    current = face;
                    entry = Some(edge);
                }
                None => match possible.first().copied() {
                    Some(face) => {
                        possible.clear();
                        current = face;
                        entry = None;
                    }
                    None => break,
                },
            }
        }
    }
    Ok(())
}

/// First unvisited face with the strictly fewest unvisited valid neighbors.
fn lowest_valence(index: &AdjacencyIndex, visited: &[bool]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (face, _) in visited.iter().enumerate().filter(|(_, v)| !**v) {
        let count = index
            .valid_neighbors(face)
            .iter()
            .filter(|&&g| !visited[g])
            .count();
        if best.map_or(true, |(_, c)| count < c) {
            best = Some((face, count));
        }
    }
    best.map(|(face, _)| face)
}

/// Batch `faces` into a triangle list. Returns `None` for an empty set.
pub fn build_triangle_list(
    faces: &[BatchFace],
    mut batcher: VertexCacheBatcher<'_>,
) -> Result<Option<BatchOutput>, CompileError> {
    if faces.is_empty() {
        return Ok(None);
    }
    walk_faces(faces, &mut batcher)?;
    batcher.finish()
}
