//! Draw list: everything visible this frame, with the keys it is sorted by.
//!
//! Each record carries two keys. The distance key orders by sort class, then
//! by (clamped) distance, then by draw order. The sort key groups by material
//! and entity so that consecutive records can share backend state.

use crate::backend::MeshHandle;
use crate::frame::{Entity, RenderFx};
use crate::level::Level;
use crate::material::{Material, MaterialId, ShaderSort, WORLD_MATERIAL};
use crate::vis_scratch::VisScratch;

/// Distance used for every world draw surface, so world geometry sorts by
/// draw order alone.
pub const WORLDSURF_DIST: f32 = 1024.0;

/// Floor for the draw list capacity on growth.
pub const MIN_RENDER_MESHES: usize = 2048;

const DIST_KEY_RANGE: i32 = 0x7FF;

/// What a draw list record points at. The payload is an index the owner of
/// that surface kind understands: a level draw surface for `Bsp`, a backend
/// id for the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DrawSurfRef {
    Bsp(u32),
    Alias(u32),
    Gltf(u32),
    Sky(u32),
    Sprite(u32),
    Poly(u32),
    NullModel(u32),
}

impl DrawSurfRef {
    pub fn kind(&self) -> SurfaceKind {
        match self {
            DrawSurfRef::Bsp(_) => SurfaceKind::Bsp,
            DrawSurfRef::Alias(_) => SurfaceKind::Alias,
            DrawSurfRef::Gltf(_) => SurfaceKind::Gltf,
            DrawSurfRef::Sky(_) => SurfaceKind::Sky,
            DrawSurfRef::Sprite(_) => SurfaceKind::Sprite,
            DrawSurfRef::Poly(_) => SurfaceKind::Poly,
            DrawSurfRef::NullModel(_) => SurfaceKind::NullModel,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    Bsp,
    Alias,
    Gltf,
    Sky,
    Sprite,
    Poly,
    NullModel,
}

/// How an open batch is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFlush {
    Bsp,
    DynamicMeshes,
}

impl SurfaceKind {
    /// Batched kinds accumulate; the rest draw immediately.
    pub fn is_batchable(self) -> bool {
        matches!(self, SurfaceKind::Bsp | SurfaceKind::Sprite | SurfaceKind::Poly)
    }

    pub fn batch_flush(self) -> Option<BatchFlush> {
        match self {
            SurfaceKind::Bsp => Some(BatchFlush::Bsp),
            SurfaceKind::Sprite | SurfaceKind::Poly => Some(BatchFlush::DynamicMeshes),
            _ => None,
        }
    }

    /// Whether `walk_draw_list` descends into this kind.
    pub fn supports_walk(self) -> bool {
        self == SurfaceKind::Bsp
    }
}

/// Field order is the sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortedDrawSurf {
    pub dist_key: u32,
    pub sort_key: u64,
    pub surf: DrawSurfRef,
}

/// `sort << 26 | clamp(1024 - dist) << 15 | order`. Zero means "do not draw".
pub fn pack_dist_key(renderfx: RenderFx, sort: ShaderSort, dist: f32, order: u32) -> u32 {
    let sort = if renderfx.contains(RenderFx::ALPHAHACK) {
        ShaderSort::Additive
    } else {
        sort
    };
    let dist = (0x400 - dist as i32).clamp(0, DIST_KEY_RANGE) as u32;
    ((sort as u32) << 26) | (dist << 15) | (order & 0x7FFF)
}

/// Sort class of a distance key.
#[inline]
pub fn dist_key_sort(dist_key: u32) -> u32 {
    (dist_key >> 26) & 31
}

pub fn pack_sort_key(material: MaterialId, entity: u32) -> u64 {
    ((material as u64) & 0xFFF) << 36 | ((entity as u64) & 0xFFF) << 8
}

/// `(material, entity)`
pub fn unpack_sort_key(sort_key: u64) -> (MaterialId, u32) {
    (((sort_key >> 36) & 0xFFF) as MaterialId, ((sort_key >> 8) & 0xFFF) as u32)
}

/// The open run of contiguous BSP elements.
#[derive(Debug, Clone, Copy)]
pub struct BspBatch {
    pub count: u32,
    pub mesh: Option<MeshHandle>,
    pub material: MaterialId,
    pub entity: Entity,
    /// Draw surface whose flags apply to the batch.
    pub draw_surface: u32,
    pub first_vert: u32,
    pub end_vert: u32,
    pub first_elem: u32,
    pub num_elems: u32,
}

impl Default for BspBatch {
    fn default() -> Self {
        Self {
            count: 0,
            mesh: None,
            material: WORLD_MATERIAL,
            entity: Entity::world(),
            draw_surface: 0,
            first_vert: 0,
            end_vert: 0,
            first_elem: 0,
            num_elems: 0,
        }
    }
}

/// One view's draw list and visibility scratch.
#[derive(Debug, Default)]
pub struct DrawList {
    pub vis: VisScratch,
    draw_surfs: Vec<SortedDrawSurf>,
    max_draw_surfs: usize,
    /// Draw surface count of the level the list was last sized for.
    world_draw_surfaces: usize,
    pub bsp_batch: BspBatch,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty the list and reset the visibility bits of the current level.
    pub fn clear(&mut self, level: Option<&Level>) {
        self.draw_surfs.clear();
        self.bsp_batch = BspBatch::default();

        if level.is_some() {
            self.vis.clear();
        }
    }

    /// Size the scratch for `level`. Grows, never shrinks.
    pub fn reserve_world_surfaces(&mut self, level: &Level) {
        self.vis
            .ensure(level.surfaces.len(), level.leaves.len(), level.draw_surfaces.len());
        self.world_draw_surfaces = level.draw_surfaces.len();
    }

    fn reserve_draw_surfs(&mut self) {
        let new_size = (MIN_RENDER_MESHES + self.world_draw_surfaces).max(self.max_draw_surfs * 2);
        self.draw_surfs.reserve_exact(new_size - self.draw_surfs.len());
        self.max_draw_surfs = new_size;
    }

    /// Append a surface. Returns its slot, or `None` when the distance key
    /// comes out as zero.
    pub fn add_surface(
        &mut self,
        entity: &Entity,
        entity_num: u32,
        material: &Material,
        dist: f32,
        order: u32,
        surf: DrawSurfRef,
    ) -> Option<usize> {
        let dist_key = pack_dist_key(entity.renderfx, material.sort, dist, order);
        if dist_key == 0 {
            return None;
        }

        if self.draw_surfs.len() >= self.max_draw_surfs {
            self.reserve_draw_surfs();
        }

        self.draw_surfs.push(SortedDrawSurf {
            dist_key,
            sort_key: pack_sort_key(material.id, entity_num),
            surf,
        });
        Some(self.draw_surfs.len() - 1)
    }

    pub fn sort(&mut self) {
        self.draw_surfs.sort_unstable();
    }

    pub fn len(&self) -> usize {
        self.draw_surfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draw_surfs.is_empty()
    }

    pub fn draw_surfs(&self) -> &[SortedDrawSurf] {
        &self.draw_surfs
    }

    /// Records the list can hold before it grows again.
    pub fn capacity(&self) -> usize {
        self.max_draw_surfs
    }
}

/// `out[i] = in[i] + offset`
pub fn copy_offset_elements(elems: &[u32], offset: u32, out: &mut Vec<u32>) {
    out.extend(elems.iter().map(|&e| e + offset));
}

/// Triangle fan over `num_verts` vertices starting at `first_vert`.
pub fn build_trifan_elements(first_vert: u32, num_verts: u32, out: &mut Vec<u32>) {
    for i in 2..num_verts {
        out.extend_from_slice(&[first_vert, first_vert + i - 1, first_vert + i]);
    }
}
