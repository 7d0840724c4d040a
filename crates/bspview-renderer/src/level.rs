//! Compiled level: the immutable product of `map_compiler`.
//!
//! All cross references are `u32` indices into the level's own tables.

use bytemuck::{Pod, Zeroable};

use bspview_common::q_shared::*;
use bspview_common::qfiles::{FaceType, SurfFlags};

use crate::backend::{ConvexMeshHandle, GpuBackend, IndexBufferHandle, MeshHandle, ShapeHandle, VertexBufferHandle};
use crate::bsp_format::BspFormat;
use crate::material::MaterialId;

// ============================================================
// Vertex format
// ============================================================

/// The single GPU vertex format shared by every brush model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct BspModelVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl BspModelVertex {
    pub const SIZE: usize = std::mem::size_of::<Self>();
    pub const POSITION_OFFSET: usize = 0;
    pub const NORMAL_OFFSET: usize = 12;
    pub const UV_OFFSET: usize = 24;

    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self { position, normal, uv }
    }

    /// Linear blend; the normal is renormalized.
    pub fn lerp(&self, t: f32, other: &Self) -> Self {
        Self {
            position: vec3_lerp(&self.position, t, &other.position),
            normal: vector_normalized(&vec3_lerp(&self.normal, t, &other.normal)),
            uv: vec2_lerp(&self.uv, t, &other.uv),
        }
    }
}

// ============================================================
// Models
// ============================================================

/// One material's contiguous index range inside a model's index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Primitive {
    pub first_index: u32,
    pub num_indices: u32,
    pub material: MaterialId,
}

/// Model 0 is the world; 1..N are inline sub-models (doors, platforms).
#[derive(Debug, Clone, Default)]
pub struct BrushModel {
    /// `hash64("*{index}")` seeded with the level's base hash.
    pub hash: u64,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub radius: f32,

    pub primitives: Vec<Primitive>,
    pub indices: Vec<u32>,
    /// Vertex count uploaded alongside this model's indices.
    pub num_vertices: u32,

    pub first_surface: u32,
    pub num_surfaces: u32,
    pub first_draw_surface: u32,
    pub num_draw_surfaces: u32,

    pub vertex_buffer: Option<VertexBufferHandle>,
    pub index_buffer: Option<IndexBufferHandle>,
    pub mesh: Option<MeshHandle>,

    /// One shape per solid brush, in brush order.
    pub collision_shapes: Vec<ShapeHandle>,
    pub collision_meshes: Vec<ConvexMeshHandle>,
    /// Source brush of each collision shape.
    pub collision_brushes: Vec<u32>,
}

impl BrushModel {
    pub fn surfaces(&self) -> std::ops::Range<usize> {
        self.first_surface as usize..(self.first_surface + self.num_surfaces) as usize
    }

    pub fn draw_surfaces(&self) -> std::ops::Range<usize> {
        self.first_draw_surface as usize..(self.first_draw_surface + self.num_draw_surfaces) as usize
    }
}

// ============================================================
// Surfaces
// ============================================================

/// One map face after compilation.
#[derive(Debug, Clone, Default)]
pub struct Surface {
    pub face_type: FaceType,
    pub material: MaterialId,
    pub flags: SurfFlags,
    /// `None` for faces that will never be drawn.
    pub draw_surface: Option<u32>,

    /// Vertex range in the level's vertex array.
    pub first_vert: u32,
    pub num_verts: u32,
    /// Element range relative to the owning draw surface's first element.
    pub first_draw_surf_elem: u32,
    pub num_elems: u32,

    pub mins: Vec3,
    pub maxs: Vec3,
    pub normal: Vec3,
}

impl Surface {
    /// Surfaces with no geometry are never drawn.
    pub fn has_geometry(&self) -> bool {
        self.num_verts != 0 && self.num_elems != 0
    }
}

/// Per-instance transform for instanced draw surfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Instance {
    pub origin: Vec3,
    pub scale: f32,
    pub rotation: [f32; 4],
}

/// A renderable batch unit: one material and one index range.
#[derive(Debug, Clone, Default)]
pub struct DrawSurface {
    pub material: MaterialId,
    pub surf_flags: SurfFlags,
    pub model: u32,
    pub mesh: Option<MeshHandle>,

    pub first_vbo_vert: u32,
    pub num_verts: u32,
    pub first_vbo_elem: u32,
    pub num_elems: u32,

    /// Member surfaces in element order.
    pub surfaces: Vec<u32>,
    pub instances: Vec<Instance>,
}

// ============================================================
// BSP tree
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct Leaf {
    /// `-1` when the leaf has no visibility information.
    pub cluster: i32,
    pub area: i32,
    pub mins: Vec3,
    pub maxs: Vec3,
    /// Drawable surfaces touching this leaf.
    pub vis_surfaces: Vec<u32>,
    /// Surfaces decals may be projected onto.
    pub fragment_surfaces: Vec<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Node {
    pub plane: u32,
    /// Negative values are leaves: `-(leaf + 1)`.
    pub children: [i32; 2],
    pub mins: Vec3,
    pub maxs: Vec3,
}

// ============================================================
// Level
// ============================================================

#[derive(Debug, Clone)]
pub struct Level {
    pub name: String,
    pub base_hash: u64,
    pub format: BspFormat,

    pub models: Vec<BrushModel>,
    pub planes: Vec<CPlane>,
    pub vertices: Vec<BspModelVertex>,
    pub surfaces: Vec<Surface>,
    pub draw_surfaces: Vec<DrawSurface>,
    pub leaves: Vec<Leaf>,
    pub nodes: Vec<Node>,

    pub pvs: Vec<u8>,
    pub num_clusters: u32,
    pub cluster_size: u32,

    pub fog_strength: f32,
}

impl Level {
    pub fn world(&self) -> Option<&BrushModel> {
        self.models.first()
    }

    pub fn num_models(&self) -> usize {
        self.models.len()
    }

    /// Hand every model's buffers back to the backend. The level must not be
    /// drawn afterwards.
    pub fn release(&self, gpu: &mut dyn GpuBackend) {
        for model in &self.models {
            if let Some(buffer) = model.vertex_buffer {
                gpu.destroy_vertex_buffer(buffer);
            }
            if let Some(buffer) = model.index_buffer {
                gpu.destroy_index_buffer(buffer);
            }
        }
        log::debug!("{}: released {} models", self.name, self.models.len());
    }

    /// Leaf containing `p`, walking the node tree from the root.
    pub fn point_in_leaf(&self, p: &Vec3) -> Option<usize> {
        if self.leaves.is_empty() {
            return None;
        }
        if self.nodes.is_empty() {
            return Some(0);
        }

        let mut num: i32 = 0;
        // a well-formed tree is never deeper than it has nodes
        for _ in 0..=self.nodes.len() {
            if num < 0 {
                let leaf = (-(num + 1)) as usize;
                return (leaf < self.leaves.len()).then_some(leaf);
            }
            let node = self.nodes.get(num as usize)?;
            let plane = self.planes.get(node.plane as usize)?;
            let side = if plane.distance_to(p) >= 0.0 { 0 } else { 1 };
            num = node.children[side];
        }
        log::error!("point_in_leaf: node cycle in {}", self.name);
        None
    }

    /// Cluster of the leaf containing `p`, or -1.
    pub fn point_cluster(&self, p: &Vec3) -> i32 {
        self.point_in_leaf(p)
            .map(|l| self.leaves[l].cluster)
            .unwrap_or(-1)
    }

    /// PVS row for `cluster`. `None` means every cluster is potentially visible.
    pub fn cluster_pvs(&self, cluster: i32) -> Option<&[u8]> {
        if self.pvs.is_empty() || cluster < 0 || cluster as u32 >= self.num_clusters {
            return None;
        }
        let size = self.cluster_size as usize;
        let start = cluster as usize * size;
        self.pvs.get(start..start + size)
    }

    /// True when `to` is in the PVS of `from`, or when there is no PVS at all.
    pub fn cluster_visible(&self, from: i32, to: i32) -> bool {
        if to < 0 {
            return false;
        }
        match self.cluster_pvs(from) {
            Some(row) => row
                .get((to >> 3) as usize)
                .map(|b| b & (1 << (to & 7)) != 0)
                .unwrap_or(false),
            None => true,
        }
    }
}
