//! Seams to the outside world.
//!
//! The compiler uploads geometry through `GpuBackend` and cooks collision
//! through `PhysicsBackend`; the dispatcher issues draw calls through
//! `RenderBackend`. Handles are opaque ids owned by the backend.

use thiserror::Error;

use bspview_common::q_shared::Vec3;
use bspview_common::qfiles::SurfFlags;

use crate::draw_list::DrawSurfRef;
use crate::frame::Entity;
use crate::level::Instance;
use crate::material::Material;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);
    };
}

handle!(VertexBufferHandle);
handle!(IndexBufferHandle);
handle!(
    /// A vertex buffer + index buffer pair bound as one VBO.
    MeshHandle
);
handle!(ConvexMeshHandle);
handle!(ShapeHandle);
handle!(FramebufferHandle);

// ============================================================
// Geometry upload
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    U16,
    U32,
}

/// Layout description passed to `GpuBackend::new_mesh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshConfig {
    pub vertex_buffer: VertexBufferHandle,
    pub index_buffer: IndexBufferHandle,
    pub index_format: IndexFormat,
    pub stride: u32,
    pub positions_offset: u32,
    pub normals_offset: u32,
    pub tex_coords_offset: u32,
    pub num_indices: u32,
    pub ccw_winding: bool,
}

pub trait GpuBackend {
    fn new_vertex_buffer(&mut self, data: &[u8]) -> VertexBufferHandle;
    fn new_index_buffer(&mut self, data: &[u8]) -> IndexBufferHandle;
    fn new_mesh(&mut self, config: &MeshConfig) -> MeshHandle;
    /// Meshes built over the buffer go with it.
    fn destroy_vertex_buffer(&mut self, buffer: VertexBufferHandle);
    fn destroy_index_buffer(&mut self, buffer: IndexBufferHandle);
}

// ============================================================
// Collision
// ============================================================

#[derive(Debug, Clone, Error)]
#[error("convex mesh cooking failed: {0}")]
pub struct CookError(pub String);

pub trait PhysicsBackend {
    /// Build a convex mesh from an unordered point cloud.
    fn cook_convex_mesh(&mut self, points: &[Vec3]) -> Result<ConvexMeshHandle, CookError>;
    fn create_shape(&mut self, mesh: ConvexMeshHandle) -> ShapeHandle;
}

// ============================================================
// Drawing
// ============================================================

/// Vertex and element window of one indexed draw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElementRange {
    pub first_vert: u32,
    pub num_verts: u32,
    pub first_elem: u32,
    pub num_elems: u32,
}

/// Immediate-mode state and draw entry points used by the dispatcher.
pub trait RenderBackend {
    fn bound_framebuffer(&self) -> FramebufferHandle;
    fn bind_framebuffer(&mut self, fbo: FramebufferHandle);
    fn framebuffer_has_depth(&self, fbo: FramebufferHandle) -> bool;
    /// Whether the current screen image set has a depth copy target.
    fn has_screen_depth_copy(&self) -> bool;
    /// Blit the depth of `fbo` into the screen depth copy.
    fn copy_depth_to_screen_texture(&mut self, fbo: FramebufferHandle);

    /// Returns the previous setting.
    fn enable_triangle_outlines(&mut self, enable: bool) -> bool;

    fn depth_range(&self) -> (f32, f32);
    fn set_depth_range(&mut self, min: f32, max: f32);

    fn load_identity_object_matrix(&mut self);
    fn transform_for_entity(&mut self, entity: &Entity);
    /// Translation only, for camera-facing materials.
    fn translate_for_entity(&mut self, entity: &Entity);

    fn bind_shader(&mut self, entity: &Entity, material: &Material);
    fn bind_vbo(&mut self, mesh: MeshHandle);
    fn set_surf_flags(&mut self, flags: SurfFlags);
    fn draw_elements(&mut self, range: ElementRange);
    fn draw_elements_instanced(&mut self, range: ElementRange, instances: &[Instance]);

    fn batch_sprite_surf(&mut self, entity: &Entity, material: &Material, surf: DrawSurfRef, mergable: bool);
    fn batch_poly_surf(&mut self, entity: &Entity, material: &Material, surf: DrawSurfRef, mergable: bool);
    fn flush_dynamic_meshes(&mut self);

    fn draw_alias_surf(&mut self, entity: &Entity, material: &Material, surf: DrawSurfRef);
    fn draw_gltf_mesh(&mut self, entity: &Entity, material: &Material, surf: DrawSurfRef);
    fn draw_sky_mesh(&mut self, entity: &Entity, material: &Material, surf: DrawSurfRef);
    fn draw_null_surf(&mut self, entity: &Entity, material: &Material, surf: DrawSurfRef);
}
