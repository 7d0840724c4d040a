//! Synthetic map images and recording backends for the unit tests.

use std::mem::size_of;

use bytemuck::{Pod, Zeroable};

use bspview_common::q_shared::*;
use bspview_common::qfiles::*;

use crate::backend::*;
use crate::brush_hull::box_planes;
use crate::draw_list::DrawSurfRef;
use crate::frame::Entity;
use crate::level::Instance;
use crate::material::{Material, MaterialId};

// ============================================================
// Map builder
// ============================================================

/// Face description for `BspBuilder::face`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestFace {
    pub material: u32,
    pub face_type: i32,
    pub first_vertex: u32,
    pub num_vertices: u32,
    pub first_index: u32,
    pub num_indices: u32,
    pub normal: Vec3,
    pub patch_width: u32,
    pub patch_height: u32,
}

/// Builds a BSP byte image lump by lump.
///
/// Lumps are written in slot order straight after the header; empty lumps
/// get the offset where they would have started.
pub struct BspBuilder {
    magic: [u8; 4],
    version: u32,
    lumps: Vec<Vec<u8>>,
}

impl Default for BspBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BspBuilder {
    pub fn new() -> Self {
        Self {
            magic: IDBSPHEADER,
            version: 46,
            lumps: vec![Vec::new(); HEADER_LUMPS],
        }
    }

    pub fn raven() -> Self {
        Self {
            magic: RBSPHEADER,
            version: 1,
            ..Self::new()
        }
    }

    fn is_raven(&self) -> bool {
        self.magic != IDBSPHEADER
    }

    fn push<T: Pod>(&mut self, lump: BspLump, record: &T) -> u32 {
        let bytes = &mut self.lumps[lump as usize];
        let index = bytes.len() / size_of::<T>();
        bytes.extend_from_slice(bytemuck::bytes_of(record));
        index as u32
    }

    fn count(&self, lump: BspLump, record_size: usize) -> u32 {
        (self.lumps[lump as usize].len() / record_size) as u32
    }

    pub fn raw_lump(&mut self, lump: BspLump, bytes: Vec<u8>) {
        self.lumps[lump as usize] = bytes;
    }

    pub fn entities(&mut self, text: &str) {
        self.lumps[BspLump::Entities as usize] = text.as_bytes().to_vec();
    }

    pub fn material(&mut self, name: &str, flags: SurfFlags, contents: Contents) -> u32 {
        let mut m = BspMaterial::zeroed();
        let n = name.len().min(MAX_MATERIAL_NAME - 1);
        m.name[..n].copy_from_slice(&name.as_bytes()[..n]);
        m.flags = flags.bits();
        m.contents = contents.bits();
        self.push(BspLump::Materials, &m)
    }

    pub fn plane(&mut self, normal: Vec3, distance: f32) -> u32 {
        self.push(BspLump::Planes, &BspPlane { normal, distance })
    }

    pub fn vertex(&mut self, position: Vec3, normal: Vec3, uv: Vec2) -> u32 {
        if self.is_raven() {
            let mut v = RavenVertex::zeroed();
            v.position = position;
            v.normal = normal;
            v.uv = uv;
            self.push(BspLump::Vertices, &v)
        } else {
            let mut v = BspVertex::zeroed();
            v.position = position;
            v.normal = normal;
            v.uv = uv;
            self.push(BspLump::Vertices, &v)
        }
    }

    pub fn num_vertices(&self) -> u32 {
        if self.is_raven() {
            self.count(BspLump::Vertices, size_of::<RavenVertex>())
        } else {
            self.count(BspLump::Vertices, size_of::<BspVertex>())
        }
    }

    /// Append indices, returning the position of the first one.
    pub fn indices(&mut self, indices: &[i32]) -> u32 {
        let first = self.count(BspLump::Indices, size_of::<BspIndex>());
        for i in indices {
            self.push(BspLump::Indices, i);
        }
        first
    }

    pub fn num_faces(&self) -> u32 {
        if self.is_raven() {
            self.count(BspLump::Faces, size_of::<RavenFace>())
        } else {
            self.count(BspLump::Faces, size_of::<BspFace>())
        }
    }

    pub fn face(&mut self, face: TestFace) -> u32 {
        if self.is_raven() {
            let mut f = RavenFace::zeroed();
            f.material = face.material;
            f.face_type = face.face_type;
            f.first_vertex = face.first_vertex;
            f.num_vertices = face.num_vertices;
            f.first_index = face.first_index;
            f.num_indices = face.num_indices;
            f.normal = face.normal;
            f.patch_width = face.patch_width;
            f.patch_height = face.patch_height;
            self.push(BspLump::Faces, &f)
        } else {
            let mut f = BspFace::zeroed();
            f.material = face.material;
            f.face_type = face.face_type;
            f.first_vertex = face.first_vertex;
            f.num_vertices = face.num_vertices;
            f.first_index = face.first_index;
            f.num_indices = face.num_indices;
            f.normal = face.normal;
            f.patch_width = face.patch_width;
            f.patch_height = face.patch_height;
            self.push(BspLump::Faces, &f)
        }
    }

    /// A `size` x `size` planar quad in the z = `origin[2]` plane.
    pub fn quad_face(&mut self, material: u32, origin: Vec3, size: f32) -> u32 {
        let up = [0.0, 0.0, 1.0];
        let first_vertex = self.num_vertices();
        self.vertex(origin, up, [0.0, 0.0]);
        self.vertex([origin[0] + size, origin[1], origin[2]], up, [1.0, 0.0]);
        self.vertex([origin[0] + size, origin[1] + size, origin[2]], up, [1.0, 1.0]);
        self.vertex([origin[0], origin[1] + size, origin[2]], up, [0.0, 1.0]);
        let first_index = self.indices(&[0, 1, 2, 0, 2, 3]);
        self.face(TestFace {
            material,
            face_type: 1,
            first_vertex,
            num_vertices: 4,
            first_index,
            num_indices: 6,
            normal: up,
            ..Default::default()
        })
    }

    /// A patch whose control point `(x, y)` sits at `f(x, y)`.
    pub fn patch_face(&mut self, material: u32, width: u32, height: u32, f: impl Fn(u32, u32) -> Vec3) -> u32 {
        let first_vertex = self.num_vertices();
        for y in 0..height {
            for x in 0..width {
                let uv = [x as f32 / (width - 1) as f32, y as f32 / (height - 1) as f32];
                self.vertex(f(x, y), [0.0, 0.0, 1.0], uv);
            }
        }
        self.face(TestFace {
            material,
            face_type: 2,
            first_vertex,
            num_vertices: width * height,
            normal: [0.0, 0.0, 1.0],
            patch_width: width,
            patch_height: height,
            ..Default::default()
        })
    }

    pub fn brush_side(&mut self, plane: u32, material: u32) -> u32 {
        if self.is_raven() {
            self.push(BspLump::BrushSides, &RavenBrushSide { plane, material, surface: 0 })
        } else {
            self.push(BspLump::BrushSides, &BspBrushSide { plane, material })
        }
    }

    fn num_brush_sides(&self) -> u32 {
        if self.is_raven() {
            self.count(BspLump::BrushSides, size_of::<RavenBrushSide>())
        } else {
            self.count(BspLump::BrushSides, size_of::<BspBrushSide>())
        }
    }

    pub fn brush(&mut self, material: u32, planes: &[BspPlane]) -> u32 {
        let first_side = self.num_brush_sides();
        for p in planes {
            let plane = self.plane(p.normal, p.distance);
            self.brush_side(plane, material);
        }
        self.push(
            BspLump::Brushes,
            &BspBrush {
                first_side,
                num_sides: planes.len() as u32,
                material,
            },
        )
    }

    pub fn box_brush(&mut self, material: u32, mins: Vec3, maxs: Vec3) -> u32 {
        self.brush(material, &box_planes(&mins, &maxs))
    }

    pub fn num_brushes(&self) -> u32 {
        self.count(BspLump::Brushes, size_of::<BspBrush>())
    }

    pub fn model(
        &mut self,
        bounds: (Vec3, Vec3),
        faces: std::ops::Range<u32>,
        brushes: std::ops::Range<u32>,
    ) -> u32 {
        self.push(
            BspLump::Models,
            &BspModel {
                mins: bounds.0,
                maxs: bounds.1,
                first_face: faces.start,
                num_faces: faces.end - faces.start,
                first_brush: brushes.start,
                num_brushes: brushes.end - brushes.start,
            },
        )
    }

    pub fn leaf(&mut self, cluster: i32, area: i32, mins: [i32; 3], maxs: [i32; 3], faces: &[u32]) -> u32 {
        let first_leaf_face = self.count(BspLump::LeafFaces, size_of::<BspIndex>());
        for &f in faces {
            self.push(BspLump::LeafFaces, &(f as BspIndex));
        }
        self.push(
            BspLump::Leaves,
            &BspLeaf {
                cluster,
                area,
                mins,
                maxs,
                first_leaf_face,
                num_leaf_faces: faces.len() as u32,
                first_leaf_brush: 0,
                num_leaf_brushes: 0,
            },
        )
    }

    pub fn node(&mut self, plane: i32, children: [i32; 2], mins: [i32; 3], maxs: [i32; 3]) -> u32 {
        self.push(BspLump::Nodes, &BspNode { plane, children, mins, maxs })
    }

    pub fn visibility(&mut self, num_clusters: u32, cluster_size: u32, bits: Vec<u8>) {
        let mut raw = Vec::with_capacity(8 + bits.len());
        raw.extend_from_slice(&num_clusters.to_le_bytes());
        raw.extend_from_slice(&cluster_size.to_le_bytes());
        raw.extend_from_slice(&bits);
        self.lumps[BspLump::Visibility as usize] = raw;
    }

    pub fn build(&self) -> Vec<u8> {
        let header_size = size_of::<BspHeader>();
        let mut header = BspHeader::zeroed();
        header.magic = self.magic;
        header.version = self.version;

        let mut offset = header_size;
        for (i, lump) in self.lumps.iter().enumerate() {
            header.lumps[i] = LumpLocation {
                offset: offset as u32,
                length: lump.len() as u32,
            };
            offset += lump.len();
        }

        let mut out = Vec::with_capacity(offset);
        out.extend_from_slice(bytemuck::bytes_of(&header));
        for lump in &self.lumps {
            out.extend_from_slice(lump);
        }
        out
    }
}

/// One 64-unit floor quad over a solid box brush, as model 0 with one leaf.
pub fn box_room() -> BspBuilder {
    let mut b = BspBuilder::new();
    let floor = b.material("textures/base/floor", SurfFlags::empty(), Contents::SOLID);
    b.quad_face(floor, [0.0, 0.0, 0.0], 64.0);
    b.box_brush(floor, [0.0, 0.0, -16.0], [64.0, 64.0, 0.0]);
    b.model(([0.0, 0.0, -16.0], [64.0, 64.0, 0.0]), 0..1, 0..1);
    b.leaf(0, 0, [0, 0, -16], [64, 64, 64], &[0]);
    b
}

// ============================================================
// Recording backends
// ============================================================

#[derive(Debug, Default)]
pub struct RecordingGpu {
    pub vertex_buffers: Vec<Vec<u8>>,
    pub index_buffers: Vec<Vec<u8>>,
    pub meshes: Vec<MeshConfig>,
    pub destroyed_vertex_buffers: Vec<VertexBufferHandle>,
    pub destroyed_index_buffers: Vec<IndexBufferHandle>,
}

impl GpuBackend for RecordingGpu {
    fn new_vertex_buffer(&mut self, data: &[u8]) -> VertexBufferHandle {
        self.vertex_buffers.push(data.to_vec());
        VertexBufferHandle(self.vertex_buffers.len() as u32 - 1)
    }

    fn new_index_buffer(&mut self, data: &[u8]) -> IndexBufferHandle {
        self.index_buffers.push(data.to_vec());
        IndexBufferHandle(self.index_buffers.len() as u32 - 1)
    }

    fn new_mesh(&mut self, config: &MeshConfig) -> MeshHandle {
        self.meshes.push(*config);
        MeshHandle(self.meshes.len() as u32 - 1)
    }

    fn destroy_vertex_buffer(&mut self, buffer: VertexBufferHandle) {
        self.destroyed_vertex_buffers.push(buffer);
    }

    fn destroy_index_buffer(&mut self, buffer: IndexBufferHandle) {
        self.destroyed_index_buffers.push(buffer);
    }
}

/// Cooks any cloud of four or more points; optionally fails from the
/// `fail_at`-th cook onwards.
#[derive(Debug, Default)]
pub struct RecordingPhysics {
    pub cooked: Vec<Vec<Vec3>>,
    pub shapes: Vec<ConvexMeshHandle>,
    pub fail_at: Option<usize>,
}

impl PhysicsBackend for RecordingPhysics {
    fn cook_convex_mesh(&mut self, points: &[Vec3]) -> Result<ConvexMeshHandle, CookError> {
        if self.fail_at.is_some_and(|n| self.cooked.len() >= n) {
            return Err(CookError("cooking disabled".into()));
        }
        if points.len() < 4 {
            return Err(CookError(format!("{} points do not span a volume", points.len())));
        }
        self.cooked.push(points.to_vec());
        Ok(ConvexMeshHandle(self.cooked.len() as u32 - 1))
    }

    fn create_shape(&mut self, mesh: ConvexMeshHandle) -> ShapeHandle {
        self.shapes.push(mesh);
        ShapeHandle(self.shapes.len() as u32 - 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    BindFramebuffer(FramebufferHandle),
    CopyDepth(FramebufferHandle),
    Outlines(bool),
    DepthRange(f32, f32),
    LoadIdentity,
    /// Entity origin.
    Transform(Vec3),
    Translate(Vec3),
    BindShader(MaterialId),
    BindVbo(MeshHandle),
    SurfFlags(SurfFlags),
    DrawElements(ElementRange),
    DrawInstanced(ElementRange, usize),
    BatchSprite(DrawSurfRef, bool),
    BatchPoly(DrawSurfRef, bool),
    FlushDynamic,
    DrawAlias(DrawSurfRef),
    DrawGltf(DrawSurfRef),
    DrawSky(DrawSurfRef),
    DrawNull(DrawSurfRef),
}

#[derive(Debug)]
pub struct RecordingRenderer {
    pub calls: Vec<Call>,
    pub outlines: bool,
    pub depth: (f32, f32),
    pub framebuffer: FramebufferHandle,
    pub fbo_has_depth: bool,
    pub screen_depth_copy: bool,
}

impl Default for RecordingRenderer {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            outlines: false,
            depth: (0.0, 1.0),
            framebuffer: FramebufferHandle(0),
            fbo_has_depth: true,
            screen_depth_copy: true,
        }
    }
}

impl RecordingRenderer {
    pub fn draws(&self) -> Vec<ElementRange> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::DrawElements(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, f: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| f(c)).count()
    }
}

impl RenderBackend for RecordingRenderer {
    fn bound_framebuffer(&self) -> FramebufferHandle {
        self.framebuffer
    }

    fn bind_framebuffer(&mut self, fbo: FramebufferHandle) {
        self.framebuffer = fbo;
        self.calls.push(Call::BindFramebuffer(fbo));
    }

    fn framebuffer_has_depth(&self, _fbo: FramebufferHandle) -> bool {
        self.fbo_has_depth
    }

    fn has_screen_depth_copy(&self) -> bool {
        self.screen_depth_copy
    }

    fn copy_depth_to_screen_texture(&mut self, fbo: FramebufferHandle) {
        self.calls.push(Call::CopyDepth(fbo));
    }

    fn enable_triangle_outlines(&mut self, enable: bool) -> bool {
        let prev = self.outlines;
        self.outlines = enable;
        self.calls.push(Call::Outlines(enable));
        prev
    }

    fn depth_range(&self) -> (f32, f32) {
        self.depth
    }

    fn set_depth_range(&mut self, min: f32, max: f32) {
        self.depth = (min, max);
        self.calls.push(Call::DepthRange(min, max));
    }

    fn load_identity_object_matrix(&mut self) {
        self.calls.push(Call::LoadIdentity);
    }

    fn transform_for_entity(&mut self, entity: &Entity) {
        self.calls.push(Call::Transform(entity.origin));
    }

    fn translate_for_entity(&mut self, entity: &Entity) {
        self.calls.push(Call::Translate(entity.origin));
    }

    fn bind_shader(&mut self, _entity: &Entity, material: &Material) {
        self.calls.push(Call::BindShader(material.id));
    }

    fn bind_vbo(&mut self, mesh: MeshHandle) {
        self.calls.push(Call::BindVbo(mesh));
    }

    fn set_surf_flags(&mut self, flags: SurfFlags) {
        self.calls.push(Call::SurfFlags(flags));
    }

    fn draw_elements(&mut self, range: ElementRange) {
        self.calls.push(Call::DrawElements(range));
    }

    fn draw_elements_instanced(&mut self, range: ElementRange, instances: &[Instance]) {
        self.calls.push(Call::DrawInstanced(range, instances.len()));
    }

    fn batch_sprite_surf(&mut self, _entity: &Entity, _material: &Material, surf: DrawSurfRef, mergable: bool) {
        self.calls.push(Call::BatchSprite(surf, mergable));
    }

    fn batch_poly_surf(&mut self, _entity: &Entity, _material: &Material, surf: DrawSurfRef, mergable: bool) {
        self.calls.push(Call::BatchPoly(surf, mergable));
    }

    fn flush_dynamic_meshes(&mut self) {
        self.calls.push(Call::FlushDynamic);
    }

    fn draw_alias_surf(&mut self, _entity: &Entity, _material: &Material, surf: DrawSurfRef) {
        self.calls.push(Call::DrawAlias(surf));
    }

    fn draw_gltf_mesh(&mut self, _entity: &Entity, _material: &Material, surf: DrawSurfRef) {
        self.calls.push(Call::DrawGltf(surf));
    }

    fn draw_sky_mesh(&mut self, _entity: &Entity, _material: &Material, surf: DrawSurfRef) {
        self.calls.push(Call::DrawSky(surf));
    }

    fn draw_null_surf(&mut self, _entity: &Entity, _material: &Material, surf: DrawSurfRef) {
        self.calls.push(Call::DrawNull(surf));
    }
}
