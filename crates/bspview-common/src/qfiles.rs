// qfiles.rs — on-disk BSP records for the id ("IBSP") and Raven ("RBSP") layouts
//
// Every record is `#[repr(C)]` + `Pod` so lumps can be viewed straight out of
// the file buffer. All fields are little-endian.

use bytemuck::{Pod, Zeroable};

// ============================================================
// Header
// ============================================================

pub const IDBSPHEADER: [u8; 4] = *b"IBSP";
pub const RBSPHEADER: [u8; 4] = *b"RBSP";

/// Lump indices in file order.
///
/// The id layout stores 17 lumps; the Raven layout appends `LightArray`.
/// The header is always read with 18 slots and the last one is only
/// meaningful for Raven maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum BspLump {
    Entities = 0,
    Materials,
    Planes,
    Nodes,
    Leaves,
    LeafFaces,
    LeafBrushes,
    Models,
    Brushes,
    BrushSides,
    Vertices,
    Indices,
    Fogs,
    Faces,
    Lighting,
    LightGrid,
    Visibility,
    LightArray,
}

pub const HEADER_LUMPS: usize = 18;

impl BspLump {
    pub fn name(self) -> &'static str {
        match self {
            BspLump::Entities => "entities",
            BspLump::Materials => "materials",
            BspLump::Planes => "planes",
            BspLump::Nodes => "nodes",
            BspLump::Leaves => "leaves",
            BspLump::LeafFaces => "leaf faces",
            BspLump::LeafBrushes => "leaf brushes",
            BspLump::Models => "models",
            BspLump::Brushes => "brushes",
            BspLump::BrushSides => "brush sides",
            BspLump::Vertices => "vertices",
            BspLump::Indices => "indices",
            BspLump::Fogs => "fogs",
            BspLump::Faces => "faces",
            BspLump::Lighting => "lighting",
            BspLump::LightGrid => "light grid",
            BspLump::Visibility => "visibility",
            BspLump::LightArray => "light array",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
#[repr(C)]
pub struct LumpLocation {
    pub offset: u32,
    pub length: u32,
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct BspHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub lumps: [LumpLocation; HEADER_LUMPS],
}

impl BspHeader {
    #[inline]
    pub fn lump(&self, lump: BspLump) -> LumpLocation {
        self.lumps[lump as usize]
    }
}

// ============================================================
// Shared records
// ============================================================

pub const MAX_MATERIAL_NAME: usize = 64;

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct BspMaterial {
    pub name: [u8; MAX_MATERIAL_NAME],
    pub flags: u32,
    pub contents: u32,
}

impl BspMaterial {
    /// The NUL-terminated name as text.
    pub fn name_str(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct BspPlane {
    pub normal: [f32; 3],
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct BspNode {
    pub plane: i32,
    /// Negative children are leaves: `-(leaf + 1)`.
    pub children: [i32; 2],
    pub mins: [i32; 3],
    pub maxs: [i32; 3],
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct BspLeaf {
    pub cluster: i32,
    pub area: i32,
    pub mins: [i32; 3],
    pub maxs: [i32; 3],
    pub first_leaf_face: u32,
    pub num_leaf_faces: u32,
    pub first_leaf_brush: u32,
    pub num_leaf_brushes: u32,
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct BspModel {
    pub mins: [f32; 3],
    pub maxs: [f32; 3],
    pub first_face: u32,
    pub num_faces: u32,
    pub first_brush: u32,
    pub num_brushes: u32,
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct BspBrush {
    pub first_side: u32,
    pub num_sides: u32,
    pub material: u32,
}

pub type BspIndex = i32;

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct BspVisHeader {
    pub num_clusters: u32,
    pub cluster_size: u32,
}

// ============================================================
// id layout
// ============================================================

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct BspBrushSide {
    pub plane: u32,
    pub material: u32,
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct BspVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub lightmap_uv: [f32; 2],
    pub normal: [f32; 3],
    pub color: [u8; 4],
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct BspFace {
    pub material: u32,
    pub fog: i32,
    pub face_type: i32,

    pub first_vertex: u32,
    pub num_vertices: u32,
    pub first_index: u32,
    pub num_indices: u32,

    pub lightmap: i32,
    pub lightmap_offset: [i32; 2],
    pub lightmap_size: [i32; 2],

    pub origin: [f32; 3],
    pub bounds: [[f32; 3]; 2],
    pub normal: [f32; 3],

    pub patch_width: u32,
    pub patch_height: u32,
}

// ============================================================
// Raven layout
// ============================================================

pub const RAVEN_LIGHTMAPS: usize = 4;

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct RavenBrushSide {
    pub plane: u32,
    pub material: u32,
    pub surface: u32,
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct RavenVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub lightmap_uv: [[f32; 2]; RAVEN_LIGHTMAPS],
    pub normal: [f32; 3],
    pub color: [[u8; 4]; RAVEN_LIGHTMAPS],
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct RavenFace {
    pub material: u32,
    pub fog: i32,
    pub face_type: i32,

    pub first_vertex: u32,
    pub num_vertices: u32,
    pub first_index: u32,
    pub num_indices: u32,

    pub lightmap_styles: [u8; RAVEN_LIGHTMAPS],
    pub vertex_styles: [u8; RAVEN_LIGHTMAPS],

    pub lightmap: [i32; RAVEN_LIGHTMAPS],
    pub lightmap_offset: [[i32; 2]; RAVEN_LIGHTMAPS],
    pub lightmap_size: [i32; 2],

    pub origin: [f32; 3],
    pub bounds: [[f32; 3]; 2],
    pub normal: [f32; 3],

    pub patch_width: u32,
    pub patch_height: u32,
}

// ============================================================
// Face types and flags
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaceType {
    #[default]
    Bad,
    Planar,
    Patch,
    TriangleSoup,
    Flare,
}

impl FaceType {
    pub fn from_raw(value: i32) -> Self {
        match value {
            1 => FaceType::Planar,
            2 => FaceType::Patch,
            3 => FaceType::TriangleSoup,
            4 => FaceType::Flare,
            _ => FaceType::Bad,
        }
    }
}

bitflags::bitflags! {
    /// Brush contents stored in `BspMaterial::contents`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Contents: u32 {
        const SOLID       = 0x1;
        const LAVA        = 0x8;
        const SLIME       = 0x10;
        const WATER       = 0x20;
        const FOG         = 0x40;
        const AREAPORTAL  = 0x8000;
        const PLAYERCLIP  = 0x10000;
        const MONSTERCLIP = 0x20000;
        const TRIGGER     = 0x40000000;
    }
}

bitflags::bitflags! {
    /// Surface flags stored in `BspMaterial::flags`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SurfFlags: u32 {
        const NODAMAGE   = 0x1;
        const SLICK      = 0x2;
        const SKY        = 0x4;
        const LADDER     = 0x8;
        const NOIMPACT   = 0x10;
        const NOMARKS    = 0x20;
        const FLESH      = 0x40;
        const NODRAW     = 0x80;
        const HINT       = 0x100;
        const SKIP       = 0x200;
        const NOLIGHTMAP = 0x400;
        const NODLIGHT   = 0x20000;
    }
}

// =============================================================================
// Tests
// =============================================================================
