//! Bounds-checked, zero-copy views over the lumps of a BSP file.
//!
//! `BspSpans::parse` validates the header and every lump the compiler needs,
//! then hands out typed `LumpSlice`s that read records straight out of the
//! file buffer. Records are read unaligned, so the buffer may come from
//! anywhere (a `Vec<u8>`, a memory map, a decompressed `Cow`).

use std::marker::PhantomData;
use std::mem::size_of;

use bytemuck::Pod;

use bspview_common::error::{AssetError, AssetResult};
use bspview_common::qfiles::*;

/// Which record layout the file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BspFormat {
    /// "IBSP": id Software layout.
    Id,
    /// "RBSP": Raven layout with four lightmap/vertex-colour sets.
    Raven,
}

/// A typed view of one lump.
#[derive(Clone, Copy)]
pub struct LumpSlice<'a, T> {
    bytes: &'a [u8],
    _marker: PhantomData<T>,
}

impl<'a, T: Pod> LumpSlice<'a, T> {
    pub fn empty() -> Self {
        Self {
            bytes: &[],
            _marker: PhantomData,
        }
    }

    /// `bytes.len()` must be a multiple of `size_of::<T>()`.
    fn new(bytes: &'a [u8]) -> Self {
        debug_assert_eq!(bytes.len() % size_of::<T>(), 0);
        Self {
            bytes,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len() / size_of::<T>()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        let start = index.checked_mul(size_of::<T>())?;
        let end = start.checked_add(size_of::<T>())?;
        self.bytes
            .get(start..end)
            .map(bytemuck::pod_read_unaligned::<T>)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = T> + 'a {
        self.bytes
            .chunks_exact(size_of::<T>())
            .map(bytemuck::pod_read_unaligned::<T>)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}

impl<T: Pod> Default for LumpSlice<'_, T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Pod + std::fmt::Debug> std::fmt::Debug for LumpSlice<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LumpSlice<{}>({})", std::any::type_name::<T>(), self.len())
    }
}

/// Read the file header. The buffer must hold a full 18-slot header.
pub fn read_header(data: &[u8]) -> AssetResult<BspHeader> {
    let size = size_of::<BspHeader>();
    if data.len() < size {
        return Err(AssetError::malformed(
            "header",
            format!("file is {} bytes, header needs {}", data.len(), size),
        ));
    }
    Ok(bytemuck::pod_read_unaligned(&data[..size]))
}

/// View lump `lump` of `data` as records of type `T`.
///
/// Fails when the lump runs past the end of the buffer or its length is not
/// a whole number of records.
pub fn parse_lump<'a, T: Pod>(
    data: &'a [u8],
    header: &BspHeader,
    lump: BspLump,
) -> AssetResult<LumpSlice<'a, T>> {
    let bytes = lump_bytes(data, header, lump)?;
    if bytes.len() % size_of::<T>() != 0 {
        return Err(AssetError::malformed(
            lump.name(),
            format!(
                "length {} is not a multiple of {}",
                bytes.len(),
                size_of::<T>()
            ),
        ));
    }
    Ok(LumpSlice::new(bytes))
}

fn lump_bytes<'a>(data: &'a [u8], header: &BspHeader, lump: BspLump) -> AssetResult<&'a [u8]> {
    let location = header.lump(lump);
    let start = location.offset as usize;
    let end = start.checked_add(location.length as usize);
    match end {
        Some(end) if end <= data.len() => Ok(&data[start..end]),
        _ => Err(AssetError::malformed(
            lump.name(),
            format!(
                "offset {} + length {} exceeds file size {}",
                location.offset,
                location.length,
                data.len()
            ),
        )),
    }
}

/// Potentially-visible-set bit matrix: `num_clusters` rows of `cluster_size` bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PvsView<'a> {
    pub bits: &'a [u8],
    pub num_clusters: u32,
    pub cluster_size: u32,
}

/// Parse the visibility lump. A zero-length lump means "no PVS".
pub fn parse_pvs<'a>(data: &'a [u8], header: &BspHeader) -> AssetResult<PvsView<'a>> {
    let location = header.lump(BspLump::Visibility);
    if location.length == 0 {
        return Ok(PvsView::default());
    }

    let bytes = lump_bytes(data, header, BspLump::Visibility)?;
    let header_size = size_of::<BspVisHeader>();
    if bytes.len() < header_size {
        return Err(AssetError::malformed(
            "visibility",
            format!("{} bytes cannot hold the cluster header", bytes.len()),
        ));
    }

    let vis: BspVisHeader = bytemuck::pod_read_unaligned(&bytes[..header_size]);
    let pvs_size = (vis.num_clusters as u64) * (vis.cluster_size as u64);
    if bytes.len() as u64 != header_size as u64 + pvs_size {
        return Err(AssetError::malformed(
            "visibility",
            format!(
                "{} clusters of {} bytes do not fill a {} byte lump",
                vis.num_clusters,
                vis.cluster_size,
                bytes.len()
            ),
        ));
    }

    Ok(PvsView {
        bits: &bytes[header_size..],
        num_clusters: vis.num_clusters,
        cluster_size: vis.cluster_size,
    })
}

/// All lumps the compiler consumes.
///
/// Layout-specific lumps (vertices, faces, brush sides) are parsed for the
/// detected format only; the other layout's slices are left empty.
#[derive(Debug, Default)]
pub struct BspSpans<'a> {
    pub format: Option<BspFormat>,
    pub version: u32,

    pub entities: &'a [u8],
    pub materials: LumpSlice<'a, BspMaterial>,
    pub planes: LumpSlice<'a, BspPlane>,
    pub nodes: LumpSlice<'a, BspNode>,
    pub leaves: LumpSlice<'a, BspLeaf>,
    pub leaf_faces: LumpSlice<'a, BspIndex>,
    pub models: LumpSlice<'a, BspModel>,
    pub brushes: LumpSlice<'a, BspBrush>,
    pub brush_sides: LumpSlice<'a, BspBrushSide>,
    pub raven_brush_sides: LumpSlice<'a, RavenBrushSide>,
    pub vertices: LumpSlice<'a, BspVertex>,
    pub raven_vertices: LumpSlice<'a, RavenVertex>,
    pub indices: LumpSlice<'a, BspIndex>,
    pub faces: LumpSlice<'a, BspFace>,
    pub raven_faces: LumpSlice<'a, RavenFace>,

    pub pvs: PvsView<'a>,
}

impl<'a> BspSpans<'a> {
    /// Parse the header and every lump. Any failing check rejects the file.
    ///
    /// Anything whose magic is not "IBSP" is read with the Raven layout.
    pub fn parse(data: &'a [u8]) -> AssetResult<Self> {
        let header = read_header(data)?;
        let format = if header.magic == IDBSPHEADER {
            BspFormat::Id
        } else {
            BspFormat::Raven
        };

        let mut bsp = BspSpans {
            format: Some(format),
            version: header.version,
            entities: lump_bytes(data, &header, BspLump::Entities)?,
            materials: parse_lump(data, &header, BspLump::Materials)?,
            planes: parse_lump(data, &header, BspLump::Planes)?,
            nodes: parse_lump(data, &header, BspLump::Nodes)?,
            leaves: parse_lump(data, &header, BspLump::Leaves)?,
            leaf_faces: parse_lump(data, &header, BspLump::LeafFaces)?,
            models: parse_lump(data, &header, BspLump::Models)?,
            brushes: parse_lump(data, &header, BspLump::Brushes)?,
            indices: parse_lump(data, &header, BspLump::Indices)?,
            ..Default::default()
        };

        match format {
            BspFormat::Id => {
                bsp.vertices = parse_lump(data, &header, BspLump::Vertices)?;
                bsp.faces = parse_lump(data, &header, BspLump::Faces)?;
                bsp.brush_sides = parse_lump(data, &header, BspLump::BrushSides)?;
            }
            BspFormat::Raven => {
                bsp.raven_vertices = parse_lump(data, &header, BspLump::Vertices)?;
                bsp.raven_faces = parse_lump(data, &header, BspLump::Faces)?;
                bsp.raven_brush_sides = parse_lump(data, &header, BspLump::BrushSides)?;
            }
        }

        bsp.pvs = parse_pvs(data, &header)?;
        Ok(bsp)
    }

    pub fn is_idbsp(&self) -> bool {
        self.format == Some(BspFormat::Id)
    }

    pub fn num_vertices(&self) -> usize {
        if self.is_idbsp() {
            self.vertices.len()
        } else {
            self.raven_vertices.len()
        }
    }

    pub fn num_faces(&self) -> usize {
        if self.is_idbsp() {
            self.faces.len()
        } else {
            self.raven_faces.len()
        }
    }

    pub fn num_brush_sides(&self) -> usize {
        if self.is_idbsp() {
            self.brush_sides.len()
        } else {
            self.raven_brush_sides.len()
        }
    }

    /// Plane index of brush side `side`, whatever the layout.
    pub fn brush_side_plane(&self, side: usize) -> Option<u32> {
        if self.is_idbsp() {
            self.brush_sides.get(side).map(|s| s.plane)
        } else {
            self.raven_brush_sides.get(side).map(|s| s.plane)
        }
    }

    /// Face `index` reduced to the fields shared by both layouts.
    pub fn face(&self, index: usize) -> Option<FaceRecord> {
        if self.is_idbsp() {
            self.faces.get(index).map(|f| FaceRecord {
                material: f.material,
                face_type: FaceType::from_raw(f.face_type),
                first_vertex: f.first_vertex,
                num_vertices: f.num_vertices,
                first_index: f.first_index,
                num_indices: f.num_indices,
                normal: f.normal,
                patch_width: f.patch_width,
                patch_height: f.patch_height,
            })
        } else {
            self.raven_faces.get(index).map(|f| FaceRecord {
                material: f.material,
                face_type: FaceType::from_raw(f.face_type),
                first_vertex: f.first_vertex,
                num_vertices: f.num_vertices,
                first_index: f.first_index,
                num_indices: f.num_indices,
                normal: f.normal,
                patch_width: f.patch_width,
                patch_height: f.patch_height,
            })
        }
    }
}

/// Layout-independent face fields.
#[derive(Debug, Clone, Copy)]
pub struct FaceRecord {
    pub material: u32,
    pub face_type: FaceType,
    pub first_vertex: u32,
    pub num_vertices: u32,
    pub first_index: u32,
    pub num_indices: u32,
    pub normal: [f32; 3],
    pub patch_width: u32,
    pub patch_height: u32,
}
