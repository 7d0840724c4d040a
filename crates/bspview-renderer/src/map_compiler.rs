//! Map compiler: BSP bytes in, immutable `Level` out.
//!
//! Every model gets one index buffer over the shared vertex array, split into
//! one primitive per material. Patch faces are tessellated on the way and
//! their vertices appended to the shared array. Solid brushes become convex
//! collision shapes through the physics backend.

use rayon::prelude::*;

use bspview_common::compression::decompress_map;
use bspview_common::crc::{hash64, hash64_seeded};
use bspview_common::error::{AssetError, AssetResult};
use bspview_common::q_shared::*;
use bspview_common::qfiles::*;

use crate::backend::*;
use crate::brush_hull::brush_convex_hull;
use crate::bsp_format::{BspFormat, BspSpans, FaceRecord};
use crate::level::*;
use crate::material::{MaterialFlags, MaterialId, MaterialRegistry, WORLD_MATERIAL};
use crate::patch::{patch_fits, tessellate_patch, DEFAULT_MAX_ERROR};

/// Used when the worldspawn entity does not set `fog_strength`.
pub const DEFAULT_FOG_STRENGTH: f32 = 0.000015;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompileOptions {
    /// Patch flatness tolerance in world units.
    pub patch_max_error: f32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            patch_max_error: DEFAULT_MAX_ERROR,
        }
    }
}

/// Read and compile the map at `path`.
pub fn compile_map(
    path: &str,
    materials: &mut MaterialRegistry,
    gpu: &mut dyn GpuBackend,
    physics: &mut dyn PhysicsBackend,
    options: &CompileOptions,
) -> AssetResult<Level> {
    let data = std::fs::read(path).map_err(|source| AssetError::Io {
        name: path.to_string(),
        source,
    })?;
    compile_bytes(path, &data, materials, gpu, physics, options)
}

/// Compile an in-memory map image, optionally gzip-wrapped.
///
/// `name` seeds the asset hashes: the base hash is the name without its
/// extension, and model `i` hashes as `*i` on top of it.
pub fn compile_bytes(
    name: &str,
    data: &[u8],
    materials: &mut MaterialRegistry,
    gpu: &mut dyn GpuBackend,
    physics: &mut dyn PhysicsBackend,
    options: &CompileOptions,
) -> AssetResult<Level> {
    if data.len() < 4 {
        return Err(AssetError::corrupt(name, format!("{} bytes is too short", data.len())));
    }

    let data = decompress_map(data).map_err(|e| AssetError::corrupt(name, e))?;
    let bsp = BspSpans::parse(&data).map_err(|e| AssetError::corrupt(name, e.to_string()))?;
    validate_references(&bsp).map_err(|reason| AssetError::corrupt(name, reason))?;

    let material_ids: Vec<MaterialId> = bsp
        .materials
        .iter()
        .map(|m| {
            materials.resolve_bsp_material(
                &m.name_str(),
                SurfFlags::from_bits_truncate(m.flags),
                Contents::from_bits_truncate(m.contents),
            )
        })
        .collect();

    let base_hash = hash64(com_strip_extension(name).as_bytes());
    let mut state = CompileState {
        name,
        base_hash,
        material_ids,
        vertices: shared_vertices(&bsp),
        surfaces: Vec::new(),
        draw_surfaces: Vec::new(),
    };
    state.surfaces = build_surfaces(&bsp, &state.material_ids);

    let mut models = Vec::with_capacity(bsp.models.len());
    for idx in 0..bsp.models.len() {
        let model = compile_model(&mut state, &bsp, materials, idx, gpu, physics, options);
        models.push(model);
    }

    let leaves = build_leaves(&bsp, &state.surfaces, materials);
    let nodes = bsp
        .nodes
        .iter()
        .map(|n| Node {
            plane: n.plane as u32,
            children: n.children,
            mins: n.mins.map(|v| v as f32),
            maxs: n.maxs.map(|v| v as f32),
        })
        .collect();
    let planes = bsp
        .planes
        .iter()
        .map(|p| CPlane::new(p.normal, p.distance))
        .collect();

    let level = Level {
        name: name.to_string(),
        base_hash,
        format: bsp.format.unwrap_or(BspFormat::Id),
        models,
        planes,
        vertices: state.vertices,
        surfaces: state.surfaces,
        draw_surfaces: state.draw_surfaces,
        leaves,
        nodes,
        pvs: bsp.pvs.bits.to_vec(),
        num_clusters: bsp.pvs.num_clusters,
        cluster_size: bsp.pvs.cluster_size,
        fog_strength: parse_fog_strength(bsp.entities),
    };

    log::info!(
        "{}: {} models, {} surfaces, {} draw surfaces, {} vertices, {} leaves, {} collision shapes",
        name,
        level.models.len(),
        level.surfaces.len(),
        level.draw_surfaces.len(),
        level.vertices.len(),
        level.leaves.len(),
        level.models.iter().map(|m| m.collision_shapes.len()).sum::<usize>(),
    );

    Ok(level)
}

/// `fog_strength` from the first entity, or the default.
pub fn parse_fog_strength(entities: &[u8]) -> f32 {
    let text = String::from_utf8_lossy(entities);
    let (token, mut cursor) = com_parse(&text);
    if token != "{" {
        return DEFAULT_FOG_STRENGTH;
    }

    while let Some(rest) = cursor {
        let (key, rest) = com_parse(rest);
        let (value, rest) = match rest {
            Some(rest) => com_parse(rest),
            None => (String::new(), None),
        };
        if key.is_empty() || value.is_empty() || key == "}" {
            break;
        }
        if key == "fog_strength" {
            return atof(&value);
        }
        cursor = rest;
    }

    DEFAULT_FOG_STRENGTH
}

// ============================================================
// Validation
// ============================================================

fn check_range(what: &str, index: usize, first: u32, count: u32, len: usize) -> Result<(), String> {
    let end = first as u64 + count as u64;
    if end > len as u64 {
        return Err(format!("{} {} references {}..{} of {}", what, index, first, end, len));
    }
    Ok(())
}

/// Every cross reference the compiler follows must land inside its table.
fn validate_references(bsp: &BspSpans) -> Result<(), String> {
    let num_materials = bsp.materials.len();
    let num_vertices = bsp.num_vertices();
    let num_faces = bsp.num_faces();

    for i in 0..num_faces {
        let Some(face) = bsp.face(i) else { continue };
        if face.material as usize >= num_materials {
            return Err(format!("face {} uses material {} of {}", i, face.material, num_materials));
        }

        if face.face_type == FaceType::Patch {
            if !patch_fits(num_vertices, face.first_vertex, face.patch_width, face.patch_height) {
                return Err(format!(
                    "patch {} ({}x{} at {}) runs past {} vertices",
                    i, face.patch_width, face.patch_height, face.first_vertex, num_vertices
                ));
            }
            continue;
        }

        check_range("face", i, face.first_index, face.num_indices, bsp.indices.len())?;
        for j in 0..face.num_indices {
            let index = bsp.indices.get((face.first_index + j) as usize).unwrap_or(-1);
            if index < 0 || face.first_vertex as u64 + index as u64 >= num_vertices as u64 {
                return Err(format!("face {} index {} is outside {} vertices", i, index, num_vertices));
            }
        }
    }

    for (i, model) in bsp.models.iter().enumerate() {
        check_range("model", i, model.first_face, model.num_faces, num_faces)?;
        check_range("model", i, model.first_brush, model.num_brushes, bsp.brushes.len())?;
    }

    for (i, brush) in bsp.brushes.iter().enumerate() {
        if brush.material as usize >= num_materials {
            return Err(format!("brush {} uses material {} of {}", i, brush.material, num_materials));
        }
        check_range("brush", i, brush.first_side, brush.num_sides, bsp.num_brush_sides())?;
        for side in brush.first_side..brush.first_side + brush.num_sides {
            let plane = bsp.brush_side_plane(side as usize).unwrap_or(u32::MAX);
            if plane as usize >= bsp.planes.len() {
                return Err(format!("brush side {} uses plane {} of {}", side, plane, bsp.planes.len()));
            }
        }
    }

    for (i, leaf) in bsp.leaves.iter().enumerate() {
        check_range("leaf", i, leaf.first_leaf_face, leaf.num_leaf_faces, bsp.leaf_faces.len())?;
        for j in leaf.first_leaf_face..leaf.first_leaf_face + leaf.num_leaf_faces {
            let face = bsp.leaf_faces.get(j as usize).unwrap_or(-1);
            if face < 0 || face as usize >= num_faces {
                return Err(format!("leaf {} references face {} of {}", i, face, num_faces));
            }
        }
    }

    let num_nodes = bsp.nodes.len();
    let num_leaves = bsp.leaves.len();
    for (i, node) in bsp.nodes.iter().enumerate() {
        if node.plane < 0 || node.plane as usize >= bsp.planes.len() {
            return Err(format!("node {} uses plane {} of {}", i, node.plane, bsp.planes.len()));
        }
        for child in node.children {
            let ok = if child >= 0 {
                (child as usize) < num_nodes
            } else {
                ((-(child + 1)) as usize) < num_leaves
            };
            if !ok {
                return Err(format!("node {} has child {} outside the tree", i, child));
            }
        }
    }

    Ok(())
}

// ============================================================
// Geometry
// ============================================================

struct CompileState<'a> {
    name: &'a str,
    base_hash: u64,
    /// Registry id of each map material.
    material_ids: Vec<MaterialId>,
    vertices: Vec<BspModelVertex>,
    surfaces: Vec<Surface>,
    draw_surfaces: Vec<DrawSurface>,
}

impl CompileState<'_> {
    fn material_id(&self, map_material: u32) -> MaterialId {
        self.material_ids
            .get(map_material as usize)
            .copied()
            .unwrap_or(WORLD_MATERIAL)
    }
}

fn shared_vertices(bsp: &BspSpans) -> Vec<BspModelVertex> {
    if bsp.is_idbsp() {
        bsp.vertices
            .iter()
            .map(|v| BspModelVertex::new(v.position, v.normal, v.uv))
            .collect()
    } else {
        bsp.raven_vertices
            .iter()
            .map(|v| BspModelVertex::new(v.position, v.normal, v.uv))
            .collect()
    }
}

/// One surface per face. Geometry ranges are filled in by `compile_model`.
fn build_surfaces(bsp: &BspSpans, material_ids: &[MaterialId]) -> Vec<Surface> {
    (0..bsp.num_faces())
        .filter_map(|i| bsp.face(i))
        .map(|face| {
            let (mins, maxs) = clear_bounds();
            let flags = bsp
                .materials
                .get(face.material as usize)
                .map(|m| SurfFlags::from_bits_truncate(m.flags))
                .unwrap_or_default();
            let patch = face.face_type == FaceType::Patch;
            Surface {
                face_type: face.face_type,
                material: material_ids.get(face.material as usize).copied().unwrap_or(WORLD_MATERIAL),
                flags,
                draw_surface: None,
                first_vert: if patch { 0 } else { face.first_vertex },
                num_verts: if patch { 0 } else { face.num_vertices },
                first_draw_surf_elem: 0,
                num_elems: 0,
                mins,
                maxs,
                normal: face.normal,
            }
        })
        .collect()
}

struct DrawCall {
    face: u32,
    material: MaterialId,
    record: FaceRecord,
}

/// Where a face's indices landed in its model's index buffer.
struct Placement {
    face: u32,
    primitive: usize,
    first_index: u32,
    num_indices: u32,
}

fn brush_planes(bsp: &BspSpans, brush: &BspBrush) -> Vec<BspPlane> {
    (brush.first_side..brush.first_side + brush.num_sides)
        .filter_map(|side| bsp.brush_side_plane(side as usize))
        .filter_map(|plane| bsp.planes.get(plane as usize))
        .collect()
}

fn compile_model(
    state: &mut CompileState,
    bsp: &BspSpans,
    materials: &MaterialRegistry,
    idx: usize,
    gpu: &mut dyn GpuBackend,
    physics: &mut dyn PhysicsBackend,
    options: &CompileOptions,
) -> BrushModel {
    let Some(bsp_model) = bsp.models.get(idx) else {
        return BrushModel::default();
    };

    let suffix = format!("*{}", idx);
    let mut model = BrushModel {
        hash: hash64_seeded(suffix.as_bytes(), state.base_hash),
        mins: bsp_model.mins,
        maxs: bsp_model.maxs,
        radius: radius_from_bounds(&bsp_model.mins, &bsp_model.maxs),
        first_surface: bsp_model.first_face,
        num_surfaces: bsp_model.num_faces,
        first_draw_surface: state.draw_surfaces.len() as u32,
        ..Default::default()
    };

    // faceless models keep their slot so model indices stay aligned
    if bsp_model.num_faces == 0 {
        log::debug!("{}: model {} has no faces", state.name, idx);
        return model;
    }

    let mut draw_calls: Vec<DrawCall> = (bsp_model.first_face..bsp_model.first_face + bsp_model.num_faces)
        .filter_map(|face| {
            bsp.face(face as usize).map(|record| DrawCall {
                face,
                material: state.material_id(record.material),
                record,
            })
        })
        .collect();
    draw_calls.sort_by_key(|dc| dc.material);

    let Some(first) = draw_calls.first() else {
        return model;
    };

    let mut indices: Vec<u32> = Vec::new();
    let mut primitives = vec![Primitive {
        first_index: 0,
        num_indices: 0,
        material: first.material,
    }];
    let mut placements = Vec::with_capacity(draw_calls.len());

    for dc in &draw_calls {
        if materials.get(dc.material).is_some_and(|m| m.discard()) {
            continue;
        }

        if let Some(top) = primitives.last().copied() {
            if top.material != dc.material {
                primitives.push(Primitive {
                    first_index: top.first_index + top.num_indices,
                    num_indices: 0,
                    material: dc.material,
                });
            }
        }

        let start = indices.len() as u32;
        let surface = &mut state.surfaces[dc.face as usize];

        if dc.record.face_type == FaceType::Patch {
            let out = tessellate_patch(
                &mut state.vertices,
                &mut indices,
                dc.record.first_vertex,
                dc.record.patch_width,
                dc.record.patch_height,
                options.patch_max_error,
            );
            surface.first_vert = out.first_vertex;
            surface.num_verts = out.num_vertices;
        } else {
            for j in 0..dc.record.num_indices {
                let index = bsp.indices.get((dc.record.first_index + j) as usize).unwrap_or(0);
                indices.push(dc.record.first_vertex + index as u32);
            }
        }

        for &i in &indices[start as usize..] {
            if let Some(v) = state.vertices.get(i as usize) {
                add_point_to_bounds(&v.position, &mut surface.mins, &mut surface.maxs);
            }
        }

        let count = indices.len() as u32 - start;
        if let Some(top) = primitives.last_mut() {
            top.num_indices += count;
        }
        placements.push(Placement {
            face: dc.face,
            primitive: primitives.len() - 1,
            first_index: start,
            num_indices: count,
        });
    }

    let vertex_buffer = gpu.new_vertex_buffer(bytemuck::cast_slice(&state.vertices));
    let index_buffer = gpu.new_index_buffer(bytemuck::cast_slice(&indices));
    let mesh = gpu.new_mesh(&MeshConfig {
        vertex_buffer,
        index_buffer,
        index_format: IndexFormat::U32,
        stride: BspModelVertex::SIZE as u32,
        positions_offset: BspModelVertex::POSITION_OFFSET as u32,
        normals_offset: BspModelVertex::NORMAL_OFFSET as u32,
        tex_coords_offset: BspModelVertex::UV_OFFSET as u32,
        num_indices: indices.len() as u32,
        ccw_winding: false,
    });
    model.num_vertices = state.vertices.len() as u32;

    // one draw surface per non-empty primitive
    let mut primitive_draw_surface = Vec::with_capacity(primitives.len());
    for prim in &primitives {
        if prim.num_indices == 0 {
            primitive_draw_surface.push(None);
            continue;
        }
        primitive_draw_surface.push(Some(state.draw_surfaces.len()));
        state.draw_surfaces.push(DrawSurface {
            material: prim.material,
            surf_flags: materials.get(prim.material).map(|m| m.surf_flags).unwrap_or_default(),
            model: idx as u32,
            mesh: Some(mesh),
            first_vbo_vert: 0,
            num_verts: model.num_vertices,
            first_vbo_elem: prim.first_index,
            num_elems: prim.num_indices,
            surfaces: Vec::new(),
            instances: Vec::new(),
        });
    }

    for p in &placements {
        if p.num_indices == 0 {
            continue;
        }
        let Some(ds) = primitive_draw_surface[p.primitive] else {
            continue;
        };
        let surface = &mut state.surfaces[p.face as usize];
        surface.draw_surface = Some(ds as u32);
        surface.first_draw_surf_elem = p.first_index - primitives[p.primitive].first_index;
        surface.num_elems = p.num_indices;
        state.draw_surfaces[ds].surfaces.push(p.face);
    }

    model.num_draw_surfaces = state.draw_surfaces.len() as u32 - model.first_draw_surface;
    model.vertex_buffer = Some(vertex_buffer);
    model.index_buffer = Some(index_buffer);
    model.mesh = Some(mesh);
    model.primitives = primitives;
    model.indices = indices;

    build_collision(state, bsp, idx, bsp_model, physics, &mut model);
    model
}

/// One convex shape per solid brush, in brush order.
///
/// Hulls are extracted in parallel; cooking is serial. The first cooking
/// failure ends shape creation for the model.
fn build_collision(
    state: &CompileState,
    bsp: &BspSpans,
    idx: usize,
    bsp_model: BspModel,
    physics: &mut dyn PhysicsBackend,
    model: &mut BrushModel,
) {
    let solid: Vec<(u32, Vec<BspPlane>)> = (bsp_model.first_brush..bsp_model.first_brush + bsp_model.num_brushes)
        .filter_map(|b| {
            let brush = bsp.brushes.get(b as usize)?;
            let contents = bsp.materials.get(brush.material as usize)?.contents;
            Contents::from_bits_truncate(contents)
                .contains(Contents::SOLID)
                .then(|| (b, brush_planes(bsp, &brush)))
        })
        .collect();

    let hulls: Vec<Vec<Vec3>> = solid
        .par_iter()
        .map(|(_, planes)| brush_convex_hull(planes))
        .collect();

    for ((brush, _), hull) in solid.iter().zip(hulls) {
        match physics.cook_convex_mesh(&hull) {
            Ok(mesh) => {
                let shape = physics.create_shape(mesh);
                model.collision_meshes.push(mesh);
                model.collision_shapes.push(shape);
                model.collision_brushes.push(*brush);
            }
            Err(e) => {
                log::warn!(
                    "{}: model {} brush {}: {}; no further collision for this model",
                    state.name,
                    idx,
                    brush,
                    e
                );
                break;
            }
        }
    }
}

fn build_leaves(bsp: &BspSpans, surfaces: &[Surface], materials: &MaterialRegistry) -> Vec<Leaf> {
    bsp.leaves
        .iter()
        .map(|leaf| {
            let mut vis_surfaces = Vec::new();
            let mut fragment_surfaces = Vec::new();

            for j in leaf.first_leaf_face..leaf.first_leaf_face + leaf.num_leaf_faces {
                let Some(face) = bsp.leaf_faces.get(j as usize) else { continue };
                let Some(surface) = surfaces.get(face as usize) else { continue };
                if surface.draw_surface.is_none() {
                    continue;
                }
                vis_surfaces.push(face as u32);

                let no_marks = surface.flags.contains(SurfFlags::NOMARKS)
                    || materials
                        .get(surface.material)
                        .is_some_and(|m| m.flags.contains(MaterialFlags::NO_MARKS));
                if !no_marks && surface.face_type != FaceType::Flare {
                    fragment_surfaces.push(face as u32);
                }
            }

            Leaf {
                cluster: leaf.cluster,
                area: leaf.area,
                mins: leaf.mins.map(|v| v as f32),
                maxs: leaf.maxs.map(|v| v as f32),
                vis_surfaces,
                fragment_surfaces,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush_hull::point_inside_brush;
    use crate::material::MaterialDesc;
    use crate::test_support::*;
    use bspview_common::compression::compress_map;

    fn compile(data: &[u8]) -> (AssetResult<Level>, RecordingGpu, RecordingPhysics, MaterialRegistry) {
        let mut materials = MaterialRegistry::new();
        let mut gpu = RecordingGpu::default();
        let mut physics = RecordingPhysics::default();
        let level = compile_bytes(
            "maps/test.bsp",
            data,
            &mut materials,
            &mut gpu,
            &mut physics,
            &CompileOptions::default(),
        );
        (level, gpu, physics, materials)
    }

    #[test]
    fn test_box_room() {
        let (level, gpu, physics, _) = compile(&box_room().build());
        let level = level.unwrap();

        assert_eq!(level.num_models(), 1);
        assert_eq!(level.vertices.len(), 4);
        let world = level.world().unwrap();
        assert_eq!(world.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(world.primitives.len(), 1);
        assert_eq!(world.num_draw_surfaces, 1);

        assert_eq!(gpu.vertex_buffers.len(), 1);
        assert_eq!(gpu.vertex_buffers[0].len(), 4 * BspModelVertex::SIZE);
        assert_eq!(gpu.index_buffers[0], bytemuck::cast_slice::<u32, u8>(&[0, 1, 2, 0, 2, 3]).to_vec());
        assert_eq!(gpu.meshes[0].stride, 32);
        assert_eq!(gpu.meshes[0].index_format, IndexFormat::U32);
        assert_eq!(gpu.meshes[0].num_indices, 6);

        let surf = &level.surfaces[0];
        assert_eq!(surf.draw_surface, Some(0));
        assert_eq!(surf.num_elems, 6);
        assert_eq!(surf.mins, [0.0, 0.0, 0.0]);
        assert_eq!(surf.maxs, [64.0, 64.0, 0.0]);
        assert_eq!(level.draw_surfaces[0].surfaces, vec![0]);
        assert_eq!(level.leaves[0].vis_surfaces, vec![0]);
        assert_eq!(level.leaves[0].fragment_surfaces, vec![0]);

        // one solid brush: one shape, eight corners
        assert_eq!(world.collision_shapes.len(), 1);
        assert_eq!(world.collision_brushes, vec![0]);
        assert_eq!(physics.cooked.len(), 1);
        assert_eq!(physics.cooked[0].len(), 8);
        let planes = crate::brush_hull::box_planes(&[0.0, 0.0, -16.0], &[64.0, 64.0, 0.0]);
        assert!(physics.cooked[0].iter().all(|p| point_inside_brush(&planes, p)));
    }

    #[test]
    fn test_recompile_is_identical() {
        let mut b = box_room();
        let m = b.material("textures/base/trim", SurfFlags::empty(), Contents::SOLID);
        b.patch_face(m, 5, 3, |x, y| [x as f32 * 16.0, y as f32 * 16.0, if x % 2 == 1 { 24.0 } else { 0.0 }]);
        b.box_brush(m, [0.0; 3], [8.0; 3]);
        b.model(([0.0; 3], [64.0; 3]), 1..2, 1..2);
        let data = b.build();

        let (a, gpu_a, phys_a, _) = compile(&data);
        let (b, gpu_b, phys_b, _) = compile(&data);
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(gpu_a.vertex_buffers, gpu_b.vertex_buffers);
        assert_eq!(gpu_a.index_buffers, gpu_b.index_buffers);
        assert_eq!(phys_a.cooked, phys_b.cooked);
        for (ma, mb) in a.models.iter().zip(&b.models) {
            assert_eq!(ma.collision_brushes, mb.collision_brushes);
            assert_eq!(ma.hash, mb.hash);
        }
    }

    #[test]
    fn test_discard_material_is_skipped() {
        let mut b = BspBuilder::new();
        let floor = b.material("floor", SurfFlags::empty(), Contents::SOLID);
        let nodraw = b.material("common/nodraw", SurfFlags::NODRAW, Contents::SOLID);
        b.quad_face(nodraw, [0.0; 3], 32.0);
        b.quad_face(floor, [0.0, 0.0, 8.0], 32.0);
        b.model(([0.0; 3], [32.0; 3]), 0..2, 0..0);

        let (level, _, _, materials) = compile(&b.build());
        let level = level.unwrap();
        let world = level.world().unwrap();

        assert_eq!(world.indices.len(), 6);
        assert_eq!(world.primitives.len(), 1);
        assert_eq!(world.primitives[0].material, materials.find("floor").unwrap());
        assert_eq!(level.surfaces[0].draw_surface, None);
        assert!(!level.surfaces[0].has_geometry());
        assert_eq!(level.surfaces[1].draw_surface, Some(0));
    }

    #[test]
    fn test_leading_discard_leaves_empty_primitive() {
        let mut b = BspBuilder::new();
        let nodraw = b.material("common/nodraw", SurfFlags::NODRAW, Contents::empty());
        let floor = b.material("floor", SurfFlags::empty(), Contents::empty());
        b.quad_face(floor, [0.0; 3], 32.0);
        b.quad_face(nodraw, [0.0; 3], 32.0);
        b.model(([0.0; 3], [32.0; 3]), 0..2, 0..0);

        let (level, _, _, materials) = compile(&b.build());
        let level = level.unwrap();
        let world = level.world().unwrap();

        assert_eq!(world.primitives.len(), 2);
        assert_eq!(world.primitives[0].num_indices, 0);
        assert_eq!(world.primitives[1].first_index, 0);
        assert_eq!(world.primitives[1].num_indices, 6);
        assert_eq!(level.draw_surfaces.len(), 1);
        assert_eq!(level.draw_surfaces[0].material, materials.find("floor").unwrap());
    }

    #[test]
    fn test_faces_grouped_by_material() {
        let mut b = BspBuilder::new();
        let wall = b.material("wall", SurfFlags::empty(), Contents::empty());
        let floor = b.material("floor", SurfFlags::empty(), Contents::empty());
        b.quad_face(floor, [0.0; 3], 16.0);
        b.quad_face(wall, [0.0; 3], 16.0);
        b.quad_face(floor, [16.0, 0.0, 0.0], 16.0);
        b.model(([0.0; 3], [32.0; 3]), 0..3, 0..0);

        let (level, _, _, _) = compile(&b.build());
        let level = level.unwrap();
        assert_eq!(level.draw_surfaces.len(), 2);

        // wall was registered first
        let wall_ds = &level.draw_surfaces[0];
        assert_eq!(wall_ds.surfaces, vec![1]);
        assert_eq!(wall_ds.first_vbo_elem, 0);

        // floor keeps face order inside its group
        let floor_ds = &level.draw_surfaces[1];
        assert_eq!(floor_ds.surfaces, vec![0, 2]);
        assert_eq!(floor_ds.first_vbo_elem, 6);
        assert_eq!(floor_ds.num_elems, 12);
        assert_eq!(level.surfaces[0].first_draw_surf_elem, 0);
        assert_eq!(level.surfaces[2].first_draw_surf_elem, 6);
    }

    #[test]
    fn test_patch_vertices_appended() {
        let mut b = BspBuilder::new();
        let m = b.material("curve", SurfFlags::empty(), Contents::empty());
        b.patch_face(m, 3, 3, |x, y| [x as f32 * 32.0, y as f32 * 32.0, 0.0]);
        b.model(([0.0; 3], [64.0; 3]), 0..1, 0..0);

        let (level, gpu, _, _) = compile(&b.build());
        let level = level.unwrap();

        assert_eq!(level.vertices.len(), 9 + 4);
        let surf = &level.surfaces[0];
        assert_eq!(surf.first_vert, 9);
        assert_eq!(surf.num_verts, 4);
        assert_eq!(surf.num_elems, 6);
        assert_eq!(level.world().unwrap().indices, vec![9, 11, 10, 10, 11, 12]);
        // the upload includes the tessellated vertices
        assert_eq!(gpu.vertex_buffers[0].len(), 13 * BspModelVertex::SIZE);
    }

    #[test]
    fn test_gzip_map() {
        let raw = box_room().build();
        let packed = compress_map(&raw).unwrap();
        let (plain, _, _, _) = compile(&raw);
        let (level, _, _, _) = compile(&packed);
        assert_eq!(level.unwrap().vertices, plain.unwrap().vertices);

        let truncated = &packed[..packed.len() - 6];
        let (err, _, _, _) = compile(truncated);
        assert!(matches!(err, Err(AssetError::Corrupt { .. })));
    }

    #[test]
    fn test_corrupt_maps() {
        let (err, _, _, _) = compile(&[1, 2]);
        assert!(matches!(err, Err(AssetError::Corrupt { .. })));

        // malformed lumps surface as a corrupt map
        let mut b = box_room();
        b.raw_lump(BspLump::Models, vec![0u8; 41]);
        let (err, _, _, _) = compile(&b.build());
        assert!(matches!(err, Err(AssetError::Corrupt { .. })));

        // face material out of range
        let mut b = box_room();
        b.quad_face(9, [0.0; 3], 8.0);
        let (err, _, _, _) = compile(&b.build());
        assert!(matches!(err, Err(AssetError::Corrupt { .. })));

        // index past the vertex array
        let mut b = BspBuilder::new();
        let m = b.material("m", SurfFlags::empty(), Contents::empty());
        let first_index = b.indices(&[0, 1, 7]);
        b.vertex([0.0; 3], [0.0, 0.0, 1.0], [0.0; 2]);
        b.vertex([1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0; 2]);
        b.face(TestFace {
            material: m,
            face_type: 3,
            num_vertices: 2,
            first_index,
            num_indices: 3,
            ..Default::default()
        });
        let (err, _, _, _) = compile(&b.build());
        assert!(matches!(err, Err(AssetError::Corrupt { .. })));

        // model face range past the face table
        let mut b = BspBuilder::new();
        b.model(([0.0; 3], [1.0; 3]), 0..3, 0..0);
        let (err, _, _, _) = compile(&b.build());
        assert!(matches!(err, Err(AssetError::Corrupt { .. })));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let mut materials = MaterialRegistry::new();
        let err = compile_map(
            "/nonexistent/maps/none.bsp",
            &mut materials,
            &mut RecordingGpu::default(),
            &mut RecordingPhysics::default(),
            &CompileOptions::default(),
        );
        assert!(matches!(err, Err(AssetError::Io { .. })));
    }

    #[test]
    fn test_fog_strength() {
        assert_eq!(parse_fog_strength(b""), DEFAULT_FOG_STRENGTH);
        assert_eq!(
            parse_fog_strength(b"{\n\"classname\" \"worldspawn\"\n\"fog_strength\" \"0.0002\"\n}\n"),
            0.0002
        );
        // only the first entity is read
        assert_eq!(
            parse_fog_strength(b"{ \"classname\" \"worldspawn\" }\n{ \"fog_strength\" \"1\" }"),
            DEFAULT_FOG_STRENGTH
        );
        assert_eq!(parse_fog_strength(b"\"fog_strength\" \"1\""), DEFAULT_FOG_STRENGTH);
        // an empty value stops the scan
        assert_eq!(parse_fog_strength(b"{ \"message\" \"\" \"fog_strength\" \"1\" }"), DEFAULT_FOG_STRENGTH);

        let mut b = box_room();
        b.entities("{ \"fog_strength\" \"0.5\" }");
        let (level, _, _, _) = compile(&b.build());
        assert_eq!(level.unwrap().fog_strength, 0.5);
    }

    #[test]
    fn test_model_hashes() {
        let mut b = box_room();
        b.model(([0.0; 3], [1.0; 3]), 0..0, 0..0);
        let (level, _, _, _) = compile(&b.build());
        let level = level.unwrap();

        let base = hash64(b"maps/test");
        assert_eq!(level.base_hash, base);
        assert_eq!(level.models[0].hash, hash64_seeded(b"*0", base));
        assert_eq!(level.models[1].hash, hash64(b"maps/test*1"));
        // the faceless model keeps its slot with no geometry
        assert!(level.models[1].mesh.is_none());
        assert_eq!(level.models[1].num_draw_surfaces, 0);
    }

    #[test]
    fn test_collision_solid_only_and_stops_on_failure() {
        let mut b = BspBuilder::new();
        let solid = b.material("solid", SurfFlags::empty(), Contents::SOLID);
        let water = b.material("water", SurfFlags::empty(), Contents::WATER);
        b.quad_face(solid, [0.0; 3], 8.0);
        b.box_brush(solid, [0.0; 3], [8.0; 3]);
        b.box_brush(water, [0.0; 3], [8.0; 3]);
        b.box_brush(solid, [16.0; 3], [24.0; 3]);
        b.box_brush(solid, [32.0; 3], [40.0; 3]);
        b.model(([0.0; 3], [40.0; 3]), 0..1, 0..4);
        let data = b.build();

        let (level, _, physics, _) = compile(&data);
        let world = level.unwrap().models.remove(0);
        assert_eq!(world.collision_brushes, vec![0, 2, 3]);
        assert_eq!(physics.shapes.len(), 3);

        let mut materials = MaterialRegistry::new();
        let mut physics = RecordingPhysics {
            fail_at: Some(1),
            ..Default::default()
        };
        let level = compile_bytes(
            "maps/test.bsp",
            &data,
            &mut materials,
            &mut RecordingGpu::default(),
            &mut physics,
            &CompileOptions::default(),
        )
        .unwrap();
        assert_eq!(level.models[0].collision_brushes, vec![0]);
    }

    #[test]
    fn test_registered_material_wins() {
        let mut materials = MaterialRegistry::new();
        let id = materials.register(
            "textures/base/floor",
            MaterialDesc {
                draw_order: 3,
                ..MaterialDesc::opaque()
            },
        );
        let level = compile_bytes(
            "maps/test.bsp",
            &box_room().build(),
            &mut materials,
            &mut RecordingGpu::default(),
            &mut RecordingPhysics::default(),
            &CompileOptions::default(),
        )
        .unwrap();
        assert_eq!(level.surfaces[0].material, id);
        assert_eq!(level.draw_surfaces[0].material, id);
    }

    #[test]
    fn test_raven_layout() {
        let mut b = BspBuilder::raven();
        let m = b.material("floor", SurfFlags::empty(), Contents::SOLID);
        b.quad_face(m, [0.0; 3], 32.0);
        b.box_brush(m, [0.0; 3], [32.0; 3]);
        b.model(([0.0; 3], [32.0; 3]), 0..1, 0..1);

        let (level, _, physics, _) = compile(&b.build());
        let level = level.unwrap();
        assert_eq!(level.format, BspFormat::Raven);
        assert_eq!(level.world().unwrap().indices.len(), 6);
        assert_eq!(physics.cooked[0].len(), 8);
    }

    #[test]
    fn test_nodes_and_pvs_carried() {
        let mut b = box_room();
        b.plane([1.0, 0.0, 0.0], 32.0);
        b.leaf(1, 0, [32, 0, 0], [64, 64, 64], &[]);
        // box brush planes come first: the split plane is index 6
        b.node(6, [-2, -1], [0, 0, -16], [64, 64, 64]);
        b.visibility(2, 1, vec![0b01, 0b11]);

        let (level, _, _, _) = compile(&b.build());
        let level = level.unwrap();
        assert_eq!(level.nodes.len(), 1);
        assert_eq!(level.num_clusters, 2);
        assert_eq!(level.point_cluster(&[40.0, 8.0, 8.0]), 1);
        assert_eq!(level.point_cluster(&[8.0, 8.0, 8.0]), 0);
        assert!(!level.cluster_visible(0, 1));
    }
}
