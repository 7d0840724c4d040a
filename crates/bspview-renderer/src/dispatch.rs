//! Draw list dispatch.
//!
//! Walks a sorted draw list and turns it into backend calls. BSP, sprite and
//! poly records accumulate into batches; everything else draws immediately.
//! Backend state is only touched when material, entity, effects or batching
//! mode change between consecutive records.

use bspview_common::qfiles::SurfFlags;

use crate::backend::{ElementRange, RenderBackend};
use crate::draw_list::{dist_key_sort, unpack_sort_key, BatchFlush, BspBatch, DrawList, DrawSurfRef, SurfaceKind};
use crate::frame::{Entity, RenderFlags, RenderFx, RenderScene};
use crate::material::{Material, MaterialFlags, MaterialId, SHADER_SORT_MAX};
use crate::vis_scratch::VisScratch;

/// Share of the depth range left to first-person weapons.
const WEAPON_DEPTH_FRACTION: f32 = 0.3;

/// Which records a dispatch pass draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawPassFilter {
    /// Only this kind, if set.
    pub kind_eq: Option<SurfaceKind>,
    /// Never this kind, if set.
    pub kind_ne: Option<SurfaceKind>,
    /// Records below this sort class are skipped.
    pub min_sort: u32,
    /// The pass stops at the first record above this sort class.
    pub max_sort: u32,
}

impl Default for DrawPassFilter {
    fn default() -> Self {
        Self {
            kind_eq: None,
            kind_ne: None,
            min_sort: 0,
            max_sort: SHADER_SORT_MAX,
        }
    }
}

impl DrawPassFilter {
    fn skips(&self, kind: SurfaceKind, sort: u32) -> bool {
        self.kind_eq.is_some_and(|k| k != kind) || self.kind_ne == Some(kind) || sort < self.min_sort
    }
}

/// Issue the pending BSP batch, if any.
pub fn flush_bsp_batch(batch: &mut BspBatch, scene: RenderScene<'_>, backend: &mut dyn RenderBackend) {
    if batch.count == 0 {
        return;
    }
    batch.count = 0;

    let (Some(material), Some(mesh)) = (scene.materials.get(batch.material), batch.mesh) else {
        return;
    };
    let surf_flags = scene
        .level
        .and_then(|level| level.draw_surfaces.get(batch.draw_surface as usize))
        .map(|ds| ds.surf_flags)
        .unwrap_or(SurfFlags::empty());

    backend.bind_shader(&batch.entity, material);
    backend.bind_vbo(mesh);
    backend.set_surf_flags(surf_flags);
    backend.draw_elements(ElementRange {
        first_vert: batch.first_vert,
        num_verts: batch.end_vert - batch.first_vert,
        first_elem: batch.first_elem,
        num_elems: batch.num_elems,
    });
}

/// Append the visible member surfaces of draw surface `ds` to the batch.
///
/// A surface that does not continue the open element run (or lives in a
/// different mesh) flushes first. `mergable` is false whenever backend state
/// changed since the previous record.
#[allow(clippy::too_many_arguments)]
pub fn batch_bsp_surf(
    batch: &mut BspBatch,
    scene: RenderScene<'_>,
    vis: &VisScratch,
    backend: &mut dyn RenderBackend,
    entity: &Entity,
    material: &Material,
    ds: u32,
    mergable: bool,
) {
    if !mergable {
        flush_bsp_batch(batch, scene, backend);
        backend.transform_for_entity(entity);
    }

    let Some(level) = scene.level else {
        return;
    };
    let Some(draw_surface) = level.draw_surfaces.get(ds as usize) else {
        log::warn!("batch_bsp_surf: draw surface {} out of range", ds);
        return;
    };

    if !draw_surface.instances.is_empty() {
        flush_bsp_batch(batch, scene, backend);
        backend.draw_elements_instanced(
            ElementRange {
                first_vert: draw_surface.first_vbo_vert,
                num_verts: draw_surface.num_verts,
                first_elem: draw_surface.first_vbo_elem,
                num_elems: draw_surface.num_elems,
            },
            &draw_surface.instances,
        );
        return;
    }

    for &s in &draw_surface.surfaces {
        if !vis.surf_vis.get(s as usize) {
            continue;
        }
        let Some(surf) = level.surfaces.get(s as usize) else {
            continue;
        };
        let first_vert = draw_surface.first_vbo_vert + surf.first_vert;
        let first_elem = draw_surface.first_vbo_elem + surf.first_draw_surf_elem;

        if batch.mesh != draw_surface.mesh || first_elem != batch.first_elem + batch.num_elems {
            flush_bsp_batch(batch, scene, backend);
        }

        if batch.count == 0 {
            *batch = BspBatch {
                count: 0,
                mesh: draw_surface.mesh,
                material: material.id,
                entity: *entity,
                draw_surface: ds,
                first_vert,
                end_vert: first_vert,
                first_elem,
                num_elems: 0,
            };
        }

        batch.count += 1;
        batch.first_vert = batch.first_vert.min(first_vert);
        batch.end_vert = batch.end_vert.max(first_vert + surf.num_verts);
        batch.num_elems += surf.num_elems;
    }
}

fn flush_batch(
    flush: Option<BatchFlush>,
    batch: &mut BspBatch,
    scene: RenderScene<'_>,
    backend: &mut dyn RenderBackend,
) {
    match flush {
        Some(BatchFlush::Bsp) => flush_bsp_batch(batch, scene, backend),
        Some(BatchFlush::DynamicMeshes) => backend.flush_dynamic_meshes(),
        None => {}
    }
}

fn draw_immediate(backend: &mut dyn RenderBackend, entity: &Entity, material: &Material, surf: DrawSurfRef) {
    match surf {
        DrawSurfRef::Alias(_) => backend.draw_alias_surf(entity, material, surf),
        DrawSurfRef::Gltf(_) => backend.draw_gltf_mesh(entity, material, surf),
        DrawSurfRef::Sky(_) => backend.draw_sky_mesh(entity, material, surf),
        DrawSurfRef::NullModel(_) => backend.draw_null_surf(entity, material, surf),
        DrawSurfRef::Bsp(_) | DrawSurfRef::Sprite(_) | DrawSurfRef::Poly(_) => {
            debug_assert!(false, "{:?} is batched", surf);
        }
    }
}

/// Dispatch the records of `list` that pass `filter`.
///
/// `depth_copied` is shared between passes of one view: the depth buffer is
/// copied for soft particles at most once.
pub fn draw_surfaces_filtered(
    list: &mut DrawList,
    scene: RenderScene<'_>,
    backend: &mut dyn RenderBackend,
    depth_copied: &mut bool,
    filter: &DrawPassFilter,
) {
    if list.is_empty() {
        return;
    }

    let fbo = backend.bound_framebuffer();
    let mut batch = std::mem::take(&mut list.bsp_batch);

    let mut prev_material: Option<MaterialId> = None;
    let mut prev_entity: Option<u32> = None;
    let mut prev_fx: Option<RenderFx> = None;
    let mut prev_batch = false;
    let mut batched = false;
    let mut batch_flush: Option<BatchFlush> = None;
    let mut depth_hack: Option<(f32, f32)> = None;
    let mut batch_flushed = true;
    let mut batch_opaque = false;

    for sds in list.draw_surfs() {
        let kind = sds.surf.kind();
        let sort = dist_key_sort(sds.dist_key);
        if filter.skips(kind, sort) {
            continue;
        }
        if sort > filter.max_sort {
            break;
        }

        let (material_id, entity_num) = unpack_sort_key(sds.sort_key);
        let (Some(entity), Some(material)) = (
            scene.frame.entities.get(entity_num as usize),
            scene.materials.get(material_id),
        ) else {
            log::warn!("draw list record {:?} has a stale entity or material", sds.surf);
            continue;
        };
        let depth_write = material.depth_write();
        let mut mergable = true;
        batched = kind.is_batchable();

        if !prev_batch
            || !batched
            || prev_material != Some(material_id)
            || (prev_entity != Some(entity_num) && !material.flags.contains(MaterialFlags::ENTITY_MERGABLE))
            || prev_fx != Some(entity.renderfx)
        {
            mergable = false;

            // keep the view model from poking into walls
            if entity.renderfx.contains(RenderFx::WEAPONMODEL) {
                if depth_hack.is_none() {
                    flush_batch(batch_flush, &mut batch, scene, backend);
                    batch_flushed = true;
                    let (min, max) = backend.depth_range();
                    depth_hack = Some((min, max));
                    backend.set_depth_range(min, min + WEAPON_DEPTH_FRACTION * (max - min));
                }
            } else if let Some((min, max)) = depth_hack.take() {
                flush_batch(batch_flush, &mut batch, scene, backend);
                batch_flushed = true;
                backend.set_depth_range(min, max);
            }

            if (prev_batch && !batched) || batch_flush != kind.batch_flush() {
                flush_batch(batch_flush, &mut batch, scene, backend);
                batch_flushed = true;
            }
            if batch_flushed {
                batch_opaque = false;
            }

            if !depth_write && !*depth_copied && material.depth_read() {
                if scene.frame.render_flags.contains(RenderFlags::SOFT_PARTICLES) {
                    let bound = backend.bound_framebuffer();
                    if backend.framebuffer_has_depth(bound) && backend.has_screen_depth_copy() {
                        // depth writers still in the batch must land first
                        if batch_opaque {
                            batch_opaque = false;
                            flush_batch(batch_flush, &mut batch, scene, backend);
                            batch_flushed = true;
                        }
                        backend.copy_depth_to_screen_texture(bound);
                    }
                }
                *depth_copied = true;
            }

            if batched {
                if !prev_batch || batch_flush != kind.batch_flush() {
                    backend.load_identity_object_matrix();
                }
            } else if prev_entity != Some(entity_num) || prev_batch != batched {
                if material.flags.contains(MaterialFlags::AUTOSPRITE) {
                    backend.translate_for_entity(entity);
                } else {
                    backend.transform_for_entity(entity);
                }
            }

            if !batched {
                backend.bind_shader(entity, material);
                batch_flush = None;
                draw_immediate(backend, entity, material, sds.surf);
            }

            prev_material = Some(material_id);
            prev_entity = Some(entity_num);
            prev_batch = batched;
            prev_fx = Some(entity.renderfx);
        }

        if batched {
            batch_flush = kind.batch_flush();
            match sds.surf {
                DrawSurfRef::Bsp(ds) => batch_bsp_surf(
                    &mut batch,
                    scene,
                    &list.vis,
                    backend,
                    entity,
                    material,
                    ds,
                    mergable,
                ),
                DrawSurfRef::Sprite(_) => backend.batch_sprite_surf(entity, material, sds.surf, mergable),
                DrawSurfRef::Poly(_) => backend.batch_poly_surf(entity, material, sds.surf, mergable),
                _ => {}
            }
            batch_flushed = false;
            if depth_write {
                batch_opaque = true;
            }
        }
    }

    if batched {
        flush_batch(batch_flush, &mut batch, scene, backend);
    }
    if let Some((min, max)) = depth_hack {
        backend.set_depth_range(min, max);
    }
    backend.bind_framebuffer(fbo);

    list.bsp_batch = batch;
}

/// Draw the whole list, unless triangle outlines are on.
pub fn draw_surfaces(list: &mut DrawList, scene: RenderScene<'_>, backend: &mut dyn RenderBackend) {
    let mut depth_copied = false;
    let outlines = backend.enable_triangle_outlines(false);
    if !outlines {
        draw_surfaces_filtered(list, scene, backend, &mut depth_copied, &DrawPassFilter::default());
    }
    backend.enable_triangle_outlines(outlines);
}

/// Draw the whole list as triangle outlines. Calls may nest.
pub fn draw_outlined_surfaces(list: &mut DrawList, scene: RenderScene<'_>, backend: &mut dyn RenderBackend) {
    let mut depth_copied = false;
    let outlines = backend.enable_triangle_outlines(true);
    draw_surfaces_filtered(list, scene, backend, &mut depth_copied, &DrawPassFilter::default());
    backend.enable_triangle_outlines(outlines);
}

/// Call `f(entity, material, draw_surface, surface)` for every visible
/// surface behind the list's BSP records.
pub fn walk_draw_list(
    list: &DrawList,
    scene: RenderScene<'_>,
    f: &mut dyn FnMut(&Entity, &Material, u32, u32),
) {
    let Some(level) = scene.level else {
        return;
    };

    for sds in list.draw_surfs() {
        if !sds.surf.kind().supports_walk() {
            continue;
        }
        let DrawSurfRef::Bsp(ds) = sds.surf else {
            continue;
        };
        let (material_id, entity_num) = unpack_sort_key(sds.sort_key);
        let (Some(entity), Some(material), Some(draw_surface)) = (
            scene.frame.entities.get(entity_num as usize),
            scene.materials.get(material_id),
            level.draw_surfaces.get(ds as usize),
        ) else {
            continue;
        };

        for &s in &draw_surface.surfaces {
            if list.vis.surf_vis.get(s as usize) {
                f(entity, material, ds, s);
            }
        }
    }
}
