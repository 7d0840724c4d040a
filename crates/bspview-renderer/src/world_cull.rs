//! World visibility: leaves through the PVS and frustum, then surfaces, then
//! the draw surfaces that own them.

use std::time::Instant;

use bspview_common::q_shared::*;

use crate::draw_list::{DrawList, DrawSurfRef, WORLDSURF_DIST};
use crate::frame::{Entity, FrameState, RenderFlags, WORLD_ENTITY};
use crate::frustum::{Z_BIAS, Z_NEAR};
use crate::level::{BrushModel, Level};
use crate::material::MaterialRegistry;
use crate::render_config::RendererConfig;
use crate::vis_scratch::VisScratch;

#[inline]
fn bit_set(bits: &[u8], n: i32) -> bool {
    n >= 0 && bits.get((n >> 3) as usize).is_some_and(|b| b & (1 << (n & 7)) != 0)
}

fn grow_bounds(mins: &mut Vec3, maxs: &mut Vec3, add_mins: &Vec3, add_maxs: &Vec3) {
    for j in 0..3 {
        mins[j] = mins[j].min(add_mins[j]);
        maxs[j] = maxs[j].max(add_maxs[j]);
    }
}

/// Mark the surfaces of leaves that pass the area, PVS and frustum tests.
///
/// Leaves entirely inside the frustum mark their surfaces fully visible;
/// straddling leaves mark them for a per-surface box test.
pub fn cull_leaves(
    level: &Level,
    frame: &mut FrameState,
    vis: &mut VisScratch,
    first_leaf: usize,
    num_leaves: usize,
    clip_flags: u32,
) {
    for l in first_leaf..first_leaf + num_leaves {
        let Some(leaf) = level.leaves.get(l) else {
            debug_assert!(false, "leaf {} out of range", l);
            log::error!("cull_leaves: leaf {} out of range {}", l, level.leaves.len());
            continue;
        };
        if leaf.cluster < 0 || leaf.vis_surfaces.is_empty() {
            continue;
        }

        // door connected areas
        if let Some(area_bits) = &frame.area_bits {
            if !bit_set(area_bits, leaf.area) {
                continue;
            }
        }
        if let Some(pvs) = &frame.pvs {
            if !bit_set(pvs, leaf.cluster) {
                continue;
            }
        }

        grow_bounds(&mut frame.pvs_mins, &mut frame.pvs_maxs, &leaf.mins, &leaf.maxs);

        let mut clipped = 0;
        let mut test_flags = clip_flags;
        for (i, plane) in frame.frustum.planes.iter().enumerate() {
            let bit = 1 << i;
            if test_flags & bit == 0 {
                continue;
            }
            clipped = box_on_plane_side(&leaf.mins, &leaf.maxs, plane);
            if clipped == 2 {
                break;
            }
            if clipped == 1 {
                test_flags &= !bit;
            }
        }
        if clipped == 2 {
            continue;
        }

        let target = if test_flags == 0 {
            &mut vis.surf_full_vis
        } else {
            &mut vis.surf_vis
        };
        for &s in &leaf.vis_surfaces {
            target.set(s as usize, true);
        }
        vis.leaf_vis.set(l, true);
    }
}

/// Resolve surface visibility and mark the draw surfaces of visible surfaces.
pub fn cull_surfaces(
    level: &Level,
    frame: &mut FrameState,
    vis: &mut VisScratch,
    first_surface: usize,
    num_surfaces: usize,
    clip_flags: u32,
) {
    for i in first_surface..first_surface + num_surfaces {
        let Some(surf) = level.surfaces.get(i) else {
            debug_assert!(false, "surface {} out of range", i);
            log::error!("cull_surfaces: surface {} out of range {}", i, level.surfaces.len());
            continue;
        };

        let Some(ds) = surf.draw_surface else {
            vis.surf_vis.set(i, false);
            vis.surf_full_vis.set(i, false);
            continue;
        };

        if vis.surf_vis.get(i) {
            // partly visible in at least one leaf
            if frame.cull_box(&surf.mins, &surf.maxs, clip_flags) {
                vis.surf_vis.set(i, false);
            }
            vis.surf_full_vis.set(i, false);
        } else if vis.surf_full_vis.get(i) {
            vis.surf_vis.set(i, true);
        }

        if vis.surf_vis.get(i) {
            vis.draw_surf_vis.set(ds as usize, true);
            frame.stats.brush_polys += 1;
        }
    }
}

/// Farthest corner of the visible bounds from the view origin.
pub fn vis_far_clip(vis_mins: &Vec3, vis_maxs: &Vec3, view_origin: &Vec3) -> f32 {
    let mut far = 0.0f32;
    for i in 0..8 {
        let corner = [
            if i & 1 != 0 { vis_mins[0] } else { vis_maxs[0] },
            if i & 2 != 0 { vis_mins[1] } else { vis_maxs[1] },
            if i & 4 != 0 { vis_mins[2] } else { vis_maxs[2] },
        ];
        far = far.max(distance_squared(&corner, view_origin));
    }
    far.sqrt()
}

/// Count visible leaves, grow the view bounds by them and set the far clip.
pub fn post_cull_vis_leaves(level: &Level, frame: &mut FrameState, vis: &VisScratch, config: &RendererConfig) {
    for (i, leaf) in level.leaves.iter().enumerate() {
        if !vis.leaf_vis.get(i) {
            continue;
        }
        frame.stats.world_leafs += 1;
        if config.leaf_vis_debug {
            frame.debug_bounds.push((leaf.mins, leaf.maxs));
        }
        grow_bounds(&mut frame.vis_mins, &mut frame.vis_maxs, &leaf.mins, &leaf.maxs);
    }

    let far = vis_far_clip(&frame.vis_mins, &frame.vis_maxs, &frame.view_origin);
    frame.far_clip = far.max(Z_NEAR) + Z_BIAS;

    let [forward, _, _] = frame.view_axis;
    let origin = frame.view_origin;
    frame.frustum.set_far_clip(&origin, &forward, frame.far_clip);
}

/// Append draw surface `ds` for `entity_num`, at most once per frame.
///
/// Returns false when the draw surface has nothing to draw or its key culls it.
pub fn add_world_draw_surface(
    level: &Level,
    materials: &MaterialRegistry,
    frame: &mut FrameState,
    list: &mut DrawList,
    entity_num: u32,
    ds: usize,
) -> bool {
    let Some(draw_surface) = level.draw_surfaces.get(ds) else {
        return false;
    };
    if draw_surface.mesh.is_none() {
        return false;
    }
    if list.vis.draw_surf_frames.get(ds) == Some(&frame.frame_count) {
        return true;
    }
    let Some(material) = materials.get(draw_surface.material) else {
        return false;
    };
    let Some(entity) = frame.entities.get(entity_num as usize).copied() else {
        return false;
    };

    if let Some(stamp) = list.vis.draw_surf_frames.get_mut(ds) {
        *stamp = frame.frame_count;
    }
    if list
        .add_surface(&entity, entity_num, material, WORLDSURF_DIST, material.pack_order(), DrawSurfRef::Bsp(ds as u32))
        .is_none()
    {
        return false;
    }

    frame.stats.world_draw_surfs += 1;
    true
}

/// Cull the world model and add its visible draw surfaces to `list`.
pub fn draw_world_node(
    level: &Level,
    materials: &MaterialRegistry,
    frame: &mut FrameState,
    list: &mut DrawList,
    config: &RendererConfig,
) {
    list.reserve_world_surfaces(level);

    if !config.draw_world {
        return;
    }
    let Some(world) = level.world() else {
        return;
    };
    if frame.render_flags.contains(RenderFlags::NO_WORLD_MODEL) {
        return;
    }

    let outlines = frame.render_flags.contains(RenderFlags::WORLD_OUTLINES)
        && frame.view_cluster != -1
        && config.outlines_scale > 0.0;
    if let Some(world_entity) = frame.entities.get_mut(WORLD_ENTITY as usize) {
        world_entity.outline_height = if outlines { config.outlines_world.max(0.0) } else { 0.0 };
    }

    let start = config.speeds.then(Instant::now);

    let origin = frame.view_origin;
    frame.vis_mins = origin;
    frame.vis_maxs = origin;
    frame.pvs_mins = origin;
    frame.pvs_maxs = origin;

    let stage = Instant::now();
    let num_leaves = level.leaves.len();
    let num_surfaces = level.surfaces.len();
    if num_leaves <= num_surfaces {
        let clip_flags = frame.clip_flags;
        cull_leaves(level, frame, &mut list.vis, 0, num_leaves, clip_flags);
    } else {
        // more leaves than surfaces: box testing every surface is cheaper
        list.vis.surf_vis.fill_range(0, num_surfaces, true);
        list.vis.surf_full_vis.fill_range(0, num_surfaces, false);
        list.vis.leaf_vis.fill_range(0, num_leaves, true);
        list.vis.draw_surf_vis.fill_range(0, level.draw_surfaces.len(), false);
    }
    if config.speeds {
        frame.stats.cull_leaves_time += stage.elapsed();
    }

    let stage = Instant::now();
    let clip_flags = frame.clip_flags;
    cull_surfaces(
        level,
        frame,
        &mut list.vis,
        world.first_surface as usize,
        world.num_surfaces as usize,
        clip_flags,
    );
    post_cull_vis_leaves(level, frame, &list.vis, config);
    if config.speeds {
        frame.stats.cull_surfaces_time += stage.elapsed();
    }

    for ds in world.draw_surfaces() {
        if list.vis.draw_surf_vis.get(ds) {
            add_world_draw_surface(level, materials, frame, list, WORLD_ENTITY, ds);
        }
    }

    if let Some(start) = start {
        frame.stats.world_node_time += start.elapsed();
        log::debug!(
            "world node: {} leafs, {} polys, {} draw surfs; leaves {:?}, surfaces {:?}, total {:?}",
            frame.stats.world_leafs,
            frame.stats.brush_polys,
            frame.stats.world_draw_surfs,
            frame.stats.cull_leaves_time,
            frame.stats.cull_surfaces_time,
            frame.stats.world_node_time,
        );
    }
}

/// World-space bounds of a brush entity: `(mins, maxs, radius, rotated)`.
///
/// Rotated entities get a cube of the model's scaled radius.
pub fn brush_model_bbox(entity: &Entity, model: &BrushModel) -> (Vec3, Vec3, f32, bool) {
    let radius = model.radius * entity.scale;
    if entity.is_rotated() {
        let mut mins = [0.0; 3];
        let mut maxs = [0.0; 3];
        for i in 0..3 {
            mins[i] = entity.origin[i] - radius;
            maxs[i] = entity.origin[i] + radius;
        }
        (mins, maxs, radius, true)
    } else {
        (
            vector_ma(&entity.origin, entity.scale, &model.mins),
            vector_ma(&entity.origin, entity.scale, &model.maxs),
            radius,
            false,
        )
    }
}

/// Mark a brush entity's surfaces visible and add its draw surfaces.
///
/// Returns false when the entity has no brush model or nothing to draw.
pub fn add_brush_model_to_draw_list(
    level: &Level,
    materials: &MaterialRegistry,
    frame: &mut FrameState,
    list: &mut DrawList,
    entity_num: u32,
) -> bool {
    let Some(entity) = frame.entities.get(entity_num as usize).copied() else {
        return false;
    };
    let Some(model) = entity.brush_model(level) else {
        return false;
    };
    if model.num_draw_surfaces == 0 {
        return false;
    }

    list.reserve_world_surfaces(level);

    let mut num_vis_surfaces = 0;
    for s in model.surfaces() {
        let Some(ds) = level.surfaces.get(s).and_then(|surf| surf.draw_surface) else {
            continue;
        };
        list.vis.surf_vis.set(s, true);
        list.vis.draw_surf_vis.set(ds as usize, true);
        num_vis_surfaces += 1;
    }
    if num_vis_surfaces == 0 {
        return false;
    }

    for ds in model.draw_surfaces() {
        if list.vis.draw_surf_vis.get(ds) {
            add_world_draw_surface(level, materials, frame, list, entity_num, ds);
        }
    }

    let (mins, maxs, _, _) = brush_model_bbox(&entity, model);
    grow_bounds(&mut frame.vis_mins, &mut frame.vis_maxs, &mins, &maxs);
    true
}
