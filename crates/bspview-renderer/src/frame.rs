//! Per-view frame state: view setup, PVS row, frustum, entities and stats.

use std::time::Duration;

use bspview_common::q_shared::*;

use crate::frustum::{Frustum, CLIP_SIDES, Z_BIAS, Z_NEAR};
use crate::level::{BrushModel, Level};
use crate::material::MaterialRegistry;
use crate::render_config::RendererConfig;

bitflags::bitflags! {
    /// Per-entity render effects.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RenderFx: u32 {
        /// First-person weapon: drawn with a compressed depth range.
        const WEAPONMODEL = 0x1;
        /// Force the additive sort class.
        const ALPHAHACK   = 0x2;
    }
}

bitflags::bitflags! {
    /// Per-view render flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct RenderFlags: u32 {
        const SOFT_PARTICLES = 0x1;
        const NO_WORLD_MODEL = 0x2;
        const WORLD_OUTLINES = 0x4;
    }
}

/// Most entities a sort key can address.
pub const MAX_ENTITIES: usize = 0x1000;

/// Entity slot of the world.
pub const WORLD_ENTITY: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entity {
    /// Index into the level's brush models, if this is a brush entity.
    pub model: Option<u32>,
    pub origin: Vec3,
    pub axis: [Vec3; 3],
    pub scale: f32,
    pub renderfx: RenderFx,
    pub outline_height: f32,
}

impl Default for Entity {
    fn default() -> Self {
        Self::world()
    }
}

impl Entity {
    pub fn world() -> Self {
        Self {
            model: Some(0),
            origin: VEC3_ORIGIN,
            axis: AXIS_IDENTITY,
            scale: 1.0,
            renderfx: RenderFx::empty(),
            outline_height: 0.0,
        }
    }

    /// An entity with no model, placed at `origin`.
    pub fn at(origin: Vec3) -> Self {
        Self {
            model: None,
            origin,
            ..Self::world()
        }
    }

    /// An inline brush sub-model entity.
    pub fn brush(model: u32, origin: Vec3) -> Self {
        Self {
            model: Some(model),
            origin,
            ..Self::world()
        }
    }

    pub fn brush_model<'a>(&self, level: &'a Level) -> Option<&'a BrushModel> {
        self.model.and_then(|m| level.models.get(m as usize))
    }

    pub fn is_rotated(&self) -> bool {
        self.axis != AXIS_IDENTITY
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    pub world_draw_surfs: u32,
    pub brush_polys: u32,
    pub world_leafs: u32,
    pub cull_leaves_time: Duration,
    pub cull_surfaces_time: Duration,
    pub world_node_time: Duration,
}

#[derive(Debug, Clone)]
pub struct FrameState {
    /// Advanced by every `setup_view`; starts above the zeroed stamps.
    pub frame_count: u32,

    pub view_origin: Vec3,
    /// forward, right, up
    pub view_axis: [Vec3; 3],
    pub fov_x: f32,
    pub fov_y: f32,
    pub frustum: Frustum,
    pub clip_flags: u32,
    pub no_cull: bool,

    /// Cluster of the view leaf, -1 when outside the map.
    pub view_cluster: i32,
    pvs_locked: bool,
    /// Area visibility bits from the game; `None` accepts every area.
    pub area_bits: Option<Vec<u8>>,
    /// PVS row of the view cluster; `None` accepts every cluster.
    pub pvs: Option<Vec<u8>>,
    pub render_flags: RenderFlags,

    pub far_clip: f32,
    pub vis_mins: Vec3,
    pub vis_maxs: Vec3,
    pub pvs_mins: Vec3,
    pub pvs_maxs: Vec3,

    pub stats: FrameStats,
    /// Entity 0 is the world.
    pub entities: Vec<Entity>,
    /// Leaf bounds collected when leaf debugging is on.
    pub debug_bounds: Vec<(Vec3, Vec3)>,
}

impl Default for FrameState {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameState {
    pub fn new() -> Self {
        Self {
            frame_count: 1,
            view_origin: VEC3_ORIGIN,
            view_axis: AXIS_IDENTITY,
            fov_x: 90.0,
            fov_y: 90.0,
            frustum: Frustum::default(),
            clip_flags: CLIP_SIDES,
            no_cull: false,
            view_cluster: -1,
            pvs_locked: false,
            area_bits: None,
            pvs: None,
            render_flags: RenderFlags::empty(),
            far_clip: Z_NEAR + Z_BIAS,
            vis_mins: VEC3_ORIGIN,
            vis_maxs: VEC3_ORIGIN,
            pvs_mins: VEC3_ORIGIN,
            pvs_maxs: VEC3_ORIGIN,
            stats: FrameStats::default(),
            entities: vec![Entity::world()],
            debug_bounds: Vec::new(),
        }
    }

    /// Start a new frame viewed from `origin` at `angles` (pitch, yaw, roll).
    pub fn setup_view(
        &mut self,
        level: Option<&Level>,
        config: &RendererConfig,
        origin: Vec3,
        angles: Vec3,
        fov_x: f32,
        fov_y: f32,
    ) {
        self.frame_count = self.frame_count.wrapping_add(1).max(1);
        self.stats = FrameStats::default();
        self.debug_bounds.clear();

        let (forward, right, up) = angle_vectors(&angles);
        self.view_origin = origin;
        self.view_axis = [forward, right, up];
        self.fov_x = fov_x;
        self.fov_y = fov_y;
        self.frustum = Frustum::from_view(&origin, &forward, &right, &up, fov_x, fov_y);
        self.clip_flags = CLIP_SIDES;
        self.no_cull = config.no_cull;
        self.render_flags.set(RenderFlags::SOFT_PARTICLES, config.soft_particles);

        self.vis_mins = origin;
        self.vis_maxs = origin;
        self.pvs_mins = origin;
        self.pvs_maxs = origin;

        let Some(level) = level else {
            self.view_cluster = -1;
            self.pvs = None;
            self.pvs_locked = false;
            return;
        };
        if self.render_flags.contains(RenderFlags::NO_WORLD_MODEL) {
            return;
        }
        if config.lock_pvs && self.pvs_locked {
            return;
        }

        self.view_cluster = level.point_cluster(&origin);
        self.pvs = if config.novis {
            None
        } else {
            level.cluster_pvs(self.view_cluster).map(<[u8]>::to_vec)
        };
        self.pvs_locked = config.lock_pvs;
    }

    /// Box test against the frustum planes in `clip_flags`, unless culling is off.
    #[inline]
    pub fn cull_box(&self, mins: &Vec3, maxs: &Vec3, clip_flags: u32) -> bool {
        !self.no_cull && self.frustum.cull_box(mins, maxs, clip_flags)
    }

    /// Append an entity and return its slot, or `None` when the table is full.
    pub fn add_entity(&mut self, entity: Entity) -> Option<u32> {
        if self.entities.len() >= MAX_ENTITIES {
            log::warn!("entity table full, dropping entity at {:?}", entity.origin);
            return None;
        }
        self.entities.push(entity);
        Some(self.entities.len() as u32 - 1)
    }

    /// Drop everything but the world entity.
    pub fn clear_entities(&mut self) {
        self.entities.truncate(1);
    }
}

/// What the dispatcher reads while issuing draw calls.
#[derive(Clone, Copy)]
pub struct RenderScene<'a> {
    pub level: Option<&'a Level>,
    pub materials: &'a MaterialRegistry,
    pub frame: &'a FrameState,
}

impl<'a> RenderScene<'a> {
    pub fn new(level: Option<&'a Level>, materials: &'a MaterialRegistry, frame: &'a FrameState) -> Self {
        Self { level, materials, frame }
    }
}
