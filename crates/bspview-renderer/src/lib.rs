#![allow(clippy::needless_range_loop, clippy::too_many_arguments, clippy::manual_range_contains)]
// BSP level compiler and per-frame draw list pipeline

// Level building
pub mod backend;
pub mod bsp_format;
pub mod brush_hull;
pub mod patch;
pub mod material;
pub mod level;
pub mod map_compiler;
pub mod loader;

// Per-frame pipeline
pub mod render_config;
pub mod frustum;
pub mod frame;
pub mod vis_scratch;
pub mod draw_list;
pub mod world_cull;
pub mod dispatch;

#[cfg(test)]
mod test_support;

pub use dispatch::{draw_outlined_surfaces, draw_surfaces, walk_draw_list, DrawPassFilter};
pub use draw_list::{DrawList, DrawSurfRef, SurfaceKind};
pub use frame::{Entity, FrameState, RenderScene};
pub use level::Level;
pub use loader::{LevelSlot, LoadEvent, LoadedMap, MapLoader};
pub use map_compiler::{compile_bytes, compile_map, CompileOptions};
pub use material::{Material, MaterialRegistry};
pub use render_config::RendererConfig;
