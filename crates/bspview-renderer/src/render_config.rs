//! Renderer settings.
//!
//! Plain values with defaults; cvar-style text overrides go through
//! `apply_setting` / `apply_script`.

use bspview_common::q_shared::{atof, com_parse};

use crate::map_compiler::CompileOptions;
use crate::patch::DEFAULT_MAX_ERROR;

#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// `r_drawworld`
    pub draw_world: bool,
    /// `r_novis`: ignore the PVS.
    pub novis: bool,
    /// `r_lockpvs`: keep the view cluster and PVS row of the last unlocked frame.
    pub lock_pvs: bool,
    /// `r_nocull`: disable surface box culling.
    pub no_cull: bool,
    /// `r_patch_max_error`, in world units. Applies to the next map load.
    pub patch_max_error: f32,
    /// `r_soft_particles`
    pub soft_particles: bool,
    /// `r_speeds`: time the world culling stages.
    pub speeds: bool,
    /// `r_leafvis`: collect the bounds of visible leaves for debug drawing.
    pub leaf_vis_debug: bool,
    /// `r_outlines_world`
    pub outlines_world: f32,
    /// `r_outlines_scale`
    pub outlines_scale: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            draw_world: true,
            novis: false,
            lock_pvs: false,
            no_cull: false,
            patch_max_error: DEFAULT_MAX_ERROR,
            soft_particles: true,
            speeds: false,
            leaf_vis_debug: false,
            outlines_world: 1.8,
            outlines_scale: 1.0,
        }
    }
}

fn parse_bool(value: &str) -> bool {
    atof(value) != 0.0
}

impl RendererConfig {
    /// Apply one `name value` override. Unknown names are reported and ignored.
    pub fn apply_setting(&mut self, name: &str, value: &str) -> bool {
        match name.to_ascii_lowercase().as_str() {
            "r_drawworld" => self.draw_world = parse_bool(value),
            "r_novis" => self.novis = parse_bool(value),
            "r_lockpvs" => self.lock_pvs = parse_bool(value),
            "r_nocull" => self.no_cull = parse_bool(value),
            "r_patch_max_error" => {
                let v = atof(value);
                if v <= 0.0 {
                    log::warn!("r_patch_max_error {} is not positive, keeping {}", value, self.patch_max_error);
                    return false;
                }
                self.patch_max_error = v;
            }
            "r_soft_particles" => self.soft_particles = parse_bool(value),
            "r_speeds" => self.speeds = parse_bool(value),
            "r_leafvis" => self.leaf_vis_debug = parse_bool(value),
            "r_outlines_world" => self.outlines_world = atof(value),
            "r_outlines_scale" => self.outlines_scale = atof(value),
            _ => {
                log::warn!("unknown renderer setting \"{}\"", name);
                return false;
            }
        }
        log::debug!("{} = {}", name, value);
        true
    }

    /// Apply whitespace separated `name value` pairs, returning how many took.
    /// `//` comments and quoted values are allowed.
    pub fn apply_script(&mut self, text: &str) -> usize {
        let mut applied = 0;
        let mut cursor = Some(text);

        while let Some(rest) = cursor {
            let (name, rest) = com_parse(rest);
            if name.is_empty() {
                break;
            }
            let Some(rest) = rest else {
                log::warn!("renderer setting \"{}\" has no value", name);
                break;
            };
            let (value, rest) = com_parse(rest);
            if self.apply_setting(&name, &value) {
                applied += 1;
            }
            cursor = rest;
        }

        applied
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            patch_max_error: self.patch_max_error,
        }
    }
}
