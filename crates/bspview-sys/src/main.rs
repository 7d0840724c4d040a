// main.rs — mapinfo: compile a map and run one culled frame against it
//
// Usage: mapinfo <map.bsp> [-c settings.cfg] [-s name value]... [-o x y z] [-a pitch yaw roll]
//
// The backends here only count what they are asked to do; the point is to
// exercise the compiler and the per-frame pipeline from the command line.

use std::error::Error;
use std::process::ExitCode;

use bspview_common::q_shared::{atof, Vec3};
use bspview_common::qfiles::SurfFlags;
use bspview_renderer::backend::*;
use bspview_renderer::draw_list::DrawSurfRef;
use bspview_renderer::level::Instance;
use bspview_renderer::world_cull::{add_brush_model_to_draw_list, draw_world_node};
use bspview_renderer::{
    compile_map, draw_surfaces, DrawList, Entity, FrameState, Material, MaterialRegistry, RenderScene,
    RendererConfig,
};

#[derive(Debug, Default)]
struct CountingGpu {
    vertex_bytes: usize,
    index_bytes: usize,
    meshes: u32,
}

impl GpuBackend for CountingGpu {
    fn new_vertex_buffer(&mut self, data: &[u8]) -> VertexBufferHandle {
        self.vertex_bytes += data.len();
        VertexBufferHandle(self.meshes)
    }

    fn new_index_buffer(&mut self, data: &[u8]) -> IndexBufferHandle {
        self.index_bytes += data.len();
        IndexBufferHandle(self.meshes)
    }

    fn new_mesh(&mut self, config: &MeshConfig) -> MeshHandle {
        log::trace!("mesh {}: {} indices", self.meshes, config.num_indices);
        self.meshes += 1;
        MeshHandle(self.meshes - 1)
    }

    fn destroy_vertex_buffer(&mut self, _buffer: VertexBufferHandle) {}

    fn destroy_index_buffer(&mut self, _buffer: IndexBufferHandle) {}
}

#[derive(Debug, Default)]
struct CountingPhysics {
    convex_meshes: u32,
    shapes: u32,
}

impl PhysicsBackend for CountingPhysics {
    fn cook_convex_mesh(&mut self, points: &[Vec3]) -> Result<ConvexMeshHandle, CookError> {
        if points.len() < 4 {
            return Err(CookError(format!("{} points", points.len())));
        }
        self.convex_meshes += 1;
        Ok(ConvexMeshHandle(self.convex_meshes - 1))
    }

    fn create_shape(&mut self, _mesh: ConvexMeshHandle) -> ShapeHandle {
        self.shapes += 1;
        ShapeHandle(self.shapes - 1)
    }
}

#[derive(Debug)]
struct CountingRenderer {
    depth: (f32, f32),
    outlines: bool,
    framebuffer: FramebufferHandle,
    draws: u32,
    elements: u64,
    instanced: u32,
    shader_binds: u32,
    immediate: u32,
    batched_dynamic: u32,
}

impl Default for CountingRenderer {
    fn default() -> Self {
        Self {
            depth: (0.0, 1.0),
            outlines: false,
            framebuffer: FramebufferHandle(0),
            draws: 0,
            elements: 0,
            instanced: 0,
            shader_binds: 0,
            immediate: 0,
            batched_dynamic: 0,
        }
    }
}

impl RenderBackend for CountingRenderer {
    fn bound_framebuffer(&self) -> FramebufferHandle {
        self.framebuffer
    }

    fn bind_framebuffer(&mut self, fbo: FramebufferHandle) {
        self.framebuffer = fbo;
    }

    fn framebuffer_has_depth(&self, _fbo: FramebufferHandle) -> bool {
        true
    }

    fn has_screen_depth_copy(&self) -> bool {
        false
    }

    fn copy_depth_to_screen_texture(&mut self, _fbo: FramebufferHandle) {}

    fn enable_triangle_outlines(&mut self, enable: bool) -> bool {
        std::mem::replace(&mut self.outlines, enable)
    }

    fn depth_range(&self) -> (f32, f32) {
        self.depth
    }

    fn set_depth_range(&mut self, min: f32, max: f32) {
        self.depth = (min, max);
    }

    fn load_identity_object_matrix(&mut self) {}

    fn transform_for_entity(&mut self, _entity: &Entity) {}

    fn translate_for_entity(&mut self, _entity: &Entity) {}

    fn bind_shader(&mut self, _entity: &Entity, material: &Material) {
        log::trace!("bind {}", material.name);
        self.shader_binds += 1;
    }

    fn bind_vbo(&mut self, _mesh: MeshHandle) {}

    fn set_surf_flags(&mut self, _flags: SurfFlags) {}

    fn draw_elements(&mut self, range: ElementRange) {
        self.draws += 1;
        self.elements += range.num_elems as u64;
    }

    fn draw_elements_instanced(&mut self, range: ElementRange, instances: &[Instance]) {
        self.instanced += 1;
        self.elements += range.num_elems as u64 * instances.len() as u64;
    }

    fn batch_sprite_surf(&mut self, _entity: &Entity, _material: &Material, _surf: DrawSurfRef, _mergable: bool) {
        self.batched_dynamic += 1;
    }

    fn batch_poly_surf(&mut self, _entity: &Entity, _material: &Material, _surf: DrawSurfRef, _mergable: bool) {
        self.batched_dynamic += 1;
    }

    fn flush_dynamic_meshes(&mut self) {}

    fn draw_alias_surf(&mut self, _entity: &Entity, _material: &Material, _surf: DrawSurfRef) {
        self.immediate += 1;
    }

    fn draw_gltf_mesh(&mut self, _entity: &Entity, _material: &Material, _surf: DrawSurfRef) {
        self.immediate += 1;
    }

    fn draw_sky_mesh(&mut self, _entity: &Entity, _material: &Material, _surf: DrawSurfRef) {
        self.immediate += 1;
    }

    fn draw_null_surf(&mut self, _entity: &Entity, _material: &Material, _surf: DrawSurfRef) {
        self.immediate += 1;
    }
}

struct Args {
    map: String,
    config: RendererConfig,
    origin: Option<Vec3>,
    angles: Vec3,
}

fn take_vec3(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<Vec3, String> {
    let mut v = [0.0; 3];
    for c in v.iter_mut() {
        *c = atof(&args.next().ok_or_else(|| format!("{} needs three numbers", flag))?);
    }
    Ok(v)
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let mut map = None;
    let mut config = RendererConfig::default();
    let mut origin = None;
    let mut angles = [0.0; 3];

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" => {
                let path = args.next().ok_or("-c needs a file")?;
                let text = std::fs::read_to_string(&path).map_err(|e| format!("{}: {}", path, e))?;
                let applied = config.apply_script(&text);
                log::info!("{}: {} settings applied", path, applied);
            }
            "-s" => {
                let name = args.next().ok_or("-s needs a name and a value")?;
                let value = args.next().ok_or("-s needs a name and a value")?;
                config.apply_setting(&name, &value);
            }
            "-o" => origin = Some(take_vec3(&mut args, "-o")?),
            "-a" => angles = take_vec3(&mut args, "-a")?,
            _ if map.is_none() => map = Some(arg.clone()),
            _ => return Err(format!("unexpected argument \"{}\"", arg)),
        }
    }

    Ok(Args {
        map: map.ok_or("usage: mapinfo <map.bsp> [-c file] [-s name value] [-o x y z] [-a pitch yaw roll]")?,
        config,
        origin,
        angles,
    })
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let mut materials = MaterialRegistry::new();
    let mut gpu = CountingGpu::default();
    let mut physics = CountingPhysics::default();

    let level = compile_map(&args.map, &mut materials, &mut gpu, &mut physics, &args.config.compile_options())?;
    println!(
        "{}: {} models, {} surfaces, {} draw surfaces, {} leaves, {} clusters, {} materials",
        level.name,
        level.num_models(),
        level.surfaces.len(),
        level.draw_surfaces.len(),
        level.leaves.len(),
        level.num_clusters,
        materials.len(),
    );
    println!(
        "upload: {} vertex bytes, {} index bytes, {} meshes; collision: {} shapes",
        gpu.vertex_bytes, gpu.index_bytes, gpu.meshes, physics.shapes
    );

    // default to the middle of the world
    let origin = args.origin.unwrap_or_else(|| match level.world() {
        Some(world) => std::array::from_fn(|i| (world.mins[i] + world.maxs[i]) * 0.5),
        None => [0.0; 3],
    });

    let mut frame = FrameState::new();
    frame.setup_view(Some(&level), &args.config, origin, args.angles, 90.0, 73.74);

    let mut list = DrawList::new();
    list.clear(Some(&level));
    draw_world_node(&level, &materials, &mut frame, &mut list, &args.config);

    for model in 1..level.num_models() as u32 {
        let Some(entity) = frame.add_entity(Entity::brush(model, [0.0; 3])) else {
            break;
        };
        add_brush_model_to_draw_list(&level, &materials, &mut frame, &mut list, entity);
    }
    list.sort();

    let mut renderer = CountingRenderer::default();
    draw_surfaces(&mut list, RenderScene::new(Some(&level), &materials, &frame), &mut renderer);

    println!(
        "view {:?} cluster {}: {} leafs, {} polys, {} world draw surfs, far clip {:.1}",
        origin,
        frame.view_cluster,
        frame.stats.world_leafs,
        frame.stats.brush_polys,
        frame.stats.world_draw_surfs,
        frame.far_clip,
    );
    println!(
        "dispatch: {} records, {} draws ({} instanced), {} elements, {} shader binds, {} immediate, {} dynamic",
        list.len(),
        renderer.draws,
        renderer.instanced,
        renderer.elements,
        renderer.shader_binds,
        renderer.immediate,
        renderer.batched_dynamic,
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::from(2);
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
