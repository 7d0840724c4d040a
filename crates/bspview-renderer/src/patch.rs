//! Biquadratic Bezier patch tessellation.
//!
//! A patch is an odd-by-odd grid of control vertices, split into overlapping
//! 3x3 windows. Each window is sampled on a regular grid whose density per
//! axis comes from a recursive flatness estimate, then triangulated.

use bspview_common::q_shared::*;

use crate::level::BspModelVertex;

/// Allowed distance, in world units, between the curve and its chords.
pub const DEFAULT_MAX_ERROR: f32 = 1.0;

/// Bisection depth limit; caps a window at 2^10 subdivisions per axis.
const MAX_SUBDIVISION_DEPTH: u32 = 10;

#[inline]
fn order2_bezier_vec3(t: f32, a: &Vec3, b: &Vec3, c: &Vec3) -> Vec3 {
    let d = vec3_lerp(a, t, b);
    let e = vec3_lerp(b, t, c);
    vec3_lerp(&d, t, &e)
}

#[inline]
fn order2_bezier_vertex(t: f32, a: &BspModelVertex, b: &BspModelVertex, c: &BspModelVertex) -> BspModelVertex {
    let d = a.lerp(t, b);
    let e = b.lerp(t, c);
    d.lerp(t, &e)
}

/// Evaluate a 3x3 control window. `control[x][y]`; `ty` runs inside each
/// column, `tx` across the three results.
pub fn order2_bezier_2d(tx: f32, ty: f32, control: &[[BspModelVertex; 3]; 3]) -> BspModelVertex {
    let a = order2_bezier_vertex(ty, &control[0][0], &control[0][1], &control[0][2]);
    let b = order2_bezier_vertex(ty, &control[1][0], &control[1][1], &control[1][2]);
    let c = order2_bezier_vertex(ty, &control[2][0], &control[2][1], &control[2][2]);
    order2_bezier_vertex(tx, &a, &b, &c)
}

fn point_segment_distance(start: &Vec3, end: &Vec3, p: &Vec3) -> f32 {
    let dir = vector_subtract(end, start);
    let len_sq = dot_product(&dir, &dir);
    let closest = if len_sq == 0.0 {
        *start
    } else {
        let t = (dot_product(&vector_subtract(p, start), &dir) / len_sq).clamp(0.0, 1.0);
        vector_ma(start, t, &dir)
    };
    vector_length(&vector_subtract(p, &closest))
}

fn subdivisions_between(
    control: [&Vec3; 3],
    max_error: f32,
    p0: &Vec3,
    p1: &Vec3,
    t0: f32,
    t1: f32,
    depth: u32,
) -> u32 {
    let mid_t = (t0 + t1) * 0.5;
    let p = order2_bezier_vec3(mid_t, control[0], control[1], control[2]);
    if depth >= MAX_SUBDIVISION_DEPTH || point_segment_distance(p0, p1, &p) <= max_error {
        return 1;
    }

    let l = subdivisions_between(control, max_error, p0, &p, t0, mid_t, depth + 1);
    let r = subdivisions_between(control, max_error, &p, p1, mid_t, t1, depth + 1);
    1 + l.max(r)
}

/// Subdivision estimate for one quadratic curve.
///
/// Curves with any two coincident control points count as flat.
pub fn bezier_subdivisions(c0: &Vec3, c1: &Vec3, c2: &Vec3, max_error: f32) -> u32 {
    if c0 == c1 || c1 == c2 || c0 == c2 {
        return 1;
    }
    subdivisions_between([c0, c1, c2], max_error, c0, c2, 0.0, 1.0, 0)
}

/// Per-axis tessellation of one window: the densest of its three rows
/// (x) and three columns (y).
pub fn window_tessellation(control: &[[BspModelVertex; 3]; 3], max_error: f32) -> (u32, u32) {
    let mut tess_x = 0;
    let mut tess_y = 0;
    for j in 0..3 {
        tess_x = tess_x.max(bezier_subdivisions(
            &control[0][j].position,
            &control[1][j].position,
            &control[2][j].position,
            max_error,
        ));
        tess_y = tess_y.max(bezier_subdivisions(
            &control[j][0].position,
            &control[j][1].position,
            &control[j][2].position,
            max_error,
        ));
    }
    (tess_x, tess_y)
}

/// Geometry appended by `tessellate_patch`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchOutput {
    pub first_vertex: u32,
    pub num_vertices: u32,
    pub num_indices: u32,
}

/// Control grid `width` x `height` at `base_vertex` must already lie inside `vertices`.
pub fn patch_fits(num_vertices: usize, base_vertex: u32, width: u32, height: u32) -> bool {
    let needed = (width as u64) * (height as u64);
    base_vertex as u64 + needed <= num_vertices as u64
}

/// Tessellate the patch whose row-major control grid starts at `base_vertex`.
///
/// New vertices are appended to `vertices` and triangles (two per grid cell,
/// `bl tl br` / `br tl tr`) to `indices`. Grids smaller than 3x3 produce
/// nothing. The caller checks `patch_fits` first.
pub fn tessellate_patch(
    vertices: &mut Vec<BspModelVertex>,
    indices: &mut Vec<u32>,
    base_vertex: u32,
    width: u32,
    height: u32,
    max_error: f32,
) -> PatchOutput {
    let mut out = PatchOutput {
        first_vertex: vertices.len() as u32,
        ..Default::default()
    };

    if width < 3 || height < 3 {
        return out;
    }
    debug_assert!(patch_fits(vertices.len(), base_vertex, width, height));

    let num_patches_x = (width - 1) / 2;
    let num_patches_y = (height - 1) / 2;

    for patch_y in 0..num_patches_y {
        for patch_x in 0..num_patches_x {
            let control_base = (patch_y * 2 * width + patch_x * 2 + base_vertex) as usize;

            // copy the window out: the appends below may reallocate `vertices`
            let mut control = [[BspModelVertex::default(); 3]; 3];
            for (x, column) in control.iter_mut().enumerate() {
                for (y, cp) in column.iter_mut().enumerate() {
                    *cp = vertices[control_base + y * width as usize + x];
                }
            }

            let (tess_x, tess_y) = window_tessellation(&control, max_error);
            let base_vert = vertices.len() as u32;

            for y in 0..=tess_y {
                for x in 0..=tess_x {
                    let tx = x as f32 / tess_x as f32;
                    let ty = y as f32 / tess_y as f32;
                    vertices.push(order2_bezier_2d(tx, ty, &control));
                }
            }

            let row = tess_x + 1;
            for y in 0..tess_y {
                for x in 0..tess_x {
                    let bl = y * row + x + base_vert;
                    let br = y * row + x + 1 + base_vert;
                    let tl = (y + 1) * row + x + base_vert;
                    let tr = (y + 1) * row + x + 1 + base_vert;

                    indices.extend_from_slice(&[bl, tl, br, br, tl, tr]);
                    out.num_indices += 6;
                }
            }
        }
    }

    out.num_vertices = vertices.len() as u32 - out.first_vertex;
    out
}
