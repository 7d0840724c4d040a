//! View frustum: four side planes, a near plane and an optional far plane.
//!
//! All normals point into the frustum, so `box_on_plane_side == 2` means the
//! box lies entirely outside that plane.

use bspview_common::q_shared::*;

/// Distance from the eye to the near plane.
pub const Z_NEAR: f32 = 4.0;

/// Slack added to the computed far clip distance.
pub const Z_BIAS: f32 = 64.0;

pub const FRUSTUM_LEFT: usize = 0;
pub const FRUSTUM_RIGHT: usize = 1;
pub const FRUSTUM_BOTTOM: usize = 2;
pub const FRUSTUM_TOP: usize = 3;
pub const FRUSTUM_NEAR: usize = 4;
pub const FRUSTUM_FAR: usize = 5;

/// Clip flags selecting the four side planes.
pub const CLIP_SIDES: u32 = 0b1111;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frustum {
    pub planes: [CPlane; 6],
}

impl Frustum {
    /// Build the frustum for a view at `origin` looking along `forward`.
    ///
    /// `fov_x` and `fov_y` are full angles in degrees. The far plane is left
    /// degenerate (it accepts everything) until `set_far_clip` is called.
    pub fn from_view(origin: &Vec3, forward: &Vec3, right: &Vec3, up: &Vec3, fov_x: f32, fov_y: f32) -> Self {
        let (sx, cx) = (fov_x * 0.5).to_radians().sin_cos();
        let (sy, cy) = (fov_y * 0.5).to_radians().sin_cos();

        let side = |s: f32, c: f32, axis: &Vec3, sign: f32| {
            let n = vector_normalized(&vector_ma(&vector_scale(forward, s), sign * c, axis));
            CPlane::new(n, dot_product(origin, &n))
        };

        let mut planes = [CPlane::default(); 6];
        planes[FRUSTUM_LEFT] = side(sx, cx, right, 1.0);
        planes[FRUSTUM_RIGHT] = side(sx, cx, right, -1.0);
        planes[FRUSTUM_BOTTOM] = side(sy, cy, up, 1.0);
        planes[FRUSTUM_TOP] = side(sy, cy, up, -1.0);
        planes[FRUSTUM_NEAR] = CPlane::new(*forward, dot_product(origin, forward) + Z_NEAR);
        planes[FRUSTUM_FAR] = CPlane::new([0.0; 3], -f32::MAX);

        Self { planes }
    }

    pub fn set_far_clip(&mut self, origin: &Vec3, forward: &Vec3, far_clip: f32) {
        let n = vector_scale(forward, -1.0);
        self.planes[FRUSTUM_FAR] = CPlane::new(n, -(dot_product(origin, forward) + far_clip));
    }

    /// True when the box is completely outside one of the planes in `clip_flags`.
    pub fn cull_box(&self, mins: &Vec3, maxs: &Vec3, clip_flags: u32) -> bool {
        self.planes
            .iter()
            .enumerate()
            .filter(|(i, _)| clip_flags & (1 << i) != 0)
            .any(|(_, plane)| box_on_plane_side(mins, maxs, plane) == 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn looking_down_x() -> Frustum {
        let (f, r, u) = angle_vectors(&[0.0, 0.0, 0.0]);
        Frustum::from_view(&[0.0; 3], &f, &r, &u, 90.0, 90.0)
    }

    #[test]
    fn test_box_in_front_is_kept() {
        let fr = looking_down_x();
        assert!(!fr.cull_box(&[100.0, -8.0, -8.0], &[116.0, 8.0, 8.0], CLIP_SIDES));
    }

    #[test]
    fn test_box_behind_is_culled() {
        let fr = looking_down_x();
        assert!(fr.cull_box(&[-116.0, -8.0, -8.0], &[-100.0, 8.0, 8.0], CLIP_SIDES));
    }

    #[test]
    fn test_box_off_to_the_side_is_culled() {
        let fr = looking_down_x();
        // 90 degree fov: y beyond x is outside
        assert!(fr.cull_box(&[10.0, 200.0, -8.0], &[20.0, 220.0, 8.0], CLIP_SIDES));
        assert!(fr.cull_box(&[10.0, -8.0, 200.0], &[20.0, 8.0, 220.0], CLIP_SIDES));
    }

    #[test]
    fn test_clip_flags_select_planes() {
        let fr = looking_down_x();
        assert!(!fr.cull_box(&[-116.0, -8.0, -8.0], &[-100.0, 8.0, 8.0], 0));
    }

    #[test]
    fn test_near_and_far() {
        let (f, r, u) = angle_vectors(&[0.0, 0.0, 0.0]);
        let mut fr = Frustum::from_view(&[0.0; 3], &f, &r, &u, 90.0, 90.0);
        let near_bit = 1 << FRUSTUM_NEAR;
        let far_bit = 1 << FRUSTUM_FAR;

        assert!(fr.cull_box(&[0.5, -0.1, -0.1], &[1.0, 0.1, 0.1], near_bit));
        // far plane accepts everything until it is set
        assert!(!fr.cull_box(&[5000.0, -8.0, -8.0], &[5010.0, 8.0, 8.0], far_bit));

        fr.set_far_clip(&[0.0; 3], &f, 1000.0);
        assert!(fr.cull_box(&[5000.0, -8.0, -8.0], &[5010.0, 8.0, 8.0], far_bit));
        assert!(!fr.cull_box(&[500.0, -8.0, -8.0], &[510.0, 8.0, 8.0], far_bit));
    }
}
