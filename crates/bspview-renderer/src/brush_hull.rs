//! Convex point clouds from brush planes.
//!
//! A brush is the intersection of the back half-spaces of its planes. Its
//! corners are the points where three planes meet and that lie behind (or
//! on) every plane. The resulting cloud is handed to the physics backend,
//! which builds the actual hull.

use bspview_common::error::GeometryError;
use bspview_common::q_shared::*;
use bspview_common::qfiles::BspPlane;

/// Below this the three normals are treated as linearly dependent.
pub const INTERSECT_EPSILON: f32 = 0.00001;

/// Tolerance for "behind the plane".
pub const INSIDE_EPSILON: f32 = 0.001;

/// Intersection point of three planes.
pub fn intersect_3_planes(p1: &BspPlane, p2: &BspPlane, p3: &BspPlane) -> Result<Vec3, GeometryError> {
    let n2xn3 = cross_product(&p2.normal, &p3.normal);
    let determinant = dot_product(&p1.normal, &n2xn3);

    if determinant.abs() < INTERSECT_EPSILON {
        return Err(GeometryError::Degenerate { determinant });
    }

    let n3xn1 = cross_product(&p3.normal, &p1.normal);
    let n1xn2 = cross_product(&p1.normal, &p2.normal);

    let mut p = vector_scale(&n2xn3, p1.distance);
    p = vector_ma(&p, p2.distance, &n3xn1);
    p = vector_ma(&p, p3.distance, &n1xn2);
    Ok(vector_scale(&p, 1.0 / determinant))
}

pub fn point_inside_brush(planes: &[BspPlane], p: &Vec3) -> bool {
    planes
        .iter()
        .all(|plane| dot_product(p, &plane.normal) - plane.distance <= INSIDE_EPSILON)
}

/// Every valid corner of the brush, in plane-triple order.
///
/// Degenerate triples are skipped. Corners shared by more than three planes
/// appear once per triple that produces them.
pub fn brush_convex_hull(planes: &[BspPlane]) -> Vec<Vec3> {
    let mut hull = Vec::new();
    let n = planes.len();

    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                let p = match intersect_3_planes(&planes[i], &planes[j], &planes[k]) {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                if point_inside_brush(planes, &p) {
                    hull.push(p);
                }
            }
        }
    }

    hull
}

/// The six axial planes of an axis-aligned box, outward facing.
pub fn box_planes(mins: &Vec3, maxs: &Vec3) -> [BspPlane; 6] {
    let mut planes = [BspPlane::default(); 6];
    for axis in 0..3 {
        let mut n = [0.0f32; 3];
        n[axis] = 1.0;
        planes[axis * 2] = BspPlane { normal: n, distance: maxs[axis] };
        n[axis] = -1.0;
        planes[axis * 2 + 1] = BspPlane { normal: n, distance: -mins[axis] };
    }
    planes
}
