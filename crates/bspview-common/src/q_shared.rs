// q_shared.rs — math, plane and text helpers shared by the loader and the renderer

// ============================================================
// Basic types
// ============================================================

pub type Vec2 = [f32; 2];
pub type Vec3 = [f32; 3];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

pub const AXIS_IDENTITY: [Vec3; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

pub const PITCH: usize = 0; // up / down
pub const YAW: usize = 1; // left / right
pub const ROLL: usize = 2; // fall over

pub const MAX_TOKEN_CHARS: usize = 1024;

// ============================================================
// MATHLIB — Vector operations
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn vector_scale(v: &Vec3, scale: f32) -> Vec3 {
    [v[0] * scale, v[1] * scale, v[2] * scale]
}

/// veca + scale * vecb
#[inline]
pub fn vector_ma(veca: &Vec3, scale: f32, vecb: &Vec3) -> Vec3 {
    [
        veca[0] + scale * vecb[0],
        veca[1] + scale * vecb[1],
        veca[2] + scale * vecb[2],
    ]
}

pub fn cross_product(v1: &Vec3, v2: &Vec3) -> Vec3 {
    [
        v1[1] * v2[2] - v1[2] * v2[1],
        v1[2] * v2[0] - v1[0] * v2[2],
        v1[0] * v2[1] - v1[1] * v2[0],
    ]
}

pub fn vector_length(v: &Vec3) -> f32 {
    dot_product(v, v).sqrt()
}

pub fn distance_squared(a: &Vec3, b: &Vec3) -> f32 {
    let d = vector_subtract(a, b);
    dot_product(&d, &d)
}

/// Returns a unit-length copy of `v`, or `v` unchanged when it has no length.
pub fn vector_normalized(v: &Vec3) -> Vec3 {
    let length = vector_length(v);
    if length == 0.0 {
        return *v;
    }
    vector_scale(v, 1.0 / length)
}

#[inline]
pub fn lerp_f32(a: f32, t: f32, b: f32) -> f32 {
    a + (b - a) * t
}

pub fn vec2_lerp(a: &Vec2, t: f32, b: &Vec2) -> Vec2 {
    [lerp_f32(a[0], t, b[0]), lerp_f32(a[1], t, b[1])]
}

pub fn vec3_lerp(a: &Vec3, t: f32, b: &Vec3) -> Vec3 {
    [
        lerp_f32(a[0], t, b[0]),
        lerp_f32(a[1], t, b[1]),
        lerp_f32(a[2], t, b[2]),
    ]
}

// ============================================================
// Bounds
// ============================================================

/// Inverted bounds, ready to be grown with `add_point_to_bounds`.
pub fn clear_bounds() -> (Vec3, Vec3) {
    ([f32::MAX; 3], [-f32::MAX; 3])
}

pub fn add_point_to_bounds(v: &Vec3, mins: &mut Vec3, maxs: &mut Vec3) {
    for i in 0..3 {
        mins[i] = mins[i].min(v[i]);
        maxs[i] = maxs[i].max(v[i]);
    }
}

pub fn radius_from_bounds(mins: &Vec3, maxs: &Vec3) -> f32 {
    let mut corner = [0.0f32; 3];
    for i in 0..3 {
        corner[i] = mins[i].abs().max(maxs[i].abs());
    }
    vector_length(&corner)
}

// ============================================================
// Plane
// ============================================================

pub const PLANE_X: u8 = 0;
pub const PLANE_Y: u8 = 1;
pub const PLANE_Z: u8 = 2;
pub const PLANE_NON_AXIAL: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CPlane {
    pub normal: Vec3,
    pub dist: f32,
    pub plane_type: u8,
    pub signbits: u8,
}

impl Default for CPlane {
    fn default() -> Self {
        Self {
            normal: [0.0; 3],
            dist: 0.0,
            plane_type: PLANE_NON_AXIAL,
            signbits: 0,
        }
    }
}

impl CPlane {
    /// Builds a plane and fills in its axial type and sign bits.
    pub fn new(normal: Vec3, dist: f32) -> Self {
        let mut plane = Self {
            normal,
            dist,
            ..Default::default()
        };
        plane.categorize();
        plane
    }

    /// Recomputes `plane_type` and `signbits` after the normal changed.
    pub fn categorize(&mut self) {
        self.plane_type = PLANE_NON_AXIAL;
        for i in 0..3 {
            if self.normal[i] == 1.0 {
                self.plane_type = i as u8;
                break;
            }
        }
        self.signbits = signbits_for_plane(&self.normal);
    }

    /// Signed distance of `p` from the plane.
    #[inline]
    pub fn distance_to(&self, p: &Vec3) -> f32 {
        dot_product(&self.normal, p) - self.dist
    }
}

pub fn signbits_for_plane(normal: &Vec3) -> u8 {
    let mut bits = 0u8;
    for j in 0..3 {
        if normal[j] < 0.0 {
            bits |= 1 << j;
        }
    }
    bits
}

/// Classifies a box against a plane.
///
/// Returns 1 when the box is entirely in front, 2 when it is entirely
/// behind, and 3 when it straddles the plane.
pub fn box_on_plane_side(emins: &Vec3, emaxs: &Vec3, p: &CPlane) -> i32 {
    // fast axial cases
    if p.plane_type < PLANE_NON_AXIAL {
        let t = p.plane_type as usize;
        if p.dist <= emins[t] {
            return 1;
        }
        if p.dist >= emaxs[t] {
            return 2;
        }
        return 3;
    }

    // nearest and farthest corners picked by the normal's sign bits
    let mut dist1 = 0.0f32;
    let mut dist2 = 0.0f32;
    for i in 0..3 {
        if p.signbits & (1 << i) != 0 {
            dist1 += p.normal[i] * emins[i];
            dist2 += p.normal[i] * emaxs[i];
        } else {
            dist1 += p.normal[i] * emaxs[i];
            dist2 += p.normal[i] * emins[i];
        }
    }

    let mut sides = 0;
    if dist1 >= p.dist {
        sides = 1;
    }
    if dist2 < p.dist {
        sides |= 2;
    }
    sides
}

// ============================================================
// Angle functions
// ============================================================

/// Converts pitch/yaw/roll degrees into (forward, right, up) unit vectors.
pub fn angle_vectors(angles: &Vec3) -> (Vec3, Vec3, Vec3) {
    let (sy, cy) = angles[YAW].to_radians().sin_cos();
    let (sp, cp) = angles[PITCH].to_radians().sin_cos();
    let (sr, cr) = angles[ROLL].to_radians().sin_cos();

    let forward = [cp * cy, cp * sy, -sp];
    let right = [
        -sr * sp * cy + cr * sy,
        -sr * sp * sy - cr * cy,
        -sr * cp,
    ];
    let up = [cr * sp * cy + sr * sy, cr * sp * sy - sr * cy, cr * cp];
    (forward, right, up)
}

// ============================================================
// Strings
// ============================================================

/// Returns the extension of `path` including the dot, or "" if there is none.
pub fn com_file_extension(path: &str) -> &str {
    let name_start = path.rfind(|c: char| c == '/' || c == '\\').map(|i| i + 1).unwrap_or(0);
    match path[name_start..].rfind('.') {
        Some(dot) => &path[name_start + dot..],
        None => "",
    }
}

pub fn com_strip_extension(path: &str) -> &str {
    &path[..path.len() - com_file_extension(path).len()]
}

/// Parse one token out of `data`.
///
/// Skips whitespace and `//` comments and understands double-quoted strings.
/// Returns the token and the unparsed remainder; the remainder is `None` once
/// the input is exhausted. A quoted empty string yields an empty token with
/// `Some` remainder.
pub fn com_parse(data: &str) -> (String, Option<&str>) {
    let bytes = data.as_bytes();
    let mut pos = 0;

    loop {
        while pos < bytes.len() && bytes[pos] <= b' ' {
            if bytes[pos] == 0 {
                return (String::new(), None);
            }
            pos += 1;
        }
        if pos >= bytes.len() {
            return (String::new(), None);
        }
        if bytes[pos..].starts_with(b"//") {
            while pos < bytes.len() && bytes[pos] != b'\n' {
                pos += 1;
            }
            continue;
        }
        break;
    }

    let start;
    let end;
    if bytes[pos] == b'"' {
        start = pos + 1;
        pos = start;
        while pos < bytes.len() && bytes[pos] != b'"' {
            pos += 1;
        }
        end = pos;
        if pos < bytes.len() {
            pos += 1; // closing quote
        }
    } else {
        start = pos;
        while pos < bytes.len() && bytes[pos] > b' ' {
            pos += 1;
        }
        end = pos;
    }

    let mut token = String::from_utf8_lossy(&bytes[start..end]).into_owned();
    if token.len() > MAX_TOKEN_CHARS {
        token.clear();
    }

    let remaining = if pos < bytes.len() { Some(&data[pos..]) } else { None };
    (token, remaining)
}

/// C `atof`: parses the longest numeric prefix and returns 0.0 when there is none.
pub fn atof(s: &str) -> f32 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let mut digits = 0;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
        digits += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return 0.0;
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    s[..end].parse::<f32>().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_product() {
        assert_eq!(dot_product(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]), 32.0);
    }

    #[test]
    fn test_cross_product() {
        assert_eq!(cross_product(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_vector_normalized() {
        let v = vector_normalized(&[3.0, 0.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[2] - 0.8).abs() < 1e-6);
        assert_eq!(vector_normalized(&[0.0; 3]), [0.0; 3]);
    }

    #[test]
    fn test_plane_categorize() {
        let p = CPlane::new([0.0, 0.0, 1.0], 16.0);
        assert_eq!(p.plane_type, PLANE_Z);
        assert_eq!(p.signbits, 0);

        let q = CPlane::new([-0.6, 0.0, -0.8], 0.0);
        assert_eq!(q.plane_type, PLANE_NON_AXIAL);
        assert_eq!(q.signbits, 0b101);
    }

    #[test]
    fn test_box_on_plane_side_axial() {
        let p = CPlane::new([1.0, 0.0, 0.0], 10.0);
        assert_eq!(box_on_plane_side(&[20.0, 0.0, 0.0], &[30.0, 1.0, 1.0], &p), 1);
        assert_eq!(box_on_plane_side(&[0.0, 0.0, 0.0], &[5.0, 1.0, 1.0], &p), 2);
        assert_eq!(box_on_plane_side(&[0.0, 0.0, 0.0], &[15.0, 1.0, 1.0], &p), 3);
    }

    #[test]
    fn test_box_on_plane_side_general() {
        let n = vector_normalized(&[1.0, -1.0, 0.0]);
        let p = CPlane::new(n, 0.0);
        // box around (10, -10, 0) lies in front
        assert_eq!(box_on_plane_side(&[9.0, -11.0, -1.0], &[11.0, -9.0, 1.0], &p), 1);
        // box around (-10, 10, 0) lies behind
        assert_eq!(box_on_plane_side(&[-11.0, 9.0, -1.0], &[-9.0, 11.0, 1.0], &p), 2);
        // box around the origin straddles
        assert_eq!(box_on_plane_side(&[-1.0; 3], &[1.0; 3], &p), 3);
    }

    #[test]
    fn test_angle_vectors_identity() {
        let (f, r, u) = angle_vectors(&[0.0, 0.0, 0.0]);
        assert!((f[0] - 1.0).abs() < 1e-6);
        assert!((r[1] + 1.0).abs() < 1e-6);
        assert!((u[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_angle_vectors_yaw() {
        let (f, _, _) = angle_vectors(&[0.0, 90.0, 0.0]);
        assert!(f[0].abs() < 1e-6);
        assert!((f[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_radius_from_bounds() {
        let r = radius_from_bounds(&[-3.0, -1.0, 0.0], &[1.0, 4.0, 0.0]);
        assert!((r - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(com_file_extension("maps/dm1.bsp"), ".bsp");
        assert_eq!(com_file_extension("maps.d/dm1"), "");
        assert_eq!(com_strip_extension("maps/dm1.bsp.gz"), "maps/dm1.bsp");
    }

    #[test]
    fn test_com_parse_tokens() {
        let (tok, rest) = com_parse("  { \"fog_strength\" 0.5 }");
        assert_eq!(tok, "{");
        let (tok, rest) = com_parse(rest.unwrap());
        assert_eq!(tok, "fog_strength");
        let (tok, rest) = com_parse(rest.unwrap());
        assert_eq!(tok, "0.5");
        let (tok, rest) = com_parse(rest.unwrap());
        assert_eq!(tok, "}");
        assert!(rest.is_none());
    }

    #[test]
    fn test_com_parse_comments_and_empty() {
        let (tok, _) = com_parse("// comment\n  word");
        assert_eq!(tok, "word");
        let (tok, rest) = com_parse("   ");
        assert_eq!(tok, "");
        assert!(rest.is_none());
        let (tok, rest) = com_parse("\"\" x");
        assert_eq!(tok, "");
        assert!(rest.is_some());
    }

    #[test]
    fn test_atof() {
        assert_eq!(atof("0.25"), 0.25);
        assert_eq!(atof("  -2.5abc"), -2.5);
        assert_eq!(atof("1e-3"), 0.001);
        assert_eq!(atof("3e"), 3.0);
        assert_eq!(atof("abc"), 0.0);
        assert_eq!(atof(""), 0.0);
    }
}
