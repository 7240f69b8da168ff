use super::mesh::QuadRect;
use crate::compositor::uniforms::Mat4;

pub const Z_NEAR: f32 = -1000.0;
pub const Z_FAR: f32 = 1000.0;

/// Column-major orthographic projection: world units are logical pixels with
/// the origin top-left and y down; z in `[Z_NEAR, Z_FAR]` lands in `[0, 1]`.
pub fn orthographic(width: f32, height: f32) -> Mat4 {
    let w = width.max(1.0);
    let h = height.max(1.0);
    let depth = Z_FAR - Z_NEAR;
    [
        [2.0 / w, 0.0, 0.0, 0.0],
        [0.0, -2.0 / h, 0.0, 0.0],
        [0.0, 0.0, 1.0 / depth, 0.0],
        [-1.0, 1.0, -Z_NEAR / depth, 1.0],
    ]
}

/// `a * b` for column-major matrices.
pub fn multiply(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = [[0.0; 4]; 4];
    for (col, out_col) in out.iter_mut().enumerate() {
        *out_col = transform(a, b[col]);
    }
    out
}

/// Places a mesh spanning `[0, mesh_aspect] x [0, 1]` onto `rect`.
pub fn placement(rect: &QuadRect, mesh_aspect: f32) -> Mat4 {
    let sx = rect.width / mesh_aspect.max(f32::EPSILON);
    let sy = rect.height;
    [
        [sx, 0.0, 0.0, 0.0],
        [0.0, sy, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [rect.x, rect.y, 0.0, 1.0],
    ]
}

pub fn transform(m: &Mat4, v: [f32; 4]) -> [f32; 4] {
    let mut out = [0.0; 4];
    for (row, slot) in out.iter_mut().enumerate() {
        *slot = (0..4).map(|col| m[col][row] * v[col]).sum();
    }
    out
}

/// Clip-space position to pixel coordinates of a `width` x `height` target.
pub fn clip_to_pixels(clip: [f32; 4], width: u32, height: u32) -> [f32; 2] {
    let w = if clip[3].abs() > f32::EPSILON { clip[3] } else { 1.0 };
    let ndc_x = clip[0] / w;
    let ndc_y = clip[1] / w;
    [
        (ndc_x + 1.0) * 0.5 * width as f32,
        (1.0 - ndc_y) * 0.5 * height as f32,
    ]
}
