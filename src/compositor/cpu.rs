//! Reference rasterizer for the overlay program.
//!
//! Runs the same vertex and fragment stages as `shaders/overlay.wgsl` over
//! the grid mesh, with a bilinear clamp-to-edge sampler and unorm output
//! rounding. Used by the CPU backend and by tests that need exact pixels.

use image::{Rgba, RgbaImage};

use super::textures::{TextureSet, TextureSlot};
use super::uniforms::{
    FLAG_BLACK_AND_WHITE, FLAG_ERASE, FLAG_INCLUDE_BASE, FLAG_MULTIPLY, GpuParams,
};
use crate::processing::color::{lerp, luminance, unit_to_byte};
use crate::surface::mesh::GridMesh;
use crate::surface::projection::{clip_to_pixels, transform};

const TRANSPARENT: [f32; 4] = [0.0; 4];
const EDGE_EPSILON: f32 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexOut {
    /// World-space position after displacement.
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

/// Textures resolved for one frame; `None` samples as the placeholder.
#[derive(Clone, Copy)]
pub struct Bound<'a> {
    pub base: Option<&'a RgbaImage>,
    pub overlay: Option<&'a RgbaImage>,
    pub segmentation: Option<&'a RgbaImage>,
    pub depth: Option<&'a RgbaImage>,
    pub erase: Option<&'a RgbaImage>,
}

impl<'a> Bound<'a> {
    pub fn new(textures: &'a TextureSet) -> Self {
        let get = |slot| textures.get(slot).map(|asset| asset.pixels());
        Self {
            base: get(TextureSlot::Base),
            overlay: get(TextureSlot::Overlay),
            segmentation: get(TextureSlot::Segmentation),
            depth: get(TextureSlot::Depth),
            erase: get(TextureSlot::Erase),
        }
    }
}

/// Bilinear clamp-to-edge sample, channels in `[0, 1]`.
pub fn sample(image: Option<&RgbaImage>, uv: [f32; 2]) -> [f32; 4] {
    let Some(image) = image else {
        return TRANSPARENT;
    };
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return TRANSPARENT;
    }
    let x = uv[0] * w as f32 - 0.5;
    let y = uv[1] * h as f32 - 0.5;
    if !x.is_finite() || !y.is_finite() {
        return TRANSPARENT;
    }
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let texel = |tx: f32, ty: f32| -> [f32; 4] {
        let ix = (tx as i64).clamp(0, w as i64 - 1) as u32;
        let iy = (ty as i64).clamp(0, h as i64 - 1) as u32;
        let p = image.get_pixel(ix, iy).0;
        [
            p[0] as f32 / 255.0,
            p[1] as f32 / 255.0,
            p[2] as f32 / 255.0,
            p[3] as f32 / 255.0,
        ]
    };
    let tl = texel(x0, y0);
    let tr = texel(x0 + 1.0, y0);
    let bl = texel(x0, y0 + 1.0);
    let br = texel(x0 + 1.0, y0 + 1.0);

    let mut out = [0.0; 4];
    for (i, channel) in out.iter_mut().enumerate() {
        let top = lerp(tl[i], tr[i], fx);
        let bottom = lerp(bl[i], br[i], fx);
        *channel = lerp(top, bottom, fy);
    }
    out
}

pub fn vertex_stage(
    params: &GpuParams,
    depth: Option<&RgbaImage>,
    position: [f32; 2],
    uv: [f32; 2],
) -> VertexOut {
    let texel = params.depth_texel;
    let strength = params.displacement_strength;
    let depth_at = |u: f32, v: f32| sample(depth, [u, v])[0];
    let d = depth_at(uv[0], uv[1]);
    let d_left = depth_at(uv[0] - texel[0], uv[1]);
    let d_right = depth_at(uv[0] + texel[0], uv[1]);
    let d_up = depth_at(uv[0], uv[1] - texel[1]);
    let d_down = depth_at(uv[0], uv[1] + texel[1]);

    let tx = [2.0 * texel[0], 0.0, (d_right - d_left) * strength];
    let ty = [0.0, 2.0 * texel[1], (d_down - d_up) * strength];
    let n = cross(tx, ty);
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    let normal = if len > 0.0 {
        [n[0] / len, n[1] / len, n[2] / len]
    } else {
        [0.0, 0.0, 1.0]
    };

    VertexOut {
        position: [position[0], position[1], d * strength],
        normal,
    }
}

pub fn fragment_stage(params: &GpuParams, textures: &Bound<'_>, uv: [f32; 2]) -> [f32; 4] {
    let base = sample(textures.base, uv);
    let depth = sample(textures.depth, uv)[0];

    let mut p = [uv[0] - 0.5, uv[1] - 0.5];
    let perspective = 1.0 / (1.0 + params.perspective_k * depth);
    p = [p[0] * perspective, p[1] * perspective];
    p = [p[0] - params.offset[0], p[1] - params.offset[1]];
    let (s, c) = params.rotation.sin_cos();
    p = [c * p[0] + s * p[1], -s * p[0] + c * p[1]];
    p[0] *= params.base_aspect;
    p[0] /= params.overlay_aspect;
    p = [p[0] / params.scale, p[1] / params.scale];
    let ouv = [p[0] + 0.5, p[1] + 0.5];

    let inside = (0.0..=1.0).contains(&ouv[0]) && (0.0..=1.0).contains(&ouv[1]);
    let art = if inside {
        sample(textures.overlay, ouv)
    } else {
        TRANSPARENT
    };

    let mut rgb = [art[0], art[1], art[2]];
    if params.has(FLAG_BLACK_AND_WHITE) {
        let l = luminance(rgb);
        rgb = [l, l, l];
    }
    for channel in rgb.iter_mut() {
        *channel = ((*channel - 0.5) * params.contrast + 0.5).clamp(0.0, 1.0);
    }

    let mut a = art[3] * params.opacity;
    if params.has(FLAG_ERASE) {
        let rect = params.erase_rect;
        let erase_uv = [rect[0] + uv[0] * rect[2], rect[1] + uv[1] * rect[3]];
        a *= 1.0 - sample(textures.erase, erase_uv)[3];
    }

    let seg = sample(textures.segmentation, uv)[3];
    let mask = if seg > 0.0 {
        seg
    } else {
        params.hint_outside_segment
    };

    if params.has(FLAG_INCLUDE_BASE) {
        if a <= 0.0 {
            return base;
        }
        let multiply = params.has(FLAG_MULTIPLY);
        let t = a * mask;
        let mut out = [0.0, 0.0, 0.0, base[3]];
        for i in 0..3 {
            let tinted = if multiply { base[i] * rgb[i] } else { rgb[i] };
            out[i] = lerp(base[i], tinted, t);
        }
        return out;
    }
    [rgb[0], rgb[1], rgb[2], a * mask]
}

/// Rasterizes `mesh` into a `width` x `height` frame. Pixels no triangle
/// covers stay fully transparent.
pub fn rasterize(
    params: &GpuParams,
    textures: &TextureSet,
    mesh: &GridMesh,
    width: u32,
    height: u32,
) -> RgbaImage {
    let width = width.max(1);
    let height = height.max(1);
    let bound = Bound::new(textures);
    let mut out = RgbaImage::new(width, height);

    let screen: Vec<[f32; 2]> = mesh
        .vertices
        .iter()
        .map(|vertex| {
            let shaded = vertex_stage(params, bound.depth, vertex.position, vertex.uv);
            let [x, y, z] = shaded.position;
            clip_to_pixels(transform(&params.projection, [x, y, z, 1.0]), width, height)
        })
        .collect();

    for tri in mesh.indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        let (p0, p1, p2) = (screen[i0], screen[i1], screen[i2]);
        let area = edge(p0, p1, p2);
        if area.abs() <= f32::EPSILON {
            continue;
        }
        let (uv0, uv1, uv2) = (
            mesh.vertices[i0].uv,
            mesh.vertices[i1].uv,
            mesh.vertices[i2].uv,
        );

        let min_x = p0[0].min(p1[0]).min(p2[0]).floor().max(0.0) as u32;
        let min_y = p0[1].min(p1[1]).min(p2[1]).floor().max(0.0) as u32;
        let max_x = (p0[0].max(p1[0]).max(p2[0]).ceil().max(0.0) as u32).min(width);
        let max_y = (p0[1].max(p1[1]).max(p2[1]).ceil().max(0.0) as u32).min(height);

        for y in min_y..max_y {
            for x in min_x..max_x {
                let p = [x as f32 + 0.5, y as f32 + 0.5];
                let w0 = edge(p1, p2, p) / area;
                let w1 = edge(p2, p0, p) / area;
                let w2 = edge(p0, p1, p) / area;
                if w0 < -EDGE_EPSILON || w1 < -EDGE_EPSILON || w2 < -EDGE_EPSILON {
                    continue;
                }
                let uv = [
                    w0 * uv0[0] + w1 * uv1[0] + w2 * uv2[0],
                    w0 * uv0[1] + w1 * uv1[1] + w2 * uv2[1],
                ];
                let color = fragment_stage(params, &bound, uv);
                out.put_pixel(x, y, to_pixel(color));
            }
        }
    }
    out
}

fn to_pixel(color: [f32; 4]) -> Rgba<u8> {
    Rgba([
        unit_to_byte(color[0]),
        unit_to_byte(color[1]),
        unit_to_byte(color[2]),
        unit_to_byte(color[3]),
    ])
}

fn edge(a: [f32; 2], b: [f32; 2], c: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::uniforms::ShaderParams;
    use crate::raster::{AssetKind, RasterAsset};
    use crate::surface::mesh::QuadRect;
    use crate::surface::projection::orthographic;

    fn params(include_base: bool) -> GpuParams {
        let params = ShaderParams {
            opacity: 1.0,
            scale: 1.0,
            contrast: 1.0,
            multiply: false,
            hint_outside_segment: 1.0,
            ..ShaderParams::default()
        };
        params.to_gpu().for_pass(orthographic(4.0, 4.0), include_base)
    }

    fn asset(img: RgbaImage) -> RasterAsset {
        RasterAsset::generated(AssetKind::Adjusted, img)
    }

    fn full_mesh() -> GridMesh {
        GridMesh::new(QuadRect::full(4, 4), 3)
    }

    #[test]
    fn missing_textures_sample_transparent() {
        assert_eq!(sample(None, [0.5, 0.5]), [0.0; 4]);
    }

    #[test]
    fn bilinear_sample_hits_texel_centres() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([255, 255, 255, 255]));
        assert_eq!(sample(Some(&img), [0.25, 0.5])[0], 0.0);
        assert_eq!(sample(Some(&img), [0.75, 0.5])[0], 1.0);
        assert!((sample(Some(&img), [0.5, 0.5])[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn flat_depth_keeps_normal_facing_viewer() {
        let depth = RgbaImage::from_pixel(4, 4, Rgba([128, 128, 128, 255]));
        let mut gpu = params(true);
        gpu.depth_texel = [0.25, 0.25];
        gpu.displacement_strength = 2.0;
        let out = vertex_stage(&gpu, Some(&depth), [1.0, 1.0], [0.5, 0.5]);
        assert_eq!(out.normal, [0.0, 0.0, 1.0]);
        assert!((out.position[2] - 2.0 * 128.0 / 255.0).abs() < 1e-5);
    }

    #[test]
    fn rising_depth_tilts_normal_away() {
        let mut depth = RgbaImage::new(4, 1);
        for x in 0..4 {
            let v = (x * 80) as u8;
            depth.put_pixel(x, 0, Rgba([v, v, v, 255]));
        }
        let mut gpu = params(true);
        gpu.depth_texel = [0.25, 1.0];
        gpu.displacement_strength = 1.0;
        let out = vertex_stage(&gpu, Some(&depth), [0.0, 0.0], [0.5, 0.5]);
        assert!(out.normal[0] < 0.0);
        assert!(out.normal[2] > 0.0);
    }

    #[test]
    fn base_only_frame_reproduces_photo() {
        let mut photo = RgbaImage::new(4, 4);
        for (x, y, p) in photo.enumerate_pixels_mut() {
            *p = Rgba([(x * 60) as u8, (y * 60) as u8, 17, 255]);
        }
        let textures = TextureSet::default().with(TextureSlot::Base, asset(photo.clone()));
        let frame = rasterize(&params(true), &textures, &full_mesh(), 4, 4);
        assert_eq!(frame, photo);
    }

    #[test]
    fn artwork_only_frame_is_transparent_without_overlay() {
        let photo = RgbaImage::from_pixel(4, 4, Rgba([200, 10, 10, 255]));
        let textures = TextureSet::default().with(TextureSlot::Base, asset(photo));
        let frame = rasterize(&params(false), &textures, &full_mesh(), 4, 4);
        assert!(frame.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn overlay_footprint_follows_both_aspects() {
        let art = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]));
        let textures = TextureSet::default().with(TextureSlot::Overlay, asset(art));
        let bound = Bound::new(&textures);
        let mut gpu = params(false);
        gpu.base_aspect = 2.0;
        gpu.overlay_aspect = 1.0;
        gpu.scale = 0.5;
        // Half-extent is scale * overlay_aspect / base_aspect across and scale down.
        let alpha = |gpu: &GpuParams, u: f32, v: f32| fragment_stage(gpu, &bound, [u, v])[3];
        assert_eq!(alpha(&gpu, 0.5 + 0.12, 0.5), 1.0);
        assert_eq!(alpha(&gpu, 0.5 + 0.13, 0.5), 0.0);
        assert_eq!(alpha(&gpu, 0.5, 0.5 + 0.24), 1.0);
        assert_eq!(alpha(&gpu, 0.5, 0.5 + 0.26), 0.0);

        gpu.overlay_aspect = 2.0;
        assert_eq!(alpha(&gpu, 0.5 + 0.24, 0.5), 1.0);
        assert_eq!(alpha(&gpu, 0.5 + 0.26, 0.5), 0.0);
    }

    #[test]
    fn shader_source_applies_aspects_in_the_same_order() {
        let source = include_str!("shaders/overlay.wgsl");
        let base = source.find("p.x = p.x * params.base_aspect;");
        let overlay = source.find("p.x = p.x / params.overlay_aspect;");
        let scale = source.find("p = p / params.scale;");
        assert!(base.is_some() && overlay.is_some() && scale.is_some());
        assert!(base < overlay && overlay < scale);
    }

    #[test]
    fn opaque_overlay_replaces_base() {
        let photo = RgbaImage::from_pixel(4, 4, Rgba([200, 200, 200, 255]));
        let art = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]));
        let textures = TextureSet::default()
            .with(TextureSlot::Base, asset(photo))
            .with(TextureSlot::Overlay, asset(art));
        let frame = rasterize(&params(true), &textures, &full_mesh(), 4, 4);
        assert_eq!(frame.get_pixel(1, 1).0, [0, 0, 255, 255]);
    }

    #[test]
    fn multiply_tints_base() {
        let photo = RgbaImage::from_pixel(4, 4, Rgba([255, 128, 0, 255]));
        let art = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        let textures = TextureSet::default()
            .with(TextureSlot::Base, asset(photo))
            .with(TextureSlot::Overlay, asset(art));
        let mut gpu = params(true);
        gpu.flags |= FLAG_MULTIPLY;
        let frame = rasterize(&gpu, &textures, &full_mesh(), 4, 4);
        assert_eq!(frame.get_pixel(2, 2).0, [255, 128, 0, 255]);
    }

    #[test]
    fn fully_erased_overlay_shows_base() {
        let photo = RgbaImage::from_pixel(4, 4, Rgba([90, 90, 90, 255]));
        let art = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let erase = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        let textures = TextureSet::default()
            .with(TextureSlot::Base, asset(photo))
            .with(TextureSlot::Overlay, asset(art))
            .with(TextureSlot::Erase, asset(erase));
        let mut gpu = params(true);
        gpu.flags |= FLAG_ERASE;
        let frame = rasterize(&gpu, &textures, &full_mesh(), 4, 4);
        assert!(frame.pixels().all(|p| p.0 == [90, 90, 90, 255]));
    }

    #[test]
    fn segmentation_limits_overlay_to_skin() {
        let photo = RgbaImage::from_pixel(4, 4, Rgba([100, 100, 100, 255]));
        let art = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let mut seg = RgbaImage::new(4, 4);
        for y in 0..4 {
            seg.put_pixel(0, y, Rgba([255, 255, 255, 255]));
            seg.put_pixel(1, y, Rgba([255, 255, 255, 255]));
        }
        let textures = TextureSet::default()
            .with(TextureSlot::Base, asset(photo))
            .with(TextureSlot::Overlay, asset(art))
            .with(TextureSlot::Segmentation, asset(seg));
        let mut gpu = params(true);
        gpu.hint_outside_segment = 0.0;
        let frame = rasterize(&gpu, &textures, &full_mesh(), 4, 4);
        assert_eq!(frame.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(frame.get_pixel(3, 0).0, [100, 100, 100, 255]);
    }

    #[test]
    fn pixels_outside_the_quad_stay_clear() {
        let photo = RgbaImage::from_pixel(2, 4, Rgba([10, 20, 30, 255]));
        let textures = TextureSet::default().with(TextureSlot::Base, asset(photo));
        let mesh = GridMesh::new(QuadRect::new(1.0, 0.0, 2.0, 4.0), 2);
        let frame = rasterize(&params(true), &textures, &mesh, 4, 4);
        assert_eq!(frame.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(frame.get_pixel(1, 0).0, [10, 20, 30, 255]);
        assert_eq!(frame.get_pixel(3, 3).0, [0, 0, 0, 0]);
    }
}
