use bytemuck::{Pod, Zeroable};

/// Axis-aligned rectangle in logical pixels, y down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl QuadRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width.max(1) as f32, height.max(1) as f32)
    }

    pub fn contains(&self, point: [f32; 2]) -> bool {
        point[0] >= self.x
            && point[0] < self.x + self.width
            && point[1] >= self.y
            && point[1] < self.y + self.height
    }

    /// Position relative to the rect, `[0, 1]` inside it.
    pub fn to_uv(&self, point: [f32; 2]) -> [f32; 2] {
        [
            (point[0] - self.x) / self.width.max(f32::EPSILON),
            (point[1] - self.y) / self.height.max(f32::EPSILON),
        ]
    }

    /// This rect expressed as a fraction of a `width` x `height` canvas.
    pub fn normalized_in(&self, width: u32, height: u32) -> [f32; 4] {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        [self.x / w, self.y / h, self.width / w, self.height / h]
    }
}

/// Largest rect with the content's aspect that fits the canvas, centred and
/// snapped to whole pixels.
pub fn contain_rect(canvas_w: u32, canvas_h: u32, content_w: u32, content_h: u32) -> QuadRect {
    let iw = content_w.max(1) as f32;
    let ih = content_h.max(1) as f32;
    let cw = canvas_w.max(1) as f32;
    let ch = canvas_h.max(1) as f32;
    let scale = (cw / iw).min(ch / ih).max(0.0);
    let scale = if scale.is_finite() { scale } else { 1.0 };
    let w = (iw * scale).round().clamp(1.0, cw) as u32;
    let h = (ih * scale).round().clamp(1.0, ch) as u32;
    let (ox, oy) = center_offset(w, h, canvas_w.max(1), canvas_h.max(1));
    QuadRect::new(ox as f32, oy as f32, w as f32, h as f32)
}

fn center_offset(inner_w: u32, inner_h: u32, outer_w: u32, outer_h: u32) -> (u32, u32) {
    let ox = outer_w.saturating_sub(inner_w) / 2;
    let oy = outer_h.saturating_sub(inner_h) / 2;
    (ox, oy)
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GridVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

/// Regular `segments` x `segments` grid covering a [`QuadRect`].
#[derive(Debug, Clone, PartialEq)]
pub struct GridMesh {
    pub rect: QuadRect,
    pub segments: u32,
    pub vertices: Vec<GridVertex>,
    pub indices: Vec<u32>,
}

impl GridMesh {
    pub fn new(rect: QuadRect, segments: u32) -> Self {
        let segments = segments.max(1);
        let stride = segments + 1;
        let mut vertices = Vec::with_capacity((stride * stride) as usize);
        for row in 0..=segments {
            let v = row as f32 / segments as f32;
            for col in 0..=segments {
                let u = col as f32 / segments as f32;
                vertices.push(GridVertex {
                    position: [rect.x + u * rect.width, rect.y + v * rect.height],
                    uv: [u, v],
                });
            }
        }

        let mut indices = Vec::with_capacity((segments * segments * 6) as usize);
        for row in 0..segments {
            for col in 0..segments {
                let tl = row * stride + col;
                let tr = tl + 1;
                let bl = tl + stride;
                let br = bl + 1;
                indices.extend_from_slice(&[tl, bl, tr, tr, bl, br]);
            }
        }

        Self {
            rect,
            segments,
            vertices,
            indices,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contain_centres_wide_content() {
        let rect = contain_rect(100, 100, 200, 100);
        assert_eq!(rect, QuadRect::new(0.0, 25.0, 100.0, 50.0));
    }

    #[test]
    fn contain_centres_tall_content() {
        let rect = contain_rect(200, 100, 50, 100);
        assert_eq!(rect, QuadRect::new(75.0, 0.0, 50.0, 100.0));
    }

    #[test]
    fn grid_covers_rect() {
        let mesh = GridMesh::new(QuadRect::new(10.0, 20.0, 40.0, 30.0), 4);
        assert_eq!(mesh.vertices.len(), 25);
        assert_eq!(mesh.triangle_count(), 32);
        assert_eq!(mesh.vertices[0].position, [10.0, 20.0]);
        assert_eq!(mesh.vertices[24].position, [50.0, 50.0]);
        assert_eq!(mesh.vertices[24].uv, [1.0, 1.0]);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
    }

    #[test]
    fn normalized_rect_is_relative_to_canvas() {
        let rect = QuadRect::new(25.0, 0.0, 50.0, 100.0);
        assert_eq!(rect.normalized_in(100, 100), [0.25, 0.0, 0.5, 1.0]);
    }
}
