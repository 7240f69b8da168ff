/// Separable box blur over a scalar field, clamp-to-edge.
pub fn box_blur_field(field: &[f32], width: usize, height: usize, radius: u32) -> Vec<f32> {
    if radius == 0 || width == 0 || height == 0 || field.len() != width * height {
        return field.to_vec();
    }
    let radius = radius as usize;
    let mut tmp = vec![0.0f32; field.len()];
    let mut out = vec![0.0f32; field.len()];
    blur_pass(field, &mut tmp, width, height, radius, true);
    blur_pass(&tmp, &mut out, width, height, radius, false);
    out
}

fn blur_pass(
    src: &[f32],
    dst: &mut [f32],
    width: usize,
    height: usize,
    radius: usize,
    horizontal: bool,
) {
    let taps = (2 * radius + 1) as f32;
    let (lines, len) = if horizontal {
        (height, width)
    } else {
        (width, height)
    };
    let index = |line: usize, pos: usize| {
        if horizontal {
            line * width + pos
        } else {
            pos * width + line
        }
    };
    for line in 0..lines {
        // running window sum, re-centred one step at a time
        let mut sum = 0.0f32;
        for offset in -(radius as isize)..=(radius as isize) {
            sum += src[index(line, clamp_i(offset, len))];
        }
        for pos in 0..len {
            dst[index(line, pos)] = sum / taps;
            let leaving = clamp_i(pos as isize - radius as isize, len);
            let entering = clamp_i(pos as isize + radius as isize + 1, len);
            sum += src[index(line, entering)] - src[index(line, leaving)];
        }
    }
}

#[inline(always)]
fn clamp_i(value: isize, max: usize) -> usize {
    value.clamp(0, max.saturating_sub(1) as isize) as usize
}
