use image::{Rgba, RgbaImage};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Four corners in clockwise order starting top-left.
pub type Quad = [Point; 4];

/// Projective map `(x, y) -> ((a x + b y + c) / (g x + h y + 1), (d x + e y + f) / (g x + h y + 1))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography([f64; 8]);

impl Homography {
    /// Solve for the map taking each `from[i]` to `to[i]`.
    /// Returns `None` when the points are degenerate (three collinear).
    pub fn from_quads(from: &Quad, to: &Quad) -> Option<Self> {
        let mut m = [[0f64; 9]; 8];
        for (i, (p, q)) in from.iter().zip(to).enumerate() {
            m[2 * i] = [p.x, p.y, 1.0, 0.0, 0.0, 0.0, -p.x * q.x, -p.y * q.x, q.x];
            m[2 * i + 1] = [0.0, 0.0, 0.0, p.x, p.y, 1.0, -p.x * q.y, -p.y * q.y, q.y];
        }
        solve(m).map(Self)
    }

    pub fn apply(&self, p: Point) -> Option<Point> {
        let [a, b, c, d, e, f, g, h] = self.0;
        let w = g * p.x + h * p.y + 1.0;
        if w.abs() < 1e-12 {
            return None;
        }
        Some(Point::new(
            (a * p.x + b * p.y + c) / w,
            (d * p.x + e * p.y + f) / w,
        ))
    }
}

// Gaussian elimination with partial pivoting on an 8x9 augmented matrix.
fn solve(mut m: [[f64; 9]; 8]) -> Option<[f64; 8]> {
    for col in 0..8 {
        let pivot = (col..8).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot][col].abs() < 1e-10 {
            return None;
        }
        m.swap(col, pivot);

        for row in 0..8 {
            if row == col {
                continue;
            }
            let factor = m[row][col] / m[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..9 {
                m[row][k] -= factor * m[col][k];
            }
        }
    }

    let mut out = [0f64; 8];
    for (i, v) in out.iter_mut().enumerate() {
        *v = m[i][8] / m[i][i];
    }
    Some(out)
}

/// Warp `src` so that its corners `from` land on `to` in an output of the
/// given size. Output pixels that map outside `src` stay transparent.
pub fn warp_perspective(
    src: &RgbaImage,
    from: &Quad,
    to: &Quad,
    width: u32,
    height: u32,
) -> Option<RgbaImage> {
    // inverse mapping: for every output pixel find where it came from
    let inverse = Homography::from_quads(to, from)?;

    let mut out = RgbaImage::new(width, height);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let center = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
        if let Some(p) = inverse.apply(center) {
            *pixel = sample_bilinear(src, p.x - 0.5, p.y - 0.5);
        }
    }
    Some(out)
}

// Bilinear sample with premultiplied weights so transparent neighbours do
// not bleed black into the edge.
fn sample_bilinear(src: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let (w, h) = (i64::from(src.width()), i64::from(src.height()));
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let mut color = [0f64; 3];
    let mut alpha = 0f64;
    for (dx, dy, weight) in [
        (0, 0, (1.0 - fx) * (1.0 - fy)),
        (1, 0, fx * (1.0 - fy)),
        (0, 1, (1.0 - fx) * fy),
        (1, 1, fx * fy),
    ] {
        let (sx, sy) = (x0 + dx, y0 + dy);
        if weight <= 0.0 || sx < 0 || sy < 0 || sx >= w || sy >= h {
            continue;
        }
        let p = src.get_pixel(sx as u32, sy as u32);
        let a = f64::from(p[3]) * weight;
        for c in 0..3 {
            color[c] += f64::from(p[c]) * a;
        }
        alpha += a;
    }

    if alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        out[c] = (color[c] / alpha).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = alpha.round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}
