use serde::{Deserialize, Serialize};

/// Screen coordinate in physical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Screen-coordinate rectangle (search region, match box)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub l: i32,
    pub t: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(l: i32, t: i32, w: u32, h: u32) -> Self {
        Self { l, t, w, h }
    }

    /// Centre of the box, rounded down like integer division.
    pub fn center(&self) -> Point {
        Point::new(self.l + (self.w / 2) as i32, self.t + (self.h / 2) as i32)
    }
}

/// Raw screenshot pixel data (RGBA, tightly packed rows)
#[derive(Debug, Clone)]
pub struct Capture {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Screen position of the captured area's top-left pixel.
    pub origin: Point,
}

impl Capture {
    pub fn from_rgba(image: image::RgbaImage, origin: Point) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            origin,
        }
    }

    pub fn to_rgba(&self) -> Option<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Crop to `rect` (screen coordinates), clamped to the captured area.
    pub fn crop(&self, rect: Rect) -> Option<Capture> {
        let x0 = (rect.l - self.origin.x).max(0) as u32;
        let y0 = (rect.t - self.origin.y).max(0) as u32;
        let x1 = ((rect.l - self.origin.x) as i64 + rect.w as i64).clamp(0, self.width as i64) as u32;
        let y1 = ((rect.t - self.origin.y) as i64 + rect.h as i64).clamp(0, self.height as i64) as u32;
        if x0 >= x1 || y0 >= y1 {
            return None;
        }

        let row = self.width as usize * 4;
        let mut data = Vec::with_capacity(((x1 - x0) * (y1 - y0) * 4) as usize);
        for y in y0..y1 {
            let start = y as usize * row + x0 as usize * 4;
            let end = y as usize * row + x1 as usize * 4;
            data.extend_from_slice(&self.data[start..end]);
        }

        Some(Capture {
            data,
            width: x1 - x0,
            height: y1 - y0,
            origin: Point::new(self.origin.x + x0 as i32, self.origin.y + y0 as i32),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
}
