use image::imageops::{self, FilterType};
use image::RgbImage;

pub const PLACEHOLDER_MESSAGE: &str = "Click \"Start Camera\" or \"Upload Image\" to begin.";
pub const PLACEHOLDER_BACKGROUND: [u8; 3] = [0xe2, 0xe8, 0xf0];
pub const PLACEHOLDER_TEXT: [u8; 3] = [0x64, 0x74, 0x8b];

/// Space the surface may occupy, as reported by the host window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceBounds {
    pub client_width: f32,
    pub client_height: f32,
    pub viewport_height: f32,
}

impl SurfaceBounds {
    pub fn new(client_width: f32, client_height: f32, viewport_height: f32) -> Self {
        Self {
            client_width,
            client_height,
            viewport_height,
        }
    }
}

/// Shape of the static placeholder drawn when there is nothing else to show.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaceholderStyle {
    pub aspect_width: f32,
    pub aspect_height: f32,
    pub max_viewport_fraction: f32,
}

impl Default for PlaceholderStyle {
    fn default() -> Self {
        Self {
            aspect_width: 4.0,
            aspect_height: 3.0,
            max_viewport_fraction: 0.6,
        }
    }
}

/// Largest rectangle with the source's aspect ratio that fits the client width,
/// clamped to the client height when that is the binding constraint.
pub fn fit_to_bounds(source_width: u32, source_height: u32, bounds: &SurfaceBounds) -> (f32, f32) {
    if source_width == 0 || source_height == 0 {
        return (0.0, 0.0);
    }
    let aspect_ratio = source_width as f32 / source_height as f32;

    let mut width = bounds.client_width;
    let mut height = width / aspect_ratio;

    // A zero client height means the host has not laid the surface out yet
    if height > bounds.client_height && bounds.client_height > 0.0 {
        height = bounds.client_height;
        width = height * aspect_ratio;
    }

    (width, height)
}

/// Placeholder size: full client width at the placeholder ratio, capped to a
/// fraction of the viewport height.
pub fn placeholder_size(bounds: &SurfaceBounds, style: &PlaceholderStyle) -> (f32, f32) {
    let ratio = style.aspect_height / style.aspect_width;
    let mut width = bounds.client_width;
    let mut height = width * ratio;

    let max_height = bounds.viewport_height * style.max_viewport_fraction;
    if height > max_height {
        height = max_height;
        width = height / ratio;
    }

    (width, height)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceContent {
    Placeholder { message: &'static str },
    Frame { caption: Option<String> },
}

/// Raster the controller draws into; the GUI mirrors it into a texture.
pub struct DisplaySurface {
    bounds: SurfaceBounds,
    style: PlaceholderStyle,
    width: f32,
    height: f32,
    content: SurfaceContent,
    pixels: Option<RgbImage>,
    revision: u64,
}

impl DisplaySurface {
    pub fn new(bounds: SurfaceBounds, style: PlaceholderStyle) -> Self {
        let mut surface = Self {
            bounds,
            style,
            width: 0.0,
            height: 0.0,
            content: SurfaceContent::Placeholder {
                message: PLACEHOLDER_MESSAGE,
            },
            pixels: None,
            revision: 0,
        };
        surface.draw_placeholder();
        surface
    }

    pub fn set_bounds(&mut self, bounds: SurfaceBounds) {
        self.bounds = bounds;
    }

    pub fn draw_placeholder(&mut self) {
        let (width, height) = placeholder_size(&self.bounds, &self.style);
        self.width = width;
        self.height = height;
        self.content = SurfaceContent::Placeholder {
            message: PLACEHOLDER_MESSAGE,
        };
        self.pixels = None;
        self.revision += 1;
    }

    /// Resize the surface to fit `source` and redraw it at that size.
    pub fn draw_source(&mut self, source: &RgbImage, caption: Option<String>) {
        let (width, height) = fit_to_bounds(source.width(), source.height(), &self.bounds);
        self.width = width;
        self.height = height;

        let (raster_width, raster_height) = self.raster_size();
        let pixels = if source.dimensions() == (raster_width, raster_height) {
            source.clone()
        } else {
            imageops::resize(source, raster_width, raster_height, FilterType::Triangle)
        };

        self.content = SurfaceContent::Frame { caption };
        self.pixels = Some(pixels);
        self.revision += 1;
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.content, SurfaceContent::Placeholder { .. })
    }

    pub fn content(&self) -> &SurfaceContent {
        &self.content
    }

    /// Drawn frame pixels; `None` while the placeholder is showing.
    pub fn pixels(&self) -> Option<&RgbImage> {
        self.pixels.as_ref()
    }

    pub fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    /// Integer raster size, truncating the fractional surface size.
    pub fn raster_size(&self) -> (u32, u32) {
        ((self.width as u32).max(1), (self.height as u32).max(1))
    }

    pub fn font_size(&self) -> f32 {
        (self.width / 20.0).max(16.0)
    }

    /// Bumped on every redraw so the GUI knows when to re-upload its texture.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}
