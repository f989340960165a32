//! Frame presentation: plane fit, UV orientation, render surfaces.
//!
//! The frame is drawn on a plane of `size` world units, scaled into the
//! viewport (cover or contain, times zoom) and shifted vertically by `yPct`.
//! Texture orientation is a UV transform in the usual
//! offset/repeat/rotation/center form:
//!
//! uv' = R(rotation) * S(repeat) * (uv - center) + center + offset
//!
//! Surfaces draw on demand: `present()` uploads, `request_redraw()` marks
//! dirty, the host draws only when something changed.

use std::f32::consts::PI;
use std::path::Path;
use std::sync::Arc;

use glam::{Affine2, Vec2};
use image::{Rgba, RgbaImage};
use log::{debug, trace, warn};

use crate::entities::{Fit, Orient, SequenceConfig, Texture};

/// Plane size used when the configured one is unusable
const FALLBACK_PLANE: [f32; 2] = [16.0, 9.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn size(self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }
}

/// Plane placement options taken from the sequence config
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneParams {
    pub size: Vec2,
    pub fit: Fit,
    pub zoom: f32,
    pub y_pct: f32,
}

impl PlaneParams {
    pub fn from_config(cfg: &SequenceConfig) -> Self {
        let [w, h] = cfg.size;
        let size = if w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0 {
            Vec2::new(w, h)
        } else {
            warn!("Plane size {:?} invalid, using {:?}", cfg.size, FALLBACK_PLANE);
            Vec2::from(FALLBACK_PLANE)
        };
        let zoom = if cfg.zoom.is_finite() && cfg.zoom > 0.0 { cfg.zoom } else { 1.0 };
        let y_pct = if cfg.y_pct.is_finite() { cfg.y_pct } else { 0.0 };
        Self { size, fit: cfg.fit, zoom, y_pct }
    }
}

impl Default for PlaneParams {
    fn default() -> Self {
        Self {
            size: Vec2::from(FALLBACK_PLANE),
            fit: Fit::Cover,
            zoom: 1.0,
            y_pct: 0.0,
        }
    }
}

/// Scaled plane in viewport units, centered horizontally
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneLayout {
    pub scale: f32,
    pub width: f32,
    pub height: f32,
    /// Upward shift of the plane center
    pub offset_y: f32,
}

pub fn plane_layout(params: &PlaneParams, viewport: Viewport) -> PlaneLayout {
    let vp = viewport.size();
    let ratio = vp / params.size;
    let fit = match params.fit {
        Fit::Cover => ratio.x.max(ratio.y),
        Fit::Contain => ratio.x.min(ratio.y),
    };
    let scale = fit * params.zoom;
    let height = params.size.y * scale;

    // Only a plane shorter than the viewport can move, and never past its edges
    let limit = ((vp.y - height) / 2.0).max(0.0);
    let offset_y = (params.y_pct / 100.0 * vp.y / 2.0).clamp(-limit, limit);

    PlaneLayout {
        scale,
        width: params.size.x * scale,
        height,
        offset_y,
    }
}

/// Texture-space orientation transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvTransform {
    pub offset: Vec2,
    pub repeat: Vec2,
    pub rotation: f32,
    pub center: Vec2,
}

impl Default for UvTransform {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            repeat: Vec2::ONE,
            rotation: 0.0,
            center: Vec2::ZERO,
        }
    }
}

impl UvTransform {
    pub fn from_orient(orient: Orient) -> Self {
        match orient {
            Orient::None => Self::default(),
            Orient::FlipY => Self {
                repeat: Vec2::new(1.0, -1.0),
                offset: Vec2::new(0.0, 1.0),
                ..Self::default()
            },
            Orient::FlipX => Self {
                repeat: Vec2::new(-1.0, 1.0),
                offset: Vec2::new(1.0, 0.0),
                ..Self::default()
            },
            Orient::Rotate180 => Self {
                rotation: PI,
                center: Vec2::splat(0.5),
                ..Self::default()
            },
        }
    }

    pub fn matrix(&self) -> Affine2 {
        let (s, c) = self.rotation.sin_cos();
        let Vec2 { x: sx, y: sy } = self.repeat;
        let Vec2 { x: cx, y: cy } = self.center;
        Affine2::from_cols(
            Vec2::new(sx * c, -sy * s),
            Vec2::new(sx * s, sy * c),
            Vec2::new(
                -sx * (c * cx + s * cy) + cx + self.offset.x,
                -sy * (-s * cx + c * cy) + cy + self.offset.y,
            ),
        )
    }

    /// Transformed UV, wrapped into [0, 1) (repeat wrapping)
    pub fn apply(&self, uv: Vec2) -> Vec2 {
        let t = self.matrix().transform_point2(uv);
        Vec2::new(wrap_unit(t.x), wrap_unit(t.y))
    }
}

fn wrap_unit(v: f32) -> f32 {
    // snap float noise so exact edges do not wrap to the far side
    let snapped = if (v - v.round()).abs() < 1e-5 { v.round() } else { v };
    snapped.rem_euclid(1.0)
}

pub trait RenderSurface {
    /// Upload `texture` as the displayed frame.
    fn present(&mut self, texture: &Arc<Texture>, uv: UvTransform);

    /// Mark the surface dirty; the next host frame draws.
    fn request_redraw(&mut self);

    fn resize(&mut self, viewport: Viewport);

    /// Show or hide the plane; the uploaded frame is kept.
    fn set_visible(&mut self, visible: bool) {
        let _ = visible;
    }

    /// Plane placement; called once at player setup.
    fn configure(&mut self, plane: PlaneParams) {
        let _ = plane;
    }
}

/// CPU rasterizer with nearest sampling, drawn only when dirty
pub struct SoftwareSurface {
    viewport: Viewport,
    plane: PlaneParams,
    frame: Option<(Arc<RgbaImage>, UvTransform)>,
    shown: Option<usize>,
    canvas: RgbaImage,
    background: Rgba<u8>,
    visible: bool,
    dirty: bool,
    draws: u64,
}

impl SoftwareSurface {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            plane: PlaneParams::default(),
            frame: None,
            shown: None,
            canvas: RgbaImage::new(viewport.width, viewport.height),
            background: Rgba([0, 0, 0, 0]),
            visible: true,
            dirty: true,
            draws: 0,
        }
    }

    pub fn with_background(mut self, color: [u8; 4]) -> Self {
        self.background = Rgba(color);
        self
    }

    /// Draw if a redraw was requested. Returns whether it drew.
    pub fn draw_if_requested(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        self.draw();
        self.dirty = false;
        true
    }

    fn draw(&mut self) {
        self.draws += 1;
        for px in self.canvas.pixels_mut() {
            *px = self.background;
        }
        let Some((pixels, uv)) = self.frame.as_ref().filter(|_| self.visible) else {
            return;
        };
        let (tw, th) = pixels.dimensions();
        if tw == 0 || th == 0 {
            return;
        }

        let layout = plane_layout(&self.plane, self.viewport);
        let vp = self.viewport.size();
        let left = (vp.x - layout.width) / 2.0;
        let top = (vp.y - layout.height) / 2.0 - layout.offset_y;
        let m = uv.matrix();

        for (x, y, px) in self.canvas.enumerate_pixels_mut() {
            let rel = Vec2::new(
                (x as f32 + 0.5 - left) / layout.width,
                (y as f32 + 0.5 - top) / layout.height,
            );
            if !(0.0..1.0).contains(&rel.x) || !(0.0..1.0).contains(&rel.y) {
                continue;
            }
            // v runs bottom-up; unflipped row 0 sits at v = 0
            let t = m.transform_point2(Vec2::new(rel.x, 1.0 - rel.y));
            let (u, v) = (wrap_unit(t.x), wrap_unit(t.y));
            let sx = ((u * tw as f32) as u32).min(tw - 1);
            let sy = ((v * th as f32) as u32).min(th - 1);
            *px = *pixels.get_pixel(sx, sy);
        }
        trace!("SoftwareSurface draw #{} ({:?})", self.draws, self.shown);
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn draws(&self) -> u64 {
        self.draws
    }

    pub fn shown(&self) -> Option<usize> {
        self.shown
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn save_png(&self, path: &Path) -> image::ImageResult<()> {
        self.canvas.save_with_format(path, image::ImageFormat::Png)
    }
}

impl RenderSurface for SoftwareSurface {
    fn present(&mut self, texture: &Arc<Texture>, uv: UvTransform) {
        match texture.pixels() {
            Some(pixels) => {
                self.frame = Some((pixels, uv));
                self.shown = Some(texture.index());
            }
            None => warn!("Frame {} released before upload, keeping previous", texture.index()),
        }
    }

    fn request_redraw(&mut self) {
        self.dirty = true;
    }

    fn resize(&mut self, viewport: Viewport) {
        if viewport == self.viewport {
            return;
        }
        debug!("SoftwareSurface resize {}x{}", viewport.width, viewport.height);
        self.viewport = viewport;
        self.canvas = RgbaImage::new(viewport.width, viewport.height);
        self.dirty = true;
    }

    fn set_visible(&mut self, visible: bool) {
        if self.visible != visible {
            self.visible = visible;
            self.dirty = true;
        }
    }

    fn configure(&mut self, plane: PlaneParams) {
        self.plane = plane;
        self.dirty = true;
    }
}

/// Records what was presented; draws nothing
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    pub presented: Vec<usize>,
    pub redraws: usize,
    pub viewport: Option<Viewport>,
    pub plane: Option<PlaneParams>,
    pub hidden: bool,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_presented(&self) -> Option<usize> {
        self.presented.last().copied()
    }
}

impl RenderSurface for HeadlessSurface {
    fn present(&mut self, texture: &Arc<Texture>, _uv: UvTransform) {
        self.presented.push(texture.index());
    }

    fn request_redraw(&mut self) {
        self.redraws += 1;
    }

    fn resize(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }

    fn set_visible(&mut self, visible: bool) {
        self.hidden = !visible;
    }

    fn configure(&mut self, plane: PlaneParams) {
        self.plane = Some(plane);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec2, b: Vec2) -> bool {
        (a - b).abs().max_element() < 1e-4
    }

    #[test]
    fn test_orient_transforms() {
        let p = Vec2::new(0.25, 0.1);
        assert!(approx(UvTransform::from_orient(Orient::None).apply(p), p));
        assert!(approx(UvTransform::from_orient(Orient::FlipY).apply(p), Vec2::new(0.25, 0.9)));
        assert!(approx(UvTransform::from_orient(Orient::FlipX).apply(p), Vec2::new(0.75, 0.1)));
        assert!(approx(UvTransform::from_orient(Orient::Rotate180).apply(p), Vec2::new(0.75, 0.9)));
    }

    #[test]
    fn test_cover_and_contain() {
        let vp = Viewport::new(1600, 900);
        let mut params = PlaneParams::default();
        let cover = plane_layout(&params, vp);
        assert!((cover.scale - 100.0).abs() < 1e-3);

        // taller viewport: cover fills height, contain fits width
        let tall = Viewport::new(900, 1600);
        let cover = plane_layout(&params, tall);
        assert!((cover.height - 1600.0).abs() < 1e-2);
        params.fit = Fit::Contain;
        let contain = plane_layout(&params, tall);
        assert!((contain.width - 900.0).abs() < 1e-2);

        params.zoom = 2.0;
        assert!((plane_layout(&params, tall).width - 1800.0).abs() < 1e-2);
    }

    #[test]
    fn test_vertical_offset_is_clamped() {
        // cover overflows the viewport: no room to move
        let vp = Viewport::new(1600, 900);
        let params = PlaneParams { zoom: 1.1, y_pct: 15.0, ..PlaneParams::default() };
        let layout = plane_layout(&params, vp);
        assert!((layout.height - 990.0).abs() < 1e-2);
        assert_eq!(layout.offset_y, 0.0);

        // contain in a square viewport: 900 tall plane, 350 of slack each way
        let square = Viewport::new(1600, 1600);
        let params = PlaneParams { fit: Fit::Contain, y_pct: 15.0, ..PlaneParams::default() };
        assert!((plane_layout(&params, square).offset_y - 120.0).abs() < 1e-2);
        let params = PlaneParams { y_pct: -100.0, ..params };
        assert!((plane_layout(&params, square).offset_y + 350.0).abs() < 1e-2);
    }

    fn two_row_texture() -> Arc<Texture> {
        // row 0 red, row 1 blue
        let mut img = RgbaImage::new(2, 2);
        for x in 0..2 {
            img.put_pixel(x, 0, Rgba([255, 0, 0, 255]));
            img.put_pixel(x, 1, Rgba([0, 0, 255, 255]));
        }
        Arc::new(Texture::new(7, "t.png", img))
    }

    #[test]
    fn test_software_surface_orientation() {
        let vp = Viewport::new(16, 9);
        let tex = two_row_texture();

        let mut surface = SoftwareSurface::new(vp);
        surface.present(&tex, UvTransform::from_orient(Orient::None));
        surface.request_redraw();
        assert!(surface.draw_if_requested());
        // unflipped: image row 0 lands at the bottom of the screen
        assert_eq!(surface.canvas().get_pixel(8, 0)[2], 255);
        assert_eq!(surface.canvas().get_pixel(8, 8)[0], 255);

        surface.present(&tex, UvTransform::from_orient(Orient::FlipY));
        surface.request_redraw();
        surface.draw_if_requested();
        assert_eq!(surface.canvas().get_pixel(8, 0)[0], 255);
        assert_eq!(surface.canvas().get_pixel(8, 8)[2], 255);
        assert_eq!(surface.shown(), Some(7));
    }

    #[test]
    fn test_draws_on_demand() {
        let mut surface = SoftwareSurface::new(Viewport::new(4, 4));
        assert!(surface.draw_if_requested());
        assert!(!surface.draw_if_requested());

        surface.resize(Viewport::new(8, 4));
        assert!(surface.draw_if_requested());
        assert_eq!(surface.canvas().dimensions(), (8, 4));
        assert_eq!(surface.draws(), 2);
    }

    #[test]
    fn test_hidden_plane_draws_background_only() {
        let mut surface = SoftwareSurface::new(Viewport::new(16, 9)).with_background([1, 2, 3, 255]);
        surface.present(&two_row_texture(), UvTransform::default());
        surface.set_visible(false);
        surface.draw_if_requested();
        assert_eq!(surface.canvas().get_pixel(8, 4), &Rgba([1, 2, 3, 255]));

        surface.set_visible(true);
        assert!(surface.draw_if_requested());
        assert_ne!(surface.canvas().get_pixel(8, 4), &Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn test_released_texture_keeps_previous_upload() {
        use crate::entities::Releasable;

        let mut surface = SoftwareSurface::new(Viewport::new(4, 4));
        let first = two_row_texture();
        surface.present(&first, UvTransform::default());
        first.release();

        let gone = Arc::new(Texture::new(9, "gone.png", RgbaImage::new(1, 1)));
        gone.release();
        surface.present(&gone, UvTransform::default());
        assert_eq!(surface.shown(), Some(7));
    }
}
