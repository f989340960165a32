//! Decoded frame resource
//!
//! A `Texture` is what the frame cache owns: decoded RGBA8 pixels plus the
//! render settings applied on the cheap decode path. Pixel memory is freed by
//! an explicit `release()`, called by the cache on eviction and teardown.
//!
//! A surface that presented a texture keeps its own reference to the pixels
//! (the equivalent of a GPU upload), so releasing a displayed texture does not
//! blank the screen until the next frame replaces it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use image::RgbaImage;
use uuid::Uuid;

/// Resource with an explicit release step.
///
/// `release` must be idempotent: the cache may release an entry that a caller
/// already released by hand.
pub trait Releasable {
    fn release(&self);
    fn is_released(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Srgb,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Linear,
}

/// Sampling/upload settings for a frame texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSettings {
    pub color_space: ColorSpace,
    /// Row 0 of the image maps to v = 0 when false
    pub flip_y: bool,
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmaps: bool,
}

impl TextureSettings {
    /// sRGB, no flip, linear filtering, no mip chain
    pub const fn frame_defaults() -> Self {
        Self {
            color_space: ColorSpace::Srgb,
            flip_y: false,
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            mipmaps: false,
        }
    }
}

impl Default for TextureSettings {
    fn default() -> Self {
        Self::frame_defaults()
    }
}

pub struct Texture {
    id: Uuid,
    index: usize,
    url: String,
    width: u32,
    height: u32,
    settings: TextureSettings,
    pixels: Mutex<Option<Arc<RgbaImage>>>,
    released: AtomicBool,
}

impl Texture {
    /// Wrap decoded pixels for frame `index`, fetched from `url`.
    pub fn new(index: usize, url: impl Into<String>, image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            id: Uuid::new_v4(),
            index,
            url: url.into(),
            width,
            height,
            settings: TextureSettings::frame_defaults(),
            pixels: Mutex::new(Some(Arc::new(image))),
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Frame index this texture was decoded for
    pub fn index(&self) -> usize {
        self.index
    }

    /// Candidate URL that produced the pixels
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn settings(&self) -> TextureSettings {
        self.settings
    }

    /// Shared pixel buffer, `None` once released.
    pub fn pixels(&self) -> Option<Arc<RgbaImage>> {
        self.pixels.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Approximate resident size in bytes (0 after release)
    pub fn mem(&self) -> usize {
        if self.is_released() {
            0
        } else {
            self.width as usize * self.height as usize * 4
        }
    }
}

impl Releasable for Texture {
    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.pixels.lock().unwrap_or_else(|e| e.into_inner()).take();
        log::trace!("Released texture {} (frame {})", self.id, self.index);
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("index", &self.index)
            .field("url", &self.url)
            .field("size", &(self.width, self.height))
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_drops_pixels_once() {
        let tex = Texture::new(3, "a.png", RgbaImage::new(4, 2));
        assert_eq!(tex.mem(), 32);
        let held = tex.pixels().expect("pixels before release");

        tex.release();
        tex.release();

        assert!(tex.is_released());
        assert!(tex.pixels().is_none());
        assert_eq!(tex.mem(), 0);
        // an earlier upload keeps its own copy
        assert_eq!(held.dimensions(), (4, 2));
    }

    #[test]
    fn test_frame_defaults() {
        let tex = Texture::new(0, "x", RgbaImage::new(1, 1));
        let s = tex.settings();
        assert_eq!(s.color_space, ColorSpace::Srgb);
        assert!(!s.flip_y);
        assert!(!s.mipmaps);
        assert_eq!(s.min_filter, Filter::Linear);
    }
}
