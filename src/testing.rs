//! Shared fakes for unit tests: in-memory fetcher and encoded frames.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{ImageFormat, Rgba, RgbaImage};

use crate::core::inflight::CancelHandle;
use crate::fetch::{FetchError, FrameFetcher};

/// PNG payload of a `w`x`h` image filled with `color`
pub fn png_bytes(w: u32, h: u32, color: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(w, h, Rgba(color));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).expect("encode png");
    out.into_inner()
}

/// Serves registered payloads, 404s everything else, records every URL tried.
///
/// With a gate, fetches block until `open()` (or until cancelled).
#[derive(Default)]
pub struct MemoryFetcher {
    files: Mutex<HashMap<String, Vec<u8>>>,
    tried: Mutex<Vec<String>>,
    gate: Option<Arc<AtomicBool>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(AtomicBool::new(false))),
            ..Self::default()
        }
    }

    pub fn insert(&self, url: &str, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(url.to_string(), bytes);
    }

    /// Register a small PNG for each URL
    pub fn with_frames<'a>(self, urls: impl IntoIterator<Item = &'a str>) -> Self {
        for url in urls {
            self.insert(url, png_bytes(4, 2, [200, 10, 10, 255]));
        }
        self
    }

    pub fn open(&self) {
        if let Some(gate) = &self.gate {
            gate.store(true, Ordering::SeqCst);
        }
    }

    pub fn tried(&self) -> Vec<String> {
        self.tried.lock().unwrap().clone()
    }

    pub fn tried_count(&self, url: &str) -> usize {
        self.tried.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

impl FrameFetcher for MemoryFetcher {
    fn fetch(&self, url: &str, cancel: &CancelHandle) -> Result<Vec<u8>, FetchError> {
        self.tried.lock().unwrap().push(url.to_string());
        if let Some(gate) = &self.gate {
            while !gate.load(Ordering::SeqCst) {
                if cancel.is_aborted() {
                    return Err(FetchError::Cancelled);
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        if cancel.is_aborted() {
            return Err(FetchError::Cancelled);
        }
        self.files.lock().unwrap().get(url).cloned().ok_or(FetchError::Status(404))
    }
}
