use crate::atlas::TextureSource;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

/// Decoded RGBA8 pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
}

#[derive(Debug)]
pub struct LoadResult {
    pub name: String,
    pub image: Result<DecodedImage, String>,
}

/// Decodes atlas images off the frame thread. Results come back over a
/// channel and are applied by the renderer when it polls.
#[derive(Debug)]
pub struct TextureLoader {
    tx: Sender<LoadResult>,
    rx: Receiver<LoadResult>,
    pending: usize,
}

impl Default for TextureLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureLoader {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx, pending: 0 }
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn request(&mut self, name: &str, source: &TextureSource) {
        self.pending += 1;
        let tx = self.tx.clone();
        let name = name.to_string();
        let source = source.clone();
        thread::spawn(move || {
            let image = decode(&source);
            // The receiver is gone only if the renderer was dropped.
            let _ = tx.send(LoadResult { name, image });
        });
    }

    /// Completed loads, without blocking.
    pub fn poll(&mut self) -> Vec<LoadResult> {
        let done: Vec<_> = self.rx.try_iter().collect();
        self.pending -= done.len().min(self.pending);
        done
    }

    /// Blocks until every pending load finished or `timeout` elapsed per load.
    pub fn wait(&mut self, timeout: Duration) -> Vec<LoadResult> {
        let mut done = Vec::new();
        while self.pending > 0 {
            match self.rx.recv_timeout(timeout) {
                Ok(result) => {
                    self.pending -= 1;
                    done.push(result);
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        done
    }
}

fn decode(source: &TextureSource) -> Result<DecodedImage, String> {
    match source {
        TextureSource::File(path) => {
            let image = image::open(path)
                .map_err(|e| format!("{}: {e}", path.display()))?
                .to_rgba8();
            let (width, height) = image.dimensions();
            Ok(DecodedImage {
                width,
                height,
                pixels: image.into_raw().into(),
            })
        }
        TextureSource::Rgba {
            width,
            height,
            pixels,
        } => {
            let expected = (*width as usize) * (*height as usize) * 4;
            if pixels.len() != expected {
                return Err(format!(
                    "{width}x{height} image needs {expected} bytes, got {}",
                    pixels.len()
                ));
            }
            Ok(DecodedImage {
                width: *width,
                height: *height,
                pixels: Arc::clone(pixels),
            })
        }
    }
}
