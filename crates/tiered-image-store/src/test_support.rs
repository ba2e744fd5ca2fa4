//! Fixtures shared by the unit tests

use crate::error::StorageError;
use crate::storage::{ImageStorage, MemoryStorage, StorageResult};
use crate::types::ImageRecord;
use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

fn encode(img: DynamicImage, format: ImageFormat) -> Bytes {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    Bytes::from(buf)
}

/// A small gradient PNG with an alpha channel
pub fn png_bytes(width: u32, height: u32) -> Bytes {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 31 % 256) as u8, (y * 17 % 256) as u8, 128, 200])
    });
    encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Bytes {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 13 % 256) as u8, (y * 7 % 256) as u8, 64])
    });
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg)
}

/// Memory tier whose operations can be made to fail or stall on demand
#[derive(Default)]
pub struct FlakyStorage {
    pub inner: MemoryStorage,
    pub fail_saves: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub fail_gets: AtomicBool,
    pub stall: Option<Duration>,
}

impl FlakyStorage {
    pub fn stalling(delay: Duration) -> Self {
        Self {
            stall: Some(delay),
            ..Default::default()
        }
    }

    fn injected(what: &str) -> StorageError {
        std::io::Error::new(std::io::ErrorKind::Other, format!("injected {} failure", what))
            .into()
    }

    async fn maybe_stall(&self) {
        if let Some(delay) = self.stall {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ImageStorage for FlakyStorage {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn save(&self, record: &ImageRecord) -> StorageResult<()> {
        self.maybe_stall().await;
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Self::injected("save"));
        }
        self.inner.save(record).await
    }

    async fn get(&self, id: &str) -> StorageResult<ImageRecord> {
        self.maybe_stall().await;
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(Self::injected("get"));
        }
        self.inner.get(id).await
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        self.maybe_stall().await;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::injected("delete"));
        }
        self.inner.delete(id).await
    }

    async fn list(&self) -> StorageResult<Vec<String>> {
        self.inner.list().await
    }
}
