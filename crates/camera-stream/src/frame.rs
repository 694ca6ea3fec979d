use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Encoding of a frame, sniffed from its leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Unknown,
}

impl ImageFormat {
    #[must_use]
    pub fn sniff(data: &[u8]) -> Self {
        if data.starts_with(&JPEG_MAGIC) {
            Self::Jpeg
        } else if data.starts_with(&PNG_MAGIC) {
            Self::Png
        } else {
            Self::Unknown
        }
    }

    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Unknown => "application/octet-stream",
        }
    }
}

/// One complete encoded image. Each new frame replaces the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraFrame {
    #[serde(skip)]
    pub data: Bytes,
    pub format: ImageFormat,
    pub received_at: DateTime<Utc>,
    /// Position of the frame within its connection, starting at 1.
    pub sequence: u64,
}

impl CameraFrame {
    #[must_use]
    pub fn new(data: Bytes, received_at: DateTime<Utc>, sequence: u64) -> Self {
        Self { format: ImageFormat::sniff(&data), data, received_at, sequence }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff() {
        assert_eq!(ImageFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::sniff(b"\x89PNG\r\n\x1a\n\0\0"), ImageFormat::Png);
        assert_eq!(ImageFormat::sniff(b"GIF89a"), ImageFormat::Unknown);
        assert_eq!(ImageFormat::sniff(&[]), ImageFormat::Unknown);
    }

    #[test]
    fn content_types() {
        assert_eq!(ImageFormat::Jpeg.content_type(), "image/jpeg");
        assert_eq!(ImageFormat::Unknown.content_type(), "application/octet-stream");
    }

    #[test]
    fn frame_records_format() {
        let frame = CameraFrame::new(Bytes::from_static(&[0xFF, 0xD8, 0xFF]), Utc::now(), 1);
        assert_eq!(frame.format, ImageFormat::Jpeg);
        assert_eq!(frame.len(), 3);
    }
}
