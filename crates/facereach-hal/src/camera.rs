//! RGB-D sensor frames and the face detector seam.

use facereach_types::{DetectionBox, Pixel, ReachError};

/// Depth sensor units per metre.
pub const DEPTH_UNITS_PER_METRE: f64 = 1000.0;

/// An 8-bit, 3-channel color image.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGB24.
    pub data: Vec<u8>,
}

impl ColorFrame {
    /// A frame with every byte set to `value`.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize * 3],
        }
    }

    /// # Errors
    ///
    /// [`ReachError::Decode`] when the buffer does not hold exactly
    /// `width × height × 3` bytes.
    pub fn validate(&self) -> Result<(), ReachError> {
        let expected = self.width as usize * self.height as usize * 3;
        if self.width == 0 || self.height == 0 || self.data.len() != expected {
            return Err(ReachError::Decode(format!(
                "color frame {}x{} carries {} bytes, expected {expected}",
                self.width,
                self.height,
                self.data.len()
            )));
        }
        Ok(())
    }
}

/// A single-channel depth image in millimetres (0 = no reading).
#[derive(Debug, Clone, PartialEq)]
pub struct DepthFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major depth values.
    pub data_mm: Vec<u16>,
}

impl DepthFrame {
    /// A frame reporting `depth_mm` everywhere.
    pub fn uniform(width: u32, height: u32, depth_mm: u16) -> Self {
        Self {
            width,
            height,
            data_mm: vec![depth_mm; width as usize * height as usize],
        }
    }

    /// # Errors
    ///
    /// [`ReachError::Decode`] when the buffer does not hold exactly
    /// `width × height` samples.
    pub fn validate(&self) -> Result<(), ReachError> {
        let expected = self.width as usize * self.height as usize;
        if self.width == 0 || self.height == 0 || self.data_mm.len() != expected {
            return Err(ReachError::Decode(format!(
                "depth frame {}x{} carries {} samples, expected {expected}",
                self.width,
                self.height,
                self.data_mm.len()
            )));
        }
        Ok(())
    }

    /// Raw reading under `pixel` (coordinates truncated), or `None` outside
    /// the image.
    pub fn depth_mm_at(&self, pixel: Pixel) -> Option<u16> {
        if !(pixel.x.is_finite() && pixel.y.is_finite()) || pixel.x < 0.0 || pixel.y < 0.0 {
            return None;
        }
        let (col, row) = (pixel.x as usize, pixel.y as usize);
        if col >= self.width as usize || row >= self.height as usize {
            return None;
        }
        self.data_mm.get(row * self.width as usize + col).copied()
    }

    /// Reading under `pixel` converted to metres.  A zero reading is returned
    /// as `0.0`; interpreting it is the localizer's job.
    pub fn depth_m_at(&self, pixel: Pixel) -> Option<f64> {
        self.depth_mm_at(pixel)
            .map(|mm| f64::from(mm) / DEPTH_UNITS_PER_METRE)
    }
}

/// Black-box 2-D face detector.
pub trait FaceDetector: Send {
    /// Face boxes found in `frame`, in the detector's own order.
    ///
    /// # Errors
    ///
    /// [`ReachError::Detector`] when inference fails.
    fn detect(&mut self, frame: &ColorFrame) -> Result<Vec<DetectionBox>, ReachError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_frame_validation() {
        assert!(ColorFrame::filled(4, 2, 0).validate().is_ok());
        let short = ColorFrame {
            width: 4,
            height: 2,
            data: vec![0; 5],
        };
        assert!(matches!(short.validate(), Err(ReachError::Decode(_))));
        assert!(ColorFrame::filled(0, 2, 0).validate().is_err());
    }

    #[test]
    fn depth_frame_validation() {
        assert!(DepthFrame::uniform(3, 3, 1000).validate().is_ok());
        let bad = DepthFrame {
            width: 3,
            height: 3,
            data_mm: vec![0; 8],
        };
        assert!(matches!(bad.validate(), Err(ReachError::Decode(_))));
    }

    #[test]
    fn depth_lookup_is_row_major_and_truncates() {
        let frame = DepthFrame {
            width: 3,
            height: 2,
            data_mm: vec![10, 20, 30, 40, 50, 60],
        };
        assert_eq!(frame.depth_mm_at(Pixel::new(0.0, 0.0)), Some(10));
        assert_eq!(frame.depth_mm_at(Pixel::new(2.9, 1.2)), Some(60));
        assert_eq!(frame.depth_mm_at(Pixel::new(1.0, 1.0)), Some(50));
    }

    #[test]
    fn depth_lookup_outside_image_is_none() {
        let frame = DepthFrame::uniform(3, 2, 1);
        assert_eq!(frame.depth_mm_at(Pixel::new(3.0, 0.0)), None);
        assert_eq!(frame.depth_mm_at(Pixel::new(0.0, 2.0)), None);
        assert_eq!(frame.depth_mm_at(Pixel::new(-0.5, 0.0)), None);
        assert_eq!(frame.depth_mm_at(Pixel::new(f64::NAN, 0.0)), None);
    }

    #[test]
    fn depth_is_converted_to_metres() {
        let frame = DepthFrame::uniform(2, 2, 1250);
        let d = frame.depth_m_at(Pixel::new(1.0, 1.0)).unwrap();
        assert!((d - 1.25).abs() < 1e-12);
    }
}
