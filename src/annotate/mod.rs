//! Detection overlay.
//!
//! Draws one box per detection in its class color, with a filled label above the
//! top-left corner reading `<class_name> <confidence>`. Labels stay inside the frame:
//! a label that would start above row 0 moves inside the box, and one that would run
//! past the right edge shifts left.

mod font;

use std::sync::Arc;

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::catalog::{ClassCatalog, Color};
use crate::detect::{BoundingBox, Detection};
use crate::frame::Frame;

pub use font::{draw_text, text_size};

#[derive(Clone, Copy, Debug)]
pub struct AnnotatorStyle {
    pub box_thickness: u32,
    pub font_scale: u32,
    /// Space between label text and its background edge.
    pub label_padding: u32,
    pub text_color: Color,
}

impl Default for AnnotatorStyle {
    fn default() -> Self {
        Self {
            box_thickness: 2,
            font_scale: 2,
            label_padding: 3,
            text_color: Color::new(0xFF, 0xFF, 0xFF),
        }
    }
}

/// Inclusive pixel rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PixelBox {
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
}

pub struct Annotator {
    catalog: Arc<ClassCatalog>,
    style: AnnotatorStyle,
}

impl Annotator {
    pub fn new(catalog: Arc<ClassCatalog>) -> Self {
        Self::with_style(catalog, AnnotatorStyle::default())
    }

    pub fn with_style(catalog: Arc<ClassCatalog>, style: AnnotatorStyle) -> Self {
        Self { catalog, style }
    }

    pub fn style(&self) -> &AnnotatorStyle {
        &self.style
    }

    /// Return an annotated copy of `frame`.
    ///
    /// With no detections the returned frame shares the input's pixels. Otherwise the
    /// pixels are copied before drawing, so the caller's frame is never modified.
    pub fn annotate(&self, frame: &Frame, detections: &[Detection]) -> Frame {
        let mut annotated = frame.clone();
        if detections.is_empty() {
            return annotated;
        }
        let img = annotated.pixels_mut();
        for detection in detections {
            self.draw_detection(img, detection);
        }
        annotated
    }

    /// Label background size for a detection, padding included.
    pub fn label_size(&self, detection: &Detection) -> (u32, u32) {
        let (w, h) = text_size(&detection.label(), self.style.font_scale);
        let pad = self.style.label_padding * 2;
        (w + pad, h + pad)
    }

    fn draw_detection(&self, img: &mut RgbImage, detection: &Detection) {
        let (width, height) = img.dimensions();
        let Some(bbox) = pixel_box(&detection.bbox, width, height) else {
            log::debug!(
                "skipping {} box outside {}x{} frame",
                detection.class_name,
                width,
                height
            );
            return;
        };
        let color: Rgb<u8> = self.catalog.color_for(&detection.class_name).into();

        for t in 0..self.style.box_thickness {
            let (x1, y1) = (bbox.x1 + t, bbox.y1 + t);
            let (x2, y2) = (bbox.x2.saturating_sub(t), bbox.y2.saturating_sub(t));
            if x1 > x2 || y1 > y2 {
                break;
            }
            let rect = Rect::at(x1 as i32, y1 as i32).of_size(x2 - x1 + 1, y2 - y1 + 1);
            draw_hollow_rect_mut(img, rect, color);
        }

        let label = detection.label();
        let (label_w, label_h) = self.label_size(detection);
        let (lx, ly) = label_origin(&bbox, label_w, label_h, width, height);
        draw_filled_rect_mut(
            img,
            Rect::at(lx as i32, ly as i32).of_size(label_w, label_h),
            color,
        );
        let pad = self.style.label_padding as i64;
        draw_text(
            img,
            &label,
            lx as i64 + pad,
            ly as i64 + pad,
            self.style.font_scale,
            self.style.text_color.into(),
        );
    }
}

fn pixel_box(bbox: &BoundingBox, width: u32, height: u32) -> Option<PixelBox> {
    if width == 0 || height == 0 {
        return None;
    }
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;
    if bbox.x2 < 0.0 || bbox.y2 < 0.0 || bbox.x1 > max_x || bbox.y1 > max_y {
        return None;
    }
    let b = PixelBox {
        x1: bbox.x1.clamp(0.0, max_x) as u32,
        y1: bbox.y1.clamp(0.0, max_y) as u32,
        x2: bbox.x2.clamp(0.0, max_x) as u32,
        y2: bbox.y2.clamp(0.0, max_y) as u32,
    };
    (b.x1 <= b.x2 && b.y1 <= b.y2).then_some(b)
}

fn label_origin(bbox: &PixelBox, label_w: u32, label_h: u32, width: u32, height: u32) -> (u32, u32) {
    let x = bbox.x1.min(width.saturating_sub(label_w));
    let y = if bbox.y1 >= label_h {
        bbox.y1 - label_h
    } else {
        bbox.y1.min(height.saturating_sub(label_h))
    };
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

    fn frame(width: u32, height: u32) -> Frame {
        Frame::new(RgbImage::from_pixel(width, height, BACKGROUND), 0)
    }

    fn detection(class_id: u32, bbox: BoundingBox) -> Detection {
        let catalog = ClassCatalog::aerial();
        Detection {
            class_id,
            class_name: catalog.label_for(class_id),
            confidence: 0.9,
            bbox,
        }
    }

    fn drone_color() -> Rgb<u8> {
        ClassCatalog::aerial().color_for("Drone").into()
    }

    #[test]
    fn no_detections_returns_shared_frame() {
        let annotator = Annotator::new(Arc::default());
        let input = frame(32, 32);
        let output = annotator.annotate(&input, &[]);
        assert!(output.shares_pixels_with(&input));
    }

    #[test]
    fn draws_box_in_class_color_without_touching_input() {
        let annotator = Annotator::new(Arc::default());
        let input = frame(320, 240);
        let det = detection(2, BoundingBox::new(100.0, 120.0, 200.0, 200.0));

        let output = annotator.annotate(&input, &[det]);

        assert!(!output.shares_pixels_with(&input));
        assert_eq!(input.image().get_pixel(100, 150), &BACKGROUND);
        assert_eq!(output.image().get_pixel(100, 150), &drone_color());
        assert_eq!(output.image().get_pixel(101, 150), &drone_color());
        assert_eq!(output.image().get_pixel(150, 160), &BACKGROUND);
    }

    #[test]
    fn label_sits_above_the_box() {
        let annotator = Annotator::new(Arc::default());
        let det = detection(2, BoundingBox::new(100.0, 120.0, 200.0, 200.0));
        let (label_w, label_h) = annotator.label_size(&det);

        let output = annotator.annotate(&frame(320, 240), &[det]);

        // Padding column at the right edge of the label background.
        let px = 100 + label_w - 1;
        assert_eq!(output.image().get_pixel(px, 120 - label_h), &drone_color());
        assert_eq!(output.image().get_pixel(px, 120 - label_h - 1), &BACKGROUND);
    }

    #[test]
    fn label_at_frame_top_is_clamped_inside() {
        let annotator = Annotator::new(Arc::default());
        let det = detection(2, BoundingBox::new(10.0, 0.0, 60.0, 40.0));
        let (label_w, label_h) = annotator.label_size(&det);
        assert!(10 + label_w < 320);

        let output = annotator.annotate(&frame(320, 240), &[det]);

        let px = 10 + label_w - 1;
        assert_eq!(output.image().get_pixel(px, 0), &drone_color());
        assert_eq!(output.image().get_pixel(px, label_h - 1), &drone_color());
        assert_eq!(output.image().get_pixel(px, label_h), &BACKGROUND);
    }

    #[test]
    fn label_at_right_edge_shifts_left() {
        let bbox = PixelBox {
            x1: 300,
            y1: 100,
            x2: 319,
            y2: 150,
        };
        assert_eq!(label_origin(&bbox, 80, 20, 320, 240), (240, 80));
        let top = PixelBox { y1: 5, ..bbox };
        assert_eq!(label_origin(&top, 80, 20, 320, 240), (240, 5));
    }

    #[test]
    fn unknown_class_renders_in_fallback_color() {
        let annotator = Annotator::new(Arc::default());
        let det = detection(9, BoundingBox::new(50.0, 100.0, 90.0, 140.0));
        assert_eq!(det.class_name, "Class_9");

        let output = annotator.annotate(&frame(320, 240), &[det]);

        assert_eq!(output.image().get_pixel(50, 120), &Rgb([255, 255, 255]));
    }

    #[test]
    fn boxes_outside_the_frame_are_skipped() {
        assert!(pixel_box(&BoundingBox::new(400.0, 10.0, 420.0, 20.0), 320, 240).is_none());
        assert_eq!(
            pixel_box(&BoundingBox::new(-10.0, -5.0, 20.0, 500.0), 320, 240),
            Some(PixelBox {
                x1: 0,
                y1: 0,
                x2: 20,
                y2: 239
            })
        );
    }
}
