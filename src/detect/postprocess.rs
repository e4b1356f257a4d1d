//! YOLO output decoding shared by model backends.

use anyhow::{anyhow, Result};

use crate::detect::result::{BoundingBox, RawDetection};

/// Default IoU above which a lower-scored box of the same class is dropped.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.7;

/// Decode a channel-major `[4 + classes, anchors]` prediction block.
///
/// Rows 0..4 hold `cx, cy, w, h` in model-input pixels; the remaining rows hold
/// per-class scores. Each anchor keeps its best class when that score reaches
/// `confidence_threshold`. Boxes are scaled by `(scale_x, scale_y)` into frame pixels.
pub fn decode_predictions(
    output: &[f32],
    channels: usize,
    anchors: usize,
    confidence_threshold: f32,
    scale: (f32, f32),
) -> Result<Vec<RawDetection>> {
    if channels < 5 {
        return Err(anyhow!(
            "prediction block needs at least 5 channels, got {}",
            channels
        ));
    }
    let expected = channels
        .checked_mul(non_empty_anchors(anchors)?)
        .ok_or_else(|| anyhow!("prediction block dimensions overflow"))?;
    if output.len() != expected {
        return Err(anyhow!(
            "prediction block length mismatch: expected {}, got {}",
            expected,
            output.len()
        ));
    }

    let at = |channel: usize, anchor: usize| output[channel * anchors + anchor];
    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let (class_id, score) = (4..channels)
            .map(|channel| (channel - 4, at(channel, anchor)))
            .fold((0usize, f32::NEG_INFINITY), |best, candidate| {
                if candidate.1 > best.1 {
                    candidate
                } else {
                    best
                }
            });
        if !score.is_finite() || score < confidence_threshold {
            continue;
        }
        let bbox = BoundingBox::from_center(
            at(0, anchor),
            at(1, anchor),
            at(2, anchor),
            at(3, anchor),
        )
        .scaled(scale.0, scale.1);
        detections.push(RawDetection {
            class_id: class_id as u32,
            confidence: score,
            bbox,
        });
    }
    Ok(detections)
}

fn non_empty_anchors(anchors: usize) -> Result<usize> {
    if anchors == 0 {
        return Err(anyhow!("prediction block has no anchors"));
    }
    Ok(anchors)
}

/// Class-aware non-maximum suppression. Output is sorted by descending confidence.
pub fn non_max_suppression(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<RawDetection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = keep.iter().any(|kept| {
            kept.class_id == candidate.class_id && kept.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

/// Clamp boxes into `width x height`, dropping boxes that collapse to nothing.
pub fn clamp_to_frame(detections: Vec<RawDetection>, width: u32, height: u32) -> Vec<RawDetection> {
    let (w, h) = (width as f32, height as f32);
    detections
        .into_iter()
        .filter_map(|mut det| {
            det.bbox = BoundingBox::new(
                det.bbox.x1.clamp(0.0, w),
                det.bbox.y1.clamp(0.0, h),
                det.bbox.x2.clamp(0.0, w),
                det.bbox.y2.clamp(0.0, h),
            );
            (det.bbox.area() > 0.0).then_some(det)
        })
        .collect()
}
