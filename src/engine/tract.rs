use std::path::Path;

use anyhow::{Context, Result, bail};
use image::DynamicImage;
use image::imageops::FilterType;
use log::info;
use tract_onnx::prelude::*;

use super::{CLASSIFY_TOLERANCE, DESCRIPTOR_LEN, Descriptor, EngineError, Face, FaceEngine, Matcher};
use crate::models::Rect;

type OnnxModel = TypedSimplePlan<TypedModel>;

/// File names expected inside the model directory.
const DETECTOR_MODEL: &str = "detector.onnx";
const EMBEDDER_MODEL: &str = "embedder.onnx";

/// Fallbacks when a model does not declare a concrete input shape.
const DETECTOR_INPUT: (usize, usize) = (320, 240);
const EMBEDDER_INPUT: (usize, usize) = (112, 112);

const SCORE_THRESHOLD: f32 = 0.7;
const IOU_THRESHOLD: f32 = 0.3;

/// ONNX-backed face engine: a detector producing candidate boxes and an
/// embedder producing descriptors, plus a linear matcher over the loaded
/// reference samples.
pub struct TractEngine {
    detector: OnnxModel,
    embedder: OnnxModel,
    detector_input: (usize, usize),
    embedder_input: (usize, usize),
    matcher: Matcher,
}

impl TractEngine {
    /// Load both models from `model_dir`. Failing here is fatal to the
    /// process; nothing else initializes the classification resource.
    pub fn open(model_dir: &Path) -> Result<TractEngine> {
        let detector = load_model(&model_dir.join(DETECTOR_MODEL))?;
        let embedder = load_model(&model_dir.join(EMBEDDER_MODEL))?;
        let detector_input = model_input_size(&detector, DETECTOR_INPUT);
        let embedder_input = model_input_size(&embedder, EMBEDDER_INPUT);
        info!(
            "face engine ready, detector input {}x{}, embedder input {}x{}",
            detector_input.0, detector_input.1, embedder_input.0, embedder_input.1
        );
        Ok(TractEngine {
            detector,
            embedder,
            detector_input,
            embedder_input,
            matcher: Matcher::new(CLASSIFY_TOLERANCE),
        })
    }

    /// Run the detector and return `(score, relative corner box)` for every
    /// confident candidate after suppression.
    fn detect(&self, img: &DynamicImage) -> Result<Vec<(f32, [f32; 4])>> {
        let input = image_tensor(img, self.detector_input)?;
        let outputs = self.detector.run(tvec![input.into()])?;
        if outputs.len() < 2 {
            bail!("detector produced {} outputs, expected scores and boxes", outputs.len());
        }
        let scores = outputs[0].to_array_view::<f32>()?;
        let boxes = outputs[1].to_array_view::<f32>()?;
        if scores.ndim() != 3 || boxes.ndim() != 3 {
            bail!("unexpected detector output rank");
        }

        let mut candidates = Vec::new();
        for i in 0..scores.shape()[1] {
            let score = scores[[0, i, 1]];
            if score < SCORE_THRESHOLD {
                continue;
            }
            let corners =
                [boxes[[0, i, 0]], boxes[[0, i, 1]], boxes[[0, i, 2]], boxes[[0, i, 3]]];
            candidates.push((score, corners));
        }
        Ok(non_max_suppression(candidates))
    }

    fn embed(&self, face: &DynamicImage) -> Result<Descriptor> {
        let input = image_tensor(face, self.embedder_input)?;
        let outputs = self.embedder.run(tvec![input.into()])?;
        let view = outputs[0].to_array_view::<f32>()?;
        let values: Vec<f32> = view.iter().copied().collect();
        if values.len() != DESCRIPTOR_LEN {
            bail!("embedder produced {} values, expected {}", values.len(), DESCRIPTOR_LEN);
        }
        let mut array = [0f32; DESCRIPTOR_LEN];
        array.copy_from_slice(&values);
        Ok(Descriptor(array))
    }
}

impl FaceEngine for TractEngine {
    fn extract_single_face(&self, data: &[u8]) -> Result<Option<Face>, EngineError> {
        let img =
            image::load_from_memory(data).map_err(|e| EngineError::ImageLoad(e.to_string()))?;

        let faces = self.detect(&img).map_err(EngineError::Inference)?;
        if faces.len() != 1 {
            return Ok(None);
        }

        let rect = pixel_rect(faces[0].1, img.width(), img.height());
        let width = (rect.right - rect.left).max(1) as u32;
        let height = (rect.bottom - rect.top).max(1) as u32;
        let crop = img.crop_imm(rect.left as u32, rect.top as u32, width, height);
        let descriptor = self.embed(&crop).map_err(EngineError::Inference)?;
        Ok(Some(Face { rect, descriptor }))
    }

    fn set_reference_samples(&mut self, samples: &[Descriptor], categories: &[i32]) {
        self.matcher.set_samples(samples, categories);
    }

    fn classify(&self, descriptor: &Descriptor) -> i32 {
        self.matcher.classify(descriptor)
    }
}

fn load_model(path: &Path) -> Result<OnnxModel> {
    let model = tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("error loading model {}", path.display()))?
        .into_optimized()?
        .into_runnable()?;
    Ok(model)
}

/// `(width, height)` a model expects, from its input fact when concrete.
fn model_input_size(model: &OnnxModel, default: (usize, usize)) -> (usize, usize) {
    model
        .model()
        .input_fact(0)
        .ok()
        .and_then(|fact| fact.shape.as_concrete().map(|s| s.to_vec()))
        .and_then(|shape| (shape.len() == 4).then(|| (shape[3], shape[2])))
        .unwrap_or(default)
}

/// Resize to the model input and lay out as a normalized NCHW f32 tensor.
fn image_tensor(img: &DynamicImage, (width, height): (usize, usize)) -> Result<Tensor> {
    let resized =
        img.resize_exact(width as u32, height as u32, FilterType::Triangle).into_rgb8();
    let mut data = vec![0f32; 3 * width * height];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            data[c * width * height + y * width + x] = (pixel[c] as f32 - 127.0) / 128.0;
        }
    }
    Ok(Tensor::from_shape(&[1, 3, height, width], &data)?)
}

/// Map a relative corner box onto pixel coordinates, clamped to the image.
fn pixel_rect([x0, y0, x1, y1]: [f32; 4], width: u32, height: u32) -> Rect {
    let w = width as f32;
    let h = height as f32;
    Rect {
        left: (x0.clamp(0.0, 1.0) * w) as i32,
        top: (y0.clamp(0.0, 1.0) * h) as i32,
        right: (x1.clamp(0.0, 1.0) * w) as i32,
        bottom: (y1.clamp(0.0, 1.0) * h) as i32,
    }
}

fn non_max_suppression(mut candidates: Vec<(f32, [f32; 4])>) -> Vec<(f32, [f32; 4])> {
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
    let mut kept: Vec<(f32, [f32; 4])> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| iou(&k.1, &candidate.1) < IOU_THRESHOLD) {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let left = a[0].max(b[0]);
    let top = a[1].max(b[1]);
    let right = a[2].min(b[2]);
    let bottom = a[3].min(b[3]);
    let overlap = (right - left).max(0.0) * (bottom - top).max(0.0);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - overlap;
    if union <= 0.0 { 0.0 } else { overlap / union }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppression_keeps_distinct_boxes() {
        let boxes = vec![
            (0.9, [0.1, 0.1, 0.3, 0.3]),
            // Near duplicate of the first, lower score.
            (0.8, [0.11, 0.11, 0.31, 0.31]),
            (0.85, [0.6, 0.6, 0.9, 0.9]),
        ];
        let kept = non_max_suppression(boxes);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].0, 0.9);
        assert_eq!(kept[1].0, 0.85);
    }

    #[test]
    fn pixel_rect_clamps_to_image() {
        let rect = pixel_rect([-0.1, 0.25, 1.2, 0.75], 400, 200);
        assert_eq!(rect, Rect { left: 0, top: 50, right: 400, bottom: 150 });
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        assert_eq!(iou(&[0.0, 0.0, 0.1, 0.1], &[0.5, 0.5, 0.9, 0.9]), 0.0);
    }
}
