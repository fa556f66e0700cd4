//! Exponential moving average background model.

use ndarray::Array2;

/// Low-pass background estimate with binary foreground segmentation.
///
/// The model is seeded on the first frame it sees (which therefore
/// yields an empty mask) and from then on updated as
/// `new = alpha * frame + (1 - alpha) * old`. A pixel is foreground
/// when the absolute difference from the background estimate reaches
/// the threshold. The seed transition is one-way; the model is never
/// re-initialized within a session.
#[derive(Debug, Clone)]
pub struct BackgroundModel {
    alpha: f64,
    threshold: f64,
    mean: Option<Array2<f64>>,
}

impl BackgroundModel {
    /// Create a model with the given update weight and binary threshold.
    pub fn new(alpha: f64, threshold: f64) -> Self {
        Self {
            alpha,
            threshold,
            mean: None,
        }
    }

    /// Whether the model has been seeded with a first frame.
    pub fn is_steady(&self) -> bool {
        self.mean.is_some()
    }

    /// Update the background estimate and segment the frame.
    ///
    /// Returns the binary foreground mask. The first frame seeds the
    /// estimate and returns an all-background mask.
    pub fn apply(&mut self, frame: &Array2<u8>) -> Array2<bool> {
        let alpha = self.alpha;
        let threshold = self.threshold;

        match &mut self.mean {
            None => {
                self.mean = Some(frame.mapv(f64::from));
                Array2::from_elem(frame.dim(), false)
            }
            Some(mean) => {
                let frame = frame.mapv(f64::from);
                mean.zip_mut_with(&frame, |m, &f| {
                    *m = alpha * f + (1.0 - alpha) * *m;
                });

                let mut mask = Array2::from_elem(frame.dim(), false);
                ndarray::Zip::from(&mut mask)
                    .and(&frame)
                    .and(&*mean)
                    .for_each(|out, &f, &m| {
                        *out = (f - m).abs() >= threshold;
                    });
                mask
            }
        }
    }
}
