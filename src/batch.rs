//! Batch orchestration: run items one after another, report progress, and
//! abort the whole run on the first failure.
//!
//! [`BatchOrchestrator::run`] is generic over what an item is and what it
//! produces; every operation in [`crate::convert`] is built on it. The
//! image-specific step, decode → resize → encode, is [`encode_item`].
//!
//! Items are never processed concurrently. Each step is awaited to
//! completion before the next one starts, so progress events arrive in
//! strictly increasing index order.

use crate::collection::SourceImage;
use crate::error::ImgPdfError;
use crate::pipeline::decode::{self, Raster};
use crate::pipeline::encode::{self, EncodeOutcome, EncodeRequest, RasterEncoder, SearchPolicy};
use crate::pipeline::resize::{self, BoundingBox};
use crate::progress::{BatchRun, BatchState, ProgressCallback, ProgressUpdate};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives one batch at a time through the `Idle → Running → Completed |
/// Failed` lifecycle.
pub struct BatchOrchestrator {
    run: BatchRun,
    callback: ProgressCallback,
}

impl BatchOrchestrator {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            run: BatchRun::new(),
            callback,
        }
    }

    pub fn state(&self) -> BatchState {
        self.run.state()
    }

    /// Return a finished orchestrator to `Idle` so it can run again.
    pub fn reset(&mut self) -> Result<(), ImgPdfError> {
        self.run.reset()
    }

    /// Process `items` in order.
    ///
    /// * `status(position, total)` builds the progress message for the item
    ///   at 1-based `position`.
    /// * `name(item)` names an item in errors.
    /// * `step(index, item)` does the work and returns the output plus its
    ///   byte length.
    ///
    /// The first failing step is wrapped in [`ImgPdfError::ItemFailed`] and
    /// returned; nothing produced before it is returned.
    pub async fn run<T, U, S, N, F, Fut>(
        &mut self,
        items: &[T],
        status: S,
        name: N,
        mut step: F,
    ) -> Result<Vec<U>, ImgPdfError>
    where
        S: Fn(usize, usize) -> String,
        N: Fn(&T) -> String,
        F: FnMut(usize, &T) -> Fut,
        Fut: Future<Output = Result<(U, u64), ImgPdfError>>,
    {
        let total = items.len();
        if total == 0 {
            return Err(ImgPdfError::EmptyBatch("no items to process".into()));
        }

        self.run.start()?;
        self.callback.on_batch_start(total);
        info!("Starting batch of {} items", total);
        let started = Instant::now();

        let mut outputs = Vec::with_capacity(total);
        let mut total_bytes = 0u64;

        for (index, item) in items.iter().enumerate() {
            self.callback
                .on_progress(&ProgressUpdate::new(index, total, status(index + 1, total)));

            match step(index, item).await {
                Ok((output, len)) => {
                    total_bytes += len;
                    self.callback.on_item_complete(index, total, len);
                    outputs.push(output);
                }
                Err(e) => {
                    let err = e.at_item(index, name(item));
                    warn!("Batch aborted: {}", err);
                    self.run.fail()?;
                    self.callback.on_batch_failed(index, &err.to_string());
                    return Err(err);
                }
            }
        }

        self.run.complete()?;
        self.callback
            .on_progress(&ProgressUpdate::new(total, total, "Complete"));
        self.callback.on_batch_complete(total, total_bytes);
        info!(
            "Batch complete: {} items, {} bytes, {}ms",
            total,
            total_bytes,
            started.elapsed().as_millis()
        );

        Ok(outputs)
    }
}

/// Shared per-item settings for [`encode_item`].
#[derive(Debug, Clone, Copy)]
pub struct EncodeTemplate {
    pub request: EncodeRequest,
    /// Scale down to fit this box first, when set.
    pub bounds: Option<BoundingBox>,
    pub policy: SearchPolicy,
}

/// What [`encode_item`] produced for one source image.
#[derive(Debug, Clone)]
pub struct EncodedItem {
    pub outcome: EncodeOutcome,
    /// Dimensions of the raster that was encoded.
    pub width: u32,
    pub height: u32,
}

/// Decode `source`, resize it if the template says so, and encode it with
/// adaptive search. Runs on the blocking pool.
pub async fn encode_item(
    encoder: Arc<dyn RasterEncoder>,
    source: &SourceImage,
    template: EncodeTemplate,
) -> Result<EncodedItem, ImgPdfError> {
    let name = source.name().to_string();
    let bytes = source.shared_bytes();

    tokio::task::spawn_blocking(move || {
        let raster = decode_and_fit(&name, &bytes, template.bounds)?;
        let (width, height) = raster.dimensions();
        let outcome =
            encode::encode_with_budget(encoder.as_ref(), &raster, &template.request, &template.policy)?;
        debug!(
            "Encoded '{}' as {} at quality {:.2}: {} bytes in {} pass(es)",
            name,
            template.request.codec,
            outcome.quality,
            outcome.bytes.len(),
            outcome.passes
        );
        Ok(EncodedItem {
            outcome,
            width,
            height,
        })
    })
    .await
    .map_err(|e| ImgPdfError::Internal(format!("Encode task panicked: {}", e)))?
}

/// Decode, then cap to `bounds` when given.
pub(crate) fn decode_and_fit(
    name: &str,
    bytes: &[u8],
    bounds: Option<BoundingBox>,
) -> Result<Raster, ImgPdfError> {
    let raster = decode::decode(name, bytes)?;
    Ok(match bounds {
        Some(b) => resize::resize_to_fit(raster, b),
        None => raster,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::ImageCollection;
    use crate::pipeline::decode::tests::png_bytes;
    use crate::pipeline::encode::tests::LinearEncoder;
    use crate::pipeline::encode::{Codec, CodecEncoder};
    use crate::progress::BatchProgressCallback;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl BatchProgressCallback for Recorder {
        fn on_batch_start(&self, total: usize) {
            self.events.lock().unwrap().push(format!("start {total}"));
        }
        fn on_progress(&self, u: &ProgressUpdate) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{:.0}% {}", u.percent, u.message));
        }
        fn on_item_complete(&self, index: usize, _total: usize, len: u64) {
            self.events.lock().unwrap().push(format!("done {index} {len}"));
        }
        fn on_batch_failed(&self, index: usize, _error: &str) {
            self.events.lock().unwrap().push(format!("failed {index}"));
        }
        fn on_batch_complete(&self, total: usize, bytes: u64) {
            self.events
                .lock()
                .unwrap()
                .push(format!("complete {total} {bytes}"));
        }
    }

    fn status(i: usize, n: usize) -> String {
        format!("Item {i}/{n}...")
    }

    #[tokio::test]
    async fn events_in_order_and_outputs_in_input_order() {
        let rec = Arc::new(Recorder::default());
        let mut orch = BatchOrchestrator::new(rec.clone());

        let out = orch
            .run(&[10u64, 20, 30], status, |n| n.to_string(), |_, &n| async move {
                Ok((n * 2, n))
            })
            .await
            .unwrap();

        assert_eq!(out, vec![20, 40, 60]);
        assert_eq!(orch.state(), BatchState::Completed);
        assert_eq!(
            rec.events(),
            vec![
                "start 3",
                "0% Item 1/3...",
                "done 0 10",
                "33% Item 2/3...",
                "done 1 20",
                "67% Item 3/3...",
                "done 2 30",
                "100% Complete",
                "complete 3 60",
            ]
        );
    }

    #[tokio::test]
    async fn first_failure_aborts_the_batch() {
        let rec = Arc::new(Recorder::default());
        let mut orch = BatchOrchestrator::new(rec.clone());
        let mut seen = Vec::new();

        let err = orch
            .run(
                &["a", "b", "c"],
                status,
                |s| s.to_string(),
                |i, &s| {
                    seen.push(i);
                    async move {
                        if s == "b" {
                            Err(ImgPdfError::Internal("boom".into()))
                        } else {
                            Ok(((), 1))
                        }
                    }
                },
            )
            .await
            .unwrap_err();

        assert_eq!(seen, vec![0, 1]);
        assert_eq!(orch.state(), BatchState::Failed);
        match err {
            ImgPdfError::ItemFailed { index, name, .. } => {
                assert_eq!(index, 1);
                assert_eq!(name, "b");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let events = rec.events();
        assert_eq!(events.last().unwrap(), "failed 1");
        assert!(!events.iter().any(|e| e.starts_with("complete")));
    }

    #[tokio::test]
    async fn empty_batch_never_starts() {
        let mut orch = BatchOrchestrator::new(Arc::new(Recorder::default()));
        let err = orch
            .run(&[] as &[u8], status, |_| String::new(), |_, _| async { Ok(((), 0)) })
            .await
            .unwrap_err();
        assert!(matches!(err, ImgPdfError::EmptyBatch(_)));
        assert_eq!(orch.state(), BatchState::Idle);
    }

    #[tokio::test]
    async fn finished_orchestrator_needs_reset() {
        let mut orch = BatchOrchestrator::new(Arc::new(Recorder::default()));
        let step = |_: usize, _: &u8| async { Ok(((), 0)) };
        orch.run(&[1u8], status, |_| String::new(), step).await.unwrap();
        assert!(orch.run(&[1u8], status, |_| String::new(), step).await.is_err());
        orch.reset().unwrap();
        assert!(orch.run(&[1u8], status, |_| String::new(), step).await.is_ok());
    }

    #[tokio::test]
    async fn encode_item_resizes_then_encodes() {
        let mut images = ImageCollection::new();
        images.add("big.png", png_bytes(400, 300)).unwrap();

        let template = EncodeTemplate {
            request: EncodeRequest::new(Codec::Jpeg, 0.8),
            bounds: Some(BoundingBox::new(200, 200)),
            policy: SearchPolicy::default(),
        };
        let item = encode_item(Arc::new(CodecEncoder), &images.as_slice()[0], template)
            .await
            .unwrap();

        assert_eq!((item.width, item.height), (200, 150));
        assert_eq!(item.outcome.passes, 1);
        let decoded = image::load_from_memory(&item.outcome.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 150));
    }

    #[tokio::test]
    async fn encode_item_runs_adaptive_search() {
        let mut images = ImageCollection::new();
        images.add("a.png", png_bytes(8, 8)).unwrap();

        let encoder = Arc::new(LinearEncoder::new(625_000.0));
        let template = EncodeTemplate {
            request: EncodeRequest::new(Codec::Jpeg, 0.8).with_budget(200 * 1024),
            bounds: None,
            policy: SearchPolicy::default(),
        };
        let item = encode_item(encoder.clone(), &images.as_slice()[0], template)
            .await
            .unwrap();
        assert!(item.outcome.budget_met);
        assert_eq!(item.outcome.passes, 5);
    }

    #[tokio::test]
    async fn encode_item_reports_decode_errors() {
        let mut images = ImageCollection::new();
        images.add("broken.jpg", b"not really".to_vec()).unwrap();
        let template = EncodeTemplate {
            request: EncodeRequest::new(Codec::Jpeg, 0.8),
            bounds: None,
            policy: SearchPolicy::default(),
        };
        let err = encode_item(Arc::new(CodecEncoder), &images.as_slice()[0], template)
            .await
            .unwrap_err();
        assert!(matches!(err, ImgPdfError::Decode { .. }));
    }
}
