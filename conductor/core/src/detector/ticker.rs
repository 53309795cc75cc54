//! Detection Ticker
//!
//! Periodically pulls a frame, runs it through the adapter, and forwards any
//! sample on a channel. Missed ticks are skipped rather than bunched up.
//! Stopping aborts the task; because the owner also drops the receiving end,
//! a detect that was mid-flight at stop time has nowhere to deliver to.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::adapter::DetectorAdapter;
use super::traits::{EmotionBackend, FrameSource};
use crate::emotion::EmotionSample;

/// Default sampling period
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to a running detection loop
pub struct DetectionTicker {
    handle: JoinHandle<()>,
}

impl DetectionTicker {
    /// Start sampling every `interval`
    pub fn spawn<B: EmotionBackend + 'static>(
        adapter: Arc<DetectorAdapter<B>>,
        frames: Arc<dyn FrameSource>,
        interval: Duration,
        tx: mpsc::Sender<EmotionSample>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                let Some(frame) = frames.next_frame().await else {
                    continue;
                };
                if let Some(sample) = adapter.detect(&frame).await {
                    if tx.send(sample).await.is_err() {
                        tracing::debug!("Sample receiver gone, stopping detection loop");
                        break;
                    }
                }
            }
        });
        Self { handle }
    }

    /// Stop sampling
    pub fn stop(&self) {
        self.handle.abort();
    }

    /// Whether the loop has ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for DetectionTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{
        BlendshapeBackend, FrameFeatures, ModelSource, VideoFrame, DEFAULT_INIT_TIMEOUT,
    };
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct StillCamera;

    #[async_trait]
    impl FrameSource for StillCamera {
        async fn next_frame(&self) -> Option<VideoFrame> {
            Some(VideoFrame::new(
                640,
                480,
                FrameFeatures::Blendshapes(BTreeMap::from([("mouthFrownLeft".to_string(), 0.5)])),
            ))
        }
    }

    async fn ready_adapter() -> Arc<DetectorAdapter<BlendshapeBackend>> {
        let adapter = Arc::new(DetectorAdapter::new(
            BlendshapeBackend::new(),
            vec![ModelSource::Bundled],
            DEFAULT_INIT_TIMEOUT,
        ));
        assert!(adapter.initialize().await);
        adapter
    }

    #[tokio::test]
    async fn test_ticker_forwards_samples() {
        let (tx, mut rx) = mpsc::channel(8);
        let ticker = DetectionTicker::spawn(
            ready_adapter().await,
            Arc::new(StillCamera),
            Duration::from_millis(5),
            tx,
        );

        let sample = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sample.label, crate::emotion::EmotionLabel::Sad);
        ticker.stop();
    }

    #[tokio::test]
    async fn test_ticker_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        let ticker = DetectionTicker::spawn(
            ready_adapter().await,
            Arc::new(StillCamera),
            Duration::from_millis(5),
            tx,
        );
        drop(rx);

        tokio::time::timeout(Duration::from_secs(2), async {
            while !ticker.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}
