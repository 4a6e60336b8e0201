//! Evaluation loop
//!
//! One cycle: drain signals, handle sleep checks, rate-limit to the target
//! fps, read and classify the newest frame, admit it, run detection,
//! evaluate, and apply the resulting decision. Hardware I/O never happens
//! here; commands only overwrite the PTZ handle's desired-command cell.
//! Detection runs on the blocking pool so inference never stalls a
//! runtime worker.

use crate::detector::ObjectDetector;
use camera_capture::{Annotation, FrameAnalyzer, FrameSource, SnapshotSink, VideoFrame};
use ptz_control::PtzHandle;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};
use tracker::{
    Decision, Detection, FrameSize, Gate, SignalEvent, SourceControl, StatusObservation,
    TrackingEngine,
};

/// Lower bound on the wait between cycles
const MIN_WAIT: Duration = Duration::from_millis(10);

/// Evaluation periods the source runs ahead of a sleep check
const SLEEP_WARMUP_FRAMES: u32 = 2;

/// Counters kept by the evaluation loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Frames run through detection and evaluation
    pub evaluated: u64,
    /// Cycles held by the admission check
    pub held: u64,
    pub sleep_checks: u64,
    /// Sleep checks that found no frame even after warming up
    pub frameless_checks: u64,
    pub transitions: u64,
    pub detector_errors: u64,
    pub snapshots_saved: u64,
}

/// Drives a [`TrackingEngine`] from a frame source and a detector
pub struct Orchestrator<S, D, K>
where
    S: FrameSource,
    D: ObjectDetector + 'static,
    K: SnapshotSink,
{
    engine: TrackingEngine,
    analyzer: FrameAnalyzer,
    source: S,
    detector: Arc<Mutex<D>>,
    snapshots: K,
    ptz: PtzHandle,
    signals: mpsc::Receiver<SignalEvent>,
    observations: broadcast::Sender<StatusObservation>,
    last_cycle_at: Option<Instant>,
    /// Set while the source runs ahead of a pending sleep check
    warming_since: Option<Instant>,
    stats: CycleStats,
}

impl<S, D, K> Orchestrator<S, D, K>
where
    S: FrameSource,
    D: ObjectDetector + 'static,
    K: SnapshotSink,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: TrackingEngine,
        analyzer: FrameAnalyzer,
        source: S,
        detector: D,
        snapshots: K,
        ptz: PtzHandle,
        signals: mpsc::Receiver<SignalEvent>,
        observations: broadcast::Sender<StatusObservation>,
    ) -> Self {
        Self {
            engine,
            analyzer,
            source,
            detector: Arc::new(Mutex::new(detector)),
            snapshots,
            ptz,
            signals,
            observations,
            last_cycle_at: None,
            warming_since: None,
            stats: CycleStats::default(),
        }
    }

    pub fn engine(&self) -> &TrackingEngine {
        &self.engine
    }

    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    /// Run one cycle and return how long to wait before the next
    pub async fn step(&mut self, now: Instant) -> Duration {
        self.drain_signals();

        if self.engine.is_asleep() {
            return self.sleep_step(now);
        }

        let interval = self.engine.config().frame_interval();
        if let Some(last) = self.last_cycle_at {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < interval {
                return interval - elapsed;
            }
        }
        self.last_cycle_at = Some(now);

        if self.source.is_paused() {
            self.source.resume();
        }
        let frame = self.source.latest().map(Arc::new);
        let class = frame.as_deref().map(|f| self.analyzer.classify(f));

        if let Gate::Hold { decision, wait } = self.engine.admit(class, now) {
            self.stats.held += 1;
            self.apply(decision, frame.as_deref());
            return wait;
        }

        let (size, detections) = match &frame {
            Some(f) => (
                Some(FrameSize::new(f.width, f.height)),
                self.detect(Arc::clone(f)).await,
            ),
            None => (None, Vec::new()),
        };
        let decision = self.engine.evaluate(size, &detections, now);
        self.stats.evaluated += 1;
        self.apply(decision, frame.as_deref());
        interval
    }

    /// Throttled wake checks. The source is resumed a little ahead of each
    /// check so the check classifies a fresh frame; a check that still
    /// finds none waits out the warm-up before counting as frameless.
    fn sleep_step(&mut self, now: Instant) -> Duration {
        let warmup = self.engine.config().frame_interval() * SLEEP_WARMUP_FRAMES;

        if !self.engine.sleep_check_due(now) {
            let remaining = self.engine.next_sleep_check_in(now);
            if remaining > warmup {
                return remaining - warmup;
            }
            self.warm_up(now);
            return remaining;
        }

        self.warm_up(now);
        let frame = self.source.latest();
        if frame.is_none() {
            let waited = self
                .warming_since
                .map_or(Duration::ZERO, |at| now.saturating_duration_since(at));
            if waited < warmup {
                return (warmup - waited).min(self.engine.config().frame_interval());
            }
            self.stats.frameless_checks += 1;
        }
        self.warming_since = None;

        let class = frame.as_ref().map(|f| self.analyzer.classify(f));
        let decision = self.engine.evaluate_sleep(class, now);
        self.stats.sleep_checks += 1;
        self.apply(decision, frame.as_ref());

        if self.engine.is_asleep() {
            self.engine.next_sleep_check_in(now)
        } else {
            self.last_cycle_at = None;
            Duration::ZERO
        }
    }

    fn warm_up(&mut self, now: Instant) {
        if self.source.is_paused() {
            self.source.resume();
        }
        self.warming_since.get_or_insert(now);
    }

    fn drain_signals(&mut self) {
        while let Ok(event) = self.signals.try_recv() {
            self.engine.apply_signal(event.signal, event.received_at);
        }
    }

    async fn detect(&mut self, frame: Arc<VideoFrame>) -> Vec<Detection> {
        let detector = Arc::clone(&self.detector);
        let result = tokio::task::spawn_blocking(move || {
            let mut detector = detector.lock().unwrap_or_else(PoisonError::into_inner);
            detector.detect(&frame)
        })
        .await;

        match result {
            Ok(Ok(detections)) => detections,
            Ok(Err(e)) => {
                self.stats.detector_errors += 1;
                warn!("Detection failed, treating as empty: {}", e);
                Vec::new()
            }
            Err(e) => {
                self.stats.detector_errors += 1;
                warn!("Detection task failed, treating as empty: {}", e);
                Vec::new()
            }
        }
    }

    fn apply(&mut self, decision: Decision, frame: Option<&VideoFrame>) {
        if let Some(request) = &decision.command {
            self.ptz.apply(request);
        }

        if let Some(transition) = decision.transition {
            self.stats.transitions += 1;
            metrics::counter!("tracker_transitions_total", "to" => transition.to.to_string())
                .increment(1);
        }

        if let Some(observation) = decision.observation {
            info!(mode = %observation.mode, "{}", observation);
            // No subscribers is fine
            let _ = self.observations.send(observation);
        }

        if let (Some(request), Some(frame)) = (decision.snapshot, frame) {
            let annotation = Annotation {
                label: request.label,
                tone: request.tone,
                bbox: request.bbox,
                confidence: request.confidence,
                velocity: request.velocity.map(|v| [v.pan, v.tilt]),
            };
            match self.snapshots.save(frame, &annotation) {
                Ok(Some(path)) => {
                    self.stats.snapshots_saved += 1;
                    debug!("Snapshot saved: {}", path.display());
                }
                Ok(None) => {}
                Err(e) => warn!("Snapshot failed: {}", e),
            }
        }

        match decision.source {
            SourceControl::Pause => self.source.pause(),
            SourceControl::Resume => self.source.resume(),
            SourceControl::Keep => {}
        }
    }

    /// Loop until `shutdown` flips (or its sender is dropped), then stop
    /// the camera
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> CycleStats {
        info!(
            "Starting evaluation loop ({} fps)",
            self.engine.config().target_fps
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let wait = self.step(tokio::time::Instant::now().into_std()).await;
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(wait.max(MIN_WAIT)) => {}
            }
        }

        self.ptz.stop();
        info!(
            evaluated = self.stats.evaluated,
            transitions = self.stats.transitions,
            "Evaluation loop stopped"
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorError;
    use camera_capture::{AnalyzerConfig, CameraError, LatestFrameBuffer};
    use std::path::PathBuf;
    use tracker::{BoundingBox, ExternalSignal, ModeKind, StatusDetail, TrackerConfig};

    type Detector = Box<dyn FnMut(&VideoFrame) -> Result<Vec<Detection>, DetectorError> + Send>;

    #[derive(Clone, Default)]
    struct RecordingSink {
        saved: Arc<Mutex<Vec<Annotation>>>,
    }

    impl SnapshotSink for RecordingSink {
        fn save(
            &mut self,
            _frame: &VideoFrame,
            annotation: &Annotation,
        ) -> Result<Option<PathBuf>, CameraError> {
            self.saved.lock().unwrap().push(annotation.clone());
            Ok(Some(PathBuf::from("/dev/null")))
        }
    }

    struct Fixture {
        orchestrator: Orchestrator<LatestFrameBuffer, Detector, RecordingSink>,
        frames: LatestFrameBuffer,
        ptz: PtzHandle,
        signals: mpsc::Sender<SignalEvent>,
        observations: broadcast::Receiver<StatusObservation>,
        sink: RecordingSink,
        t0: Instant,
    }

    impl Fixture {
        fn at(&self, ms: u64) -> Instant {
            self.t0 + Duration::from_millis(ms)
        }

        fn signal(&self, signal: ExternalSignal, ms: u64) {
            self.signals.try_send(SignalEvent::new(signal, self.at(ms))).unwrap();
        }

        /// Evaluate a bright frame, then a dark one at 100 ms
        async fn put_to_sleep(&mut self) {
            self.frames.publish(bright());
            self.orchestrator.step(self.t0).await;
            self.frames.publish(dark());
            self.orchestrator.step(self.at(100)).await;
            assert!(self.orchestrator.engine().is_asleep());
        }
    }

    fn fixture(detector: Detector) -> Fixture {
        let t0 = Instant::now();
        let config = TrackerConfig {
            startup_ignore_ms: 0,
            ..Default::default()
        };
        let engine = TrackingEngine::new(config, t0).unwrap();
        let frames = LatestFrameBuffer::new();
        let ptz = PtzHandle::default();
        let (signal_tx, signal_rx) = mpsc::channel(16);
        let (obs_tx, obs_rx) = broadcast::channel(16);
        let sink = RecordingSink::default();

        let orchestrator = Orchestrator::new(
            engine,
            FrameAnalyzer::new(AnalyzerConfig::default()),
            frames.clone(),
            detector,
            sink.clone(),
            ptz.clone(),
            signal_rx,
            obs_tx,
        );
        Fixture {
            orchestrator,
            frames,
            ptz,
            signals: signal_tx,
            observations: obs_rx,
            sink,
            t0,
        }
    }

    fn bright() -> VideoFrame {
        VideoFrame::solid(128, 72, [200, 200, 200])
    }

    fn dark() -> VideoFrame {
        VideoFrame::solid(128, 72, [5, 5, 5])
    }

    fn far_left() -> Detector {
        Box::new(|_frame: &VideoFrame| {
            Ok(vec![Detection::new(
                BoundingBox::new(4.0, 30.0, 14.0, 40.0),
                0.9,
                1,
            )])
        })
    }

    fn nothing() -> Detector {
        Box::new(|_frame: &VideoFrame| Ok(Vec::new()))
    }

    #[tokio::test]
    async fn test_tracking_cycle_sets_velocity() {
        let mut f = fixture(far_left());
        f.frames.publish(bright());

        let wait = f.orchestrator.step(f.t0).await;
        assert_eq!(wait, Duration::from_millis(100));
        assert_eq!(f.orchestrator.engine().state().kind(), ModeKind::Tracking);
        assert_eq!(f.ptz.desired_velocity().pan, -1.0);

        let stats = f.orchestrator.stats();
        assert_eq!(stats.evaluated, 1);
        assert_eq!(stats.transitions, 1);
        assert_eq!(stats.snapshots_saved, 1);
    }

    #[tokio::test]
    async fn test_tracking_snapshot_carries_confidence_and_speed() {
        let mut f = fixture(far_left());
        f.frames.publish(bright());
        f.orchestrator.step(f.t0).await;

        let saved = f.sink.saved.lock().unwrap();
        assert_eq!(saved[0].label, "[TRACKING]");
        assert_eq!(saved[0].confidence, Some(0.9));
        assert_eq!(saved[0].velocity, Some([-1.0, 0.0]));
        assert_eq!(saved[0].bbox, Some([4.0, 30.0, 14.0, 40.0]));
    }

    #[tokio::test]
    async fn test_rate_limited_to_target_fps() {
        let mut f = fixture(nothing());
        f.frames.publish(bright());

        f.orchestrator.step(f.t0).await;
        let wait = f.orchestrator.step(f.at(40)).await;
        assert_eq!(wait, Duration::from_millis(60));
        assert_eq!(f.orchestrator.stats().evaluated, 1);

        f.orchestrator.step(f.at(100)).await;
        assert_eq!(f.orchestrator.stats().evaluated, 2);
    }

    #[tokio::test]
    async fn test_detector_failure_counts_as_no_detection() {
        let detector: Detector =
            Box::new(|_frame: &VideoFrame| Err(DetectorError::Inference("boom".into())));
        let mut f = fixture(detector);
        f.frames.publish(bright());

        f.orchestrator.step(f.t0).await;
        assert_eq!(f.orchestrator.stats().detector_errors, 1);
        assert_eq!(f.orchestrator.engine().state().kind(), ModeKind::Idle);
        assert!(f.ptz.desired_velocity().is_stop());
    }

    #[tokio::test]
    async fn test_sleep_and_wake() {
        let mut f = fixture(far_left());
        f.frames.publish(bright());
        f.orchestrator.step(f.t0).await;
        assert!(!f.ptz.desired_velocity().is_stop());

        f.frames.publish(dark());
        let wait = f.orchestrator.step(f.at(100)).await;
        assert_eq!(wait, Duration::from_secs(1));
        assert!(f.orchestrator.engine().is_asleep());
        assert!(f.frames.is_paused());
        assert!(f.ptz.desired_velocity().is_stop());

        // Well before the check: stay paused until the warm-up point
        let wait = f.orchestrator.step(f.at(600)).await;
        assert_eq!(wait, Duration::from_millis(300));
        assert!(f.frames.is_paused());

        // Warm-up: the source runs ahead of the check
        let wait = f.orchestrator.step(f.at(900)).await;
        assert_eq!(wait, Duration::from_millis(200));
        assert!(!f.frames.is_paused());
        assert_eq!(f.orchestrator.stats().sleep_checks, 0);

        for check in 1..=3u64 {
            f.frames.publish(bright());
            f.orchestrator.step(f.at(100 + check * 1000)).await;
        }
        assert!(!f.orchestrator.engine().is_asleep());
        assert_eq!(f.orchestrator.stats().sleep_checks, 3);
        assert_eq!(f.orchestrator.stats().frameless_checks, 0);
        assert!(!f.frames.is_paused());
    }

    #[tokio::test]
    async fn test_every_sleep_check_classifies_a_frame() {
        let mut f = fixture(nothing());
        f.put_to_sleep().await;

        for check in 1..=10u64 {
            let due = 100 + check * 1000;
            let wait = f.orchestrator.step(f.at(due - 200)).await;
            assert_eq!(wait, Duration::from_millis(200));
            assert!(!f.frames.is_paused());

            // Live camera: publishes whenever the source accepts frames
            f.frames.publish(dark());
            f.orchestrator.step(f.at(due)).await;
            assert!(f.frames.is_paused(), "source left running after check {}", check);
        }

        let stats = f.orchestrator.stats();
        assert_eq!(stats.sleep_checks, 10);
        assert_eq!(stats.frameless_checks, 0);
        assert!(f.orchestrator.engine().is_asleep());
    }

    #[tokio::test]
    async fn test_sleep_check_waits_for_first_frame() {
        let mut f = fixture(nothing());
        f.put_to_sleep().await;

        // Due without a warm-up step: resume and give the camera a moment
        let wait = f.orchestrator.step(f.at(1100)).await;
        assert_eq!(wait, Duration::from_millis(100));
        assert!(!f.frames.is_paused());
        assert_eq!(f.orchestrator.stats().sleep_checks, 0);

        f.frames.publish(dark());
        f.orchestrator.step(f.at(1200)).await;
        assert_eq!(f.orchestrator.stats().sleep_checks, 1);
        assert!(f.frames.is_paused());

        // No camera at all: the check goes ahead once the warm-up is spent
        f.orchestrator.step(f.at(2200)).await;
        f.orchestrator.step(f.at(2300)).await;
        assert_eq!(f.orchestrator.stats().sleep_checks, 1);
        f.orchestrator.step(f.at(2400)).await;

        let stats = f.orchestrator.stats();
        assert_eq!(stats.sleep_checks, 2);
        assert_eq!(stats.frameless_checks, 1);
        assert_eq!(f.orchestrator.engine().state().normal_frame_streak(), 0);
    }

    #[tokio::test]
    async fn test_idle_hold_pauses_source() {
        let mut f = fixture(nothing());
        f.frames.publish(bright());
        f.signal(ExternalSignal::PersonCount(0), 0);

        let wait = f.orchestrator.step(f.t0).await;
        assert_eq!(wait, Duration::from_secs(1));
        assert!(f.frames.is_paused());
        assert_eq!(f.orchestrator.stats().held, 1);
        assert_eq!(f.orchestrator.stats().evaluated, 0);

        let observation = f.observations.try_recv().unwrap();
        assert!(matches!(
            observation.detail,
            StatusDetail::Idle { standby: true, .. }
        ));

        // Somebody shows up: the next cycle runs again
        f.signal(ExternalSignal::PersonCount(1), 1000);
        f.orchestrator.step(f.at(1000)).await;
        assert!(!f.frames.is_paused());
        assert_eq!(f.orchestrator.stats().evaluated, 1);
    }

    #[tokio::test]
    async fn test_standby_never_classifies_frames() {
        let mut f = fixture(nothing());
        f.frames.publish(bright());
        f.signal(ExternalSignal::PersonCount(0), 0);
        f.orchestrator.step(f.t0).await;
        assert!(f.frames.is_paused());

        // Dropped by the paused source, so standby cannot fall asleep
        f.frames.publish(dark());
        f.orchestrator.step(f.at(1000)).await;
        assert!(!f.orchestrator.engine().is_asleep());
        assert_eq!(f.orchestrator.stats().held, 2);
        assert!(f.frames.is_paused());
    }

    #[tokio::test]
    async fn test_signals_keep_their_receive_time() {
        let mut f = fixture(nothing());
        f.frames.publish(bright());

        // Received at 0 but drained after the person timeout: stale
        f.signal(ExternalSignal::PersonCount(0), 0);
        f.orchestrator.step(f.at(31_000)).await;
        assert_eq!(f.orchestrator.stats().held, 0);
        assert_eq!(f.orchestrator.stats().evaluated, 1);

        f.signal(ExternalSignal::PersonCount(0), 31_000);
        f.orchestrator.step(f.at(31_200)).await;
        assert_eq!(f.orchestrator.stats().held, 1);
    }

    #[tokio::test]
    async fn test_audio_signal_starts_search() {
        let mut f = fixture(nothing());
        f.frames.publish(bright());
        f.signal(ExternalSignal::Audio { active: true }, 0);

        f.orchestrator.step(f.t0).await;
        assert_eq!(f.orchestrator.engine().state().kind(), ModeKind::Searching);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_camera_on_shutdown() {
        let f = fixture(far_left());
        f.frames.publish(bright());
        let ptz = f.ptz.clone();
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(f.orchestrator.run(rx));
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!ptz.desired_velocity().is_stop());

        tx.send(true).unwrap();
        let stats = task.await.unwrap();
        assert!(stats.evaluated >= 1);
        assert!(ptz.desired_velocity().is_stop());
    }
}
