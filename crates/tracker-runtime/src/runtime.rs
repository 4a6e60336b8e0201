//! Runtime lifecycle
//!
//! Spawns the PTZ command loop, the evaluation loop and (optionally) the
//! signal bridge, all sharing one `watch` shutdown signal. Shutdown joins
//! each task with a bounded timeout.

use crate::detector::ObjectDetector;
use crate::orchestrator::{CycleStats, Orchestrator};
use crate::settings::Settings;
use crate::RuntimeError;
use camera_capture::{FrameAnalyzer, FrameSource, SnapshotSink, SnapshotWriter};
use ptz_control::{CommandLoopStats, PtzCommandLoop, PtzHandle, PtzLink};
use signal_bridge::{BridgeError, MqttSignalBridge};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracker::{SignalEvent, StatusObservation, TrackingEngine};

const SIGNAL_QUEUE: usize = 64;
const OBSERVATION_QUEUE: usize = 32;

/// Final statistics of a stopped runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeReport {
    pub commands: CommandLoopStats,
    pub cycles: CycleStats,
}

/// Entry point for starting the tracker
pub struct TrackerRuntime;

impl TrackerRuntime {
    /// Validate `settings` and start all loops on the current tokio runtime.
    ///
    /// Nothing is spawned if validation fails.
    pub fn spawn<L, S, D, K>(
        settings: Settings,
        link: L,
        source: S,
        detector: D,
        snapshots: K,
    ) -> Result<RuntimeHandle, RuntimeError>
    where
        L: PtzLink + 'static,
        S: FrameSource + 'static,
        D: ObjectDetector + 'static,
        K: SnapshotSink + 'static,
    {
        settings.validate()?;

        let mut tracker_config = settings.tracker.clone();
        tracker_config.snapshots_enabled &= settings.snapshots.enabled;
        let engine = TrackingEngine::new(tracker_config, Instant::now())?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_QUEUE);
        let (observation_tx, _) = broadcast::channel(OBSERVATION_QUEUE);

        let (command_loop, ptz) = PtzCommandLoop::new(link, settings.ptz.clone());
        let ptz_task = command_loop.spawn(shutdown_rx.clone());

        let bridge_task = if settings.mqtt.enabled {
            let bridge = MqttSignalBridge::new(settings.mqtt.clone(), signal_tx.clone());
            Some(tokio::spawn(bridge.run(shutdown_rx.clone())))
        } else {
            info!("Signal bridge disabled");
            None
        };

        let orchestrator = Orchestrator::new(
            engine,
            FrameAnalyzer::new(settings.analyzer.clone()),
            source,
            detector,
            snapshots,
            ptz.clone(),
            signal_rx,
            observation_tx.clone(),
        );
        let eval_task = tokio::spawn(orchestrator.run(shutdown_rx));

        info!("Tracker runtime started");
        Ok(RuntimeHandle {
            shutdown: shutdown_tx,
            signals: signal_tx,
            observations: observation_tx,
            ptz,
            ptz_task,
            eval_task,
            bridge_task,
            shutdown_timeout: settings.ptz.shutdown_timeout(),
        })
    }

    /// Like [`spawn`](Self::spawn), writing snapshots with a
    /// [`SnapshotWriter`] built from `settings.snapshots`
    pub fn spawn_with_writer<L, S, D>(
        settings: Settings,
        link: L,
        source: S,
        detector: D,
    ) -> Result<RuntimeHandle, RuntimeError>
    where
        L: PtzLink + 'static,
        S: FrameSource + 'static,
        D: ObjectDetector + 'static,
    {
        settings.validate()?;
        let writer = SnapshotWriter::new(settings.snapshots.clone())?;
        Self::spawn(settings, link, source, detector, writer)
    }
}

/// Handle to a running tracker
pub struct RuntimeHandle {
    shutdown: watch::Sender<bool>,
    signals: mpsc::Sender<SignalEvent>,
    observations: broadcast::Sender<StatusObservation>,
    ptz: PtzHandle,
    ptz_task: JoinHandle<CommandLoopStats>,
    eval_task: JoinHandle<CycleStats>,
    bridge_task: Option<JoinHandle<Result<u64, BridgeError>>>,
    shutdown_timeout: Duration,
}

impl RuntimeHandle {
    /// Receive status observations from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StatusObservation> {
        self.observations.subscribe()
    }

    /// Inject signals alongside (or instead of) the MQTT bridge
    pub fn signal_sender(&self) -> mpsc::Sender<SignalEvent> {
        self.signals.clone()
    }

    pub fn ptz(&self) -> &PtzHandle {
        &self.ptz
    }

    /// Signal every loop to stop and wait for each, bounded by the
    /// configured shutdown timeout. Every task is joined even when an
    /// earlier one fails; the first failure is returned.
    pub async fn shutdown(self) -> Result<RuntimeReport, RuntimeError> {
        info!("Shutting down tracker runtime");
        // Only fails when every loop is already gone
        let _ = self.shutdown.send(true);

        let timeout = self.shutdown_timeout;
        let cycles = join_bounded("evaluation loop", self.eval_task, timeout).await;
        let commands = join_bounded("PTZ command loop", self.ptz_task, timeout).await;

        if let Some(task) = self.bridge_task {
            match join_bounded("signal bridge", task, timeout).await {
                Ok(Ok(forwarded)) => info!(forwarded, "Signal bridge joined"),
                Ok(Err(e)) => warn!("Signal bridge ended with error: {}", e),
                Err(e) => warn!("{}", e),
            }
        }

        if let Err(e) = &cycles {
            warn!("{}", e);
        }
        if let Err(e) = &commands {
            warn!("{}", e);
        }
        let (cycles, commands) = (cycles?, commands?);

        info!(
            dispatched = commands.dispatched,
            evaluated = cycles.evaluated,
            "Tracker runtime stopped"
        );
        Ok(RuntimeReport { commands, cycles })
    }
}

async fn join_bounded<T>(
    name: &'static str,
    mut task: JoinHandle<T>,
    timeout: Duration,
) -> Result<T, RuntimeError> {
    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(RuntimeError::Join(name, e.to_string())),
        Err(_) => {
            task.abort();
            Err(RuntimeError::ShutdownTimeout(name))
        }
    }
}
