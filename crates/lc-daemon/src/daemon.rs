use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use lc_agents::collaborators::TemplateDrafter;
use lc_agents::orchestrator::AgentOrchestrator;
use lc_bridge::event_bus::EventBus;
use lc_bridge::protocol::BridgeMessage;
use lc_core::config::{Config, SchedulerConfig};
use lc_core::store::InMemoryStore;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::patrol::PatrolRunner;
use crate::shutdown::ShutdownSignal;

/// Loop intervals for the background scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonIntervals {
    pub overdue_sweep_secs: u64,
    pub pending_summary_secs: u64,
}

impl Default for DaemonIntervals {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for DaemonIntervals {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            overdue_sweep_secs: config.overdue_sweep_secs,
            pending_summary_secs: config.pending_summary_secs,
        }
    }
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub running: bool,
    pub sweep_count: u64,
    pub summary_count: u64,
    pub last_sweep_at: Option<DateTime<Utc>>,
    pub intervals: DaemonIntervals,
}

#[derive(Debug, Default)]
struct SchedulerState {
    running: AtomicBool,
    sweeps: AtomicU64,
    summaries: AtomicU64,
    last_sweep: Mutex<Option<DateTime<Utc>>>,
}

impl SchedulerState {
    fn record_sweep(&self, at: DateTime<Utc>) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        *self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner) = Some(at);
    }
}

/// Background scheduler around an orchestrator.
///
/// Sweeps overdue tasks and publishes pending-task summaries on the
/// orchestrator's event bus until the [`ShutdownSignal`] fires.
pub struct Daemon {
    config: Config,
    orchestrator: Arc<AgentOrchestrator>,
    intervals: DaemonIntervals,
    shutdown: ShutdownSignal,
    state: Arc<SchedulerState>,
}

impl Daemon {
    /// Daemon with an in-memory store and the local template drafter.
    pub fn new(config: Config) -> Self {
        let orchestrator = AgentOrchestrator::from_config(
            &config,
            Arc::new(InMemoryStore::new()),
            Arc::new(TemplateDrafter::new()),
            EventBus::new(),
        );
        Self::with_orchestrator(config, Arc::new(orchestrator))
    }

    pub fn with_orchestrator(config: Config, orchestrator: Arc<AgentOrchestrator>) -> Self {
        let intervals = DaemonIntervals::from(&config.scheduler);
        Self {
            config,
            orchestrator,
            intervals,
            shutdown: ShutdownSignal::new(),
            state: Arc::new(SchedulerState::default()),
        }
    }

    pub fn set_intervals(&mut self, intervals: DaemonIntervals) {
        self.intervals = intervals;
    }

    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn orchestrator(&self) -> &Arc<AgentOrchestrator> {
        &self.orchestrator
    }

    pub fn event_bus(&self) -> &EventBus {
        self.orchestrator.event_bus()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            enabled: self.config.scheduler.enabled,
            running: self.state.running.load(Ordering::Relaxed),
            sweep_count: self.state.sweeps.load(Ordering::Relaxed),
            summary_count: self.state.summaries.load(Ordering::Relaxed),
            last_sweep_at: *self
                .state
                .last_sweep
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            intervals: self.intervals,
        }
    }

    /// Run until shutdown. With the scheduler disabled this only waits.
    pub async fn run(&self) -> Result<()> {
        if !self.config.scheduler.enabled {
            info!("scheduler disabled, waiting for shutdown");
            self.shutdown.wait().await;
            return Ok(());
        }
        Self::run_loops(
            PatrolRunner::new(Arc::clone(self.orchestrator.task_agent())),
            self.event_bus().clone(),
            self.intervals,
            self.shutdown.clone(),
            Arc::clone(&self.state),
        )
        .await;
        Ok(())
    }

    /// Start the loops on the runtime and return immediately.
    pub fn spawn(&self) -> JoinHandle<()> {
        let patrol = PatrolRunner::new(Arc::clone(self.orchestrator.task_agent()));
        let bus = self.event_bus().clone();
        let intervals = self.intervals;
        let shutdown = self.shutdown.clone();
        let state = Arc::clone(&self.state);
        let enabled = self.config.scheduler.enabled;

        tokio::spawn(async move {
            if enabled {
                Self::run_loops(patrol, bus, intervals, shutdown, state).await;
            } else {
                shutdown.wait().await;
            }
        })
    }

    async fn run_loops(
        patrol: PatrolRunner,
        bus: EventBus,
        intervals: DaemonIntervals,
        shutdown: ShutdownSignal,
        state: Arc<SchedulerState>,
    ) {
        let mut shutdown_rx = shutdown.subscribe();
        if shutdown.is_shutting_down() {
            return;
        }

        let period = |secs: u64| Duration::from_secs(secs.max(1));
        let mut sweep_interval = tokio::time::interval(period(intervals.overdue_sweep_secs));
        let mut summary_interval = tokio::time::interval(period(intervals.pending_summary_secs));

        // First tick is immediate.
        sweep_interval.tick().await;
        summary_interval.tick().await;

        state.running.store(true, Ordering::Relaxed);
        info!(
            overdue_sweep_secs = intervals.overdue_sweep_secs,
            pending_summary_secs = intervals.pending_summary_secs,
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = sweep_interval.tick() => {
                    let now = Utc::now();
                    let report = patrol.sweep_overdue(now);
                    state.record_sweep(now);
                    debug!(overdue = report.overdue_count(), "sweep tick");
                }
                _ = summary_interval.tick() => {
                    let summary = patrol.pending_summary(Utc::now());
                    info!(
                        active = summary.active_tasks,
                        overdue = summary.overdue_tasks,
                        unassigned = summary.unassigned_tasks,
                        "pending task summary"
                    );
                    bus.publish(BridgeMessage::PendingSummary(summary));
                    state.summaries.fetch_add(1, Ordering::Relaxed);
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received, stopping scheduler");
                    break;
                }
            }
        }
        state.running.store(false, Ordering::Relaxed);
    }
}
