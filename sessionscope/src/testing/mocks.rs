//! Mock resources for testing.

use async_trait::async_trait;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::builder::FnSessionBuilder;
use crate::cancellation::CancellationToken;
use crate::session::SessionResource;

/// Counters shared by every resource created from one builder.
#[derive(Debug, Default)]
pub struct ResourceProbe {
    created: AtomicUsize,
    started: AtomicUsize,
    stopped: AtomicUsize,
}

impl ResourceProbe {
    /// Creates a new probe.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Resources constructed.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Start hooks completed.
    #[must_use]
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Stop hooks invoked.
    #[must_use]
    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Started and not yet stopped.
    #[must_use]
    pub fn live(&self) -> usize {
        self.started().saturating_sub(self.stopped())
    }
}

/// A resource that records its start and stop calls.
#[derive(Debug)]
pub struct MockResource {
    label: String,
    probe: Arc<ResourceProbe>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_start: bool,
    fail_stop: bool,
    start_delay: Option<Duration>,
}

impl Default for MockResource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockResource {
    /// Creates a resource that starts and stops successfully.
    #[must_use]
    pub fn new() -> Self {
        Self::labelled("mock")
    }

    /// Creates a resource with a label.
    #[must_use]
    pub fn labelled(label: impl Into<String>) -> Self {
        Self::with_probe(ResourceProbe::new()).with_label(label)
    }

    /// Creates a resource reporting to a shared probe.
    #[must_use]
    pub fn with_probe(probe: Arc<ResourceProbe>) -> Self {
        probe.created.fetch_add(1, Ordering::SeqCst);
        Self {
            label: "mock".to_string(),
            probe,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            fail_start: false,
            fail_stop: false,
            start_delay: None,
        }
    }

    /// Creates a resource whose start hook fails.
    #[must_use]
    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::new()
        }
    }

    /// Creates a resource whose stop hook fails.
    #[must_use]
    pub fn failing_stop() -> Self {
        Self {
            fail_stop: true,
            ..Self::new()
        }
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Delays the start hook.
    #[must_use]
    pub const fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    /// Makes the stop hook fail.
    #[must_use]
    pub const fn with_failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// Returns the label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of start calls on this resource.
    #[must_use]
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of stop calls on this resource.
    #[must_use]
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// A builder producing fresh mock resources that report to `probe`.
    #[must_use]
    pub fn builder(probe: Arc<ResourceProbe>) -> FnSessionBuilder {
        FnSessionBuilder::for_resource(move || {
            let probe = probe.clone();
            async move { Ok(Self::with_probe(probe)) }
        })
    }
}

#[async_trait]
impl SessionResource for MockResource {
    async fn start(&self, _token: &CancellationToken) -> anyhow::Result<()> {
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            anyhow::bail!("{} failed to start", self.label);
        }
        self.probe.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.probe.stopped.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop {
            anyhow::bail!("{} failed to stop", self.label);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
