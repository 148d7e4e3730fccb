//! Bounded-concurrency batch validation

use crate::proxy::dns::Resolve;
use crate::proxy::models::{BatchReport, Proxy, TestResult};
use crate::proxy::prober::Probe;
use crate::proxy::validator::ProxyValidator;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Upper bound on validations in flight
pub const MAX_CONCURRENCY: usize = 20;

/// Default number of concurrent validations
pub const DEFAULT_CONCURRENCY: usize = 10;

/// State of one running batch
///
/// Proxies start in input order; a slot is refilled as soon as any in-flight
/// validation completes.
struct BatchJob<F: Future<Output = TestResult>> {
    queue: VecDeque<Proxy>,
    in_flight: FuturesUnordered<F>,
    results: Vec<TestResult>,
    limit: usize,
}

impl<F: Future<Output = TestResult>> BatchJob<F> {
    fn new(proxies: Vec<Proxy>, limit: usize) -> Self {
        Self {
            results: Vec::with_capacity(proxies.len()),
            queue: proxies.into(),
            in_flight: FuturesUnordered::new(),
            limit,
        }
    }

    /// Start queued proxies until every slot is taken
    fn fill(&mut self, start: impl Fn(Proxy) -> F) {
        while self.in_flight.len() < self.limit {
            match self.queue.pop_front() {
                Some(proxy) => self.in_flight.push(start(proxy)),
                None => break,
            }
        }
    }

    fn is_done(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_empty()
    }
}

/// Runs validations for a list of proxies with bounded concurrency
pub struct BatchScheduler<R, P> {
    validator: Arc<ProxyValidator<R, P>>,
}

impl<R, P> Clone for BatchScheduler<R, P> {
    fn clone(&self) -> Self {
        Self {
            validator: Arc::clone(&self.validator),
        }
    }
}

impl<R: Resolve, P: Probe> BatchScheduler<R, P> {
    pub fn new(validator: ProxyValidator<R, P>) -> Self {
        Self {
            validator: Arc::new(validator),
        }
    }

    /// Validate every proxy, at most `concurrency` at a time (clamped to
    /// 1..=20). Results come back in completion order.
    pub async fn run(&self, proxies: Vec<Proxy>, concurrency: usize) -> BatchReport {
        self.run_with_progress(proxies, concurrency, None).await
    }

    /// Like [`run`](Self::run), also sending each result to `progress` as it
    /// completes
    pub async fn run_with_progress(
        &self,
        proxies: Vec<Proxy>,
        concurrency: usize,
        progress: Option<&UnboundedSender<TestResult>>,
    ) -> BatchReport {
        let limit = concurrency.clamp(1, MAX_CONCURRENCY);
        let total = proxies.len();
        info!(total, concurrency = limit, "starting batch validation");

        let validator = &*self.validator;
        let mut job = BatchJob::new(proxies, limit);

        while !job.is_done() {
            job.fill(|proxy| async move { validator.validate(&proxy).await });

            let Some(result) = job.in_flight.next().await else {
                break;
            };
            debug!(
                proxy = %result.proxy,
                working = result.is_working(),
                done = job.results.len() + 1,
                total,
                "validation finished"
            );
            if let Some(tx) = progress {
                // A dropped receiver only means nobody is watching
                let _ = tx.send(result.clone());
            }
            job.results.push(result);
        }

        let report = BatchReport::new(job.results);
        info!(
            total = report.stats.total,
            working = report.stats.working,
            failed = report.stats.failed,
            avg_latency_ms = report.stats.avg_latency_ms,
            "batch validation finished"
        );
        report
    }
}

impl<R, P> BatchScheduler<R, P>
where
    R: Resolve + 'static,
    P: Probe + 'static,
{
    /// Run a batch on the runtime, streaming results as they complete
    ///
    /// The receiver closes once the batch is finished; the handle yields the
    /// full report.
    pub fn spawn(
        &self,
        proxies: Vec<Proxy>,
        concurrency: usize,
    ) -> (UnboundedReceiver<TestResult>, JoinHandle<BatchReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = self.clone();

        let handle = tokio::spawn(async move {
            scheduler
                .run_with_progress(proxies, concurrency, Some(&tx))
                .await
        });

        (rx, handle)
    }
}
