/*!
 * Terminal progress renderer
 *
 * Subscribes to generation events and drives an indicatif progress bar with
 * success/failure counts. Runs on its own thread until every publisher is
 * dropped.
 */

use crate::progress::{ProgressEvent, ProgressSubscriber};
use indicatif::{ProgressBar, ProgressStyle};
use std::thread;

/// CLI progress renderer
pub struct CliProgressRenderer {
    subscriber: ProgressSubscriber,
    bar: Option<ProgressBar>,
    succeeded: u64,
    failed: u64,
    verbose: bool,
}

impl CliProgressRenderer {
    pub fn new(subscriber: ProgressSubscriber, verbose: bool) -> Self {
        Self {
            subscriber,
            bar: None,
            succeeded: 0,
            failed: 0,
            verbose,
        }
    }

    /// Run the renderer in the current thread
    pub fn run(mut self) {
        while let Some(event) = self.subscriber.recv() {
            self.handle_event(event);
        }
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    /// Spawn the renderer in a background thread
    pub fn spawn(self) -> thread::JoinHandle<()> {
        thread::spawn(move || self.run())
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} routes ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
    }

    fn update_message(&self) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("ok {} / failed {}", self.succeeded, self.failed));
        }
    }

    fn handle_event(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::BatchStart { total, .. } => {
                let bar = ProgressBar::new(total);
                bar.set_style(Self::style());
                self.bar = Some(bar);
                self.succeeded = 0;
                self.failed = 0;
                self.update_message();
            }

            ProgressEvent::RouteComplete { .. } => {
                self.succeeded += 1;
                if let Some(bar) = &self.bar {
                    bar.inc(1);
                }
                self.update_message();
            }

            ProgressEvent::RouteFailed {
                from, to, reason, ..
            } => {
                self.failed += 1;
                if let Some(bar) = &self.bar {
                    bar.inc(1);
                    if self.verbose {
                        bar.println(format!("   ✗ {} → {}: {}", from, to, reason));
                    }
                }
                self.update_message();
            }

            // The bar already shows rate and ETA
            ProgressEvent::BatchProgress { .. } => {}

            ProgressEvent::BatchComplete {
                succeeded,
                failed,
                duration_ms,
                cancelled,
                ..
            } => {
                if let Some(bar) = self.bar.take() {
                    let status = if cancelled { "cancelled" } else { "complete" };
                    bar.finish_with_message(format!(
                        "{}: {} ok, {} failed in {:.1}s",
                        status,
                        succeeded,
                        failed,
                        duration_ms as f64 / 1000.0
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressPublisher;

    #[test]
    fn test_renderer_counts_outcomes() {
        let (publisher, subscriber) = ProgressPublisher::unbounded();
        let mut renderer = CliProgressRenderer::new(subscriber, false);

        renderer.handle_event(ProgressEvent::batch_start(3));
        renderer.handle_event(ProgressEvent::route_complete("a", "b", 1.0));
        renderer.handle_event(ProgressEvent::route_complete("a", "c", 1.0));
        renderer.handle_event(ProgressEvent::route_failed("b", "c", "no_route".to_string()));

        assert_eq!(renderer.succeeded, 2);
        assert_eq!(renderer.failed, 1);
        assert_eq!(renderer.bar.as_ref().map(|b| b.position()), Some(3));

        renderer.handle_event(ProgressEvent::batch_complete(2, 1, 100, false));
        assert!(renderer.bar.is_none());
        drop(publisher);
    }

    #[test]
    fn test_spawned_renderer_exits_when_publisher_drops() {
        let (publisher, subscriber) = ProgressPublisher::unbounded();
        let handle = CliProgressRenderer::new(subscriber, false).spawn();
        publisher.publish(ProgressEvent::batch_start(1));
        publisher.publish(ProgressEvent::route_complete("a", "b", 1.0));
        publisher.publish(ProgressEvent::batch_complete(1, 0, 5, false));
        drop(publisher);
        handle.join().unwrap();
    }
}
