// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Translates lifecycle events from the engine into updates for the host.
//!
//! The [`ExecutionSink`] is called on the engine's worker threads. For every event it builds a
//! status record out of the event payload, publishes it to the host, and waits for the publish to
//! complete before returning. This means the engine can never get ahead of the host.
//!
//! After each event, the sink checks whether the host asked to stop, and if so tells the engine to
//! stop delivering events.

use crate::{
    bus::{MessageBus, publish_blocking},
    cancel::StopCondition,
    capabilities::StructuredReportCapability,
    errors::{ExecuteRequestError, SinkError},
    events::{CleanupFailure, FailureInformation, LifecycleEvent, RunSummary, TestResult},
};
use chrono::{TimeDelta, Utc};
use std::{
    ops::ControlFlow,
    sync::{Arc, Mutex, PoisonError},
};
use testbridge_metadata::{
    CleanupTag, FailureDetail, ReportMessage, SessionUid, TestCaseDescriptor, TestNode,
    TestNodeState, TestNodeUpdateMessage, TimingInfo,
};
use tokio::sync::oneshot;
use tracing::debug;

/// The trait key whose values are reported as categories in structured report mode.
pub const CATEGORY_TRAIT: &str = "category";

/// Options for an [`ExecutionSink`].
#[derive(Clone, Debug, Default)]
pub struct ExecutionSinkOptions {
    /// Report skipped tests as failures.
    pub fail_skips: bool,
}

/// Translates engine lifecycle events into host updates.
///
/// The sink is shared between all of the engine's worker threads.
pub struct ExecutionSink {
    bus: Arc<dyn MessageBus>,
    session_uid: SessionUid,
    report: StructuredReportCapability,
    stop: StopCondition,
    options: ExecutionSinkOptions,
    completion: RunCompletionSignal,
}

impl ExecutionSink {
    /// Creates a new `ExecutionSink`.
    ///
    /// `completion` is signaled when the engine reports that the run has finished.
    pub fn new(
        bus: Arc<dyn MessageBus>,
        session_uid: SessionUid,
        report: StructuredReportCapability,
        stop: StopCondition,
        options: ExecutionSinkOptions,
        completion: RunCompletionSignal,
    ) -> Self {
        Self {
            bus,
            session_uid,
            report,
            stop,
            options,
            completion,
        }
    }

    /// Processes a single lifecycle event.
    ///
    /// Returns `ControlFlow::Break` if the engine should stop delivering events. Errors are not
    /// recoverable: the engine should abandon the run.
    pub fn on_event(&self, event: LifecycleEvent) -> Result<ControlFlow<()>, SinkError> {
        debug!(kind = event.kind(), "received lifecycle event");
        match event {
            LifecycleEvent::TestStarting { test_case } => {
                self.publish(self.status_record(&test_case, TestNodeState::InProgress))?;
            }
            LifecycleEvent::TestPassed { result } => {
                self.publish(self.result_record(&result, TestNodeState::Passed, None))?;
            }
            LifecycleEvent::TestFailed { result, failure } => {
                self.publish_failure(&result, &failure)?;
            }
            LifecycleEvent::TestSkipped { result, reason } => {
                if self.options.fail_skips {
                    let failure = FailureInformation::from_message(reason.unwrap_or_default());
                    self.publish_failure(&result, &failure)?;
                } else {
                    let state = TestNodeState::Skipped { reason };
                    self.publish(self.result_record(&result, state, None))?;
                }
            }
            LifecycleEvent::CleanupFailure(cleanup) => {
                self.publish_cleanup_failure(&cleanup)?;
            }
            LifecycleEvent::RunFinished(summary) => {
                debug!(
                    total = summary.total,
                    failed = summary.failed,
                    skipped = summary.skipped,
                    not_run = summary.not_run,
                    "run finished",
                );
                self.completion.signal(summary);
                return Ok(ControlFlow::Continue(()));
            }
        }

        if self.stop.should_stop() {
            debug!("stop requested, asking engine to stop");
            Ok(ControlFlow::Break(()))
        } else {
            Ok(ControlFlow::Continue(()))
        }
    }

    fn publish_failure(
        &self,
        result: &TestResult,
        failure: &FailureInformation,
    ) -> Result<(), SinkError> {
        let detail = failure.to_detail();
        let state = TestNodeState::Failed {
            failure: detail.clone(),
        };
        self.publish(self.result_record(result, state, Some(detail)))
    }

    // A cleanup failure is reported once for every test case in the unit that failed to clean
    // up, each carrying the same tag.
    fn publish_cleanup_failure(&self, cleanup: &CleanupFailure) -> Result<(), SinkError> {
        let tag = CleanupTag::new(cleanup.scope, &cleanup.unit_name);
        let detail = cleanup.failure.to_detail();
        debug!(
            label = %tag.label,
            affected = cleanup.affected.len(),
            "fanning out cleanup failure",
        );

        for test_case in &cleanup.affected {
            let result = TestResult {
                test_case: Arc::clone(test_case),
                execution_time: cleanup.execution_time,
                output: cleanup.output.clone(),
            };
            let state = TestNodeState::Failed {
                failure: detail.clone(),
            };
            let mut node = self.result_record(&result, state, Some(detail.clone()));
            node.cleanup = Some(tag.clone());
            self.publish(node)?;
        }
        Ok(())
    }

    // Only identity and state: the rest of the descriptor was sent during discovery.
    fn status_record(&self, test_case: &TestCaseDescriptor, state: TestNodeState) -> TestNode {
        TestNode::new(
            test_case.unique_id.clone(),
            test_case.display_name.clone(),
            state,
        )
    }

    fn result_record(
        &self,
        result: &TestResult,
        state: TestNodeState,
        failure: Option<FailureDetail>,
    ) -> TestNode {
        let test_case = &result.test_case;
        let mut node = self.status_record(test_case, state);

        let end_time = Utc::now();
        let elapsed = TimeDelta::from_std(result.execution_time).unwrap_or(TimeDelta::zero());
        node.timing = Some(TimingInfo {
            start_time: end_time - elapsed,
            end_time,
            duration: result.execution_time,
        });
        if !result.output.is_empty() {
            node.standard_output = Some(result.output.clone());
        }

        if self.report.is_enabled() {
            let report = node.report_mut();
            if let Some(categories) = test_case.traits.get(CATEGORY_TRAIT) {
                report.categories = categories.iter().cloned().collect();
            }
            if !result.output.is_empty() {
                report
                    .messages
                    .push(ReportMessage::StandardOutput(result.output.clone()));
            }
            report.exception = failure;
            report.fully_qualified_type_name = Some(test_case.type_name.clone());
        }

        node
    }

    fn publish(&self, node: TestNode) -> Result<(), SinkError> {
        let uid = node.uid.clone();
        let state = node.state.as_str();
        let message = TestNodeUpdateMessage {
            session_uid: self.session_uid.clone(),
            node,
        };
        publish_blocking(self.bus.as_ref(), message)
            .map_err(|error| SinkError::Publish { uid, state, error })
    }
}

/// Creates a [`RunCompletionSignal`] and the [`RunCompletionWaiter`] that observes it.
pub fn run_completion() -> (RunCompletionSignal, RunCompletionWaiter) {
    let (sender, receiver) = oneshot::channel();
    (
        RunCompletionSignal {
            sender: Mutex::new(Some(sender)),
        },
        RunCompletionWaiter { receiver },
    )
}

/// Signaled exactly once, when every event for a run has been processed.
#[derive(Debug)]
pub struct RunCompletionSignal {
    sender: Mutex<Option<oneshot::Sender<RunSummary>>>,
}

impl RunCompletionSignal {
    /// Signals completion. Returns false if completion was already signaled.
    pub fn signal(&self, summary: RunSummary) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            // The waiter may have been dropped, which is fine.
            Some(sender) => {
                _ = sender.send(summary);
                true
            }
            None => false,
        }
    }
}

/// Waits for a [`RunCompletionSignal`].
#[derive(Debug)]
pub struct RunCompletionWaiter {
    receiver: oneshot::Receiver<RunSummary>,
}

impl RunCompletionWaiter {
    /// Waits for completion on a dedicated blocking worker, so that no runtime worker is tied up
    /// while the engine finishes.
    ///
    /// Returns an error if the signal was dropped without being signaled.
    pub async fn wait(self) -> Result<RunSummary, ExecuteRequestError> {
        let receiver = self.receiver;
        tokio::task::spawn_blocking(move || receiver.blocking_recv())
            .await?
            .map_err(|_| ExecuteRequestError::RunNotCompleted)
    }
}
