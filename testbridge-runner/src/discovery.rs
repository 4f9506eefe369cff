// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discovery: collecting test cases from the engine and reporting them to the host.

use crate::{
    bus::{MessageBus, publish_blocking},
    cancel::StopCondition,
    capabilities::StructuredReportCapability,
    errors::{ExecuteRequestError, SinkError},
    identity,
    sink::CATEGORY_TRAIT,
    source_info::SourceInformationProvider,
    test_filter::TestFilter,
};
use std::{
    collections::HashSet,
    ops::ControlFlow,
    sync::{Arc, Mutex, PoisonError},
};
use testbridge_metadata::{
    SessionUid, TestCaseDescriptor, TestFileLocation, TestMetadata, TestNode, TestNodeState,
    TestNodeUid, TestNodeUpdateMessage,
};
use tracing::{debug, warn};

/// Collects the test cases found by the engine.
#[derive(Debug)]
pub struct DiscoverySink {
    stop: StopCondition,
    inner: Mutex<DiscoverySinkInner>,
}

#[derive(Debug, Default)]
struct DiscoverySinkInner {
    seen: HashSet<TestNodeUid>,
    test_cases: Vec<Arc<TestCaseDescriptor>>,
}

impl DiscoverySink {
    /// Creates a new `DiscoverySink`.
    pub fn new(stop: StopCondition) -> Self {
        Self {
            stop,
            inner: Mutex::new(DiscoverySinkInner::default()),
        }
    }

    /// Records a discovered test case.
    ///
    /// Returns `ControlFlow::Break` if the engine should stop discovering tests.
    pub fn on_test_case(&self, test_case: TestCaseDescriptor) -> ControlFlow<()> {
        {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.seen.insert(test_case.unique_id.clone()) {
                inner.test_cases.push(Arc::new(test_case));
            } else {
                warn!(uid = %test_case.unique_id, "engine reported test more than once, ignoring");
            }
        }

        if self.stop.should_stop() {
            debug!("stop requested, asking engine to stop discovery");
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Consumes the sink, returning the test cases in the order they were discovered.
    pub fn into_test_cases(self) -> Vec<Arc<TestCaseDescriptor>> {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .test_cases
    }
}

/// Turns discovered test cases into host updates.
pub struct DiscoveryTranslator<'a> {
    source_info: &'a dyn SourceInformationProvider,
    report: &'a StructuredReportCapability,
}

impl<'a> DiscoveryTranslator<'a> {
    /// Creates a new `DiscoveryTranslator`.
    pub fn new(
        source_info: &'a dyn SourceInformationProvider,
        report: &'a StructuredReportCapability,
    ) -> Self {
        Self {
            source_info,
            report,
        }
    }

    /// Builds the "discovered" node for a test case.
    pub fn discovered_node(&self, test_case: &TestCaseDescriptor) -> TestNode {
        let mut node = TestNode::new(
            test_case.unique_id.clone(),
            test_case.display_name.clone(),
            TestNodeState::Discovered,
        );
        node.method_identifier = Some(identity::normalize(test_case));

        let source_information = test_case
            .source_information
            .clone()
            .or_else(|| self.source_info.source_information(test_case));
        node.location = source_information
            .filter(|info| !info.file_name.as_str().is_empty())
            .map(|info| TestFileLocation {
                file_path: info.file_name.into_string(),
                line: info.line_number,
            });

        node.metadata = test_case
            .traits
            .pairs()
            .map(|(key, value)| TestMetadata {
                key: key.to_owned(),
                value: value.to_owned(),
            })
            .collect();

        if self.report.is_enabled() {
            if let Some(categories) = test_case.traits.get(CATEGORY_TRAIT) {
                node.report_mut().categories = categories.iter().cloned().collect();
            }
        }

        node
    }

    /// Filters the test cases, and publishes a "discovered" update for each one that is
    /// admitted. Returns the number of test cases published.
    ///
    /// Stops early if `stop` is satisfied.
    pub fn publish_all(
        &self,
        test_cases: &[Arc<TestCaseDescriptor>],
        filter: &TestFilter,
        bus: &dyn MessageBus,
        session_uid: &SessionUid,
        stop: &StopCondition,
    ) -> Result<usize, ExecuteRequestError> {
        let mut published = 0;
        for test_case in test_cases {
            if stop.should_stop() {
                debug!(published, "stop requested, not publishing remaining tests");
                break;
            }
            if !filter.admits(test_case)? {
                continue;
            }

            let node = self.discovered_node(test_case);
            let message = TestNodeUpdateMessage {
                session_uid: session_uid.clone(),
                node,
            };
            publish_blocking(bus, message).map_err(|error| SinkError::Publish {
                uid: test_case.unique_id.clone(),
                state: TestNodeState::Discovered.as_str(),
                error,
            })?;
            published += 1;
        }
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::RecordingBus, capabilities::GracefulStopCapability, cancel::CancellationToken,
        source_info::NullSourceInformationProvider, test_filter::FilterSpec,
    };
    use camino::Utf8PathBuf;
    use pretty_assertions::assert_eq;
    use testbridge_metadata::{CanonicalIdentity, SourceInformation};

    fn descriptor(uid: &str) -> TestCaseDescriptor {
        TestCaseDescriptor::new(uid, uid, "Tests, Version=1.0.0.0", "Ns.Type", uid)
    }

    #[test]
    fn discovery_sink_deduplicates() {
        let sink = DiscoverySink::new(StopCondition::never());
        assert_eq!(sink.on_test_case(descriptor("a")), ControlFlow::Continue(()));
        assert_eq!(sink.on_test_case(descriptor("b")), ControlFlow::Continue(()));
        assert_eq!(sink.on_test_case(descriptor("a")), ControlFlow::Continue(()));

        let uids: Vec<_> = sink
            .into_test_cases()
            .iter()
            .map(|test_case| test_case.unique_id.to_string())
            .collect();
        assert_eq!(uids, ["a", "b"]);
    }

    #[test]
    fn discovery_sink_stops() {
        let graceful_stop = GracefulStopCapability::new();
        let sink = DiscoverySink::new(StopCondition::new(
            CancellationToken::new(),
            graceful_stop.clone(),
        ));
        assert_eq!(sink.on_test_case(descriptor("a")), ControlFlow::Continue(()));
        graceful_stop.request_stop();
        assert_eq!(sink.on_test_case(descriptor("b")), ControlFlow::Break(()));
    }

    #[test]
    fn discovered_node() {
        let report = StructuredReportCapability::new();
        report.enable();
        let translator = DiscoveryTranslator::new(&NullSourceInformationProvider, &report);

        let mut test_case = descriptor("adds")
            .with_trait("Category", "Unit")
            .with_trait("Category", "Fast")
            .with_trait("Owner", "parsing")
            .with_signature(0, ["System.Int32"], "System.Void");
        test_case.source_information = Some(SourceInformation {
            file_name: Utf8PathBuf::from("src/tests.rs"),
            line_number: None,
        });

        let node = translator.discovered_node(&test_case);
        assert_eq!(node.state, TestNodeState::Discovered);
        assert_eq!(
            node.method_identifier,
            Some(CanonicalIdentity {
                assembly_name: "Tests, Version=1.0.0.0".to_owned(),
                namespace: "Ns".to_owned(),
                type_name: "Type".to_owned(),
                method_name: "adds".to_owned(),
                arity: 0,
                parameter_type_names: vec!["System.Int32".to_owned()],
                return_type_name: "System.Void".to_owned(),
            })
        );
        assert_eq!(
            node.location,
            Some(TestFileLocation {
                file_path: "src/tests.rs".to_owned(),
                line: None,
            })
        );
        let metadata: Vec<_> = node
            .metadata
            .iter()
            .map(|m| (m.key.as_str(), m.value.as_str()))
            .collect();
        assert_eq!(
            metadata,
            [("Category", "Unit"), ("Category", "Fast"), ("Owner", "parsing")]
        );
        assert_eq!(
            node.report.map(|report| report.categories),
            Some(vec!["Unit".to_owned(), "Fast".to_owned()])
        );
    }

    #[test]
    fn publish_all_filters() {
        let bus = RecordingBus::new();
        let report = StructuredReportCapability::new();
        let translator = DiscoveryTranslator::new(&NullSourceInformationProvider, &report);
        let test_cases: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|uid| Arc::new(descriptor(uid)))
            .collect();
        let filter =
            TestFilter::new(None, FilterSpec::UidList(vec!["a".into(), "c".into()])).unwrap();

        let published = translator
            .publish_all(
                &test_cases,
                &filter,
                &bus,
                &SessionUid::new("session"),
                &StopCondition::never(),
            )
            .unwrap();
        assert_eq!(published, 2);

        let messages = bus.messages();
        let uids: Vec<_> = messages.iter().map(|m| m.node.uid.as_str()).collect();
        assert_eq!(uids, ["a", "c"]);
        assert!(messages.iter().all(|m| m.node.report.is_none()));
    }
}
