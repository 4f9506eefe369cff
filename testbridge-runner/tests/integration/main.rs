// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests: requests run through the framework against a scripted engine.

mod fixtures;

use fixtures::*;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use test_case::test_case;
use testbridge_metadata::{CleanupScope, ReportMessage, TestNodeState};
use testbridge_runner::{
    bus::RecordingBus,
    cancel::CancellationToken,
    config::AssemblyConfig,
    errors::{ConfigurationError, ExecuteRequestError, SinkError},
    framework::{RequestOutcome, TestFrameworkOptions, TestRequest},
    test_filter::FilterSpec,
};

const MATH_SCRIPT: &str = indoc! {r#"
    {
        "assembly-name": "Tests, Version=1.0.0.0, Culture=neutral",
        "tests": [
            {
                "uid": "adds",
                "type": "Ns.Math",
                "method": "Adds",
                "traits": { "Category": ["Unit"] },
                "output": "hello\n",
                "execution-time-ms": 5
            },
            {
                "uid": "fails",
                "type": "Ns.Math",
                "method": "Fails",
                "outcome": {
                    "kind": "failed",
                    "failure": {
                        "exception-types": ["System.Exception"],
                        "messages": ["boom"],
                        "stack-traces": ["at Ns.Math.Fails()"],
                        "parent-indices": [-1]
                    }
                }
            }
        ]
    }
"#};

fn run_request(filter: FilterSpec) -> TestRequest {
    TestRequest::Run { filter }
}

#[tokio::test]
async fn run_reports_pass_and_fail() {
    let fixture = Fixture::new(MATH_SCRIPT);
    let framework = fixture.framework(TestFrameworkOptions::default());
    let bus = Arc::new(RecordingBus::new());

    let (result, completed) = execute(
        &framework,
        run_request(FilterSpec::None),
        bus.clone(),
        CancellationToken::new(),
    )
    .await;
    let RequestOutcome::Ran(summary) = result.expect("run succeeded") else {
        panic!("expected a run outcome");
    };
    assert!(completed, "request was completed");
    assert_eq!((summary.total, summary.failed, summary.not_run), (2, 1, 0));

    let messages = bus.messages();
    assert_eq!(
        transitions(&messages),
        [
            ("adds".to_owned(), "in-progress"),
            ("adds".to_owned(), "passed"),
            ("fails".to_owned(), "in-progress"),
            ("fails".to_owned(), "failed"),
        ]
    );
    assert_eq!(messages.iter().filter(|m| is_terminal(m)).count(), 2);

    let passed = &messages[1].node;
    assert_eq!(passed.standard_output.as_deref(), Some("hello\n"));
    let timing = passed.timing.as_ref().expect("results carry timing");
    assert_eq!(timing.duration.as_millis(), 5);
    assert!(timing.start_time <= timing.end_time);

    let TestNodeState::Failed { failure } = &messages[3].node.state else {
        panic!("expected a failure");
    };
    assert_eq!(failure.message, "System.Exception : boom");
    assert!(failure.stack_trace.contains("at Ns.Math.Fails()"));
    assert!(messages.iter().all(|m| m.node.report.is_none()));
}

#[tokio::test]
async fn discover_reports_identity_and_traits() {
    let fixture = Fixture::new(MATH_SCRIPT);
    let framework = fixture.framework(TestFrameworkOptions::default());
    framework.structured_report().enable();
    let bus = Arc::new(RecordingBus::new());

    let (result, completed) = execute(
        &framework,
        TestRequest::Discover {
            filter: FilterSpec::None,
        },
        bus.clone(),
        CancellationToken::new(),
    )
    .await;
    assert_eq!(
        result.expect("discovery succeeded"),
        RequestOutcome::Discovered { published: 2 }
    );
    assert!(completed);

    let messages = bus.messages();
    assert_eq!(
        transitions(&messages),
        [
            ("adds".to_owned(), "discovered"),
            ("fails".to_owned(), "discovered"),
        ]
    );

    let adds = &messages[0].node;
    let identity = adds
        .method_identifier
        .as_ref()
        .expect("discovered nodes carry an identity");
    assert_eq!(
        identity.assembly_name,
        "Tests, Version=1.0.0.0, Culture=neutral"
    );
    assert_eq!(
        (identity.namespace.as_str(), identity.type_name.as_str()),
        ("Ns", "Math")
    );
    assert_eq!(identity.method_name, "Adds");
    assert_eq!(adds.location, None);
    assert_eq!(adds.metadata.len(), 1);
    assert_eq!(
        (adds.metadata[0].key.as_str(), adds.metadata[0].value.as_str()),
        ("Category", "Unit")
    );
    assert_eq!(
        adds.report.as_ref().map(|report| report.categories.clone()),
        Some(vec!["Unit".to_owned()])
    );
}

#[tokio::test]
async fn cleanup_failure_fans_out_to_class() {
    let fixture = Fixture::new(indoc! {r#"
        {
            "assembly-name": "Tests",
            "tests": [
                { "uid": "a", "type": "Ns.Math", "method": "A" },
                { "uid": "b", "type": "Ns.Math", "method": "B" },
                { "uid": "c", "type": "Ns.Math", "method": "C" },
                { "uid": "d", "type": "Ns.Other", "method": "D" }
            ],
            "cleanup-failures": [
                {
                    "scope": "test-class",
                    "unit": "Ns.Math",
                    "failure": { "messages": ["dispose failed"] }
                }
            ]
        }
    "#});
    let framework = fixture.framework(TestFrameworkOptions::default());
    let bus = Arc::new(RecordingBus::new());

    let (result, completed) = execute(
        &framework,
        run_request(FilterSpec::None),
        bus.clone(),
        CancellationToken::new(),
    )
    .await;
    result.expect("run succeeded");
    assert!(completed);

    let messages = bus.messages();
    let cleanup: Vec<_> = messages
        .iter()
        .filter(|m| m.node.cleanup.is_some())
        .collect();
    let uids: Vec<_> = cleanup.iter().map(|m| m.node.uid.as_str()).collect();
    assert_eq!(uids, ["a", "b", "c"]);
    for message in &cleanup {
        let tag = message.node.cleanup.as_ref().expect("filtered above");
        assert_eq!(tag.scope, CleanupScope::TestClass);
        assert_eq!(tag.label, "[Test Class Cleanup Failure (Ns.Math)]");
        let TestNodeState::Failed { failure } = &message.node.state else {
            panic!("cleanup failures are reported as failures");
        };
        assert_eq!(failure.message, "dispose failed");
    }

    // Cleanup failures come after every test-level event.
    let first_cleanup = messages
        .iter()
        .position(|m| m.node.cleanup.is_some())
        .expect("cleanup failures were published");
    assert_eq!(first_cleanup, messages.len() - 3);
    assert_eq!(
        messages
            .iter()
            .filter(|m| m.node.state == TestNodeState::Passed)
            .count(),
        4
    );
}

const SCOPED_SCRIPT: &str = indoc! {r#"
    {
        "assembly-name": "Tests, Version=1.0.0.0",
        "tests": [
            { "uid": "adds", "type": "Ns.Math", "method": "Adds", "collection": "Shared" },
            { "uid": "parses", "type": "Ns.Math", "method": "Parses", "theory-rows": ["1", "2"] },
            { "uid": "reads", "type": "Ns.Io", "method": "Reads", "collection": "Shared" }
        ]
    }
"#};

#[test_case(CleanupScope::Test, "Ns.Math.Parses(2)", &["parses/1"]; "test")]
#[test_case(CleanupScope::TestMethod, "Ns.Math.Parses", &["parses/0", "parses/1"]; "test method")]
#[test_case(CleanupScope::TestClass, "Ns.Math", &["adds", "parses/0", "parses/1"]; "test class")]
#[test_case(CleanupScope::TestCollection, "Shared", &["adds", "reads"]; "test collection")]
#[test_case(
    CleanupScope::TestAssembly,
    "Tests",
    &["adds", "parses/0", "parses/1", "reads"];
    "test assembly"
)]
#[tokio::test]
async fn cleanup_failure_scopes(scope: CleanupScope, unit: &str, expected: &[&str]) {
    let mut script: serde_json::Value =
        serde_json::from_str(SCOPED_SCRIPT).expect("script is valid JSON");
    script["cleanup-failures"] = serde_json::json!([{
        "scope": scope,
        "unit": unit,
        "failure": { "messages": ["cleanup failed"] },
    }]);
    let fixture = Fixture::new(&script.to_string());
    let framework = fixture.framework(TestFrameworkOptions::default());
    let bus = Arc::new(RecordingBus::new());

    let (result, completed) = execute(
        &framework,
        run_request(FilterSpec::None),
        bus.clone(),
        CancellationToken::new(),
    )
    .await;
    result.expect("run succeeded");
    assert!(completed);

    let messages = bus.messages();
    let cleanup: Vec<_> = messages
        .iter()
        .filter(|m| m.node.cleanup.is_some())
        .collect();
    let uids: Vec<_> = cleanup.iter().map(|m| m.node.uid.as_str()).collect();
    assert_eq!(uids, expected);

    let label = format!("[{} Cleanup Failure ({unit})]", scope.description());
    for message in &cleanup {
        let tag = message.node.cleanup.as_ref().expect("filtered above");
        assert_eq!(tag.scope, scope);
        assert_eq!(tag.label, label);
        assert!(matches!(message.node.state, TestNodeState::Failed { .. }));
    }
}

#[tokio::test]
async fn cancellation_stops_new_tests() {
    let fixture = Fixture::with_config(
        indoc! {r#"
            {
                "assembly-name": "Tests",
                "tests": [
                    { "uid": "a", "type": "Ns.Math", "method": "A" },
                    { "uid": "b", "type": "Ns.Math", "method": "B" },
                    { "uid": "c", "type": "Ns.Math", "method": "C" },
                    { "uid": "d", "type": "Ns.Other", "method": "D" }
                ],
                "cleanup-failures": [
                    { "scope": "test-assembly", "unit": "Tests", "failure": { "messages": ["x"] } }
                ]
            }
        "#},
        Some("parallelize-test-collections = false\n"),
    );
    let framework = fixture.framework(TestFrameworkOptions::default());
    let token = CancellationToken::new();
    let bus = Arc::new(CancellingBus::new("b", "passed", token.clone()));

    let (result, completed) = execute(
        &framework,
        run_request(FilterSpec::None),
        bus.clone(),
        token.clone(),
    )
    .await;
    let RequestOutcome::Ran(summary) = result.expect("run succeeded") else {
        panic!("expected a run outcome");
    };
    assert!(completed);
    assert!(token.is_cancelled());
    assert_eq!((summary.total, summary.not_run), (2, 2));

    assert_eq!(
        transitions(&bus.messages()),
        [
            ("a".to_owned(), "in-progress"),
            ("a".to_owned(), "passed"),
            ("b".to_owned(), "in-progress"),
            ("b".to_owned(), "passed"),
        ]
    );
}

#[tokio::test]
async fn parallel_cancellation_finishes_started_tests() {
    let fixture = Fixture::new(indoc! {r#"
        {
            "assembly-name": "Tests",
            "tests": [
                { "uid": "a1", "type": "Ns.A", "method": "One" },
                { "uid": "a2", "type": "Ns.A", "method": "Two" },
                { "uid": "a3", "type": "Ns.A", "method": "Three" },
                { "uid": "b1", "type": "Ns.B", "method": "One" },
                { "uid": "b2", "type": "Ns.B", "method": "Two" },
                { "uid": "b3", "type": "Ns.B", "method": "Three" }
            ]
        }
    "#});
    let framework = fixture.framework(TestFrameworkOptions::default());
    let token = CancellationToken::new();
    let bus = Arc::new(CancellingBus::new("a1", "passed", token.clone()));

    let (result, completed) = execute(
        &framework,
        run_request(FilterSpec::None),
        bus.clone(),
        token.clone(),
    )
    .await;
    let RequestOutcome::Ran(summary) = result.expect("run succeeded") else {
        panic!("expected a run outcome");
    };
    assert!(completed);
    assert_eq!(summary.total + summary.not_run, 6);
    assert!(summary.not_run >= 1, "a2 is never started");

    // Every test that started, including any that raced with the stop, reports a result.
    let messages = bus.messages();
    let started: Vec<_> = messages
        .iter()
        .filter(|m| m.node.state == TestNodeState::InProgress)
        .map(|m| m.node.uid.as_str())
        .collect();
    let finished: Vec<_> = messages
        .iter()
        .filter(|m| is_terminal(m))
        .map(|m| m.node.uid.as_str())
        .collect();
    assert_eq!(started.len(), summary.total);
    for uid in &started {
        assert!(finished.contains(uid), "{uid} started but never finished");
    }
    assert!(!started.contains(&"a2"));
}

#[tokio::test]
async fn graceful_stop_during_discovery() {
    let fixture = Fixture::new(MATH_SCRIPT);
    let framework = fixture.framework(TestFrameworkOptions::default());
    framework.graceful_stop().request_stop();
    let bus = Arc::new(RecordingBus::new());

    let (result, completed) = execute(
        &framework,
        TestRequest::Discover {
            filter: FilterSpec::None,
        },
        bus.clone(),
        CancellationToken::new(),
    )
    .await;
    assert_eq!(
        result.expect("discovery succeeded"),
        RequestOutcome::Discovered { published: 0 }
    );
    assert!(completed);
    assert!(bus.messages().is_empty());
}

#[tokio::test]
async fn uid_list_filter() {
    let fixture = Fixture::new(indoc! {r#"
        {
            "assembly-name": "Tests",
            "tests": [
                { "uid": "A", "type": "Ns.Math", "method": "A" },
                { "uid": "B", "type": "Ns.Math", "method": "B" },
                { "uid": "C", "type": "Ns.Math", "method": "C" }
            ]
        }
    "#});
    let framework = fixture.framework(TestFrameworkOptions::default());
    let bus = Arc::new(RecordingBus::new());

    let (result, _) = execute(
        &framework,
        run_request(FilterSpec::UidList(vec!["A".into(), "B".into()])),
        bus.clone(),
        CancellationToken::new(),
    )
    .await;
    result.expect("run succeeded");

    let mut uids: Vec<_> = bus
        .messages()
        .iter()
        .filter(|m| is_terminal(m))
        .map(|m| m.node.uid.to_string())
        .collect();
    uids.sort();
    assert_eq!(uids, ["A", "B"]);
}

#[tokio::test]
async fn legacy_filter_matches_traits() {
    let fixture = Fixture::new(MATH_SCRIPT);
    let framework = fixture.framework(TestFrameworkOptions {
        filter: Some("Category=Unit".to_owned()),
        ..Default::default()
    });
    let bus = Arc::new(RecordingBus::new());

    let (result, _) = execute(
        &framework,
        run_request(FilterSpec::None),
        bus.clone(),
        CancellationToken::new(),
    )
    .await;
    result.expect("run succeeded");

    assert_eq!(
        transitions(&bus.messages()),
        [
            ("adds".to_owned(), "in-progress"),
            ("adds".to_owned(), "passed"),
        ]
    );
}

#[tokio::test]
async fn tree_filter_matches_path() {
    let fixture = Fixture::new(MATH_SCRIPT);
    let framework = fixture.framework(TestFrameworkOptions::default());
    let bus = Arc::new(RecordingBus::new());

    let (result, _) = execute(
        &framework,
        TestRequest::Discover {
            filter: FilterSpec::TreeNode("/Tests/Ns/Math/Fails".to_owned()),
        },
        bus.clone(),
        CancellationToken::new(),
    )
    .await;
    assert_eq!(
        result.expect("discovery succeeded"),
        RequestOutcome::Discovered { published: 1 }
    );
    assert_eq!(bus.messages()[0].node.uid.as_str(), "fails");
}

const SKIP_SCRIPT: &str = indoc! {r#"
    {
        "assembly-name": "Tests",
        "tests": [
            {
                "uid": "skips",
                "type": "Ns.Math",
                "method": "Skips",
                "outcome": { "kind": "skipped", "reason": "flaky on CI" }
            }
        ]
    }
"#};

#[tokio::test]
async fn skips_are_reported() {
    let fixture = Fixture::new(SKIP_SCRIPT);
    let framework = fixture.framework(TestFrameworkOptions::default());
    let bus = Arc::new(RecordingBus::new());

    let (result, _) = execute(
        &framework,
        run_request(FilterSpec::None),
        bus.clone(),
        CancellationToken::new(),
    )
    .await;
    result.expect("run succeeded");

    assert_eq!(
        bus.messages()[1].node.state,
        TestNodeState::Skipped {
            reason: Some("flaky on CI".to_owned())
        }
    );
}

#[tokio::test]
async fn fail_skips_reports_failures() {
    let fixture = Fixture::with_config(SKIP_SCRIPT, Some("fail-skips = true\n"));
    let framework = fixture.framework(TestFrameworkOptions::default());
    let bus = Arc::new(RecordingBus::new());

    let (result, _) = execute(
        &framework,
        run_request(FilterSpec::None),
        bus.clone(),
        CancellationToken::new(),
    )
    .await;
    result.expect("run succeeded");

    let TestNodeState::Failed { failure } = &bus.messages()[1].node.state else {
        panic!("skips are reported as failures");
    };
    assert_eq!(failure.message, "flaky on CI");
    assert_eq!(failure.stack_trace, "");
}

#[tokio::test]
async fn structured_report_properties() {
    let fixture = Fixture::new(MATH_SCRIPT);
    let framework = fixture.framework(TestFrameworkOptions::default());
    framework.structured_report().enable();
    let bus = Arc::new(RecordingBus::new());

    let (result, _) = execute(
        &framework,
        run_request(FilterSpec::None),
        bus.clone(),
        CancellationToken::new(),
    )
    .await;
    result.expect("run succeeded");

    let messages = bus.messages();
    assert!(messages[0].node.report.is_none(), "in-progress nodes are bare");

    let passed = messages[1].node.report.as_ref().expect("report properties");
    assert_eq!(passed.categories, ["Unit"]);
    assert_eq!(
        passed.messages,
        [ReportMessage::StandardOutput("hello\n".to_owned())]
    );
    assert_eq!(passed.exception, None);
    assert_eq!(passed.fully_qualified_type_name.as_deref(), Some("Ns.Math"));

    let failed = messages[3].node.report.as_ref().expect("report properties");
    assert_eq!(
        failed.exception.as_ref().map(|e| e.message.as_str()),
        Some("System.Exception : boom")
    );
}

#[tokio::test]
async fn unsupported_request_kind() {
    let fixture = Fixture::new(MATH_SCRIPT);
    let framework = fixture.framework(TestFrameworkOptions::default());
    let bus = Arc::new(RecordingBus::new());

    let (result, completed) = execute(
        &framework,
        TestRequest::Other {
            kind: "ping".to_owned(),
        },
        bus.clone(),
        CancellationToken::new(),
    )
    .await;
    assert!(matches!(
        result,
        Err(ExecuteRequestError::UnsupportedRequestKind(error)) if error.kind() == "ping"
    ));
    assert!(!completed);
    assert!(bus.messages().is_empty());
}

#[tokio::test]
async fn unsupported_filter_kind() {
    let fixture = Fixture::new(MATH_SCRIPT);
    let framework = fixture.framework(TestFrameworkOptions::default());
    let bus = Arc::new(RecordingBus::new());

    let (result, completed) = execute(
        &framework,
        run_request(FilterSpec::Other {
            kind: "regex".to_owned(),
        }),
        bus.clone(),
        CancellationToken::new(),
    )
    .await;
    assert!(matches!(
        result,
        Err(ExecuteRequestError::UnsupportedFilterKind(error)) if error.kind() == "regex"
    ));
    assert!(!completed);
    assert!(bus.messages().is_empty());
}

#[tokio::test]
async fn invalid_legacy_filter() {
    let fixture = Fixture::new(MATH_SCRIPT);
    let framework = fixture.framework(TestFrameworkOptions {
        filter: Some("(Category=Unit".to_owned()),
        ..Default::default()
    });
    let bus = Arc::new(RecordingBus::new());

    let (result, completed) = execute(
        &framework,
        run_request(FilterSpec::None),
        bus.clone(),
        CancellationToken::new(),
    )
    .await;
    assert!(matches!(result, Err(ExecuteRequestError::TestFilter(_))));
    assert!(!completed);
}

#[tokio::test]
async fn missing_test_binary() {
    let fixture = Fixture::new(MATH_SCRIPT);
    std::fs::remove_file(&fixture.binary).expect("removed test binary");
    let framework = fixture.framework(TestFrameworkOptions::default());

    let (result, completed) = execute(
        &framework,
        run_request(FilterSpec::None),
        Arc::new(RecordingBus::new()),
        CancellationToken::new(),
    )
    .await;
    assert!(matches!(
        result,
        Err(ExecuteRequestError::Configuration(
            ConfigurationError::MissingTestBinary { path }
        )) if path == fixture.binary
    ));
    assert!(!completed);
}

#[tokio::test]
async fn missing_settings_file() {
    let fixture = Fixture::new(MATH_SCRIPT);
    let settings = fixture.dir().join("missing.runsettings");
    let framework = fixture.framework(TestFrameworkOptions {
        settings: Some(settings.clone()),
        ..Default::default()
    });

    let (result, completed) = execute(
        &framework,
        run_request(FilterSpec::None),
        Arc::new(RecordingBus::new()),
        CancellationToken::new(),
    )
    .await;
    assert!(matches!(
        result,
        Err(ExecuteRequestError::Configuration(
            ConfigurationError::MissingSettingsFile { path }
        )) if path == settings
    ));
    assert!(!completed);
}

#[tokio::test]
async fn settings_file_disables_parallelization() {
    let fixture = Fixture::new(MATH_SCRIPT);
    let settings = fixture.dir().join("test.runsettings");
    std::fs::write(
        &settings,
        indoc! {"
            <RunSettings>
              <RunConfiguration>
                <DisableParallelization>true</DisableParallelization>
              </RunConfiguration>
            </RunSettings>
        "},
    )
    .expect("wrote settings");
    let framework = fixture.framework(TestFrameworkOptions {
        settings: Some(settings),
        ..Default::default()
    });
    let bus = Arc::new(RecordingBus::new());

    let (result, completed) = execute(
        &framework,
        run_request(FilterSpec::None),
        bus.clone(),
        CancellationToken::new(),
    )
    .await;
    result.expect("run succeeded");
    assert!(completed);
    assert_eq!(bus.messages().len(), 4);
}

#[tokio::test]
async fn invalid_assembly_config() {
    let fixture = Fixture::with_config(MATH_SCRIPT, Some("fail-skips = \"sometimes\"\n"));
    let framework = fixture.framework(TestFrameworkOptions::default());

    let (result, _) = execute(
        &framework,
        run_request(FilterSpec::None),
        Arc::new(RecordingBus::new()),
        CancellationToken::new(),
    )
    .await;
    let Err(ExecuteRequestError::Configuration(ConfigurationError::Config(error))) = result else {
        panic!("expected a config error");
    };
    assert_eq!(
        error.config_file(),
        &AssemblyConfig::config_path(&fixture.binary)
    );
}

#[tokio::test]
async fn publish_failure_is_fatal() {
    let fixture = Fixture::new(MATH_SCRIPT);
    let framework = fixture.framework(TestFrameworkOptions::default());

    let (result, completed) = execute(
        &framework,
        TestRequest::Discover {
            filter: FilterSpec::None,
        },
        Arc::new(FailingBus),
        CancellationToken::new(),
    )
    .await;
    assert!(matches!(
        result,
        Err(ExecuteRequestError::Sink(SinkError::Publish { state: "discovered", .. }))
    ));
    assert!(!completed);
}
