// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use camino_tempfile::Utf8TempDir;
use futures::future::{BoxFuture, FutureExt};
use std::sync::{Arc, Mutex, PoisonError};
use testbridge_metadata::{SessionUid, TestNodeState, TestNodeUpdateMessage};
use testbridge_runner::{
    bus::MessageBus,
    cancel::CancellationToken,
    engine::{EngineScript, ScriptedEngine},
    errors::{ExecuteRequestError, PublishError},
    framework::{
        ExecuteRequestContext, RequestOutcome, TestFramework, TestFrameworkOptions, TestRequest,
    },
};

/// A scripted test binary in a temporary directory.
pub(crate) struct Fixture {
    dir: Utf8TempDir,
    pub(crate) binary: Utf8PathBuf,
    engine: Arc<ScriptedEngine>,
}

impl Fixture {
    pub(crate) fn new(script: &str) -> Self {
        Self::with_config(script, None)
    }

    /// Also writes `testbridge.toml` next to the binary.
    pub(crate) fn with_config(script: &str, config: Option<&str>) -> Self {
        let dir = camino_tempfile::tempdir().expect("created temp dir");
        let binary = dir.path().join("Tests.dll");
        std::fs::write(&binary, b"not a real binary").expect("wrote test binary");
        if let Some(config) = config {
            std::fs::write(dir.path().join("testbridge.toml"), config).expect("wrote config");
        }

        let script: EngineScript = serde_json::from_str(script).expect("script is valid");
        Self {
            dir,
            binary,
            engine: Arc::new(ScriptedEngine::new(script)),
        }
    }

    pub(crate) fn dir(&self) -> &camino::Utf8Path {
        self.dir.path()
    }

    pub(crate) fn framework(&self, options: TestFrameworkOptions) -> TestFramework {
        TestFramework::new(self.engine.clone(), self.binary.clone(), options)
    }
}

/// Sends a request, returning the outcome and whether the request was completed.
pub(crate) async fn execute(
    framework: &TestFramework,
    request: TestRequest,
    bus: Arc<dyn MessageBus>,
    cancellation: CancellationToken,
) -> (Result<RequestOutcome, ExecuteRequestError>, bool) {
    let (sender, receiver) = std::sync::mpsc::channel();
    let context = ExecuteRequestContext::new(
        request,
        SessionUid::new("session"),
        bus,
        cancellation,
    )
    .on_complete(move || {
        let _ = sender.send(());
    });

    let result = framework.execute_request(context).await;
    // The sender is dropped with the context either way, so this never blocks.
    let completions = receiver.iter().count();
    assert!(completions <= 1, "request completed {completions} times");
    (result, completions == 1)
}

/// A bus that records messages, and cancels a token after a given message is published.
pub(crate) struct CancellingBus {
    messages: Mutex<Vec<TestNodeUpdateMessage>>,
    cancel_after: (String, &'static str),
    token: CancellationToken,
}

impl CancellingBus {
    pub(crate) fn new(uid: &str, state: &'static str, token: CancellationToken) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            cancel_after: (uid.to_owned(), state),
            token,
        }
    }

    pub(crate) fn messages(&self) -> Vec<TestNodeUpdateMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MessageBus for CancellingBus {
    fn publish(&self, message: TestNodeUpdateMessage) -> BoxFuture<'_, Result<(), PublishError>> {
        async move {
            let (uid, state) = &self.cancel_after;
            let cancel = message.node.uid.as_str() == uid && message.node.state.as_str() == *state;
            self.messages
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(message);
            if cancel {
                self.token.cancel();
            }
            Ok(())
        }
        .boxed()
    }
}

/// A bus that rejects every message.
pub(crate) struct FailingBus;

impl MessageBus for FailingBus {
    fn publish(&self, _message: TestNodeUpdateMessage) -> BoxFuture<'_, Result<(), PublishError>> {
        async { Err(PublishError::new("host went away")) }.boxed()
    }
}

/// Returns `(uid, state)` for each message.
pub(crate) fn transitions(messages: &[TestNodeUpdateMessage]) -> Vec<(String, &'static str)> {
    messages
        .iter()
        .map(|message| (message.node.uid.to_string(), message.node.state.as_str()))
        .collect()
}

pub(crate) fn is_terminal(message: &TestNodeUpdateMessage) -> bool {
    !matches!(
        message.node.state,
        TestNodeState::Discovered | TestNodeState::InProgress
    )
}
