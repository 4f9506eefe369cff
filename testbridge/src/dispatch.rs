// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    bus::JsonLinesBus,
    errors::{ExpectedError, Result},
    output::{OutputContext, OutputOpts},
};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use testbridge_metadata::{SessionUid, TestBridgeExitCode};
use testbridge_runner::{
    bus::MessageBus,
    cancel::CancellationToken,
    capabilities,
    engine::ScriptedEngine,
    framework::{ExecuteRequestContext, RequestOutcome, TestFramework, TestRequest},
    options::{BridgeOpts, HostFilterOpts},
};
use tracing::{debug, info, warn};

/// Runs a scripted legacy test engine through testbridge, printing host messages as JSON lines.
#[derive(Debug, Parser)]
#[command(
    name = capabilities::EXTENSION_UID,
    version = capabilities::EXTENSION_VERSION,
    about = capabilities::EXTENSION_DISPLAY_NAME,
    long_about = capabilities::EXTENSION_DESCRIPTION,
    max_term_width = 100
)]
pub struct TestBridgeApp {
    #[command(flatten)]
    output: OutputOpts,

    #[command(subcommand)]
    command: Command,
}

impl TestBridgeApp {
    /// Initializes logging and returns the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        if output.verbose {
            info!("{}", capabilities::banner());
        }
        let (kind, opts) = match self.command {
            Command::Run(opts) => (RequestKind::Run, opts),
            Command::Discover(opts) => (RequestKind::Discover, opts),
        };
        opts.exec(kind)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Discover and run tests
    Run(RequestOpts),

    /// Discover tests without running them
    Discover(RequestOpts),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum RequestKind {
    Run,
    Discover,
}

#[derive(Debug, Args)]
struct RequestOpts {
    /// Engine script describing the tests
    #[arg(long, value_name = "PATH")]
    script: Utf8PathBuf,

    /// Test binary the tests belong to
    #[arg(long, value_name = "PATH")]
    binary: Utf8PathBuf,

    /// Enable structured report properties
    #[arg(long)]
    report: bool,

    /// Session identifier to put on each message
    #[arg(long, value_name = "UID", default_value = "testbridge")]
    session: String,

    #[command(flatten)]
    bridge: BridgeOpts,

    #[command(flatten)]
    host_filter: HostFilterOpts,
}

impl RequestOpts {
    fn exec(self, kind: RequestKind) -> Result<i32> {
        let engine = ScriptedEngine::from_path(&self.script)
            .map_err(|err| ExpectedError::ScriptLoad { err })?;

        let filter = self.host_filter.to_filter_spec();
        let request = match kind {
            RequestKind::Run => TestRequest::Run { filter },
            RequestKind::Discover => TestRequest::Discover { filter },
        };

        let framework = TestFramework::new(
            Arc::new(engine),
            self.binary,
            self.bridge.into_framework_options(),
        );
        if self.report {
            framework.structured_report().enable();
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|err| ExpectedError::RuntimeCreate { err })?;

        let bus: Arc<dyn MessageBus> = Arc::new(JsonLinesBus::new(std::io::stdout()));
        let cancellation = CancellationToken::new();
        let context = ExecuteRequestContext::new(
            request,
            SessionUid::new(&self.session),
            bus,
            cancellation.clone(),
        );

        let outcome = runtime.block_on(async {
            let ctrl_c_token = cancellation.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, stopping after tests in progress finish");
                    ctrl_c_token.cancel();
                }
            });
            framework.execute_request(context).await
        })?;

        Ok(exit_code(&outcome))
    }
}

fn exit_code(outcome: &RequestOutcome) -> i32 {
    match outcome {
        RequestOutcome::Discovered { published } => {
            debug!(published, "discovery finished");
            if *published == 0 {
                TestBridgeExitCode::NO_TESTS_RUN
            } else {
                TestBridgeExitCode::OK
            }
        }
        RequestOutcome::Ran(summary) => {
            if summary.failed > 0 {
                TestBridgeExitCode::TEST_RUN_FAILED
            } else if summary.total == 0 {
                TestBridgeExitCode::NO_TESTS_RUN
            } else {
                TestBridgeExitCode::OK
            }
        }
    }
}
