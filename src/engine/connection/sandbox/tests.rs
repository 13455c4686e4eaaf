//! Unit tests for the sandbox run lifecycle.

use std::future;

use bollard::models::ContainerCreateResponse;
use mockall::{Sequence, mock};
use rstest::{fixture, rstest};

use super::*;

mock! {
    #[derive(Debug)]
    Client {}

    impl SandboxClient for Client {
        fn create_container<'a>(
            &'a self,
            options: Option<CreateContainerOptions>,
            config: ContainerCreateBody,
        ) -> CreateContainerFuture<'a>;
        fn pull_image(&self, options: CreateImageOptions) -> EngineCallFuture<'_>;
        fn start_container(&self, container_id: &str) -> EngineCallFuture<'_>;
        fn wait_container(&self, container_id: &str) -> WaitContainerFuture<'_>;
        fn container_logs(&self, container_id: &str) -> ContainerLogsFuture<'_>;
        fn remove_container(&self, container_id: &str) -> EngineCallFuture<'_>;
    }
}

type RuntimeFixture = std::io::Result<tokio::runtime::Runtime>;
type TestResult = Result<(), Box<dyn std::error::Error>>;

const CONTAINER_ID: &str = "sandbox-123";

#[fixture]
fn runtime() -> RuntimeFixture {
    tokio::runtime::Runtime::new()
}

fn request() -> SandboxRequest {
    SandboxRequest::new(
        "python:3.11",
        "pytest test_add.py",
        "/tmp/auto-tester-cli/run/test_add.py",
    )
    .expect("request should be valid")
}

fn created() -> ContainerCreateResponse {
    ContainerCreateResponse {
        id: String::from(CONTAINER_ID),
        warnings: vec![],
    }
}

fn stdout(text: &str) -> LogOutput {
    LogOutput::StdOut {
        message: Vec::from(text.as_bytes()).into(),
    }
}

fn stderr(text: &str) -> LogOutput {
    LogOutput::StdErr {
        message: Vec::from(text.as_bytes()).into(),
    }
}

fn server_error(status_code: u16) -> BollardError {
    BollardError::DockerResponseServerError {
        status_code,
        message: String::from("engine refused"),
    }
}

fn expect_create_ok(client: &mut MockClient) {
    client
        .expect_create_container()
        .times(1)
        .returning(|_, _| Box::pin(async { Ok(created()) }));
}

fn expect_start_ok(client: &mut MockClient) {
    client
        .expect_start_container()
        .times(1)
        .returning(|_| Box::pin(async { Ok(()) }));
}

fn expect_exit(client: &mut MockClient, code: i64) {
    client
        .expect_wait_container()
        .times(1)
        .returning(move |_| Box::pin(async move { Ok(Some(code)) }));
}

fn expect_wait_forever(client: &mut MockClient) {
    client
        .expect_wait_container()
        .times(1)
        .returning(|_| Box::pin(future::pending::<Result<Option<i64>, BollardError>>()));
}

fn expect_logs(client: &mut MockClient, chunks: Vec<LogOutput>) {
    client
        .expect_container_logs()
        .times(1)
        .returning(move |_| {
            let frames = chunks.clone();
            Box::pin(async move { Ok(frames) })
        });
}

fn expect_removed(client: &mut MockClient) {
    client
        .expect_remove_container()
        .withf(|id| id == CONTAINER_ID)
        .times(1)
        .returning(|_| Box::pin(async { Ok(()) }));
}

#[rstest]
fn successful_run_returns_combined_output(runtime: RuntimeFixture) -> TestResult {
    let mut client = MockClient::new();
    expect_create_ok(&mut client);
    expect_start_ok(&mut client);
    expect_exit(&mut client, 0);
    expect_logs(&mut client, vec![stdout("collected 1 item\n"), stderr("1 passed")]);
    expect_removed(&mut client);

    let outcome = runtime?.block_on(EngineConnector::run_sandbox_async(
        &client,
        &request(),
        future::pending(),
    ))?;

    assert!(outcome.succeeded());
    assert_eq!(outcome.combined_output(), "collected 1 item\n1 passed");
    Ok(())
}

#[rstest]
fn non_zero_exit_keeps_output_and_reports_code(runtime: RuntimeFixture) -> TestResult {
    let mut client = MockClient::new();
    expect_create_ok(&mut client);
    expect_start_ok(&mut client);
    expect_exit(&mut client, 1);
    expect_logs(&mut client, vec![stdout("1 failed")]);
    expect_removed(&mut client);

    let outcome = runtime?.block_on(EngineConnector::run_sandbox_async(
        &client,
        &request(),
        future::pending(),
    ))?;

    assert_eq!(outcome.combined_output(), "1 failed");
    assert!(matches!(
        outcome.exit_error(),
        Some(SandboxError::NonZeroExit { code: 1 })
    ));
    Ok(())
}

#[rstest]
fn timeout_tears_down_the_container(runtime: RuntimeFixture) -> TestResult {
    let mut client = MockClient::new();
    expect_create_ok(&mut client);
    expect_start_ok(&mut client);
    expect_wait_forever(&mut client);
    expect_logs(&mut client, vec![stdout("still running")]);
    expect_removed(&mut client);
    let bounded = request().with_timeout(Duration::from_millis(20));

    let outcome = runtime?.block_on(EngineConnector::run_sandbox_async(
        &client,
        &bounded,
        future::pending(),
    ))?;

    assert_eq!(outcome.combined_output(), "still running");
    assert!(matches!(
        outcome.exit_error(),
        Some(SandboxError::Timeout { seconds: 0 })
    ));
    Ok(())
}

#[rstest]
fn cancellation_tears_down_the_container(runtime: RuntimeFixture) -> TestResult {
    let mut client = MockClient::new();
    expect_create_ok(&mut client);
    expect_start_ok(&mut client);
    expect_wait_forever(&mut client);
    client
        .expect_container_logs()
        .times(1)
        .returning(|_| Box::pin(async { Err(server_error(500)) }));
    expect_removed(&mut client);

    let outcome = runtime?.block_on(EngineConnector::run_sandbox_async(
        &client,
        &request(),
        async { tokio::time::sleep(Duration::from_millis(20)).await },
    ))?;

    assert!(matches!(outcome.exit_error(), Some(SandboxError::Cancelled)));
    assert!(outcome.combined_output().is_empty());
    Ok(())
}

const RUN_NAME: &str = "auto-tester-run";

fn named_request() -> SandboxRequest {
    request().with_name(Some(String::from(RUN_NAME)))
}

fn expect_removed_by_name(client: &mut MockClient, result: fn() -> Result<(), BollardError>) {
    client
        .expect_remove_container()
        .withf(|id| id == RUN_NAME)
        .times(1)
        .returning(move |_| Box::pin(async move { result() }));
}

#[rstest]
fn cancellation_before_creation_never_creates_a_container(runtime: RuntimeFixture) -> TestResult {
    let mut client = MockClient::new();
    client.expect_create_container().never();
    client.expect_start_container().never();
    expect_removed_by_name(&mut client, || Err(server_error(404)));

    let outcome = runtime?.block_on(EngineConnector::run_sandbox_async(
        &client,
        &named_request(),
        future::ready(()),
    ))?;

    assert!(matches!(outcome.exit_error(), Some(SandboxError::Cancelled)));
    assert!(outcome.combined_output().is_empty());
    Ok(())
}

#[rstest]
fn cancellation_during_creation_removes_the_named_container(
    runtime: RuntimeFixture,
) -> TestResult {
    let mut client = MockClient::new();
    client.expect_create_container().times(1).returning(|_, _| {
        Box::pin(future::pending::<Result<ContainerCreateResponse, BollardError>>())
    });
    client.expect_start_container().never();
    expect_removed_by_name(&mut client, || Ok(()));

    let outcome = runtime?.block_on(EngineConnector::run_sandbox_async(
        &client,
        &named_request(),
        async { tokio::time::sleep(Duration::from_millis(20)).await },
    ))?;

    assert!(matches!(outcome.exit_error(), Some(SandboxError::Cancelled)));
    Ok(())
}

#[rstest]
fn cancellation_during_start_removes_the_container(runtime: RuntimeFixture) -> TestResult {
    let mut client = MockClient::new();
    expect_create_ok(&mut client);
    client
        .expect_start_container()
        .times(1)
        .returning(|_| Box::pin(future::pending::<Result<(), BollardError>>()));
    client.expect_wait_container().never();
    client.expect_container_logs().never();
    expect_removed(&mut client);

    let outcome = runtime?.block_on(EngineConnector::run_sandbox_async(
        &client,
        &named_request(),
        async { tokio::time::sleep(Duration::from_millis(20)).await },
    ))?;

    assert!(matches!(outcome.exit_error(), Some(SandboxError::Cancelled)));
    Ok(())
}

#[rstest]
fn start_failure_still_removes_the_container(runtime: RuntimeFixture) -> TestResult {
    let mut client = MockClient::new();
    expect_create_ok(&mut client);
    client
        .expect_start_container()
        .times(1)
        .returning(|_| Box::pin(async { Err(server_error(500)) }));
    client.expect_wait_container().never();
    expect_removed(&mut client);

    let result = runtime?.block_on(EngineConnector::run_sandbox_async(
        &client,
        &request(),
        future::pending(),
    ));

    assert!(matches!(
        result,
        Err(TesterError::Sandbox(SandboxError::StartFailed { ref container_id, .. }))
            if container_id == CONTAINER_ID
    ));
    Ok(())
}

#[rstest]
fn missing_logs_after_clean_exit_is_an_error(runtime: RuntimeFixture) -> TestResult {
    let mut client = MockClient::new();
    expect_create_ok(&mut client);
    expect_start_ok(&mut client);
    expect_exit(&mut client, 0);
    client
        .expect_container_logs()
        .times(1)
        .returning(|_| Box::pin(async { Err(server_error(500)) }));
    expect_removed(&mut client);

    let result = runtime?.block_on(EngineConnector::run_sandbox_async(
        &client,
        &request(),
        future::pending(),
    ));

    assert!(matches!(
        result,
        Err(TesterError::Sandbox(SandboxError::LogsFailed { .. }))
    ));
    Ok(())
}

#[rstest]
fn missing_image_is_pulled_and_creation_retried(runtime: RuntimeFixture) -> TestResult {
    let mut client = MockClient::new();
    let mut sequence = Sequence::new();
    client
        .expect_create_container()
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_, _| Box::pin(async { Err(server_error(404)) }));
    client
        .expect_pull_image()
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_| Box::pin(async { Ok(()) }));
    client
        .expect_create_container()
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_, _| Box::pin(async { Ok(created()) }));
    expect_start_ok(&mut client);
    expect_exit(&mut client, 0);
    expect_logs(&mut client, vec![]);
    expect_removed(&mut client);

    let outcome = runtime?.block_on(EngineConnector::run_sandbox_async(
        &client,
        &request(),
        future::pending(),
    ))?;

    assert!(outcome.succeeded());
    Ok(())
}

#[rstest]
fn failed_pull_is_reported_without_teardown(runtime: RuntimeFixture) -> TestResult {
    let mut client = MockClient::new();
    client
        .expect_create_container()
        .times(1)
        .returning(|_, _| Box::pin(async { Err(server_error(404)) }));
    client
        .expect_pull_image()
        .times(1)
        .returning(|_| Box::pin(async { Err(server_error(500)) }));
    client.expect_remove_container().never();

    let result = runtime?.block_on(EngineConnector::run_sandbox_async(
        &client,
        &request(),
        future::pending(),
    ));

    assert!(matches!(
        result,
        Err(TesterError::Sandbox(SandboxError::ImagePullFailed { ref image, .. }))
            if image == "python:3.11"
    ));
    Ok(())
}

#[rstest]
fn other_create_errors_are_not_retried(runtime: RuntimeFixture) -> TestResult {
    let mut client = MockClient::new();
    client
        .expect_create_container()
        .times(1)
        .returning(|_, _| Box::pin(async { Err(server_error(409)) }));
    client.expect_pull_image().never();

    let result = runtime?.block_on(EngineConnector::run_sandbox_async(
        &client,
        &request(),
        future::pending(),
    ));

    assert!(matches!(
        result,
        Err(TesterError::Sandbox(SandboxError::CreateFailed { .. }))
    ));
    Ok(())
}

#[rstest]
fn create_body_mounts_the_test_and_runs_through_the_shell(
    runtime: RuntimeFixture,
) -> TestResult {
    let mut client = MockClient::new();
    client
        .expect_create_container()
        .withf(|options, body| {
            let host = body.host_config.as_ref();
            options.is_none()
                && body.image.as_deref() == Some("python:3.11")
                && body.cmd
                    == Some(vec![
                        String::from("/bin/sh"),
                        String::from("-c"),
                        String::from("pytest test_add.py"),
                    ])
                && body.working_dir.as_deref() == Some("/app")
                && host.and_then(|config| config.binds.clone())
                    == Some(vec![String::from(
                        "/tmp/auto-tester-cli/run/test_add.py:/app/test_add.py",
                    )])
                && host.and_then(|config| config.network_mode.as_deref()) == Some("none")
        })
        .times(1)
        .returning(|_, _| Box::pin(async { Ok(created()) }));
    expect_start_ok(&mut client);
    expect_exit(&mut client, 0);
    expect_logs(&mut client, vec![]);
    expect_removed(&mut client);

    runtime?.block_on(EngineConnector::run_sandbox_async(
        &client,
        &request(),
        future::pending(),
    ))?;
    Ok(())
}

#[rstest]
fn named_request_labels_the_container() {
    let named = request()
        .with_name(Some(String::from("auto-tester-abc")))
        .with_app_dir("/workspace/")
        .with_network_disabled(false);

    let body = build_create_body(&named);
    let options = build_create_options(named.name());

    assert!(options.is_some());
    assert_eq!(
        body.labels
            .as_ref()
            .and_then(|labels| labels.get(RUN_LABEL))
            .map(String::as_str),
        Some("auto-tester-abc")
    );
    assert_eq!(body.working_dir.as_deref(), Some("/workspace/"));
    let host = body.host_config.expect("host config should be set");
    assert_eq!(
        host.binds,
        Some(vec![String::from(
            "/tmp/auto-tester-cli/run/test_add.py:/workspace/test_add.py"
        )])
    );
    assert!(host.network_mode.is_none());
}

#[rstest]
#[case::blank_image("  ", "pytest %s", "/tmp/test_a.py")]
#[case::blank_command("python:3.11", "", "/tmp/test_a.py")]
#[case::no_file_name("python:3.11", "pytest", "/")]
fn invalid_requests_are_rejected(
    #[case] image: &str,
    #[case] command: &str,
    #[case] path: &str,
) {
    let result = SandboxRequest::new(image, command, path);

    assert!(matches!(result, Err(TesterError::Config(_))));
}

#[rstest]
fn blank_names_are_ignored() {
    let unnamed = request().with_name(Some(String::from("   ")));

    assert!(unnamed.name().is_none());
}

#[rstest]
#[case::bare("python", Some("latest"))]
#[case::tagged("python:3.11", None)]
#[case::registry_port("registry.local:5000/tools/node", Some("latest"))]
#[case::registry_port_tagged("registry.local:5000/tools/node:20", None)]
#[case::digest("python@sha256:0123abcd", None)]
fn pull_options_default_the_tag(#[case] image: &str, #[case] tag: Option<&str>) {
    let options = image_pull_options(image);

    assert_eq!(options.from_image.as_deref(), Some(image));
    assert_eq!(options.tag.as_deref(), tag);
}

#[rstest]
fn output_frames_are_concatenated_lossily() {
    let frames = vec![
        stdout("Test Passed\n"),
        LogOutput::StdErr {
            message: vec![0xff, b'\n'].into(),
        },
        LogOutput::Console {
            message: b"Test Failed".to_vec().into(),
        },
    ];

    assert_eq!(combine_output(&frames), "Test Passed\n\u{fffd}\nTest Failed");
}
