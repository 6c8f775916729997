use std::error::Error;

use doer::{DoerConfig, DoerError, ProcessState, Task};
use doer_test_utils::scripts::sh;
use doer_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn echo_round_trip() -> TestResult {
    init_tracing();

    let hello = with_timeout(doer::task("echo", ["Hello World"]).output()).await?;

    assert_eq!(hello.as_deref().map(str::trim), Some("Hello World"));
    Ok(())
}

#[tokio::test]
async fn invalid_utf8_yields_no_text() -> TestResult {
    init_tracing();

    let text = with_timeout(sh(r"printf '\377\376'").output()).await?;
    assert_eq!(text, None);

    let raw = with_timeout(sh(r"printf '\377\376'").output_bytes()).await?;
    assert_eq!(raw, Some(vec![0xff, 0xfe]));
    Ok(())
}

#[tokio::test]
async fn runs_in_configured_directory() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let out = with_timeout(sh("pwd -P").at(dir.path()).output())
        .await?
        .expect("pwd output is UTF-8");

    assert_eq!(
        std::fs::canonicalize(out.trim())?,
        std::fs::canonicalize(dir.path())?
    );
    Ok(())
}

#[tokio::test]
async fn passes_environment_and_arguments() -> TestResult {
    init_tracing();

    let task = doer::task("sh", ["-c"])
        .arg("printf '%s-%s' \"$DOER_TEST_VALUE\" \"$0\"")
        .arg("zero")
        .env("DOER_TEST_VALUE", "hi");

    let out = with_timeout(task.output()).await?;
    assert_eq!(out.as_deref(), Some("hi-zero"));
    Ok(())
}

#[tokio::test]
async fn stderr_is_captured_separately() -> TestResult {
    init_tracing();
    let task = sh("echo out; echo err >&2");

    assert_eq!(with_timeout(task.output()).await?.as_deref(), Some("out\n"));
    assert_eq!(
        with_timeout(task.error_output()).await?.as_deref(),
        Some("err\n")
    );
    Ok(())
}

#[tokio::test]
async fn chatty_stderr_does_not_stall_the_child() -> TestResult {
    init_tracing();
    // Far more than an OS pipe buffer holds.
    let task = sh("head -c 300000 /dev/zero >&2; echo done");

    assert_eq!(with_timeout(task.output()).await?.as_deref(), Some("done\n"));
    let stderr = with_timeout(task.error_output()).await?.unwrap_or_default();
    assert_eq!(stderr.len(), 300_000);
    Ok(())
}

#[tokio::test]
async fn spawn_failure_is_reported_once_and_not_retried() -> TestResult {
    init_tracing();
    let task = Task::new().launch_path("/definitely/not/here/doer-missing-binary");

    match task.run(true).await {
        Err(DoerError::Spawn { path, .. }) => {
            assert!(path.ends_with("doer-missing-binary"));
        }
        other => panic!("expected spawn error, got {other:?}"),
    }

    assert!(task.is_launched());
    assert_eq!(task.state(), ProcessState::SpawnFailed);

    // Still launched: no second attempt, no error, no text.
    task.run(true).await?;
    assert_eq!(with_timeout(task.output()).await?, None);
    Ok(())
}

#[tokio::test]
async fn missing_launch_path_is_an_error() {
    init_tracing();

    let err = Task::new().run(true).await.unwrap_err();
    assert!(matches!(err, DoerError::MissingLaunchPath));
}

#[tokio::test]
async fn exit_status_is_recorded() -> TestResult {
    init_tracing();
    let task = sh("exit 3");

    with_timeout(task.run(true)).await?;

    let status = task.exit_status().expect("exit status collected");
    assert_eq!(status.code(), Some(3));
    assert_eq!(task.pid(), None);
    Ok(())
}

#[tokio::test]
async fn unread_backlog_is_capped_to_the_newest_bytes() -> TestResult {
    init_tracing();
    let config: DoerConfig = "[process]\nmax_buffered_bytes = 10\n".parse()?;
    let task = sh(r"head -c 100 /dev/zero | tr '\0' x; printf END").with_config(config);

    let text = with_timeout(task.output()).await?;

    assert_eq!(text.as_deref(), Some("xxxxxxxEND"));
    Ok(())
}
