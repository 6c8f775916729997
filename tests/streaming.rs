use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use doer::DoerConfig;
use doer_test_utils::scripts::{ChunkRecorder, sh};
use doer_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn streaming_delivers_every_byte_in_order() -> TestResult {
    init_tracing();
    let task = sh("printf A; sleep 0.2; printf B");
    let recorder = ChunkRecorder::new();
    recorder.attach(&task);

    with_timeout(task.run(true)).await?;

    assert_eq!(recorder.text(), "AB");
    assert!(recorder.chunks().iter().all(|c| !c.is_empty()));
    Ok(())
}

#[tokio::test]
async fn output_written_right_before_exit_is_flushed() -> TestResult {
    init_tracing();
    let task = sh("printf hello");
    let recorder = ChunkRecorder::new();
    recorder.attach(&task);

    with_timeout(task.run(true)).await?;

    assert_eq!(recorder.text(), "hello");
    assert!(!recorder.is_empty());
    Ok(())
}

#[tokio::test]
async fn subscriptions_are_gone_after_exit() -> TestResult {
    init_tracing();
    let task = sh("echo one; echo two");
    let recorder = ChunkRecorder::new();
    recorder.attach(&task);
    assert_eq!(task.subscription_count(), 2);

    with_timeout(task.run(true)).await?;

    assert_eq!(task.subscription_count(), 0);
    assert_eq!(recorder.text(), "one\ntwo\n");
    Ok(())
}

#[tokio::test]
async fn small_read_buffer_yields_one_chunk_per_read() -> TestResult {
    init_tracing();
    let config: DoerConfig = "[process]\nread_buffer_size = 1\n".parse()?;
    let task = sh("printf abcdef").with_config(config);
    let recorder = ChunkRecorder::new();
    recorder.attach(&task);

    with_timeout(task.run(true)).await?;

    let chunks = recorder.chunks();
    assert_eq!(chunks.len(), 6);
    assert!(chunks.iter().all(|c| c.len() == 1));
    assert_eq!(recorder.text(), "abcdef");
    Ok(())
}

#[tokio::test]
async fn stream_left_open_by_a_grandchild_is_closed_after_flush_timeout() -> TestResult {
    init_tracing();
    let config: DoerConfig = "[process]\nexit_flush_timeout = \"100ms\"\n".parse()?;
    // The backgrounded sleep keeps stdout open long after `sh` exits.
    let task = sh("printf early; sleep 3 &").with_config(config);
    let recorder = ChunkRecorder::new();
    recorder.attach(&task);

    let started = Instant::now();
    with_timeout(task.run(true)).await?;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(recorder.text(), "early");
    assert_eq!(task.subscription_count(), 0);
    Ok(())
}

#[tokio::test]
async fn printing_output_runs_to_completion() -> TestResult {
    init_tracing();
    let task = sh("echo printed by doer");

    task.printing_output();
    with_timeout(task.run(true)).await?;

    assert_eq!(task.subscription_count(), 0);
    Ok(())
}

#[tokio::test]
async fn printing_output_skips_undecodable_chunks() -> TestResult {
    init_tracing();
    let task = sh(r"printf '\377'");

    task.printing_output();
    with_timeout(task.run(true)).await?;

    assert!(task.state().is_finished());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_sink_still_receives_everything_after_exit() -> TestResult {
    init_tracing();
    // Far shorter than the time the sink needs for the whole payload.
    let config: DoerConfig =
        "[process]\nread_buffer_size = 2048\nexit_flush_timeout = \"50ms\"\n".parse()?;
    let task = sh(r"head -c 60000 /dev/zero | tr '\0' x").with_config(config);

    let received = Arc::new(Mutex::new(Vec::new()));
    {
        let received = Arc::clone(&received);
        task.output_with(move |chunk| {
            std::thread::sleep(Duration::from_millis(10));
            received.lock().unwrap().extend_from_slice(chunk);
        });
    }

    with_timeout(task.run(true)).await?;

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 60000);
    assert!(received.iter().all(|b| *b == b'x'));
    Ok(())
}

#[tokio::test]
async fn attaching_after_termination_registers_nothing() -> TestResult {
    init_tracing();
    let task = sh("echo done");
    with_timeout(task.run(true)).await?;

    let recorder = ChunkRecorder::new();
    recorder.attach(&task);
    task.printing_output();

    assert_eq!(task.subscription_count(), 0);
    assert!(recorder.is_empty());
    Ok(())
}
