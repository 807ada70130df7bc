mod common;

use common::{smoke_lifecycle, RecordingRunner};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

fn capture(f: impl FnOnce()) -> String {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let buffer_clone = buffer.clone();

    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || MockWriter(buffer_clone.clone()))
        .finish();

    tracing::subscriber::with_default(subscriber, f);

    let bytes = buffer.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}

#[test]
fn test_refused_start_is_logged_with_pair() {
    let lc = smoke_lifecycle(RecordingRunner::new());

    let output = capture(|| {
        lc.start("smoke", 3, serde_json::Value::Null, &[]).unwrap();
        lc.start("smoke", 3, serde_json::Value::Null, &[]).unwrap();
    });

    assert!(output.contains("\"event\":\"run.started\""));
    assert!(output.contains("\"event\":\"run.refused\""));
    assert!(output.contains("\"op\":\"start\""));
    assert!(output.contains("\"test_set\":\"smoke\""));
    assert!(output.contains("\"target_id\":3"));
    assert!(output.contains("\"timestamp\""));
}

#[test]
fn test_dispatch_failure_is_logged_as_error() {
    let runner = RecordingRunner::new();
    runner.fail_dispatch.store(true, Ordering::SeqCst);
    let lc = smoke_lifecycle(runner);

    let output = capture(|| {
        assert!(lc.start("smoke", 1, serde_json::Value::Null, &[]).is_err());
    });

    let line = output
        .lines()
        .find(|l| l.contains("runner.dispatch_failed"))
        .expect("dispatch failure logged");
    let v: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(v["level"], "ERROR");
    assert_eq!(v["fields"]["driver"], "recording");
    assert!(v["fields"]["error"]
        .as_str()
        .unwrap()
        .contains("worker pool unavailable"));
}

#[test]
fn test_unconfirmed_stop_is_a_warning() {
    let runner = RecordingRunner::new();
    runner.confirm_kill.store(false, Ordering::SeqCst);
    let lc = smoke_lifecycle(runner);
    let run = lc
        .start("smoke", 1, serde_json::Value::Null, &[])
        .unwrap()
        .unwrap();

    let output = capture(|| {
        lc.stop(run.id).unwrap();
    });

    assert!(output.contains("\"event\":\"run.stop_unconfirmed\""));
    assert!(output.contains("\"level\":\"WARN\""));
}

struct MockWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
