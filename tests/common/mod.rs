#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use simexec::exec::{ExecutionHandler, ExecutionStatus};

pub use simexec_test_utils::builders::ServiceConfigBuilder;
pub use simexec_test_utils::fakes::{
    FakeHandler, FakeHandlerControl, FakeScheduler, HookCounts, RecordingService,
};
pub use simexec_test_utils::{CapturedLogs, capture_logs, init_tracing, with_timeout, within};

/// Poll `handler` until its status leaves `Running` or `limit` passes.
pub fn wait_until_not_running(handler: &mut dyn ExecutionHandler, limit: Duration) -> ExecutionStatus {
    let deadline = Instant::now() + limit;
    loop {
        let status = handler.observe();
        if status != ExecutionStatus::Running || Instant::now() >= deadline {
            return status;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Write a shell script into `dir` and return the command that runs it.
///
/// The script is run as `sh <path>` rather than executed directly, which
/// avoids ETXTBSY when another test forks while the file is being written.
pub fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path: PathBuf = dir.join(name);
    std::fs::write(&path, format!("{body}\n")).unwrap();
    format!("sh {}", path.display())
}
