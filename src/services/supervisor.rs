use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::{JoinHandle, JoinSet};

use crate::metrics::METRICS;
use crate::models::result::flatten_output;
use crate::models::{
    Engine, EngineState, ExitState, KillReason, ManagedProcess, ProcessOutcome, SampleStats,
    TestResult, TestStatus,
};
use crate::services::process_checker::{ExitVerdict, OutputParser, TrimmedOutput, Verdict};
use crate::state::SharedRegistry;

/// 进程退出后，等待输出管道关闭的最长时间（孙进程可能仍持有管道）
const OUTPUT_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("engine {0} already has a running process")]
    AlreadyRunning(String),

    #[error("engine {0} is draining, no more scripts can start")]
    Draining(String),
}

/// spawn 的结果
pub enum Launch {
    Running {
        process: Arc<ManagedProcess>,
        child: Child,
    },
    Failed {
        error: std::io::Error,
        started: Instant,
    },
}

/// 进程结束后交给完成处理的全部信息
pub struct Termination {
    pub(crate) process: Option<Arc<ManagedProcess>>,
    pub(crate) started: Instant,
    pub(crate) outcome: ProcessOutcome,
    pub(crate) exit: ExitState,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

impl Termination {
    pub fn outcome(&self) -> &ProcessOutcome {
        &self.outcome
    }
}

/// 增量读取 stdout/stderr
struct OutputCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl OutputCapture {
    fn start<R>(reader: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = reader.map(|mut reader| {
            let buffer = buffer.clone();
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match reader.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => {
                            if let Ok(mut buf) = buffer.lock() {
                                buf.extend_from_slice(&chunk[..n]);
                            }
                        }
                        Err(e) => {
                            debug!("Output stream closed with error: {}", e);
                            break;
                        }
                    }
                }
            })
        });
        Self { buffer, task }
    }

    async fn finish(self) -> String {
        if let Some(mut task) = self.task {
            if tokio::time::timeout(OUTPUT_GRACE, &mut task).await.is_err() {
                debug!("Output pipe still open after exit, keeping partial output");
                task.abort();
            }
        }
        let bytes = self.buffer.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn script_name(script: &Path) -> String {
    script
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| script.to_string_lossy().into_owned())
}

/// 进程监管：每个引擎依次运行队列中的脚本
#[derive(Clone)]
pub struct Supervisor {
    registry: SharedRegistry,
    verdict: Arc<dyn Verdict>,
    parser: Arc<dyn OutputParser>,
}

impl Supervisor {
    pub fn new(registry: SharedRegistry) -> Self {
        Self {
            registry,
            verdict: Arc::new(ExitVerdict::default()),
            parser: Arc::new(TrimmedOutput),
        }
    }

    pub fn with_verdict(mut self, verdict: Arc<dyn Verdict>) -> Self {
        self.verdict = verdict;
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn OutputParser>) -> Self {
        self.parser = parser;
        self
    }

    /// 启动脚本并在读取任何输出之前注册到注册表
    ///
    /// 启动失败不是错误，返回 [`Launch::Failed`]，由完成处理记录为失败测试。
    pub fn spawn(
        &self,
        engine: &Engine,
        script: &Path,
        state: &mut EngineState,
    ) -> Result<Launch, SupervisorError> {
        match state {
            EngineState::Idle => {}
            EngineState::Running(_) => {
                return Err(SupervisorError::AlreadyRunning(engine.name.clone()))
            }
            EngineState::Draining => return Err(SupervisorError::Draining(engine.name.clone())),
        }

        let started = Instant::now();
        let mut command = Command::new(&engine.path);
        command
            .args(&engine.args)
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(error) => {
                warn!(
                    "Failed to spawn {} for {}: {}",
                    engine.path.display(),
                    script.display(),
                    error
                );
                return Ok(Launch::Failed { error, started });
            }
        };

        let Some(pid) = child.id() else {
            return Ok(Launch::Failed {
                error: std::io::Error::other("process exited before it could be registered"),
                started,
            });
        };

        let process = Arc::new(ManagedProcess::new(script_name(script), &engine.name, pid));
        self.registry.register(process.clone());
        *state = EngineState::Running(process.clone());

        info!("[{}] started {} (pid {})", engine.name, process.script, pid);
        Ok(Launch::Running { process, child })
    }

    /// 等待进程结束，期间响应 monitor 的 kill 请求
    pub async fn wait(&self, launch: Launch) -> Termination {
        let (process, mut child) = match launch {
            Launch::Failed { error, started } => {
                return Termination {
                    process: None,
                    started,
                    outcome: ProcessOutcome::SpawnError(error.to_string()),
                    exit: ExitState::default(),
                    stdout: String::new(),
                    stderr: String::new(),
                };
            }
            Launch::Running { process, child } => (process, child),
        };

        let stdout = OutputCapture::start(child.stdout.take());
        let stderr = OutputCapture::start(child.stderr.take());

        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                _ = process.kill_requested() => {
                    let reason = process.kill_reason().unwrap_or(KillReason::Timeout);
                    info!("Killing {} (pid {}): {}", process.script, process.pid, reason);
                    // 进程可能已经退出，忽略错误
                    if let Err(e) = child.start_kill() {
                        debug!("Kill of {} had no effect: {}", process.script, e);
                    }
                }
            }
        };
        process.mark_exited();

        let stdout = stdout.finish().await;
        let stderr = stderr.finish().await;

        let (outcome, exit) = match status {
            Ok(status) => {
                let exit = ExitState::from_status(&status, &stderr);
                let query_error = match process.kill_reason() {
                    Some(KillReason::QueryError(msg)) => Some(msg),
                    _ => None,
                };
                let outcome = ProcessOutcome::reduce(&exit, process.timed_out(), query_error);
                (outcome, exit)
            }
            Err(e) => {
                let outcome = if process.timed_out() {
                    ProcessOutcome::MonitorTimeout
                } else {
                    ProcessOutcome::SpawnError(e.to_string())
                };
                (outcome, ExitState::default())
            }
        };

        Termination {
            started: process.start_time,
            process: Some(process),
            outcome,
            exit,
            stdout,
            stderr,
        }
    }

    /// 完成处理：计算统计、分类、写入引擎结果
    ///
    /// 同一进程只处理一次；重复调用返回 false 且不产生记录。
    pub fn complete(
        &self,
        engine: &mut Engine,
        script: &Path,
        termination: Termination,
        state: &mut EngineState,
    ) -> bool {
        let stats = match &termination.process {
            Some(process) => {
                if !self.registry.remove(process.id()) {
                    debug!("{} was already dropped from the registry", process.script);
                }
                if state.current().is_some_and(|p| p.id() == process.id()) {
                    *state = EngineState::Idle;
                }
                match process.finalize() {
                    Some(stats) => stats,
                    None => {
                        warn!("Ignoring repeated completion for {}", process.script);
                        return false;
                    }
                }
            }
            None => SampleStats::empty(),
        };

        let verdict_ok = termination.outcome == ProcessOutcome::CleanExit
            && self.verdict.is_clean(&termination.exit);
        let status = TestStatus::from_outcome(&termination.outcome, verdict_ok);

        let name = script_name(script);
        let stdout = if status.is_success() {
            self.parser.parse(&engine.name, script, &termination.stdout)
        } else {
            flatten_output(&termination.stdout)
        };
        let elapsed_ms =
            u64::try_from(termination.started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if status.is_success() {
            info!("[{}] {} passed in {}ms", engine.name, name, elapsed_ms);
        } else {
            warn!("[{}] {} failed in {}ms: {}", engine.name, name, elapsed_ms, status);
        }
        METRICS.observe_result(&engine.name, &name, &status, elapsed_ms);

        engine.record(TestResult {
            script: name,
            stdout,
            stderr: termination.stderr,
            status,
            elapsed_ms,
            stats,
        });
        true
    }

    /// 取出下一个脚本；队列为空时引擎进入 `Draining`
    fn advance(engine: &mut Engine, state: &mut EngineState) -> Option<PathBuf> {
        let next = engine.queue.pop_front();
        if next.is_none() {
            debug!("[{}] queue exhausted, draining", engine.name);
            *state = EngineState::Draining;
        }
        next
    }

    /// 依次运行引擎队列中的所有脚本，结束后调用一次 `on_done`
    ///
    /// `on_done` 在 `Draining` 状态下运行，此时 `spawn` 会拒绝新的脚本。
    pub async fn run_engine<F>(&self, mut engine: Engine, on_done: F) -> Engine
    where
        F: FnOnce(&Engine),
    {
        let mut state = EngineState::Idle;
        info!("[{}] running {} script(s)", engine.name, engine.queue.len());

        while let Some(script) = Self::advance(&mut engine, &mut state) {
            let launch = match self.spawn(&engine, &script, &mut state) {
                Ok(launch) => launch,
                Err(e) => {
                    error!("{}", e);
                    state = EngineState::Draining;
                    break;
                }
            };
            let termination = self.wait(launch).await;
            self.complete(&mut engine, &script, termination, &mut state);
        }

        debug_assert!(state.is_draining());
        on_done(&engine);
        engine
    }

    /// 并发运行所有引擎，返回顺序与输入一致
    pub async fn run_all<F>(&self, engines: Vec<Engine>, on_done: F) -> Vec<Engine>
    where
        F: Fn(&Engine) + Send + Sync + 'static,
    {
        let on_done = Arc::new(on_done);
        let mut set = JoinSet::new();

        for (index, engine) in engines.into_iter().enumerate() {
            let supervisor = self.clone();
            let on_done = on_done.clone();
            set.spawn(async move {
                let engine = supervisor.run_engine(engine, |e| on_done(e)).await;
                (index, engine)
            });
        }

        let mut finished = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(entry) => finished.push(entry),
                Err(e) => error!("Engine task failed: {}", e),
            }
        }
        finished.sort_by_key(|(index, _)| *index);
        finished.into_iter().map(|(_, engine)| engine).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EngineConfig;
    use crate::services::monitor::tests::{FailingProbe, FixedProbe, PidReadings, RecordingSink};
    use crate::services::monitor::Monitor;
    use crate::services::stats_collector::ResourceProbe;
    use crate::state::new_registry;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn named_engine(name: &str, scripts: Vec<PathBuf>) -> Engine {
        let config = EngineConfig {
            name: name.into(),
            path: "/bin/sh".into(),
            args: vec![],
        };
        Engine::new(config, scripts)
    }

    fn sh_engine(scripts: Vec<PathBuf>) -> Engine {
        named_engine("sh", scripts)
    }

    struct Harness {
        registry: SharedRegistry,
        supervisor: Supervisor,
        sink: Arc<RecordingSink>,
        shutdown: oneshot::Sender<()>,
        monitor: JoinHandle<()>,
    }

    fn start(probe: Arc<dyn ResourceProbe>, timeout: Duration) -> Harness {
        let registry = new_registry();
        let sink = Arc::new(RecordingSink::default());
        let monitor = Monitor::new(registry.clone(), probe)
            .with_sink(sink.clone())
            .with_interval(Duration::from_millis(20))
            .with_timeout(timeout);
        let (shutdown, rx) = oneshot::channel();
        Harness {
            supervisor: Supervisor::new(registry.clone()),
            registry,
            sink,
            shutdown,
            monitor: monitor.spawn(rx),
        }
    }

    /// 在完成处理中记录每个脚本的完成时间
    #[derive(Default)]
    struct CompletionClock {
        at: Mutex<Vec<(String, Instant)>>,
    }

    impl OutputParser for CompletionClock {
        fn parse(&self, _engine: &str, script: &Path, stdout: &str) -> String {
            self.at
                .lock()
                .unwrap()
                .push((script_name(script), Instant::now()));
            stdout.trim().to_string()
        }
    }

    impl Harness {
        async fn stop(self) {
            let _ = self.shutdown.send(());
            self.monitor.await.unwrap();
        }
    }

    fn fixed() -> Arc<dyn ResourceProbe> {
        Arc::new(FixedProbe { cpu: 7.5, mem: 2048 })
    }

    #[tokio::test]
    async fn test_success_script_is_passed() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "hello.sh", "echo hello\necho world\n");
        let harness = start(fixed(), Duration::from_secs(5));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let engine = harness
            .supervisor
            .run_engine(sh_engine(vec![script]), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.tests_passed.len(), 1);
        assert!(engine.tests_failed.is_empty());

        let result = &engine.tests_passed[0];
        assert_eq!(result.script, "hello.sh");
        assert_eq!(result.status, TestStatus::Success);
        assert_eq!(result.stdout, "hello\nworld");
        assert_eq!(result.stats.cpu.len(), result.stats.mem.len());
        if result.stats.is_empty() {
            assert_eq!(result.stats.max_cpu, None);
            assert_eq!(result.stats.min_mem, None);
        }
        assert!(harness.registry.is_empty());
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_samples_feed_stats() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "busy.sh", "sleep 0.4\n");
        let harness = start(fixed(), Duration::from_secs(5));

        let engine = harness
            .supervisor
            .run_engine(sh_engine(vec![script]), |_| {})
            .await;

        let stats = &engine.tests_passed[0].stats;
        assert!(!stats.is_empty());
        assert_eq!(stats.cpu.len(), stats.mem.len());
        // FixedProbe 报告两个进程：7.5 + 1.0，2048 + 1
        assert_eq!(stats.max_cpu, Some(8.5));
        assert_eq!(stats.min_cpu, Some(8.5));
        assert_eq!(stats.max_mem, Some(2049));
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "hang.sh", "exec sleep 10\n");
        let harness = start(fixed(), Duration::from_millis(300));

        let started = Instant::now();
        let engine = harness
            .supervisor
            .run_engine(sh_engine(vec![script]), |_| {})
            .await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(engine.tests_passed.is_empty());
        assert_eq!(engine.tests_failed.len(), 1);
        assert_eq!(engine.tests_failed[0].status, TestStatus::Timeout);
        assert_eq!(engine.tests_failed[0].status.to_string(), "timeout");
        assert!(harness.registry.is_empty());
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_missing_executable_records_spawn_error() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "a.js", "console.log(1)\n");
        let harness = start(fixed(), Duration::from_secs(5));

        let config = EngineConfig {
            name: "ghost".into(),
            path: dir.path().join("no-such-engine"),
            args: vec![],
        };
        let engine = harness
            .supervisor
            .run_engine(Engine::new(config, vec![script]), |_| {})
            .await;

        assert!(engine.tests_passed.is_empty());
        assert_eq!(engine.tests_failed.len(), 1);
        let result = &engine.tests_failed[0];
        assert!(result.status.to_string().starts_with("error spawn:"));
        assert!(result.stats.is_empty());
        assert_eq!(result.stats.max_cpu, None);
        assert!(harness.registry.is_empty());
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_queue_runs_sequentially() {
        let dir = TempDir::new().unwrap();
        let first = write_script(&dir, "first.sh", "echo one\n");
        let second = write_script(&dir, "second.sh", "echo two\n");
        let harness = start(fixed(), Duration::from_secs(5));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let engine = harness
            .supervisor
            .run_engine(sh_engine(vec![first, second]), move |engine| {
                recorder
                    .lock()
                    .unwrap()
                    .push((engine.completed(), engine.queue.len()));
            })
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![(2, 0)]);
        let names: Vec<_> = engine.tests_passed.iter().map(|r| r.script.as_str()).collect();
        assert_eq!(names, vec!["first.sh", "second.sh"]);
        assert_eq!(engine.tests_passed[1].stdout, "two");
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_nonzero_exit_flattens_stdout() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "fail.sh", "echo a\necho b\necho oops >&2\nexit 3\n");
        let harness = start(fixed(), Duration::from_secs(5));

        let engine = harness
            .supervisor
            .run_engine(sh_engine(vec![script]), |_| {})
            .await;

        let result = &engine.tests_failed[0];
        assert_eq!(result.status.to_string(), "error 3");
        assert_eq!(result.stdout, "a b ");
        assert_eq!(result.stderr, "oops\n");
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_signal_exit_is_named() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "crash.sh", "kill -9 $$\n");
        let harness = start(fixed(), Duration::from_secs(5));

        let engine = harness
            .supervisor
            .run_engine(sh_engine(vec![script]), |_| {})
            .await;

        assert_eq!(engine.tests_failed[0].status.to_string(), "error SIGKILL");
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_query_error_kills_and_queue_advances() {
        let dir = TempDir::new().unwrap();
        let hang = write_script(&dir, "hang.sh", "exec sleep 10\n");
        let next = write_script(&dir, "next.sh", "exec sleep 10\n");
        let harness = start(Arc::new(FailingProbe), Duration::from_secs(30));

        let started = Instant::now();
        let engine = harness
            .supervisor
            .run_engine(sh_engine(vec![hang, next]), |_| {})
            .await;

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(engine.tests_failed.len(), 2);
        for result in &engine.tests_failed {
            assert!(result.status.to_string().starts_with("error query:"));
        }
        assert!(harness.registry.is_empty());
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_strict_verdict_rejects_stderr() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "noisy.sh", "echo warn >&2\n");
        let harness = start(fixed(), Duration::from_secs(5));
        let supervisor = harness
            .supervisor
            .clone()
            .with_verdict(Arc::new(ExitVerdict::new(true)));

        let engine = supervisor.run_engine(sh_engine(vec![script]), |_| {}).await;

        assert_eq!(engine.tests_failed[0].status.to_string(), "error verdict");
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_second_spawn_rejected_while_running() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "hang.sh", "exec sleep 10\n");
        let registry = new_registry();
        let supervisor = Supervisor::new(registry.clone());
        let engine = sh_engine(vec![]);

        let mut state = EngineState::Idle;
        let launch = supervisor.spawn(&engine, &script, &mut state).unwrap();
        assert!(matches!(state, EngineState::Running(_)));

        let second = supervisor.spawn(&engine, &script, &mut state);
        assert!(matches!(second, Err(SupervisorError::AlreadyRunning(_))));
        assert_eq!(registry.len(), 1);

        if let Launch::Running { process, .. } = &launch {
            assert!(process.request_kill(KillReason::Timeout));
            assert!(!process.request_kill(KillReason::Timeout));
        }
        let termination = supervisor.wait(launch).await;
        assert!(matches!(termination.outcome(), ProcessOutcome::AbnormalExit { .. }));
    }

    #[test]
    fn test_completion_runs_once_per_process() {
        let registry = new_registry();
        let supervisor = Supervisor::new(registry.clone());
        let mut engine = sh_engine(vec![]);
        let mut state = EngineState::Idle;

        let process = Arc::new(ManagedProcess::new("dup.sh", "sh", 1));
        registry.register(process.clone());
        process.mark_exited();

        let termination = || Termination {
            process: Some(process.clone()),
            started: process.start_time,
            outcome: ProcessOutcome::CleanExit,
            exit: ExitState {
                code: Some(0),
                signal: None,
                stderr_empty: true,
            },
            stdout: "ok\n".into(),
            stderr: String::new(),
        };

        let script = Path::new("dup.sh");
        assert!(supervisor.complete(&mut engine, script, termination(), &mut state));
        assert!(!supervisor.complete(&mut engine, script, termination(), &mut state));
        assert_eq!(engine.completed(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_engines_run_concurrently() {
        let dir = TempDir::new().unwrap();
        let a = write_script(&dir, "a.sh", "sleep 0.5\n");
        let b = write_script(&dir, "b.sh", "sleep 0.5\n");
        let harness = start(fixed(), Duration::from_secs(5));

        let mut first = sh_engine(vec![a]);
        first.name = "sh-a".into();
        let mut second = sh_engine(vec![b]);
        second.name = "sh-b".into();

        let done = Arc::new(AtomicUsize::new(0));
        let counter = done.clone();
        let started = Instant::now();
        let engines = harness
            .supervisor
            .run_all(vec![first, second], move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        // 串行至少需要 1 秒
        assert!(started.elapsed() < Duration::from_millis(950));
        assert_eq!(done.load(Ordering::SeqCst), 2);
        assert_eq!(engines[0].name, "sh-a");
        assert_eq!(engines[1].name, "sh-b");
        assert!(engines.iter().all(|e| e.tests_passed.len() == 1));
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_next_script_starts_after_previous_completes() {
        let dir = TempDir::new().unwrap();
        let first = write_script(&dir, "first.sh", "sleep 0.2\necho one\n");
        let second = write_script(&dir, "second.sh", "sleep 0.2\necho two\n");
        let harness = start(fixed(), Duration::from_secs(5));
        let clock = Arc::new(CompletionClock::default());
        let supervisor = harness.supervisor.clone().with_parser(clock.clone());

        let engine = supervisor
            .run_engine(sh_engine(vec![first, second]), |_| {})
            .await;
        assert_eq!(engine.tests_passed.len(), 2);

        let first_done = clock
            .at
            .lock()
            .unwrap()
            .iter()
            .find(|(script, _)| script == "first.sh")
            .map(|(_, at)| *at)
            .unwrap();
        let second_start = harness
            .sink
            .starts
            .lock()
            .unwrap()
            .iter()
            .find(|(script, _)| script == "second.sh")
            .map(|(_, at)| *at)
            .unwrap();
        assert!(second_start >= first_done);
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_engines_keep_their_own_samples() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "pid.sh", "echo $$\nsleep 0.4\n");
        let harness = start(Arc::new(PidReadings), Duration::from_secs(5));

        let engines = harness
            .supervisor
            .run_all(
                vec![
                    named_engine("a", vec![script.clone()]),
                    named_engine("b", vec![script]),
                ],
                |_| {},
            )
            .await;

        let mut pids = Vec::new();
        for engine in &engines {
            let result = &engine.tests_passed[0];
            let pid: u64 = result.stdout.parse().unwrap();
            assert!(!result.stats.mem.is_empty(), "{} was never sampled", engine.name);
            assert!(result.stats.mem.iter().all(|mem| *mem == pid));
            assert_eq!(result.stats.max_mem, Some(pid));
            assert_eq!(result.stats.min_mem, Some(pid));
            assert_eq!(result.stats.max_cpu, Some((pid % 1000) as f32));
            pids.push(pid);
        }
        assert_ne!(pids[0], pids[1]);
        harness.stop().await;
    }

    #[test]
    fn test_draining_engine_rejects_spawn() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "late.sh", "echo late\n");
        let registry = new_registry();
        let supervisor = Supervisor::new(registry.clone());

        let mut engine = sh_engine(vec![script.clone()]);
        let mut state = EngineState::Idle;
        assert_eq!(Supervisor::advance(&mut engine, &mut state), Some(script.clone()));
        assert!(state.is_idle());

        assert_eq!(Supervisor::advance(&mut engine, &mut state), None);
        assert!(state.is_draining());

        let rejected = supervisor.spawn(&engine, &script, &mut state);
        assert!(matches!(rejected, Err(SupervisorError::Draining(_))));
        assert!(registry.is_empty());
    }
}
