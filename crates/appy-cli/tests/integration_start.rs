//! Integration tests for the development orchestrator.
//!
//! Child processes are stand-ins built from `sh` and `sleep`, so these run
//! without Go or Node installed.

use appy_cli::dev::{Orchestrator, ProcessSupervisor, Role, SchemaGenerator};
use appy_cli::{DevError, Result};
use appy_config::{DevConfig, GeneratorConfig};
use futures_util::StreamExt;
use std::fs;
use std::net::TcpListener;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Default)]
struct CountingGenerator {
    calls: AtomicUsize,
}

impl SchemaGenerator for CountingGenerator {
    fn generate(&self, _config: &GeneratorConfig) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn test_config(web_script: &str) -> DevConfig {
    let mut config = DevConfig::default();
    config.http.host = "127.0.0.1".to_string();
    config.live_reload.ws_port = 0;
    config.live_reload.wss_port = 0;
    config.live_reload.delay_ms = 50;
    config.watch.poll_interval_ms = 100;
    config.process.api_command = argv(&["sleep", "30"]);
    config.process.web_command = argv(&["sh", "-c", web_script]);
    config.process.settle_delay_ms = 10;
    config.process.fatal_delay_ms = 10;
    config
}

fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("pkg/graphql")).unwrap();
    fs::write(temp.path().join("pkg/main.go"), "package main\n").unwrap();
    fs::write(
        temp.path().join("pkg/graphql/config.yml"),
        "exec:\n  filename: pkg/graphql/generated/generated.go\nmodel:\n  filename: pkg/graphql/model/models_gen.go\n",
    )
    .unwrap();
    temp
}

async fn api_pid(supervisor: &ProcessSupervisor) -> Option<u32> {
    supervisor.handle(Role::Api).await.map(|h| h.pid)
}

async fn wait_for_api(supervisor: &ProcessSupervisor, not: Option<u32>) -> u32 {
    for _ in 0..200 {
        if let Some(pid) = api_pid(supervisor).await {
            if Some(pid) != not {
                return pid;
            }
        }
        sleep(Duration::from_millis(25)).await;
    }
    panic!("api process was not (re)started");
}

fn free_port() -> u16 {
    TcpListener::bind(("127.0.0.1", 0))
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .unwrap()
}

fn write_after_tick(path: &Path, contents: &str) {
    // Poll scans compare mtimes; make sure the new one differs.
    std::thread::sleep(Duration::from_millis(20));
    fs::write(path, contents).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_source_change_restarts_api() {
    let temp = project();
    let orchestrator = Orchestrator::new(
        test_config("true"),
        temp.path(),
        Arc::new(CountingGenerator::default()),
    )
    .unwrap()
    .with_web(false);
    let supervisor = orchestrator.supervisor();
    let token = orchestrator.token();
    let run = tokio::spawn(orchestrator.run());

    let first = wait_for_api(&supervisor, None).await;

    // let the watcher take its baseline scan
    sleep(Duration::from_millis(300)).await;
    write_after_tick(&temp.path().join("pkg/handler.go"), "package main\n");

    let second = wait_for_api(&supervisor, Some(first)).await;
    assert_ne!(first, second);

    token.cancel();
    let result = timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert!(supervisor.handle(Role::Api).await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ignored_extension_does_not_restart() {
    let temp = project();
    let orchestrator = Orchestrator::new(
        test_config("true"),
        temp.path(),
        Arc::new(CountingGenerator::default()),
    )
    .unwrap()
    .with_web(false);
    let supervisor = orchestrator.supervisor();
    let token = orchestrator.token();
    let run = tokio::spawn(orchestrator.run());

    let first = wait_for_api(&supervisor, None).await;
    sleep(Duration::from_millis(300)).await;
    write_after_tick(&temp.path().join("pkg/notes.md"), "# notes\n");
    sleep(Duration::from_millis(500)).await;

    assert_eq!(api_pid(&supervisor).await, Some(first));

    token.cancel();
    timeout(Duration::from_secs(5), run).await.unwrap().unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_schema_change_generates_without_restart() {
    let temp = project();
    let generator = Arc::new(CountingGenerator::default());
    let orchestrator = Orchestrator::new(test_config("true"), temp.path(), generator.clone())
        .unwrap()
        .with_web(false);
    let supervisor = orchestrator.supervisor();
    let token = orchestrator.token();
    let run = tokio::spawn(orchestrator.run());

    let first = wait_for_api(&supervisor, None).await;
    sleep(Duration::from_millis(300)).await;
    write_after_tick(&temp.path().join("pkg/graphql/schema.gql"), "type Query { ok: Boolean }\n");

    for _ in 0..100 {
        if generator.calls.load(Ordering::SeqCst) > 0 {
            break;
        }
        sleep(Duration::from_millis(25)).await;
    }
    sleep(Duration::from_millis(200)).await;

    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(api_pid(&supervisor).await, Some(first));

    token.cancel();
    timeout(Duration::from_secs(5), run).await.unwrap().unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_api_waits_for_first_web_compile() {
    let temp = project();
    let orchestrator = Orchestrator::new(
        test_config("echo Compiling...; sleep 0.3; echo 'Compiled successfully in 12ms'; sleep 30"),
        temp.path(),
        Arc::new(CountingGenerator::default()),
    )
    .unwrap();
    let supervisor = orchestrator.supervisor();
    let readiness = orchestrator.readiness();
    let token = orchestrator.token();
    let run = tokio::spawn(orchestrator.run());

    sleep(Duration::from_millis(100)).await;
    assert!(!readiness.is_ready());
    assert!(supervisor.handle(Role::Api).await.is_none());

    wait_for_api(&supervisor, None).await;
    assert!(readiness.is_ready());
    assert!(supervisor.handle(Role::Web).await.is_some());

    token.cancel();
    timeout(Duration::from_secs(5), run).await.unwrap().unwrap().unwrap();
    assert!(supervisor.handle(Role::Web).await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_web_stderr_is_fatal() {
    let temp = project();
    let orchestrator = Orchestrator::new(
        test_config("echo 'Error: Cannot find module webpack' >&2; exit 1"),
        temp.path(),
        Arc::new(CountingGenerator::default()),
    )
    .unwrap();
    let supervisor = orchestrator.supervisor();

    let result = timeout(Duration::from_secs(10), orchestrator.run())
        .await
        .unwrap();

    match result {
        Err(DevError::Fatal(message)) => {
            assert_eq!(message, "Error: Cannot find module webpack")
        }
        other => panic!("expected fatal error, got {:?}", other),
    }
    assert!(supervisor.handle(Role::Api).await.is_none());
    assert!(supervisor.handle(Role::Web).await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_silent_web_exit_is_fatal() {
    let temp = project();
    let orchestrator = Orchestrator::new(
        test_config("echo Compiling..."),
        temp.path(),
        Arc::new(CountingGenerator::default()),
    )
    .unwrap();

    let result = timeout(Duration::from_secs(10), orchestrator.run())
        .await
        .unwrap();

    match result {
        Err(DevError::Fatal(message)) => assert_eq!(message, "web dev server exited unexpectedly"),
        other => panic!("expected fatal error, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_api_restart_pushes_reload_to_browser() {
    let temp = project();
    let port = free_port();
    let mut config = test_config("true");
    config.live_reload.ws_port = port;
    config.live_reload.delay_ms = 300;

    let orchestrator = Orchestrator::new(config, temp.path(), Arc::new(CountingGenerator::default()))
        .unwrap()
        .with_web(false);
    let supervisor = orchestrator.supervisor();
    let hub = orchestrator.hub();
    let token = orchestrator.token();
    let run = tokio::spawn(orchestrator.run());

    let first = wait_for_api(&supervisor, None).await;
    // the reload scheduled by the first start fires before anyone listens
    sleep(Duration::from_millis(500)).await;

    let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{}/reload", port))
        .await
        .unwrap();
    for _ in 0..100 {
        if hub.client_count() == 1 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(hub.client_count(), 1);

    write_after_tick(&temp.path().join("pkg/handler.go"), "package main\n");

    let message = timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("reload should follow the restart")
        .unwrap()
        .unwrap();
    assert_eq!(message, Message::text("reload"));
    assert_ne!(api_pid(&supervisor).await, Some(first));

    token.cancel();
    timeout(Duration::from_secs(5), run).await.unwrap().unwrap().unwrap();
}
