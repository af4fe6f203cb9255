//! Dependency-level scheduler tests

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use common::*;
use mfe_orchestrator::module::registry::ModuleDescriptor;
use mfe_orchestrator::module::{
    GateEvaluator, ModuleError, ModuleRegistry, ModuleScheduler, ModuleStatus,
};

fn scheduler(
    host: &Arc<MockHost>,
    descriptors: Vec<ModuleDescriptor>,
    gate: GateEvaluator,
) -> ModuleScheduler {
    let registry = ModuleRegistry::from_descriptors(descriptors).unwrap();
    ModuleScheduler::new(registry, loader_with(host, fast_options()), gate)
}

fn remote(name: &str) -> ModuleDescriptor {
    ModuleDescriptor::normal(name, entry_url(name))
}

fn flags(enabled: &[&str]) -> GateEvaluator {
    let flags: HashMap<String, bool> = enabled.iter().map(|f| (f.to_string(), true)).collect();
    GateEvaluator::from_maps(flags, HashMap::new())
}

#[tokio::test(start_paused = true)]
async fn test_diamond_levels_wait_for_the_whole_level() {
    let host = MockHost::new();
    let log = event_log();
    serve_module(&host, "a", RecordingModule::new("a", &log));
    serve_module(&host, "b", RecordingModule::slow("b", &log, Duration::from_millis(30)));
    serve_module(&host, "c", RecordingModule::slow("c", &log, Duration::from_millis(10)));
    serve_module(&host, "d", RecordingModule::new("d", &log));

    let scheduler = scheduler(
        &host,
        vec![
            remote("a"),
            remote("b").with_dependencies(["a"]),
            remote("c").with_dependencies(["a"]),
            remote("d").with_dependencies(["b", "c"]),
        ],
        GateEvaluator::deny_all(),
    );

    let plan = scheduler.plan().unwrap();
    assert_eq!(
        plan.levels,
        vec![
            vec!["a".to_string()],
            vec!["b".to_string(), "c".to_string()],
            vec!["d".to_string()],
        ]
    );

    let report = scheduler.start().await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.loaded.len(), 4);

    // siblings overlap, the next level waits for both
    assert!(position(&log, "start:c") < position(&log, "end:b"));
    assert!(position(&log, "end:b") < position(&log, "start:d"));
    assert!(position(&log, "end:c") < position(&log, "start:d"));
    assert!(position(&log, "end:a") < position(&log, "start:b"));
}

#[tokio::test]
async fn test_gated_module_and_dependents_are_not_activated() {
    let host = MockHost::new();
    let log = event_log();
    serve_module(&host, "core", RecordingModule::new("core", &log));
    serve_module(&host, "beta", RecordingModule::new("beta", &log));
    serve_module(&host, "beta-reports", RecordingModule::new("beta-reports", &log));

    let scheduler = scheduler(
        &host,
        vec![
            remote("core"),
            remote("beta").with_feature_flags(["beta"]),
            remote("beta-reports").with_dependencies(["beta"]),
        ],
        flags(&[]),
    );

    let report = scheduler.start().await.unwrap();
    assert_eq!(report.loaded, vec!["core".to_string()]);
    assert_eq!(report.excluded.len(), 2);
    assert!(report.failure("beta").is_none());
    assert!(report.failure("beta-reports").is_some());

    let status = scheduler.status_view();
    assert_eq!(status.get("beta"), Some(ModuleStatus::Pending));
    assert_eq!(status.get("beta-reports"), Some(ModuleStatus::Failed));
    assert_eq!(host.imports(), 1);
}

#[tokio::test]
async fn test_enabled_flag_lets_module_load() {
    let host = MockHost::new();
    let log = event_log();
    serve_module(&host, "beta", RecordingModule::new("beta", &log));

    let scheduler = scheduler(
        &host,
        vec![remote("beta").with_feature_flags(["beta"])],
        flags(&["beta"]),
    );

    let report = scheduler.start().await.unwrap();
    assert_eq!(report.loaded, vec!["beta".to_string()]);
}

#[tokio::test]
async fn test_init_failure_aborts_startup() {
    let host = MockHost::new();
    let log = event_log();
    serve_module(&host, "shell", RecordingModule::new("shell", &log));
    serve_module(&host, "auth", RecordingModule::new("auth", &log));
    serve_module(&host, "dashboard", RecordingModule::new("dashboard", &log));
    host.fail_first(&entry_url("auth"), 5);

    let scheduler = scheduler(
        &host,
        vec![
            ModuleDescriptor::init("shell", entry_url("shell"), 0),
            ModuleDescriptor::init("auth", entry_url("auth"), 1),
            remote("dashboard"),
        ],
        GateEvaluator::deny_all(),
    );

    let err = scheduler.start().await.unwrap_err();
    assert!(matches!(err, ModuleError::StartupAborted { ref module, .. } if module == "auth"));

    let status = scheduler.status_view();
    assert_eq!(status.get("shell"), Some(ModuleStatus::Loaded));
    assert_eq!(status.get("auth"), Some(ModuleStatus::Failed));
    assert_eq!(status.get("dashboard"), Some(ModuleStatus::Pending));
    assert!(status.last_error("auth").is_some());
    assert_eq!(host.imports(), 2);
}

#[tokio::test]
async fn test_normal_failure_only_takes_down_its_dependents() {
    let host = MockHost::new();
    let log = event_log();
    serve_module(&host, "a", RecordingModule::new("a", &log));
    serve_module(&host, "b", RecordingModule::new("b", &log));
    serve_module(&host, "c", RecordingModule::new("c", &log));
    serve_module(&host, "d", RecordingModule::new("d", &log));
    serve_module(&host, "e", RecordingModule::failing("e", &log));
    host.fail_first(&entry_url("a"), 5);

    let scheduler = scheduler(
        &host,
        vec![
            remote("a"),
            remote("b"),
            remote("c").with_dependencies(["a"]),
            remote("d").with_dependencies(["b"]),
            remote("e"),
        ],
        GateEvaluator::deny_all(),
    );

    let report = scheduler.start().await.unwrap();
    assert_eq!(
        report.loaded,
        vec!["b".to_string(), "d".to_string()]
    );
    assert!(report.failure("a").is_some());
    assert!(report.failure("e").is_some());
    assert!(report.failure("c").unwrap().reason.contains("dependency a"));

    let status = scheduler.status_view();
    assert_eq!(status.get("c"), Some(ModuleStatus::Failed));
    assert_eq!(status.get("e"), Some(ModuleStatus::Failed));
    assert_eq!(status.get("d"), Some(ModuleStatus::Loaded));
}

#[tokio::test]
async fn test_failed_init_hook_leaves_no_routes_or_translations() {
    let host = MockHost::new();
    let log = event_log();
    serve_module(&host, "b", RecordingModule::new("b", &log));
    serve_module(&host, "e", RecordingModule::failing("e", &log));

    let scheduler = scheduler(
        &host,
        vec![remote("b"), remote("e")],
        GateEvaluator::deny_all(),
    );
    let report = scheduler.start().await.unwrap();

    assert_eq!(scheduler.status_view().get("e"), Some(ModuleStatus::Failed));
    assert_eq!(
        report.failure("e").unwrap().reason,
        "Module initialization failed: e refused to start"
    );

    let context = scheduler.context();
    assert!(context.routes().routes_for("e").is_empty());
    assert!(context.translations().lookup("en", "e", "title").is_none());
    assert_eq!(context.routes().routes_for("b")[0].path, "/b");
    assert_eq!(
        context.translations().lookup("en", "b", "title").as_deref(),
        Some("b")
    );
}

#[tokio::test]
async fn test_init_modules_run_by_priority_then_declaration() {
    let host = MockHost::new();
    let log = event_log();
    for name in ["third", "first", "second-a", "second-b"] {
        serve_module(&host, name, RecordingModule::new(name, &log));
    }

    let scheduler = scheduler(
        &host,
        vec![
            ModuleDescriptor::init("third", entry_url("third"), 3),
            ModuleDescriptor::init("second-a", entry_url("second-a"), 2),
            ModuleDescriptor::init("first", entry_url("first"), 1),
            ModuleDescriptor::init("second-b", entry_url("second-b"), 2),
        ],
        GateEvaluator::deny_all(),
    );

    let report = scheduler.start().await.unwrap();
    assert_eq!(report.loaded, vec!["first", "second-a", "second-b", "third"]);

    let starts: Vec<String> = log
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.starts_with("start:"))
        .cloned()
        .collect();
    assert_eq!(
        starts,
        vec!["start:first", "start:second-a", "start:second-b", "start:third"]
    );
}

#[tokio::test]
async fn test_local_modules_bind_routes_without_fetching() {
    let host = MockHost::new();
    let log = event_log();

    let scheduler = scheduler(
        &host,
        vec![
            ModuleDescriptor::init("shell", "", 0),
            ModuleDescriptor::normal("settings", ""),
        ],
        GateEvaluator::deny_all(),
    )
    .with_local_module("shell", RecordingModule::new("shell", &log))
    .with_local_module("settings", RecordingModule::new("settings", &log));

    let report = scheduler.start().await.unwrap();
    assert_eq!(report.loaded.len(), 2);
    assert_eq!(host.imports(), 0);

    let routes = scheduler.context().routes();
    assert_eq!(routes.routes().len(), 2);
    assert_eq!(routes.routes_for("settings")[0].path, "/settings");
}

#[tokio::test]
async fn test_status_changes_are_observable() {
    let host = MockHost::new();
    let log = event_log();
    serve_module(&host, "a", RecordingModule::new("a", &log));
    let scheduler = scheduler(&host, vec![remote("a")], GateEvaluator::deny_all());

    let mut changes = scheduler.status_view().subscribe();
    scheduler.start().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(change) = changes.try_recv() {
        if change.module == "a" {
            seen.push(change.to);
        }
    }
    assert_eq!(
        seen,
        vec![
            ModuleStatus::Loading,
            ModuleStatus::Preloaded,
            ModuleStatus::Loaded
        ]
    );
}

#[tokio::test]
async fn test_cycle_fails_fast() {
    let host = MockHost::new();
    let scheduler = scheduler(
        &host,
        vec![
            remote("x").with_dependencies(["y"]),
            remote("y").with_dependencies(["x"]),
        ],
        GateEvaluator::deny_all(),
    );

    let err = scheduler.start().await.unwrap_err();
    match err {
        ModuleError::DependencyCycle(members) => {
            assert_eq!(members, vec!["x".to_string(), "y".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(host.imports(), 0);
}

#[tokio::test]
async fn test_ensure_loaded_retries_failed_module_and_unblocks_dependents() {
    let host = MockHost::new();
    let log = event_log();
    serve_module(&host, "a", RecordingModule::new("a", &log));
    serve_module(&host, "c", RecordingModule::new("c", &log));
    host.fail_first(&entry_url("a"), 1);

    let scheduler = scheduler(
        &host,
        vec![remote("a"), remote("c").with_dependencies(["a"])],
        GateEvaluator::deny_all(),
    );
    let report = scheduler.start().await.unwrap();
    assert!(report.failure("a").is_some());
    assert!(report.failure("c").is_some());

    scheduler.ensure_loaded("a").await.unwrap();
    scheduler.ensure_loaded("c").await.unwrap();

    let status = scheduler.status_view();
    assert_eq!(status.get("a"), Some(ModuleStatus::Loaded));
    assert_eq!(status.get("c"), Some(ModuleStatus::Loaded));
}

#[tokio::test]
async fn test_ensure_loaded_refuses_gated_and_unready_modules() {
    let host = MockHost::new();
    let log = event_log();
    serve_module(&host, "base", RecordingModule::new("base", &log));
    serve_module(&host, "addon", RecordingModule::new("addon", &log));
    serve_module(&host, "beta", RecordingModule::new("beta", &log));

    let scheduler = scheduler(
        &host,
        vec![
            remote("base"),
            remote("addon").with_dependencies(["base"]),
            remote("beta").with_feature_flags(["beta"]),
        ],
        flags(&[]),
    );

    assert!(matches!(
        scheduler.ensure_loaded("beta").await,
        Err(ModuleError::ModuleUnavailable { .. })
    ));
    assert!(matches!(
        scheduler.ensure_loaded("addon").await,
        Err(ModuleError::ModuleUnavailable { .. })
    ));

    scheduler.ensure_loaded("base").await.unwrap();
    scheduler.ensure_loaded("addon").await.unwrap();
    assert_eq!(host.imports(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_navigation_joins_one_activation() {
    let host = MockHost::new();
    let log = event_log();
    let module = RecordingModule::slow("lazy", &log, Duration::from_millis(20));
    serve_module(&host, "lazy", Arc::clone(&module));

    let scheduler = scheduler(&host, vec![remote("lazy")], GateEvaluator::deny_all());
    let results = join_all((0..3).map(|_| scheduler.ensure_loaded("lazy"))).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(module.runs(), 1);
    assert_eq!(host.imports(), 1);

    // already loaded: no further work
    scheduler.ensure_loaded("lazy").await.unwrap();
    assert_eq!(module.runs(), 1);
}
