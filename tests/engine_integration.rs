//! End-to-end tests for the manager facade: load, execute, report.

use redprobe::{
    ExecuteOptions, Manager, RedprobeConfig, ReportFormat, StubProvider, TemplateSource,
    TemplateStatus,
};
use redprobe_exec::StubBehavior;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn write_template(dir: &Path, file: &str, id: &str, prompt: &str, detect: &str) {
    std::fs::write(
        dir.join(file),
        format!(
            "id: \"{id}\"\nname: \"{id}\"\nversion: \"1.0\"\nseverity: \"high\"\n\
             category: \"probe\"\nprompt: \"{prompt}\"\ndetection:\n  - type: \"contains\"\n    value: \"{detect}\"\n",
        ),
    )
    .unwrap();
}

fn config_for(dir: &Path) -> RedprobeConfig {
    let mut config = RedprobeConfig::default();
    config.sources.push(TemplateSource {
        name: "t".into(),
        source_type: "local".into(),
        url: dir.to_string_lossy().to_string(),
        branch: None,
        token: None,
    });
    config
}

#[tokio::test]
async fn local_load_and_execute() {
    let dir = tempfile::tempdir().unwrap();
    write_template(dir.path(), "probe.yaml", "probe_v1.0", "ping", "pong");

    let manager = Manager::builder(config_for(dir.path()))
        .provider(Arc::new(StubProvider::constant("pong")))
        .build();
    let cancel = CancellationToken::new();
    manager.load_templates_from_sources(&cancel).await.unwrap();

    let result = manager
        .execute_template("probe_v1.0", &manager.execute_options(HashMap::new()), &cancel)
        .await
        .unwrap();
    assert_eq!(result.status, TemplateStatus::Completed);
    assert!(result.detected);
    assert!(result.score >= 1);
}

#[tokio::test]
async fn variables_reach_the_provider() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("greet.yaml"),
        "id: \"greet_v1.0\"\nname: \"Greet\"\nversion: \"1.0\"\nseverity: \"info\"\n\
         variables:\n  name: {type: \"string\"}\nprompt: \"hello {{name}}\"\n",
    )
    .unwrap();

    let stub = Arc::new(StubProvider::constant("hi"));
    let manager = Manager::builder(config_for(dir.path()))
        .provider(stub.clone())
        .build();
    let cancel = CancellationToken::new();
    manager.load_templates_from_sources(&cancel).await.unwrap();

    let mut vars = HashMap::new();
    vars.insert("name".to_string(), "world".to_string());
    let result = manager
        .execute_template("greet_v1.0", &manager.execute_options(vars), &cancel)
        .await
        .unwrap();
    assert_eq!(result.status, TemplateStatus::Completed);
    assert_eq!(stub.prompts(), vec!["hello world"]);
}

#[tokio::test]
async fn batch_results_align_with_input_order() {
    let dir = tempfile::tempdir().unwrap();
    for id in ["a_v1.0", "b_v1.0", "c_v1.0"] {
        write_template(dir.path(), &format!("{}.yaml", id), id, "ping", "nope");
    }

    // latencies chosen so completion order differs from input order
    let stub = Arc::new(StubProvider::sequence(vec![
        StubBehavior::RespondAfter {
            content: "one".into(),
            latency: Duration::from_millis(300),
        },
        StubBehavior::RespondAfter {
            content: "two".into(),
            latency: Duration::from_millis(100),
        },
        StubBehavior::RespondAfter {
            content: "three".into(),
            latency: Duration::from_millis(200),
        },
    ]));
    let manager = Manager::builder(config_for(dir.path()))
        .provider(stub)
        .build();
    let cancel = CancellationToken::new();
    manager.load_templates_from_sources(&cancel).await.unwrap();

    let ids: Vec<String> = ["a_v1.0", "b_v1.0", "c_v1.0"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let results = manager
        .execute_templates(&ids, &manager.execute_options(HashMap::new()), &cancel)
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
    for (result, id) in results.iter().zip(&ids) {
        assert_eq!(&result.template_id, id);
        assert_eq!(result.status, TemplateStatus::Completed);
    }
}

#[tokio::test]
async fn cancellation_fails_the_whole_batch_quickly() {
    let dir = tempfile::tempdir().unwrap();
    let ids: Vec<String> = (0..10).map(|i| format!("slow{}_v1.0", i)).collect();
    for id in &ids {
        write_template(dir.path(), &format!("{}.yaml", id), id, "ping", "nope");
    }

    let manager = Manager::builder(config_for(dir.path()))
        .provider(Arc::new(
            StubProvider::constant("slow").with_latency(Duration::from_secs(1)),
        ))
        .build();
    let cancel = CancellationToken::new();
    manager.load_templates_from_sources(&cancel).await.unwrap();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let options = ExecuteOptions {
        concurrency_limit: 4,
        ..manager.execute_options(HashMap::new())
    };
    let start = Instant::now();
    let results = manager
        .execute_templates(&ids, &options, &cancel)
        .await
        .unwrap();
    assert!(start.elapsed() < Duration::from_millis(800));
    assert_eq!(results.len(), ids.len());
    for result in &results {
        assert_eq!(result.status, TemplateStatus::Failed);
        assert!(result.error.as_deref().unwrap().contains("cancelled"));
    }
}

#[tokio::test]
async fn duplicate_ids_leave_the_registry_untouched() {
    let dir = tempfile::tempdir().unwrap();
    write_template(dir.path(), "one.yaml", "dup_v1.0", "ping", "x");
    write_template(dir.path(), "two.yaml", "dup_v1.0", "pong", "y");

    let manager = Manager::builder(config_for(dir.path()))
        .provider(Arc::new(StubProvider::constant("")))
        .build();
    let cancel = CancellationToken::new();
    let before = manager.registry().count();
    let err = manager
        .load_templates_from_sources(&cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, redprobe::Error::DuplicateId(_)));
    assert_eq!(manager.registry().count(), before);
}

#[tokio::test]
async fn report_roundtrip_and_breakdowns() {
    let dir = tempfile::tempdir().unwrap();
    write_template(dir.path(), "hit.yaml", "hit_v1.0", "ping", "pwned");
    write_template(dir.path(), "miss.yaml", "miss_v1.0", "ping", "nope");

    let manager = Manager::builder(config_for(dir.path()))
        .provider(Arc::new(StubProvider::constant("you are pwned")))
        .build();
    let cancel = CancellationToken::new();
    manager.load_templates_from_sources(&cancel).await.unwrap();

    let ids = vec!["hit_v1.0".to_string(), "miss_v1.0".to_string()];
    let results = manager
        .execute_templates(&ids, &manager.execute_options(HashMap::new()), &cancel)
        .await
        .unwrap();

    let report = manager.build_report("integration", ReportFormat::Json, results);
    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.passed, 1);
    assert_eq!(report.summary.severity_breakdown.get("high"), Some(&1));

    let bytes = manager.reporter().generate(&report).unwrap();
    let parsed: redprobe::Report = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(parsed.summary, report.summary);
}

#[tokio::test]
async fn profiler_observes_executions() {
    let dir = tempfile::tempdir().unwrap();
    write_template(dir.path(), "probe.yaml", "probe_v1.0", "ping", "x");

    let manager = Manager::builder(config_for(dir.path()))
        .provider(Arc::new(StubProvider::constant("")))
        .build();
    let cancel = CancellationToken::new();
    manager.load_templates_from_sources(&cancel).await.unwrap();
    manager
        .execute_template("probe_v1.0", &manager.execute_options(HashMap::new()), &cancel)
        .await
        .unwrap();

    let report = manager.profiler().get_report();
    assert!(report.metrics.contains_key("template.load.time"));
    assert!(report.metrics.contains_key("template.execute.time"));
    assert_eq!(report.metrics["template.execute.time"].summary.count, 1);
}
