//! Benchmarks for the Dependency Analyzer's multi-pass edge discovery
//! (explicit, content-similarity, structural, resource, temporal) across
//! growing task-set sizes, plus the topological/critical-path walk that
//! follows it.
//!
//! Scaling is the concern here: content-similarity and resource passes are
//! O(n^2) over the task set, so these benchmarks track how that shows up
//! in wall-clock time as `task_count` grows, rather than chasing an
//! absolute target.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::HashMap;
use std::time::Duration;
use taskforge_core::{
    DependencyAnalyzer, DependencyReference, DependencyReferenceKind, EngineConfig, PriorityLevel,
    Task, TaskCategory, TaskId, TaskStatus,
};
use tokio::runtime::Runtime;

/// Builds a synthetic task set with a mix of explicit dependency chains,
/// shared resource demands, and overlapping vocabulary, so every discovery
/// pass in the Analyzer has something to find rather than benchmarking an
/// all-independent task set.
fn generate_test_tasks(count: usize) -> Vec<Task> {
    let categories = [
        TaskCategory::Analysis,
        TaskCategory::Design,
        TaskCategory::Feature,
        TaskCategory::Testing,
        TaskCategory::Deployment,
    ];
    let resources = ["database", "api-gateway", "ci-runner"];
    let now = chrono::Utc::now();

    (0..count)
        .map(|i| {
            let mut dependencies = Vec::new();
            if i > 0 {
                dependencies.push(DependencyReference::new(
                    TaskId::new(format!("T-{}", i - 1)),
                    DependencyReferenceKind::Prerequisite,
                ));
            }
            let mut resource_demand = HashMap::new();
            resource_demand.insert(resources[i % resources.len()].to_string(), 1.0);

            Task {
                id: TaskId::new(format!("T-{i}")),
                title: format!("Implement service module {} for the billing pipeline", i % 7),
                description: format!(
                    "Build and validate the billing pipeline module {} against the shared database schema",
                    i % 5
                ),
                category: categories[i % categories.len()],
                priority: if i % 11 == 0 { PriorityLevel::Critical } else { PriorityLevel::Medium },
                status: TaskStatus::Pending,
                created_at: now - chrono::Duration::hours(i as i64 % 48),
                updated_at: now,
                deadline: None,
                estimated_duration: Duration::from_secs(60 * (1 + (i % 30) as u64)),
                capabilities: vec![],
                resource_demand,
                dependencies,
                retry_count: 0,
                last_error: None,
                execution_history: vec![],
            }
        })
        .collect()
}

fn bench_analyze_scaling(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let config = EngineConfig::default();
    let mut group = c.benchmark_group("dependency_analyzer_analyze");
    for size in [10usize, 50, 200, 500] {
        let tasks = generate_test_tasks(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &tasks, |b, tasks| {
            b.iter(|| {
                let analyzer = DependencyAnalyzer::new(&config);
                rt.block_on(analyzer.analyze(tasks)).expect("analysis succeeds")
            });
        });
    }
    group.finish();
}

fn bench_critical_path(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let config = EngineConfig::default();
    let tasks = generate_test_tasks(200);
    let analyzer = DependencyAnalyzer::new(&config);
    let analysis = rt.block_on(analyzer.analyze(&tasks)).expect("analysis succeeds");

    c.bench_function("dependency_analyzer_critical_path_lookup", |b| {
        b.iter(|| analysis.critical_tasks.len());
    });
}

fn bench_validation(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let config = EngineConfig::default();
    let tasks = generate_test_tasks(200);

    c.bench_function("dependency_analyzer_analyze_200_with_validation", |b| {
        b.iter(|| {
            let analyzer = DependencyAnalyzer::new(&config);
            let analysis = rt.block_on(analyzer.analyze(&tasks)).expect("analysis succeeds");
            analysis.is_valid()
        });
    });
}

criterion_group!(benches, bench_analyze_scaling, bench_critical_path, bench_validation);
criterion_main!(benches);
