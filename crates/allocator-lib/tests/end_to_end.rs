//! End-to-end tests across classifier, planner, allocator and adjuster

use allocator_lib::catalog::{SELF_HOSTED_LINUX, UBUNTU_4_CORES, UBUNTU_LATEST};
use allocator_lib::{
    adjust, scorer, selector, AllocationRequest, Allocator, ChangeCategory, ChangeClassifier,
    FileChangeFlags, ImpactLevel, LiveConditions, PerformanceImpact, Policy, Priority,
    ResourceCatalog, ResourceHints, TestPlanner, WorkloadProfiler,
};
use std::sync::Arc;

const POLICIES: [Policy; 3] = [
    Policy::Balanced,
    Policy::CostOptimization,
    Policy::PerformanceOptimization,
];

fn allocator() -> Allocator {
    Allocator::new(
        Arc::new(ResourceCatalog::builtin()),
        Arc::new(WorkloadProfiler::new()),
    )
}

#[test]
fn unit_tests_balanced_picks_small_runner_without_hints() {
    let request = AllocationRequest::new("unit-tests")
        .with_duration(5.0)
        .with_parallelism(1)
        .with_policy(Policy::Balanced);

    let decision = allocator().allocate(&request).unwrap();

    assert_eq!(decision.chosen_resource_class, UBUNTU_LATEST);
    assert!(decision.within_budget);
    assert!(decision.optimization_hints.is_empty());
}

#[test]
fn dependency_manifest_runs_everything() {
    let scope = ChangeClassifier::new().classify(&["package-lock.json"]);
    assert!(scope.has(ChangeCategory::Dependencies));

    let planner = TestPlanner::new(allocator());
    let strategy = planner
        .plan(&scope, &FileChangeFlags::from_scope(&scope))
        .unwrap();
    assert!(strategy.run_all);
}

#[test]
fn critical_job_escapes_long_queue() {
    let decision = allocator()
        .allocate(&AllocationRequest::new("unit-tests").with_duration(5.0))
        .unwrap();
    let live = LiveConditions::at_hour(3)
        .with_queue_time(UBUNTU_LATEST, 12.0)
        .with_queue_time(UBUNTU_4_CORES, 4.0)
        .with_queue_time(SELF_HOSTED_LINUX, 30.0);

    let adjustment = adjust(&decision, &live, Priority::Critical);

    assert!(adjustment.runner_changed);
    assert_eq!(adjustment.adjusted_runner, UBUNTU_4_CORES);
    assert_eq!(adjustment.performance_impact, PerformanceImpact::Improved);
}

#[test]
fn broad_change_set_selects_frontend_and_backend_tests() {
    let mut paths = Vec::new();
    for i in 0..9 {
        paths.push(format!("src/components/Widget{i}.tsx"));
    }
    for i in 0..9 {
        paths.push(format!("api/handler{i}.ts"));
    }
    for i in 0..7 {
        paths.push(format!("tests/case{i}.test.ts"));
    }
    assert_eq!(paths.len(), 25);

    let scope = ChangeClassifier::new().classify(&paths);
    assert!(!scope.has(ChangeCategory::Dependencies));
    assert!(!scope.has(ChangeCategory::Workflows));
    assert!(matches!(
        scope.overall_impact,
        ImpactLevel::Medium | ImpactLevel::High
    ));

    let strategy = TestPlanner::new(allocator())
        .plan(&scope, &FileChangeFlags::from_scope(&scope))
        .unwrap();
    for test in ["unit-tests", "component-tests", "e2e-tests", "api-tests", "integration-tests"] {
        assert!(
            strategy.selected_tests.iter().any(|t| t == test),
            "{test} missing"
        );
    }
}

#[test]
fn chosen_class_always_meets_requirements() {
    let alloc = allocator();
    let catalog = ResourceCatalog::builtin();
    let profiler = WorkloadProfiler::new();

    for workload in profiler.workload_types() {
        for policy in POLICIES {
            for cores in [None, Some(1), Some(3), Some(8)] {
                let request = AllocationRequest::new(workload)
                    .with_policy(policy)
                    .with_hints(ResourceHints {
                        cores,
                        memory_gb: None,
                    });
                let requirements = alloc.requirements(&request).unwrap();
                let decision = alloc.allocate(&request).unwrap();
                let class = catalog.get(&decision.chosen_resource_class).unwrap();
                assert!(class.cores >= requirements.cores);
                assert!(class.memory_gb >= requirements.memory_gb);
            }
        }
    }
}

#[test]
fn ceiling_is_honored_whenever_some_candidate_fits() {
    let alloc = allocator();
    let catalog = ResourceCatalog::builtin();

    for workload in ["unit-tests", "integration-tests", "e2e-tests", "performance-tests"] {
        for ceiling in [0.01, 0.05, 0.1, 0.3, 1.0, 5.0] {
            for policy in POLICIES {
                let request = AllocationRequest::new(workload)
                    .with_policy(policy)
                    .with_cost_ceiling(ceiling);
                let requirements = alloc.requirements(&request).unwrap();
                let candidates = scorer::score(&requirements, workload, &catalog).unwrap();
                let any_fits = candidates.iter().any(|c| c.estimated_cost <= ceiling);

                let decision = alloc.allocate(&request).unwrap();
                if any_fits {
                    assert!(decision.estimated_cost <= ceiling, "{workload} @ {ceiling}");
                    assert!(decision.within_budget);
                } else {
                    assert!(!decision.within_budget);
                    let cheapest = selector::select(&candidates, Some(ceiling), policy).unwrap();
                    assert_eq!(cheapest.chosen.class.id, decision.chosen_resource_class);
                }
            }
        }
    }
}

#[test]
fn classify_is_idempotent() {
    let classifier = ChangeClassifier::new();
    let paths = [
        "supabase/migrations/001_init.sql",
        "src/pages/index.tsx",
        ".github/workflows/ci.yml",
        "docs/setup.md",
    ];
    assert_eq!(classifier.classify(&paths), classifier.classify(&paths));
}

#[test]
fn dependency_manifest_always_runs_all() {
    let planner = TestPlanner::new(allocator());
    let classifier = ChangeClassifier::new();
    for manifest in [
        "package.json",
        "yarn.lock",
        "Cargo.toml",
        "requirements.txt",
        "go.mod",
        "frontend/package.json",
        "web/package-lock.json",
        "api/requirements.txt",
        "server/go.mod",
        "services/billing/Cargo.toml",
        "supabase/functions/package.json",
        "tests/package.json",
        "docs/package.json",
    ] {
        let scope = classifier.classify(&["README.md", manifest]);
        let strategy = planner
            .plan(&scope, &FileChangeFlags::from_scope(&scope))
            .unwrap();
        assert!(strategy.run_all, "{manifest} did not force run-all");
    }
}

#[test]
fn run_all_triggers_see_past_first_match_categories() {
    let planner = TestPlanner::new(allocator());
    let classifier = ChangeClassifier::new();
    let cases = [
        (".github/workflows/README.md", ChangeCategory::Docs, true),
        (".github/actions/setup/action.yml", ChangeCategory::Workflows, true),
        (".github/ISSUE_TEMPLATE/bug.md", ChangeCategory::Docs, false),
        ("src/components/package.json", ChangeCategory::Frontend, true),
        ("tests/fixtures/go.sum", ChangeCategory::Tests, true),
        ("db/Gemfile.lock", ChangeCategory::Database, true),
        ("src/components/Button.test.tsx", ChangeCategory::Frontend, false),
        ("docs/package.json.md", ChangeCategory::Docs, false),
    ];

    for (path, category, run_all) in cases {
        let scope = classifier.classify(&[path]);
        assert!(scope.has(category), "{path} should classify as {category}");
        let strategy = planner
            .plan(&scope, &FileChangeFlags::from_scope(&scope))
            .unwrap();
        assert_eq!(strategy.run_all, run_all, "{path}");
    }
}

#[test]
fn execution_order_respects_prerequisites() {
    let planner = TestPlanner::new(allocator());
    let classifier = ChangeClassifier::new();
    let change_sets: &[&[&str]] = &[
        &["src/components/Nav.tsx"],
        &["api/users.ts"],
        &["db/schema.sql"],
        &["tests/a.test.ts"],
        &["src/components/Nav.tsx", "db/schema.sql", "api/users.ts"],
        &["package.json"],
    ];

    for paths in change_sets {
        let scope = classifier.classify(*paths);
        let strategy = planner
            .plan(&scope, &FileChangeFlags::from_scope(&scope))
            .unwrap();
        let position = |test: &str| {
            strategy
                .parallel_groups
                .iter()
                .position(|g| g.members.iter().any(|m| m == test))
        };

        for rule in allocator_lib::planner::TEST_DEPENDENCIES {
            let Some(dependent) = position(rule.test_type) else { continue };
            for prerequisite in rule.prerequisites {
                let before = position(*prerequisite).expect("prerequisite must be scheduled");
                assert!(before <= dependent, "{prerequisite} after {}", rule.test_type);
            }
        }

        // Duration covers every prerequisite chain
        for group in &strategy.parallel_groups {
            assert!(strategy.estimated_duration_minutes >= group.finish_offset_minutes);
            for dep in &group.depends_on {
                let dep_group = strategy.group(dep).unwrap();
                assert!(group.start_offset_minutes >= dep_group.finish_offset_minutes);
            }
        }
    }
}

#[test]
fn adjustment_is_deterministic() {
    let decision = allocator()
        .allocate(&AllocationRequest::new("integration-tests"))
        .unwrap();
    let live = LiveConditions::at_hour(11)
        .with_queue_time(UBUNTU_4_CORES, 15.0)
        .with_availability(UBUNTU_4_CORES, 0.1);

    for priority in [Priority::Normal, Priority::High, Priority::Critical] {
        assert_eq!(
            adjust(&decision, &live, priority),
            adjust(&decision, &live, priority)
        );
    }
}
