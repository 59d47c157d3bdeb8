//! Parallel test-group planning
//!
//! Turns a classified change set into a [`TestStrategy`]: which test types
//! run, how they are bucketed into the four fixed parallel groups, the order
//! in which groups may start, and a resource allocation for each group.
//!
//! All dependency knowledge lives in [`TEST_DEPENDENCIES`]. Group-level edges,
//! execution order and the critical path are derived from it on every call.

use crate::adjuster::adjust;
use crate::allocator::Allocator;
use crate::error::AllocationError;
use crate::impact::{ChangeCategory, ChangeScope};
use crate::models::{
    AllocationDecision, AllocationRequest, DynamicAdjustment, LiveConditions, Policy, Priority,
    ResourceHints,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// More changed files than this forces the full suite
pub const RUN_ALL_FILE_THRESHOLD: usize = 20;

/// The four fixed parallel groups, in their default order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestGroup {
    Fast,
    Medium,
    Slow,
    Security,
}

impl TestGroup {
    pub const ALL: [TestGroup; 4] = [
        TestGroup::Fast,
        TestGroup::Medium,
        TestGroup::Slow,
        TestGroup::Security,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TestGroup::Fast => "fast",
            TestGroup::Medium => "medium",
            TestGroup::Slow => "slow",
            TestGroup::Security => "security",
        }
    }

    /// Shards per group
    pub fn parallelism(&self) -> u32 {
        match self {
            TestGroup::Fast => 4,
            TestGroup::Medium => 3,
            TestGroup::Slow => 2,
            TestGroup::Security => 1,
        }
    }

    /// Wall-clock estimate for the group at its parallelism
    pub fn estimated_minutes(&self) -> f64 {
        match self {
            TestGroup::Fast => 5.0,
            TestGroup::Medium => 15.0,
            TestGroup::Slow => 30.0,
            TestGroup::Security => 10.0,
        }
    }
}

impl fmt::Display for TestGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One row of the static test dependency table
#[derive(Debug, Clone, Copy)]
pub struct TestTypeRule {
    pub test_type: &'static str,
    pub group: TestGroup,
    pub prerequisites: &'static [&'static str],
    /// When false, dependents must wait for this type to pass (fail-fast gate)
    pub parallel_with_successor: bool,
}

/// Static test dependency DAG. Row order is the canonical test order.
pub static TEST_DEPENDENCIES: &[TestTypeRule] = &[
    TestTypeRule {
        test_type: "unit-tests",
        group: TestGroup::Fast,
        prerequisites: &[],
        parallel_with_successor: false,
    },
    TestTypeRule {
        test_type: "component-tests",
        group: TestGroup::Fast,
        prerequisites: &[],
        parallel_with_successor: true,
    },
    TestTypeRule {
        test_type: "integration-tests",
        group: TestGroup::Medium,
        prerequisites: &["unit-tests"],
        parallel_with_successor: false,
    },
    TestTypeRule {
        test_type: "api-tests",
        group: TestGroup::Medium,
        prerequisites: &["unit-tests"],
        parallel_with_successor: true,
    },
    TestTypeRule {
        test_type: "migration-tests",
        group: TestGroup::Medium,
        prerequisites: &[],
        parallel_with_successor: false,
    },
    TestTypeRule {
        test_type: "e2e-tests",
        group: TestGroup::Slow,
        prerequisites: &["integration-tests", "component-tests"],
        parallel_with_successor: true,
    },
    TestTypeRule {
        test_type: "performance-tests",
        group: TestGroup::Slow,
        prerequisites: &["integration-tests"],
        parallel_with_successor: true,
    },
    TestTypeRule {
        test_type: "security-scan",
        group: TestGroup::Security,
        prerequisites: &[],
        parallel_with_successor: true,
    },
];

pub fn rule_for(test_type: &str) -> Option<&'static TestTypeRule> {
    TEST_DEPENDENCIES.iter().find(|r| r.test_type == test_type)
}

/// Test types each change category requires
pub fn required_tests(category: ChangeCategory) -> &'static [&'static str] {
    match category {
        ChangeCategory::Frontend => &["unit-tests", "component-tests", "e2e-tests"],
        ChangeCategory::Backend => {
            &["unit-tests", "integration-tests", "api-tests", "security-scan"]
        }
        ChangeCategory::Database => &["integration-tests", "migration-tests"],
        ChangeCategory::Config => &["unit-tests", "integration-tests"],
        ChangeCategory::Tests => &["unit-tests"],
        ChangeCategory::Docs => &[],
        ChangeCategory::Workflows => &["unit-tests", "integration-tests"],
        ChangeCategory::Dependencies => &["unit-tests", "integration-tests", "security-scan"],
    }
}

/// Change-set facts that can force the full suite
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeFlags {
    pub dependencies_changed: bool,
    pub workflows_changed: bool,
    pub total_files: usize,
}

impl FileChangeFlags {
    /// Flags implied by the paths themselves. Manifests and workflow files
    /// count even when an earlier category claimed them.
    pub fn from_scope(scope: &ChangeScope) -> Self {
        Self {
            dependencies_changed: !scope.dependency_manifests.is_empty()
                || scope.has(ChangeCategory::Dependencies),
            workflows_changed: !scope.workflow_files.is_empty()
                || scope.has(ChangeCategory::Workflows),
            total_files: scope.total_files,
        }
    }
}

/// One parallel group in a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelGroup {
    pub name: String,
    pub members: Vec<String>,
    /// Sum of the members' average durations if run back to back
    pub sequential_minutes: f64,
    pub estimated_minutes: f64,
    pub parallelism: u32,
    /// Groups that must be modeled complete before this one starts
    pub depends_on: Vec<String>,
    pub start_offset_minutes: f64,
    pub finish_offset_minutes: f64,
    /// Dependents wait for this group to pass, not only to finish
    pub fail_fast: bool,
    /// The allocated class, or the adjusted one when live conditions moved it
    pub recommended_resource_class: String,
    pub allocation: AllocationDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<DynamicAdjustment>,
}

impl ParallelGroup {
    /// Allocation cost plus any change the adjustment made to it
    pub fn estimated_cost(&self) -> f64 {
        let delta = self
            .adjustment
            .as_ref()
            .filter(|a| a.runner_changed)
            .map_or(0.0, |a| a.cost_delta);
        self.allocation.estimated_cost + delta
    }
}

/// Which tests run, grouped and ordered for an external executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestStrategy {
    pub run_all: bool,
    pub selected_tests: Vec<String>,
    /// Groups in a valid execution order
    pub parallel_groups: Vec<ParallelGroup>,
    /// Longest chain of dependent groups
    pub critical_path: Vec<String>,
    /// Length of the critical path
    pub estimated_duration_minutes: f64,
    pub reasoning: Vec<String>,
}

impl TestStrategy {
    pub fn group(&self, name: &str) -> Option<&ParallelGroup> {
        self.parallel_groups.iter().find(|g| g.name == name)
    }

    pub fn group_of(&self, test_type: &str) -> Option<&ParallelGroup> {
        self.parallel_groups
            .iter()
            .find(|g| g.members.iter().any(|m| m == test_type))
    }

    pub fn total_estimated_cost(&self) -> f64 {
        self.parallel_groups
            .iter()
            .map(ParallelGroup::estimated_cost)
            .sum()
    }
}

/// Builds test strategies; per-group resources come from the allocator
#[derive(Debug, Clone)]
pub struct TestPlanner {
    allocator: Allocator,
    policy: Policy,
    priority: Priority,
    cost_ceiling: Option<f64>,
    live_conditions: Option<LiveConditions>,
}

impl TestPlanner {
    pub fn new(allocator: Allocator) -> Self {
        Self {
            allocator,
            policy: Policy::Balanced,
            priority: Priority::Normal,
            cost_ceiling: None,
            live_conditions: None,
        }
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Ceiling applied to each group's allocation
    pub fn with_cost_ceiling(mut self, cost_ceiling: Option<f64>) -> Self {
        self.cost_ceiling = cost_ceiling;
        self
    }

    /// Run every group decision through the adjuster against `live`
    pub fn with_live_conditions(mut self, live: Option<LiveConditions>) -> Self {
        self.live_conditions = live;
        self
    }

    pub fn plan(
        &self,
        scope: &ChangeScope,
        flags: &FileChangeFlags,
    ) -> Result<TestStrategy, AllocationError> {
        let mut reasoning = Vec::new();
        let derived = FileChangeFlags::from_scope(scope);
        let dependencies_changed = flags.dependencies_changed || derived.dependencies_changed;
        let workflows_changed = flags.workflows_changed || derived.workflows_changed;
        let total_files = flags.total_files.max(derived.total_files);

        if dependencies_changed {
            reasoning.push("Dependency manifests changed: running the full suite".to_string());
        }
        if workflows_changed {
            reasoning.push("Workflow definitions changed: running the full suite".to_string());
        }
        if total_files > RUN_ALL_FILE_THRESHOLD {
            reasoning.push(format!(
                "{} files changed (more than {}): running the full suite",
                total_files, RUN_ALL_FILE_THRESHOLD
            ));
        }
        let run_all =
            dependencies_changed || workflows_changed || total_files > RUN_ALL_FILE_THRESHOLD;

        let selected: BTreeSet<&'static str> = if run_all {
            TEST_DEPENDENCIES.iter().map(|r| r.test_type).collect()
        } else {
            let mut selected = BTreeSet::new();
            for category in scope.categories.keys() {
                let tests = required_tests(*category);
                if tests.is_empty() {
                    reasoning.push(format!("{category} changes need no tests"));
                    continue;
                }
                reasoning.push(format!("{category} changes require {}", tests.join(", ")));
                selected.extend(tests.iter().copied());
            }
            close_over_prerequisites(&mut selected, &mut reasoning);
            selected
        };

        let selected_tests: Vec<String> = TEST_DEPENDENCIES
            .iter()
            .filter(|r| selected.contains(r.test_type))
            .map(|r| r.test_type.to_string())
            .collect();

        let mut members: BTreeMap<TestGroup, Vec<&'static str>> = BTreeMap::new();
        if run_all {
            for group in TestGroup::ALL {
                members.entry(group).or_default();
            }
        }
        for rule in TEST_DEPENDENCIES.iter().filter(|r| selected.contains(r.test_type)) {
            members.entry(rule.group).or_default().push(rule.test_type);
        }
        members.retain(|_, m| run_all || !m.is_empty());

        if members.is_empty() {
            reasoning.push("No test-relevant changes; nothing to schedule".to_string());
            return Ok(TestStrategy {
                run_all,
                selected_tests,
                parallel_groups: Vec::new(),
                critical_path: Vec::new(),
                estimated_duration_minutes: 0.0,
                reasoning,
            });
        }

        let edges = group_edges(&members);
        let order = execution_order(&members, &edges);

        let mut start: HashMap<TestGroup, f64> = HashMap::new();
        let mut finish: HashMap<TestGroup, f64> = HashMap::new();
        let mut predecessor: HashMap<TestGroup, TestGroup> = HashMap::new();
        for group in &order {
            let deps = edges.get(group).cloned().unwrap_or_default();
            let mut begin = 0.0;
            for dep in &deps {
                let dep_finish = finish.get(dep).copied().unwrap_or(0.0);
                if dep_finish > begin {
                    begin = dep_finish;
                    predecessor.insert(*group, *dep);
                }
            }
            start.insert(*group, begin);
            finish.insert(*group, begin + group.estimated_minutes());
        }

        let (last, total) = order
            .iter()
            .map(|g| (*g, finish.get(g).copied().unwrap_or(0.0)))
            .fold((order[0], f64::MIN), |best, item| {
                if item.1 > best.1 {
                    item
                } else {
                    best
                }
            });
        let mut critical = vec![last];
        while let Some(prev) = critical.last().and_then(|g| predecessor.get(g)) {
            critical.push(*prev);
        }
        critical.reverse();

        reasoning.push(format!(
            "Critical path {} takes {:.0} min",
            critical.iter().map(|g| g.name()).collect::<Vec<_>>().join(" -> "),
            total
        ));

        let mut parallel_groups = Vec::with_capacity(order.len());
        for group in &order {
            let group_members = members.get(group).cloned().unwrap_or_default();
            let allocation = self.allocate_group(*group, &group_members)?;
            let adjustment = self
                .live_conditions
                .as_ref()
                .map(|live| adjust(&allocation, live, self.priority));
            let recommended_resource_class = match &adjustment {
                Some(adj) if adj.runner_changed => {
                    reasoning.push(format!("{} group: {}", group.name(), adj.reason));
                    adj.adjusted_runner.clone()
                }
                _ => allocation.chosen_resource_class.clone(),
            };
            let depends_on = edges
                .get(group)
                .map(|deps| deps.iter().map(|d| d.name().to_string()).collect())
                .unwrap_or_default();

            parallel_groups.push(ParallelGroup {
                name: group.name().to_string(),
                members: group_members.iter().map(|m| m.to_string()).collect(),
                sequential_minutes: group_members
                    .iter()
                    .map(|m| self.allocator.profiler().profile(m).avg_duration_minutes)
                    .sum(),
                estimated_minutes: group.estimated_minutes(),
                parallelism: group.parallelism(),
                depends_on,
                start_offset_minutes: start.get(group).copied().unwrap_or(0.0),
                finish_offset_minutes: finish.get(group).copied().unwrap_or(0.0),
                fail_fast: gates_dependents(&group_members, &selected),
                recommended_resource_class,
                allocation,
                adjustment,
            });
        }

        Ok(TestStrategy {
            run_all,
            selected_tests,
            parallel_groups,
            critical_path: critical.iter().map(|g| g.name().to_string()).collect(),
            estimated_duration_minutes: total,
            reasoning,
        })
    }

    /// Size one group by its most demanding member
    fn allocate_group(
        &self,
        group: TestGroup,
        members: &[&'static str],
    ) -> Result<AllocationDecision, AllocationError> {
        let profiler = self.allocator.profiler();
        let heaviest = members
            .iter()
            .map(|m| profiler.profile(m))
            .max_by(|a, b| {
                a.min_cores
                    .cmp(&b.min_cores)
                    .then(a.min_memory_gb.total_cmp(&b.min_memory_gb))
            });

        let (workload_type, hints) = match heaviest {
            Some(profile) => (
                profile.workload_type.clone(),
                ResourceHints {
                    cores: Some(profile.min_cores),
                    memory_gb: Some(profile.min_memory_gb),
                },
            ),
            // Empty groups only occur for run-all, which never leaves a group empty
            None => (group.name().to_string(), ResourceHints::default()),
        };

        let mut request = AllocationRequest::new(workload_type)
            .with_duration(group.estimated_minutes())
            .with_parallelism(group.parallelism())
            .with_hints(hints)
            .with_priority(self.priority)
            .with_policy(self.policy);
        if let Some(ceiling) = self.cost_ceiling {
            request = request.with_cost_ceiling(ceiling);
        }
        self.allocator.allocate(&request)
    }
}

/// Add missing prerequisites until the selection is closed under the table
fn close_over_prerequisites(selected: &mut BTreeSet<&'static str>, reasoning: &mut Vec<String>) {
    loop {
        let mut missing: Vec<(&'static str, &'static str)> = Vec::new();
        for rule in TEST_DEPENDENCIES.iter().filter(|r| selected.contains(r.test_type)) {
            for prerequisite in rule.prerequisites {
                if !selected.contains(prerequisite) {
                    missing.push((*prerequisite, rule.test_type));
                }
            }
        }

        if missing.is_empty() {
            return;
        }
        for (prerequisite, dependent) in missing {
            if selected.insert(prerequisite) {
                reasoning.push(format!(
                    "Added {prerequisite} as a prerequisite of {dependent}"
                ));
            }
        }
    }
}

/// For each included group, the other included groups it waits on
fn group_edges(
    members: &BTreeMap<TestGroup, Vec<&'static str>>,
) -> BTreeMap<TestGroup, BTreeSet<TestGroup>> {
    let group_of: HashMap<&str, TestGroup> = members
        .iter()
        .flat_map(|(group, tests)| tests.iter().map(move |t| (*t, *group)))
        .collect();

    let mut edges: BTreeMap<TestGroup, BTreeSet<TestGroup>> = BTreeMap::new();
    for (group, tests) in members {
        let deps = edges.entry(*group).or_default();
        for test in tests {
            let Some(rule) = rule_for(test) else { continue };
            for prerequisite in rule.prerequisites {
                if let Some(dep_group) = group_of.get(prerequisite) {
                    if dep_group != group {
                        deps.insert(*dep_group);
                    }
                }
            }
        }
    }
    edges
}

/// Topological order of groups; ties keep the fixed group order
fn execution_order(
    members: &BTreeMap<TestGroup, Vec<&'static str>>,
    edges: &BTreeMap<TestGroup, BTreeSet<TestGroup>>,
) -> Vec<TestGroup> {
    let mut remaining: BTreeSet<TestGroup> = members.keys().copied().collect();
    let mut order = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let ready = remaining.iter().copied().find(|g| {
            edges
                .get(g)
                .map_or(true, |deps| deps.iter().all(|d| !remaining.contains(d)))
        });
        // The static table is acyclic, so a ready group always exists; fall
        // back to fixed order rather than loop forever if it ever is not.
        let next = match ready.or_else(|| remaining.iter().next().copied()) {
            Some(g) => g,
            None => break,
        };
        remaining.remove(&next);
        order.push(next);
    }
    order
}

/// True if a member gates a selected dependent in another group
fn gates_dependents(members: &[&'static str], selected: &BTreeSet<&'static str>) -> bool {
    members.iter().any(|member| {
        let Some(rule) = rule_for(member) else { return false };
        !rule.parallel_with_successor
            && TEST_DEPENDENCIES.iter().any(|dependent| {
                selected.contains(dependent.test_type)
                    && dependent.group != rule.group
                    && dependent.prerequisites.contains(member)
            })
    })
}
