//! Workload profiles
//!
//! Maps a workload type name to its canonical resource profile. Lookups never
//! fail: unknown types resolve to the `build` profile so scheduling keeps
//! moving even when a caller invents a new job name.

use crate::models::WorkloadProfile;
use std::collections::HashMap;
use tracing::warn;

/// Profile used for unknown workload types
pub const FALLBACK_WORKLOAD: &str = "build";

/// Registry of workload profiles keyed by workload type
#[derive(Debug, Clone)]
pub struct WorkloadProfiler {
    profiles: HashMap<String, WorkloadProfile>,
}

impl WorkloadProfiler {
    /// Profiler seeded with the built-in profiles
    pub fn new() -> Self {
        let profiles = builtin_profiles()
            .into_iter()
            .map(|p| (p.workload_type.clone(), p))
            .collect();
        Self { profiles }
    }

    /// Register extra profiles, replacing built-ins with the same name
    pub fn with_profiles(mut self, profiles: impl IntoIterator<Item = WorkloadProfile>) -> Self {
        for profile in profiles {
            self.profiles.insert(profile.workload_type.clone(), profile);
        }
        self
    }

    /// Look up a profile, falling back to `build` for unknown types
    pub fn profile(&self, workload_type: &str) -> &WorkloadProfile {
        if let Some(profile) = self.profiles.get(workload_type) {
            return profile;
        }

        warn!(
            workload_type = %workload_type,
            fallback = FALLBACK_WORKLOAD,
            "Unknown workload type, using fallback profile"
        );
        self.profiles
            .get(FALLBACK_WORKLOAD)
            .unwrap_or_else(|| fallback_profile())
    }

    pub fn is_known(&self, workload_type: &str) -> bool {
        self.profiles.contains_key(workload_type)
    }

    /// Known workload types in name order
    pub fn workload_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for WorkloadProfiler {
    fn default() -> Self {
        Self::new()
    }
}

fn fallback_profile() -> &'static WorkloadProfile {
    use std::sync::OnceLock;
    static FALLBACK: OnceLock<WorkloadProfile> = OnceLock::new();
    FALLBACK.get_or_init(|| {
        profile(FALLBACK_WORKLOAD, [true, true, true, false], false, 8.0, 2, 4.0)
    })
}

/// Flags are `[cpu, memory, io, network]`
fn profile(
    name: &str,
    intensity: [bool; 4],
    parallelizable: bool,
    avg_duration_minutes: f64,
    min_cores: u32,
    min_memory_gb: f64,
) -> WorkloadProfile {
    let [cpu, memory, io, network] = intensity;
    WorkloadProfile {
        workload_type: name.to_string(),
        cpu_intensive: cpu,
        memory_intensive: memory,
        io_intensive: io,
        network_intensive: network,
        parallelizable,
        avg_duration_minutes,
        min_cores,
        min_memory_gb,
    }
}

fn builtin_profiles() -> Vec<WorkloadProfile> {
    vec![
        profile("build", [true, true, true, false], false, 8.0, 2, 4.0),
        profile("unit-tests", [true, false, false, false], true, 5.0, 2, 4.0),
        profile("component-tests", [true, false, false, false], true, 8.0, 2, 4.0),
        profile("api-tests", [false, false, false, true], true, 10.0, 2, 4.0),
        profile("integration-tests", [true, true, true, true], true, 15.0, 4, 8.0),
        profile("migration-tests", [false, true, true, false], false, 6.0, 2, 4.0),
        profile("e2e-tests", [true, true, false, true], true, 25.0, 4, 8.0),
        profile("performance-tests", [true, true, true, true], false, 30.0, 8, 16.0),
        profile("security-scan", [true, false, true, true], false, 12.0, 2, 4.0),
        profile("lint", [true, false, false, false], false, 3.0, 2, 4.0),
        profile("docs", [false, false, true, false], false, 4.0, 2, 4.0),
        profile("deploy", [false, false, false, true], false, 10.0, 2, 4.0),
    ]
}
