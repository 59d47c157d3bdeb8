//! Change-impact classification
//!
//! Sorts changed file paths into categories using an ordered list of path
//! patterns (first match wins, unmatched paths count as `config`) and rolls the
//! per-file impact weights up into an overall impact level.

use crate::error::ParseEnumError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Weighted average above which impact is `high`
pub const HIGH_IMPACT_THRESHOLD: f64 = 3.5;

/// Weighted average above which impact is `medium`
pub const MEDIUM_IMPACT_THRESHOLD: f64 = 2.5;

/// Category of a changed file, in classification order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeCategory {
    Frontend,
    Backend,
    Database,
    Config,
    Tests,
    Docs,
    Workflows,
    Dependencies,
}

impl ChangeCategory {
    pub const ALL: [ChangeCategory; 8] = [
        ChangeCategory::Frontend,
        ChangeCategory::Backend,
        ChangeCategory::Database,
        ChangeCategory::Config,
        ChangeCategory::Tests,
        ChangeCategory::Docs,
        ChangeCategory::Workflows,
        ChangeCategory::Dependencies,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeCategory::Frontend => "frontend",
            ChangeCategory::Backend => "backend",
            ChangeCategory::Database => "database",
            ChangeCategory::Config => "config",
            ChangeCategory::Tests => "tests",
            ChangeCategory::Docs => "docs",
            ChangeCategory::Workflows => "workflows",
            ChangeCategory::Dependencies => "dependencies",
        }
    }

    /// Fixed impact weight of one file in this category
    pub fn impact_weight(&self) -> ImpactWeight {
        match self {
            ChangeCategory::Frontend => ImpactWeight::Medium,
            ChangeCategory::Backend => ImpactWeight::High,
            ChangeCategory::Database => ImpactWeight::High,
            ChangeCategory::Config => ImpactWeight::Medium,
            ChangeCategory::Tests => ImpactWeight::Low,
            ChangeCategory::Docs => ImpactWeight::Minimal,
            ChangeCategory::Workflows => ImpactWeight::High,
            ChangeCategory::Dependencies => ImpactWeight::High,
        }
    }

    fn pattern(&self) -> &'static str {
        match self {
            ChangeCategory::Frontend => {
                r"^(src/)?(components|pages|app|frontend|web|ui|styles|public|hooks)/|\.(css|scss|sass|less|html|vue|svelte)$"
            }
            ChangeCategory::Backend => {
                r"^(src/)?(api|server|backend|services|lib|handlers|routes|functions)/|(^|/)supabase/functions/"
            }
            ChangeCategory::Database => {
                r"(^|/)(migrations|database|db)/|\.sql$|(^|/)schema\.prisma$"
            }
            ChangeCategory::Config => {
                r"^configs?/|(^|/)\.env(\.[^/]*)?$|(^|/)(tsconfig[^/]*\.json|(vite|webpack|jest|vitest|tailwind)\.config\.[cm]?[jt]s|\.eslintrc[^/]*|\.prettierrc[^/]*|docker-compose\.ya?ml|Dockerfile)$"
            }
            ChangeCategory::Tests => {
                r"(^|/)(tests?|__tests__|spec|e2e|cypress|playwright)/|\.(test|spec)\.[cm]?[jt]sx?$|_test\.(go|py|rs)$"
            }
            ChangeCategory::Docs => r"^docs?/|\.(md|mdx|rst|adoc)$",
            ChangeCategory::Workflows => r"^\.github/(workflows|actions)/",
            ChangeCategory::Dependencies => {
                r"(^|/)(package\.json|package-lock\.json|yarn\.lock|pnpm-lock\.yaml|Cargo\.(toml|lock)|requirements[^/]*\.txt|Pipfile(\.lock)?|poetry\.lock|go\.(mod|sum)|Gemfile(\.lock)?)$"
            }
        }
    }
}

impl fmt::Display for ChangeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-file impact weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactWeight {
    Minimal,
    Low,
    Medium,
    High,
}

impl ImpactWeight {
    pub fn value(&self) -> f64 {
        match self {
            ImpactWeight::Minimal => 1.0,
            ImpactWeight::Low => 2.0,
            ImpactWeight::Medium => 3.0,
            ImpactWeight::High => 4.0,
        }
    }
}

/// Overall impact of a change set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl ImpactLevel {
    pub fn from_weighted_average(average: f64) -> Self {
        if average > HIGH_IMPACT_THRESHOLD {
            ImpactLevel::High
        } else if average > MEDIUM_IMPACT_THRESHOLD {
            ImpactLevel::Medium
        } else {
            ImpactLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactLevel::Low => "low",
            ImpactLevel::Medium => "medium",
            ImpactLevel::High => "high",
        }
    }
}

impl fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImpactLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(ImpactLevel::Low),
            "medium" => Ok(ImpactLevel::Medium),
            "high" => Ok(ImpactLevel::High),
            other => Err(ParseEnumError::new("impact level", other, "low, medium, high")),
        }
    }
}

/// Files matched to one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMatch {
    pub files: Vec<String>,
    pub impact: ImpactWeight,
}

/// Classification of one change set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeScope {
    pub categories: BTreeMap<ChangeCategory, CategoryMatch>,
    pub total_files: usize,
    pub weighted_average: f64,
    pub overall_impact: ImpactLevel,
    /// Every dependency manifest in the change set, whichever category
    /// claimed it (`web/package.json` classifies as frontend)
    #[serde(default)]
    pub dependency_manifests: Vec<String>,
    /// Every file under `.github/workflows` or `.github/actions`, whichever
    /// category claimed it
    #[serde(default)]
    pub workflow_files: Vec<String>,
}

impl ChangeScope {
    pub fn has(&self, category: ChangeCategory) -> bool {
        self.categories.contains_key(&category)
    }

    pub fn files(&self, category: ChangeCategory) -> &[String] {
        self.categories
            .get(&category)
            .map(|m| m.files.as_slice())
            .unwrap_or(&[])
    }

    pub fn category_names(&self) -> Vec<&'static str> {
        self.categories.keys().map(|c| c.as_str()).collect()
    }
}

/// Path classifier with its patterns compiled once
#[derive(Debug, Clone)]
pub struct ChangeClassifier {
    patterns: Vec<(ChangeCategory, Regex)>,
}

impl ChangeClassifier {
    pub fn new() -> Self {
        let patterns = ChangeCategory::ALL
            .iter()
            .map(|category| {
                let regex = Regex::new(category.pattern())
                    .expect("built-in change category pattern must compile");
                (*category, regex)
            })
            .collect();
        Self { patterns }
    }

    /// Category for a single path; first matching pattern wins
    pub fn category_of(&self, path: &str) -> ChangeCategory {
        let normalized = normalize(path);
        self.patterns
            .iter()
            .find(|(_, regex)| regex.is_match(&normalized))
            .map(|(category, _)| *category)
            .unwrap_or(ChangeCategory::Config)
    }

    /// Whether `path` matches `category`'s pattern, ignoring precedence
    pub fn matches(&self, category: ChangeCategory, path: &str) -> bool {
        let normalized = normalize(path);
        self.patterns
            .iter()
            .any(|(c, regex)| *c == category && regex.is_match(&normalized))
    }

    /// Classify a change set. Blank entries are ignored; the result depends
    /// only on the input, so repeated calls agree.
    pub fn classify<S: AsRef<str>>(&self, changed_paths: &[S]) -> ChangeScope {
        let mut categories: BTreeMap<ChangeCategory, CategoryMatch> = BTreeMap::new();
        let mut total_files = 0usize;
        let mut weighted_sum = 0.0;
        let mut dependency_manifests = Vec::new();
        let mut workflow_files = Vec::new();

        for path in changed_paths {
            let path = path.as_ref().trim();
            if path.is_empty() {
                continue;
            }

            let category = self.category_of(path);
            let impact = category.impact_weight();
            categories
                .entry(category)
                .or_insert_with(|| CategoryMatch {
                    files: Vec::new(),
                    impact,
                })
                .files
                .push(path.to_string());

            if self.matches(ChangeCategory::Dependencies, path) {
                dependency_manifests.push(path.to_string());
            }
            if self.matches(ChangeCategory::Workflows, path) {
                workflow_files.push(path.to_string());
            }

            total_files += 1;
            weighted_sum += impact.value();
        }

        let weighted_average = if total_files == 0 {
            0.0
        } else {
            weighted_sum / total_files as f64
        };

        ChangeScope {
            categories,
            total_files,
            weighted_average,
            overall_impact: ImpactLevel::from_weighted_average(weighted_average),
            dependency_manifests,
            workflow_files,
        }
    }
}

impl Default for ChangeClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(path: &str) -> String {
    path.trim().trim_start_matches("./").replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(path: &str) -> ChangeCategory {
        ChangeClassifier::new().category_of(path)
    }

    #[test]
    fn test_categories_for_common_paths() {
        assert_eq!(category("src/components/Button.tsx"), ChangeCategory::Frontend);
        assert_eq!(category("styles/site.scss"), ChangeCategory::Frontend);
        assert_eq!(category("server/routes.ts"), ChangeCategory::Backend);
        assert_eq!(category("supabase/functions/send/index.ts"), ChangeCategory::Backend);
        assert_eq!(category("supabase/migrations/001_init.sql"), ChangeCategory::Database);
        assert_eq!(category("tsconfig.json"), ChangeCategory::Config);
        assert_eq!(category(".env.production"), ChangeCategory::Config);
        assert_eq!(category("tests/login.test.ts"), ChangeCategory::Tests);
        assert_eq!(category("README.md"), ChangeCategory::Docs);
        assert_eq!(category(".github/workflows/ci.yml"), ChangeCategory::Workflows);
        assert_eq!(category("package-lock.json"), ChangeCategory::Dependencies);
        assert_eq!(category("requirements-dev.txt"), ChangeCategory::Dependencies);
    }

    #[test]
    fn test_first_match_wins() {
        // Component tests live under components/, which frontend claims first
        assert_eq!(
            category("src/components/Button.test.tsx"),
            ChangeCategory::Frontend
        );
    }

    #[test]
    fn test_unmatched_defaults_to_config() {
        assert_eq!(category("Makefile"), ChangeCategory::Config);
        assert_eq!(category("scripts/deploy.sh"), ChangeCategory::Config);
    }

    #[test]
    fn test_weighted_average_levels() {
        let classifier = ChangeClassifier::new();

        let docs = classifier.classify(&["README.md", "docs/intro.md"]);
        assert_eq!(docs.overall_impact, ImpactLevel::Low);
        assert_eq!(docs.weighted_average, 1.0);

        let backend = classifier.classify(&["server/app.ts", "db/seed.sql"]);
        assert_eq!(backend.overall_impact, ImpactLevel::High);

        // (3 + 4 + 2) / 3 = 3.0
        let mixed =
            classifier.classify(&["src/pages/index.tsx", "api/users.ts", "tests/a.test.ts"]);
        assert_eq!(mixed.overall_impact, ImpactLevel::Medium);
        assert_eq!(mixed.total_files, 3);
    }

    #[test]
    fn test_empty_change_set() {
        let scope = ChangeClassifier::new().classify::<&str>(&[]);
        assert_eq!(scope.total_files, 0);
        assert_eq!(scope.overall_impact, ImpactLevel::Low);
        assert!(scope.categories.is_empty());
    }

    #[test]
    fn test_classify_is_idempotent() {
        let classifier = ChangeClassifier::new();
        let paths = ["api/a.ts", "README.md", "package.json", "src/app/page.tsx"];
        assert_eq!(classifier.classify(&paths), classifier.classify(&paths));
    }

    #[test]
    fn test_nested_manifests_recorded_whatever_the_category() {
        let classifier = ChangeClassifier::new();
        let cases = [
            ("frontend/package.json", ChangeCategory::Frontend),
            ("web/package-lock.json", ChangeCategory::Frontend),
            ("api/requirements.txt", ChangeCategory::Backend),
            ("server/go.mod", ChangeCategory::Backend),
            ("services/billing/Cargo.toml", ChangeCategory::Backend),
            ("supabase/functions/package.json", ChangeCategory::Backend),
            ("tests/package.json", ChangeCategory::Tests),
            ("docs/package.json", ChangeCategory::Docs),
            ("yarn.lock", ChangeCategory::Dependencies),
        ];
        for (path, expected) in cases {
            let scope = classifier.classify(&[path]);
            assert!(scope.has(expected), "{path} should classify as {expected}");
            assert_eq!(scope.dependency_manifests, vec![path.to_string()], "{path}");
        }
    }

    #[test]
    fn test_workflow_files_recorded_whatever_the_category() {
        let classifier = ChangeClassifier::new();
        let scope = classifier.classify(&[".github/workflows/README.md", ".github/CODEOWNERS"]);
        assert!(scope.has(ChangeCategory::Docs));
        assert_eq!(scope.workflow_files, vec![".github/workflows/README.md"]);
    }

    #[test]
    fn test_lookalike_names_are_not_manifests() {
        let scope = ChangeClassifier::new().classify(&[
            "src/package.json.bak",
            "docs/go.mod.md",
            "api/not-requirements.txt.orig",
        ]);
        assert!(scope.dependency_manifests.is_empty());
        assert!(scope.workflow_files.is_empty());
    }

    #[test]
    fn test_leading_dot_slash_normalized() {
        assert_eq!(category("./.github/workflows/ci.yml"), ChangeCategory::Workflows);
    }

    #[test]
    fn test_impact_level_parse() {
        assert_eq!("HIGH".parse::<ImpactLevel>().unwrap(), ImpactLevel::High);
        assert!("severe".parse::<ImpactLevel>().is_err());
    }
}
