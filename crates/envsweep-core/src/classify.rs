use std::collections::{BTreeMap, BTreeSet};

use crate::package::PackageSet;
use crate::policy::RetentionPolicy;
use crate::requirements::DeclaredDependencySet;

/// Verdict for one globally installed package. Derived per run, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Core,
    Essential,
    ProjectRemovable,
    DeclaredRemovable,
    Unclassified,
}

impl Classification {
    pub fn is_removable(self) -> bool {
        matches!(self, Self::ProjectRemovable | Self::DeclaredRemovable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Essential => "essential",
            Self::ProjectRemovable => "project-removable",
            Self::DeclaredRemovable => "declared-removable",
            Self::Unclassified => "unclassified",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifyReport {
    /// Redundant with the project environment and unprotected. Always a
    /// subset of the global names.
    pub safe_to_remove: BTreeSet<String>,
    /// Core and essential members of the global set. Unclassified packages
    /// are retained but not listed here.
    pub keep: BTreeSet<String>,
    pub classifications: BTreeMap<String, Classification>,
}

struct RuleContext<'a> {
    project: &'a PackageSet,
    declared: &'a DeclaredDependencySet,
    policy: &'a RetentionPolicy,
    project_deps: BTreeSet<String>,
}

type Rule = fn(&RuleContext<'_>, &str) -> Option<Classification>;

/// Ordered decision table, first match wins. The allow-list rules must stay
/// ahead of the removability rules.
const RULES: &[Rule] = &[
    rule_core,
    rule_essential,
    rule_project_dependency,
    rule_declared_dependency,
];

/// Classifies every package in the global set. Pure: inputs are not mutated
/// and identical inputs always produce the same report.
pub fn classify(
    global: &PackageSet,
    project: &PackageSet,
    declared: &DeclaredDependencySet,
    policy: &RetentionPolicy,
) -> ClassifyReport {
    let context = RuleContext {
        project,
        declared,
        policy,
        project_deps: project_dependencies(global, project, declared, policy),
    };

    let mut report = ClassifyReport::default();
    for name in global.names() {
        let classification = RULES
            .iter()
            .find_map(|rule| rule(&context, name))
            .unwrap_or(Classification::Unclassified);

        match classification {
            Classification::Core | Classification::Essential => {
                report.keep.insert(name.to_string());
            }
            Classification::ProjectRemovable | Classification::DeclaredRemovable => {
                report.safe_to_remove.insert(name.to_string());
            }
            Classification::Unclassified => {}
        }
        report.classifications.insert(name.to_string(), classification);
    }
    report
}

/// Packages that look like project dependencies: declared in the manifest and
/// installed globally, or present in both environments without being an
/// essential tool. The second clause deliberately catches transitive deps the
/// manifest never names.
fn project_dependencies(
    global: &PackageSet,
    project: &PackageSet,
    declared: &DeclaredDependencySet,
    policy: &RetentionPolicy,
) -> BTreeSet<String> {
    let mut deps: BTreeSet<String> = declared
        .iter()
        .filter(|name| global.contains(name))
        .cloned()
        .collect();

    for name in global.names() {
        if project.contains(name) && !policy.is_essential(name) {
            deps.insert(name.to_string());
        }
    }
    deps
}

fn rule_core(context: &RuleContext<'_>, name: &str) -> Option<Classification> {
    context.policy.is_core(name).then_some(Classification::Core)
}

fn rule_essential(context: &RuleContext<'_>, name: &str) -> Option<Classification> {
    context
        .policy
        .is_essential(name)
        .then_some(Classification::Essential)
}

fn rule_project_dependency(context: &RuleContext<'_>, name: &str) -> Option<Classification> {
    (context.project_deps.contains(name) && context.project.contains(name))
        .then_some(Classification::ProjectRemovable)
}

fn rule_declared_dependency(context: &RuleContext<'_>, name: &str) -> Option<Classification> {
    (context.declared.contains(name) && context.project.contains(name))
        .then_some(Classification::DeclaredRemovable)
}
