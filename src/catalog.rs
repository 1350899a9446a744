//! Static registry of pipeline agents.
//!
//! The catalog is built once and never mutated. Lookups and suggestions
//! are pure functions of the table.

use std::collections::HashMap;

use crate::models::agent::AgentDefinition;

/// Ordered, name-indexed set of agent definitions.
#[derive(Debug, Clone)]
pub struct AgentCatalog {
    /// Definitions sorted by phase, ties kept in table order.
    ordered: Vec<AgentDefinition>,
    index: HashMap<String, usize>,
}

impl Default for AgentCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AgentCatalog {
    /// Build a catalog from arbitrary definitions.
    ///
    /// A later definition with a duplicate name replaces the earlier one.
    #[must_use]
    pub fn from_definitions(definitions: Vec<AgentDefinition>) -> Self {
        let mut unique: Vec<AgentDefinition> = Vec::with_capacity(definitions.len());
        for def in definitions {
            if let Some(existing) = unique.iter_mut().find(|d| d.name == def.name) {
                *existing = def;
            } else {
                unique.push(def);
            }
        }
        unique.sort_by_key(|d| d.phase);

        let index = unique
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.clone(), i))
            .collect();

        Self {
            ordered: unique,
            index,
        }
    }

    /// The standard development pipeline.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_definitions(builtin_definitions())
    }

    /// Look up a definition by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AgentDefinition> {
        self.index.get(name).map(|&i| &self.ordered[i])
    }

    /// Whether `name` is a known agent.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All definitions ordered by phase.
    #[must_use]
    pub fn all(&self) -> &[AgentDefinition] {
        &self.ordered
    }

    /// Agents worth running after `current`.
    ///
    /// With a current agent: its dependents, agents one phase later, and
    /// manual agents. Without one: bootstrap candidates (phase ≤ 1 or
    /// manual). An unknown current agent yields nothing.
    #[must_use]
    pub fn suggest_next(&self, current: Option<&str>) -> Vec<&AgentDefinition> {
        let Some(current) = current else {
            return self
                .ordered
                .iter()
                .filter(|d| d.phase <= 1 || d.is_manual())
                .collect();
        };

        let Some(current_def) = self.get(current) else {
            return Vec::new();
        };

        self.ordered
            .iter()
            .filter(|d| {
                d.dependencies.iter().any(|dep| dep == current)
                    || d.phase == current_def.phase + 1
                    || d.is_manual()
            })
            .collect()
    }
}

#[allow(clippy::too_many_lines)] // Flat data table.
fn builtin_definitions() -> Vec<AgentDefinition> {
    vec![
        AgentDefinition::new(
            "repo-onboarding-agent",
            "Universal repository analysis and agent system integration",
            -1,
            &["manual"],
            &["repository-analysis", "agent-integration", "compatibility-mapping"],
            &[],
        ),
        AgentDefinition::new(
            "journal-interface-builder",
            "Create human-readable dashboard for monitoring agents",
            0,
            &["project-start", "manual"],
            &["dashboard-creation", "monitoring-setup"],
            &[],
        ),
        AgentDefinition::new(
            "vision-challenger",
            "Stress-test and refine raw concepts",
            1,
            &["new-idea", "concept-validation"],
            &["concept-analysis", "feasibility-assessment"],
            &[],
        ),
        AgentDefinition::new(
            "manifesto-generator",
            "Create project-specific manifesto with core principles",
            1,
            &["after-vision-challenger"],
            &["manifesto-creation", "principle-definition"],
            &["vision-challenger"],
        ),
        AgentDefinition::new(
            "prd-generator",
            "Transform refined concepts into complete PRDs",
            1,
            &["after-manifesto-generator"],
            &["prd-creation", "requirements-analysis"],
            &["manifesto-generator"],
        ),
        AgentDefinition::new(
            "architecture-designer",
            "Design technical architecture from PRD",
            1,
            &["after-prd-generator"],
            &["architecture-design", "system-design"],
            &["prd-generator"],
        ),
        AgentDefinition::new(
            "stack-analyzer",
            "Research and recommend optimal tech stack",
            2,
            &["after-architecture-designer"],
            &["stack-analysis", "technology-research"],
            &["architecture-designer"],
        ),
        AgentDefinition::new(
            "docs-fetcher",
            "Download and cache latest documentation",
            2,
            &["after-stack-analyzer"],
            &["documentation-fetching", "cache-management"],
            &["stack-analyzer"],
        ),
        AgentDefinition::new(
            "implementation-planner",
            "Create detailed implementation plans",
            2,
            &["after-docs-fetcher"],
            &["implementation-planning", "timeline-creation"],
            &["docs-fetcher"],
        ),
        AgentDefinition::new(
            "foundation-architect",
            "Design the shared foundation layer",
            2,
            &["after-implementation-planner"],
            &["foundation-design", "architecture-patterns"],
            &["implementation-planner"],
        ),
        AgentDefinition::new(
            "build-sequencer",
            "Create exact build order with sprint-based plan",
            3,
            &["after-foundation-architect"],
            &["build-sequencing", "dependency-management"],
            &["foundation-architect"],
        ),
        AgentDefinition::new(
            "task-spec-builder",
            "Create detailed task specifications",
            3,
            &["after-build-sequencer"],
            &["task-specification", "requirement-detailing"],
            &["build-sequencer"],
        ),
        AgentDefinition::new(
            "task-manager",
            "Initialize and maintain the task management system",
            3,
            &["after-task-spec-builder"],
            &["task-management", "status-tracking"],
            &["task-spec-builder"],
        ),
        AgentDefinition::new(
            "task-folder-generator",
            "Create complete TASKS/ directory structure",
            3,
            &["after-task-manager"],
            &["folder-generation", "task-organization"],
            &["task-manager"],
        ),
        AgentDefinition::new(
            "design-system-creator",
            "Create comprehensive design system",
            4,
            &["ui-components-needed"],
            &["design-system", "component-library"],
            &["architecture-designer"],
        ),
        AgentDefinition::new(
            "ai-context-builder",
            "Create .claude folder for AI assistance",
            4,
            &["before-execution"],
            &["ai-context", "documentation-generation"],
            &["task-folder-generator"],
        ),
        AgentDefinition::new(
            "journal-keeper",
            "Document the development journey",
            4,
            &["milestone-reached"],
            &["documentation", "journey-tracking"],
            &[],
        ),
        AgentDefinition::new(
            "task-executor",
            "Execute tasks from TASKS/ folder",
            5,
            &["manual", "task-available"],
            &["task-execution", "code-generation", "implementation"],
            &["task-folder-generator"],
        ),
        AgentDefinition::new(
            "vertical-slice-builder",
            "Build the critical first path",
            5,
            &["foundation-ready"],
            &["vertical-slice", "integration-testing"],
            &["foundation-architect"],
        ),
        AgentDefinition::new(
            "test-guardian",
            "Ensure quality gates are met",
            5,
            &["after-task-completion"],
            &["testing", "quality-assurance"],
            &[],
        ),
        AgentDefinition::new(
            "folder-documenter",
            "Generate comprehensive folder documentation",
            5,
            &["folder-work-complete"],
            &["folder-documentation", "readme-generation"],
            &[],
        ),
        AgentDefinition::new(
            "admin-console-builder",
            "Create self-managing admin interface",
            6,
            &["admin-interface-needed"],
            &["admin-interface", "management-ui"],
            &["vertical-slice-builder"],
        ),
        AgentDefinition::new(
            "setup-wizard-creator",
            "Build zero-friction onboarding",
            6,
            &["onboarding-needed"],
            &["setup-wizard", "onboarding-flow"],
            &["admin-console-builder"],
        ),
        AgentDefinition::new(
            "devops-automator",
            "Automate deployment and operations",
            6,
            &["deployment-needed"],
            &["devops", "ci-cd", "deployment"],
            &["setup-wizard-creator"],
        ),
        AgentDefinition::new(
            "service-analyzer",
            "Analyze project requirements and determine needed services",
            7,
            &["service-integration-needed"],
            &["service-analysis", "integration-planning"],
            &["prd-generator"],
        ),
        AgentDefinition::new(
            "stripe-deployer",
            "Fully configure and deploy Stripe payment processing",
            7,
            &["payment-processing-needed"],
            &["stripe-integration", "payment-processing"],
            &["service-analyzer"],
        ),
        AgentDefinition::new(
            "clerk-deployer",
            "Deploy and configure Clerk authentication",
            7,
            &["authentication-needed"],
            &["clerk-integration", "authentication"],
            &["service-analyzer"],
        ),
        AgentDefinition::new(
            "email-deployer",
            "Set up email service integration",
            7,
            &["email-needed"],
            &["email-integration", "notification-system"],
            &["service-analyzer"],
        ),
        AgentDefinition::new(
            "database-deployer",
            "Deploy and configure database services",
            7,
            &["database-needed"],
            &["database-setup", "data-management"],
            &["service-analyzer"],
        ),
        AgentDefinition::new(
            "monitoring-deployer",
            "Set up monitoring and analytics",
            7,
            &["monitoring-needed"],
            &["monitoring", "analytics", "observability"],
            &["devops-automator"],
        ),
        AgentDefinition::new(
            "error-manager",
            "Specialized agent for resolving stuck/errored tasks",
            8,
            &["error-detected", "agent-stuck"],
            &["error-resolution", "recovery", "debugging"],
            &[],
        ),
    ]
}
