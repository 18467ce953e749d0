//! Safety gate: tool allowlists and content tripwires for proposed plans.
//!
//! Each step is checked in a fixed order and the overall status is derived
//! only from those per-step outcomes:
//! - any rejected step makes the plan `Blocked`;
//! - otherwise any step needing rehearsal makes it `Sandboxed`;
//! - otherwise the plan is `Allowed`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::signing::canonical_json_value;
use crate::core::types::{PlanStep, SafetyAssessment, SafetyStatus};
use crate::core::value::{Payload, Value, payload_depth, payload_to_json};

pub const SAFE_TOOLS: &[&str] = &[
    "read_file",
    "list_files",
    "search_text",
    "validate_json",
    "parse_data",
    "format_text",
    "compute_hash",
    "analyze_data",
];

pub const RISKY_TOOLS: &[&str] = &[
    "write_file",
    "delete_file",
    "execute_command",
    "network_request",
    "modify_database",
    "send_email",
    "call_api",
];

/// Risky tools additionally permitted in staging.
pub const STAGING_RISKY_TOOLS: &[&str] = &["write_file", "network_request"];

pub const BLOCKED_TOOLS: &[&str] = &[
    "execute_arbitrary_code",
    "access_secrets",
    "modify_system",
    "disable_safety",
    "bypass_sandbox",
];

pub const REDACTION_MARKER: &str = "***REDACTED***";

pub const DEFAULT_RISKY_CONFIDENCE_THRESHOLD: f64 = 0.7;
pub const DEFAULT_MAX_ARGUMENT_DEPTH: usize = 32;

const INJECTION_PATTERNS: &[&str] = &[
    r"<script[^>]*>.*?</script>",
    r"javascript:",
    r"on\w+\s*=",
    r"eval\s*\(",
    r"exec\s*\(",
    r"__import__\s*\(",
    r"system\s*\(",
    r"\$\(.*?\)",
    r"`.*?`",
    r";\s*(rm|del|DROP|DELETE)\s+",
];

const SECRET_PATTERNS: &[&str] = &[
    r"api[_-]?key",
    r"secret",
    r"password",
    r"token",
    r"credential",
    r"private[_-]?key",
];

static INJECTION_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile_all(INJECTION_PATTERNS));
static SECRET_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile_all(SECRET_PATTERNS));

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(&format!("(?i){pattern}")).expect("tripwire pattern should be valid")
        })
        .collect()
}

/// Deployment environment; scopes which tools a plan may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Staging,
    Development,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Development => "development",
        }
    }

    /// Tools permitted in this environment, sorted.
    pub fn allowed_tools(self) -> BTreeSet<&'static str> {
        let mut tools: BTreeSet<&'static str> = SAFE_TOOLS.iter().copied().collect();
        match self {
            Environment::Production => {}
            Environment::Staging => tools.extend(STAGING_RISKY_TOOLS.iter().copied()),
            Environment::Development => tools.extend(RISKY_TOOLS.iter().copied()),
        }
        tools
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "staging" => Ok(Environment::Staging),
            "development" | "dev" => Ok(Environment::Development),
            other => Err(format!(
                "unknown environment '{other}' (expected production, staging or development)"
            )),
        }
    }
}

/// Policy evaluator for plans and realized tool outputs.
#[derive(Debug, Clone)]
pub struct SafetyGate {
    environment: Environment,
    risky_confidence_threshold: f64,
    max_argument_depth: usize,
}

impl SafetyGate {
    pub fn new(environment: Environment, risky_confidence_threshold: f64) -> Self {
        Self {
            environment,
            risky_confidence_threshold,
            max_argument_depth: DEFAULT_MAX_ARGUMENT_DEPTH,
        }
    }

    pub fn with_max_argument_depth(mut self, depth: usize) -> Self {
        self.max_argument_depth = depth;
        self
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Assess every step of `plan` and derive the overall status.
    pub fn assess_plan(&self, plan: &[PlanStep], confidence: f64) -> SafetyAssessment {
        let allowed = self.environment.allowed_tools();
        let mut blocked_tools = Vec::new();
        let mut reasons = Vec::new();
        let mut risk_flags = Vec::new();
        let mut sandbox_required = false;

        for step in plan {
            let tool = step.tool.as_str();

            if BLOCKED_TOOLS.contains(&tool) {
                blocked_tools.push(step.tool.clone());
                reasons.push(format!("Tool '{tool}' is in blocked list"));
                continue;
            }

            if !is_known_tool(tool) {
                blocked_tools.push(step.tool.clone());
                reasons.push(format!("Unknown tool '{tool}' - not in allowlist"));
                continue;
            }

            if !allowed.contains(tool) {
                blocked_tools.push(step.tool.clone());
                reasons.push(format!(
                    "Tool '{tool}' not allowed in {} environment",
                    self.environment
                ));
                continue;
            }

            let depth = payload_depth(&step.args);
            if depth > self.max_argument_depth {
                blocked_tools.push(step.tool.clone());
                reasons.push(format!(
                    "Arguments for '{tool}' nest {depth} levels deep (limit {})",
                    self.max_argument_depth
                ));
                risk_flags.push("malformed_arguments".to_string());
                continue;
            }

            let args_text = canonical_json_value(&payload_to_json(&step.args));

            let injections = check_injection(&args_text);
            if !injections.is_empty() {
                blocked_tools.push(step.tool.clone());
                reasons.extend(injections);
                risk_flags.push("injection_detected".to_string());
                continue;
            }

            let secrets = check_secrets(&args_text);
            if !secrets.is_empty() {
                blocked_tools.push(step.tool.clone());
                reasons.extend(secrets);
                risk_flags.push("secret_detected".to_string());
                continue;
            }

            if RISKY_TOOLS.contains(&tool) && confidence < self.risky_confidence_threshold {
                sandbox_required = true;
                reasons.push(format!(
                    "Risky tool '{tool}' requires sandbox rehearsal (confidence {confidence:.2} < {})",
                    self.risky_confidence_threshold
                ));
            }
        }

        let status = if !blocked_tools.is_empty() {
            SafetyStatus::Blocked
        } else if sandbox_required {
            SafetyStatus::Sandboxed
        } else {
            SafetyStatus::Allowed
        };

        SafetyAssessment {
            status,
            allowed_tools: allowed.into_iter().map(str::to_string).collect(),
            blocked_tools,
            reasons,
            risk_flags,
            sandbox_required,
        }
    }

    /// Rerun the injection and secret tripwires against a realized output.
    ///
    /// Returns the violation messages; empty means the output is clean.
    pub fn assess_tool_output(&self, output: &str) -> Vec<String> {
        let mut violations = check_injection(output);
        violations.extend(check_secrets(output));
        violations
    }
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self::new(Environment::default(), DEFAULT_RISKY_CONFIDENCE_THRESHOLD)
    }
}

pub fn is_known_tool(tool: &str) -> bool {
    SAFE_TOOLS.contains(&tool) || RISKY_TOOLS.contains(&tool)
}

fn check_injection(text: &str) -> Vec<String> {
    INJECTION_RES
        .iter()
        .zip(INJECTION_PATTERNS)
        .filter(|(re, _)| re.is_match(text))
        .map(|(_, pattern)| format!("Injection pattern detected: {pattern}"))
        .collect()
}

fn check_secrets(text: &str) -> Vec<String> {
    SECRET_RES
        .iter()
        .zip(SECRET_PATTERNS)
        .filter(|(re, _)| re.is_match(text))
        .map(|(_, pattern)| format!("Potential secret detected: {pattern}"))
        .collect()
}

fn is_secret_key(key: &str) -> bool {
    SECRET_RES.iter().any(|re| re.is_match(key))
}

/// Copy of `payload` with every secret-named value replaced by [`REDACTION_MARKER`].
///
/// Recurses into nested maps and into maps inside lists.
pub fn redact_secrets(payload: &Payload) -> Payload {
    payload
        .iter()
        .map(|(key, value)| {
            let redacted = if is_secret_key(key) {
                Value::String(REDACTION_MARKER.to_string())
            } else {
                redact_value(value)
            };
            (key.clone(), redacted)
        })
        .collect()
}

fn redact_value(value: &Value) -> Value {
    match value {
        Value::Map(map) => Value::Map(redact_secrets(map)),
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|item| match item {
                    Value::Map(map) => Value::Map(redact_secrets(map)),
                    other => other.clone(),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Dry-run stand-in for a risky step; no tool is invoked.
pub fn sandbox_rehearsal(step: &PlanStep) -> Payload {
    let mut rehearsal = Payload::new();
    rehearsal.insert("tool".to_string(), Value::from(step.tool.as_str()));
    rehearsal.insert("args".to_string(), Value::Map(step.args.clone()));
    rehearsal.insert("simulated".to_string(), Value::Bool(true));
    rehearsal.insert(
        "expected_outcome".to_string(),
        Value::from(step.expected_outcome.as_str()),
    );
    rehearsal.insert("status".to_string(), Value::from("rehearsal_completed"));
    rehearsal.insert(
        "notes".to_string(),
        Value::from("Sandbox rehearsal only; no tool was executed"),
    );
    rehearsal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{payload, plan_step};
    use serde_json::json;

    fn dev_gate() -> SafetyGate {
        SafetyGate::new(Environment::Development, DEFAULT_RISKY_CONFIDENCE_THRESHOLD)
    }

    /// One hard-blocked tool blocks the whole plan, whatever the other steps are.
    #[test]
    fn hard_blocked_tool_blocks_plan() {
        let plan = vec![
            plan_step("read_file", payload(json!({"path": "/a"}))),
            plan_step("disable_safety", Payload::new()),
        ];
        for confidence in [0.0, 0.5, 1.0] {
            let assessment = dev_gate().assess_plan(&plan, confidence);
            assert_eq!(assessment.status, SafetyStatus::Blocked);
            assert_eq!(assessment.blocked_tools, vec!["disable_safety".to_string()]);
            assert!(assessment.reasons[0].contains("blocked list"));
        }
    }

    /// Safe tools with clean arguments are allowed at any confidence.
    #[test]
    fn safe_plan_is_allowed_for_any_confidence() {
        let plan = vec![
            plan_step("validate_json", payload(json!({"data": {"a": 1}}))),
            plan_step("analyze_data", payload(json!({"data": [1, 2, 3]}))),
        ];
        let gate = SafetyGate::default();
        for confidence in [0.0, 0.3, 0.69, 0.7, 1.0] {
            let assessment = gate.assess_plan(&plan, confidence);
            assert_eq!(assessment.status, SafetyStatus::Allowed);
            assert!(!assessment.sandbox_required);
            assert!(assessment.reasons.is_empty());
        }
    }

    /// Risky tool below the threshold is sandboxed; at the threshold it is allowed.
    #[test]
    fn risky_tool_below_threshold_is_sandboxed() {
        let plan = vec![plan_step("write_file", payload(json!({"path": "/tmp/out"})))];
        let low = dev_gate().assess_plan(&plan, 0.69);
        assert_eq!(low.status, SafetyStatus::Sandboxed);
        assert!(low.sandbox_required);
        assert!(low.blocked_tools.is_empty());

        let at = dev_gate().assess_plan(&plan, 0.7);
        assert_eq!(at.status, SafetyStatus::Allowed);
    }

    #[test]
    fn unknown_tool_is_not_in_allowlist() {
        let plan = vec![plan_step("summon_daemon", Payload::new())];
        let assessment = dev_gate().assess_plan(&plan, 1.0);
        assert_eq!(assessment.status, SafetyStatus::Blocked);
        assert!(assessment.reasons[0].contains("not in allowlist"));
    }

    /// Production allows only safe tools; staging adds a narrow risky subset.
    #[test]
    fn environment_scopes_risky_tools() {
        let write = vec![plan_step("write_file", Payload::new())];
        let delete = vec![plan_step("delete_file", Payload::new())];

        let prod = SafetyGate::new(Environment::Production, 0.7);
        let assessment = prod.assess_plan(&write, 1.0);
        assert_eq!(assessment.status, SafetyStatus::Blocked);
        assert!(assessment.reasons[0].contains("not allowed in production environment"));

        let staging = SafetyGate::new(Environment::Staging, 0.7);
        assert_eq!(staging.assess_plan(&write, 1.0).status, SafetyStatus::Allowed);
        assert_eq!(staging.assess_plan(&delete, 1.0).status, SafetyStatus::Blocked);
        assert_eq!(dev_gate().assess_plan(&delete, 1.0).status, SafetyStatus::Allowed);
    }

    #[test]
    fn injection_in_arguments_is_blocked() {
        let plan = vec![plan_step(
            "format_text",
            payload(json!({"text": "<script>alert(1)</script>"})),
        )];
        let assessment = dev_gate().assess_plan(&plan, 1.0);
        assert_eq!(assessment.status, SafetyStatus::Blocked);
        assert_eq!(assessment.risk_flags, vec!["injection_detected".to_string()]);
        assert!(
            assessment
                .reasons
                .iter()
                .all(|reason| reason.starts_with("Injection pattern detected"))
        );
    }

    /// Destructive shell suffixes are caught case-insensitively.
    #[test]
    fn destructive_command_suffix_is_blocked() {
        let plan = vec![plan_step(
            "search_text",
            payload(json!({"query": "x; DROP table users"})),
        )];
        let assessment = SafetyGate::default().assess_plan(&plan, 1.0);
        assert_eq!(assessment.status, SafetyStatus::Blocked);
        assert!(assessment.risk_flags.contains(&"injection_detected".to_string()));
    }

    #[test]
    fn secret_in_arguments_is_blocked() {
        let plan = vec![plan_step("read_file", payload(json!({"api_key": "abc"})))];
        let assessment = SafetyGate::default().assess_plan(&plan, 1.0);
        assert_eq!(assessment.status, SafetyStatus::Blocked);
        assert_eq!(assessment.risk_flags, vec!["secret_detected".to_string()]);
    }

    /// Blocked outranks sandboxed when both occur in one plan.
    #[test]
    fn blocked_takes_precedence_over_sandboxed() {
        let plan = vec![
            plan_step("write_file", Payload::new()),
            plan_step("bypass_sandbox", Payload::new()),
        ];
        let assessment = dev_gate().assess_plan(&plan, 0.1);
        assert_eq!(assessment.status, SafetyStatus::Blocked);
        assert!(assessment.sandbox_required);
    }

    #[test]
    fn overly_nested_arguments_are_malformed() {
        let gate = SafetyGate::default().with_max_argument_depth(2);
        let plan = vec![plan_step("parse_data", payload(json!({"a": {"b": {"c": 1}}})))];
        let assessment = gate.assess_plan(&plan, 1.0);
        assert_eq!(assessment.status, SafetyStatus::Blocked);
        assert_eq!(assessment.risk_flags, vec!["malformed_arguments".to_string()]);
    }

    #[test]
    fn allowed_tools_are_sorted_and_environment_scoped() {
        let assessment = SafetyGate::default().assess_plan(&[], 1.0);
        assert_eq!(assessment.status, SafetyStatus::Allowed);
        let mut sorted = assessment.allowed_tools.clone();
        sorted.sort();
        assert_eq!(assessment.allowed_tools, sorted);
        assert_eq!(assessment.allowed_tools.len(), SAFE_TOOLS.len());
    }

    #[test]
    fn tool_output_tripwires_report_violations() {
        let gate = SafetyGate::default();
        assert!(gate.assess_tool_output("validated 3 fields").is_empty());
        let violations = gate.assess_tool_output("run `whoami` with password=x");
        assert_eq!(violations.len(), 2);
    }

    /// Secret-named keys are redacted at every depth, including maps inside lists.
    #[test]
    fn redact_secrets_walks_nested_structures() {
        let input = payload(json!({
            "user": "ada",
            "Password": "hunter2",
            "nested": {"api-key": "k", "keep": 1},
            "items": [{"token": "t"}, "plain"]
        }));
        let redacted = redact_secrets(&input);
        let json = payload_to_json(&redacted);
        assert_eq!(json["user"], "ada");
        assert_eq!(json["Password"], REDACTION_MARKER);
        assert_eq!(json["nested"]["api-key"], REDACTION_MARKER);
        assert_eq!(json["nested"]["keep"], 1);
        assert_eq!(json["items"][0]["token"], REDACTION_MARKER);
        assert_eq!(json["items"][1], "plain");
        assert_eq!(input["Password"], Value::from("hunter2"));
    }

    #[test]
    fn sandbox_rehearsal_is_simulated() {
        let step = plan_step("write_file", payload(json!({"path": "/tmp/x"})));
        let rehearsal = sandbox_rehearsal(&step);
        assert_eq!(rehearsal["simulated"], Value::Bool(true));
        assert_eq!(rehearsal["status"], Value::from("rehearsal_completed"));
        assert_eq!(rehearsal["tool"], Value::from("write_file"));
    }

    #[test]
    fn environment_parses_aliases() {
        assert_eq!("dev".parse::<Environment>(), Ok(Environment::Development));
        assert_eq!("Staging".parse::<Environment>(), Ok(Environment::Staging));
        assert!("moon".parse::<Environment>().is_err());
    }
}
