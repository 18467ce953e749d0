//! Text-generation collaborator contract and plan prompt rendering.
//!
//! Generation is optional: without a [`TextGenerator`] the cycle plans with
//! the deterministic rules in [`crate::core::planner`].

use std::rc::Rc;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::planner::parse_generated_plan;
use crate::core::signing::canonical_json_value;
use crate::core::types::{PlanStep, WorldConstraint};
use crate::core::value::{Payload, payload_to_json};

const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");

/// External text generator (e.g. an LLM client).
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> Result<String>;
}

impl<T: TextGenerator + ?Sized> TextGenerator for Rc<T> {
    fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt)
    }
}

/// Inputs to the plan prompt.
#[derive(Debug, Clone)]
pub struct PlanPromptInputs<'a> {
    pub goal: &'a str,
    pub world_summary: &'a str,
    pub constraints: Vec<&'a WorldConstraint>,
    pub allowed_tools: Vec<String>,
    pub input_data: &'a Payload,
}

#[derive(Debug, Serialize)]
struct ConstraintContext<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    description: &'a str,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("plan", PLAN_TEMPLATE)
            .expect("plan template should be valid");
        Self { env }
    }

    pub fn render_plan(&self, input: &PlanPromptInputs<'_>) -> Result<String> {
        let constraints: Vec<ConstraintContext<'_>> = input
            .constraints
            .iter()
            .map(|constraint| ConstraintContext {
                kind: &constraint.kind,
                description: &constraint.description,
            })
            .collect();
        let template = self.env.get_template("plan")?;
        let rendered = template.render(context! {
            goal => input.goal.trim(),
            world_summary => input.world_summary.trim(),
            constraints => &constraints,
            allowed_tools => &input.allowed_tools,
            input_data => canonical_json_value(&payload_to_json(input.input_data)),
        })?;
        Ok(rendered)
    }
}

/// Render the plan prompt, ask `generator`, and parse its reply.
pub fn generate_plan(
    generator: &dyn TextGenerator,
    engine: &PromptEngine,
    input: &PlanPromptInputs<'_>,
) -> Result<Vec<PlanStep>> {
    let prompt = engine.render_plan(input)?;
    debug!(prompt_len = prompt.len(), "requesting generated plan");
    let reply = generator.generate(&prompt).context("generate plan")?;
    let plan = parse_generated_plan(&reply).context("parse generated plan")?;
    debug!(steps = plan.len(), "parsed generated plan");
    Ok(plan)
}
