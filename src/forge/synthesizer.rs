//! Synthesis Orchestrator (drafting loop)
//!
//! Drives a bounded conversation with the model: seed prompt, reply, syntax
//! probe of the extracted candidate, and compiler-style feedback on failure.
//! The loop stops as soon as a candidate probes clean or the step budget
//! runs out; the last reply is returned either way and the pipeline's
//! validation gate has the final say.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::extract::extract_candidate;
use super::spec::CapabilitySpec;
use super::validate::{GrammarChecker, SyntaxChecker};
use super::ForgeError;
use crate::agent::{ChatMessage, LLMProvider};
use crate::utils::clip_middle;

pub const DEFAULT_MAX_STEPS: usize = 5;

const GENERATION_DIRECTIVE: &str = "You are a tool generation agent. You are given a description of a tool and you write the Python code for it.
Rules:
1. Write a function that takes the specified inputs and returns the specified outputs (a tuple when there is more than one).
2. Also write an asynchronous function named `run` that takes the same inputs in the same order and returns the function's result. The host only ever calls `run`.
3. `run` always receives its inputs as strings. Parse numbers, lists or structured values inside `run` before using them.
4. Never include example usage, tests, `if __name__ == \"__main__\":` blocks or calls to input(). The code runs in production as written.
5. You may import third-party packages. If a pip package name differs from its import name, end the code with a comment line `# install modules: <pip names separated by spaces>`.
6. Return the complete code in one ```python fenced block. If you correct yourself, label each attempt `Step N:` and put the full final code in the last step.";

const RETOOL_DIRECTIVE: &str = "You are a retooling agent. You are given the previous iteration of a tool and a description of what must change. Rebuild the tool with those changes, keeping whatever already works.";

const EMPTY_CANDIDATE_FEEDBACK: &str =
    "No code found in your reply. Return the complete code in a single ```python fenced block.";

/// Which pipeline the draft is for
#[derive(Debug, Clone, Copy)]
pub enum SynthesisRequest<'a> {
    Create,
    Revise {
        prior_logic: &'a str,
        feedback: &'a str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisState {
    Drafting,
    Done,
}

/// Result of a drafting session
#[derive(Debug, Clone)]
pub struct Draft {
    /// Last raw model reply
    pub reply: String,
    pub steps: usize,
    /// Whether the last candidate passed the probe
    pub accepted: bool,
    pub history: Vec<ChatMessage>,
}

pub struct Synthesizer {
    provider: Arc<dyn LLMProvider>,
    model: String,
    checker: Arc<dyn SyntaxChecker>,
    max_steps: usize,
}

impl Synthesizer {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            checker: Arc::new(GrammarChecker::new()),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_checker(mut self, checker: Arc<dyn SyntaxChecker>) -> Self {
        self.checker = checker;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn checker(&self) -> &Arc<dyn SyntaxChecker> {
        &self.checker
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn directive(request: &SynthesisRequest<'_>) -> String {
        match request {
            SynthesisRequest::Create => GENERATION_DIRECTIVE.to_string(),
            SynthesisRequest::Revise { .. } => format!("{}\n{}", RETOOL_DIRECTIVE, GENERATION_DIRECTIVE),
        }
    }

    pub fn seed_prompt(spec: &CapabilitySpec, request: &SynthesisRequest<'_>) -> String {
        let mut prompt = format!(
            "name: \"{}\"\ntitle: \"{}\"\ndescription: \"{}\"\ninput: \"{}\"\noutput: \"{}\"",
            spec.identity,
            spec.title(),
            spec.description,
            CapabilitySpec::render_params(&spec.inputs),
            CapabilitySpec::render_params(&spec.outputs),
        );

        if let SynthesisRequest::Revise { prior_logic, feedback } = request {
            prompt.push_str(&format!(
                "\n\nPrevious iteration:\n```python\n{}\n```\n\nRequested changes:\n{}",
                prior_logic, feedback
            ));
        }
        prompt
    }

    /// Run the drafting loop for `spec`
    pub async fn draft(&self, spec: &CapabilitySpec, request: SynthesisRequest<'_>) -> Result<Draft, ForgeError> {
        let system = Self::directive(&request);
        let mut history = vec![ChatMessage::user(Self::seed_prompt(spec, &request))];
        let mut state = SynthesisState::Drafting;
        let mut reply = String::new();
        let mut steps = 0;

        while state == SynthesisState::Drafting && steps < self.max_steps {
            steps += 1;
            debug!("Drafting '{}' step {}/{}", spec.identity, steps, self.max_steps);

            reply = self
                .provider
                .complete(&self.model, &system, &history)
                .await
                .map_err(|e| ForgeError::Provider(e.to_string()))?;
            history.push(ChatMessage::assistant(reply.clone()));

            let candidate = extract_candidate(&reply);
            if candidate.is_empty() {
                warn!("Step {} for '{}' produced no code", steps, spec.identity);
                history.push(ChatMessage::tool(EMPTY_CANDIDATE_FEEDBACK));
                continue;
            }

            match self.checker.check(&candidate).await {
                Ok(()) => state = SynthesisState::Done,
                Err(ForgeError::StructuralValidationFailed(diagnostic)) => {
                    info!("Step {} for '{}' failed the syntax probe: {}", steps, spec.identity, diagnostic);
                    history.push(ChatMessage::tool(diagnostic.render_feedback()));
                }
                Err(other) => return Err(other),
            }
        }

        if state == SynthesisState::Drafting {
            warn!(
                "Step budget exhausted for '{}'; last reply: {}",
                spec.identity,
                clip_middle(&reply, 400)
            );
        }

        Ok(Draft {
            reply,
            steps,
            accepted: state == SynthesisState::Done,
            history,
        })
    }
}
