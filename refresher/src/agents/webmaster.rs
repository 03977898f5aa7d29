//! Webmaster agent: produces the fragment for one run.
//!
//! Whatever happens inside, [`WebmasterAgent::produce`] returns a fragment
//! that is valid either by construction (counter and fallback templates) or
//! because it passed the validator.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::fragment::{FALLBACK_FRAGMENT, claimed_counter, counter_fragment, strip_code_fence};
use crate::core::types::{Fragment, Mode, Strategy, Usage, ValidationOutcome};
use crate::core::validator::FragmentValidator;
use crate::io::backend::{CompletionRequest, TextBackend};
use crate::io::prompt::{PromptBuilder, PromptInputs, PromptPack};
use crate::io::state_store::RunState;

/// Backend and content limits for one agent.
#[derive(Debug, Clone)]
pub struct WebmasterConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub max_fragment_bytes: usize,
    pub prompt_budget_bytes: usize,
}

/// Result of one `produce` call.
#[derive(Debug, Clone)]
pub struct Generation {
    pub fragment: Fragment,
    pub strategy: Strategy,
    pub validation: ValidationOutcome,
    /// Counter value this run commits.
    pub next_counter: u64,
    /// First integer found in an accepted generated fragment. Recorded only.
    pub claimed_counter: Option<u64>,
    pub usage: Option<Usage>,
    /// Failure reasons absorbed by the fallback path, plus notes.
    pub diagnostics: Vec<String>,
    /// Prompt sent to the backend, if one was built.
    pub prompt: Option<PromptPack>,
}

/// Fragment generator owning the system prompt and the validator.
#[derive(Debug, Clone)]
pub struct WebmasterAgent {
    config: WebmasterConfig,
    system_prompt: String,
    validator: FragmentValidator,
}

impl WebmasterAgent {
    pub fn new(config: WebmasterConfig, system_prompt: String, validator: FragmentValidator) -> Self {
        Self {
            config,
            system_prompt,
            validator,
        }
    }

    pub fn produce<B: TextBackend>(
        &self,
        backend: &B,
        state: &RunState,
        current_fragment: &str,
        mode: Mode,
    ) -> Generation {
        let next_counter = state.counter.saturating_add(1);
        match mode {
            Mode::Counter => Generation {
                fragment: Fragment::deterministic(counter_fragment(next_counter)),
                strategy: Strategy::Counter,
                validation: ValidationOutcome::NotRequired,
                next_counter,
                claimed_counter: None,
                usage: None,
                diagnostics: Vec::new(),
                prompt: None,
            },
            Mode::Llm => self.generate(backend, state, current_fragment, next_counter),
        }
    }

    fn generate<B: TextBackend>(
        &self,
        backend: &B,
        state: &RunState,
        current_fragment: &str,
        next_counter: u64,
    ) -> Generation {
        let inputs = PromptInputs {
            current_fragment: current_fragment.to_string(),
            iteration: state.iteration.saturating_add(1),
            counter: state.counter,
            max_fragment_bytes: self.config.max_fragment_bytes,
        };
        let prompt = match PromptBuilder::new(self.config.prompt_budget_bytes)
            .build(&self.system_prompt, &inputs)
        {
            Ok(prompt) => prompt,
            Err(err) => {
                return fallback(
                    next_counter,
                    "prompt",
                    format!("prompt build failed: {err:#}"),
                    ValidationOutcome::NotReached,
                    None,
                    None,
                );
            }
        };

        let request = CompletionRequest {
            model: self.config.model.clone(),
            system: prompt.system.clone(),
            user: prompt.user.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            timeout: self.config.timeout,
        };
        let completion = match backend.complete(&request) {
            Ok(completion) => completion,
            Err(err) => {
                return fallback(
                    next_counter,
                    err.reason(),
                    format!("backend failed: {err}"),
                    ValidationOutcome::NotReached,
                    Some(prompt),
                    None,
                );
            }
        };

        let candidate = strip_code_fence(&completion.text);
        if candidate.len() > self.config.max_fragment_bytes {
            let detail = format!(
                "fragment of {} bytes exceeds {} byte cap",
                candidate.len(),
                self.config.max_fragment_bytes
            );
            return fallback(
                next_counter,
                "too_large",
                format!("validation failed: {detail}"),
                ValidationOutcome::Rejected(detail),
                Some(prompt),
                completion.usage,
            );
        }

        match self.validator.check(candidate) {
            Ok(valid) => {
                let claimed = claimed_counter(valid);
                let mut diagnostics = Vec::new();
                if let Some(claimed) = claimed.filter(|c| *c != next_counter) {
                    debug!(claimed, next_counter, "ignoring counter claimed by backend");
                    diagnostics.push(format!(
                        "backend claimed counter {claimed}; kept {next_counter}"
                    ));
                }
                info!(bytes = valid.len(), "generated fragment accepted");
                Generation {
                    fragment: Fragment::generated(valid),
                    strategy: Strategy::Llm,
                    validation: ValidationOutcome::Passed,
                    next_counter,
                    claimed_counter: claimed,
                    usage: completion.usage,
                    diagnostics,
                    prompt: Some(prompt),
                }
            }
            Err(rejection) => fallback(
                next_counter,
                rejection.reason(),
                format!("validation failed: {rejection}"),
                ValidationOutcome::Rejected(rejection.to_string()),
                Some(prompt),
                completion.usage,
            ),
        }
    }
}

fn fallback(
    next_counter: u64,
    reason: &str,
    diagnostic: String,
    validation: ValidationOutcome,
    prompt: Option<PromptPack>,
    usage: Option<Usage>,
) -> Generation {
    warn!(reason, detail = %diagnostic, "using fallback fragment");
    Generation {
        fragment: Fragment::fallback(FALLBACK_FRAGMENT),
        strategy: Strategy::Fallback(reason.to_string()),
        validation,
        next_counter,
        claimed_counter: None,
        usage,
        diagnostics: vec![diagnostic],
        prompt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Provenance;
    use crate::core::validator::validate_fragment;
    use crate::io::backend::{BackendError, Completion};
    use std::cell::RefCell;

    const VALID: &str = r#"<div class="card"><h2>Autumn notes</h2><p><span id="last-updated"></span></p></div>"#;

    /// Replies with a fixed result and records every request.
    struct CapturingBackend {
        reply: RefCell<Option<Result<Completion, BackendError>>>,
        requests: RefCell<Vec<CompletionRequest>>,
    }

    impl CapturingBackend {
        fn text(text: &str) -> Self {
            Self::with(Ok(Completion {
                text: text.to_string(),
                usage: Some(Usage {
                    prompt_tokens: 100,
                    completion_tokens: 20,
                    total_tokens: 120,
                }),
            }))
        }

        fn with(reply: Result<Completion, BackendError>) -> Self {
            Self {
                reply: RefCell::new(Some(reply)),
                requests: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requests.borrow().len()
        }
    }

    impl TextBackend for CapturingBackend {
        fn complete(&self, request: &CompletionRequest) -> Result<Completion, BackendError> {
            self.requests.borrow_mut().push(request.clone());
            self.reply
                .borrow_mut()
                .take()
                .unwrap_or_else(|| Err(BackendError::Network("no scripted reply".to_string())))
        }
    }

    fn agent() -> WebmasterAgent {
        WebmasterAgent::new(
            WebmasterConfig {
                model: "test-model".to_string(),
                max_tokens: 600,
                temperature: 0.2,
                timeout: Duration::from_secs(7),
                max_fragment_bytes: 2_000,
                prompt_budget_bytes: 40_000,
            },
            "You are the webmaster.".to_string(),
            FragmentValidator::default(),
        )
    }

    fn state() -> RunState {
        RunState {
            counter: 4,
            iteration: 10,
        }
    }

    #[test]
    fn counter_mode_never_calls_backend() {
        let backend = CapturingBackend::text(VALID);
        let out = agent().produce(&backend, &state(), "<p>old</p>", Mode::Counter);

        assert_eq!(backend.calls(), 0);
        assert_eq!(out.strategy, Strategy::Counter);
        assert_eq!(out.fragment.provenance, Provenance::Deterministic);
        assert!(out.fragment.html.contains("Counter: 5"));
        assert_eq!(out.next_counter, 5);
        assert!(out.prompt.is_none());
    }

    #[test]
    fn accepted_generation_keeps_reply() {
        let backend = CapturingBackend::text(VALID);
        let out = agent().produce(&backend, &state(), "<p>old</p>", Mode::Llm);

        assert_eq!(out.strategy, Strategy::Llm);
        assert_eq!(out.validation, ValidationOutcome::Passed);
        assert_eq!(out.fragment, Fragment::generated(VALID));
        assert_eq!(out.usage.map(|u| u.total_tokens), Some(120));
        assert_eq!(out.claimed_counter, None);
    }

    #[test]
    fn request_carries_prompt_and_limits() {
        let backend = CapturingBackend::text(VALID);
        agent().produce(&backend, &state(), "<p>old content</p>", Mode::Llm);

        let requests = backend.requests.borrow();
        assert_eq!(requests.len(), 1, "exactly one attempt");
        let request = &requests[0];
        assert_eq!(request.model, "test-model");
        assert_eq!(request.system, "You are the webmaster.");
        assert!(request.user.contains("<p>old content</p>"));
        assert!(request.user.contains("iteration: 11"));
        assert_eq!(request.timeout, Duration::from_secs(7));
        assert_eq!(request.max_tokens, 600);
    }

    #[test]
    fn fenced_valid_reply_is_unwrapped() {
        let backend = CapturingBackend::text(&format!("```html\n{VALID}\n```"));
        let out = agent().produce(&backend, &state(), "", Mode::Llm);
        assert_eq!(out.strategy, Strategy::Llm);
        assert_eq!(out.fragment.html, VALID);
    }

    #[test]
    fn claimed_counter_is_recorded_not_applied() {
        let reply = VALID.replace("Autumn notes", "Counter: 900");
        let backend = CapturingBackend::text(&reply);
        let out = agent().produce(&backend, &state(), "", Mode::Llm);

        assert_eq!(out.strategy, Strategy::Llm);
        assert_eq!(out.claimed_counter, Some(900));
        assert_eq!(out.next_counter, 5);
        assert!(out.diagnostics.iter().any(|d| d.contains("claimed counter 900")));
    }

    /// Adversarial replies always collapse to the fixed fallback fragment.
    #[test]
    fn adversarial_replies_fall_back() {
        let oversized = format!(
            "<div><span id=\"last-updated\"></span>{}</div>",
            "<p>filler</p>".repeat(400)
        );
        let cases: Vec<(String, &str)> = vec![
            ("```html\n<div>no marker</div>\n```".to_string(), "marker_count"),
            (format!("{VALID}\n```"), "code_fence"),
            (format!("<!doctype html><html><body>{VALID}</body></html>"), "full_document"),
            ("<div>nothing here</div>".to_string(), "marker_count"),
            (format!("{VALID}{VALID}"), "marker_count"),
            (VALID.replace("Autumn notes", "Casino night"), "forbidden_term"),
            (format!("{VALID}<script>alert(1)</script>"), "forbidden_tag"),
            (format!("{VALID}<iframe src=\"https://x.test\"></iframe>"), "forbidden_tag"),
            (format!("{VALID}<img src=x onerror = \"alert(1)\">"), "scripting"),
            (format!("{VALID}<a onclick=\"alert(1)\">tap</a>"), "scripting"),
            (format!("{VALID}<a href=\"JaVaScRiPt&#58;alert(1)\">x</a>"), "scripting"),
            (
                r#"<div><span data-id="last-updated"></span></div>"#.to_string(),
                "marker_count",
            ),
            (oversized, "too_large"),
        ];

        for (reply, reason) in cases {
            let backend = CapturingBackend::text(&reply);
            let out = agent().produce(&backend, &state(), "<p>old</p>", Mode::Llm);

            assert_eq!(out.fragment.html, FALLBACK_FRAGMENT, "reply {reply:?}");
            assert_eq!(out.fragment.provenance, Provenance::Fallback);
            assert_eq!(out.strategy, Strategy::Fallback(reason.to_string()), "reply {reply:?}");
            assert!(matches!(out.validation, ValidationOutcome::Rejected(_)));
            assert_eq!(out.next_counter, 5);
            assert_eq!(backend.calls(), 1);
            assert!(validate_fragment(&out.fragment.html).is_ok());
        }
    }

    #[test]
    fn backend_errors_fall_back_without_retry() {
        let errors = vec![
            (BackendError::MissingApiKey { var: "OPENAI_API_KEY".to_string() }, "missing_api_key"),
            (BackendError::Auth("bad key".to_string()), "auth"),
            (BackendError::Quota("slow down".to_string()), "quota"),
            (BackendError::Timeout(Duration::from_secs(7)), "timeout"),
            (BackendError::Network("connection reset".to_string()), "network"),
        ];

        for (error, reason) in errors {
            let backend = CapturingBackend::with(Err(error));
            let out = agent().produce(&backend, &state(), "", Mode::Llm);

            assert_eq!(backend.calls(), 1);
            assert_eq!(out.fragment.html, FALLBACK_FRAGMENT);
            assert_eq!(out.strategy.to_string(), format!("fallback({reason})"));
            assert_eq!(out.validation, ValidationOutcome::NotReached);
            assert!(out.diagnostics[0].starts_with("backend failed: "));
            assert!(out.prompt.is_some());
        }
    }
}
