//! CLI command: `dsrouter inspect`
//!
//! Dry run of the request front half: pre-guard verdict, sanitized
//! prompt and routing decision. No provider is called.

use crate::loader::load_config;
use anyhow::Result;
use dsrouter_core::{GuardResult, PreGuard, RoutingDecision, RoutingEngine};
use dsrouter_llm::GenRequest;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Inspection {
    guard: GuardResult,
    sanitized_prompt: String,
    hard_problem_family: Option<&'static str>,
    decision: Option<RoutingDecision>,
}

/// Run the inspect subcommand.
pub fn run(prompt: &str, system: Option<&str>, rag_score: f32, json: bool) -> Result<()> {
    let config = load_config()?;
    let inspection = inspect(&config, prompt, system, rag_score);

    if json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
    } else {
        print_summary(&inspection);
    }
    Ok(())
}

fn inspect(
    config: &dsrouter_core::RouterConfig,
    prompt: &str,
    system: Option<&str>,
    rag_score: f32,
) -> Inspection {
    let mut request = GenRequest::new(prompt);
    if let Some(system) = system {
        request = request.with_system_prompt(system);
    }

    let (sanitized, guard) = PreGuard::new().check(&request);
    if guard.blocked {
        return Inspection {
            guard,
            sanitized_prompt: sanitized.prompt,
            hard_problem_family: None,
            decision: None,
        };
    }

    let routing = RoutingEngine::new(config);
    let family = routing.hard_problem_family(&sanitized.prompt);
    let decision = routing.decide(&sanitized.prompt, rag_score.clamp(0.0, 1.0));
    Inspection {
        guard,
        sanitized_prompt: sanitized.prompt,
        hard_problem_family: family,
        decision: Some(decision),
    }
}

fn print_summary(inspection: &Inspection) {
    println!();
    println!("  Pre-guard: {}", inspection.guard.status);
    if inspection.guard.blocked {
        println!("  Reason:    {}", inspection.guard.reason);
        println!();
        return;
    }
    println!("  Prompt:    {}", inspection.sanitized_prompt);
    if let Some(family) = inspection.hard_problem_family {
        println!("  Pattern:   {family}");
    }
    if let Some(decision) = &inspection.decision {
        println!("  Provider:  {}", decision.provider);
        println!("  Reason:    {}", decision.reasoning);
        if let Some(budget) = decision.cot_budget {
            println!("  CoT:       {budget} tokens");
        }
    }
    println!();
}
