// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt assembly for agent launch and heartbeats.

use crate::config::ProviderConfig;
use ta_core::{Lane, Task};

/// The prompt pasted into a fresh pane after the provider CLI warms up:
/// identity, lane context, the task itself, and the marker contract.
pub fn launch_prompt(task: &Task, lane: Option<&Lane>, provider: &ProviderConfig) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "You are an autonomous coding agent (id {}) working on the task below.\n",
        task.id
    ));
    if let Some(instructions) = lane.and_then(|l| l.context_instructions.as_deref()) {
        prompt.push_str(instructions);
        prompt.push('\n');
    }
    if !task.role.is_empty() {
        prompt.push_str(&format!("Your role: {}.\n", task.role));
    }
    prompt.push_str(&format!("\nTask: {}\n", task.title));
    if !task.description.is_empty() {
        prompt.push_str(&format!("{}\n", task.description));
    }
    prompt.push('\n');
    prompt.push_str(&provider.heartbeat_prompt);
    prompt.push('\n');
    prompt.push_str(&provider.completion_instructions);
    prompt.push('\n');
    prompt
}

/// The periodic heartbeat pasted when an agent has been quiet too long.
/// Wording is provider-specific configuration, not code.
pub fn heartbeat_prompt(provider: &ProviderConfig) -> String {
    provider.heartbeat_prompt.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ta_core::Lane;

    #[test]
    fn launch_prompt_carries_task_and_contract() {
        let task = ta_core::Task::new("Add rate limit", 0)
            .description("limit requests per client")
            .role("coder");
        let lane = Lane::new("dev", 0).context_instructions("Repo uses tokio.");
        let prompt = launch_prompt(&task, Some(&lane), &ProviderConfig::default());

        assert!(prompt.contains(task.id.as_str()));
        assert!(prompt.contains("Repo uses tokio."));
        assert!(prompt.contains("Your role: coder."));
        assert!(prompt.contains("Add rate limit"));
        assert!(prompt.contains("limit requests per client"));
        assert!(prompt.contains("<task-progress>"));
        assert!(prompt.contains("<promise>DONE</promise>"));
    }

    #[test]
    fn heartbeat_is_provider_wording() {
        let mut provider = ProviderConfig::default();
        provider.heartbeat_prompt = "status please".into();
        assert_eq!(heartbeat_prompt(&provider), "status please");
    }

    #[test]
    fn completion_wording_comes_from_the_provider() {
        let mut provider = ProviderConfig::default();
        provider.completion_instructions = "say the magic word when finished".into();
        let prompt = launch_prompt(&ta_core::Task::new("t", 0), None, &provider);
        assert!(prompt.contains("say the magic word when finished"));
        assert!(!prompt.contains("<promise>DONE</promise>"));
    }
}
