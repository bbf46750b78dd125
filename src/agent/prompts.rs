use crate::actions;
use crate::agent::state::AgentStep;

/// How many prior steps the model gets to see.
const HISTORY_TAIL: usize = 5;

const SYSTEM_PROMPT_CORE: &str = "\
You are an AI agent controlling an Android device. You observe the screen \
through screenshots and a numbered list of UI elements, and act through \
registered actions to accomplish the user's task.

Rules:
1. Analyze the screenshot and the element list before acting.
2. Choose the most direct action that progresses toward the goal.
3. Use the coordinates (x, y) from the element list for tap actions.
4. After an action that loads new content, wait before acting again.
5. If stuck, try an alternative: scroll, go back, or pick a different element.
6. Never repeat an action that already failed twice.

Respond with a single JSON object:
{
    \"thought\": \"analysis of the current state and the next action\",
    \"done\": false,
    \"action\": {\"name\": \"action_name\", \"params\": { ... }}
}

When the task is complete:
{
    \"thought\": \"why the goal is achieved\",
    \"done\": true,
    \"result\": \"what was accomplished\"
}";

/// Full system prompt: behavior rules plus the registered action list.
pub fn system_prompt() -> String {
    format!("{SYSTEM_PROMPT_CORE}\n\n{}", actions::actions_prompt())
}

/// Everything the per-step prompt needs about the current observation.
pub struct StepContext<'a> {
    pub task: &'a str,
    pub step: u32,
    pub max_steps: u32,
    pub screen: (u32, u32),
    pub current_app: Option<&'a str>,
    pub elements: &'a str,
    pub history: &'a [AgentStep],
}

/// Per-step user prompt bundling the task, device state, visible elements
/// and the tail of the action history.
pub fn build_step_prompt(ctx: &StepContext<'_>) -> String {
    let tail = &ctx.history[ctx.history.len().saturating_sub(HISTORY_TAIL)..];
    let history_text = if tail.is_empty() {
        "None".to_string()
    } else {
        tail.iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {}: {} - {}", i + 1, s.action, s.params, s.outcome()))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "## Current Task\n{task}\n\n\
         ## Step {step}/{max_steps}\n\n\
         ## Device State\n\
         Screen Size: {width}x{height}\n\
         Current App: {app}\n\n\
         ## UI Elements\n{elements}\n\n\
         ## Previous Actions\n{history_text}\n\n\
         Based on the screenshot and the element list, determine the next \
         action to progress toward the goal.",
        task = ctx.task,
        step = ctx.step,
        max_steps = ctx.max_steps,
        width = ctx.screen.0,
        height = ctx.screen.1,
        elements = ctx.elements,
        app = ctx.current_app.unwrap_or("unknown"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(n: u32, action: &str) -> AgentStep {
        AgentStep {
            step_num: n,
            timestamp: chrono::Utc::now(),
            action: action.into(),
            params: serde_json::json!({"x": n}),
            reasoning: String::new(),
            success: true,
            error: None,
            duration_secs: 0.1,
        }
    }

    #[test]
    fn system_prompt_names_the_response_contract() {
        let prompt = system_prompt();
        assert!(prompt.contains("\"thought\""));
        assert!(prompt.contains("\"done\""));
        assert!(prompt.contains("Available Actions:"));
        assert!(prompt.contains("type_text"));
    }

    #[test]
    fn empty_history_renders_as_none() {
        let prompt = build_step_prompt(&StepContext {
            task: "open wifi",
            step: 1,
            max_steps: 20,
            screen: (1080, 2400),
            current_app: None,
            elements: "  [0] WiFi",
            history: &[],
        });
        assert!(prompt.contains("## Previous Actions\nNone"));
        assert!(prompt.contains("Screen Size: 1080x2400"));
        assert!(prompt.contains("Current App: unknown"));
        assert!(prompt.contains("## Step 1/20"));
    }

    #[test]
    fn history_keeps_only_the_newest_five() {
        let history: Vec<AgentStep> = (1..=7).map(|n| step(n, "tap")).collect();
        let prompt = build_step_prompt(&StepContext {
            task: "t",
            step: 8,
            max_steps: 20,
            screen: (1080, 2400),
            current_app: Some("com.android.settings"),
            elements: "",
            history: &history,
        });
        // Steps 3..=7 survive, renumbered 1..=5.
        assert!(prompt.contains(r#"1. tap: {"x":3} - success"#));
        assert!(prompt.contains(r#"5. tap: {"x":7} - success"#));
        assert!(!prompt.contains(r#"{"x":2}"#));
        assert!(prompt.contains("Current App: com.android.settings"));
    }
}
