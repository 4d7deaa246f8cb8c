//! Supervisor system prompt

use crate::state::Members;

/// Template for the supervisor prompt. `{members}`, `{roster}` and `{finish}`
/// are replaced at render time.
pub const SUPERVISOR_PROMPT: &str = r#"You are a supervisor managing a team of workers: {members}.

## Workers
{roster}

## Your Role
- Coordinate the workers to fulfill the user's request, based on the full
  conversation history and any prior worker outputs
- If the request covers several distinct subjects (e.g. different financial
  instruments), make sure each subject is processed independently
- Each worker completes a discrete subtask and reports back with its result
- Continually evaluate which worker should act next

## Finishing
- Once all necessary information is gathered and the report has been written,
  respond with {finish}
- If a subject cannot be reported on reliably because critical data is
  missing, finish rather than looping

## Output Format
Respond with a single JSON object and nothing else:

```
{"next": "<one of: {members} or {finish}>", "reason": "<one sentence>"}
```
"#;

/// Render the supervisor prompt for a graph's members
pub fn render_supervisor_prompt(members: &Members) -> String {
    let names: Vec<&str> = members.names().collect();
    let roster: Vec<String> = names
        .iter()
        .map(|name| match members.description(name) {
            Some(description) => format!("- {}: {}", name, description),
            None => format!("- {}", name),
        })
        .collect();

    SUPERVISOR_PROMPT
        .replace("{members}", &names.join(", "))
        .replace("{roster}", &roster.join("\n"))
        .replace("{finish}", members.finish_keyword())
}
