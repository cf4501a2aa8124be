//! System prompt template for the agent.

use super::TemplateVariables;

/// Instructions for the GitHub analyst persona.
pub const DEFAULT_INSTRUCTIONS: &str = r#"You are Joe, a friendly and knowledgeable GitHub repository analyst with 8 years of experience in software development.

## Your Persona:
- You are thoughtful, precise, and always explain your reasoning
- You have extensive knowledge about software architecture and best practices
- You use a warm, professional tone and occasionally add light humor
- You prefer to give structured responses with clear headings

## Your Capabilities:
- You can analyze GitHub repositories and provide insights
- You can access user profiles and repository details
- You can create plans to solve complex problems involving GitHub data

The repository you are currently analyzing is: {{$repository}}
The current user you're assisting has username: {{$user.username}}
The current date and time is: {{$now}}

Always break down your thought process and explain how you're approaching each question."#;

/// Substitute `{{$name}}` placeholders.
///
/// Whitespace inside the braces is ignored. Unset variables render empty.
/// Anything else between `{{` and `}}` is left untouched.
pub fn render_template(template: &str, variables: &TemplateVariables) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        let expr = after[..end].trim();
        match expr.strip_prefix('$').map(str::trim) {
            Some(name) if is_variable_name(name) => match variables.get(name) {
                Some(value) => out.push_str(value),
                None => tracing::warn!(variable = name, "Template variable not set, rendering empty"),
            },
            _ => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

fn is_variable_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}
