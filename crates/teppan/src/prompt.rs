//! # Prompt Builder
//!
//! Turns a [`RowRecord`] into a [`PromptUnit`]: a short role-tagged dialog
//! carrying the row's identifier so results can be matched back later.
//!
//! The user message is a fixed instruction template:
//!
//! ```text
//! Architecture:
//! {architecture}
//!
//! Code:
//! {code}
//!
//! Performance:
//! {performance}
//!
//! {task}
//! ```

use serde::Serialize;
use crate::constant::TEMPLATE_FIELDS;
use crate::error::PromptError;
use crate::row::RowRecord;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// The engine-facing shape of a prompt: messages only, no identifier.
pub type Dialog = Vec<Message>;

/// A rendered prompt plus the identifier of the row it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptUnit {
    id: String,
    messages: Dialog,
}

impl PromptUnit {
    /// Fails unless at least one message has the user role.
    pub fn new(id: impl Into<String>, messages: Dialog) -> Result<Self, PromptError> {
        let id = id.into();
        if !messages.iter().any(|m| m.role == Role::User) {
            return Err(PromptError::NoUserMessage { id });
        }
        Ok(Self { id, messages })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}

/// Renders rows into prompt units, optionally prefixed by a system message.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    system_prompt: Option<String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn build(&self, row: &RowRecord) -> Result<PromptUnit, PromptError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(render_instruction(row)?));
        PromptUnit::new(row.id(), messages)
    }

    /// Build one unit per row, stopping at the first row that fails.
    pub fn build_all(&self, rows: &[RowRecord]) -> Result<Vec<PromptUnit>, PromptError> {
        rows.iter().map(|row| self.build(row)).collect()
    }
}

/// Interpolate the template fields of `row`, in template order.
pub fn render_instruction(row: &RowRecord) -> Result<String, PromptError> {
    let [architecture, code, performance, task] = TEMPLATE_FIELDS.map(|name| {
        row.field(name).ok_or_else(|| PromptError::MissingField {
            id: row.id().to_string(),
            field: name.to_string(),
        })
    });
    Ok(format!(
        "Architecture:\n{}\n\nCode:\n{}\n\nPerformance:\n{}\n\n{}\n",
        architecture?, code?, performance?, task?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str) -> RowRecord {
        RowRecord::new(
            id,
            [
                ("architecture", "Zen 4, 32MB L3"),
                ("code", "for x in v { sum += x; }"),
                ("performance", "2.1 GB/s"),
                ("task", "Explain the bottleneck."),
            ],
        )
    }

    #[test]
    fn test_template_field_order() {
        let unit = PromptBuilder::new().build(&row("a")).unwrap();

        assert_eq!(unit.messages().len(), 1);
        assert_eq!(unit.messages()[0].role, Role::User);
        assert_eq!(
            unit.messages()[0].content,
            "Architecture:\nZen 4, 32MB L3\n\nCode:\nfor x in v { sum += x; }\n\nPerformance:\n2.1 GB/s\n\nExplain the bottleneck.\n"
        );
    }

    #[test]
    fn test_identifier_round_trip() {
        for id in ["a", "row-17", "  spaced id ", "0"] {
            let unit = PromptBuilder::new().build(&row(id)).unwrap();
            assert_eq!(unit.id(), id);
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = PromptBuilder::new().with_system_prompt("Be brief.");
        let r = row("a");
        assert_eq!(builder.build(&r).unwrap(), builder.build(&r).unwrap());
    }

    #[test]
    fn test_system_prompt_leads() {
        let unit = PromptBuilder::new()
            .with_system_prompt("Answer as a performance engineer.")
            .build(&row("a"))
            .unwrap();

        let roles: Vec<Role> = unit.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);
        assert_eq!(unit.messages()[0].content, "Answer as a performance engineer.");
    }

    #[test]
    fn test_missing_field_is_fatal() {
        let incomplete = RowRecord::new("b", [("architecture", "x86"), ("code", "c"), ("task", "t")]);
        let err = PromptBuilder::new().build(&incomplete).unwrap_err();
        assert!(matches!(
            err,
            PromptError::MissingField { ref id, ref field } if id == "b" && field == "performance"
        ));

        let rows = vec![row("a"), incomplete, row("c")];
        assert!(PromptBuilder::new().build_all(&rows).is_err());
    }

    #[test]
    fn test_unit_requires_user_message() {
        let err = PromptUnit::new("x", vec![Message::system("only system")]).unwrap_err();
        assert!(matches!(err, PromptError::NoUserMessage { .. }));
        assert!(PromptUnit::new("x", vec![]).is_err());
    }

    #[test]
    fn test_serializes_lowercase_roles() {
        let unit = PromptBuilder::new().build(&row("a")).unwrap();
        let json = serde_json::to_value(&unit).unwrap();
        assert_eq!(json["id"], "a");
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
