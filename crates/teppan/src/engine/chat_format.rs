//! Llama-2 chat formatting.
//!
//! A dialog is rendered as a sequence of [`Segment`]s. Each segment is
//! tokenized on its own and prefixed with the BOS token; completed
//! user/assistant exchanges are also closed with EOS. A leading system
//! message is folded into the first user turn.

use crate::error::EngineError;
use crate::prompt::{Message, Role};

pub const B_INST: &str = "[INST]";
pub const E_INST: &str = "[/INST]";
pub const B_SYS: &str = "<<SYS>>\n";
pub const E_SYS: &str = "\n<</SYS>>\n\n";

const SPECIAL_TAGS: [&str; 4] = [B_INST, E_INST, "<<SYS>>", "<</SYS>>"];

/// Reply given in place of a generation when a prompt smuggles in chat tags
pub const UNSAFE_ERROR: &str = "Error: special tags are not allowed as part of the prompt.";

/// A BOS-prefixed span of the rendered conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    /// Whether the span is closed with an EOS token
    pub eos: bool,
}

/// True when any message contains one of the reserved chat tags.
pub fn has_special_tags(dialog: &[Message]) -> bool {
    dialog
        .iter()
        .any(|m| SPECIAL_TAGS.iter().any(|tag| m.content.contains(tag)))
}

/// Render `dialog` into tokenizer-ready segments.
///
/// Roles must be an optional system message followed by user and assistant
/// turns alternating, starting and ending with a user turn.
pub fn format_dialog(dialog: &[Message]) -> Result<Vec<Segment>, EngineError> {
    let turns = fold_system_message(dialog)?;

    for (idx, message) in turns.iter().enumerate() {
        let expected = if idx % 2 == 0 { Role::User } else { Role::Assistant };
        if message.role != expected {
            return Err(EngineError::InvalidDialog(format!(
                "message {idx} has role {:?}, expected {:?}; roles must alternate user/assistant",
                message.role, expected
            )));
        }
    }
    let Some((last, exchanges)) = turns.split_last() else {
        return Err(EngineError::InvalidDialog("dialog is empty".to_string()));
    };
    if last.role != Role::User {
        return Err(EngineError::InvalidDialog(
            "last message must be from the user".to_string(),
        ));
    }

    let mut segments: Vec<Segment> = exchanges
        .chunks(2)
        .map(|pair| Segment {
            text: format!(
                "{B_INST} {} {E_INST} {} ",
                pair[0].content.trim(),
                pair[1].content.trim()
            ),
            eos: true,
        })
        .collect();
    segments.push(Segment {
        text: format!("{B_INST} {} {E_INST}", last.content.trim()),
        eos: false,
    });
    Ok(segments)
}

fn fold_system_message(dialog: &[Message]) -> Result<Vec<Message>, EngineError> {
    match dialog {
        [] => Err(EngineError::InvalidDialog("dialog is empty".to_string())),
        [system, first, rest @ ..] if system.role == Role::System => {
            let mut turns = Vec::with_capacity(rest.len() + 1);
            turns.push(Message::new(
                first.role,
                format!("{B_SYS}{}{E_SYS}{}", system.content, first.content),
            ));
            turns.extend_from_slice(rest);
            Ok(turns)
        }
        [system] if system.role == Role::System => Err(EngineError::InvalidDialog(
            "a system message must be followed by a user message".to_string(),
        )),
        _ => Ok(dialog.to_vec()),
    }
}
