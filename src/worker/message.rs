use serde_json::Value;

use crate::model::{ExecutionRequest, Language};
use crate::queue::QueueMessage;

/// What to do with a received message.
#[derive(Debug)]
pub enum Dispatch {
    /// A well-formed request for this worker's language
    Run(ExecutionRequest),
    /// Meant for another worker; leave it on the queue
    Skip { language: String },
    /// Cannot be processed; publish a failure and drain it
    Poison {
        task_id: String,
        language: Option<String>,
        reason: String,
    },
}

/// Decide how to handle a message for a worker of `language`.
///
/// A message naming another language is skipped even when it is otherwise
/// malformed, so the worker that owns it reports the problem. When no
/// `task_id` can be read the queue message id stands in for it.
pub fn classify(message: &QueueMessage, language: Language) -> Dispatch {
    let value: Value = match serde_json::from_str(&message.body) {
        Ok(value) => value,
        Err(e) => {
            return Dispatch::Poison {
                task_id: message.message_id.clone(),
                language: None,
                reason: format!("Invalid message body: {}", e),
            }
        }
    };

    let task_id = value
        .get("task_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| message.message_id.clone());

    let declared = value
        .get("language")
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(declared) = &declared {
        match declared.parse::<Language>() {
            Ok(parsed) if parsed == language => {}
            _ => {
                return Dispatch::Skip {
                    language: declared.clone(),
                }
            }
        }
    }

    match serde_json::from_value::<ExecutionRequest>(value) {
        Ok(request) => Dispatch::Run(request),
        Err(e) => Dispatch::Poison {
            task_id,
            language: declared,
            reason: format!("Malformed execution request: {}", e),
        },
    }
}
