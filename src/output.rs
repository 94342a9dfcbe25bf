//! CLI output formatting.
//!
//! Pure functions returning lines, so the CLI stays a thin `println!` loop
//! and the layout is unit testable.
//!
//! ## Events
//!
//! ```text
//! read_image            before_read_image → read_image → after_read_image
//! get_image_size        get_image_size
//! ```
//!
//! ## Trace
//!
//! ```text
//! 001 before_read_image
//! 002 read_image
//! 003 after_read_image
//! ```

use crate::events::{EngineEvent, Operation};

/// One line per operation listing the events it fires, in order.
pub fn format_catalogue() -> Vec<String> {
    let width = Operation::ALL
        .iter()
        .map(|op| op.name().len())
        .max()
        .unwrap_or(0);

    Operation::ALL
        .iter()
        .map(|op| {
            let events: Vec<String> = op
                .phases()
                .iter()
                .map(|phase| op.event(*phase).to_string())
                .collect();
            format!("{:width$}  {}", op.name(), events.join(" → "))
        })
        .collect()
}

/// Number the fired events in order.
pub fn format_trace(trace: &[EngineEvent]) -> Vec<String> {
    trace
        .iter()
        .enumerate()
        .map(|(i, event)| format!("{:03} {}", i + 1, event))
        .collect()
}
