//! Content capture: normalize an inbound message into a `PostSpec` and
//! parse a free-text button specification into a button grid.
//!
//! Photo takes precedence over text; its caption becomes the post text.
//! Entities referencing a user identity cannot be replayed losslessly and
//! are dropped here rather than failing the capture.

use crate::domain::{Button, DomainError, FormattingSpan, InboundMessage, PostBody, PostSpec, SpanKind};

/// Capture an inbound message as a post draft. Buttons start empty; the
/// dialogue fills them in a later stage.
pub fn capture_post(msg: &InboundMessage) -> Result<PostSpec, DomainError> {
    let spans = replayable_spans(&msg.spans);

    if let Some(photo_ref) = &msg.photo_ref {
        return Ok(PostSpec {
            body: PostBody::Photo {
                photo_ref: photo_ref.clone(),
                caption: msg.text.clone().filter(|t| !t.is_empty()),
            },
            spans,
            buttons: Vec::new(),
        });
    }

    match msg.text.as_deref().filter(|t| !t.is_empty()) {
        Some(text) => Ok(PostSpec {
            body: PostBody::Text {
                text: text.to_string(),
            },
            spans,
            buttons: Vec::new(),
        }),
        None => Err(DomainError::UnsupportedContent),
    }
}

fn replayable_spans(spans: &[FormattingSpan]) -> Vec<FormattingSpan> {
    spans
        .iter()
        .filter(|s| !matches!(s.kind, SpanKind::TextMention))
        .cloned()
        .collect()
}

/// Parse a button grid: one line per row, comma-separated entries within a
/// row, each entry `label - url` (split on the first " - ").
///
/// Entries without the separator are silently dropped, as are rows that end
/// up empty. Zero surviving rows is `NoValidButtons`.
pub fn parse_buttons(input: &str) -> Result<Vec<Vec<Button>>, DomainError> {
    let mut rows = Vec::new();
    for line in input.lines() {
        let mut row = Vec::new();
        for entry in line.split(',') {
            if let Some((label, url)) = entry.split_once(" - ") {
                let label = label.trim();
                let url = url.trim();
                if !label.is_empty() && !url.is_empty() {
                    row.push(Button {
                        label: label.to_string(),
                        url: url.to_string(),
                    });
                }
            }
        }
        if !row.is_empty() {
            rows.push(row);
        }
    }
    if rows.is_empty() {
        return Err(DomainError::NoValidButtons);
    }
    Ok(rows)
}
