//! Flattening ACP content blocks into the text prompt Codex receives

use agent_client_protocol::{ContentBlock, EmbeddedResourceResource};

/// Plain text block
pub fn text_block(text: impl Into<String>) -> ContentBlock {
    ContentBlock::from(text.into())
}

/// The text of a text block
pub fn block_text(block: &ContentBlock) -> Option<&str> {
    match block {
        ContentBlock::Text(content) => Some(content.text.as_str()),
        _ => None,
    }
}

/// Render prompt blocks as plain text sections separated by blank lines
///
/// Empty sections are dropped so that, for example, a whitespace-only text
/// block does not leave a stray gap.
pub fn render_prompt(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .map(render_block)
        .filter(|section| !section.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_block(block: &ContentBlock) -> String {
    match block {
        ContentBlock::Text(content) => content.text.trim().to_string(),
        ContentBlock::Resource(embedded) => render_embedded(&embedded.resource),
        ContentBlock::ResourceLink(link) => {
            let label = link.title.as_deref().unwrap_or(&link.name);
            let header = if label.is_empty() {
                "Linked resource".to_string()
            } else {
                format!("Linked resource: {label}")
            };
            match &link.description {
                Some(description) if !description.is_empty() => {
                    format!("{header}\n{}\n{description}", link.uri)
                }
                _ => format!("{header}\n{}", link.uri),
            }
        }
        ContentBlock::Image(image) => match &image.uri {
            Some(uri) => format!("Image resource ({}, {uri})", image.mime_type),
            None => format!("Image resource ({})", image.mime_type),
        },
        ContentBlock::Audio(audio) => format!("Audio resource ({}) attached", audio.mime_type),
        _ => String::new(),
    }
}

fn render_embedded(resource: &EmbeddedResourceResource) -> String {
    match resource {
        EmbeddedResourceResource::TextResourceContents(contents) => {
            let body = contents.text.trim();
            let header = format!("# Embedded resource: {}", contents.uri);
            if body.is_empty() {
                header
            } else {
                format!("{header}\n\n{body}")
            }
        }
        EmbeddedResourceResource::BlobResourceContents(contents) => format!(
            "Binary resource {} ({}) attached.",
            contents.uri,
            contents.mime_type.as_deref().unwrap_or("unknown")
        ),
        _ => String::new(),
    }
}
