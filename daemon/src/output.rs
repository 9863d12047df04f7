/// Renders the active source into the record the bar consumes.
///
/// One record is printed per accepted update as a single JSON line:
///   `{"text": ..., "class": ..., "tooltip": ...}`
/// `tooltip` is omitted for the `empty` and `error` records.
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::TemplateError;
use crate::resolver::ActiveSelection;
use crate::table::PlaybackStatus;

pub const ELLIPSIS: &str = "...";
pub const EMPTY_CLASS: &str = "empty";
pub const ERROR_CLASS: &str = "error";
pub const ERROR_TEXT: &str = "Error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub text: String,
    pub class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}

impl OutputRecord {
    /// No source is active.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            class: EMPTY_CLASS.to_string(),
            tooltip: None,
        }
    }

    /// Rendering failed for this cycle.
    pub fn error() -> Self {
        Self {
            text: ERROR_TEXT.to_string(),
            class: ERROR_CLASS.to_string(),
            tooltip: None,
        }
    }

    /// Serializes to one JSON line, without the trailing newline.
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"text":"Error","class":"error"}"#.to_string())
    }
}

/// Whether the volume decoration is enabled at all. Callers skip the volume
/// query when this is false.
pub fn wants_volume(config: &Config) -> bool {
    config.volume.enabled && config.display.show_volume
}

/// Builds the record for `selection`. Never fails: a broken display template
/// degrades to [`OutputRecord::error`].
pub fn render(selection: Option<ActiveSelection<'_>>, config: &Config, volume: Option<i64>) -> OutputRecord {
    let Some(selection) = selection else {
        tracing::debug!("No active source");
        return OutputRecord::empty();
    };

    match render_active(selection, config, volume) {
        Ok(record) => {
            tracing::debug!("Generated output: {}", record.text);
            record
        }
        Err(e) => {
            tracing::error!("Error formatting output: {e}");
            OutputRecord::error()
        }
    }
}

fn render_active(
    selection: ActiveSelection<'_>,
    config: &Config,
    volume: Option<i64>,
) -> Result<OutputRecord, TemplateError> {
    let ActiveSelection { identity, source } = selection;
    let display = &config.display;

    let mut text = render_template(
        &display.format,
        &[
            ("icon", config.icons.icon_for(identity)),
            ("player", identity),
            ("artist", source.artist.as_str()),
            ("title", source.title.as_str()),
        ],
    )?;

    if source.status == PlaybackStatus::Paused && !display.paused_prefix.is_empty() {
        text.insert_str(0, &display.paused_prefix);
    }

    if let Some(percent) = volume.filter(|_| wants_volume(config)) {
        text.push(' ');
        text.push_str(config.volume.icon_for(percent));
        if config.volume.show_percentage {
            text.push_str(&format!("{percent}%"));
        }
    }

    if display.show_player_name {
        text.push_str(&format!(" [{identity}]"));
    }

    Ok(OutputRecord {
        text: truncate(&text, display.max_length),
        class: source.status.as_str().to_lowercase(),
        tooltip: Some(format!(
            "{identity}: {}\n{} - {}",
            source.status, source.artist, source.title
        )),
    })
}

/// Substitutes `{name}` placeholders from `vars`. `{{` and `}}` are literal braces.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            offset += pos + 2;
            continue;
        }
        if tail.starts_with('}') {
            return Err(TemplateError::UnbalancedBrace(offset + pos));
        }

        let close = tail
            .find('}')
            .ok_or(TemplateError::UnbalancedBrace(offset + pos))?;
        let name = &tail[1..close];
        if name.contains('{') {
            return Err(TemplateError::UnbalancedBrace(offset + pos));
        }
        let value = vars
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
            .ok_or_else(|| TemplateError::UnknownPlaceholder(name.to_string()))?;
        out.push_str(value);

        rest = &tail[close + 1..];
        offset += pos + close + 1;
    }

    out.push_str(rest);
    Ok(out)
}

/// Cuts `text` to at most `max_length` characters, ending in [`ELLIPSIS`]
/// when anything was removed. Below the ellipsis width only part of the
/// ellipsis fits.
pub fn truncate(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }
    let keep = max_length.saturating_sub(ELLIPSIS.chars().count());
    text.chars()
        .take(keep)
        .chain(ELLIPSIS.chars())
        .take(max_length)
        .collect()
}
