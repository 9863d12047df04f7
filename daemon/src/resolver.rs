/// Picks the single source shown on the bar.
///
/// Three tiers, evaluated in order, first match wins:
///   1. with `prefer_playing`, any source whose status is exactly `Playing`;
///   2. each `priority_order` key in list order, matching identities that
///      contain the key case-insensitively (`default` matches everything) and
///      are not `Stopped`;
///   3. any source that is not `Stopped`.
///
/// Within a tier, sources are tried in identity order (see [`SourceTable`]).
use crate::config::{Prioritization, WILDCARD_PRIORITY};
use crate::table::{PlaybackStatus, Source, SourceTable};

/// The source currently considered active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveSelection<'a> {
    pub identity: &'a str,
    pub source: &'a Source,
}

/// Recomputes the active source from scratch.
pub fn resolve<'a>(table: &'a SourceTable, policy: &Prioritization) -> Option<ActiveSelection<'a>> {
    if table.is_empty() {
        return None;
    }
    let select = |(identity, source): (&'a str, &'a Source)| ActiveSelection { identity, source };

    if policy.prefer_playing {
        if let Some(found) = table
            .entries()
            .find(|(_, source)| source.status == PlaybackStatus::Playing)
        {
            tracing::debug!("Found playing source: {}", found.0);
            return Some(select(found));
        }
    }

    for key in &policy.priority_order {
        let wildcard = key == WILDCARD_PRIORITY;
        let pattern = key.to_lowercase();
        let found = table.entries().find(|(identity, source)| {
            !source.status.is_stopped()
                && (wildcard || identity.to_lowercase().contains(&pattern))
        });
        if let Some(found) = found {
            tracing::debug!("Found priority source: {} (tier `{key}`)", found.0);
            return Some(select(found));
        }
    }

    let found = table.entries().find(|(_, source)| !source.status.is_stopped())?;
    tracing::debug!("Found fallback source: {}", found.0);
    Some(select(found))
}
