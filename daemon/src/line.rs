/// Decoder for the metadata source's line protocol.
///
/// Each event line carries four fields in fixed order, separated by `||`:
///   `status||identity||artist||title`
///
/// Field contents are never validated; any string is accepted in any position.
/// A line that does not split into exactly four fields is rejected.
use thiserror::Error;

/// Field separator used by the metadata source.
pub const FIELD_DELIMITER: &str = "||";

/// One decoded event: the latest state reported for a single source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUpdate {
    pub identity: String,
    pub status: String,
    pub artist: String,
    pub title: String,
}

/// The line did not contain exactly four delimited fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("expected 4 fields separated by `||`")]
pub struct MalformedLine;

/// Parses one raw line from the metadata stream.
///
/// Only the line terminator (`\n` or `\r\n`) is stripped; whitespace inside
/// fields is preserved verbatim. Blank lines are malformed.
pub fn parse_line(raw: &str) -> Result<SourceUpdate, MalformedLine> {
    let line = raw.trim_end_matches(['\n', '\r']);
    if line.is_empty() {
        return Err(MalformedLine);
    }

    let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();
    let [status, identity, artist, title] = fields.as_slice() else {
        return Err(MalformedLine);
    };

    Ok(SourceUpdate {
        identity: identity.to_string(),
        status: status.to_string(),
        artist: artist.to_string(),
        title: title.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── well-formed lines ─────────────────────────────────────────────────────

    #[test]
    fn parses_fields_in_wire_order() {
        let update = parse_line("Playing||spotify||Daft Punk||Digital Love").unwrap();
        assert_eq!(update.status, "Playing");
        assert_eq!(update.identity, "spotify");
        assert_eq!(update.artist, "Daft Punk");
        assert_eq!(update.title, "Digital Love");
    }

    #[test]
    fn strips_only_the_line_terminator() {
        let update = parse_line("Paused||firefox.instance123|| Artist ||Title \r\n").unwrap();
        assert_eq!(update.identity, "firefox.instance123");
        assert_eq!(update.artist, " Artist ");
        assert_eq!(update.title, "Title ");
    }

    #[test]
    fn keeps_empty_fields() {
        let update = parse_line("Playing||chromium||||\n").unwrap();
        assert_eq!(update.identity, "chromium");
        assert_eq!(update.artist, "");
        assert_eq!(update.title, "");

        let all_empty = parse_line("||||||").unwrap();
        assert_eq!(all_empty.status, "");
        assert_eq!(all_empty.identity, "");
    }

    #[test]
    fn accepts_unknown_status_verbatim() {
        let update = parse_line("Buffering||vlc||A||B").unwrap();
        assert_eq!(update.status, "Buffering");
    }

    #[test]
    fn single_pipes_stay_inside_fields() {
        let update = parse_line("Playing||mpv||AC|DC||Back | In Black").unwrap();
        assert_eq!(update.artist, "AC|DC");
        assert_eq!(update.title, "Back | In Black");
    }

    // ── malformed lines ───────────────────────────────────────────────────────

    #[test]
    fn empty_and_blank_lines_are_malformed() {
        assert_eq!(parse_line(""), Err(MalformedLine));
        assert_eq!(parse_line("\n"), Err(MalformedLine));
        assert_eq!(MalformedLine.to_string(), "expected 4 fields separated by `||`");
        assert_eq!(parse_line("\r\n"), Err(MalformedLine));
    }

    #[test]
    fn wrong_field_count_is_malformed() {
        assert_eq!(parse_line("Playing"), Err(MalformedLine));
        assert_eq!(parse_line("Playing||spotify||Artist"), Err(MalformedLine));
        assert_eq!(parse_line("Playing||spotify||Artist||Title||extra"), Err(MalformedLine));
        assert_eq!(parse_line("No players found"), Err(MalformedLine));
    }
}
