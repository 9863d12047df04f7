/// Current playback volume, for the bar's volume decoration.
///
/// The query is a bounded external call. Any failure (missing binary, timeout,
/// non-zero exit, unparsable output) simply means "no reading".
use std::time::Duration;

use crate::command::ExternalCommand;

pub const VOLUME_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

pub struct VolumeProbe {
    command: ExternalCommand,
    timeout: Duration,
}

impl VolumeProbe {
    pub fn new(command: ExternalCommand, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    /// Returns the volume as an integer percentage, or `None` if unavailable.
    pub async fn percent(&self) -> Option<i64> {
        match self.command.run_bounded(self.timeout).await {
            Ok(output) => parse_volume(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => {
                tracing::debug!("Volume query failed: {e}");
                None
            }
        }
    }
}

impl Default for VolumeProbe {
    fn default() -> Self {
        Self::new(ExternalCommand::volume_query(), VOLUME_QUERY_TIMEOUT)
    }
}

/// Parses a `[0, 1]` float into a percentage, truncating toward zero.
pub fn parse_volume(stdout: &str) -> Option<i64> {
    let volume: f64 = stdout.trim().parse().ok()?;
    if !volume.is_finite() {
        return None;
    }
    Some((volume * 100.0) as i64)
}
