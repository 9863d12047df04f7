use crate::output::OutputRecord;

/// Outcome of one supervisor iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// The metadata source process was spawned and its output is being read.
    Started,
    /// A line was accepted; this record was written to the output.
    Emitted(OutputRecord),
    /// A malformed line was skipped without output.
    Skipped,
    /// The metadata source closed its output stream.
    Ended,
    /// The ended process was reaped; the next iteration respawns it.
    Restarting,
    /// Shutdown was requested; the loop should exit.
    Shutdown,
}
