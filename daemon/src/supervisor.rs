/// Supervision of the metadata source process.
///
/// The supervisor owns the child process, the [`SourceTable`], and the output
/// sink, and drives a three-state machine one step at a time:
///
///   NotStarted ──spawn ok──▶ Running ──end of stream──▶ Ended ──reap──▶ NotStarted
///        ▲ │ spawn failed (retry after a fixed delay)
///        └─┘
///
/// Every accepted line updates the table, re-resolves the active source from
/// scratch, and writes exactly one record. The table is never reset, so
/// sources survive a restart of the metadata source.
///
/// Shutdown is observed through a `watch` channel that is raced against every
/// read and every sleep, so a stalled child never delays exit.
use std::io::{self, Write};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout};
use tokio::sync::watch;

use crate::command::ExternalCommand;
use crate::config::Config;
use crate::error::MediaError;
use crate::event::SupervisorEvent;
use crate::line::{parse_line, MalformedLine};
use crate::output::{self, OutputRecord};
use crate::resolver::resolve;
use crate::table::SourceTable;
use crate::volume::VolumeProbe;

pub const SPAWN_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const ERROR_PAUSE: Duration = Duration::from_secs(1);
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Loop timing. Defaults match the bar's expectations; tests shorten them.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorOptions {
    /// Wait after a failed spawn before trying again.
    pub spawn_retry_delay: Duration,
    /// Wait after any other failed iteration.
    pub error_pause: Duration,
    /// Time the child gets to exit after SIGTERM before it is killed.
    pub terminate_grace: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            spawn_retry_delay: SPAWN_RETRY_DELAY,
            error_pause: ERROR_PAUSE,
            terminate_grace: TERMINATE_GRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Running,
    Ended,
}

/// A spawned metadata source and its output stream.
struct RunningSource {
    child: Child,
    reader: BufReader<ChildStdout>,
    /// Bytes of a partially read line, kept across interrupted reads.
    pending: Vec<u8>,
}

enum State {
    NotStarted,
    Running(RunningSource),
    Ended(Child),
}

enum ReadOutcome {
    Line(String),
    EndOfStream,
    Failed(io::Error),
    Interrupted,
}

pub struct Supervisor<W> {
    config: Config,
    source_command: ExternalCommand,
    volume: VolumeProbe,
    options: SupervisorOptions,
    table: SourceTable,
    state: State,
    out: W,
    shutdown: watch::Receiver<bool>,
}

impl<W: Write> Supervisor<W> {
    pub fn new(
        config: Config,
        source_command: ExternalCommand,
        volume: VolumeProbe,
        options: SupervisorOptions,
        out: W,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            source_command,
            volume,
            options,
            table: SourceTable::new(),
            state: State::NotStarted,
            out,
            shutdown,
        }
    }

    pub fn table(&self) -> &SourceTable {
        &self.table
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::NotStarted => Phase::NotStarted,
            State::Running(_) => Phase::Running,
            State::Ended(_) => Phase::Ended,
        }
    }

    /// Runs until shutdown is requested, then terminates the child.
    ///
    /// No iteration error ends the loop: a failed spawn waits
    /// `spawn_retry_delay`, anything else waits `error_pause`.
    pub async fn run(&mut self) {
        tracing::info!("Starting main loop");
        loop {
            match self.step().await {
                Ok(SupervisorEvent::Shutdown) => break,
                Ok(_) => {}
                Err(e @ MediaError::Spawn { .. }) => {
                    tracing::error!("{e}");
                    self.pause(self.options.spawn_retry_delay).await;
                }
                Err(e) => {
                    tracing::error!("Error in main loop ({:?}): {e}", self.phase());
                    self.pause(self.options.error_pause).await;
                }
            }
        }
        self.stop_child().await;
        tracing::info!("Main loop stopped with {} known sources", self.table().len());
    }

    /// Performs one state transition.
    pub async fn step(&mut self) -> Result<SupervisorEvent, MediaError> {
        if self.stop_requested() {
            return Ok(SupervisorEvent::Shutdown);
        }

        match std::mem::replace(&mut self.state, State::NotStarted) {
            State::NotStarted => {
                let running = self.spawn()?;
                self.state = State::Running(running);
                Ok(SupervisorEvent::Started)
            }
            State::Running(mut running) => {
                let outcome = self.read_line(&mut running).await;
                match outcome {
                    ReadOutcome::Line(line) => {
                        self.state = State::Running(running);
                        self.handle_line(&line).await
                    }
                    ReadOutcome::Interrupted => {
                        self.state = State::Running(running);
                        Ok(SupervisorEvent::Shutdown)
                    }
                    ReadOutcome::EndOfStream => {
                        tracing::warn!("Metadata source ended");
                        self.state = State::Ended(running.child);
                        Ok(SupervisorEvent::Ended)
                    }
                    ReadOutcome::Failed(e) => {
                        self.state = State::Ended(running.child);
                        Err(MediaError::Read(e))
                    }
                }
            }
            State::Ended(child) => {
                terminate(child, self.options.terminate_grace).await;
                Ok(SupervisorEvent::Restarting)
            }
        }
    }

    fn spawn(&self) -> Result<RunningSource, MediaError> {
        let program = self.source_command.program.clone();
        let mut cmd = self.source_command.to_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|source| MediaError::Spawn { program: program.clone(), source })?;
        let stdout = child.stdout.take().ok_or_else(|| MediaError::Spawn {
            program,
            source: io::Error::other("stdout was not captured"),
        })?;

        tracing::info!("Started metadata source: {}", self.source_command);
        Ok(RunningSource {
            child,
            reader: BufReader::new(stdout),
            pending: Vec::new(),
        })
    }

    /// Reads the next line, or returns early when shutdown is requested.
    /// Invalid UTF-8 is replaced rather than treated as a read failure.
    async fn read_line(&mut self, running: &mut RunningSource) -> ReadOutcome {
        let read = tokio::select! {
            read = running.reader.read_until(b'\n', &mut running.pending) => Some(read),
            _ = self.shutdown.changed() => None,
        };

        match read {
            None => ReadOutcome::Interrupted,
            Some(Ok(0)) if running.pending.is_empty() => ReadOutcome::EndOfStream,
            Some(Ok(_)) => {
                let line = String::from_utf8_lossy(&running.pending).into_owned();
                running.pending.clear();
                ReadOutcome::Line(line)
            }
            Some(Err(e)) => ReadOutcome::Failed(e),
        }
    }

    async fn handle_line(&mut self, line: &str) -> Result<SupervisorEvent, MediaError> {
        let update = match parse_line(line) {
            Ok(update) => update,
            Err(MalformedLine) => {
                tracing::debug!("Invalid line format: {}", line.trim_end());
                return Ok(SupervisorEvent::Skipped);
            }
        };

        match self.table.get(&update.identity) {
            Some(previous) => tracing::debug!(
                "Updated source {}: {} -> {}",
                update.identity,
                previous.status,
                update.status
            ),
            None => tracing::info!("New source {}: {}", update.identity, update.status),
        }
        self.table.upsert(&update);

        let record = self.render().await;
        self.emit(&record)?;
        Ok(SupervisorEvent::Emitted(record))
    }

    async fn render(&self) -> OutputRecord {
        let selection = resolve(&self.table, &self.config.prioritization);
        let volume = match selection {
            Some(_) if output::wants_volume(&self.config) => self.volume.percent().await,
            _ => None,
        };
        output::render(selection, &self.config, volume)
    }

    fn emit(&mut self, record: &OutputRecord) -> Result<(), MediaError> {
        writeln!(self.out, "{}", record.to_json_line())
            .and_then(|()| self.out.flush())
            .map_err(MediaError::Emit)
    }

    /// Sleeps for `duration` unless shutdown arrives first.
    async fn pause(&mut self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.shutdown.changed() => {}
        }
    }

    /// A closed channel counts as a shutdown request.
    fn stop_requested(&self) -> bool {
        *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }

    async fn stop_child(&mut self) {
        match std::mem::replace(&mut self.state, State::NotStarted) {
            State::Running(running) => terminate(running.child, self.options.terminate_grace).await,
            State::Ended(child) => terminate(child, self.options.terminate_grace).await,
            State::NotStarted => {}
        }
    }

    #[cfg(test)]
    fn output(&self) -> &W {
        &self.out
    }
}

/// Asks `child` to exit, then kills it if it is still alive after `grace`.
async fn terminate(mut child: Child, grace: Duration) {
    if let Ok(Some(status)) = child.try_wait() {
        tracing::info!("Metadata source exited with {status}");
        return;
    }

    request_termination(&mut child);
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => tracing::info!("Metadata source exited with {status}"),
        Ok(Err(e)) => tracing::error!("Failed to wait for metadata source: {e}"),
        Err(_) => {
            tracing::warn!("Metadata source ignored SIGTERM for {grace:?}; killing");
            if let Err(e) = child.kill().await {
                tracing::error!("Failed to kill metadata source: {e}");
            }
        }
    }
}

#[cfg(unix)]
fn request_termination(child: &mut Child) {
    let Some(pid) = child.id() else { return };
    // SAFETY: kill(2) has no memory-safety preconditions; `pid` is our own
    // unreaped child, so it cannot have been recycled.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        tracing::debug!("SIGTERM to metadata source failed: {}", io::Error::last_os_error());
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.volume.enabled = false;
        config
    }

    fn fast_options() -> SupervisorOptions {
        SupervisorOptions {
            spawn_retry_delay: Duration::from_millis(20),
            error_pause: Duration::from_millis(20),
            terminate_grace: Duration::from_millis(500),
        }
    }

    fn script(body: &str) -> ExternalCommand {
        ExternalCommand::new("sh", ["-c", body])
    }

    fn supervisor(
        config: Config,
        command: ExternalCommand,
    ) -> (Supervisor<Vec<u8>>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let sup = Supervisor::new(config, command, VolumeProbe::default(), fast_options(), Vec::new(), rx);
        (sup, tx)
    }

    fn emitted_lines(sup: &Supervisor<Vec<u8>>) -> Vec<OutputRecord> {
        String::from_utf8(sup.output().clone())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    async fn step_until_ended(sup: &mut Supervisor<Vec<u8>>) -> Vec<SupervisorEvent> {
        let mut events = Vec::new();
        loop {
            let event = sup.step().await.unwrap();
            let done = event == SupervisorEvent::Ended;
            events.push(event);
            if done {
                return events;
            }
        }
    }

    // ── state machine ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn accepted_lines_emit_one_record_each() {
        let (mut sup, _tx) = supervisor(
            quiet_config(),
            script("printf 'Playing||spotify||A||T\\nnot a record\\n\\nPaused||firefox||B||U\\n'"),
        );
        assert_eq!(sup.phase(), Phase::NotStarted);

        let events = step_until_ended(&mut sup).await;
        assert_eq!(events.len(), 6);
        assert_eq!(events[0], SupervisorEvent::Started);
        assert!(matches!(events[1], SupervisorEvent::Emitted(_)));
        assert_eq!(events[2], SupervisorEvent::Skipped);
        assert_eq!(events[3], SupervisorEvent::Skipped);
        assert!(matches!(events[4], SupervisorEvent::Emitted(_)));
        assert_eq!(sup.phase(), Phase::Ended);

        let records = emitted_lines(&sup);
        assert_eq!(records.len(), 2);
        // Spotify is playing, so it stays active after the firefox update.
        assert_eq!(records[0].class, "playing");
        assert_eq!(records[1].class, "playing");
        assert!(records[1].text.contains("A - T"));
        assert_eq!(sup.table().len(), 2);
    }

    #[tokio::test]
    async fn ended_source_is_restarted_and_table_survives() {
        let dir = tempfile::tempdir().unwrap();
        let mark = dir.path().join("ran-once");
        let command = ExternalCommand::new(
            "sh",
            [
                "-c".to_string(),
                "if [ -e \"$1\" ]; then printf 'Paused||firefox||B||U\\n'; \
                 else : > \"$1\"; printf 'Playing||spotify||A||T\\n'; fi"
                    .to_string(),
                "sh".to_string(),
                mark.to_string_lossy().into_owned(),
            ],
        );
        let (mut sup, _tx) = supervisor(quiet_config(), command);

        step_until_ended(&mut sup).await;
        assert!(sup.table().get("spotify").is_some());

        assert_eq!(sup.step().await.unwrap(), SupervisorEvent::Restarting);
        assert_eq!(sup.phase(), Phase::NotStarted);

        step_until_ended(&mut sup).await;
        assert!(sup.table().get("spotify").is_some());
        assert!(sup.table().get("firefox").is_some());

        let records = emitted_lines(&sup);
        assert_eq!(records.len(), 2);
        assert!(records[1].text.contains("A - T"));
    }

    #[tokio::test]
    async fn spawn_failure_stays_not_started() {
        let (mut sup, _tx) = supervisor(
            quiet_config(),
            ExternalCommand::new("mediaplayer-test-no-such-binary", Vec::<String>::new()),
        );
        let err = sup.step().await.unwrap_err();
        assert!(matches!(err, MediaError::Spawn { .. }));
        assert_eq!(sup.phase(), Phase::NotStarted);
    }

    #[tokio::test]
    async fn stopped_only_sources_emit_empty_record() {
        let (mut sup, _tx) = supervisor(quiet_config(), script("printf 'Stopped||vlc||A||T\\n'"));
        step_until_ended(&mut sup).await;
        assert_eq!(emitted_lines(&sup), vec![OutputRecord::empty()]);
    }

    #[tokio::test]
    async fn broken_template_emits_error_record_and_continues() {
        let mut config = quiet_config();
        config.display.format = "{nope}".to_string();
        let (mut sup, _tx) = supervisor(
            config,
            script("printf 'Playing||vlc||A||T\\nPaused||vlc||A||T\\n'"),
        );
        step_until_ended(&mut sup).await;
        assert_eq!(emitted_lines(&sup), vec![OutputRecord::error(), OutputRecord::error()]);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced_not_fatal() {
        let (mut sup, _tx) = supervisor(quiet_config(), script("printf 'Playing||mpv||\\377||T\\n'"));
        let events = step_until_ended(&mut sup).await;
        assert!(matches!(events[1], SupervisorEvent::Emitted(_)));
        assert_eq!(sup.table().get("mpv").unwrap().artist, "\u{FFFD}");
    }

    #[tokio::test]
    async fn final_line_without_newline_is_accepted() {
        let (mut sup, _tx) = supervisor(quiet_config(), script("printf 'Playing||mpv||A||T'"));
        step_until_ended(&mut sup).await;
        assert_eq!(emitted_lines(&sup).len(), 1);
    }

    // ── shutdown ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn shutdown_interrupts_a_stalled_read() {
        let (mut sup, tx) = supervisor(quiet_config(), script("exec sleep 30"));
        assert_eq!(sup.step().await.unwrap(), SupervisorEvent::Started);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        let started = Instant::now();
        sup.run().await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(sup.phase(), Phase::NotStarted);
    }

    #[tokio::test]
    async fn spawn_retries_until_shutdown() {
        let (mut sup, tx) = supervisor(
            quiet_config(),
            ExternalCommand::new("mediaplayer-test-no-such-binary", Vec::<String>::new()),
        );
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tx.send(true);
        });

        tokio::time::timeout(Duration::from_secs(5), sup.run())
            .await
            .expect("supervisor did not stop");
        assert!(sup.output().is_empty());
    }

    #[tokio::test]
    async fn dropped_shutdown_sender_stops_the_loop() {
        let (mut sup, tx) = supervisor(quiet_config(), script("exec sleep 30"));
        drop(tx);
        assert_eq!(sup.step().await.unwrap(), SupervisorEvent::Shutdown);
    }

    #[tokio::test]
    async fn child_ignoring_sigterm_is_killed() {
        let (mut sup, tx) = supervisor(
            quiet_config(),
            script("trap '' TERM; echo ready; while :; do sleep 1; done"),
        );
        assert_eq!(sup.step().await.unwrap(), SupervisorEvent::Started);
        assert_eq!(sup.step().await.unwrap(), SupervisorEvent::Skipped);

        tx.send(true).unwrap();
        let started = Instant::now();
        sup.run().await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
