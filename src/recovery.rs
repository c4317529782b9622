//! Operator-driven recovery after a run aborts.
//!
//! The loop is `run -> prompt -> {retry, restart then retry, exit}` and never
//! gives up on its own; only the operator ends it.

use std::io::{BufRead, Write};
use std::time::Duration;

use owo_colors::OwoColorize;

use crate::error::MirrorError;
use crate::mirror::MirrorStats;
use crate::restart::RemoteRestart;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryChoice {
    Retry,
    RestartAndRetry,
    Exit,
}

impl RecoveryChoice {
    /// `1` retries, `2` restarts then retries, anything else exits.
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "1" => RecoveryChoice::Retry,
            "2" => RecoveryChoice::RestartAndRetry,
            _ => RecoveryChoice::Exit,
        }
    }
}

/// Asks the operator what to do about a failed run.
pub trait Prompt {
    fn ask(&mut self, failure: &MirrorError) -> RecoveryChoice;
}

/// Line-oriented prompt. The input handle is opened on first use and released
/// when the prompt is dropped, whichever way the loop ends.
pub struct ConsolePrompt<W: Write> {
    input: Option<Box<dyn BufRead>>,
    open_input: fn() -> Box<dyn BufRead>,
    output: W,
}

fn open_stdin() -> Box<dyn BufRead> {
    Box::new(std::io::stdin().lock())
}

impl ConsolePrompt<std::io::Stdout> {
    pub fn stdio() -> Self {
        Self { input: None, open_input: open_stdin, output: std::io::stdout() }
    }
}

impl<W: Write> ConsolePrompt<W> {
    pub fn with_io(input: Box<dyn BufRead>, output: W) -> Self {
        Self { input: Some(input), open_input: open_stdin, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn render(&mut self, failure: &MirrorError) -> std::io::Result<()> {
        writeln!(self.output)?;
        writeln!(self.output, "❌ {} {}", "Mirror run aborted:".red().bold(), failure)?;
        writeln!(self.output, "   [1] retry")?;
        writeln!(self.output, "   [2] restart remote service, then retry")?;
        writeln!(self.output, "   [*] exit")?;
        write!(self.output, "{} ", "choice>".cyan())?;
        self.output.flush()
    }
}

impl<W: Write> Prompt for ConsolePrompt<W> {
    fn ask(&mut self, failure: &MirrorError) -> RecoveryChoice {
        if let Err(e) = self.render(failure) {
            tracing::warn!("cannot write prompt: {}", e);
            return RecoveryChoice::Exit;
        }
        let open_input = self.open_input;
        let input = self.input.get_or_insert_with(open_input);
        let mut line = String::new();
        match input.read_line(&mut line) {
            // end of input: nobody is there to answer
            Ok(0) => RecoveryChoice::Exit,
            Ok(_) => RecoveryChoice::parse(&line),
            Err(e) => {
                tracing::warn!("cannot read operator input: {}", e);
                RecoveryChoice::Exit
            }
        }
    }
}

/// Unattended mode: every failure ends the process.
pub struct NoPrompt;

impl Prompt for NoPrompt {
    fn ask(&mut self, failure: &MirrorError) -> RecoveryChoice {
        eprintln!("❌ {} {}", "Mirror run aborted:".red().bold(), failure);
        RecoveryChoice::Exit
    }
}

#[derive(Debug)]
pub enum Outcome {
    Completed(MirrorStats),
    /// The operator chose to stop; carries the failure that was on screen.
    OperatorExit(MirrorError),
}

/// Drive `run` until it completes or the operator gives up. `run` is always a
/// full run from the configured root; there is no mid-tree resume.
pub fn run_with_recovery<F>(
    mut run: F,
    prompt: &mut dyn Prompt,
    restarter: &mut dyn RemoteRestart,
    restart_grace: Duration,
) -> Outcome
where
    F: FnMut() -> Result<MirrorStats, MirrorError>,
{
    let mut attempt: u64 = 1;
    loop {
        let failure = match run() {
            Ok(stats) => return Outcome::Completed(stats),
            Err(e) => e,
        };
        tracing::error!(attempt, error = %failure, "mirror run aborted");

        match prompt.ask(&failure) {
            RecoveryChoice::Retry => {
                tracing::info!("operator chose retry");
            }
            RecoveryChoice::RestartAndRetry => {
                tracing::info!("operator chose restart and retry");
                match restarter.restart() {
                    Ok(report) if report.succeeded() => {}
                    Ok(report) => {
                        tracing::warn!(exit_status = report.exit_status, "restart reported failure, retrying anyway")
                    }
                    Err(e) => tracing::warn!(error = %e, "restart failed, retrying anyway"),
                }
                if !restart_grace.is_zero() {
                    tracing::info!("waiting {:?} for the remote service to come up", restart_grace);
                    std::thread::sleep(restart_grace);
                }
            }
            RecoveryChoice::Exit => return Outcome::OperatorExit(failure),
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_choices() {
        assert_eq!(RecoveryChoice::parse("1\n"), RecoveryChoice::Retry);
        assert_eq!(RecoveryChoice::parse("  2 \r\n"), RecoveryChoice::RestartAndRetry);
        assert_eq!(RecoveryChoice::parse("3"), RecoveryChoice::Exit);
        assert_eq!(RecoveryChoice::parse(""), RecoveryChoice::Exit);
        assert_eq!(RecoveryChoice::parse("q"), RecoveryChoice::Exit);
        assert_eq!(RecoveryChoice::parse("12"), RecoveryChoice::Exit);
    }

    #[test]
    fn console_prompt_reads_one_line_per_cycle() {
        let failure = MirrorError::Connection("h:22".into(), "refused".into());
        let mut p = ConsolePrompt::with_io(Box::new(Cursor::new("2\n1\nbye\n")), Vec::new());
        assert_eq!(p.ask(&failure), RecoveryChoice::RestartAndRetry);
        assert_eq!(p.ask(&failure), RecoveryChoice::Retry);
        assert_eq!(p.ask(&failure), RecoveryChoice::Exit);
        // input exhausted
        assert_eq!(p.ask(&failure), RecoveryChoice::Exit);
        let shown = String::from_utf8(p.into_output()).expect("utf8");
        assert_eq!(shown.matches("[1] retry").count(), 4);
        assert!(shown.contains("refused"));
    }

    #[test]
    fn no_prompt_always_exits() {
        let failure = MirrorError::Connection("h:22".into(), "refused".into());
        assert_eq!(NoPrompt.ask(&failure), RecoveryChoice::Exit);
    }
}
