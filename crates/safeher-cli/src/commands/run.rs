use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};
use safeher_core::{Config, Database, Event, Runtime, StartSource};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{info, warn};

use crate::host::{ReplaySource, TerminalHost};

#[derive(Clone, Copy, ValueEnum)]
pub enum Answer {
    Send,
    Cancel,
    Ignore,
}

impl Answer {
    fn as_str(self) -> &'static str {
        match self {
            Answer::Send => "send",
            Answer::Cancel => "cancel",
            Answer::Ignore => "ignore",
        }
    }
}

#[derive(Args)]
pub struct RunArgs {
    /// CSV file of `x,y,z,t_ms` samples; `-` or omitted reads stdin
    #[arg(long)]
    replay: Option<PathBuf>,
    /// How to answer confirmation prompts (defaults to `simulation.answer`)
    #[arg(long, value_enum)]
    answer: Option<Answer>,
    /// Replay in real time using the sample timestamps
    #[arg(long)]
    pace: bool,
    /// Keep running this long after the replay ends
    #[arg(long, default_value_t = 2)]
    linger_secs: u64,
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(supervise(args))
}

async fn supervise(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load()?;
    if let Some(answer) = args.answer {
        config.apply("simulation.answer", answer.as_str())?;
    }

    let source = ReplaySource::open(args.replay.as_ref())?;
    let terminal = TerminalHost::build(&config, source, args.pace)?;
    let mut drained = terminal.sensors.drained();
    let history = Database::open()?;

    let (runtime, handle) = Runtime::new(terminal.host.clone(), config);
    terminal.ui.attach(handle.clone());
    let mut events = handle.subscribe();
    let task = tokio::spawn(runtime.run());

    if let Err(e) = handle.start(StartSource::Control).await {
        handle.shutdown();
        let _ = task.await;
        return Err(e.into());
    }

    let linger = tokio::time::sleep(Duration::MAX);
    tokio::pin!(linger);
    let mut lingering = false;

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => emit(&event, &history)?,
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event output fell behind"),
                Err(RecvError::Closed) => break,
            },
            changed = drained.wait_for(|done| *done), if !lingering => {
                if changed.is_err() {
                    warn!("replay ended unexpectedly");
                }
                info!(linger_secs = args.linger_secs, "replay finished");
                linger.as_mut().reset(tokio::time::Instant::now() + Duration::from_secs(args.linger_secs));
                lingering = true;
            }
            () = &mut linger => break,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    handle.shutdown();
    task.await?;
    loop {
        match events.try_recv() {
            Ok(event) => emit(&event, &history)?,
            Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    Ok(())
}

/// Print one event as a JSON line and keep finished jobs in the history.
fn emit(event: &Event, history: &Database) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string(event)?);
    if let Event::DispatchFinished { report, .. } = event {
        history.record_dispatch(report)?;
    }
    Ok(())
}
