//! Interactive playback.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, never, select, unbounded};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Result, ResultExt};
use crate::player::{EventKind, Player, PlayerEvent, format_seconds};

/// A command typed on stdin while playing.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Toggle,
    Forward(Option<f64>),
    Rewind(Option<f64>),
    Seek(f64),
    Queue(PathBuf),
    Quit,
}

const HELP: &str = "commands: p (play/pause)  f [secs]  r [secs]  s <secs>  a <path>  q";

/// Parse one stdin line. Returns `None` for blank or unrecognized input.
pub fn parse_command(line: &str) -> Option<ControlCommand> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let seconds = || rest.parse::<f64>().ok().filter(|s| s.is_finite());

    match word {
        "p" | "pause" | "play" => Some(ControlCommand::Toggle),
        "f" | "forward" => Some(ControlCommand::Forward(seconds())),
        "r" | "rewind" => Some(ControlCommand::Rewind(seconds())),
        "s" | "seek" => seconds().map(ControlCommand::Seek),
        "a" | "add" if !rest.is_empty() => Some(ControlCommand::Queue(PathBuf::from(rest))),
        "q" | "quit" => Some(ControlCommand::Quit),
        _ => None,
    }
}

/// Play `paths` in order until the queue finishes or the user quits.
pub fn cmd_play(paths: &[PathBuf], config: &Config, start_at: Option<f64>) -> Result<()> {
    let player = Player::open(config)?;
    let (done_tx, done_rx) = unbounded::<()>();
    install_status_line(&player);
    player.on(EventKind::Complete, move |_| {
        let _ = done_tx.send(());
    });

    player.load(paths).with_context("cannot play")?;
    if let Some(seconds) = start_at {
        player.seek(seconds);
    }
    player.start()?;

    println!(
        "Playing {} ({}), {} queued",
        player.current_track().unwrap_or_default(),
        format_seconds(player.length_in_seconds()),
        player.queued()
    );
    println!("{HELP}");

    let commands = spawn_stdin_reader()?;
    let closed = never();
    let mut stdin_open = true;
    loop {
        let input = if stdin_open { &commands } else { &closed };
        select! {
            recv(input) -> command => match command {
                Ok(ControlCommand::Quit) => break,
                Ok(command) => apply(&player, command),
                Err(_) => {
                    debug!("stdin closed, playing to the end of the queue");
                    stdin_open = false;
                }
            },
            recv(done_rx) -> _ => {
                if !player.is_playing() && player.queued() == 0 {
                    break;
                }
                println!("\nNow playing {}", player.current_track().unwrap_or_default());
            }
        }
    }

    println!();
    Ok(())
}

fn apply(player: &Player, command: ControlCommand) {
    let result = match command {
        ControlCommand::Toggle => player.toggle(),
        ControlCommand::Forward(Some(seconds)) => {
            player.forward_by(seconds);
            Ok(())
        }
        ControlCommand::Forward(None) => {
            player.forward();
            Ok(())
        }
        ControlCommand::Rewind(Some(seconds)) => {
            player.rewind_by(seconds);
            Ok(())
        }
        ControlCommand::Rewind(None) => {
            player.rewind();
            Ok(())
        }
        ControlCommand::Seek(seconds) => {
            player.seek(seconds);
            Ok(())
        }
        ControlCommand::Queue(path) => player.queue(&path).map(|()| {
            println!("\nQueued {}", path.display());
        }),
        ControlCommand::Quit => Ok(()),
    };
    if let Err(e) = result {
        warn!("{}", e);
        eprintln!("\n{e}");
    }
}

/// Redraw `position / length  meter` on every position change.
fn install_status_line(player: &Player) {
    let level = Arc::new(AtomicU32::new(0));

    let latest = Arc::clone(&level);
    player.on(EventKind::Level, move |event| {
        if let PlayerEvent::Level(value) = event {
            latest.store(value.to_bits(), Ordering::Relaxed);
        }
    });

    player.on(EventKind::PositionChange, move |event| {
        if let PlayerEvent::PositionChange(seconds) = event {
            let level = f32::from_bits(level.load(Ordering::Relaxed));
            let mut stdout = std::io::stdout().lock();
            let _ = write!(stdout, "\r{:>8}  {:<20}", format_seconds(*seconds), meter(level));
            let _ = stdout.flush();
        }
    });
}

/// Level bar, 20 cells at full scale.
fn meter(level: f32) -> String {
    let cells = (level.clamp(0.0, 1.0) * 20.0).round() as usize;
    "#".repeat(cells)
}

fn spawn_stdin_reader() -> Result<Receiver<ControlCommand>> {
    let (tx, rx) = unbounded();
    let spawned = thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match parse_command(&line) {
                    Some(command) => {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => eprintln!("\n{HELP}"),
                }
            }
        });
    spawned.with_context("cannot read commands from stdin")?;
    Ok(rx)
}
