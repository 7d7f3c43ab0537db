//! # Terminal Event Loop
//!
//! One task drives the [`Kiosk`]. Every iteration waits on whichever of
//! these fires first:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  poll tick        ──► RefreshWatcher::poll ──► Exit: stop              │
//! │                                               Refresh: reload catalog  │
//! │  console line     ──► parse ──► tap: TokenFeed / command: Kiosk        │
//! │  identity read    ──► Input::Token (only while a screen awaits one)    │
//! │  wager deadline   ──► Input::Expired (only during a wager)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future;
use std::io::Write;
use std::time::Duration;

use kasse_sync::{RefreshWatcher, SyncSignal};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::console::{self, Command, HELP};
use crate::flow::{Input, Kiosk, Notice, Pending};
use crate::identity::{IdentityReader, TokenFeed};

enum Step {
    Poll,
    Line(String),
    ConsoleClosed,
    Input(Input),
}

pub struct Terminal {
    kiosk: Kiosk,
    reader: IdentityReader,
    feed: TokenFeed,
    watcher: RefreshWatcher,
    poll_interval: Duration,
    symbol: String,
    stop_on_eof: bool,
}

impl Terminal {
    pub fn new(
        kiosk: Kiosk,
        reader: IdentityReader,
        feed: TokenFeed,
        watcher: RefreshWatcher,
        poll_interval: Duration,
        symbol: impl Into<String>,
    ) -> Self {
        Terminal {
            kiosk,
            reader,
            feed,
            watcher,
            poll_interval,
            symbol: symbol.into(),
            stop_on_eof: true,
        }
    }

    /// Keep running after the console closes (device reader deployments).
    pub fn keep_running_without_console(mut self) -> Self {
        self.stop_on_eof = false;
        self
    }

    /// Runs until the exit marker appears, admin mode quits, or the
    /// console closes.
    pub async fn run<W: Write>(mut self, mut lines: mpsc::Receiver<String>, mut out: W) -> anyhow::Result<()> {
        let mut tick = tokio::time::interval(self.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut console_open = true;

        self.show_screen(&mut out)?;

        while !self.kiosk.should_exit() {
            let pending = self.kiosk.pending();

            let step = tokio::select! {
                _ = tick.tick() => Step::Poll,
                line = lines.recv(), if console_open => match line {
                    Some(line) => Step::Line(line),
                    None => Step::ConsoleClosed,
                },
                token = read_when_awaited(&self.reader, pending) => Step::Input(Input::Token(token)),
                _ = expire_when_due(pending) => Step::Input(Input::Expired),
            };

            match step {
                Step::Poll => match self.watcher.poll() {
                    Ok(SyncSignal::Exit) => {
                        info!("Exit requested by the back office");
                        break;
                    }
                    Ok(SyncSignal::Refresh) => {
                        if let Err(e) = self.kiosk.reload().await {
                            warn!(error = %e, "Catalog reload failed");
                        } else if matches!(self.kiosk.screen(), crate::flow::Screen::Catalog { .. }) {
                            self.show_screen(&mut out)?;
                        }
                    }
                    Ok(SyncSignal::Idle) => {}
                    Err(e) => warn!(error = %e, "Marker poll failed"),
                },
                Step::Line(line) => self.console_line(&line, &mut out).await?,
                Step::ConsoleClosed => {
                    console_open = false;
                    if self.stop_on_eof {
                        info!("Console closed");
                        break;
                    }
                    debug!("Console closed; device reader keeps running");
                }
                Step::Input(input) => self.apply(input, &mut out).await?,
            }
        }

        writeln!(out, "{}", console::render_notice(&Notice::ShuttingDown, &self.symbol))?;
        info!("Terminal stopped");
        Ok(())
    }

    async fn console_line<W: Write>(&mut self, line: &str, out: &mut W) -> anyhow::Result<()> {
        match console::parse_line(line) {
            Ok(Command::Tap(token)) => {
                self.feed.offer(&token);
            }
            Ok(Command::Input(input)) => self.apply(input, out).await?,
            Ok(Command::Help) => writeln!(out, "{}", HELP)?,
            Ok(Command::Empty) => self.show_screen(out)?,
            Err(message) => writeln!(out, "? {}", message)?,
        }
        Ok(())
    }

    async fn apply<W: Write>(&mut self, input: Input, out: &mut W) -> anyhow::Result<()> {
        let notices = self.kiosk.handle(input).await;
        for notice in &notices {
            writeln!(out, "{}", console::render_notice(notice, &self.symbol))?;
        }
        if !self.kiosk.should_exit() {
            self.show_screen(out)?;
        }
        Ok(())
    }

    fn show_screen<W: Write>(&self, out: &mut W) -> anyhow::Result<()> {
        writeln!(out, "{}", console::render_screen(&self.kiosk, &self.symbol))?;
        out.flush()?;
        Ok(())
    }
}

async fn read_when_awaited(reader: &IdentityReader, pending: Pending) -> Option<String> {
    match pending {
        Pending::Identity { since, deadline } => reader.read_token(since, deadline).await,
        _ => future::pending().await,
    }
}

async fn expire_when_due(pending: Pending) {
    match pending {
        Pending::Deadline(deadline) => sleep_until(deadline).await,
        _ => future::pending().await,
    }
}

/// Forwards stdin lines to the loop from a background thread.
pub fn spawn_stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(32);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if tx.blocking_send(line.clone()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });
    rx
}
