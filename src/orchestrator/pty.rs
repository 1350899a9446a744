//! Pseudo-terminal backed agent sessions (unix only).

use std::fs::File as StdFile;
use std::process::Stdio;

use nix::pty::{openpty, OpenptyResult, Winsize};
use nix::sys::termios::Termios;
use tokio::fs::File;
use tokio::process::{Child, Command};

use crate::{AppError, Result};

/// A child process whose standard streams are the slave side of a pty.
#[derive(Debug)]
pub(crate) struct TerminalSession {
    /// The spawned runtime.
    pub child: Child,
    /// Master side, for reading terminal output.
    pub reader: File,
    /// Master side, for writing keystrokes.
    pub writer: File,
}

impl TerminalSession {
    /// Allocate a `cols`×`rows` pseudo-terminal and spawn `cmd` on it.
    ///
    /// The parent's copies of the slave descriptor are closed before
    /// returning, so reads from the master end once the session closes.
    pub(crate) fn open(mut cmd: Command, cols: u16, rows: u16) -> Result<Self> {
        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        let OpenptyResult { master, slave } = openpty(Some(&winsize), None::<&Termios>)
            .map_err(|err| AppError::Launch(format!("failed to allocate pseudo-terminal: {err}")))?;

        let clone_err =
            |err: std::io::Error| AppError::Launch(format!("failed to duplicate pty: {err}"));
        let slave_in = slave.try_clone().map_err(clone_err)?;
        let slave_out = slave.try_clone().map_err(clone_err)?;

        cmd.stdin(Stdio::from(slave_in))
            .stdout(Stdio::from(slave_out))
            .stderr(Stdio::from(slave));

        let child = cmd
            .spawn()
            .map_err(|err| AppError::Launch(format!("failed to spawn terminal session: {err}")))?;
        drop(cmd);

        let master = StdFile::from(master);
        let writer = master.try_clone().map_err(clone_err)?;

        Ok(Self {
            child,
            reader: File::from_std(master),
            writer: File::from_std(writer),
        })
    }
}
