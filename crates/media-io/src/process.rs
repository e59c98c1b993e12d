use crossbeam_channel::{unbounded, Receiver, TryRecvError};
use std::ffi::OsString;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const READ_BUF_SIZE: usize = 4096;

/// How long an exited child's stderr may stay open (held by a descendant)
/// before the exit is reported anyway.
const STDERR_GRACE: Duration = Duration::from_secs(2);

/// Result of a non-blocking read from the child's diagnostic stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkRead {
    Data(String),
    /// Nothing available right now.
    Empty,
    /// The stream reached EOF and everything has been read.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Capability to run one external process at a time and watch its stderr.
pub trait ProcessHandle: Send {
    fn start(&mut self, program: &Path, args: &[OsString]) -> io::Result<()>;

    /// Never blocks.
    fn read_chunk(&mut self) -> ChunkRead;

    /// Non-blocking exit check. Once this returns `Some`, every byte the
    /// process wrote is available through `read_chunk`, unless the stream
    /// was held open past a grace period by something other than the
    /// process itself.
    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>>;

    fn wait(&mut self) -> io::Result<ProcessExit>;

    fn kill(&mut self) -> io::Result<()>;

    fn is_running(&mut self) -> bool;
}

/// [`ProcessHandle`] backed by `std::process`. Stderr is drained on a reader
/// thread so the caller can poll without blocking.
#[derive(Default)]
pub struct ChildProcess {
    child: Option<Child>,
    rx_chunks: Option<Receiver<Vec<u8>>>,
    reader: Option<thread::JoinHandle<()>>,
    /// Child reaped, stderr not yet at EOF.
    reaped: Option<(ProcessExit, Instant)>,
    exit: Option<ProcessExit>,
}

impl ChildProcess {
    pub fn new() -> Self {
        Self::default()
    }

    fn reap(&mut self, status: std::process::ExitStatus) -> (ProcessExit, Instant) {
        let exit = ProcessExit {
            code: status.code(),
        };
        debug!("child exited with {:?}", exit.code);
        let reaped = (exit, Instant::now());
        self.reaped = Some(reaped);
        reaped
    }

    fn reader_done(&self) -> bool {
        self.reader.as_ref().map_or(true, |r| r.is_finished())
    }

    fn settle(&mut self, exit: ProcessExit) -> ProcessExit {
        if let Some(reader) = self.reader.take() {
            if reader.is_finished() {
                let _ = reader.join();
            } else {
                warn!("stderr still open after exit; detaching reader");
            }
        }
        self.reaped = None;
        self.exit = Some(exit);
        exit
    }
}

impl ProcessHandle for ChildProcess {
    fn start(&mut self, program: &Path, args: &[OsString]) -> io::Result<()> {
        if self.is_running() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "a process is already running",
            ));
        }

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        debug!("spawned {:?} (pid {})", program, child.id());

        let (tx, rx) = unbounded::<Vec<u8>>();
        let reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buf = [0u8; READ_BUF_SIZE];
                loop {
                    match stderr.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(_) => break,
                    }
                }
            })
        });

        self.child = Some(child);
        self.rx_chunks = Some(rx);
        self.reader = reader;
        self.reaped = None;
        self.exit = None;
        Ok(())
    }

    fn read_chunk(&mut self) -> ChunkRead {
        let Some(rx) = &self.rx_chunks else {
            return ChunkRead::Closed;
        };
        match rx.try_recv() {
            Ok(bytes) => ChunkRead::Data(String::from_utf8_lossy(&bytes).into_owned()),
            Err(TryRecvError::Empty) => ChunkRead::Empty,
            Err(TryRecvError::Disconnected) => ChunkRead::Closed,
        }
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        if let Some(exit) = self.exit {
            return Ok(Some(exit));
        }
        let (exit, at) = match self.reaped {
            Some(reaped) => reaped,
            None => {
                let Some(child) = self.child.as_mut() else {
                    return Err(io::Error::new(io::ErrorKind::NotFound, "no process started"));
                };
                match child.try_wait()? {
                    Some(status) => self.reap(status),
                    None => return Ok(None),
                }
            }
        };
        if self.reader_done() || at.elapsed() >= STDERR_GRACE {
            Ok(Some(self.settle(exit)))
        } else {
            Ok(None)
        }
    }

    fn wait(&mut self) -> io::Result<ProcessExit> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        let (exit, at) = match self.reaped {
            Some(reaped) => reaped,
            None => {
                let Some(child) = self.child.as_mut() else {
                    return Err(io::Error::new(io::ErrorKind::NotFound, "no process started"));
                };
                let status = child.wait()?;
                self.reap(status)
            }
        };
        while !self.reader_done() && at.elapsed() < STDERR_GRACE {
            thread::sleep(Duration::from_millis(10));
        }
        Ok(self.settle(exit))
    }

    fn kill(&mut self) -> io::Result<()> {
        if self.exit.is_some() || self.reaped.is_some() {
            return Ok(());
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        match child.kill() {
            Ok(()) => Ok(()),
            // already exited but not yet reaped
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn is_running(&mut self) -> bool {
        if self.child.is_none() {
            return false;
        }
        let _ = self.try_wait();
        self.exit.is_none() && self.reaped.is_none()
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.kill();
            let _ = self.wait();
        }
    }
}
