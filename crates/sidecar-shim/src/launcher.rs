//! Replacing the host process with a standalone program.

use crate::error::{Result, ShimError};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Starts `command` in a new session and ends the current process.
pub trait Launcher: Send {
    fn launch(&mut self, command: &Path) -> Result<()>;
}

/// fork + exec. The child detaches into its own session with every descriptor
/// above stderr closed; the parent interrupts itself once the fork succeeds.
#[derive(Debug, Default)]
pub struct ExecLauncher;

impl Launcher for ExecLauncher {
    fn launch(&mut self, command: &Path) -> Result<()> {
        // Allocate before forking; the child only makes async-signal-safe calls.
        let path = CString::new(command.as_os_str().as_bytes())
            .map_err(|_| ShimError::Launch(format!("NUL in {}", command.display())))?;
        let argv0 = command
            .file_name()
            .map(|n| CString::new(n.as_bytes()))
            .transpose()
            .map_err(|_| ShimError::Launch(format!("NUL in {}", command.display())))?
            .unwrap_or_else(|| path.clone());

        tracing::info!("Launching {}", command.display());

        // SAFETY: the child branch only calls async-signal-safe functions before
        // exec or _exit.
        unsafe {
            match libc::fork() {
                -1 => Err(ShimError::Io(std::io::Error::last_os_error())),
                0 => {
                    libc::setsid();
                    let max_fd = match libc::sysconf(libc::_SC_OPEN_MAX) {
                        n if n > 0 => n as libc::c_int,
                        _ => 1024,
                    };
                    for fd in 3..max_fd {
                        libc::close(fd);
                    }
                    libc::execl(
                        path.as_ptr(),
                        argv0.as_ptr(),
                        std::ptr::null::<libc::c_char>(),
                    );
                    libc::_exit(127)
                }
                _ => {
                    libc::kill(libc::getpid(), libc::SIGINT);
                    Ok(())
                }
            }
        }
    }
}
