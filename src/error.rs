use core::fmt::Display;

/// Kernel error codes.
///
/// The syscall dispatcher flattens every variant to -1 in the return
/// register; the variants exist so kernel-internal callers can tell
/// resource exhaustion apart from argument faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// No free page for a kernel stack or user memory.
    Alloc,
    /// Every slot of the process table is in use.
    OutOfProc,
    /// No live process with the requested pid.
    NoProcess,
    /// The caller has no children to wait for.
    NoChildren,
    InvalidArgument,
    /// The caller has a pending kill.
    Killed,
}

impl Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            KernelError::Alloc => write!(f, "alloc error"),
            KernelError::OutOfProc => write!(f, "out of proc"),
            KernelError::NoProcess => write!(f, "no such process"),
            KernelError::NoChildren => write!(f, "no children"),
            KernelError::InvalidArgument => write!(f, "invalid argument"),
            KernelError::Killed => write!(f, "killed"),
        }
    }
}

/// Return an error, logging file:line. Use instead of `return Err(...)`.
#[macro_export]
macro_rules! err {
    ($e:expr) => {{
        #[cfg(debug_assertions)]
        $crate::println!("! kernel error at {}:{}: {}", file!(), line!(), $e);
        return Err($e.into());
    }};
}

/// Log error.
#[macro_export]
macro_rules! log {
    ($e:expr) => {
        match $e {
            Ok(v) => Ok(v),
            Err(e) => {
                #[cfg(debug_assertions)]
                $crate::println!("  at {}:{}", file!(), line!());
                Err(e)
            }
        }
    };
}

/// Propagate error with location logging. Use instead of `?`.
#[macro_export]
macro_rules! try_log {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => {
                #[cfg(debug_assertions)]
                $crate::println!("  at {}:{}", file!(), line!());
                return Err(e.into());
            }
        }
    };
}
