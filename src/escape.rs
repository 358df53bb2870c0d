//! Process-exit interception for simulator adapters.
//!
//! Simulator code reaches [`terminate`] or [`terminate_with`] where a standalone
//! program would exit the process. While an [`EscapeInterceptor`] is installed
//! that call unwinds with an [`EscapeRequest`] payload instead, so the caller can
//! turn it into an ordinary error with [`contain`]. Without an interceptor the
//! process exits.
//!
//! The interceptor swaps the process panic hook. Only one may be installed at a
//! time; the trace gate guarantees that.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe, PanicHookInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

static INTERCEPTING: AtomicBool = AtomicBool::new(false);

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static>;

/// A process exit requested by simulator code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscapeRequest {
    pub code: i32,
    pub message: Option<String>,
}

/// Exits the process, or unwinds with an [`EscapeRequest`] while intercepted.
pub fn terminate(code: i32) -> ! {
    terminate_with(code, None)
}

/// Like [`terminate`], carrying the message the simulator printed.
pub fn terminate_with(code: i32, message: Option<String>) -> ! {
    if INTERCEPTING.load(Ordering::SeqCst) {
        panic::panic_any(EscapeRequest { code, message });
    }
    if let Some(message) = &message {
        tracing::error!(code, message = %message, "simulator exiting process");
    }
    std::process::exit(code)
}

/// Returns true while an interceptor is installed.
#[must_use]
pub fn is_intercepting() -> bool {
    INTERCEPTING.load(Ordering::SeqCst)
}

/// Scoped interception of [`terminate`].
///
/// Dropping the interceptor restores direct exit and, unless the dropping thread
/// is itself unwinding, the previous panic hook.
pub struct EscapeInterceptor {
    previous: Option<Arc<PanicHook>>,
}

impl std::fmt::Debug for EscapeInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscapeInterceptor").finish_non_exhaustive()
    }
}

impl EscapeInterceptor {
    /// Installs the interceptor.
    #[must_use]
    pub fn install() -> Self {
        let previous: Arc<PanicHook> = Arc::new(panic::take_hook());
        let forward = Arc::clone(&previous);
        panic::set_hook(Box::new(move |info| {
            if info.payload().is::<EscapeRequest>() {
                return;
            }
            (**forward)(info);
        }));
        INTERCEPTING.store(true, Ordering::SeqCst);
        Self {
            previous: Some(previous),
        }
    }
}

impl Drop for EscapeInterceptor {
    fn drop(&mut self) {
        INTERCEPTING.store(false, Ordering::SeqCst);

        // set_hook panics on an unwinding thread; the forwarding hook stays.
        if thread::panicking() {
            return;
        }
        let Some(previous) = self.previous.take() else {
            return;
        };
        drop(panic::take_hook());
        match Arc::try_unwrap(previous) {
            Ok(hook) => panic::set_hook(hook),
            Err(shared) => panic::set_hook(Box::new(move |info| (**shared)(info))),
        }
    }
}

/// Outcome of a closure that unwound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contained {
    /// Simulator code requested a process exit.
    Exit(EscapeRequest),
    /// Any other panic, with its message.
    Panic(String),
}

/// Runs `f`, catching escape requests and panics.
pub fn contain<T>(f: impl FnOnce() -> T) -> Result<T, Contained> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| match payload.downcast::<EscapeRequest>() {
        Ok(request) => Contained::Exit(*request),
        Err(other) => Contained::Panic(panic_message(other.as_ref())),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-text payload".to_string()
    }
}

/// Human-readable diagnosis of an intercepted exit.
#[must_use]
pub fn describe_exit(request: &EscapeRequest) -> String {
    let mentions_pchpp = request
        .message
        .as_deref()
        .is_some_and(|m| m.contains("pchpp"));
    if mentions_pchpp {
        return "the simulator rejected an invalid patch Pauli product (pchpp) configuration: \
                both the even and odd products of a patch were non-identity. \
                The circuit may not be compatible with the current patch configuration"
            .to_string();
    }
    match &request.message {
        Some(message) => format!("the simulator aborted with exit code {}: {message}", request.code),
        None => format!("the simulator aborted with exit code {}", request.code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    #[test]
    #[serial]
    fn intercepted_exit_is_contained() {
        let interceptor = EscapeInterceptor::install();
        assert!(is_intercepting());
        let result: Result<(), Contained> = contain(|| terminate_with(3, Some("boom".to_string())));
        assert_eq!(
            result,
            Err(Contained::Exit(EscapeRequest {
                code: 3,
                message: Some("boom".to_string())
            }))
        );
        drop(interceptor);
        assert!(!is_intercepting());
    }

    #[test]
    #[serial]
    fn ordinary_panics_are_reported_as_panics() {
        let _interceptor = EscapeInterceptor::install();
        let result: Result<(), Contained> = contain(|| panic!("adapter bug {}", 7));
        assert_eq!(result, Err(Contained::Panic("adapter bug 7".to_string())));
        assert_eq!(contain(|| 5), Ok(5));
    }

    #[test]
    #[serial]
    fn interceptor_can_be_reinstalled() {
        for code in 0..3 {
            let _interceptor = EscapeInterceptor::install();
            let result: Result<(), Contained> = contain(|| terminate(code));
            assert!(matches!(result, Err(Contained::Exit(EscapeRequest { code: c, .. })) if c == code));
        }
        assert!(!is_intercepting());
    }

    #[test]
    fn pchpp_exit_gets_specific_diagnosis() {
        let request = EscapeRequest {
            code: 1,
            message: Some("invalid pchpp in PIU.dyndec".to_string()),
        };
        assert!(describe_exit(&request).contains("patch Pauli product"));

        let generic = EscapeRequest {
            code: 2,
            message: None,
        };
        assert_eq!(describe_exit(&generic), "the simulator aborted with exit code 2");
    }
}
