//! Engine macros

/// Reports a broken programming contract and aborts the process.
///
/// Continuing after one of these would corrupt ordering or affinity
/// guarantees, so there is no recovery path.
#[macro_export]
macro_rules! contract_violation {
    ($($arg:tt)+) => {{
        $crate::__tracing::error!(target: "strand::contract", $($arg)+);
        ::std::process::abort()
    }};
}

/// Captures the [`Location`](crate::Location) of the call site.
///
/// ```rust,ignore
/// runner.post_task(from_here!(), Box::new(|| println!("hello")));
/// ```
#[macro_export]
macro_rules! from_here {
    () => {
        $crate::Location::new(module_path!(), file!(), line!(), column!())
    };
}
