//! Helper macros for prefixed logging (console printing).

/// Internal dispatcher: forwards to the `log` facade at the given level,
/// prepending the parenthesized node/client prefix.
#[doc(hidden)]
#[macro_export]
macro_rules! pf_log {
    ($level:ident, $prefix:expr; $fmt_str:literal $(, $fmt_arg:expr)* $(,)?) => {
        log::$level!(concat!("({}) ", $fmt_str), $prefix $(, $fmt_arg)*)
    };
}

/// Log TRACE message with parenthesized prefix.
///
/// Example:
/// ```ignore
/// pf_trace!(id; "got {} to print", msg);
/// ```
#[macro_export]
macro_rules! pf_trace {
    ($prefix:expr; $($rest:tt)*) => {
        $crate::pf_log!(trace, $prefix; $($rest)*)
    };
}

/// Log DEBUG message with parenthesized prefix.
#[macro_export]
macro_rules! pf_debug {
    ($prefix:expr; $($rest:tt)*) => {
        $crate::pf_log!(debug, $prefix; $($rest)*)
    };
}

/// Log INFO message with parenthesized prefix.
#[macro_export]
macro_rules! pf_info {
    ($prefix:expr; $($rest:tt)*) => {
        $crate::pf_log!(info, $prefix; $($rest)*)
    };
}

/// Log WARN message with parenthesized prefix.
#[macro_export]
macro_rules! pf_warn {
    ($prefix:expr; $($rest:tt)*) => {
        $crate::pf_log!(warn, $prefix; $($rest)*)
    };
}

/// Log ERROR message with parenthesized prefix.
#[macro_export]
macro_rules! pf_error {
    ($prefix:expr; $($rest:tt)*) => {
        $crate::pf_log!(error, $prefix; $($rest)*)
    };
}

/// Log an error string to logger and then return a `RepliKvError`
/// containing the string.
///
/// Example:
/// ```ignore
/// return logged_err!(id; "unexpected {} received", what);
/// ```
#[macro_export]
macro_rules! logged_err {
    ($prefix:expr; $fmt_str:literal $(, $fmt_arg:expr)* $(,)?) => {{
        $crate::pf_error!($prefix; $fmt_str $(, $fmt_arg)*);
        Err($crate::RepliKvError(format!(
            concat!("({}) ", $fmt_str),
            $prefix $(, $fmt_arg)*
        )))
    }};
}
