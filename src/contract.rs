//! Reporting of contract violations.
//!
//! A contract violation is a programming error: a non-power-of-two
//! alignment, an index out of bounds, a size computation that overflows, a
//! block handed back to the wrong allocator. Continuing past one risks
//! memory corruption, so every violation is logged and then panics, with the
//! panic location pointing at the offending caller.

use core::fmt;
use core::panic::Location;

/// Check a precondition, reporting a contract violation if it does not hold.
///
/// The message arguments are only formatted on failure.
macro_rules! contract {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::contract::violation(format_args!($($arg)+))
        }
    };
}

/// Report a contract violation and abort the current operation.
#[cold]
#[inline(never)]
#[track_caller]
pub(crate) fn violation(args: fmt::Arguments<'_>) -> ! {
    let location = Location::caller();
    log::error!("contract violation at {}: {}", location, args);
    panic!("contract violation: {}", args)
}

#[cfg(test)]
mod tests {
    use test_env_log::test;

    #[test]
    fn holding_contract_is_silent() {
        let len = 3;
        contract!(len < 4, "index {} out of bounds", len);
    }

    #[test]
    #[should_panic(expected = "contract violation: index 4 out of bounds")]
    fn broken_contract_panics_with_message() {
        let len = 4;
        contract!(len < 4, "index {} out of bounds", len);
    }
}
