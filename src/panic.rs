//! Helpers for reporting panics raised inside connection workers.

use std::{any::Any, fmt};

/// Displayable view of a panic payload.
///
/// `String` and `&'static str` payloads print as-is; anything else falls
/// back to a fixed placeholder so worker logs never lose the event.
///
/// ```
/// use wsvpn::panic::format_panic;
/// assert_eq!(format_panic(Box::new("boom")).to_string(), "boom");
/// assert_eq!(format_panic(Box::new(String::from("bang"))).to_string(), "bang");
/// assert_eq!(format_panic(Box::new(5_u32)).to_string(), "<non-string panic>");
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .0
            .downcast_ref::<&'static str>()
            .copied()
            .or_else(|| self.0.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("<non-string panic>");
        f.write_str(text)
    }
}

/// Wrap a payload returned by `catch_unwind`.
pub fn format_panic(panic: Box<dyn Any + Send>) -> PanicMessage { PanicMessage(panic) }
