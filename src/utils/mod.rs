use std::any::Any;
use std::panic::{self, Location};

use log::error;

pub mod emiter;

/// Routes panic reports through `log` instead of stderr.
///
/// Handler panics caught by [`emiter::EventManager::emit`] still reach its
/// failure sink; this only replaces the default hook's stderr line.
pub fn install_panic_logger() {
    panic::set_hook(Box::new(|info| {
        error!("{}", panic_report(info.location(), info.payload()));
    }));
}

fn panic_report(location: Option<&Location<'_>>, payload: &(dyn Any + Send)) -> String {
    match location {
        Some(loc) => format!("panic at {}:{}: {}", loc.file(), loc.line(), emiter::panic_message(payload)),
        None => format!("panic: {}", emiter::panic_message(payload)),
    }
}
