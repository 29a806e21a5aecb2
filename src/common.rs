// Licensed under the Apache-2.0 license

//! Shared driver plumbing: the logging hook injected into controllers.

use core::fmt::Arguments;

/// Diagnostic sink used by bus and DMA controllers.
///
/// Controllers take a `Logger` as a generic parameter so that production builds can
/// compile logging out entirely with [`NoOpLogger`], while bring-up builds route
/// messages to a UART or RTT channel.
pub trait Logger {
    fn debug(&self, args: Arguments<'_>);
    fn error(&self, args: Arguments<'_>);
}

/// Logger that discards everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn debug(&self, _args: Arguments<'_>) {}
    fn error(&self, _args: Arguments<'_>) {}
}

impl<L: Logger> Logger for &L {
    fn debug(&self, args: Arguments<'_>) {
        (**self).debug(args);
    }

    fn error(&self, args: Arguments<'_>) {
        (**self).error(args);
    }
}
