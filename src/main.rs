//! Binary entrypoint that launches the coach background services.

use std::process::ExitCode;

use wellcoach::start_wellcoach;

/// Start the coach services and block until Ctrl-C.
fn main() -> ExitCode {
    start_wellcoach::run()
}
