//! `plangate` - drive an approval workflow from the command line
//!
//! Exit codes: 0 when the command went through, 2 when a guard blocked it,
//! 1 on any hard error.

mod cli;

use plangate_core::{Clock, Outcome, SystemClock};
use tracing_subscriber::EnvFilter;

const EXIT_ERROR: i32 = 1;

fn main() {
    init_tracing();

    let matches = match cli::command().try_get_matches() {
        Ok(matches) => matches,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { EXIT_ERROR } else { 0 });
        }
    };

    let code = match cli::InvocationOptions::from_matches(&matches)
        .map_err(anyhow::Error::from)
        .and_then(|options| cli::execute(&options).map(|outcome| (options.json, outcome)))
        .and_then(|(json, outcome)| render(&outcome, json).map(|()| outcome.exit_code()))
    {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    };
    std::process::exit(code);
}

fn render(outcome: &Outcome, json: bool) -> anyhow::Result<()> {
    let now = SystemClock.now();
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.to_payload(now)?)?);
    } else {
        print!("{}", outcome.render_text(now));
    }
    Ok(())
}

/// Diagnostics go to stderr so stdout stays machine readable
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
