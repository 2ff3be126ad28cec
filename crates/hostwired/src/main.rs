use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    let result = hostwired::run_worker();
    if let Err(error) = &result {
        match error.cli_error() {
            Some(cli) => {
                let _ = cli.print();
            }
            None => {
                let _ = writeln!(io::stderr(), "hostwired: {error}");
            }
        }
    }
    ExitCode::from(hostwired::worker_exit_code(&result))
}
