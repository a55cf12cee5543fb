use std::process::ExitCode;

fn main() -> ExitCode {
    repricer_cli::run()
}
