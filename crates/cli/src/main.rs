use std::process::ExitCode;

fn main() -> ExitCode {
    hark_cli::run()
}
