use std::process::ExitCode;

fn main() -> ExitCode {
    altura_cli::run()
}
