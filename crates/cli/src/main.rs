use std::process::ExitCode;

fn main() -> ExitCode {
    boulanger_cli::run()
}
