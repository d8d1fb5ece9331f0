use std::process::ExitCode;

fn main() -> ExitCode {
    yamltag_cli::run()
}
