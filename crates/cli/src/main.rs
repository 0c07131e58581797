use std::process::ExitCode;

fn main() -> ExitCode {
    switchdesk_cli::run()
}
