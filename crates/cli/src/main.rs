use std::process::ExitCode;

fn main() -> ExitCode {
    wingdesk_cli::run()
}
