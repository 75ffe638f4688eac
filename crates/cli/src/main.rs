use std::process::ExitCode;

fn main() -> ExitCode {
    unibox_cli::run()
}
