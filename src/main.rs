use std::process::ExitCode;

use kvgate::{ProcessState, Version, lifecycle};

#[tokio::main]
async fn main() -> ExitCode {
    let mut state = ProcessState::new(Version::from_build_env());

    match lifecycle::run(&mut state, lifecycle::shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("kvgate: {e}");
            ExitCode::FAILURE
        }
    }
}
