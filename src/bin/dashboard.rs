use std::process::ExitCode;

fn main() -> ExitCode {
    match conso_forecast::app::run_dashboard() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
