use std::process::ExitCode;

fn main() -> ExitCode {
    match conso_forecast::app::run_pipeline() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
