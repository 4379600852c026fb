use std::env;

use dispatch::ScriptRunner;

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::init();

    let script_path = env::args()
        .nth(1)
        .or_else(|| env::var("SCENARIO_PATH").ok())
        .unwrap_or_else(|| schema::SAMPLE_SCENARIO_PATH.to_string());

    let runner = ScriptRunner::from_script_path(&script_path)?;
    log::info!(
        "replaying {} with weights {:?}",
        script_path,
        *schema::PROCESS_WEIGHTS
    );

    for line in runner.run_with_defaults()? {
        println!("{}", line);
    }

    Ok(())
}
