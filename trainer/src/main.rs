use std::io;

use log::error;
use trainer::{configs::TrainingConfig, train};

fn main() -> io::Result<()> {
    env_logger::init();

    let config = TrainingConfig::from_env()?;
    let report = train(&config).inspect_err(|e| error!("training failed: {e}"))?;

    let report = serde_json::to_string_pretty(&report)?;
    println!("{report}");
    Ok(())
}
