use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "taskmonitord", about = "Linux host telemetry agent")]
pub struct Args {
    /// Path to the INI configuration file.
    #[arg(short, long, value_name = "PATH", default_value = "/etc/taskmonitor.conf")]
    pub config: PathBuf,
}

pub fn parse() -> Args {
    Args::parse()
}
