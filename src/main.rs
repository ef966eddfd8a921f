use clap::Parser;

use runway::api::{Cli, run_cli};

fn main() {
    env_logger::init();

    match run_cli(Cli::parse()) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
