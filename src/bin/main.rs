use clap::Parser;
use rt_supervisor::cli::Cli;

fn main() {
    let cli = Cli::parse();

    if let Err(err) = rt_supervisor::run(cli) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
