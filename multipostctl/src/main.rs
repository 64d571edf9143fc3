use clap::Parser;

fn main() {
    let cli = multipostctl::Cli::parse();
    if let Err(err) = multipostctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
