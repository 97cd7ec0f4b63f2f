use env_logger::{Builder, Env, Target};

fn main() {
    Builder::from_env(Env::default().default_filter_or("warn"))
        .target(Target::Stderr)
        .init();

    if let Err(error) = docpeek_cli::run(std::env::args_os()) {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}
