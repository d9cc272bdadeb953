use clap::Parser;
use debedup::cli::{Cli, ClientOp, Command};
use debedup::config::Config;

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Server { mode } => Config::load(&cli.config).map_err(Into::into).and_then(|config| debedup::server::run(config, *mode)),
        Command::Client { op, input } => Config::load(&cli.config).map_err(Into::into).and_then(|config| match op {
            ClientOp::Upload => debedup::client::upload(&config, input),
            ClientOp::Download => debedup::client::download(&config, input),
            ClientOp::Attest => debedup::client::attest(&config),
        }),
        Command::KeyManager { mode } => {
            log::info!("key manager mode {mode}: blind-RSA/DupLESS key issuance is out of scope, nothing to run");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
