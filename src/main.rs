use log::{error, info};
use pearl::errors::Result;
use pearl::io::{write_states, write_table};
use pearl::monty::monty_hall;

fn run() -> Result<()> {
    let mut monty = monty_hall()?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    write_table(&monty.network, monty.host, &mut out)?;

    // NB the player picks door 3 and the host opens door 2.
    let stats = monty.network.observe(monty.player, 3)?;
    info!("observed PLAYER = 3 with {} messages", stats.messages());

    let stats = monty.network.observe(monty.host, 2)?;
    info!("observed HOST = 2 with {} messages", stats.messages());

    write_states(&monty.network, &mut out)?;

    let car = monty.network.posterior(monty.car)?;
    info!("P(CAR) = {:?}; switching wins with p = {:.4}", car, car[0]);
    Ok(())
}

fn main() {
    env_logger::init();

    info!("Welcome to pearl.");

    if let Err(err) = run() {
        error!("{err}");
        std::process::exit(1);
    }

    info!("Done.");
}
