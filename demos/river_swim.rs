use std::{error::Error, fs};

use tabular_rl::{
    algo::{
        psrl::PsrlAgentConfig, rlsvi::RlsviAgentConfig, ucrl_vtr::UcrlVtrAgentConfig, PsrlAgent,
        RlsviAgent, UcrlVtrAgent,
    },
    gym::RiverSwim,
    EpisodicAgent,
};

fn main() -> Result<(), Box<dyn Error>> {
    const NUM_EPISODES: usize = 500;
    const SEED: u64 = 42;

    let mut env = RiverSwim::default();

    let mut rlsvi = RlsviAgent::new(
        &env,
        NUM_EPISODES,
        RlsviAgentConfig {
            seed: Some(SEED),
            ..Default::default()
        },
    );
    let mut psrl = PsrlAgent::new(
        &env,
        NUM_EPISODES,
        PsrlAgentConfig {
            seed: Some(SEED),
            ..Default::default()
        },
    );
    let mut ucrl = UcrlVtrAgent::new(
        &env,
        NUM_EPISODES,
        UcrlVtrAgentConfig {
            seed: Some(SEED),
            ..Default::default()
        },
    );

    let mut agents: Vec<&mut dyn EpisodicAgent<RiverSwim>> =
        vec![&mut rlsvi, &mut psrl, &mut ucrl];

    let mut names = Vec::with_capacity(agents.len());
    let mut curves = Vec::with_capacity(agents.len());
    for agent in &mut agents {
        println!("Running {} for {} episodes...", agent.name(), NUM_EPISODES);
        let totals = agent.run(&mut env);
        println!(
            "{}: final cumulative reward {:.2}",
            agent.name(),
            totals.last().copied().unwrap_or(0.0)
        );
        names.push(agent.name());
        curves.push(totals);
    }

    // Write cumulative reward curves to CSV

    fs::create_dir_all("demos/out")?;
    let mut wtr = csv::Writer::from_path("demos/out/river_swim.csv")?;

    let mut header = vec!["episode"];
    header.extend(&names);
    wtr.write_record(&header)?;

    for episode in 0..NUM_EPISODES {
        let mut record = vec![(episode + 1).to_string()];
        record.extend(curves.iter().map(|curve| curve[episode].to_string()));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    println!("Wrote demos/out/river_swim.csv");

    Ok(())
}
