use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::{info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use sph_adaptation::{
    floating_type_mod::FT,
    simulation_parameters::{SceneConfig, SimulationParams},
    DimensionUtils, DimensionUtils2d, DimensionUtils3d, SphAdaptation,
};

mod run;

const CARGO_PKG_AUTHORS: &'static str = env!("CARGO_PKG_AUTHORS");
const CARGO_PKG_VERSION: &'static str = env!("CARGO_PKG_VERSION");
const CARGO_PKG_DESCRIPTION: &'static str = env!("CARGO_PKG_DESCRIPTION");

pub fn start() -> Result<()> {
    let dimension_arg = Arg::with_name("DIMENSION")
        .long("dimension")
        .short("d")
        .takes_value(true)
        .possible_values(&["2", "3"])
        .default_value("2")
        .help("Spatial dimension of the simulation");

    let matches = App::new("SPH Adaptation")
        .version(CARGO_PKG_VERSION)
        .author(CARGO_PKG_AUTHORS)
        .about(CARGO_PKG_DESCRIPTION)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("describe")
                .about("Print the resolution quantities derived from a simulation config")
                .arg(
                    Arg::with_name("SIMULATION_CONFIG")
                        .help("Sets the simulation paramaters")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("SCENE_CONFIG")
                        .long("scene")
                        .short("s")
                        .takes_value(true)
                        .help("Scene with the target shape of shape driven refinement"),
                )
                .arg(dimension_arg.clone()),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Fill the scene with particles and rebuild the neighbor relations")
                .arg(
                    Arg::with_name("SIMULATION_CONFIG")
                        .help("Sets the simulation paramaters")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("SCENE_CONFIG")
                        .help("Scene setup")
                        .required(true)
                        .index(2),
                )
                .arg(dimension_arg)
                .arg(
                    Arg::with_name("STEPS")
                        .long("steps")
                        .short("n")
                        .takes_value(true)
                        .default_value("10")
                        .help("Number of rebuild cycles"),
                )
                .arg(
                    Arg::with_name("JITTER")
                        .long("jitter")
                        .short("j")
                        .takes_value(true)
                        .default_value("0.1")
                        .help("Random displacement per cycle in units of the particle spacing"),
                ),
        )
        .get_matches();

    let log_level = match matches.occurrences_of("v") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(log_level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)
        .context("failed to initialize the logger")?;

    if let Some(describe_matches) = matches.subcommand_matches("describe") {
        let params = load_simulation_params(required(describe_matches, "SIMULATION_CONFIG")?)?;
        let scene_config = describe_matches.value_of("SCENE_CONFIG").map(load_scene_config).transpose()?;
        match dimension(describe_matches)? {
            2 => describe::<DimensionUtils2d, 2>(&params, scene_config.as_ref()),
            _ => describe::<DimensionUtils3d, 3>(&params, scene_config.as_ref()),
        }
    } else if let Some(run_matches) = matches.subcommand_matches("run") {
        let params = load_simulation_params(required(run_matches, "SIMULATION_CONFIG")?)?;
        let scene_config = load_scene_config(required(run_matches, "SCENE_CONFIG")?)?;

        let steps: usize = required(run_matches, "STEPS")?
            .parse()
            .context("--steps expects an integer")?;
        let jitter: FT = required(run_matches, "JITTER")?
            .parse()
            .context("--jitter expects a number")?;

        match dimension(run_matches)? {
            2 => run::run_scene::<DimensionUtils2d, 2>(&params, &scene_config, steps, jitter),
            _ => run::run_scene::<DimensionUtils3d, 3>(&params, &scene_config, steps, jitter),
        }
    } else {
        unreachable!("clap requires a subcommand")
    }
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .value_of(name)
        .with_context(|| format!("missing argument {}", name))
}

fn dimension(matches: &ArgMatches) -> Result<usize> {
    match required(matches, "DIMENSION")? {
        "2" => Ok(2),
        "3" => Ok(3),
        other => bail!("unsupported dimension {}", other),
    }
}

fn load_simulation_params(parameter_file: &str) -> Result<SimulationParams> {
    let params_yaml = std::fs::read_to_string(Path::new(parameter_file))
        .with_context(|| format!("failed reading parameter file {}", parameter_file))?;
    let simulation_params: SimulationParams =
        serde_yaml::from_str(&params_yaml).context("failed parsing simulation config file")?;
    info!("{:?}", simulation_params);
    Ok(simulation_params)
}

fn load_scene_config(scene_file_path: &str) -> Result<SceneConfig> {
    let scene_yaml = std::fs::read_to_string(Path::new(scene_file_path))
        .with_context(|| format!("failed reading scene file {}", scene_file_path))?;
    let scene_config: SceneConfig = serde_yaml::from_str(&scene_yaml).context("failed parsing scene config file")?;
    Ok(scene_config)
}

fn describe<DU: DimensionUtils<D>, const D: usize>(
    params: &SimulationParams,
    scene_config: Option<&SceneConfig>,
) -> Result<()> {
    let shape = match scene_config {
        Some(scene_config) => scene_config.target_shape::<D>()?,
        None => None,
    };
    let adaptation = SphAdaptation::<DU, D>::from_params(params, shape)?;
    let resolution = adaptation.params();

    println!("dimension:                  {}", D);
    println!("policy:                     {}", adaptation.policy().name());
    println!("reference spacing:          {}", resolution.reference_spacing());
    println!("minimum spacing:            {}", resolution.minimum_spacing());
    println!("reference smoothing length: {}", resolution.reference_smoothing_length());
    println!("minimum smoothing length:   {}", resolution.minimum_smoothing_length());
    println!("max smoothing length ratio: {}", resolution.max_smoothing_length_ratio());
    println!("kernel:                     {:?}", adaptation.kernel().kernel_type());
    println!("cutoff radius:              {}", adaptation.kernel().cutoff_radius());
    println!("reference number density:   {}", adaptation.reference_number_density(1.0));
    println!("cell linked list levels:    {}", adaptation.cell_linked_list_total_levels());
    println!("level set levels:           {}", adaptation.level_set_total_levels());
    if let Some(split_and_merge) = adaptation.split_and_merge_policy() {
        println!("minimum volume:             {}", split_and_merge.minimum_volume());
        println!("maximum volume:             {}", split_and_merge.maximum_volume());
    }
    Ok(())
}
