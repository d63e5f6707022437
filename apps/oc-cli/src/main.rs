use clap::{Parser, Subcommand};
use oc_app::{
    AppConfig, AppError, AppResult, Runtime, SharedControl, SimRecord, SimulatedOven,
    SteppedSimulation, load_config, load_profile, profile_limits,
};
use oc_core::{Clock, Millis, MonotonicClock};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ovenctl")]
#[command(about = "ovenctl - Oven temperature controller tools", long_about = None)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    CheckConfig {
        /// Path to the configuration YAML file
        config_path: PathBuf,
    },
    /// Validate a profile file (YAML or JSON)
    CheckProfile {
        /// Path to the profile file
        profile_path: PathBuf,
        /// Configuration whose tmax_c bounds the profile
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run a deterministic closed-loop simulation and print CSV
    Simulate {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Profile to arm before starting
        #[arg(short, long)]
        profile: Option<String>,
        /// Simulated duration in seconds
        #[arg(long)]
        seconds: u64,
        /// Simulation step in milliseconds
        #[arg(long, default_value_t = 100)]
        step_ms: Millis,
        /// Output CSV file path (optional, defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the threaded controller against the simulated oven in real time
    Run {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Profile to arm before starting
        #[arg(short, long)]
        profile: Option<String>,
        /// Wall-clock duration in seconds
        #[arg(long)]
        seconds: u64,
    },
}

fn main() -> AppResult<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::CheckConfig { config_path } => cmd_check_config(&config_path),
        Commands::CheckProfile {
            profile_path,
            config,
        } => cmd_check_profile(&profile_path, config.as_deref()),
        Commands::Simulate {
            config,
            profile,
            seconds,
            step_ms,
            output,
        } => cmd_simulate(
            config.as_deref(),
            profile.as_deref(),
            seconds,
            step_ms,
            output.as_deref(),
        ),
        Commands::Run {
            config,
            profile,
            seconds,
        } => cmd_run(config.as_deref(), profile.as_deref(), seconds),
    }
}

fn config_or_default(path: Option<&Path>) -> AppResult<AppConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(AppConfig::default()),
    }
}

fn cmd_check_config(config_path: &Path) -> AppResult<()> {
    println!("Validating config: {}", config_path.display());
    let config = load_config(config_path)?;
    let c = &config.control;
    println!("✓ Config is valid");
    println!(
        "  kp = {}, bias = {}, setpoint = {} °C, tmax = {} °C",
        c.kp, c.bias, c.setpoint_c, c.tmax_c
    );
    println!(
        "  window = {} ms, min on/off = {}/{} ms, smoothing = {}",
        c.window_ms, c.min_on_ms, c.min_off_ms, c.smooth_window
    );
    println!(
        "  sample/control period = {}/{} ms",
        config.timing.sample_period_ms, config.timing.control_period_ms
    );
    if config.profiles.is_empty() {
        println!("  No profiles");
    } else {
        println!("  Profiles:");
        for p in &config.profiles {
            let s = p.summary();
            println!(
                "    {} ({} points, {} s, {})",
                s.name,
                s.point_count,
                p.duration_sec(),
                s.end_behavior
            );
        }
    }
    Ok(())
}

fn cmd_check_profile(profile_path: &Path, config: Option<&Path>) -> AppResult<()> {
    println!("Validating profile: {}", profile_path.display());
    let config = config_or_default(config)?;
    let profile = load_profile(profile_path)?;
    let limits = profile_limits(&config.control);
    if let Err(e) = profile.validate(&limits) {
        println!("✗ Rejected: {} ({})", e.code(), e);
        return Err(e.into());
    }
    println!(
        "✓ Profile '{}' is valid ({} points, {} s, {})",
        profile.name,
        profile.points.len(),
        profile.duration_sec(),
        profile.end_behavior
    );
    Ok(())
}

fn arm_and_start(shared: &SharedControl, profile: Option<&str>) -> AppResult<()> {
    if let Some(name) = profile {
        if !shared.start_profile_run(name) {
            return Err(AppError::ProfileNotFound(name.to_string()));
        }
    }
    if !shared.try_start_run() {
        return Err(AppError::RunRefused(shared.get_status().state));
    }
    Ok(())
}

fn write_csv(out: &mut impl Write, records: &[SimRecord]) -> io::Result<()> {
    writeln!(out, "t_s,oven_c,measured_c,setpoint_c,duty,relay_on,state")?;
    for r in records {
        writeln!(
            out,
            "{:.1},{:.3},{},{},{:.4},{},{}",
            r.t_ms as f64 / 1000.0,
            r.oven_c,
            r.measured_c.map(|t| format!("{t:.3}")).unwrap_or_default(),
            r.setpoint_c.map(|t| format!("{t:.3}")).unwrap_or_default(),
            r.duty,
            u8::from(r.relay_on),
            r.state
        )?;
    }
    Ok(())
}

fn cmd_simulate(
    config: Option<&Path>,
    profile: Option<&str>,
    seconds: u64,
    step_ms: Millis,
    output: Option<&Path>,
) -> AppResult<()> {
    let config = config_or_default(config)?;
    let mut sim = SteppedSimulation::new(&config, step_ms)?;

    let mut records = vec![sim.tick()];
    arm_and_start(sim.shared(), profile)?;
    records.extend(sim.run_for(seconds.saturating_mul(1000)));

    if let Some(path) = output {
        let mut file = io::BufWriter::new(std::fs::File::create(path)?);
        write_csv(&mut file, &records)?;
        file.flush()?;
        eprintln!("✓ Wrote {} rows to {}", records.len(), path.display());
    } else {
        write_csv(&mut io::stdout().lock(), &records)?;
    }

    let status = sim.shared().get_status();
    eprintln!(
        "Final: state = {}, oven = {:.1} °C, fault = {:#04x}",
        status.state,
        sim.oven().temperature_c(),
        status.last_fault
    );
    Ok(())
}

fn cmd_run(config: Option<&Path>, profile: Option<&str>, seconds: u64) -> AppResult<()> {
    let config = config_or_default(config)?;
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let shared = Arc::new(SharedControl::from_app_config(&config, clock.clone())?);
    let oven = SimulatedOven::new(config.oven, clock)?;

    let handle = Runtime::new(shared.clone(), config.timing)?.spawn(oven.hardware(&config.control))?;

    // Let the control thread see the switch before starting.
    std::thread::sleep(Duration::from_millis(
        2 * u64::from(config.timing.control_period_ms),
    ));
    let started = arm_and_start(&shared, profile);
    if started.is_ok() {
        std::thread::sleep(Duration::from_secs(seconds));
        shared.stop_run();
    }
    handle.shutdown()?;
    started?;

    let status = shared.get_status();
    println!(
        "✓ Finished: state = {}, oven = {:.1} °C, fault = {:#04x}",
        status.state,
        oven.temperature_c(),
        status.last_fault
    );
    Ok(())
}
